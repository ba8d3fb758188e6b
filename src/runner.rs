//! Sequential scenario runner.
//!
//! A failing scenario only fails itself: the next scenario still runs, and the
//! artifacts of every scenario are in the ledger before any check can fail.

use std::time::{Duration, Instant};

use crate::{
    fixture::{CleanupLedger, Fixture, TestContext},
    job::{JobInvoker, RemoteExecutionError},
    services::ServiceError,
    scenario::{Outcome, Scenario},
    verify::{
        ArtifactFetcher, DirectFetcher, ResultVerifier, StagingFetcher, VerificationError,
        VerificationReport,
    },
};

/// How step 6 of verification gets the archive contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// DataFileUtil `shock_to_file` with unpack, through the callback server.
    Staging,
    /// Direct Shock download and local extraction.
    Direct,
}

impl FetchMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "staging" => Some(Self::Staging),
            "direct" => Some(Self::Direct),
            _ => None,
        }
    }

    /// Staging when a callback server is available, otherwise direct.
    pub fn default_for(ctx: &TestContext) -> Self {
        if ctx.staging.is_some() {
            Self::Staging
        } else {
            Self::Direct
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error("Remote execution failed: {0}")]
    Job(#[from] RemoteExecutionError),
    #[error("Verification failed: {0}")]
    Verification(#[from] VerificationError),
    #[error("Expected run_QUAST to fail, but it stored node {shock_id}")]
    UnexpectedSuccess { shock_id: String },
    #[error("Staging fetch requested but SDK_CALLBACK_URL is not set")]
    StagingUnavailable,
}

#[derive(Debug)]
pub enum ScenarioPass {
    Verified(VerificationReport),
    FailedAsExpected(RemoteExecutionError),
}

#[derive(Debug)]
pub struct ScenarioResult {
    pub name: &'static str,
    pub outcome: Result<ScenarioPass, ScenarioError>,
    pub elapsed: Duration,
}

#[derive(Debug, Default)]
pub struct SuiteReport {
    pub results: Vec<ScenarioResult>,
}

impl SuiteReport {
    pub fn passed(&self) -> usize {
        self.results.iter().filter(|r| r.outcome.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.passed()
    }
}

/// Run one scenario, registering whatever it creates for teardown.
///
/// Scenarios expecting failure skip the local input checks, so the request
/// reaches the service, and only an error the service itself reports counts.
pub fn run_scenario(
    ctx: &TestContext,
    ledger: &mut CleanupLedger,
    invoker: &dyn JobInvoker,
    fetch: FetchMode,
    scenario: &Scenario,
) -> Result<ScenarioPass, ScenarioError> {
    let result = match scenario.outcome {
        Outcome::RemoteFailure => invoker.submit(&scenario.params),
        Outcome::Verified(_) => invoker.run_quast(&scenario.params),
    };
    if let Ok(output) = &result {
        ledger.register_node(&output.shock_id);
        ledger.register_handle(&output.handle.hid);
    }

    match (&scenario.outcome, result) {
        (Outcome::RemoteFailure, Err(err)) if reported_by_service(&err) => {
            tracing::info!(scenario = scenario.name, "Failed as expected: {err}");
            Ok(ScenarioPass::FailedAsExpected(err))
        }
        (Outcome::RemoteFailure, Err(err)) => Err(err.into()),
        (Outcome::RemoteFailure, Ok(output)) => Err(ScenarioError::UnexpectedSuccess {
            shock_id: output.shock_id,
        }),
        (Outcome::Verified(_), Err(err)) => Err(err.into()),
        (Outcome::Verified(expect), Ok(output)) => {
            let staging;
            let direct;
            let fetcher: &dyn ArtifactFetcher = match fetch {
                FetchMode::Staging => {
                    let client = ctx
                        .staging
                        .as_ref()
                        .ok_or(ScenarioError::StagingUnavailable)?;
                    staging = StagingFetcher::new(client);
                    &staging
                }
                FetchMode::Direct => {
                    direct = DirectFetcher::new(&ctx.blob_store);
                    &direct
                }
            };
            let verifier = ResultVerifier::new(
                &ctx.config.shock_url,
                &ctx.blob_store,
                &ctx.handle_service,
                fetcher,
                ctx.scratch(),
            );
            let report = verifier.verify(&output, expect)?;
            Ok(ScenarioPass::Verified(report))
        }
    }
}

fn reported_by_service(err: &RemoteExecutionError) -> bool {
    matches!(err, RemoteExecutionError::Service(ServiceError::Rpc { .. }))
}

/// Run scenarios in order against the fixture's context and QUAST endpoint.
pub fn run_suite(fixture: &mut Fixture, scenarios: &[Scenario], fetch: FetchMode) -> SuiteReport {
    let mut report = SuiteReport::default();
    for scenario in scenarios {
        let (ctx, ledger) = fixture.parts();
        tracing::info!(scenario = scenario.name, ?fetch, "Starting scenario");
        let started = Instant::now();
        let outcome = run_scenario(ctx, ledger, &ctx.quast, fetch, scenario);
        let elapsed = started.elapsed();
        match &outcome {
            Ok(_) => tracing::info!(scenario = scenario.name, ?elapsed, "Scenario passed"),
            Err(err) => {
                tracing::error!(scenario = scenario.name, ?elapsed, "Scenario failed: {err}")
            }
        }
        report.results.push(ScenarioResult {
            name: scenario.name,
            outcome,
            elapsed,
        });
    }
    report
}
