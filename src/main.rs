//! Command-line entry point: set up the fixture, run scenarios, tear down.

use std::path::PathBuf;

use quast_verify::{
    config::EnvInputs,
    fixture::{CleanupReport, Fixture},
    logging::{self, LogSettings},
    runner::{self, FetchMode, ScenarioPass, SuiteReport},
    scenario::{self, DEFAULT_DATA_DIR},
};

fn main() {
    if let Err(err) = try_main() {
        eprintln!("quast-verify: {err}");
        std::process::exit(1);
    }
}

#[derive(Debug, Default)]
struct CliArgs {
    scenarios: Vec<String>,
    data_dir: Option<PathBuf>,
    fetch: Option<FetchMode>,
    log: LogSettings,
    list: bool,
}

fn try_main() -> Result<(), String> {
    let args = parse_args(std::env::args().skip(1).collect())?;
    let data_dir = args
        .data_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
    let all = scenario::builtin(&data_dir);
    if args.list {
        for scenario in &all {
            println!("{}", scenario.name);
        }
        return Ok(());
    }
    let scenarios = scenario::select(all, &args.scenarios)?;

    let _run_log = match logging::init(&args.log) {
        Ok(run_log) => Some(run_log),
        Err(err) => {
            eprintln!("Logging to file disabled: {err}");
            None
        }
    };

    let mut fixture = Fixture::setup(&EnvInputs::from_env()).map_err(|err| err.to_string())?;
    let fetch = args
        .fetch
        .unwrap_or_else(|| FetchMode::default_for(fixture.context()));
    tracing::info!("=============== Starting scenarios ==================");
    let report = runner::run_suite(&mut fixture, &scenarios, fetch);
    let cleanup = fixture.teardown();

    print_summary(&report, &cleanup);
    if report.failed() > 0 {
        return Err(format!(
            "{} of {} scenarios failed",
            report.failed(),
            report.results.len()
        ));
    }
    Ok(())
}

fn print_summary(report: &SuiteReport, cleanup: &CleanupReport) {
    for result in &report.results {
        let status = match &result.outcome {
            Ok(ScenarioPass::Verified(verified)) => {
                format!("ok (node {}, {} bytes)", verified.shock_id, verified.size)
            }
            Ok(ScenarioPass::FailedAsExpected(err)) => format!("ok (failed as expected: {err})"),
            Err(err) => format!("FAILED: {err}"),
        };
        println!("{:<24} {:>8.1?}  {status}", result.name, result.elapsed);
    }
    println!(
        "{} passed, {} failed; cleanup removed {} node(s), {} handle(s){}",
        report.passed(),
        report.failed(),
        cleanup.nodes_deleted.len(),
        cleanup.handles_deleted.len(),
        if cleanup.is_clean() {
            String::new()
        } else {
            format!(", {} cleanup error(s) logged", cleanup.errors.len())
        }
    );
}

fn parse_args(args: Vec<String>) -> Result<CliArgs, String> {
    let mut parsed = CliArgs::default();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => return Err(help_text()),
            "--list" => parsed.list = true,
            "-v" | "--verbose" => parsed.log.verbose = true,
            "--log-dir" => {
                parsed.log.dir = Some(PathBuf::from(next_value(&args, &mut i, "--log-dir")?));
            }
            "--scenario" => parsed.scenarios.push(next_value(&args, &mut i, "--scenario")?),
            "--data-dir" => {
                parsed.data_dir = Some(PathBuf::from(next_value(&args, &mut i, "--data-dir")?));
            }
            "--fetch" => {
                let value = next_value(&args, &mut i, "--fetch")?;
                parsed.fetch = Some(
                    FetchMode::parse(&value)
                        .ok_or_else(|| format!("Unknown fetch mode '{value}'"))?,
                );
            }
            unknown => return Err(format!("Unknown argument '{unknown}'\n\n{}", help_text())),
        }
        i += 1;
    }
    Ok(parsed)
}

fn next_value(args: &[String], i: &mut usize, name: &str) -> Result<String, String> {
    let next = args
        .get(*i + 1)
        .ok_or_else(|| format!("Missing value for {name}"))?;
    *i += 1;
    Ok(next.clone())
}

fn help_text() -> String {
    "Usage: quast-verify [options]\n\n\
Environment:\n\
  KB_AUTH_TOKEN            Auth token (required)\n\
  KB_DEPLOYMENT_CONFIG     Path to the TOML deployment config (required)\n\
  SDK_CALLBACK_URL         Callback server for run_QUAST and DataFileUtil\n\n\
Options:\n\
  --scenario <NAME>        Run only this scenario (repeatable)\n\
  --data-dir <DIR>         Directory holding scenario inputs (default: data)\n\
  --fetch <staging|direct> How archives are fetched for checksum checks\n\
  --log-dir <DIR>          Write run logs here instead of the app log dir\n\
  -v, --verbose            Log service calls at debug level\n\
  --list                   List scenarios and exit\n\
  -h, --help               Show help\n"
        .to_string()
}
