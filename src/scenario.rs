//! Built-in verification scenarios.

use std::path::Path;

use crate::{
    job::{FileDescriptor, QuastParams},
    verify::{Expectations, GoldenFile, QUAST_ARCHIVE_NAME, SizeTolerance},
};

/// Reference sequence used by the single-file scenario.
pub const GREENGENES_INPUT: &str = "greengenes_UnAligSeq24606.fa";
/// Default directory holding scenario input files.
pub const DEFAULT_DATA_DIR: &str = "data";

/// What a scenario requires of the `run_QUAST` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The call succeeds and the stored result passes verification.
    Verified(Expectations),
    /// The call fails with a remote execution error.
    RemoteFailure,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scenario {
    pub name: &'static str,
    pub params: QuastParams,
    pub outcome: Outcome,
}

/// Every built-in scenario, with inputs resolved against `data_dir`.
pub fn builtin(data_dir: &Path) -> Vec<Scenario> {
    vec![quast_from_1_file(data_dir), quast_missing_input(data_dir)]
}

/// Pick scenarios by name, preserving the requested order.
pub fn select(all: Vec<Scenario>, names: &[String]) -> Result<Vec<Scenario>, String> {
    if names.is_empty() {
        return Ok(all);
    }
    names
        .iter()
        .map(|name| {
            all.iter()
                .find(|scenario| scenario.name == name)
                .cloned()
                .ok_or_else(|| format!("Unknown scenario '{name}'"))
        })
        .collect()
}

fn quast_from_1_file(data_dir: &Path) -> Scenario {
    Scenario {
        name: "quast_from_1_file",
        params: QuastParams::from_files(vec![FileDescriptor::new(
            data_dir.join(GREENGENES_INPUT),
            "foo",
        )]),
        outcome: Outcome::Verified(Expectations {
            file_name: QUAST_ARCHIVE_NAME.to_string(),
            size: SizeTolerance::between(313_780, 313_800),
            golden_files: vec![
                GoldenFile::new("report.txt", "7b5fcb9f4a41d1a047227139fbd8aa60"),
                GoldenFile::new("icarus.html", "cd39eb4fd8ba1dad7e9133814fb0e2bc"),
            ],
        }),
    }
}

fn quast_missing_input(data_dir: &Path) -> Scenario {
    Scenario {
        name: "quast_missing_input",
        params: QuastParams::from_files(vec![FileDescriptor::new(
            data_dir.join("does_not_exist.fa"),
            "missing",
        )]),
        outcome: Outcome::RemoteFailure,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_file_scenario_pins_known_bounds() {
        let scenario = quast_from_1_file(Path::new("data"));
        let Outcome::Verified(expect) = scenario.outcome else {
            panic!("expected verified outcome");
        };
        assert!(expect.size.contains(313_790));
        assert!(!expect.size.contains(313_780));
        assert_eq!(expect.file_name, "quast_results.zip");
        assert_eq!(scenario.params.files[0].label, "foo");
    }

    #[test]
    fn select_keeps_requested_order_and_rejects_unknown() {
        let all = builtin(Path::new("data"));
        let picked = select(
            all.clone(),
            &["quast_missing_input".to_string(), "quast_from_1_file".to_string()],
        )
        .unwrap();
        assert_eq!(picked[0].name, "quast_missing_input");
        assert_eq!(picked[1].name, "quast_from_1_file");
        assert!(select(all, &["nope".to_string()]).is_err());
    }
}
