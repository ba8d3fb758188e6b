#![allow(dead_code)]

pub mod fake_kbase;

use std::path::{Path, PathBuf};

use quast_verify::{
    config::EnvInputs,
    job::{FileDescriptor, QuastParams},
    scenario::{Outcome, Scenario},
    verify::{Expectations, GoldenFile, SizeTolerance},
};

use fake_kbase::{ARCHIVE_NAME, FakeKbase, GOOD_TOKEN, md5_hex};

pub const REPORT: &[u8] = b"All statistics are based on contigs of size >= 500 bp\nAssembly foo\n";
pub const ICARUS: &[u8] = b"<html><body>Icarus</body></html>\n";

/// Archive entries the fake run_QUAST packages.
pub fn quast_entries() -> Vec<(&'static str, &'static [u8])> {
    vec![
        ("report.txt", REPORT),
        ("icarus.html", ICARUS),
        ("icarus_viewers/contig_size_viewer.html", b"<html/>".as_slice()),
    ]
}

/// Which keys the generated config leaves out or adds.
#[derive(Default)]
pub struct ConfigShape {
    pub omit_shock_url: bool,
    pub quast_service_url: Option<String>,
}

pub fn write_config(fake: &FakeKbase, dir: &Path, shape: ConfigShape) -> PathBuf {
    let quote = |value: &str| toml::Value::String(value.to_string()).to_string();
    let mut text = String::from("[kb_quast]\n");
    if !shape.omit_shock_url {
        text.push_str(&format!("shock-url = {}\n", quote(&fake.shock_url())));
    }
    text.push_str(&format!("workspace-url = {}\n", quote(&fake.workspace_url())));
    text.push_str(&format!("handle-service-url = {}\n", quote(&fake.handle_url())));
    text.push_str(&format!("auth-service-url = {}\n", quote(&fake.auth_url())));
    let scratch = dir.join("scratch");
    text.push_str(&format!("scratch = {}\n", quote(&scratch.to_string_lossy())));
    if let Some(url) = &shape.quast_service_url {
        text.push_str(&format!("quast-service-url = {}\n", quote(url)));
    }
    let path = dir.join("deploy.toml");
    std::fs::write(&path, text).expect("write deploy config");
    path
}

/// Environment as the SDK would provide it, pointing at the fake services.
pub fn env_for(fake: &FakeKbase, dir: &Path) -> EnvInputs {
    EnvInputs {
        token: Some(GOOD_TOKEN.to_string()),
        callback_url: Some(fake.callback_url()),
        config_path: Some(write_config(fake, dir, ConfigShape::default())),
    }
}

/// A real input file under `dir`.
pub fn write_input(dir: &Path) -> PathBuf {
    let path = dir.join("data").join("contigs.fa");
    std::fs::create_dir_all(path.parent().expect("input parent")).expect("create data dir");
    std::fs::write(&path, b">contig_1\nACGTACGTACGT\n").expect("write input");
    path
}

/// Expectations matching what the fake stores.
pub fn expectations_for(fake: &FakeKbase) -> Expectations {
    let size = fake.archive_len();
    Expectations {
        file_name: ARCHIVE_NAME.to_string(),
        size: SizeTolerance::between(size - 10, size + 10),
        golden_files: vec![
            GoldenFile::new("report.txt", md5_hex(REPORT)),
            GoldenFile::new("icarus.html", md5_hex(ICARUS)),
        ],
    }
}

pub fn verified_scenario(input: &Path, expect: Expectations) -> Scenario {
    Scenario {
        name: "quast_from_1_file",
        params: QuastParams::from_files(vec![FileDescriptor::new(input, "foo")]),
        outcome: Outcome::Verified(expect),
    }
}

pub fn failing_scenario(input: &Path) -> Scenario {
    Scenario {
        name: "quast_expected_failure",
        params: QuastParams::from_files(vec![FileDescriptor::new(input, "missing")]),
        outcome: Outcome::RemoteFailure,
    }
}
