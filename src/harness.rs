//! Integration-test harness for a built service artifact
//!
//! Runs a fixed sequence of named cases against the service, each inside
//! its own scoped runner session. The compression cases are placeholders:
//! their assertions are disabled pending reference data, so they launch and
//! tear down a session (which is itself worth testing) and then report
//! skipped rather than pretending to verify anything.

use std::path::{Path, PathBuf};
use strum::Display;

use crate::error::{BuildError, Result};
use crate::service_runner::{SessionOptions, run_service};
use crate::urlutil;

/// Environment variable overriding where the built service lives.
pub const OUTPUT_DIR_ENV_VAR: &str = "BP_OUTPUT_DIR";

/// Environment variable naming the provider service directory.
pub const PROVIDER_DIR_ENV_VAR: &str = "BP_PROVIDER_DIR";

/// Where the build leaves the service when nothing overrides it.
pub const DEFAULT_SERVICE_DIR: &str = "build/LZMA";

/// Resolve the service directory: explicit flag, then `BP_OUTPUT_DIR`, then
/// the default build location.
///
/// The environment value is injected so resolution is a pure function.
pub fn resolve_service_dir(flag: Option<&Path>, env_override: Option<&str>) -> PathBuf {
    if let Some(dir) = flag {
        return dir.to_path_buf();
    }
    match env_override {
        Some(value) if !value.trim().is_empty() => PathBuf::from(value),
        _ => PathBuf::from(DEFAULT_SERVICE_DIR),
    }
}

/// Resolve the optional provider directory from flag or environment.
///
/// Accepts either a plain path or a `file://` URL; URLs that don't convert
/// to a local path are configuration errors, not silent fallbacks.
pub fn resolve_provider_dir(
    flag: Option<&str>,
    env_override: Option<&str>,
) -> Result<Option<PathBuf>> {
    let raw = match (flag, env_override) {
        (Some(value), _) => value,
        (None, Some(value)) if !value.trim().is_empty() => value,
        _ => return Ok(None),
    };

    if raw.starts_with("file://") {
        let path = urlutil::path_from_url(raw);
        if path.is_empty() {
            return Err(BuildError::order(format!(
                "provider directory URL '{raw}' does not name a local path"
            )));
        }
        return Ok(Some(PathBuf::from(path)));
    }
    Ok(Some(PathBuf::from(raw)))
}

/// Final state of one case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum CaseStatus {
    #[strum(serialize = "passed")]
    Passed,
    #[strum(serialize = "skipped")]
    Skipped,
    #[strum(serialize = "failed")]
    Failed,
}

/// One case's entry in the report.
#[derive(Debug, Clone)]
pub struct CaseResult {
    pub name: &'static str,
    pub status: CaseStatus,
    pub detail: Option<String>,
}

/// Everything the case sequence produced.
#[derive(Debug, Default)]
pub struct HarnessReport {
    pub results: Vec<CaseResult>,
}

impl HarnessReport {
    pub fn passed(&self) -> usize {
        self.count(CaseStatus::Passed)
    }

    pub fn skipped(&self) -> usize {
        self.count(CaseStatus::Skipped)
    }

    pub fn failed(&self) -> usize {
        self.count(CaseStatus::Failed)
    }

    /// True when no case failed. Skipped cases don't fail a run.
    pub fn success(&self) -> bool {
        self.failed() == 0
    }

    fn count(&self, status: CaseStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    pub fn print_summary(&self) {
        let line = format!(
            "{} passed, {} skipped, {} failed",
            self.passed(),
            self.skipped(),
            self.failed()
        );
        if self.success() {
            println!("✓ {}", line);
        } else {
            println!("✗ {}", line);
        }
    }
}

/// How one case ended when it didn't error out.
enum CaseOutcome {
    Passed,
    Skipped(&'static str),
}

type CaseFn = fn(&SessionOptions) -> Result<CaseOutcome>;

/// The fixed sequence, in the order the original suite declares them.
const CASES: &[(&str, CaseFn)] = &[
    ("load_service", case_load_service),
    ("lzma_both_ways", case_lzma_both_ways),
    ("decompress_both_encoders", case_decompress_both_encoders),
    ("decompress_sample", case_decompress_sample),
];

/// Loading the service and tearing the session down IS the assertion here.
fn case_load_service(opts: &SessionOptions) -> Result<CaseOutcome> {
    run_service(opts, |_session| Ok(CaseOutcome::Passed))
}

fn case_lzma_both_ways(opts: &SessionOptions) -> Result<CaseOutcome> {
    run_service(opts, |_session| {
        Ok(CaseOutcome::Skipped("compression assertions disabled"))
    })
}

fn case_decompress_both_encoders(opts: &SessionOptions) -> Result<CaseOutcome> {
    run_service(opts, |_session| {
        Ok(CaseOutcome::Skipped("compression assertions disabled"))
    })
}

fn case_decompress_sample(opts: &SessionOptions) -> Result<CaseOutcome> {
    run_service(opts, |_session| {
        Ok(CaseOutcome::Skipped("reference sample assertions disabled"))
    })
}

/// Run every case in sequence and collect the report.
///
/// A failing case doesn't stop the sequence; its error lands in the report
/// and the remaining cases still run.
pub fn run_cases(opts: &SessionOptions) -> HarnessReport {
    println!(
        "🔧 Testing service in {} via {}",
        opts.service_dir.display(),
        opts.runner.display()
    );

    let mut results = Vec::with_capacity(CASES.len());
    for &(name, case) in CASES {
        tracing::info!("case {}", name);
        match case(opts) {
            Ok(CaseOutcome::Passed) => {
                println!("✓ {}", name);
                results.push(CaseResult {
                    name,
                    status: CaseStatus::Passed,
                    detail: None,
                });
            }
            Ok(CaseOutcome::Skipped(reason)) => {
                println!("- {} skipped: {}", name, reason);
                results.push(CaseResult {
                    name,
                    status: CaseStatus::Skipped,
                    detail: Some(reason.to_string()),
                });
            }
            Err(e) => {
                println!("✗ {}: {}", name, e);
                tracing::error!("case {} failed: {}", name, e);
                results.push(CaseResult {
                    name,
                    status: CaseStatus::Failed,
                    detail: Some(e.to_string()),
                });
            }
        }
    }

    let report = HarnessReport { results };
    report.print_summary();
    report
}
