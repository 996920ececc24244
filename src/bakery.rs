//! Bakery invocation building
//!
//! The bakery is the external packaging tool that fetches, builds, and
//! installs one package per invocation. This module knows how to find the
//! executable and how to turn one declared package into its argv; actually
//! running it is the driver's job.

use std::path::{Path, PathBuf};

use crate::order::{BuildOrder, BuildProcedure};
use crate::runner::CommandSpec;

/// Environment variable overriding the bakery executable.
pub const BAKERY_ENV_VAR: &str = "BP_BAKERY";

/// Program name resolved on PATH when nothing overrides it.
pub const DEFAULT_BAKERY_PROGRAM: &str = "bakery";

/// Resolve the bakery executable: explicit flag, then the `BP_BAKERY`
/// environment variable, then `bakery` on PATH.
///
/// Takes the environment value as an argument so resolution stays a pure
/// function; the CLI layer reads the real environment.
pub fn resolve_program(flag: Option<&Path>, env_override: Option<&str>) -> PathBuf {
    if let Some(path) = flag {
        return path.to_path_buf();
    }
    match env_override {
        Some(value) if !value.trim().is_empty() => PathBuf::from(value),
        _ => PathBuf::from(DEFAULT_BAKERY_PROGRAM),
    }
}

/// Handle on a resolved bakery executable.
#[derive(Debug, Clone)]
pub struct Bakery {
    program: PathBuf,
}

impl Bakery {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Build the invocation for one declared package.
    ///
    /// Shape: `bakery build <pkg> --output-dir <dir> [--source <path>]
    /// [--recipe <file>] [--verbose]`, with the platform exported as
    /// `BP_OSX_TARGET` on the child only.
    pub fn build_command(&self, order: &BuildOrder, package: &str) -> CommandSpec {
        let mut spec = CommandSpec::new(&self.program)
            .arg("build")
            .arg(package)
            .arg("--output-dir")
            .arg(order.output_dir.display().to_string());

        if let BuildProcedure::LocalSource { source, recipe } = order.procedure(package) {
            spec = spec.arg("--source").arg(source.display().to_string());
            if let Some(recipe) = recipe {
                spec = spec.arg("--recipe").arg(recipe.display().to_string());
            }
        }

        if order.verbose {
            spec = spec.arg("--verbose");
        }

        let (key, value) = order.platform.env_pair();
        spec.env(key, value)
    }
}
