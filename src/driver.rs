//! Sequential build driver
//!
//! Walks the build order package by package, handing each one to the bakery
//! and stopping at the first failure. Also hosts the pass-through variant
//! that forwards arguments verbatim to the easylzma build script.

use std::fs;
use std::path::Path;

use crate::bakery::Bakery;
use crate::error::{BuildError, Result};
use crate::order::BuildOrder;
use crate::runner::{self, CommandSpec};

/// Directory the pass-through variant runs in, relative to the caller.
pub const EASYLZMA_DIR: &str = "easylzma";

const EASYLZMA_BUILD_SCRIPT: &str = "build.sh";

/// Destructive options for a build run. Both default to off; wiping the
/// output directory only ever happens on request.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildOptions {
    /// Remove the output directory before the first package builds.
    pub rebuild: bool,
    /// Remove the output directory after every package has built.
    pub clean: bool,
}

/// What a successful run produced.
#[derive(Debug)]
pub struct BuildReport {
    /// Packages built, in build sequence.
    pub built: Vec<String>,
}

/// Run the order front to back.
///
/// Packages build strictly in declared sequence; the first spawn failure or
/// non-zero exit aborts the run with an error naming the package, and later
/// packages are never invoked.
pub fn run_build(
    order: &BuildOrder,
    bakery: &Bakery,
    options: &BuildOptions,
) -> Result<BuildReport> {
    order.validate()?;

    if order.platform.is_legacy() {
        banner("DOING OSX10.4 BUILD");
    }

    if options.rebuild {
        wipe_output_dir(&order.output_dir)?;
    }

    let mut built = Vec::with_capacity(order.packages.len());
    for package in &order.packages {
        println!("🔧 Building {}...", package);
        let spec = bakery.build_command(order, package);
        tracing::debug!("package {} -> {}", package, spec.display_line());

        let output = runner::run_streamed(&spec)
            .map_err(|e| BuildError::package(package.as_str(), format!("{e:#}")))?;
        output
            .ensure_success("bakery")
            .map_err(|e| BuildError::package(package.as_str(), format!("{e:#}")))?;

        println!("✓ {}", package);
        built.push(package.clone());
    }

    if options.clean {
        wipe_output_dir(&order.output_dir)?;
    }

    println!(
        "✓ {} package(s) built into {}",
        built.len(),
        order.output_dir.display()
    );
    Ok(BuildReport { built })
}

/// Forward arguments verbatim to the easylzma build script.
///
/// Runs `bash build.sh <args>` with the child's working directory scoped to
/// the `easylzma/` subtree under `base_dir`; this process never chdirs.
/// Returns the child's exit code so the caller can propagate it.
pub fn run_easylzma(base_dir: &Path, args: &[String]) -> Result<i32> {
    let dir = base_dir.join(EASYLZMA_DIR);
    if !dir.is_dir() {
        return Err(BuildError::package(
            "easylzma",
            format!("directory '{}' not found under {}", EASYLZMA_DIR, base_dir.display()),
        ));
    }

    let spec = CommandSpec::new("bash")
        .arg(EASYLZMA_BUILD_SCRIPT)
        .args(args.iter().cloned())
        .current_dir(dir);
    banner(&format!("building easylzma: {}", spec.display_line()));

    let output = runner::run_streamed(&spec)
        .map_err(|e| BuildError::package("easylzma", format!("{e:#}")))?;

    if output.success {
        banner("easylzma build complete");
    } else {
        banner(&format!(
            "easylzma build failed (exit {})",
            output.exit_code.unwrap_or(-1)
        ));
    }
    Ok(output.exit_code.unwrap_or(1))
}

/// Remove the output directory, loudly.
///
/// Refuses a filesystem root outright; a mistyped order must not be able to
/// take the machine with it.
fn wipe_output_dir(dir: &Path) -> Result<()> {
    if dir.as_os_str().is_empty() {
        return Err(BuildError::order("refusing to remove an empty path"));
    }
    if !dir.exists() {
        tracing::debug!("output directory {} absent, nothing to remove", dir.display());
        return Ok(());
    }

    let canonical = dir.canonicalize()?;
    if canonical.parent().is_none() {
        return Err(BuildError::order(format!(
            "refusing to remove filesystem root {}",
            canonical.display()
        )));
    }

    println!("🔧 Removing output directory {}", canonical.display());
    tracing::warn!("removing output directory {}", canonical.display());
    fs::remove_dir_all(&canonical)?;
    Ok(())
}

fn banner(msg: &str) {
    println!("*** {} ***", msg);
}
