//! bpbuild - Main entry point
//!
//! Thin dispatch over the library: set up logging and signal handlers,
//! parse the CLI, run the requested command, and turn its outcome into an
//! exit code.

use std::path::Path;

use bpbuild::bakery::{self, Bakery};
use bpbuild::cli::{Cli, Commands};
use bpbuild::driver::{self, BuildOptions};
use bpbuild::error::Result;
use bpbuild::harness;
use bpbuild::order::BuildOrder;
use bpbuild::platform::PlatformTarget;
use bpbuild::process_guard::{self, ProcessGuard};
use bpbuild::service_runner::{self, SessionOptions};

/// Initialize tracing with RUST_LOG override support
fn init_logger(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let default_filter = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse_args();
    init_logger(cli.verbose);
    tracing::debug!("bpbuild starting");

    // Ensure bakery builds and service sessions die with us on SIGINT/SIGTERM
    if let Err(e) = process_guard::init_signal_handlers() {
        tracing::warn!("failed to initialize signal handlers: {}", e);
        // Continue anyway - cleanup still happens via Drop
    }

    let code = {
        let _guard = ProcessGuard::new();
        match run(cli.command) {
            Ok(code) => code,
            Err(e) => {
                eprintln!("✗ {}", e);
                1
            }
        }
    };
    std::process::exit(code);
}

fn run(command: Commands) -> Result<i32> {
    match command {
        Commands::Build {
            platform_args,
            order,
            rebuild,
            clean,
            bakery,
        } => {
            let mut build_order = match &order {
                Some(path) => BuildOrder::load_from_file(path)?,
                None => BuildOrder::default(),
            };
            build_order.platform = PlatformTarget::from_cli_args(&platform_args);

            let program = bakery::resolve_program(
                bakery.as_deref(),
                std::env::var(bakery::BAKERY_ENV_VAR).ok().as_deref(),
            );
            let options = BuildOptions { rebuild, clean };

            driver::run_build(&build_order, &Bakery::new(program), &options)?;
            Ok(0)
        }
        Commands::Easylzma { args } => driver::run_easylzma(Path::new("."), &args),
        Commands::Validate { order } => {
            let loaded = BuildOrder::load_from_file(&order)?;
            println!(
                "✓ Order file is valid: {} package(s) into {}",
                loaded.packages.len(),
                loaded.output_dir.display()
            );
            Ok(0)
        }
        Commands::Test {
            service_dir,
            provider_dir,
            runner,
        } => {
            let service_dir = harness::resolve_service_dir(
                service_dir.as_deref(),
                std::env::var(harness::OUTPUT_DIR_ENV_VAR).ok().as_deref(),
            );
            let provider_dir = harness::resolve_provider_dir(
                provider_dir.as_deref(),
                std::env::var(harness::PROVIDER_DIR_ENV_VAR).ok().as_deref(),
            )?;
            let runner = service_runner::resolve_runner(
                runner.as_deref(),
                std::env::var(service_runner::RUNNER_ENV_VAR).ok().as_deref(),
            );

            let opts = SessionOptions {
                runner,
                service_dir,
                provider_dir,
            };
            let report = harness::run_cases(&opts);
            Ok(if report.success() { 0 } else { 1 })
        }
    }
}
