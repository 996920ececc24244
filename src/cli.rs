use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// bpbuild - build driver and test harness for the BrowserPlus LZMA service
#[derive(Parser)]
#[command(name = "bpbuild")]
#[command(about = "Builds the LZMA service's bundled dependencies and tests the built service")]
#[command(version)]
pub struct Cli {
    /// Verbose diagnostics (sets the default log filter to debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build every package in the order, stopping at the first failure
    Build {
        /// Raw platform arguments; exactly `osx10.4` selects the legacy
        /// OS X 10.4 target, anything else builds the default target
        platform_args: Vec<String>,

        /// Path to a build-order file (JSON); defaults to the built-in order
        #[arg(long)]
        order: Option<PathBuf>,

        /// Remove the output directory before building (destructive)
        #[arg(long)]
        rebuild: bool,

        /// Remove the output directory after a fully successful build
        /// (destructive)
        #[arg(long)]
        clean: bool,

        /// Bakery executable to use (overrides BP_BAKERY and PATH lookup)
        #[arg(long)]
        bakery: Option<PathBuf>,
    },
    /// Forward arguments verbatim to the easylzma build script
    Easylzma {
        /// Arguments passed through unchanged, hyphens included
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Validate a build-order file
    Validate {
        /// Path to the order file to validate
        order: PathBuf,
    },
    /// Run the service test cases against a built service
    Test {
        /// Directory of the built service (overrides BP_OUTPUT_DIR)
        #[arg(long)]
        service_dir: Option<PathBuf>,

        /// Provider service directory, as a path or file:// URL
        /// (overrides BP_PROVIDER_DIR)
        #[arg(long)]
        provider_dir: Option<String>,

        /// Service-runner executable (overrides BP_SERVICE_RUNNER and PATH
        /// lookup)
        #[arg(long)]
        runner: Option<PathBuf>,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        <Self as clap::Parser>::parse()
    }
}
