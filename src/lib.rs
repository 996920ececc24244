//! bpbuild Library
//!
//! Build orchestration and integration-test tooling for the BrowserPlus
//! LZMA service and its bundled dependencies. The heavy lifting is done by
//! external collaborators (the bakery packaging tool and the service
//! runner); this crate sequences them, keeps their child processes on a
//! leash, and reports what happened.

pub mod bakery;
pub mod cli;
pub mod driver;
pub mod error;
pub mod harness;
pub mod order;
pub mod platform;
pub mod process_guard;
pub mod runner;
pub mod service_runner;
pub mod urlutil;

// Re-export main types for convenience
pub use bakery::Bakery;
pub use driver::{BuildOptions, BuildReport};
pub use error::{BuildError, Result};
pub use harness::{CaseStatus, HarnessReport};
pub use order::{BuildOrder, BuildProcedure};
pub use platform::PlatformTarget;
pub use process_guard::{ChildRegistry, CommandProcessGroup, ProcessGuard};
pub use runner::{CommandSpec, RunOutput};
pub use service_runner::{ServiceSession, SessionOptions, run_service};
