//! Target-platform selection for nested builds.
//!
//! The legacy OS X 10.4 toolchain needs a different SDK, selected by the
//! `BP_OSX_TARGET` environment variable that every nested build reads. The
//! flag is threaded through the build order and set on each child process
//! explicitly; this process's own environment is never touched.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Command-line marker that selects the legacy OS X 10.4 build.
pub const LEGACY_OSX_ARG: &str = "osx10.4";

/// Environment variable read by nested builds to pick the platform SDK.
pub const PLATFORM_ENV_VAR: &str = "BP_OSX_TARGET";

/// Platform target for a build run
// XXX when 10.4 support is dropped, this whole module collapses to nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
pub enum PlatformTarget {
    #[default]
    #[strum(serialize = "default")]
    #[serde(rename = "default")]
    Default,
    #[strum(serialize = "osx10.4")]
    #[serde(rename = "osx10.4")]
    LegacyOsx,
}

impl PlatformTarget {
    /// Resolve the platform from the raw platform-argument list.
    ///
    /// `LegacyOsx` is selected only when the list is exactly one argument
    /// equal to `osx10.4`. Every other list resolves silently to `Default`,
    /// including lists where `osx10.4` appears alongside other values.
    /// Known sharp edge, kept for compatibility with what existing build
    /// invocations expect.
    pub fn from_cli_args(args: &[String]) -> Self {
        if args.len() == 1 && args[0] == LEGACY_OSX_ARG {
            PlatformTarget::LegacyOsx
        } else {
            PlatformTarget::Default
        }
    }

    /// Value for `BP_OSX_TARGET` on child processes.
    ///
    /// The empty string is deliberate: nested builds distinguish "unset by an
    /// old driver" from "explicitly not the legacy target".
    pub fn env_value(&self) -> &'static str {
        match self {
            PlatformTarget::Default => "",
            PlatformTarget::LegacyOsx => "10.4",
        }
    }

    /// The `(name, value)` environment pair to set on every nested build.
    pub fn env_pair(&self) -> (&'static str, &'static str) {
        (PLATFORM_ENV_VAR, self.env_value())
    }

    /// True when building for the legacy OS X 10.4 target
    pub fn is_legacy(&self) -> bool {
        matches!(self, PlatformTarget::LegacyOsx)
    }
}
