//! Scoped sessions against the external service runner
//!
//! The service runner (`bp_service_runner`, a product of the
//! `service_testing` package) loads a built service artifact and hosts it
//! for the duration of one test case. A session is only usable inside
//! [`run_service`]'s closure; teardown runs on every exit path, including
//! case errors and panics, so a failing test never leaves a service
//! instance behind.

use anyhow::Context;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Child, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{BuildError, Result};
use crate::process_guard::{self, ChildRegistry};
use crate::runner::CommandSpec;

/// Environment variable overriding the service-runner executable.
pub const RUNNER_ENV_VAR: &str = "BP_SERVICE_RUNNER";

/// Program name resolved on PATH when nothing overrides it.
pub const DEFAULT_RUNNER_PROGRAM: &str = "bp_service_runner";

/// Stdout line prefix the runner prints once the service is loaded.
pub const READY_LINE: &str = "SERVICE READY";

/// Upper bound on waiting for the ready line. A runner that can't load the
/// service within this window is torn down and reported, not waited on
/// forever.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Resolve the runner executable: explicit flag, then `BP_SERVICE_RUNNER`,
/// then `bp_service_runner` on PATH.
pub fn resolve_runner(flag: Option<&Path>, env_override: Option<&str>) -> PathBuf {
    if let Some(path) = flag {
        return path.to_path_buf();
    }
    match env_override {
        Some(value) if !value.trim().is_empty() => PathBuf::from(value),
        _ => PathBuf::from(DEFAULT_RUNNER_PROGRAM),
    }
}

/// Everything needed to launch one session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub runner: PathBuf,
    /// Directory holding the built service artifact under test.
    pub service_dir: PathBuf,
    /// Optional directory of the provider service, passed through verbatim.
    pub provider_dir: Option<PathBuf>,
}

/// A live service hosted by the runner.
///
/// Handles only exist inside [`run_service`]; there is no way to obtain one
/// that outlives its teardown.
pub struct ServiceSession {
    child: Child,
    pid: u32,
    stdout_rx: Receiver<String>,
    terminated: bool,
}

impl ServiceSession {
    fn launch(opts: &SessionOptions) -> Result<Self> {
        let mut spec = CommandSpec::new(&opts.runner).arg(opts.service_dir.display().to_string());
        if let Some(provider) = &opts.provider_dir {
            spec = spec.arg(provider.display().to_string());
        }
        tracing::info!("launching service runner: {}", spec.display_line());

        let mut cmd = spec.to_command();
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());

        let mut child = cmd
            .spawn()
            .with_context(|| format!("failed to spawn {}", opts.runner.display()))
            .map_err(|e| BuildError::service(format!("{e:#}")))?;
        let pid = child.id();

        {
            let registry = ChildRegistry::global();
            let mut guard = registry.lock().expect("ChildRegistry mutex poisoned");
            guard.register(pid);
        }

        let (tx, stdout_rx) = mpsc::channel();
        if let Some(stdout) = child.stdout.take() {
            thread::spawn(move || {
                let reader = BufReader::new(stdout);
                for line in reader.lines().map_while(std::result::Result::ok) {
                    tracing::debug!("runner: {}", line);
                    // receiver may be gone during teardown; keep draining so
                    // the runner never blocks on a full pipe
                    let _ = tx.send(line);
                }
            });
        }

        let mut session = Self {
            child,
            pid,
            stdout_rx,
            terminated: false,
        };
        // Drop tears the child down if the handshake fails
        session.wait_ready(HANDSHAKE_TIMEOUT)?;
        Ok(session)
    }

    /// Block until the runner reports the service loaded.
    fn wait_ready(&mut self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.stdout_rx.recv_timeout(remaining) {
                Ok(line) if line.trim().starts_with(READY_LINE) => {
                    tracing::debug!("service ready (pid {})", self.pid);
                    return Ok(());
                }
                Ok(_) => continue,
                Err(RecvTimeoutError::Timeout) => {
                    return Err(BuildError::service(format!(
                        "service runner not ready after {}s",
                        timeout.as_secs()
                    )));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    let detail = match self.child.try_wait() {
                        Ok(Some(status)) => format!("exited with {status} before becoming ready"),
                        _ => "closed stdout before becoming ready".to_string(),
                    };
                    return Err(BuildError::service(format!("service runner {detail}")));
                }
            }
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Tear the session down: SIGTERM the runner's process group, wait out
    /// the grace period, SIGKILL if needed, then reap. Idempotent.
    fn shutdown(&mut self) {
        if self.terminated {
            return;
        }
        self.terminated = true;

        tracing::debug!("shutting down service session (pid {})", self.pid);
        process_guard::terminate_group(self.pid, SHUTDOWN_GRACE);
        let _ = self.child.wait();

        let registry = ChildRegistry::global();
        if let Ok(mut guard) = registry.lock() {
            guard.unregister(self.pid);
        }
    }
}

impl Drop for ServiceSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Launch a session, hand it to `f`, and tear it down afterwards.
///
/// The closure's error (or value) is returned after teardown completes, so
/// callers can treat a failing case like any other error without leaking
/// the service instance.
pub fn run_service<T, F>(opts: &SessionOptions, f: F) -> Result<T>
where
    F: FnOnce(&mut ServiceSession) -> Result<T>,
{
    let mut session = ServiceSession::launch(opts)?;
    let result = f(&mut session);
    session.shutdown();
    result
}
