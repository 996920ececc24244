//! External command execution
//!
//! The one sanctioned way to run a collaborator to completion. Every spawn
//! goes through here so that:
//!
//! - the child lands in its own process group (death pact compliance)
//! - its PID is registered for cleanup on parent exit
//! - its output is streamed to the console line by line and captured for
//!   error reporting
//!
//! Service-runner sessions spawn through [`CommandSpec::to_command`] as well
//! but manage their own lifetime; see `service_runner`.

use crate::process_guard::{ChildRegistry, CommandProcessGroup};
use anyhow::{Context, Result};
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};

/// Description of one external command invocation.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    /// Working directory for the child only; the parent never chdirs.
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Build the `Command`, including process group isolation.
    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }
        cmd.in_new_process_group();
        cmd
    }

    /// One-line rendering for banners and error messages.
    pub fn display_line(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Output from a completed external command.
#[derive(Debug, Clone)]
pub struct RunOutput {
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Exit code (None if terminated by signal).
    pub exit_code: Option<i32>,
    /// Whether the command exited successfully (exit code 0).
    pub success: bool,
}

impl RunOutput {
    /// Check that the command succeeded and return an error if not.
    pub fn ensure_success(&self, context: &str) -> Result<()> {
        if self.success {
            Ok(())
        } else {
            let code = self.exit_code.unwrap_or(-1);
            let tail = last_lines(&self.stderr, 3);
            if tail.is_empty() {
                anyhow::bail!("{} failed (exit code {})", context, code)
            } else {
                anyhow::bail!("{} failed (exit code {}): {}", context, code, tail)
            }
        }
    }
}

/// Run an external command to completion.
///
/// The child joins a new process group and is registered for cleanup while
/// it runs. Output is echoed to this process's stdout/stderr as it arrives
/// and captured into the returned [`RunOutput`]. A non-zero exit is NOT an
/// `Err`; callers decide what failure means via `ensure_success`.
pub fn run_streamed(spec: &CommandSpec) -> Result<RunOutput> {
    tracing::info!(
        "run: {} env={:?} cwd={:?}",
        spec.display_line(),
        spec.env,
        spec.cwd
    );

    let mut cmd = spec.to_command();
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd
        .spawn()
        .with_context(|| format!("failed to spawn {}", spec.program.display()))?;
    let pid = child.id();

    {
        let registry = ChildRegistry::global();
        // Lock is held briefly, panic is acceptable if poisoned
        let mut guard = registry.lock().expect("ChildRegistry mutex poisoned");
        guard.register(pid);
    }

    let stdout_pump = child.stdout.take().map(|s| spawn_line_pump(s, false));
    let stderr_pump = child.stderr.take().map(|s| spawn_line_pump(s, true));

    let status = child
        .wait()
        .with_context(|| format!("failed waiting for {}", spec.program.display()))?;

    {
        let registry = ChildRegistry::global();
        let mut guard = registry.lock().expect("ChildRegistry mutex poisoned");
        guard.unregister(pid);
    }

    let stdout = join_pump(stdout_pump);
    let stderr = join_pump(stderr_pump);

    tracing::debug!(
        "{} exited with status {:?}",
        spec.program.display(),
        status.code()
    );

    Ok(RunOutput {
        stdout,
        stderr,
        exit_code: status.code(),
        success: status.success(),
    })
}

/// Echo lines from a child stream as they arrive, keeping a copy.
fn spawn_line_pump<R: Read + Send + 'static>(
    stream: R,
    to_stderr: bool,
) -> JoinHandle<Vec<String>> {
    thread::spawn(move || {
        let reader = BufReader::new(stream);
        let mut lines = Vec::new();
        for line in reader.lines().map_while(std::result::Result::ok) {
            if to_stderr {
                eprintln!("{}", line);
            } else {
                println!("{}", line);
            }
            lines.push(line);
        }
        lines
    })
}

fn join_pump(pump: Option<JoinHandle<Vec<String>>>) -> String {
    pump.and_then(|h| h.join().ok())
        .unwrap_or_default()
        .join("\n")
}

fn last_lines(text: &str, count: usize) -> String {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(count);
    lines[start..].join(" / ")
}
