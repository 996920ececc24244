//! Process lifecycle management for child processes
//!
//! Bakery builds and service-runner sessions run as children that can
//! outlive a crashed or interrupted driver. An orphaned bakery build keeps
//! writing into the output directory; an orphaned service instance keeps
//! hold of the built artifact under test.
//!
//! Children are therefore spawned into their own process groups with a
//! parent-death signal, tracked in a global registry, and torn down
//! (SIGTERM, grace period, SIGKILL) on Drop and on SIGINT/SIGTERM/SIGHUP.

use nix::libc;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

/// Global registry of child process IDs
static CHILD_REGISTRY: OnceLock<Arc<Mutex<ChildRegistry>>> = OnceLock::new();

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Registry tracking all spawned child processes
#[derive(Debug, Default)]
pub struct ChildRegistry {
    /// Child PIDs currently running
    pids: HashSet<u32>,
    /// Whether cleanup has already been initiated (prevent double-cleanup)
    cleanup_initiated: bool,
}

impl ChildRegistry {
    /// Get or create the global child registry
    pub fn global() -> Arc<Mutex<ChildRegistry>> {
        CHILD_REGISTRY
            .get_or_init(|| Arc::new(Mutex::new(ChildRegistry::default())))
            .clone()
    }

    /// Register a new child process
    pub fn register(&mut self, pid: u32) {
        self.pids.insert(pid);
        tracing::debug!("registered child process {}", pid);
    }

    /// Unregister a child process (called when it exits normally)
    pub fn unregister(&mut self, pid: u32) {
        self.pids.remove(&pid);
        tracing::debug!("unregistered child process {}", pid);
    }

    /// Get count of tracked children
    ///
    /// Useful for debugging and tests to verify process registration.
    #[allow(dead_code)] // Test/debug utility
    pub fn count(&self) -> usize {
        self.pids.len()
    }

    /// Terminate all tracked child processes.
    ///
    /// SIGTERM goes to every process group first so a bakery's own children
    /// (compilers, shells) see it too; anything still alive after
    /// `grace_period` gets SIGKILL.
    pub fn terminate_all(&mut self, grace_period: Duration) {
        if self.cleanup_initiated {
            return;
        }
        self.cleanup_initiated = true;

        if self.pids.is_empty() {
            return;
        }
        tracing::info!("terminating {} child process(es)", self.pids.len());

        let pids: Vec<u32> = self.pids.iter().copied().collect();
        for &pid in &pids {
            signal_group_then_pid(pid, Signal::SIGTERM);
        }

        let deadline = Instant::now() + grace_period;
        while Instant::now() < deadline {
            if pids.iter().all(|&pid| !is_process_alive(pid)) {
                tracing::debug!("all children exited within the grace period");
                self.pids.clear();
                return;
            }
            std::thread::sleep(POLL_INTERVAL);
        }

        for &pid in &pids {
            if is_process_alive(pid) {
                tracing::warn!("child {} survived SIGTERM, sending SIGKILL", pid);
                signal_group_then_pid(pid, Signal::SIGKILL);
            }
        }
        self.pids.clear();
    }
}

/// Terminate one child's process group: SIGTERM, bounded wait, then SIGKILL.
///
/// Returns true when the child went down inside the grace period. Used for
/// scoped teardown of a single service session without touching the rest of
/// the registry.
pub fn terminate_group(pid: u32, grace_period: Duration) -> bool {
    signal_group_then_pid(pid, Signal::SIGTERM);

    let deadline = Instant::now() + grace_period;
    while Instant::now() < deadline {
        if !is_process_alive(pid) {
            return true;
        }
        std::thread::sleep(POLL_INTERVAL);
    }

    tracing::warn!("process group {} survived SIGTERM, sending SIGKILL", pid);
    signal_group_then_pid(pid, Signal::SIGKILL);
    false
}

/// Signal the whole process group, falling back to a direct signal when the
/// group is already gone.
fn signal_group_then_pid(pid: u32, signal: Signal) {
    if let Err(e) = send_signal_to_group(pid, signal) {
        tracing::debug!("group signal to {} failed ({}), trying pid", pid, e);
        let _ = send_signal(pid, signal);
    }
}

/// Send a signal to a process
fn send_signal(pid: u32, signal: Signal) -> Result<(), nix::Error> {
    signal::kill(Pid::from_raw(pid as i32), signal)
}

/// Send a signal to an entire process group (negative PID form)
fn send_signal_to_group(pgid: u32, signal: Signal) -> Result<(), nix::Error> {
    signal::kill(Pid::from_raw(-(pgid as i32)), signal)
}

/// Check if a process is still alive (not dead or zombie)
///
/// Zombies can still receive signals but aren't running, so they count as
/// dead here. Public because integration tests probe liveness through it.
pub fn is_process_alive(pid: u32) -> bool {
    if signal::kill(Pid::from_raw(pid as i32), None).is_err() {
        return false;
    }

    // Field 3 of /proc/pid/stat is the state: Z=zombie, X=dead
    if let Ok(stat) = std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        let fields: Vec<&str> = stat.split_whitespace().collect();
        if fields.len() > 2 {
            return !matches!(fields[2], "Z" | "X");
        }
    }

    // If we can't read /proc, assume alive
    true
}

/// RAII guard that terminates all children on drop
///
/// Held by the command entry points so every exit path, including error
/// returns, tears the children down.
pub struct ProcessGuard {
    registry: Arc<Mutex<ChildRegistry>>,
}

impl ProcessGuard {
    /// Create a new process guard attached to the global registry
    pub fn new() -> Self {
        Self {
            registry: ChildRegistry::global(),
        }
    }
}

impl Default for ProcessGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        tracing::debug!("process guard dropped, initiating cleanup");
        if let Ok(mut registry) = self.registry.lock() {
            registry.terminate_all(Duration::from_secs(5));
        }
    }
}

/// Initialize global signal handlers for graceful shutdown
///
/// Handles SIGINT (Ctrl+C), SIGTERM, and SIGHUP. Call once at program start.
pub fn init_signal_handlers() -> Result<(), std::io::Error> {
    use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;
    use std::thread;

    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP])?;

    thread::spawn(move || {
        for sig in signals.forever() {
            let signal_name = match sig {
                SIGINT => "SIGINT",
                SIGTERM => "SIGTERM",
                SIGHUP => "SIGHUP",
                _ => "UNKNOWN",
            };
            tracing::info!("received {}, cleaning up children", signal_name);

            if let Ok(mut registry) = ChildRegistry::global().lock() {
                registry.terminate_all(Duration::from_secs(3));
            }

            // Conventional exit code for death-by-signal
            std::process::exit(128 + sig);
        }
    });

    Ok(())
}

/// Extension trait for std::process::Command to set up process groups
pub trait CommandProcessGroup {
    /// Configure the command to run in its own process group so the entire
    /// process tree can be killed with a single group signal.
    fn in_new_process_group(&mut self) -> &mut Self;
}

impl CommandProcessGroup for std::process::Command {
    fn in_new_process_group(&mut self) -> &mut Self {
        use std::os::unix::process::CommandExt;
        unsafe {
            self.pre_exec(|| {
                // Become leader of a fresh process group (PGID = own PID)
                nix::unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0))
                    .map_err(std::io::Error::other)?;

                // Death pact: if the driver dies mid-run, the kernel delivers
                // SIGTERM here instead of leaving a bakery build or service
                // instance running unattended.
                if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) == -1 {
                    return Err(std::io::Error::last_os_error());
                }

                Ok(())
            });
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[test]
    fn test_registry_register_unregister() {
        let mut registry = ChildRegistry::default();

        registry.register(1234);
        assert_eq!(registry.count(), 1);

        registry.register(5678);
        assert_eq!(registry.count(), 2);

        registry.unregister(1234);
        assert_eq!(registry.count(), 1);

        registry.unregister(5678);
        assert_eq!(registry.count(), 0);
    }

    /// Wait for a process to terminate (reaping the zombie when we own it)
    fn wait_for_process_death(pid: u32, timeout: Duration) -> bool {
        use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};

        let start = Instant::now();
        let nix_pid = Pid::from_raw(pid as i32);

        while start.elapsed() < timeout {
            match waitpid(nix_pid, Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::Exited(_, _)) | Ok(WaitStatus::Signaled(_, _, _)) => {
                    return true;
                }
                Ok(WaitStatus::StillAlive) => {}
                Err(nix::errno::Errno::ECHILD) => {
                    if !is_process_alive(pid) {
                        return true;
                    }
                }
                _ => {}
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn test_terminate_all_kills_real_process() {
        use std::process::Command;

        let child = Command::new("bash")
            .args(["-c", "sleep 60"])
            .spawn()
            .expect("Failed to spawn bash sleep process");
        let pid = child.id();

        // Fresh registry so the global one is untouched
        let mut registry = ChildRegistry::default();
        registry.register(pid);

        assert!(is_process_alive(pid), "Process should be alive after spawn");

        registry.terminate_all(Duration::from_millis(500));

        let died = wait_for_process_death(pid, Duration::from_secs(2));
        assert!(died, "Process should be dead after terminate_all");
    }

    #[test]
    fn test_terminate_group_kills_group_members() {
        use std::process::Command;

        // The child forks its own grandchild; killing the group must take
        // both down.
        let child = Command::new("bash")
            .args(["-c", "sleep 60 & wait"])
            .in_new_process_group()
            .spawn()
            .expect("Failed to spawn bash in new group");
        let pid = child.id();

        std::thread::sleep(Duration::from_millis(100));
        assert!(is_process_alive(pid));

        terminate_group(pid, Duration::from_secs(2));

        let died = wait_for_process_death(pid, Duration::from_secs(2));
        assert!(died, "Group leader should be dead after terminate_group");
    }

    #[test]
    fn test_terminate_all_handles_already_dead_process() {
        use std::process::Command;

        let mut child = Command::new("bash")
            .args(["-c", "exit 0"])
            .spawn()
            .expect("Failed to spawn bash");
        let pid = child.id();
        let _ = child.wait();

        let mut registry = ChildRegistry::default();
        registry.register(pid);

        // Must not hang or panic on the reaped PID
        registry.terminate_all(Duration::from_millis(100));
    }

    #[test]
    fn test_sigterm_before_sigkill() {
        use std::process::Command;

        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let marker = dir.path().join("trapped");

        // Traps SIGTERM and exits cleanly; SIGKILL would bypass the trap.
        // The short sleep loop matters: bash defers traps until the current
        // foreground command finishes, so a single long sleep would stall
        // the trap past the grace period.
        let script = format!(
            "trap 'touch {}; exit 0' TERM; while :; do sleep 0.1; done",
            marker.display()
        );
        let child = Command::new("bash")
            .args(["-c", &script])
            .spawn()
            .expect("Failed to spawn bash with trap");
        let pid = child.id();

        let mut registry = ChildRegistry::default();
        registry.register(pid);

        std::thread::sleep(Duration::from_millis(100));
        registry.terminate_all(Duration::from_secs(2));

        let died = wait_for_process_death(pid, Duration::from_secs(3));
        assert!(died, "Process should exit from SIGTERM trap");
        assert!(marker.exists(), "TERM trap should have run, not SIGKILL");
    }

    #[test]
    fn test_send_signal_to_nonexistent_pid() {
        let result = send_signal(999999, Signal::SIGTERM);
        assert!(result.is_err(), "Should fail for nonexistent PID");
    }

    #[test]
    fn test_is_process_alive_nonexistent() {
        assert!(!is_process_alive(999999));
    }

    #[test]
    fn test_cleanup_initiated_flag_prevents_double_cleanup() {
        use std::process::Command;

        // Register a pid that has already been reaped so no live process
        // can be on the receiving end of the cleanup signals.
        let mut child = Command::new("true").spawn().expect("Failed to spawn");
        let pid = child.id();
        child.wait().expect("Failed to wait");

        let mut registry = ChildRegistry::default();
        registry.register(pid);

        registry.terminate_all(Duration::from_millis(10));
        assert!(registry.cleanup_initiated);

        registry.terminate_all(Duration::from_millis(10));
        assert!(registry.cleanup_initiated);
    }
}
