//! Test helper binary for death pact integration tests
//!
//! Simulates a build driver process that spawns external children (bakery
//! invocations, service runners) with the death pact. The test harness
//! spawns this helper, then kills it to verify the children die.
//!
//! Usage:
//!   death_pact_helper --mode <mode> --pid-file <path> [--count <n>]
//!
//! Modes:
//!   spawn-and-wait: Spawn children, write PIDs to file, wait forever
//!   spawn-and-panic: Spawn children, write PIDs to file, then panic

use std::env;
use std::fs::File;
use std::io::Write;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use bpbuild::process_guard::CommandProcessGroup;

fn main() {
    let args: Vec<String> = env::args().collect();

    let mut mode = "spawn-and-wait";
    let mut pid_file = "/tmp/death_pact_pids.txt";
    let mut child_count = 3;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--mode" => {
                mode = args.get(i + 1).map(|s| s.as_str()).unwrap_or(mode);
                i += 2;
            }
            "--pid-file" => {
                pid_file = args.get(i + 1).map(|s| s.as_str()).unwrap_or(pid_file);
                i += 2;
            }
            "--count" => {
                child_count = args
                    .get(i + 1)
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(child_count);
                i += 2;
            }
            _ => {
                i += 1;
            }
        }
    }

    match mode {
        "spawn-and-wait" => spawn_and_wait(pid_file, child_count),
        "spawn-and-panic" => spawn_and_panic(pid_file, child_count),
        _ => {
            eprintln!("Unknown mode: {}", mode);
            std::process::exit(1);
        }
    }
}

/// Spawn children with death pact, write PIDs, wait forever
fn spawn_and_wait(pid_file: &str, count: usize) {
    let pids = spawn_children(count);
    write_pids(pid_file, &pids);

    // Signal readiness
    println!("READY");

    // Wait forever (until killed)
    loop {
        thread::sleep(Duration::from_secs(3600));
    }
}

/// Spawn children with death pact, write PIDs, then panic
fn spawn_and_panic(pid_file: &str, count: usize) {
    let pids = spawn_children(count);
    write_pids(pid_file, &pids);

    // Signal readiness
    println!("READY");

    // Small delay to ensure PIDs are written
    thread::sleep(Duration::from_millis(100));

    // This tests whether children survive a Rust panic
    panic!("Intentional panic for death pact test");
}

/// Spawn stand-in children the way the driver spawns bakery invocations
fn spawn_children(count: usize) -> Vec<u32> {
    let mut pids = Vec::new();

    for i in 0..count {
        let child = Command::new("sleep")
            .arg(format!("{}", 600 + i))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .stdin(Stdio::null())
            .in_new_process_group()
            .spawn()
            .expect("Failed to spawn sleep child");

        pids.push(child.id());
    }

    // Allow children to start
    thread::sleep(Duration::from_millis(100));

    pids
}

/// Write PIDs to file, one per line
fn write_pids(path: &str, pids: &[u32]) {
    let mut file = File::create(path).expect("Failed to create PID file");
    for pid in pids {
        writeln!(file, "{}", pid).expect("Failed to write PID");
    }
    file.flush().expect("Failed to flush PID file");
}
