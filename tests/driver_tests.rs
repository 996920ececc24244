//! Build Driver Integration Tests
//!
//! Exercises `run_build` end to end against stub bakery executables:
//! - Packages are built in declared order, one bakery invocation each
//! - A failing package stops the run before later packages start
//! - Rebuild wipes the output directory before the first package
//! - Clean removes the output directory after a successful run
//! - The platform target reaches the bakery through its environment only

use std::collections::BTreeMap;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use bpbuild::bakery::Bakery;
use bpbuild::driver::{BuildOptions, run_build};
use bpbuild::order::BuildOrder;
use bpbuild::platform::PlatformTarget;
use tempfile::TempDir;

// =============================================================================
// Helpers
// =============================================================================

/// Writes an executable stub bakery script into `dir` and returns its path.
fn write_stub_bakery(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("bakery");
    let script = format!("#!/usr/bin/env bash\n{body}\n");
    fs::write(&path, script).expect("Should write stub bakery");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
        .expect("Should mark stub bakery executable");
    path
}

/// A minimal valid order building `packages` into `output_dir`.
fn order_for(output_dir: &Path, packages: &[&str]) -> BuildOrder {
    BuildOrder {
        output_dir: output_dir.to_path_buf(),
        packages: packages.iter().map(|p| (*p).to_string()).collect(),
        use_source: BTreeMap::new(),
        use_recipe: BTreeMap::new(),
        verbose: false,
        platform: PlatformTarget::Default,
    }
}

fn read_log(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

// =============================================================================
// Invocation Order Tests
// =============================================================================

#[test]
fn test_packages_build_in_declared_order() {
    let temp = TempDir::new().expect("Should create temp dir");
    let log = temp.path().join("invocations.log");
    let bakery_path = write_stub_bakery(
        temp.path(),
        &format!("echo \"$2\" >> \"{}\"", log.display()),
    );

    let out = temp.path().join("dist");
    let order = order_for(&out, &["easylzma", "boost", "bp-file"]);
    let report = run_build(&order, &Bakery::new(bakery_path), &BuildOptions::default())
        .expect("Build should succeed with a zero-exit bakery");

    assert_eq!(
        read_log(&log),
        vec!["easylzma", "boost", "bp-file"],
        "Bakery should be invoked once per package, in declared order"
    );
    assert_eq!(report.built, vec!["easylzma", "boost", "bp-file"]);
}

#[test]
fn test_bakery_argv_carries_output_dir_and_overrides() {
    let temp = TempDir::new().expect("Should create temp dir");
    let log = temp.path().join("invocations.log");
    let bakery_path = write_stub_bakery(
        temp.path(),
        &format!("echo \"$*\" >> \"{}\"", log.display()),
    );

    let out = temp.path().join("dist");
    let source = temp.path().join("bp-file");
    let recipe = source.join("recipe.rb");
    let mut order = order_for(&out, &["bp-file"]);
    order.use_source.insert("bp-file".to_string(), source.clone());
    order.use_recipe.insert("bp-file".to_string(), recipe.clone());
    order.verbose = true;

    run_build(&order, &Bakery::new(bakery_path), &BuildOptions::default())
        .expect("Build should succeed");

    let lines = read_log(&log);
    assert_eq!(lines.len(), 1, "Exactly one bakery invocation expected");
    assert_eq!(
        lines[0],
        format!(
            "build bp-file --output-dir {} --source {} --recipe {} --verbose",
            out.display(),
            source.display(),
            recipe.display()
        )
    );
}

// =============================================================================
// Fail-Fast Tests
// =============================================================================

#[test]
fn test_failing_package_stops_the_run() {
    let temp = TempDir::new().expect("Should create temp dir");
    let log = temp.path().join("invocations.log");
    let body = format!(
        r#"echo "$2" >> "{log}"
if [ "$2" = "boost" ]; then
  echo "recipe exploded" >&2
  exit 3
fi"#,
        log = log.display()
    );
    let bakery_path = write_stub_bakery(temp.path(), &body);

    let out = temp.path().join("dist");
    let order = order_for(&out, &["easylzma", "boost", "bp-file"]);
    let err = run_build(&order, &Bakery::new(bakery_path), &BuildOptions::default())
        .expect_err("boost failure should abort the build");

    assert_eq!(err.failed_package(), Some("boost"));
    assert!(
        err.to_string().contains("recipe exploded"),
        "Error should carry the bakery's stderr tail, got: {err}"
    );
    assert_eq!(
        read_log(&log),
        vec!["easylzma", "boost"],
        "bp-file must never be attempted after boost fails"
    );
}

// =============================================================================
// Wipe Timing Tests
// =============================================================================

#[test]
fn test_rebuild_wipes_output_before_first_package() {
    let temp = TempDir::new().expect("Should create temp dir");
    let out = temp.path().join("dist");
    fs::create_dir_all(&out).expect("Should create output dir");
    fs::write(out.join("stale.txt"), "old artifact").expect("Should plant stale file");

    let log = temp.path().join("invocations.log");
    let body = format!(
        r#"if [ -e "{stale}" ]; then echo "stale-present" >> "{log}"; else echo "stale-gone" >> "{log}"; fi"#,
        stale = out.join("stale.txt").display(),
        log = log.display()
    );
    let bakery_path = write_stub_bakery(temp.path(), &body);

    let order = order_for(&out, &["easylzma"]);
    let options = BuildOptions {
        rebuild: true,
        clean: false,
    };
    run_build(&order, &Bakery::new(bakery_path), &options).expect("Build should succeed");

    assert_eq!(
        read_log(&log),
        vec!["stale-gone"],
        "The stale artifact must be gone before the first package builds"
    );
    assert!(!out.join("stale.txt").exists());
}

#[test]
fn test_clean_removes_output_after_successful_build() {
    let temp = TempDir::new().expect("Should create temp dir");
    let out = temp.path().join("dist");
    let log = temp.path().join("invocations.log");
    // The stub drops an artifact into the output dir, like a real bakery run.
    let body = format!(
        r#"mkdir -p "{out}"
touch "{out}/artifact.bpkg"
echo "$2" >> "{log}""#,
        out = out.display(),
        log = log.display()
    );
    let bakery_path = write_stub_bakery(temp.path(), &body);

    let order = order_for(&out, &["easylzma", "boost"]);
    let options = BuildOptions {
        rebuild: false,
        clean: true,
    };
    run_build(&order, &Bakery::new(bakery_path), &options).expect("Build should succeed");

    assert_eq!(
        read_log(&log),
        vec!["easylzma", "boost"],
        "Every package should build before the clean wipe"
    );
    assert!(
        !out.exists(),
        "Clean should remove the output directory after the build"
    );
}

#[test]
fn test_output_dir_untouched_without_wipe_flags() {
    let temp = TempDir::new().expect("Should create temp dir");
    let out = temp.path().join("dist");
    fs::create_dir_all(&out).expect("Should create output dir");
    fs::write(out.join("keep.txt"), "prior artifact").expect("Should plant file");

    let bakery_path = write_stub_bakery(temp.path(), "exit 0");
    let order = order_for(&out, &["easylzma"]);
    run_build(&order, &Bakery::new(bakery_path), &BuildOptions::default())
        .expect("Build should succeed");

    assert!(
        out.join("keep.txt").exists(),
        "Prior artifacts must survive a plain build"
    );
}

// =============================================================================
// Platform Environment Tests
// =============================================================================

#[test]
fn test_legacy_platform_reaches_bakery_environment() {
    let temp = TempDir::new().expect("Should create temp dir");
    let log = temp.path().join("invocations.log");
    let bakery_path = write_stub_bakery(
        temp.path(),
        &format!("echo \"target=$BP_OSX_TARGET\" >> \"{}\"", log.display()),
    );

    let out = temp.path().join("dist");
    let mut order = order_for(&out, &["easylzma"]);
    order.platform = PlatformTarget::LegacyOsx;
    run_build(&order, &Bakery::new(bakery_path), &BuildOptions::default())
        .expect("Build should succeed");

    assert_eq!(read_log(&log), vec!["target=10.4"]);
}

#[test]
fn test_default_platform_exports_empty_target() {
    let temp = TempDir::new().expect("Should create temp dir");
    let log = temp.path().join("invocations.log");
    let bakery_path = write_stub_bakery(
        temp.path(),
        &format!("echo \"target=$BP_OSX_TARGET\" >> \"{}\"", log.display()),
    );

    let out = temp.path().join("dist");
    let order = order_for(&out, &["easylzma"]);
    run_build(&order, &Bakery::new(bakery_path), &BuildOptions::default())
        .expect("Build should succeed");

    assert_eq!(
        read_log(&log),
        vec!["target="],
        "Default builds must export an empty target, overriding any inherited value"
    );
}

// =============================================================================
// Order Validation Tests
// =============================================================================

#[test]
fn test_invalid_order_fails_before_any_invocation() {
    let temp = TempDir::new().expect("Should create temp dir");
    let log = temp.path().join("invocations.log");
    let bakery_path = write_stub_bakery(
        temp.path(),
        &format!("echo \"$2\" >> \"{}\"", log.display()),
    );

    let out = temp.path().join("dist");
    let mut order = order_for(&out, &["easylzma"]);
    order
        .use_source
        .insert("ghost".to_string(), PathBuf::from("ghost-src"));

    let err = run_build(&order, &Bakery::new(bakery_path), &BuildOptions::default())
        .expect_err("Undeclared override should fail validation");
    assert!(err.to_string().contains("ghost"), "Got: {err}");
    assert!(
        read_log(&log).is_empty(),
        "A rejected order must never reach the bakery"
    );
}
