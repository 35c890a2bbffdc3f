use std::fs;
use std::process::Command;

fn bin() -> String {
    // Cargo sets this for bin targets in integration tests
    env!("CARGO_BIN_EXE_netqasm").to_string()
}

const PROGRAM: &str = "\
# NETQASM 0.0
# APPID 0
array(2) @0
store @0[0] 7
set R0 3
";

#[test]
fn cli_inspects_program() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("ok.nqasm");
    fs::write(&input, PROGRAM).unwrap();

    let output = Command::new(bin())
        .arg("inspect")
        .arg(input.to_str().unwrap())
        .output()
        .expect("run");

    assert!(
        output.status.success(),
        "stdout:\n{}\nstderr:\n{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Subroutine"));
    assert!(stdout.contains("array(2) @0"));
}

#[test]
fn cli_inspect_emits_json() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("ok.nqasm");
    fs::write(&input, PROGRAM).unwrap();

    let output = Command::new(bin())
        .arg("inspect")
        .arg("--json")
        .arg(input.to_str().unwrap())
        .output()
        .expect("run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"app_id\": 0"));
    assert!(stdout.contains("\"netqasm_version\": \"0.0\""));
}

#[test]
fn cli_runs_program_and_dumps_memory() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("ok.nqasm");
    fs::write(&input, PROGRAM).unwrap();

    let output = Command::new(bin())
        .arg("run")
        .arg(input.to_str().unwrap())
        .output()
        .expect("run");

    assert!(
        output.status.success(),
        "stdout:\n{}\nstderr:\n{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("R0 = 3"));
    assert!(stdout.contains("@0 = [7, -]"));
}

#[test]
fn cli_reports_parse_errors_with_nonzero_exit() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("bad.nqasm");
    fs::write(&input, "# NETQASM 0.0\n# APPID 0\nfrobnicate R0\n").unwrap();

    let output = Command::new(bin())
        .arg("inspect")
        .arg(input.to_str().unwrap())
        .output()
        .expect("run");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("not a known instruction"));
}
