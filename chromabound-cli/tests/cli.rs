//! Binary-level tests: the real `chromabound` executable, spawning real
//! worker processes over pipes.

#![cfg(unix)]

use std::path::PathBuf;
use std::process::Command;

fn binary() -> Command {
    Command::new(env!("CARGO_BIN_EXE_chromabound"))
}

/// Writes an instance to a unique temp file and returns its path.
fn write_instance(name: &str, contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "chromabound-{}-{}.col",
        name,
        std::process::id()
    ));
    std::fs::write(&path, contents).unwrap();
    path
}

const C5: &str = "c five-cycle\np edge 5 5\ne 1 2\ne 2 3\ne 3 4\ne 4 5\ne 5 1\n";
const K4: &str = "p edge 4 6\ne 1 2\ne 1 3\ne 1 4\ne 2 3\ne 2 4\ne 3 4\n";

#[test]
fn process_mode_solves_c5() {
    let instance = write_instance("c5", C5);
    let output = binary()
        .arg(&instance)
        .args(["--workers", "3", "--mode", "process"])
        .output()
        .unwrap();
    std::fs::remove_file(&instance).ok();

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("tot_colors: 3"), "stdout: {stdout}");
}

#[test]
fn thread_mode_solves_c5() {
    let instance = write_instance("c5-threaded", C5);
    let output = binary()
        .arg(&instance)
        .args(["--workers", "3", "--mode", "thread"])
        .output()
        .unwrap();
    std::fs::remove_file(&instance).ok();

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("tot_colors: 3"), "stdout: {stdout}");
}

#[test]
fn serial_optimum_exits_with_diagnostic_code() {
    // K4's expansion chain never branches, so the seed search proves the
    // optimum alone and the run takes the distinguished diagnostic exit.
    let instance = write_instance("k4", K4);
    let output = binary()
        .arg(&instance)
        .args(["--workers", "3", "--mode", "process"])
        .output()
        .unwrap();
    std::fs::remove_file(&instance).ok();

    assert_eq!(output.status.code(), Some(69));
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("tot_colors: 4"), "stdout: {stdout}");
}

#[test]
fn solution_json_is_written() {
    let instance = write_instance("c5-json", C5);
    let solution = std::env::temp_dir().join(format!(
        "chromabound-solution-{}.json",
        std::process::id()
    ));
    let output = binary()
        .arg(&instance)
        .args(["--workers", "3", "--mode", "thread", "--solution"])
        .arg(&solution)
        .output()
        .unwrap();
    std::fs::remove_file(&instance).ok();

    assert!(output.status.success());
    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&solution).unwrap()).unwrap();
    std::fs::remove_file(&solution).ok();
    assert_eq!(json["colors_used"], 3);
    assert_eq!(json["vertices"], 5);
    assert_eq!(json["colors"].as_array().unwrap().len(), 5);
}

#[test]
fn missing_instance_is_an_input_error() {
    let output = binary()
        .arg("/nonexistent/instance.col")
        .args(["--mode", "thread"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert_ne!(output.status.code(), Some(69));
}

#[test]
fn vertex_count_mismatch_is_an_input_error() {
    let instance = write_instance("c5-mismatch", C5);
    let output = binary()
        .arg(&instance)
        .args(["--mode", "thread", "--vertices", "9"])
        .output()
        .unwrap();
    std::fs::remove_file(&instance).ok();
    assert!(!output.status.success());
    assert_ne!(output.status.code(), Some(69));
}
