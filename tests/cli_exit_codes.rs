use pagesnap_lib::SnapOutput;
use std::process::{Command, Output};
use tempfile::TempDir;

/// Runs the binary with HOME pointed at an empty directory so no central config is picked up.
fn run_pagesnap(home: &TempDir, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_pagesnap"))
        .env("HOME", home.path())
        .env_remove("RUST_LOG")
        .args(args)
        .output()
        .expect("run pagesnap")
}

fn parse_output(output: &Output) -> SnapOutput {
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(stdout.trim()).expect("stdout is a pagesnap JSON payload")
}

#[test]
fn invalid_config_exits_with_error_payload() {
    let dir = TempDir::new().expect("tempdir");
    let cfg_path = dir.path().join("pagesnap.toml");
    std::fs::write(&cfg_path, "[pool]\nmax_pool_size = 0\n").expect("write config");

    let output = run_pagesnap(
        &dir,
        &[
            "markup",
            "--url",
            "https://example.com",
            "--config",
            cfg_path.to_str().unwrap(),
        ],
    );

    assert_eq!(output.status.code(), Some(2));
    match parse_output(&output) {
        SnapOutput::Error(err) => {
            assert!(err.error.message.contains("max_pool_size"));
        }
        other => panic!("expected error output, got {other:?}"),
    }
}

#[test]
fn unknown_config_key_is_rejected() {
    let dir = TempDir::new().expect("tempdir");
    let cfg_path = dir.path().join("pagesnap.toml");
    std::fs::write(&cfg_path, "[pool]\nmax_size = 3\n").expect("write config");

    let output = run_pagesnap(
        &dir,
        &[
            "summarize",
            "--url",
            "https://example.com",
            "--config",
            cfg_path.to_str().unwrap(),
        ],
    );

    assert_eq!(output.status.code(), Some(2));
    assert!(matches!(parse_output(&output), SnapOutput::Error(_)));
}

#[test]
fn missing_config_file_is_reported() {
    let dir = TempDir::new().expect("tempdir");
    let cfg_path = dir.path().join("absent.toml");

    let output = run_pagesnap(
        &dir,
        &[
            "markup",
            "--url",
            "https://example.com",
            "--config",
            cfg_path.to_str().unwrap(),
        ],
    );

    assert_eq!(output.status.code(), Some(2));
    match parse_output(&output) {
        SnapOutput::Error(err) => assert!(err.error.message.contains("absent.toml")),
        other => panic!("expected error output, got {other:?}"),
    }
}

#[test]
fn invalid_url_fails_before_launching_a_browser() {
    let dir = TempDir::new().expect("tempdir");

    let output = run_pagesnap(&dir, &["screenshot", "--url", "not a url"]);

    assert_eq!(output.status.code(), Some(2));
    match parse_output(&output) {
        SnapOutput::Error(err) => assert!(err.message.unwrap_or_default().contains("relative URL")),
        other => panic!("expected error output, got {other:?}"),
    }
}

#[test]
fn error_payload_can_be_written_to_file() {
    let dir = TempDir::new().expect("tempdir");
    let out_path = dir.path().join("result.json");

    let output = run_pagesnap(
        &dir,
        &[
            "markup",
            "--url",
            "::bad::",
            "--output",
            out_path.to_str().unwrap(),
        ],
    );

    assert_eq!(output.status.code(), Some(2));
    let written = std::fs::read_to_string(&out_path).expect("error output file");
    let parsed: SnapOutput = serde_json::from_str(&written).expect("valid json");
    assert!(matches!(parsed, SnapOutput::Error(_)));
}

#[test]
fn zero_nav_timeout_flag_is_a_config_error() {
    let dir = TempDir::new().expect("tempdir");

    let output = run_pagesnap(
        &dir,
        &["markup", "--url", "https://example.com", "--nav-timeout", "0"],
    );

    assert_eq!(output.status.code(), Some(2));
    match parse_output(&output) {
        SnapOutput::Error(err) => assert!(err.error.message.contains("--nav-timeout")),
        other => panic!("expected error output, got {other:?}"),
    }
}
