// tests/tap_runner.rs
//
// Supervises shell-script fakes standing in for tap binaries: streaming
// classification, last-STATE capture, dual-pipe draining, exit-code and
// timeout handling, pre-spawn file checks.

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use serde_json::json;
use tapsync::error::SyncError;
use tapsync::tap::runner::TapRunner;
use tempfile::TempDir;

fn fake_tap(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("fake-tap");
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
    let mut perms = fs::metadata(&path).expect("stat script").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).expect("chmod script");
    path
}

fn config_file(dir: &Path) -> PathBuf {
    let path = dir.join("config.json");
    fs::write(&path, "{}").expect("write config");
    path
}

#[tokio::test]
async fn streams_lines_and_captures_last_state() {
    let tmp = TempDir::new().unwrap();
    let tap = fake_tap(
        tmp.path(),
        concat!(
            r#"echo '{"type":"SCHEMA","stream":"orders","schema":{}}'"#,
            "\n",
            r#"echo '{"type":"RECORD","stream":"orders","record":{"id":1}}'"#,
            "\n",
            r#"echo '{"type":"STATE","value":{"n":1}}'"#,
            "\n",
            r#"echo '{"type":"RECORD","stream":"orders","record":{"id":2}}'"#,
            "\n",
            r#"echo '{"type":"STATE","value":{"n":2}}'"#,
            "\n",
            r#"echo 'this line is not json'"#,
            "\n",
            r#"echo 'diagnostic noise' >&2"#,
        ),
    );
    let config = config_file(tmp.path());

    let out = TapRunner::new(tap.display().to_string())
        .run(&config, None, None)
        .await
        .expect("run succeeds");

    assert_eq!(out.lines.len(), 6, "stderr must not leak into stdout lines");
    assert_eq!(out.last_state, Some(json!({"n": 2})), "last STATE wins");
}

#[tokio::test]
async fn nonzero_exit_reports_code_and_stderr() {
    let tmp = TempDir::new().unwrap();
    let tap = fake_tap(
        tmp.path(),
        concat!(
            r#"echo '{"type":"RECORD","stream":"orders","record":{}}'"#,
            "\n",
            r#"echo 'auth failed: 401' >&2"#,
            "\n",
            "exit 3",
        ),
    );
    let config = config_file(tmp.path());

    match TapRunner::new(tap.display().to_string())
        .run(&config, None, None)
        .await
    {
        Err(SyncError::ExtractorExecution { code, stderr }) => {
            assert_eq!(code, Some(3));
            assert!(stderr.contains("auth failed"), "stderr was: {stderr}");
        }
        other => panic!("expected ExtractorExecution, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_config_fails_before_spawn() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("no-config.json");
    let err = TapRunner::new("definitely-not-a-binary")
        .run(&missing, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::ConfigNotFound(_)));
}

#[tokio::test]
async fn missing_catalog_fails_before_spawn() {
    let tmp = TempDir::new().unwrap();
    let config = config_file(tmp.path());
    let missing = tmp.path().join("no-catalog.json");
    let err = TapRunner::new("definitely-not-a-binary")
        .run(&config, Some(&missing), None)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::CatalogNotFound(_)));
}

#[tokio::test]
async fn state_flag_attached_only_when_file_exists() {
    let tmp = TempDir::new().unwrap();
    let argfile = tmp.path().join("argv.txt");
    let tap = fake_tap(
        tmp.path(),
        &format!(
            "printf '%s\\n' \"$@\" > \"{}\"\necho '{{\"type\":\"RECORD\",\"stream\":\"s\",\"record\":{{}}}}'",
            argfile.display()
        ),
    );
    let config = config_file(tmp.path());
    let state = tmp.path().join("state.json");
    let runner = TapRunner::new(tap.display().to_string());

    // Absent state file: flag must not be attached.
    runner.run(&config, None, Some(&state)).await.unwrap();
    let argv = fs::read_to_string(&argfile).unwrap();
    assert!(!argv.contains("--state"), "argv was: {argv}");

    // Present state file: flag attached with the path.
    fs::write(&state, r#"{"bookmarks":{}}"#).unwrap();
    runner.run(&config, None, Some(&state)).await.unwrap();
    let argv = fs::read_to_string(&argfile).unwrap();
    assert!(argv.contains("--state"), "argv was: {argv}");
    assert!(argv.contains("state.json"), "argv was: {argv}");
}

#[tokio::test]
async fn large_output_on_both_pipes_does_not_deadlock() {
    let tmp = TempDir::new().unwrap();
    let tap = fake_tap(
        tmp.path(),
        concat!(
            "i=0\n",
            "while [ $i -lt 5000 ]; do\n",
            r#"  echo '{"type":"RECORD","stream":"orders","record":{"id":1}}'"#,
            "\n",
            "  echo 'progress line' >&2\n",
            "  i=$((i+1))\n",
            "done\n",
            r#"echo '{"type":"STATE","value":{"done":true}}'"#,
        ),
    );
    let config = config_file(tmp.path());

    let out = TapRunner::new(tap.display().to_string())
        .with_timeout(120)
        .run(&config, None, None)
        .await
        .expect("run succeeds");
    assert_eq!(out.lines.len(), 5001);
    assert_eq!(out.last_state, Some(json!({"done": true})));
}

#[tokio::test]
async fn hung_tap_is_killed_on_timeout() {
    let tmp = TempDir::new().unwrap();
    let tap = fake_tap(tmp.path(), "sleep 30");
    let config = config_file(tmp.path());

    let err = TapRunner::new(tap.display().to_string())
        .with_timeout(1)
        .run(&config, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::ExtractorTimeout(1)));
}

#[tokio::test]
async fn discover_captures_whole_stdout() {
    let tmp = TempDir::new().unwrap();
    let tap = fake_tap(
        tmp.path(),
        r#"echo '{"streams":[{"tap_stream_id":"orders"}]}'"#,
    );
    let config = config_file(tmp.path());

    let raw = TapRunner::new(tap.display().to_string())
        .discover(&config)
        .await
        .expect("discover succeeds");
    let doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(doc["streams"][0]["tap_stream_id"], "orders");
}

#[tokio::test]
async fn failed_discovery_carries_stderr() {
    let tmp = TempDir::new().unwrap();
    let tap = fake_tap(tmp.path(), "echo 'cannot reach site' >&2\nexit 1");
    let config = config_file(tmp.path());

    match TapRunner::new(tap.display().to_string())
        .discover(&config)
        .await
    {
        Err(SyncError::Discovery { code, stderr }) => {
            assert_eq!(code, Some(1));
            assert!(stderr.contains("cannot reach site"));
        }
        other => panic!("expected Discovery, got {other:?}"),
    }
}
