//! Integration tests for the ProcessRunner against real local processes

use common::Error;
use uyuni_health_check::{CommandRunner, DeploymentTarget, ProcessRunner};

fn sh(script: &str) -> Vec<String> {
    vec!["sh".to_string(), "-c".to_string(), script.to_string()]
}

#[tokio::test]
async fn test_run_captures_output() {
    let runner = ProcessRunner::new();
    let result = runner
        .run(&DeploymentTarget::Local, &sh("echo out; echo err >&2"))
        .await
        .unwrap();

    assert!(result.success());
    assert_eq!(result.stdout, "out\n");
    assert_eq!(result.stderr, "err\n");
}

#[tokio::test]
async fn test_non_zero_exit_is_a_result() {
    let runner = ProcessRunner::new();
    let result = runner
        .run(&DeploymentTarget::Local, &sh("echo nope >&2; exit 3"))
        .await
        .unwrap();

    assert_eq!(result.exit_code, 3);
    assert_eq!(result.stderr, "nope\n");
}

#[tokio::test]
async fn test_missing_program_is_infrastructure_missing() {
    let runner = ProcessRunner::new();
    let argv = vec!["uyuni-hc-no-such-tool".to_string(), "--version".to_string()];

    let err = runner.run(&DeploymentTarget::Local, &argv).await.unwrap_err();
    match err {
        Error::InfrastructureMissing { tool, location } => {
            assert_eq!(tool, "uyuni-hc-no-such-tool");
            assert_eq!(location, None);
        }
        other => panic!("expected a missing tool, got {:?}", other),
    }
}

#[tokio::test]
async fn test_exit_127_is_infrastructure_missing() {
    let runner = ProcessRunner::new();
    let err = runner
        .run(&DeploymentTarget::Local, &sh("exit 127"))
        .await
        .unwrap_err();

    assert!(err.is_infrastructure_missing());
}

#[tokio::test]
async fn test_streaming_delivers_lines_in_order() {
    let runner = ProcessRunner::new();
    let mut lines = Vec::new();

    let result = runner
        .run_streaming(
            &DeploymentTarget::Local,
            &sh("echo one; sleep 0.05; echo two; sleep 0.05; echo three"),
            &mut |line: &str| lines.push(line.to_string()),
        )
        .await
        .unwrap();

    assert!(result.success());
    assert_eq!(lines, vec!["one", "two", "three"]);
    assert_eq!(result.stdout, "one\ntwo\nthree\n");
}

#[tokio::test]
async fn test_streaming_includes_stderr_lines() {
    let runner = ProcessRunner::new();
    let mut lines = Vec::new();

    let result = runner
        .run_streaming(
            &DeploymentTarget::Local,
            &sh("echo building; sleep 0.05; echo failed >&2; exit 1"),
            &mut |line: &str| lines.push(line.to_string()),
        )
        .await
        .unwrap();

    assert_eq!(result.exit_code, 1);
    assert_eq!(lines, vec!["building", "failed"]);
    assert_eq!(result.stderr, "failed\n");
}

#[tokio::test]
async fn test_streaming_tolerates_invalid_utf8() {
    let runner = ProcessRunner::new();
    let mut lines = Vec::new();

    let result = runner
        .run_streaming(
            &DeploymentTarget::Local,
            &sh("printf 'caf\\351\\n'; echo done"),
            &mut |line: &str| lines.push(line.to_string()),
        )
        .await
        .unwrap();

    assert!(result.success());
    assert_eq!(lines, vec!["caf\u{fffd}", "done"]);

    // Same decoding as the capturing form
    let captured = runner
        .run(&DeploymentTarget::Local, &sh("printf 'caf\\351\\n'; echo done"))
        .await
        .unwrap();
    assert_eq!(captured.stdout, result.stdout);
}

#[tokio::test]
async fn test_streaming_keeps_unterminated_last_line() {
    let runner = ProcessRunner::new();
    let mut lines = Vec::new();

    runner
        .run_streaming(
            &DeploymentTarget::Local,
            &sh("echo first; printf last"),
            &mut |line: &str| lines.push(line.to_string()),
        )
        .await
        .unwrap();

    assert_eq!(lines, vec!["first", "last"]);
}
