//! Integration tests for one-shot authtoken registration

#![cfg(unix)]


use std::time::Duration;
use test_utils::*;
use tokio::time::timeout;
use tunup::{set_authtoken, Error, Options, Supervisor};

/// Fake agent that acknowledges the authtoken command on stdout
fn auth_ok_agent() -> tempfile::TempDir {
    fake_agent("echo $$ > pid.txt\necho 'Authtoken saved to configuration file'\nsleep 30\nexit 0")
}

fn auth_options(dir: &tempfile::TempDir, token: &str) -> Options {
    Options {
        authtoken: Some(token.to_string()),
        ..options_for(dir)
    }
}

#[tokio::test]
async fn test_resolves_on_first_stdout_chunk() {
    let dir = auth_ok_agent();

    timeout(Duration::from_secs(5), set_authtoken(auth_options(&dir, "tok")))
        .await
        .expect("must resolve on first output, not wait for process exit")
        .expect("acknowledged token must succeed");
}

#[tokio::test]
async fn test_process_is_terminated_before_return() {
    let dir = auth_ok_agent();

    set_authtoken(auth_options(&dir, "tok"))
        .await
        .expect("acknowledged token must succeed");

    if cfg!(target_os = "linux") {
        let pid = std::fs::read_to_string(dir.path().join("pid.txt"))
            .expect("fake agent records its pid")
            .trim()
            .to_string();
        assert!(
            !std::path::Path::new(&format!("/proc/{}", pid)).exists(),
            "authtoken process must not outlive the call"
        );
    }
}

#[tokio::test]
async fn test_rejects_on_stderr() {
    let dir = fake_agent("echo 'ERR_NGROK_105: invalid authtoken' 1>&2\nsleep 30\nexit 0");

    let err = set_authtoken(auth_options(&dir, "bad-token"))
        .await
        .expect_err("stderr output must reject");

    assert!(matches!(err, Error::AuthToken));
    assert_eq!(err.to_string(), "cant set authtoken");
}

#[tokio::test]
async fn test_any_stdout_counts_as_acknowledgment() {
    // Even error-looking text on stdout resolves the call; content is not parsed
    let dir = fake_agent("echo 'ERROR: something odd on stdout'\nsleep 30\nexit 0");

    set_authtoken(auth_options(&dir, "tok"))
        .await
        .expect("first stdout chunk is acknowledgment regardless of content");
}

#[tokio::test]
async fn test_silent_exit_rejects() {
    let dir = fake_agent("exit 0");

    let err = set_authtoken(auth_options(&dir, "tok"))
        .await
        .expect_err("no output at all must reject");
    assert!(matches!(err, Error::AuthToken));
}

#[tokio::test]
async fn test_missing_token_rejects() {
    let dir = auth_ok_agent();

    let err = set_authtoken(options_for(&dir))
        .await
        .expect_err("options without a token must reject");
    assert!(matches!(err, Error::AuthToken));
}

#[tokio::test]
async fn test_runs_independently_of_supervisor() {
    let agent_dir = ready_agent();
    let supervisor = Supervisor::new();

    let url = supervisor
        .get_endpoint(&options_for(&agent_dir))
        .await
        .expect("supervised agent starts");

    // The one-shot command runs while the supervised process is active
    let auth_dir = auth_ok_agent();
    set_authtoken(auth_options(&auth_dir, "tok"))
        .await
        .expect("authtoken runs alongside the supervised agent");

    // The supervised process is untouched by the one-shot run
    assert!(supervisor.is_active().await);
    assert_eq!(
        supervisor.get_endpoint(&options_for(&agent_dir)).await.expect("still cached"),
        url
    );

    supervisor.shutdown().await;
}
