use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use mockbrew_common::config::SmokeSettings;
use mockbrew_common::error::MbError;
use mockbrew_core::SmokeTest;
use mockbrew_net::port::reserve_ephemeral_port;
use reqwest::StatusCode;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Answers `/stop` and lets the fake launcher know it may exit.
struct StopResponder {
    marker: PathBuf,
}

impl Respond for StopResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        fs::write(&self.marker, b"stopped").unwrap();
        ResponseTemplate::new(200)
    }
}

fn quick_settings() -> SmokeSettings {
    SmokeSettings {
        ready_timeout: Duration::from_secs(10),
        stop_timeout: Duration::from_secs(10),
        poll_initial_delay: Duration::from_millis(20),
        poll_max_delay: Duration::from_millis(200),
    }
}

fn write_launcher(dir: &Path, body: &str) -> PathBuf {
    let script = dir.join("run_mockserver.sh");
    fs::write(&script, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
    script
}

fn process_alive(pid: &str) -> bool {
    std::process::Command::new("sh")
        .args(["-c", &format!("kill -0 {pid} 2>/dev/null")])
        .status()
        .unwrap()
        .success()
}

#[tokio::test]
async fn full_cycle_against_stub_server() {
    let tmp = TempDir::new().unwrap();
    let server = MockServer::start().await;
    let port = server.address().port();
    let marker = tmp.path().join("stopped");
    let args_file = tmp.path().join("args");

    Mock::given(method("PUT"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/stop"))
        .respond_with(StopResponder {
            marker: marker.clone(),
        })
        .expect(1)
        .mount(&server)
        .await;

    let launcher = write_launcher(
        tmp.path(),
        &format!(
            "printf '%s\\n' \"$*\" > '{}'\nwhile [ ! -f '{}' ]; do sleep 0.05; done\nexit 0",
            args_file.display(),
            marker.display()
        ),
    );
    let log = tmp.path().join("logs/smoke-test.log");

    let report = SmokeTest::new(&launcher)
        .port(Some(port))
        .settings(quick_settings())
        .output_log(&log)
        .run()
        .await
        .unwrap();

    assert_eq!(report.port, port);
    assert!(report.status_attempts >= 1);
    assert_eq!(report.stop_status, Some(StatusCode::OK));
    assert!(report.exit_status.success());
    assert_eq!(
        fs::read_to_string(&args_file).unwrap().trim(),
        format!("-serverPort {port}")
    );
    assert!(log.is_file());

    let paths: Vec<String> = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|r| r.url.path().to_string())
        .collect();
    assert_eq!(paths.first().map(String::as_str), Some("/status"));
    assert_eq!(paths.last().map(String::as_str), Some("/stop"));
    assert_eq!(paths.iter().filter(|p| *p == "/stop").count(), 1);
}

#[tokio::test]
async fn server_that_never_answers_times_out_and_is_killed() {
    let tmp = TempDir::new().unwrap();
    let pid_file = tmp.path().join("pid");
    let launcher = write_launcher(
        tmp.path(),
        &format!("echo $$ > '{}'\nexec sleep 30", pid_file.display()),
    );
    let port = reserve_ephemeral_port().unwrap();

    let settings = SmokeSettings {
        ready_timeout: Duration::from_millis(600),
        ..quick_settings()
    };
    let err = SmokeTest::new(&launcher)
        .port(Some(port))
        .settings(settings)
        .run()
        .await
        .unwrap_err();

    assert!(err.is_timeout());
    match &err {
        MbError::SmokeTest { stage, source } => {
            assert_eq!(stage, "polling");
            assert!(matches!(**source, MbError::Timeout(_)));
        }
        other => panic!("unexpected error: {other}"),
    }
    let pid = fs::read_to_string(&pid_file).unwrap();
    assert!(!process_alive(pid.trim()));
}

#[tokio::test]
async fn early_exit_is_reported_instead_of_waiting_out_the_timeout() {
    let tmp = TempDir::new().unwrap();
    let launcher = write_launcher(tmp.path(), "exit 3");
    let port = reserve_ephemeral_port().unwrap();

    let err = SmokeTest::new(&launcher)
        .port(Some(port))
        .settings(quick_settings())
        .run()
        .await
        .unwrap_err();

    match err {
        MbError::SmokeTest { stage, source } => {
            assert_eq!(stage, "polling");
            assert!(matches!(*source, MbError::ServerExited(_)));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn ignored_stop_request_fails_after_stop_timeout() {
    let tmp = TempDir::new().unwrap();
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    // `/stop` is unmatched and answered 404; the launcher keeps running.
    let launcher = write_launcher(tmp.path(), "exec sleep 30");

    let settings = SmokeSettings {
        stop_timeout: Duration::from_millis(300),
        ..quick_settings()
    };
    let err = SmokeTest::new(&launcher)
        .port(Some(server.address().port()))
        .settings(settings)
        .run()
        .await
        .unwrap_err();

    match err {
        MbError::SmokeTest { stage, source } => {
            assert_eq!(stage, "stop_requested");
            assert!(matches!(*source, MbError::Timeout(_)));
        }
        other => panic!("unexpected error: {other}"),
    }
}
