#![cfg(feature = "cli")]

use std::net::TcpListener;
use std::process::{Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

fn tframe() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_tframe"));
    cmd.arg("--log-level").arg("error");
    cmd
}

/// Reserve an ephemeral port, then release it for the server to bind.
fn free_addr() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("ephemeral bind should succeed");
    let addr = listener.local_addr().expect("bound listener has an address");
    addr.to_string()
}

/// Retry `send` until the server is accepting. Refused connects exit with 3.
fn send_when_ready(addr: &str, extra: &[&str], timeout: Duration) -> Output {
    let start = Instant::now();
    loop {
        let output = tframe()
            .arg("--format")
            .arg("json")
            .arg("send")
            .arg(addr)
            .args(extra)
            .output()
            .expect("send should run");
        if output.status.code() != Some(3) {
            return output;
        }
        if start.elapsed() >= timeout {
            panic!("server at {addr} never accepted");
        }
        thread::sleep(Duration::from_millis(25));
    }
}

#[test]
fn version_prints_name() {
    let output = tframe().arg("version").output().expect("version should run");
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).starts_with("tframe "));
}

#[test]
fn serve_forwards_chunked_json_and_reports() {
    let addr = free_addr();
    let server = tframe()
        .arg("--format")
        .arg("json")
        .arg("serve")
        .arg(&addr)
        .arg("--window")
        .arg("200ms")
        .arg("--connections")
        .arg("1")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("serve should start");

    let sent = send_when_ready(
        &addr,
        &[
            "--json",
            r#"{"rows":3,"columns":4,"clientId":1}"#,
            "--count",
            "3",
            "--chunk-size",
            "3",
            "--wait",
        ],
        Duration::from_secs(5),
    );
    assert!(sent.status.success(), "send failed: {sent:?}");
    let responses = String::from_utf8_lossy(&sent.stdout);
    assert_eq!(responses.lines().count(), 3);
    for line in responses.lines() {
        let value: serde_json::Value = serde_json::from_str(line).expect("json line");
        assert_eq!(value["event"], "response");
        assert_eq!(value["encoding"], "json");
        assert_eq!(value["payload"], r#"{"rows":3,"columns":4,"clientId":1}"#);
    }

    let served = server.wait_with_output().expect("server should exit");
    assert!(served.status.success());
    let events: Vec<serde_json::Value> = String::from_utf8_lossy(&served.stdout)
        .lines()
        .map(|line| serde_json::from_str(line).expect("json line"))
        .collect();

    let session = events
        .iter()
        .find(|e| e["event"] == "session")
        .expect("session summary printed");
    assert_eq!(session["frames"], 3);
    assert_eq!(session["forwarded"], 3);

    let json_total: u64 = events
        .iter()
        .filter(|e| e["event"] == "window")
        .map(|e| e["counts"]["json_count"].as_u64().unwrap_or(0))
        .sum();
    assert_eq!(json_total, 3);
}

#[test]
fn send_to_closed_port_is_transport_error() {
    let addr = free_addr();
    let output = tframe()
        .arg("send")
        .arg(&addr)
        .arg("--data")
        .arg("x")
        .arg("--wait-timeout")
        .arg("1s")
        .output()
        .expect("send should run");
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn serve_rejects_bad_window() {
    let output = tframe()
        .arg("serve")
        .arg("127.0.0.1:0")
        .arg("--window")
        .arg("soon")
        .output()
        .expect("serve should run");
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn window_can_come_from_env() {
    let output = tframe()
        .env("TFRAME_WINDOW", "0s")
        .arg("serve")
        .arg("127.0.0.1:0")
        .output()
        .expect("serve should run");
    assert_eq!(output.status.code(), Some(64));
}
