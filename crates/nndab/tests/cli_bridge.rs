#![cfg(all(unix, feature = "cli"))]

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use nndab_sp::{Endpoint, RequestSocket};

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/nndabcli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn ipc_endpoint(path: &Path) -> String {
    format!("ipc://{}", path.display())
}

fn wait_for_connect(endpoint: &str, timeout: Duration) -> RequestSocket {
    let endpoint: Endpoint = endpoint.parse().expect("endpoint should parse");
    let start = Instant::now();
    loop {
        match RequestSocket::connect(&endpoint) {
            Ok(socket) => return socket,
            Err(err) => {
                if start.elapsed() >= timeout {
                    panic!("connect timeout: {err}");
                }
                thread::sleep(Duration::from_millis(25));
            }
        }
    }
}

struct Server {
    child: Child,
    dir: PathBuf,
    endpoint: String,
}

impl Server {
    fn start_sim(tag: &str, extra: &[&str]) -> Self {
        let dir = unique_temp_dir(tag);
        let endpoint = ipc_endpoint(&dir.join("bridge.sock"));
        let child = Command::new(env!("CARGO_BIN_EXE_nndab"))
            .args(["--log-level", "error", "serve", "--bus", "sim", "--bind"])
            .arg(&endpoint)
            .args(extra)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .expect("serve should start");
        Self {
            child,
            dir,
            endpoint,
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

#[test]
fn serve_sim_echoes_requests() {
    let server = Server::start_sim("echo", &["--poll-interval", "0us"]);
    let mut client = wait_for_connect(&server.endpoint, Duration::from_secs(5));
    client
        .set_timeout(Some(Duration::from_secs(5)))
        .expect("timeout should apply");

    assert_eq!(client.request(&[0x01, 0x02, 0x03]).unwrap().as_ref(), &[0x01, 0x02, 0x03]);
    assert_eq!(client.request(b"hello").unwrap().as_ref(), b"hello");
}

#[test]
fn send_prints_raw_reply() {
    let server = Server::start_sim("send-raw", &[]);
    drop(wait_for_connect(&server.endpoint, Duration::from_secs(5)));

    let output = Command::new(env!("CARGO_BIN_EXE_nndab"))
        .args(["--log-level", "error", "--format", "raw", "send"])
        .arg(&server.endpoint)
        .args(["--data", "ping", "--timeout", "5s"])
        .output()
        .expect("send should run");

    assert!(output.status.success(), "{output:?}");
    assert_eq!(output.stdout, b"ping");
}

#[test]
fn send_json_reports_hex_payload() {
    let server = Server::start_sim("send-json", &[]);
    drop(wait_for_connect(&server.endpoint, Duration::from_secs(5)));

    let output = Command::new(env!("CARGO_BIN_EXE_nndab"))
        .args(["--log-level", "error", "--format", "json", "send"])
        .arg(&server.endpoint)
        .args(["--hex", "AA BB"])
        .output()
        .expect("send should run");

    assert!(output.status.success(), "{output:?}");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"reply_size\":2"), "{stdout}");
    assert!(stdout.contains("\"payload_hex\":\"AA BB\""), "{stdout}");
    assert!(stdout.contains("\"diagnostic\":false"), "{stdout}");
}

#[test]
fn oversized_request_returns_diagnostic_and_exit_1() {
    let server = Server::start_sim("too-large", &[]);
    drop(wait_for_connect(&server.endpoint, Duration::from_secs(5)));

    let payload_path = server.dir.join("payload.bin");
    std::fs::write(&payload_path, vec![0x5Au8; 3000]).expect("payload should be writable");

    let output = Command::new(env!("CARGO_BIN_EXE_nndab"))
        .args(["--log-level", "error", "--format", "raw", "send"])
        .arg(&server.endpoint)
        .arg("--file")
        .arg(&payload_path)
        .output()
        .expect("send should run");

    assert_eq!(output.status.code(), Some(1));
    assert_eq!(output.stdout, b"error 9d4c02f1a7e3 message too large");
}

#[test]
fn config_file_is_applied() {
    let dir = unique_temp_dir("config");
    let endpoint = ipc_endpoint(&dir.join("from-config.sock"));
    let config_path = dir.join("nndab.json");
    std::fs::write(
        &config_path,
        format!(r#"{{"bus": "sim", "endpoints": ["{endpoint}"], "retries": 50}}"#),
    )
    .expect("config should be writable");

    let mut child = Command::new(env!("CARGO_BIN_EXE_nndab"))
        .args(["--log-level", "error", "serve", "--config"])
        .arg(&config_path)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("serve should start");

    let mut client = wait_for_connect(&endpoint, Duration::from_secs(5));
    client
        .set_timeout(Some(Duration::from_secs(5)))
        .expect("timeout should apply");
    assert_eq!(client.request(b"cfg").unwrap().as_ref(), b"cfg");

    let _ = child.kill();
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn invalid_config_returns_60() {
    let dir = unique_temp_dir("bad-config");
    let config_path = dir.join("nndab.json");
    std::fs::write(&config_path, r#"{"bus": "sim", "retry": 1}"#).expect("config should be writable");

    let output = Command::new(env!("CARGO_BIN_EXE_nndab"))
        .args(["--log-level", "error", "serve", "--config"])
        .arg(&config_path)
        .output()
        .expect("serve should run");

    assert_eq!(output.status.code(), Some(60));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn send_to_missing_endpoint_returns_1() {
    let dir = unique_temp_dir("missing");
    let endpoint = ipc_endpoint(&dir.join("nobody.sock"));

    let output = Command::new(env!("CARGO_BIN_EXE_nndab"))
        .args(["--log-level", "error", "send"])
        .arg(&endpoint)
        .args(["--data", "x"])
        .output()
        .expect("send should run");

    assert_eq!(output.status.code(), Some(1));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn bad_endpoint_and_timeout_are_usage_errors() {
    let output = Command::new(env!("CARGO_BIN_EXE_nndab"))
        .args(["--log-level", "error", "send", "udp://127.0.0.1:1", "--data", "x"])
        .output()
        .expect("send should run");
    assert_eq!(output.status.code(), Some(64));

    let output = Command::new(env!("CARGO_BIN_EXE_nndab"))
        .args(["--log-level", "error", "send", "tcp://127.0.0.1:1", "--timeout", "0s"])
        .output()
        .expect("send should run");
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn flush_missing_device_returns_1() {
    let output = Command::new(env!("CARGO_BIN_EXE_nndab"))
        .args(["--log-level", "error", "flush", "--device", "/dev/nndab-test-missing"])
        .output()
        .expect("flush should run");

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("open failed"), "{stderr}");
}

#[test]
fn version_prints_package_version() {
    let output = Command::new(env!("CARGO_BIN_EXE_nndab"))
        .arg("version")
        .output()
        .expect("version should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), format!("nndab {}", env!("CARGO_PKG_VERSION")));
}
