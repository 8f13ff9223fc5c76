#![cfg(feature = "cli")]

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::process::{Child, Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

fn free_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").expect("ephemeral bind should succeed");
    listener.local_addr().expect("addr should be known")
}

fn wait_for_listen(addr: SocketAddr, timeout: Duration) {
    let start = Instant::now();
    loop {
        if TcpStream::connect(addr).is_ok() {
            return;
        }
        if start.elapsed() >= timeout {
            panic!("server did not start listening on {addr}");
        }
        thread::sleep(Duration::from_millis(25));
    }
}

struct ServeProcess {
    child: Child,
    addr: SocketAddr,
}

impl ServeProcess {
    fn start() -> Self {
        let addr = free_addr();
        let child = Command::new(env!("CARGO_BIN_EXE_tinyrpc"))
            .arg("--log-level")
            .arg("error")
            .arg("serve")
            .arg("--bind")
            .arg(addr.to_string())
            .arg("--workers")
            .arg("2")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("serve command should start");
        wait_for_listen(addr, Duration::from_secs(5));
        Self { child, addr }
    }

    fn call(&self, method: &str, args: &str) -> Output {
        Command::new(env!("CARGO_BIN_EXE_tinyrpc"))
            .arg("--log-level")
            .arg("error")
            .arg("--format")
            .arg("json")
            .arg("call")
            .arg(self.addr.to_string())
            .arg(method)
            .arg("--args")
            .arg(args)
            .output()
            .expect("call should run")
    }
}

impl Drop for ServeProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn stdout_json(output: &Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).expect("call should emit json")
}

#[test]
fn call_add_and_hello_against_serve() {
    let server = ServeProcess::start();

    let output = server.call("add", "[2, 3]");
    assert!(output.status.success());
    let payload = stdout_json(&output);
    assert_eq!(payload["method"], "add");
    assert_eq!(payload["result"], 5);

    let output = server.call("hello", r#"["World"]"#);
    assert!(output.status.success());
    assert_eq!(stdout_json(&output)["result"], "Hello World");
}

#[test]
fn unknown_method_exits_with_failure() {
    let server = ServeProcess::start();

    let output = server.call("foo", "[]");
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unknown function: foo"));
}

#[test]
fn wrong_argument_types_exit_with_failure() {
    let server = ServeProcess::start();

    let output = server.call("add", r#"["two", 3]"#);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("call failed"));
}

#[test]
fn invalid_args_json_is_a_usage_error() {
    let output = Command::new(env!("CARGO_BIN_EXE_tinyrpc"))
        .arg("call")
        .arg("127.0.0.1:9")
        .arg("add")
        .arg("--args")
        .arg("{\"a\":1}")
        .output()
        .expect("call should run");

    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn connect_refused_exits_with_failure() {
    let addr = free_addr();
    let output = Command::new(env!("CARGO_BIN_EXE_tinyrpc"))
        .arg("--log-level")
        .arg("error")
        .arg("call")
        .arg(addr.to_string())
        .arg("add")
        .arg("--timeout")
        .arg("1s")
        .output()
        .expect("call should run");

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("connect failed"));
}

#[test]
fn serve_reports_bind_conflict() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("ephemeral bind should succeed");
    let addr = listener.local_addr().expect("addr should be known");

    let output = Command::new(env!("CARGO_BIN_EXE_tinyrpc"))
        .arg("--log-level")
        .arg("error")
        .arg("serve")
        .arg("--bind")
        .arg(addr.to_string())
        .output()
        .expect("serve should run");

    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn version_reports_package_version() {
    let output = Command::new(env!("CARGO_BIN_EXE_tinyrpc"))
        .arg("version")
        .output()
        .expect("version should run");
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        format!("tinyrpc {}", env!("CARGO_PKG_VERSION"))
    );

    let output = Command::new(env!("CARGO_BIN_EXE_tinyrpc"))
        .arg("--format")
        .arg("json")
        .arg("version")
        .arg("--extended")
        .output()
        .expect("version should run");
    let payload: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("version should emit json");
    assert_eq!(payload["version"], env!("CARGO_PKG_VERSION"));
}
