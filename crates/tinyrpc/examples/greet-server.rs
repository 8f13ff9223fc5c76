//! Greeting server: serves `hello` and `add` until Ctrl-C or stdin closes.
//!
//! Run with:
//!   cargo run --example greet-server
//!
//! In another terminal:
//!   cargo run --features cli -- call 127.0.0.1:9000 hello --args '["World"]'

use std::io::Read;
use std::time::Duration;

use tinyrpc::server::{Server, ServerConfig};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::on_port(9000)
        .with_workers(4)
        .with_idle_timeout(Duration::from_secs(15))
        .with_sweep_interval(Duration::from_secs(10));

    let mut server = Server::new(config);
    server
        .register("hello", |name: String| format!("Hello {name}"))
        .register("add", |a: i64, b: i64| a + b)
        .register_fallible("div", |a: i64, b: i64| {
            a.checked_div(b).ok_or("division by zero")
        });

    let handle = server.start()?;
    eprintln!("Listening on {}", handle.local_addr());

    // Serve until stdin is closed (Ctrl-D) or the process is killed.
    let _ = std::io::stdin().read_to_end(&mut Vec::new());

    eprintln!("Shutting down ({} tracked connections)", handle.connection_count());
    handle.shutdown();
    Ok(())
}
