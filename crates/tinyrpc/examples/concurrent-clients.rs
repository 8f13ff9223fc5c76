//! Concurrent clients: six threads share one connection and call in parallel.
//!
//! Start a server first:
//!   cargo run --example greet-server
//!
//! Then run with:
//!   cargo run --example concurrent-clients

use std::sync::Arc;
use std::thread;

use tinyrpc::client::{Client, ClientConfig, ClientError};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let client = Arc::new(Client::connect_to("127.0.0.1:9000", ClientConfig::default())?);

    let workers: Vec<_> = (0..6i64)
        .map(|id| {
            let client = Arc::clone(&client);
            thread::spawn(move || -> Result<(), ClientError> {
                for i in 0..10i64 {
                    let greeting: String = client.call("hello", (format!("client {id}"),))?;
                    let sum: i64 = client.call("add", (id, i))?;
                    eprintln!("[{id}] {greeting}, {id} + {i} = {sum}");
                }
                Ok(())
            })
        })
        .collect();

    for worker in workers {
        worker.join().expect("client thread should not panic")?;
    }

    // Calls can also be issued first and collected later.
    let pending: Vec<_> = (0..4i64)
        .map(|i| client.async_call::<i64, _>("add", (i, i)))
        .collect();
    for call in pending {
        eprintln!("async result: {}", call.wait()?);
    }

    match client.call::<(), _>("missing", ()) {
        Err(ClientError::Remote(message)) => eprintln!("expected failure: {message}"),
        other => eprintln!("unexpected: {other:?}"),
    }
    Ok(())
}
