use std::time::Duration;

use tinyrpc_server::{Server, ServerConfig, ShutdownSignal};
use tracing::info;

use crate::cmd::ServeArgs;
use crate::exit::{server_error, CliError, CliResult, INTERNAL, SUCCESS};

pub fn run(args: ServeArgs) -> CliResult<i32> {
    let config = ServerConfig::default()
        .with_bind_addr(args.bind)
        .with_workers(args.workers)
        .with_idle_timeout(Duration::from_secs(args.timeout_seconds))
        .with_sweep_interval(Duration::from_secs(args.check_seconds));

    let mut server = Server::new(config);
    register_demo_methods(&mut server);

    let handle = server
        .start()
        .map_err(|err| server_error("serve failed", err))?;
    install_ctrlc_handler(handle.shutdown_signal())?;

    info!(addr = %handle.local_addr(), "serving; press Ctrl-C to stop");
    handle.wait();
    Ok(SUCCESS)
}

fn register_demo_methods(server: &mut Server) {
    server.register("hello", hello).register("add", add);
}

fn hello(name: String) -> String {
    format!("Hello {name}")
}

fn add(a: i64, b: i64) -> i64 {
    a + b
}

fn install_ctrlc_handler(signal: ShutdownSignal) -> CliResult<()> {
    ctrlc::set_handler(move || signal.shutdown())
        .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_methods() {
        assert_eq!(hello("World".to_string()), "Hello World");
        assert_eq!(add(2, 3), 5);
    }
}
