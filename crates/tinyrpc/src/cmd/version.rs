use serde::Serialize;

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_json, OutputFormat};

#[derive(Serialize)]
struct VersionInfo {
    name: &'static str,
    version: &'static str,
    target: &'static str,
    target_os: &'static str,
    target_arch: &'static str,
    features: Vec<&'static str>,
}

pub fn run(args: VersionArgs, format: OutputFormat) -> CliResult<i32> {
    if !args.extended {
        println!("tinyrpc {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    let mut features = vec!["cli"];
    if cfg!(feature = "server") {
        features.push("server");
    }
    if cfg!(feature = "client") {
        features.push("client");
    }

    print_json(
        &VersionInfo {
            name: "tinyrpc",
            version: env!("CARGO_PKG_VERSION"),
            target: option_env!("TINYRPC_BUILD_TARGET").unwrap_or("unknown"),
            target_os: std::env::consts::OS,
            target_arch: std::env::consts::ARCH,
            features,
        },
        format,
    );
    Ok(SUCCESS)
}
