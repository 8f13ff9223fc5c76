use serde::Serialize;
use serde_json::Value;
use tinyrpc_client::{Client, ClientConfig};
use tracing::debug;

use crate::cmd::{parse_duration, CallArgs};
use crate::exit::{client_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_json, OutputFormat};

#[derive(Serialize)]
struct CallOutput<'a> {
    method: &'a str,
    result: Value,
}

pub fn run(args: CallArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let call_args = parse_args(&args.args)?;

    let client = Client::new(args.addr.as_str(), ClientConfig::default())
        .map_err(|err| client_error("client setup failed", err))?;
    client
        .try_connect(timeout)
        .map_err(|err| client_error("connect failed", err))?;

    debug!(method = %args.method, argc = call_args.len(), "calling");
    let result: Value = client
        .call(&args.method, call_args)
        .map_err(|err| client_error("call failed", err))?;

    print_json(
        &CallOutput {
            method: &args.method,
            result,
        },
        format,
    );
    Ok(SUCCESS)
}

/// `--args` must be a JSON array; each element is one positional argument.
fn parse_args(input: &str) -> CliResult<Vec<Value>> {
    match serde_json::from_str::<Value>(input) {
        Ok(Value::Array(values)) => Ok(values),
        Ok(_) => Err(CliError::new(USAGE, "--args must be a JSON array")),
        Err(err) => Err(CliError::new(
            USAGE,
            format!("--args is not valid JSON: {err}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_must_be_an_array() {
        assert_eq!(
            parse_args(r#"[2, "x", null]"#).unwrap(),
            vec![Value::from(2), Value::from("x"), Value::Null]
        );
        assert!(parse_args("[]").unwrap().is_empty());
        assert_eq!(parse_args(r#"{"a":1}"#).unwrap_err().code, USAGE);
        assert_eq!(parse_args("[1,").unwrap_err().code, USAGE);
    }
}
