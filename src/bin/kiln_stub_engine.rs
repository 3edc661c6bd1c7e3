//! Stand-in engine for integration tests.
//!
//! Speaks the same line-delimited JSON-RPC 2.0 protocol as `kiln-engine
//! server`, with a handful of canned methods that let the tests provoke
//! every behavior the runtime must handle: slow calls, engine errors with
//! and without stderr output, raw transport-level errors, stderr floods,
//! and mid-call crashes.

use std::io::{self, BufRead, Write};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::{json, Value};

/// Mirrors `kiln::client::ENGINE_ERROR_CODE` (ASCII "KLN").
const ENGINE_ERROR_CODE: i64 = 0x4B4C4E;

fn main() {
    if let Err(e) = run() {
        eprintln!("kiln-stub-engine: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let stdin = io::stdin().lock();
    let mut stdout = io::stdout().lock();

    for line in stdin.lines() {
        let line = line.context("reading request")?;
        if line.trim().is_empty() {
            continue;
        }
        let request: Value = serde_json::from_str(&line).context("parsing request")?;
        let id = request["id"].clone();
        let method = request["method"].as_str().unwrap_or_default().to_string();
        let params = request["params"].clone();

        let reply = match method.as_str() {
            "Ping" => ok(&id, json!({ "value": params["value"] })),
            "ListMethod" => ok(
                &id,
                json!({
                    "method_name_list": [
                        "Ping", "ListMethod", "ExecProgram", "FormatCode",
                        "FormatPath", "LintPath", "ValidateCode", "OverrideFile",
                    ]
                }),
            ),
            "ExecProgram" => {
                let filenames: Vec<&str> = params["filenames"]
                    .as_array()
                    .map(|a| a.iter().filter_map(Value::as_str).collect())
                    .unwrap_or_default();
                if let Some(file) = filenames.iter().find(|f| f.ends_with(".fail")) {
                    // Simulated evaluation failure with diagnostic output.
                    eprintln!("stub-engine: evaluation aborted in {file}");
                    io::stderr().flush().ok();
                    // Give the host's stderr pump time to capture the output
                    // before the error response lands.
                    thread::sleep(Duration::from_millis(50));
                    error(&id, ENGINE_ERROR_CODE, &format!("evaluation of {file} failed"))
                } else if let Some(file) = filenames.iter().find(|f| f.ends_with(".fail-quiet")) {
                    error(&id, ENGINE_ERROR_CODE, &format!("evaluation of {file} failed"))
                } else {
                    // Echo the arguments back as the "evaluation result" so
                    // callers can assert on what actually went over the wire.
                    let rendered = serde_json::to_string(&params)?;
                    ok(
                        &id,
                        json!({ "json_result": rendered, "yaml_result": "", "log_message": "" }),
                    )
                }
            }
            "FormatCode" => {
                let source = params["source"].as_str().unwrap_or_default();
                ok(&id, json!({ "formatted": format!("{}\n", source.trim_end()) }))
            }
            "Sleep" => {
                let ms = params["ms"].as_u64().unwrap_or(0);
                thread::sleep(Duration::from_millis(ms));
                ok(&id, json!({ "slept_ms": ms }))
            }
            "SpewStderr" => {
                let bytes = params["bytes"].as_u64().unwrap_or(0) as usize;
                let blob = vec![b'x'; bytes];
                io::stderr().write_all(&blob).context("writing stderr")?;
                io::stderr().flush().ok();
                ok(&id, json!({ "written": bytes }))
            }
            "Fail" => {
                let message = params["message"].as_str().unwrap_or("engine failure");
                error(&id, ENGINE_ERROR_CODE, message)
            }
            "FailRaw" => {
                let message = params["message"].as_str().unwrap_or("raw failure");
                error(&id, -32000, message)
            }
            "Exit" => {
                // Crash mid-call: no response, just die.
                std::process::exit(1);
            }
            _ => error(&id, -32601, &format!("method not found: {method}")),
        };

        stdout.write_all(reply.as_bytes()).context("writing response")?;
        stdout.write_all(b"\n").context("writing response")?;
        stdout.flush().context("flushing response")?;
    }

    Ok(())
}

fn ok(id: &Value, result: Value) -> String {
    json!({ "jsonrpc": "2.0", "id": id, "result": result }).to_string()
}

fn error(id: &Value, code: i64, message: &str) -> String {
    json!({ "jsonrpc": "2.0", "id": id, "error": { "code": code, "message": message } })
        .to_string()
}
