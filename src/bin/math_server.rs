//! forage-math-server - 内置 stdio 数学工具服务器
//!
//! 行分隔 JSON-RPC 2.0：stdin 读请求，stdout 写响应，日志只写 stderr。
//! 提供 sqrt / add / multiply / power 四个工具。

use anyhow::Context;
use forage::observability;
use forage::tools::protocol::{error_response, success_response, PROTOCOL_VERSION};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

const SERVER_NAME: &str = "forage-math-server";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = observability::init_quiet();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    tracing::info!("{} started", SERVER_NAME);

    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some(response) = handle_message(line) else {
            continue;
        };
        let mut bytes = response.to_string().into_bytes();
        bytes.push(b'\n');
        stdout.write_all(&bytes).await?;
        stdout.flush().await?;
    }

    tracing::info!("{} stopped", SERVER_NAME);
    Ok(())
}

/// 处理一行请求；通知（无 id）不回复
fn handle_message(line: &str) -> Option<Value> {
    let request: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            return Some(error_response(
                Value::Null,
                -32700,
                &format!("Parse error: {e}"),
            ))
        }
    };

    let method = request.get("method").and_then(Value::as_str).unwrap_or("");
    let Some(id) = request.get("id").cloned() else {
        tracing::debug!(method, "notification");
        return None;
    };
    let params = request.get("params").cloned().unwrap_or_else(|| json!({}));

    let response = match method {
        "initialize" => success_response(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": {} },
                "serverInfo": { "name": SERVER_NAME, "version": env!("CARGO_PKG_VERSION") },
            }),
        ),
        "tools/list" => success_response(id, json!({ "tools": tool_definitions() })),
        "tools/call" => {
            let name = params.get("name").and_then(Value::as_str).unwrap_or("");
            let args = params.get("arguments").cloned().unwrap_or_else(|| json!({}));
            match call_tool(name, &args) {
                Some(result) => success_response(id, tool_result(result)),
                None => error_response(id, -32602, &format!("Unknown tool: {name}")),
            }
        }
        "ping" => success_response(id, json!({})),
        other => error_response(id, -32601, &format!("Method not found: {other}")),
    };
    Some(response)
}

fn tool_definitions() -> Value {
    let binary = |a: &str, b: &str, desc: &str| {
        json!({
            "type": "object",
            "properties": {
                a: { "type": "number", "description": desc },
                b: { "type": "number" },
            },
            "required": [a, b],
        })
    };
    json!([
        {
            "name": "sqrt",
            "description": "Square root of a non-negative number",
            "inputSchema": {
                "type": "object",
                "properties": { "number": { "type": "number" } },
                "required": ["number"],
            },
        },
        { "name": "add", "description": "Sum of a and b", "inputSchema": binary("a", "b", "first operand") },
        { "name": "multiply", "description": "Product of a and b", "inputSchema": binary("a", "b", "first operand") },
        { "name": "power", "description": "base raised to exponent", "inputSchema": binary("base", "exponent", "base") },
    ])
}

/// None 表示未知工具；Err 作为 isError 结果返回给调用方
fn call_tool(name: &str, args: &Value) -> Option<Result<f64, String>> {
    let num = |key: &str| {
        args.get(key)
            .and_then(Value::as_f64)
            .ok_or_else(|| format!("missing numeric argument '{key}'"))
    };
    let result = match name {
        "sqrt" => num("number").and_then(|n| {
            if n < 0.0 {
                Err(format!("cannot take sqrt of negative number {n}"))
            } else {
                Ok(n.sqrt())
            }
        }),
        "add" => num("a").and_then(|a| Ok(a + num("b")?)),
        "multiply" => num("a").and_then(|a| Ok(a * num("b")?)),
        "power" => num("base").and_then(|b| Ok(b.powf(num("exponent")?))),
        _ => return None,
    };
    Some(result.and_then(|v| {
        if v.is_finite() {
            Ok(v)
        } else {
            Err("result is not a finite number".to_string())
        }
    }))
}

fn tool_result(result: Result<f64, String>) -> Value {
    match result {
        Ok(v) => json!({
            "content": [{ "type": "text", "text": format_number(v) }],
            "isError": false,
        }),
        Err(message) => json!({
            "content": [{ "type": "text", "text": message }],
            "isError": true,
        }),
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}
