//! 工具服务器协议：行分隔 JSON-RPC 2.0 消息与 tools/call 结果提取

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const JSONRPC_VERSION: &str = "2.0";
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// 构造请求行（不含换行）
pub fn request(id: u64, method: &str, params: Value) -> Value {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id,
        "method": method,
        "params": params,
    })
}

pub fn notification(method: &str, params: Value) -> Value {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "method": method,
        "params": params,
    })
}

pub fn success_response(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id,
        "result": result,
    })
}

pub fn error_response(id: Value, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id,
        "error": { "code": code, "message": message },
    })
}

/// 服务器声明的工具
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "inputSchema", default = "empty_schema")]
    pub input_schema: Value,
}

fn empty_schema() -> Value {
    json!({"type": "object", "properties": {}})
}

impl ToolInfo {
    /// inputSchema 中唯一的必填字符串参数名（若恰好一个）
    pub fn single_string_argument(&self) -> Option<&str> {
        let required = self.input_schema.get("required")?.as_array()?;
        let [name] = required.as_slice() else {
            return None;
        };
        let name = name.as_str()?;
        let ty = self.input_schema.get("properties")?.get(name)?.get("type")?;
        (ty == "string").then_some(name)
    }
}

/// 服务器声明的资源
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceInfo {
    pub uri: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "mimeType")]
    pub mime_type: Option<String>,
}

/// 工具调用结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ToolOutput {
    Text(String),
    Structured(Value),
    /// 工具自身报告的错误（isError）
    Error(String),
}

impl ToolOutput {
    /// 从 tools/call 的 result 提取：isError -> Error，structuredContent -> Structured，
    /// text 内容拼接 -> Text，其余原样作为 Structured
    pub fn from_call_result(result: &Value) -> Self {
        let text = joined_text(result);
        if result.get("isError").and_then(Value::as_bool) == Some(true) {
            return ToolOutput::Error(text.unwrap_or_else(|| result.to_string()));
        }
        if let Some(structured) = result.get("structuredContent") {
            return ToolOutput::Structured(structured.clone());
        }
        match text {
            Some(text) => ToolOutput::Text(text),
            None => ToolOutput::Structured(result.clone()),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ToolOutput::Error(_))
    }
}

fn joined_text(result: &Value) -> Option<String> {
    let parts: Vec<&str> = result
        .get("content")?
        .as_array()?
        .iter()
        .filter(|item| item.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|item| item.get("text").and_then(Value::as_str))
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n"))
    }
}

impl fmt::Display for ToolOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolOutput::Text(text) => f.write_str(text),
            ToolOutput::Structured(value) => write!(f, "{value}"),
            ToolOutput::Error(message) => write!(f, "error: {message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_content_joined() {
        let result = json!({
            "content": [
                {"type": "text", "text": "12"},
                {"type": "image", "data": "..."},
                {"type": "text", "text": "done"}
            ]
        });
        assert_eq!(
            ToolOutput::from_call_result(&result),
            ToolOutput::Text("12\ndone".into())
        );
    }

    #[test]
    fn test_is_error_wins() {
        let result = json!({
            "content": [{"type": "text", "text": "negative operand"}],
            "isError": true
        });
        assert_eq!(
            ToolOutput::from_call_result(&result),
            ToolOutput::Error("negative operand".into())
        );
    }

    #[test]
    fn test_structured_content() {
        let result = json!({
            "content": [{"type": "text", "text": "{\"value\":12}"}],
            "structuredContent": {"value": 12}
        });
        assert_eq!(
            ToolOutput::from_call_result(&result),
            ToolOutput::Structured(json!({"value": 12}))
        );
        let bare = json!({"value": 3});
        assert_eq!(
            ToolOutput::from_call_result(&bare),
            ToolOutput::Structured(bare.clone())
        );
    }

    #[test]
    fn test_single_string_argument() {
        let tool: ToolInfo = serde_json::from_value(json!({
            "name": "search",
            "inputSchema": {
                "type": "object",
                "properties": {"query": {"type": "string"}},
                "required": ["query"]
            }
        }))
        .unwrap();
        assert_eq!(tool.single_string_argument(), Some("query"));

        let tool: ToolInfo = serde_json::from_value(json!({"name": "noop"})).unwrap();
        assert_eq!(tool.single_string_argument(), None);
    }
}
