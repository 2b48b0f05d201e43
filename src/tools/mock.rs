//! Mock 工具服务器（进程内，用于测试与演示，无需子进程）
//!
//! MockLauncher 按服务器名返回 MockTransport；每个工具由闭包决定回复。
//! 所有 tools/call 都记录在共享的调用日志中供断言。

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::tools::protocol::{ResourceInfo, ToolInfo, PROTOCOL_VERSION};
use crate::tools::transport::{Transport, TransportError, TransportLauncher};
use crate::tools::ToolServerConfig;

/// 工具闭包的回复
#[derive(Debug, Clone)]
pub enum MockReply {
    /// tools/call 的 result
    Result(Value),
    /// result.isError = true
    ToolError(String),
    /// JSON-RPC error
    RpcError(String),
    /// 模拟进程退出
    Closed,
    /// 永不返回（测试超时）
    Hang,
}

impl MockReply {
    pub fn text(text: impl Into<String>) -> Self {
        MockReply::Result(json!({
            "content": [{"type": "text", "text": text.into()}]
        }))
    }
}

type Handler = Arc<dyn Fn(&Value) -> MockReply + Send + Sync>;

/// 一个 mock 服务器的工具与资源
#[derive(Clone, Default)]
pub struct MockServer {
    tools: Vec<ToolInfo>,
    handlers: HashMap<String, Handler>,
    resources: Option<Vec<ResourceInfo>>,
    fail_handshake: bool,
    silent: bool,
    relist_failure: Option<MockReply>,
}

impl MockServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tool<F>(mut self, name: &str, input_schema: Value, handler: F) -> Self
    where
        F: Fn(&Value) -> MockReply + Send + Sync + 'static,
    {
        self.tools.push(ToolInfo {
            name: name.to_string(),
            description: Some(format!("mock {name}")),
            input_schema,
        });
        self.handlers.insert(name.to_string(), Arc::new(handler));
        self
    }

    pub fn with_resources(mut self, resources: Vec<ResourceInfo>) -> Self {
        self.resources = Some(resources);
        self
    }

    /// 进程启动后对任何请求都不回复
    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    /// 握手之后的 tools/list 按给定回复失败（RpcError 或 Closed）
    pub fn failing_relist(mut self, reply: MockReply) -> Self {
        self.relist_failure = Some(reply);
        self
    }

    /// initialize 返回 RPC 错误
    pub fn failing_handshake(mut self) -> Self {
        self.fail_handshake = true;
        self
    }

    /// sqrt / add 两个工具的数学服务器
    pub fn math() -> Self {
        Self::new()
            .tool(
                "sqrt",
                json!({
                    "type": "object",
                    "properties": {"number": {"type": "number"}},
                    "required": ["number"]
                }),
                |args| match args.get("number").and_then(Value::as_f64) {
                    Some(n) if n >= 0.0 => MockReply::text(format_number(n.sqrt())),
                    Some(_) => MockReply::ToolError("cannot take sqrt of a negative number".into()),
                    None => MockReply::ToolError("missing 'number'".into()),
                },
            )
            .tool(
                "add",
                json!({
                    "type": "object",
                    "properties": {"a": {"type": "number"}, "b": {"type": "number"}},
                    "required": ["a", "b"]
                }),
                |args| {
                    let a = args.get("a").and_then(Value::as_f64).unwrap_or(0.0);
                    let b = args.get("b").and_then(Value::as_f64).unwrap_or(0.0);
                    MockReply::text(format_number(a + b))
                },
            )
    }

    /// write_file 工具的文件系统服务器（内容只回显，不落盘）
    pub fn filesystem() -> Self {
        Self::new().tool(
            "write_file",
            json!({
                "type": "object",
                "properties": {"path": {"type": "string"}, "content": {"type": "string"}},
                "required": ["path", "content"]
            }),
            |args| {
                let path = args.get("path").and_then(Value::as_str).unwrap_or("?");
                MockReply::text(format!("Successfully wrote to {path}"))
            },
        )
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// 记录的一次 tools/call
#[derive(Debug, Clone, PartialEq)]
pub struct MockCall {
    pub server: String,
    pub tool: String,
    pub args: Value,
}

/// 进程内启动器
#[derive(Clone, Default)]
pub struct MockLauncher {
    servers: HashMap<String, MockServer>,
    failing: HashMap<String, String>,
    calls: Arc<Mutex<Vec<MockCall>>>,
    launched: Arc<Mutex<HashSet<String>>>,
}

impl MockLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_server(mut self, name: &str, server: MockServer) -> Self {
        self.servers.insert(name.to_string(), server);
        self
    }

    /// launch 时直接失败（模拟进程无法启动）
    pub fn with_failing_launch(mut self, name: &str, cause: &str) -> Self {
        self.failing.insert(name.to_string(), cause.to_string());
        self
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn was_launched(&self, name: &str) -> bool {
        self.launched
            .lock()
            .map(|l| l.contains(name))
            .unwrap_or(false)
    }
}

#[async_trait]
impl TransportLauncher for MockLauncher {
    async fn launch(&self, config: &ToolServerConfig) -> Result<Box<dyn Transport>, TransportError> {
        if let Some(cause) = self.failing.get(&config.name) {
            return Err(TransportError::Spawn {
                command: config.command.clone(),
                cause: cause.clone(),
            });
        }
        let server = self
            .servers
            .get(&config.name)
            .cloned()
            .ok_or_else(|| TransportError::Spawn {
                command: config.command.clone(),
                cause: "No such file or directory".to_string(),
            })?;
        if let Ok(mut launched) = self.launched.lock() {
            launched.insert(config.name.clone());
        }
        Ok(Box::new(MockTransport {
            name: config.name.clone(),
            server,
            calls: Arc::clone(&self.calls),
            closed: false,
            listed: false,
        }))
    }
}

pub struct MockTransport {
    name: String,
    server: MockServer,
    calls: Arc<Mutex<Vec<MockCall>>>,
    closed: bool,
    listed: bool,
}

impl MockTransport {
    async fn reply(&mut self, reply: MockReply) -> Result<Value, TransportError> {
        match reply {
            MockReply::Result(result) => Ok(result),
            MockReply::ToolError(message) => Ok(json!({
                "content": [{"type": "text", "text": message}],
                "isError": true
            })),
            MockReply::RpcError(message) => Err(TransportError::Rpc {
                code: -32000,
                message,
            }),
            MockReply::Closed => {
                self.closed = true;
                Err(TransportError::Closed)
            }
            MockReply::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(TransportError::Closed)
            }
        }
    }

    async fn list_tools(&mut self) -> Result<Value, TransportError> {
        match (&self.server.relist_failure, self.listed) {
            (Some(failure), true) => {
                let failure = failure.clone();
                self.reply(failure).await
            }
            _ => {
                self.listed = true;
                Ok(json!({ "tools": self.server.tools }))
            }
        }
    }

    async fn call(&mut self, params: &Value) -> Result<Value, TransportError> {
        let tool = params.get("name").and_then(Value::as_str).unwrap_or_default();
        let args = params.get("arguments").cloned().unwrap_or(Value::Null);
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(MockCall {
                server: self.name.clone(),
                tool: tool.to_string(),
                args: args.clone(),
            });
        }
        let reply = match self.server.handlers.get(tool) {
            Some(handler) => handler(&args),
            None => MockReply::ToolError(format!("Unknown tool: {tool}")),
        };
        self.reply(reply).await
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn request(&mut self, method: &str, params: Value) -> Result<Value, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        if self.server.silent {
            return self.reply(MockReply::Hang).await;
        }
        match method {
            "initialize" if self.server.fail_handshake => Err(TransportError::Rpc {
                code: -32603,
                message: "initialize rejected".to_string(),
            }),
            "initialize" => Ok(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {"tools": {}},
                "serverInfo": {"name": self.name, "version": "0.0.0"}
            })),
            "tools/list" => self.list_tools().await,
            "resources/list" => match &self.server.resources {
                Some(resources) => Ok(json!({ "resources": resources })),
                None => Err(TransportError::Rpc {
                    code: -32601,
                    message: "Method not found".to_string(),
                }),
            },
            "tools/call" => self.call(&params).await,
            other => Err(TransportError::Rpc {
                code: -32601,
                message: format!("Method not found: {other}"),
            }),
        }
    }

    async fn notify(&mut self, _method: &str, _params: Value) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        Ok(())
    }

    async fn close(&mut self) {
        self.closed = true;
    }
}
