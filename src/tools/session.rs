//! ToolSession：一个已握手的工具服务器会话
//!
//! open() 完成 initialize + notifications/initialized，缓存 tools/list；resources/list 尽力而为。
//! 整个握手受 handshake_timeout 约束，超时后关闭传输。

use std::time::Duration;

use serde_json::{json, Value};

use crate::tools::protocol::{ResourceInfo, ToolInfo, PROTOCOL_VERSION};
use crate::tools::transport::{Transport, TransportError};

pub struct ToolSession {
    server: String,
    transport: Box<dyn Transport>,
    tools: Vec<ToolInfo>,
    resources: Vec<ResourceInfo>,
}

impl ToolSession {
    /// 握手并缓存工具列表；失败或超时时关闭传输后返回错误
    pub async fn open(
        server: &str,
        mut transport: Box<dyn Transport>,
        handshake_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let handshake = tokio::time::timeout(handshake_timeout, Self::handshake(transport.as_mut()))
            .await
            .unwrap_or(Err(TransportError::Timeout("handshake", handshake_timeout)));
        match handshake {
            Ok((tools, resources)) => {
                tracing::info!(
                    server = %server,
                    tools = tools.len(),
                    resources = resources.len(),
                    "Tool session ready"
                );
                Ok(Self {
                    server: server.to_string(),
                    transport,
                    tools,
                    resources,
                })
            }
            Err(e) => {
                transport.close().await;
                Err(e)
            }
        }
    }

    async fn handshake(
        transport: &mut dyn Transport,
    ) -> Result<(Vec<ToolInfo>, Vec<ResourceInfo>), TransportError> {
        transport
            .request(
                "initialize",
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {
                        "name": "forage",
                        "version": env!("CARGO_PKG_VERSION"),
                    }
                }),
            )
            .await?;
        transport.notify("notifications/initialized", json!({})).await?;

        let tools = parse_list::<ToolInfo>(transport.request("tools/list", json!({})).await?, "tools")?;

        let resources = match transport.request("resources/list", json!({})).await {
            Ok(result) => parse_list::<ResourceInfo>(result, "resources").unwrap_or_default(),
            Err(e) if e.is_closed() => return Err(e),
            Err(e) => {
                tracing::debug!(error = %e, "Server does not list resources");
                Vec::new()
            }
        };
        Ok((tools, resources))
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn tools(&self) -> &[ToolInfo] {
        &self.tools
    }

    pub fn resources(&self) -> &[ResourceInfo] {
        &self.resources
    }

    /// 重新查询 tools/list 并刷新缓存
    pub async fn list_tools(&mut self) -> Result<Vec<ToolInfo>, TransportError> {
        let result = self.transport.request("tools/list", json!({})).await?;
        self.tools = parse_list(result, "tools")?;
        Ok(self.tools.clone())
    }

    /// tools/call，返回原始 result
    pub async fn call_tool(&mut self, tool: &str, arguments: Value) -> Result<Value, TransportError> {
        self.transport
            .request("tools/call", json!({ "name": tool, "arguments": arguments }))
            .await
    }

    pub async fn close(&mut self) {
        self.transport.close().await;
        tracing::debug!(server = %self.server, "Tool session closed");
    }
}

fn parse_list<T: serde::de::DeserializeOwned>(
    mut result: Value,
    field: &str,
) -> Result<Vec<T>, TransportError> {
    match result.get_mut(field).map(Value::take) {
        Some(list) => Ok(serde_json::from_value(list)?),
        None => Err(TransportError::Protocol(format!("missing '{field}' in response"))),
    }
}
