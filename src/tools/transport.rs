//! 工具服务器传输层
//!
//! Transport 负责请求/响应关联（按 JSON-RPC id），TransportLauncher 负责按 ToolServerConfig 启动。
//! StdioTransport：子进程 stdin 写入一行请求，stdout 逐行读取直到 id 匹配；stderr 转为 debug 日志。

use std::process::Stdio;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use crate::tools::protocol;
use crate::tools::ToolServerConfig;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to spawn '{command}': {cause}")]
    Spawn { command: String, cause: String },

    #[error("Transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// 对端关闭（进程退出或管道断开）
    #[error("Transport closed")]
    Closed,

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("{0} timed out after {1:?}")]
    Timeout(&'static str, std::time::Duration),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl TransportError {
    pub fn is_closed(&self) -> bool {
        matches!(self, TransportError::Closed | TransportError::Io(_))
    }
}

/// 双向消息流：同一时刻仅一个请求在途（&mut self）
#[async_trait]
pub trait Transport: Send {
    /// 发送请求并等待对应 id 的响应，返回 result 字段
    async fn request(&mut self, method: &str, params: Value) -> Result<Value, TransportError>;

    async fn notify(&mut self, method: &str, params: Value) -> Result<(), TransportError>;

    /// 释放资源；可重复调用
    async fn close(&mut self);
}

/// 按配置启动传输
#[async_trait]
pub trait TransportLauncher: Send + Sync {
    async fn launch(&self, config: &ToolServerConfig) -> Result<Box<dyn Transport>, TransportError>;
}

/// 子进程 stdio 传输
pub struct StdioTransport {
    server: String,
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: Lines<BufReader<ChildStdout>>,
    next_id: u64,
}

impl StdioTransport {
    pub fn spawn(config: &ToolServerConfig) -> Result<Self, TransportError> {
        let spawn_err = |cause: String| TransportError::Spawn {
            command: config.command.clone(),
            cause,
        };
        let mut child = Command::new(&config.command)
            .args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| spawn_err(e.to_string()))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| spawn_err("stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| spawn_err("stdout not captured".to_string()))?;

        if let Some(stderr) = child.stderr.take() {
            let server = config.name.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(server = %server, "stderr: {}", line);
                }
            });
        }

        tracing::debug!(server = %config.name, command = %config.command, "Tool server process spawned");
        Ok(Self {
            server: config.name.clone(),
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout).lines(),
            next_id: 1,
        })
    }

    async fn write_line(&mut self, message: &Value) -> Result<(), TransportError> {
        let stdin = self.stdin.as_mut().ok_or(TransportError::Closed)?;
        let mut line = serde_json::to_string(message)?;
        line.push('\n');
        stdin.write_all(line.as_bytes()).await?;
        stdin.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn request(&mut self, method: &str, params: Value) -> Result<Value, TransportError> {
        let id = self.next_id;
        self.next_id += 1;
        self.write_line(&protocol::request(id, method, params)).await?;

        loop {
            let line = self
                .stdout
                .next_line()
                .await?
                .ok_or(TransportError::Closed)?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let message: Value = match serde_json::from_str(line) {
                Ok(v) => v,
                Err(e) => {
                    tracing::debug!(server = %self.server, error = %e, "Skipping non-JSON line");
                    continue;
                }
            };
            if message.get("id").and_then(Value::as_u64) != Some(id) {
                // 通知或过期响应
                continue;
            }
            if let Some(error) = message.get("error") {
                return Err(TransportError::Rpc {
                    code: error.get("code").and_then(Value::as_i64).unwrap_or(-32603),
                    message: error
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown error")
                        .to_string(),
                });
            }
            return message
                .get("result")
                .cloned()
                .ok_or_else(|| TransportError::Protocol("response without result".to_string()));
        }
    }

    async fn notify(&mut self, method: &str, params: Value) -> Result<(), TransportError> {
        self.write_line(&protocol::notification(method, params)).await
    }

    async fn close(&mut self) {
        // 关闭 stdin 让服务器自然退出，再兜底 kill
        self.stdin.take();
        if let Err(e) = self.child.start_kill() {
            tracing::debug!(server = %self.server, error = %e, "Tool server already exited");
        }
        let _ = tokio::time::timeout(std::time::Duration::from_secs(2), self.child.wait()).await;
    }
}

/// 以子进程方式启动工具服务器
#[derive(Debug, Default, Clone, Copy)]
pub struct StdioLauncher;

#[async_trait]
impl TransportLauncher for StdioLauncher {
    async fn launch(&self, config: &ToolServerConfig) -> Result<Box<dyn Transport>, TransportError> {
        Ok(Box::new(StdioTransport::spawn(config)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_executable_fails_to_spawn() {
        let config = ToolServerConfig::new("ghost", "/nonexistent/forage-ghost-server");
        let err = StdioLauncher.launch(&config).await.err().unwrap();
        assert!(matches!(err, TransportError::Spawn { .. }));
        assert!(err.to_string().contains("forage-ghost-server"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_request_against_cat_echo() {
        // cat 回显请求：id 匹配但没有 result 字段
        let config = ToolServerConfig::new("echo", "cat");
        let mut transport = StdioLauncher.launch(&config).await.unwrap();
        let err = transport
            .request("tools/list", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Protocol(_)));
        transport.close().await;
        transport.close().await;
    }
}
