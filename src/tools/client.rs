//! ToolClient：管理多个工具服务器会话的连接生命周期与工具调用
//!
//! 每个服务器的状态：Absent -> Connecting -> Ready -> Absent（disconnect 或进程退出）。
//! 会话表在 RwLock 后面，每个会话各自一把 Mutex，保证同一服务器同时只有一个在途调用。
//! connect 的启动与握手受 connect_timeout 约束；invoke_tool 加超时并输出结构化审计日志（JSON）。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tokio::time::timeout;

use crate::core::AgentError;
use crate::tools::protocol::{ResourceInfo, ToolInfo, ToolOutput};
use crate::tools::session::ToolSession;
use crate::tools::transport::{StdioLauncher, TransportLauncher};
use crate::tools::{ToolServerConfig, ToolServerRegistry};

/// 单个服务器的连接状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Absent,
    Connecting,
    Ready,
}

/// list_tools 的一项：工具及其所属服务器
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerTool {
    pub server: String,
    #[serde(flatten)]
    pub tool: ToolInfo,
}

type SharedSession = Arc<Mutex<ToolSession>>;

pub struct ToolClient {
    registry: RwLock<ToolServerRegistry>,
    launcher: Arc<dyn TransportLauncher>,
    sessions: RwLock<HashMap<String, SharedSession>>,
    connecting: std::sync::Mutex<HashSet<String>>,
    call_timeout: Duration,
    connect_timeout: Duration,
}

/// connect 期间占住 connecting 标记，drop 时释放
struct ConnectingGuard<'a> {
    set: &'a std::sync::Mutex<HashSet<String>>,
    name: String,
}

impl Drop for ConnectingGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut set) = self.set.lock() {
            set.remove(&self.name);
        }
    }
}

impl ToolClient {
    /// 使用子进程 stdio 启动器
    pub fn new(registry: ToolServerRegistry, call_timeout: Duration) -> Self {
        Self::with_launcher(registry, Arc::new(StdioLauncher), call_timeout)
    }

    pub fn with_launcher(
        registry: ToolServerRegistry,
        launcher: Arc<dyn TransportLauncher>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            registry: RwLock::new(registry),
            launcher,
            sessions: RwLock::new(HashMap::new()),
            connecting: std::sync::Mutex::new(HashSet::new()),
            call_timeout,
            connect_timeout: call_timeout,
        }
    }

    /// 启动 + 握手的期限，默认与 call_timeout 相同
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub async fn register_server(&self, config: ToolServerConfig) -> Result<(), AgentError> {
        self.registry.write().await.register(config)
    }

    pub async fn server_names(&self) -> Vec<String> {
        self.registry.read().await.names()
    }

    pub async fn state(&self, server: &str) -> SessionState {
        if self.sessions.read().await.contains_key(server) {
            return SessionState::Ready;
        }
        let connecting = self
            .connecting
            .lock()
            .map(|set| set.contains(server))
            .unwrap_or(false);
        if connecting {
            SessionState::Connecting
        } else {
            SessionState::Absent
        }
    }

    pub async fn connected_servers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    fn begin_connecting(&self, server: &str) -> Result<ConnectingGuard<'_>, AgentError> {
        let mut set = self.connecting.lock().map_err(|_| AgentError::Connection {
            server: server.to_string(),
            cause: "connection state poisoned".to_string(),
        })?;
        if !set.insert(server.to_string()) {
            return Err(AgentError::Connection {
                server: server.to_string(),
                cause: "connection already in progress".to_string(),
            });
        }
        Ok(ConnectingGuard {
            set: &self.connecting,
            name: server.to_string(),
        })
    }

    /// 连接服务器：已就绪时 no-op；启动或握手失败、超时返回 Connection，会话不会登记
    pub async fn connect(&self, server: &str) -> Result<(), AgentError> {
        if self.sessions.read().await.contains_key(server) {
            return Ok(());
        }
        let config = self.registry.read().await.get(server)?.clone();
        let _guard = self.begin_connecting(server)?;
        if self.sessions.read().await.contains_key(server) {
            return Ok(());
        }

        tracing::info!(server = %server, command = %config.command, "Connecting to tool server");
        let connection_err = |cause: String| AgentError::Connection {
            server: server.to_string(),
            cause,
        };
        let started = Instant::now();
        let transport = timeout(self.connect_timeout, self.launcher.launch(&config))
            .await
            .map_err(|_| connection_err(format!("launch timed out after {:?}", self.connect_timeout)))?
            .map_err(|e| connection_err(e.to_string()))?;
        let remaining = self.connect_timeout.saturating_sub(started.elapsed());
        let session = ToolSession::open(server, transport, remaining)
            .await
            .map_err(|e| {
                tracing::warn!(server = %server, error = %e, "Tool server handshake failed");
                connection_err(e.to_string())
            })?;

        self.sessions
            .write()
            .await
            .insert(server.to_string(), Arc::new(Mutex::new(session)));
        Ok(())
    }

    /// 断开服务器；未连接时 no-op
    pub async fn disconnect(&self, server: &str) {
        let removed = self.sessions.write().await.remove(server);
        if let Some(session) = removed {
            session.lock().await.close().await;
            tracing::info!(server = %server, "Disconnected from tool server");
        }
    }

    async fn session(&self, server: &str) -> Option<SharedSession> {
        self.sessions.read().await.get(server).cloned()
    }

    /// 进程退出后把会话移出（仅当仍是同一个会话）
    async fn drop_dead_session(&self, server: &str, dead: &SharedSession) {
        let removed = {
            let mut sessions = self.sessions.write().await;
            match sessions.get(server) {
                Some(current) if Arc::ptr_eq(current, dead) => sessions.remove(server),
                _ => None,
            }
        };
        if let Some(session) = removed {
            session.lock().await.close().await;
            tracing::warn!(server = %server, "Tool server transport closed, session dropped");
        }
    }

    /// 列出工具（指定服务器或全部就绪会话）；单个会话失败只记录日志并跳过
    pub async fn list_tools(&self, server: Option<&str>) -> Vec<ServerTool> {
        let targets: Vec<(String, SharedSession)> = {
            let sessions = self.sessions.read().await;
            let mut targets: Vec<(String, SharedSession)> = match server {
                Some(name) => sessions
                    .get(name)
                    .map(|s| vec![(name.to_string(), Arc::clone(s))])
                    .unwrap_or_default(),
                None => sessions
                    .iter()
                    .map(|(name, s)| (name.clone(), Arc::clone(s)))
                    .collect(),
            };
            targets.sort_by(|a, b| a.0.cmp(&b.0));
            targets
        };

        let mut all = Vec::new();
        for (name, session) in targets {
            let listed = timeout(self.call_timeout, async {
                session.lock().await.list_tools().await
            })
            .await;
            match listed {
                Ok(Ok(tools)) => all.extend(tools.into_iter().map(|tool| ServerTool {
                    server: name.clone(),
                    tool,
                })),
                Ok(Err(e)) => {
                    tracing::warn!(server = %name, error = %e, "Failed to list tools, skipping");
                    if e.is_closed() {
                        self.drop_dead_session(&name, &session).await;
                    }
                }
                Err(_) => {
                    tracing::warn!(server = %name, "Listing tools timed out, skipping");
                }
            }
        }
        all
    }

    /// 连接时缓存的资源列表（服务器不支持 resources/list 时为空）
    pub async fn cached_resources(&self, server: &str) -> Option<Vec<ResourceInfo>> {
        let session = self.session(server).await?;
        let resources = session.lock().await.resources().to_vec();
        Some(resources)
    }

    /// 连接时缓存的工具列表
    pub async fn cached_tools(&self, server: &str) -> Option<Vec<ToolInfo>> {
        let session = self.session(server).await?;
        let tools = session.lock().await.tools().to_vec();
        Some(tools)
    }

    /// 调用工具：未连接返回 NotConnected；isError 与传输错误包装为 ToolInvocation；超时返回 ToolTimeout
    pub async fn invoke_tool(
        &self,
        server: &str,
        tool: &str,
        args: Value,
    ) -> Result<ToolOutput, AgentError> {
        let session = self
            .session(server)
            .await
            .ok_or_else(|| AgentError::NotConnected(server.to_string()))?;

        let start = Instant::now();
        let args_preview = args_preview(&args);
        let result = timeout(self.call_timeout, async {
            session.lock().await.call_tool(tool, args).await
        })
        .await;

        let outcome = match &result {
            Ok(Ok(raw)) if raw.get("isError").and_then(Value::as_bool) == Some(true) => {
                "tool_error"
            }
            Ok(Ok(_)) => "ok",
            Ok(Err(_)) => "error",
            Err(_) => "timeout",
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "server": server,
            "tool": tool,
            "ok": outcome == "ok",
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        let invocation_err = |cause: String| AgentError::ToolInvocation {
            server: server.to_string(),
            tool: tool.to_string(),
            cause,
        };
        match result {
            Ok(Ok(raw)) => match ToolOutput::from_call_result(&raw) {
                ToolOutput::Error(message) => Err(invocation_err(message)),
                output => Ok(output),
            },
            Ok(Err(e)) => {
                if e.is_closed() {
                    self.drop_dead_session(server, &session).await;
                }
                Err(invocation_err(e.to_string()))
            }
            Err(_) => Err(AgentError::ToolTimeout {
                server: server.to_string(),
                tool: tool.to_string(),
            }),
        }
    }

    /// 关闭所有会话；可重复调用，不会失败
    pub async fn cleanup(&self) {
        let drained: Vec<(String, SharedSession)> =
            self.sessions.write().await.drain().collect();
        for (name, session) in drained {
            session.lock().await.close().await;
            tracing::debug!(server = %name, "Session released");
        }
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::mock::{MockLauncher, MockReply, MockServer};
    use serde_json::json;

    fn registry() -> ToolServerRegistry {
        let mut registry = ToolServerRegistry::with_defaults();
        registry
            .register(ToolServerConfig::new("flaky", "flaky-server"))
            .unwrap();
        registry
    }

    fn client(launcher: MockLauncher) -> ToolClient {
        ToolClient::with_launcher(registry(), Arc::new(launcher), Duration::from_millis(200))
    }

    #[tokio::test]
    async fn test_connect_and_invoke() {
        let launcher = MockLauncher::new().with_server("local-math", MockServer::math());
        let client = client(launcher.clone());
        assert_eq!(client.state("local-math").await, SessionState::Absent);

        client.connect("local-math").await.unwrap();
        client.connect("local-math").await.unwrap();
        assert_eq!(client.state("local-math").await, SessionState::Ready);

        let output = client
            .invoke_tool("local-math", "sqrt", json!({"number": 144}))
            .await
            .unwrap();
        assert_eq!(output, ToolOutput::Text("12".into()));
        assert_eq!(launcher.calls().len(), 1);
        assert_eq!(client.cached_tools("local-math").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_connect_failures() {
        let launcher = MockLauncher::new()
            .with_failing_launch("filesystem", "spawn npx ENOENT")
            .with_server("flaky", MockServer::math().failing_handshake());
        let client = client(launcher.clone());

        let err = client.connect("filesystem").await.unwrap_err();
        assert!(matches!(&err, AgentError::Connection { server, .. } if server == "filesystem"));
        assert!(err.to_string().contains("ENOENT"));
        assert_eq!(client.state("filesystem").await, SessionState::Absent);
        assert!(!launcher.was_launched("filesystem"));

        let err = client.connect("flaky").await.unwrap_err();
        assert!(matches!(err, AgentError::Connection { .. }));
        assert!(launcher.was_launched("flaky"));
        assert!(client.connected_servers().await.is_empty());

        assert!(matches!(
            client.connect("nope").await,
            Err(AgentError::UnknownServer(_))
        ));
    }

    #[tokio::test]
    async fn test_invoke_errors() {
        let server = MockServer::math()
            .tool("slow", json!({}), |_| MockReply::Hang)
            .tool("crash", json!({}), |_| MockReply::Closed);
        let client = client(MockLauncher::new().with_server("local-math", server));

        assert!(matches!(
            client.invoke_tool("local-math", "sqrt", json!({})).await,
            Err(AgentError::NotConnected(_))
        ));

        client.connect("local-math").await.unwrap();
        let err = client
            .invoke_tool("local-math", "sqrt", json!({"number": -4}))
            .await
            .unwrap_err();
        assert!(
            matches!(&err, AgentError::ToolInvocation { tool, cause, .. } if tool == "sqrt" && cause.contains("negative"))
        );

        let err = client
            .invoke_tool("local-math", "slow", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ToolTimeout { .. }));

        let err = client
            .invoke_tool("local-math", "crash", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ToolInvocation { .. }));
        assert_eq!(client.state("local-math").await, SessionState::Absent);
    }

    #[tokio::test]
    async fn test_list_tools_and_cleanup() {
        let launcher = MockLauncher::new()
            .with_server("local-math", MockServer::math())
            .with_server("filesystem", MockServer::filesystem());
        let client = client(launcher);
        assert!(client.list_tools(None).await.is_empty());

        client.connect("local-math").await.unwrap();
        client.connect("filesystem").await.unwrap();
        assert_eq!(client.list_tools(None).await.len(), 3);
        let fs_tools = client.list_tools(Some("filesystem")).await;
        assert_eq!(fs_tools.len(), 1);
        assert_eq!(fs_tools[0].server, "filesystem");

        client.disconnect("filesystem").await;
        client.disconnect("filesystem").await;
        assert_eq!(client.connected_servers().await, vec!["local-math"]);

        client.cleanup().await;
        client.cleanup().await;
        assert!(client.connected_servers().await.is_empty());
    }

    #[tokio::test]
    async fn test_silent_server_times_out_without_blocking_others() {
        let launcher = MockLauncher::new()
            .with_server("flaky", MockServer::math().silent())
            .with_server("local-math", MockServer::math());
        let client = client(launcher).with_connect_timeout(Duration::from_millis(100));

        let err = timeout(Duration::from_secs(3), client.connect("flaky"))
            .await
            .expect("connect must give up on its own")
            .unwrap_err();
        assert!(
            matches!(&err, AgentError::Connection { server, cause } if server == "flaky" && cause.contains("handshake timed out"))
        );
        assert_eq!(client.state("flaky").await, SessionState::Absent);

        client.connect("local-math").await.unwrap();
        assert_eq!(client.connected_servers().await, vec!["local-math"]);
    }

    #[tokio::test]
    async fn test_list_tools_skips_failing_sessions() {
        let launcher = MockLauncher::new()
            .with_server("local-math", MockServer::math())
            .with_server(
                "filesystem",
                MockServer::filesystem().failing_relist(MockReply::RpcError("busy".into())),
            )
            .with_server("flaky", MockServer::math().failing_relist(MockReply::Closed));
        let client = client(launcher);
        for name in ["local-math", "filesystem", "flaky"] {
            client.connect(name).await.unwrap();
        }

        let tools = client.list_tools(None).await;
        assert_eq!(tools.len(), 2);
        assert!(tools.iter().all(|t| t.server == "local-math"));

        // RPC 错误只跳过；传输关闭则移除会话
        assert_eq!(
            client.connected_servers().await,
            vec!["filesystem", "local-math"]
        );
        assert_eq!(client.state("flaky").await, SessionState::Absent);
    }

    #[tokio::test]
    async fn test_resources_cached_on_connect() {
        let resources = vec![ResourceInfo {
            uri: "file:///notes.txt".into(),
            name: Some("notes".into()),
            mime_type: Some("text/plain".into()),
        }];
        let launcher = MockLauncher::new()
            .with_server("filesystem", MockServer::filesystem().with_resources(resources.clone()))
            .with_server("local-math", MockServer::math());
        let client = client(launcher);
        client.connect("filesystem").await.unwrap();
        client.connect("local-math").await.unwrap();

        assert_eq!(client.cached_resources("filesystem").await, Some(resources));
        assert_eq!(client.cached_resources("local-math").await, Some(Vec::new()));
        assert_eq!(client.cached_resources("flaky").await, None);
    }
}
