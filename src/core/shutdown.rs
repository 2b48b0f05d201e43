//! 优雅关闭
//!
//! ShutdownManager 持有 CancellationToken：收到 Ctrl+C / SIGTERM 时取消，
//! AgentExecutor 以同一个 token 中止在途的分解与工具调用。
//! 目标结束（或被中断）后，ShutdownCoordinator 负责收尾：写出 Ontology 快照、关闭工具会话、停止执行器。

use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::core::AgentExecutor;
use crate::ontology::OntologyStore;

/// 关闭原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownReason {
    /// Ctrl+C
    Interrupt,
    /// SIGTERM
    Terminate,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::Interrupt => f.write_str("interrupt"),
            ShutdownReason::Terminate => f.write_str("terminate"),
        }
    }
}

/// 关闭信号：第一次 shutdown 的原因被保留，之后的调用只是重复取消
#[derive(Debug, Default)]
pub struct ShutdownManager {
    token: CancellationToken,
    reason: OnceLock<ShutdownReason>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 交给执行器的取消 token
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn shutdown(&self, reason: ShutdownReason) {
        if self.reason.set(reason).is_ok() {
            tracing::info!(reason = %reason, "Shutdown requested");
        }
        self.token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn reason(&self) -> Option<ShutdownReason> {
        self.reason.get().copied()
    }

    /// 安装 Ctrl+C 与 SIGTERM 处理器
    pub fn install_signal_handlers(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                manager.shutdown(ShutdownReason::Interrupt);
            }
        });

        #[cfg(unix)]
        {
            let manager = Arc::clone(self);
            tokio::spawn(async move {
                use tokio::signal::unix::{signal, SignalKind};
                if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                    sigterm.recv().await;
                    manager.shutdown(ShutdownReason::Terminate);
                }
            });
        }
    }
}

/// 收尾结果
#[derive(Debug, Clone, Serialize)]
pub struct ShutdownReport {
    /// None 表示正常结束
    pub reason: Option<ShutdownReason>,
    /// Ontology 快照是否写出（未配置存储时为 false）
    pub persisted: bool,
    /// 关闭会话是否在期限内完成
    pub sessions_closed: bool,
}

/// 收尾协调器：快照 -> 关闭会话（带超时）-> 停止执行器
pub struct ShutdownCoordinator {
    manager: Arc<ShutdownManager>,
    store: Option<Arc<dyn OntologyStore>>,
    cleanup_timeout: Duration,
}

impl ShutdownCoordinator {
    pub fn new(manager: Arc<ShutdownManager>) -> Self {
        Self {
            manager,
            store: None,
            cleanup_timeout: Duration::from_secs(5),
        }
    }

    /// 收尾时把 Ontology 写入该存储
    pub fn with_store(mut self, store: Arc<dyn OntologyStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_cleanup_timeout(mut self, timeout: Duration) -> Self {
        self.cleanup_timeout = timeout;
        self
    }

    pub async fn finish(&self, executor: &mut AgentExecutor) -> ShutdownReport {
        let reason = self.manager.reason();
        if let Some(reason) = reason {
            tracing::warn!(reason = %reason, "Finishing after shutdown signal");
        }

        let persisted = match &self.store {
            Some(store) => match executor.ontology().persist(store.as_ref()) {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to persist ontology");
                    false
                }
            },
            None => false,
        };

        let sessions_closed = tokio::time::timeout(self.cleanup_timeout, executor.tools().cleanup())
            .await
            .is_ok();
        if !sessions_closed {
            tracing::warn!(
                timeout_ms = self.cleanup_timeout.as_millis() as u64,
                "Closing tool sessions timed out"
            );
        }
        executor.stop().await;

        ShutdownReport {
            reason,
            persisted,
            sessions_closed,
        }
    }
}
