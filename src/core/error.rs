//! Agent 错误类型与失败分类
//!
//! AgentError 覆盖连接、调用、分解、状态机各层；FailureKind 供 Task 的 RetryPolicy 判断是否可重试。

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ontology::{GoalStatus, TaskStatus};

/// 执行核心中可能出现的错误（工具服务器、任务分发、目标状态机等）
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Unknown server: {0}")]
    UnknownServer(String),

    #[error("Server name already exists: {0}")]
    ServerAlreadyExists(String),

    /// 启动进程或握手失败；该服务器保持 absent
    #[error("Failed to connect to server '{server}': {cause}")]
    Connection { server: String, cause: String },

    #[error("Not connected to server: {0}")]
    NotConnected(String),

    /// 工具侧错误或传输错误，附带服务器与工具上下文
    #[error("Tool '{tool}' on server '{server}' failed: {cause}")]
    ToolInvocation {
        server: String,
        tool: String,
        cause: String,
    },

    #[error("Tool '{tool}' on server '{server}' timed out")]
    ToolTimeout { server: String, tool: String },

    #[error("Action {0} not allowed by agent constraints")]
    ActionRejected(String),

    #[error("Goal decomposition failed: {0}")]
    DecompositionFailed(String),

    #[error("Goal decomposition produced no tasks")]
    NoTasksProduced,

    #[error("Task {task_id} failed: {error}")]
    TaskFailed { task_id: String, error: String },

    #[error("Goal feasibility too low: {0}")]
    FeasibilityTooLow(f64),

    #[error("Goal not found: {0}")]
    GoalNotFound(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Invalid transition for {id}: {from} -> {to}")]
    InvalidTransition { id: String, from: String, to: String },

    #[error("Execution timed out: {0}")]
    Timeout(String),

    #[error("Execution cancelled")]
    Cancelled,

    #[error("Config error: {0}")]
    Config(String),
}

impl AgentError {
    pub(crate) fn goal_transition(id: &str, from: GoalStatus, to: GoalStatus) -> Self {
        Self::InvalidTransition {
            id: id.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub(crate) fn task_transition(id: &str, from: TaskStatus, to: TaskStatus) -> Self {
        Self::InvalidTransition {
            id: id.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// 错误归类，供 RetryPolicy::retries_on 判断
    pub fn kind(&self) -> FailureKind {
        match self {
            AgentError::Connection { .. } | AgentError::NotConnected(_) => FailureKind::Connection,
            AgentError::ToolTimeout { .. } | AgentError::Timeout(_) => FailureKind::Timeout,
            AgentError::ToolInvocation { .. } | AgentError::TaskFailed { .. } => FailureKind::Tool,
            AgentError::ActionRejected(_) => FailureKind::Rejected,
            AgentError::DecompositionFailed(_) | AgentError::NoTasksProduced => {
                FailureKind::Decomposition
            }
            AgentError::Cancelled => FailureKind::Cancelled,
            _ => FailureKind::Internal,
        }
    }
}

/// 失败类别（RetryPolicy.retry_on 中的取值）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    Connection,
    Tool,
    Rejected,
    Decomposition,
    Cancelled,
    Internal,
}
