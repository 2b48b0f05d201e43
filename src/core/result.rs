//! 执行结果：TaskResult / GoalResult / AgentStatus
//!
//! execute_goal 的每条路径都以 GoalResult 返回，错误只体现为 success=false 与 error 字段。

use std::time::Duration;

use serde::Serialize;

use crate::core::{AgentError, FailureKind};
use crate::tools::ToolOutput;

#[derive(Debug, Clone, Serialize)]
pub struct TaskResult {
    pub task_id: String,
    pub action: String,
    pub success: bool,
    pub result: Option<ToolOutput>,
    pub tool_used: Option<String>,
    pub error: Option<String>,
    pub error_kind: Option<FailureKind>,
}

impl TaskResult {
    pub fn success(task_id: &str, action: &str, result: ToolOutput, tool_used: &str) -> Self {
        Self {
            task_id: task_id.to_string(),
            action: action.to_string(),
            success: true,
            result: Some(result),
            tool_used: Some(tool_used.to_string()),
            error: None,
            error_kind: None,
        }
    }

    pub fn failure(task_id: &str, action: &str, error: &AgentError) -> Self {
        Self {
            task_id: task_id.to_string(),
            action: action.to_string(),
            success: false,
            result: None,
            tool_used: None,
            error: Some(error.to_string()),
            error_kind: Some(error.kind()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GoalResult {
    pub goal_id: String,
    pub success: bool,
    pub task_results: Vec<TaskResult>,
    pub error: Option<String>,
    /// 导致目标失败的任务
    pub failed_task: Option<String>,
    pub execution_time: Duration,
}

impl GoalResult {
    pub(crate) fn failure(goal_id: &str, error: &AgentError, execution_time: Duration) -> Self {
        Self {
            goal_id: goal_id.to_string(),
            success: false,
            task_results: Vec::new(),
            error: Some(error.to_string()),
            failed_task: None,
            execution_time,
        }
    }
}

/// Agent 运行状态快照
#[derive(Debug, Clone, Serialize)]
pub struct AgentStatus {
    pub agent_name: String,
    pub is_running: bool,
    pub active_goals: usize,
    pub pending_tasks: usize,
    pub connected_servers: Vec<String>,
}
