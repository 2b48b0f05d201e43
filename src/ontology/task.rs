//! 任务（Task）：由目标分解得到的原子工作单元，绑定单个 action
//!
//! 生命周期：Pending -> InProgress -> Completed | Failed；Failed 且 can_retry() 时可由调用方重新 start()。

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::core::{AgentError, FailureKind};
use crate::tools::ToolOutput;

pub type TaskId = String;

/// 任务类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    InformationGathering,
    Analysis,
    Synthesis,
    #[default]
    Execution,
    Communication,
    Validation,
    Planning,
    Monitoring,
}

impl TaskType {
    pub const ALL: [TaskType; 8] = [
        TaskType::InformationGathering,
        TaskType::Analysis,
        TaskType::Synthesis,
        TaskType::Execution,
        TaskType::Communication,
        TaskType::Validation,
        TaskType::Planning,
        TaskType::Monitoring,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskType::InformationGathering => "information_gathering",
            TaskType::Analysis => "analysis",
            TaskType::Synthesis => "synthesis",
            TaskType::Execution => "execution",
            TaskType::Communication => "communication",
            TaskType::Validation => "validation",
            TaskType::Planning => "planning",
            TaskType::Monitoring => "monitoring",
        }
    }
}

/// 任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
    Blocked,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// 重试策略：只描述「能否、何时」重试，真正的重试由调用方发起
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub backoff_multiplier: f64,
    pub retry_on: Vec<FailureKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            retry_on: vec![FailureKind::Timeout, FailureKind::Connection],
        }
    }
}

impl RetryPolicy {
    /// 第 attempt 次（从 1 开始）重试前的等待：retry_delay * multiplier^(attempt-1)，超出范围时为 Duration::MAX
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if self.retry_delay.is_zero() {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.retry_delay.as_secs_f64() * self.backoff_multiplier.max(0.0).powi(exponent);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }

    pub fn retries_on(&self, kind: FailureKind) -> bool {
        self.retry_on.contains(&kind)
    }
}

/// 任务
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    /// 唯一用于工具解析的字段
    pub action: String,
    pub task_type: TaskType,
    pub description: String,
    /// 所属目标（反向引用）
    pub parent_goal: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    /// 完成或失败的时间
    pub completed_at: Option<DateTime<Utc>>,
    pub duration: Option<Duration>,
    pub attempts: u32,
    pub retry_policy: RetryPolicy,
    pub result: Option<ToolOutput>,
    pub confidence: Option<f64>,
    pub quality_score: Option<f64>,
    pub error_messages: Vec<String>,
    /// 实际使用的工具，形如 "server/tool"
    pub tool_used: Option<String>,
}

impl Task {
    pub fn new(
        action: impl Into<String>,
        task_type: TaskType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: format!("task_{}", uuid::Uuid::new_v4()),
            action: action.into(),
            task_type,
            description: description.into(),
            parent_goal: String::new(),
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            duration: None,
            attempts: 0,
            retry_policy: RetryPolicy::default(),
            result: None,
            confidence: None,
            quality_score: None,
            error_messages: Vec::new(),
            tool_used: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<TaskId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_parent_goal(mut self, goal_id: impl Into<String>) -> Self {
        self.parent_goal = goal_id.into();
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// 开始执行：InProgress、记录开始时间、attempts + 1
    pub fn start(&mut self) -> Result<(), AgentError> {
        let allowed = match self.status {
            TaskStatus::Pending | TaskStatus::Blocked => true,
            TaskStatus::Failed => self.can_retry(),
            _ => false,
        };
        if !allowed {
            return Err(AgentError::task_transition(
                &self.id,
                self.status,
                TaskStatus::InProgress,
            ));
        }
        self.status = TaskStatus::InProgress;
        self.started_at = Some(Utc::now());
        self.completed_at = None;
        self.duration = None;
        self.attempts += 1;
        Ok(())
    }

    pub fn mark_complete(
        &mut self,
        result: ToolOutput,
        confidence: f64,
        quality_score: f64,
    ) -> Result<(), AgentError> {
        self.finish(TaskStatus::Completed)?;
        self.result = Some(result);
        self.confidence = Some(confidence.clamp(0.0, 1.0));
        self.quality_score = Some(quality_score.clamp(0.0, 1.0));
        Ok(())
    }

    /// 标记完成但不写入结果（保留已有 result）
    pub fn mark_done(&mut self) -> Result<(), AgentError> {
        self.finish(TaskStatus::Completed)
    }

    pub fn mark_failed(&mut self, error_message: &str) -> Result<(), AgentError> {
        self.finish(TaskStatus::Failed)?;
        self.error_messages
            .push(format!("{}: {}", Utc::now().to_rfc3339(), error_message));
        Ok(())
    }

    fn finish(&mut self, next: TaskStatus) -> Result<(), AgentError> {
        if self.status != TaskStatus::InProgress {
            return Err(AgentError::task_transition(&self.id, self.status, next));
        }
        let now = Utc::now();
        self.status = next;
        self.completed_at = Some(now);
        self.duration = self
            .started_at
            .map(|started| (now - started).to_std().unwrap_or_default());
        Ok(())
    }

    /// 仅当 Failed 且尝试次数未达上限时可重试
    pub fn can_retry(&self) -> bool {
        self.status == TaskStatus::Failed && self.attempts < self.retry_policy.max_retries
    }

    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> Task {
        Task::new("calculate_square_root", TaskType::Execution, "sqrt of 144")
    }

    #[test]
    fn test_duration_only_after_start() {
        let mut t = task();
        assert!(t.duration.is_none());
        assert!(t.mark_complete(ToolOutput::Text("12".into()), 0.9, 0.8).is_err());

        t.start().unwrap();
        assert_eq!(t.attempts, 1);
        assert!(t.duration.is_none());

        t.mark_complete(ToolOutput::Text("12".into()), 0.9, 0.8).unwrap();
        let started = t.started_at.unwrap();
        let completed = t.completed_at.unwrap();
        assert_eq!(
            t.duration.unwrap(),
            (completed - started).to_std().unwrap()
        );
        assert_eq!(t.confidence, Some(0.9));
    }

    #[test]
    fn test_failure_records_duration_and_message() {
        let mut t = task();
        t.start().unwrap();
        t.mark_failed("connection reset").unwrap();
        assert_eq!(t.status, TaskStatus::Failed);
        assert!(t.duration.is_some());
        assert!(t.completed_at.is_some());
        assert!(t.error_messages[0].contains("connection reset"));
    }

    #[test]
    fn test_can_retry_until_max() {
        let mut t = task().with_retry_policy(RetryPolicy {
            max_retries: 2,
            ..Default::default()
        });
        assert!(!t.can_retry());

        t.start().unwrap();
        t.mark_failed("boom").unwrap();
        assert!(t.can_retry());

        t.start().unwrap();
        assert_eq!(t.attempts, 2);
        assert!(t.duration.is_none());
        t.mark_failed("boom again").unwrap();
        assert!(!t.can_retry());
        assert!(t.start().is_err());
    }

    #[test]
    fn test_completed_task_cannot_restart() {
        let mut t = task();
        t.start().unwrap();
        t.mark_complete(ToolOutput::Text("ok".into()), 0.9, 0.8).unwrap();
        assert!(!t.can_retry());
        assert!(t.start().is_err());
    }

    #[test]
    fn test_retry_delay_backoff() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(4));
        assert!(policy.retries_on(FailureKind::Timeout));
        assert!(!policy.retries_on(FailureKind::Tool));
    }

    #[test]
    fn test_retry_delay_saturates() {
        let policy = RetryPolicy {
            max_retries: 200,
            ..Default::default()
        };
        assert_eq!(policy.delay_for_attempt(80), Duration::MAX);
        assert_eq!(policy.delay_for_attempt(u32::MAX), Duration::MAX);

        let steady = RetryPolicy {
            backoff_multiplier: 1.0,
            ..Default::default()
        };
        assert_eq!(steady.delay_for_attempt(1_000), Duration::from_secs(1));

        let immediate = RetryPolicy {
            retry_delay: Duration::ZERO,
            backoff_multiplier: f64::INFINITY,
            ..Default::default()
        };
        assert_eq!(immediate.delay_for_attempt(5), Duration::ZERO);
    }
}
