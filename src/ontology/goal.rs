//! 目标（Goal）：描述、类型、优先级/紧急度、时间约束与生命周期状态
//!
//! 状态单调推进：Pending -> InProgress -> Completed | Failed；InProgress 与 Paused 可互转，
//! 非终态可取消。终态之后不再接受任何迁移。

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::AgentError;

pub type GoalId = String;

/// 目标类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalType {
    /// 完成某件事
    #[default]
    Achievement,
    /// 保持某件事持续运行
    Maintenance,
    /// 阻止某件事发生
    Avoidance,
    /// 探索 / 学习
    Exploration,
}

/// 目标状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
    Paused,
    Cancelled,
}

impl GoalStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            GoalStatus::Completed | GoalStatus::Failed | GoalStatus::Cancelled
        )
    }

    /// 是否允许从当前状态迁移到 next
    pub fn can_transition_to(self, next: GoalStatus) -> bool {
        matches!(
            (self, next),
            (GoalStatus::Pending, GoalStatus::InProgress)
                | (GoalStatus::Pending, GoalStatus::Cancelled)
                | (GoalStatus::InProgress, GoalStatus::Completed)
                | (GoalStatus::InProgress, GoalStatus::Failed)
                | (GoalStatus::InProgress, GoalStatus::Paused)
                | (GoalStatus::InProgress, GoalStatus::Cancelled)
                | (GoalStatus::Paused, GoalStatus::InProgress)
                | (GoalStatus::Paused, GoalStatus::Cancelled)
        )
    }
}

impl fmt::Display for GoalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GoalStatus::Pending => "pending",
            GoalStatus::InProgress => "in_progress",
            GoalStatus::Completed => "completed",
            GoalStatus::Failed => "failed",
            GoalStatus::Paused => "paused",
            GoalStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// 时间约束
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeConstraint {
    pub deadline: Option<DateTime<Utc>>,
    pub estimated_duration: Option<Duration>,
    /// 执行器将其作为整体执行期限
    pub max_duration: Option<Duration>,
}

/// 目标
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub id: GoalId,
    pub description: String,
    pub goal_type: GoalType,
    /// 数值越小越重要
    pub priority: u8,
    /// 数值越大越紧急
    pub urgency: u8,
    pub time_constraints: Option<TimeConstraint>,
    pub status: GoalStatus,
    /// 0.0 - 1.0
    pub progress: f64,
    /// progress 达到该阈值时自动完成
    pub completion_threshold: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub attempts: u32,
    pub failure_reasons: Vec<String>,
    pub lessons_learned: Vec<String>,
}

impl Goal {
    pub fn new(description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: format!("goal_{}", uuid::Uuid::new_v4()),
            description: description.into(),
            goal_type: GoalType::Achievement,
            priority: 5,
            urgency: 5,
            time_constraints: None,
            status: GoalStatus::Pending,
            progress: 0.0,
            completion_threshold: 1.0,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            attempts: 0,
            failure_reasons: Vec::new(),
            lessons_learned: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<GoalId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_type(mut self, goal_type: GoalType) -> Self {
        self.goal_type = goal_type;
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_urgency(mut self, urgency: u8) -> Self {
        self.urgency = urgency;
        self
    }

    pub fn with_time_constraints(mut self, constraints: TimeConstraint) -> Self {
        self.time_constraints = Some(constraints);
        self
    }

    /// 迁移状态并维护时间戳；非法迁移返回 InvalidTransition
    pub fn transition(&mut self, next: GoalStatus) -> Result<(), AgentError> {
        if !self.status.can_transition_to(next) {
            return Err(AgentError::goal_transition(&self.id, self.status, next));
        }
        let now = Utc::now();
        match next {
            GoalStatus::InProgress if self.started_at.is_none() => self.started_at = Some(now),
            GoalStatus::Completed => {
                self.completed_at = Some(now);
                self.progress = 1.0;
            }
            _ => {}
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    /// 更新进度；达到 completion_threshold 时强制 Completed
    pub fn update_progress(&mut self, progress: f64, notes: &str) {
        let now = Utc::now();
        self.progress = progress.clamp(0.0, 1.0);
        self.updated_at = now;
        if !notes.is_empty() {
            self.lessons_learned.push(format!("{}: {}", now.to_rfc3339(), notes));
        }
        if self.progress >= self.completion_threshold && !self.status.is_terminal() {
            self.status = GoalStatus::Completed;
            self.completed_at = Some(now);
        }
    }

    pub fn add_failure_reason(&mut self, reason: &str) {
        self.failure_reasons
            .push(format!("{}: {}", Utc::now().to_rfc3339(), reason));
        self.attempts += 1;
    }

    pub fn is_overdue(&self) -> bool {
        self.time_constraints
            .as_ref()
            .and_then(|tc| tc.deadline)
            .is_some_and(|deadline| Utc::now() > deadline)
    }

    /// 综合优先级分数：priority 反转归一化与 urgency 归一化的平均值
    pub fn priority_score(&self) -> f64 {
        let priority_score = (11.0 - f64::from(self.priority)) / 10.0;
        let urgency_score = f64::from(self.urgency) / 10.0;
        (priority_score + urgency_score) / 2.0
    }

    pub fn max_duration(&self) -> Option<Duration> {
        self.time_constraints.as_ref().and_then(|tc| tc.max_duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_transitions() {
        let mut goal = Goal::new("Calculate the square root of 144");
        assert!(goal.transition(GoalStatus::Completed).is_err());

        goal.transition(GoalStatus::InProgress).unwrap();
        assert!(goal.started_at.is_some());

        goal.transition(GoalStatus::Failed).unwrap();
        assert!(goal.transition(GoalStatus::InProgress).is_err());
        assert!(goal.transition(GoalStatus::Completed).is_err());
        assert_eq!(goal.status, GoalStatus::Failed);
    }

    #[test]
    fn test_pause_and_resume() {
        let mut goal = Goal::new("watch the logs").with_type(GoalType::Maintenance);
        goal.transition(GoalStatus::InProgress).unwrap();
        let started = goal.started_at;
        goal.transition(GoalStatus::Paused).unwrap();
        goal.transition(GoalStatus::InProgress).unwrap();
        assert_eq!(goal.started_at, started);
    }

    #[test]
    fn test_progress_threshold_forces_completion() {
        let mut goal = Goal::new("explore");
        goal.transition(GoalStatus::InProgress).unwrap();
        goal.update_progress(0.5, "halfway");
        assert_eq!(goal.status, GoalStatus::InProgress);
        assert_eq!(goal.lessons_learned.len(), 1);

        goal.update_progress(1.4, "");
        assert_eq!(goal.progress, 1.0);
        assert_eq!(goal.status, GoalStatus::Completed);
        assert!(goal.completed_at.is_some());
    }

    #[test]
    fn test_progress_does_not_revive_failed_goal() {
        let mut goal = Goal::new("doomed");
        goal.transition(GoalStatus::InProgress).unwrap();
        goal.transition(GoalStatus::Failed).unwrap();
        goal.update_progress(1.0, "");
        assert_eq!(goal.status, GoalStatus::Failed);
    }

    #[test]
    fn test_priority_score_and_overdue() {
        let goal = Goal::new("urgent").with_priority(1).with_urgency(10);
        assert!((goal.priority_score() - 1.0).abs() < f64::EPSILON);
        assert!(!goal.is_overdue());

        let past = Utc::now() - chrono::Duration::seconds(5);
        let goal = goal.with_time_constraints(TimeConstraint {
            deadline: Some(past),
            ..Default::default()
        });
        assert!(goal.is_overdue());
    }

    #[test]
    fn test_failure_reason_counts_attempt() {
        let mut goal = Goal::new("retry me");
        goal.add_failure_reason("tool crashed");
        assert_eq!(goal.attempts, 1);
        assert!(goal.failure_reasons[0].contains("tool crashed"));
    }
}
