//! Ontology：Agent 的身份、目标与任务的权威内存记录
//!
//! 目标与任务各自只存在于一张 HashMap 中；active / pending 视图由状态推导。
//! 所有修改都经由本结构的方法，外部无法直接触碰内部 map。

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::AgentError;
use crate::decompose::{template_plan, TaskSpec};
use crate::ontology::persistence::{OntologyStore, RecordKind, StoreError};
use crate::ontology::{
    AgentType, ConstantFeasibility, FeasibilityPolicy, Goal, GoalId, GoalStatus, Identity, Task,
    TaskId, TaskStatus,
};
use crate::tools::ToolOutput;

/// 只读摘要（按状态计数）
#[derive(Debug, Clone, Serialize)]
pub struct OntologySummary {
    pub agent_name: String,
    pub agent_type: AgentType,
    pub total_goals: usize,
    pub total_tasks: usize,
    pub goals_by_status: HashMap<String, usize>,
    pub tasks_by_status: HashMap<String, usize>,
    pub last_updated: DateTime<Utc>,
}

pub struct Ontology {
    identity: Identity,
    goals: HashMap<GoalId, Goal>,
    tasks: HashMap<TaskId, Task>,
    created_at: DateTime<Utc>,
    last_updated: DateTime<Utc>,
    feasibility: Box<dyn FeasibilityPolicy>,
}

impl Ontology {
    pub fn new(identity: Identity) -> Self {
        let now = Utc::now();
        Self {
            identity,
            goals: HashMap::new(),
            tasks: HashMap::new(),
            created_at: now,
            last_updated: now,
            feasibility: Box::new(ConstantFeasibility::default()),
        }
    }

    pub fn with_feasibility_policy(mut self, policy: Box<dyn FeasibilityPolicy>) -> Self {
        self.feasibility = policy;
        self
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    pub fn update_identity_trait(&mut self, name: &str, value: f64) {
        self.identity.update_trait(name, value);
        self.touch();
    }

    fn touch(&mut self) {
        self.last_updated = Utc::now();
    }

    // ---- admission ----

    /// 录入目标；id 已存在时记录日志并返回 false，原记录不变
    pub fn admit_goal(&mut self, goal: Goal) -> bool {
        if self.goals.contains_key(&goal.id) {
            tracing::warn!(goal_id = %goal.id, "Goal already admitted, ignoring");
            return false;
        }
        tracing::info!(goal_id = %goal.id, description = %goal.description, "Goal admitted");
        self.goals.insert(goal.id.clone(), goal);
        self.touch();
        true
    }

    pub fn admit_task(&mut self, task: Task) -> bool {
        if self.tasks.contains_key(&task.id) {
            tracing::warn!(task_id = %task.id, "Task already admitted, ignoring");
            return false;
        }
        tracing::debug!(task_id = %task.id, action = %task.action, "Task admitted");
        self.tasks.insert(task.id.clone(), task);
        self.touch();
        true
    }

    pub fn goal(&self, id: &str) -> Option<&Goal> {
        self.goals.get(id)
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.get(id)
    }

    fn goal_mut(&mut self, id: &str) -> Result<&mut Goal, AgentError> {
        self.goals
            .get_mut(id)
            .ok_or_else(|| AgentError::GoalNotFound(id.to_string()))
    }

    fn task_mut(&mut self, id: &str) -> Result<&mut Task, AgentError> {
        self.tasks
            .get_mut(id)
            .ok_or_else(|| AgentError::TaskNotFound(id.to_string()))
    }

    // ---- goal mutations ----

    pub fn start_goal(&mut self, id: &str) -> Result<(), AgentError> {
        self.goal_mut(id)?.transition(GoalStatus::InProgress)?;
        self.touch();
        Ok(())
    }

    /// 目标失败：迁移到 Failed 并记录原因
    pub fn fail_goal(&mut self, id: &str, reason: &str) -> Result<(), AgentError> {
        let goal = self.goal_mut(id)?;
        goal.transition(GoalStatus::Failed)?;
        goal.add_failure_reason(reason);
        self.touch();
        tracing::warn!(goal_id = %id, reason = %reason, "Goal failed");
        Ok(())
    }

    pub fn record_goal_progress(
        &mut self,
        id: &str,
        progress: f64,
        notes: &str,
    ) -> Result<(), AgentError> {
        self.goal_mut(id)?.update_progress(progress, notes);
        self.touch();
        Ok(())
    }

    /// 完成目标；已完成时为 no-op
    pub fn advance_goal_to_completed(&mut self, id: &str) -> Result<(), AgentError> {
        let goal = self.goal_mut(id)?;
        if goal.status != GoalStatus::Completed {
            goal.transition(GoalStatus::Completed)?;
        }
        self.touch();
        tracing::info!(goal_id = %id, "Goal completed");
        Ok(())
    }

    // ---- task mutations ----

    pub fn start_task(&mut self, id: &str) -> Result<(), AgentError> {
        self.task_mut(id)?.start()?;
        self.touch();
        Ok(())
    }

    pub fn complete_task(
        &mut self,
        id: &str,
        output: ToolOutput,
        confidence: f64,
        quality_score: f64,
    ) -> Result<(), AgentError> {
        self.task_mut(id)?
            .mark_complete(output, confidence, quality_score)?;
        self.touch();
        Ok(())
    }

    pub fn fail_task(&mut self, id: &str, message: &str) -> Result<(), AgentError> {
        self.task_mut(id)?.mark_failed(message)?;
        self.touch();
        Ok(())
    }

    pub fn record_tool_used(&mut self, id: &str, tool: &str) -> Result<(), AgentError> {
        self.task_mut(id)?.tool_used = Some(tool.to_string());
        self.touch();
        Ok(())
    }

    pub fn advance_task_to_completed(&mut self, id: &str) -> Result<(), AgentError> {
        self.task_mut(id)?.mark_done()?;
        self.touch();
        Ok(())
    }

    // ---- views ----

    /// 正在执行（in_progress）的目标，按 priority_score 从高到低
    pub fn active_goals(&self) -> Vec<&Goal> {
        let mut goals: Vec<&Goal> = self
            .goals
            .values()
            .filter(|g| g.status == GoalStatus::InProgress)
            .collect();
        goals.sort_by(|a, b| b.priority_score().total_cmp(&a.priority_score()));
        goals
    }

    pub fn pending_tasks(&self) -> Vec<&Task> {
        let mut tasks: Vec<&Task> = self
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Pending)
            .collect();
        tasks.sort_by_key(|t| t.created_at);
        tasks
    }

    pub fn tasks_for_goal(&self, goal_id: &str) -> Vec<&Task> {
        let mut tasks: Vec<&Task> = self
            .tasks
            .values()
            .filter(|t| t.parent_goal == goal_id)
            .collect();
        tasks.sort_by_key(|t| t.created_at);
        tasks
    }

    // ---- assessment ----

    /// 可行性分数，结果截断到 [0, 1]；NaN 视为 0
    pub fn feasibility(&self, goal: &Goal) -> f64 {
        let score = self.feasibility.score(goal, &self.identity);
        if score.is_nan() {
            0.0
        } else {
            score.clamp(0.0, 1.0)
        }
    }

    /// 任一运行约束（大小写不敏感）是动作名的子串时拒绝
    pub fn validate_action(&self, action: &str, _context: &HashMap<String, String>) -> bool {
        let action = action.to_lowercase();
        let violated = self
            .identity
            .operating_constraints
            .iter()
            .find(|c| !c.is_empty() && action.contains(&c.to_lowercase()));
        if let Some(constraint) = violated {
            tracing::warn!(action = %action, constraint = %constraint, "Action violates constraint");
            return false;
        }
        true
    }

    /// 目标的模板执行计划（不调用 LLM）
    pub fn plan_goal_execution(&self, goal_id: &str) -> Result<Vec<TaskSpec>, AgentError> {
        let goal = self
            .goals
            .get(goal_id)
            .ok_or_else(|| AgentError::GoalNotFound(goal_id.to_string()))?;
        Ok(template_plan(goal.goal_type, &goal.description))
    }

    pub fn summary(&self) -> OntologySummary {
        let mut goals_by_status = HashMap::new();
        for goal in self.goals.values() {
            *goals_by_status.entry(goal.status.to_string()).or_insert(0) += 1;
        }
        let mut tasks_by_status = HashMap::new();
        for task in self.tasks.values() {
            *tasks_by_status.entry(task.status.to_string()).or_insert(0) += 1;
        }
        OntologySummary {
            agent_name: self.identity.name.clone(),
            agent_type: self.identity.agent_type,
            total_goals: self.goals.len(),
            total_tasks: self.tasks.len(),
            goals_by_status,
            tasks_by_status,
            last_updated: self.last_updated,
        }
    }

    // ---- persistence ----

    /// 将身份、全部目标与任务写入 store
    pub fn persist(&self, store: &dyn OntologyStore) -> Result<(), StoreError> {
        store.store(
            RecordKind::Identity,
            &self.identity.agent_id,
            &serde_json::to_value(&self.identity)?,
        )?;
        for goal in self.goals.values() {
            store.store(RecordKind::Goal, &goal.id, &serde_json::to_value(goal)?)?;
        }
        for task in self.tasks.values() {
            store.store(RecordKind::Task, &task.id, &serde_json::to_value(task)?)?;
        }
        tracing::debug!(
            goals = self.goals.len(),
            tasks = self.tasks.len(),
            "Ontology persisted"
        );
        Ok(())
    }

    /// 从 store 恢复全部目标与任务；身份取 store 中同 agent_id 的记录，否则用传入值
    pub fn restore(identity: Identity, store: &dyn OntologyStore) -> Result<Self, StoreError> {
        let identity = match store.get(RecordKind::Identity, &identity.agent_id)? {
            Some(value) => serde_json::from_value(value)?,
            None => identity,
        };
        let mut ontology = Self::new(identity);
        for value in store.find(RecordKind::Goal, &|_| true)? {
            let goal: Goal = serde_json::from_value(value)?;
            ontology.goals.insert(goal.id.clone(), goal);
        }
        for value in store.find(RecordKind::Task, &|_| true)? {
            let task: Task = serde_json::from_value(value)?;
            ontology.tasks.insert(task.id.clone(), task);
        }
        Ok(ontology)
    }
}
