//! 目标分解边界：目标描述 -> 有序 TaskSpec 列表
//!
//! 分解失败（DecompositionError）与「返回零个任务」是两种不同结果，由执行器分别处理。

pub mod llm;
pub mod template;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ontology::{Goal, TaskType};

pub use llm::LlmDecomposer;
pub use template::{template_plan, TemplateDecomposer};

/// 分解出的单个任务
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TaskSpec {
    /// 简短的动词短语，如 calculate_square_root
    pub action: String,
    /// 足以让其他 Agent 理解并执行该任务的详细描述
    pub description: String,
    /// 任务类型，缺省为 execution
    #[serde(default)]
    pub task_type: TaskType,
}

impl TaskSpec {
    pub fn new(action: impl Into<String>, task_type: TaskType, description: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            description: description.into(),
            task_type,
        }
    }
}

/// LLM 应返回的顶层结构
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DecomposedTasks {
    /// 分解出的任务列表，按执行顺序排列
    pub tasks: Vec<TaskSpec>,
}

#[derive(Error, Debug)]
pub enum DecompositionError {
    #[error("LLM request failed: {0}")]
    Llm(#[from] crate::llm::LlmError),

    #[error("Unparseable decomposition output: {0}")]
    Parse(String),
}

/// 目标分解器
#[async_trait]
pub trait GoalDecomposer: Send + Sync {
    async fn decompose(&self, goal_description: &str) -> Result<Vec<TaskSpec>, DecompositionError>;

    /// 执行器的入口；默认只看描述，需要目标类型等字段的实现可覆盖
    async fn decompose_goal(&self, goal: &Goal) -> Result<Vec<TaskSpec>, DecompositionError> {
        self.decompose(&goal.description).await
    }
}
