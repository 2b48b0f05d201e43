//! 模板分解器：不调用 LLM，按目标类型给出固定计划
//!
//! achievement 目标：analyze_goal -> execute_goal -> validate_result；其他类型没有模板计划。
//! TemplateDecomposer 额外按关键字把 execute_goal 换成已知动作（如 calculate_square_root）。
//! 经执行器分解时使用目标自身的 goal_type；只有描述时使用构造时给定的类型。

use async_trait::async_trait;

use crate::decompose::{DecompositionError, GoalDecomposer, TaskSpec};
use crate::ontology::{Goal, GoalType, TaskType};

pub fn template_plan(goal_type: GoalType, description: &str) -> Vec<TaskSpec> {
    match goal_type {
        GoalType::Achievement => vec![
            TaskSpec::new(
                "analyze_goal",
                TaskType::Analysis,
                format!("Analyze requirements for: {description}"),
            ),
            TaskSpec::new(
                "execute_goal",
                TaskType::Execution,
                format!("Execute: {description}"),
            ),
            TaskSpec::new(
                "validate_result",
                TaskType::Validation,
                format!("Validate completion of: {description}"),
            ),
        ],
        _ => Vec::new(),
    }
}

/// 关键字 -> 执行步骤的动作名
const KEYWORD_ACTIONS: &[(&[&str], &str)] = &[
    (&["square root", "sqrt"], "calculate_square_root"),
    (&["create file", "write file", "create a file", "save to file"], "create_file"),
    (&["list tools", "explore tools", "available tools"], "explore_tools"),
];

#[derive(Debug, Clone, Copy)]
pub struct TemplateDecomposer {
    goal_type: GoalType,
}

impl Default for TemplateDecomposer {
    fn default() -> Self {
        Self::new(GoalType::Achievement)
    }
}

impl TemplateDecomposer {
    pub fn new(goal_type: GoalType) -> Self {
        Self { goal_type }
    }

    fn plan(goal_type: GoalType, goal_description: &str) -> Vec<TaskSpec> {
        let mut plan = template_plan(goal_type, goal_description);
        let lowered = goal_description.to_lowercase();
        let matched = KEYWORD_ACTIONS
            .iter()
            .find(|(keywords, _)| keywords.iter().any(|k| lowered.contains(k)))
            .map(|(_, action)| *action);
        if let (Some(action), Some(step)) = (matched, plan.get_mut(1)) {
            step.action = action.to_string();
            step.description = goal_description.to_string();
        }
        plan
    }
}

#[async_trait]
impl GoalDecomposer for TemplateDecomposer {
    async fn decompose(&self, goal_description: &str) -> Result<Vec<TaskSpec>, DecompositionError> {
        Ok(Self::plan(self.goal_type, goal_description))
    }

    async fn decompose_goal(&self, goal: &Goal) -> Result<Vec<TaskSpec>, DecompositionError> {
        Ok(Self::plan(goal.goal_type, &goal.description))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_keyword_replaces_execution_step() {
        let tasks = TemplateDecomposer::default()
            .decompose("Calculate the square root of 144")
            .await
            .unwrap();
        let actions: Vec<&str> = tasks.iter().map(|t| t.action.as_str()).collect();
        assert_eq!(
            actions,
            vec!["analyze_goal", "calculate_square_root", "validate_result"]
        );
        assert_eq!(tasks[1].description, "Calculate the square root of 144");
    }

    #[tokio::test]
    async fn test_goal_type_comes_from_goal() {
        let decomposer = TemplateDecomposer::default();
        let exploring = Goal::new("Calculate the square root of 144").with_type(GoalType::Exploration);
        assert!(decomposer.decompose_goal(&exploring).await.unwrap().is_empty());

        let maintenance_default = TemplateDecomposer::new(GoalType::Maintenance);
        let achieving = Goal::new("Calculate the square root of 144");
        let tasks = maintenance_default.decompose_goal(&achieving).await.unwrap();
        assert_eq!(tasks[1].action, "calculate_square_root");
    }

    #[tokio::test]
    async fn test_non_achievement_has_no_plan() {
        let tasks = TemplateDecomposer::new(GoalType::Maintenance)
            .decompose("keep the cache warm")
            .await
            .unwrap();
        assert!(tasks.is_empty());
    }
}
