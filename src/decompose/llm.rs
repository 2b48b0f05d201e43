//! LLM 目标分解器
//!
//! Prompt 中嵌入 schemars 生成的 DecomposedTasks JSON Schema；回复可以是 ```json 代码块或裸 JSON，
//! 顶层既可为 {"tasks": [...]} 也可直接是数组。

use std::sync::Arc;

use async_trait::async_trait;
use schemars::schema_for;

use crate::decompose::{DecomposedTasks, DecompositionError, GoalDecomposer, TaskSpec};
use crate::llm::{LlmClient, Message};
use crate::ontology::TaskType;

const SYSTEM_PROMPT: &str =
    "You are a planning component of an autonomous agent. Reply with JSON only.";

pub struct LlmDecomposer {
    llm: Arc<dyn LlmClient>,
}

impl LlmDecomposer {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    pub fn build_prompt(goal_description: &str) -> String {
        let schema = serde_json::to_string_pretty(&schema_for!(DecomposedTasks))
            .unwrap_or_else(|_| String::new());
        let task_types: Vec<&str> = TaskType::ALL.iter().map(|t| t.as_str()).collect();
        format!(
            "Decompose the following high-level goal into a list of atomic, actionable tasks.\n\
             Each task is a JSON object with 'action', 'description' and 'task_type' fields.\n\
             The 'action' is a concise snake_case verb phrase.\n\
             The 'description' gives enough detail for another agent to execute the task.\n\
             The 'task_type' is one of: {}. Default to 'execution' when unsure.\n\n\
             Return a JSON object matching this schema:\n{}\n\n\
             Goal: {}\n\nJSON Response:",
            task_types.join(", "),
            schema,
            goal_description
        )
    }
}

/// 从 LLM 回复中提取任务列表
pub fn parse_decomposition(output: &str) -> Result<Vec<TaskSpec>, DecompositionError> {
    let trimmed = output.trim();

    let json_str = if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim())
    } else {
        let start = trimmed.find(['{', '[']);
        let end = trimmed.rfind(['}', ']']);
        match (start, end) {
            (Some(start), Some(end)) if start < end => &trimmed[start..=end],
            _ => return Err(DecompositionError::Parse(truncate(trimmed))),
        }
    };

    if json_str.starts_with('[') {
        return serde_json::from_str::<Vec<TaskSpec>>(json_str)
            .map_err(|e| DecompositionError::Parse(format!("{}: {}", e, truncate(json_str))));
    }
    serde_json::from_str::<DecomposedTasks>(json_str)
        .map(|d| d.tasks)
        .map_err(|e| DecompositionError::Parse(format!("{}: {}", e, truncate(json_str))))
}

fn truncate(s: &str) -> String {
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s.to_string()
    }
}

#[async_trait]
impl GoalDecomposer for LlmDecomposer {
    async fn decompose(&self, goal_description: &str) -> Result<Vec<TaskSpec>, DecompositionError> {
        let messages = [
            Message::system(SYSTEM_PROMPT),
            Message::user(Self::build_prompt(goal_description)),
        ];
        let reply = self.llm.complete(&messages).await?;
        let tasks = parse_decomposition(&reply)?;
        tracing::info!(goal = %goal_description, tasks = tasks.len(), "Goal decomposed");
        Ok(tasks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;

    #[test]
    fn test_parse_fenced_object() {
        let output = r#"Here is the plan:
```json
{"tasks": [
  {"action": "analyze_goal", "description": "understand", "task_type": "analysis"},
  {"action": "calculate_square_root", "description": "sqrt of 144"}
]}
```"#;
        let tasks = parse_decomposition(output).unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].task_type, TaskType::Analysis);
        assert_eq!(tasks[1].task_type, TaskType::Execution);
    }

    #[test]
    fn test_parse_bare_array_and_empty() {
        let tasks =
            parse_decomposition(r#"[{"action": "explore_tools", "description": "look around"}]"#)
                .unwrap();
        assert_eq!(tasks[0].action, "explore_tools");

        let tasks = parse_decomposition(r#"{"tasks": []}"#).unwrap();
        assert!(tasks.is_empty());
    }

    #[test]
    fn test_parse_garbage_fails() {
        assert!(matches!(
            parse_decomposition("I cannot help with that"),
            Err(DecompositionError::Parse(_))
        ));
        assert!(parse_decomposition(r#"{"steps": 3}"#).is_err());
    }

    #[test]
    fn test_prompt_embeds_schema() {
        let prompt = LlmDecomposer::build_prompt("Calculate the square root of 144");
        assert!(prompt.contains("\"tasks\""));
        assert!(prompt.contains("information_gathering"));
        assert!(prompt.ends_with("JSON Response:"));
    }

    #[tokio::test]
    async fn test_decompose_via_llm() {
        let llm = Arc::new(MockLlmClient::new().with_reply(
            r#"{"tasks": [{"action": "analyze_goal", "description": "d", "task_type": "analysis"}]}"#,
        ));
        let decomposer = LlmDecomposer::new(llm.clone());
        let tasks = decomposer.decompose("do it").await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert!(llm.received()[0][1].content.contains("Goal: do it"));

        let failing = LlmDecomposer::new(Arc::new(MockLlmClient::new().with_error("rate limited")));
        assert!(matches!(
            failing.decompose("x").await,
            Err(DecompositionError::Llm(_))
        ));
    }
}
