//! AgentExecutor：目标 -> 可行性检查 -> 录入 -> 分解 -> 逐个任务分发 -> 汇总 GoalResult
//!
//! 任务严格顺序执行，第一个失败的任务使整个目标失败。
//! 每个等待点（分解、工具调用）都受目标期限与 CancellationToken 约束。
//! 重试由调用方决定：execute_task 不循环，retry_task 在 can_retry() 时再执行一次。

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::core::action::{parse_file_path, parse_operand, Action};
use crate::core::{AgentError, AgentStatus, GoalResult, TaskResult};
use crate::decompose::GoalDecomposer;
use crate::ontology::{Goal, Ontology, OntologySummary, Task, TaskStatus};
use crate::tools::{ToolClient, ToolOutput};

/// 执行器参数
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    /// 低于该可行性的目标直接拒绝，不录入
    pub feasibility_threshold: f64,
    /// 成功任务记录的置信度
    pub confidence: f64,
    pub quality_score: f64,
    /// 目标未声明 max_duration 时使用的整体期限
    pub goal_timeout: Option<Duration>,
    /// create_file 未指定文件名时写入的路径
    pub default_output_path: String,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            feasibility_threshold: 0.3,
            confidence: 0.9,
            quality_score: 0.8,
            goal_timeout: None,
            default_output_path: "calculation_results.txt".to_string(),
        }
    }
}

pub struct AgentExecutor {
    ontology: Ontology,
    tools: Arc<ToolClient>,
    decomposer: Arc<dyn GoalDecomposer>,
    settings: ExecutorSettings,
    running: bool,
    cancel: CancellationToken,
}

impl AgentExecutor {
    pub fn new(
        ontology: Ontology,
        tools: Arc<ToolClient>,
        decomposer: Arc<dyn GoalDecomposer>,
    ) -> Self {
        Self {
            ontology,
            tools,
            decomposer,
            settings: ExecutorSettings::default(),
            running: false,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_settings(mut self, settings: ExecutorSettings) -> Self {
        self.settings = settings;
        self
    }

    /// 使用外部 token（通常来自 ShutdownManager）
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn ontology(&self) -> &Ontology {
        &self.ontology
    }

    pub fn tools(&self) -> &Arc<ToolClient> {
        &self.tools
    }

    pub fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// 预连接身份中的偏好服务器；单个失败只记录日志
    pub async fn start(&mut self) {
        if self.running {
            return;
        }
        tracing::info!(agent = %self.ontology.identity().name, "Starting agent");
        for server in self.ontology.identity().preferred_servers.clone() {
            if let Err(e) = self.tools.connect(&server).await {
                tracing::warn!(server = %server, error = %e, "Preferred server unavailable");
            }
        }
        self.running = true;
    }

    /// 释放全部工具会话；可重复调用
    pub async fn stop(&mut self) {
        self.tools.cleanup().await;
        if self.running {
            tracing::info!(agent = %self.ontology.identity().name, "Agent stopped");
        }
        self.running = false;
    }

    pub async fn status(&self) -> AgentStatus {
        AgentStatus {
            agent_name: self.ontology.identity().name.clone(),
            is_running: self.running,
            active_goals: self.ontology.active_goals().len(),
            pending_tasks: self.ontology.pending_tasks().len(),
            connected_servers: self.tools.connected_servers().await,
        }
    }

    pub fn summary(&self) -> OntologySummary {
        self.ontology.summary()
    }

    /// 执行目标；任何错误都体现在返回的 GoalResult 中
    pub async fn execute_goal(&mut self, goal: Goal) -> GoalResult {
        let started = Instant::now();
        let goal_id = goal.id.clone();

        let feasibility = self.ontology.feasibility(&goal);
        if feasibility < self.settings.feasibility_threshold {
            tracing::warn!(goal_id = %goal_id, feasibility, "Goal rejected as infeasible");
            return GoalResult::failure(
                &goal_id,
                &AgentError::FeasibilityTooLow(feasibility),
                started.elapsed(),
            );
        }

        let deadline = goal
            .max_duration()
            .or(self.settings.goal_timeout)
            .and_then(|limit| tokio::time::Instant::now().checked_add(limit));
        let snapshot = goal.clone();

        self.ontology.admit_goal(goal);
        if let Err(e) = self.ontology.start_goal(&goal_id) {
            return GoalResult::failure(&goal_id, &e, started.elapsed());
        }

        let specs = match guarded(
            &self.cancel,
            deadline,
            self.decompose(&snapshot),
        )
        .await
        {
            Ok(specs) => specs,
            Err(e) => {
                tracing::error!(goal_id = %goal_id, error = %e, "Goal produced no executable tasks");
                self.fail_goal(&goal_id, &e.to_string());
                return GoalResult::failure(&goal_id, &e, started.elapsed());
            }
        };

        let total = specs.len();
        let mut task_results = Vec::with_capacity(total);
        for (index, spec) in specs.into_iter().enumerate() {
            let task = Task::new(spec.action, spec.task_type, spec.description)
                .with_parent_goal(goal_id.clone());
            let task_id = task.id.clone();
            self.ontology.admit_task(task);

            let result = self.run_task(&task_id, deadline).await;
            let success = result.success;
            let task_error = result.error.clone().unwrap_or_default();
            task_results.push(result);

            if !success {
                let error = AgentError::TaskFailed {
                    task_id: task_id.clone(),
                    error: task_error,
                };
                self.fail_goal(&goal_id, &error.to_string());
                return GoalResult {
                    goal_id,
                    success: false,
                    task_results,
                    error: Some(error.to_string()),
                    failed_task: Some(task_id),
                    execution_time: started.elapsed(),
                };
            }

            let progress = (index + 1) as f64 / total as f64;
            if let Err(e) = self.ontology.record_goal_progress(&goal_id, progress, "") {
                tracing::warn!(goal_id = %goal_id, error = %e, "Failed to record progress");
            }
        }

        if let Err(e) = self.ontology.advance_goal_to_completed(&goal_id) {
            tracing::error!(goal_id = %goal_id, error = %e, "Failed to complete goal");
            return GoalResult {
                goal_id,
                success: false,
                task_results,
                error: Some(e.to_string()),
                failed_task: None,
                execution_time: started.elapsed(),
            };
        }

        GoalResult {
            goal_id,
            success: true,
            task_results,
            error: None,
            failed_task: None,
            execution_time: started.elapsed(),
        }
    }

    async fn decompose(&self, goal: &Goal) -> Result<Vec<crate::decompose::TaskSpec>, AgentError> {
        let specs = self
            .decomposer
            .decompose_goal(goal)
            .await
            .map_err(|e| AgentError::DecompositionFailed(e.to_string()))?;
        if specs.is_empty() {
            return Err(AgentError::NoTasksProduced);
        }
        Ok(specs)
    }

    fn fail_goal(&mut self, goal_id: &str, reason: &str) {
        if let Err(e) = self.ontology.fail_goal(goal_id, reason) {
            tracing::error!(goal_id = %goal_id, error = %e, "Failed to mark goal failed");
        }
    }

    /// 录入（已存在则复用）并执行单个任务，不受目标期限约束
    pub async fn execute_task(&mut self, task: Task) -> TaskResult {
        let task_id = task.id.clone();
        self.ontology.admit_task(task);
        self.run_task(&task_id, None).await
    }

    /// 对失败任务再执行一次；不满足 can_retry() 时返回错误
    pub async fn retry_task(&mut self, task_id: &str) -> Result<TaskResult, AgentError> {
        let task = self
            .ontology
            .task(task_id)
            .ok_or_else(|| AgentError::TaskNotFound(task_id.to_string()))?;
        if !task.can_retry() {
            return Err(AgentError::task_transition(
                task_id,
                task.status,
                TaskStatus::InProgress,
            ));
        }
        let delay = task.retry_policy.delay_for_attempt(task.attempts);
        tracing::info!(task_id = %task_id, attempt = task.attempts + 1, delay_ms = delay.as_millis() as u64, "Retrying task");

        guarded(&self.cancel, None, async {
            tokio::time::sleep(delay).await;
            Ok(())
        })
        .await?;
        Ok(self.run_task(task_id, None).await)
    }

    /// 失败结果是否值得重试：任务仍有重试次数，且错误类别在 retry_on 中
    pub fn is_retryable(&self, result: &TaskResult) -> bool {
        let Some(kind) = result.error_kind else {
            return false;
        };
        self.ontology
            .task(&result.task_id)
            .is_some_and(|task| task.can_retry() && task.retry_policy.retries_on(kind))
    }

    async fn run_task(
        &mut self,
        task_id: &str,
        deadline: Option<tokio::time::Instant>,
    ) -> TaskResult {
        let Some(task) = self.ontology.task(task_id).cloned() else {
            return TaskResult::failure(
                task_id,
                "",
                &AgentError::TaskNotFound(task_id.to_string()),
            );
        };

        if !self.ontology.validate_action(&task.action, &HashMap::new()) {
            return TaskResult::failure(
                task_id,
                &task.action,
                &AgentError::ActionRejected(task.action.clone()),
            );
        }

        if let Err(e) = self.ontology.start_task(task_id) {
            return TaskResult::failure(task_id, &task.action, &e);
        }
        tracing::info!(task_id = %task_id, action = %task.action, "Executing task");

        let action = Action::parse(&task.action);
        let outcome = guarded(&self.cancel, deadline, self.dispatch(&action, &task)).await;

        match outcome {
            Ok((output, tool_used)) => {
                let recorded = self
                    .ontology
                    .record_tool_used(task_id, &tool_used)
                    .and_then(|_| {
                        self.ontology.complete_task(
                            task_id,
                            output.clone(),
                            self.settings.confidence,
                            self.settings.quality_score,
                        )
                    });
                match recorded {
                    Ok(()) => TaskResult::success(task_id, &task.action, output, &tool_used),
                    Err(e) => TaskResult::failure(task_id, &task.action, &e),
                }
            }
            Err(e) => {
                tracing::warn!(task_id = %task_id, action = %task.action, error = %e, "Task failed");
                if let Err(mark_err) = self.ontology.fail_task(task_id, &e.to_string()) {
                    tracing::error!(task_id = %task_id, error = %mark_err, "Failed to mark task failed");
                }
                TaskResult::failure(task_id, &task.action, &e)
            }
        }
    }

    /// 动作 -> 处理器，返回 (输出, 实际使用的工具)
    async fn dispatch(
        &self,
        action: &Action,
        task: &Task,
    ) -> Result<(ToolOutput, String), AgentError> {
        let parent = task.parent_goal.as_str();
        match action {
            Action::AnalyzeGoal => Ok((
                ToolOutput::Text(format!("Analysis completed for goal: {parent}")),
                "internal/analyze_goal".to_string(),
            )),
            Action::ExecuteGoal => Ok((
                ToolOutput::Text(format!("Executed goal action for: {parent}")),
                "internal/execute_goal".to_string(),
            )),
            Action::ValidateResult => Ok((
                ToolOutput::Text(format!("Validation completed for goal: {parent}")),
                "internal/validate_result".to_string(),
            )),
            Action::CalculateSquareRoot => self.calculate_square_root(task).await,
            Action::CreateFile => self.create_file(task).await,
            Action::ExploreTools => {
                let tools = self.tools.list_tools(None).await;
                let names: Vec<String> = tools
                    .iter()
                    .map(|t| format!("{}/{}", t.server, t.tool.name))
                    .collect();
                Ok((
                    ToolOutput::Text(format!(
                        "Found {} available tools: {}",
                        tools.len(),
                        names.join(", ")
                    )),
                    "tool_client/list_tools".to_string(),
                ))
            }
            Action::Generic(name) => self.generic(name, task).await,
        }
    }

    async fn calculate_square_root(&self, task: &Task) -> Result<(ToolOutput, String), AgentError> {
        let number = parse_operand(&task.description)
            .or_else(|| {
                self.ontology
                    .goal(&task.parent_goal)
                    .and_then(|goal| parse_operand(&goal.description))
            })
            .ok_or_else(|| AgentError::ToolInvocation {
                server: "local-math".to_string(),
                tool: "sqrt".to_string(),
                cause: "no numeric operand in task or goal description".to_string(),
            })?;
        let output = self
            .tools
            .invoke_tool("local-math", "sqrt", json!({ "number": number }))
            .await?;
        Ok((output, "local-math/sqrt".to_string()))
    }

    /// 把同一目标下已完成任务的输出写入文件
    async fn create_file(&self, task: &Task) -> Result<(ToolOutput, String), AgentError> {
        let path = parse_file_path(&task.description)
            .unwrap_or_else(|| self.settings.default_output_path.clone());
        let lines: Vec<String> = self
            .ontology
            .tasks_for_goal(&task.parent_goal)
            .into_iter()
            .filter(|t| t.id != task.id && t.is_success())
            .filter_map(|t| t.result.as_ref().map(|r| format!("{}: {}", t.action, r)))
            .collect();
        let content = if lines.is_empty() {
            task.description.clone()
        } else {
            lines.join("\n")
        };
        let output = self
            .tools
            .invoke_tool(
                "filesystem",
                "write_file",
                json!({ "path": path, "content": content }),
            )
            .await?;
        Ok((output, "filesystem/write_file".to_string()))
    }

    /// 未映射动作：按名称匹配已连接服务器上的工具（支持 "server/tool"），
    /// 能构造参数时调用；否则返回描述性文本，不视为失败
    async fn generic(&self, name: &str, task: &Task) -> Result<(ToolOutput, String), AgentError> {
        let (server_hint, tool_name) = match name.split_once('/') {
            Some((server, tool)) => (Some(server), tool),
            None => (None, name),
        };
        let servers = match server_hint {
            Some(server) => vec![server.to_string()],
            None => self.tools.connected_servers().await,
        };

        for server in servers {
            let Some(tools) = self.tools.cached_tools(&server).await else {
                continue;
            };
            let Some(tool) = tools.iter().find(|t| t.name == tool_name) else {
                continue;
            };
            let args = match tool.single_string_argument() {
                Some(arg) => json!({ arg: task.description }),
                None if requires_no_arguments(&tool.input_schema) => json!({}),
                None => {
                    tracing::warn!(server = %server, tool = %tool_name, "Cannot build arguments for tool");
                    continue;
                }
            };
            let output = self.tools.invoke_tool(&server, tool_name, args).await?;
            return Ok((output, format!("{server}/{tool_name}")));
        }

        tracing::warn!(action = %name, "No specific mapping for action");
        Ok((
            ToolOutput::Text(format!("Generic execution completed for: {name}")),
            "internal/generic".to_string(),
        ))
    }
}

fn requires_no_arguments(schema: &serde_json::Value) -> bool {
    schema
        .get("required")
        .and_then(|r| r.as_array())
        .map_or(true, |r| r.is_empty())
}

/// 以期限与取消约束一个等待点
async fn guarded<T, F>(
    cancel: &CancellationToken,
    deadline: Option<tokio::time::Instant>,
    fut: F,
) -> Result<T, AgentError>
where
    F: Future<Output = Result<T, AgentError>>,
{
    let bounded = async {
        match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, fut)
                .await
                .map_err(|_| AgentError::Timeout("goal deadline exceeded".to_string()))?,
            None => fut.await,
        }
    };
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AgentError::Cancelled),
        result = bounded => result,
    }
}
