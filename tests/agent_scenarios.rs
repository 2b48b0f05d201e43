//! 端到端场景：分解 -> 连接 -> 调用 -> 结果，全部使用 Mock 工具服务器

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use forage::agent::assemble;
use forage::config::AppConfig;
use forage::core::{AgentError, AgentExecutor, FailureKind};
use forage::decompose::{DecompositionError, GoalDecomposer, LlmDecomposer, TaskSpec};
use forage::llm::MockLlmClient;
use forage::ontology::{
    AgentType, Goal, GoalStatus, Identity, JsonFileStore, Ontology, Task, TaskStatus, TaskType,
};
use forage::tools::mock::{MockLauncher, MockReply, MockServer};
use forage::tools::{SessionState, ToolClient, ToolOutput, ToolServerConfig, ToolServerRegistry};
use serde_json::json;
use tokio_util::sync::CancellationToken;

struct FixedDecomposer(Vec<TaskSpec>);

#[async_trait]
impl GoalDecomposer for FixedDecomposer {
    async fn decompose(&self, _goal: &str) -> Result<Vec<TaskSpec>, DecompositionError> {
        Ok(self.0.clone())
    }
}

fn square_root_plan() -> Vec<TaskSpec> {
    vec![
        TaskSpec::new("analyze_goal", TaskType::Analysis, "Understand the request"),
        TaskSpec::new(
            "calculate_square_root",
            TaskType::Execution,
            "Calculate the square root of 144",
        ),
        TaskSpec::new("validate_result", TaskType::Validation, "Check the answer"),
    ]
}

fn client(launcher: MockLauncher) -> Arc<ToolClient> {
    Arc::new(ToolClient::with_launcher(
        ToolServerRegistry::with_defaults(),
        Arc::new(launcher),
        Duration::from_secs(2),
    ))
}

fn agent(launcher: MockLauncher, decomposer: Arc<dyn GoalDecomposer>) -> AgentExecutor {
    assemble(
        &AppConfig::default(),
        client(launcher),
        decomposer,
        CancellationToken::new(),
    )
}

#[tokio::test]
async fn scenario_a_square_root_goal_completes() {
    let llm = MockLlmClient::new().with_reply(
        r#"```json
{"tasks": [
  {"action": "analyze_goal", "description": "Understand the request", "task_type": "analysis"},
  {"action": "calculate_square_root", "description": "Calculate the square root of 144", "task_type": "execution"},
  {"action": "validate_result", "description": "Check the answer", "task_type": "validation"}
]}
```"#,
    );
    let launcher = MockLauncher::new().with_server("local-math", MockServer::math());
    let mut exec = agent(launcher.clone(), Arc::new(LlmDecomposer::new(Arc::new(llm))));
    exec.start().await;

    let goal = Goal::new("Calculate the square root of 144").with_id("goal-a");
    let result = exec.execute_goal(goal).await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.task_results.len(), 3);
    assert!(result.task_results.iter().all(|r| r.success));
    assert_eq!(
        result.task_results[1].result,
        Some(ToolOutput::Text("12".into()))
    );

    let goal = exec.ontology().goal("goal-a").unwrap();
    assert_eq!(goal.status, GoalStatus::Completed);
    assert_eq!(goal.progress, 1.0);

    let calls = launcher.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].args, json!({"number": 144.0}));
}

#[tokio::test]
async fn scenario_b_second_task_failure_aborts_goal() {
    let math = MockServer::new().tool(
        "sqrt",
        json!({"type": "object", "properties": {"number": {"type": "number"}}}),
        |_| MockReply::ToolError("math backend exploded".into()),
    );
    let launcher = MockLauncher::new().with_server("local-math", math);
    let mut exec = agent(launcher, Arc::new(FixedDecomposer(square_root_plan())));
    exec.start().await;

    let result = exec
        .execute_goal(Goal::new("Calculate the square root of 144").with_id("goal-b"))
        .await;

    assert!(!result.success);
    assert_eq!(result.task_results.len(), 2);
    assert!(result.task_results[0].success);
    assert!(!result.task_results[1].success);
    assert_eq!(result.task_results[1].error_kind, Some(FailureKind::Tool));

    let failed_task = result.failed_task.clone().unwrap();
    assert_eq!(failed_task, result.task_results[1].task_id);
    assert!(result.error.as_deref().unwrap().contains(&failed_task));

    let ontology = exec.ontology();
    assert_eq!(ontology.goal("goal-b").unwrap().status, GoalStatus::Failed);
    assert_eq!(ontology.task(&failed_task).unwrap().status, TaskStatus::Failed);
    // 失败之后的任务没有被录入
    assert_eq!(ontology.tasks_for_goal("goal-b").len(), 2);
}

#[tokio::test]
async fn scenario_c_failed_launch_leaves_server_absent() {
    let launcher = MockLauncher::new().with_failing_launch("filesystem", "npx: command not found");
    let tools = client(launcher);

    let err = tools.connect("filesystem").await.unwrap_err();
    match &err {
        AgentError::Connection { server, .. } => assert_eq!(server, "filesystem"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.to_string().contains("filesystem"));
    assert_eq!(tools.state("filesystem").await, SessionState::Absent);
    assert!(tools.connected_servers().await.is_empty());
}

#[tokio::test]
async fn scenario_c_missing_executable_over_stdio() {
    let mut registry = ToolServerRegistry::new();
    registry
        .register(ToolServerConfig::new(
            "ghost",
            "/nonexistent/forage-ghost-server",
        ))
        .unwrap();
    let tools = ToolClient::new(registry, Duration::from_secs(2));

    let err = tools.connect("ghost").await.unwrap_err();
    assert!(matches!(err, AgentError::Connection { ref server, .. } if server == "ghost"));
    assert_eq!(tools.state("ghost").await, SessionState::Absent);
}

#[test]
fn scenario_d_operating_constraints() {
    let identity = Identity::new("guarded", AgentType::General)
        .with_operating_constraints(vec!["delete".into()]);
    let ontology = Ontology::new(identity);

    assert!(!ontology.validate_action("delete_system_files", &HashMap::new()));
    assert!(!ontology.validate_action("Delete_Everything", &HashMap::new()));
    assert!(ontology.validate_action("calculate_square_root", &HashMap::new()));
}

#[tokio::test]
async fn scenario_d_rejected_action_never_reaches_tools() {
    let mut cfg = AppConfig::default();
    cfg.agent.operating_constraints = vec!["delete".into()];
    let launcher = MockLauncher::new().with_server("local-math", MockServer::math());
    let mut exec = assemble(
        &cfg,
        client(launcher.clone()),
        Arc::new(FixedDecomposer(vec![TaskSpec::new(
            "delete_system_files",
            TaskType::Execution,
            "rm -rf /",
        )])),
        CancellationToken::new(),
    );

    let result = exec.execute_goal(Goal::new("clean up").with_id("goal-d")).await;
    assert!(!result.success);
    assert_eq!(
        result.task_results[0].error_kind,
        Some(FailureKind::Rejected)
    );
    assert!(launcher.calls().is_empty());
    assert_eq!(
        exec.ontology().goal("goal-d").unwrap().status,
        GoalStatus::Failed
    );
}

#[tokio::test]
async fn scenario_e_zero_tasks_fails_goal() {
    let mut exec = agent(MockLauncher::new(), Arc::new(FixedDecomposer(Vec::new())));

    let result = exec.execute_goal(Goal::new("do nothing").with_id("goal-e")).await;

    assert!(!result.success);
    assert!(result.task_results.is_empty());
    assert!(result.error.is_some());
    // 零任务时目标进入 failed，而不是停留在 in_progress
    let goal = exec.ontology().goal("goal-e").unwrap();
    assert_eq!(goal.status, GoalStatus::Failed);
    assert!(exec.ontology().active_goals().is_empty());
}

#[tokio::test]
async fn decomposition_error_fails_goal() {
    let llm = MockLlmClient::new().with_error("rate limited");
    let mut exec = agent(MockLauncher::new(), Arc::new(LlmDecomposer::new(Arc::new(llm))));

    let result = exec.execute_goal(Goal::new("anything").with_id("goal-x")).await;

    assert!(!result.success);
    assert!(result.task_results.is_empty());
    assert_eq!(
        exec.ontology().goal("goal-x").unwrap().status,
        GoalStatus::Failed
    );
}

#[tokio::test]
async fn terminal_goals_leave_the_active_view() {
    let launcher = MockLauncher::new().with_server("local-math", MockServer::math());
    let mut exec = agent(launcher, Arc::new(FixedDecomposer(square_root_plan())));
    exec.start().await;

    let ok = exec.execute_goal(Goal::new("sqrt 144").with_id("ok")).await;
    assert!(ok.success);

    exec.tools().disconnect("local-math").await;
    let failed = exec.execute_goal(Goal::new("sqrt 144 again").with_id("bad")).await;
    assert!(!failed.success);

    for goal_id in ["ok", "bad"] {
        let status = exec.ontology().goal(goal_id).unwrap().status;
        assert!(status.is_terminal());
        assert!(exec
            .ontology()
            .active_goals()
            .iter()
            .all(|g| g.id != goal_id));
    }

    for task in exec.ontology().tasks_for_goal("ok") {
        let (Some(started), Some(finished)) = (task.started_at, task.completed_at) else {
            panic!("task {} has no timestamps", task.id);
        };
        assert_eq!(task.duration, Some((finished - started).to_std().unwrap()));
    }
}

#[test]
fn admission_is_idempotent() {
    let mut ontology = Ontology::new(Identity::new("idem", AgentType::General));

    assert!(ontology.admit_goal(Goal::new("first").with_id("g")));
    assert!(!ontology.admit_goal(Goal::new("second").with_id("g")));
    assert_eq!(ontology.goal("g").unwrap().description, "first");

    let task = Task::new("analyze_goal", TaskType::Analysis, "first").with_id("t");
    assert!(ontology.admit_task(task));
    let again = Task::new("execute_goal", TaskType::Execution, "second").with_id("t");
    assert!(!ontology.admit_task(again));
    assert_eq!(ontology.task("t").unwrap().action, "analyze_goal");
}

#[tokio::test]
async fn ontology_survives_json_file_store() {
    let launcher = MockLauncher::new().with_server("local-math", MockServer::math());
    let mut exec = agent(launcher, Arc::new(FixedDecomposer(square_root_plan())));
    exec.start().await;
    exec.execute_goal(Goal::new("sqrt 144").with_id("persisted")).await;

    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::new(dir.path());
    exec.ontology().persist(&store).unwrap();

    let restored = Ontology::restore(exec.ontology().identity().clone(), &store).unwrap();
    assert_eq!(
        restored.goal("persisted").unwrap().status,
        GoalStatus::Completed
    );
    assert_eq!(restored.tasks_for_goal("persisted").len(), 3);
}
