//! Agent 装配
//!
//! 从 AppConfig 构建 Identity / Ontology、ToolServerRegistry + ToolClient、目标分解器，
//! 组合为 AgentExecutor。LLM 后端按 provider 与 API Key 选择，都不可用时回退到模板分解器。

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::core::{AgentError, AgentExecutor};
use crate::decompose::{GoalDecomposer, LlmDecomposer, TemplateDecomposer};
use crate::llm::{create_deepseek_client, LlmClient, OpenAiClient, DEEPSEEK_CHAT};
use crate::ontology::{Identity, Ontology};
use crate::tools::{ToolClient, ToolServerRegistry};

/// 根据配置与环境变量选择 LLM 后端；None 表示没有可用的后端
pub fn create_llm_from_config(cfg: &AppConfig) -> Option<Arc<dyn LlmClient>> {
    let provider = cfg.llm.provider.to_lowercase();
    if provider == "template" {
        return None;
    }
    let has_deepseek_key = std::env::var("DEEPSEEK_API_KEY").is_ok();
    let has_openai_key = std::env::var("OPENAI_API_KEY").is_ok();
    // 配置为 deepseek 且仅有 OpenAI Key 时也走 DeepSeek 兼容端点
    let use_deepseek = provider == "deepseek" && (has_deepseek_key || has_openai_key);
    let use_openai = provider == "openai" && has_openai_key;

    if use_deepseek {
        let model = cfg.llm.model.clone().unwrap_or_else(|| DEEPSEEK_CHAT.to_string());
        tracing::info!("Using DeepSeek LLM ({})", model);
        Some(Arc::new(
            create_deepseek_client(Some(&model)).with_temperature(cfg.llm.temperature),
        ))
    } else if use_openai {
        let model = cfg.llm.model.clone().unwrap_or_else(|| "gpt-4o-mini".to_string());
        tracing::info!("Using OpenAI LLM ({})", model);
        Some(Arc::new(
            OpenAiClient::new(cfg.llm.base_url.as_deref(), &model, None)
                .with_temperature(cfg.llm.temperature),
        ))
    } else {
        tracing::warn!(provider = %provider, "No API key set or provider unknown");
        None
    }
}

pub fn create_decomposer(cfg: &AppConfig) -> Arc<dyn GoalDecomposer> {
    match create_llm_from_config(cfg) {
        Some(llm) => Arc::new(LlmDecomposer::new(llm)),
        None => {
            tracing::info!("Using template goal decomposer");
            Arc::new(TemplateDecomposer::default())
        }
    }
}

pub fn create_identity(cfg: &AppConfig) -> Identity {
    let mut identity = Identity::new(cfg.agent.name.clone(), cfg.agent.agent_type)
        .with_description(cfg.agent.description.clone())
        .with_preferred_servers(cfg.agent.preferred_servers.clone())
        .with_operating_constraints(cfg.agent.operating_constraints.clone());
    identity.domain_expertise = cfg.agent.domain_expertise.clone();
    identity
}

/// 默认服务器 + [[servers]]；同名条目返回 ServerAlreadyExists，缺 name/command 返回 Config
pub fn create_registry(cfg: &AppConfig) -> Result<ToolServerRegistry, AgentError> {
    let mut registry = if cfg.tools.include_default_servers {
        ToolServerRegistry::with_defaults()
    } else {
        ToolServerRegistry::new()
    };
    for server in &cfg.servers {
        if server.name.trim().is_empty() || server.command.trim().is_empty() {
            return Err(AgentError::Config(format!(
                "server entry '{}' needs both name and command",
                server.name
            )));
        }
        registry.register(server.clone())?;
    }
    Ok(registry)
}

/// 用指定的 ToolClient 与分解器装配执行器
pub fn assemble(
    cfg: &AppConfig,
    tools: Arc<ToolClient>,
    decomposer: Arc<dyn GoalDecomposer>,
    cancel: CancellationToken,
) -> AgentExecutor {
    AgentExecutor::new(Ontology::new(create_identity(cfg)), tools, decomposer)
        .with_settings(cfg.executor.to_settings())
        .with_cancellation(cancel)
}

/// 创建执行器：子进程工具服务器 + 按配置选择的分解器
pub fn create_agent(cfg: &AppConfig, cancel: CancellationToken) -> Result<AgentExecutor, AgentError> {
    let tools = Arc::new(
        ToolClient::new(
            create_registry(cfg)?,
            Duration::from_secs(cfg.tools.tool_timeout_secs),
        )
        .with_connect_timeout(Duration::from_secs(cfg.tools.connect_timeout_secs)),
    );
    Ok(assemble(cfg, tools, create_decomposer(cfg), cancel))
}
