//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `FORAGE__*` 覆盖（双下划线表示嵌套，如 `FORAGE__LLM__PROVIDER=openai`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::core::ExecutorSettings;
use crate::ontology::AgentType;
use crate::tools::ToolServerConfig;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub agent: AgentSection,
    pub executor: ExecutorSection,
    pub tools: ToolsSection,
    pub llm: LlmSection,
    /// 额外注册的工具服务器
    pub servers: Vec<ToolServerConfig>,
}

/// [agent] 段：身份
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    pub name: String,
    pub agent_type: AgentType,
    pub description: String,
    pub domain_expertise: Vec<String>,
    /// start() 时预连接
    pub preferred_servers: Vec<String>,
    /// 动作名中禁止出现的子串
    pub operating_constraints: Vec<String>,
    /// 设置后，运行结束把 Ontology 写入该目录（JSON 文件）
    pub store_dir: Option<PathBuf>,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            name: "forage".to_string(),
            agent_type: AgentType::General,
            description: String::new(),
            domain_expertise: Vec::new(),
            preferred_servers: vec!["local-math".to_string()],
            operating_constraints: Vec::new(),
            store_dir: None,
        }
    }
}

/// [executor] 段：可行性阈值、成功任务的置信度与质量分、目标整体期限
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExecutorSection {
    pub feasibility_threshold: f64,
    pub confidence: f64,
    pub quality_score: f64,
    /// 目标未声明 max_duration 时的期限（秒）；不设置则不限
    pub goal_timeout_secs: Option<u64>,
    pub default_output_path: String,
}

impl Default for ExecutorSection {
    fn default() -> Self {
        let settings = ExecutorSettings::default();
        Self {
            feasibility_threshold: settings.feasibility_threshold,
            confidence: settings.confidence,
            quality_score: settings.quality_score,
            goal_timeout_secs: None,
            default_output_path: settings.default_output_path,
        }
    }
}

impl ExecutorSection {
    pub fn to_settings(&self) -> ExecutorSettings {
        ExecutorSettings {
            feasibility_threshold: self.feasibility_threshold,
            confidence: self.confidence,
            quality_score: self.quality_score,
            goal_timeout: self.goal_timeout_secs.map(std::time::Duration::from_secs),
            default_output_path: self.default_output_path.clone(),
        }
    }
}

/// [tools] 段：工具调用超时、是否预置默认服务器
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
    /// 启动工具服务器并完成握手的期限（秒）
    pub connect_timeout_secs: u64,
    /// 是否注册内置的 filesystem / local-math
    pub include_default_servers: bool,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 30,
            connect_timeout_secs: 15,
            include_default_servers: true,
        }
    }
}

/// [llm] 段：目标分解使用的后端
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// deepseek / openai / template；无 API Key 时回退到 template
    pub provider: String,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub temperature: f32,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "deepseek".to_string(),
            model: None,
            base_url: None,
            temperature: 0.3,
        }
    }
}

/// 从 config 目录加载配置，环境变量 FORAGE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 FORAGE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    for name in ["config/default", "../config/default", "default"] {
        if std::path::Path::new(&format!("{name}.toml")).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(path) = config_path.filter(|p| p.exists()) {
        builder = builder.add_source(config::File::from(path).required(false));
    }

    builder = builder.add_source(
        config::Environment::with_prefix("FORAGE")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}
