//! Agent 身份：名称、类型、性格权重、偏好工具服务器与运行约束
//!
//! 每个 Agent 创建一次；除 update_trait 外不再修改。

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Agent 类型标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    #[default]
    General,
    Rag,
    Code,
    Research,
    Analysis,
    Creative,
    Coordinator,
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgentType::General => "general",
            AgentType::Rag => "rag",
            AgentType::Code => "code",
            AgentType::Research => "research",
            AgentType::Analysis => "analysis",
            AgentType::Creative => "creative",
            AgentType::Coordinator => "coordinator",
        };
        f.write_str(s)
    }
}

/// 未设置的性格特质取该值
const NEUTRAL_TRAIT: f64 = 0.5;

/// 默认性格权重（0.0 - 1.0）
pub fn default_personality_traits() -> HashMap<String, f64> {
    [
        ("curiosity", 0.7),
        ("caution", 0.5),
        ("creativity", 0.6),
        ("persistence", 0.8),
        ("collaboration", 0.7),
        ("precision", 0.8),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

/// Agent 身份描述
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub agent_id: String,
    pub name: String,
    pub agent_type: AgentType,
    pub version: String,
    pub description: String,
    pub personality_traits: HashMap<String, f64>,
    pub domain_expertise: Vec<String>,
    /// start() 时预连接的工具服务器名
    pub preferred_servers: Vec<String>,
    /// 动作名中禁止出现的子串（大小写不敏感）
    pub operating_constraints: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Identity {
    pub fn new(name: impl Into<String>, agent_type: AgentType) -> Self {
        Self {
            agent_id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            agent_type,
            version: "1.0.0".to_string(),
            description: String::new(),
            personality_traits: default_personality_traits(),
            domain_expertise: Vec::new(),
            preferred_servers: Vec::new(),
            operating_constraints: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_preferred_servers(mut self, servers: Vec<String>) -> Self {
        self.preferred_servers = servers;
        self
    }

    pub fn with_operating_constraints(mut self, constraints: Vec<String>) -> Self {
        self.operating_constraints = constraints;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn trait_value(&self, name: &str) -> f64 {
        self.personality_traits
            .get(name)
            .copied()
            .unwrap_or(NEUTRAL_TRAIT)
    }

    /// 更新性格特质，值被截断到 [0, 1]
    pub fn update_trait(&mut self, name: &str, value: f64) {
        self.personality_traits
            .insert(name.to_string(), value.clamp(0.0, 1.0));
    }
}
