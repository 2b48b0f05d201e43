//! 工具服务器注册表
//!
//! 按名称保存 ToolServerConfig（启动命令、参数、环境变量）；纯内存，不启动任何进程。

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::AgentError;

/// 工具服务器启动配置，可从配置文件 [[servers]] 反序列化
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolServerConfig {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// 额外环境变量；子进程同时继承当前进程环境
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub description: String,
}

impl ToolServerConfig {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args: Vec::new(),
            env: HashMap::new(),
            description: String::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// 工具服务器注册表：register / get / list
#[derive(Debug, Default, Clone)]
pub struct ToolServerRegistry {
    servers: HashMap<String, ToolServerConfig>,
}

impl ToolServerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置 filesystem 与 local-math 两个服务器
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        let defaults = [
            ToolServerConfig::new("filesystem", "npx")
                .with_args(["-y", "@modelcontextprotocol/server-filesystem", "."])
                .with_description("File system operations"),
            ToolServerConfig::new("local-math", "forage-math-server")
                .with_description("Basic math operations"),
        ];
        for config in defaults {
            registry.servers.insert(config.name.clone(), config);
        }
        registry
    }

    /// 注册服务器；名称已存在返回 ServerAlreadyExists
    pub fn register(&mut self, config: ToolServerConfig) -> Result<(), AgentError> {
        if self.servers.contains_key(&config.name) {
            return Err(AgentError::ServerAlreadyExists(config.name));
        }
        tracing::debug!(server = %config.name, command = %config.command, "Tool server registered");
        self.servers.insert(config.name.clone(), config);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&ToolServerConfig, AgentError> {
        self.servers
            .get(name)
            .ok_or_else(|| AgentError::UnknownServer(name.to_string()))
    }

    pub fn list(&self) -> &HashMap<String, ToolServerConfig> {
        &self.servers
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.servers.keys().cloned().collect();
        names.sort();
        names
    }
}
