//! Forage - Rust 自主智能体执行核心
//!
//! 模块划分：
//! - **agent**: 从配置装配 AgentExecutor
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误分类、动作解析、目标执行器、优雅关闭
//! - **decompose**: 目标分解边界（LLM / 模板）
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）
//! - **ontology**: 身份、目标、任务及其持久化
//! - **observability**: 日志初始化（仅供二进制入口）
//! - **tools**: 工具服务器注册、stdio JSON-RPC 传输、会话与客户端

pub mod agent;
pub mod config;
pub mod core;
pub mod decompose;
pub mod llm;
pub mod observability;
pub mod ontology;
pub mod tools;

pub use crate::core::{AgentError, AgentExecutor, GoalResult, TaskResult};
pub use crate::ontology::{Goal, Ontology, Task};
pub use crate::tools::{ToolClient, ToolOutput};
