//! 核心编排层：错误分类、动作解析、执行结果、目标执行器、优雅关闭

pub mod action;
pub mod error;
pub mod executor;
pub mod result;
pub mod shutdown;

pub use action::Action;
pub use error::{AgentError, FailureKind};
pub use executor::{AgentExecutor, ExecutorSettings};
pub use result::{AgentStatus, GoalResult, TaskResult};
pub use shutdown::{ShutdownCoordinator, ShutdownManager, ShutdownReason, ShutdownReport};
