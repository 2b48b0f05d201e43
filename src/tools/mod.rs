//! 工具层：工具服务器注册、stdio JSON-RPC 传输、会话与客户端

pub mod client;
pub mod mock;
pub mod protocol;
pub mod server_registry;
pub mod session;
pub mod transport;

pub use client::{ServerTool, SessionState, ToolClient};
pub use protocol::{ResourceInfo, ToolInfo, ToolOutput};
pub use server_registry::{ToolServerConfig, ToolServerRegistry};
pub use session::ToolSession;
pub use transport::{StdioLauncher, StdioTransport, Transport, TransportError, TransportLauncher};
