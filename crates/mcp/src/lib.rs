//! MCP (Model Context Protocol) client library.
//!
//! This crate drives a single tool server over its stdio: one JSON object per
//! line in each direction, one request outstanding at a time.
//!
//! # Example
//!
//! ```no_run
//! use mcp::{Server, ServerConfig, ToolOutput};
//!
//! # async fn example() -> mcp::Result<()> {
//! let mut server = Server::start(ServerConfig::new("./mcp-random-server")).await?;
//!
//! for tool in server.discover_tools().await? {
//!     println!("Tool: {} - {}", tool.name, tool.description);
//! }
//!
//! let mut args = serde_json::Map::new();
//! args.insert("min".into(), 1.into());
//! args.insert("max".into(), 10.into());
//! match server.call_tool("get_random_number", args).await? {
//!     ToolOutput::Text(text) => println!("{text}"),
//!     ToolOutput::Failure(message) => eprintln!("tool failed: {message}"),
//! }
//!
//! server.stop().await?;
//! # Ok(())
//! # }
//! ```

mod error;
mod protocol;
mod server;

pub use error::{Error, Result};
pub use protocol::{
    CallToolParams, CallToolResult, ClientCapabilities, ClientInfo, InitializeParams,
    InitializeResult, JSONRPC_VERSION, JsonRpcError, JsonRpcRequest, JsonRpcResponse,
    ListToolsResult, NO_OUTPUT, PROTOCOL_VERSION, ServerInfo, Tool, ToolContent, ToolOutput,
};
pub use server::{DEFAULT_TIMEOUT, MAX_OUTPUT_SIZE, SHUTDOWN_GRACE, Server, ServerConfig};
