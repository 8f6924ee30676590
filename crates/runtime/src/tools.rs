//! Tool host trait and its implementations.

use std::future::Future;

use mcp::{Server, Tool, ToolOutput};
use serde_json::{Map, Value};

/// Trait for tool execution hosts.
///
/// This is the boundary between the conversation loop and side effects.
/// Every tool behaves the same from here: a name and arguments in, text or
/// a failure out.
pub trait ToolHost: Send {
    /// The current tool catalog.
    fn tools(&self) -> &[Tool];

    /// Execute a tool call.
    ///
    /// `Err` means the host itself is unusable; tool-level failures come
    /// back as `ToolOutput::Failure`.
    fn call_tool(
        &mut self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> impl Future<Output = mcp::Result<ToolOutput>> + Send;
}

impl ToolHost for Server {
    fn tools(&self) -> &[Tool] {
        Server::tools(self)
    }

    async fn call_tool(
        &mut self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> mcp::Result<ToolOutput> {
        Server::call_tool(self, name, arguments).await
    }
}

impl<T: ToolHost> ToolHost for &mut T {
    fn tools(&self) -> &[Tool] {
        (**self).tools()
    }

    fn call_tool(
        &mut self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> impl Future<Output = mcp::Result<ToolOutput>> + Send {
        (**self).call_tool(name, arguments)
    }
}

/// A tool host with no tools.
///
/// Useful for testing or when running without a tool server.
#[derive(Debug, Default)]
pub struct EmptyToolHost;

impl ToolHost for EmptyToolHost {
    fn tools(&self) -> &[Tool] {
        &[]
    }

    async fn call_tool(
        &mut self,
        name: &str,
        _arguments: Map<String, Value>,
    ) -> mcp::Result<ToolOutput> {
        Ok(ToolOutput::Failure(format!("no tool named {name}")))
    }
}
