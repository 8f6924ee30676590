//! Tiller runtime: conversation loop and LLM backend management.
//!
//! This crate connects a chat model to the tools of an MCP server. The model
//! never sees a structured tool API: it is told about the tools in its
//! system prompt and asks for them in plain text with
//! `USE_TOOL: name(key=value, ...)`.
//!
//! # Overview
//!
//! - **Session**: One conversation. Runs each turn, executes requested tools
//!   and asks the model again with their results.
//! - **LlmBackend**: A trait abstracting chat providers (Ollama, etc.).
//! - **ToolHost**: A trait over anything that can list and call tools,
//!   implemented by [`mcp::Server`].
//!
//! # Example
//!
//! ```no_run
//! use mcp::{Server, ServerConfig};
//! use runtime::{OllamaBackend, Session};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = Server::start(ServerConfig::new("./mcp-random-server")).await?;
//! server.discover_tools().await?;
//!
//! let backend = OllamaBackend::builder("gemma3:12b").build()?;
//! let mut session = Session::new(backend, &mut server);
//! let response = session.chat("Pick a random number between 1 and 6").await?;
//! println!("{response}");
//!
//! drop(session);
//! server.stop().await?;
//! # Ok(())
//! # }
//! ```

mod backend;
mod error;
pub mod parser;
pub mod prompt;
mod session;
mod tools;

// LLM backend types
pub use backend::{
    ChatRequest, ChatResponse, DEFAULT_OLLAMA_MODEL, DEFAULT_OLLAMA_TIMEOUT, DEFAULT_OLLAMA_URL,
    LlmBackend, Message, OllamaBackend, OllamaBackendBuilder, Role, Usage,
};

// Error types
pub use error::{Error, Result};

// Invocation parsing
pub use parser::{ArgValue, ToolInvocation, parse_invocations};

// Tool hosts
pub use tools::{EmptyToolHost, ToolHost};

// Session management
pub use session::{Session, ToolOutcome, ToolRecord};
