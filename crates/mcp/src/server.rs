//! MCP server management (spawn, communicate, lifecycle).

use std::collections::{HashMap, HashSet};
use std::process::Stdio;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::protocol::{
    CallToolParams, CallToolResult, InitializeParams, InitializeResult, JsonRpcError,
    JsonRpcRequest, JsonRpcResponse, ListToolsResult, Tool, ToolOutput,
};

/// Default timeout for a single request/response exchange.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// How long `stop` waits for the server to exit after closing its stdin.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Maximum size of one response line (1MB).
pub const MAX_OUTPUT_SIZE: usize = 1024 * 1024;

/// Configuration for an MCP server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    /// Per-request limit. `None` waits forever.
    pub timeout: Option<Duration>,
}

impl ServerConfig {
    /// Config for running `command` with no arguments, named after the command.
    pub fn new(command: impl Into<String>) -> Self {
        let command = command.into();
        Self {
            name: command.clone(),
            command,
            args: Vec::new(),
            env: HashMap::new(),
            timeout: Some(DEFAULT_TIMEOUT),
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Handle to a running MCP server.
///
/// Owns the child process and both ends of its stdio. Requests take
/// `&mut self`, so at most one exchange is in flight and responses pair with
/// requests by line order.
pub struct Server {
    config: ServerConfig,
    process: Option<Child>,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    next_id: u64,
    broken: bool,
    server_info: Option<InitializeResult>,
    tools: Vec<Tool>,
}

impl Server {
    /// Spawn the server process and perform the `initialize` handshake.
    ///
    /// If the handshake fails the process is stopped before the error is
    /// returned.
    pub async fn start(config: ServerConfig) -> Result<Self> {
        let mut server = Self::spawn(config)?;

        if let Err(e) = server.initialize().await {
            if let Err(stop_err) = server.stop().await {
                warn!(server = %server.name(), "failed to stop server after handshake error: {stop_err}");
            }
            return Err(e);
        }

        Ok(server)
    }

    fn spawn(config: ServerConfig) -> Result<Self> {
        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut process = cmd.spawn().map_err(Error::Spawn)?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| Error::Spawn(std::io::Error::other("failed to capture stdin")))?;

        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| Error::Spawn(std::io::Error::other("failed to capture stdout")))?;

        if let Some(stderr) = process.stderr.take() {
            forward_stderr(config.name.clone(), stderr);
        }

        info!(server = %config.name, command = %config.command, pid = ?process.id(), "spawned MCP server");

        Ok(Self {
            config,
            process: Some(process),
            stdin: Some(stdin),
            stdout: BufReader::new(stdout),
            next_id: 1,
            broken: false,
            server_info: None,
            tools: Vec::new(),
        })
    }

    /// Get the server name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    async fn initialize(&mut self) -> Result<()> {
        let value = self
            .exchange("initialize", InitializeParams::default())
            .await??;
        let result: InitializeResult = serde_json::from_value(value)
            .map_err(|e| Error::InvalidResponse(format!("malformed initialize result: {e}")))?;

        if let Some(info) = &result.server_info {
            info!(server = %self.name(), remote = %info.name, version = ?info.version, "handshake complete");
        }
        self.server_info = Some(result);
        Ok(())
    }

    /// Get server info from the handshake.
    pub fn server_info(&self) -> Option<&InitializeResult> {
        self.server_info.as_ref()
    }

    /// Fetch the tool list and replace the catalog with it.
    ///
    /// The old catalog is kept if the response is rejected.
    pub async fn discover_tools(&mut self) -> Result<&[Tool]> {
        let value = self.exchange("tools/list", Map::new()).await??;
        let result: ListToolsResult = serde_json::from_value(value).map_err(|e| {
            self.broken = true;
            Error::InvalidResponse(format!("malformed tools/list result: {e}"))
        })?;

        if let Some(name) = first_duplicate(&result.tools) {
            return Err(Error::DuplicateTool(name.to_string()));
        }

        self.tools = result.tools;
        info!(server = %self.name(), count = self.tools.len(), "discovered tools");
        Ok(&self.tools)
    }

    /// Get the current tool catalog.
    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    /// Get a tool by name.
    pub fn get_tool(&self, name: &str) -> Option<&Tool> {
        self.tools.iter().find(|t| t.name == name)
    }

    /// Call a tool by name.
    ///
    /// A JSON-RPC error from the server comes back as `ToolOutput::Failure`.
    /// `Err` means the channel itself failed and the server must not be used
    /// again.
    pub async fn call_tool(
        &mut self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<ToolOutput> {
        let params = CallToolParams {
            name: name.to_string(),
            arguments,
        };

        match self.exchange("tools/call", params).await? {
            Ok(value) => {
                let result: CallToolResult = serde_json::from_value(value).map_err(|e| {
                    self.broken = true;
                    Error::InvalidResponse(format!("malformed tools/call result: {e}"))
                })?;
                Ok(result.into_output())
            }
            Err(error) => {
                warn!(server = %self.name(), tool = name, "tool reported error: {error}");
                Ok(ToolOutput::Failure(error.message))
            }
        }
    }

    /// Check if the server process is still running.
    pub fn is_running(&mut self) -> bool {
        self.process
            .as_mut()
            .is_some_and(|p| matches!(p.try_wait(), Ok(None)))
    }

    /// Shut down the server.
    ///
    /// Closes stdin so the server sees EOF, then waits for it to exit. A
    /// server still running after `SHUTDOWN_GRACE` is killed. Calling this
    /// again is a no-op.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(mut process) = self.process.take() else {
            return Ok(());
        };
        drop(self.stdin.take());

        match timeout(SHUTDOWN_GRACE, process.wait()).await {
            Ok(status) => {
                let status = status?;
                info!(server = %self.name(), %status, "MCP server exited");
            }
            Err(_) => {
                warn!(server = %self.name(), "MCP server ignored EOF, killing");
                process.kill().await?;
            }
        }

        Ok(())
    }

    // --- Internal methods ---

    fn next_request_id(&mut self, method: &str) -> String {
        let id = format!("{method}-{}", self.next_id);
        self.next_id += 1;
        id
    }

    /// One request/response exchange. Any failure here breaks the server.
    async fn exchange<P>(
        &mut self,
        method: &str,
        params: P,
    ) -> Result<std::result::Result<Value, JsonRpcError>>
    where
        P: Serialize,
    {
        if self.process.is_none() {
            return Err(Error::Stopped);
        }
        if self.broken {
            return Err(Error::Broken);
        }

        let result = self.round_trip(method, params).await;
        if let Err(e) = &result {
            warn!(server = %self.name(), method, "protocol failure: {e}");
            self.broken = true;
        }
        result
    }

    async fn round_trip<P>(
        &mut self,
        method: &str,
        params: P,
    ) -> Result<std::result::Result<Value, JsonRpcError>>
    where
        P: Serialize,
    {
        let id = self.next_request_id(method);
        let request = JsonRpcRequest::new(id.clone(), method).with_params(params)?;

        let request_json = serde_json::to_string(&request)?;
        debug!(server = %self.config.name, "-> {request_json}");
        {
            let stdin = self.stdin.as_mut().ok_or(Error::Stopped)?;
            stdin.write_all(request_json.as_bytes()).await?;
            stdin.write_all(b"\n").await?;
            stdin.flush().await?;
        }

        let line = match self.config.timeout {
            Some(limit) => timeout(limit, read_line(&mut self.stdout))
                .await
                .map_err(|_| Error::Timeout(limit))??,
            None => read_line(&mut self.stdout).await?,
        };
        debug!(server = %self.config.name, "<- {}", line.trim_end());

        let response: JsonRpcResponse = serde_json::from_str(&line)?;

        if response.id != id {
            return Err(Error::InvalidResponse(format!(
                "response ID mismatch: expected {id:?}, got {:?}",
                response.id
            )));
        }

        response.into_result()
    }
}

async fn read_line(stdout: &mut BufReader<ChildStdout>) -> Result<String> {
    let mut line = String::new();

    let bytes_read = stdout.read_line(&mut line).await?;
    if bytes_read == 0 {
        return Err(Error::ServerExited);
    }

    if line.len() > MAX_OUTPUT_SIZE {
        return Err(Error::OutputTooLarge {
            size: line.len(),
            max: MAX_OUTPUT_SIZE,
        });
    }

    Ok(line)
}

fn first_duplicate(tools: &[Tool]) -> Option<&str> {
    let mut seen = HashSet::new();
    tools
        .iter()
        .map(|t| t.name.as_str())
        .find(|name| !seen.insert(*name))
}

/// Drain the server's stderr into the log so it can never fill the pipe.
fn forward_stderr(name: String, stderr: ChildStderr) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => warn!(server = %name, "stderr: {line}"),
                Ok(None) => {
                    debug!(server = %name, "stderr closed");
                    break;
                }
                Err(e) => {
                    debug!(server = %name, "error reading stderr: {e}");
                    break;
                }
            }
        }
    });
}
