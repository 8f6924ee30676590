//! Session management.

use mcp::ToolOutput;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::backend::{ChatRequest, LlmBackend, Message};
use crate::parser::{ToolInvocation, parse_invocations};
use crate::prompt::{results_prompt, system_prompt};
use crate::tools::ToolHost;
use crate::Result;

/// How one requested tool call ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolOutcome {
    /// The tool ran and produced text.
    Output(String),
    /// The tool or its server reported a failure.
    Failed(String),
    /// The model named a tool that is not in the catalog.
    NotFound,
}

/// A tool call made during a turn, as shown to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolRecord {
    pub invocation: ToolInvocation,
    pub outcome: ToolOutcome,
}

impl ToolRecord {
    /// The line that reports this call in the results message.
    pub fn result_line(&self) -> String {
        let name = &self.invocation.name;
        match &self.outcome {
            ToolOutcome::Output(output) => format!("{name}: {output}"),
            ToolOutcome::Failed(message) => format!("Error using {name}: {message}"),
            ToolOutcome::NotFound => format!("Tool {name} not found"),
        }
    }
}

type Observer = Box<dyn FnMut(&ToolRecord) + Send>;

/// A conversation session.
///
/// Each call to [`Session::chat`] is one turn: the model answers, any tool
/// directives in its answer are executed in order, and if there were any the
/// model is asked again with the results.
pub struct Session<B, H> {
    pub id: Uuid,
    backend: B,
    host: H,
    messages: Vec<Message>,
    observer: Option<Observer>,
}

impl<B: LlmBackend, H: ToolHost> Session<B, H> {
    /// Create a new session with the given backend and tool host.
    pub fn new(backend: B, host: H) -> Self {
        let id = Uuid::new_v4();
        info!(session = %id, tools = host.tools().len(), "session started");

        Self {
            id,
            backend,
            host,
            messages: Vec::new(),
            observer: None,
        }
    }

    /// Call `observer` after every tool call, before the model sees the results.
    pub fn with_observer(mut self, observer: impl FnMut(&ToolRecord) + Send + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Conversation so far.
    pub fn history(&self) -> &[Message] {
        &self.messages
    }

    /// The system prompt for the current tool catalog.
    pub fn system_prompt(&self) -> String {
        system_prompt(self.host.tools())
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Send a user message and get the assistant's final response.
    ///
    /// Tool failures never fail the turn; they are reported to the model.
    /// If the backend fails, the history is restored to what it was before
    /// the call.
    pub async fn chat(&mut self, user_input: &str) -> Result<String> {
        let span = info_span!("turn", session = %self.id, turn = self.messages.len() / 2 + 1);

        let checkpoint = self.messages.len();
        let result = self.turn(user_input).instrument(span).await;
        if result.is_err() {
            self.messages.truncate(checkpoint);
        }
        result
    }

    async fn turn(&mut self, user_input: &str) -> Result<String> {
        self.messages.push(Message::user(user_input));
        let system = self.system_prompt();

        let reply = complete(&self.backend, &system, &self.messages).await?;

        let invocations = parse_invocations(&reply);
        if invocations.is_empty() {
            debug!("no tool directives in reply");
            self.messages.push(Message::assistant(reply.clone()));
            return Ok(reply);
        }

        info!(count = invocations.len(), "executing tool directives");
        let mut lines = Vec::with_capacity(invocations.len());
        for invocation in invocations {
            let outcome = self.execute(&invocation).await;
            let record = ToolRecord { invocation, outcome };
            if let Some(observer) = self.observer.as_mut() {
                observer(&record);
            }
            lines.push(record.result_line());
        }

        let mut followup = self.messages.clone();
        followup.push(Message::assistant(reply));
        followup.push(Message::user(results_prompt(&lines)));

        let answer = complete(&self.backend, &system, &followup).await?;
        self.messages.push(Message::assistant(answer.clone()));
        Ok(answer)
    }

    async fn execute(&mut self, invocation: &ToolInvocation) -> ToolOutcome {
        let name = invocation.name.as_str();
        if !self.host.tools().iter().any(|t| t.name == name) {
            warn!(tool = name, "model requested unknown tool");
            return ToolOutcome::NotFound;
        }

        debug!(tool = name, call = %invocation, "calling tool");
        match self.host.call_tool(name, invocation.arguments_json()).await {
            Ok(ToolOutput::Text(text)) => ToolOutcome::Output(text),
            Ok(ToolOutput::Failure(message)) => {
                warn!(tool = name, "tool failed: {message}");
                ToolOutcome::Failed(message)
            }
            Err(e) => {
                warn!(tool = name, "tool host error: {e}");
                ToolOutcome::Failed(e.to_string())
            }
        }
    }
}

async fn complete<B: LlmBackend>(backend: &B, system: &str, messages: &[Message]) -> Result<String> {
    let response = backend
        .chat(ChatRequest {
            messages,
            system: Some(system),
        })
        .await?;
    Ok(response.content)
}
