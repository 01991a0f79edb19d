//! Agent layer: binds user text, the hosted model, and the tool layer.
//!
//! The agent holds no reasoning of its own. It submits the user's message
//! plus the declared tool schemas to the model, executes whatever tools the
//! model selects, feeds the results back, and returns the model's final
//! natural-language answer.

pub mod anthropic;

use crate::error::{ApiError, ApiResult};
use crate::tools::ToolHandler;
use anthropic::{ChatMessage, ContentBlock, ModelClient, ModelRequest, StopReason};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Upper bound on model round-trips for a single user message.
const MAX_TOOL_TURNS: usize = 8;
/// Messages of history kept per session.
const MAX_HISTORY: usize = 20;

const SYSTEM_PROMPT: &str = "\
You are a task management assistant. You help users create, update, delete, \
list, and filter tasks using the provided tools.

Rules:
- Call tools whenever the user asks for a task operation; never claim an \
operation happened without calling the tool.
- Tasks have a title, optional description, a status (pending, in_progress, \
done), a priority (low, medium, high), and an optional due date.
- Refer to tasks by id when the user gives one, otherwise by title.
- If a tool returns an error, explain it briefly and, when reasonable, retry \
with corrected arguments.
- Answer with a short, concrete confirmation of what changed.";

/// Outcome of one user message processed by the agent.
#[derive(Debug, Clone)]
pub struct AgentReply {
    /// The model's final natural-language answer.
    pub response: String,
    /// Names of tools executed while producing the answer, in order.
    pub tools_used: Vec<String>,
}

impl AgentReply {
    /// Whether any tool mutated or could have mutated the task list.
    pub fn touched_tasks(&self) -> bool {
        !self.tools_used.is_empty()
    }
}

/// The conversational agent. One instance serves all sessions; history is
/// tracked per session id.
pub struct TaskAgent {
    client: Arc<dyn ModelClient>,
    tools: Arc<ToolHandler>,
    sessions: Mutex<HashMap<String, Vec<ChatMessage>>>,
}

impl TaskAgent {
    pub fn new(client: Arc<dyn ModelClient>, tools: Arc<ToolHandler>) -> Self {
        Self {
            client,
            tools,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Process one user message within a session and return the model's
    /// final answer. Conversation state, intent disambiguation, and argument
    /// inference all live on the model side; this loop only shuttles tool
    /// calls back and forth.
    pub async fn handle_message(&self, session_id: &str, text: &str) -> ApiResult<AgentReply> {
        let mut messages = self.session_history(session_id);
        messages.push(ChatMessage::user_text(text));

        let tool_specs = self.tools.get_tools();
        let mut tools_used = Vec::new();

        for turn in 0..MAX_TOOL_TURNS {
            let response = self
                .client
                .complete(ModelRequest {
                    system: SYSTEM_PROMPT.to_string(),
                    messages: messages.clone(),
                    tools: tool_specs.clone(),
                })
                .await?;

            let tool_uses: Vec<(String, String, serde_json::Value)> = response
                .tool_uses()
                .into_iter()
                .map(|(id, name, input)| (id.to_string(), name.to_string(), input.clone()))
                .collect();

            if response.stop_reason != StopReason::ToolUse || tool_uses.is_empty() {
                let answer = response.text();
                messages.push(ChatMessage::assistant(response.content));
                self.store_history(session_id, messages);
                return Ok(AgentReply {
                    response: answer,
                    tools_used,
                });
            }

            debug!(turn, count = tool_uses.len(), "executing model tool calls");
            messages.push(ChatMessage::assistant(response.content));

            let mut results = Vec::with_capacity(tool_uses.len());
            for (id, name, input) in tool_uses {
                let (content, is_error) = match self.tools.call_tool(&name, &input) {
                    Ok(value) => (value.to_string(), None),
                    // Errors go back to the model as tool results so it can
                    // correct itself, matching the REST error vocabulary.
                    Err(err) => {
                        warn!(tool = %name, "tool call failed: {}", err);
                        (err.to_tool_value().to_string(), Some(true))
                    }
                };
                tools_used.push(name);
                results.push(ContentBlock::ToolResult {
                    tool_use_id: id,
                    content,
                    is_error,
                });
            }
            messages.push(ChatMessage::tool_results(results));
        }

        // Turn cap reached with the model still requesting tools.
        self.store_history(session_id, messages);
        Err(ApiError::model(format!(
            "model did not finish within {} tool turns",
            MAX_TOOL_TURNS
        )))
    }

    /// Clear a session's conversation history but keep the session.
    pub fn clear_session(&self, session_id: &str) {
        if let Some(history) = self.sessions.lock().unwrap().get_mut(session_id) {
            history.clear();
        }
    }

    /// Remove a session entirely.
    pub fn remove_session(&self, session_id: &str) {
        self.sessions.lock().unwrap().remove(session_id);
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    fn session_history(&self, session_id: &str) -> Vec<ChatMessage> {
        self.sessions
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Persist history for the session, trimmed to the most recent messages.
    /// Trimming never starts on a tool_result message, which the API would
    /// reject without its preceding tool_use.
    fn store_history(&self, session_id: &str, mut messages: Vec<ChatMessage>) {
        if messages.len() > MAX_HISTORY {
            let mut start = messages.len() - MAX_HISTORY;
            while start < messages.len()
                && messages[start]
                    .content
                    .iter()
                    .any(|b| matches!(b, ContentBlock::ToolResult { .. }))
            {
                start += 1;
            }
            messages.drain(..start);
        }
        self.sessions
            .lock()
            .unwrap()
            .insert(session_id.to_string(), messages);
    }
}
