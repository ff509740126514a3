//! Server → Client messages

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::*;

/// One structured `data:` payload of the chat stream.
///
/// Payloads that are not JSON objects are plain text deltas and never reach
/// this type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamFrame {
    SessionId {
        session_id: String,
    },
    Chunk {
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        accumulated: Option<String>,
    },
    #[serde(alias = "memories_extracted")]
    Memories {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        count: Option<u32>,
        #[serde(default)]
        memories: Vec<MemoryNotice>,
    },
    Routing {
        routing: RoutingDecision,
    },
    ToolsEnabled {
        #[serde(default)]
        tools_count: u32,
    },
    /// Streaming path sends `tool_call`; the non-streaming fallback sends
    /// `function` + `result` after the tool already ran.
    ToolCall {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_call: Option<ToolCallPayload>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        function: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
    },
    ToolResult {
        name: String,
        #[serde(default)]
        result: Value,
    },
    ToolError {
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    Info {
        message: String,
    },
    Fallback {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
    },
    Done {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        accumulated: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<TokenUsage>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        provider: Option<String>,
    },
    Complete(CompletePayload),
    Error {
        error: String,
    },
}

/// Sentinel payload some server paths send after the last frame.
pub const STREAM_DONE_SENTINEL: &str = "[DONE]";

/// Tool call as relayed from the provider.
///
/// Providers stream a call in fragments: the first usually carries `id` and
/// the function name, later ones only `index` and another slice of argument
/// text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub function: FunctionCall,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// A JSON object, a JSON-encoded string, or a slice of one.
    #[serde(default)]
    pub arguments: Value,
}

/// End-of-stream marker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletePayload {
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing: Option<RoutingDecision>,
    #[serde(default)]
    pub tool_calls: u32,
}

/// Response of the non-streaming chat endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub message_id: String,
    pub session_id: String,
    pub reply: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub usage: Option<TokenUsage>,
}

impl From<ChatResponse> for CompletePayload {
    fn from(resp: ChatResponse) -> Self {
        CompletePayload {
            session_id: resp.session_id,
            message_id: Some(resp.message_id),
            reply: Some(resp.reply),
            model: resp.model,
            provider: resp.provider,
            usage: resp.usage,
            routing: None,
            tool_calls: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub session_id: String,
    #[serde(default)]
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionsResponse {
    #[serde(default)]
    pub sessions: Vec<SessionSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchCreated {
    pub branch_id: String,
    #[serde(default)]
    pub branch_name: Option<String>,
    #[serde(default)]
    pub parent_message_id: Option<String>,
    #[serde(default)]
    pub edited_message_id: Option<String>,
    #[serde(default)]
    pub ai_response_id: Option<String>,
    #[serde(default)]
    pub ai_response: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchList {
    pub session_id: String,
    #[serde(default)]
    pub branches: Vec<Branch>,
    #[serde(default)]
    pub active_branch_id: Option<String>,
    #[serde(default)]
    pub total_branches: u64,
}

impl BranchList {
    /// The active branch id, preferring the session-level field over per-branch flags.
    pub fn active_id(&self) -> Option<&str> {
        self.active_branch_id
            .as_deref()
            .or_else(|| self.branches.iter().find(|b| b.is_active).map(|b| b.id.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchActivated {
    pub session_id: String,
    pub active_branch_id: String,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionUpdate {
    pub message_id: String,
    #[serde(default)]
    pub reactions: Reactions,
    #[serde(default)]
    pub user_reaction: Option<ReactionKind>,
}

/// Plain acknowledgement returned by delete/update endpoints
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Acknowledgement {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Error body; the server emits either `{error, message}` or `{detail}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub detail: Option<Value>,
}

impl ErrorBody {
    /// Human-readable message carried by the body, if any.
    pub fn display_message(&self) -> Option<String> {
        if let Some(message) = self.message.as_ref().filter(|m| !m.is_empty()) {
            return Some(message.clone());
        }
        match &self.detail {
            Some(Value::String(detail)) if !detail.is_empty() => Some(detail.clone()),
            Some(Value::Array(items)) => {
                let parts: Vec<&str> = items
                    .iter()
                    .filter_map(|item| item.get("msg").and_then(Value::as_str))
                    .collect();
                (!parts.is_empty()).then(|| parts.join("; "))
            }
            _ => self.error.clone(),
        }
    }
}
