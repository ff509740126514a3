//! Stream payload decoding.
//!
//! One SSE payload becomes zero or more `StreamEvent`s. Plain text is a text
//! delta; JSON objects are dispatched on their `type` field. Bad frames are
//! skipped, except a bad `complete` frame, which ends the stream.

use parlance_protocol::{
    CompletePayload, MemoryNotice, RoutingDecision, StreamFrame, TokenUsage, ToolCallPayload,
    ToolResult, STREAM_DONE_SENTINEL,
};
use serde_json::Value;
use tracing::warn;

use crate::error::ClientError;
use crate::tools::ToolCallDelta;

/// A decoded lifecycle event, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    TextDelta(String),
    SessionAssigned(String),
    MemoriesExtracted(Vec<MemoryNotice>),
    RoutingSelected(RoutingDecision),
    ToolsEnabled(u32),
    /// One fragment of a tool call; fragments are merged downstream.
    ToolCall(ToolCallDelta),
    ToolResult(ToolResult),
    Notice {
        message: String,
        model: Option<String>,
    },
    /// Legacy end of reply; completion follows at the sentinel or end of body.
    ReplyFinished {
        reply: Option<String>,
        usage: Option<TokenUsage>,
        provider: Option<String>,
    },
    Complete(CompletePayload),
    Error(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Events(Vec<StreamEvent>),
    Skipped,
    /// `[DONE]` sentinel
    End,
}

/// Decode one payload. Only a malformed `complete` frame is an error.
pub fn decode_payload(payload: &str) -> Result<Decoded, ClientError> {
    if payload.trim() == STREAM_DONE_SENTINEL {
        return Ok(Decoded::End);
    }

    let value = match serde_json::from_str::<Value>(payload) {
        Ok(value @ Value::Object(_)) => value,
        _ => return Ok(text(payload)),
    };

    let frame_type = match value.get("type").and_then(Value::as_str) {
        Some(t) => t.to_string(),
        None => {
            warn!(
                component = "frame",
                event = "frame.skipped",
                reason = "missing_type",
                "Skipping JSON frame without a type"
            );
            return Ok(Decoded::Skipped);
        }
    };

    let frame = match serde_json::from_value::<StreamFrame>(value) {
        Ok(frame) => frame,
        Err(err) if frame_type == "complete" => {
            return Err(ClientError::MalformedCompletion(err.to_string()));
        }
        Err(err) => {
            warn!(
                component = "frame",
                event = "frame.skipped",
                frame_type = %frame_type,
                error = %err,
                "Skipping unreadable frame"
            );
            return Ok(Decoded::Skipped);
        }
    };

    Ok(match frame {
        StreamFrame::SessionId { session_id } => one(StreamEvent::SessionAssigned(session_id)),
        StreamFrame::Chunk { content, .. } => one(StreamEvent::TextDelta(content)),
        StreamFrame::Memories { memories, .. } => one(StreamEvent::MemoriesExtracted(memories)),
        StreamFrame::Routing { routing } => one(StreamEvent::RoutingSelected(routing)),
        StreamFrame::ToolsEnabled { tools_count } => one(StreamEvent::ToolsEnabled(tools_count)),
        StreamFrame::ToolCall {
            tool_call,
            function,
            result,
        } => tool_call_events(tool_call, function, result),
        StreamFrame::ToolResult { name, result } => one(StreamEvent::ToolResult(ToolResult {
            name,
            input: None,
            result,
            error: None,
        })),
        StreamFrame::ToolError { error, name } => one(StreamEvent::ToolResult(ToolResult {
            name: name.unwrap_or_else(|| "unknown".to_string()),
            input: None,
            result: Value::Null,
            error: Some(error),
        })),
        StreamFrame::Info { message } => one(StreamEvent::Notice {
            message,
            model: None,
        }),
        StreamFrame::Fallback { message, model } => one(StreamEvent::Notice { message, model }),
        StreamFrame::Done {
            accumulated,
            usage,
            provider,
        } => one(StreamEvent::ReplyFinished {
            reply: accumulated,
            usage,
            provider,
        }),
        StreamFrame::Complete(payload) => one(StreamEvent::Complete(payload)),
        StreamFrame::Error { error } => one(StreamEvent::Error(error)),
    })
}

fn one(event: StreamEvent) -> Decoded {
    Decoded::Events(vec![event])
}

fn text(payload: &str) -> Decoded {
    if payload.is_empty() {
        Decoded::Skipped
    } else {
        one(StreamEvent::TextDelta(payload.to_string()))
    }
}

fn tool_call_events(
    tool_call: Option<ToolCallPayload>,
    function: Option<String>,
    result: Option<Value>,
) -> Decoded {
    if let Some(call) = tool_call {
        return one(StreamEvent::ToolCall(ToolCallDelta {
            index: call.index,
            id: call.id,
            name: call.function.name,
            arguments: call.function.arguments,
        }));
    }

    match function {
        Some(name) => {
            let started = StreamEvent::ToolCall(ToolCallDelta {
                name: Some(name.clone()),
                ..Default::default()
            });
            match result {
                Some(result) => Decoded::Events(vec![
                    started,
                    StreamEvent::ToolResult(ToolResult {
                        name,
                        input: None,
                        result,
                        error: None,
                    }),
                ]),
                None => one(started),
            }
        }
        None => {
            warn!(
                component = "frame",
                event = "frame.skipped",
                frame_type = "tool_call",
                reason = "missing_function",
                "Skipping tool call without a function name"
            );
            Decoded::Skipped
        }
    }
}
