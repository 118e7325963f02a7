//! Canonical streaming events
//!
//! A streaming response is delivered as an ordered event sequence:
//! one `message_start`, then per content block one `content_block_start`,
//! zero or more `content_block_delta`, one `content_block_stop` (indices
//! assigned once, monotonically, never reused), then one `message_delta`
//! carrying the stop reason and usage, and exactly one final `message_stop`.
//! Adapters guarantee the terminator even when the upstream truncates.

use serde::{Deserialize, Serialize};

use super::types::{CanonicalResponse, StopReason, TokenUsage};

/// One canonical server-sent event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    MessageStart {
        message: CanonicalResponse,
    },
    ContentBlockStart {
        index: usize,
        content_block: super::types::ContentBlock,
    },
    ContentBlockDelta {
        index: usize,
        delta: ContentDelta,
    },
    ContentBlockStop {
        index: usize,
    },
    MessageDelta {
        delta: MessageDeltaBody,
        #[serde(default)]
        usage: TokenUsage,
    },
    MessageStop,
    /// Keep-alive frame some Anthropic-compatible upstreams emit; dropped
    /// during translation, never forwarded.
    Ping,
    /// In-band failure for a stream that has already started flowing
    Error {
        error: ErrorBody,
    },
}

/// Incremental content payload inside a `content_block_delta`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentDelta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
    ThinkingDelta { thinking: String },
}

/// Payload of the `message_delta` event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MessageDeltaBody {
    pub stop_reason: Option<StopReason>,
    pub stop_sequence: Option<String>,
}

/// Structured error carried in-band on a live stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
}

impl StreamEvent {
    /// Open a streaming message with an empty assistant shell
    pub fn message_start(id: impl Into<String>, model: impl Into<String>) -> Self {
        let mut message = CanonicalResponse::empty(model);
        message.id = id.into();
        StreamEvent::MessageStart { message }
    }

    /// Close a message with the given stop reason and usage
    pub fn message_delta(stop_reason: StopReason, usage: TokenUsage) -> Self {
        StreamEvent::MessageDelta {
            delta: MessageDeltaBody {
                stop_reason: Some(stop_reason),
                stop_sequence: None,
            },
            usage,
        }
    }

    /// In-band error event
    pub fn error(kind: impl Into<String>, message: impl Into<String>) -> Self {
        StreamEvent::Error {
            error: ErrorBody {
                kind: kind.into(),
                message: message.into(),
            },
        }
    }

    /// The wire name of this event, matching the payload's own `type` tag
    pub fn event_name(&self) -> &'static str {
        match self {
            StreamEvent::MessageStart { .. } => "message_start",
            StreamEvent::ContentBlockStart { .. } => "content_block_start",
            StreamEvent::ContentBlockDelta { .. } => "content_block_delta",
            StreamEvent::ContentBlockStop { .. } => "content_block_stop",
            StreamEvent::MessageDelta { .. } => "message_delta",
            StreamEvent::MessageStop => "message_stop",
            StreamEvent::Ping => "ping",
            StreamEvent::Error { .. } => "error",
        }
    }

    /// Encode as one SSE frame: `event: <type>\ndata: <json>\n\n`
    pub fn to_sse(&self) -> String {
        let data = serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string());
        format!("event: {}\ndata: {}\n\n", self.event_name(), data)
    }
}
