//! Canonical protocol types
//!
//! The canonical format is the request/response schema the gateway presents to
//! its callers, independent of which upstream provider answers. Adapters
//! convert between these types and their upstream's native wire format.
//! The design prioritizes:
//! - Type safety through tagged enums for content blocks and stop reasons
//! - Wire compatibility through serde renames and lenient defaults
//! - Immutability: requests are never mutated once handed to an adapter

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Role of a message in the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Caller input message
    User,
    /// Model response
    Assistant,
}

/// Content of a message: a bare string or an ordered sequence of blocks.
///
/// A bare string is equivalent to a one-element text-block sequence; use
/// [`Message::normalize_content`] to get the block form either way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

/// One typed unit of message content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Image {
        source: ImageSource,
    },
    /// Assistant-issued tool/function call
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    /// Result of a prior tool call, replayed by the caller
    ToolResult {
        tool_use_id: String,
        content: ToolResultContent,
    },
    /// Opaque reasoning text some upstreams require before a tool call
    Thinking {
        thinking: String,
    },
}

impl ContentBlock {
    /// Convenience constructor for a text block
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }
}

/// Base64-encoded image payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSource {
    #[serde(rename = "type", default = "base64_source")]
    pub source_type: String,
    pub media_type: String,
    pub data: String,
}

fn base64_source() -> String {
    "base64".to_string()
}

/// Tool-result payload: plain text or nested text-bearing blocks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolResultContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl ToolResultContent {
    /// Normalize the payload to plain text, joining nested text blocks
    pub fn as_text(&self) -> String {
        match self {
            ToolResultContent::Text(text) => text.clone(),
            ToolResultContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// A message in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

impl Message {
    /// Create a user message with text content
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(content.into()),
        }
    }

    /// Create an assistant message with text content
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Text(content.into()),
        }
    }

    /// Create a message from an explicit block sequence
    pub fn from_blocks(role: Role, blocks: Vec<ContentBlock>) -> Self {
        Self {
            role,
            content: MessageContent::Blocks(blocks),
        }
    }

    /// Content as an ordered block sequence, coercing a bare string into a
    /// one-element text block. Idempotent: normalizing an already-normalized
    /// message yields the same sequence.
    pub fn normalize_content(&self) -> Vec<ContentBlock> {
        match &self.content {
            MessageContent::Text(text) => vec![ContentBlock::text(text.clone())],
            MessageContent::Blocks(blocks) => blocks.clone(),
        }
    }
}

/// System instruction: a bare string or ordered text segments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SystemPrompt {
    Text(String),
    Blocks(Vec<SystemBlock>),
}

/// One segment of a structured system instruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SystemBlock {
    Text { text: String },
}

impl SystemPrompt {
    /// Join all text segments into a single system string
    pub fn flatten(&self) -> String {
        match self {
            SystemPrompt::Text(text) => text.clone(),
            SystemPrompt::Blocks(blocks) => blocks
                .iter()
                .map(|SystemBlock::Text { text }| text.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// Tool definition offered to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// JSON-Schema-like parameter description. Adapters sanitize a copy of
    /// this before transmission; the caller's value is never mutated.
    pub input_schema: serde_json::Value,
}

/// A single message-creation request in canonical format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CanonicalRequest {
    #[serde(default)]
    pub model: String,

    #[serde(default)]
    pub messages: Vec<Message>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<SystemPrompt>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolSpec>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,

    #[serde(default)]
    pub stream: bool,
}

impl CanonicalRequest {
    /// Create a request with model and messages
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            ..Default::default()
        }
    }

    /// Set the system instruction
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(SystemPrompt::Text(system.into()));
        self
    }

    /// Set the tool definitions
    pub fn with_tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools = Some(tools);
        self
    }

    /// Set the output token limit
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set sampling temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Enable streaming output
    pub fn with_streaming(mut self) -> Self {
        self.stream = true;
        self
    }
}

/// Validate a canonical request before it is handed to any adapter.
///
/// Pure check, no side effects. Validation failures are surfaced to the
/// caller immediately and never retried.
pub fn validate(request: &CanonicalRequest) -> Result<(), ValidationError> {
    if request.messages.is_empty() {
        return Err(ValidationError::EmptyMessages);
    }
    if request.max_tokens == Some(0) {
        return Err(ValidationError::ZeroMaxTokens);
    }
    Ok(())
}

/// Malformed canonical request
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("request must contain at least one message")]
    EmptyMessages,

    #[error("max_tokens must be greater than zero")]
    ZeroMaxTokens,
}

/// Why the model stopped generating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    ToolUse,
    StopSequence,
}

/// Token accounting for one request/response pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TokenUsage {
    #[serde(default)]
    pub input_tokens: u32,
    #[serde(default)]
    pub output_tokens: u32,
    #[serde(default, skip_serializing_if = "u32_is_zero")]
    pub total_tokens: u32,
}

fn u32_is_zero(value: &u32) -> bool {
    *value == 0
}

impl TokenUsage {
    /// Usage with the total derived from input + output
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        }
    }

    /// Usage with an upstream-supplied total; a zero total is derived instead
    pub fn with_total(input_tokens: u32, output_tokens: u32, total_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: if total_tokens == 0 {
                input_tokens + output_tokens
            } else {
                total_tokens
            },
        }
    }

    /// Total tokens, derived when the upstream supplied none
    pub fn total(&self) -> u32 {
        if self.total_tokens == 0 {
            self.input_tokens + self.output_tokens
        } else {
            self.total_tokens
        }
    }
}

/// A complete response in canonical format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalResponse {
    pub id: String,

    #[serde(rename = "type", default = "message_kind")]
    pub kind: String,

    #[serde(default = "assistant_role")]
    pub role: Role,

    #[serde(default)]
    pub content: Vec<ContentBlock>,

    #[serde(default)]
    pub model: String,

    #[serde(default)]
    pub stop_reason: Option<StopReason>,

    #[serde(default)]
    pub stop_sequence: Option<String>,

    #[serde(default)]
    pub usage: TokenUsage,
}

fn message_kind() -> String {
    "message".to_string()
}

fn assistant_role() -> Role {
    Role::Assistant
}

impl CanonicalResponse {
    /// An empty assistant response shell with a fresh id
    pub fn empty(model: impl Into<String>) -> Self {
        Self {
            id: new_message_id(),
            kind: message_kind(),
            role: Role::Assistant,
            content: Vec::new(),
            model: model.into(),
            stop_reason: None,
            stop_sequence: None,
            usage: TokenUsage::default(),
        }
    }
}

/// Fresh canonical message id (`msg_` + 24 hex chars)
pub fn new_message_id() -> String {
    format!("msg_{}", &Uuid::new_v4().simple().to_string()[..24])
}

/// Fresh tool-use id (`toolu_` + 24 hex chars), for upstreams that omit one
pub fn new_tool_use_id() -> String {
    format!("toolu_{}", &Uuid::new_v4().simple().to_string()[..24])
}

/// Short correlation id attached to logs and error payloads
pub fn new_request_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_string_normalizes_to_single_text_block() {
        let msg = Message::user("hello");
        let blocks = msg.normalize_content();
        assert_eq!(blocks, vec![ContentBlock::text("hello")]);
    }

    #[test]
    fn normalize_is_idempotent() {
        let msg = Message::user("hello");
        let once = msg.normalize_content();
        let twice = Message::from_blocks(Role::User, once.clone()).normalize_content();
        assert_eq!(once, twice);
    }

    #[test]
    fn validate_rejects_empty_messages() {
        let request = CanonicalRequest::new("m", vec![]);
        assert_eq!(validate(&request), Err(ValidationError::EmptyMessages));
    }

    #[test]
    fn validate_rejects_zero_max_tokens() {
        let request = CanonicalRequest::new("m", vec![Message::user("hi")]).with_max_tokens(0);
        assert_eq!(validate(&request), Err(ValidationError::ZeroMaxTokens));
    }

    #[test]
    fn content_blocks_round_trip_through_serde() {
        let json = serde_json::json!({
            "role": "assistant",
            "content": [
                {"type": "text", "text": "checking"},
                {"type": "tool_use", "id": "toolu_1", "name": "read_file", "input": {"path": "/tmp/x"}}
            ]
        });
        let msg: Message = serde_json::from_value(json).unwrap();
        let blocks = msg.normalize_content();
        assert_eq!(blocks.len(), 2);
        assert!(matches!(blocks[1], ContentBlock::ToolUse { .. }));
    }

    #[test]
    fn tool_result_blocks_flatten_to_text() {
        let content = ToolResultContent::Blocks(vec![
            ContentBlock::text("line one"),
            ContentBlock::text("line two"),
        ]);
        assert_eq!(content.as_text(), "line one\nline two");
    }

    #[test]
    fn usage_total_is_derived_unless_supplied() {
        assert_eq!(TokenUsage::new(10, 5).total(), 15);
        assert_eq!(TokenUsage::with_total(10, 5, 20).total(), 20);
        assert_eq!(TokenUsage::with_total(10, 5, 0).total(), 15);
    }

    #[test]
    fn system_prompt_accepts_both_forms() {
        let text: SystemPrompt = serde_json::from_value(serde_json::json!("be brief")).unwrap();
        assert_eq!(text.flatten(), "be brief");

        let blocks: SystemPrompt = serde_json::from_value(serde_json::json!([
            {"type": "text", "text": "be brief"},
            {"type": "text", "text": "be kind"}
        ]))
        .unwrap();
        assert_eq!(blocks.flatten(), "be brief\nbe kind");
    }
}
