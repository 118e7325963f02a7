//! OpenAI-compatible wire format
//!
//! Gemini and Grok both expose OpenAI-style chat-completion endpoints, so
//! the wire types and both translation directions live here once. The
//! adapters differ only in endpoint paths, headers, and whether a
//! continuation cache participates.
//!
//! Streaming translation is stateful: an upstream delta stream has no
//! block boundaries, so [`ChunkTranslator`] tracks which canonical blocks
//! are open and assigns block indices monotonically. An index is used for
//! exactly one block and never reused, even when text resumes after a tool
//! call.

use std::collections::BTreeMap;
use std::sync::Arc;

use eventsource_stream::Eventsource;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::ContinuationCache;
use crate::protocol::{
    new_tool_use_id, CanonicalRequest, CanonicalResponse, ContentBlock, ContentDelta, Role,
    StopReason, StreamEvent, TokenUsage,
};

use super::error::ProviderError;
use super::sanitize::sanitize_schema;
use super::EventStream;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Outbound chat-completion request
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
}

/// One message on the OpenAI wire
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    fn text(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

/// A complete tool call attached to an assistant message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "function_type")]
    pub call_type: String,
    pub function: FunctionCall,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_content: Option<ExtraContent>,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded argument object
    pub arguments: String,
}

/// Vendor extension envelope carried on Gemini tool calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtraContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub google: Option<GoogleExtra>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleExtra {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thought_signature: Option<String>,
}

impl ExtraContent {
    fn with_signature(signature: String) -> Self {
        Self {
            google: Some(GoogleExtra {
                thought_signature: Some(signature),
            }),
        }
    }

    /// Extract the Gemini thought signature, if present
    pub fn signature(&self) -> Option<&str> {
        self.google
            .as_ref()
            .and_then(|g| g.thought_signature.as_deref())
    }
}

/// Tool offered to the model
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: FunctionDefinition,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Unary chat-completion response
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
    #[serde(default)]
    pub usage: Option<UsageBlock>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize, Default)]
pub struct UsageBlock {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

/// One SSE chunk of a streaming chat completion
#[derive(Debug, Clone, Deserialize)]
pub struct StreamChunk {
    #[serde(default)]
    pub choices: Vec<StreamChoice>,
    #[serde(default)]
    pub usage: Option<UsageBlock>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamChoice {
    #[serde(default)]
    pub delta: ChunkDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ChunkDelta {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCallDelta>>,
}

/// Incremental tool-call fragment. `index` is the upstream's slot for the
/// call within this message, not a canonical block index.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallDelta {
    #[serde(default)]
    pub index: usize,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub function: Option<FunctionCallDelta>,
    #[serde(default)]
    pub extra_content: Option<ExtraContent>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct FunctionCallDelta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}

// ---------------------------------------------------------------------------
// Outbound translation
// ---------------------------------------------------------------------------

/// Build the OpenAI-compatible request for a canonical one.
///
/// Tool-use blocks become assistant `tool_calls`, tool results become
/// `tool` role messages, text blocks within one message are joined with
/// newlines. Thinking blocks and images are not representable on this
/// wire and are dropped. When a `cache` is supplied, previously stored
/// continuation tokens are re-attached to replayed tool calls.
pub fn build_chat_request(
    request: &CanonicalRequest,
    model: &str,
    cache: Option<&ContinuationCache>,
) -> ChatCompletionRequest {
    let mut messages = Vec::new();

    if let Some(system) = &request.system {
        let text = system.flatten();
        if !text.is_empty() {
            messages.push(ChatMessage::text("system", text));
        }
    }

    for message in &request.messages {
        match message.role {
            Role::User => {
                let blocks = message.normalize_content();
                // Tool results go first: the upstream expects the `tool`
                // replies before the follow-up user text.
                for block in &blocks {
                    if let ContentBlock::ToolResult {
                        tool_use_id,
                        content,
                    } = block
                    {
                        messages.push(ChatMessage {
                            role: "tool".to_string(),
                            content: Some(content.as_text()),
                            tool_calls: None,
                            tool_call_id: Some(tool_use_id.clone()),
                        });
                    }
                }
                let texts: Vec<&str> = blocks
                    .iter()
                    .filter_map(|block| match block {
                        ContentBlock::Text { text } if !text.is_empty() => Some(text.as_str()),
                        _ => None,
                    })
                    .collect();
                if !texts.is_empty() {
                    messages.push(ChatMessage::text("user", texts.join("\n")));
                }
            }
            Role::Assistant => {
                let mut texts: Vec<String> = Vec::new();
                let mut tool_calls: Vec<ToolCall> = Vec::new();
                for block in message.normalize_content() {
                    match block {
                        ContentBlock::Text { text } => {
                            if !text.is_empty() {
                                texts.push(text);
                            }
                        }
                        ContentBlock::ToolUse { id, name, input } => {
                            let arguments = serde_json::to_string(&input)
                                .unwrap_or_else(|_| "{}".to_string());
                            let extra_content = cache
                                .and_then(|c| c.get(&id))
                                .map(ExtraContent::with_signature);
                            tool_calls.push(ToolCall {
                                id,
                                call_type: function_type(),
                                function: FunctionCall { name, arguments },
                                extra_content,
                            });
                        }
                        // Not representable here
                        ContentBlock::Thinking { .. } | ContentBlock::Image { .. } => {}
                        ContentBlock::ToolResult { .. } => {}
                    }
                }
                if !texts.is_empty() || !tool_calls.is_empty() {
                    messages.push(ChatMessage {
                        role: "assistant".to_string(),
                        content: if texts.is_empty() {
                            None
                        } else {
                            Some(texts.join("\n"))
                        },
                        tool_calls: if tool_calls.is_empty() {
                            None
                        } else {
                            Some(tool_calls)
                        },
                        tool_call_id: None,
                    });
                }
            }
        }
    }

    let tools = request.tools.as_ref().map(|tools| {
        tools
            .iter()
            .map(|tool| ToolDefinition {
                tool_type: function_type(),
                function: FunctionDefinition {
                    name: tool.name.clone(),
                    description: tool.description.clone(),
                    parameters: sanitize_schema(&tool.input_schema),
                },
            })
            .collect::<Vec<_>>()
    });
    let tool_choice = tools.as_ref().map(|_| "auto".to_string());

    ChatCompletionRequest {
        model: model.to_string(),
        messages,
        stream: request.stream,
        tools,
        tool_choice,
        max_tokens: request.max_tokens,
        temperature: request.temperature,
        top_p: request.top_p,
        stop: request.stop_sequences.clone(),
    }
}

// ---------------------------------------------------------------------------
// Inbound translation (unary)
// ---------------------------------------------------------------------------

/// Map the upstream finish reason onto a canonical stop reason
pub fn map_finish_reason(reason: &str) -> StopReason {
    match reason {
        "length" => StopReason::MaxTokens,
        "tool_calls" | "function_call" => StopReason::ToolUse,
        "content_filter" => StopReason::StopSequence,
        _ => StopReason::EndTurn,
    }
}

/// Translate a unary chat-completion response into canonical form.
///
/// The upstream's message id is discarded in favor of a freshly minted
/// canonical one; callers never see upstream ids. Continuation tokens on
/// tool calls are stored under the tool-call id when a cache is supplied.
pub fn to_canonical_response(
    response: &ChatCompletionResponse,
    model: &str,
    cache: Option<&ContinuationCache>,
    request_id: &str,
) -> Result<CanonicalResponse, ProviderError> {
    let choice = response
        .choices
        .first()
        .ok_or_else(|| ProviderError::Decode("response contained no choices".to_string()))?;

    let mut content = Vec::new();
    if let Some(text) = &choice.message.content {
        if !text.is_empty() {
            content.push(ContentBlock::text(text.clone()));
        }
    }

    if let Some(tool_calls) = &choice.message.tool_calls {
        for call in tool_calls {
            let id = if call.id.is_empty() {
                new_tool_use_id()
            } else {
                call.id.clone()
            };
            if let Some(cache) = cache {
                if let Some(signature) = call.extra_content.as_ref().and_then(|e| e.signature()) {
                    cache.store(&id, signature, request_id);
                }
            }
            let input: Value = serde_json::from_str(&call.function.arguments)
                .unwrap_or_else(|_| Value::Object(Default::default()));
            content.push(ContentBlock::ToolUse {
                id,
                name: call.function.name.clone(),
                input,
            });
        }
    }

    // A response must carry at least one block
    if content.is_empty() {
        content.push(ContentBlock::text(""));
    }

    let stop_reason = choice
        .finish_reason
        .as_deref()
        .map(map_finish_reason)
        .or(Some(StopReason::EndTurn));

    let usage = response
        .usage
        .map(|u| TokenUsage::with_total(u.prompt_tokens, u.completion_tokens, u.total_tokens))
        .unwrap_or_default();

    let mut canonical = CanonicalResponse::empty(model);
    canonical.content = content;
    canonical.stop_reason = stop_reason;
    canonical.usage = usage;
    Ok(canonical)
}

// ---------------------------------------------------------------------------
// Inbound translation (streaming)
// ---------------------------------------------------------------------------

struct ToolBlockState {
    /// Canonical block index assigned at open time
    index: usize,
}

/// Stateful translator from OpenAI stream chunks to canonical events.
///
/// Indices are assigned from a monotonic counter at block-open time and
/// never reused. A text block is closed when the first tool-call delta
/// arrives; text after that opens a new block at a fresh index.
pub struct ChunkTranslator {
    message_id: String,
    model: String,
    request_id: String,
    cache: Option<Arc<ContinuationCache>>,
    next_index: usize,
    /// Index of the currently open text block, if any
    open_text: Option<usize>,
    /// Upstream tool-call slot -> open canonical block
    tool_blocks: BTreeMap<usize, ToolBlockState>,
    /// Canonical indices of open tool blocks, in the order they opened
    tool_open_order: Vec<usize>,
    saw_tool_call: bool,
    finish_reason: Option<StopReason>,
    usage: TokenUsage,
    started: bool,
    finished: bool,
}

impl ChunkTranslator {
    pub fn new(
        message_id: String,
        model: String,
        request_id: String,
        cache: Option<Arc<ContinuationCache>>,
    ) -> Self {
        Self {
            message_id,
            model,
            request_id,
            cache,
            next_index: 0,
            open_text: None,
            tool_blocks: BTreeMap::new(),
            tool_open_order: Vec::new(),
            saw_tool_call: false,
            finish_reason: None,
            usage: TokenUsage::default(),
            started: false,
            finished: false,
        }
    }

    /// Translate one upstream chunk into zero or more canonical events
    pub fn handle_chunk(&mut self, chunk: &StreamChunk) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if !self.started {
            self.started = true;
            events.push(StreamEvent::message_start(
                self.message_id.clone(),
                self.model.clone(),
            ));
        }

        for choice in &chunk.choices {
            if let Some(text) = &choice.delta.content {
                if !text.is_empty() {
                    let index = match self.open_text {
                        Some(index) => index,
                        None => {
                            let index = self.next_index;
                            self.next_index += 1;
                            self.open_text = Some(index);
                            events.push(StreamEvent::ContentBlockStart {
                                index,
                                content_block: ContentBlock::text(""),
                            });
                            index
                        }
                    };
                    events.push(StreamEvent::ContentBlockDelta {
                        index,
                        delta: ContentDelta::TextDelta { text: text.clone() },
                    });
                }
            }

            if let Some(tool_calls) = &choice.delta.tool_calls {
                if !tool_calls.is_empty() {
                    if let Some(index) = self.open_text.take() {
                        events.push(StreamEvent::ContentBlockStop { index });
                    }
                    self.saw_tool_call = true;
                }
                for call in tool_calls {
                    let slot = call.index;
                    if !self.tool_blocks.contains_key(&slot) {
                        let id = call
                            .id
                            .clone()
                            .filter(|id| !id.is_empty())
                            .unwrap_or_else(new_tool_use_id);
                        let name = call
                            .function
                            .as_ref()
                            .and_then(|f| f.name.clone())
                            .unwrap_or_default();
                        self.store_signature(&id, call);
                        let index = self.next_index;
                        self.next_index += 1;
                        self.tool_blocks.insert(slot, ToolBlockState { index });
                        self.tool_open_order.push(index);
                        events.push(StreamEvent::ContentBlockStart {
                            index,
                            content_block: ContentBlock::ToolUse {
                                id,
                                name,
                                input: Value::Object(Default::default()),
                            },
                        });
                    } else if let Some(id) = call.id.as_deref() {
                        self.store_signature(id, call);
                    }
                    if let Some(arguments) =
                        call.function.as_ref().and_then(|f| f.arguments.as_ref())
                    {
                        if !arguments.is_empty() {
                            if let Some(state) = self.tool_blocks.get(&slot) {
                                events.push(StreamEvent::ContentBlockDelta {
                                    index: state.index,
                                    delta: ContentDelta::InputJsonDelta {
                                        partial_json: arguments.clone(),
                                    },
                                });
                            }
                        }
                    }
                }
            }

            if let Some(reason) = &choice.finish_reason {
                self.finish_reason = Some(map_finish_reason(reason));
            }
        }

        if let Some(usage) = chunk.usage {
            self.usage = TokenUsage::with_total(
                usage.prompt_tokens,
                usage.completion_tokens,
                usage.total_tokens,
            );
        }

        events
    }

    /// Close every open block and terminate the message. Idempotent: a
    /// second call yields nothing, so the stream carries exactly one
    /// `message_stop`.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;

        let mut events = Vec::new();
        if !self.started {
            self.started = true;
            events.push(StreamEvent::message_start(
                self.message_id.clone(),
                self.model.clone(),
            ));
        }
        if let Some(index) = self.open_text.take() {
            events.push(StreamEvent::ContentBlockStop { index });
        }
        self.tool_blocks.clear();
        for index in std::mem::take(&mut self.tool_open_order) {
            events.push(StreamEvent::ContentBlockStop { index });
        }

        // A tool call in progress forces tool_use no matter how the
        // upstream labeled the finish
        let stop_reason = if self.saw_tool_call {
            StopReason::ToolUse
        } else {
            self.finish_reason.unwrap_or(StopReason::EndTurn)
        };
        events.push(StreamEvent::message_delta(stop_reason, self.usage));
        events.push(StreamEvent::MessageStop);
        events
    }

    fn store_signature(&self, id: &str, call: &ToolCallDelta) {
        if let (Some(cache), Some(signature)) = (
            self.cache.as_ref(),
            call.extra_content.as_ref().and_then(|e| e.signature()),
        ) {
            cache.store(id, signature, &self.request_id);
        }
    }
}

/// Drive an SSE response body through a [`ChunkTranslator`].
///
/// `data: [DONE]` terminates the upstream stream; undecodable chunks are
/// skipped. A transport failure mid-stream surfaces as an in-band error
/// event followed by clean termination, never as a broken stream.
pub fn translate_sse_stream(
    response: reqwest::Response,
    mut translator: ChunkTranslator,
) -> EventStream {
    Box::pin(async_stream::stream! {
        let mut sse = response.bytes_stream().eventsource();
        while let Some(item) = sse.next().await {
            match item {
                Ok(event) => {
                    if event.data.trim() == "[DONE]" {
                        break;
                    }
                    match serde_json::from_str::<StreamChunk>(&event.data) {
                        Ok(chunk) => {
                            for out in translator.handle_chunk(&chunk) {
                                yield Ok(out);
                            }
                        }
                        Err(err) => {
                            debug!(error = %err, "skipping undecodable stream chunk");
                        }
                    }
                }
                Err(err) => {
                    warn!(error = %err, "upstream stream failed mid-flight");
                    yield Ok(StreamEvent::error("upstream_error", err.to_string()));
                    break;
                }
            }
        }
        for out in translator.finish() {
            yield Ok(out);
        }
    })
}
