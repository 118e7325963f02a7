//! DeepSeek adapter
//!
//! DeepSeek exposes an Anthropic-compatible `/v1/messages` endpoint, so
//! requests and responses pass through in canonical form. The upstream is
//! stricter than the canonical contract in a few places, which the
//! configurable [`DeepseekPolicy`] papers over before transmission:
//!
//! - a trailing assistant prefill shorter than a few characters makes the
//!   upstream echo it back broken, so it is stripped
//! - tool calls must be preceded by a thinking block or the upstream
//!   rejects the turn, so a placeholder is synthesized when absent
//! - consecutive assistant messages are rejected outright and are merged
//!
//! Streaming is a guarded passthrough: upstream events are forwarded with
//! a rewritten message id, pings dropped, and clean termination
//! guaranteed even when the upstream truncates mid-block.

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use tracing::{debug, warn};

use crate::config::ProviderConfig;
use crate::protocol::{
    new_message_id, CanonicalRequest, CanonicalResponse, ContentBlock, Message, MessageContent,
    Role, StopReason, StreamEvent, TokenUsage,
};

use super::error::ProviderError;
use super::{build_client, EventStream, ProviderAdapter};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Which upstream-strictness fix-ups to apply before transmission
#[derive(Debug, Clone)]
pub struct DeepseekPolicy {
    pub strip_prefill: bool,
    /// Longest trailing assistant text still treated as a prefill
    pub prefill_max_len: usize,
    pub synthesize_thinking: bool,
    pub merge_consecutive_assistant: bool,
}

impl Default for DeepseekPolicy {
    fn default() -> Self {
        Self {
            strip_prefill: true,
            prefill_max_len: 5,
            synthesize_thinking: true,
            merge_consecutive_assistant: true,
        }
    }
}

/// Apply the policy's fix-ups to a copy of the request. The caller's
/// request is never mutated.
pub fn apply_policy(request: &CanonicalRequest, policy: &DeepseekPolicy) -> CanonicalRequest {
    let mut fixed = request.clone();

    if policy.strip_prefill {
        strip_trailing_prefill(&mut fixed.messages, policy.prefill_max_len);
    }
    if policy.merge_consecutive_assistant {
        merge_consecutive_assistant(&mut fixed.messages);
    }
    if policy.synthesize_thinking {
        for message in &mut fixed.messages {
            if message.role == Role::Assistant {
                synthesize_thinking(message);
            }
        }
    }
    fixed
}

fn strip_trailing_prefill(messages: &mut Vec<Message>, max_len: usize) {
    let is_prefill = messages.last().is_some_and(|last| {
        last.role == Role::Assistant
            && last.normalize_content().iter().all(|block| match block {
                ContentBlock::Text { text } => text.trim().chars().count() <= max_len,
                _ => false,
            })
    });
    if is_prefill {
        messages.pop();
    }
}

fn merge_consecutive_assistant(messages: &mut Vec<Message>) {
    let mut merged: Vec<Message> = Vec::with_capacity(messages.len());
    for message in messages.drain(..) {
        match merged.last_mut() {
            Some(prev) if prev.role == Role::Assistant && message.role == Role::Assistant => {
                let mut blocks = prev.normalize_content();
                blocks.extend(message.normalize_content());
                prev.content = MessageContent::Blocks(blocks);
            }
            _ => merged.push(message),
        }
    }
    *messages = merged;
}

fn synthesize_thinking(message: &mut Message) {
    let mut blocks = message.normalize_content();
    let has_tool_use = blocks
        .iter()
        .any(|b| matches!(b, ContentBlock::ToolUse { .. }));
    let has_thinking = blocks
        .iter()
        .any(|b| matches!(b, ContentBlock::Thinking { .. }));
    if !has_tool_use || has_thinking {
        return;
    }
    // The placeholder leads the turn, ahead of any text
    blocks.insert(
        0,
        ContentBlock::Thinking {
            thinking: "Thinking...".to_string(),
        },
    );
    message.content = MessageContent::Blocks(blocks);
}

/// Forwards upstream Anthropic-format events with guarded invariants.
///
/// The upstream's message id is replaced with a locally minted one, pings
/// are dropped, and a truncated stream still ends with closed blocks, a
/// `message_delta`, and exactly one `message_stop`.
pub struct PassthroughTranslator {
    message_id: String,
    model: String,
    open_blocks: Vec<usize>,
    saw_message_delta: bool,
    started: bool,
    stopped: bool,
}

impl PassthroughTranslator {
    pub fn new(message_id: String, model: String) -> Self {
        Self {
            message_id,
            model,
            open_blocks: Vec::new(),
            saw_message_delta: false,
            started: false,
            stopped: false,
        }
    }

    pub fn handle_event(&mut self, event: StreamEvent) -> Vec<StreamEvent> {
        if self.stopped {
            return Vec::new();
        }
        match event {
            StreamEvent::Ping => Vec::new(),
            StreamEvent::MessageStart { mut message } => {
                if self.started {
                    return Vec::new();
                }
                self.started = true;
                message.id = self.message_id.clone();
                message.model = self.model.clone();
                vec![StreamEvent::MessageStart { message }]
            }
            StreamEvent::ContentBlockStart {
                index,
                content_block,
            } => {
                let mut events = self.ensure_started();
                self.open_blocks.push(index);
                events.push(StreamEvent::ContentBlockStart {
                    index,
                    content_block,
                });
                events
            }
            StreamEvent::ContentBlockStop { index } => {
                self.open_blocks.retain(|&open| open != index);
                vec![StreamEvent::ContentBlockStop { index }]
            }
            StreamEvent::MessageDelta { delta, usage } => {
                self.saw_message_delta = true;
                vec![StreamEvent::MessageDelta { delta, usage }]
            }
            StreamEvent::MessageStop => {
                self.stopped = true;
                let mut events = self.close_open_blocks();
                if !self.saw_message_delta {
                    events.push(StreamEvent::message_delta(
                        StopReason::EndTurn,
                        TokenUsage::default(),
                    ));
                }
                events.push(StreamEvent::MessageStop);
                events
            }
            forwarded => {
                let mut events = self.ensure_started();
                events.push(forwarded);
                events
            }
        }
    }

    /// Terminate a stream the upstream abandoned. Emits nothing when the
    /// upstream already closed cleanly.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        if self.stopped {
            return Vec::new();
        }
        self.stopped = true;
        let mut events = self.ensure_started();
        events.extend(self.close_open_blocks());
        if !self.saw_message_delta {
            events.push(StreamEvent::message_delta(
                StopReason::EndTurn,
                TokenUsage::default(),
            ));
        }
        events.push(StreamEvent::MessageStop);
        events
    }

    fn ensure_started(&mut self) -> Vec<StreamEvent> {
        if self.started {
            return Vec::new();
        }
        self.started = true;
        vec![StreamEvent::message_start(
            self.message_id.clone(),
            self.model.clone(),
        )]
    }

    fn close_open_blocks(&mut self) -> Vec<StreamEvent> {
        std::mem::take(&mut self.open_blocks)
            .into_iter()
            .map(|index| StreamEvent::ContentBlockStop { index })
            .collect()
    }
}

pub struct DeepseekAdapter {
    model: String,
    base_url: String,
    api_key: String,
    timeout_secs: u64,
    client: reqwest::Client,
    policy: DeepseekPolicy,
}

impl DeepseekAdapter {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        Self::with_policy(config, DeepseekPolicy::default())
    }

    pub fn with_policy(
        config: &ProviderConfig,
        policy: DeepseekPolicy,
    ) -> Result<Self, ProviderError> {
        let client = build_client(config)?;
        Ok(Self {
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            timeout_secs: config.timeout_secs,
            client,
            policy,
        })
    }

    fn request_error(&self, err: reqwest::Error) -> ProviderError {
        if err.is_timeout() {
            ProviderError::Timeout(self.timeout_secs)
        } else {
            err.into()
        }
    }

    async fn dispatch(
        &self,
        request: &CanonicalRequest,
        stream: bool,
    ) -> Result<reqwest::Response, ProviderError> {
        let mut wire = apply_policy(request, &self.policy);
        wire.model = self.model.clone();
        wire.stream = stream;
        let url = format!("{}/v1/messages", self.base_url);
        debug!(model = %self.model, url = %url, stream, "deepseek request");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&wire)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Upstream {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl ProviderAdapter for DeepseekAdapter {
    fn name(&self) -> &'static str {
        "deepseek"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        request: &CanonicalRequest,
    ) -> Result<CanonicalResponse, ProviderError> {
        let response = self.dispatch(request, false).await?;
        let mut body: CanonicalResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;
        body.id = new_message_id();
        body.model = self.model.clone();
        if body.content.is_empty() {
            body.content.push(ContentBlock::text(""));
        }
        if body.stop_reason.is_none() {
            body.stop_reason = Some(StopReason::EndTurn);
        }
        Ok(body)
    }

    async fn stream(&self, request: &CanonicalRequest) -> Result<EventStream, ProviderError> {
        let response = self.dispatch(request, true).await?;
        let mut translator = PassthroughTranslator::new(new_message_id(), self.model.clone());

        Ok(Box::pin(async_stream::stream! {
            let mut sse = response.bytes_stream().eventsource();
            while let Some(item) = sse.next().await {
                match item {
                    Ok(event) => {
                        match serde_json::from_str::<StreamEvent>(&event.data) {
                            Ok(parsed) => {
                                let was_stop = matches!(parsed, StreamEvent::MessageStop);
                                for out in translator.handle_event(parsed) {
                                    yield Ok(out);
                                }
                                if was_stop {
                                    break;
                                }
                            }
                            Err(err) => {
                                debug!(error = %err, "skipping undecodable upstream event");
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
        }))
    }
}
