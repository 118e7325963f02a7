//! Gemini adapter
//!
//! Gemini is reached through its OpenAI-compatible endpoint with bearer
//! auth. It is the one upstream that issues continuation tokens (thought
//! signatures) on tool calls, so this adapter wires the continuation
//! cache into both translation directions. The streaming endpoint lives
//! under `/v1` while the unary one does not; that asymmetry is the
//! upstream's, not ours.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::cache::ContinuationCache;
use crate::config::ProviderConfig;
use crate::protocol::{new_message_id, new_request_id, CanonicalRequest, CanonicalResponse};

use super::error::ProviderError;
use super::openai_compat::{
    build_chat_request, to_canonical_response, translate_sse_stream, ChatCompletionResponse,
    ChunkTranslator,
};
use super::{build_client, EventStream, ProviderAdapter};

pub struct GeminiAdapter {
    model: String,
    base_url: String,
    api_key: String,
    timeout_secs: u64,
    client: reqwest::Client,
    cache: Arc<ContinuationCache>,
}

impl GeminiAdapter {
    pub fn new(
        config: &ProviderConfig,
        cache: Arc<ContinuationCache>,
    ) -> Result<Self, ProviderError> {
        let client = build_client(config)?;
        Ok(Self {
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            timeout_secs: config.timeout_secs,
            client,
            cache,
        })
    }

    fn request_error(&self, err: reqwest::Error) -> ProviderError {
        if err.is_timeout() {
            ProviderError::Timeout(self.timeout_secs)
        } else {
            err.into()
        }
    }
}

#[async_trait]
impl ProviderAdapter for GeminiAdapter {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        request: &CanonicalRequest,
    ) -> Result<CanonicalResponse, ProviderError> {
        let mut wire = build_chat_request(request, &self.model, Some(&self.cache));
        wire.stream = false;
        let url = format!("{}/chat/completions", self.base_url);
        debug!(model = %self.model, url = %url, "gemini unary request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
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

        let body: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;
        to_canonical_response(&body, &self.model, Some(&self.cache), &new_request_id())
    }

    async fn stream(&self, request: &CanonicalRequest) -> Result<EventStream, ProviderError> {
        let mut wire = build_chat_request(request, &self.model, Some(&self.cache));
        wire.stream = true;
        let url = format!("{}/v1/chat/completions", self.base_url);
        debug!(model = %self.model, url = %url, "gemini streaming request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
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

        let translator = ChunkTranslator::new(
            new_message_id(),
            self.model.clone(),
            new_request_id(),
            Some(Arc::clone(&self.cache)),
        );
        Ok(translate_sse_stream(response, translator))
    }
}
