//! Grok adapter
//!
//! Grok speaks the plain OpenAI-compatible dialect with bearer auth and
//! no vendor extensions, so no continuation cache participates in either
//! direction. Both unary and streaming requests hit the same endpoint.

use async_trait::async_trait;
use tracing::debug;

use crate::config::ProviderConfig;
use crate::protocol::{new_message_id, new_request_id, CanonicalRequest, CanonicalResponse};

use super::error::ProviderError;
use super::openai_compat::{
    build_chat_request, to_canonical_response, translate_sse_stream, ChatCompletionResponse,
    ChunkTranslator,
};
use super::{build_client, EventStream, ProviderAdapter};

pub struct GrokAdapter {
    model: String,
    base_url: String,
    api_key: String,
    timeout_secs: u64,
    client: reqwest::Client,
}

impl GrokAdapter {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let client = build_client(config)?;
        Ok(Self {
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            timeout_secs: config.timeout_secs,
            client,
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
        let mut wire = build_chat_request(request, &self.model, None);
        wire.stream = stream;
        let url = format!("{}/chat/completions", self.base_url);
        debug!(model = %self.model, url = %url, stream, "grok request");

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
        Ok(response)
    }
}

#[async_trait]
impl ProviderAdapter for GrokAdapter {
    fn name(&self) -> &'static str {
        "grok"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        request: &CanonicalRequest,
    ) -> Result<CanonicalResponse, ProviderError> {
        let response = self.dispatch(request, false).await?;
        let body: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;
        to_canonical_response(&body, &self.model, None, &new_request_id())
    }

    async fn stream(&self, request: &CanonicalRequest) -> Result<EventStream, ProviderError> {
        let response = self.dispatch(request, true).await?;
        let translator =
            ChunkTranslator::new(new_message_id(), self.model.clone(), new_request_id(), None);
        Ok(translate_sse_stream(response, translator))
    }
}
