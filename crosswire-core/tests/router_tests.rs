//! Fallback and retry behavior across the provider chain

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::{stream, StreamExt};

use crosswire_core::cache::ContinuationCache;
use crosswire_core::config::ProviderConfig;
use crosswire_core::error::GatewayError;
use crosswire_core::protocol::{
    CanonicalRequest, CanonicalResponse, ContentBlock, Message, StopReason, StreamEvent,
};
use crosswire_core::providers::{
    EventStream, ProviderAdapter, ProviderError, ProviderRegistry, RetryPolicy, Router,
};

static FLAKY_CALLS: AtomicU32 = AtomicU32::new(0);

struct StubAdapter {
    /// "ok", "flaky" (one 503 then success), "down" (always 503),
    /// "rejected" (401)
    mode: String,
    model: String,
}

#[async_trait]
impl ProviderAdapter for StubAdapter {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        _request: &CanonicalRequest,
    ) -> Result<CanonicalResponse, ProviderError> {
        match self.mode.as_str() {
            "ok" => {
                let mut response = CanonicalResponse::empty(&self.model);
                response.content.push(ContentBlock::text("served"));
                response.stop_reason = Some(StopReason::EndTurn);
                Ok(response)
            }
            "flaky" => {
                if FLAKY_CALLS.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(ProviderError::Upstream {
                        status: 503,
                        body: "warming up".into(),
                    })
                } else {
                    let mut response = CanonicalResponse::empty(&self.model);
                    response.content.push(ContentBlock::text("served late"));
                    Ok(response)
                }
            }
            "rejected" => Err(ProviderError::Upstream {
                status: 401,
                body: "bad key".into(),
            }),
            _ => Err(ProviderError::Upstream {
                status: 503,
                body: "unavailable".into(),
            }),
        }
    }

    async fn stream(&self, request: &CanonicalRequest) -> Result<EventStream, ProviderError> {
        match self.mode.as_str() {
            "ok" => {
                let events = vec![
                    Ok(StreamEvent::message_start("msg_stub", self.model.clone())),
                    Ok(StreamEvent::MessageStop),
                ];
                Ok(Box::pin(stream::iter(events)))
            }
            _ => self.complete(request).await.map(|_| unreachable!()),
        }
    }
}

fn stub_factory(
    config: &ProviderConfig,
    _cache: Arc<ContinuationCache>,
) -> Result<Arc<dyn ProviderAdapter>, ProviderError> {
    // The api_key field carries the stub behavior
    Ok(Arc::new(StubAdapter {
        mode: config.api_key.clone(),
        model: config.model.clone(),
    }))
}

fn provider(mode: &str) -> ProviderConfig {
    ProviderConfig {
        api_key: mode.to_string(),
        model: format!("{mode}-model"),
        base_url: "http://localhost:9".to_string(),
        timeout_secs: 1,
        proxy: None,
    }
}

fn router() -> (Router, Arc<ContinuationCache>) {
    let registry = ProviderRegistry::new();
    registry.register("stub", stub_factory);
    let cache = Arc::new(ContinuationCache::new());
    let retry = RetryPolicy {
        max_retries: 1,
        initial_delay_ms: 1,
        max_delay_ms: 5,
        jitter_factor: 0.0,
        ..RetryPolicy::default()
    };
    (
        Router::new(Arc::new(registry), Arc::clone(&cache), retry),
        cache,
    )
}

fn request() -> CanonicalRequest {
    CanonicalRequest::new("claude-3-5-sonnet-20241022", vec![Message::user("hi")])
}

#[tokio::test]
async fn primary_failure_falls_back_in_order() {
    let (router, _) = router();
    let chain = vec![
        ("stub".to_string(), provider("rejected")),
        ("stub".to_string(), provider("ok")),
    ];
    let routed = router.execute(&request(), &chain).await.unwrap();
    assert_eq!(routed.model, "ok-model");
    assert_eq!(routed.attempts, 1);
    assert_eq!(routed.response.content, vec![ContentBlock::text("served")]);
}

#[tokio::test]
async fn transient_failure_is_retried_on_same_provider() {
    FLAKY_CALLS.store(0, Ordering::SeqCst);
    let (router, _) = router();
    let chain = vec![("stub".to_string(), provider("flaky"))];
    let routed = router.execute(&request(), &chain).await.unwrap();
    assert_eq!(routed.attempts, 2);
    assert_eq!(FLAKY_CALLS.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn exhausted_chain_reports_every_attempt() {
    let (router, _) = router();
    let chain = vec![
        ("stub".to_string(), provider("down")),
        ("stub".to_string(), provider("rejected")),
    ];
    let err = router.execute(&request(), &chain).await.unwrap_err();
    match err {
        GatewayError::AllProvidersFailed { attempted } => {
            assert_eq!(attempted.len(), 2);
            assert!(attempted[0].error.contains("503"));
            assert!(attempted[1].error.contains("401"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn unknown_provider_is_skipped_not_fatal() {
    let (router, _) = router();
    let chain = vec![
        ("missing".to_string(), provider("ok")),
        ("stub".to_string(), provider("ok")),
    ];
    let routed = router.execute(&request(), &chain).await.unwrap();
    assert_eq!(routed.provider, "stub");
}

#[tokio::test]
async fn stream_fallback_commits_to_first_accepting_provider() {
    let (router, _) = router();
    let chain = vec![
        ("stub".to_string(), provider("rejected")),
        ("stub".to_string(), provider("ok")),
    ];
    let routed = router.execute_stream(&request(), &chain).await.unwrap();
    assert_eq!(routed.model, "ok-model");

    let names: Vec<_> = routed
        .events
        .map(|item| item.unwrap().event_name())
        .collect()
        .await;
    assert_eq!(names, vec!["message_start", "message_stop"]);
}

#[tokio::test]
async fn empty_chain_fails_with_no_attempts() {
    let (router, _) = router();
    let err = router.execute(&request(), &[]).await.unwrap_err();
    assert!(matches!(
        err,
        GatewayError::AllProvidersFailed { attempted } if attempted.is_empty()
    ));
}
