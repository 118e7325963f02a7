//! Gemini adapter against a mock OpenAI-compatible upstream

use std::sync::Arc;

use futures::StreamExt;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crosswire_core::cache::ContinuationCache;
use crosswire_core::config::ProviderConfig;
use crosswire_core::protocol::{
    CanonicalRequest, ContentBlock, ContentDelta, Message, StopReason, StreamEvent,
};
use crosswire_core::providers::gemini::GeminiAdapter;
use crosswire_core::providers::{ProviderAdapter, ProviderError};

fn config(server: &MockServer) -> ProviderConfig {
    ProviderConfig {
        api_key: "test-key".to_string(),
        model: "gemini-2.5-pro".to_string(),
        base_url: server.uri(),
        timeout_secs: 5,
        proxy: None,
    }
}

fn adapter(server: &MockServer) -> (GeminiAdapter, Arc<ContinuationCache>) {
    let cache = Arc::new(ContinuationCache::new());
    let adapter = GeminiAdapter::new(&config(server), Arc::clone(&cache)).unwrap();
    (adapter, cache)
}

#[tokio::test]
async fn unary_request_round_trips() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({
            "model": "gemini-2.5-pro",
            "stream": false,
            "messages": [{"role": "user", "content": "What is 2+2?"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-1",
            "choices": [{
                "message": {"role": "assistant", "content": "4"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 9, "completion_tokens": 1, "total_tokens": 10}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (adapter, _) = adapter(&server);
    let request = CanonicalRequest::new(
        "claude-3-5-sonnet-20241022",
        vec![Message::user("What is 2+2?")],
    );
    let response = adapter.complete(&request).await.unwrap();

    assert!(response.id.starts_with("msg_"));
    assert_eq!(response.content, vec![ContentBlock::text("4")]);
    assert_eq!(response.stop_reason, Some(StopReason::EndTurn));
    assert_eq!(response.usage.input_tokens, 9);
    assert_eq!(response.usage.total(), 10);
}

#[tokio::test]
async fn upstream_error_surfaces_status_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal"))
        .mount(&server)
        .await;

    let (adapter, _) = adapter(&server);
    let request = CanonicalRequest::new("m", vec![Message::user("hi")]);
    let err = adapter.complete(&request).await.unwrap_err();
    match err {
        ProviderError::Upstream { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body, "internal");
            assert!(err_is_transient(status));
        }
        other => panic!("unexpected error: {other}"),
    }
}

fn err_is_transient(status: u16) -> bool {
    ProviderError::Upstream {
        status,
        body: String::new(),
    }
    .is_transient()
}

#[tokio::test]
async fn streaming_text_translates_to_canonical_events() {
    let server = MockServer::start().await;
    let sse = concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}],",
        "\"usage\":{\"prompt_tokens\":5,\"completion_tokens\":2,\"total_tokens\":7}}\n\n",
        "data: [DONE]\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"))
        .mount(&server)
        .await;

    let (adapter, _) = adapter(&server);
    let request = CanonicalRequest::new("m", vec![Message::user("hi")]).with_streaming();
    let events: Vec<StreamEvent> = adapter
        .stream(&request)
        .await
        .unwrap()
        .map(|item| item.unwrap())
        .collect()
        .await;

    let names: Vec<_> = events.iter().map(|e| e.event_name()).collect();
    assert_eq!(
        names,
        vec![
            "message_start",
            "content_block_start",
            "content_block_delta",
            "content_block_delta",
            "content_block_stop",
            "message_delta",
            "message_stop",
        ]
    );

    let text: String = events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::ContentBlockDelta {
                delta: ContentDelta::TextDelta { text },
                ..
            } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(text, "Hello");
}

#[tokio::test]
async fn streamed_tool_call_stores_thought_signature() {
    let server = MockServer::start().await;
    let sse = concat!(
        "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"call_9\",",
        "\"function\":{\"name\":\"get_weather\",\"arguments\":\"\"},",
        "\"extra_content\":{\"google\":{\"thought_signature\":\"sig-42\"}}}]}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,",
        "\"function\":{\"arguments\":\"{\\\"city\\\":\\\"Oslo\\\"}\"}}]},",
        "\"finish_reason\":\"tool_calls\"}]}\n\n",
        "data: [DONE]\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"))
        .mount(&server)
        .await;

    let (adapter, cache) = adapter(&server);
    let request = CanonicalRequest::new("m", vec![Message::user("weather?")]).with_streaming();
    let events: Vec<StreamEvent> = adapter
        .stream(&request)
        .await
        .unwrap()
        .map(|item| item.unwrap())
        .collect()
        .await;

    assert_eq!(cache.get("call_9"), Some("sig-42".to_string()));

    let stop_reason = events.iter().find_map(|e| match e {
        StreamEvent::MessageDelta { delta, .. } => delta.stop_reason,
        _ => None,
    });
    assert_eq!(stop_reason, Some(StopReason::ToolUse));
}

#[tokio::test]
async fn cached_signature_is_replayed_on_next_turn() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({
            "messages": [
                {"role": "assistant", "tool_calls": [{
                    "id": "call_9",
                    "extra_content": {"google": {"thought_signature": "sig-42"}}
                }]},
                {"role": "tool", "tool_call_id": "call_9", "content": "sunny"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": {"role": "assistant", "content": "It is sunny."},
                "finish_reason": "stop"
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (adapter, cache) = adapter(&server);
    cache.store("call_9", "sig-42", "req_prev");

    let request = CanonicalRequest::new(
        "m",
        vec![
            Message::from_blocks(
                crosswire_core::protocol::Role::Assistant,
                vec![ContentBlock::ToolUse {
                    id: "call_9".into(),
                    name: "get_weather".into(),
                    input: json!({"city": "Oslo"}),
                }],
            ),
            Message::from_blocks(
                crosswire_core::protocol::Role::User,
                vec![ContentBlock::ToolResult {
                    tool_use_id: "call_9".into(),
                    content: crosswire_core::protocol::ToolResultContent::Text("sunny".into()),
                }],
            ),
        ],
    );
    let response = adapter.complete(&request).await.unwrap();
    assert_eq!(response.content, vec![ContentBlock::text("It is sunny.")]);
}
