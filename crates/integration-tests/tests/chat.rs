mod harness;

use harness::config::ConfigBuilder;
use harness::mock_identity::MockIdentity;
use harness::mock_ledger::MockLedger;
use harness::mock_llm::MockLlm;
use harness::server::TestServer;
use harness::sse;
use parley_billing::cost;
use serde_json::{Value, json};

struct Gateway {
    identity: MockIdentity,
    ledger: MockLedger,
    llm: MockLlm,
    server: TestServer,
}

async fn gateway(llm: MockLlm) -> Gateway {
    let identity = MockIdentity::start().await.unwrap();
    let ledger = MockLedger::start().await.unwrap();
    let config = ConfigBuilder::new(&identity, &ledger).with_openai(&llm).build();
    let server = TestServer::start(config).await.unwrap();

    Gateway {
        identity,
        ledger,
        llm,
        server,
    }
}

fn chat_body(model: &str) -> Value {
    json!({
        "model": model,
        "messages": [{"role": "user", "content": "Say hello to my friend"}]
    })
}

fn usage(done: &Value) -> (u64, u64, u64) {
    let usage = &done["usage"];
    (
        usage["prompt_tokens"].as_u64().unwrap(),
        usage["completion_tokens"].as_u64().unwrap(),
        usage["total_cost"].as_u64().unwrap(),
    )
}

#[tokio::test]
async fn free_model_streams_tokens_and_bills_accurate_cost() {
    let gw = gateway(MockLlm::start(&["Hello", " ", " there", "\n", "friend"]).await.unwrap()).await;
    gw.ledger.ledger().credit("usr_free", 1_000);

    let response = gw.server.chat("free-token", &chat_body("gpt-3.5-turbo")).await;

    assert_eq!(response.status(), 200);
    let content_type = response.headers()["content-type"].to_str().unwrap().to_owned();
    assert!(content_type.starts_with("text/event-stream"));

    let frames = sse::read_frames(response).await;
    assert_eq!(sse::text(&frames), "Hello there\nfriend");

    let done = sse::done(&frames).expect("stream should end with a done frame");
    let (prompt_tokens, completion_tokens, total_cost) = usage(done);

    assert_eq!(completion_tokens, cost::estimate_tokens("Hello there\nfriend", "gpt-3.5-turbo"));
    assert_eq!(
        total_cost,
        cost::calculate_token_cost("gpt-3.5-turbo", prompt_tokens, completion_tokens)
    );
    assert_eq!(gw.ledger.ledger().total_debited("usr_free"), total_cost);
    assert_eq!(gw.ledger.ledger().balance("usr_free"), 1_000 - total_cost);
}

#[tokio::test]
async fn premium_model_is_forbidden_without_side_effects() {
    let gw = gateway(MockLlm::start(&["never sent"]).await.unwrap()).await;
    gw.ledger.ledger().credit("usr_free", 1_000);

    let response = gw.server.chat("free-token", &chat_body("gpt-4")).await;

    assert_eq!(response.status(), 403);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"error": "premium_required"}));

    assert_eq!(gw.llm.request_count(), 0);
    assert_eq!(gw.ledger.ledger().calls(), 0);
}

#[tokio::test]
async fn subscriber_uses_premium_model_without_debit() {
    let gw = gateway(MockLlm::start(&["Deep", " thoughts"]).await.unwrap()).await;

    let response = gw.server.chat("sub-token", &chat_body("gpt-4")).await;

    assert_eq!(response.status(), 200);
    let frames = sse::read_frames(response).await;
    let done = sse::done(&frames).expect("stream should end with a done frame");
    let (prompt_tokens, completion_tokens, total_cost) = usage(done);

    assert_eq!(total_cost, cost::calculate_token_cost("gpt-4", prompt_tokens, completion_tokens));
    assert_eq!(gw.ledger.ledger().calls(), 0);
}

#[tokio::test]
async fn custom_key_is_forwarded_upstream_and_unbilled() {
    let gw = gateway(MockLlm::start(&["ok"]).await.unwrap()).await;

    let mut body = chat_body("gpt-4o");
    body["customApiKey"] = json!("sk-user");
    body["hasCustomKey"] = json!(true);

    let response = gw.server.chat("key-token", &body).await;

    assert_eq!(response.status(), 200);
    let frames = sse::read_frames(response).await;
    assert!(sse::done(&frames).is_some());

    let requests = gw.llm.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].authorization.as_deref(), Some("Bearer sk-user"));
    assert_eq!(requests[0].body["model"], "gpt-4o");
    assert_eq!(gw.ledger.ledger().calls(), 0);
}

#[tokio::test]
async fn custom_key_without_identity_backing_is_ignored() {
    let gw = gateway(MockLlm::start(&["ok"]).await.unwrap()).await;
    gw.ledger.ledger().credit("usr_free", 1_000);

    let mut body = chat_body("gpt-3.5-turbo");
    body["customApiKey"] = json!("sk-user");

    let response = gw.server.chat("free-token", &body).await;
    let frames = sse::read_frames(response).await;
    assert!(sse::done(&frames).is_some());

    let requests = gw.llm.requests();
    assert_eq!(requests[0].authorization.as_deref(), Some("Bearer sk-server"));
    assert!(gw.ledger.ledger().total_debited("usr_free") > 0);
}

#[tokio::test]
async fn missing_or_invalid_token_is_unauthorized() {
    let gw = gateway(MockLlm::start(&["never sent"]).await.unwrap()).await;

    let response = gw
        .server
        .client()
        .post(gw.server.url("/v1/chat"))
        .json(&chat_body("gpt-3.5-turbo"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"error": "unauthorized"}));
    assert_eq!(gw.identity.calls(), 0);

    let response = gw.server.chat("forged-token", &chat_body("gpt-3.5-turbo")).await;
    assert_eq!(response.status(), 401);
    assert_eq!(gw.identity.calls(), 1);
    assert_eq!(gw.llm.request_count(), 0);
}

#[tokio::test]
async fn verified_tokens_are_cached() {
    let gw = gateway(MockLlm::start(&["hi"]).await.unwrap()).await;
    gw.ledger.ledger().credit("usr_free", 1_000);

    for _ in 0..2 {
        let response = gw.server.chat("free-token", &chat_body("gpt-3.5-turbo")).await;
        sse::read_frames(response).await;
    }

    assert_eq!(gw.identity.calls(), 1);
}

#[tokio::test]
async fn malformed_body_is_bad_request() {
    let gw = gateway(MockLlm::start(&["never sent"]).await.unwrap()).await;

    for body in [
        json!({"messages": []}),
        json!({"model": "gpt-3.5-turbo", "messages": "hello"}),
        json!({"model": "gpt-3.5-turbo"}),
    ] {
        let response = gw.server.chat("free-token", &body).await;
        assert_eq!(response.status(), 400, "body {body} should be rejected");
        let error: Value = response.json().await.unwrap();
        assert!(error["error"].is_string());
    }

    assert_eq!(gw.llm.request_count(), 0);
}

#[tokio::test]
async fn unsupported_model_is_bad_request() {
    let gw = gateway(MockLlm::start(&["never sent"]).await.unwrap()).await;

    let response = gw.server.chat("sub-token", &chat_body("llama-3-70b")).await;

    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"error": "unsupported_model"}));
}

#[tokio::test]
async fn wrong_method_is_rejected() {
    let gw = gateway(MockLlm::start(&["never sent"]).await.unwrap()).await;

    let response = gw.server.client().get(gw.server.url("/v1/chat")).send().await.unwrap();

    assert_eq!(response.status(), 405);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"error": "method_not_allowed"}));
}

#[tokio::test]
async fn options_requests_get_bare_ok_with_cors() {
    let gw = gateway(MockLlm::start(&["never sent"]).await.unwrap()).await;

    let bare = gw
        .server
        .client()
        .request(reqwest::Method::OPTIONS, gw.server.url("/v1/chat"))
        .send()
        .await
        .unwrap();
    assert_eq!(bare.status(), 200);

    let preflight = gw
        .server
        .client()
        .request(reqwest::Method::OPTIONS, gw.server.url("/v1/chat"))
        .header("origin", "https://chat.example")
        .header("access-control-request-method", "POST")
        .header("access-control-request-headers", "authorization,content-type")
        .send()
        .await
        .unwrap();
    assert_eq!(preflight.status(), 200);
    assert_eq!(preflight.headers()["access-control-allow-origin"], "*");
    assert!(preflight.headers().contains_key("access-control-allow-methods"));
}

#[tokio::test]
async fn upstream_failure_is_one_error_frame_and_unbilled() {
    let gw = gateway(MockLlm::start_failing().await.unwrap()).await;
    gw.ledger.ledger().credit("usr_free", 1_000);

    let response = gw.server.chat("free-token", &chat_body("gpt-3.5-turbo")).await;

    assert_eq!(response.status(), 200);
    let frames = sse::read_frames(response).await;
    assert_eq!(frames, [json!({"error": "upstream_error"})]);
    assert_eq!(gw.ledger.ledger().calls(), 0);
}

#[tokio::test]
async fn empty_balance_ends_stream_with_insufficient_credits() {
    let gw = gateway(MockLlm::start(&["A fairly long answer that costs credits"]).await.unwrap()).await;

    let response = gw.server.chat("free-token", &chat_body("gpt-3.5-turbo")).await;

    assert_eq!(response.status(), 200);
    let frames = sse::read_frames(response).await;
    assert_eq!(frames.last(), Some(&json!({"error": "insufficient_credits"})));
    assert!(sse::done(&frames).is_none());
    assert_eq!(gw.ledger.ledger().total_debited("usr_free"), 0);
}
