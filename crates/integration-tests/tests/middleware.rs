mod harness;

use std::time::Duration;

use conduit_config::{AnyOrArray, CorsConfig};
use harness::agent::FakeAgent;
use harness::config::ConfigBuilder;
use harness::server::TestServer;
use serde_json::{Value, json};

fn messages_body() -> Value {
    json!({
        "model": "claude-sonnet-4-20250514",
        "max_tokens": 16,
        "messages": [{"role": "user", "content": "ping"}]
    })
}

// -- CORS --

#[tokio::test]
async fn cors_allows_configured_origin() {
    let agent = FakeAgent::replying("ok");
    let config = ConfigBuilder::new(&agent).with_cors(CorsConfig {
        origins: AnyOrArray::List(vec!["http://example.com".to_owned()]),
        ..CorsConfig::default()
    });
    let server = TestServer::start(config).await.unwrap();

    let resp = server
        .client()
        .get(server.url("/health"))
        .header("Origin", "http://example.com")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("http://example.com")
    );
}

#[tokio::test]
async fn cors_preflight_for_model_route() {
    let agent = FakeAgent::replying("ok");
    let config = ConfigBuilder::new(&agent)
        .with_cors(CorsConfig::default())
        .with_api_keys(&["sk-allowed"]);
    let server = TestServer::start(config).await.unwrap();

    let resp = server
        .client()
        .request(reqwest::Method::OPTIONS, server.url("/v1/messages"))
        .header("Origin", "http://anywhere.example")
        .header("Access-Control-Request-Method", "POST")
        .send()
        .await
        .unwrap();

    // Answered by the CORS layer before the key check
    assert_eq!(resp.status(), 200);
    assert!(resp.headers().get("access-control-allow-origin").is_some());
}

// -- Client keys --

#[tokio::test]
async fn missing_key_is_unauthorized_in_each_dialect() {
    let agent = FakeAgent::replying("ok");
    let server = TestServer::start(ConfigBuilder::new(&agent).with_api_keys(&["sk-allowed"]))
        .await
        .unwrap();

    let anthropic = server.post("/v1/messages", &messages_body()).await;
    assert_eq!(anthropic.status(), 401);
    let body: Value = anthropic.json().await.unwrap();
    assert_eq!(body["error"]["type"], "authentication_error");
    assert_eq!(body["error"]["code"], "unauthorized");

    let openai = server
        .post(
            "/v1/chat/completions",
            &json!({"model": "gpt-4o", "messages": [{"role": "user", "content": "x"}]}),
        )
        .await;
    assert_eq!(openai.status(), 401);
    let body: Value = openai.json().await.unwrap();
    assert_eq!(body["error"]["type"], "invalid_request_error");
    assert_eq!(body["error"]["code"], "unauthorized");

    assert!(agent.recorded_request().is_none());
}

#[tokio::test]
async fn listed_key_is_accepted_in_either_header() {
    let agent = FakeAgent::replying("ok");
    let server = TestServer::start(ConfigBuilder::new(&agent).with_api_keys(&["sk-allowed"]))
        .await
        .unwrap();

    let with_api_key = server
        .client()
        .post(server.url("/v1/messages"))
        .header("x-api-key", "sk-allowed")
        .json(&messages_body())
        .send()
        .await
        .unwrap();
    assert_eq!(with_api_key.status(), 200);

    let with_bearer = server
        .client()
        .post(server.url("/v1/chat/completions"))
        .bearer_auth("sk-allowed")
        .json(&json!({"model": "gpt-4o", "messages": [{"role": "user", "content": "x"}]}))
        .send()
        .await
        .unwrap();
    assert_eq!(with_bearer.status(), 200);
}

// -- Admission --

#[tokio::test]
async fn over_quota_gets_retry_after() {
    let agent = FakeAgent::replying("ok");
    let config = ConfigBuilder::new(&agent).with_per_client_limit(2, Duration::from_secs(60));
    let server = TestServer::start(config).await.unwrap();

    let send = |key: &'static str| {
        server
            .client()
            .post(server.url("/v1/messages"))
            .header("x-api-key", key)
            .json(&messages_body())
            .send()
    };

    assert_eq!(send("sk-a").await.unwrap().status(), 200);
    assert_eq!(send("sk-a").await.unwrap().status(), 200);

    let rejected = send("sk-a").await.unwrap();
    assert_eq!(rejected.status(), 429);
    let retry_after: u64 = rejected.headers()["retry-after"].to_str().unwrap().parse().unwrap();
    assert!((1..=60).contains(&retry_after));
    let body: Value = rejected.json().await.unwrap();
    assert_eq!(body["error"]["type"], "rate_limit_error");
    assert_eq!(body["error"]["code"], "rate_limited");

    // Another key has its own window
    assert_eq!(send("sk-b").await.unwrap().status(), 200);
}

#[tokio::test]
async fn openai_rejection_uses_openai_envelope() {
    let agent = FakeAgent::replying("ok");
    let config = ConfigBuilder::new(&agent).with_per_client_limit(1, Duration::from_secs(60));
    let server = TestServer::start(config).await.unwrap();

    let body = json!({"model": "gpt-4o", "messages": [{"role": "user", "content": "x"}]});
    assert_eq!(server.post("/v1/chat/completions", &body).await.status(), 200);

    let rejected = server.post("/v1/chat/completions", &body).await;
    assert_eq!(rejected.status(), 429);
    assert!(rejected.headers().contains_key("retry-after"));
    let body: Value = rejected.json().await.unwrap();
    assert_eq!(body["error"]["type"], "rate_limit_exceeded");
}

#[tokio::test]
async fn health_is_not_rate_limited() {
    let agent = FakeAgent::replying("ok");
    let config = ConfigBuilder::new(&agent).with_per_client_limit(1, Duration::from_secs(60));
    let server = TestServer::start(config).await.unwrap();

    for _ in 0..3 {
        let resp = server.get("/health").await;
        assert_eq!(resp.status(), 200);
    }
}
