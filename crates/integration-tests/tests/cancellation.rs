mod harness;

use std::time::Duration;

use futures_util::StreamExt;
use harness::agent::FakeAgent;
use harness::config::ConfigBuilder;
use harness::server::TestServer;
use harness::sse::parse_sse;
use serde_json::{Value, json};

fn stream_body() -> Value {
    json!({
        "model": "claude-sonnet-4-20250514",
        "max_tokens": 16,
        "stream": true,
        "messages": [{"role": "user", "content": "think hard"}]
    })
}

#[cfg(target_os = "linux")]
async fn wait_for_pid(agent: &FakeAgent) -> u32 {
    for _ in 0..100 {
        if let Some(pid) = agent.pid() {
            return pid;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("agent never started");
}

#[cfg(target_os = "linux")]
fn is_running(pid: u32) -> bool {
    std::path::Path::new(&format!("/proc/{pid}")).exists()
}

#[tokio::test]
async fn deadline_ends_a_blocking_request() {
    let agent = FakeAgent::stalling();
    let config = ConfigBuilder::new(&agent).with_request_timeout(Duration::from_millis(500));
    let server = TestServer::start(config).await.unwrap();

    let resp = server
        .post(
            "/v1/chat/completions",
            &json!({"model": "gpt-4o", "messages": [{"role": "user", "content": "x"}]}),
        )
        .await;

    assert_eq!(resp.status(), 408);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["type"], "timeout");
    assert_eq!(body["error"]["code"], "request_timeout");
}

#[tokio::test]
async fn deadline_ends_a_stream_with_an_error_event() {
    let agent = FakeAgent::stalling();
    let config = ConfigBuilder::new(&agent).with_request_timeout(Duration::from_millis(500));
    let server = TestServer::start(config).await.unwrap();

    let resp = server.post("/v1/messages", &stream_body()).await;
    assert_eq!(resp.status(), 200);

    let events = parse_sse(&resp.text().await.unwrap());
    assert_eq!(events.first().and_then(|e| e.event.as_deref()), Some("message_start"));
    let last = events.last().unwrap();
    assert_eq!(last.event.as_deref(), Some("error"));
    assert_eq!(last.json().unwrap()["error"]["code"], "request_timeout");
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn client_disconnect_kills_the_agent() {
    let agent = FakeAgent::stalling();
    let config = ConfigBuilder::new(&agent).with_agent_idle_timeout(Duration::from_secs(60));
    let server = TestServer::start(config).await.unwrap();

    let resp = server.post("/v1/messages", &stream_body()).await;
    let mut body = resp.bytes_stream();
    let first = body.next().await.unwrap().unwrap();
    assert!(String::from_utf8_lossy(&first).contains("message_start"));

    let pid = wait_for_pid(&agent).await;
    assert!(is_running(pid));

    drop(body);

    for _ in 0..250 {
        if !is_running(pid) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("agent {pid} still running after the client went away");
}
