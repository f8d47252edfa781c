mod harness;

use harness::agent::FakeAgent;
use harness::config::ConfigBuilder;
use harness::server::TestServer;
use serde_json::{Value, json};

fn chat(model: &str, content: &str) -> Value {
    json!({"model": model, "messages": [{"role": "user", "content": content}]})
}

#[tokio::test]
async fn completion_in_chat_shape_with_aliased_model() {
    let agent = FakeAgent::replying("Bonjour tout le monde");
    let server = TestServer::start(ConfigBuilder::new(&agent)).await.unwrap();

    let resp = server.post("/v1/chat/completions", &chat("gpt-4o", "say hi")).await;

    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["object"], "chat.completion");
    assert!(body["id"].as_str().unwrap().starts_with("chatcmpl-"));
    assert_eq!(body["model"], "gpt-4o");
    assert_eq!(body["choices"][0]["message"]["role"], "assistant");
    assert_eq!(body["choices"][0]["message"]["content"], "Bonjour tout le monde");
    assert_eq!(body["choices"][0]["finish_reason"], "stop");
    assert_eq!(body["usage"]["prompt_tokens"], 12);
    assert_eq!(body["usage"]["completion_tokens"], 5);
    assert_eq!(body["usage"]["total_tokens"], 17);

    let args = agent.recorded_args();
    let model_flag = args.iter().position(|a| a == "--model").unwrap();
    assert_eq!(args[model_flag + 1], "claude-3-7-sonnet-20250219");
}

#[tokio::test]
async fn tool_call_is_reported_as_function_call() {
    let agent = FakeAgent::calling_tool("toolu_01", "get_weather", &json!({"city": "Paris"}));
    let server = TestServer::start(ConfigBuilder::new(&agent)).await.unwrap();

    let resp = server
        .post(
            "/v1/chat/completions",
            &json!({
                "model": "gpt-4o",
                "messages": [{"role": "user", "content": "weather in Paris?"}],
                "tools": [{
                    "type": "function",
                    "function": {
                        "name": "get_weather",
                        "parameters": {"type": "object", "properties": {"city": {"type": "string"}}}
                    }
                }]
            }),
        )
        .await;

    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    let message = &body["choices"][0]["message"];
    assert_eq!(message["content"], Value::Null);
    assert_eq!(message["tool_calls"][0]["id"], "toolu_01");
    assert_eq!(message["tool_calls"][0]["type"], "function");
    assert_eq!(message["tool_calls"][0]["function"]["name"], "get_weather");
    assert_eq!(
        serde_json::from_str::<Value>(message["tool_calls"][0]["function"]["arguments"].as_str().unwrap()).unwrap(),
        json!({"city": "Paris"})
    );
    assert_eq!(body["choices"][0]["finish_reason"], "tool_calls");
}

#[tokio::test]
async fn tool_results_reach_the_agent() {
    let agent = FakeAgent::replying("It is sunny.");
    let server = TestServer::start(ConfigBuilder::new(&agent)).await.unwrap();

    let resp = server
        .post(
            "/v1/chat/completions",
            &json!({
                "model": "gpt-4o",
                "messages": [
                    {"role": "user", "content": "weather in Paris?"},
                    {"role": "assistant", "content": null, "tool_calls": [{
                        "id": "call_1", "type": "function",
                        "function": {"name": "get_weather", "arguments": "{\"city\":\"Paris\"}"}
                    }]},
                    {"role": "tool", "tool_call_id": "call_1", "content": "sunny, 24C"}
                ]
            }),
        )
        .await;

    assert_eq!(resp.status(), 200);
    let request = agent.recorded_request().unwrap().to_string();
    assert!(request.contains("call_1"), "{request}");
    assert!(request.contains("sunny, 24C"), "{request}");
}

#[tokio::test]
async fn multiple_choices_are_rejected() {
    let agent = FakeAgent::replying("never sent");
    let server = TestServer::start(ConfigBuilder::new(&agent)).await.unwrap();

    let mut body = chat("gpt-4o", "x");
    body["n"] = json!(2);
    let resp = server.post("/v1/chat/completions", &body).await;

    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["type"], "invalid_request_error");
    assert_eq!(body["error"]["code"], "malformed_request");
    assert!(body["error"]["message"].as_str().unwrap().contains("n:"));
}

#[tokio::test]
async fn invalid_json_is_rejected_in_openai_shape() {
    let agent = FakeAgent::replying("never sent");
    let server = TestServer::start(ConfigBuilder::new(&agent)).await.unwrap();

    let resp = server
        .client()
        .post(server.url("/v1/chat/completions"))
        .header("content-type", "application/json")
        .body("{\"model\": ")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert!(body.get("type").is_none());
    assert_eq!(body["error"]["code"], "malformed_request");
}

#[tokio::test]
async fn models_lists_aliases() {
    let agent = FakeAgent::replying("ok");
    let server = TestServer::start(ConfigBuilder::new(&agent)).await.unwrap();

    let resp = server.get("/v1/models").await;

    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["object"], "list");
    let ids: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|m| m["id"].as_str())
        .collect();
    assert!(ids.contains(&"gpt-4o"));
    assert!(ids.contains(&"claude-3-7-sonnet-20250219"));
}
