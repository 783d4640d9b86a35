//! Tool listing and invocation through `/mcp`

use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use reqwest::StatusCode;
use serde_json::{json, Value};
use tests::mcp::{self, initialize, open_stream, post, post_json};
use tests::{quick_gateway_config, SseReader, TestGateway, WAIT};

async fn single_greet_name(http: &reqwest::Client, url: &str, session: &str) -> String {
    let (_, body) = post_json(http, url, Some(session), &mcp::request(1, "tools/list", json!({}))).await;
    body["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|t| t["name"].as_str())
        .find(|n| n.starts_with("single-greeting-"))
        .expect("single greet tool listed")
        .to_string()
}

#[tokio::test]
async fn test_tools_list_shape() {
    let gateway = TestGateway::start(quick_gateway_config()).await;
    let http = reqwest::Client::new();
    let url = gateway.mcp_url();
    let session = initialize(&http, &url).await;

    let (status, body) =
        post_json(&http, &url, Some(&session), &mcp::request(1, "tools/list", json!({}))).await;
    assert_eq!(status, StatusCode::OK);

    let tools = body["result"]["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 2);
    let multi = tools.iter().find(|t| t["name"] == "multi-greet").unwrap();
    assert_eq!(
        multi["description"],
        "Greet the user multiple times with delay in between."
    );
    assert_eq!(multi["inputSchema"]["type"], "object");
    assert_eq!(multi["inputSchema"]["required"], json!(["name"]));
    gateway.stop().await;
}

#[tokio::test]
async fn test_single_greet() {
    let gateway = TestGateway::start(quick_gateway_config()).await;
    let http = reqwest::Client::new();
    let url = gateway.mcp_url();
    let session = initialize(&http, &url).await;
    let name = single_greet_name(&http, &url, &session).await;

    let (status, body) = post_json(
        &http,
        &url,
        Some(&session),
        &mcp::call_tool(2, &name, json!({ "name": "Ada" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["result"],
        json!({
            "content": [{ "type": "text", "text": "Hey Ada! Welcome to my world!" }],
            "isError": false
        })
    );
    gateway.stop().await;
}

#[tokio::test]
async fn test_invocation_errors_are_tool_results() {
    let gateway = TestGateway::start(quick_gateway_config()).await;
    let http = reqwest::Client::new();
    let url = gateway.mcp_url();
    let session = initialize(&http, &url).await;
    let name = single_greet_name(&http, &url, &session).await;

    let missing_name = mcp::call_tool(2, &name, json!({}));
    let no_arguments = mcp::request(3, "tools/call", json!({ "name": name }));
    let unknown_tool = mcp::call_tool(4, "single-greeting-gone", json!({ "name": "Ada" }));
    let wrong_type = mcp::call_tool(5, &name, json!({ "name": 42 }));
    let extra_field = mcp::call_tool(6, &name, json!({ "name": "Ada", "mood": "great" }));

    for request in [missing_name, no_arguments, unknown_tool, wrong_type, extra_field] {
        let (status, body) = post_json(&http, &url, Some(&session), &request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"]["isError"], true, "request {}", request);
        assert_eq!(body["result"]["content"].as_array().unwrap().len(), 1);
    }

    let (_, body) = post_json(
        &http,
        &url,
        Some(&session),
        &mcp::call_tool(7, "single-greeting-gone", json!({ "name": "Ada" })),
    )
    .await;
    assert_eq!(
        body["result"]["content"][0]["text"],
        "Tool not found: single-greeting-gone"
    );
    gateway.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_multi_greet_streams_greetings_before_result() {
    let config = quick_gateway_config();
    let spacing = config.greet_spacing;
    let gateway = TestGateway::start(config).await;
    let http = reqwest::Client::new();
    let url = gateway.mcp_url();

    let session = initialize(&http, &url).await;
    let bystander = initialize(&http, &url).await;
    let mut own = SseReader::new(open_stream(&http, &url, Some(&session)).await);
    let mut other = SseReader::new(open_stream(&http, &url, Some(&bystander)).await);

    // Let the demo sequences finish so only greetings could remain
    for stream in [&mut own, &mut other] {
        stream
            .wait_for(WAIT, |e| e.contains("Streaming complete!"))
            .await
            .expect("demo sequence");
    }

    let response = post(
        &http,
        &url,
        Some(&session),
        &mcp::call_tool(9, "multi-greet", json!({ "name": "Bo" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(mcp::is_event_stream(&response));

    let mut reply = SseReader::new(response);
    let mut frames = Vec::new();
    while let Some(frame) = reply.next_json(WAIT).await {
        frames.push((Instant::now(), frame));
    }
    assert_eq!(frames.len(), 3, "frames: {:?}", frames);

    let (first_at, first) = &frames[0];
    let (second_at, second) = &frames[1];
    let (result_at, result) = &frames[2];
    assert_eq!(mcp::message_text(first), Some("First greet to Bo"));
    assert_eq!(first["params"]["level"], "info");
    assert_eq!(mcp::message_text(second), Some("Second greet to Bo"));
    assert_eq!(result["id"], 9);
    assert_eq!(result["result"]["content"][0]["text"], "Hope you enjoy your day!");

    let slack = Duration::from_millis(50);
    assert!(*second_at - *first_at + slack >= spacing, "{:?}", *second_at - *first_at);
    assert!(*result_at - *second_at + slack >= spacing, "{:?}", *result_at - *second_at);

    // Neither standalone stream carries the greetings
    for stream in [&mut own, &mut other] {
        let seen = stream.collect(Duration::from_millis(300)).await;
        assert!(seen.iter().all(|e| !e.contains("greet to Bo")), "saw {:?}", seen);
    }
    gateway.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_multi_greet_json_reply_pushes_to_standalone_stream() {
    let gateway = TestGateway::start(quick_gateway_config()).await;
    let http = reqwest::Client::new();
    let url = gateway.mcp_url();
    let session = initialize(&http, &url).await;
    let mut stream = SseReader::new(open_stream(&http, &url, Some(&session)).await);
    stream
        .wait_for(WAIT, |e| e.contains("Streaming complete!"))
        .await
        .expect("demo sequence");

    // A client that only accepts JSON gets the greetings on its GET stream
    let response = http
        .post(&url)
        .header(reqwest::header::ACCEPT, "application/json")
        .header(tests::SESSION_ID_HEADER, &session)
        .json(&mcp::call_tool(3, "multi-greet", json!({ "name": "Bo" })))
        .send()
        .await
        .unwrap();
    assert!(!mcp::is_event_stream(&response));
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["result"]["content"][0]["text"], "Hope you enjoy your day!");

    let mut greetings = Vec::new();
    while greetings.len() < 2 {
        let event: Value = stream.next_json(WAIT).await.expect("greeting");
        if let Some(text) = mcp::message_text(&event) {
            greetings.push(text.to_string());
        }
    }
    assert_eq!(greetings, vec!["First greet to Bo", "Second greet to Bo"]);
    gateway.stop().await;
}

#[tokio::test]
async fn test_multi_greet_completes_without_stream() {
    let gateway = TestGateway::start(quick_gateway_config()).await;
    let http = reqwest::Client::new();
    let url = gateway.mcp_url();
    let session = initialize(&http, &url).await;

    let (status, body) = post_json(
        &http,
        &url,
        Some(&session),
        &mcp::call_tool(1, "multi-greet", json!({ "name": "Bo" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["isError"], false);
    assert_eq!(body["result"]["content"][0]["text"], "Hope you enjoy your day!");
    gateway.stop().await;
}

#[tokio::test]
async fn test_set_level_filters_messages() {
    let gateway = TestGateway::start(quick_gateway_config()).await;
    let http = reqwest::Client::new();
    let url = gateway.mcp_url();
    let session = initialize(&http, &url).await;

    let (status, body) = post_json(
        &http,
        &url,
        Some(&session),
        &mcp::request(1, "logging/setLevel", json!({ "level": "warning" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"], json!({}));

    let response = post(
        &http,
        &url,
        Some(&session),
        &mcp::call_tool(2, "multi-greet", json!({ "name": "Bo" })),
    )
    .await;
    let seen = SseReader::new(response).collect(WAIT).await;
    assert_eq!(seen.len(), 1, "{:?}", seen);
    assert!(seen[0].contains("Hope you enjoy your day!"));

    let (_, body) = post_json(
        &http,
        &url,
        Some(&session),
        &mcp::request(3, "logging/setLevel", json!({ "level": "loud" })),
    )
    .await;
    assert_eq!(body["error"]["code"], -32602);
    gateway.stop().await;
}
