//! Tool set refresh and the `tools/list_changed` broadcast

use std::time::Duration;

use mcprelay_gateway::GatewayConfig;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tests::mcp::{self, initialize, open_stream, post_json};
use tests::{quick_gateway_config, SseReader, TestGateway};

fn count_tools_changed(events: &[String]) -> usize {
    events
        .iter()
        .filter_map(|e| serde_json::from_str::<Value>(e).ok())
        .filter(mcp::is_tools_changed)
        .count()
}

async fn tool_names(http: &reqwest::Client, url: &str, session: &str) -> Vec<String> {
    let (_, body) = post_json(http, url, Some(session), &mcp::request(1, "tools/list", json!({}))).await;
    body["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|t| t["name"].as_str().map(String::from))
        .collect()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_each_tick_announced_once_to_every_session() {
    let gateway = TestGateway::start(GatewayConfig {
        tool_refresh_interval: Duration::from_millis(600),
        ..quick_gateway_config()
    })
    .await;
    let http = reqwest::Client::new();
    let url = gateway.mcp_url();

    let a = initialize(&http, &url).await;
    let b = initialize(&http, &url).await;
    let mut stream_a = SseReader::new(open_stream(&http, &url, Some(&a)).await);
    let mut stream_b = SseReader::new(open_stream(&http, &url, Some(&b)).await);
    let before = tool_names(&http, &url, &a).await;

    let mut events_a = stream_a.collect(Duration::from_millis(1_500)).await;
    let mut events_b = stream_b.collect(Duration::from_millis(100)).await;

    let registry = gateway.server.registry();
    registry.shutdown().await;
    events_a.extend(stream_a.collect(Duration::from_millis(200)).await);
    events_b.extend(stream_b.collect(Duration::from_millis(200)).await);

    let ticks = (registry.generation() - 1) as usize;
    assert!(ticks >= 2, "only {} ticks", ticks);
    assert_eq!(count_tools_changed(&events_a), ticks);
    assert_eq!(count_tools_changed(&events_b), ticks);

    let after = tool_names(&http, &url, &a).await;
    assert!(after.contains(&"multi-greet".to_string()));
    assert_ne!(before, after);
    gateway.stop().await;
}

#[tokio::test]
async fn test_stale_tool_name_is_an_invocation_error() {
    let gateway = TestGateway::start(quick_gateway_config()).await;
    let http = reqwest::Client::new();
    let url = gateway.mcp_url();
    let session = initialize(&http, &url).await;

    let stale = tool_names(&http, &url, &session)
        .await
        .into_iter()
        .find(|n| n.starts_with("single-greeting-"))
        .unwrap();
    gateway.server.registry().refresh();

    let (_, body) = post_json(
        &http,
        &url,
        Some(&session),
        &mcp::call_tool(2, &stale, json!({ "name": "Ada" })),
    )
    .await;
    assert_eq!(body["result"]["isError"], true);
    assert_eq!(
        body["result"]["content"][0]["text"],
        format!("Tool not found: {}", stale)
    );

    // The session survives and can still reach the renamed tool
    let fresh = tool_names(&http, &url, &session)
        .await
        .into_iter()
        .find(|n| n.starts_with("single-greeting-"))
        .unwrap();
    assert_ne!(fresh, stale);
    let (_, body) = post_json(
        &http,
        &url,
        Some(&session),
        &mcp::call_tool(3, &fresh, json!({ "name": "Ada" })),
    )
    .await;
    assert_eq!(body["result"]["content"][0]["text"], "Hey Ada! Welcome to my world!");

    gateway.stop().await;
}
