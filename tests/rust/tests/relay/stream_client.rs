//! Reconnecting stream client against a live relay

use std::time::{Duration, Instant};

use mcprelay_relay::{ReconnectingStreamClient, StreamClientConfig, StreamState};
use pretty_assertions::assert_eq;
use tests::{eventually, TestRelay, WAIT};

const RECONNECT_DELAY: Duration = Duration::from_millis(400);

#[tokio::test(flavor = "multi_thread")]
async fn test_reconnects_after_forced_close_without_loss_or_duplication() {
    let relay = TestRelay::start("http://127.0.0.1:9/mcp").await;
    let gateway = relay.server.gateway();

    let client = ReconnectingStreamClient::new(StreamClientConfig {
        url: relay.stream_url(),
        reconnect_delay: RECONNECT_DELAY,
    });
    let mut state = client.watch_state();
    client.start();

    tokio::time::timeout(WAIT, state.wait_for(|s| *s == StreamState::Streaming))
        .await
        .expect("streaming within 5s")
        .unwrap();
    assert!(eventually(WAIT, || gateway.subscriber_count() == 1).await);

    gateway.publish("A");
    let log = client.log();
    assert!(eventually(WAIT, || log.len() == 1).await);

    // Server-side close of every subscriber stream
    gateway.close_all();
    tokio::time::timeout(WAIT, state.wait_for(|s| *s == StreamState::Disconnected))
        .await
        .expect("disconnect noticed")
        .unwrap();
    let dropped_at = Instant::now();

    tokio::time::timeout(WAIT, state.wait_for(|s| *s == StreamState::Streaming))
        .await
        .expect("reconnected within 5s")
        .unwrap();
    assert!(dropped_at.elapsed() >= RECONNECT_DELAY - Duration::from_millis(50));
    assert!(eventually(WAIT, || gateway.subscriber_count() == 1).await);

    gateway.publish("B");
    gateway.publish("C");
    assert!(eventually(WAIT, || log.len() == 3).await);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(log.entries(), vec!["A", "B", "C"]);

    client.shutdown().await;
    assert_eq!(client.state(), StreamState::Stopped);
    relay.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_keeps_retrying_until_relay_appears() {
    // Reserve a port, then free it so the first attempts are refused
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let client = ReconnectingStreamClient::new(StreamClientConfig {
        url: format!("http://127.0.0.1:{}/stream", port),
        reconnect_delay: Duration::from_millis(100),
    });
    client.start();
    tokio::time::sleep(Duration::from_millis(350)).await;
    assert_ne!(client.state(), StreamState::Streaming);

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await.unwrap();
    let server = std::sync::Arc::new(mcprelay_relay::RelayServer::new(Default::default()));
    let serving = {
        let server = std::sync::Arc::clone(&server);
        tokio::spawn(async move { server.serve(listener).await })
    };

    let mut state = client.watch_state();
    tokio::time::timeout(WAIT, state.wait_for(|s| *s == StreamState::Streaming))
        .await
        .expect("connects once the relay is up")
        .unwrap();

    client.shutdown().await;
    server.cleanup().await;
    let _ = tokio::time::timeout(WAIT, serving).await;
}
