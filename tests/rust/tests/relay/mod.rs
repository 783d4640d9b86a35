//! Relay integration tests
//!
//! A relay in front of a live gateway: `/send-message` through the MCP bridge,
//! `/stream` fan-out, and the reconnecting stream client.

mod stream_client;
