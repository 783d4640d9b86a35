//! HTTP Request/Response Logging Middleware
//!
//! Centralized logging with trace ids for request correlation. Request bodies are
//! read to pull out the JSON-RPC method; JSON responses are buffered to log a
//! summary. Event streams are passed through untouched.

use axum::{
    body::Body,
    extract::Request,
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use http_body_util::BodyExt;
use mcprelay_core::SESSION_ID_HEADER;
use serde_json::Value;
use tracing::{debug, warn, Instrument};

use crate::logging::{RequestSpan, TraceContext};

/// Largest body that is buffered for logging (1MB)
const MAX_BODY_LOG_SIZE: usize = 1024 * 1024;

fn compact_headers(headers: &HeaderMap) -> String {
    headers
        .iter()
        .filter(|(name, _)| {
            matches!(
                name.as_str(),
                "content-type" | "accept" | "user-agent" | "mcp-session-id" | "mcp-protocol-version"
            )
        })
        .map(|(name, value)| format!("{}={:?}", name, value))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Compact rendering of a body: the JSON-RPC method if there is one, else the JSON
pub fn format_body(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return "[empty]".to_string();
    }
    if bytes.len() > MAX_BODY_LOG_SIZE {
        return format!("[{} bytes]", bytes.len());
    }

    match std::str::from_utf8(bytes) {
        Ok(text) => {
            if let Ok(json) = serde_json::from_str::<Value>(text) {
                if let Some(method) = json.get("method").and_then(Value::as_str) {
                    return method.to_string();
                }
                return serde_json::to_string(&json).unwrap_or_else(|_| text.to_string());
            }
            match text.char_indices().nth(200) {
                Some((cut, _)) => format!("{}...", &text[..cut]),
                None => text.to_string(),
            }
        }
        Err(_) => format!("[binary: {} bytes]", bytes.len()),
    }
}

fn summarize_one(json: &Value) -> Option<String> {
    if let Some(error) = json.get("error") {
        let code = error.get("code").and_then(Value::as_i64).unwrap_or(0);
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        return Some(format!("error: {} ({})", message, code));
    }

    let result = json.get("result")?;
    if let Some(tools) = result.get("tools").and_then(Value::as_array) {
        return Some(format!("tools: {}", tools.len()));
    }
    if let Some(content) = result.get("content").and_then(Value::as_array) {
        let is_error = result.get("isError").and_then(Value::as_bool).unwrap_or(false);
        return Some(format!(
            "content: {} items{}",
            content.len(),
            if is_error { " (isError)" } else { "" }
        ));
    }
    if let Some(version) = result.get("protocolVersion").and_then(Value::as_str) {
        let name = result
            .get("serverInfo")
            .and_then(|s| s.get("name"))
            .and_then(Value::as_str)
            .unwrap_or("?");
        return Some(format!("initialized: {} ({})", name, version));
    }
    match result.as_object() {
        Some(obj) if !obj.is_empty() => Some(format!(
            "result: {{{}}}",
            obj.keys().map(String::as_str).collect::<Vec<_>>().join(", ")
        )),
        _ => Some("ok".to_string()),
    }
}

/// Summarize a JSON-RPC response body (single or batch)
pub fn format_mcp_response(bytes: &[u8]) -> Option<String> {
    let json: Value = serde_json::from_slice(bytes).ok()?;
    match &json {
        Value::Array(items) => Some(format!("batch: {} responses", items.len())),
        single => summarize_one(single),
    }
}

/// JSON-RPC method of a body; batches report their first method
pub fn extract_mcp_method(bytes: &[u8]) -> Option<String> {
    let json: Value = serde_json::from_slice(bytes).ok()?;
    let first = match &json {
        Value::Array(items) => items.iter().find_map(|i| i.get("method"))?,
        single => single.get("method")?,
    };
    first.as_str().map(String::from)
}

fn is_event_stream(response: &Response) -> bool {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("text/event-stream"))
}

fn is_json(response: &Response) -> bool {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"))
}

/// Logging middleware for requests and responses
///
/// Generates a trace id and logs a single entry/exit line per request.
pub async fn http_logging_middleware(request: Request, next: Next) -> Result<Response, StatusCode> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let session_id = request
        .headers()
        .get(SESSION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    let headers = compact_headers(request.headers());

    let (parts, body) = request.into_parts();
    let body_bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(path = %path, "Failed to read request body: {}", e);
            return Err(StatusCode::BAD_REQUEST);
        }
    };

    let ctx = TraceContext::new(&method, &path)
        .with_mcp_method(extract_mcp_method(&body_bytes))
        .with_session(session_id);
    let span = RequestSpan::enter(&ctx);

    async move {
        RequestSpan::log_entry(&ctx);
        debug!(trace_id = %ctx.trace_id, headers = %headers, "Request headers");
        if !body_bytes.is_empty() {
            debug!(trace_id = %ctx.trace_id, body = %format_body(&body_bytes), "Request body");
        }

        let mut request = Request::from_parts(parts, Body::from(body_bytes));
        request.extensions_mut().insert(ctx.clone());
        let response = next.run(request).await;
        let status = response.status().as_u16();

        if is_event_stream(&response) {
            RequestSpan::log_exit(&ctx, status, Some("stream opened"));
            return Ok(response);
        }
        if !is_json(&response) {
            RequestSpan::log_exit(&ctx, status, None);
            return Ok(response);
        }

        let (parts, body) = response.into_parts();
        let body_bytes = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                warn!(trace_id = %ctx.trace_id, "Failed to read response body: {}", e);
                return Err(StatusCode::INTERNAL_SERVER_ERROR);
            }
        };

        let summary = format_mcp_response(&body_bytes);
        RequestSpan::log_exit(&ctx, status, summary.as_deref());
        Ok(Response::from_parts(parts, Body::from(body_bytes)))
    }
    .instrument(span)
    .await
}
