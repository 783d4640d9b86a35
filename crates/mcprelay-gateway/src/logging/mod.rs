//! Logging Infrastructure
//!
//! Trace ids for request correlation and the single entry/exit line per request.
//! Subscriber setup (console, rolling file) lives in the binary.

mod trace_context;

pub use trace_context::{generate_trace_id, RequestSpan, TraceContext};
