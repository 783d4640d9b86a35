//! Gateway integration tests
//!
//! Raw HTTP against a running gateway: session lifecycle, tool invocation and the
//! tool-set refresh broadcast.

mod refresh;
mod tools;
