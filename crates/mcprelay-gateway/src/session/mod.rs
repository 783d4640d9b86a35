//! Session lifecycle: per-session transports and the store that owns them

mod store;
mod transport;

pub use store::{SessionStore, SessionStoreError};
pub use transport::{SessionTransport, StreamAttachError, StreamAttachment};
