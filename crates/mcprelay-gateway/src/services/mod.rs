//! Gateway services

mod broadcaster;
mod notification_emitter;

pub use broadcaster::NotificationBroadcaster;
pub use notification_emitter::{BroadcastReport, Delivery, NotificationEmitter};
