//! Data models for Courier

mod message;

pub use message::{Message, EPOCH_TIMESTAMP};
