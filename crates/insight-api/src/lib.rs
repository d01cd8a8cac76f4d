//! insight-api: wire layer for the insight chat API
//!
//! This crate provides the REST client, the request/response types, and the
//! realtime event types delivered over the server-sent events channel.

pub mod client;
pub mod error;
pub mod events;
pub mod realtime;
pub mod types;

pub use client::ApiClient;
pub use error::{Error, Result};
pub use events::{ChatEvent, ChatEventStream};
pub use types::*;
