//! insight-chat: chat real-time coordination core
//!
//! This crate serializes "send message" attempts per conversation, reconciles
//! the identifier of a conversation created by a send, and folds realtime
//! stream events into per-conversation display state.

pub mod coordinator;
pub mod error;
pub mod locks;
pub mod session;
pub mod state;
pub mod store;
pub mod stream_state;
pub mod transport;

pub use coordinator::Reconciliation;
pub use error::Error;
pub use locks::SendLocks;
pub use session::{ChatSession, ChatUpdate, SendOutcome};
pub use state::ChatState;
pub use store::ChatStore;
pub use stream_state::{StreamEvent, StreamState, StreamStatus, ToolRun, ToolStatus, reduce};
pub use transport::MessageSender;
