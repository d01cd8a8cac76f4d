//! Error types for insight-chat

use thiserror::Error;

/// Result type alias using insight-chat Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the session driver. State operations never fail.
#[derive(Error, Debug)]
pub enum Error {
    /// An error from the API layer
    #[error(transparent)]
    Api(#[from] insight_api::Error),

    /// A generic chat error
    #[error("{0}")]
    Other(String),
}
