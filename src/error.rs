//! Crate-level error type.
//!
//! Transport failures are fatal to the current message, payload problems are
//! skipped by the transport layer, and render failures are fail-soft, so only
//! the first class normally reaches a caller as an `Err`.

use thiserror::Error;

/// Errors surfaced by the chat client.
#[derive(Debug, Error)]
pub enum ChatError {
    /// The server replied with a non-2xx status code.
    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    /// Connection-level failure from the HTTP client.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// An inbound payload could not be decoded.
    #[error("malformed payload: {0}")]
    Payload(#[from] serde_json::Error),

    /// The configuration file could not be read or is invalid.
    #[error("config error in {path}: {detail}")]
    Config { path: String, detail: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Failure of one of the rendering collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("markdown render failed: {0}")]
    Markdown(String),
    #[error("diagram render failed: {0}")]
    Diagram(String),
}

pub type Result<T, E = ChatError> = std::result::Result<T, E>;
