//! Streaming chat client.
//!
//! A prompt is posted to the chat server and the reply arrives as an SSE
//! stream of text fragments. Fragments are revealed token by token through a
//! [`typewriter::Typewriter`], re-rendering the markdown on every step. Once
//! the stream ends the message gets its final decorated render, and the first
//! diagram block in it is sanitized and handed to a [`diagram::DiagramSink`].
//!
//! [`controller::Controller`] owns the per-message state and runs on a virtual
//! clock; [`conversation::Conversation`] drives it from tokio.

pub mod cli;
pub mod config;
pub mod controller;
pub mod conversation;
pub mod decorate;
pub mod diagram;
pub mod error;
pub mod logging;
pub mod render;
pub mod sanitize;
pub mod scheduler;
pub mod tokenize;
pub mod transport;
pub mod typewriter;

pub use config::ChatConfig;
pub use controller::{Controller, ControllerSettings};
pub use conversation::Conversation;
pub use error::{ChatError, RenderError, Result};
pub use transport::{ChatClient, InboundEvent};
