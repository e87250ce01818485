//! AI module for EduTutor
//!
//! This module owns everything between a user turn and the remote
//! generative-language service: session construction, the streaming feed of
//! reply events, and the Gemini wire client behind them.
//!
//! # Architecture
//!
//! - `backend` - `ChatBackend` trait at the remote service boundary
//! - `gemini` - Gemini `streamGenerateContent` client (SSE)
//! - `session` - `SessionProvider` and the mode-bound `Session` handle
//! - `stream` - `stream_reply`, the lazy feed of `ReplyEvent`s
//!
//! # Usage
//!
//! ```rust,no_run
//! use edututor::ai::{ReplyEvent, SessionProvider, stream_reply};
//! use edututor::config::Settings;
//! use edututor::modes::Mode;
//! use futures::StreamExt;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let provider = SessionProvider::initialize(&Settings::from_env());
//! let mut session = provider.create_session(Mode::Chat, None)?;
//! let events = stream_reply(&mut session, "Hello!", Mode::Chat);
//! futures::pin_mut!(events);
//! while let Some(event) = events.next().await {
//!     if let ReplyEvent::TextFragment(text) = event {
//!         print!("{text}");
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod backend;
mod error;
mod gemini;
mod session;
mod stream;

// Re-export main types
pub use backend::{ChatBackend, ChunkStream, ReplyChunk, SessionBinding, TurnRequest};
pub use error::{ConfigError, SessionError, StreamError, StreamResult};
pub use gemini::{
    DEFAULT_BASE_URL, GeminiBackend, SseDecoder, classify_api_error, parse_gemini_sse_data,
};
pub use session::{Session, SessionProvider};
pub use stream::{ReplyEvent, SourceSet, stream_reply};
