//! Turns one user message into a lazy feed of reply events.

use super::error::StreamError;
use super::session::Session;
use crate::modes::Mode;
use crate::types::WebSource;
use async_stream::stream;
use futures::{Stream, StreamExt};
use serde::Serialize;
use tracing::{debug, warn};

#[derive(Debug)]
pub enum ReplyEvent {
    /// Text to append to the reply, in arrival order.
    TextFragment(String),
    /// Citations seen with the turn so far; merge into what was already seen.
    SourceFragment(Vec<WebSource>),
    /// Terminal. Replaces whatever partial content was assembled.
    Error(StreamError),
}

impl ReplyEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReplyEvent::Error(_))
    }
}

/// Send `user_text` on `session` and yield the reply as it arrives.
///
/// The feed ends without an `Error` when the reply is complete; only then is
/// the turn recorded in the session's history. Dropping the stream early
/// abandons the turn locally.
pub fn stream_reply<'a>(
    session: &'a mut Session,
    user_text: &'a str,
    mode: Mode,
) -> impl Stream<Item = ReplyEvent> + 'a {
    stream! {
        if session.mode() != mode {
            warn!(session = ?session.mode(), requested = ?mode, "turn sent on a stale session");
            yield ReplyEvent::Error(StreamError::ModeMismatch {
                session: session.mode(),
                requested: mode,
            });
            return;
        }

        debug!(?mode, history = session.history().len(), "sending turn");
        let opened = session.backend().stream(session.request(user_text)).await;
        let mut chunks = match opened {
            Ok(chunks) => chunks,
            Err(err) => {
                warn!(?mode, error = %err, "reply stream could not be opened");
                yield ReplyEvent::Error(err);
                return;
            }
        };

        let mut reply = String::new();
        while let Some(item) = chunks.next().await {
            match item {
                Ok(chunk) => {
                    if let Some(text) = chunk.text.filter(|t| !t.is_empty()) {
                        reply.push_str(&text);
                        yield ReplyEvent::TextFragment(text);
                    }
                    if !chunk.sources.is_empty() {
                        yield ReplyEvent::SourceFragment(chunk.sources);
                    }
                }
                Err(err) => {
                    warn!(?mode, error = %err, "reply stream failed");
                    yield ReplyEvent::Error(err);
                    return;
                }
            }
        }

        debug!(?mode, chars = reply.len(), "reply complete");
        session.record_turn(user_text, reply);
    }
}

/// Citations of one reply, deduplicated on `(uri, title)` in first-seen order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SourceSet(Vec<WebSource>);

impl SourceSet {
    /// Merge `incoming`, returning how many new entries were added.
    pub fn merge(&mut self, incoming: impl IntoIterator<Item = WebSource>) -> usize {
        let before = self.0.len();
        for source in incoming {
            if !self.0.contains(&source) {
                self.0.push(source);
            }
        }
        self.0.len() - before
    }

    pub fn as_slice(&self) -> &[WebSource] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
