//! The single owner of the timeline and the current session.
//!
//! One turn runs at a time: `send_message` holds `&mut self` for the whole
//! stream, so no second writer can exist.

use crate::ai::{ConfigError, ReplyEvent, Session, SessionError, SessionProvider, stream_reply};
use crate::modes::{Mode, switched_text, welcome_text};
use crate::timeline::{Message, MessageId, Timeline};
use crate::types::{HistoryTurn, Role};
use futures::StreamExt;
use tracing::{debug, info, instrument, warn};

/// How a call to [`Assistant::send_message`] ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Blank input; nothing happened.
    Ignored,
    /// The reply streamed to the end.
    Completed(MessageId),
    /// The stream reported an error; the reply holds its message.
    Failed(MessageId),
    /// No session could be obtained; the message explains why.
    Aborted(MessageId),
}

/// Rebuild session context from the timeline, one turn per message.
pub fn rebuild_history(timeline: &Timeline) -> Vec<HistoryTurn> {
    timeline.history()
}

pub struct Assistant {
    mode: Mode,
    timeline: Timeline,
    session: Option<Session>,
    provider: SessionProvider,
    config_error: Option<String>,
}

impl Assistant {
    pub fn new(provider: SessionProvider, mode: Mode) -> Self {
        let config_error = provider.config_error().map(ToString::to_string);
        let mut assistant = Self {
            mode,
            timeline: Timeline::new(),
            session: None,
            provider,
            config_error,
        };
        if assistant.config_error.is_none() {
            assistant.timeline.push(Role::Model, welcome_text(mode));
            // A failure here is reported on the first send.
            let _ = assistant.open_session(None);
        }
        assistant
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Banner-level failure: the credential is missing or was rejected.
    pub fn config_error(&self) -> Option<&str> {
        self.config_error.as_deref()
    }

    pub fn is_busy(&self) -> bool {
        self.timeline.in_flight().is_some()
    }

    /// Switch presets: the conversation restarts under the new instruction.
    pub fn set_mode(&mut self, mode: Mode) {
        info!(from = ?self.mode, to = ?mode, "switching mode");
        self.mode = mode;
        self.timeline.clear();
        self.timeline.push(Role::Model, switched_text(mode));
        if let Err(err) = self.open_session(None) {
            warn!(?mode, error = %err, "keeping previous session until the next send");
        }
    }

    /// Swap in a provider built from corrected configuration.
    pub fn reinitialize(&mut self, provider: SessionProvider) {
        self.config_error = provider.config_error().map(ToString::to_string);
        self.provider = provider;
        self.session = None;
        if self.config_error.is_none() {
            if self.timeline.is_empty() {
                self.timeline.push(Role::Model, welcome_text(self.mode));
            }
            let _ = self.open_session(None);
        }
    }

    /// Freeze a reply whose consumer was dropped mid-stream.
    pub fn abandon_reply(&mut self) -> Option<MessageId> {
        self.timeline.settle_abandoned()
    }

    fn open_session(&mut self, history: Option<Vec<HistoryTurn>>) -> Result<(), SessionError> {
        match self.provider.create_session(self.mode, history) {
            Ok(session) => {
                self.session = Some(session);
                Ok(())
            }
            Err(err) => {
                if let SessionError::Config(config) = &err {
                    self.config_error = Some(config.to_string());
                }
                Err(err)
            }
        }
    }

    /// Make sure the current session is bound to the current mode, rebuilding
    /// it from the timeline when it is missing or stale.
    fn ensure_session(&mut self) -> Result<(), SessionError> {
        if self
            .session
            .as_ref()
            .is_some_and(|session| session.mode() == self.mode)
        {
            return Ok(());
        }
        warn!(mode = ?self.mode, "session missing or bound to another mode, rebuilding");
        let history = rebuild_history(&self.timeline);
        self.open_session(Some(history))
    }

    fn reject_credential(&mut self, reason: String) {
        let err = ConfigError::Rejected(reason);
        warn!(error = %err, "disabling session creation");
        self.config_error = Some(err.to_string());
        self.provider.revoke(err);
        self.session = None;
    }

    pub async fn send_message(&mut self, input: &str) -> TurnOutcome {
        self.send_message_with(input, |_| {}).await
    }

    /// Send one turn, calling `on_update` with the reply after every change.
    #[instrument(skip_all, fields(mode = ?self.mode))]
    pub async fn send_message_with<F>(&mut self, input: &str, mut on_update: F) -> TurnOutcome
    where
        F: FnMut(&Message),
    {
        let text = input.trim();
        if text.is_empty() {
            return TurnOutcome::Ignored;
        }

        if let Some(stale) = self.timeline.settle_abandoned() {
            debug!(?stale, "settled abandoned reply");
        }

        if let Err(err) = self.ensure_session() {
            let id = self.timeline.push(
                Role::Model,
                format!(
                    "Error: Could not re-initialize chat ({err}). Please check API key or try changing modes."
                ),
            );
            return TurnOutcome::Aborted(id);
        }

        let mode = self.mode;
        let Some(session) = self.session.as_mut() else {
            let id = self
                .timeline
                .push(Role::Model, "Error: Chat session is not available.");
            return TurnOutcome::Aborted(id);
        };

        self.timeline.push(Role::User, text);
        let reply_id = match self.timeline.begin_reply() {
            Ok(id) => id,
            Err(err) => {
                let id = self.timeline.push(Role::Model, format!("Error: {err}"));
                return TurnOutcome::Aborted(id);
            }
        };

        let mut failed = false;
        let mut rejected = None;
        {
            let events = stream_reply(session, text, mode);
            futures::pin_mut!(events);
            while let Some(event) = events.next().await {
                if let ReplyEvent::Error(err) = &event {
                    failed = true;
                    if err.is_credential() {
                        rejected = Some(err.to_string());
                    }
                }
                self.timeline.apply(reply_id, &event);
                if let Some(msg) = self.timeline.get(reply_id) {
                    on_update(msg);
                }
                if event.is_terminal() {
                    break;
                }
            }
        }

        if failed {
            if let Some(reason) = rejected {
                self.reject_credential(reason);
            }
            return TurnOutcome::Failed(reply_id);
        }

        if let Some(parser) = mode.config().structured_parser {
            let parsed = self.timeline.get(reply_id).and_then(|msg| parser(msg.content()));
            match parsed {
                Some(quiz) => {
                    self.timeline.attach_quiz(reply_id, quiz);
                }
                None => warn!(?mode, "structured reply kept as raw text"),
            }
        }

        self.timeline.finish(reply_id);
        if let Some(msg) = self.timeline.get(reply_id) {
            on_update(msg);
        }
        TurnOutcome::Completed(reply_id)
    }
}

impl std::fmt::Debug for Assistant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Assistant")
            .field("mode", &self.mode)
            .field("messages", &self.timeline.len())
            .field("session", &self.session)
            .field("config_error", &self.config_error)
            .finish()
    }
}
