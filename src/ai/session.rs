use super::backend::{ChatBackend, SessionBinding, TurnRequest};
use super::error::{ConfigError, SessionError};
use super::gemini::GeminiBackend;
use crate::config::Settings;
use crate::modes::Mode;
use crate::types::{HistoryTurn, Role};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Conversational context bound to one mode.
///
/// The binding never changes after creation; a mode switch means building a
/// new session rather than mutating this one.
pub struct Session {
    binding: SessionBinding,
    history: Vec<HistoryTurn>,
    backend: Arc<dyn ChatBackend>,
}

impl Session {
    pub fn mode(&self) -> Mode {
        self.binding.mode
    }

    pub fn binding(&self) -> &SessionBinding {
        &self.binding
    }

    /// Turns seeded at creation plus every turn completed since.
    pub fn history(&self) -> &[HistoryTurn] {
        &self.history
    }

    pub(crate) fn backend(&self) -> &dyn ChatBackend {
        self.backend.as_ref()
    }

    pub(crate) fn request<'a>(&'a self, user_text: &'a str) -> TurnRequest<'a> {
        TurnRequest {
            binding: &self.binding,
            history: &self.history,
            user_text,
        }
    }

    pub(crate) fn record_turn(&mut self, user_text: &str, reply: String) {
        self.history.push(HistoryTurn::new(Role::User, user_text));
        self.history.push(HistoryTurn::new(Role::Model, reply));
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("binding", &self.binding)
            .field("history_len", &self.history.len())
            .finish_non_exhaustive()
    }
}

/// Builds sessions against the remote service.
///
/// Holds the outcome of credential resolution made once at start-up. When
/// that failed, every `create_session` call reports the same failure.
#[derive(Clone)]
pub struct SessionProvider {
    backend: Result<Arc<dyn ChatBackend>, ConfigError>,
}

impl SessionProvider {
    pub fn initialize(settings: &Settings) -> Self {
        match settings.credential() {
            Ok(api_key) => {
                info!(model = %settings.model, "gemini provider ready");
                Self::with_backend(Arc::new(GeminiBackend::from_settings(settings, api_key)))
            }
            Err(err) => {
                warn!(error = %err, "gemini provider unavailable");
                Self::unavailable(err)
            }
        }
    }

    pub fn with_backend(backend: Arc<dyn ChatBackend>) -> Self {
        Self {
            backend: Ok(backend),
        }
    }

    pub fn unavailable(err: ConfigError) -> Self {
        Self { backend: Err(err) }
    }

    pub fn config_error(&self) -> Option<&ConfigError> {
        self.backend.as_ref().err()
    }

    /// Disable session creation after the service rejected the credential.
    pub fn revoke(&mut self, err: ConfigError) {
        self.backend = Err(err);
    }

    pub fn create_session(
        &self,
        mode: Mode,
        prior_history: Option<Vec<HistoryTurn>>,
    ) -> Result<Session, SessionError> {
        let backend = self.backend.as_ref().map_err(|err| err.clone())?;
        let binding = SessionBinding::for_mode(mode);
        backend.check_binding(&binding)?;

        let history = prior_history.unwrap_or_default();
        debug!(?mode, seeded_turns = history.len(), "session created");
        Ok(Session {
            binding,
            history,
            backend: Arc::clone(backend),
        })
    }
}

impl fmt::Debug for SessionProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.backend {
            Ok(_) => f.write_str("SessionProvider(ready)"),
            Err(err) => write!(f, "SessionProvider(unavailable: {err})"),
        }
    }
}
