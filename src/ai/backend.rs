use super::error::{SessionError, StreamResult};
use crate::modes::Mode;
use crate::types::{HistoryTurn, WebSource};
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Immutable configuration a session is bound to when it is created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionBinding {
    pub mode: Mode,
    pub system_instruction: &'static str,
    pub use_search: bool,
    pub structured_output: bool,
}

impl SessionBinding {
    pub fn for_mode(mode: Mode) -> Self {
        let config = mode.config();
        Self {
            mode,
            system_instruction: config.system_instruction,
            use_search: config.use_search,
            structured_output: config.response_is_structured,
        }
    }
}

/// Everything the remote service needs for one turn.
#[derive(Clone, Copy, Debug)]
pub struct TurnRequest<'a> {
    pub binding: &'a SessionBinding,
    pub history: &'a [HistoryTurn],
    pub user_text: &'a str,
}

/// One incremental unit received from the remote service.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReplyChunk {
    pub text: Option<String>,
    pub sources: Vec<WebSource>,
}

impl ReplyChunk {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            sources: Vec::new(),
        }
    }

    pub fn sources(sources: Vec<WebSource>) -> Self {
        Self {
            text: None,
            sources,
        }
    }
}

pub type ChunkStream = BoxStream<'static, StreamResult<ReplyChunk>>;

/// Remote conversational completion service.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Reject bindings this backend cannot serve.
    fn check_binding(&self, _binding: &SessionBinding) -> Result<(), SessionError> {
        Ok(())
    }

    /// Open the incremental reply feed for one turn.
    async fn stream(&self, request: TurnRequest<'_>) -> StreamResult<ChunkStream>;
}
