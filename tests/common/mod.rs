//! Scripted in-memory backend shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use edututor::Mode;
use edututor::ai::{
    ChatBackend, ChunkStream, ReplyChunk, SessionBinding, SessionError, SessionProvider,
    StreamError, StreamResult, TurnRequest,
};
use edututor::types::{HistoryTurn, WebSource};
use futures::StreamExt;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

pub enum Turn {
    /// Feed these items, then end.
    Chunks(Vec<StreamResult<ReplyChunk>>),
    /// Feed these items, then never end.
    Hang(Vec<StreamResult<ReplyChunk>>),
    /// Fail before any chunk is produced.
    Refuse(StreamError),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Recorded {
    pub mode: Mode,
    pub history: Vec<HistoryTurn>,
    pub user_text: String,
}

#[derive(Default)]
pub struct ScriptedBackend {
    turns: Mutex<VecDeque<Turn>>,
    requests: Mutex<Vec<Recorded>>,
    reject_bindings: AtomicBool,
}

impl ScriptedBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, turn: Turn) {
        self.turns.lock().unwrap().push_back(turn);
    }

    pub fn reply(&self, pieces: &[&str]) {
        self.push(Turn::Chunks(
            pieces.iter().map(|p| Ok(ReplyChunk::text(*p))).collect(),
        ));
    }

    pub fn reject_bindings(&self, reject: bool) {
        self.reject_bindings.store(reject, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn provider(self: &Arc<Self>) -> SessionProvider {
        SessionProvider::with_backend(Arc::clone(self) as Arc<dyn ChatBackend>)
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    fn check_binding(&self, binding: &SessionBinding) -> Result<(), SessionError> {
        if self.reject_bindings.load(Ordering::SeqCst) {
            return Err(SessionError::UnsupportedCapabilities { mode: binding.mode });
        }
        Ok(())
    }

    async fn stream(&self, request: TurnRequest<'_>) -> StreamResult<ChunkStream> {
        self.requests.lock().unwrap().push(Recorded {
            mode: request.binding.mode,
            history: request.history.to_vec(),
            user_text: request.user_text.to_string(),
        });
        let turn = self
            .turns
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Turn::Chunks(Vec::new()));
        match turn {
            Turn::Chunks(items) => Ok(futures::stream::iter(items).boxed()),
            Turn::Hang(items) => Ok(futures::stream::iter(items)
                .chain(futures::stream::pending())
                .boxed()),
            Turn::Refuse(err) => Err(err),
        }
    }
}

pub fn source(uri: &str, title: &str) -> WebSource {
    WebSource::new(uri, title)
}
