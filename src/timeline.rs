use crate::ai::{ReplyEvent, SourceSet};
use crate::types::{HistoryTurn, QuizData, Role, WebSource};
use serde::Serialize;
use time::OffsetDateTime;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct MessageId(u64);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimelineError {
    #[error("a reply is already in progress")]
    ReplyInProgress,
}

/// One turn of the conversation.
///
/// Content, sources and the attached quiz only change while `is_loading`.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    id: MessageId,
    role: Role,
    content: String,
    sources: SourceSet,
    is_loading: bool,
    #[serde(with = "time::serde::rfc3339")]
    created_at: OffsetDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    quiz: Option<QuizData>,
}

impl Message {
    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn sources(&self) -> &[WebSource] {
        self.sources.as_slice()
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    pub fn quiz(&self) -> Option<&QuizData> {
        self.quiz.as_ref()
    }
}

/// Ordered log of turns. At most one message is in progress at a time.
#[derive(Debug, Default)]
pub struct Timeline {
    messages: Vec<Message>,
    next_id: u64,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, role: Role, content: String, is_loading: bool) -> MessageId {
        self.next_id += 1;
        let id = MessageId(self.next_id);
        self.messages.push(Message {
            id,
            role,
            content,
            sources: SourceSet::default(),
            is_loading,
            created_at: OffsetDateTime::now_utc(),
            quiz: None,
        });
        id
    }

    /// Append a finished message.
    pub fn push(&mut self, role: Role, content: impl Into<String>) -> MessageId {
        self.insert(role, content.into(), false)
    }

    /// Open an empty, in-progress model reply.
    pub fn begin_reply(&mut self) -> Result<MessageId, TimelineError> {
        if self.in_flight().is_some() {
            return Err(TimelineError::ReplyInProgress);
        }
        Ok(self.insert(Role::Model, String::new(), true))
    }

    fn loading_mut(&mut self, id: MessageId) -> Option<&mut Message> {
        self.messages
            .iter_mut()
            .find(|msg| msg.id == id && msg.is_loading)
    }

    /// Fold one reply event into the in-progress message `id`.
    ///
    /// Returns false when `id` is unknown or already finalized.
    pub fn apply(&mut self, id: MessageId, event: &ReplyEvent) -> bool {
        let Some(msg) = self.loading_mut(id) else {
            return false;
        };
        match event {
            ReplyEvent::TextFragment(text) => msg.content.push_str(text),
            ReplyEvent::SourceFragment(sources) => {
                msg.sources.merge(sources.iter().cloned());
            }
            ReplyEvent::Error(err) => {
                msg.content = err.to_string();
                msg.is_loading = false;
            }
        }
        true
    }

    pub fn attach_quiz(&mut self, id: MessageId, quiz: QuizData) -> bool {
        match self.loading_mut(id) {
            Some(msg) => {
                msg.quiz = Some(quiz);
                true
            }
            None => false,
        }
    }

    /// Freeze `id` with whatever it has accumulated.
    pub fn finish(&mut self, id: MessageId) -> bool {
        match self.loading_mut(id) {
            Some(msg) => {
                msg.is_loading = false;
                true
            }
            None => false,
        }
    }

    /// Freeze a reply whose consumer went away, keeping its partial content.
    pub fn settle_abandoned(&mut self) -> Option<MessageId> {
        let msg = self.messages.iter_mut().find(|msg| msg.is_loading)?;
        msg.is_loading = false;
        Some(msg.id)
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// The conversation so far as `(role, text)` turns, in order.
    pub fn history(&self) -> Vec<HistoryTurn> {
        self.messages
            .iter()
            .map(|msg| HistoryTurn::new(msg.role, msg.content.clone()))
            .collect()
    }

    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|msg| msg.id == id)
    }

    pub fn in_flight(&self) -> Option<&Message> {
        self.messages.iter().find(|msg| msg.is_loading)
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
