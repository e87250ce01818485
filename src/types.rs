use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }
}

/// A citation reference supplied alongside a search-grounded reply.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WebSource {
    pub uri: String,
    #[serde(default)]
    pub title: String,
}

impl WebSource {
    pub fn new(uri: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            title: title.into(),
        }
    }
}

/// One prior turn used to seed a session's context.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: Role,
    pub text: String,
}

impl HistoryTurn {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizQuestion {
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

/// Parsed structured reply of the quiz mode.
///
/// Question records are kept as raw JSON values: the container shape is
/// checked, individual records are passed through untouched. Use
/// [`QuizData::typed_questions`] to view the well-formed ones.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuizData {
    pub questions: Vec<serde_json::Value>,
}

impl QuizData {
    pub fn typed_questions(&self) -> Vec<QuizQuestion> {
        self.questions
            .iter()
            .filter_map(|q| serde_json::from_value(q.clone()).ok())
            .collect()
    }
}
