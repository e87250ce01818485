//! Lenient parsing of the quiz mode's JSON reply.

use crate::types::QuizData;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::warn;

const PREVIEW_CHARS: usize = 200;

static FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^```(?:\w+)?\s*\n?(.*?)\n?\s*```$").expect("fence pattern is valid")
});

/// Strip one optional fenced code block wrapper from `raw`.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    match FENCE.captures(trimmed).and_then(|caps| caps.get(1)) {
        Some(body) if !body.as_str().is_empty() => body.as_str().trim(),
        _ => trimmed,
    }
}

/// Parse a quiz reply, accepting either `{"questions": [...]}` or a bare
/// array of questions. Anything else yields `None`.
pub fn parse_quiz_json(raw: &str) -> Option<QuizData> {
    let cleaned = strip_code_fence(raw);

    let parsed: Value = match serde_json::from_str(cleaned) {
        Ok(value) => value,
        Err(err) => {
            warn!(error = %err, raw = %preview(raw), "failed to parse quiz JSON");
            return None;
        }
    };

    match parsed {
        Value::Object(mut map) => match map.remove("questions") {
            Some(Value::Array(questions)) => Some(QuizData { questions }),
            _ => {
                warn!(raw = %preview(raw), "quiz JSON object has no questions array");
                None
            }
        },
        Value::Array(questions) => Some(QuizData { questions }),
        _ => {
            warn!(raw = %preview(raw), "quiz JSON does not match the expected shape");
            None
        }
    }
}

fn preview(raw: &str) -> &str {
    match raw.char_indices().nth(PREVIEW_CHARS) {
        Some((idx, _)) => &raw[..idx],
        None => raw,
    }
}
