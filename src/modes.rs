//! Task presets and their fixed configuration.
//!
//! Every [`Mode`] maps to exactly one [`ModeConfig`], created at compile time
//! and never mutated.

use crate::quiz::parse_quiz_json;
use crate::types::QuizData;
use std::fmt;
use std::str::FromStr;

pub const GEMINI_MODEL_NAME: &str = "gemini-2.5-flash-preview-04-17";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Mode {
    Chat,
    Summarize,
    Quiz,
    StudyNotes,
    Research,
}

impl Mode {
    pub const ALL: [Mode; 5] = [
        Mode::Chat,
        Mode::Summarize,
        Mode::Quiz,
        Mode::StudyNotes,
        Mode::Research,
    ];

    pub fn config(self) -> &'static ModeConfig {
        config_for(self)
    }

    /// Short identifier used by the console front end.
    pub fn slug(self) -> &'static str {
        match self {
            Mode::Chat => "chat",
            Mode::Summarize => "summarize",
            Mode::Quiz => "quiz",
            Mode::StudyNotes => "notes",
            Mode::Research => "research",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.config().display_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown mode: {0}")]
pub struct UnknownMode(String);

impl FromStr for Mode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Mode::ALL
            .into_iter()
            .find(|mode| {
                mode.slug() == wanted || mode.config().display_name.to_ascii_lowercase() == wanted
            })
            .ok_or(UnknownMode(s.to_string()))
    }
}

/// Post-processor turning a finished structured reply into quiz data.
pub type StructuredParser = fn(&str) -> Option<QuizData>;

#[derive(Debug)]
pub struct ModeConfig {
    pub display_name: &'static str,
    pub system_instruction: &'static str,
    pub input_label: &'static str,
    pub placeholder: &'static str,
    pub sample_query: Option<&'static str>,
    pub requires_large_input: bool,
    pub use_search: bool,
    pub response_is_structured: bool,
    pub structured_parser: Option<StructuredParser>,
}

// ============================================
// Registry
// ============================================

static CHAT: ModeConfig = ModeConfig {
    display_name: "EduTutor Chat",
    system_instruction: "You are EduTutor AI, a friendly, encouraging, and knowledgeable AI assistant for students of all levels. Explain concepts clearly, concisely, and helpfully. Use markdown for formatting when appropriate (e.g., lists, bolding key terms).",
    input_label: "Ask a question or discuss a topic",
    placeholder: "e.g., Explain photosynthesis in simple terms.",
    sample_query: Some("What are the main causes of World War 1?"),
    requires_large_input: false,
    use_search: false,
    response_is_structured: false,
    structured_parser: None,
};

static SUMMARIZE: ModeConfig = ModeConfig {
    display_name: "Text Summarizer",
    system_instruction: "You are a highly skilled text summarization AI. Your task is to summarize the provided text accurately and concisely for a student. Focus on the key points and main ideas. The summary should be easy to understand.",
    input_label: "Paste text to summarize",
    placeholder: "Paste a long article or notes here...",
    sample_query: Some("Summarize this for me: [Paste a long text here]"),
    requires_large_input: true,
    use_search: false,
    response_is_structured: false,
    structured_parser: None,
};

static QUIZ: ModeConfig = ModeConfig {
    display_name: "Quiz Generator",
    system_instruction: "You are an AI that generates educational quizzes. Based on the user's topic or provided text, create a series of multiple-choice questions. Each question should have 4 options (A, B, C, D) and a clearly indicated correct answer. Also provide a brief explanation for the correct answer. Respond ONLY with a JSON object adhering to this structure: { \"questions\": [ { \"question\": \"str\", \"options\": [\"str\", \"str\", \"str\", \"str\"], \"correctAnswer\": \"str (e.g. A)\", \"explanation\": \"str\" } ] }.",
    input_label: "Enter a topic or paste text for a quiz",
    placeholder: "e.g., The Solar System, or paste notes on Mitosis.",
    sample_query: Some("Create a 5-question quiz on the basics of Python programming."),
    requires_large_input: false,
    use_search: false,
    response_is_structured: true,
    structured_parser: Some(parse_quiz_json),
};

static STUDY_NOTES: ModeConfig = ModeConfig {
    display_name: "Study Notes Creator",
    system_instruction: "You are an AI specialized in creating structured study notes. From the given topic or text, generate clear, organized notes. Use bullet points, headings, key term definitions, and concise explanations. The notes should be easy to review and learn from. Use markdown for formatting.",
    input_label: "Enter a topic or paste text for study notes",
    placeholder: "e.g., Key concepts of calculus, or paste a chapter from a textbook.",
    sample_query: Some("Generate study notes for the French Revolution."),
    requires_large_input: false,
    use_search: false,
    response_is_structured: false,
    structured_parser: None,
};

static RESEARCH: ModeConfig = ModeConfig {
    display_name: "Research Assistant",
    system_instruction: "You are a Research Assistant AI. Use Google Search to find up-to-date information and answer the user's questions comprehensively. Cite your sources clearly. Use markdown for formatting.",
    input_label: "Ask a research question",
    placeholder: "e.g., What are the latest advancements in renewable energy?",
    sample_query: Some("Who won the Nobel Prize in Physics in 2023 and for what?"),
    requires_large_input: false,
    use_search: true,
    response_is_structured: false,
    structured_parser: None,
};

pub fn config_for(mode: Mode) -> &'static ModeConfig {
    match mode {
        Mode::Chat => &CHAT,
        Mode::Summarize => &SUMMARIZE,
        Mode::Quiz => &QUIZ,
        Mode::StudyNotes => &STUDY_NOTES,
        Mode::Research => &RESEARCH,
    }
}

pub fn welcome_text(mode: Mode) -> String {
    let config = config_for(mode);
    format!(
        "Welcome to EduTutor AI! I'm in **{}** mode. {}",
        config.display_name, config.placeholder
    )
}

pub fn switched_text(mode: Mode) -> String {
    let config = config_for(mode);
    format!(
        "Switched to **{}** mode. {}",
        config.display_name, config.placeholder
    )
}
