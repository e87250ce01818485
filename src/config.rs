use crate::ai::{ConfigError, DEFAULT_BASE_URL};
use crate::modes::GEMINI_MODEL_NAME;
use std::env;
use std::fmt;

/// Bundled fallback config, used when no `.env` file is present.
const BUNDLED_CONFIG: &str = include_str!("../assets/config.env");

const DEFAULT_LOG_FILTER: &str = "info";

/// Load a local `.env` into the process environment.
///
/// Mutates the environment, so it must run before any other thread exists.
pub fn load_dotenv() {
    // A missing .env is normal; the bundled defaults cover it.
    let _ = dotenvy::dotenv();
}

/// Value of `key` in the bundled config, if it has one.
fn bundled_value(key: &str) -> Option<String> {
    parse_env_lines(BUNDLED_CONFIG)
        .into_iter()
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v.to_string())
}

/// Layer the bundled config under `lookup`: values from `lookup` win.
pub fn with_bundled_defaults(
    lookup: impl Fn(&str) -> Option<String>,
) -> impl Fn(&str) -> Option<String> {
    move |key: &str| lookup(key).or_else(|| bundled_value(key))
}

/// Parse `KEY=VALUE` lines, skipping blanks and `#` comments.
pub fn parse_env_lines(contents: &str) -> Vec<(&str, &str)> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim(), value.trim()))
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

#[derive(Clone)]
pub struct Settings {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub log_filter: String,
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(with_bundled_defaults(|key| env::var(key).ok()))
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_blank = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            api_key: lookup("GEMINI_API_KEY").or_else(|| lookup("API_KEY")),
            model: non_blank("GEMINI_MODEL").unwrap_or_else(|| GEMINI_MODEL_NAME.to_string()),
            base_url: non_blank("GEMINI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            log_filter: non_blank("EDUTUTOR_LOG").unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
        }
    }

    /// Resolve the credential, once, at start-up.
    pub fn credential(&self) -> Result<String, ConfigError> {
        let key = self
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(ConfigError::MissingApiKey)?;
        if key.chars().any(char::is_whitespace) {
            return Err(ConfigError::InvalidApiKey(
                "key must not contain whitespace".to_string(),
            ));
        }
        Ok(key.to_string())
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("log_filter", &self.log_filter)
            .finish()
    }
}
