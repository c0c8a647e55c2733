use std::fs;
use std::path::Path;

use super::errors::ConfigurationError;
use super::model::{ConfigDocument, EngineConfig};

const DEFAULT_DOCUMENT: &str = include_str!("default_config.json");

impl ConfigDocument {
    /// Parses a JSON document that may carry `//` line comments.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigurationError> {
        let clean = strip_line_comments(raw);
        Ok(serde_json::from_str(&clean)?)
    }
}

impl EngineConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigurationError> {
        Self::from_document(ConfigDocument::from_json_str(raw)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigurationError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigurationError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Questionnaire shipped with the library.
    pub fn embedded_default() -> Result<Self, ConfigurationError> {
        Self::from_json_str(DEFAULT_DOCUMENT)
    }
}

/// Removes `//` comments that appear outside string literals.
pub(crate) fn strip_line_comments(raw: &str) -> String {
    let mut output = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    let mut in_string = false;
    let mut escaped = false;

    while let Some(ch) = chars.next() {
        if in_string {
            output.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => {
                in_string = true;
                output.push(ch);
            }
            '/' if chars.peek() == Some(&'/') => {
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        output.push('\n');
                        break;
                    }
                }
            }
            _ => output.push(ch),
        }
    }

    output
}
