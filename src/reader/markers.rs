//! End-of-turn marker handling.

use crate::config::ReplyConfig;

/// The completion marker plus legacy markers that are only stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Markers {
    end: String,
    legacy: Vec<String>,
}

impl Markers {
    pub fn new(end: impl Into<String>, legacy: Vec<String>) -> Self {
        Self {
            end: end.into(),
            legacy,
        }
    }

    pub fn from_config(config: &ReplyConfig) -> Self {
        Self::new(config.end_marker.clone(), config.legacy_markers.clone())
    }

    /// Whether `text` closes a turn.
    pub fn is_complete(&self, text: &str) -> bool {
        !self.end.is_empty() && text.contains(&self.end)
    }

    /// Remove every marker and trailing whitespace.
    pub fn strip(&self, text: &str) -> String {
        let mut cleaned = text.to_string();
        for marker in std::iter::once(&self.end).chain(self.legacy.iter()) {
            if !marker.is_empty() {
                cleaned = cleaned.replace(marker.as_str(), "");
            }
        }
        cleaned.trim_end().to_string()
    }
}

impl Default for Markers {
    fn default() -> Self {
        Self::from_config(&ReplyConfig::default())
    }
}
