//! Shared value types for providers, replies and conversations.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// An assistant program the bridge can talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Codex,
    Gemini,
}

/// On-disk shape of a provider's conversation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFormat {
    /// Newline-delimited records, only ever appended.
    AppendOnly,
    /// One structured document rewritten in place.
    MutableDocument,
}

impl Provider {
    pub const ALL: [Provider; 2] = [Provider::Codex, Provider::Gemini];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Codex => "codex",
            Provider::Gemini => "gemini",
        }
    }

    /// Human facing name, e.g. "Codex".
    pub fn display_name(&self) -> &'static str {
        match self {
            Provider::Codex => "Codex",
            Provider::Gemini => "Gemini",
        }
    }

    pub fn record_format(&self) -> RecordFormat {
        match self {
            Provider::Codex => RecordFormat::AppendOnly,
            Provider::Gemini => RecordFormat::MutableDocument,
        }
    }

    /// Name of the per-project session side file.
    pub fn session_file_name(&self) -> &'static str {
        match self {
            Provider::Codex => ".codex-session",
            Provider::Gemini => ".gemini-session",
        }
    }

    /// Short command users run to fetch a pending reply later.
    pub fn pending_hint(&self) -> String {
        format!("ccb pend {}", self.as_str())
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "codex" => Ok(Provider::Codex),
            "gemini" => Ok(Provider::Gemini),
            other => Err(format!("unknown provider '{other}' (expected codex or gemini)")),
        }
    }
}

/// One complete assistant turn, markers already stripped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub text: String,
    /// Record file the reply was read from.
    pub source: PathBuf,
}

impl Reply {
    pub fn new(text: impl Into<String>, source: impl Into<PathBuf>) -> Self {
        Self {
            text: text.into(),
            source: source.into(),
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// A question paired with the answer that followed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub question: String,
    pub answer: String,
}

/// How user-facing output should be rendered.
///
/// Passed explicitly into communicators and commands instead of living in a global.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutputMode {
    /// Suppress progress hints.
    pub quiet: bool,
    /// Emit machine-readable JSON on stdout.
    pub json: bool,
}

impl OutputMode {
    /// Whether progress hints should be written to stderr.
    pub fn hints(&self) -> bool {
        !self.quiet && !self.json
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_parse() {
        assert_eq!("codex".parse::<Provider>().unwrap(), Provider::Codex);
        assert_eq!(" Gemini ".parse::<Provider>().unwrap(), Provider::Gemini);
        assert!("claude".parse::<Provider>().is_err());
    }

    #[test]
    fn test_provider_formats() {
        assert_eq!(Provider::Codex.record_format(), RecordFormat::AppendOnly);
        assert_eq!(Provider::Gemini.record_format(), RecordFormat::MutableDocument);
    }

    #[test]
    fn test_output_mode_hints() {
        assert!(OutputMode::default().hints());
        assert!(!OutputMode { quiet: false, json: true }.hints());
    }
}
