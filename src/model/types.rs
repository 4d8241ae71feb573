//! Normalized session structs shared by the corpus builder and the search orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Agents whose transcripts can appear in the corpus.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum SessionSource {
    Codex,
    Claude,
    Gemini,
    OpenCode,
    Copilot,
    Droid,
    OpenClaw,
}

impl SessionSource {
    pub const ALL: [SessionSource; 7] = [
        SessionSource::Codex,
        SessionSource::Claude,
        SessionSource::Gemini,
        SessionSource::OpenCode,
        SessionSource::Copilot,
        SessionSource::Droid,
        SessionSource::OpenClaw,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SessionSource::Codex => "codex",
            SessionSource::Claude => "claude",
            SessionSource::Gemini => "gemini",
            SessionSource::OpenCode => "opencode",
            SessionSource::Copilot => "copilot",
            SessionSource::Droid => "droid",
            SessionSource::OpenClaw => "openclaw",
        }
    }
}

impl std::fmt::Display for SessionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|source| source.as_str() == lowered)
            .ok_or_else(|| format!("unknown session source: {s}"))
    }
}

/// Kinds of events recorded in a transcript.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    User,
    Assistant,
    ToolCall,
    ToolResult,
    #[default]
    Other,
}

impl EventKind {
    pub fn is_tool(self) -> bool {
        matches!(self, EventKind::ToolCall | EventKind::ToolResult)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionEvent {
    pub kind: EventKind,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub tool_input: Option<String>,
    #[serde(default)]
    pub tool_output: Option<String>,
}

impl SessionEvent {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            kind: EventKind::User,
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Assistant,
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn tool_call(name: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            kind: EventKind::ToolCall,
            tool_name: Some(name.into()),
            tool_input: Some(input.into()),
            ..Default::default()
        }
    }

    pub fn tool_result(name: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            kind: EventKind::ToolResult,
            tool_name: Some(name.into()),
            tool_output: Some(output.into()),
            ..Default::default()
        }
    }
}

/// A single stored transcript.
///
/// `events` is `None` until the record store has hydrated the session; cheap
/// metadata is always present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub source: SessionSource,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub repo_name: Option<String>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    pub modified_at: DateTime<Utc>,
    pub file_size_bytes: u64,
    pub file_path: PathBuf,
    #[serde(default)]
    pub events: Option<Vec<SessionEvent>>,
    /// Tool calls counted by the lightweight scanner; drives deep-scan eligibility.
    #[serde(default)]
    pub estimated_tool_calls: u32,
    /// Housekeeping sessions (e.g. title generation) hidden from regular results.
    #[serde(default)]
    pub is_system: bool,
}

impl Session {
    pub fn new(
        id: impl Into<String>,
        source: SessionSource,
        modified_at: DateTime<Utc>,
        file_size_bytes: u64,
    ) -> Self {
        let id = id.into();
        Self {
            file_path: PathBuf::from(format!("{id}.jsonl")),
            id,
            source,
            title: None,
            repo_name: None,
            cwd: None,
            model: None,
            modified_at,
            file_size_bytes,
            events: None,
            estimated_tool_calls: 0,
            is_system: false,
        }
    }

    pub fn is_hydrated(&self) -> bool {
        self.events.is_some()
    }

    pub fn events(&self) -> &[SessionEvent] {
        self.events.as_deref().unwrap_or(&[])
    }
}

/// Query text plus structured constraints for one search request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchFilters {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub date_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub date_to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub repo_name: Option<String>,
    #[serde(default)]
    pub path_contains: Option<String>,
}

impl SearchFilters {
    pub fn with_query(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    /// True when any constraint other than the free-text query is set.
    pub fn has_structured(&self) -> bool {
        let set = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        set(&self.model)
            || set(&self.repo_name)
            || set(&self.path_contains)
            || self.date_from.is_some()
            || self.date_to.is_some()
    }
}
