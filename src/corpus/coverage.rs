//! Coverage diagnostics: why did (or didn't) the fast path find a session?
//!
//! Compares where a query occurs in a hydrated session against what the
//! general corpus and the tool-I/O corpus actually retained. A hit that only
//! exists in tool output is the classic "instant search missed, deep search
//! found it" case; a hit in raw message text that the corpus dropped points at
//! a budget/sampling gap.

use serde::Serialize;

use crate::config::CorpusLimits;
use crate::model::{EventKind, Session};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Coverage {
    /// Query found in the general corpus blob.
    pub in_corpus: bool,
    /// Query found in the tool-I/O corpus blob.
    pub in_tool_io: bool,
    /// Query found in raw message text or metadata.
    pub in_raw_text: bool,
    /// Query found in raw tool input/output.
    pub in_raw_tool_output: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// The general corpus covers the query.
    Indexed,
    /// Only tool input/output contains it; a deep scan should find it.
    ToolOutputOnly,
    /// Message text contains it but the budgeted corpus dropped it.
    NotIndexed,
    /// The session does not contain the query at all.
    Absent,
}

impl Coverage {
    pub fn verdict(&self) -> Verdict {
        if self.in_corpus {
            Verdict::Indexed
        } else if self.in_raw_text {
            Verdict::NotIndexed
        } else if self.in_tool_io || self.in_raw_tool_output {
            Verdict::ToolOutputOnly
        } else {
            Verdict::Absent
        }
    }
}

/// Case-insensitive coverage check of `query` against a hydrated session.
pub fn audit(session: &Session, query: &str, limits: &CorpusLimits) -> Coverage {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return Coverage::default();
    }
    let contains = |hay: &str| hay.to_lowercase().contains(&needle);

    let corpus = super::build_with(session, limits);
    let tool_io = super::build_tool_io(session, limits.max_characters, limits.per_field_limit);

    let metadata_hit = [
        session.title.as_deref(),
        session.repo_name.as_deref(),
        session.cwd.as_deref(),
        session.model.as_deref(),
    ]
    .into_iter()
    .flatten()
    .any(contains);

    let mut in_raw_text = metadata_hit;
    let mut in_raw_tool_output = false;
    for event in session.events() {
        match event.kind {
            EventKind::ToolCall | EventKind::ToolResult => {
                in_raw_tool_output |= [
                    event.tool_input.as_deref(),
                    event.tool_output.as_deref(),
                    event.text.as_deref(),
                ]
                .into_iter()
                .flatten()
                .any(contains);
            }
            _ => {
                in_raw_text |= event.text.as_deref().is_some_and(contains);
            }
        }
        if in_raw_text && in_raw_tool_output {
            break;
        }
    }

    Coverage {
        in_corpus: contains(&corpus),
        in_tool_io: contains(&tool_io),
        in_raw_text,
        in_raw_tool_output,
    }
}
