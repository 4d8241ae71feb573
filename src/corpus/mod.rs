//! Corpus building: bounded, sanitized text derived from a session for indexing.
//!
//! Two blobs are produced per session:
//!
//! - **[`build`]**: general full-text corpus. Normalized metadata first, then
//!   events sampled from the head, a thin stride through the middle, and the
//!   tail of the transcript.
//! - **[`build_tool_io`]**: tool calls and tool results only, in original order,
//!   for the secondary tool-I/O index.
//!
//! Every value passes through [`sanitize::sanitize`] and every append draws
//! from one shared character budget, so output never exceeds the requested
//! maximum. Budgets are counted in `char`s.

pub mod coverage;
pub mod sanitize;

use crate::config::CorpusLimits;
use crate::model::{EventKind, Session, SessionEvent};

pub use sanitize::sanitize;

/// Separator placed between sampled slices.
pub const ELLIPSIS: &str = "\n…\n";
const ELLIPSIS_CHARS: usize = 3;

/// Build the general corpus with default tool-output and middle-sample limits.
pub fn build(session: &Session, max_characters: usize, per_field_limit: usize) -> String {
    build_with(
        session,
        &CorpusLimits {
            max_characters,
            per_field_limit,
            ..CorpusLimits::default()
        },
    )
}

/// Build the general corpus with explicit limits.
pub fn build_with(session: &Session, limits: &CorpusLimits) -> String {
    let mut out = BudgetWriter::new(limits.max_characters);

    for value in [
        session.title.as_deref(),
        session.repo_name.as_deref(),
        session.cwd.as_deref(),
        session.model.as_deref(),
    ]
    .into_iter()
    .flatten()
    {
        let normalized = normalize_whitespace(value);
        out.append_field(&normalized, limits.per_field_limit);
    }

    let events = session.events();
    if events.is_empty() || out.is_exhausted() {
        return out.finish();
    }

    // Reserve room for the metadata/events newline and both ellipses.
    let remaining = out
        .remaining()
        .saturating_sub(usize::from(!out.is_empty()) + 2 * ELLIPSIS_CHARS);
    let head_budget = remaining * 2 / 5;
    let tail_budget = remaining * 2 / 5;
    let middle_budget = remaining - head_budget - tail_budget;

    let head = collect_events(events, 0..events.len(), head_budget, limits);
    let head_end = head.last().map_or(0, |(idx, _)| idx + 1);

    let mut tail = collect_events(events, (head_end..events.len()).rev(), tail_budget, limits);
    tail.reverse();
    let tail_start = tail.first().map_or(events.len(), |(idx, _)| *idx);

    let lo = head_end.max(events.len() / 4);
    let hi = tail_start.min(events.len() * 3 / 4);
    let middle = if lo < hi && limits.middle_sample_cap > 0 {
        let stride = (hi - lo).div_ceil(limits.middle_sample_cap).max(1);
        let picks = (lo..hi).step_by(stride).take(limits.middle_sample_cap);
        collect_events(events, picks, middle_budget, limits)
    } else {
        Vec::new()
    };

    let head = join_pieces(head);
    let middle = join_pieces(middle);
    let tail = join_pieces(tail);

    if !head.is_empty() {
        out.append_raw_line(&head);
    }
    if !middle.is_empty() {
        out.append_raw(ELLIPSIS);
        out.append_raw(&middle);
    }
    if !tail.is_empty() {
        out.append_raw(ELLIPSIS);
        out.append_raw(&tail);
    }
    out.finish()
}

/// Build the tool-only corpus: tool names, inputs and outputs in event order.
pub fn build_tool_io(session: &Session, max_characters: usize, per_field_limit: usize) -> String {
    let mut out = BudgetWriter::new(max_characters);
    for event in session.events() {
        if out.is_exhausted() {
            break;
        }
        match event.kind {
            EventKind::ToolCall => {
                out.append_truncated(event.tool_name.as_deref(), per_field_limit);
                out.append_truncated(event.tool_input.as_deref(), per_field_limit);
            }
            EventKind::ToolResult => {
                out.append_truncated(event.tool_name.as_deref(), per_field_limit);
                out.append_truncated(
                    event.tool_output.as_deref().or(event.text.as_deref()),
                    per_field_limit,
                );
            }
            _ => {}
        }
    }
    out.finish()
}

/// Render events in visiting order until `budget` is spent. Every visited index is
/// returned, including events that rendered to nothing.
fn collect_events(
    events: &[SessionEvent],
    order: impl Iterator<Item = usize>,
    budget: usize,
    limits: &CorpusLimits,
) -> Vec<(usize, String)> {
    let mut remaining = budget;
    let mut pieces = Vec::new();
    for idx in order {
        if remaining == 0 {
            break;
        }
        let mut writer = BudgetWriter::new(remaining);
        append_event(&mut writer, &events[idx], limits);
        let rendered = writer.finish();
        if !rendered.is_empty() {
            // One extra char pays for the joining newline.
            remaining = remaining.saturating_sub(rendered.chars().count() + 1);
        }
        pieces.push((idx, rendered));
    }
    pieces
}

fn join_pieces(pieces: Vec<(usize, String)>) -> String {
    pieces
        .into_iter()
        .map(|(_, text)| text)
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn append_event(out: &mut BudgetWriter, event: &SessionEvent, limits: &CorpusLimits) {
    match event.kind {
        EventKind::User | EventKind::Assistant | EventKind::Other => {
            if let Some(text) = event.text.as_deref() {
                out.append_field(text, limits.per_field_limit);
            }
        }
        EventKind::ToolCall => {
            out.append_truncated(event.tool_name.as_deref(), limits.per_field_limit);
            if let Some(input) = event.tool_input.as_deref() {
                out.append_field(input, limits.per_field_limit);
            }
        }
        EventKind::ToolResult => {
            out.append_truncated(event.tool_name.as_deref(), limits.per_field_limit);
            if let Some(output) = event.tool_output.as_deref().or(event.text.as_deref()) {
                out.append_field(
                    output,
                    limits.tool_output_limit.min(limits.per_field_limit),
                );
            }
        }
    }
}

/// Accumulates newline-separated fields under a fixed character budget.
struct BudgetWriter {
    buf: String,
    remaining: usize,
}

impl BudgetWriter {
    fn new(budget: usize) -> Self {
        Self {
            buf: String::new(),
            remaining: budget,
        }
    }

    fn remaining(&self) -> usize {
        self.remaining
    }

    fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn finish(self) -> String {
        self.buf
    }

    /// Sanitize, sample down to `field_limit`, then append.
    fn append_field(&mut self, value: &str, field_limit: usize) {
        let clean = sanitize(value);
        let clean = clean.trim();
        if clean.is_empty() || !self.reserve_separator() {
            return;
        }
        let limit = field_limit.min(self.remaining);
        let sampled = sample_text(clean, limit);
        self.push_bounded(&sampled);
    }

    /// Sanitize, keep the first `field_limit` chars, then append.
    fn append_truncated(&mut self, value: Option<&str>, field_limit: usize) {
        let Some(value) = value else { return };
        let clean = sanitize(value);
        let clean = clean.trim();
        if clean.is_empty() || !self.reserve_separator() {
            return;
        }
        let limit = field_limit.min(self.remaining);
        self.push_bounded(prefix_chars(clean, limit));
    }

    /// Append pre-built text as its own line.
    fn append_raw_line(&mut self, text: &str) {
        if text.is_empty() || !self.reserve_separator() {
            return;
        }
        self.push_bounded(text);
    }

    fn append_raw(&mut self, text: &str) {
        self.push_bounded(text);
    }

    fn reserve_separator(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        if self.buf.is_empty() {
            return true;
        }
        if self.remaining <= 1 {
            self.remaining = 0;
            return false;
        }
        self.buf.push('\n');
        self.remaining -= 1;
        true
    }

    fn push_bounded(&mut self, text: &str) {
        let piece = prefix_chars(text, self.remaining);
        self.remaining -= piece.chars().count();
        self.buf.push_str(piece);
    }
}

/// Fit `text` into `budget` chars. Long values keep a head, a slice centered on
/// the midpoint, and a tail, joined by [`ELLIPSIS`].
pub fn sample_text(text: &str, budget: usize) -> std::borrow::Cow<'_, str> {
    let total = text.chars().count();
    if total <= budget {
        return std::borrow::Cow::Borrowed(text);
    }
    let available = budget.saturating_sub(2 * ELLIPSIS_CHARS);
    if available < 3 {
        return std::borrow::Cow::Borrowed(prefix_chars(text, budget));
    }
    let head_len = available / 3;
    let middle_len = available / 3;
    let tail_len = available - head_len - middle_len;

    let tail_start = total - tail_len;
    let middle_start = (total / 2)
        .saturating_sub(middle_len / 2)
        .clamp(head_len, tail_start - middle_len);

    let mut out = String::with_capacity(budget * 4);
    out.push_str(char_slice(text, 0, head_len));
    out.push_str(ELLIPSIS);
    out.push_str(char_slice(text, middle_start, middle_start + middle_len));
    out.push_str(ELLIPSIS);
    out.push_str(char_slice(text, tail_start, total));
    std::borrow::Cow::Owned(out)
}

fn normalize_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn byte_offset(text: &str, char_idx: usize) -> usize {
    text.char_indices()
        .nth(char_idx)
        .map_or(text.len(), |(offset, _)| offset)
}

fn prefix_chars(text: &str, max_chars: usize) -> &str {
    &text[..byte_offset(text, max_chars)]
}

fn char_slice(text: &str, start: usize, end: usize) -> &str {
    let from = byte_offset(text, start);
    let to = from + byte_offset(&text[from..], end.saturating_sub(start));
    &text[from..to]
}
