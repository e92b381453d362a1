//! Line buffer behind the context document.
//!
//! # Responsibility
//! - Hold the ordered lines of one context document.
//! - Implement in-session edits (append / replace / tombstone) and
//!   between-session compaction as pure operations.
//!
//! # Invariants
//! - In-session edits never shrink the buffer and never move a line.
//! - A deleted line is an empty string (tombstone) until the next compaction.
//! - `compact` drops every empty line and keeps relative order.

/// Separator used both for rendering and for the persisted blob.
pub const LINE_SEPARATOR: char = '\n';

/// Placeholder shown in the numbered view when no live line exists.
pub const EMPTY_CONTEXT_PLACEHOLDER: &str = "(empty - populate as you learn about the user)";

/// Ordered, index-addressable lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineBuffer {
    lines: Vec<String>,
}

impl LineBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Splits a persisted blob into lines without compacting.
    ///
    /// An empty blob is an empty buffer, not one empty line.
    pub fn from_blob(blob: &str) -> Self {
        if blob.is_empty() {
            return Self::new();
        }
        Self {
            lines: blob.split(LINE_SEPARATOR).map(str::to_string).collect(),
        }
    }

    /// Returns the compacted form: empty lines dropped, survivors reindexed
    /// contiguously from 0 in original order.
    pub fn compacted(&self) -> Self {
        Self {
            lines: self
                .lines
                .iter()
                .filter(|line| !line.is_empty())
                .cloned()
                .collect(),
        }
    }

    /// Joins lines with the separator; this is also the persisted form.
    pub fn render(&self) -> String {
        self.lines.join("\n")
    }

    /// Prompt view: `"{index}-- {line}"` for every live line.
    pub fn render_numbered(&self) -> String {
        if self.live_count() == 0 {
            return EMPTY_CONTEXT_PLACEHOLDER.to_string();
        }
        self.lines
            .iter()
            .enumerate()
            .filter(|(_, line)| !line.is_empty())
            .map(|(index, line)| format!("{index}-- {line}"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Appends one line and returns its index.
    pub fn push(&mut self, content: &str) -> usize {
        self.lines.push(flatten_line(content));
        self.lines.len() - 1
    }

    /// Overwrites one line in place and returns the previous content.
    ///
    /// Returns `None` without touching the buffer when `index` is out of range.
    pub fn replace(&mut self, index: usize, content: &str) -> Option<String> {
        let slot = self.lines.get_mut(index)?;
        Some(std::mem::replace(slot, flatten_line(content)))
    }

    /// Tombstones one line and returns the previous content.
    pub fn tombstone(&mut self, index: usize) -> Option<String> {
        let slot = self.lines.get_mut(index)?;
        Some(std::mem::take(slot))
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.lines.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Number of non-tombstoned lines.
    pub fn live_count(&self) -> usize {
        self.lines.iter().filter(|line| !line.is_empty()).count()
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}

/// Collapses embedded line breaks so one edit always owns exactly one index.
fn flatten_line(content: &str) -> String {
    if !content.contains(['\n', '\r']) {
        return content.to_string();
    }
    content
        .split(['\n', '\r'])
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::{flatten_line, LineBuffer, EMPTY_CONTEXT_PLACEHOLDER};

    #[test]
    fn empty_blob_has_no_lines() {
        assert!(LineBuffer::from_blob("").is_empty());
    }

    #[test]
    fn compaction_drops_blank_runs_and_keeps_order() {
        let buffer = LineBuffer::from_blob("a\n\n\nb\n\nc\n");
        let compacted = buffer.compacted();
        assert_eq!(compacted.lines(), ["a", "b", "c"]);
        assert_eq!(compacted.compacted(), compacted);
    }

    #[test]
    fn tombstone_keeps_indices_stable() {
        let mut buffer = LineBuffer::from_blob("a\nb\nc");
        assert_eq!(buffer.tombstone(1).as_deref(), Some("b"));
        assert_eq!(buffer.replace(0, "x").as_deref(), Some("a"));
        assert_eq!(buffer.render(), "x\n\nc");
        assert_eq!(buffer.push("d"), 3);
        assert_eq!(buffer.tombstone(9), None);
    }

    #[test]
    fn numbered_view_skips_tombstones() {
        let mut buffer = LineBuffer::from_blob("a\nb\nc");
        buffer.tombstone(1);
        assert_eq!(buffer.render_numbered(), "0-- a\n2-- c");

        buffer.tombstone(0);
        buffer.tombstone(2);
        assert_eq!(buffer.render_numbered(), EMPTY_CONTEXT_PLACEHOLDER);
    }

    #[test]
    fn flatten_line_joins_line_breaks() {
        assert_eq!(flatten_line("one\r\ntwo\nthree"), "one two three");
        assert_eq!(flatten_line("plain"), "plain");
    }
}
