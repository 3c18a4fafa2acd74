//! Summary-buffer conversation memory.
//!
//! Recent turns are kept verbatim. Once they exceed the token limit, the
//! oldest turns are folded into a running summary.

use crate::agent::Summarizer;
use crate::error::Result;
use crate::models::Turn;
use tracing::debug;

/// Rough token estimate: about four characters per token.
pub fn estimate_tokens(text: &str) -> usize {
    let chars = text.chars().count();
    if chars == 0 {
        0
    } else {
        chars.div_ceil(4)
    }
}

/// Per-session conversation state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationMemory {
    summary: Option<String>,
    turns: Vec<Turn>,
}

impl ConversationMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parts(summary: Option<String>, turns: Vec<Turn>) -> Self {
        Self {
            summary: summary.filter(|s| !s.is_empty()),
            turns,
        }
    }

    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Append one human/AI exchange.
    pub fn push_exchange(&mut self, human: impl Into<String>, ai: impl Into<String>) {
        self.turns.push(Turn::human(human));
        self.turns.push(Turn::ai(ai));
    }

    /// Estimated token size of the verbatim buffer.
    pub fn buffer_tokens(&self) -> usize {
        self.turns
            .iter()
            .map(|turn| estimate_tokens(&turn.transcript_line()))
            .sum()
    }

    /// Fold the oldest turns into the summary until the buffer fits `token_limit`.
    ///
    /// Returns the number of turns pruned. On summarizer failure the memory is
    /// left exactly as it was.
    pub fn compact(&mut self, token_limit: usize, summarizer: &dyn Summarizer) -> Result<usize> {
        if self.buffer_tokens() <= token_limit {
            return Ok(0);
        }

        let mut keep_from = 0;
        let mut remaining = self.buffer_tokens();
        while remaining > token_limit && keep_from < self.turns.len() {
            remaining -= estimate_tokens(&self.turns[keep_from].transcript_line());
            keep_from += 1;
        }

        let pruned = &self.turns[..keep_from];
        let summary = summarizer.summarize(self.summary.as_deref(), pruned)?;
        debug!(
            "Folded {} turn(s) into summary, {} token(s) left in buffer",
            keep_from, remaining
        );
        self.summary = Some(summary);
        self.turns.drain(..keep_from);
        Ok(keep_from)
    }
}
