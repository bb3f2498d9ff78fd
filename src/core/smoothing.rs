//! Rate-limited reveal of streamed text.
//!
//! Network chunks land in a pending buffer; each display tick moves roughly a
//! sixtieth of it (at least one grapheme) into the visible text.

use std::time::Duration;
use unicode_segmentation::UnicodeSegmentation;

use crate::core::message::{THINK_CLOSE, THINK_OPEN};

pub const FRAME_INTERVAL: Duration = Duration::from_millis(16);
const DRAIN_DIVISOR: usize = 60;

#[derive(Debug, Default, Clone)]
pub struct SmoothingBuffer {
    visible: String,
    pending: String,
}

impl SmoothingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, text: &str) {
        self.pending.push_str(text);
    }

    pub fn visible(&self) -> &str {
        &self.visible
    }

    pub fn pending(&self) -> &str {
        &self.pending
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Total text received so far, revealed or not.
    pub fn full_text(&self) -> String {
        format!("{}{}", self.visible, self.pending)
    }

    /// Reveals the next slice. Returns the slice, or `None` when idle.
    pub fn tick(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let graphemes = self.pending.graphemes(true).count();
        let count = ((graphemes + DRAIN_DIVISOR / 2) / DRAIN_DIVISOR).max(1);
        let split = self
            .pending
            .grapheme_indices(true)
            .nth(count)
            .map(|(index, _)| index)
            .unwrap_or(self.pending.len());
        let revealed: String = self.pending.drain(..split).collect();
        self.visible.push_str(&revealed);
        Some(revealed)
    }

    /// Moves everything pending into the visible text.
    pub fn flush(&mut self) -> String {
        let rest = std::mem::take(&mut self.pending);
        self.visible.push_str(&rest);
        rest
    }
}

/// Wraps reasoning deltas in think markers as they interleave with content.
#[derive(Debug, Default, Clone)]
pub struct ThinkingWrapper {
    open: bool,
}

impl ThinkingWrapper {
    pub fn reasoning(&mut self, delta: &str) -> String {
        if delta.is_empty() {
            return String::new();
        }
        if self.open {
            delta.to_string()
        } else {
            self.open = true;
            format!("{THINK_OPEN}\n{delta}")
        }
    }

    pub fn content(&mut self, delta: &str) -> String {
        if delta.is_empty() {
            return String::new();
        }
        match self.close() {
            Some(marker) => format!("{marker}{delta}"),
            None => delta.to_string(),
        }
    }

    /// Closing marker if a reasoning block is still open.
    pub fn close(&mut self) -> Option<String> {
        if self.open {
            self.open = false;
            Some(format!("\n{THINK_CLOSE}\n\n"))
        } else {
            None
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }
}
