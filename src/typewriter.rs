//! Streaming typewriter: queues stream deltas as tokens and reveals them one
//! per step, re-rendering the whole accumulated markdown each time.
//!
//! Re-rendering everything (rather than appending HTML) keeps the displayed
//! HTML a complete parse of the text typed so far; an unterminated code fence
//! is shown as an open code block instead of stray backticks.

use std::collections::VecDeque;

use crate::render::{Frame, MarkdownRenderer};
use crate::tokenize::split_fragment;

/// Outcome of one reveal step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// One token was revealed; the cycle continues.
    Revealed,
    /// The queue was empty at pop time; the cycle stops.
    Drained,
}

/// Per-message typewriter state.
#[derive(Debug, Default)]
pub struct Typewriter {
    queue: VecDeque<String>,
    text: String,
    html: String,
    cycling: bool,
    render_failures: usize,
}

impl Typewriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a fragment. Returns `true` when no reveal cycle is running and
    /// the caller must start one.
    pub fn enqueue(&mut self, fragment: &str) -> bool {
        self.queue.extend(split_fragment(fragment));
        if self.cycling || self.queue.is_empty() {
            return false;
        }
        self.cycling = true;
        true
    }

    /// Pop one token and re-render the accumulated text.
    ///
    /// Whether the cycle ends is decided here, at pop time: a fragment that
    /// arrived after the previous step keeps the cycle going.
    pub fn step(&mut self, renderer: &dyn MarkdownRenderer) -> Step {
        match self.queue.pop_front() {
            Some(token) => {
                self.cycling = true;
                self.text.push_str(&token);
                self.rerender(renderer);
                Step::Revealed
            }
            None => {
                self.cycling = false;
                Step::Drained
            }
        }
    }

    /// Render the full accumulated text once more (terminal render).
    pub fn render_full(&mut self, renderer: &dyn MarkdownRenderer) -> &str {
        self.rerender(renderer);
        &self.html
    }

    fn rerender(&mut self, renderer: &dyn MarkdownRenderer) {
        match renderer.render(&self.text) {
            Ok(html) => self.html = html,
            Err(e) => {
                self.render_failures += 1;
                tracing::error!(
                    error = %e,
                    revealed_bytes = self.text.len(),
                    "markdown render failed, keeping previous output"
                );
            }
        }
    }

    /// Stop the cycle without revealing what is still queued.
    pub fn halt(&mut self) {
        self.cycling = false;
    }

    /// Current frame for a render target.
    pub fn frame(&self, complete: bool) -> Frame {
        Frame {
            text: self.text.clone(),
            html: self.html.clone(),
            complete,
        }
    }

    pub fn is_cycling(&self) -> bool {
        self.cycling
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Markdown revealed so far.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Last successfully rendered HTML.
    pub fn html(&self) -> &str {
        &self.html
    }

    pub fn render_failures(&self) -> usize {
        self.render_failures
    }
}
