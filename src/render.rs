//! Markdown rendering and the output surfaces a message is rendered into.

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use colored::*;
use pulldown_cmark::{html, Event, Options, Parser};

use crate::error::RenderError;

/// Markdown-to-HTML collaborator.
pub trait MarkdownRenderer: Send {
    fn render(&self, markdown: &str) -> Result<String, RenderError>;
}

/// pulldown-cmark renderer with GFM extensions.
///
/// Single line breaks become `<br />`, matching chat-style output where the
/// model's newlines are meant literally.
#[derive(Debug, Clone)]
pub struct CmarkRenderer {
    options: Options,
}

impl Default for CmarkRenderer {
    fn default() -> Self {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);
        options.insert(Options::ENABLE_SMART_PUNCTUATION);
        Self { options }
    }
}

impl CmarkRenderer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MarkdownRenderer for CmarkRenderer {
    fn render(&self, markdown: &str) -> Result<String, RenderError> {
        let parser = Parser::new_ext(markdown, self.options).map(|event| match event {
            Event::SoftBreak => Event::HardBreak,
            other => other,
        });
        let mut out = String::with_capacity(markdown.len() * 3 / 2);
        html::push_html(&mut out, parser);
        Ok(out)
    }
}

/// One render of the current message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Markdown revealed so far.
    pub text: String,
    /// HTML of the last successful render of `text`.
    pub html: String,
    /// Set only on the terminal render of a finished message.
    pub complete: bool,
}

/// The live output for one message.
pub trait RenderTarget: Send {
    fn show(&mut self, frame: &Frame);
    /// Replace the message with a fixed notice (stream failure).
    fn show_notice(&mut self, notice: &str);
}

/// Creates a fresh [`RenderTarget`] for every new message.
pub trait Surface: Send {
    fn create_target(&mut self, prompt: &str) -> Box<dyn RenderTarget>;
}

// ---------------------------------------------------------------------------
// Terminal
// ---------------------------------------------------------------------------

/// Prints each message to stdout as it is revealed.
#[derive(Debug, Default)]
pub struct TerminalSurface;

impl Surface for TerminalSurface {
    fn create_target(&mut self, prompt: &str) -> Box<dyn RenderTarget> {
        println!();
        println!("{} {}", "you>".bright_yellow().bold(), prompt);
        print!("{} ", "bot>".bright_cyan().bold());
        let _ = io::stdout().flush();
        Box::new(TerminalTarget::default())
    }
}

/// Writes only the newly revealed suffix of each frame.
#[derive(Debug, Default)]
pub struct TerminalTarget {
    printed: usize,
    closed: bool,
}

impl RenderTarget for TerminalTarget {
    fn show(&mut self, frame: &Frame) {
        if self.closed {
            return;
        }
        if let Some(suffix) = frame.text.get(self.printed..) {
            print!("{}", suffix);
            self.printed = frame.text.len();
        }
        if frame.complete {
            println!();
            println!("{}", "=".repeat(50).bright_blue());
            self.closed = true;
        }
        let _ = io::stdout().flush();
    }

    fn show_notice(&mut self, notice: &str) {
        println!();
        println!("{}", notice.bright_red());
        self.closed = true;
    }
}

// ---------------------------------------------------------------------------
// HTML file
// ---------------------------------------------------------------------------

/// Rewrites an HTML document on disk with the current message on every frame.
#[derive(Debug, Clone)]
pub struct HtmlFileSurface {
    path: PathBuf,
}

impl HtmlFileSurface {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Surface for HtmlFileSurface {
    fn create_target(&mut self, prompt: &str) -> Box<dyn RenderTarget> {
        Box::new(HtmlFileTarget {
            path: self.path.clone(),
            prompt: escape_html(prompt),
        })
    }
}

struct HtmlFileTarget {
    path: PathBuf,
    prompt: String,
}

impl HtmlFileTarget {
    fn write(&self, body: &str) {
        let doc = format!(
            "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>chat</title></head>\n<body>\n<div class=\"message user-message\">{}</div>\n<div class=\"message bot-message markdown-body\">\n{}</div>\n</body>\n</html>\n",
            self.prompt, body
        );
        if let Err(e) = std::fs::write(&self.path, doc) {
            tracing::error!(path = %self.path.display(), error = %e, "failed to write html output");
        }
    }
}

impl RenderTarget for HtmlFileTarget {
    fn show(&mut self, frame: &Frame) {
        self.write(&frame.html);
    }

    fn show_notice(&mut self, notice: &str) {
        self.write(&escape_html(notice));
    }
}

// ---------------------------------------------------------------------------
// In-memory recording
// ---------------------------------------------------------------------------

/// What a [`RecordingSurface`] target received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recorded {
    Frame(Frame),
    Notice(String),
}

/// Keeps every frame of every message in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingSurface {
    messages: Arc<Mutex<Vec<(String, Vec<Recorded>)>>>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of `(prompt, outputs)` per created target, oldest first.
    pub fn messages(&self) -> Vec<(String, Vec<Recorded>)> {
        self.messages.lock().map(|m| m.clone()).unwrap_or_default()
    }

    /// Outputs of the most recently created target.
    pub fn last(&self) -> Vec<Recorded> {
        self.messages()
            .pop()
            .map(|(_, outputs)| outputs)
            .unwrap_or_default()
    }
}

impl Surface for RecordingSurface {
    fn create_target(&mut self, prompt: &str) -> Box<dyn RenderTarget> {
        let index = match self.messages.lock() {
            Ok(mut m) => {
                m.push((prompt.to_string(), Vec::new()));
                m.len() - 1
            }
            Err(_) => 0,
        };
        Box::new(RecordingTarget {
            store: Arc::clone(&self.messages),
            index,
        })
    }
}

struct RecordingTarget {
    store: Arc<Mutex<Vec<(String, Vec<Recorded>)>>>,
    index: usize,
}

impl RecordingTarget {
    fn push(&self, item: Recorded) {
        if let Ok(mut m) = self.store.lock() {
            if let Some((_, outputs)) = m.get_mut(self.index) {
                outputs.push(item);
            }
        }
    }
}

impl RenderTarget for RecordingTarget {
    fn show(&mut self, frame: &Frame) {
        self.push(Recorded::Frame(frame.clone()));
    }

    fn show_notice(&mut self, notice: &str) {
        self.push(Recorded::Notice(notice.to_string()));
    }
}

/// Escape text for inclusion in HTML element content.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Inverse of the entity escaping markdown renderers apply to code text.
pub fn unescape_html(text: &str) -> String {
    const ENTITIES: &[(&str, char)] = &[
        ("&lt;", '<'),
        ("&gt;", '>'),
        ("&quot;", '"'),
        ("&#39;", '\''),
        ("&#x27;", '\''),
        ("&amp;", '&'),
    ];
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    'outer: while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];
        for (entity, ch) in ENTITIES {
            if let Some(after) = rest.strip_prefix(entity) {
                out.push(*ch);
                rest = after;
                continue 'outer;
            }
        }
        out.push('&');
        rest = &rest[1..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_paragraph() {
        let html = CmarkRenderer::new().render("Hello world").unwrap();
        assert_eq!(html, "<p>Hello world</p>\n");
    }

    #[test]
    fn test_render_line_break_as_br() {
        let html = CmarkRenderer::new().render("a\nb").unwrap();
        assert!(html.contains("<br />"), "html: {html}");
    }

    #[test]
    fn test_render_fenced_code_language_class() {
        let html = CmarkRenderer::new()
            .render("```mermaid\ngraph TD\nA --> B\n```\n")
            .unwrap();
        assert!(html.contains("<code class=\"language-mermaid\">"), "html: {html}");
        assert!(html.contains("A --&gt; B"), "html: {html}");
    }

    #[test]
    fn test_render_partial_fence_is_still_valid() {
        // An unterminated fence renders as an open code block.
        let html = CmarkRenderer::new().render("```rust\nfn main() {").unwrap();
        assert!(html.starts_with("<pre><code class=\"language-rust\">"), "html: {html}");
        assert!(html.trim_end().ends_with("</code></pre>"), "html: {html}");
    }

    #[test]
    fn test_render_table() {
        let html = CmarkRenderer::new().render("| a | b |\n|---|---|\n| 1 | 2 |\n").unwrap();
        assert!(html.contains("<table>"), "html: {html}");
    }

    #[test]
    fn test_escape_unescape() {
        let raw = "A --> B & \"C\" <'d'>";
        assert_eq!(unescape_html(&escape_html(raw)), raw);
    }

    #[test]
    fn test_unescape_leaves_unknown_entities() {
        assert_eq!(unescape_html("&nbsp; &amp;lt;"), "&nbsp; &lt;");
    }

    #[test]
    fn test_recording_surface_separates_messages() {
        let mut surface = RecordingSurface::new();
        let mut first = surface.create_target("one");
        first.show_notice("n1");
        let mut second = surface.create_target("two");
        second.show(&Frame {
            text: "t".into(),
            html: "<p>t</p>".into(),
            complete: true,
        });
        let messages = surface.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].0, "one");
        assert_eq!(messages[0].1, vec![Recorded::Notice("n1".into())]);
        assert_eq!(surface.last().len(), 1);
    }

    #[test]
    fn test_html_file_surface_writes_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.html");
        let mut surface = HtmlFileSurface::new(&path);
        let mut target = surface.create_target("<hi>");
        target.show(&Frame {
            text: "x".into(),
            html: "<p>x</p>\n".into(),
            complete: false,
        });
        let doc = std::fs::read_to_string(&path).unwrap();
        assert!(doc.contains("&lt;hi&gt;"));
        assert!(doc.contains("<p>x</p>"));
    }
}
