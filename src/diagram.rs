//! Diagram detection in rendered messages and dispatch to a display surface.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::config::DEFAULT_DIAGRAM_SCRIPT;
use crate::error::{RenderError, Result};
use crate::render::{escape_html, unescape_html};
use crate::sanitize::{sanitize, BracketWarning};

/// Raw text of one diagram block, as found in the rendered output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagramSource(String);

impl DiagramSource {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Run the sanitizer pipeline, removing `keyword` from the result.
    pub fn sanitize(&self, keyword: &str) -> SanitizedDiagram {
        let repair = sanitize(&self.0, keyword);
        SanitizedDiagram {
            text: repair.text,
            warnings: repair.warnings,
        }
    }
}

/// Renderer-ready diagram text. Owns its data; nothing ties it back to the
/// source it was derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedDiagram {
    text: String,
    warnings: Vec<BracketWarning>,
}

impl SanitizedDiagram {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Bracket repairs made while sanitizing.
    pub fn warnings(&self) -> &[BracketWarning] {
        &self.warnings
    }
}

/// Text of the first `<code class="language-{language}">` element in
/// `html`, unescaped and trimmed. Only that element is considered: when it is
/// empty there is no diagram, even if later blocks have content.
pub fn find_first_diagram(html: &str, language: &str) -> Option<DiagramSource> {
    let open = format!("<code class=\"language-{language}\">");
    let body = &html[html.find(&open)? + open.len()..];
    let end = body.find("</code>").unwrap_or(body.len());
    let text = unescape_html(&body[..end]);
    let text = text.trim();
    (!text.is_empty()).then(|| DiagramSource::new(text))
}

/// Collaborator that draws a sanitized diagram on a new display surface.
pub trait DiagramSink: Send {
    fn show(&mut self, diagram: &SanitizedDiagram) -> Result<()>;
}

/// Writes each diagram as a standalone HTML page that loads the diagram
/// library and renders the block, optionally opening it in a browser.
#[derive(Debug, Clone)]
pub struct HtmlPageSink {
    dir: PathBuf,
    script_src: String,
    open: bool,
    written: Vec<PathBuf>,
}

impl HtmlPageSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            script_src: DEFAULT_DIAGRAM_SCRIPT.to_string(),
            open: false,
            written: Vec::new(),
        }
    }

    /// Location of the diagram library script referenced by each page.
    pub fn script_src(mut self, src: impl Into<String>) -> Self {
        self.script_src = src.into();
        self
    }

    /// Open written pages with the platform opener.
    pub fn open_pages(mut self, open: bool) -> Self {
        self.open = open;
        self
    }

    /// Pages written so far, oldest first.
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    fn next_path(&self) -> PathBuf {
        let id = uuid::Uuid::new_v4().simple().to_string();
        self.dir.join(format!("diagram-{}.html", &id[..12]))
    }
}

impl DiagramSink for HtmlPageSink {
    fn show(&mut self, diagram: &SanitizedDiagram) -> Result<()> {
        if diagram.as_str().trim().is_empty() {
            return Err(RenderError::Diagram("nothing left to draw after sanitizing".into()).into());
        }
        std::fs::create_dir_all(&self.dir)?;
        let path = self.next_path();
        std::fs::write(&path, diagram_page(diagram.as_str(), &self.script_src))?;
        tracing::info!(path = %path.display(), "diagram page written");
        if self.open {
            open_in_browser(&path);
        }
        self.written.push(path);
        Ok(())
    }
}

/// Standalone page that renders `diagram` with the diagram library.
///
/// The library is initialised on load and re-run after 500 ms; failures are
/// shown in the page's error box.
pub fn diagram_page(diagram: &str, script_src: &str) -> String {
    format!(
        r##"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>Diagram</title>
<script src="{script}"></script>
<style>
body{{font-family:'Segoe UI',Tahoma,Geneva,Verdana,sans-serif;margin:0;padding:20px;background-color:#f5f5f5}}
.container{{background-color:white;border-radius:8px;padding:20px;box-shadow:0 2px 10px rgba(0,0,0,0.1);max-width:100%;margin:0 auto}}
#diagram{{display:flex;justify-content:center;overflow:auto}}
.error-message{{color:#e74c3c;text-align:center;margin:20px 0;padding:10px;border:1px solid #e74c3c;border-radius:4px;display:none}}
</style>
</head>
<body>
<div class="container">
<div id="error-container" class="error-message"></div>
<div id="diagram">
<pre class="mermaid">
{body}
</pre>
</div>
</div>
<script>
mermaid.initialize({{
  startOnLoad: true,
  theme: 'default',
  securityLevel: 'loose',
  logLevel: 1,
  flowchart: {{ useMaxWidth: false, htmlLabels: true, diagramPadding: 8 }},
  sequence: {{ diagramMarginX: 50, diagramMarginY: 10, actorMargin: 50, width: 150, height: 65 }},
  er: {{ diagramPadding: 20 }}
}});
function showDiagramError(err) {{
  console.error('diagram render error:', err);
  var box = document.getElementById('error-container');
  box.textContent = 'Diagram render error: ' + err.message;
  box.style.display = 'block';
}}
window.onload = function() {{
  setTimeout(function() {{
    try {{
      mermaid.init(undefined, document.querySelectorAll('.mermaid'));
    }} catch (err) {{
      showDiagramError(err);
    }}
  }}, 500);
}};
</script>
</body>
</html>
"##,
        script = escape_html(script_src),
        body = escape_html(diagram),
    )
}

fn open_in_browser(path: &Path) {
    #[cfg(target_os = "windows")]
    let spawned = std::process::Command::new("cmd")
        .args(["/C", "start", ""])
        .arg(path)
        .spawn();
    #[cfg(target_os = "macos")]
    let spawned = std::process::Command::new("open").arg(path).spawn();
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    let spawned = std::process::Command::new("xdg-open").arg(path).spawn();

    if let Err(e) = spawned {
        tracing::warn!(path = %path.display(), error = %e, "could not open diagram page");
    }
}

/// Collects dispatched diagrams in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    shown: Arc<Mutex<Vec<SanitizedDiagram>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shown(&self) -> Vec<SanitizedDiagram> {
        self.shown.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl DiagramSink for RecordingSink {
    fn show(&mut self, diagram: &SanitizedDiagram) -> Result<()> {
        if let Ok(mut shown) = self.shown.lock() {
            shown.push(diagram.clone());
        }
        Ok(())
    }
}
