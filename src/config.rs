//! Client configuration: built-in defaults, an optional TOML file, then CLI
//! overrides applied by `main`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ChatError, Result};

/// Notice shown in place of the message when the event stream fails.
pub const DEFAULT_ERROR_NOTICE: &str =
    "An error occurred while fetching the response. Please try again.";

/// Prefix of the notice shown when a prompt could not be sent.
pub const DEFAULT_SUBMIT_NOTICE: &str = "An error occurred while sending the message: ";

/// Diagram library loaded by every diagram page.
pub const DEFAULT_DIAGRAM_SCRIPT: &str =
    "https://cdn.jsdelivr.net/npm/mermaid/dist/mermaid.min.js";

/// Runtime settings for the chat client.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Base URL of the chat server (e.g. `http://127.0.0.1:8000`).
    pub server_url: String,
    /// Delay between two reveal steps of the typewriter.
    pub reveal_interval_ms: u64,
    /// Delay between the terminal render and the diagram dispatch.
    pub diagram_settle_ms: u64,
    /// Fenced-code language that marks a diagram block. Also the keyword
    /// stripped from the sanitized payload.
    pub diagram_language: String,
    pub error_notice: String,
    /// Followed by the error text when the prompt could not be sent.
    pub submit_error_notice: String,
    /// `src` of the diagram library script on diagram pages, e.g. a local
    /// `/static/js/mermaid.min.js` when the pages are served by the chat server.
    pub diagram_script: String,
    /// Where diagram pages are written. `None` uses the system temp dir.
    pub diagram_dir: Option<PathBuf>,
    /// Open each diagram page with the platform opener.
    pub open_diagrams: bool,
    /// Skip diagram detection entirely.
    pub diagrams_enabled: bool,
    pub connect_timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8000".to_string(),
            reveal_interval_ms: 4,
            diagram_settle_ms: 1_000,
            diagram_language: "mermaid".to_string(),
            error_notice: DEFAULT_ERROR_NOTICE.to_string(),
            submit_error_notice: DEFAULT_SUBMIT_NOTICE.to_string(),
            diagram_script: DEFAULT_DIAGRAM_SCRIPT.to_string(),
            diagram_dir: None,
            open_diagrams: false,
            diagrams_enabled: true,
            connect_timeout_secs: 10,
        }
    }
}

impl ChatConfig {
    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(src: &str, origin: &str) -> Result<Self> {
        let cfg: ChatConfig = toml::from_str(src).map_err(|e| ChatError::Config {
            path: origin.to_string(),
            detail: e.to_string(),
        })?;
        cfg.validate(origin)?;
        Ok(cfg)
    }

    /// Read and parse a TOML config file.
    pub fn load(path: &Path) -> Result<Self> {
        let origin = path.display().to_string();
        let src = std::fs::read_to_string(path).map_err(|e| ChatError::Config {
            path: origin.clone(),
            detail: e.to_string(),
        })?;
        Self::from_toml_str(&src, &origin)
    }

    /// Reject settings the client cannot run with.
    pub fn validate(&self, origin: &str) -> Result<()> {
        let invalid = |detail: &str| ChatError::Config {
            path: origin.to_string(),
            detail: detail.to_string(),
        };
        if self.server_url.trim().is_empty() {
            return Err(invalid("server_url must not be empty"));
        }
        if !(self.server_url.starts_with("http://") || self.server_url.starts_with("https://")) {
            return Err(invalid("server_url must use http or https"));
        }
        if self.diagram_language.trim().is_empty() {
            return Err(invalid("diagram_language must not be empty"));
        }
        Ok(())
    }

    pub fn reveal_interval(&self) -> Duration {
        Duration::from_millis(self.reveal_interval_ms)
    }

    pub fn diagram_settle(&self) -> Duration {
        Duration::from_millis(self.diagram_settle_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Resolved output directory for diagram pages.
    pub fn diagram_dir(&self) -> PathBuf {
        self.diagram_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Server URL without a trailing slash, ready for path joins.
    pub fn base_url(&self) -> &str {
        self.server_url.trim_end_matches('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = ChatConfig::default();
        assert_eq!(cfg.reveal_interval(), Duration::from_millis(4));
        assert_eq!(cfg.diagram_settle(), Duration::from_secs(1));
        assert_eq!(cfg.diagram_language, "mermaid");
        assert!(cfg.diagrams_enabled);
        assert!(!cfg.open_diagrams);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let cfg = ChatConfig::from_toml_str("reveal_interval_ms = 20\n", "inline").unwrap();
        assert_eq!(cfg.reveal_interval_ms, 20);
        assert_eq!(cfg.server_url, "http://127.0.0.1:8000");
        assert_eq!(cfg.error_notice, DEFAULT_ERROR_NOTICE);
        assert_eq!(cfg.submit_error_notice, DEFAULT_SUBMIT_NOTICE);
        assert_eq!(cfg.diagram_script, DEFAULT_DIAGRAM_SCRIPT);
    }

    #[test]
    fn test_full_toml() {
        let src = r#"
server_url = "https://chat.example.com/"
reveal_interval_ms = 1
diagram_settle_ms = 0
diagram_language = "graphviz"
error_notice = "oops"
submit_error_notice = "send failed: "
diagram_script = "/static/js/mermaid.min.js"
diagram_dir = "/tmp/diagrams"
open_diagrams = true
diagrams_enabled = false
connect_timeout_secs = 3
"#;
        let cfg = ChatConfig::from_toml_str(src, "inline").unwrap();
        assert_eq!(cfg.base_url(), "https://chat.example.com");
        assert_eq!(cfg.diagram_language, "graphviz");
        assert_eq!(cfg.submit_error_notice, "send failed: ");
        assert_eq!(cfg.diagram_script, "/static/js/mermaid.min.js");
        assert_eq!(cfg.diagram_dir(), PathBuf::from("/tmp/diagrams"));
        assert!(cfg.open_diagrams);
        assert!(!cfg.diagrams_enabled);
        assert_eq!(cfg.connect_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn test_bad_toml_is_config_error() {
        let err = ChatConfig::from_toml_str("reveal_interval_ms = \"fast\"", "bad.toml").unwrap_err();
        match err {
            ChatError::Config { path, .. } => assert_eq!(path, "bad.toml"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_validate_rejects_empty_url() {
        let cfg = ChatConfig {
            server_url: "  ".to_string(),
            ..Default::default()
        };
        assert!(cfg.validate("x").is_err());
    }

    #[test]
    fn test_validate_rejects_non_http_scheme() {
        let err = ChatConfig::from_toml_str("server_url = \"ftp://host\"", "x").unwrap_err();
        assert!(err.to_string().contains("http"));
    }

    #[test]
    fn test_validate_rejects_empty_language() {
        assert!(ChatConfig::from_toml_str("diagram_language = \"\"", "x").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "diagram_settle_ms = 250").unwrap();
        let cfg = ChatConfig::load(file.path()).unwrap();
        assert_eq!(cfg.diagram_settle(), Duration::from_millis(250));
    }

    #[test]
    fn test_load_missing_file() {
        let err = ChatConfig::load(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ChatError::Config { .. }));
    }
}
