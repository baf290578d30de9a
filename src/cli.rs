use std::path::PathBuf;

use clap::{ArgAction, Parser};

use crate::config::ChatConfig;

#[derive(Parser, Debug)]
#[command(name = "chat-typewriter")]
#[command(version)]
#[command(about = "Streaming chat client with a typewriter renderer and diagram popups")]
pub struct Args {
    /// Prompt to send. Without one, prompts are read from stdin, one per line
    pub prompt: Option<String>,

    /// Base URL of the chat server
    #[arg(long)]
    pub server: Option<String>,

    /// Session id sent with every prompt (random when omitted)
    #[arg(long)]
    pub session_id: Option<String>,

    /// TOML config file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Delay between two revealed tokens, in milliseconds
    #[arg(long)]
    pub interval_ms: Option<u64>,

    /// Delay between the final render and the diagram popup, in milliseconds
    #[arg(long)]
    pub settle_ms: Option<u64>,

    /// Directory for diagram pages
    #[arg(long)]
    pub diagram_dir: Option<PathBuf>,

    /// Diagram library script URL or path used by diagram pages
    #[arg(long)]
    pub diagram_script: Option<String>,

    /// Open diagram pages in the browser
    #[arg(long)]
    pub open: bool,

    /// Write the rendered message to this HTML file instead of the terminal
    #[arg(long)]
    pub html_out: Option<PathBuf>,

    /// Skip diagram detection
    #[arg(long)]
    pub no_diagrams: bool,

    /// More logging (-v info, -vv debug). RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Sanitize the diagram text in FILE, print it and exit
    #[arg(long, value_name = "FILE", conflicts_with = "prompt")]
    pub sanitize: Option<PathBuf>,
}

impl Args {
    /// Apply command-line overrides on top of file or default settings.
    pub fn apply_to(&self, cfg: &mut ChatConfig) {
        if let Some(server) = &self.server {
            cfg.server_url = server.clone();
        }
        if let Some(ms) = self.interval_ms {
            cfg.reveal_interval_ms = ms;
        }
        if let Some(ms) = self.settle_ms {
            cfg.diagram_settle_ms = ms;
        }
        if let Some(dir) = &self.diagram_dir {
            cfg.diagram_dir = Some(dir.clone());
        }
        if let Some(script) = &self.diagram_script {
            cfg.diagram_script = script.clone();
        }
        if self.open {
            cfg.open_diagrams = true;
        }
        if self.no_diagrams {
            cfg.diagrams_enabled = false;
        }
    }
}
