use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use colored::*;

use chat_typewriter::cli::Args;
use chat_typewriter::diagram::{DiagramSource, HtmlPageSink};
use chat_typewriter::render::{HtmlFileSurface, TerminalSurface};
use chat_typewriter::{
    logging, ChatClient, ChatConfig, ChatError, Controller, ControllerSettings, Conversation,
    Result,
};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    logging::init(args.verbose);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let mut cfg = match &args.config {
        Some(path) => ChatConfig::load(path)?,
        None => ChatConfig::default(),
    };
    args.apply_to(&mut cfg);
    cfg.validate("command line")?;

    if let Some(path) = &args.sanitize {
        return sanitize_file(path, &cfg.diagram_language);
    }

    let sink = HtmlPageSink::new(cfg.diagram_dir())
        .script_src(cfg.diagram_script.as_str())
        .open_pages(cfg.open_diagrams);
    let builder = Controller::builder(ControllerSettings::from(&cfg)).sink(sink);
    let builder = match &args.html_out {
        Some(path) => builder.surface(HtmlFileSurface::new(path)),
        None => builder.surface(TerminalSurface),
    };
    let controller = builder.build().map_err(|e| ChatError::Config {
        path: "command line".to_string(),
        detail: e.to_string(),
    })?;

    let mut conversation =
        Conversation::new(controller, ChatClient::new(&cfg), args.session_id.clone());
    tracing::debug!(
        server = %cfg.base_url(),
        session_id = %conversation.session_id(),
        "client ready"
    );

    match &args.prompt {
        Some(prompt) => conversation.send(prompt).await,
        None => {
            eprintln!(
                "{} {} (one prompt per line, Ctrl-D to quit)",
                "chat-typewriter".bold(),
                cfg.base_url().dimmed()
            );
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            conversation.run_interactive(stdin).await
        }
    }
}

fn sanitize_file(path: &Path, keyword: &str) -> Result<()> {
    let text = std::fs::read_to_string(path)?;
    let diagram = DiagramSource::new(text).sanitize(keyword);
    for warning in diagram.warnings() {
        eprintln!("{} {}", "repaired:".yellow(), warning);
    }
    println!("{}", diagram.as_str());
    Ok(())
}
