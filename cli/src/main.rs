//! ragchat CLI - line-oriented terminal client for the RAG assistant server.
//!
//! # Event Loop
//!
//! One task drives [`ragchat_engine::App`] with a `tokio::select!` over three sources:
//!
//! 1. Lines from stdin (chat messages or slash commands)
//! 2. A fixed 30ms tick that advances the app (`app.tick()`) and prints new output
//! 3. Ctrl-C
//!
//! Streamed answers are printed incrementally as their accumulated text grows.
//! Model output is sanitized before it reaches the terminal.

mod commands;
mod console;

use anyhow::{Context, Result};
use std::{
    fs::{self, OpenOptions},
    path::PathBuf,
    sync::Mutex,
    time::Duration,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::{Instant, MissedTickBehavior};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use commands::{Command, HELP};
use console::Console;
use ragchat_engine::{App, RagChatConfig, Settings, SubmitOutcome, TurnOutcome};

const TICK_DURATION: Duration = Duration::from_millis(30);

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::try_new("warn").expect("warn filter is valid"));

    let (log_file, init_warnings) = open_log_file();

    if let Some((log_path, file)) = log_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();

        tracing::info!(path = %log_path.display(), "Logging initialized");
        for warning in init_warnings {
            tracing::warn!("{warning}");
        }
        return;
    }

    // No log file: stay silent rather than interleave logs with the conversation.
    tracing_subscriber::registry().with(env_filter).init();
}

fn open_log_file() -> (Option<(PathBuf, std::fs::File)>, Vec<String>) {
    let mut warnings = Vec::new();

    for candidate in log_file_candidates() {
        if let Some(parent) = candidate.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!(
                "Failed to create log dir {}: {e}",
                parent.display()
            ));
            continue;
        }

        match OpenOptions::new()
            .create(true)
            .append(true)
            .open(&candidate)
        {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => {
                warnings.push(format!(
                    "Failed to open log file {}: {e}",
                    candidate.display()
                ));
            }
        }
    }

    (None, warnings)
}

fn log_file_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    // Primary: ~/.ragchat/logs/ragchat.log
    if let Some(config_path) = RagChatConfig::path()
        && let Some(config_dir) = config_path.parent()
    {
        candidates.push(config_dir.join("logs").join("ragchat.log"));
    }

    // Fallback: ./.ragchat/logs/ragchat.log
    candidates.push(PathBuf::from(".ragchat").join("logs").join("ragchat.log"));

    candidates
}

/// Load settings, reporting config problems without refusing to start.
fn load_settings(console: &mut Console) -> Result<Settings> {
    let config = match RagChatConfig::load() {
        Ok(config) => config.unwrap_or_default(),
        Err(e) => {
            console.warning(&format!("{e}; using defaults"))?;
            RagChatConfig::default()
        }
    };
    match config.resolve() {
        Ok(settings) => Ok(settings),
        Err(e) => {
            console.warning(&format!("{e}; using defaults"))?;
            RagChatConfig::default()
                .resolve_with_env(|_| None)
                .context("default settings are invalid")
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

fn handle_line(app: &mut App, console: &mut Console, line: &str) -> Result<Flow> {
    match Command::parse(line) {
        Command::Chat(text) => match app.submit(&text) {
            SubmitOutcome::Started(entry) => console.begin_response(entry)?,
            SubmitOutcome::Busy => {
                console.notice("Still answering. Wait for the response to finish.")?;
            }
            SubmitOutcome::Ignored => console.prompt()?,
        },
        Command::Action { action, topic } => match app.submit_action(action, topic.as_deref()) {
            SubmitOutcome::Started(entry) => {
                if let Some(user) = app.conversation().entries().iter().rev().nth(1) {
                    console.echo_user(user.content())?;
                }
                console.begin_response(entry)?;
            }
            SubmitOutcome::Busy => {
                console.notice("Still answering. Wait for the response to finish.")?;
            }
            SubmitOutcome::Ignored => console.prompt()?,
        },
        Command::Upload(path) => {
            if let Some(path) = path {
                app.select_file(path);
            }
            match app.start_upload() {
                Ok(()) => {
                    if let Some(status) = app.upload_status() {
                        console.status(status)?;
                    }
                }
                Err(e) => console.error(&e.to_string())?,
            }
            console.prompt_if_idle(app)?;
        }
        Command::Files => {
            console.files(&app.files(), app.context_indicator())?;
            console.prompt_if_idle(app)?;
        }
        Command::Mode => {
            console.mode(app.context_indicator())?;
            console.prompt_if_idle(app)?;
        }
        Command::Help => {
            console.notice(HELP)?;
            console.prompt_if_idle(app)?;
        }
        Command::Quit => return Ok(Flow::Quit),
        Command::Unknown(name) => {
            console.error(&format!("Unknown command /{name}. Type /help for commands."))?;
            console.prompt_if_idle(app)?;
        }
    }
    Ok(Flow::Continue)
}

fn on_tick(app: &mut App, console: &mut Console) -> Result<()> {
    let report = app.tick(Instant::now());

    if let Some(active) = app.active_stream()
        && let Some(entry) = app.conversation().get(active.entry())
    {
        console.stream_progress(entry.content())?;
    }

    if let Some(turn) = &report.turn {
        let content = app
            .conversation()
            .get(turn.entry())
            .map(|entry| entry.content().to_string())
            .unwrap_or_default();
        match turn {
            TurnOutcome::Completed { completion, .. } => {
                console.finish_response(&content, *completion)?;
            }
            TurnOutcome::Failed { .. } => console.fail_response(&content)?,
        }
        console.prompt()?;
    }

    if let Some(upload) = &report.upload {
        console.upload_outcome(upload)?;
        console.prompt_if_idle(app)?;
    }

    if !app.is_streaming() && console.mode_changed(app.context_indicator()) {
        console.mode(app.context_indicator())?;
        console.prompt_if_idle(app)?;
    }

    Ok(())
}

async fn run(app: &mut App, console: &mut Console) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut ticks = tokio::time::interval(TICK_DURATION);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);

    console.banner()?;
    console.prompt()?;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    break;
                };
                if handle_line(app, console, &line)? == Flow::Quit {
                    break;
                }
            }
            _ = ticks.tick() => on_tick(app, console)?,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let mut console = Console::new();
    let settings = load_settings(&mut console)?;
    tracing::info!(server = %settings.base_url, "Starting ragchat");

    let mut app = App::new(&settings)?;
    app.start();

    let result = run(&mut app, &mut console).await;
    app.shutdown();
    console.goodbye()?;
    result
}
