//! # saga
//!
//! Terminal client: loads settings, opens the state store, connects to the
//! narrative agent, and runs one session interactively over stdin/stdout.

#![deny(unsafe_code)]

mod render;
mod repl;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use saga_core::SessionId;
use saga_core::logging::{LogFormat, init_subscriber};
use saga_llm::{AgentClient, HttpAgentClient, LlmSummarizer};
use saga_runtime::{Orchestrator, RuntimeError, SessionConfig, SessionHandle, SubmitOutcome};
use saga_settings::{SagaSettings, StorageBackend, load_settings_from_path, settings_path};
use saga_store::{StateStore, open_store};

use crate::repl::{HELP, ReplCommand, parse_line};

/// Upper bound on flushing events after shutdown.
const PRINTER_DRAIN: Duration = Duration::from_secs(2);

/// Interactive narrative session.
#[derive(Parser, Debug)]
#[command(name = "saga", about = "Play a narrative session in the terminal")]
struct Cli {
    /// Session to open; created if it does not exist.
    #[arg(long, default_value = "default")]
    session: String,

    /// Directory for session state; also holds the `SQLite` file.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Storage backend (overrides settings).
    #[arg(long, value_enum)]
    backend: Option<Backend>,

    /// Log level filter, e.g. `info` or `saga_runtime=debug`.
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    json_logs: bool,

    /// Settings file (defaults to `~/.saga/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// List persisted sessions and exit.
    #[arg(long)]
    list: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Backend {
    File,
    Sqlite,
}

impl Cli {
    fn load_settings(&self) -> Result<SagaSettings> {
        let mut settings = match &self.settings {
            Some(path) => load_settings_from_path(path)
                .with_context(|| format!("Failed to load settings from {}", path.display()))?,
            None => load_settings_from_path(&settings_path()).unwrap_or_default(),
        };
        if let Some(dir) = &self.data_dir {
            // relative to the working directory, not ~/.saga
            let dir = std::path::absolute(dir)
                .with_context(|| format!("Invalid data dir {}", dir.display()))?;
            settings.storage.data_dir = dir.to_string_lossy().into_owned();
            settings.storage.sqlite_path = dir.join("saga.db").to_string_lossy().into_owned();
        }
        if let Some(backend) = self.backend {
            settings.storage.backend = match backend {
                Backend::File => StorageBackend::File,
                Backend::Sqlite => StorageBackend::Sqlite,
            };
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        if self.json_logs {
            settings.logging.json = true;
        }
        Ok(settings)
    }
}

fn build_orchestrator(settings: &SagaSettings, store: Arc<dyn StateStore>) -> Result<Orchestrator> {
    let narrator = HttpAgentClient::from_settings(&settings.agent)
        .context("Failed to build agent client")?;
    let summarizer_client: Arc<dyn AgentClient> =
        Arc::new(narrator.with_model(settings.summarizer.model.clone()));
    let summarizer = Arc::new(LlmSummarizer::new(summarizer_client, &settings.summarizer));
    Ok(Orchestrator::new(
        store,
        Arc::new(narrator),
        summarizer,
        SessionConfig::from_settings(settings),
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let settings = args.load_settings()?;

    let format = if settings.logging.json {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };
    init_subscriber(&settings.logging.level, format);

    let store = open_store(&settings.storage)
        .await
        .context("Failed to open state store")?;
    let orchestrator = build_orchestrator(&settings, store)?;

    if args.list {
        for id in orchestrator.list_sessions().await? {
            println!("{id}");
        }
        return Ok(());
    }

    let id = SessionId::from(args.session);
    let mut events = orchestrator.subscribe();
    let session = orchestrator
        .open_session(id.clone())
        .await
        .with_context(|| format!("Failed to open session {id}"))?;
    info!(session_id = %id, model = %settings.agent.model, "session ready");

    let printer_id = id.clone();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) if event.session_id() == printer_id.as_str() => {
                    render::print_event(&event);
                }
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "terminal fell behind on events");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    eprintln!("{HELP}");
    let result = run_repl(&session).await;

    orchestrator.shutdown().await;
    // the event channel closes once every emitter handle is gone
    drop(session);
    drop(orchestrator);
    if tokio::time::timeout(PRINTER_DRAIN, printer).await.is_err() {
        warn!("event printer did not finish draining");
    }
    result
}

/// Read stdin until EOF or `/quit`. Ctrl-C aborts a running turn, or exits
/// when nothing is running.
async fn run_repl(session: &SessionHandle) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => {
                match session.abort().await {
                    Err(RuntimeError::NotRunning) => return Ok(()),
                    Err(e) => eprintln!("{e}"),
                    Ok(()) => {}
                }
                continue;
            }
        };
        let Some(line) = line else {
            return Ok(());
        };
        let Some(command) = parse_line(&line) else {
            continue;
        };

        match command {
            ReplCommand::Input(text) => match session.submit_input(text).await {
                Ok(SubmitOutcome::Started | SubmitOutcome::Queued { .. }) => {}
                // rejected input is reported through the event stream
                Err(RuntimeError::InputRejected(_) | RuntimeError::QueueFull { .. }) => {}
                Err(e) => return Err(e.into()),
            },
            ReplCommand::Abort => {
                if let Err(e) = session.abort().await {
                    eprintln!("{e}");
                }
            }
            ReplCommand::Compact => match session.compact_now().await {
                Ok(report) if report.archive_key.is_none() => {
                    eprintln!("(nothing old enough to archive)");
                }
                Ok(_) => {}
                Err(e) => eprintln!("{e}"),
            },
            ReplCommand::Status => {
                let status = session.status().await?;
                eprintln!("{}", serde_json::to_string_pretty(&status)?);
            }
            ReplCommand::Help => eprintln!("{HELP}"),
            ReplCommand::Unknown(command) => eprintln!("unknown command {command}; try /help"),
            ReplCommand::Quit => return Ok(()),
        }
    }
}
