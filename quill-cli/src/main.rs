//! Quill — terminal driver for the auto-save engine.
//!
//! Reads standard input line by line. Plain lines are appended to the
//! document; lines starting with `:` are commands:
//!
//! ```text
//! :save          force a save (also writes a version)
//! :mode <m>      realtime | conservative | manual | adaptive
//! :status        show save state
//! :versions      list version snapshots
//! :restore <n>   restore version n
//! :clear         empty the document
//! :quit          close the session
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;
use quill_autosave::{
    AutoSaveEngine, EngineConfig, EngineDeps, HeuristicTitleGenerator, LocalStore, OpenDocument,
    StoreConfig,
};
use quill_core::{DocumentId, OwnerId, SaveMode};
use tokio::io::{AsyncBufReadExt, BufReader};
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "quill", about = "Edit a document from the terminal with adaptive auto-save")]
struct Args {
    /// Directory of the local document store.
    #[arg(long, default_value = "quill_data")]
    data_dir: PathBuf,

    /// Engine configuration (JSON, partial allowed).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Owner id. Defaults to the document's owner, or a fresh id for new documents.
    #[arg(long)]
    owner: Option<OwnerId>,

    /// Existing document to open.
    #[arg(long)]
    document: Option<DocumentId>,

    /// Save mode, overriding the configuration.
    #[arg(long)]
    mode: Option<SaveMode>,
}

enum Command {
    Save,
    Mode(SaveMode),
    Status,
    Versions,
    Restore(u64),
    Clear,
    Quit,
    Text(String),
}

fn parse_line(line: &str) -> Result<Command> {
    let Some(rest) = line.strip_prefix(':') else {
        return Ok(Command::Text(line.to_string()));
    };
    let mut parts = rest.split_whitespace();
    let cmd = match (parts.next(), parts.next()) {
        (Some("save"), None) => Command::Save,
        (Some("mode"), Some(m)) => Command::Mode(m.parse().map_err(anyhow::Error::msg)?),
        (Some("status"), None) => Command::Status,
        (Some("versions"), None) => Command::Versions,
        (Some("restore"), Some(n)) => {
            Command::Restore(n.parse().with_context(|| format!("invalid version number: {n}"))?)
        }
        (Some("clear"), None) => Command::Clear,
        (Some("quit"), None) => Command::Quit,
        _ => bail!("unknown command: {line}"),
    };
    Ok(cmd)
}

fn ago(at: Option<SystemTime>) -> String {
    match at.and_then(|t| t.elapsed().ok()) {
        Some(d) => format!("{}s ago", d.as_secs()),
        None => "never".to_string(),
    }
}

async fn print_status(engine: &AutoSaveEngine) {
    let pattern = engine.pattern().await;
    let stats = engine.stats();
    let interval = match engine.current_interval().await {
        Some(d) => format!("{}ms", d.as_millis()),
        None => "never".to_string(),
    };
    let document = match engine.document_id().await {
        Some(id) => id.to_string(),
        None => "(unsaved)".to_string(),
    };

    println!("document:   {document}");
    println!("title:      {}", engine.title().await.unwrap_or_else(|| "-".into()));
    println!("mode:       {} (interval {interval})", engine.mode().await);
    println!(
        "state:      {}{}",
        engine.save_phase().await,
        if engine.has_unsaved_changes().await { ", unsaved changes" } else { "" }
    );
    println!("last saved: {}", ago(engine.last_saved_at().await));
    println!(
        "pattern:    {} at {:.1} wpm, prefers {} saves, {} sessions",
        pattern.style, pattern.avg_speed_wpm, pattern.save_preference, pattern.session_count
    );
    println!(
        "store:      {} attempts, {} retries, {} timeouts, {} failures",
        stats.attempts, stats.retries, stats.timeouts, stats.failures
    );
    println!("unversioned: {} chars", engine.unversioned_chars().await);
}

async fn print_versions(engine: &AutoSaveEngine) -> Result<()> {
    let versions = engine.list_versions().await?;
    if versions.is_empty() {
        println!("no versions yet");
    }
    for v in versions {
        println!(
            "v{:<4} {:<6} {:>6} words  {}",
            v.version,
            if v.auto_save { "auto" } else { "manual" },
            v.word_count,
            v.title
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => EngineConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(mode) = args.mode {
        config.initial_mode = mode;
    }

    let store = Arc::new(
        LocalStore::open(StoreConfig {
            path: args.data_dir.clone(),
            ..StoreConfig::default()
        })
        .with_context(|| format!("opening store at {}", args.data_dir.display()))?,
    );

    let (owner, document) = match args.document {
        Some(id) => {
            let doc = store
                .load_document(id)
                .with_context(|| format!("loading document {id}"))?;
            (args.owner.unwrap_or(doc.owner_id), OpenDocument::existing(id, doc.title, doc.content))
        }
        None => (args.owner.unwrap_or_else(Uuid::new_v4), OpenDocument::new_untitled()),
    };
    info!("owner {owner}");

    let mut buffer = document.content.clone();
    let deps = EngineDeps::from_store(store.clone())
        .with_titles(Arc::new(HeuristicTitleGenerator::default()));
    let engine = AutoSaveEngine::open(owner, document, deps, config);

    if let Some(draft) = engine.recover_draft().await? {
        println!("recovered {} chars of unsaved work from a previous session", draft.len());
        buffer = draft;
        engine.report_change(buffer.clone()).await?;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = match parse_line(&line) {
            Ok(command) => command,
            Err(e) => {
                eprintln!("{e}");
                continue;
            }
        };

        match command {
            Command::Text(text) => {
                buffer.push_str(&text);
                buffer.push('\n');
                engine.report_change(buffer.clone()).await?;
            }
            Command::Clear => {
                buffer.clear();
                engine.report_change(buffer.clone()).await?;
            }
            Command::Save => match engine.force_save().await {
                Ok(()) => println!("saved"),
                Err(e) => eprintln!("save failed: {e}"),
            },
            Command::Mode(mode) => {
                engine.set_mode(mode).await;
                println!("mode set to {mode}");
            }
            Command::Status => print_status(&engine).await,
            Command::Versions => {
                if let Err(e) = print_versions(&engine).await {
                    eprintln!("{e}");
                }
            }
            Command::Restore(n) => match engine.restore_version(n).await {
                Ok(snapshot) => {
                    buffer = snapshot.content;
                    println!("restored version {n} ({} chars)", buffer.chars().count());
                }
                Err(e) => eprintln!("restore failed: {e}"),
            },
            Command::Quit => break,
        }
    }

    engine.close().await.context("final save failed")?;
    store.sync()?;
    Ok(())
}
