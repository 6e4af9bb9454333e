//! Pagenote CLI: annotate pages and sync them from the command line.
//!
//! Usage:
//!   pagenote annotate <url> <exact> <comment> [--page file] [--author id]
//!   pagenote list <url> [--index file]
//!   pagenote sync | status | reconcile | quota

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use clap::{Parser, Subcommand};
use pagenote::anchor::{compute_quote, resolve_quote, Document, TextRange};
use pagenote::config::{default_config_path, Config};
use pagenote::identity::{IdentityProvider, StaticIdentity};
use pagenote::merge::{SearchService, StaticSearch};
use pagenote::worker::DirRemote;
use pagenote::{Annotation, ItemId, NewAnnotation, NewDrawing, QuoteAnchor, Runtime, SyncState, TickOutcome};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "pagenote", version, about = "Anchored page annotations with eventual remote sync")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Path to the YAML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Path to SQLite database file
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Directory the remote relay writes to
    #[arg(long, global = true)]
    remote_dir: Option<PathBuf>,
    /// Author id of the signed-in user; omit to work signed out
    #[arg(long, global = true)]
    author: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Annotate a passage of a page
    Annotate {
        url: String,
        /// The selected text
        exact: String,
        comment: String,
        /// Plain-text copy of the page, used to capture context around the selection
        #[arg(long)]
        page: Option<PathBuf>,
        #[arg(long)]
        color: Option<String>,
    },
    /// List annotations for a page, including remote ones from an index file
    List {
        url: String,
        /// JSON array of annotations standing in for the search service
        #[arg(long)]
        index: Option<PathBuf>,
    },
    /// Delete an annotation
    Delete { url: String, id: String },
    /// Save the drawing for a page
    Draw {
        url: String,
        /// PNG file holding the drawing
        #[arg(required = true)]
        file: PathBuf,
    },
    /// Show pending sync counts
    Status,
    /// Sync every pending item now
    Sync,
    /// Run the periodic reconciler until interrupted
    Reconcile {
        /// Override the configured interval, in seconds
        #[arg(long)]
        interval: Option<u64>,
    },
    /// Locate a quote in a plain-text page
    Resolve {
        page: PathBuf,
        exact: String,
        #[arg(long, default_value = "")]
        prefix: String,
        #[arg(long, default_value = "")]
        suffix: String,
    },
    /// Show local storage usage
    Quota,
}

fn load_config(cli: &Cli) -> Result<Config, String> {
    let path = cli.config.clone().unwrap_or_else(default_config_path);
    let mut config = Config::load(&path).map_err(|e| format!("Failed to load {}: {}", path.display(), e))?;
    if let Some(db) = &cli.db {
        config.storage.db_path = Some(db.clone());
    }
    Ok(config)
}

fn default_remote_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pagenote")
        .join("remote")
}

fn load_index(path: Option<&Path>) -> Result<StaticSearch, String> {
    let Some(path) = path else {
        return Ok(StaticSearch::empty());
    };
    let text = std::fs::read_to_string(path).map_err(|e| format!("cannot read '{}': {}", path.display(), e))?;
    let annotations: Vec<Annotation> =
        serde_json::from_str(&text).map_err(|e| format!("invalid index '{}': {}", path.display(), e))?;
    Ok(StaticSearch::new(annotations))
}

fn open_runtime(cli: &Cli, config: Config, search: Arc<dyn SearchService>) -> Result<Runtime, String> {
    let remote_dir = cli.remote_dir.clone().unwrap_or_else(default_remote_dir);
    let identity: Arc<dyn IdentityProvider> = match &cli.author {
        Some(author) => Arc::new(StaticIdentity::signed_in(author.clone())),
        None => Arc::new(StaticIdentity::signed_out()),
    };
    Runtime::open(config, Arc::new(DirRemote::new(remote_dir)), identity, search)
        .map_err(|e| format!("Failed to open database: {}", e))
}

/// Quote for `exact`, with context from `page` when given
fn capture_quote(exact: &str, page: Option<&Path>, config: &Config) -> Result<QuoteAnchor, String> {
    let Some(page) = page else {
        return Ok(QuoteAnchor::new("", exact, ""));
    };
    let text = std::fs::read_to_string(page).map_err(|e| format!("cannot read '{}': {}", page.display(), e))?;
    let start = text
        .find(exact)
        .ok_or_else(|| format!("'{}' does not occur in '{}'", exact, page.display()))?;
    compute_quote(&text, TextRange::new(start, start + exact.len()), config.anchor.quote_options())
        .map_err(|e| e.to_string())
}

async fn cmd_annotate(
    runtime: &Runtime,
    url: String,
    exact: String,
    comment: String,
    page: Option<PathBuf>,
    color: Option<String>,
) -> i32 {
    let quote = match capture_quote(&exact, page.as_deref(), &runtime.config) {
        Ok(q) => q,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let mut input = NewAnnotation::new(url, exact, comment, quote);
    if let Some(color) = color {
        input = input.with_color(color);
    }
    match runtime.coordinator.create_annotation(input).await {
        Ok(outcome) => {
            println!("Saved annotation {}", outcome.item.id);
            print_sync_state(&outcome.sync);
            0
        }
        Err(e) if e.is_quota() => {
            eprintln!("Error: local storage is full: {}", e);
            2
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn print_sync_state(state: &SyncState) {
    match state {
        SyncState::Synced(remote_ref) => println!("Synced as {}", remote_ref),
        SyncState::Pending { warning } => eprintln!("Warning: {}", warning),
        SyncState::LocalOnly => println!("Saved locally only (signed out)"),
    }
}

async fn cmd_list(runtime: &Runtime, url: &str) -> i32 {
    let annotations = match runtime.coordinator.annotations_for_url(url).await {
        Ok(a) => a,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    if annotations.is_empty() {
        println!("No annotations for {}.", url);
        return 0;
    }
    println!("{:<36}  {:<7}  {:<24}  {}", "ID", "SYNCED", "TEXT", "COMMENT");
    println!("{}", "-".repeat(96));
    for a in annotations {
        let text: String = a.selected_text.chars().take(24).collect();
        println!(
            "{:<36}  {:<7}  {:<24}  {}",
            a.id.as_str(),
            if a.is_synced() { "yes" } else { "no" },
            text,
            a.comment
        );
    }
    0
}

async fn cmd_delete(runtime: &Runtime, url: &str, id: &str) -> i32 {
    match runtime.coordinator.delete_annotation(url, &ItemId::from_string(id)).await {
        Ok(true) => {
            println!("Deleted annotation {}", id);
            0
        }
        Ok(false) => {
            eprintln!("Error: annotation '{}' not found", id);
            1
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

async fn cmd_draw(runtime: &Runtime, url: String, file: &Path) -> i32 {
    let bytes = match std::fs::read(file) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("Error: cannot read '{}': {}", file.display(), e);
            return 1;
        }
    };
    let canvas_data = format!("data:image/png;base64,{}", BASE64.encode(&bytes));
    match runtime.coordinator.save_drawing(NewDrawing::new(url, canvas_data)).await {
        Ok(outcome) => {
            println!("Saved drawing {} ({} bytes)", outcome.item.id, bytes.len());
            print_sync_state(&outcome.sync);
            0
        }
        Err(e) if e.is_quota() => {
            eprintln!("Error: local storage is full: {}", e);
            2
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

async fn cmd_status(runtime: &Runtime) -> i32 {
    match runtime.coordinator.sync_status().await {
        Ok(status) => {
            println!("Pending annotations: {}", status.pending_annotations);
            println!("Pending drawings:    {}", status.pending_drawings);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

async fn cmd_sync(runtime: &Runtime) -> i32 {
    match runtime.coordinator.sync_now().await {
        Ok(result) => {
            println!(
                "Synced {} annotation(s) and {} drawing(s)",
                result.annotations_synced, result.drawings_synced
            );
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

async fn cmd_reconcile(runtime: &Runtime) -> i32 {
    let reconciler = runtime.reconciler();
    println!("Reconciling every {}s, Ctrl-C to stop", reconciler.interval().as_secs());
    let mut handle = reconciler.spawn();
    loop {
        tokio::select! {
            outcome = handle.next_outcome() => match outcome {
                Some(TickOutcome::Synced(r)) => println!(
                    "Synced {} annotation(s) and {} drawing(s)",
                    r.annotations_synced, r.drawings_synced
                ),
                Some(TickOutcome::Failed(reason)) => eprintln!("Warning: {}", reason),
                Some(_) => {}
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    handle.stop().await;
    0
}

fn cmd_resolve(page: &Path, exact: String, prefix: String, suffix: String) -> i32 {
    let text = match std::fs::read_to_string(page) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Error: cannot read '{}': {}", page.display(), e);
            return 1;
        }
    };
    let doc = Document::from_text(text);
    let quote = QuoteAnchor::new(prefix, exact, suffix);
    match resolve_quote(&quote, doc.plain_text()) {
        Some(range) => {
            println!("Found at bytes {}..{}: {}", range.start, range.end, range.slice(doc.plain_text()));
            0
        }
        None => {
            println!("Not found");
            1
        }
    }
}

fn cmd_quota(runtime: &Runtime) -> i32 {
    match runtime.coordinator.quota() {
        Ok(q) => {
            println!(
                "{} of {} bytes used ({:.1}%)",
                q.used_bytes, q.total_bytes, q.percent_used
            );
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

async fn run_command(runtime: &Runtime, command: Commands) -> i32 {
    match command {
        Commands::Annotate { url, exact, comment, page, color } => {
            cmd_annotate(runtime, url, exact, comment, page, color).await
        }
        Commands::List { url, .. } => cmd_list(runtime, &url).await,
        Commands::Delete { url, id } => cmd_delete(runtime, &url, &id).await,
        Commands::Draw { url, file } => cmd_draw(runtime, url, &file).await,
        Commands::Status => cmd_status(runtime).await,
        Commands::Sync => cmd_sync(runtime).await,
        Commands::Reconcile { .. } => cmd_reconcile(runtime).await,
        Commands::Quota => cmd_quota(runtime),
        Commands::Resolve { page, exact, prefix, suffix } => cmd_resolve(&page, exact, prefix, suffix),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let mut config = match load_config(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    pagenote::logging::init(config.log_filter());

    // resolving a quote needs no storage
    if let Commands::Resolve { page, exact, prefix, suffix } = &cli.command {
        std::process::exit(cmd_resolve(page, exact.clone(), prefix.clone(), suffix.clone()));
    }
    if let Commands::Reconcile { interval: Some(secs) } = &cli.command {
        config.sync.reconcile_interval_secs = *secs;
    }

    let index = match &cli.command {
        Commands::List { index, .. } => index.as_deref(),
        _ => None,
    };
    let search = match load_index(index) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    let runtime = match open_runtime(&cli, config, search) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let code = run_command(&runtime, cli.command).await;
    runtime.shutdown().await;
    std::process::exit(code);
}
