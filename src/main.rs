use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use dirtrace_rs::backend::{HttpBackend, ReplayBackend, ScanBackend};
use dirtrace_rs::classify::{view, Category, SortDirection, SortKey, SortState, Summary};
use dirtrace_rs::dictionary::{self, Dictionary};
use dirtrace_rs::report::ReportDocument;
use dirtrace_rs::server::{self, AppState};
use dirtrace_rs::session::{ScanController, ScanInput, SessionState};
use dirtrace_rs::types::{Credentials, Finding, ScanMode};

/// Command line front end for directory discovery scans.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "dirtrace-rs",
    version,
    about = "Directory discovery scans driven through a scanning backend, with merged results and JSON reports.",
    long_about = None
)]
struct Cli {
    /// Target URLs or hosts, comma separated.
    #[arg(long, value_delimiter = ',')]
    targets: Vec<String>,

    /// File with one target per line.
    #[arg(long = "targets-file")]
    targets_file: Option<PathBuf>,

    /// Base URL of the scanning backend.
    #[arg(long = "backend-url", default_value = "http://localhost:8000")]
    backend_url: String,

    /// Backend request timeout in seconds.
    #[arg(long = "timeout-secs", default_value_t = 600)]
    timeout_secs: u64,

    /// Replay a recorded backend payload (JSON) instead of calling the backend.
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Dictionary file used as baseline (one path per line). Built-in list if omitted.
    #[arg(long)]
    dictionary: Option<PathBuf>,

    /// Start from an empty dictionary instead of the baseline.
    #[arg(long = "no-baseline", default_value_t = false)]
    no_baseline: bool,

    /// Extra dictionary paths to add.
    #[arg(long = "add", value_delimiter = ',')]
    add: Vec<String>,

    /// Dictionary paths to remove.
    #[arg(long = "remove", value_delimiter = ',')]
    remove: Vec<String>,

    /// URLs or prefixes the backend must not touch.
    #[arg(long = "exclude", value_delimiter = ',')]
    exclude: Vec<String>,

    /// Maximum crawl depth.
    #[arg(long = "max-depth", default_value_t = 2)]
    max_depth: u32,

    /// Do not honour robots.txt.
    #[arg(long = "ignore-robots", default_value_t = false)]
    ignore_robots: bool,

    /// Scan mode: normal or darkweb.
    #[arg(long, default_value = "normal")]
    mode: ScanMode,

    /// Session cookie string (`name=value; other=value`).
    #[arg(long)]
    cookies: Option<String>,

    #[arg(long)]
    username: Option<String>,

    #[arg(long)]
    password: Option<String>,

    /// Result filter: successful, api, directories, all, excluded, errors.
    #[arg(long, default_value = "successful")]
    filter: Category,

    /// Sort key: url, status, length, listing, source.
    #[arg(long)]
    sort: Option<SortKey>,

    /// Sort descending.
    #[arg(long, default_value_t = false)]
    desc: bool,

    /// Write the JSON report to this path (optional).
    #[arg(long)]
    output: Option<PathBuf>,

    /// Start the embedded HTTP UI server.
    #[arg(long = "serve-ui", default_value_t = false)]
    serve_ui: bool,

    /// Bind address for the UI server.
    #[arg(long, default_value = "127.0.0.1:8080")]
    bind: String,

    /// Directory with static UI files.
    #[arg(long = "ui-dir", default_value = "ui")]
    ui_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    let dictionary = build_dictionary(&cli);
    let backend: Arc<dyn ScanBackend> = match &cli.replay {
        Some(path) => Arc::new(ReplayBackend::from_path(path)?),
        None => Arc::new(
            HttpBackend::new(cli.backend_url.clone(), Duration::from_secs(cli.timeout_secs))
                .context("failed to build HTTP client")?,
        ),
    };

    let mut targets = cli.targets.clone();
    if let Some(path) = &cli.targets_file {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read targets file: {}", path.display()))?;
        targets.extend(content.lines().map(str::to_string));
    }

    println!("dirtrace-rs configuration:");
    println!("  targets      : {}", if targets.is_empty() { "<none>".to_string() } else { targets.join(", ") });
    println!(
        "  backend      : {}",
        cli.replay
            .as_ref()
            .map(|p| format!("replay {}", p.display()))
            .unwrap_or_else(|| cli.backend_url.clone())
    );
    println!("  mode         : {}", cli.mode.as_str());
    println!("  dictionary   : {} paths (baseline: {})", dictionary.paths().len(), dictionary.use_baseline());
    println!("  max_depth    : {}", cli.max_depth);
    println!("  robots.txt   : {}", if cli.ignore_robots { "ignored" } else { "respected" });
    println!(
        "  output       : {}",
        cli.output
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<none>".to_string())
    );
    println!("  serve_ui     : {}", cli.serve_ui);

    // Start embedded UI server if requested (non-blocking background task)
    if cli.serve_ui {
        let state = AppState::new(backend.clone(), dictionary.clone());
        let bind = cli.bind.clone();
        let ui_dir = cli.ui_dir.clone();
        tokio::spawn(async move {
            if let Err(e) = server::spawn_server(&bind, state, ui_dir).await {
                eprintln!("HTTP UI server error: {e}");
            }
        });
        println!("UI server starting at http://{} (Ctrl+C to stop)", cli.bind);
    }

    if !targets.is_empty() {
        run_scan(&cli, targets, dictionary, backend.as_ref()).await?;
    } else if !cli.serve_ui {
        bail!("no targets given (use --targets or --targets-file)");
    }

    // If UI is running, keep the process alive until Ctrl+C.
    if cli.serve_ui {
        println!("Press Ctrl+C to stop the server...");
        let _ = tokio::signal::ctrl_c().await;
    }

    Ok(())
}

fn build_dictionary(cli: &Cli) -> Dictionary {
    let baseline = match &cli.dictionary {
        Some(path) => match dictionary::load_paths_from_path(path) {
            Ok(paths) if !paths.is_empty() => paths,
            Ok(_) => {
                warn!(path = %path.display(), "dictionary file is empty, using built-in list");
                dictionary::default_paths()
            }
            Err(e) => {
                warn!(error = %format!("{e:#}"), "using built-in dictionary");
                dictionary::default_paths()
            }
        },
        None => dictionary::default_paths(),
    };
    let mut dict = Dictionary::new(baseline);
    if cli.no_baseline {
        dict.set_use_baseline(false);
    }
    for raw in &cli.add {
        if let Err(e) = dict.add_path(raw) {
            warn!(error = %e, "skipping dictionary path");
        }
    }
    for raw in &cli.remove {
        if !dict.remove_path(raw) {
            warn!(path = %raw, "path not in dictionary, nothing removed");
        }
    }
    dict
}

async fn run_scan(cli: &Cli, targets: Vec<String>, dictionary: Dictionary, backend: &dyn ScanBackend) -> Result<()> {
    let input = ScanInput {
        targets,
        mode: cli.mode,
        exclusions: cli.exclude.clone(),
        max_depth: cli.max_depth,
        respect_robots: !cli.ignore_robots,
        credentials: Credentials::from_parts(cli.username.clone(), cli.password.clone(), cli.cookies.clone()),
        dictionary,
    };

    // Ctrl-C cancels the scan.
    let cancel = CancellationToken::new();
    let cancel_ctrlc = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        cancel_ctrlc.cancel();
    });

    let mut controller = ScanController::new();
    println!("\nRunning scan...");
    controller.start_with_cancel(input, backend, cancel).await?;

    if let SessionState::Failed(msg) = controller.state() {
        eprintln!("Scan failed: {msg}");
    }
    if let Some(summary) = controller.summary() {
        print_summary(&summary);
    }
    let sort = cli.sort.map(|key| SortState {
        key,
        direction: if cli.desc { SortDirection::Descending } else { SortDirection::Ascending },
    });
    let rows = view(controller.findings(), cli.filter, sort);
    print_results_table(cli.filter, &rows);

    if let Some(path) = cli.output.as_deref() {
        let report = controller.report()?;
        if let Err(e) = write_report_json(path, &report) {
            eprintln!("Failed to write JSON to {}: {}", path.display(), e);
        } else {
            println!("Wrote JSON report to {}", path.display());
        }
    }

    controller.session().outcome()?;
    Ok(())
}

fn print_summary(s: &Summary) {
    println!("\nScan summary:");
    println!("  targets scanned   : {}", s.targets);
    println!("  paths checked     : {}", s.total_paths);
    println!("  directories found : {}", s.successful_paths);
    println!("  api endpoints     : {}", s.api_endpoints_found);
    println!("  duration          : {}s", s.duration_display());
}

fn print_results_table(filter: Category, rows: &[&Finding]) {
    let mut url_w = "url".len();
    let mut source_w = "source".len();
    for f in rows {
        url_w = url_w.max(f.url.len().min(80));
        source_w = source_w.max(f.source.display_name().len());
    }
    let status_w = "NO_RESPONSE_OR_ERROR".len();
    let len_w = "length".len().max(8);
    let listing_w = "listing".len();

    println!("\nResults [{}]: {}", filter, rows.len());
    println!(
        "{:<url_w$}  {:<status_w$}  {:>len_w$}  {:<listing_w$}  {:<source_w$}",
        "url",
        "status",
        "length",
        "listing",
        "source",
        url_w = url_w,
        status_w = status_w,
        len_w = len_w,
        listing_w = listing_w,
        source_w = source_w
    );
    println!(
        "{:-<url_w$}  {:-<status_w$}  {:-<len_w$}  {:-<listing_w$}  {:-<source_w$}",
        "",
        "",
        "",
        "",
        "",
        url_w = url_w,
        status_w = status_w,
        len_w = len_w,
        listing_w = listing_w,
        source_w = source_w
    );
    for f in rows {
        let url: String = f.url.chars().take(80).collect();
        println!(
            "{:<url_w$}  {:<status_w$}  {:>len_w$}  {:<listing_w$}  {:<source_w$}",
            url,
            f.status.to_string(),
            f.content_length,
            if f.listing_exposed { "yes" } else { "no" },
            f.source.display_name(),
            url_w = url_w,
            status_w = status_w,
            len_w = len_w,
            listing_w = listing_w,
            source_w = source_w
        );
    }
}

fn write_report_json(path: &Path, report: &ReportDocument) -> anyhow::Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, report)?;
    Ok(())
}
