use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use pkgaudit::{
    audit::{audit, AuditOptions},
    cache::CorpusCache,
    config::Config,
    corpus::{CorpusStore, FileFeed, IngestReport, NvdApiFeed},
    inventory::Inventory,
    model::{RepositoryKind, Severity},
    report::{exit_code, exit_codes, format_report_to_string, print_report, OutputFormat, Verbosity},
    scanner::{all_adapters, Adapter},
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;
use std::time::Duration;

/// Upper bound on one feed refresh, all pages included.
const FEED_FETCH_TIMEOUT: Duration = Duration::from_secs(6 * 3600);

#[derive(Parser)]
#[command(name = "pkgaudit")]
#[command(
    author,
    version,
    about = "Audit installed system packages against known CVEs"
)]
struct Cli {
    /// Increase detail: -v adds ranges, -vv descriptions, -vvv info logs, -vvvv debug logs
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan installed packages for known vulnerabilities
    Scan {
        /// Package managers to scan (apt, pip, snap, docker, homebrew, pacman)
        #[arg(short, long, value_delimiter = ',')]
        repository: Vec<String>,

        /// Output format (table, json)
        #[arg(short, long)]
        format: Option<String>,

        /// Only report vulnerabilities at or above this severity
        #[arg(long, value_enum)]
        min_severity: Option<SeverityLevel>,

        /// Never contact the feed; use the cached corpus as is
        #[arg(long)]
        offline: bool,

        /// Additional local feed documents to match against
        #[arg(long)]
        feed_file: Vec<PathBuf>,

        /// Write output to file
        #[arg(short, long)]
        output: Option<String>,

        /// Exit with error if vulnerabilities at or above this severity are found
        #[arg(long, value_enum)]
        fail_on: Option<SeverityLevel>,
    },

    /// Refresh the cached CVE corpus from the NVD
    Update {
        /// Fetch every CVE instead of only those modified since the last update
        #[arg(long)]
        full: bool,
    },

    /// Merge local feed documents into the cached corpus
    Import {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Show the CVEs recorded for a package
    Lookup {
        name: String,

        /// Package manager the package comes from (default: ranges for every manager)
        #[arg(short, long)]
        repository: Option<String>,
    },

    /// List supported package managers
    ListRepositories,

    /// Show or create config file
    Config {
        /// Generate default config file
        #[arg(long)]
        init: bool,

        /// Show config file path
        #[arg(long)]
        path: bool,
    },

    /// Remove the cached CVE corpus
    ClearCache,
}

#[derive(Clone, Copy, ValueEnum)]
enum SeverityLevel {
    Critical,
    High,
    Medium,
    Low,
}

impl From<SeverityLevel> for Severity {
    fn from(level: SeverityLevel) -> Self {
        match level {
            SeverityLevel::Critical => Severity::Critical,
            SeverityLevel::High => Severity::High,
            SeverityLevel::Medium => Severity::Medium,
            SeverityLevel::Low => Severity::Low,
        }
    }
}

struct ScanArgs {
    repositories: Vec<String>,
    format: Option<String>,
    min_severity: Option<SeverityLevel>,
    offline: bool,
    feed_files: Vec<PathBuf>,
    output: Option<String>,
    fail_on: Option<SeverityLevel>,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_codes::ERROR)
        }
    }
}

async fn run() -> Result<u8> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let config = Config::load()?;

    match cli.command {
        Commands::Scan {
            repository,
            format,
            min_severity,
            offline,
            feed_file,
            output,
            fail_on,
        } => {
            let args = ScanArgs {
                repositories: repository,
                format,
                min_severity,
                offline,
                feed_files: feed_file,
                output,
                fail_on,
            };
            run_scan(&config, args, cli.verbose).await
        }
        Commands::Update { full } => run_update(&config, full).await,
        Commands::Import { files } => run_import(&config, files).await,
        Commands::Lookup { name, repository } => run_lookup(&config, &name, repository.as_deref()),
        Commands::ListRepositories => {
            list_repositories();
            Ok(exit_codes::SUCCESS)
        }
        Commands::Config { init, path } => {
            handle_config(init, path)?;
            Ok(exit_codes::SUCCESS)
        }
        Commands::ClearCache => {
            let cache = CorpusCache::new();
            if cache.clear()? {
                println!("Cache cleared.");
            } else {
                println!("Cache was already empty.");
            }
            Ok(exit_codes::SUCCESS)
        }
    }
}

/// Logs go to stderr so JSON on stdout stays parseable. `RUST_LOG`
/// overrides the `-v` derived level.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0..=2 => "warn",
        3 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("warn,pkgaudit={}", level))),
        )
        .init();
}

async fn run_scan(config: &Config, args: ScanArgs, verbose: u8) -> Result<u8> {
    let format_str = args.format.unwrap_or_else(|| config.default_format.clone());
    let format = OutputFormat::from_str(&format_str).map_err(|e| anyhow::anyhow!(e))?;
    let is_interactive = format == OutputFormat::Table && args.output.is_none();

    let mut options = AuditOptions::from_config(config);
    if let Some(level) = args.min_severity {
        options.min_severity = level.into();
    }
    if verbose > 0 {
        options.verbosity = Verbosity::from_level(verbose);
    }

    let adapters = select_adapters(config, &args.repositories)?;

    let cache = CorpusCache::with_ttl_hours(config.feed.refresh_ttl_hours);
    let store = load_store(config, &cache)?;

    if !args.offline && config.feed.auto_update && cache.is_stale() {
        let pb = spinner(is_interactive, "Refreshing vulnerability corpus...");
        let report = refresh(config, &store, false).await?;
        finish(pb, &ingest_message(&report));
        if report.is_failure() {
            eprintln!("Warning: corpus refresh failed, using cached data");
        } else {
            cache.save(&store)?;
        }
    }

    let mut feed_files = config.feed.files.clone();
    feed_files.extend(args.feed_files);
    if !feed_files.is_empty() {
        let report = store
            .ingest_from(&FileFeed::new(feed_files), FEED_FETCH_TIMEOUT)
            .await;
        if let Some(reason) = report.failure {
            anyhow::bail!("Failed to read feed files: {}", reason);
        }
    }

    let pb = spinner(is_interactive, "Collecting installed packages...");
    let (inventory, inventory_summary) = Inventory::collect(&adapters, config.adapter_timeout()).await;
    finish(pb, &format!("Found {} packages", inventory.len()));

    let snapshot = store.snapshot();
    let pb = spinner(is_interactive, "Matching against CVE corpus...");
    let report = audit(inventory, &inventory_summary, &snapshot, &options)?;
    finish(pb, &format!("Found {} vulnerabilities", report.entries.len()));

    if let Some(path) = args.output {
        let rendered = format_report_to_string(&report, format)?;
        std::fs::write(&path, rendered).with_context(|| format!("Failed to write {}", path))?;
        println!("Results written to: {}", path);
    } else {
        print_report(&report, format)?;
    }

    Ok(exit_code(&report.entries, args.fail_on.map(Severity::from)))
}

fn select_adapters(config: &Config, requested: &[String]) -> Result<Vec<Adapter>> {
    let kinds: Vec<RepositoryKind> = if requested.is_empty() {
        config.repositories.clone()
    } else {
        requested
            .iter()
            .map(|name| RepositoryKind::from_str(name).map_err(|e| anyhow::anyhow!(e)))
            .collect::<Result<_>>()?
    };

    Ok(kinds
        .into_iter()
        .filter_map(Adapter::for_kind)
        .filter(|adapter| adapter.is_supported())
        .collect())
}

fn load_store(config: &Config, cache: &CorpusCache) -> Result<CorpusStore> {
    Ok(cache
        .load(config.alias_table())?
        .unwrap_or_else(|| CorpusStore::with_aliases(config.alias_table())))
}

/// Fetches from the NVD into `store`. Without `full`, only CVEs modified
/// since the newest cached record are requested.
async fn refresh(config: &Config, store: &CorpusStore, full: bool) -> Result<IngestReport> {
    let mut feed = NvdApiFeed::new(
        config.feed.api_url.clone(),
        config.feed.resolved_api_key(),
        config.feed.timeout(),
    )?
    .with_results_per_page(config.feed.results_per_page);

    if !full {
        if let Some(since) = store.snapshot().latest_modification() {
            feed = feed.modified_between(since, Utc::now());
        }
    }

    Ok(store.ingest_from(&feed, FEED_FETCH_TIMEOUT).await)
}

async fn run_update(config: &Config, full: bool) -> Result<u8> {
    let cache = CorpusCache::with_ttl_hours(config.feed.refresh_ttl_hours);
    let store = load_store(config, &cache)?;

    let pb = spinner(true, "Fetching CVEs from the NVD...");
    let report = refresh(config, &store, full).await?;
    finish(pb, &ingest_message(&report));

    if let Some(reason) = report.failure {
        eprintln!("Update failed: {}", reason);
        return Ok(exit_codes::ERROR);
    }

    cache.save(&store)?;
    println!("Corpus now holds {} CVE records ({})", store.len(), cache.path().display());
    Ok(exit_codes::SUCCESS)
}

async fn run_import(config: &Config, files: Vec<PathBuf>) -> Result<u8> {
    let cache = CorpusCache::with_ttl_hours(config.feed.refresh_ttl_hours);
    let store = load_store(config, &cache)?;

    let report = store
        .ingest_from(&FileFeed::new(files), FEED_FETCH_TIMEOUT)
        .await;
    println!("{}", ingest_message(&report));

    if report.is_failure() {
        return Ok(exit_codes::ERROR);
    }

    cache.save(&store)?;
    Ok(exit_codes::SUCCESS)
}

fn ingest_message(report: &IngestReport) -> String {
    match &report.failure {
        Some(reason) => format!("Feed rejected: {}", reason),
        None => format!(
            "Merged {} CVE records ({} replaced, {} skipped)",
            report.merged, report.replaced, report.skipped
        ),
    }
}

fn run_lookup(config: &Config, name: &str, repository: Option<&str>) -> Result<u8> {
    let kind = repository
        .map(|r| RepositoryKind::from_str(r).map_err(|e| anyhow::anyhow!(e)))
        .transpose()?;

    let cache = CorpusCache::new();
    let Some(store) = cache.load(config.alias_table())? else {
        eprintln!("No cached corpus. Run 'pkgaudit update' or 'pkgaudit import' first.");
        return Ok(exit_codes::ERROR);
    };

    let snapshot = store.snapshot();
    let records = snapshot.lookup_in(name, kind);
    if records.is_empty() {
        println!("No CVEs recorded for {}.", name);
        return Ok(exit_codes::SUCCESS);
    }

    println!("{} CVEs recorded for {}:", records.len(), name);
    println!();
    for record in records {
        println!("  {:<18} {:<9} {}", record.cve_id, record.severity, record.published_at.format("%Y-%m-%d"));
        for (_, range) in snapshot.ranges_in(record, name, kind) {
            match range.repository_hint {
                Some(hint) if kind.is_none() => println!(
                    "  {:<18} {} ({}): {}",
                    "",
                    range.product,
                    hint.display_name(),
                    range.describe()
                ),
                _ => println!("  {:<18} {}: {}", "", range.product, range.describe()),
            }
        }
    }

    Ok(exit_codes::SUCCESS)
}

fn list_repositories() {
    println!("Available repositories:");
    println!();

    for adapter in all_adapters() {
        let supported = if adapter.is_supported() { "yes" } else { "no" };
        let installed = if adapter.locate().is_some() { "yes" } else { "no" };

        println!(
            "  {:<12} {:<16} [supported: {}, installed: {}]",
            adapter.kind().as_str().to_lowercase(),
            adapter.name(),
            supported,
            installed
        );
        for command in adapter.commands() {
            println!("  {:<12} Command: {}", "", command);
        }
        println!();
    }
}

fn handle_config(init: bool, show_path: bool) -> Result<()> {
    let config_path = Config::config_path();

    if show_path {
        println!("{}", config_path.display());
        return Ok(());
    }

    if init {
        if config_path.exists() {
            println!("Config file already exists at: {}", config_path.display());
            return Ok(());
        }

        let config = Config::default();
        config.save()?;
        println!("Created config file at: {}", config_path.display());
        println!();
        println!("Default configuration:");
        println!("{}", Config::generate_default_config());
        return Ok(());
    }

    if config_path.exists() {
        let content = std::fs::read_to_string(&config_path)?;
        println!("Config file: {}", config_path.display());
        println!();
        println!("{}", content);
    } else {
        println!("No config file found.");
        println!("Run 'pkgaudit config --init' to create one.");
        println!();
        println!("Config path: {}", config_path.display());
    }

    Ok(())
}

fn spinner(enabled: bool, message: &str) -> Option<ProgressBar> {
    if !enabled {
        return None;
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message(message.to_string());
    Some(pb)
}

fn finish(pb: Option<ProgressBar>, message: &str) {
    if let Some(pb) = pb {
        pb.finish_with_message(message.to_string());
    }
}
