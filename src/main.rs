//! OFS Vanisher - keep out-of-scope traffic out of proxy history
//!
//! Command line front end over the ignore list, the scope file and the
//! response hook.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use url::Url;

use ofs_vanisher::app::{Config, OperationReport, Vanisher, BANNER};
use ofs_vanisher::entry::{url_base_of, EntryKind};
use ofs_vanisher::http::{Exchange, HttpService, RawHttpAnalyzer};
use ofs_vanisher::proxy::{self, HookOutcome};
use ofs_vanisher::scope::ScopeEngine;
use ofs_vanisher::settings::FileSettingsStore;
use ofs_vanisher::{UserHint, VanisherError};

/// Hide out-of-scope hosts, URLs and patterns from proxy history
#[derive(Parser, Debug)]
#[command(name = "ofs-vanisher")]
#[command(author, version, about = "Hide out-of-scope traffic from proxy history", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "OFS_VANISHER_CONFIG")]
    config: Option<String>,

    /// Settings file holding the ignore list
    #[arg(long, env = "OFS_VANISHER_SETTINGS")]
    settings: Option<PathBuf>,

    /// Scope file exclusions are written to
    #[arg(long, env = "OFS_VANISHER_SCOPE")]
    scope: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "OFS_VANISHER_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log file path (enables file logging)
    #[arg(long, env = "OFS_VANISHER_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Enable JSON structured logging
    #[arg(long, env = "OFS_VANISHER_LOG_JSON")]
    log_json: bool,

    /// Generate default configuration and exit
    #[arg(long)]
    generate_config: bool,

    /// Validate configuration and exit
    #[arg(long)]
    validate_config: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the ignore list
    List,

    /// Add entries: a host, an http(s) URL, or a regex starting with ^
    Add {
        #[arg(required = true)]
        entries: Vec<String>,
    },

    /// Replace the entry at a position
    Edit { index: usize, entry: String },

    /// Remove entries by position (scope excludes stay)
    Remove {
        #[arg(required = true)]
        indices: Vec<usize>,
    },

    /// Exclude entries from scope again; all entries when none are given
    Exclude { indices: Vec<usize> },

    /// Remove every entry (scope excludes stay)
    Clear {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },

    /// Re-exclude the whole list from scope and save it
    Sync,

    /// Tell whether a URL would be vanished
    Check { url: String },

    /// Run a raw HTTP response through the hook as if fetched from a URL
    Rewrite {
        url: String,
        /// Raw response file ("-" for stdin)
        input: PathBuf,
        /// Where to write the result (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Mark every ignored exchange of a HAR archive
    Replay {
        input: PathBuf,
        /// Where to write the marked archive (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Handle special commands first
    if cli.generate_config {
        return generate_default_config();
    }

    let config = load_config(&cli)?;
    init_logging(&config)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting OFS Vanisher");

    if cli.validate_config {
        tracing::info!("Configuration is valid");
        return Ok(());
    }

    run(cli.command.unwrap_or(Command::List), &config).await
}

/// Initialize the logging system. Console output goes to stderr so command
/// output on stdout stays clean.
fn init_logging(config: &Config) -> Result<()> {
    let logging = &config.logging;
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let subscriber = tracing_subscriber::registry().with(env_filter);

    if let Some(log_path) = &logging.file {
        // File-based logging with rotation
        let dir = match log_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(dir) => dir.to_path_buf(),
            None => Config::data_dir()
                .map(|d| d.join("logs"))
                .unwrap_or_else(|_| PathBuf::from(".")),
        };
        std::fs::create_dir_all(&dir).ok();
        let filename = log_path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("ofs-vanisher.log");
        let file_appender = RollingFileAppender::new(Rotation::DAILY, dir, filename);

        if logging.json {
            let file_layer = fmt::layer()
                .json()
                .with_writer(file_appender)
                .with_ansi(false);
            subscriber.with(file_layer).init();
        } else {
            let file_layer = fmt::layer().with_writer(file_appender).with_ansi(false);
            subscriber.with(file_layer).init();
        }
    } else if logging.json {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber.with(fmt::layer().with_writer(std::io::stderr)).init();
    }

    Ok(())
}

/// Load configuration with CLI overrides
fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load(cli.config.as_deref())?;

    if let Some(settings) = &cli.settings {
        config.general.settings_file = Some(settings.clone());
    }
    if let Some(scope) = &cli.scope {
        config.general.scope_file = Some(scope.clone());
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if let Some(file) = &cli.log_file {
        config.logging.file = Some(file.clone());
    }
    config.logging.json |= cli.log_json;

    config.validate().map_err(|e| user_error(e.into()))?;
    Ok(config)
}

/// Generate default configuration file
fn generate_default_config() -> Result<()> {
    println!("{}", Config::default().to_toml()?);
    Ok(())
}

async fn run(command: Command, config: &Config) -> Result<()> {
    let settings = Arc::new(FileSettingsStore::new(config.settings_path()?));
    let scope = Arc::new(
        ScopeEngine::open(config.scope_path()?).map_err(|e| user_error(e.into()))?,
    );

    eprintln!("{}", BANNER);
    let (vanisher, startup) = Vanisher::start(settings, scope.clone(), Arc::new(RawHttpAnalyzer));
    if let Some(e) = &startup.load_error {
        eprintln!("Warning: {}\n{}", e, e.user_hint());
    }

    match command {
        Command::List => {
            let entries = vanisher.entries();
            if entries.is_empty() {
                println!("No entries.");
            }
            for (index, entry) in entries.iter().enumerate() {
                println!("{:>4}  {:<5}  {}", index, entry.kind_label(), entry);
                if let EntryKind::Regex(pattern) = entry.kind() {
                    if let Some(e) = pattern.error() {
                        println!("      never matches: {}", e);
                    }
                }
            }
        }
        Command::Add { entries } => {
            let mut combined = OperationReport::default();
            for raw in &entries {
                let report = vanisher
                    .add_entry(raw)
                    .map_err(|e| user_error(e.into()))?;
                merge(&mut combined, report);
            }
            print_report(&combined);
        }
        Command::Edit { index, entry } => {
            let report = vanisher
                .edit_entry(index, &entry)
                .map_err(|e| user_error(e.into()))?;
            print_report(&report);
        }
        Command::Remove { indices } => print_report(&vanisher.remove_entries(&indices)),
        Command::Exclude { indices } => {
            let report = if indices.is_empty() {
                vanisher.exclude_all()
            } else {
                vanisher.exclude_entries(&indices)
            };
            print_report(&report);
        }
        Command::Clear { yes } => {
            if !yes && !confirm("Clear ALL entries? (Scope excludes remain)")? {
                println!("Aborted.");
                return Ok(());
            }
            print_report(&vanisher.clear());
        }
        Command::Sync => {
            println!("{}", startup.summary());
            vanisher.save().map_err(|e| user_error(e.into()))?;
        }
        Command::Check { url } => {
            let parsed = Url::parse(&url).with_context(|| format!("Invalid URL: {}", url))?;
            let host = parsed.host_str().unwrap_or_default();
            let url_base = url_base_of(&parsed);
            let ignored = vanisher.ignore_set().matches(host, &url_base);

            println!("url base:  {}", url_base);
            println!("ignored:   {}", if ignored { "yes" } else { "no" });
            println!("in scope:  {}", if scope.is_in_scope(&url) { "yes" } else { "no" });
        }
        Command::Rewrite { url, input, output } => {
            let parsed = Url::parse(&url).with_context(|| format!("Invalid URL: {}", url))?;
            let mut exchange = exchange_for(&parsed)?;
            exchange.response = Some(read_input(&input)?);

            let outcome = vanisher.hook().process_http_message(false, &mut exchange);
            match &outcome {
                HookOutcome::Rewritten(_) => eprintln!("Response marked as ignored."),
                HookOutcome::Failed(e) => eprintln!(
                    "Matched, but not rewritten. {}",
                    VanisherError::from(e.clone()).user_message()
                ),
                _ => eprintln!("Not ignored, response unchanged."),
            }
            write_output(output.as_deref(), exchange.response.as_deref().unwrap_or_default())?;
        }
        Command::Replay { input, output } => {
            let content = std::fs::read_to_string(&input)
                .with_context(|| format!("Failed to read {:?}", input))?;
            let (marked, report) = proxy::replay(&content, Arc::new(vanisher.hook())).await?;

            eprintln!(
                "{} entries: {} marked, {} unchanged, {} skipped",
                report.total, report.rewritten, report.passed_through, report.skipped
            );
            for url in &report.vanished {
                eprintln!("  {}", url);
            }
            write_output(output.as_deref(), marked.as_bytes())?;
        }
    }

    Ok(())
}

fn user_error(e: VanisherError) -> anyhow::Error {
    anyhow::anyhow!(e.user_message())
}

fn merge(into: &mut OperationReport, report: OperationReport) {
    into.added.extend(report.added);
    into.removed.extend(report.removed);
    into.skipped.extend(report.skipped);
    into.invalid.extend(report.invalid);
    into.sync.merge(report.sync);
    if report.persist_error.is_some() {
        into.persist_error = report.persist_error;
    }
}

fn print_report(report: &OperationReport) {
    println!("{}", report.summary());
}

fn confirm(prompt: &str) -> Result<bool> {
    eprint!("{} [y/N] ", prompt);
    std::io::stderr().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

/// Exchange whose request targets `url`, with no response yet
fn exchange_for(url: &Url) -> Result<Exchange> {
    let host = url.host_str().context("URL has no host")?;
    let port = url.port_or_known_default().context("URL has no port")?;
    let target = match url.query() {
        Some(q) => format!("{}?{}", url.path(), q),
        None => url.path().to_string(),
    };
    let request = format!("GET {} HTTP/1.1\r\nHost: {}\r\n\r\n", target, host);

    Ok(Exchange {
        service: Some(HttpService::new(host, port, url.scheme())),
        request: Some(request.into_bytes()),
        response: None,
    })
}

fn read_input(path: &Path) -> Result<Vec<u8>> {
    if path == Path::new("-") {
        let mut buf = Vec::new();
        std::io::stdin().read_to_end(&mut buf)?;
        return Ok(buf);
    }
    std::fs::read(path).with_context(|| format!("Failed to read {:?}", path))
}

fn write_output(path: Option<&Path>, data: &[u8]) -> Result<()> {
    match path {
        Some(path) => {
            std::fs::write(path, data).with_context(|| format!("Failed to write {:?}", path))
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(data)?;
            stdout.flush()?;
            Ok(())
        }
    }
}
