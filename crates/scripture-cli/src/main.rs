use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use scripture_acquire::{
    clean_tree, discover_build_id, run_fetch, CancelSignal, ContentClient, FetchPolicy,
    HttpTransport, RunContext, RunOptions,
};
use scripture_clean::{export_csv, Cleaner, RuleSet};
use scripture_model::{Canon, RunStatus, VersionConfig};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "scripture")]
#[command(about = "Scripture edition fetching, cleaning, and validation tool")]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("BUILD_HASH"), ")"))]
struct Cli {
    /// Log level: error, warn, info, debug, trace
    #[arg(long, global = true, default_value = "info", value_enum)]
    log_level: LogLevel,

    /// Use UTC timestamps instead of local time
    #[arg(long, global = true)]
    utc: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, clap::ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum Route {
    Bible,
    AudioBible,
}

impl Route {
    fn segment(self) -> &'static str {
        match self {
            Route::Bible => "bible",
            Route::AudioBible => "audio-bible",
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch every chapter of an edition, writing raw and cleaned trees
    Fetch {
        /// Numeric edition id used by the service (e.g., "1" for KJV)
        #[arg(long)]
        version_id: String,

        /// Edition abbreviation used in references and output paths (e.g., "KJV")
        #[arg(long)]
        version_code: String,

        /// Session build id from the site's page source (changes on every deploy)
        #[arg(long, env = "SCRIPTURE_BUILD_ID")]
        build_id: String,

        /// Locale tag for the request path and cleaning profile (e.g., "en-GB")
        #[arg(long)]
        locale: String,

        /// Output root for raw/, cleaned/ and the run report
        #[arg(short = 'O', long)]
        output_dir: PathBuf,

        /// Canon: "protestant", "catholic", "remote" (edition metadata), or a JSON file
        #[arg(long, default_value = "protestant")]
        canon: String,

        /// Restrict to these book codes, e.g. GEN,EXO
        #[arg(long, value_delimiter = ',')]
        books: Vec<String>,

        /// Endpoint route segment
        #[arg(long, value_enum, default_value = "bible")]
        route: Route,

        /// Continue from the saved checkpoint
        #[arg(long)]
        resume: bool,

        /// JSON file of extra cleaning rules
        #[arg(long)]
        rules: Option<PathBuf>,

        /// Chapters fetched concurrently
        #[arg(long, default_value_t = 4)]
        workers: usize,

        /// Minimum milliseconds between requests
        #[arg(long, default_value_t = 800)]
        min_interval_ms: u64,

        /// Per-request timeout in seconds
        #[arg(long, default_value_t = 15)]
        timeout_secs: u64,

        /// Attempts per chapter for transient failures
        #[arg(long, default_value_t = 5)]
        max_attempts: u32,

        /// Consecutive failed chapters before the session is re-checked
        #[arg(long, default_value_t = 8)]
        session_threshold: usize,

        /// Service base URL
        #[arg(long, default_value = scripture_acquire::client::DEFAULT_BASE_URL)]
        base_url: String,

        /// Also write one flat CSV per book under csv/
        #[arg(long)]
        csv: bool,
    },

    /// Rebuild the cleaned tree from raw files already on disk
    Clean {
        #[arg(long)]
        version_code: String,

        #[arg(short = 'O', long)]
        output_dir: PathBuf,

        /// Override the locale recorded in the run manifest
        #[arg(long)]
        locale: Option<String>,

        /// JSON file of extra cleaning rules
        #[arg(long)]
        rules: Option<PathBuf>,

        /// Also write one flat CSV per book under csv/
        #[arg(long)]
        csv: bool,
    },

    /// Read the service's current build id from a reader page
    BuildId {
        /// Page to read; defaults to the edition's first chapter
        #[arg(long, conflicts_with_all = ["version_id", "version_code"])]
        url: Option<String>,

        #[arg(long, required_unless_present = "url", requires = "version_code")]
        version_id: Option<String>,

        #[arg(long, required_unless_present = "url", requires = "version_id")]
        version_code: Option<String>,

        /// Locale sent as Accept-Language
        #[arg(long, default_value = "en-GB")]
        locale: String,

        #[arg(long, value_enum, default_value = "bible")]
        route: Route,

        #[arg(long, default_value = scripture_acquire::client::DEFAULT_BASE_URL)]
        base_url: String,
    },

    /// Check a cleaned tree against its raw tree
    Validate {
        #[arg(long)]
        version_code: String,

        #[arg(short = 'O', long)]
        output_dir: PathBuf,
    },

    /// Print a built-in canon (or a canon file) as JSON
    Canon {
        /// "protestant", "catholic", or a JSON file
        #[arg(default_value = "protestant")]
        name: String,

        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Map log level, suppressing noisy HTML-parsing and HTTP crates at debug/trace
    let level = match cli.log_level {
        LogLevel::Error => "error",
        LogLevel::Warn  => "warn",
        LogLevel::Info  => "info",
        LogLevel::Debug => "debug,selectors=warn,html5ever=warn,hyper=warn,hyper_util=warn",
        LogLevel::Trace => "trace,selectors=warn,html5ever=warn,hyper=warn,hyper_util=warn",
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    // Timestamp format: 2026-02-14 19:44:09.123 -08:00
    let time_format = "%Y-%m-%d %H:%M:%S%.3f %:z";

    if cli.utc {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_timer(tracing_subscriber::fmt::time::ChronoUtc::new(time_format.to_string()))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_timer(tracing_subscriber::fmt::time::ChronoLocal::new(time_format.to_string()))
            .init();
    }

    match cli.command {
        Commands::Fetch {
            version_id,
            version_code,
            build_id,
            locale,
            output_dir,
            canon,
            books,
            route,
            resume,
            rules,
            workers,
            min_interval_ms,
            timeout_secs,
            max_attempts,
            session_threshold,
            base_url,
            csv,
        } => {
            for (name, value) in [
                ("version-id", &version_id),
                ("version-code", &version_code),
                ("build-id", &build_id),
                ("locale", &locale),
            ] {
                anyhow::ensure!(!value.trim().is_empty(), "--{name} must not be empty");
            }
            anyhow::ensure!(workers > 0, "--workers must be at least 1");

            let policy = FetchPolicy {
                request_timeout: Duration::from_secs(timeout_secs),
                max_attempts: max_attempts.max(1),
                workers,
                min_interval: Duration::from_millis(min_interval_ms),
                session_failure_threshold: session_threshold.max(1),
                ..FetchPolicy::default()
            };
            let config = VersionConfig::new(version_id, version_code, build_id, &locale);
            let transport = HttpTransport::new(&policy.user_agent, &locale)?;
            let client = ContentClient::new(transport, policy.clone())
                .with_base_url(&base_url)
                .with_route(route.segment());

            let cancel = Arc::new(CancelSignal::new());
            let ctx = RunContext::new(config, &policy).with_cancel(cancel.clone());
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Interrupt received; finishing in-flight chapters");
                    cancel.cancel();
                }
            });

            let canon = match canon.as_str() {
                "remote" => client.fetch_canon(&ctx).await?,
                other => load_canon(other)?,
            };
            let canon = if books.is_empty() { canon } else { canon.filter_books(&books)? };

            let mut cleaner = Cleaner::for_locale(&locale);
            if let Some(path) = rules {
                cleaner = cleaner.with_rules(&RuleSet::load(&path)?);
            }

            let options = RunOptions {
                output_dir,
                resume,
                route: route.segment().to_string(),
            };
            let report = run_fetch(&client, &ctx, &canon, &cleaner, &options).await?;
            if csv {
                export_csv(&options.output_dir, &report.version_code)?;
            }
            return Ok(exit_code(report.status()));
        }
        Commands::Clean {
            version_code,
            output_dir,
            locale,
            rules,
            csv,
        } => {
            let rules = rules.map(|p| RuleSet::load(&p)).transpose()?;
            let summary =
                clean_tree(&output_dir, &version_code, locale.as_deref(), rules.as_ref())?;
            if csv {
                export_csv(&output_dir, &version_code)?;
            }
            if !summary.failed.is_empty() {
                return Ok(ExitCode::from(1));
            }
        }
        Commands::BuildId {
            url,
            version_id,
            version_code,
            locale,
            route,
            base_url,
        } => {
            let policy = FetchPolicy::default();
            let transport = HttpTransport::new(&policy.user_agent, &locale)?;
            let id = match (url, version_id, version_code) {
                (Some(url), _, _) => {
                    discover_build_id(&transport, &url, policy.request_timeout).await?
                }
                (None, Some(id), Some(code)) => {
                    ContentClient::new(transport, policy)
                        .with_base_url(&base_url)
                        .with_route(route.segment())
                        .discover_build_id(&id, &code)
                        .await?
                }
                _ => anyhow::bail!("Pass --url, or both --version-id and --version-code"),
            };
            println!("{id}");
        }
        Commands::Validate {
            version_code,
            output_dir,
        } => {
            tracing::info!(
                version = %version_code,
                output_dir = %output_dir.display(),
                "Validating"
            );
            let errors = scripture_validate::validate_tree(&output_dir, &version_code)?;
            if !errors.is_empty() {
                tracing::error!(problems = errors.len(), "Validation failed");
                return Ok(ExitCode::from(1));
            }
        }
        Commands::Canon { name, output } => {
            let canon = load_canon(&name)?;
            let json = serde_json::to_string_pretty(&canon)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, format!("{json}\n"))
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    tracing::info!(
                        canon = %canon.name,
                        books = canon.books.len(),
                        chapters = canon.total_chapters(),
                        path = %path.display(),
                        "Wrote canon"
                    );
                }
                None => println!("{json}"),
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// A built-in canon by name, or a canon JSON file.
fn load_canon(name: &str) -> Result<Canon> {
    if let Some(canon) = Canon::builtin(name) {
        return Ok(canon);
    }
    let path = Path::new(name);
    anyhow::ensure!(
        path.exists(),
        "Unknown canon '{name}': expected protestant, catholic, remote, or a JSON file"
    );
    let canon = Canon::load(path)
        .with_context(|| format!("Failed to load canon {}", path.display()))?;
    tracing::info!(canon = %canon.name, books = canon.books.len(), "Loaded canon file");
    Ok(canon)
}

fn exit_code(status: RunStatus) -> ExitCode {
    match status {
        RunStatus::Complete => ExitCode::SUCCESS,
        RunStatus::Incomplete => ExitCode::from(1),
        RunStatus::SessionExpired => ExitCode::from(2),
        RunStatus::Cancelled => ExitCode::from(130),
    }
}
