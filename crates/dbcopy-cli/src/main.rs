//! dbcopy CLI - copy a SQL database into another, across dialects.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use dbcopy::{CopyConfig, CopyError, Orchestrator, TableOutcome};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "dbcopy")]
#[command(about = "Copy every table of one SQL database into another")]
#[command(version)]
struct Cli {
    /// Path to a YAML configuration file; flags override its values
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output JSON result to stdout
    #[arg(long, global = true)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text", global = true)]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info", global = true)]
    verbosity: String,

    /// Print progress updates as JSON lines to stderr
    #[arg(long, global = true)]
    progress: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Endpoints {
    /// Source connection URI (postgres://, postgresql://, mysql://, mariadb://)
    #[arg(env = "DBCOPY_SOURCE_URI")]
    source_uri: Option<String>,

    /// Target connection URI
    #[arg(env = "DBCOPY_TARGET_URI")]
    target_uri: Option<String>,

    /// Source schema (PostgreSQL) or database (MySQL)
    #[arg(long)]
    source_schema: Option<String>,

    /// Target schema (PostgreSQL) or database (MySQL)
    #[arg(long)]
    target_schema: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy all tables from the source into the target
    Copy {
        #[command(flatten)]
        endpoints: Endpoints,

        /// Prefix for target table names
        #[arg(long)]
        prefix: Option<String>,

        /// Drop and recreate target tables that already exist
        #[arg(long)]
        drop: bool,

        /// Source table to leave out (repeatable)
        #[arg(long, value_name = "TABLE")]
        skip: Vec<String>,

        /// Normalize target table names to snake_case
        #[arg(long)]
        normalize_tables: bool,

        /// Normalize target column names to snake_case
        #[arg(long)]
        normalize_columns: bool,

        /// Rows per fetch/insert round [default: 10000]
        #[arg(long, value_name = "N")]
        chunk_size: Option<usize>,

        /// Reflect, map and count without writing anything
        #[arg(long)]
        dry_run: bool,

        /// Keep non-ASCII text instead of transliterating it
        #[arg(long)]
        preserve_unicode: bool,
    },

    /// Test database connections
    HealthCheck {
        #[command(flatten)]
        endpoints: Endpoints,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), CopyError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format)?;

    let mut config = match &cli.config {
        Some(path) => {
            let config = CopyConfig::read(path)?;
            info!("Loaded configuration from {:?}", path);
            config
        }
        None => CopyConfig::default(),
    };

    match cli.command {
        Commands::Copy {
            endpoints,
            prefix,
            drop,
            skip,
            normalize_tables,
            normalize_columns,
            chunk_size,
            dry_run,
            preserve_unicode,
        } => {
            endpoints.apply(&mut config);
            if prefix.is_some() {
                config.prefix = prefix;
            }
            config.drop |= drop;
            config.skip.extend(skip);
            config.normalize_tables |= normalize_tables;
            config.normalize_columns |= normalize_columns;
            if let Some(n) = chunk_size {
                config.chunk_size = n;
            }
            config.dry_run |= dry_run;
            config.preserve_unicode |= preserve_unicode;
            config.validate()?;

            let cancel = setup_signal_handler();
            let dry_run = config.dry_run;
            let report = Orchestrator::new(config)
                .await?
                .with_progress(cli.progress)
                .with_cancellation(cancel)
                .run()
                .await?;

            if cli.output_json {
                println!("{}", report.to_json()?);
            } else {
                let status_msg = if dry_run { "Dry run completed!" } else { "Copy completed!" };
                println!("\n{}", status_msg);
                println!("  Run ID: {}", report.run_id);
                println!("  Duration: {:.2}s", report.duration_seconds);
                for table in &report.tables {
                    let target = table.target.as_deref().unwrap_or("-");
                    match &table.outcome {
                        TableOutcome::Copied { rows } => {
                            println!("  {} -> {}: {} rows", table.source, target, rows)
                        }
                        TableOutcome::Planned { rows } => {
                            println!("  {} -> {}: {} rows (planned)", table.source, target, rows)
                        }
                        TableOutcome::Skipped { reason } => {
                            println!("  {}: skipped ({})", table.source, reason)
                        }
                        TableOutcome::Failed { error } => {
                            println!("  {} -> {}: FAILED: {}", table.source, target, error)
                        }
                    }
                }
                println!("  Rows: {}", report.rows_copied);
            }

            if !report.is_success() {
                return Err(CopyError::TablesFailed(report.failed_tables));
            }
        }

        Commands::HealthCheck { endpoints } => {
            endpoints.apply(&mut config);
            config.validate()?;
            let result = Orchestrator::health_check(&config).await;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                for (label, endpoint) in [("Source", &result.source), ("Target", &result.target)] {
                    println!(
                        "  {} ({}): {} ({}ms)",
                        label,
                        endpoint.dialect.as_deref().unwrap_or("unknown"),
                        if endpoint.connected { "OK" } else { "FAILED" },
                        endpoint.latency_ms
                    );
                    if let Some(ref err) = endpoint.error {
                        println!("    Error: {}", err);
                    }
                }
                println!(
                    "\n  Overall: {}",
                    if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !result.healthy {
                return Err(CopyError::pool("health check failed", "health-check"));
            }
        }
    }

    Ok(())
}

impl Endpoints {
    fn apply(self, config: &mut CopyConfig) {
        if let Some(uri) = self.source_uri {
            config.source_uri = uri;
        }
        if let Some(uri) = self.target_uri {
            config.target_uri = uri;
        }
        if self.source_schema.is_some() {
            config.source_schema = self.source_schema;
        }
        if self.target_schema.is_some() {
            config.target_schema = self.target_schema;
        }
    }
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), CopyError> {
    let level = match verbosity.to_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "info" => "info",
        "warn" => "warn",
        "error" => "error",
        other => {
            return Err(CopyError::Config(format!(
                "invalid verbosity '{}': expected debug, info, warn or error",
                other
            )))
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    match format {
        "json" => subscriber.json().init(),
        "text" => subscriber.init(),
        other => {
            return Err(CopyError::Config(format!(
                "invalid log format '{}': expected text or json",
                other
            )))
        }
    }

    Ok(())
}

/// Cancel the returned token on SIGINT (Ctrl-C) or SIGTERM.
///
/// The orchestrator stops at the next chunk boundary; chunks already
/// inserted stay in the target.
#[cfg(unix)]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();

    for (kind, name) in [
        (SignalKind::interrupt(), "SIGINT"),
        (SignalKind::terminate(), "SIGTERM"),
    ] {
        let token = cancel_token.clone();
        match signal(kind) {
            Ok(mut stream) => {
                tokio::spawn(async move {
                    stream.recv().await;
                    eprintln!("\nReceived {}. Stopping after the current chunk...", name);
                    token.cancel();
                });
            }
            Err(e) => eprintln!("Cannot install {} handler: {}", name, e),
        }
    }

    cancel_token
}

#[cfg(not(unix))]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Stopping after the current chunk...");
            token.cancel();
        }
    });

    cancel_token
}
