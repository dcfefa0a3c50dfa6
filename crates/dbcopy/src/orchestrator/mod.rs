//! Copy orchestrator: walks the source tables in dependency order and copies
//! them one at a time.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::CopyConfig;
use crate::copy::{copy_table, CopyOptions};
use crate::core::schema::Table;
use crate::core::traits::Catalog;
use crate::drivers;
use crate::error::{CopyError, Result};
use crate::naming::NameMapping;

/// Copy orchestrator.
pub struct Orchestrator {
    config: CopyConfig,
    source: Arc<dyn Catalog>,
    target: Arc<dyn Catalog>,
    progress: bool,
    cancel: CancellationToken,
}

/// What happened to one source table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TableOutcome {
    Copied { rows: u64 },
    /// Dry run: mapped and counted only.
    Planned { rows: u64 },
    Skipped { reason: String },
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableReport {
    pub source: String,
    /// Target table name, when a mapping could be built.
    pub target: Option<String>,
    pub columns: usize,
    pub outcome: TableOutcome,
}

/// Result of a copy run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyReport {
    /// Unique run identifier.
    pub run_id: String,

    /// `completed`, `completed_with_errors` or `dry_run`.
    pub status: String,

    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: f64,

    /// Per-table outcomes in copy order.
    pub tables: Vec<TableReport>,

    /// Rows inserted into the target across all tables.
    pub rows_copied: u64,

    pub failed_tables: Vec<String>,
}

impl CopyReport {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn is_success(&self) -> bool {
        self.failed_tables.is_empty()
    }
}

/// One `--progress` line, emitted after every inserted chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub table: String,
    pub target: String,
    pub rows_copied: u64,
    pub rows_total: u64,
}

/// Reachability of one database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointHealth {
    pub dialect: Option<String>,
    pub connected: bool,
    pub latency_ms: u64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub source: EndpointHealth,
    pub target: EndpointHealth,
    pub healthy: bool,
}

impl Orchestrator {
    /// Connect to both databases.
    pub async fn new(config: CopyConfig) -> Result<Self> {
        config.validate()?;
        let source = drivers::connect(&config.source_uri, config.source_schema.as_deref()).await?;
        let target =
            match drivers::connect(&config.target_uri, config.target_schema.as_deref()).await {
                Ok(target) => target,
                Err(e) => {
                    source.close().await;
                    return Err(e);
                }
            };
        Ok(Self::with_catalogs(config, source, target))
    }

    /// Use already connected catalogs.
    pub fn with_catalogs(
        config: CopyConfig,
        source: Arc<dyn Catalog>,
        target: Arc<dyn Catalog>,
    ) -> Self {
        Self {
            config,
            source,
            target,
            progress: false,
            cancel: CancellationToken::new(),
        }
    }

    /// Print a JSON [`ProgressUpdate`] line to stderr after every chunk.
    pub fn with_progress(mut self, enabled: bool) -> Self {
        self.progress = enabled;
        self
    }

    /// Stop between chunks and between tables once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Copy every source table.
    ///
    /// Tables that cannot be mapped or counted, and tables failing with a
    /// table-scoped error ([`CopyError::is_table_scoped`]), are reported as
    /// failed and the run continues. Any other error aborts the run. Both
    /// catalogs are closed before this returns.
    pub async fn run(self) -> Result<CopyReport> {
        let started_at = Utc::now();
        let start = Instant::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        info!(
            "Starting copy run {}: {} -> {}",
            run_id,
            self.source.dialect(),
            self.target.dialect()
        );

        let mut tables = Vec::new();
        let outcome = self.copy_all(&mut tables).await;

        self.source.close().await;
        self.target.close().await;
        outcome?;

        let rows_copied = tables
            .iter()
            .map(|t| match t.outcome {
                TableOutcome::Copied { rows } => rows,
                _ => 0,
            })
            .sum();
        let failed_tables: Vec<String> = tables
            .iter()
            .filter(|t| matches!(t.outcome, TableOutcome::Failed { .. }))
            .map(|t| t.source.clone())
            .collect();
        let status = if self.config.dry_run {
            "dry_run"
        } else if failed_tables.is_empty() {
            "completed"
        } else {
            "completed_with_errors"
        };

        let report = CopyReport {
            run_id,
            status: status.to_string(),
            started_at,
            completed_at: Utc::now(),
            duration_seconds: start.elapsed().as_secs_f64(),
            tables,
            rows_copied,
            failed_tables,
        };
        info!(
            "Copy {}: {} tables, {} rows in {:.1}s",
            report.status,
            report.tables.len(),
            report.rows_copied,
            report.duration_seconds
        );
        Ok(report)
    }

    async fn copy_all(&self, reports: &mut Vec<TableReport>) -> Result<()> {
        let tables = self.source.reflect().await?;
        info!(
            "Found {} tables in {}",
            tables.len(),
            self.source.schema()
        );

        for table in &tables {
            if self.cancel.is_cancelled() {
                return Err(CopyError::Cancelled);
            }
            self.copy_one(table, reports).await?;
        }
        Ok(())
    }

    /// Copy one table and record its outcome. Returns an error only when the
    /// whole run must stop.
    async fn copy_one(&self, table: &Table, reports: &mut Vec<TableReport>) -> Result<()> {
        let mut report = TableReport {
            source: table.name.clone(),
            target: None,
            columns: table.columns.len(),
            outcome: TableOutcome::Skipped {
                reason: "skip list".into(),
            },
        };

        if self.config.is_skipped(&table.name) {
            info!("{}: skipped", table.name);
            reports.push(report);
            return Ok(());
        }

        let mapping = match NameMapping::build(
            table,
            self.config.prefix.as_deref(),
            self.config.normalize_tables,
            self.config.normalize_columns,
        ) {
            Ok(mapping) => mapping,
            Err(e) => {
                error!("{}: {}", table.name, e);
                report.outcome = TableOutcome::Failed {
                    error: e.to_string(),
                };
                reports.push(report);
                return Ok(());
            }
        };
        report.target = Some(mapping.name.clone());

        let total = match self.source.count(&table.name).await {
            Ok(total) => total,
            Err(e) => {
                error!("{}: counting rows failed: {}", table.name, e);
                report.outcome = TableOutcome::Failed {
                    error: e.to_string(),
                };
                reports.push(report);
                return Ok(());
            }
        };
        info!(
            " {} -> {} ({} columns, {} rows)",
            table.name,
            mapping.name,
            mapping.len(),
            total
        );

        if self.config.dry_run {
            report.outcome = TableOutcome::Planned { rows: total };
            reports.push(report);
            return Ok(());
        }

        let target_table = match self.target.create(table, &mapping, self.config.drop).await {
            Ok(target_table) => target_table,
            Err(e) => return record_failure(reports, report, e),
        };
        if target_table.already_existed {
            info!("{}: appending to existing table", mapping.name);
        }

        let options = CopyOptions {
            cancel: Some(self.cancel.clone()),
            ..self.config.copy_options()
        };
        let progress = self.progress;
        let on_chunk = |copied: u64| {
            if progress {
                emit_progress(&ProgressUpdate {
                    table: table.name.clone(),
                    target: mapping.name.clone(),
                    rows_copied: copied,
                    rows_total: total,
                });
            }
        };

        let copied = copy_table(
            self.source.as_ref(),
            table,
            self.target.as_ref(),
            &target_table,
            &mapping,
            options,
            on_chunk,
        )
        .await;

        match copied {
            Ok(rows) => {
                if rows != total {
                    warn!(
                        "{}: copied {} rows, counted {} before the copy",
                        table.name, rows, total
                    );
                }
                info!("{}: copied {} rows", table.name, rows);
                report.outcome = TableOutcome::Copied { rows };
                reports.push(report);
                Ok(())
            }
            Err(e) => record_failure(reports, report, e),
        }
    }

    /// Connect to both databases and round-trip a trivial query on each.
    pub async fn health_check(config: &CopyConfig) -> HealthCheckResult {
        let source = check_endpoint(&config.source_uri, config.source_schema.as_deref()).await;
        let target = check_endpoint(&config.target_uri, config.target_schema.as_deref()).await;
        let healthy = source.connected && target.connected;
        HealthCheckResult {
            source,
            target,
            healthy,
        }
    }
}

fn emit_progress(update: &ProgressUpdate) {
    if let Ok(line) = serde_json::to_string(update) {
        eprintln!("{}", line);
    }
}

/// Mark the table failed. Table-scoped errors let the run continue with the
/// next table; anything else ends the run.
fn record_failure(
    reports: &mut Vec<TableReport>,
    mut report: TableReport,
    e: CopyError,
) -> Result<()> {
    if !matches!(e, CopyError::Cancelled) {
        error!("{}", e);
    }
    report.outcome = TableOutcome::Failed {
        error: e.to_string(),
    };
    reports.push(report);
    if e.is_table_scoped() {
        Ok(())
    } else {
        Err(e)
    }
}

async fn check_endpoint(uri: &str, schema: Option<&str>) -> EndpointHealth {
    let start = Instant::now();
    let dialect = crate::dialect::DialectKind::from_uri(uri)
        .ok()
        .map(|d| d.name().to_string());

    let result = match drivers::connect(uri, schema).await {
        Ok(catalog) => {
            let pinged = catalog.ping().await;
            catalog.close().await;
            pinged
        }
        Err(e) => Err(e),
    };

    EndpointHealth {
        dialect,
        connected: result.is_ok(),
        latency_ms: start.elapsed().as_millis() as u64,
        error: result.err().map(|e| e.to_string()),
    }
}
