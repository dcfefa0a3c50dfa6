//! End-to-end copy tests against an in-memory catalog.
//!
//! The in-memory catalog implements the same trait the PostgreSQL and MySQL
//! drivers do, so these tests drive the real orchestrator, name mapping,
//! target materialization, sanitization and chunked streaming.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::TryStreamExt;
use tokio_util::sync::CancellationToken;

use dbcopy::core::{Column, Row, TargetColumn};
use dbcopy::dialect::NativeType;
use dbcopy::{
    copy_table, stream, Catalog, CopyConfig, CopyOptions, DialectKind, CopyError, NameMapping,
    Orchestrator, PortableType, RowCursor, SqlValue, Table, TableOutcome, TargetTable,
};

struct MemTable {
    columns: Vec<TargetColumn>,
    rows: Vec<Row>,
}

/// A catalog backed by plain vectors.
struct MemoryCatalog {
    dialect: DialectKind,
    source: Vec<(Table, Vec<Row>)>,
    tables: Mutex<BTreeMap<String, MemTable>>,
    ddl: Mutex<Vec<String>>,
    fetches: Arc<Mutex<Vec<usize>>>,
    unreadable: HashSet<String>,
    /// Chunks each table accepts before inserts fail.
    insert_budget: Option<usize>,
    inserted_chunks: AtomicUsize,
    create_fails: bool,
    closed: AtomicBool,
}

impl MemoryCatalog {
    fn new(dialect: DialectKind) -> Self {
        Self {
            dialect,
            source: Vec::new(),
            tables: Mutex::new(BTreeMap::new()),
            ddl: Mutex::new(Vec::new()),
            fetches: Arc::new(Mutex::new(Vec::new())),
            unreadable: HashSet::new(),
            insert_budget: None,
            inserted_chunks: AtomicUsize::new(0),
            create_fails: false,
            closed: AtomicBool::new(false),
        }
    }

    fn with_table(mut self, table: Table, rows: Vec<Row>) -> Self {
        self.source.push((table, rows));
        self
    }

    fn with_existing(self, name: &str, columns: Vec<TargetColumn>) -> Self {
        self.tables.lock().unwrap().insert(
            name.to_string(),
            MemTable {
                columns,
                rows: Vec::new(),
            },
        );
        self
    }

    fn unreadable(mut self, name: &str) -> Self {
        self.unreadable.insert(name.to_string());
        self
    }

    fn failing_insert_after(mut self, chunks: usize) -> Self {
        self.insert_budget = Some(chunks);
        self
    }

    fn failing_create(mut self) -> Self {
        self.create_fails = true;
        self
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn rows_of(&self, name: &str) -> Option<Vec<Row>> {
        self.tables
            .lock()
            .unwrap()
            .get(name)
            .map(|t| t.rows.clone())
    }

    fn columns_of(&self, name: &str) -> Option<Vec<String>> {
        self.tables
            .lock()
            .unwrap()
            .get(name)
            .map(|t| t.columns.iter().map(|c| c.name.clone()).collect())
    }

    fn ddl(&self) -> Vec<String> {
        self.ddl.lock().unwrap().clone()
    }

    fn fetch_sizes(&self) -> Vec<usize> {
        self.fetches.lock().unwrap().clone()
    }
}

struct VecCursor {
    rows: VecDeque<Row>,
    fetches: Arc<Mutex<Vec<usize>>>,
}

#[async_trait]
impl RowCursor for VecCursor {
    async fn fetch(&mut self, max_rows: usize) -> dbcopy::Result<Vec<Row>> {
        let n = max_rows.min(self.rows.len());
        let chunk: Vec<Row> = self.rows.drain(..n).collect();
        if !chunk.is_empty() {
            self.fetches.lock().unwrap().push(chunk.len());
        }
        Ok(chunk)
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    fn dialect(&self) -> DialectKind {
        self.dialect
    }

    fn schema(&self) -> &str {
        "memory"
    }

    async fn reflect(&self) -> dbcopy::Result<Vec<Table>> {
        Ok(self.source.iter().map(|(t, _)| t.clone()).collect())
    }

    async fn count(&self, table: &str) -> dbcopy::Result<u64> {
        self.source
            .iter()
            .find(|(t, _)| t.name == table)
            .map(|(_, rows)| rows.len() as u64)
            .ok_or_else(|| CopyError::SchemaExtraction(format!("no table {}", table)))
    }

    async fn describe_table(&self, name: &str) -> dbcopy::Result<Option<Vec<TargetColumn>>> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .get(name)
            .map(|t| t.columns.clone()))
    }

    async fn drop_table(&self, name: &str) -> dbcopy::Result<()> {
        self.ddl.lock().unwrap().push(format!("drop {}", name));
        self.tables.lock().unwrap().remove(name);
        Ok(())
    }

    async fn create_table(&self, name: &str, columns: &[TargetColumn]) -> dbcopy::Result<()> {
        if self.create_fails {
            return Err(CopyError::table_creation(name, "permission denied for schema"));
        }
        self.ddl.lock().unwrap().push(format!("create {}", name));
        self.tables.lock().unwrap().insert(
            name.to_string(),
            MemTable {
                columns: columns.to_vec(),
                rows: Vec::new(),
            },
        );
        Ok(())
    }

    async fn open_cursor(&self, table: &Table) -> dbcopy::Result<Box<dyn RowCursor>> {
        if self.unreadable.contains(&table.name) {
            return Err(CopyError::stream_read(&table.name, "permission denied"));
        }
        let rows = self
            .source
            .iter()
            .find(|(t, _)| t.name == table.name)
            .map(|(_, rows)| rows.iter().cloned().collect())
            .unwrap_or_default();
        Ok(Box::new(VecCursor {
            rows,
            fetches: Arc::clone(&self.fetches),
        }))
    }

    async fn insert_chunk(&self, table: &TargetTable, rows: &[Row]) -> dbcopy::Result<u64> {
        if let Some(budget) = self.insert_budget {
            if self.inserted_chunks.fetch_add(1, Ordering::SeqCst) >= budget {
                return Err(CopyError::stream_write(&table.name, "disk full"));
            }
        }
        let mut tables = self.tables.lock().unwrap();
        let target = tables
            .get_mut(&table.name)
            .ok_or_else(|| CopyError::stream_write(&table.name, "table does not exist"))?;
        target.rows.extend(rows.iter().cloned());
        Ok(rows.len() as u64)
    }

    async fn ping(&self) -> dbcopy::Result<()> {
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

fn column(name: &str, declared: &str, ordinal: i32) -> Column {
    Column {
        name: name.to_string(),
        source_type: NativeType::parse(DialectKind::Mysql, declared),
        nullable: true,
        ordinal_pos: ordinal,
    }
}

fn table(name: &str, columns: &[(&str, &str)]) -> Table {
    Table {
        schema: "shop".to_string(),
        name: name.to_string(),
        columns: columns
            .iter()
            .enumerate()
            .map(|(i, (n, t))| column(n, t, i as i32 + 1))
            .collect(),
        foreign_keys: vec![],
    }
}

fn users_table() -> Table {
    table(
        "Users",
        &[
            ("ID", "int"),
            ("Full Name", "varchar(255)"),
            ("Created_At", "datetime"),
        ],
    )
}

fn users_rows() -> Vec<Row> {
    vec![vec![
        SqlValue::I32(1),
        SqlValue::from("José"),
        SqlValue::from("0000-00-00 00:00:00"),
    ]]
}

fn numbers(count: usize) -> (Table, Vec<Row>) {
    let rows = (0..count).map(|i| vec![SqlValue::I64(i as i64)]).collect();
    (table("numbers", &[("n", "bigint")]), rows)
}

fn staging_config() -> CopyConfig {
    let mut config = CopyConfig::new("mysql://app@src/shop", "postgres://app@dst/warehouse");
    config.prefix = Some("stg_".into());
    config.normalize_tables = true;
    config.normalize_columns = true;
    config
}

fn orchestrator(
    config: CopyConfig,
    source: &Arc<MemoryCatalog>,
    target: &Arc<MemoryCatalog>,
) -> Orchestrator {
    let source: Arc<dyn Catalog> = source.clone();
    let target: Arc<dyn Catalog> = target.clone();
    Orchestrator::with_catalogs(config, source, target)
}

// =============================================================================
// Chunked streaming
// =============================================================================

async fn copy_numbers(rows: usize, chunk_size: usize) -> (u64, Vec<u64>, MemoryCatalog, MemoryCatalog) {
    let (numbers, data) = numbers(rows);
    let source = MemoryCatalog::new(DialectKind::Mysql).with_table(numbers.clone(), data);
    let target = MemoryCatalog::new(DialectKind::Postgres);

    let mapping = NameMapping::build(&numbers, None, false, false).unwrap();
    let target_table = target.create(&numbers, &mapping, false).await.unwrap();

    let mut chunks = Vec::new();
    let copied = copy_table(
        &source,
        &numbers,
        &target,
        &target_table,
        &mapping,
        CopyOptions::with_chunk_size(chunk_size),
        |n| chunks.push(n),
    )
    .await
    .unwrap();
    (copied, chunks, source, target)
}

#[tokio::test]
async fn test_copy_empty_table() {
    let (copied, chunks, source, target) = copy_numbers(0, 10).await;
    assert_eq!(copied, 0);
    assert!(chunks.is_empty());
    assert!(source.fetch_sizes().is_empty());
    assert_eq!(target.rows_of("numbers").unwrap().len(), 0);
}

#[tokio::test]
async fn test_copy_fewer_rows_than_chunk() {
    let (copied, chunks, source, target) = copy_numbers(7, 10).await;
    assert_eq!(copied, 7);
    assert_eq!(chunks, vec![7]);
    assert_eq!(source.fetch_sizes(), vec![7]);
    assert_eq!(target.rows_of("numbers").unwrap().len(), 7);
}

#[tokio::test]
async fn test_copy_exactly_one_chunk() {
    let (copied, chunks, source, _) = copy_numbers(10, 10).await;
    assert_eq!(copied, 10);
    assert_eq!(chunks, vec![10]);
    assert_eq!(source.fetch_sizes(), vec![10]);
}

#[tokio::test]
async fn test_copy_spans_multiple_chunks() {
    let (copied, chunks, source, target) = copy_numbers(25_001, 10_000).await;
    assert_eq!(copied, 25_001);
    assert_eq!(chunks, vec![10_000, 20_000, 25_001]);
    assert_eq!(source.fetch_sizes(), vec![10_000, 10_000, 5_001]);

    let rows = target.rows_of("numbers").unwrap();
    assert_eq!(rows.len(), 25_001);
    assert_eq!(rows[0], vec![SqlValue::I64(0)]);
    assert_eq!(rows[25_000], vec![SqlValue::I64(25_000)]);
}

#[tokio::test]
async fn test_stream_yields_rows_by_target_name() {
    let users = users_table();
    let source = MemoryCatalog::new(DialectKind::Mysql).with_table(users.clone(), users_rows());
    let target = MemoryCatalog::new(DialectKind::Postgres);

    let mapping = NameMapping::build(&users, Some("stg_"), true, true).unwrap();
    let target_table = target.create(&users, &mapping, false).await.unwrap();

    let rows: Vec<_> = stream(&source, &users, &target, &target_table, &mapping, 100)
        .try_collect()
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("full_name").and_then(|v| v.as_text()), Some("Jose"));
    assert!(rows[0].get("created_at").unwrap().is_null());
    assert!(rows[0].get("Full Name").is_none());
    assert!(rows[0].is_last_in_chunk());
}

// =============================================================================
// Orchestrated runs
// =============================================================================

#[tokio::test]
async fn test_users_copied_to_staging_table() {
    let source = Arc::new(MemoryCatalog::new(DialectKind::Mysql).with_table(users_table(), users_rows()));
    let target = Arc::new(MemoryCatalog::new(DialectKind::Postgres));

    let report = orchestrator(staging_config(), &source, &target)
        .run()
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.status, "completed");
    assert_eq!(report.rows_copied, 1);
    assert_eq!(report.tables[0].target.as_deref(), Some("stg_users"));
    assert_eq!(report.tables[0].outcome, TableOutcome::Copied { rows: 1 });

    assert_eq!(
        target.columns_of("stg_users").unwrap(),
        vec!["id", "full_name", "created_at"]
    );
    assert_eq!(
        target.rows_of("stg_users").unwrap(),
        vec![vec![SqlValue::I32(1), SqlValue::from("Jose"), SqlValue::Null]]
    );
}

#[tokio::test]
async fn test_preserve_unicode_keeps_text() {
    let source = Arc::new(MemoryCatalog::new(DialectKind::Mysql).with_table(users_table(), users_rows()));
    let target = Arc::new(MemoryCatalog::new(DialectKind::Postgres));
    let mut config = staging_config();
    config.preserve_unicode = true;

    orchestrator(config, &source, &target).run().await.unwrap();

    let rows = target.rows_of("stg_users").unwrap();
    assert_eq!(rows[0][1], SqlValue::from("José"));
}

#[tokio::test]
async fn test_dry_run_writes_nothing() {
    let source = Arc::new(MemoryCatalog::new(DialectKind::Mysql).with_table(users_table(), users_rows()));
    let target = Arc::new(MemoryCatalog::new(DialectKind::Postgres));
    let mut config = staging_config();
    config.dry_run = true;

    let report = orchestrator(config, &source, &target).run().await.unwrap();

    assert_eq!(report.status, "dry_run");
    assert_eq!(report.rows_copied, 0);
    assert_eq!(report.tables[0].outcome, TableOutcome::Planned { rows: 1 });
    assert!(target.ddl().is_empty());
    assert!(target.rows_of("stg_users").is_none());
}

#[tokio::test]
async fn test_existing_table_is_appended_to() {
    let source = Arc::new(MemoryCatalog::new(DialectKind::Mysql).with_table(users_table(), users_rows()));
    let target = Arc::new(MemoryCatalog::new(DialectKind::Postgres).with_existing(
        "stg_users",
        vec![
            TargetColumn::new("id", PortableType::BigInteger),
            TargetColumn::new("full_name", PortableType::Unicode),
            TargetColumn::new("created_at", PortableType::DateTime),
            TargetColumn::new("loaded_by", PortableType::Unicode),
        ],
    ));

    let report = orchestrator(staging_config(), &source, &target)
        .run()
        .await
        .unwrap();

    assert!(report.is_success());
    assert!(target.ddl().is_empty());
    assert_eq!(target.rows_of("stg_users").unwrap().len(), 1);
}

#[tokio::test]
async fn test_drop_recreates_existing_table() {
    let source = Arc::new(MemoryCatalog::new(DialectKind::Mysql).with_table(users_table(), users_rows()));
    let target = Arc::new(MemoryCatalog::new(DialectKind::Postgres).with_existing(
        "stg_users",
        vec![TargetColumn::new("legacy", PortableType::Unicode)],
    ));
    let mut config = staging_config();
    config.drop = true;

    let report = orchestrator(config, &source, &target).run().await.unwrap();

    assert!(report.is_success());
    assert_eq!(target.ddl(), vec!["drop stg_users", "create stg_users"]);
    assert_eq!(
        target.columns_of("stg_users").unwrap(),
        vec!["id", "full_name", "created_at"]
    );
}

#[tokio::test]
async fn test_existing_table_missing_column_fails_table() {
    let source = Arc::new(
        MemoryCatalog::new(DialectKind::Mysql)
            .with_table(users_table(), users_rows())
            .with_table(table("Orders", &[("ID", "int")]), vec![vec![SqlValue::I32(9)]]),
    );
    let target = Arc::new(MemoryCatalog::new(DialectKind::Postgres).with_existing(
        "stg_users",
        vec![TargetColumn::new("id", PortableType::Integer)],
    ));

    let report = orchestrator(staging_config(), &source, &target)
        .run()
        .await
        .unwrap();

    assert_eq!(report.failed_tables, vec!["Users"]);
    assert!(matches!(report.tables[0].outcome, TableOutcome::Failed { ref error } if error.contains("full_name")));
    assert_eq!(report.tables[1].outcome, TableOutcome::Copied { rows: 1 });
    assert_eq!(target.ddl(), vec!["create stg_orders"]);
    assert!(target.rows_of("stg_users").unwrap().is_empty());
}

#[tokio::test]
async fn test_column_collision_refused_before_ddl() {
    let clashing = table("People", &[("Full Name", "varchar(20)"), ("full_name", "varchar(20)")]);
    let source = Arc::new(MemoryCatalog::new(DialectKind::Mysql).with_table(clashing, vec![]));
    let target = Arc::new(MemoryCatalog::new(DialectKind::Postgres));

    let report = orchestrator(staging_config(), &source, &target)
        .run()
        .await
        .unwrap();

    assert!(!report.is_success());
    assert_eq!(report.status, "completed_with_errors");
    assert!(matches!(
        report.tables[0].outcome,
        TableOutcome::Failed { ref error } if error.contains("collision")
    ));
    assert!(target.ddl().is_empty());
}

#[tokio::test]
async fn test_skipped_tables_are_reported() {
    let source = Arc::new(
        MemoryCatalog::new(DialectKind::Mysql)
            .with_table(table("audit_log", &[("id", "int")]), vec![vec![SqlValue::I32(1)]])
            .with_table(users_table(), users_rows()),
    );
    let target = Arc::new(MemoryCatalog::new(DialectKind::Postgres));
    let mut config = staging_config();
    config.skip = vec!["audit_log".into()];

    let report = orchestrator(config, &source, &target).run().await.unwrap();

    assert!(report.is_success());
    assert!(matches!(report.tables[0].outcome, TableOutcome::Skipped { .. }));
    assert_eq!(target.ddl(), vec!["create stg_users"]);
}

#[tokio::test]
async fn test_read_failure_does_not_stop_run() {
    let source = Arc::new(
        MemoryCatalog::new(DialectKind::Mysql)
            .with_table(table("secrets", &[("id", "int")]), vec![vec![SqlValue::I32(1)]])
            .with_table(users_table(), users_rows())
            .unreadable("secrets"),
    );
    let target = Arc::new(MemoryCatalog::new(DialectKind::Postgres));

    let report = orchestrator(staging_config(), &source, &target)
        .run()
        .await
        .unwrap();

    assert_eq!(report.failed_tables, vec!["secrets"]);
    assert_eq!(report.rows_copied, 1);
    assert_eq!(target.rows_of("stg_users").unwrap().len(), 1);

    let err = CopyError::TablesFailed(report.failed_tables.clone());
    assert_eq!(err.exit_code(), 3);
}

#[tokio::test]
async fn test_cancelled_run_stops_before_copying() {
    let source = Arc::new(MemoryCatalog::new(DialectKind::Mysql).with_table(users_table(), users_rows()));
    let target = Arc::new(MemoryCatalog::new(DialectKind::Postgres));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = orchestrator(staging_config(), &source, &target)
        .with_cancellation(cancel)
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, CopyError::Cancelled));
    assert!(target.ddl().is_empty());
}

#[tokio::test]
async fn test_report_serializes_outcomes() {
    let source = Arc::new(MemoryCatalog::new(DialectKind::Mysql).with_table(users_table(), users_rows()));
    let target = Arc::new(MemoryCatalog::new(DialectKind::Postgres));

    let report = orchestrator(staging_config(), &source, &target)
        .run()
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();

    assert_eq!(json["status"], "completed");
    assert_eq!(json["tables"][0]["target"], "stg_users");
    assert_eq!(json["tables"][0]["outcome"]["status"], "copied");
    assert_eq!(json["tables"][0]["outcome"]["rows"], 1);
}

#[tokio::test]
async fn test_write_failure_keeps_earlier_chunks_and_continues() {
    let (numbers, data) = numbers(25);
    let source = Arc::new(
        MemoryCatalog::new(DialectKind::Mysql)
            .with_table(numbers, data)
            .with_table(users_table(), users_rows()),
    );
    let target = Arc::new(MemoryCatalog::new(DialectKind::Postgres).failing_insert_after(2));
    let mut config = staging_config();
    config.chunk_size = 10;

    let report = orchestrator(config, &source, &target)
        .run()
        .await
        .unwrap();

    assert_eq!(report.failed_tables, vec!["numbers", "Users"]);
    assert!(matches!(
        report.tables[0].outcome,
        TableOutcome::Failed { ref error } if error.contains("disk full")
    ));
    assert_eq!(target.rows_of("stg_numbers").unwrap().len(), 20);
    // The run moved on: the second table was created even though its insert failed too.
    assert_eq!(target.ddl(), vec!["create stg_numbers", "create stg_users"]);
    assert!(source.is_closed());
    assert!(target.is_closed());
}

#[tokio::test]
async fn test_create_failure_aborts_run_and_closes_catalogs() {
    let source = Arc::new(
        MemoryCatalog::new(DialectKind::Mysql)
            .with_table(users_table(), users_rows())
            .with_table(table("Orders", &[("ID", "int")]), vec![vec![SqlValue::I32(9)]]),
    );
    let target = Arc::new(MemoryCatalog::new(DialectKind::Postgres).failing_create());

    let err = orchestrator(staging_config(), &source, &target)
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, CopyError::TableCreation { ref table, .. } if table == "stg_users"));
    assert_eq!(err.exit_code(), 4);
    assert!(target.ddl().is_empty());
    assert!(target.rows_of("stg_orders").is_none());
    assert!(source.is_closed());
    assert!(target.is_closed());
}
