//! Streaming reads of one MySQL table.
//!
//! A text-protocol result set borrows its connection, so it cannot be kept
//! in the cursor itself. A task owns both and answers fetch requests one at
//! a time; it only reads from the server while a request is pending.

use async_trait::async_trait;
use mysql_async::prelude::Queryable;
use mysql_async::{Conn, TextProtocol};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::dialect::{from_mysql, select_sql};
use crate::core::schema::Table;
use crate::core::traits::RowCursor;
use crate::core::value::Row;
use crate::dialect::{translate, PortableType};
use crate::error::{CopyError, Result};

struct FetchRequest {
    max_rows: usize,
    reply: oneshot::Sender<Result<Vec<Row>>>,
}

pub struct MysqlCursor {
    table: String,
    requests: mpsc::Sender<FetchRequest>,
}

impl MysqlCursor {
    /// Start the query on `conn` and hand the connection to a cursor task.
    pub async fn open(conn: Conn, table: &Table) -> Result<Self> {
        let sql = select_sql(table)?;
        let types: Vec<PortableType> = table
            .columns
            .iter()
            .map(|c| translate(&c.source_type))
            .collect();

        let (requests, receiver) = mpsc::channel(1);
        let (ready, opened) = oneshot::channel();
        tokio::spawn(serve(conn, sql, types, receiver, ready));

        match opened.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(CopyError::stream_read(&table.name, e)),
            Err(_) => {
                return Err(CopyError::stream_read(
                    &table.name,
                    "cursor task ended before the query started",
                ))
            }
        }
        debug!("Opened cursor on {}", table.full_name());

        Ok(Self {
            table: table.name.clone(),
            requests,
        })
    }
}

async fn serve(
    mut conn: Conn,
    sql: String,
    types: Vec<PortableType>,
    mut requests: mpsc::Receiver<FetchRequest>,
    ready: oneshot::Sender<std::result::Result<(), mysql_async::Error>>,
) {
    let mut result = match conn.query_iter(sql).await {
        Ok(result) => result,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    if ready.send(Ok(())).is_err() {
        return;
    }

    let mut exhausted = false;
    while let Some(request) = requests.recv().await {
        let mut rows = Vec::with_capacity(request.max_rows.min(10_000));
        let mut outcome = Ok(());
        while !exhausted && rows.len() < request.max_rows {
            match next_row(&mut result, &types).await {
                Ok(Some(row)) => rows.push(row),
                Ok(None) => exhausted = true,
                Err(e) => {
                    outcome = Err(CopyError::from(e));
                    break;
                }
            }
        }
        let failed = outcome.is_err();
        if request.reply.send(outcome.map(|_| rows)).is_err() || failed {
            break;
        }
    }

    // Dropping the connection returns it to the pool, which discards any
    // unread rows.
    drop(result);
    drop(conn);
}

async fn next_row(
    result: &mut mysql_async::QueryResult<'_, 'static, TextProtocol>,
    types: &[PortableType],
) -> std::result::Result<Option<Row>, mysql_async::Error> {
    let Some(row) = result.next().await? else {
        return Ok(None);
    };
    let mut raw = row.unwrap_raw();
    Ok(Some(
        types
            .iter()
            .enumerate()
            .map(|(i, portable)| from_mysql(raw.get_mut(i).and_then(Option::take), *portable))
            .collect(),
    ))
}

#[async_trait]
impl RowCursor for MysqlCursor {
    async fn fetch(&mut self, max_rows: usize) -> Result<Vec<Row>> {
        let (reply, response) = oneshot::channel();
        let request = FetchRequest {
            max_rows: max_rows.max(1),
            reply,
        };
        if self.requests.send(request).await.is_err() {
            // The task stops after the last error it reported.
            return Err(CopyError::stream_read(&self.table, "cursor is closed"));
        }
        response
            .await
            .map_err(|_| CopyError::stream_read(&self.table, "cursor task ended"))?
            .map_err(|e| CopyError::stream_read(&self.table, e))
    }
}
