//! Traced database connection wrapper.
//!
//! Wraps a tokio-postgres connection and logs all catalog queries and
//! privilege statements via tracing.

use tokio_postgres::types::ToSql;
use tokio_postgres::{Error, Row, Transaction};
use tracing::Instrument;

type ConnFuture<'a, T> =
    std::pin::Pin<Box<dyn std::future::Future<Output = Result<T, Error>> + Send + 'a>>;

/// A wrapper around a database connection that logs all queries via tracing.
///
/// This is a thin wrapper that delegates to the underlying connection but adds
/// `tracing::debug_span!` around each query call.
///
/// # Example
///
/// ```ignore
/// use redgrant::ConnectionExt;
///
/// let conn = pool.get().await?;
/// let rows = conn
///     .traced()
///     .query("SELECT nspname FROM pg_namespace WHERE nspname = $1", &[&schema])
///     .await?;
/// ```
pub struct TracedConn<'a, C: Connection> {
    conn: &'a C,
}

impl<'a, C: Connection> TracedConn<'a, C> {
    /// Create a new traced connection wrapper.
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    /// Execute a query, returning all rows.
    pub async fn query(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Vec<Row>, Error> {
        let span = tracing::debug_span!(
            "db.query",
            sql = %sql,
            params = params.len(),
            rows = tracing::field::Empty,
        );
        let rows = self
            .conn
            .query(sql, params)
            .instrument(span.clone())
            .await?;
        span.record("rows", rows.len());
        Ok(rows)
    }

    /// Execute a query, returning at most one row.
    pub async fn query_opt(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Option<Row>, Error> {
        let span = tracing::debug_span!(
            "db.query",
            sql = %sql,
            params = params.len(),
            rows = tracing::field::Empty,
        );
        let row = self
            .conn
            .query_opt(sql, params)
            .instrument(span.clone())
            .await?;
        span.record("rows", if row.is_some() { 1u64 } else { 0u64 });
        Ok(row)
    }
}

/// Execute a parameterless statement inside `tx`, logged like [`TracedConn`] queries.
pub async fn execute_traced(tx: &Transaction<'_>, sql: &str) -> Result<u64, Error> {
    let span = tracing::debug_span!(
        "db.execute",
        sql = %sql,
        affected = tracing::field::Empty,
    );
    let affected = tx.execute(sql, &[]).instrument(span.clone()).await?;
    span.record("affected", affected);
    Ok(affected)
}

/// Extension trait to get a traced wrapper from a connection.
pub trait ConnectionExt: Connection + Sized {
    /// Wrap this connection in a `TracedConn` for query logging.
    fn traced(&self) -> TracedConn<'_, Self> {
        TracedConn::new(self)
    }
}

impl<C: Connection> ConnectionExt for C {}

/// Trait for database connections the catalog can run on.
///
/// This is implemented for `tokio_postgres::Client` and `deadpool_postgres::Object`.
pub trait Connection: Send + Sync {
    /// Execute a query, returning all rows.
    fn query<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [&'a (dyn ToSql + Sync)],
    ) -> ConnFuture<'a, Vec<Row>>;

    /// Execute a query, returning at most one row.
    fn query_opt<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [&'a (dyn ToSql + Sync)],
    ) -> ConnFuture<'a, Option<Row>>;

    /// Begin a transaction.
    ///
    /// Dropping the returned transaction without committing rolls it back,
    /// which also covers a cancelled apply.
    fn transaction(&mut self) -> ConnFuture<'_, Transaction<'_>>;
}

impl Connection for tokio_postgres::Client {
    fn query<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [&'a (dyn ToSql + Sync)],
    ) -> ConnFuture<'a, Vec<Row>> {
        Box::pin(tokio_postgres::Client::query(self, sql, params))
    }

    fn query_opt<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [&'a (dyn ToSql + Sync)],
    ) -> ConnFuture<'a, Option<Row>> {
        Box::pin(tokio_postgres::Client::query_opt(self, sql, params))
    }

    fn transaction(&mut self) -> ConnFuture<'_, Transaction<'_>> {
        Box::pin(tokio_postgres::Client::transaction(self))
    }
}

impl Connection for deadpool_postgres::Object {
    fn query<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [&'a (dyn ToSql + Sync)],
    ) -> ConnFuture<'a, Vec<Row>> {
        // Deref to the underlying Client to avoid recursion
        use std::ops::Deref;
        let client: &tokio_postgres::Client = self.deref();
        Box::pin(client.query(sql, params))
    }

    fn query_opt<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [&'a (dyn ToSql + Sync)],
    ) -> ConnFuture<'a, Option<Row>> {
        use std::ops::Deref;
        let client: &tokio_postgres::Client = self.deref();
        Box::pin(client.query_opt(sql, params))
    }

    fn transaction(&mut self) -> ConnFuture<'_, Transaction<'_>> {
        use std::ops::DerefMut;
        let client: &mut tokio_postgres::Client = self.deref_mut();
        Box::pin(client.transaction())
    }
}
