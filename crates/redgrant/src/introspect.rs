//! Redshift catalog introspection.
//!
//! ACL columns are fetched as `|`-joined text and parsed by
//! [`parse_acl`](crate::acl::parse_acl), so grantee matching happens on the
//! full (kind, name) pair in Rust instead of by substring in SQL.

use crate::acl::parse_acl;
use crate::catalog::{ApplyError, ApplyStep, BoxFuture, Catalog, CatalogError, ObjectAcl};
use crate::traced::{Connection, ConnectionExt, execute_traced};
use crate::Statement;
use tokio_postgres::Row;

const DATABASE_ACL_SQL: &str = "\
SELECT d.datname::text, COALESCE(u.usename::text, ''), COALESCE(array_to_string(d.datacl, '|'), '')
FROM pg_database d
LEFT JOIN pg_user u ON u.usesysid = d.datdba
WHERE d.datname = current_database()";

const SCHEMA_ACL_SQL: &str = "\
SELECT n.nspname::text, COALESCE(u.usename::text, ''), COALESCE(array_to_string(n.nspacl, '|'), '')
FROM pg_namespace n
LEFT JOIN pg_user u ON u.usesysid = n.nspowner
WHERE n.nspname = $1";

const TABLE_ACLS_SQL: &str = "\
SELECT c.relname::text, COALESCE(u.usename::text, ''), COALESCE(array_to_string(c.relacl, '|'), '')
FROM pg_class c
JOIN pg_namespace n ON n.oid = c.relnamespace
LEFT JOIN pg_user u ON u.usesysid = c.relowner
WHERE n.nspname = $1 AND c.relkind IN ('r', 'v')
ORDER BY c.relname";

/// [`Catalog`] backed by a live Redshift connection.
///
/// Every call queries the system catalogs; nothing is cached.
pub struct PgCatalog<C: Connection> {
    conn: C,
}

impl<C: Connection> PgCatalog<C> {
    pub fn new(conn: C) -> Self {
        Self { conn }
    }

    /// Get the inner connection back.
    pub fn into_inner(self) -> C {
        self.conn
    }
}

fn object_acl(row: &Row) -> Result<ObjectAcl, CatalogError> {
    let name: String = row.try_get(0)?;
    let owner: String = row.try_get(1)?;
    let acl: String = row.try_get(2)?;
    Ok(ObjectAcl {
        name,
        owner,
        acl: parse_acl(&acl)?,
    })
}

impl<C: Connection> Catalog for PgCatalog<C> {
    fn database_acl(&self) -> BoxFuture<'_, Result<ObjectAcl, CatalogError>> {
        Box::pin(async move {
            let rows = self.conn.traced().query(DATABASE_ACL_SQL, &[]).await?;
            let row = rows
                .first()
                .ok_or("current database missing from pg_database")?;
            object_acl(row)
        })
    }

    fn schema_acl<'a>(
        &'a self,
        schema: &'a str,
    ) -> BoxFuture<'a, Result<Option<ObjectAcl>, CatalogError>> {
        Box::pin(async move {
            let row = self
                .conn
                .traced()
                .query_opt(SCHEMA_ACL_SQL, &[&schema])
                .await?;
            row.as_ref().map(object_acl).transpose()
        })
    }

    fn table_acls<'a>(
        &'a self,
        schema: &'a str,
    ) -> BoxFuture<'a, Result<Vec<ObjectAcl>, CatalogError>> {
        Box::pin(async move {
            let rows = self
                .conn
                .traced()
                .query(TABLE_ACLS_SQL, &[&schema])
                .await?;
            rows.iter().map(object_acl).collect()
        })
    }

    fn apply<'a>(
        &'a mut self,
        statements: &'a [Statement],
    ) -> BoxFuture<'a, Result<(), ApplyError>> {
        Box::pin(async move {
            let tx = self.conn.transaction().await.map_err(|e| ApplyError {
                step: ApplyStep::Begin,
                source: e.into(),
            })?;
            for (index, statement) in statements.iter().enumerate() {
                // On error `tx` is dropped here, which rolls the transaction back.
                execute_traced(&tx, &statement.to_sql())
                    .await
                    .map_err(|e| ApplyError {
                        step: ApplyStep::Statement(index),
                        source: e.into(),
                    })?;
            }
            tx.commit().await.map_err(|e| ApplyError {
                step: ApplyStep::Commit,
                source: e.into(),
            })
        })
    }
}
