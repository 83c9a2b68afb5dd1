//! The seam between the reconciliation engine and the database.
//!
//! The engine only needs a handful of catalog reads and one transactional
//! write. [`PgCatalog`](crate::PgCatalog) implements them against a live
//! cluster; tests implement them in memory.
//!
//! Nothing behind this trait may cache: two grant resources reconciled
//! concurrently can target the same objects, and each must see the state
//! the database has right now.

use crate::Statement;
use crate::acl::AclItem;
use std::future::Future;
use std::pin::Pin;

/// Boxed, sendable future returned by [`Catalog`] methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Error type of catalog reads and writes.
pub type CatalogError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// An object together with its owner and parsed ACL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectAcl {
    /// Unqualified object name (database, schema or table name).
    pub name: String,
    /// Name of the owning user.
    pub owner: String,
    pub acl: Vec<AclItem>,
}

/// Where in a transactional apply a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyStep {
    Begin,
    /// Index into the statement slice.
    Statement(usize),
    Commit,
}

/// A failed transactional apply.
#[derive(Debug)]
pub struct ApplyError {
    pub step: ApplyStep,
    pub source: CatalogError,
}

/// Catalog access needed by the engine.
pub trait Catalog: Send + Sync {
    /// The current database.
    fn database_acl(&self) -> BoxFuture<'_, Result<ObjectAcl, CatalogError>>;

    /// A schema, or `None` if it does not exist.
    fn schema_acl<'a>(
        &'a self,
        schema: &'a str,
    ) -> BoxFuture<'a, Result<Option<ObjectAcl>, CatalogError>>;

    /// Every table and view in `schema`, sorted by name. Empty when the
    /// schema has no tables.
    fn table_acls<'a>(
        &'a self,
        schema: &'a str,
    ) -> BoxFuture<'a, Result<Vec<ObjectAcl>, CatalogError>>;

    /// Run `statements` in order inside a single transaction.
    ///
    /// Either every statement takes effect or none does.
    fn apply<'a>(&'a mut self, statements: &'a [Statement])
    -> BoxFuture<'a, Result<(), ApplyError>>;
}
