//! Declarative privilege reconciliation for Amazon Redshift.
//!
//! A [`GrantSpec`] declares which privileges a group or user should hold on
//! a database, a schema, or a set of tables. The engine reads what the
//! catalog actually says, works out the minimal GRANT/REVOKE plan, and
//! applies it in one transaction.
//!
//! ```text
//! GrantSpec ─► read_actual ─► filter_owner_implied ─► reconcile ─► apply
//!                  ▲                                                 │
//!                  └──────────────── Catalog ◄───────────────────────┘
//! ```
//!
//! - [`GrantIdentity`] is the stable id of a declaration; changing the
//!   grantee, object type, schema or object set changes it.
//! - [`read_actual`] never caches; each call queries the catalog.
//! - [`filter_owner_implied`] keeps an object owner's own ACL entry from
//!   showing up as drift. It applies to the owning user only; a group never
//!   owns anything, whatever its name or members.
//! - [`GrantResource`] drives create, read, update and delete on top.
//!
//! # Example
//!
//! ```ignore
//! let pool = deadpool_postgres::Config { url: Some(url), ..Default::default() }
//!     .create_pool(Some(Runtime::Tokio1), NoTls)?;
//! let mut resource = GrantResource::new(PgCatalog::new(pool.get().await?));
//!
//! let spec = GrantSpec::schema(Grantee::Group("analysts".into()), "sales", [Privilege::Usage]);
//! let applied = resource.create(spec).await?;
//! println!("{}", applied.state.identity); // analysts_schema_sales
//! ```

pub mod acl;
mod actual;
mod catalog;
mod diff;
mod error;
mod executor;
mod identity;
mod introspect;
mod lifecycle;
#[cfg(test)]
mod memory;
mod owner;
mod privilege;
mod spec;
mod sql;
mod traced;

pub use actual::{ActualPrivilegeSet, ObjectPrivileges, read_actual, read_existing};
pub use catalog::{ApplyError, ApplyStep, BoxFuture, Catalog, CatalogError, ObjectAcl};
pub use diff::{DiffPlan, reconcile, revoke_declared};
pub use error::{Error, Result};
pub use executor::{AppliedResult, Statement, StatementKind, apply, statements_for};
pub use identity::GrantIdentity;
pub use introspect::PgCatalog;
pub use lifecycle::{
    Applied, Change, GrantResource, GrantState, GrantStatus, ReadOutcome, plan_change,
};
pub use owner::filter_owner_implied;
pub use privilege::{ObjectType, Privilege};
pub use spec::{GrantSpec, Grantee, ObjectSelection};
pub use sql::Ident;
pub use traced::{Connection, ConnectionExt, TracedConn, execute_traced};
