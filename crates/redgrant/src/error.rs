use crate::{CatalogError, GrantIdentity, Grantee, ObjectType};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The grant declaration is malformed. Raised before any I/O.
    #[error("invalid grant spec: {reason}")]
    InvalidSpec { reason: String },

    /// Reading catalog state failed.
    #[error("catalog query for {grantee} on {object_type} {object} failed: {source}")]
    CatalogQuery {
        grantee: Grantee,
        object_type: ObjectType,
        object: String,
        #[source]
        source: CatalogError,
    },

    /// A schema or table named in the declaration does not exist.
    #[error("{object_type} {object} does not exist (grantee {grantee})")]
    ObjectNotFound {
        grantee: Grantee,
        object_type: ObjectType,
        object: String,
    },

    /// A GRANT or REVOKE statement failed; the whole transaction was rolled back.
    #[error("applying privileges for {grantee} on {object_type} failed at `{statement}`: {source}")]
    GrantApplication {
        grantee: Grantee,
        object_type: ObjectType,
        statement: String,
        #[source]
        source: CatalogError,
    },

    /// An in-place update was requested for a declaration whose identity changed.
    #[error("grant identity changed from {from} to {to}, the grant must be replaced")]
    IdentityChanged {
        from: GrantIdentity,
        to: GrantIdentity,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
