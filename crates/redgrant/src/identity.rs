//! Grant identities.
//!
//! The identity is the key under which a grant resource is tracked. It is
//! derived only from *what* the grant targets (grantee, object type, schema
//! and object set), never from the privileges, so changing privileges is an
//! in-place update while changing the target forces replacement.
//!
//! ```text
//! {grantee}_database
//! {grantee}_schema_{schema}
//! {grantee}_table_{schema}_{object_1}_{object_2}...   (objects sorted)
//! {grantee}_table_{schema}                            (all tables)
//! ```
//!
//! `{grantee}` is the group name for groups and `un:{user}` for users.
//! `:` never appears in an unquoted Redshift identifier, so a user and a
//! group sharing a name get distinct identities.

use crate::{GrantSpec, Grantee, ObjectSelection, ObjectType, Result};
use std::fmt;

/// Canonical key of a grant resource.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GrantIdentity(String);

impl GrantIdentity {
    /// Derive the identity of a grant declaration.
    ///
    /// Pure: the same declaration always yields the same identity, whatever
    /// the order its objects were declared in.
    ///
    /// Parts are joined with `_`, which identifiers may contain too, so two
    /// different targets can share an identity: group `g_schema_s` on its
    /// database and group `g` on schema `s_database` both give
    /// `g_schema_s_database`. Existing identities depend on the format, so
    /// callers managing several grants must reject such pairs themselves.
    pub fn build(spec: &GrantSpec) -> Result<Self> {
        spec.validate()?;
        let spec = spec.clone().normalized();

        let mut parts = vec![grantee_key(&spec.grantee), spec.object_type.to_string()];
        match spec.object_type {
            ObjectType::Database => {}
            ObjectType::Schema => parts.push(spec.schema_name().to_string()),
            ObjectType::Table => {
                parts.push(spec.schema_name().to_string());
                // BTreeSet iteration is sorted.
                if let ObjectSelection::Named(objects) = &spec.objects {
                    parts.extend(objects.iter().cloned());
                }
            }
        }

        Ok(Self(parts.join("_")))
    }

    /// Wrap a previously persisted identity.
    pub fn from_stored(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn grantee_key(grantee: &Grantee) -> String {
    match grantee {
        Grantee::Group(name) => name.clone(),
        Grantee::User(name) => format!("un:{}", name),
    }
}

impl fmt::Display for GrantIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for GrantIdentity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
