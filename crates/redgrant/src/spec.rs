//! Grant declarations.
//!
//! A [`GrantSpec`] is the desired state of one grant resource: who receives
//! which privileges on which objects. Specs are normalized on construction
//! (names lower-cased, the way Redshift folds unquoted identifiers) and
//! checked by [`GrantSpec::validate`] before any catalog access.

use crate::sql::Ident;
use crate::{Error, ObjectType, Privilege, Result};
use std::collections::BTreeSet;
use std::fmt;

/// The principal a grant targets.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Grantee {
    Group(String),
    User(String),
}

impl Grantee {
    /// Build a grantee from the loose `group`/`user` pair of a declaration.
    ///
    /// Exactly one of the two must be set.
    pub fn from_parts(group: Option<&str>, user: Option<&str>) -> Result<Self> {
        match (group, user) {
            (Some(group), None) => Ok(Grantee::Group(group.to_ascii_lowercase())),
            (None, Some(user)) => Ok(Grantee::User(user.to_ascii_lowercase())),
            (Some(_), Some(_)) => Err(Error::InvalidSpec {
                reason: "only one of `group` or `user` may be set".to_string(),
            }),
            (None, None) => Err(Error::InvalidSpec {
                reason: "one of `group` or `user` must be set".to_string(),
            }),
        }
    }

    /// The bare principal name.
    pub fn name(&self) -> &str {
        match self {
            Grantee::Group(name) | Grantee::User(name) => name,
        }
    }

    /// Whether this grantee is the user owning an object.
    ///
    /// Owners are always users in Redshift, so a group never matches even
    /// when it shares the owner's name.
    pub fn is_owner(&self, owner: &str) -> bool {
        match self {
            Grantee::User(name) => name == owner,
            Grantee::Group(_) => false,
        }
    }

    /// The grantee as written after `TO`/`FROM`: `GROUP "g"` or `"u"`.
    pub fn to_sql(&self) -> String {
        match self {
            Grantee::Group(name) => format!("GROUP {}", Ident(name)),
            Grantee::User(name) => format!("{}", Ident(name)),
        }
    }

    fn normalized(self) -> Self {
        match self {
            Grantee::Group(name) => Grantee::Group(name.to_ascii_lowercase()),
            Grantee::User(name) => Grantee::User(name.to_ascii_lowercase()),
        }
    }
}

impl fmt::Display for Grantee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Grantee::Group(name) => write!(f, "group {}", name),
            Grantee::User(name) => write!(f, "user {}", name),
        }
    }
}

/// Which objects of the grant's type are covered.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ObjectSelection {
    /// Every object of the type in the schema, resolved on each read.
    All,
    /// An explicit set of object names. Empty for database and schema grants.
    Named(BTreeSet<String>),
}

impl ObjectSelection {
    /// Build a selection from a declared object list and wildcard flag.
    pub fn from_parts<I, S>(objects: I, all_objects: bool) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let named: BTreeSet<String> = objects
            .into_iter()
            .map(|o| o.as_ref().to_ascii_lowercase())
            .collect();
        match (all_objects, named.is_empty()) {
            (true, true) => Ok(ObjectSelection::All),
            (true, false) => Err(Error::InvalidSpec {
                reason: "`objects` cannot be combined with `all_objects`".to_string(),
            }),
            (false, _) => Ok(ObjectSelection::Named(named)),
        }
    }

    /// No objects: the selection used by database and schema grants.
    pub fn none() -> Self {
        ObjectSelection::Named(BTreeSet::new())
    }

    pub fn is_all(&self) -> bool {
        matches!(self, ObjectSelection::All)
    }

    /// Named objects, empty for [`ObjectSelection::All`].
    pub fn names(&self) -> impl Iterator<Item = &str> {
        let names = match self {
            ObjectSelection::All => None,
            ObjectSelection::Named(names) => Some(names.iter().map(String::as_str)),
        };
        names.into_iter().flatten()
    }

    fn is_empty(&self) -> bool {
        match self {
            ObjectSelection::All => false,
            ObjectSelection::Named(names) => names.is_empty(),
        }
    }

    fn normalized(self) -> Self {
        match self {
            ObjectSelection::All => ObjectSelection::All,
            ObjectSelection::Named(names) => ObjectSelection::Named(
                names.into_iter().map(|n| n.to_ascii_lowercase()).collect(),
            ),
        }
    }
}

impl Default for ObjectSelection {
    fn default() -> Self {
        ObjectSelection::none()
    }
}

/// Desired state of one grant resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantSpec {
    pub grantee: Grantee,
    pub object_type: ObjectType,
    pub schema: Option<String>,
    pub objects: ObjectSelection,
    pub privileges: BTreeSet<Privilege>,
}

impl GrantSpec {
    /// Privileges on the current database.
    pub fn database(grantee: Grantee, privileges: impl IntoIterator<Item = Privilege>) -> Self {
        Self {
            grantee,
            object_type: ObjectType::Database,
            schema: None,
            objects: ObjectSelection::none(),
            privileges: privileges.into_iter().collect(),
        }
        .normalized()
    }

    /// Privileges on a schema.
    pub fn schema(
        grantee: Grantee,
        schema: impl Into<String>,
        privileges: impl IntoIterator<Item = Privilege>,
    ) -> Self {
        Self {
            grantee,
            object_type: ObjectType::Schema,
            schema: Some(schema.into()),
            objects: ObjectSelection::none(),
            privileges: privileges.into_iter().collect(),
        }
        .normalized()
    }

    /// Privileges on tables of a schema.
    pub fn table(
        grantee: Grantee,
        schema: impl Into<String>,
        objects: ObjectSelection,
        privileges: impl IntoIterator<Item = Privilege>,
    ) -> Self {
        Self {
            grantee,
            object_type: ObjectType::Table,
            schema: Some(schema.into()),
            objects,
            privileges: privileges.into_iter().collect(),
        }
        .normalized()
    }

    /// Lower-case every name.
    pub fn normalized(self) -> Self {
        Self {
            grantee: self.grantee.normalized(),
            object_type: self.object_type,
            schema: self.schema.map(|s| s.to_ascii_lowercase()),
            objects: self.objects.normalized(),
            privileges: self.privileges,
        }
    }

    /// Check the declaration's structural invariants.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| -> Result<()> { Err(Error::InvalidSpec { reason }) };

        if self.grantee.name().is_empty() {
            return invalid("grantee name is empty".to_string());
        }

        match (&self.schema, self.object_type.requires_schema()) {
            (None, true) => {
                return invalid(format!(
                    "`schema` is required for {} grants",
                    self.object_type
                ));
            }
            (Some(schema), false) => {
                return invalid(format!(
                    "`schema` ({}) must not be set for {} grants",
                    schema, self.object_type
                ));
            }
            (Some(schema), true) if schema.is_empty() => {
                return invalid("`schema` is empty".to_string());
            }
            _ => {}
        }

        match self.object_type {
            ObjectType::Database | ObjectType::Schema => {
                if !self.objects.is_empty() {
                    return invalid(format!(
                        "`objects` only apply to table grants, not {} grants",
                        self.object_type
                    ));
                }
            }
            ObjectType::Table => {
                if self.objects.is_empty() {
                    return invalid(
                        "table grants need at least one object or `all_objects`".to_string(),
                    );
                }
                if self.objects.names().any(str::is_empty) {
                    return invalid("object names must not be empty".to_string());
                }
            }
        }

        if self.privileges.is_empty() {
            return invalid("at least one privilege is required".to_string());
        }
        let unsupported: Vec<&str> = self
            .privileges
            .iter()
            .filter(|p| !self.object_type.supports(**p))
            .map(|p| p.as_str())
            .collect();
        if !unsupported.is_empty() {
            return invalid(format!(
                "privileges not valid for {} grants: {}",
                self.object_type,
                unsupported.join(", ")
            ));
        }

        Ok(())
    }

    /// The schema name, or an empty string for database grants.
    pub fn schema_name(&self) -> &str {
        self.schema.as_deref().unwrap_or_default()
    }
}
