//! Privilege vocabulary.
//!
//! Each [`ObjectType`] carries its own set of valid privileges, the subset an
//! owner holds implicitly, and the keywords used when rendering GRANT and
//! REVOKE statements. Redshift stores privileges in `aclitem` arrays where
//! each privilege is a single character; [`Privilege::acl_char`] maps
//! between the two.
//!
//! | object type | privileges | acl chars |
//! |-------------|------------|-----------|
//! | `database`  | create, temporary | `C`, `T` |
//! | `schema`    | create, usage | `C`, `U` |
//! | `table`     | select, insert, update, delete, drop, references | `r`, `a`, `w`, `d`, `D`, `x` |

use crate::Error;
use std::fmt;
use std::str::FromStr;

/// The kind of database object a grant targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ObjectType {
    Database,
    Schema,
    Table,
}

impl ObjectType {
    /// Every object type, in declaration order.
    pub const ALL: [ObjectType; 3] = [ObjectType::Database, ObjectType::Schema, ObjectType::Table];

    /// Lower-case name, as used in configuration and identities.
    pub fn as_str(self) -> &'static str {
        match self {
            ObjectType::Database => "database",
            ObjectType::Schema => "schema",
            ObjectType::Table => "table",
        }
    }

    /// Keyword used after `ON` in GRANT/REVOKE statements.
    pub fn sql_keyword(self) -> &'static str {
        match self {
            ObjectType::Database => "DATABASE",
            ObjectType::Schema => "SCHEMA",
            ObjectType::Table => "TABLE",
        }
    }

    /// Privileges that may be granted on this object type.
    pub fn privileges(self) -> &'static [Privilege] {
        match self {
            ObjectType::Database => &[Privilege::Create, Privilege::Temporary],
            ObjectType::Schema => &[Privilege::Create, Privilege::Usage],
            ObjectType::Table => &[
                Privilege::Select,
                Privilege::Insert,
                Privilege::Update,
                Privilege::Delete,
                Privilege::Drop,
                Privilege::References,
            ],
        }
    }

    /// Privileges the owner of an object holds without an explicit GRANT.
    ///
    /// These can never be revoked through this tool and are never reported as
    /// missing for the owner.
    pub fn owner_implied(self) -> &'static [Privilege] {
        // Owners hold every privilege on their own objects.
        self.privileges()
    }

    /// Whether `privilege` belongs to this object type's vocabulary.
    pub fn supports(self, privilege: Privilege) -> bool {
        self.privileges().contains(&privilege)
    }

    /// Whether grants on this object type are scoped to a schema.
    pub fn requires_schema(self) -> bool {
        match self {
            ObjectType::Database => false,
            ObjectType::Schema | ObjectType::Table => true,
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        ObjectType::ALL
            .into_iter()
            .find(|t| t.as_str() == lowered)
            .ok_or_else(|| Error::InvalidSpec {
                reason: format!(
                    "unknown object type '{}', expected one of: database, schema, table",
                    s
                ),
            })
    }
}

/// A single privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Privilege {
    Select,
    Insert,
    Update,
    Delete,
    Drop,
    References,
    Create,
    Usage,
    Temporary,
}

impl Privilege {
    /// Every privilege, in declaration order.
    pub const ALL: [Privilege; 9] = [
        Privilege::Select,
        Privilege::Insert,
        Privilege::Update,
        Privilege::Delete,
        Privilege::Drop,
        Privilege::References,
        Privilege::Create,
        Privilege::Usage,
        Privilege::Temporary,
    ];

    /// Lower-case name, as used in configuration.
    pub fn as_str(self) -> &'static str {
        match self {
            Privilege::Select => "select",
            Privilege::Insert => "insert",
            Privilege::Update => "update",
            Privilege::Delete => "delete",
            Privilege::Drop => "drop",
            Privilege::References => "references",
            Privilege::Create => "create",
            Privilege::Usage => "usage",
            Privilege::Temporary => "temporary",
        }
    }

    /// SQL keyword used in GRANT/REVOKE privilege lists.
    pub fn sql_keyword(self) -> &'static str {
        match self {
            Privilege::Select => "SELECT",
            Privilege::Insert => "INSERT",
            Privilege::Update => "UPDATE",
            Privilege::Delete => "DELETE",
            Privilege::Drop => "DROP",
            Privilege::References => "REFERENCES",
            Privilege::Create => "CREATE",
            Privilege::Usage => "USAGE",
            Privilege::Temporary => "TEMPORARY",
        }
    }

    /// The character Redshift uses for this privilege in an `aclitem`.
    pub fn acl_char(self) -> char {
        match self {
            Privilege::Select => 'r',
            Privilege::Insert => 'a',
            Privilege::Update => 'w',
            Privilege::Delete => 'd',
            Privilege::Drop => 'D',
            Privilege::References => 'x',
            Privilege::Create => 'C',
            Privilege::Usage => 'U',
            Privilege::Temporary => 'T',
        }
    }

    /// Decode an `aclitem` character in the context of `object_type`.
    ///
    /// Characters outside the object type's vocabulary (`R`ule, `t`rigger,
    /// grant-option markers, ...) decode to `None`.
    pub fn from_acl_char(object_type: ObjectType, c: char) -> Option<Privilege> {
        object_type
            .privileges()
            .iter()
            .copied()
            .find(|p| p.acl_char() == c)
    }
}

impl fmt::Display for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Privilege {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        if lowered == "temp" {
            return Ok(Privilege::Temporary);
        }
        Privilege::ALL
            .into_iter()
            .find(|p| p.as_str() == lowered)
            .ok_or_else(|| Error::InvalidSpec {
                reason: format!("unknown privilege '{}'", s),
            })
    }
}
