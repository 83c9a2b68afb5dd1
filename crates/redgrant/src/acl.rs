//! Redshift `aclitem` parsing.
//!
//! Catalog ACL columns (`datacl`, `nspacl`, `relacl`) are read as text with
//! `array_to_string(acl, '|')`, giving strings like:
//!
//! ```text
//! owner=UC/owner|group analysts=U/owner|=U/owner
//! ```
//!
//! Each item is `[kind ]name=privileges/grantor`, where `kind` is `group`
//! or `role` (absent for users) and an empty name means PUBLIC. Names with
//! special characters are double-quoted. A `*` after a privilege character
//! marks the grant option and is ignored here.
//!
//! Matching on the full (kind, name) pair is what keeps a user's privileges
//! from leaking onto a group of the same name.

use crate::{Grantee, ObjectType, Privilege};
use std::collections::BTreeSet;
use std::fmt;

/// Who an ACL item grants to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AclGrantee {
    Public,
    User(String),
    Group(String),
    Role(String),
}

impl AclGrantee {
    /// Whether this entry is about `grantee`.
    pub fn matches(&self, grantee: &Grantee) -> bool {
        match (self, grantee) {
            (AclGrantee::User(name), Grantee::User(wanted)) => name == wanted,
            (AclGrantee::Group(name), Grantee::Group(wanted)) => name == wanted,
            _ => false,
        }
    }
}

/// One parsed ACL item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclItem {
    pub grantee: AclGrantee,
    /// Raw privilege characters, grant-option markers stripped.
    pub privileges: String,
    pub grantor: String,
}

impl AclItem {
    /// Privileges of this item that belong to `object_type`'s vocabulary.
    pub fn privileges_for(&self, object_type: ObjectType) -> BTreeSet<Privilege> {
        self.privileges
            .chars()
            .filter_map(|c| Privilege::from_acl_char(object_type, c))
            .collect()
    }
}

/// Error returned for malformed ACL text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclParseError {
    pub item: String,
    pub reason: &'static str,
}

impl fmt::Display for AclParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed acl item '{}': {}", self.item, self.reason)
    }
}

impl std::error::Error for AclParseError {}

/// Parse a `|`-joined ACL string. An empty string (NULL acl) yields no items.
pub fn parse_acl(text: &str) -> Result<Vec<AclItem>, AclParseError> {
    split_outside_quotes(text, '|')
        .into_iter()
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(parse_item)
        .collect()
}

/// Explicit privileges `grantee` holds according to `items`.
///
/// Multiple entries for the same grantee (one per grantor) are merged.
pub fn privileges_of(
    items: &[AclItem],
    grantee: &Grantee,
    object_type: ObjectType,
) -> BTreeSet<Privilege> {
    items
        .iter()
        .filter(|item| item.grantee.matches(grantee))
        .flat_map(|item| item.privileges_for(object_type))
        .collect()
}

fn parse_item(item: &str) -> Result<AclItem, AclParseError> {
    let err = |reason| AclParseError {
        item: item.to_string(),
        reason,
    };

    let parts = split_outside_quotes(item, '=');
    let [who, rest] = parts.as_slice() else {
        return Err(err("expected exactly one '=' outside quotes"));
    };
    let parts = split_outside_quotes(rest, '/');
    let [privileges, grantor] = parts.as_slice() else {
        return Err(err("expected 'privileges/grantor'"));
    };

    let grantee = if let Some(name) = who.strip_prefix("group ") {
        AclGrantee::Group(unquote(name))
    } else if let Some(name) = who.strip_prefix("role ") {
        AclGrantee::Role(unquote(name))
    } else if who.is_empty() {
        AclGrantee::Public
    } else {
        AclGrantee::User(unquote(who))
    };

    Ok(AclItem {
        grantee,
        privileges: privileges.chars().filter(|c| *c != '*').collect(),
        grantor: unquote(grantor),
    })
}

fn split_outside_quotes(text: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        if c == '"' {
            in_quotes = !in_quotes;
        } else if c == separator && !in_quotes {
            parts.push(&text[start..i]);
            start = i + c.len_utf8();
        }
    }
    parts.push(&text[start..]);
    parts
}

fn unquote(name: &str) -> String {
    let name = name.trim();
    match name.strip_prefix('"').and_then(|n| n.strip_suffix('"')) {
        Some(inner) => inner.replace("\"\"", "\""),
        None => name.to_string(),
    }
}
