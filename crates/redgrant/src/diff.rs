//! Privilege diffing - compare declared privileges against catalog state.
//!
//! [`reconcile`] compares the desired privilege set against the
//! [`ActualPrivilegeSet`] of every concrete object a grant covers and
//! produces a [`DiffPlan`]: what to grant and what to revoke, per object.
//!
//! The diff is always per object. A grant over all tables of a schema is
//! diffed against each table that exists right now, so a table created after
//! the last apply shows up as missing grants on the next read.
//!
//! ```text
//! desired: {select, insert}
//! actual:  orders {select, update}
//!
//! orders:
//!   + insert
//!   - update
//! ```
//!
//! Owner-implied privileges count as held, so they are never granted, and
//! are never revoked.

use crate::{ActualPrivilegeSet, Privilege};
use std::collections::BTreeSet;
use std::fmt;

/// The GRANT/REVOKE work needed to converge one grant resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffPlan {
    /// (object, privilege) pairs to grant.
    pub to_grant: BTreeSet<(String, Privilege)>,
    /// (object, privilege) pairs to revoke.
    pub to_revoke: BTreeSet<(String, Privilege)>,
}

impl DiffPlan {
    /// Returns true if there is nothing to do.
    pub fn is_empty(&self) -> bool {
        self.to_grant.is_empty() && self.to_revoke.is_empty()
    }

    /// Count total number of (object, privilege) changes.
    pub fn change_count(&self) -> usize {
        self.to_grant.len() + self.to_revoke.len()
    }

    /// Objects touched by the plan, sorted.
    pub fn objects(&self) -> BTreeSet<&str> {
        self.to_grant
            .iter()
            .chain(&self.to_revoke)
            .map(|(object, _)| object.as_str())
            .collect()
    }

    /// Privileges to grant on `object`.
    pub fn grants_on(&self, object: &str) -> BTreeSet<Privilege> {
        privileges_on(&self.to_grant, object)
    }

    /// Privileges to revoke on `object`.
    pub fn revokes_on(&self, object: &str) -> BTreeSet<Privilege> {
        privileges_on(&self.to_revoke, object)
    }
}

fn privileges_on(pairs: &BTreeSet<(String, Privilege)>, object: &str) -> BTreeSet<Privilege> {
    pairs
        .iter()
        .filter(|(o, _)| o == object)
        .map(|(_, p)| *p)
        .collect()
}

impl fmt::Display for DiffPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for object in self.objects() {
            writeln!(f, "{}:", object)?;
            for p in self.revokes_on(object) {
                writeln!(f, "  - {}", p)?;
            }
            for p in self.grants_on(object) {
                writeln!(f, "  + {}", p)?;
            }
        }
        Ok(())
    }
}

/// Compute the minimal plan that turns `actual` into `desired` on every object.
///
/// Pure and deterministic: inputs are sets, so declaration order never
/// matters.
///
/// ```ignore
/// let actual = read_actual(&catalog, &spec).await?;
/// let actual = filter_owner_implied(actual, &spec.grantee, spec.object_type);
/// let plan = reconcile(&spec.privileges, &actual);
/// ```
pub fn reconcile(desired: &BTreeSet<Privilege>, actual: &ActualPrivilegeSet) -> DiffPlan {
    let mut plan = DiffPlan::default();

    for (object, privileges) in &actual.objects {
        let held = privileges.satisfied();

        // Privileges to grant
        for p in desired.difference(&held) {
            plan.to_grant.insert((object.clone(), *p));
        }

        // Privileges to revoke (only explicit ones, implied cannot be revoked)
        for p in privileges.explicit.difference(desired) {
            plan.to_revoke.insert((object.clone(), *p));
        }
    }

    plan
}

/// Plan that withdraws everything a grant resource declared.
///
/// Revokes `desired` on every object regardless of what is currently
/// granted, since revoking a privilege nobody holds is a no-op. Owner-implied
/// privileges are left alone.
pub fn revoke_declared(desired: &BTreeSet<Privilege>, actual: &ActualPrivilegeSet) -> DiffPlan {
    let mut plan = DiffPlan::default();
    for (object, privileges) in &actual.objects {
        for p in desired.difference(&privileges.implied) {
            plan.to_revoke.insert((object.clone(), *p));
        }
    }
    plan
}
