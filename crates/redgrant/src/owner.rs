//! Owner-implied privilege filtering.
//!
//! The owner of an object holds every privilege on it without an explicit
//! GRANT. Once anything is granted on the object, Redshift also writes an
//! ACL entry for the owner, so the raw catalog read shows those privileges
//! as if they had been granted. Left alone this produces a permanent diff:
//! declaring a subset of the owner's privileges would keep asking to revoke
//! the rest, and declaring privileges the owner has implicitly would keep
//! asking to grant them.
//!
//! [`filter_owner_implied`] runs between the State Reader and the
//! Reconciler. For every object owned by the grantee it moves the object
//! type's owner-implied privileges from `explicit` to `implied`.
//!
//! Only a user can own an object. A group grantee never holds owner
//! privileges, even when the owning user is one of its members or the group
//! shares the owner's name: the group's grant is what gives its other
//! members access, so it must stay visible to drift detection and delete.

use crate::{ActualPrivilegeSet, Grantee, ObjectType};
use std::collections::BTreeSet;

/// Separate owner-implied privileges from explicit grants.
pub fn filter_owner_implied(
    mut actual: ActualPrivilegeSet,
    grantee: &Grantee,
    object_type: ObjectType,
) -> ActualPrivilegeSet {
    let implied: BTreeSet<_> = object_type.owner_implied().iter().copied().collect();

    for (object, privileges) in actual.objects.iter_mut() {
        if !grantee.is_owner(&privileges.owner) {
            continue;
        }
        tracing::debug!(
            %grantee,
            %object_type,
            object = %object,
            owner = %privileges.owner,
            "grantee owns object, treating owner privileges as implied"
        );
        privileges.explicit.retain(|p| !implied.contains(p));
        privileges.implied = implied.clone();
    }

    actual
}
