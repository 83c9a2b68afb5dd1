//! Reading the privileges a grantee actually holds.
//!
//! [`read_actual`] resolves the concrete objects a [`GrantSpec`] covers and
//! collects, per object, the privileges explicitly granted to the grantee.
//! The result still contains whatever the owner holds through its own ACL
//! entry; [`filter_owner_implied`](crate::filter_owner_implied) is the
//! separate step that takes those out.
//!
//! Nothing is cached between calls.

use crate::acl::privileges_of;
use crate::{
    Catalog, CatalogError, Error, GrantSpec, ObjectAcl, ObjectSelection, ObjectType, Privilege,
    Result,
};
use std::collections::{BTreeMap, BTreeSet};

/// Privileges on one concrete object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectPrivileges {
    /// Owning user of the object.
    pub owner: String,
    /// Privileges established by GRANT.
    pub explicit: BTreeSet<Privilege>,
    /// Privileges held through ownership. Only the owner filter fills this.
    pub implied: BTreeSet<Privilege>,
}

impl ObjectPrivileges {
    /// Privileges the grantee holds one way or another.
    pub fn satisfied(&self) -> BTreeSet<Privilege> {
        self.explicit.union(&self.implied).copied().collect()
    }
}

/// Per-object privileges of one grantee, keyed by unqualified object name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActualPrivilegeSet {
    pub objects: BTreeMap<String, ObjectPrivileges>,
}

impl ActualPrivilegeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, object: impl Into<String>, privileges: ObjectPrivileges) {
        self.objects.insert(object.into(), privileges);
    }

    pub fn get(&self, object: &str) -> Option<&ObjectPrivileges> {
        self.objects.get(object)
    }

    /// Object names covered, sorted.
    pub fn object_names(&self) -> impl Iterator<Item = &str> {
        self.objects.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// The same objects with nothing granted: the starting point of a create.
    pub fn without_privileges(&self) -> Self {
        Self {
            objects: self
                .objects
                .iter()
                .map(|(name, privs)| {
                    (
                        name.clone(),
                        ObjectPrivileges {
                            owner: privs.owner.clone(),
                            ..ObjectPrivileges::default()
                        },
                    )
                })
                .collect(),
        }
    }
}

/// What to do when a named schema or table is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OnMissing {
    Fail,
    Skip,
}

/// Read the grantee's explicit privileges on every object `spec` covers.
///
/// For a table grant over all objects, the tables currently in the schema
/// become the effective object list. A missing schema or named table fails
/// with [`Error::ObjectNotFound`].
pub async fn read_actual<C: Catalog + ?Sized>(
    catalog: &C,
    spec: &GrantSpec,
) -> Result<ActualPrivilegeSet> {
    read(catalog, spec, OnMissing::Fail).await
}

/// Like [`read_actual`], but objects that no longer exist are left out
/// instead of failing. Used when tearing a grant down.
pub async fn read_existing<C: Catalog + ?Sized>(
    catalog: &C,
    spec: &GrantSpec,
) -> Result<ActualPrivilegeSet> {
    read(catalog, spec, OnMissing::Skip).await
}

async fn read<C: Catalog + ?Sized>(
    catalog: &C,
    spec: &GrantSpec,
    on_missing: OnMissing,
) -> Result<ActualPrivilegeSet> {
    spec.validate()?;

    let query_error = |object: &str| {
        let object = object.to_string();
        move |source: CatalogError| Error::CatalogQuery {
            grantee: spec.grantee.clone(),
            object_type: spec.object_type,
            object,
            source,
        }
    };
    let not_found = |object_type: ObjectType, object: String| Error::ObjectNotFound {
        grantee: spec.grantee.clone(),
        object_type,
        object,
    };

    let mut actual = ActualPrivilegeSet::new();
    let schema = spec.schema_name();

    match spec.object_type {
        ObjectType::Database => {
            let database = catalog
                .database_acl()
                .await
                .map_err(query_error("current database"))?;
            add_object(&mut actual, spec, &database);
        }
        ObjectType::Schema => match catalog
            .schema_acl(schema)
            .await
            .map_err(query_error(schema))?
        {
            Some(found) => add_object(&mut actual, spec, &found),
            None if on_missing == OnMissing::Fail => {
                return Err(not_found(ObjectType::Schema, schema.to_string()));
            }
            None => {}
        },
        ObjectType::Table => {
            let exists = catalog
                .schema_acl(schema)
                .await
                .map_err(query_error(schema))?
                .is_some();
            if !exists {
                return match on_missing {
                    OnMissing::Fail => Err(not_found(ObjectType::Schema, schema.to_string())),
                    OnMissing::Skip => Ok(actual),
                };
            }

            let tables = catalog
                .table_acls(schema)
                .await
                .map_err(query_error(schema))?;
            match &spec.objects {
                ObjectSelection::All => {
                    for table in &tables {
                        add_object(&mut actual, spec, table);
                    }
                }
                ObjectSelection::Named(names) => {
                    for name in names {
                        match tables.iter().find(|t| &t.name == name) {
                            Some(table) => add_object(&mut actual, spec, table),
                            None if on_missing == OnMissing::Fail => {
                                return Err(not_found(
                                    ObjectType::Table,
                                    format!("{}.{}", schema, name),
                                ));
                            }
                            None => {}
                        }
                    }
                }
            }
        }
    }

    Ok(actual)
}

fn add_object(actual: &mut ActualPrivilegeSet, spec: &GrantSpec, object: &ObjectAcl) {
    actual.insert(
        object.name.clone(),
        ObjectPrivileges {
            owner: object.owner.clone(),
            explicit: privileges_of(&object.acl, &spec.grantee, spec.object_type),
            implied: BTreeSet::new(),
        },
    );
}
