//! Grant resource lifecycle.
//!
//! [`GrantResource`] wires the engine together the way a declarative
//! infrastructure tool drives a resource:
//!
//! - **create**: grant everything declared (diff against an empty state)
//! - **read**: re-read the catalog and report drift, never correcting it
//! - **update**: diff the new declaration against the current state and
//!   apply only the delta
//! - **delete**: revoke every privilege the resource declared
//!
//! Create and update re-read the catalog after applying to confirm the
//! grant converged.
//!
//! A change of grantee, object type, schema or object set changes the
//! [`GrantIdentity`]; such a change is always a replacement (delete the old
//! grant, create the new one), never an update. [`plan_change`] encodes that
//! rule for callers.

use crate::{
    ActualPrivilegeSet, AppliedResult, Catalog, DiffPlan, Error, GrantIdentity, GrantSpec,
    Privilege, Result, apply, filter_owner_implied, read_actual, read_existing, reconcile,
    revoke_declared,
};
use std::collections::BTreeSet;
use std::fmt;
use tracing::{debug, info, warn};

/// What a caller persists for a grant resource: its identity and the
/// declaration as written. Nothing else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantState {
    pub identity: GrantIdentity,
    pub spec: GrantSpec,
}

/// Where a grant resource stands relative to the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantStatus {
    /// The targeted schema or tables no longer exist.
    Absent,
    /// The database matches the declaration.
    Present,
    /// The database diverged from the declaration.
    Drifted,
}

impl fmt::Display for GrantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrantStatus::Absent => write!(f, "absent"),
            GrantStatus::Present => write!(f, "present"),
            GrantStatus::Drifted => write!(f, "drifted"),
        }
    }
}

/// Result of [`GrantResource::read`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadOutcome {
    pub status: GrantStatus,
    /// The declaration as the database currently reflects it. `None` when
    /// the grant is absent.
    pub observed: Option<GrantSpec>,
    /// What an update would do. Empty unless drifted.
    pub plan: DiffPlan,
}

/// Result of a create or update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    pub state: GrantState,
    pub result: AppliedResult,
    /// Status observed by the confirming re-read.
    pub status: GrantStatus,
}

/// A single lifecycle action for one grant resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// Nothing stored yet.
    Create(GrantSpec),
    /// Same identity, different privileges.
    Update { state: GrantState, spec: GrantSpec },
    /// Identity changed: delete the stored grant, then create the new one.
    Replace { state: GrantState, spec: GrantSpec },
    /// No longer declared.
    Delete(GrantState),
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Change::Create(spec) => write!(f, "+ create {} on {}", spec.grantee, spec.object_type),
            Change::Update { state, .. } => write!(f, "~ update {}", state.identity),
            Change::Replace { state, spec } => match GrantIdentity::build(spec) {
                Ok(identity) => write!(f, "-/+ replace {} -> {}", state.identity, identity),
                Err(_) => write!(f, "-/+ replace {}", state.identity),
            },
            Change::Delete(state) => write!(f, "- delete {}", state.identity),
        }
    }
}

/// Decide what to do with a grant given what is stored and what is declared.
///
/// Pure; drift is not considered here (use [`GrantResource::read`] for that).
pub fn plan_change(
    stored: Option<&GrantState>,
    declared: Option<&GrantSpec>,
) -> Result<Option<Change>> {
    let declared = declared.map(|spec| spec.clone().normalized());
    match (stored, declared) {
        (None, None) => Ok(None),
        (None, Some(spec)) => {
            GrantIdentity::build(&spec)?;
            Ok(Some(Change::Create(spec)))
        }
        (Some(state), None) => Ok(Some(Change::Delete(state.clone()))),
        (Some(state), Some(spec)) => {
            let identity = GrantIdentity::build(&spec)?;
            if identity != state.identity {
                Ok(Some(Change::Replace {
                    state: state.clone(),
                    spec,
                }))
            } else if spec != state.spec {
                Ok(Some(Change::Update {
                    state: state.clone(),
                    spec,
                }))
            } else {
                Ok(None)
            }
        }
    }
}

/// One grant resource bound to one catalog connection.
///
/// There is no concurrency within a resource. Reconcile independent
/// resources concurrently by giving each its own `GrantResource`.
pub struct GrantResource<C: Catalog> {
    catalog: C,
}

impl<C: Catalog> GrantResource<C> {
    pub fn new(catalog: C) -> Self {
        Self { catalog }
    }

    pub fn into_inner(self) -> C {
        self.catalog
    }

    /// Create the grant: apply every declared privilege.
    pub async fn create(&mut self, spec: GrantSpec) -> Result<Applied> {
        let spec = spec.normalized();
        let identity = GrantIdentity::build(&spec)?;
        info!(%identity, "creating grant");

        // Resolves the concrete objects (and fails if they do not exist).
        let current = read_actual(&self.catalog, &spec).await?;
        let plan = reconcile(&spec.privileges, &current.without_privileges());
        debug!(%identity, changes = plan.change_count(), "create plan");

        let result = apply(
            &mut self.catalog,
            &spec.grantee,
            spec.object_type,
            spec.schema.as_deref(),
            &plan,
        )
        .await?;

        let state = GrantState { identity, spec };
        let status = self.confirm(&state).await?;
        Ok(Applied {
            state,
            result,
            status,
        })
    }

    /// Compare the stored declaration with the database. Never writes.
    pub async fn read(&self, state: &GrantState) -> Result<ReadOutcome> {
        let identity = GrantIdentity::build(&state.spec)?;
        if identity != state.identity {
            return Err(Error::IdentityChanged {
                from: state.identity.clone(),
                to: identity,
            });
        }

        let spec = &state.spec;
        let actual = match read_actual(&self.catalog, spec).await {
            Ok(actual) => actual,
            Err(Error::ObjectNotFound { object_type, object, .. }) => {
                info!(identity = %state.identity, %object_type, %object, "grant target is gone");
                return Ok(ReadOutcome {
                    status: GrantStatus::Absent,
                    observed: None,
                    plan: DiffPlan::default(),
                });
            }
            Err(e) => return Err(e),
        };
        let actual = filter_owner_implied(actual, &spec.grantee, spec.object_type);

        let plan = reconcile(&spec.privileges, &actual);
        let status = if plan.is_empty() {
            GrantStatus::Present
        } else {
            GrantStatus::Drifted
        };
        debug!(identity = %state.identity, %status, changes = plan.change_count(), "read grant");

        Ok(ReadOutcome {
            status,
            observed: Some(GrantSpec {
                privileges: observed_privileges(&spec.privileges, &actual),
                ..spec.clone()
            }),
            plan,
        })
    }

    /// The statements-to-be for converging the database to `spec`, without
    /// applying them.
    pub async fn plan(&self, spec: &GrantSpec) -> Result<DiffPlan> {
        let spec = spec.clone().normalized();
        spec.validate()?;
        let actual = read_actual(&self.catalog, &spec).await?;
        let actual = filter_owner_implied(actual, &spec.grantee, spec.object_type);
        Ok(reconcile(&spec.privileges, &actual))
    }

    /// Converge the grant to `spec`, applying only the difference.
    ///
    /// Fails with [`Error::IdentityChanged`] when `spec` targets something
    /// else than `state`; that calls for a replacement.
    pub async fn update(&mut self, state: &GrantState, spec: GrantSpec) -> Result<Applied> {
        let spec = spec.normalized();
        let identity = GrantIdentity::build(&spec)?;
        if identity != state.identity {
            return Err(Error::IdentityChanged {
                from: state.identity.clone(),
                to: identity,
            });
        }
        info!(%identity, "updating grant");

        let plan = self.plan(&spec).await?;
        debug!(%identity, changes = plan.change_count(), "update plan");

        let result = apply(
            &mut self.catalog,
            &spec.grantee,
            spec.object_type,
            spec.schema.as_deref(),
            &plan,
        )
        .await?;

        let state = GrantState { identity, spec };
        let status = self.confirm(&state).await?;
        Ok(Applied {
            state,
            result,
            status,
        })
    }

    /// Revoke every declared privilege.
    ///
    /// Objects that no longer exist are skipped, and privileges that were
    /// already revoked elsewhere are revoked again harmlessly.
    pub async fn delete(&mut self, state: &GrantState) -> Result<AppliedResult> {
        let spec = &state.spec;
        info!(identity = %state.identity, "deleting grant");

        let actual = read_existing(&self.catalog, spec).await?;
        let actual = filter_owner_implied(actual, &spec.grantee, spec.object_type);
        let plan = revoke_declared(&spec.privileges, &actual);

        apply(
            &mut self.catalog,
            &spec.grantee,
            spec.object_type,
            spec.schema.as_deref(),
            &plan,
        )
        .await
    }

    async fn confirm(&self, state: &GrantState) -> Result<GrantStatus> {
        let outcome = self.read(state).await?;
        if outcome.status != GrantStatus::Present {
            warn!(
                identity = %state.identity,
                status = %outcome.status,
                remaining = outcome.plan.change_count(),
                "grant did not converge"
            );
        }
        Ok(outcome.status)
    }
}

/// Privileges held on every object, as far as the declaration is concerned.
///
/// Owner-implied privileges only count when they were declared, so an owner
/// declaring a subset of its privileges reads back exactly that subset.
fn observed_privileges(
    desired: &BTreeSet<Privilege>,
    actual: &ActualPrivilegeSet,
) -> BTreeSet<Privilege> {
    let mut per_object = actual.objects.values().map(|privileges| {
        let mut held = privileges.explicit.clone();
        held.extend(privileges.implied.intersection(desired).copied());
        held
    });

    let Some(first) = per_object.next() else {
        // No objects to contradict the declaration.
        return desired.clone();
    };
    per_object.fold(first, |acc, held| acc.intersection(&held).copied().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryCatalog;
    use crate::{Grantee, ObjectSelection, ObjectType};

    fn group(name: &str) -> Grantee {
        Grantee::Group(name.to_string())
    }

    fn set(privileges: &[Privilege]) -> BTreeSet<Privilege> {
        privileges.iter().copied().collect()
    }

    fn cluster() -> MemoryCatalog {
        let catalog = MemoryCatalog::new("dev", "admin");
        catalog.add_schema("sales", "admin", "");
        catalog.add_table("sales", "orders", "admin", "");
        catalog.add_table("sales", "customers", "admin", "");
        catalog
    }

    #[tokio::test]
    async fn test_create_database_grant() {
        let catalog = cluster();
        let mut resource = GrantResource::new(catalog.clone());

        let spec = GrantSpec::database(group("g"), [Privilege::Create, Privilege::Temporary]);
        let applied = resource.create(spec).await.unwrap();

        assert_eq!(applied.state.identity.as_str(), "g_database");
        assert_eq!(applied.status, GrantStatus::Present);
        assert_eq!(
            catalog.executed(),
            vec![r#"GRANT CREATE, TEMPORARY ON DATABASE "dev" TO GROUP "g""#]
        );
        assert_eq!(catalog.database_acl_text(), "admin=CT/admin|group g=CT/admin");
    }

    #[tokio::test]
    async fn test_create_table_grant_with_six_privileges() {
        let catalog = MemoryCatalog::new("dev", "rdsdb");
        catalog.add_schema("pg_catalog", "rdsdb", "");
        catalog.add_table("pg_catalog", "pg_user_info", "rdsdb", "");
        let mut resource = GrantResource::new(catalog.clone());

        let privileges = [
            Privilege::Select,
            Privilege::Update,
            Privilege::Insert,
            Privilege::Delete,
            Privilege::Drop,
            Privilege::References,
        ];
        let spec = GrantSpec::table(
            group("g"),
            "pg_catalog",
            ObjectSelection::from_parts(["pg_user_info"], false).unwrap(),
            privileges,
        );

        let applied = resource.create(spec).await.unwrap();
        assert_eq!(
            applied.state.identity.as_str(),
            "g_table_pg_catalog_pg_user_info"
        );
        let statement = &applied.result.statements[0];
        assert_eq!(statement.privileges, set(&privileges));
        assert_eq!(applied.result.statements.len(), 1);
    }

    #[tokio::test]
    async fn test_second_pass_is_empty() {
        let catalog = cluster();
        let mut resource = GrantResource::new(catalog.clone());
        let spec = GrantSpec::table(
            group("g"),
            "sales",
            ObjectSelection::All,
            [Privilege::Select, Privilege::Insert],
        );

        let applied = resource.create(spec.clone()).await.unwrap();
        let transactions = catalog.transactions();

        let again = resource.update(&applied.state, spec).await.unwrap();
        assert!(again.result.statements.is_empty());
        assert_eq!(catalog.transactions(), transactions);
        assert_eq!(again.status, GrantStatus::Present);
    }

    #[tokio::test]
    async fn test_schema_owner_regression() {
        // A user owns the schema, and a group with the same name is granted
        // only `create`. The owner's own ACL entry must not bleed into the
        // group, so a second plan is empty.
        let catalog = MemoryCatalog::new("dev", "admin");
        catalog.add_schema("tf_schema", "tf_user", "");
        let mut resource = GrantResource::new(catalog.clone());

        let spec = GrantSpec::schema(group("tf_user"), "tf_schema", [Privilege::Create]);
        let applied = resource.create(spec.clone()).await.unwrap();
        assert_eq!(
            catalog.schema_acl_text("tf_schema"),
            "tf_user=CU/tf_user|group tf_user=C/tf_user"
        );
        assert_eq!(applied.status, GrantStatus::Present);

        let outcome = resource.read(&applied.state).await.unwrap();
        assert_eq!(outcome.status, GrantStatus::Present);
        assert!(outcome.plan.is_empty());
        assert_eq!(outcome.observed.unwrap().privileges, set(&[Privilege::Create]));
        assert_eq!(plan_change(Some(&applied.state), Some(&spec)).unwrap(), None);
    }

    #[tokio::test]
    async fn test_group_containing_the_owner_is_not_the_owner() {
        let catalog = MemoryCatalog::new("dev", "admin");
        catalog.add_schema("s", "u", "");
        let mut resource = GrantResource::new(catalog.clone());

        // `u` owns `s` and is in `team` along with `alice`, who only gets in
        // through the group's grant.
        let spec = GrantSpec::schema(group("team"), "s", [Privilege::Usage]);
        let applied = resource.create(spec).await.unwrap();
        assert_eq!(applied.result.statements.len(), 1);
        assert_eq!(catalog.schema_acl_text("s"), "u=CU/u|group team=U/u");

        // Revoked behind our back: that is drift.
        catalog.set_schema_acl("s", "u=CU/u");
        let outcome = resource.read(&applied.state).await.unwrap();
        assert_eq!(outcome.status, GrantStatus::Drifted);

        let healed = resource
            .update(&applied.state, applied.state.spec.clone())
            .await
            .unwrap();
        assert_eq!(healed.status, GrantStatus::Present);

        let deleted = resource.delete(&applied.state).await.unwrap();
        let sql: Vec<String> = deleted.statements.iter().map(|s| s.to_sql()).collect();
        assert_eq!(sql, vec![r#"REVOKE USAGE ON SCHEMA "s" FROM GROUP "team""#]);
        assert_eq!(catalog.schema_acl_text("s"), "u=CU/u");
    }

    #[tokio::test]
    async fn test_owner_declaring_subset_reads_back_subset() {
        let catalog = MemoryCatalog::new("dev", "admin");
        catalog.add_schema("s", "u", "u=UC/u");
        let resource = GrantResource::new(catalog.clone());

        let spec = GrantSpec::schema(Grantee::User("u".to_string()), "s", [Privilege::Create]);
        let state = GrantState {
            identity: GrantIdentity::build(&spec).unwrap(),
            spec,
        };
        let outcome = resource.read(&state).await.unwrap();
        assert_eq!(outcome.status, GrantStatus::Present);
        assert_eq!(outcome.observed.unwrap().privileges, set(&[Privilege::Create]));
    }

    #[tokio::test]
    async fn test_read_reports_drift_without_fixing_it() {
        let catalog = cluster();
        let mut resource = GrantResource::new(catalog.clone());
        let spec = GrantSpec::schema(group("g"), "sales", [Privilege::Usage]);
        let applied = resource.create(spec).await.unwrap();

        // Someone revokes usage and grants create behind our back.
        catalog.set_schema_acl("sales", "admin=UC/admin|group g=C/admin");
        let transactions = catalog.transactions();

        let outcome = resource.read(&applied.state).await.unwrap();
        assert_eq!(outcome.status, GrantStatus::Drifted);
        assert_eq!(outcome.plan.grants_on("sales"), set(&[Privilege::Usage]));
        assert_eq!(outcome.plan.revokes_on("sales"), set(&[Privilege::Create]));
        assert_eq!(outcome.observed.unwrap().privileges, set(&[Privilege::Create]));
        assert_eq!(catalog.transactions(), transactions);
        assert_eq!(
            catalog.schema_acl_text("sales"),
            "admin=UC/admin|group g=C/admin"
        );
    }

    #[tokio::test]
    async fn test_update_applies_only_the_delta() {
        let catalog = cluster();
        let mut resource = GrantResource::new(catalog.clone());
        let objects = ObjectSelection::from_parts(["orders"], false).unwrap();
        let spec = GrantSpec::table(
            group("g"),
            "sales",
            objects.clone(),
            [Privilege::Select, Privilege::Update],
        );
        let applied = resource.create(spec).await.unwrap();

        let new_spec = GrantSpec::table(
            group("g"),
            "sales",
            objects,
            [Privilege::Select, Privilege::Insert],
        );
        let change = plan_change(Some(&applied.state), Some(&new_spec)).unwrap();
        assert!(matches!(change, Some(Change::Update { .. })));

        let preview = resource.plan(&new_spec).await.unwrap();
        assert_eq!(preview.change_count(), 2);
        // Planning never writes.
        assert_eq!(resource.plan(&new_spec).await.unwrap(), preview);

        let updated = resource.update(&applied.state, new_spec.clone()).await.unwrap();
        let sql: Vec<String> = updated.result.statements.iter().map(|s| s.to_sql()).collect();
        assert_eq!(
            sql,
            vec![
                r#"REVOKE UPDATE ON TABLE "sales"."orders" FROM GROUP "g""#,
                r#"GRANT INSERT ON TABLE "sales"."orders" TO GROUP "g""#,
            ]
        );
        assert_eq!(updated.status, GrantStatus::Present);
        assert!(resource.plan(&new_spec).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_with_new_identity_is_refused() {
        let catalog = cluster();
        let mut resource = GrantResource::new(catalog.clone());
        let spec = GrantSpec::schema(group("g"), "sales", [Privilege::Usage]);
        let applied = resource.create(spec).await.unwrap();

        let other = GrantSpec::schema(group("h"), "sales", [Privilege::Usage]);
        assert!(matches!(
            plan_change(Some(&applied.state), Some(&other)).unwrap(),
            Some(Change::Replace { .. })
        ));
        let err = resource.update(&applied.state, other).await.unwrap_err();
        assert!(matches!(err, Error::IdentityChanged { .. }));
    }

    #[tokio::test]
    async fn test_new_table_shows_up_as_drift() {
        let catalog = cluster();
        let mut resource = GrantResource::new(catalog.clone());
        let spec = GrantSpec::table(group("g"), "sales", ObjectSelection::All, [Privilege::Select]);
        let applied = resource.create(spec).await.unwrap();

        catalog.add_table("sales", "refunds", "admin", "");
        let outcome = resource.read(&applied.state).await.unwrap();
        assert_eq!(outcome.status, GrantStatus::Drifted);
        assert_eq!(outcome.plan.to_grant.len(), 1);
        assert_eq!(outcome.plan.grants_on("refunds"), set(&[Privilege::Select]));
    }

    #[tokio::test]
    async fn test_delete_revokes_declared_privileges() {
        let catalog = cluster();
        let mut resource = GrantResource::new(catalog.clone());
        let spec = GrantSpec::table(
            group("g"),
            "sales",
            ObjectSelection::from_parts(["orders", "customers"], false).unwrap(),
            [Privilege::Select],
        );
        let applied = resource.create(spec).await.unwrap();

        catalog.drop_table("sales", "customers");
        let result = resource.delete(&applied.state).await.unwrap();

        assert_eq!(result.objects(), BTreeSet::from(["sales.orders".to_string()]));
        assert_eq!(catalog.table_acl("sales", "orders"), "admin=rawdDx/admin");
    }

    #[tokio::test]
    async fn test_delete_twice_is_harmless() {
        let catalog = cluster();
        let mut resource = GrantResource::new(catalog.clone());
        let spec = GrantSpec::schema(group("g"), "sales", [Privilege::Usage]);
        let applied = resource.create(spec).await.unwrap();

        resource.delete(&applied.state).await.unwrap();
        resource.delete(&applied.state).await.unwrap();
        assert_eq!(catalog.schema_acl_text("sales"), "admin=CU/admin");
    }

    #[tokio::test]
    async fn test_delete_never_revokes_from_owner() {
        let catalog = MemoryCatalog::new("dev", "admin");
        catalog.add_schema("s", "u", "u=CU/u");
        let mut resource = GrantResource::new(catalog.clone());
        let spec = GrantSpec::schema(Grantee::User("u".to_string()), "s", [Privilege::Create]);
        let state = GrantState {
            identity: GrantIdentity::build(&spec).unwrap(),
            spec,
        };

        let result = resource.delete(&state).await.unwrap();
        assert!(result.statements.is_empty());
        assert_eq!(catalog.schema_acl_text("s"), "u=CU/u");
    }

    #[tokio::test]
    async fn test_read_absent_when_schema_dropped() {
        let catalog = MemoryCatalog::new("dev", "admin");
        let resource = GrantResource::new(catalog);
        let spec = GrantSpec::schema(group("g"), "gone", [Privilege::Usage]);
        let state = GrantState {
            identity: GrantIdentity::build(&spec).unwrap(),
            spec,
        };
        let outcome = resource.read(&state).await.unwrap();
        assert_eq!(outcome.status, GrantStatus::Absent);
        assert!(outcome.observed.is_none());
    }

    #[tokio::test]
    async fn test_create_fails_before_io_on_invalid_spec() {
        let catalog = cluster();
        let mut resource = GrantResource::new(catalog.clone());
        let spec = GrantSpec::table(group("g"), "sales", ObjectSelection::none(), [Privilege::Select]);
        let err = resource.create(spec).await.unwrap_err();
        assert!(matches!(err, Error::InvalidSpec { .. }));
        assert_eq!(catalog.transactions(), 0);
    }

    #[tokio::test]
    async fn test_failed_create_leaves_nothing_behind() {
        let catalog = cluster();
        catalog.fail_statements_matching("\"customers\"");
        let mut resource = GrantResource::new(catalog.clone());
        let spec = GrantSpec::table(group("g"), "sales", ObjectSelection::All, [Privilege::Select]);

        let err = resource.create(spec).await.unwrap_err();
        assert!(matches!(
            err,
            Error::GrantApplication { object_type: ObjectType::Table, .. }
        ));
        assert_eq!(catalog.table_acl("sales", "orders"), "");
        assert!(catalog.executed().is_empty());
    }

    #[test]
    fn test_plan_change() {
        let spec = GrantSpec::database(group("g"), [Privilege::Create]);
        let state = GrantState {
            identity: GrantIdentity::build(&spec).unwrap(),
            spec: spec.clone(),
        };

        assert_eq!(plan_change(None, None).unwrap(), None);
        assert!(matches!(plan_change(None, Some(&spec)).unwrap(), Some(Change::Create(_))));
        assert!(matches!(plan_change(Some(&state), None).unwrap(), Some(Change::Delete(_))));
        assert_eq!(plan_change(Some(&state), Some(&spec)).unwrap(), None);

        // Declaration order and case do not matter.
        let shuffled = GrantSpec::database(group("G"), [Privilege::Create]);
        assert_eq!(plan_change(Some(&state), Some(&shuffled)).unwrap(), None);
    }
}
