//! Statement executor: turn a [`DiffPlan`] into GRANT/REVOKE statements
//! and apply them atomically.
//!
//! Statements are batched per object (`GRANT SELECT, INSERT ON TABLE ...`),
//! every REVOKE runs before any GRANT, and the whole list runs inside one
//! transaction. If any statement fails the transaction is rolled back and
//! the database is left exactly as it was.

use crate::catalog::ApplyStep;
use crate::sql::{Ident, Qualified};
use crate::{Catalog, DiffPlan, Error, Grantee, ObjectType, Privilege, Result};
use std::collections::BTreeSet;
use std::fmt;

/// Whether a statement adds or removes privileges.
///
/// Ordered so that revokes sort before grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StatementKind {
    Revoke,
    Grant,
}

/// One GRANT or REVOKE on a single object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub kind: StatementKind,
    pub privileges: BTreeSet<Privilege>,
    pub object_type: ObjectType,
    /// Schema qualifying the object, for tables.
    pub schema: Option<String>,
    /// Unqualified object name.
    pub object: String,
    pub grantee: Grantee,
}

impl Statement {
    /// Generate the SQL for this statement.
    pub fn to_sql(&self) -> String {
        let privileges: Vec<&str> = self.privileges.iter().map(|p| p.sql_keyword()).collect();
        let target = match self.object_type {
            ObjectType::Database | ObjectType::Schema => Ident(&self.object).to_string(),
            ObjectType::Table => Qualified {
                schema: self.schema.as_deref(),
                name: &self.object,
            }
            .to_string(),
        };
        let (verb, preposition) = match self.kind {
            StatementKind::Grant => ("GRANT", "TO"),
            StatementKind::Revoke => ("REVOKE", "FROM"),
        };
        format!(
            "{} {} ON {} {} {} {}",
            verb,
            privileges.join(", "),
            self.object_type.sql_keyword(),
            target,
            preposition,
            self.grantee.to_sql()
        )
    }

    /// The object, schema-qualified where applicable (`s.t`).
    pub fn qualified_object(&self) -> String {
        match (&self.schema, self.object_type) {
            (Some(schema), ObjectType::Table) => format!("{}.{}", schema, self.object),
            _ => self.object.clone(),
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql())
    }
}

/// Outcome of a successful [`apply`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppliedResult {
    /// Statements executed, in order. Empty when the plan was empty.
    pub statements: Vec<Statement>,
}

impl AppliedResult {
    /// Objects touched (schema-qualified for tables), sorted.
    pub fn objects(&self) -> BTreeSet<String> {
        self.statements
            .iter()
            .map(Statement::qualified_object)
            .collect()
    }
}

/// Render `plan` into statements: all revokes, then all grants, one
/// statement per object and direction.
pub fn statements_for(
    grantee: &Grantee,
    object_type: ObjectType,
    schema: Option<&str>,
    plan: &DiffPlan,
) -> Vec<Statement> {
    let mut statements = Vec::new();

    for kind in [StatementKind::Revoke, StatementKind::Grant] {
        for object in plan.objects() {
            let privileges = match kind {
                StatementKind::Revoke => plan.revokes_on(object),
                StatementKind::Grant => plan.grants_on(object),
            };
            if privileges.is_empty() {
                continue;
            }
            statements.push(Statement {
                kind,
                privileges,
                object_type,
                schema: match object_type {
                    ObjectType::Table => schema.map(str::to_string),
                    ObjectType::Database | ObjectType::Schema => None,
                },
                object: object.to_string(),
                grantee: grantee.clone(),
            });
        }
    }

    statements
}

/// Apply `plan` in a single transaction.
///
/// An empty plan does not touch the database at all. On failure the error
/// names the statement that failed, or `BEGIN`/`COMMIT` when the
/// transaction itself failed; nothing from the plan has been applied.
pub async fn apply<C: Catalog + ?Sized>(
    catalog: &mut C,
    grantee: &Grantee,
    object_type: ObjectType,
    schema: Option<&str>,
    plan: &DiffPlan,
) -> Result<AppliedResult> {
    let statements = statements_for(grantee, object_type, schema, plan);
    if statements.is_empty() {
        tracing::debug!(%grantee, %object_type, "plan is empty, nothing to apply");
        return Ok(AppliedResult::default());
    }

    tracing::info!(
        %grantee,
        %object_type,
        statements = statements.len(),
        "applying privilege changes"
    );

    catalog.apply(&statements).await.map_err(|e| {
        let statement = match e.step {
            ApplyStep::Begin => "BEGIN".to_string(),
            ApplyStep::Commit => "COMMIT".to_string(),
            ApplyStep::Statement(index) => statements
                .get(index)
                .map(Statement::to_sql)
                .unwrap_or_else(|| "<unknown statement>".to_string()),
        };
        tracing::warn!(%grantee, %object_type, %statement, error = %e.source, "rolled back");
        Error::GrantApplication {
            grantee: grantee.clone(),
            object_type,
            statement,
            source: e.source,
        }
    })?;

    Ok(AppliedResult { statements })
}
