//! Planning and applying every configured grant.
//!
//! Each grant gets its own pooled connection and its own
//! [`GrantResource`], so independent grants run concurrently while each
//! grant's statements stay in a single transaction.

use deadpool_postgres::Pool;
use redgrant::{
    Change, GrantIdentity, GrantResource, GrantSpec, GrantState, GrantStatus, PgCatalog,
    ReadOutcome, plan_change,
};
use redgrant_config::{StateFile, StoredGrant};
use std::collections::{BTreeMap, BTreeSet};
use tokio::task::JoinSet;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// What will happen to one named grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Change(Change),
    /// Configuration unchanged, but the database drifted.
    Drift {
        state: GrantState,
        outcome: ReadOutcome,
    },
    /// Configuration unchanged, but the targeted objects are gone.
    Absent(GrantState),
    InSync(GrantState),
}

impl Action {
    pub fn is_noop(&self) -> bool {
        matches!(self, Action::InSync(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Planned {
    pub name: String,
    pub action: Action,
}

/// Result of applying one [`Planned`] action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The grant now exists as `state`.
    Recorded {
        state: GrantState,
        statements: Vec<String>,
    },
    /// The grant was deleted.
    Removed { statements: Vec<String> },
    Unchanged,
}

/// Compare declared grants with stored ones, without touching the database.
///
/// Declared grants come first in declaration order, followed by stored
/// grants that are no longer declared. Two declared grants with the same
/// identity are refused: they would overwrite each other's privileges.
pub fn changes(
    declared: &[(String, GrantSpec)],
    stored: &[(String, GrantState)],
) -> redgrant::Result<Vec<Planned>> {
    let mut identities: BTreeMap<GrantIdentity, &str> = BTreeMap::new();
    for (name, spec) in declared {
        let identity = GrantIdentity::build(spec)?;
        if let Some(other) = identities.insert(identity.clone(), name) {
            return Err(redgrant::Error::InvalidSpec {
                reason: format!(
                    "grants `{}` and `{}` share the identity `{}`",
                    other, name, identity
                ),
            });
        }
    }

    let stored_state = |name: &str| {
        stored
            .iter()
            .find(|(stored_name, _)| stored_name == name)
            .map(|(_, state)| state)
    };

    let mut planned = Vec::new();
    for (name, spec) in declared {
        let state = stored_state(name);
        let action = match plan_change(state, Some(spec))? {
            Some(change) => Action::Change(change),
            None => match state {
                Some(state) => Action::InSync(state.clone()),
                None => continue,
            },
        };
        planned.push(Planned {
            name: name.clone(),
            action,
        });
    }

    let declared_names: BTreeSet<&str> = declared.iter().map(|(name, _)| name.as_str()).collect();
    for (name, state) in stored {
        if declared_names.contains(name.as_str()) {
            continue;
        }
        if let Some(change) = plan_change(Some(state), None)? {
            planned.push(Planned {
                name: name.clone(),
                action: Action::Change(change),
            });
        }
    }

    Ok(planned)
}

/// Every stored grant, marked for deletion.
pub fn destroy_all(stored: &[(String, GrantState)]) -> Vec<Planned> {
    stored
        .iter()
        .map(|(name, state)| Planned {
            name: name.clone(),
            action: Action::Change(Change::Delete(state.clone())),
        })
        .collect()
}

/// Read every unchanged grant back from the database and flag drift.
pub async fn check_drift(pool: &Pool, mut planned: Vec<Planned>) -> Result<Vec<Planned>, BoxError> {
    let mut tasks = JoinSet::new();
    for (index, p) in planned.iter().enumerate() {
        let Action::InSync(state) = &p.action else {
            continue;
        };
        let pool = pool.clone();
        let state = state.clone();
        tasks.spawn(async move {
            let conn = pool.get().await?;
            let resource = GrantResource::new(PgCatalog::new(conn));
            let outcome = resource.read(&state).await?;
            Ok::<_, BoxError>((index, outcome))
        });
    }

    while let Some(joined) = tasks.join_next().await {
        let (index, outcome) = joined??;
        let Action::InSync(state) = &planned[index].action else {
            continue;
        };
        let state = state.clone();
        planned[index].action = match outcome.status {
            GrantStatus::Present => Action::InSync(state),
            GrantStatus::Drifted => Action::Drift { state, outcome },
            GrantStatus::Absent => Action::Absent(state),
        };
    }

    Ok(planned)
}

/// Apply every action concurrently. Results come back in plan order.
pub async fn execute(pool: &Pool, planned: &[Planned]) -> Vec<Result<Outcome, BoxError>> {
    let mut tasks = JoinSet::new();
    for (index, p) in planned.iter().enumerate() {
        if p.action.is_noop() {
            continue;
        }
        let pool = pool.clone();
        let action = p.action.clone();
        let name = p.name.clone();
        tasks.spawn(async move {
            tracing::info!(grant = %name, "applying");
            (index, run_action(&pool, action).await)
        });
    }

    let mut results: Vec<Result<Outcome, BoxError>> =
        planned.iter().map(|_| Ok(Outcome::Unchanged)).collect();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, result)) => results[index] = result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            // Tasks are never aborted.
            Err(e) => tracing::error!(error = %e, "apply task cancelled"),
        }
    }
    results
}

async fn run_action(pool: &Pool, action: Action) -> Result<Outcome, BoxError> {
    let conn = pool.get().await?;
    let mut resource = GrantResource::new(PgCatalog::new(conn));

    let recorded = |applied: redgrant::Applied, mut statements: Vec<String>| {
        statements.extend(applied.result.statements.iter().map(|s| s.to_sql()));
        Outcome::Recorded {
            state: applied.state,
            statements,
        }
    };

    Ok(match action {
        Action::InSync(_) => Outcome::Unchanged,
        Action::Change(Change::Create(spec)) => recorded(resource.create(spec).await?, Vec::new()),
        Action::Change(Change::Update { state, spec }) => {
            recorded(resource.update(&state, spec).await?, Vec::new())
        }
        Action::Change(Change::Replace { state, spec }) => {
            let deleted = resource.delete(&state).await?;
            let statements = deleted.statements.iter().map(|s| s.to_sql()).collect();
            recorded(resource.create(spec).await?, statements)
        }
        Action::Change(Change::Delete(state)) => {
            let deleted = resource.delete(&state).await?;
            Outcome::Removed {
                statements: deleted.statements.iter().map(|s| s.to_sql()).collect(),
            }
        }
        Action::Drift { state, .. } => {
            let spec = state.spec.clone();
            recorded(resource.update(&state, spec).await?, Vec::new())
        }
        Action::Absent(state) => recorded(resource.create(state.spec).await?, Vec::new()),
    })
}

/// Record a successful outcome in the state file.
pub fn record(state: &mut StateFile, name: &str, outcome: &Outcome) {
    match outcome {
        Outcome::Recorded { state: grant, .. } => {
            state.upsert(StoredGrant::from_state(name, grant));
        }
        Outcome::Removed { .. } => {
            state.remove(name);
        }
        Outcome::Unchanged => {}
    }
}
