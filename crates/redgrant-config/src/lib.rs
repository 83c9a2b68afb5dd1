//! Facet types for `.config/redgrant.styx` and the persisted state file.
//!
//! ```styx
//! database {
//!   url "postgres://admin@cluster.example.com:5439/dev"
//!   pool_size 4
//! }
//!
//! grants {
//!   analysts_sales {
//!     group analysts
//!     object_type schema
//!     schema sales
//!     privileges (usage)
//!   }
//!   analysts_orders {
//!     group analysts
//!     object_type table
//!     schema sales
//!     objects (orders customers)
//!     privileges (select insert)
//!   }
//! }
//! ```

use facet::Facet;
use indexmap::IndexMap;
use redgrant::{
    GrantIdentity, GrantSpec, GrantState, Grantee, ObjectSelection, ObjectType, Privilege,
};
use std::collections::BTreeSet;

/// Default location of the state file, relative to the project root.
pub const DEFAULT_STATE_FILE: &str = ".config/redgrant.state.json";

/// Current state file format version.
pub const STATE_VERSION: u32 = 1;

/// Configuration loaded from `redgrant.styx`.
#[derive(Debug, Clone, Facet)]
pub struct Config {
    /// Cluster connection.
    #[facet(default)]
    pub database: DatabaseConfig,

    /// Where applied grants are recorded. Relative paths are resolved
    /// against the project root (the parent of `.config`).
    #[facet(default)]
    pub state_file: Option<String>,

    /// Declared grants, keyed by a name of your choosing.
    #[facet(default)]
    pub grants: IndexMap<String, GrantDecl>,
}

/// Cluster connection settings.
#[derive(Debug, Clone, Facet, Default)]
#[facet(traits(Default))]
pub struct DatabaseConfig {
    /// Connection URL. Falls back to `REDGRANT_DATABASE_URL` when unset.
    #[facet(default)]
    pub url: Option<String>,

    /// Maximum number of pooled connections used by `apply`.
    #[facet(default)]
    pub pool_size: Option<usize>,
}

/// One grant as written in the configuration.
///
/// Exactly one of `group` and `user` must be set.
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct GrantDecl {
    #[facet(default)]
    pub group: Option<String>,

    #[facet(default)]
    pub user: Option<String>,

    /// `database`, `schema` or `table`.
    pub object_type: String,

    /// Required for schema and table grants.
    #[facet(default)]
    pub schema: Option<String>,

    /// Tables the grant covers. Table grants only.
    #[facet(default)]
    pub objects: Vec<String>,

    /// Cover every table in the schema, including ones created later.
    #[facet(default)]
    pub all_objects: bool,

    pub privileges: Vec<String>,
}

impl GrantDecl {
    /// Convert to a validated, normalized [`GrantSpec`].
    pub fn to_spec(&self) -> redgrant::Result<GrantSpec> {
        let grantee = Grantee::from_parts(self.group.as_deref(), self.user.as_deref())?;
        let object_type: ObjectType = self.object_type.parse()?;
        let objects = ObjectSelection::from_parts(&self.objects, self.all_objects)?;
        let privileges = self
            .privileges
            .iter()
            .map(|p| p.parse::<Privilege>())
            .collect::<redgrant::Result<BTreeSet<_>>>()?;

        let spec = GrantSpec {
            grantee,
            object_type,
            schema: self.schema.clone(),
            objects,
            privileges,
        }
        .normalized();
        spec.validate()?;
        Ok(spec)
    }

    pub fn from_spec(spec: &GrantSpec) -> Self {
        let (group, user) = match &spec.grantee {
            Grantee::Group(name) => (Some(name.clone()), None),
            Grantee::User(name) => (None, Some(name.clone())),
        };
        Self {
            group,
            user,
            object_type: spec.object_type.as_str().to_string(),
            schema: spec.schema.clone(),
            objects: spec.objects.names().map(str::to_string).collect(),
            all_objects: spec.objects.is_all(),
            privileges: spec
                .privileges
                .iter()
                .map(|p| p.as_str().to_string())
                .collect(),
        }
    }
}

/// Grants applied so far, as recorded after each `apply`.
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct StateFile {
    pub version: u32,
    #[facet(default)]
    pub grants: Vec<StoredGrant>,
}

impl Default for StateFile {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            grants: Vec::new(),
        }
    }
}

impl StateFile {
    pub fn get(&self, name: &str) -> Option<&StoredGrant> {
        self.grants.iter().find(|g| g.name == name)
    }

    /// Insert or replace the grant recorded under `grant.name`.
    pub fn upsert(&mut self, grant: StoredGrant) {
        match self.grants.iter_mut().find(|g| g.name == grant.name) {
            Some(existing) => *existing = grant,
            None => self.grants.push(grant),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<StoredGrant> {
        let index = self.grants.iter().position(|g| g.name == name)?;
        Some(self.grants.remove(index))
    }
}

/// A grant as persisted: its identity and the declaration, nothing else.
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct StoredGrant {
    pub name: String,
    pub id: String,
    pub grant: GrantDecl,
}

impl StoredGrant {
    pub fn from_state(name: impl Into<String>, state: &GrantState) -> Self {
        Self {
            name: name.into(),
            id: state.identity.as_str().to_string(),
            grant: GrantDecl::from_spec(&state.spec),
        }
    }

    pub fn to_state(&self) -> redgrant::Result<GrantState> {
        Ok(GrantState {
            identity: GrantIdentity::from_stored(self.id.as_str()),
            spec: self.grant.to_spec()?,
        })
    }
}
