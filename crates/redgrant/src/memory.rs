//! In-memory catalog used by the unit tests.
//!
//! Behaves like a tiny Redshift: ACLs are stored as parsed items, the owner
//! gets an explicit ACL entry the first time anything is granted on an
//! object, and `apply` is all-or-nothing.

use crate::acl::{AclGrantee, AclItem, parse_acl};
use crate::catalog::{ApplyError, ApplyStep, BoxFuture, Catalog, CatalogError, ObjectAcl};
use crate::{Grantee, ObjectType, Statement, StatementKind};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone)]
struct Cluster {
    database: ObjectAcl,
    schemas: BTreeMap<String, ObjectAcl>,
    tables: BTreeMap<(String, String), ObjectAcl>,
    read_failure: Option<String>,
    failing_statement: Option<String>,
    commit_failure: Option<String>,
    transactions: usize,
    executed: Vec<String>,
}

/// Shared handle: clones see the same cluster, so a test can keep one and
/// hand another to a `GrantResource`.
#[derive(Debug, Clone)]
pub struct MemoryCatalog {
    cluster: Arc<Mutex<Cluster>>,
}

impl MemoryCatalog {
    pub fn new(database: &str, owner: &str) -> Self {
        Self {
            cluster: Arc::new(Mutex::new(Cluster {
                database: ObjectAcl {
                    name: database.to_string(),
                    owner: owner.to_string(),
                    acl: Vec::new(),
                },
                schemas: BTreeMap::new(),
                tables: BTreeMap::new(),
                read_failure: None,
                failing_statement: None,
                commit_failure: None,
                transactions: 0,
                executed: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Cluster> {
        self.cluster.lock().unwrap()
    }

    pub fn set_database_acl(&self, acl: &str) {
        self.lock().database.acl = parse_acl(acl).unwrap();
    }

    pub fn add_schema(&self, name: &str, owner: &str, acl: &str) {
        self.lock().schemas.insert(
            name.to_string(),
            ObjectAcl {
                name: name.to_string(),
                owner: owner.to_string(),
                acl: parse_acl(acl).unwrap(),
            },
        );
    }

    pub fn set_schema_acl(&self, name: &str, acl: &str) {
        self.lock().schemas.get_mut(name).unwrap().acl = parse_acl(acl).unwrap();
    }

    pub fn add_table(&self, schema: &str, name: &str, owner: &str, acl: &str) {
        self.lock().tables.insert(
            (schema.to_string(), name.to_string()),
            ObjectAcl {
                name: name.to_string(),
                owner: owner.to_string(),
                acl: parse_acl(acl).unwrap(),
            },
        );
    }

    pub fn drop_table(&self, schema: &str, name: &str) {
        self.lock()
            .tables
            .remove(&(schema.to_string(), name.to_string()));
    }

    pub fn database_acl_text(&self) -> String {
        render(&self.lock().database.acl)
    }

    pub fn schema_acl_text(&self, name: &str) -> String {
        render(&self.lock().schemas[name].acl)
    }

    pub fn table_acl(&self, schema: &str, name: &str) -> String {
        render(&self.lock().tables[&(schema.to_string(), name.to_string())].acl)
    }

    /// Make every read fail with `message`.
    pub fn fail_reads(&self, message: &str) {
        self.lock().read_failure = Some(message.to_string());
    }

    /// Make any statement whose SQL contains `needle` fail.
    pub fn fail_statements_matching(&self, needle: &str) {
        self.lock().failing_statement = Some(needle.to_string());
    }

    /// Make every commit fail with `message`.
    pub fn fail_commit(&self, message: &str) {
        self.lock().commit_failure = Some(message.to_string());
    }

    /// Number of `apply` calls, committed or not.
    pub fn transactions(&self) -> usize {
        self.lock().transactions
    }

    /// SQL of every committed statement, in order.
    pub fn executed(&self) -> Vec<String> {
        self.lock().executed.clone()
    }

    fn read<T>(&self, f: impl FnOnce(&Cluster) -> T) -> Result<T, CatalogError> {
        let cluster = self.lock();
        match &cluster.read_failure {
            Some(message) => Err(message.clone().into()),
            None => Ok(f(&cluster)),
        }
    }
}

impl Catalog for MemoryCatalog {
    fn database_acl(&self) -> BoxFuture<'_, Result<ObjectAcl, CatalogError>> {
        Box::pin(std::future::ready(self.read(|c| c.database.clone())))
    }

    fn schema_acl<'a>(
        &'a self,
        schema: &'a str,
    ) -> BoxFuture<'a, Result<Option<ObjectAcl>, CatalogError>> {
        Box::pin(std::future::ready(
            self.read(|c| c.schemas.get(schema).cloned()),
        ))
    }

    fn table_acls<'a>(
        &'a self,
        schema: &'a str,
    ) -> BoxFuture<'a, Result<Vec<ObjectAcl>, CatalogError>> {
        Box::pin(std::future::ready(self.read(|c| {
            c.tables
                .iter()
                .filter(|((s, _), _)| s == schema)
                .map(|(_, t)| t.clone())
                .collect()
        })))
    }

    fn apply<'a>(
        &'a mut self,
        statements: &'a [Statement],
    ) -> BoxFuture<'a, Result<(), ApplyError>> {
        let mut cluster = self.lock();
        cluster.transactions += 1;

        // Work on a copy and only commit it when every statement succeeded.
        let mut working = cluster.clone();
        for (index, statement) in statements.iter().enumerate() {
            let sql = statement.to_sql();
            let failing = working
                .failing_statement
                .as_deref()
                .is_some_and(|needle| sql.contains(needle));
            let result = if failing {
                Err(format!("permission denied: {}", sql).into())
            } else {
                execute(&mut working, statement)
            };
            if let Err(source) = result {
                return Box::pin(std::future::ready(Err(ApplyError {
                    step: ApplyStep::Statement(index),
                    source,
                })));
            }
            working.executed.push(sql);
        }
        if let Some(message) = &working.commit_failure {
            return Box::pin(std::future::ready(Err(ApplyError {
                step: ApplyStep::Commit,
                source: message.clone().into(),
            })));
        }
        *cluster = working;

        Box::pin(std::future::ready(Ok(())))
    }
}

fn execute(cluster: &mut Cluster, statement: &Statement) -> Result<(), CatalogError> {
    let object = match statement.object_type {
        ObjectType::Database if cluster.database.name == statement.object => {
            Some(&mut cluster.database)
        }
        ObjectType::Database => None,
        ObjectType::Schema => cluster.schemas.get_mut(&statement.object),
        ObjectType::Table => cluster.tables.get_mut(&(
            statement.schema.clone().unwrap_or_default(),
            statement.object.clone(),
        )),
    };
    let Some(object) = object else {
        return Err(format!(
            "{} {} does not exist",
            statement.object_type,
            statement.qualified_object()
        )
        .into());
    };

    let chars: String = statement.privileges.iter().map(|p| p.acl_char()).collect();
    let grantee = match &statement.grantee {
        Grantee::Group(name) => AclGrantee::Group(name.clone()),
        Grantee::User(name) => AclGrantee::User(name.clone()),
    };

    match statement.kind {
        StatementKind::Grant => {
            if object.acl.is_empty() {
                object.acl.push(AclItem {
                    grantee: AclGrantee::User(object.owner.clone()),
                    privileges: statement
                        .object_type
                        .owner_implied()
                        .iter()
                        .map(|p| p.acl_char())
                        .collect(),
                    grantor: object.owner.clone(),
                });
            }
            let owner = object.owner.clone();
            match object.acl.iter_mut().find(|item| item.grantee == grantee) {
                Some(item) => {
                    for c in chars.chars() {
                        if !item.privileges.contains(c) {
                            item.privileges.push(c);
                        }
                    }
                }
                None => object.acl.push(AclItem {
                    grantee,
                    privileges: chars,
                    grantor: owner,
                }),
            }
        }
        StatementKind::Revoke => {
            for item in object.acl.iter_mut().filter(|item| item.grantee == grantee) {
                item.privileges.retain(|c| !chars.contains(c));
            }
            object.acl.retain(|item| !item.privileges.is_empty());
        }
    }

    Ok(())
}

fn render(acl: &[AclItem]) -> String {
    acl.iter()
        .map(|item| {
            let who = match &item.grantee {
                AclGrantee::Public => String::new(),
                AclGrantee::User(name) => name.clone(),
                AclGrantee::Group(name) => format!("group {}", name),
                AclGrantee::Role(name) => format!("role {}", name),
            };
            format!("{}={}/{}", who, item.privileges, item.grantor)
        })
        .collect::<Vec<_>>()
        .join("|")
}
