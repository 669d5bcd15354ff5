//! Permission resolution tables
//!
//! Flattens the configured permission rules into per-(entity, role,
//! operation) lookups resolved once at schema build time: which exposed
//! columns an action may touch and which database policy applies. Runtime
//! checks are then plain map lookups.

use std::collections::{BTreeSet, HashMap};

use crate::config::{Operation, RuntimeConfig, SourceKind};
use crate::error::SchemaBuildError;
use crate::metadata::MetadataProvider;

#[derive(Debug, Clone)]
struct ActionRule {
    /// Exposed field names this action may touch, include/exclude already
    /// resolved.
    columns: BTreeSet<String>,
    policy: Option<String>,
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct RuleKey {
    entity: String,
    role: String,
    operation: Operation,
}

#[derive(Debug, Clone, Default)]
pub struct AuthorizationResolver {
    rules: HashMap<RuleKey, ActionRule>,
}

impl AuthorizationResolver {
    pub fn build(
        config: &RuntimeConfig,
        provider: &MetadataProvider,
    ) -> Result<Self, SchemaBuildError> {
        let mut rules = HashMap::new();

        for (entity_name, entity) in &config.entities {
            let exposed: Vec<String> = provider
                .exposed_fields(entity_name)
                .into_iter()
                .map(|(name, _)| name)
                .collect();
            let all_columns: BTreeSet<String> = exposed.iter().cloned().collect();
            let kind = entity.source.kind;

            for permission in &entity.permissions {
                let role = permission.role.to_ascii_lowercase();

                for action in &permission.actions {
                    let columns = match action.fields() {
                        // Linking entities and stored procedures always
                        // expose every column; restrictions apply to
                        // tables and views only.
                        _ if entity.is_linking_entity || kind == SourceKind::StoredProcedure => {
                            all_columns.clone()
                        }
                        None => all_columns.clone(),
                        Some(fields) => {
                            for named in fields.include.iter().chain(&fields.exclude) {
                                if named != "*" && !all_columns.contains(named) {
                                    return Err(SchemaBuildError::Registration(format!(
                                        "permission on entity '{}' references unknown field '{}'",
                                        entity_name, named
                                    )));
                                }
                            }

                            let mut columns: BTreeSet<String> =
                                if fields.include.is_empty()
                                    || fields.include.iter().any(|f| f == "*")
                                {
                                    all_columns.clone()
                                } else {
                                    fields.include.iter().cloned().collect()
                                };
                            if fields.exclude.iter().any(|f| f == "*") {
                                columns.clear();
                            } else {
                                for excluded in &fields.exclude {
                                    columns.remove(excluded);
                                }
                            }
                            columns
                        }
                    };

                    let policy = action.policy().map(|p| p.database.clone());
                    let rule = ActionRule { columns, policy };

                    for operation in expand_operation(action.operation(), kind) {
                        rules.insert(
                            RuleKey {
                                entity: entity_name.clone(),
                                role: role.clone(),
                                operation,
                            },
                            rule.clone(),
                        );
                    }
                }
            }
        }

        Ok(Self { rules })
    }

    fn rule(&self, entity: &str, role: &str, operation: Operation) -> Option<&ActionRule> {
        self.rules.get(&RuleKey {
            entity: entity.to_string(),
            role: role.to_ascii_lowercase(),
            operation,
        })
    }

    pub fn is_operation_allowed(&self, entity: &str, role: &str, operation: Operation) -> bool {
        self.rule(entity, role, operation).is_some()
    }

    /// Exposed columns `role` may touch for `operation`; `None` when the
    /// operation itself is not permitted.
    pub fn columns_allowed(
        &self,
        entity: &str,
        role: &str,
        operation: Operation,
    ) -> Option<&BTreeSet<String>> {
        self.rule(entity, role, operation).map(|rule| &rule.columns)
    }

    /// Roles permitted to perform `operation` on `entity`, sorted.
    pub fn roles_for(&self, entity: &str, operation: Operation) -> Vec<&str> {
        let mut roles: Vec<&str> = self
            .rules
            .keys()
            .filter(|key| key.entity == entity && key.operation == operation)
            .map(|key| key.role.as_str())
            .collect();
        roles.sort_unstable();
        roles
    }

    pub fn anonymous_allowed(&self, entity: &str, operation: Operation) -> bool {
        self.is_operation_allowed(entity, super::ROLE_ANONYMOUS, operation)
    }

    /// Union of columns across every role permitted for `operation`: the
    /// set of fields worth generating at all.
    pub fn columns_any_role(&self, entity: &str, operation: Operation) -> BTreeSet<String> {
        let mut union = BTreeSet::new();
        for (key, rule) in &self.rules {
            if key.entity == entity && key.operation == operation {
                union.extend(rule.columns.iter().cloned());
            }
        }
        union
    }

    pub fn database_policy(&self, entity: &str, role: &str, operation: Operation) -> Option<&str> {
        self.rule(entity, role, operation)?.policy.as_deref()
    }
}

/// Expand `*` to the operations the source kind supports, and fold any
/// operation configured on a stored procedure down to execute.
fn expand_operation(operation: Operation, kind: SourceKind) -> Vec<Operation> {
    if kind == SourceKind::StoredProcedure {
        return vec![Operation::Execute];
    }
    match operation {
        Operation::All => vec![
            Operation::Create,
            Operation::Read,
            Operation::Update,
            Operation::Delete,
        ],
        other => vec![other],
    }
}
