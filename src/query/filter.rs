//! Structured filter-input parser
//!
//! Translates GraphQL-style nested filter objects into the predicate model.
//! Input arrives as an order-preserving `async_graphql::Value`; keys are
//! processed in the literal order the filter author wrote them, with `and` /
//! `or` (case-insensitive) recursing into sub-filters and every other key
//! naming an exposed field. The OData path (`odata.rs`) applies the same
//! operator semantics to the REST surface.

use async_graphql::Value;

use crate::error::RequestError;
use crate::metadata::{MetadataProvider, ScalarKind, scalar_kind_of};
use crate::query::params::ParamStore;
use crate::query::predicate::{Predicate, PredicateOperation};

/// Escape a literal for use inside a SQL LIKE pattern.
///
/// Exactly five significant characters, escaped in this fixed order:
/// backslash, percent, left bracket, right bracket, underscore. Backslash
/// must go first or already-written escapes would be escaped again.
pub fn escape_like_pattern(raw: &str) -> String {
    raw.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('[', "\\[")
        .replace(']', "\\]")
        .replace('_', "\\_")
}

pub struct FilterParser<'a> {
    entity: &'a str,
    provider: &'a MetadataProvider,
}

impl<'a> FilterParser<'a> {
    pub fn new(entity: &'a str, provider: &'a MetadataProvider) -> Self {
        Self { entity, provider }
    }

    /// Parse a complete filter object into a predicate tree, registering
    /// bind values in `params`.
    pub fn parse(&self, input: &Value, params: &mut ParamStore) -> Result<Predicate, RequestError> {
        let Value::Object(fields) = input else {
            return Err(RequestError::InvalidFilter(
                "filter must be an input object".to_string(),
            ));
        };

        let mut predicates: Vec<Predicate> = Vec::new();

        for (key, value) in fields {
            // `null` means the condition was not specified at all, for
            // logical and column keys alike.
            if matches!(value, Value::Null) {
                continue;
            }
            let lowered = key.as_str().to_ascii_lowercase();
            if lowered == "and" || lowered == "or" {
                let op = if lowered == "and" {
                    PredicateOperation::And
                } else {
                    PredicateOperation::Or
                };
                predicates.push(self.parse_logical_list(value, op, params)?);
            } else {
                predicates.extend(self.parse_field(key.as_str(), value, params)?);
            }
        }

        Ok(Predicate::chain(predicates, PredicateOperation::And, true))
    }

    /// An `and`/`or` key maps to a list of nested filter objects. An empty
    /// list collapses to the canonical always-false predicate - failing
    /// closed, since an empty OR must match nothing.
    fn parse_logical_list(
        &self,
        value: &Value,
        op: PredicateOperation,
        params: &mut ParamStore,
    ) -> Result<Predicate, RequestError> {
        let Value::List(items) = value else {
            return Err(RequestError::InvalidFilter(
                "'and'/'or' must map to a list of filter objects".to_string(),
            ));
        };

        if items.is_empty() {
            return Ok(Predicate::always_false());
        }

        let mut branches = Vec::with_capacity(items.len());
        for item in items {
            branches.push(self.parse(item, params)?);
        }
        Ok(Predicate::chain(branches, op, true))
    }

    /// A field key maps to an object of operator keyword -> leaf value.
    fn parse_field(
        &self,
        exposed_name: &str,
        value: &Value,
        params: &mut ParamStore,
    ) -> Result<Vec<Predicate>, RequestError> {
        let backing = self
            .provider
            .try_backing_column(self.entity, exposed_name)
            .ok_or_else(|| RequestError::UnknownField {
                entity: self.entity.to_string(),
                field: exposed_name.to_string(),
            })?
            .to_string();

        let source = self
            .provider
            .source_definition(self.entity)
            .ok_or_else(|| RequestError::EntityNotFound(self.entity.to_string()))?;
        let column = source
            .column(&backing)
            .ok_or_else(|| RequestError::UnknownField {
                entity: self.entity.to_string(),
                field: exposed_name.to_string(),
            })?;
        let kind = scalar_kind_of(&column.system_type).ok_or_else(|| RequestError::UnknownField {
            entity: self.entity.to_string(),
            field: exposed_name.to_string(),
        })?;

        let Value::Object(ops) = value else {
            return Err(RequestError::InvalidFilter(format!(
                "filter for field '{}' must be an input object of operators",
                exposed_name
            )));
        };

        let mut predicates = Vec::new();
        for (op_name, op_value) in ops {
            if let Some(predicate) =
                parse_scalar_operator(&backing, kind, op_name.as_str(), op_value, params)?
            {
                predicates.push(predicate);
            }
        }
        Ok(predicates)
    }
}

/// Shared leaf logic: resolve one operator keyword against one field.
///
/// Returns `Ok(None)` when the condition is skipped (a `null` value for a
/// non-null-test operator must not become `col = NULL`).
pub fn parse_scalar_operator(
    backing_column: &str,
    kind: ScalarKind,
    op_name: &str,
    value: &Value,
    params: &mut ParamStore,
) -> Result<Option<Predicate>, RequestError> {
    let comparison = |op: PredicateOperation,
                      value: &Value,
                      params: &mut ParamStore|
     -> Result<Option<Predicate>, RequestError> {
        if matches!(value, Value::Null) {
            return Ok(None);
        }
        let param = params.add_graphql(kind, value)?;
        Ok(Some(Predicate::comparison(backing_column, op, param)))
    };

    let pattern = |op: PredicateOperation,
                   template: fn(&str) -> String,
                   value: &Value,
                   params: &mut ParamStore|
     -> Result<Option<Predicate>, RequestError> {
        let Value::String(raw) = value else {
            if matches!(value, Value::Null) {
                return Ok(None);
            }
            return Err(RequestError::InvalidLiteral {
                literal: value.to_string(),
                target_type: ScalarKind::String.graphql_type_name().to_string(),
            });
        };
        let escaped = escape_like_pattern(raw);
        let param = params.add(crate::query::params::SqlValue::String(template(&escaped)));
        Ok(Some(Predicate::comparison(backing_column, op, param)))
    };

    match op_name {
        "eq" => comparison(PredicateOperation::Equal, value, params),
        "neq" => comparison(PredicateOperation::NotEqual, value, params),
        "lt" => comparison(PredicateOperation::LessThan, value, params),
        "gt" => comparison(PredicateOperation::GreaterThan, value, params),
        "lte" => comparison(PredicateOperation::LessThanOrEqual, value, params),
        "gte" => comparison(PredicateOperation::GreaterThanOrEqual, value, params),

        "contains" => pattern(PredicateOperation::Like, |v| format!("%{}%", v), value, params),
        "notContains" => pattern(
            PredicateOperation::NotLike,
            |v| format!("%{}%", v),
            value,
            params,
        ),
        "startsWith" => pattern(PredicateOperation::Like, |v| format!("{}%", v), value, params),
        "endsWith" => pattern(PredicateOperation::Like, |v| format!("%{}", v), value, params),

        // Null test: synthesizes IS / IS NOT NULL with no bind value.
        "isNull" => match value {
            Value::Null => Ok(None),
            Value::Boolean(test_null) => {
                Ok(Some(Predicate::null_check(backing_column, !*test_null)))
            }
            other => Err(RequestError::InvalidLiteral {
                literal: other.to_string(),
                target_type: ScalarKind::Boolean.graphql_type_name().to_string(),
            }),
        },

        other => Err(RequestError::UnsupportedOperator {
            op: other.to_string(),
            type_name: kind.graphql_type_name().to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::config::SourceKind;
    use crate::metadata::{ColumnDefinition, DatabaseObject, SourceDefinition};
    use crate::query::params::SqlValue;
    use crate::query::predicate::PredicateOperand;
    use std::collections::HashMap;

    fn provider() -> MetadataProvider {
        let object = DatabaseObject {
            schema: String::new(),
            name: "books".into(),
            kind: SourceKind::Table,
            source: SourceDefinition {
                columns: vec![
                    column("id", "INTEGER", false),
                    column("title", "TEXT", false),
                    column("pub_year", "INTEGER", true),
                    column("publisher_id", "INTEGER", true),
                ],
                primary_key: vec!["id".into()],
                relationships: Default::default(),
            },
        };
        let config = RuntimeConfig::from_json(
            r#"{
                "data-source": { "database-type": "sqlite" },
                "entities": {
                    "Book": {
                        "source": { "object": "books" },
                        "mappings": { "pub_year": "publicationYear" }
                    }
                }
            }"#,
        )
        .unwrap();
        let mut objects = HashMap::new();
        objects.insert("Book".to_string(), object);
        MetadataProvider::build(&config, objects).unwrap()
    }

    fn column(name: &str, ty: &str, nullable: bool) -> ColumnDefinition {
        ColumnDefinition {
            name: name.into(),
            system_type: ty.into(),
            nullable,
            is_autogenerated: false,
            default_value: None,
        }
    }

    fn parse(json: &str) -> Result<(Predicate, Vec<SqlValue>), RequestError> {
        let provider = provider();
        let parser = FilterParser::new("Book", &provider);
        let value = Value::from_json(serde_json::from_str(json).unwrap()).unwrap();
        let mut params = ParamStore::new();
        let predicate = parser.parse(&value, &mut params)?;
        Ok((predicate, params.into_values()))
    }

    // =========================================================================
    // LIKE Escaping Tests
    // =========================================================================

    #[test]
    fn test_escape_like_backslash_first() {
        // If backslash were escaped last, the escapes added for % would be
        // doubled up.
        assert_eq!(escape_like_pattern(r"a\b"), r"a\\b");
        assert_eq!(escape_like_pattern(r"50%_off"), r"50\%\_off");
        assert_eq!(escape_like_pattern("[x]"), r"\[x\]");
        assert_eq!(escape_like_pattern(r"\%"), r"\\\%");
    }

    #[test]
    fn test_contains_escapes_wildcards() {
        let (predicate, values) = parse(r#"{"title": {"contains": "50%_off"}}"#).unwrap();
        assert_eq!(predicate.op, PredicateOperation::Like);
        assert_eq!(values, vec![SqlValue::String(r"%50\%\_off%".into())]);
    }

    #[test]
    fn test_starts_with_and_ends_with_patterns() {
        let (_, values) = parse(r#"{"title": {"startsWith": "The"}}"#).unwrap();
        assert_eq!(values, vec![SqlValue::String("The%".into())]);

        let (_, values) = parse(r#"{"title": {"endsWith": "Hobbit"}}"#).unwrap();
        assert_eq!(values, vec![SqlValue::String("%Hobbit".into())]);
    }

    // =========================================================================
    // Null Semantics Tests
    // =========================================================================

    #[test]
    fn test_is_null_true_and_false() {
        let (predicate, values) = parse(r#"{"publisher_id": {"isNull": true}}"#).unwrap();
        assert_eq!(predicate.op, PredicateOperation::Is);
        assert_eq!(predicate.right, PredicateOperand::Null);
        assert!(values.is_empty());

        let (predicate, _) = parse(r#"{"publisher_id": {"isNull": false}}"#).unwrap();
        assert_eq!(predicate.op, PredicateOperation::IsNot);
    }

    #[test]
    fn test_null_comparison_value_is_skipped() {
        // {eq: null} is "not specified", never `col = NULL`; with no other
        // condition the filter reduces to zero conditions and fails closed.
        let (predicate, values) = parse(r#"{"title": {"eq": null}}"#).unwrap();
        assert!(predicate.is_always_false());
        assert!(values.is_empty());
    }

    #[test]
    fn test_null_logical_key_is_skipped() {
        // A null `and`/`or` is "not specified", unlike the empty list which
        // fails closed.
        let (predicate, _) = parse(r#"{"and": null, "id": {"eq": 1}}"#).unwrap();
        assert_eq!(predicate.op, PredicateOperation::Equal);

        let (predicate, _) = parse(r#"{"or": null}"#).unwrap();
        assert!(predicate.is_always_false());
    }

    #[test]
    fn test_null_field_object_is_skipped() {
        let (predicate, _) =
            parse(r#"{"title": null, "pub_year": null, "id": {"eq": 1}}"#.replace("pub_year", "publicationYear").as_str())
                .unwrap();
        assert_eq!(predicate.op, PredicateOperation::Equal);
    }

    // =========================================================================
    // Logical Composition Tests
    // =========================================================================

    #[test]
    fn test_empty_and_or_lists_fail_closed() {
        let (predicate, _) = parse(r#"{"and": []}"#).unwrap();
        assert!(predicate.is_always_false());

        let (predicate, _) = parse(r#"{"or": []}"#).unwrap();
        assert!(predicate.is_always_false());
    }

    #[test]
    fn test_logical_keys_case_insensitive() {
        let (predicate, _) = parse(r#"{"OR": [{"title": {"eq": "Dune"}}]}"#).unwrap();
        assert_eq!(predicate.op, PredicateOperation::Equal);
    }

    #[test]
    fn test_top_level_keys_chain_with_and_in_literal_order() {
        // {title: {contains}, or: [...]} means title-condition AND (or-branch),
        // not a flattened OR across everything.
        let (predicate, values) = parse(
            r#"{"title": {"contains": "Hobbit"}, "or": [{"title": {"eq": "Dune"}}]}"#,
        )
        .unwrap();

        assert_eq!(predicate.op, PredicateOperation::And);
        assert!(predicate.parenthesized);

        let PredicateOperand::Nested(left) = &predicate.left else {
            panic!("expected nested left");
        };
        assert_eq!(left.op, PredicateOperation::Like);

        let PredicateOperand::Nested(right) = &predicate.right else {
            panic!("expected nested right");
        };
        assert_eq!(right.op, PredicateOperation::Equal);

        assert_eq!(
            values,
            vec![
                SqlValue::String("%Hobbit%".into()),
                SqlValue::String("Dune".into()),
            ]
        );
    }

    #[test]
    fn test_empty_or_composed_with_condition_still_absorbs() {
        let (predicate, _) =
            parse(r#"{"title": {"eq": "Dune"}, "or": []}"#).unwrap();
        assert_eq!(predicate.op, PredicateOperation::And);
        let PredicateOperand::Nested(right) = &predicate.right else {
            panic!("expected nested right");
        };
        assert!(right.is_always_false());
    }

    // =========================================================================
    // Alias and Error Tests
    // =========================================================================

    #[test]
    fn test_alias_resolves_to_backing_column() {
        let (predicate, _) = parse(r#"{"publicationYear": {"gte": 1950}}"#).unwrap();
        assert_eq!(
            predicate.left,
            PredicateOperand::Column("pub_year".into())
        );
    }

    #[test]
    fn test_unknown_operator_is_hard_failure() {
        let err = parse(r#"{"title": {"similar": "Dune"}}"#).unwrap_err();
        assert!(matches!(err, RequestError::UnsupportedOperator { .. }));
        assert!(err.to_string().contains("similar"));
        assert!(err.to_string().contains("String"));
    }

    #[test]
    fn test_unknown_field_is_hard_failure() {
        let err = parse(r#"{"rating": {"eq": 1}}"#).unwrap_err();
        assert!(matches!(err, RequestError::UnknownField { .. }));
    }

    #[test]
    fn test_literal_type_mismatch_names_literal_and_type() {
        let err = parse(r#"{"id": {"eq": "NaN"}}"#).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("NaN"));
        assert!(msg.contains("Int"));
    }

    #[test]
    fn test_multiple_operators_on_one_field_chain_with_and() {
        let (predicate, values) =
            parse(r#"{"publicationYear": {"gte": 1950, "lte": 1960}}"#).unwrap();
        assert_eq!(predicate.op, PredicateOperation::And);
        assert_eq!(values, vec![SqlValue::Int(1950), SqlValue::Int(1960)]);
    }
}
