//! SQL text generation
//!
//! Renders predicate trees and builds SELECT / INSERT / UPDATE / DELETE
//! statements. All user-supplied values travel as numbered placeholders;
//! identifiers are always quoted. Rendering is dialect-generic - the
//! dialect decides placeholder syntax and identifier quoting.

use crate::config::DatabaseType;
use crate::metadata::DatabaseObject;
use crate::query::orderby::OrderByColumn;
use crate::query::predicate::{Predicate, PredicateOperand, PredicateOperation};

pub trait SqlDialect: Send + Sync {
    /// Placeholder for the 1-based parameter `index`.
    fn placeholder(&self, index: usize) -> String;

    fn quote_ident(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    fn qualified_object(&self, object: &DatabaseObject) -> String {
        if object.schema.is_empty() {
            self.quote_ident(&object.name)
        } else {
            format!(
                "{}.{}",
                self.quote_ident(&object.schema),
                self.quote_ident(&object.name)
            )
        }
    }
}

/// SQLite uses explicitly numbered `?N` placeholders so the rendered
/// position never has to match bind order.
pub struct SqliteDialect;

impl SqlDialect for SqliteDialect {
    fn placeholder(&self, index: usize) -> String {
        format!("?{}", index)
    }
}

pub struct PostgresDialect;

impl SqlDialect for PostgresDialect {
    fn placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }
}

pub fn dialect_for(database_type: DatabaseType) -> Box<dyn SqlDialect> {
    match database_type {
        DatabaseType::Sqlite => Box::new(SqliteDialect),
        DatabaseType::Postgres => Box::new(PostgresDialect),
    }
}

// =============================================================================
// Predicate rendering
// =============================================================================

pub fn render_predicate(predicate: &Predicate, dialect: &dyn SqlDialect) -> String {
    let mut out = String::new();
    render_into(predicate, dialect, &mut out);
    out
}

fn render_into(predicate: &Predicate, dialect: &dyn SqlDialect, out: &mut String) {
    if predicate.parenthesized {
        out.push('(');
    }
    render_operand(&predicate.left, dialect, out);
    out.push(' ');
    out.push_str(predicate.op.as_sql());
    out.push(' ');
    render_operand(&predicate.right, dialect, out);
    // LIKE patterns escape their wildcards with backslash
    if matches!(
        predicate.op,
        PredicateOperation::Like | PredicateOperation::NotLike
    ) {
        out.push_str(" ESCAPE '\\'");
    }
    if predicate.parenthesized {
        out.push(')');
    }
}

fn render_operand(operand: &PredicateOperand, dialect: &dyn SqlDialect, out: &mut String) {
    match operand {
        PredicateOperand::Column(name) => out.push_str(&dialect.quote_ident(name)),
        PredicateOperand::Parameter(index) => out.push_str(&dialect.placeholder(index + 1)),
        PredicateOperand::Null => out.push_str("NULL"),
        PredicateOperand::Literal(text) => out.push_str(text),
        PredicateOperand::Nested(inner) => render_into(inner, dialect, out),
    }
}

// =============================================================================
// Statement builders
// =============================================================================

/// A SELECT over one object. Columns are `(backing, exposed)` pairs; the
/// backing column is selected under its exposed alias so result rows come
/// back already in API names.
pub struct SelectSpec<'a> {
    pub object: &'a DatabaseObject,
    pub columns: &'a [(String, String)],
    pub predicate: Option<&'a Predicate>,
    pub order_by: &'a [OrderByColumn],
    pub limit: Option<u64>,
    pub offset: u64,
}

pub fn build_select(spec: &SelectSpec<'_>, dialect: &dyn SqlDialect) -> String {
    let mut sql = String::from("SELECT ");
    let columns: Vec<String> = spec
        .columns
        .iter()
        .map(|(backing, exposed)| {
            if backing == exposed {
                dialect.quote_ident(backing)
            } else {
                format!(
                    "{} AS {}",
                    dialect.quote_ident(backing),
                    dialect.quote_ident(exposed)
                )
            }
        })
        .collect();
    sql.push_str(&columns.join(", "));
    sql.push_str(" FROM ");
    sql.push_str(&dialect.qualified_object(spec.object));

    if let Some(predicate) = spec.predicate {
        sql.push_str(" WHERE ");
        render_into(predicate, dialect, &mut sql);
    }

    if !spec.order_by.is_empty() {
        sql.push_str(" ORDER BY ");
        let entries: Vec<String> = spec
            .order_by
            .iter()
            .map(|col| format!("{} {}", dialect.quote_ident(&col.column), col.direction.as_sql()))
            .collect();
        sql.push_str(&entries.join(", "));
    }

    if let Some(limit) = spec.limit {
        sql.push_str(&format!(" LIMIT {}", limit));
        if spec.offset > 0 {
            sql.push_str(&format!(" OFFSET {}", spec.offset));
        }
    } else if spec.offset > 0 {
        sql.push_str(&format!(" LIMIT -1 OFFSET {}", spec.offset));
    }

    sql
}

pub fn build_count(
    object: &DatabaseObject,
    predicate: Option<&Predicate>,
    dialect: &dyn SqlDialect,
) -> String {
    let mut sql = format!(
        "SELECT COUNT(*) FROM {}",
        dialect.qualified_object(object)
    );
    if let Some(predicate) = predicate {
        sql.push_str(" WHERE ");
        render_into(predicate, dialect, &mut sql);
    }
    sql
}

/// INSERT with a RETURNING clause so the created row comes back in one
/// round trip. `columns` pairs each backing column with the parameter
/// index holding its value.
pub fn build_insert(
    object: &DatabaseObject,
    columns: &[(String, usize)],
    returning: &[(String, String)],
    dialect: &dyn SqlDialect,
) -> String {
    let names: Vec<String> = columns
        .iter()
        .map(|(backing, _)| dialect.quote_ident(backing))
        .collect();
    let values: Vec<String> = columns
        .iter()
        .map(|(_, index)| dialect.placeholder(index + 1))
        .collect();
    let mut sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        dialect.qualified_object(object),
        names.join(", "),
        values.join(", ")
    );
    push_returning(&mut sql, returning, dialect);
    sql
}

pub fn build_update(
    object: &DatabaseObject,
    assignments: &[(String, usize)],
    predicate: &Predicate,
    returning: &[(String, String)],
    dialect: &dyn SqlDialect,
) -> String {
    let sets: Vec<String> = assignments
        .iter()
        .map(|(backing, index)| {
            format!(
                "{} = {}",
                dialect.quote_ident(backing),
                dialect.placeholder(index + 1)
            )
        })
        .collect();
    let mut sql = format!(
        "UPDATE {} SET {} WHERE ",
        dialect.qualified_object(object),
        sets.join(", ")
    );
    render_into(predicate, dialect, &mut sql);
    push_returning(&mut sql, returning, dialect);
    sql
}

pub fn build_delete(
    object: &DatabaseObject,
    predicate: &Predicate,
    returning: &[(String, String)],
    dialect: &dyn SqlDialect,
) -> String {
    let mut sql = format!("DELETE FROM {} WHERE ", dialect.qualified_object(object));
    render_into(predicate, dialect, &mut sql);
    push_returning(&mut sql, returning, dialect);
    sql
}

fn push_returning(sql: &mut String, returning: &[(String, String)], dialect: &dyn SqlDialect) {
    if returning.is_empty() {
        return;
    }
    sql.push_str(" RETURNING ");
    let columns: Vec<String> = returning
        .iter()
        .map(|(backing, exposed)| {
            if backing == exposed {
                dialect.quote_ident(backing)
            } else {
                format!(
                    "{} AS {}",
                    dialect.quote_ident(backing),
                    dialect.quote_ident(exposed)
                )
            }
        })
        .collect();
    sql.push_str(&columns.join(", "));
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::config::SourceKind;
    use crate::metadata::SourceDefinition;
    use crate::query::orderby::OrderDirection;
    use crate::query::predicate::Predicate;

    fn books() -> DatabaseObject {
        DatabaseObject {
            schema: String::new(),
            name: "books".into(),
            kind: SourceKind::Table,
            source: SourceDefinition {
                columns: vec![],
                primary_key: vec!["id".into()],
                relationships: Default::default(),
            },
        }
    }

    fn pairs(names: &[&str]) -> Vec<(String, String)> {
        names
            .iter()
            .map(|n| (n.to_string(), n.to_string()))
            .collect()
    }

    #[test]
    fn test_select_with_alias_order_and_paging() {
        let object = books();
        let columns = vec![
            ("id".to_string(), "id".to_string()),
            ("pub_year".to_string(), "publicationYear".to_string()),
        ];
        let order = vec![OrderByColumn {
            schema: String::new(),
            table: "books".into(),
            column: "id".into(),
            direction: OrderDirection::Asc,
        }];
        let predicate = Predicate::comparison("pub_year", PredicateOperation::GreaterThan, 0);
        let sql = build_select(
            &SelectSpec {
                object: &object,
                columns: &columns,
                predicate: Some(&predicate),
                order_by: &order,
                limit: Some(11),
                offset: 20,
            },
            &SqliteDialect,
        );
        assert_eq!(
            sql,
            "SELECT \"id\", \"pub_year\" AS \"publicationYear\" FROM \"books\" \
             WHERE \"pub_year\" > ?1 ORDER BY \"id\" ASC LIMIT 11 OFFSET 20"
        );
    }

    #[test]
    fn test_like_gets_escape_clause() {
        let predicate = Predicate::comparison("title", PredicateOperation::Like, 0);
        assert_eq!(
            render_predicate(&predicate, &SqliteDialect),
            "\"title\" LIKE ?1 ESCAPE '\\'"
        );
    }

    #[test]
    fn test_nested_parenthesized_rendering() {
        let left = Predicate::comparison("a", PredicateOperation::Equal, 0);
        let right = Predicate::comparison("b", PredicateOperation::Equal, 1);
        let predicate = Predicate::and(left, right);
        assert_eq!(
            render_predicate(&predicate, &SqliteDialect),
            "(\"a\" = ?1 AND \"b\" = ?2)"
        );
    }

    #[test]
    fn test_always_false_renders_literally() {
        assert_eq!(
            render_predicate(&Predicate::always_false(), &SqliteDialect),
            "1 != 1"
        );
    }

    #[test]
    fn test_postgres_placeholders() {
        let predicate = Predicate::comparison("a", PredicateOperation::Equal, 2);
        assert_eq!(
            render_predicate(&predicate, &PostgresDialect),
            "\"a\" = $3"
        );
    }

    #[test]
    fn test_insert_update_delete_with_returning() {
        let object = books();
        let returning = pairs(&["id", "title"]);

        let sql = build_insert(
            &object,
            &[("title".to_string(), 0), ("pub_year".to_string(), 1)],
            &returning,
            &SqliteDialect,
        );
        assert_eq!(
            sql,
            "INSERT INTO \"books\" (\"title\", \"pub_year\") VALUES (?1, ?2) \
             RETURNING \"id\", \"title\""
        );

        let key = Predicate::comparison("id", PredicateOperation::Equal, 1);
        let sql = build_update(
            &object,
            &[("title".to_string(), 0)],
            &key,
            &returning,
            &SqliteDialect,
        );
        assert_eq!(
            sql,
            "UPDATE \"books\" SET \"title\" = ?1 WHERE \"id\" = ?2 \
             RETURNING \"id\", \"title\""
        );

        let key = Predicate::comparison("id", PredicateOperation::Equal, 0);
        let sql = build_delete(&object, &key, &returning, &SqliteDialect);
        assert_eq!(
            sql,
            "DELETE FROM \"books\" WHERE \"id\" = ?1 RETURNING \"id\", \"title\""
        );
    }

    #[test]
    fn test_identifier_quoting_defends_against_quotes() {
        assert_eq!(SqliteDialect.quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}
