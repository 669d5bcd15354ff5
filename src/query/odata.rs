//! OData expression support for the REST surface
//!
//! Hand-rolled lexer and recursive-descent parser for the `$filter` grammar
//! subset (comparisons, `and`/`or`/`not`, grouping) plus the `$orderby` list
//! form. Parsed trees are translated against an entity's EDM so expressions
//! are written in exposed field names and literals are typed against the
//! backing column.

use async_graphql::Value;

use crate::error::RequestError;
use crate::query::orderby::{OrderByColumn, OrderDirection};
use crate::query::params::ParamStore;
use crate::query::predicate::{Predicate, PredicateOperand, PredicateOperation};
use crate::schema::edm::EntityEdm;

// =============================================================================
// Lexer
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Number(String),
    LParen,
    RParen,
    Comma,
}

fn lex(raw: &str) -> Result<Vec<Token>, RequestError> {
    let mut tokens = Vec::new();
    let mut chars = raw.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\r' | '\n' => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '\'' => {
                chars.next();
                let mut value = String::new();
                loop {
                    match chars.next() {
                        // '' inside a quoted string is an escaped quote
                        Some('\'') => {
                            if chars.peek() == Some(&'\'') {
                                chars.next();
                                value.push('\'');
                            } else {
                                break;
                            }
                        }
                        Some(other) => value.push(other),
                        None => {
                            return Err(RequestError::InvalidFilter(
                                "unterminated string literal".to_string(),
                            ));
                        }
                    }
                }
                tokens.push(Token::Str(value));
            }
            '-' | '0'..='9' => {
                let mut value = String::new();
                value.push(c);
                chars.next();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        value.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Number(value));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut value = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_alphanumeric() || d == '_' {
                        value.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(value));
            }
            other => {
                return Err(RequestError::InvalidFilter(format!(
                    "unexpected character '{}'",
                    other
                )));
            }
        }
    }

    Ok(tokens)
}

// =============================================================================
// Parser
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ODataLiteral {
    Null,
    Bool(bool),
    Number(String),
    String(String),
}

impl ODataLiteral {
    fn display(&self) -> String {
        match self {
            ODataLiteral::Null => "null".to_string(),
            ODataLiteral::Bool(b) => b.to_string(),
            ODataLiteral::Number(n) => n.clone(),
            ODataLiteral::String(s) => s.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpr {
    Binary {
        op: BinaryOp,
        left: Box<FilterExpr>,
        right: Box<FilterExpr>,
    },
    Not(Box<FilterExpr>),
    Property(String),
    Literal(ODataLiteral),
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if matches!(self.peek(), Some(Token::Ident(w)) if w == keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token) -> Result<(), RequestError> {
        if self.peek() == Some(&token) {
            self.pos += 1;
            Ok(())
        } else {
            Err(RequestError::InvalidFilter(format!(
                "expected {:?}",
                token
            )))
        }
    }

    // or := and ('or' and)*
    fn parse_or(&mut self) -> Result<FilterExpr, RequestError> {
        let mut expr = self.parse_and()?;
        while self.eat_keyword("or") {
            let right = self.parse_and()?;
            expr = FilterExpr::Binary {
                op: BinaryOp::Or,
                left: Box::new(expr),
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    // and := unary ('and' unary)*
    fn parse_and(&mut self) -> Result<FilterExpr, RequestError> {
        let mut expr = self.parse_unary()?;
        while self.eat_keyword("and") {
            let right = self.parse_unary()?;
            expr = FilterExpr::Binary {
                op: BinaryOp::And,
                left: Box::new(expr),
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    // unary := 'not' unary | comparison
    fn parse_unary(&mut self) -> Result<FilterExpr, RequestError> {
        if self.eat_keyword("not") {
            let inner = self.parse_unary()?;
            return Ok(FilterExpr::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    // comparison := '(' or ')' | operand compare_op operand
    fn parse_comparison(&mut self) -> Result<FilterExpr, RequestError> {
        if self.peek() == Some(&Token::LParen) {
            self.pos += 1;
            let inner = self.parse_or()?;
            self.expect(Token::RParen)?;
            return Ok(inner);
        }

        let left = self.parse_operand()?;
        let op = match self.next() {
            Some(Token::Ident(word)) => match word.as_str() {
                "eq" => BinaryOp::Eq,
                "ne" => BinaryOp::Ne,
                "gt" => BinaryOp::Gt,
                "ge" => BinaryOp::Ge,
                "lt" => BinaryOp::Lt,
                "le" => BinaryOp::Le,
                other => {
                    return Err(RequestError::InvalidFilter(format!(
                        "expected comparison operator, found '{}'",
                        other
                    )));
                }
            },
            _ => {
                return Err(RequestError::InvalidFilter(
                    "expected comparison operator".to_string(),
                ));
            }
        };
        let right = self.parse_operand()?;

        Ok(FilterExpr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    fn parse_operand(&mut self) -> Result<FilterExpr, RequestError> {
        match self.next() {
            Some(Token::Str(s)) => Ok(FilterExpr::Literal(ODataLiteral::String(s))),
            Some(Token::Number(n)) => Ok(FilterExpr::Literal(ODataLiteral::Number(n))),
            Some(Token::Ident(word)) => match word.as_str() {
                "null" => Ok(FilterExpr::Literal(ODataLiteral::Null)),
                "true" => Ok(FilterExpr::Literal(ODataLiteral::Bool(true))),
                "false" => Ok(FilterExpr::Literal(ODataLiteral::Bool(false))),
                _ => Ok(FilterExpr::Property(word)),
            },
            _ => Err(RequestError::InvalidFilter(
                "expected a field name or literal".to_string(),
            )),
        }
    }
}

pub fn parse_filter(raw: &str) -> Result<FilterExpr, RequestError> {
    let tokens = lex(raw)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_or()?;
    if parser.pos != parser.tokens.len() {
        return Err(RequestError::InvalidFilter(
            "unexpected trailing input".to_string(),
        ));
    }
    Ok(expr)
}

// =============================================================================
// Translation
// =============================================================================

/// Translate a `$filter` expression into a predicate against `edm`,
/// registering bind values in `params`.
pub fn translate_filter(
    raw: &str,
    edm: &EntityEdm,
    params: &mut ParamStore,
) -> Result<Predicate, RequestError> {
    let expr = parse_filter(raw)?;
    translate_expr(&expr, edm, params)
}

fn translate_expr(
    expr: &FilterExpr,
    edm: &EntityEdm,
    params: &mut ParamStore,
) -> Result<Predicate, RequestError> {
    match expr {
        FilterExpr::Binary { op: BinaryOp::And, left, right } => Ok(Predicate {
            left: PredicateOperand::Nested(Box::new(translate_expr(left, edm, params)?)),
            op: PredicateOperation::And,
            right: PredicateOperand::Nested(Box::new(translate_expr(right, edm, params)?)),
            parenthesized: true,
        }),
        FilterExpr::Binary { op: BinaryOp::Or, left, right } => Ok(Predicate {
            left: PredicateOperand::Nested(Box::new(translate_expr(left, edm, params)?)),
            op: PredicateOperation::Or,
            right: PredicateOperand::Nested(Box::new(translate_expr(right, edm, params)?)),
            parenthesized: true,
        }),
        FilterExpr::Binary { op, left, right } => {
            translate_comparison(*op, left, right, edm, params)
        }
        FilterExpr::Not(inner) => Ok(translate_expr(inner, edm, params)?.negated()),
        FilterExpr::Property(_) | FilterExpr::Literal(_) => Err(RequestError::InvalidFilter(
            "expression is not a boolean condition".to_string(),
        )),
    }
}

fn comparison_operation(op: BinaryOp) -> PredicateOperation {
    match op {
        BinaryOp::Eq => PredicateOperation::Equal,
        BinaryOp::Ne => PredicateOperation::NotEqual,
        BinaryOp::Gt => PredicateOperation::GreaterThan,
        BinaryOp::Ge => PredicateOperation::GreaterThanOrEqual,
        BinaryOp::Lt => PredicateOperation::LessThan,
        BinaryOp::Le => PredicateOperation::LessThanOrEqual,
        BinaryOp::And | BinaryOp::Or => unreachable!("logical operator in comparison position"),
    }
}

/// Mirror a comparison so the property lands on the left.
fn mirrored(op: BinaryOp) -> BinaryOp {
    match op {
        BinaryOp::Gt => BinaryOp::Lt,
        BinaryOp::Ge => BinaryOp::Le,
        BinaryOp::Lt => BinaryOp::Gt,
        BinaryOp::Le => BinaryOp::Ge,
        other => other,
    }
}

fn translate_comparison(
    op: BinaryOp,
    left: &FilterExpr,
    right: &FilterExpr,
    edm: &EntityEdm,
    params: &mut ParamStore,
) -> Result<Predicate, RequestError> {
    match (left, right) {
        (FilterExpr::Property(name), FilterExpr::Literal(literal)) => {
            translate_field_literal(op, name, literal, edm, params)
        }
        (FilterExpr::Literal(literal), FilterExpr::Property(name)) => {
            translate_field_literal(mirrored(op), name, literal, edm, params)
        }
        (FilterExpr::Property(a), FilterExpr::Property(b)) => {
            let left = resolve_field(a, edm)?;
            let right = resolve_field(b, edm)?;
            Ok(Predicate {
                left: PredicateOperand::Column(left.backing_column.clone()),
                op: comparison_operation(op),
                right: PredicateOperand::Column(right.backing_column.clone()),
                parenthesized: false,
            })
        }
        _ => Err(RequestError::InvalidFilter(
            "comparison must reference at least one field".to_string(),
        )),
    }
}

fn resolve_field<'e>(
    name: &str,
    edm: &'e EntityEdm,
) -> Result<&'e crate::schema::edm::EdmField, RequestError> {
    edm.field(name).ok_or_else(|| RequestError::UnknownField {
        entity: edm.entity.clone(),
        field: name.to_string(),
    })
}

fn translate_field_literal(
    op: BinaryOp,
    name: &str,
    literal: &ODataLiteral,
    edm: &EntityEdm,
    params: &mut ParamStore,
) -> Result<Predicate, RequestError> {
    let field = resolve_field(name, edm)?;

    // Null literals collapse to null tests: `eq null` is IS NULL, every
    // other comparison against null is IS NOT NULL.
    if matches!(literal, ODataLiteral::Null) {
        let negated = op != BinaryOp::Eq;
        return Ok(Predicate::null_check(field.backing_column.clone(), negated));
    }

    let value = literal_to_value(literal);
    let param = params
        .add_graphql(field.kind, &value)
        .map_err(|_| RequestError::InvalidLiteral {
            literal: literal.display(),
            target_type: field.kind.graphql_type_name().to_string(),
        })?;
    Ok(Predicate::comparison(
        field.backing_column.clone(),
        comparison_operation(op),
        param,
    ))
}

fn literal_to_value(literal: &ODataLiteral) -> Value {
    match literal {
        ODataLiteral::Null => Value::Null,
        ODataLiteral::Bool(b) => Value::Boolean(*b),
        ODataLiteral::Number(n) => {
            if let Ok(i) = n.parse::<i64>() {
                Value::Number(i.into())
            } else if let Some(number) =
                n.parse::<f64>().ok().and_then(serde_json::Number::from_f64)
            {
                Value::Number(number)
            } else {
                // Not numeric after all; typing against the column will fail
                // with the literal named.
                Value::String(n.clone())
            }
        }
        ODataLiteral::String(s) => Value::String(s.clone()),
    }
}

// =============================================================================
// $orderby
// =============================================================================

/// Parse a `$orderby` list (`field [asc|desc], ...`) into ordering columns.
pub fn parse_orderby(raw: &str, edm: &EntityEdm) -> Result<Vec<OrderByColumn>, RequestError> {
    let mut columns = Vec::new();

    for part in raw.split(',') {
        let mut words = part.split_whitespace();
        let Some(name) = words.next() else {
            return Err(RequestError::InvalidOrderBy(
                "empty $orderby entry".to_string(),
            ));
        };
        if !name.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_') {
            return Err(RequestError::InvalidOrderBy(format!(
                "'{}' is not a field name",
                name
            )));
        }
        let direction = match words.next() {
            None => OrderDirection::Asc,
            Some("asc") => OrderDirection::Asc,
            Some("desc") => OrderDirection::Desc,
            Some(other) => {
                return Err(RequestError::InvalidOrderBy(format!(
                    "expected 'asc' or 'desc', found '{}'",
                    other
                )));
            }
        };
        if words.next().is_some() {
            return Err(RequestError::InvalidOrderBy(
                "unexpected trailing input".to_string(),
            ));
        }

        let field = edm.field(name).ok_or_else(|| RequestError::UnknownField {
            entity: edm.entity.clone(),
            field: name.to_string(),
        })?;
        columns.push(OrderByColumn {
            schema: edm.schema.clone(),
            table: edm.object.clone(),
            column: field.backing_column.clone(),
            direction,
        });
    }

    Ok(columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::ScalarKind;
    use crate::query::params::SqlValue;
    use crate::schema::edm::EdmField;
    use indexmap::IndexMap;

    fn edm() -> EntityEdm {
        let mut fields = IndexMap::new();
        fields.insert(
            "id".to_string(),
            EdmField {
                backing_column: "id".into(),
                kind: ScalarKind::Int,
                nullable: false,
            },
        );
        fields.insert(
            "title".to_string(),
            EdmField {
                backing_column: "title".into(),
                kind: ScalarKind::String,
                nullable: false,
            },
        );
        fields.insert(
            "publicationYear".to_string(),
            EdmField {
                backing_column: "pub_year".into(),
                kind: ScalarKind::Int,
                nullable: true,
            },
        );
        EntityEdm {
            entity: "Book".into(),
            key: "Book..books".into(),
            schema: String::new(),
            object: "books".into(),
            fields,
        }
    }

    fn translate(raw: &str) -> Result<(Predicate, Vec<SqlValue>), RequestError> {
        let edm = edm();
        let mut params = ParamStore::new();
        let predicate = translate_filter(raw, &edm, &mut params)?;
        Ok((predicate, params.into_values()))
    }

    // =========================================================================
    // Lexer Tests
    // =========================================================================

    #[test]
    fn test_lex_quoted_string_with_escaped_quote() {
        let tokens = lex("title eq 'O''Brien'").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Ident("title".into()),
                Token::Ident("eq".into()),
                Token::Str("O'Brien".into()),
            ]
        );
    }

    #[test]
    fn test_lex_unterminated_string_fails() {
        assert!(matches!(
            lex("title eq 'oops"),
            Err(RequestError::InvalidFilter(_))
        ));
    }

    // =========================================================================
    // Parser Tests
    // =========================================================================

    #[test]
    fn test_or_binds_looser_than_and() {
        // a and b or c parses as (a and b) or c
        let expr = parse_filter("id eq 1 and id eq 2 or id eq 3").unwrap();
        let FilterExpr::Binary { op, left, .. } = expr else {
            panic!("expected binary");
        };
        assert_eq!(op, BinaryOp::Or);
        assert!(matches!(
            *left,
            FilterExpr::Binary { op: BinaryOp::And, .. }
        ));
    }

    #[test]
    fn test_grouping_overrides_precedence() {
        let expr = parse_filter("id eq 1 and (id eq 2 or id eq 3)").unwrap();
        let FilterExpr::Binary { op, right, .. } = expr else {
            panic!("expected binary");
        };
        assert_eq!(op, BinaryOp::And);
        assert!(matches!(
            *right,
            FilterExpr::Binary { op: BinaryOp::Or, .. }
        ));
    }

    #[test]
    fn test_trailing_garbage_rejected() {
        assert!(matches!(
            parse_filter("id eq 1 id"),
            Err(RequestError::InvalidFilter(_))
        ));
    }

    // =========================================================================
    // Translation Tests
    // =========================================================================

    #[test]
    fn test_alias_and_typed_literal() {
        let (predicate, values) = translate("publicationYear ge 1950").unwrap();
        assert_eq!(
            predicate.left,
            PredicateOperand::Column("pub_year".into())
        );
        assert_eq!(predicate.op, PredicateOperation::GreaterThanOrEqual);
        assert_eq!(values, vec![SqlValue::Int(1950)]);
    }

    #[test]
    fn test_literal_on_left_mirrors_operator() {
        let (predicate, _) = translate("1950 le publicationYear").unwrap();
        assert_eq!(
            predicate.left,
            PredicateOperand::Column("pub_year".into())
        );
        assert_eq!(predicate.op, PredicateOperation::GreaterThanOrEqual);
    }

    #[test]
    fn test_null_comparisons_become_null_tests() {
        let (predicate, values) = translate("publicationYear eq null").unwrap();
        assert_eq!(predicate.op, PredicateOperation::Is);
        assert_eq!(predicate.right, PredicateOperand::Null);
        assert!(values.is_empty());

        let (predicate, _) = translate("publicationYear gt null").unwrap();
        assert_eq!(predicate.op, PredicateOperation::IsNot);
    }

    #[test]
    fn test_not_inverts_through_logic() {
        let (predicate, _) = translate("not (id eq 1 and id eq 2)").unwrap();
        assert_eq!(predicate.op, PredicateOperation::Or);
        let PredicateOperand::Nested(left) = &predicate.left else {
            panic!("expected nested left");
        };
        assert_eq!(left.op, PredicateOperation::NotEqual);
    }

    #[test]
    fn test_bad_literal_names_literal_and_type() {
        let err = translate("id eq 'NaN'").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("NaN"));
        assert!(msg.contains("Int"));
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(matches!(
            translate("rating eq 1"),
            Err(RequestError::UnknownField { .. })
        ));
    }

    // =========================================================================
    // $orderby Tests
    // =========================================================================

    #[test]
    fn test_orderby_defaults_ascending() {
        let edm = edm();
        let columns = parse_orderby("publicationYear, title desc", &edm).unwrap();
        assert_eq!(columns.len(), 2);
        assert_eq!(columns[0].column, "pub_year");
        assert_eq!(columns[0].direction, OrderDirection::Asc);
        assert_eq!(columns[1].column, "title");
        assert_eq!(columns[1].direction, OrderDirection::Desc);
    }

    #[test]
    fn test_orderby_rejects_constants_and_unknown_fields() {
        let edm = edm();
        assert!(matches!(
            parse_orderby("1", &edm),
            Err(RequestError::InvalidOrderBy(_))
        ));
        assert!(matches!(
            parse_orderby("rating desc", &edm),
            Err(RequestError::UnknownField { .. })
        ));
    }
}
