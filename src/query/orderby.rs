//! Ordering columns and the deterministic-pagination tie-break
//!
//! Cursor paging is only correct when the total order is deterministic, so
//! after the user-specified sort columns the full primary key is appended
//! (in declaration order) for any key column not already present.

use crate::metadata::DatabaseObject;

/// Sort direction. Defaults ascending when unspecified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

impl OrderDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            OrderDirection::Asc => "ASC",
            OrderDirection::Desc => "DESC",
        }
    }
}

/// A single ORDER BY entry, addressed by backing column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderByColumn {
    pub schema: String,
    pub table: String,
    pub column: String,
    pub direction: OrderDirection,
}

impl OrderByColumn {
    pub fn new(object: &DatabaseObject, column: impl Into<String>, direction: OrderDirection) -> Self {
        Self {
            schema: object.schema.clone(),
            table: object.name.clone(),
            column: column.into(),
            direction,
        }
    }
}

/// Finalize an ordering list: drop duplicate columns (first occurrence wins)
/// and append any primary-key column not already present, ascending, in
/// key-declaration order.
pub fn with_primary_key_tiebreak(
    user_columns: Vec<OrderByColumn>,
    object: &DatabaseObject,
) -> Vec<OrderByColumn> {
    let mut result: Vec<OrderByColumn> = Vec::with_capacity(
        user_columns.len() + object.source.primary_key.len(),
    );

    for column in user_columns {
        if !result.iter().any(|c| c.column == column.column) {
            result.push(column);
        }
    }

    for pk in &object.source.primary_key {
        if !result.iter().any(|c| &c.column == pk) {
            result.push(OrderByColumn::new(object, pk.clone(), OrderDirection::Asc));
        }
    }

    result
}
