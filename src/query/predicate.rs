//! Predicate model
//!
//! A small boolean-expression tree representing filter conditions
//! independent of surface syntax (GraphQL filter objects or OData `$filter`).
//! Pure data: parsers build it, the query engine renders it. User input only
//! ever appears as parameter indices, never as embedded text.

/// Comparison and logical operations. A closed set; `NOT` is expressed by
/// operator inversion (see [`Predicate::negated`]) rather than a node kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredicateOperation {
    Equal,
    NotEqual,
    LessThan,
    GreaterThan,
    LessThanOrEqual,
    GreaterThanOrEqual,
    Like,
    NotLike,
    Is,
    IsNot,
    And,
    Or,
}

impl PredicateOperation {
    pub fn as_sql(&self) -> &'static str {
        match self {
            PredicateOperation::Equal => "=",
            PredicateOperation::NotEqual => "!=",
            PredicateOperation::LessThan => "<",
            PredicateOperation::GreaterThan => ">",
            PredicateOperation::LessThanOrEqual => "<=",
            PredicateOperation::GreaterThanOrEqual => ">=",
            PredicateOperation::Like => "LIKE",
            PredicateOperation::NotLike => "NOT LIKE",
            PredicateOperation::Is => "IS",
            PredicateOperation::IsNot => "IS NOT",
            PredicateOperation::And => "AND",
            PredicateOperation::Or => "OR",
        }
    }

    /// Logical complement, used to push `NOT` down through the tree.
    pub fn inverted(&self) -> PredicateOperation {
        match self {
            PredicateOperation::Equal => PredicateOperation::NotEqual,
            PredicateOperation::NotEqual => PredicateOperation::Equal,
            PredicateOperation::LessThan => PredicateOperation::GreaterThanOrEqual,
            PredicateOperation::GreaterThan => PredicateOperation::LessThanOrEqual,
            PredicateOperation::LessThanOrEqual => PredicateOperation::GreaterThan,
            PredicateOperation::GreaterThanOrEqual => PredicateOperation::LessThan,
            PredicateOperation::Like => PredicateOperation::NotLike,
            PredicateOperation::NotLike => PredicateOperation::Like,
            PredicateOperation::Is => PredicateOperation::IsNot,
            PredicateOperation::IsNot => PredicateOperation::Is,
            PredicateOperation::And => PredicateOperation::Or,
            PredicateOperation::Or => PredicateOperation::And,
        }
    }
}

/// One side of a predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum PredicateOperand {
    /// Backing column reference (already de-aliased by the parsers).
    Column(String),
    /// Index into the request's [`ParamStore`](super::params::ParamStore).
    Parameter(usize),
    /// SQL NULL, for `IS` / `IS NOT` comparisons.
    Null,
    /// A trusted internal literal (never user input). Only produced by
    /// [`Predicate::always_false`].
    Literal(&'static str),
    /// A nested sub-tree.
    Nested(Box<Predicate>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub left: PredicateOperand,
    pub op: PredicateOperation,
    pub right: PredicateOperand,
    /// Render wrapped in parentheses, preserving the precedence the filter
    /// author wrote.
    pub parenthesized: bool,
}

impl Predicate {
    /// A plain `column OP value` comparison.
    pub fn comparison(column: impl Into<String>, op: PredicateOperation, param: usize) -> Self {
        Self {
            left: PredicateOperand::Column(column.into()),
            op,
            right: PredicateOperand::Parameter(param),
            parenthesized: false,
        }
    }

    /// `column IS NULL` / `column IS NOT NULL`.
    pub fn null_check(column: impl Into<String>, negated: bool) -> Self {
        Self {
            left: PredicateOperand::Column(column.into()),
            op: if negated {
                PredicateOperation::IsNot
            } else {
                PredicateOperation::Is
            },
            right: PredicateOperand::Null,
            parenthesized: false,
        }
    }

    /// The canonical contradiction, used whenever a filter input reduces to
    /// zero conditions. An empty `or` branch must exclude all rows, not
    /// include them, so the zero-operand case fails closed rather than
    /// degenerating to an empty (vacuously true) conjunction.
    pub fn always_false() -> Self {
        Self {
            left: PredicateOperand::Literal("1"),
            op: PredicateOperation::NotEqual,
            right: PredicateOperand::Literal("1"),
            parenthesized: false,
        }
    }

    pub fn is_always_false(&self) -> bool {
        self.left == PredicateOperand::Literal("1")
            && self.op == PredicateOperation::NotEqual
            && self.right == PredicateOperand::Literal("1")
    }

    /// Right-fold a list of predicates into a binary chain with `op`.
    ///
    /// Zero operands collapse to [`Predicate::always_false`]; a single
    /// operand is returned unwrapped; longer lists become
    /// `p0 op (p1 op (p2 ...))` with the parenthesization flag set on every
    /// chain node when `parenthesize` is requested, so mixed AND/OR
    /// composition keeps the precedence the nesting expresses.
    pub fn chain(
        mut operands: Vec<Predicate>,
        op: PredicateOperation,
        parenthesize: bool,
    ) -> Predicate {
        if operands.len() > 1 {
            let first = operands.remove(0);
            let rest = Predicate::chain(operands, op, parenthesize);
            return Predicate {
                left: PredicateOperand::Nested(Box::new(first)),
                op,
                right: PredicateOperand::Nested(Box::new(rest)),
                parenthesized: parenthesize,
            };
        }
        match operands.pop() {
            Some(only) => only,
            None => Predicate::always_false(),
        }
    }

    /// Combine two predicates with AND, preserving each side's grouping.
    pub fn and(left: Predicate, right: Predicate) -> Predicate {
        Predicate {
            left: PredicateOperand::Nested(Box::new(left)),
            op: PredicateOperation::And,
            right: PredicateOperand::Nested(Box::new(right)),
            parenthesized: true,
        }
    }

    /// Logical negation via operator inversion (De Morgan through AND/OR),
    /// keeping the operation set closed.
    pub fn negated(self) -> Predicate {
        let negate_operand = |operand: PredicateOperand| match operand {
            PredicateOperand::Nested(inner) => {
                PredicateOperand::Nested(Box::new(inner.negated()))
            }
            other => other,
        };

        match self.op {
            PredicateOperation::And | PredicateOperation::Or => Predicate {
                left: negate_operand(self.left),
                op: self.op.inverted(),
                right: negate_operand(self.right),
                parenthesized: self.parenthesized,
            },
            _ => Predicate {
                op: self.op.inverted(),
                ..self
            },
        }
    }
}
