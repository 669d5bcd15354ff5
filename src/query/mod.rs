//! Query translation core
//!
//! - `predicate`: engine-neutral predicate trees with parameter placeholders
//! - `params`: positional bind-value store and GraphQL value conversion
//! - `filter`: GraphQL filter-input objects -> predicates
//! - `odata`: OData `$filter` / `$orderby` expressions -> predicates
//! - `orderby`: ordering columns with primary-key tie-breaks

pub mod filter;
pub mod odata;
pub mod orderby;
pub mod params;
pub mod predicate;

pub use filter::{escape_like_pattern, FilterParser};
pub use orderby::{with_primary_key_tiebreak, OrderByColumn, OrderDirection};
pub use params::{ParamStore, SqlValue};
pub use predicate::{Predicate, PredicateOperand, PredicateOperation};
