//! Generated input types
//!
//! One shared filter input per scalar kind (`StringFilterInput`,
//! `IntFilterInput`, ...), plus per-entity filter and order-by inputs.
//! Operator availability follows the scalar: pattern operators on strings
//! only, ordered comparisons everywhere except booleans and blobs,
//! `eq`/`neq`/`isNull` always.

use async_graphql::dynamic::{Enum, InputObject, InputValue, Scalar, TypeRef};

use crate::metadata::ScalarKind;
use crate::schema::EntityPlan;

pub const ORDER_DIRECTION_ENUM: &str = "OrderByDirection";

/// Scalar kinds outside the GraphQL built-ins get a scalar registration.
pub fn custom_scalars() -> Vec<Scalar> {
    ScalarKind::all()
        .iter()
        .filter(|kind| kind.is_custom())
        .map(|kind| Scalar::new(kind.graphql_type_name()))
        .collect()
}

/// The shared per-kind filter inputs.
pub fn scalar_filter_inputs() -> Vec<InputObject> {
    ScalarKind::all()
        .iter()
        .map(|kind| scalar_filter_input(*kind))
        .collect()
}

fn scalar_filter_input(kind: ScalarKind) -> InputObject {
    let value_type = || TypeRef::named(kind.graphql_type_name());
    let mut input = InputObject::new(kind.filter_input_name())
        .field(InputValue::new("eq", value_type()))
        .field(InputValue::new("neq", value_type()));

    if kind.supports_ordering() {
        input = input
            .field(InputValue::new("lt", value_type()))
            .field(InputValue::new("gt", value_type()))
            .field(InputValue::new("lte", value_type()))
            .field(InputValue::new("gte", value_type()));
    }
    if kind.supports_like() {
        input = input
            .field(InputValue::new("contains", value_type()))
            .field(InputValue::new("notContains", value_type()))
            .field(InputValue::new("startsWith", value_type()))
            .field(InputValue::new("endsWith", value_type()));
    }

    input.field(InputValue::new(
        "isNull",
        TypeRef::named(TypeRef::BOOLEAN),
    ))
}

pub fn order_direction_enum() -> Enum {
    Enum::new(ORDER_DIRECTION_ENUM).item("ASC").item("DESC")
}

/// Per-entity filter input: one field per generated column plus the
/// `and` / `or` composition lists.
pub fn entity_filter_input(plan: &EntityPlan) -> InputObject {
    let name = plan.filter_input_name();
    let mut input = InputObject::new(&name);
    for field in &plan.fields {
        input = input.field(InputValue::new(
            &field.exposed,
            TypeRef::named(field.kind.filter_input_name()),
        ));
    }
    input
        .field(InputValue::new("and", TypeRef::named_nn_list(&name)))
        .field(InputValue::new("or", TypeRef::named_nn_list(&name)))
}

/// Per-entity order-by input: orderable columns mapped to a direction.
pub fn entity_order_input(plan: &EntityPlan) -> InputObject {
    let mut input = InputObject::new(plan.order_input_name());
    for field in &plan.fields {
        if field.kind.supports_ordering() {
            input = input.field(InputValue::new(
                &field.exposed,
                TypeRef::named(ORDER_DIRECTION_ENUM),
            ));
        }
    }
    input
}

#[cfg(test)]
mod tests {
    use super::*;

    // The dynamic builders are opaque until registration, so these tests
    // exercise the naming and operator rules they are built from.

    #[test]
    fn test_custom_scalar_set() {
        let names: Vec<&str> = ScalarKind::all()
            .iter()
            .filter(|k| k.is_custom())
            .map(|k| k.graphql_type_name())
            .collect();
        assert!(names.contains(&"UUID"));
        assert!(names.contains(&"DateTime"));
        assert!(!names.contains(&"String"));
        assert!(!names.contains(&"Boolean"));
    }

    #[test]
    fn test_operator_availability_rules() {
        assert!(ScalarKind::String.supports_like());
        assert!(!ScalarKind::Int.supports_like());
        assert!(!ScalarKind::Boolean.supports_ordering());
        assert!(!ScalarKind::ByteArray.supports_ordering());
        assert!(ScalarKind::DateTime.supports_ordering());
    }

    #[test]
    fn test_filter_input_names_shared_per_kind() {
        assert_eq!(ScalarKind::Long.filter_input_name(), "LongFilterInput");
        assert_eq!(ScalarKind::String.filter_input_name(), "StringFilterInput");
    }
}
