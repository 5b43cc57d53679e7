//! The option argument set carried by every collection-returning field, and
//! the built-in input types behind its `filters` argument.

use async_graphql::{
    Value as GqlValue,
    dynamic::{Enum, EnumItem, InputObject, InputValue, Scalar, Type, TypeRef},
};
use retort_engine::OPTION_ARG_NAMES;

use crate::compiled::{ArgTarget, CompiledArg, TypeShape};

pub const FILTERS_INPUT: &str = "RetortFilters";
pub const FILTERS_OPERATOR: &str = "RetortFiltersOperator";
pub const SCALAR_FILTER_INPUT: &str = "RetortScalarFilter";
pub const SCALAR_OPERATOR: &str = "RetortScalarOperator";
pub const ARRAY_FILTER_INPUT: &str = "RetortArrayFilter";
pub const ARRAY_OPERATOR: &str = "RetortArrayOperator";
pub const BETWEEN_FILTER_INPUT: &str = "RetortBetweenFilter";
pub const BETWEEN_OPERATOR: &str = "RetortBetweenOperator";
/// Scalar accepting any int, float, boolean, or string literal.
pub const FILTER_VALUE_SCALAR: &str = "FilterValue";

pub fn is_option_arg(name: &str) -> bool {
    OPTION_ARG_NAMES.contains(&name)
}

/// `start`, `limit`, `orderBy`, `orderByDirection`, `filters`, in that order.
pub fn option_args() -> Vec<CompiledArg> {
    let scalar = |name: &str, type_name: &str, description: &str| CompiledArg {
        name: name.to_string(),
        shape: TypeShape::named(type_name),
        target: ArgTarget::Scalar(type_name.to_string()),
        description: Some(description.to_string()),
        default_value: None,
    };
    vec![
        scalar("start", "Int", "Offset of the first matching record to return."),
        scalar("limit", "Int", "Maximum number of records to return."),
        scalar("orderBy", "String", "Field to sort by."),
        scalar("orderByDirection", "String", "`asc` (default) or `desc`."),
        CompiledArg {
            name: "filters".to_string(),
            shape: TypeShape::named(FILTERS_INPUT),
            target: ArgTarget::Builtin(FILTERS_INPUT.to_string()),
            description: Some("Structured filters combined with `operator`.".to_string()),
            default_value: None,
        },
    ]
}

/// Appends the option arguments, replacing any same-named argument already present.
pub fn append_option_args(args: &mut Vec<CompiledArg>) {
    args.retain(|arg| !is_option_arg(&arg.name));
    args.extend(option_args());
}

fn operator_enum(name: &str, values: &[&str]) -> Enum {
    values.iter().fold(Enum::new(name), |enumeration, value| enumeration.item(EnumItem::new(*value)))
}

fn filter_input(name: &str, operator_type: &str, default_operator: &str) -> InputObject {
    InputObject::new(name)
        .field(InputValue::new("field", TypeRef::named_nn(TypeRef::STRING)))
        .field(InputValue::new("operator", TypeRef::named(operator_type)).default_value(GqlValue::Enum(async_graphql::Name::new(default_operator))))
}

/// Every type the `filters` argument needs, ready to register on a schema.
pub fn builtin_input_types() -> Vec<Type> {
    vec![
        Scalar::new(FILTER_VALUE_SCALAR)
            .description("Int, Float, Boolean, or String. Strings containing NOW(n) become a Unix timestamp shifted by n days.")
            .into(),
        operator_enum(FILTERS_OPERATOR, &["and", "or"]).into(),
        operator_enum(SCALAR_OPERATOR, &["eq", "ne", "lt", "lte", "gt", "gte", "like", "notLike"]).into(),
        operator_enum(ARRAY_OPERATOR, &["in", "notIn"]).into(),
        operator_enum(BETWEEN_OPERATOR, &["between", "notBetween"]).into(),
        filter_input(SCALAR_FILTER_INPUT, SCALAR_OPERATOR, "eq")
            .field(InputValue::new("value", TypeRef::named(FILTER_VALUE_SCALAR)))
            .into(),
        filter_input(ARRAY_FILTER_INPUT, ARRAY_OPERATOR, "in")
            .field(InputValue::new("value", TypeRef::named_list_nn(FILTER_VALUE_SCALAR)))
            .into(),
        filter_input(BETWEEN_FILTER_INPUT, BETWEEN_OPERATOR, "between")
            .field(InputValue::new("min", TypeRef::named_nn(FILTER_VALUE_SCALAR)))
            .field(InputValue::new("max", TypeRef::named_nn(FILTER_VALUE_SCALAR)))
            .into(),
        InputObject::new(FILTERS_INPUT)
            .field(InputValue::new("operator", TypeRef::named(FILTERS_OPERATOR)).default_value(GqlValue::Enum(async_graphql::Name::new("and"))))
            .field(InputValue::new("scalarFilters", TypeRef::named_list(SCALAR_FILTER_INPUT)))
            .field(InputValue::new("arrayFilters", TypeRef::named_list(ARRAY_FILTER_INPUT)))
            .field(InputValue::new("betweenFilters", TypeRef::named_list(BETWEEN_FILTER_INPUT)))
            .into(),
    ]
}
