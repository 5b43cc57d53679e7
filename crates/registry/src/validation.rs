//! Checks plain JSON data against compiled entity input types.

use serde_json::Value;

use crate::{
    assembler::TypeRegistry,
    compiled::{ArgTarget, CompiledInputType, TypeShape},
};

/// Validates `value` against the input type registered for entity `key` and
/// returns every violation found, each prefixed with its path.
pub fn input_violations(value: &Value, key: &str, registry: &TypeRegistry) -> Vec<String> {
    let mut violations = Vec::new();
    check_entity(value, key, registry, "$", &mut violations);
    violations
}

fn check_shape(value: &Value, shape: &TypeShape, target: &ArgTarget, registry: &TypeRegistry, path: &str, violations: &mut Vec<String>) {
    match shape {
        TypeShape::NonNull(inner) => {
            if value.is_null() {
                violations.push(format!("{path}: expected non-null {inner}"));
            } else {
                check_shape(value, inner, target, registry, path, violations);
            }
        }
        _ if value.is_null() => {}
        // A single value where a list is expected counts as a one-element list.
        TypeShape::List(inner) => match value {
            Value::Array(items) => {
                for (index, item) in items.iter().enumerate() {
                    check_shape(item, inner, target, registry, &format!("{path}[{index}]"), violations);
                }
            }
            single => check_shape(single, inner, target, registry, path, violations),
        },
        TypeShape::Named(_) => match target {
            ArgTarget::Scalar(scalar) => {
                if !scalar_accepts(scalar, value) {
                    violations.push(format!("{path}: expected {scalar}, got {value}"));
                }
            }
            ArgTarget::Entity(key) => check_entity(value, key, registry, path, violations),
            ArgTarget::Builtin(_) => {}
        },
    }
}

fn check_entity(value: &Value, key: &str, registry: &TypeRegistry, path: &str, violations: &mut Vec<String>) {
    match registry.input(key) {
        None => violations.push(format!("{path}: no input type for '{key}'")),
        Some(CompiledInputType::Enum { name, values, .. }) => {
            let known = value.as_str().is_some_and(|candidate| values.iter().any(|(value, _)| value == candidate));
            if !known {
                violations.push(format!("{path}: {value} is not a value of {name}"));
            }
        }
        Some(CompiledInputType::Object { name, fields, .. }) => {
            let Value::Object(record) = value else {
                violations.push(format!("{path}: expected {name} object, got {value}"));
                return;
            };
            for field in record.keys().filter(|field| !fields.contains_key(*field)) {
                violations.push(format!("{path}: unknown field '{field}' for {name}"));
            }
            for (field_name, field) in fields {
                let field_path = format!("{path}.{field_name}");
                match record.get(field_name) {
                    Some(field_value) => check_shape(field_value, &field.shape, &field.target, registry, &field_path, violations),
                    None if matches!(field.shape, TypeShape::NonNull(_)) && field.default_value.is_none() => {
                        violations.push(format!("{field_path}: required field missing"));
                    }
                    None => {}
                }
            }
        }
    }
}

fn scalar_accepts(scalar: &str, value: &Value) -> bool {
    match scalar {
        "Int" => value.as_i64().is_some_and(|number| i32::try_from(number).is_ok()),
        "Float" => value.is_number(),
        "String" => value.is_string(),
        "Boolean" => value.is_boolean(),
        "ID" => value.is_string() || value.is_i64() || value.is_u64(),
        _ => false,
    }
}
