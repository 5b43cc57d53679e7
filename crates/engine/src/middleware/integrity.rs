use serde_json::Value;

use crate::{error::PipelineError, payload::Payload, stage::Stage};

/// Enforces argument definitions on writes before they reach a connector.
///
/// Runs only for mutations with no response yet and a non-empty
/// `argsDefinition`; everything else passes through untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntegrityCheck;

impl Stage for IntegrityCheck {
    fn process(&self, payload: Payload) -> Result<Payload, PipelineError> {
        if !payload.is_mutation() || payload.has_response() || payload.params.args_definition.is_empty() {
            return Ok(payload);
        }
        let mut violations = Vec::new();
        for (name, definition) in &payload.params.args_definition {
            let supplied = payload.args.get(name);
            if definition.required && supplied.is_none_or(Value::is_null) {
                violations.push(format!("'{name}' is required"));
            }
            if definition.read_only && supplied.is_some() {
                violations.push(format!("'{name}' is read-only"));
            }
            if definition.multivalued && supplied.is_some_and(|value| !value.is_null() && !value.is_array()) {
                violations.push(format!("'{name}' must be a list"));
            }
        }
        if violations.is_empty() {
            Ok(payload)
        } else {
            Err(PipelineError::arguments(violations.join(", ")))
        }
    }
}
