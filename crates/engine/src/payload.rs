//! The per-call envelope threaded through every pipeline stage.

use chrono::Utc;
use indexmap::IndexMap;
use retort_types::FieldDef;
use serde_json::{Map as JsonMap, Value};

use crate::{error::PipelineError, filters::FilterSet};

/// Standard pagination, sort, and filter arguments carried by collection fields.
pub const OPTION_ARG_NAMES: [&str; 5] = ["start", "limit", "orderBy", "orderByDirection", "filters"];

/// Params key holding the lineage string of the current resolution.
pub const CURRENT_REQUEST_KEY: &str = "currentRequestString";
/// Params key holding the lineage string of whatever triggered this resolution.
pub const PARENT_REQUEST_KEY: &str = "parentRequestString";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Resolve,
    Mutate,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    /// `desc` in any case sorts descending; everything else ascends.
    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("desc") { Self::Desc } else { Self::Asc }
    }
}

/// Shared context attached to every pipeline call. Supplies defaults for
/// [`PipelineParams::values`]; keys the caller already set are kept.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SharedContext(JsonMap<String, Value>);

impl SharedContext {
    pub fn new(values: JsonMap<String, Value>) -> Self {
        Self(values)
    }

    pub fn values(&self) -> &JsonMap<String, Value> {
        &self.0
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<JsonMap<String, Value>> for SharedContext {
    fn from(values: JsonMap<String, Value>) -> Self {
        Self(values)
    }
}

/// Pipeline parameters: extracted option args plus free-form values.
#[derive(Debug, Clone, Default)]
pub struct PipelineParams {
    pub start: Option<usize>,
    pub limit: Option<usize>,
    pub order_by: Option<String>,
    pub order_by_direction: SortDirection,
    pub filters: Option<FilterSet>,
    /// Argument definitions of the endpoint that triggered the call.
    pub args_definition: IndexMap<String, FieldDef>,
    /// Static `pipelineParams`, lineage strings, and shared context entries.
    pub values: JsonMap<String, Value>,
}

impl PipelineParams {
    pub fn with_values(values: JsonMap<String, Value>) -> Self {
        Self { values, ..Self::default() }
    }

    /// Fills keys missing from `values` with the shared context's entries.
    pub fn merge_shared(&mut self, shared: &SharedContext) {
        for (key, value) in shared.values() {
            if !self.values.contains_key(key) {
                self.values.insert(key.clone(), value.clone());
            }
        }
    }

    /// Moves option arguments out of `args` and into typed params.
    ///
    /// Zero, negative, or null `start`/`limit` values count as unset.
    pub fn absorb_option_args(&mut self, args: &mut JsonMap<String, Value>) -> Result<(), PipelineError> {
        self.absorb_option_args_at(args, Utc::now().timestamp())
    }

    pub fn absorb_option_args_at(&mut self, args: &mut JsonMap<String, Value>, now: i64) -> Result<(), PipelineError> {
        if let Some(start) = args.shift_remove("start") {
            self.start = positive_count(&start, "start")?;
        }
        if let Some(limit) = args.shift_remove("limit") {
            self.limit = positive_count(&limit, "limit")?;
        }
        if let Some(order_by) = args.shift_remove("orderBy") {
            self.order_by = order_by.as_str().filter(|field| !field.is_empty()).map(str::to_string);
        }
        if let Some(direction) = args.shift_remove("orderByDirection")
            && let Some(direction) = direction.as_str()
        {
            self.order_by_direction = SortDirection::parse(direction);
        }
        if let Some(filters) = args.shift_remove("filters")
            && !filters.is_null()
        {
            self.filters = Some(FilterSet::from_value(&filters, now)?);
        }
        Ok(())
    }
}

fn positive_count(value: &Value, name: &str) -> Result<Option<usize>, PipelineError> {
    match value {
        Value::Null => Ok(None),
        Value::Number(number) => Ok(number.as_i64().filter(|count| *count > 0).map(|count| count as usize)),
        other => Err(PipelineError::arguments(format!("'{name}' must be an integer, got {other}"))),
    }
}

/// The envelope every stage receives and returns.
#[derive(Debug, Clone)]
pub struct Payload {
    pub operation: Operation,
    /// Entity key of the type being resolved or written.
    pub target_type: String,
    /// Equality arguments (resolve) or write arguments (mutate).
    pub args: JsonMap<String, Value>,
    /// Effective connector configuration, fully merged before the first stage runs.
    pub config: JsonMap<String, Value>,
    pub multivalued: bool,
    pub method_name: Option<String>,
    pub params: PipelineParams,
    /// Set by the connector, or by any stage that wants to short-circuit the rest.
    pub response: Option<Value>,
}

impl Payload {
    pub fn resolve(target_type: impl Into<String>, args: JsonMap<String, Value>, multivalued: bool) -> Self {
        Self::new(Operation::Resolve, target_type, args, multivalued)
    }

    pub fn mutate(target_type: impl Into<String>, args: JsonMap<String, Value>, method_name: impl Into<String>) -> Self {
        let mut payload = Self::new(Operation::Mutate, target_type, args, false);
        payload.method_name = Some(method_name.into());
        payload
    }

    pub fn new(operation: Operation, target_type: impl Into<String>, args: JsonMap<String, Value>, multivalued: bool) -> Self {
        Self {
            operation,
            target_type: target_type.into(),
            args,
            config: JsonMap::new(),
            multivalued,
            method_name: None,
            params: PipelineParams::default(),
            response: None,
        }
    }

    pub fn with_config(mut self, config: JsonMap<String, Value>) -> Self {
        self.config = config;
        self
    }

    pub fn with_params(mut self, params: PipelineParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_method_name(mut self, method_name: Option<String>) -> Self {
        if method_name.is_some() {
            self.method_name = method_name;
        }
        self
    }

    pub fn is_mutation(&self) -> bool {
        self.operation == Operation::Mutate
    }

    pub fn has_response(&self) -> bool {
        self.response.is_some()
    }

    /// Lineage string for this call: `type[/args-json][/multivalued]`.
    pub fn request_string(&self) -> String {
        let mut lineage = self.target_type.clone();
        if !self.args.is_empty() {
            lineage.push('/');
            lineage.push_str(&Value::Object(self.args.clone()).to_string());
        }
        if self.multivalued {
            lineage.push_str("/multivalued");
        }
        lineage
    }

    pub fn into_response(self) -> Value {
        self.response.unwrap_or(Value::Null)
    }
}
