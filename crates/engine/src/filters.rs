//! The `filters` option argument and its evaluation against flat records.

use std::cmp::Ordering;

use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value};

use crate::{
    connector::ordering::{compare_values, loosely_equal, render},
    error::PipelineError,
    filter_value::decode_filter_value_at,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LogicalOperator {
    #[default]
    And,
    Or,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScalarOperator {
    #[default]
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    Like,
    NotLike,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ArrayOperator {
    #[default]
    In,
    NotIn,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BetweenOperator {
    #[default]
    Between,
    NotBetween,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarFilter {
    pub field: String,
    #[serde(default)]
    pub operator: ScalarOperator,
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayFilter {
    pub field: String,
    #[serde(default)]
    pub operator: ArrayOperator,
    pub value: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BetweenFilter {
    pub field: String,
    #[serde(default)]
    pub operator: BetweenOperator,
    pub min: Value,
    pub max: Value,
}

/// Parsed `filters` argument. An empty set matches every record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterSet {
    #[serde(default)]
    pub operator: LogicalOperator,
    #[serde(default)]
    pub scalar_filters: Vec<ScalarFilter>,
    #[serde(default)]
    pub array_filters: Vec<ArrayFilter>,
    #[serde(default)]
    pub between_filters: Vec<BetweenFilter>,
}

impl FilterSet {
    /// Parses a raw `filters` value and decodes every operand with the filter value codec.
    pub fn from_value(raw: &Value, now: i64) -> Result<Self, PipelineError> {
        let mut filters: FilterSet = serde_json::from_value(without_nulls(raw)).map_err(|error| PipelineError::arguments(format!("malformed filters: {error}")))?;
        for filter in &mut filters.scalar_filters {
            filter.value = decode_filter_value_at(&filter.value, now);
        }
        for filter in &mut filters.array_filters {
            filter.value = filter.value.iter().map(|value| decode_filter_value_at(value, now)).collect();
        }
        for filter in &mut filters.between_filters {
            filter.min = decode_filter_value_at(&filter.min, now);
            filter.max = decode_filter_value_at(&filter.max, now);
        }
        Ok(filters)
    }

    pub fn is_empty(&self) -> bool {
        self.scalar_filters.is_empty() && self.array_filters.is_empty() && self.between_filters.is_empty()
    }

    pub fn matches(&self, record: &JsonMap<String, Value>) -> bool {
        if self.is_empty() {
            return true;
        }
        let mut outcomes = self
            .scalar_filters
            .iter()
            .map(|filter| filter.matches(record))
            .chain(self.array_filters.iter().map(|filter| filter.matches(record)))
            .chain(self.between_filters.iter().map(|filter| filter.matches(record)));
        match self.operator {
            LogicalOperator::And => outcomes.all(|outcome| outcome),
            LogicalOperator::Or => outcomes.any(|outcome| outcome),
        }
    }
}

impl ScalarFilter {
    fn matches(&self, record: &JsonMap<String, Value>) -> bool {
        let candidate = record.get(&self.field).filter(|value| !value.is_null());
        let Some(candidate) = candidate else {
            return matches!(self.operator, ScalarOperator::Ne | ScalarOperator::NotLike);
        };
        let ordering = || compare_values(Some(candidate), Some(&self.value));
        match self.operator {
            ScalarOperator::Eq => loosely_equal(candidate, &self.value),
            ScalarOperator::Ne => !loosely_equal(candidate, &self.value),
            ScalarOperator::Lt => ordering() == Ordering::Less,
            ScalarOperator::Lte => ordering() != Ordering::Greater,
            ScalarOperator::Gt => ordering() == Ordering::Greater,
            ScalarOperator::Gte => ordering() != Ordering::Less,
            ScalarOperator::Like => like(&render(candidate), &render(&self.value)),
            ScalarOperator::NotLike => !like(&render(candidate), &render(&self.value)),
        }
    }
}

impl ArrayFilter {
    fn matches(&self, record: &JsonMap<String, Value>) -> bool {
        let contained = record
            .get(&self.field)
            .is_some_and(|candidate| self.value.iter().any(|option| loosely_equal(candidate, option)));
        match self.operator {
            ArrayOperator::In => contained,
            ArrayOperator::NotIn => !contained,
        }
    }
}

impl BetweenFilter {
    fn matches(&self, record: &JsonMap<String, Value>) -> bool {
        let inside = record.get(&self.field).filter(|value| !value.is_null()).is_some_and(|candidate| {
            compare_values(Some(candidate), Some(&self.min)) != Ordering::Less && compare_values(Some(candidate), Some(&self.max)) != Ordering::Greater
        });
        match self.operator {
            BetweenOperator::Between => inside,
            BetweenOperator::NotBetween => !inside,
        }
    }
}

/// Explicit nulls on optional inputs behave like omitted keys.
fn without_nulls(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(_, entry)| !entry.is_null())
                .map(|(key, entry)| (key.clone(), without_nulls(entry)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(without_nulls).collect()),
        other => other.clone(),
    }
}

/// SQL-style pattern match: `%` is any run, `_` a single character, case-insensitive.
fn like(candidate: &str, pattern: &str) -> bool {
    let mut expression = String::from("^");
    for character in pattern.chars() {
        match character {
            '%' => expression.push_str(".*"),
            '_' => expression.push('.'),
            other => expression.push_str(&regex::escape(&other.to_string())),
        }
    }
    expression.push('$');
    RegexBuilder::new(&expression)
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
        .is_ok_and(|regex| regex.is_match(candidate))
}
