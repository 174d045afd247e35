//! Metadata predicate evaluation.
//!
//! A predicate is a map `field -> condition`; a condition is either a bare
//! JSON scalar (equality shortcut) or `{op -> operand}`. Fields AND together,
//! ops within one field AND together. There is no OR/NOT/nesting.

use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::error::{RagError, RagResult};
use crate::types::Metadata;

#[derive(Debug, Clone)]
pub enum FilterCondition {
    Equality(Value),
    Op(OpCode, Value),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    Contains,
    StartsWith,
    EndsWith,
    IsTrue,
    IsFalse,
}

impl OpCode {
    fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "==" => OpCode::Eq,
            "!=" => OpCode::Ne,
            "<" => OpCode::Lt,
            "<=" => OpCode::Le,
            ">" => OpCode::Gt,
            ">=" => OpCode::Ge,
            "in" => OpCode::In,
            "not_in" => OpCode::NotIn,
            "contains" => OpCode::Contains,
            "starts_with" => OpCode::StartsWith,
            "ends_with" => OpCode::EndsWith,
            "is_true" => OpCode::IsTrue,
            "is_false" => OpCode::IsFalse,
            _ => return None,
        })
    }
}

/// A predicate field's list of AND'd conditions, parsed from the raw filter
/// map. Parsing happens once up front so an unknown operator is reported
/// before any evaluation begins.
pub struct Filter {
    fields: Vec<(String, Vec<FilterCondition>)>,
}

impl Filter {
    /// Parses a raw `{field: condition}` map. `condition` is either a scalar
    /// or `{op: operand}` with one or more operators.
    pub fn parse(raw: &HashMap<String, Value>) -> RagResult<Self> {
        let mut fields = Vec::with_capacity(raw.len());
        for (field, condition) in raw {
            let conds = match condition {
                Value::Object(map) => {
                    let mut out = Vec::with_capacity(map.len());
                    for (op_str, operand) in map {
                        let op = OpCode::from_str(op_str).ok_or_else(|| {
                            RagError::validation(format!("unknown filter operator '{op_str}'"))
                        })?;
                        out.push(FilterCondition::Op(op, operand.clone()));
                    }
                    out
                }
                scalar => vec![FilterCondition::Equality(scalar.clone())],
            };
            fields.push((field.clone(), conds));
        }
        Ok(Filter { fields })
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Evaluates every field's conditions against `metadata`, AND-ing all of
    /// them. Deterministic and total: never panics, never returns different
    /// answers for the same inputs.
    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.fields.iter().all(|(field, conds)| {
            let value = metadata.get(field);
            conds.iter().all(|c| eval_condition(c, value))
        })
    }
}

fn eval_condition(condition: &FilterCondition, value: Option<&Value>) -> bool {
    match condition {
        FilterCondition::Equality(expected) => match value {
            Some(v) => v == expected,
            None => expected.is_null(),
        },
        FilterCondition::Op(op, operand) => eval_op(*op, operand, value),
    }
}

fn eval_op(op: OpCode, operand: &Value, value: Option<&Value>) -> bool {
    match op {
        OpCode::Eq => match value {
            Some(v) => v == operand,
            None => operand.is_null(),
        },
        OpCode::Ne => match value {
            Some(v) => v != operand,
            None => true,
        },
        OpCode::Lt => cmp_total(value, operand).map_or(false, |o| o == Ordering::Less),
        OpCode::Le => cmp_total(value, operand).map_or(false, |o| o != Ordering::Greater),
        OpCode::Gt => cmp_total(value, operand).map_or(false, |o| o == Ordering::Greater),
        OpCode::Ge => cmp_total(value, operand).map_or(false, |o| o != Ordering::Less),
        OpCode::In => match (value, operand.as_array()) {
            (Some(v), Some(list)) => list.contains(v),
            _ => false,
        },
        OpCode::NotIn => match (value, operand.as_array()) {
            (Some(v), Some(list)) => !list.contains(v),
            (None, _) => true,
            _ => false,
        },
        OpCode::Contains => match value {
            Some(Value::String(s)) => operand.as_str().map_or(false, |needle| s.contains(needle)),
            Some(Value::Array(list)) => list.contains(operand),
            _ => false,
        },
        OpCode::StartsWith => match (value.and_then(Value::as_str), operand.as_str()) {
            (Some(s), Some(prefix)) => s.starts_with(prefix),
            _ => false,
        },
        OpCode::EndsWith => match (value.and_then(Value::as_str), operand.as_str()) {
            (Some(s), Some(suffix)) => s.ends_with(suffix),
            _ => false,
        },
        OpCode::IsTrue => matches!(value, Some(Value::Bool(true))),
        OpCode::IsFalse => matches!(value, Some(Value::Bool(false))),
    }
}

/// Total order comparison for `<`, `<=`, `>`, `>=`. Numbers compare as f64;
/// strings compare lexicographically. Mismatched or missing operands fail
/// (the caller treats `None` as "predicate fails").
fn cmp_total(value: Option<&Value>, operand: &Value) -> Option<Ordering> {
    let value = value?;
    match (value, operand) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(pairs: &[(&str, Value)]) -> Metadata {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn scalar_equality_shortcut() {
        let raw: HashMap<String, Value> = [("category".to_string(), json!("manual"))]
            .into_iter()
            .collect();
        let filter = Filter::parse(&raw).unwrap();
        assert!(filter.matches(&meta(&[("category", json!("manual"))])));
        assert!(!filter.matches(&meta(&[("category", json!("guide"))])));
    }

    #[test]
    fn unknown_operator_is_rejected_at_parse_time() {
        let raw: HashMap<String, Value> = [("category".to_string(), json!({"~=": "x"}))]
            .into_iter()
            .collect();
        let err = Filter::parse(&raw).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::ValidationError);
    }

    #[test]
    fn null_field_semantics_per_operator() {
        let raw: HashMap<String, Value> = [("age".to_string(), json!({"!=": 5}))]
            .into_iter()
            .collect();
        let filter = Filter::parse(&raw).unwrap();
        assert!(filter.matches(&meta(&[])));

        let raw: HashMap<String, Value> = [("age".to_string(), json!({">": 5}))]
            .into_iter()
            .collect();
        let filter = Filter::parse(&raw).unwrap();
        assert!(!filter.matches(&meta(&[])));
    }

    #[test]
    fn multiple_ops_and_together() {
        let raw: HashMap<String, Value> = [(
            "score".to_string(),
            json!({">=": 1, "<": 10}),
        )]
        .into_iter()
        .collect();
        let filter = Filter::parse(&raw).unwrap();
        assert!(filter.matches(&meta(&[("score", json!(5))])));
        assert!(!filter.matches(&meta(&[("score", json!(10))])));
    }

    #[test]
    fn contains_on_string_and_list() {
        let raw: HashMap<String, Value> = [("tags".to_string(), json!({"contains": "x"}))]
            .into_iter()
            .collect();
        let filter = Filter::parse(&raw).unwrap();
        assert!(filter.matches(&meta(&[("tags", json!(["x", "y"]))])));
        assert!(!filter.matches(&meta(&[("tags", json!(["y"]))])));

        let raw: HashMap<String, Value> = [("title".to_string(), json!({"contains": "lo wo"}))]
            .into_iter()
            .collect();
        let filter = Filter::parse(&raw).unwrap();
        assert!(filter.matches(&meta(&[("title", json!("hello world"))])));
    }

    #[test]
    fn is_true_is_strict_boolean_identity() {
        let raw: HashMap<String, Value> = [("flag".to_string(), json!({"is_true": null}))]
            .into_iter()
            .collect();
        let filter = Filter::parse(&raw).unwrap();
        assert!(filter.matches(&meta(&[("flag", json!(true))])));
        assert!(!filter.matches(&meta(&[("flag", json!(1))])));
        assert!(!filter.matches(&meta(&[])));
    }
}
