//! Numeric predicates: exact values and an inclusive `[min, max]` range.

use sea_query::{Condition, Value};
use serde_json::Value as Json;

use crate::ast::{FilterSpec, JoinMode};
use crate::clause::ClauseScope;
use crate::schema::ValueType;
use crate::sql_compiler::ColumnRef;

#[derive(Debug, Clone, PartialEq)]
pub struct NumberFilter {
    values: Vec<Value>,
    min: Option<Value>,
    max: Option<Value>,
}

impl NumberFilter {
    pub fn from_spec(spec: &FilterSpec, value_type: ValueType) -> Self {
        let parse = |json: &Json| parse_number(json, value_type);
        Self {
            values: spec.values.iter().filter_map(parse).collect(),
            min: spec.min.as_ref().and_then(parse),
            max: spec.max.as_ref().and_then(parse),
        }
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn is_valid(&self) -> bool {
        !self.values.is_empty() || self.min.is_some() || self.max.is_some()
    }

    pub fn emit(&self, column: &ColumnRef, negate: bool) -> Option<Condition> {
        let mut scope = ClauseScope::new(JoinMode::And).negated(negate);

        match self.values.as_slice() {
            [] => {}
            [single] => scope = scope.append(column.expr().eq(single.clone())),
            many => scope = scope.append(column.expr().is_in(many.iter().cloned())),
        }
        if let Some(min) = &self.min {
            scope = scope.append(column.expr().gte(min.clone()));
        }
        if let Some(max) = &self.max {
            scope = scope.append(column.expr().lte(max.clone()));
        }

        scope.finish()
    }
}

/// Parses a JSON number or numeric string into the bound type of the
/// attribute. Values that do not fit the type are not literals.
fn parse_number(json: &Json, value_type: ValueType) -> Option<Value> {
    let number = match json {
        Json::Number(n) => n.as_f64()?,
        Json::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !number.is_finite() {
        return None;
    }

    match value_type {
        ValueType::Float | ValueType::Double => Some(Value::Double(Some(number))),
        _ => {
            let exact = match json {
                Json::Number(n) => n.as_i64(),
                Json::String(s) => s.trim().parse::<i64>().ok(),
                _ => None,
            };
            if let Some(integer) = exact {
                return Some(Value::BigInt(Some(integer)));
            }
            // 2^63 is the first float past i64::MAX.
            const LIMIT: f64 = 9_223_372_036_854_775_808.0;
            if number.fract() != 0.0 || number < -LIMIT || number >= LIMIT {
                return None;
            }
            Some(Value::BigInt(Some(number as i64)))
        }
    }
}
