//! Boolean predicates, stored as integer `0`/`1`.

use sea_query::{Condition, Value};
use serde_json::Value as Json;

use crate::ast::FilterSpec;
use crate::sql_compiler::ColumnRef;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BooleanFilter {
    values: Vec<i64>,
}

impl BooleanFilter {
    pub fn from_spec(spec: &FilterSpec) -> Self {
        let mut values = Vec::new();
        for flag in spec.values.iter().filter_map(parse_flag) {
            if !values.contains(&flag) {
                values.push(flag);
            }
        }
        Self { values }
    }

    pub fn values(&self) -> &[i64] {
        &self.values
    }

    pub fn is_valid(&self) -> bool {
        !self.values.is_empty()
    }

    pub fn emit(&self, column: &ColumnRef, negate: bool) -> Option<Condition> {
        let expr = match (self.values.as_slice(), negate) {
            ([], _) => return None,
            ([flag], false) => column.expr().eq(*flag),
            ([flag], true) => column.expr().ne(*flag),
            (flags, false) => column.expr().is_in(flags.iter().map(|f| Value::BigInt(Some(*f)))),
            (flags, true) => column.expr().is_not_in(flags.iter().map(|f| Value::BigInt(Some(*f)))),
        };
        Some(Condition::all().add(expr))
    }
}

fn parse_flag(json: &Json) -> Option<i64> {
    match json {
        Json::Bool(b) => Some(i64::from(*b)),
        Json::Number(n) => match n.as_i64()? {
            0 => Some(0),
            1 => Some(1),
            _ => None,
        },
        Json::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(1),
            "0" | "false" | "no" | "off" => Some(0),
            _ => None,
        },
        _ => None,
    }
}
