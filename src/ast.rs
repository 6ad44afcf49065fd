//! Input model of a search: the JSON tree a client submits.
//!
//! Parsing is deliberately lenient. Every key is optional at this level; the
//! compiler decides later which missing keys are fatal and which only make a
//! filter row inert.

use serde::{Deserialize, Deserializer};
use serde_json::Value as Json;

/// One node of the search document.
///
/// Depending on `type` (and on which keys are present) a node is a query over
/// records, a typed filter on one attribute, a sort order, a back-reference to
/// an enclosing query, or a parenthesized group of any of those.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct FilterSpec {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub class: Option<String>,
    pub property_name: Option<String>,
    #[serde(deserialize_with = "lenient_bool")]
    pub subterms: bool,
    pub filters: Vec<FilterSpec>,
    pub queries: Vec<FilterSpec>,
    pub join_mode: Option<JoinMode>,
    #[serde(deserialize_with = "lenient_bool")]
    pub negate: bool,
    #[serde(deserialize_with = "one_or_many")]
    pub values: Vec<Json>,
    pub min: Option<Json>,
    pub max: Option<Json>,
    pub after: Option<String>,
    pub before: Option<String>,
    pub age: Option<String>,
    #[serde(rename = "match")]
    pub match_mode: Option<MatchMode>,
    pub ref_values: Vec<FilterSpec>,
    pub parent_level: Option<usize>,
    pub order: Option<SortDirection>,
}

/// Node kinds named by the `type` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Document,
    Object,
    Order,
    Reference,
    Expression,
}

impl NodeKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "document" => Some(NodeKind::Document),
            "object" => Some(NodeKind::Object),
            "order" => Some(NodeKind::Order),
            "reference" => Some(NodeKind::Reference),
            "expression" => Some(NodeKind::Expression),
            _ => None,
        }
    }
}

impl FilterSpec {
    /// `true` when this entry of a `filters` array is a nested logical group
    /// rather than a typed filter.
    pub fn is_group(&self) -> bool {
        match self.kind.as_deref() {
            Some(kind) => NodeKind::parse(kind) == Some(NodeKind::Expression),
            None => {
                self.property_name.is_none()
                    && (!self.filters.is_empty() || !self.queries.is_empty())
            }
        }
    }

    /// `true` when this entry describes a nested query over records.
    pub fn is_query(&self) -> bool {
        self.kind
            .as_deref()
            .and_then(NodeKind::parse)
            .is_some_and(|kind| kind == NodeKind::Document)
    }
}

/// Logical join applied between the members of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinMode {
    #[default]
    #[serde(alias = "AND")]
    And,
    #[serde(alias = "OR")]
    Or,
}

/// How string literals are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    Exact,
    #[serde(rename = "ci")]
    CaseInsensitive,
    #[default]
    #[serde(other)]
    Substring,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    #[serde(alias = "ASC")]
    Asc,
    #[serde(alias = "DESC")]
    Desc,
}

/// Accepts `"a"` as shorthand for `["a"]`; `null` is no values.
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<Json>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Json::deserialize(deserializer)? {
        Json::Null => Vec::new(),
        Json::Array(items) => items,
        single => vec![single],
    })
}

/// Accepts booleans, `"true"`/`"yes"`/`"1"` and numbers.
fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Json::deserialize(deserializer)? {
        Json::Bool(b) => b,
        Json::String(s) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "true" | "yes" | "1" | "on"
        ),
        Json::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        _ => false,
    })
}
