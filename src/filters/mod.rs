//! Typed predicates over one attribute.
//!
//! A [`Predicate`] pairs the attribute it targets with a [`Strategy`], the
//! value-type specific way of turning literals into SQL conditions. The
//! lifecycle of a predicate is:
//!
//! 1. built by [`FilterFactory`] from one JSON filter row,
//! 2. discarded when [`Predicate::is_valid`] is false,
//! 3. [`Predicate::register_bindings`] asks the owning query node for the
//!    aliases it reads from,
//! 4. [`Predicate::emit_value_conditions`] produces the condition.

mod boolean;
mod date;
mod factory;
mod list;
mod number;
mod order;
mod reference;
mod string;

pub use boolean::BooleanFilter;
pub use date::{AgeWindow, DateFilter, Period, Precision};
pub use factory::FilterFactory;
pub use list::{ListFilter, ListStorage};
pub use number::NumberFilter;
pub use order::OrderFilter;
pub use reference::ReferenceFilter;
pub use string::StringFilter;

use sea_query::{Condition, Order, SimpleExpr};

use crate::ast::JoinMode;
use crate::clause::ClauseScope;
use crate::config::CompilerConfig;
use crate::error::CompileError;
use crate::identifier::{AttributeName, EntityKind};
use crate::node::{NodeId, QueryTree};
use crate::schema::{SystemAttribute, ValueType};
use crate::sql_compiler::{Column, ColumnRef};

/// Escape character used in every emitted `LIKE`.
pub const LIKE_ESCAPE: char = '!';

/// Escapes `LIKE` wildcards so the literal matches only itself.
pub fn escape_like(literal: &str) -> String {
    let mut escaped = String::with_capacity(literal.len());
    for c in literal.chars() {
        if c == '%' || c == '_' || c == LIKE_ESCAPE {
            escaped.push(LIKE_ESCAPE);
        }
        escaped.push(c);
    }
    escaped
}

/// Joins expressions with `operator`; `None` when there are none.
pub(crate) fn combine<I>(exprs: I, operator: JoinMode) -> Option<Condition>
where
    I: IntoIterator<Item = SimpleExpr>,
{
    exprs
        .into_iter()
        .fold(ClauseScope::new(operator), |scope, expr| scope.append(expr))
        .finish()
}

/// Renders a JSON literal as the string a user typed. Blank strings and
/// non-scalar values are not literals.
pub(crate) fn literal_text(value: &serde_json::Value) -> Option<String> {
    let text = match value {
        serde_json::Value::String(s) => s.trim().to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Value-type specific predicate behaviour.
#[derive(Debug, Clone, PartialEq)]
pub enum Strategy {
    String(StringFilter),
    Number(NumberFilter),
    Date(DateFilter),
    Boolean(BooleanFilter),
    List(ListFilter),
    /// The attribute points at the record of an enclosing query.
    Reference(ReferenceFilter),
    /// Same as `Reference`, for a column of the record itself.
    SystemReference(ReferenceFilter),
    Order(OrderFilter),
}

impl Strategy {
    fn is_valid(&self) -> bool {
        match self {
            Strategy::String(filter) => filter.is_valid(),
            Strategy::Number(filter) => filter.is_valid(),
            Strategy::Date(filter) => filter.is_valid(),
            Strategy::Boolean(filter) => filter.is_valid(),
            Strategy::List(filter) => filter.is_valid(),
            Strategy::Reference(_) | Strategy::SystemReference(_) | Strategy::Order(_) => true,
        }
    }

    /// Structural kinds are always present and never count as a search term.
    fn is_structural(&self) -> bool {
        matches!(
            self,
            Strategy::Reference(_) | Strategy::SystemReference(_) | Strategy::Order(_)
        )
    }
}

/// Another attribute whose column this predicate is compared against.
#[derive(Debug, Clone, PartialEq)]
pub struct CrossReference {
    pub entity_kind: EntityKind,
    pub attribute: AttributeName,
    pub value_type: ValueType,
    /// How many query levels up the other attribute lives; 0 is the same node.
    pub parent_level: usize,
    column: Option<ColumnRef>,
}

impl CrossReference {
    pub fn new(
        entity_kind: EntityKind,
        attribute: AttributeName,
        value_type: ValueType,
        parent_level: usize,
    ) -> Self {
        Self {
            entity_kind,
            attribute,
            value_type,
            parent_level,
            column: None,
        }
    }

    pub fn column(&self) -> Option<&ColumnRef> {
        self.column.as_ref()
    }
}

/// What a predicate compares its column with.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Literal values held by the strategy.
    Literal,
    /// Columns bound by other predicates.
    Column(Vec<CrossReference>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    entity_kind: EntityKind,
    attribute: AttributeName,
    value_type: ValueType,
    negate: bool,
    operand: Operand,
    strategy: Strategy,
    target: Option<ColumnRef>,
}

impl Predicate {
    pub fn new(
        entity_kind: EntityKind,
        attribute: AttributeName,
        value_type: ValueType,
        strategy: Strategy,
    ) -> Self {
        Self {
            entity_kind,
            attribute,
            value_type,
            negate: false,
            operand: Operand::Literal,
            strategy,
            target: None,
        }
    }

    pub fn with_negate(mut self, negate: bool) -> Self {
        self.negate = negate;
        self
    }

    pub fn with_operand(mut self, operand: Operand) -> Self {
        self.operand = operand;
        self
    }

    pub fn entity_kind(&self) -> &EntityKind {
        &self.entity_kind
    }

    pub fn attribute(&self) -> &AttributeName {
        &self.attribute
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    pub fn operand(&self) -> &Operand {
        &self.operand
    }

    pub fn is_negated(&self) -> bool {
        self.negate
    }

    /// The column this predicate reads, once bindings are registered.
    pub fn target(&self) -> Option<&ColumnRef> {
        self.target.as_ref()
    }

    pub fn is_order(&self) -> bool {
        matches!(self.strategy, Strategy::Order(_))
    }

    /// A predicate is worth keeping when it has something to compare with.
    pub fn is_valid(&self) -> bool {
        match &self.operand {
            Operand::Column(refs) => !refs.is_empty() && !self.strategy.is_structural(),
            Operand::Literal => self.strategy.is_valid(),
        }
    }

    /// Whether this predicate on its own justifies running the search.
    pub fn validates_query(&self) -> bool {
        self.is_valid() && !self.strategy.is_structural()
    }

    /// Binds the aliases this predicate reads from in `node` (and, for cross
    /// references and back-references, in its ancestors). Repeated calls
    /// resolve to the same aliases.
    pub fn register_bindings(
        &mut self,
        tree: &mut QueryTree,
        node: NodeId,
        optional: bool,
        config: &CompilerConfig,
    ) -> Result<(), CompileError> {
        let optional = optional || self.is_order();

        match &mut self.strategy {
            Strategy::Reference(reference) | Strategy::SystemReference(reference) => {
                let parent = tree.ancestor(node, reference.parent_level())?;
                reference.point_at(tree.node(parent).record_column());
            }
            Strategy::List(list) if list.storage() == ListStorage::Relational => {
                if matches!(self.operand, Operand::Literal) && list.items_alias().is_none() {
                    list.set_items_alias(tree.allocate_alias(node, "li"));
                }
            }
            _ => {}
        }

        let relational_items = matches!(
            (&self.strategy, &self.operand),
            (Strategy::List(list), Operand::Literal) if list.storage() == ListStorage::Relational
        );
        self.target = Some(if relational_items {
            let object = tree.bind_entity(node, &self.entity_kind, optional, config);
            ColumnRef::new(object, Column::Id.as_str())
        } else {
            resolve_column(
                tree,
                node,
                &self.entity_kind,
                &self.attribute,
                self.value_type,
                optional,
                config,
            )
        });

        if let Operand::Column(refs) = &mut self.operand {
            for reference in refs.iter_mut() {
                let owner = tree.ancestor(node, reference.parent_level)?;
                // Joins added to an enclosing query must not narrow its rows.
                let optional = optional || owner != node;
                reference.column = Some(resolve_column(
                    tree,
                    owner,
                    &reference.entity_kind,
                    &reference.attribute,
                    reference.value_type,
                    optional,
                    config,
                ));
            }
        }

        Ok(())
    }

    /// The condition contributed by this predicate, if any.
    pub fn emit_value_conditions(&self, config: &CompilerConfig) -> Option<Condition> {
        let column = self.target.as_ref()?;

        if let Operand::Column(refs) = &self.operand {
            // Negation rewrites `=` to `<>` and must hold for every column.
            let (operator, exprs): (JoinMode, Vec<SimpleExpr>) = if self.negate {
                (
                    JoinMode::And,
                    refs.iter()
                        .filter_map(|r| r.column.as_ref())
                        .map(|other| column.expr().ne(other.expr()))
                        .collect(),
                )
            } else {
                (
                    JoinMode::Or,
                    refs.iter()
                        .filter_map(|r| r.column.as_ref())
                        .map(|other| column.expr().eq(other.expr()))
                        .collect(),
                )
            };
            return combine(exprs, operator);
        }

        match &self.strategy {
            Strategy::String(filter) => filter.emit(column, self.negate),
            Strategy::Number(filter) => filter.emit(column, self.negate),
            Strategy::Date(filter) => filter.emit(column, self.negate),
            Strategy::Boolean(filter) => filter.emit(column, self.negate),
            Strategy::List(filter) => filter.emit(column, self.negate, &config.layout),
            Strategy::Reference(filter) | Strategy::SystemReference(filter) => {
                filter.emit(column, self.negate)
            }
            Strategy::Order(_) => None,
        }
    }

    /// Sort key contributed by an order predicate.
    pub fn order_by(&self) -> Option<(ColumnRef, Order)> {
        match &self.strategy {
            Strategy::Order(order) => Some((self.target.clone()?, order.order())),
            _ => None,
        }
    }
}

/// Column holding the value of `attribute`: a record column for system
/// attributes, the `value` column of a bound property alias otherwise.
fn resolve_column(
    tree: &mut QueryTree,
    node: NodeId,
    entity_kind: &EntityKind,
    attribute: &AttributeName,
    value_type: ValueType,
    optional: bool,
    config: &CompilerConfig,
) -> ColumnRef {
    if attribute.is_system_attribute() {
        if let Some(system) = SystemAttribute::lookup(attribute.name()) {
            return ColumnRef::new(tree.node(node).doc_alias(), system.column);
        }
    }
    let table = config.layout.table_for(value_type);
    let alias = tree.bind_attribute(node, entity_kind, attribute, table, optional, config);
    ColumnRef::new(alias, Column::Value.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_off!"), "50!%!_off!!");
        assert_eq!(escape_like("plain"), "plain");
    }

    #[test]
    fn test_literal_text() {
        assert_eq!(literal_text(&json!(" open ")), Some("open".to_string()));
        assert_eq!(literal_text(&json!(42)), Some("42".to_string()));
        assert_eq!(literal_text(&json!("   ")), None);
        assert_eq!(literal_text(&json!({"a": 1})), None);
    }

    #[test]
    fn test_combine_empty_is_none() {
        assert!(combine(Vec::new(), JoinMode::Or).is_none());
    }

    fn status_predicate(strategy: Strategy) -> Predicate {
        Predicate::new(
            EntityKind::parse("Lib.Record", "XWiki").unwrap(),
            AttributeName::parse("status", false).unwrap(),
            ValueType::String,
            strategy,
        )
    }

    #[test]
    fn test_reference_never_validates_query() {
        let predicate = status_predicate(Strategy::Reference(ReferenceFilter::new(1)));
        assert!(predicate.is_valid());
        assert!(!predicate.validates_query());
    }

    #[test]
    fn test_column_operand_is_valid_without_literals() {
        let other = CrossReference::new(
            EntityKind::parse("Lib.Record", "XWiki").unwrap(),
            AttributeName::parse("owner", false).unwrap(),
            ValueType::String,
            0,
        );
        let empty = StringFilter::new(Vec::new(), Default::default(), false, None);
        let predicate = status_predicate(Strategy::String(empty.clone()));
        assert!(!predicate.is_valid());

        let predicate = status_predicate(Strategy::String(empty))
            .with_operand(Operand::Column(vec![other]));
        assert!(predicate.is_valid());
        assert!(predicate.validates_query());
    }
}
