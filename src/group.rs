//! Parenthesized AND/OR combinations of predicates, subgroups and nested
//! queries.

use sea_query::{Expr, Order};
use tracing::debug;

use crate::ast::{FilterSpec, JoinMode};
use crate::clause::ClauseScope;
use crate::config::CompilerConfig;
use crate::error::CompileError;
use crate::filters::{FilterFactory, Predicate};
use crate::node::{BuildContext, NodeId, QueryTree};
use crate::sql_compiler::ColumnRef;

#[derive(Debug, Clone, PartialEq)]
pub enum Member {
    Predicate(Predicate),
    Group(ExpressionGroup),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpressionGroup {
    join_mode: JoinMode,
    negate: bool,
    owner: NodeId,
    members: Vec<Member>,
    child_queries: Vec<NodeId>,
}

impl ExpressionGroup {
    pub fn new(owner: NodeId, join_mode: JoinMode, negate: bool) -> Self {
        Self {
            join_mode,
            negate,
            owner,
            members: Vec::new(),
            child_queries: Vec::new(),
        }
    }

    /// Builds the group described by the `filters` and `queries` of `spec`.
    /// Absent predicates, empty subgroups and nested queries without search
    /// terms are left out.
    pub(crate) fn build(
        ctx: &BuildContext<'_>,
        tree: &mut QueryTree,
        owner: NodeId,
        spec: &FilterSpec,
        negate: bool,
    ) -> Result<Self, CompileError> {
        let mut group = Self::new(owner, spec.join_mode.unwrap_or_default(), negate);

        for filter in &spec.filters {
            if filter.is_query() {
                group.add_child_query(tree.build_child(ctx, owner, filter)?);
            } else if filter.is_group() {
                let subgroup = Self::build(ctx, tree, owner, filter, filter.negate)?;
                if subgroup.validates_query() {
                    group.members.push(Member::Group(subgroup));
                } else {
                    debug!("dropping group without search terms");
                }
            } else if let Some(predicate) =
                FilterFactory::create(filter, ctx.schema, ctx.config, ctx.today)?
            {
                if predicate.is_order() && !tree.is_root(owner) {
                    debug!(attribute = %predicate.attribute(), "ignoring sort order in nested query");
                    continue;
                }
                group.members.push(Member::Predicate(predicate));
            }
        }

        for query in &spec.queries {
            group.add_child_query(tree.build_child(ctx, owner, query)?);
        }

        Ok(group)
    }

    fn add_child_query(&mut self, child: Option<NodeId>) {
        if let Some(child) = child {
            self.child_queries.push(child);
        }
    }

    pub fn join_mode(&self) -> JoinMode {
        self.join_mode
    }

    pub fn is_negated(&self) -> bool {
        self.negate
    }

    pub fn owner(&self) -> NodeId {
        self.owner
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn child_queries(&self) -> &[NodeId] {
        &self.child_queries
    }

    /// True when at least one member is a real search term. Back-references
    /// and sort orders alone never are.
    pub fn validates_query(&self) -> bool {
        !self.child_queries.is_empty()
            || self.members.iter().any(|member| match member {
                Member::Predicate(predicate) => predicate.validates_query(),
                Member::Group(group) => group.validates_query(),
            })
    }

    /// Registers the bindings of every member. Members of an OR group, or of
    /// a negated one, must not make their joins mandatory for the record.
    pub fn register_bindings(
        &mut self,
        tree: &mut QueryTree,
        node: NodeId,
        optional: bool,
        config: &CompilerConfig,
    ) -> Result<(), CompileError> {
        let optional = optional || self.negate || self.join_mode == JoinMode::Or;
        for member in &mut self.members {
            match member {
                Member::Predicate(predicate) => {
                    predicate.register_bindings(tree, node, optional, config)?
                }
                Member::Group(group) => group.register_bindings(tree, node, optional, config)?,
            }
        }
        Ok(())
    }

    /// Emits this group as one parenthesized clause of `parent`.
    pub fn emit_into(&self, parent: ClauseScope, tree: &QueryTree, config: &CompilerConfig) -> ClauseScope {
        let mut scope = parent.open(self.join_mode).negated(self.negate);

        for member in &self.members {
            scope = match member {
                Member::Predicate(predicate) => {
                    scope.append_opt(predicate.emit_value_conditions(config))
                }
                Member::Group(group) => group.emit_into(scope, tree, config),
            };
        }

        for &child in &self.child_queries {
            let exists = Expr::exists(tree.compile_select(child, config));
            scope = scope.append(if tree.node(child).is_negated() {
                exists.not()
            } else {
                exists
            });
        }

        parent.close(scope)
    }

    pub(crate) fn collect_order_keys(&self, keys: &mut Vec<(ColumnRef, Order)>) {
        for member in &self.members {
            match member {
                Member::Predicate(predicate) => keys.extend(predicate.order_by()),
                Member::Group(group) => group.collect_order_keys(keys),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use sea_query::{MysqlQueryBuilder, Query};
    use serde_json::json;

    use crate::schema::{StaticSchema, ValueType};
    use crate::sql_compiler::Ident;

    fn schema() -> StaticSchema {
        StaticSchema::new()
            .with_attribute("Lib.Record", "status", ValueType::String)
            .with_attribute("Lib.Record", "title", ValueType::String)
            .with_attribute("Lib.Record", "pages", ValueType::Integer)
    }

    fn compile_root(value: serde_json::Value) -> (QueryTree, String) {
        let schema = schema();
        let config = CompilerConfig::default();
        let ctx = BuildContext {
            schema: &schema,
            config: &config,
            today: NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
        };
        let spec: FilterSpec = serde_json::from_value(value).unwrap();
        let mut tree = QueryTree::build(&ctx, &spec).unwrap();
        tree.register(&config).unwrap();

        let scope = tree
            .node(tree.root())
            .group()
            .emit_into(ClauseScope::new(JoinMode::And), &tree, &config);
        let sql = match scope.finish() {
            Some(condition) => Query::select()
                .column(Ident::new("x"))
                .from(Ident::new("t"))
                .cond_where(condition)
                .to_string(MysqlQueryBuilder),
            None => String::new(),
        };
        (tree, sql)
    }

    fn record(filters: serde_json::Value) -> serde_json::Value {
        json!({"type": "document", "class": "Lib.Record", "filters": filters})
    }

    #[test]
    fn test_or_group_parenthesizes_members() {
        let (_, sql) = compile_root(record(json!([{
            "type": "expression",
            "join_mode": "or",
            "filters": [
                {"class": "Lib.Record", "property_name": "status", "values": ["open"], "match": "exact"},
                {"class": "Lib.Record", "property_name": "title", "values": ["Dune"], "match": "exact"}
            ]
        }, {
            "class": "Lib.Record", "property_name": "pages", "min": 100
        }])));

        assert!(
            sql.contains("(`prop0_2`.`value` = 'open' OR `prop0_3`.`value` = 'Dune') AND"),
            "{}",
            sql
        );
    }

    #[test]
    fn test_negated_group_emits_not() {
        let (_, sql) = compile_root(record(json!([{
            "negate": true,
            "filters": [
                {"class": "Lib.Record", "property_name": "status", "values": ["open"], "match": "exact"},
                {"class": "Lib.Record", "property_name": "pages", "min": 100}
            ]
        }])));

        assert!(sql.contains("NOT ("), "{}", sql);
        assert!(sql.contains(" AND "), "{}", sql);
    }

    #[test]
    fn test_group_of_unknown_attributes_is_dropped() {
        let (tree, sql) = compile_root(record(json!([{
            "type": "expression",
            "filters": [{"class": "Lib.Record", "property_name": "missing", "values": ["x"]}]
        }])));

        assert!(tree.node(tree.root()).group().members().is_empty());
        assert!(sql.is_empty());
    }

    #[test]
    fn test_dropped_predicate_leaves_siblings() {
        let (tree, sql) = compile_root(record(json!([
            {"class": "Lib.Record", "property_name": "missing", "values": ["x"]},
            {"class": "Lib.Record", "property_name": "status", "values": ["open"], "match": "exact"}
        ])));

        assert_eq!(tree.node(tree.root()).group().members().len(), 1);
        assert!(!sql.contains("'x'"), "{}", sql);
        assert!(sql.contains("'open'"), "{}", sql);
    }

    #[test]
    fn test_nested_negated_query_uses_not_exists() {
        let (_, sql) = compile_root(json!({
            "type": "document",
            "class": "Lib.Record",
            "queries": [{
                "type": "document",
                "class": "Lib.Record",
                "negate": true,
                "filters": [{"class": "Lib.Record", "property_name": "pages", "max": 10}]
            }]
        }));

        assert!(sql.contains("NOT EXISTS"), "{}", sql);
    }
}
