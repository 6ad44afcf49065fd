//! Query nodes: one `SELECT` over records per `document` node of the search.
//!
//! Nodes live in an arena ([`QueryTree`]) and refer to their parent by index,
//! so walking "N levels up" is a bounded loop with an explicit error. Each
//! node owns the aliases its predicates need. Aliases are derived from the
//! node's level path plus a per-node counter, which keeps them unique across
//! the whole tree.

use chrono::NaiveDate;
use sea_query::{Condition, Expr, JoinType, LikeExpr, Order, Query, SelectStatement};
use tracing::{debug, warn};

use crate::ast::{FilterSpec, JoinMode, NodeKind};
use crate::clause::ClauseScope;
use crate::config::CompilerConfig;
use crate::error::CompileError;
use crate::filters::{escape_like, LIKE_ESCAPE};
use crate::group::ExpressionGroup;
use crate::identifier::{AttributeName, EntityKind};
use crate::schema::SchemaLookup;
use crate::sql_compiler::{Column, ColumnRef, Ident};

/// Index of a node in its [`QueryTree`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// What an alias stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingKey {
    /// The object row of one entity kind attached to the record.
    Entity(EntityKind),
    /// One typed property of such an object.
    Attribute(EntityKind, AttributeName),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasBinding {
    pub key: BindingKey,
    pub alias: String,
    pub table: String,
    /// Alias this binding is joined to.
    pub joined_to: String,
    /// Emitted as `LEFT JOIN` when set.
    pub optional: bool,
}

/// Inputs shared by every step of building a tree.
pub(crate) struct BuildContext<'a> {
    pub schema: &'a dyn SchemaLookup,
    pub config: &'a CompilerConfig,
    pub today: NaiveDate,
}

#[derive(Debug, Clone)]
pub struct QueryNode {
    parent: Option<NodeId>,
    path: Vec<usize>,
    tag: String,
    entity_kind: EntityKind,
    doc_alias: String,
    negate: bool,
    group: ExpressionGroup,
    bindings: Vec<AliasBinding>,
    children: Vec<NodeId>,
    alias_counter: usize,
    child_counter: usize,
}

impl QueryNode {
    fn new(parent: Option<NodeId>, path: Vec<usize>, entity_kind: EntityKind, negate: bool) -> Self {
        let tag = path
            .iter()
            .map(|segment| segment.to_string())
            .collect::<Vec<_>>()
            .join("_");
        Self {
            parent,
            doc_alias: format!("doc{}", tag),
            tag,
            path,
            entity_kind,
            negate,
            group: ExpressionGroup::default(),
            bindings: Vec::new(),
            children: Vec::new(),
            alias_counter: 0,
            child_counter: 0,
        }
    }

    /// Alias of the record table in this node.
    pub fn doc_alias(&self) -> &str {
        &self.doc_alias
    }

    /// Identity of the record matched by this node.
    pub fn record_column(&self) -> ColumnRef {
        ColumnRef::new(self.doc_alias.clone(), Column::FullName.as_str())
    }

    /// Nesting depth; the root is level 0.
    pub fn level(&self) -> usize {
        self.path.len() - 1
    }

    pub fn path(&self) -> &[usize] {
        &self.path
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn entity_kind(&self) -> &EntityKind {
        &self.entity_kind
    }

    pub fn is_negated(&self) -> bool {
        self.negate
    }

    pub fn group(&self) -> &ExpressionGroup {
        &self.group
    }

    pub fn bindings(&self) -> &[AliasBinding] {
        &self.bindings
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// A node is worth compiling when something in it narrows the search.
    pub fn validates_query(&self) -> bool {
        self.group.validates_query()
    }

    fn next_alias(&mut self, prefix: &str) -> String {
        self.alias_counter += 1;
        format!("{}{}_{}", prefix, self.tag, self.alias_counter)
    }
}

/// Arena of the query nodes of one search. Index 0 is the root.
#[derive(Debug, Clone)]
pub struct QueryTree {
    nodes: Vec<QueryNode>,
}

impl QueryTree {
    /// Builds the tree for a search. Child nodes that end up with nothing to
    /// match are dropped; the root is always kept.
    pub(crate) fn build(ctx: &BuildContext<'_>, spec: &FilterSpec) -> Result<Self, CompileError> {
        let mut tree = Self { nodes: Vec::new() };
        tree.build_node(ctx, None, spec)?;
        Ok(tree)
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn node(&self, id: NodeId) -> &QueryNode {
        &self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn is_root(&self, id: NodeId) -> bool {
        self.nodes[id.0].parent.is_none()
    }

    /// Every alias used anywhere in the tree, record aliases included.
    pub fn aliases(&self) -> Vec<&str> {
        self.nodes
            .iter()
            .flat_map(|node| {
                std::iter::once(node.doc_alias.as_str())
                    .chain(node.bindings.iter().map(|binding| binding.alias.as_str()))
            })
            .collect()
    }

    fn build_node(
        &mut self,
        ctx: &BuildContext<'_>,
        parent: Option<NodeId>,
        spec: &FilterSpec,
    ) -> Result<NodeId, CompileError> {
        if let Some(raw) = spec.kind.as_deref() {
            if NodeKind::parse(raw) != Some(NodeKind::Document) {
                warn!(node_type = raw, "query node is not a document");
                return Err(CompileError::UnsupportedType(raw.to_string()));
            }
        }
        let class = spec
            .class
            .as_deref()
            .ok_or_else(|| CompileError::malformed("class", "query node has no class"))?;
        let entity_kind = EntityKind::parse(class, &ctx.config.default_namespace)?;

        let path = match parent {
            None => vec![0],
            Some(parent) => {
                let parent = &mut self.nodes[parent.0];
                parent.child_counter += 1;
                let mut path = parent.path.clone();
                path.push(parent.child_counter);
                path
            }
        };

        let id = NodeId(self.nodes.len());
        self.nodes.push(QueryNode::new(parent, path, entity_kind, spec.negate));

        // The top level of a node is never negated itself; `negate` on a
        // document node turns its EXISTS into NOT EXISTS.
        let group = ExpressionGroup::build(ctx, self, id, spec, false)?;
        self.nodes[id.0].group = group;
        Ok(id)
    }

    /// Builds a nested query node under `parent`. Returns `None`, leaving the
    /// arena as it was, when the node does not validate.
    pub(crate) fn build_child(
        &mut self,
        ctx: &BuildContext<'_>,
        parent: NodeId,
        spec: &FilterSpec,
    ) -> Result<Option<NodeId>, CompileError> {
        let mark = self.nodes.len();
        let id = self.build_node(ctx, Some(parent), spec)?;

        if !self.nodes[id.0].validates_query() {
            debug!(
                class = %self.nodes[id.0].entity_kind,
                path = ?self.nodes[id.0].path,
                "dropping nested query without search terms"
            );
            self.nodes.truncate(mark);
            return Ok(None);
        }
        self.nodes[parent.0].children.push(id);
        Ok(Some(id))
    }

    /// The node `levels` steps above `node`; 0 is the node itself.
    pub fn ancestor(&self, node: NodeId, levels: usize) -> Result<NodeId, CompileError> {
        let mut current = node;
        for _ in 0..levels {
            current = self.nodes[current.0]
                .parent
                .ok_or(CompileError::LevelOutOfRange {
                    requested: levels,
                    depth: self.nodes[node.0].level(),
                })?;
        }
        Ok(current)
    }

    /// Alias of the object of `kind` attached to the record of `node`.
    /// Repeated calls return the same alias; a required request upgrades an
    /// optional binding.
    pub fn bind_entity(
        &mut self,
        node: NodeId,
        kind: &EntityKind,
        optional: bool,
        config: &CompilerConfig,
    ) -> String {
        let key = BindingKey::Entity(kind.clone());
        let node = &mut self.nodes[node.0];
        if let Some(binding) = node.bindings.iter_mut().find(|binding| binding.key == key) {
            binding.optional &= optional;
            return binding.alias.clone();
        }

        let alias = node.next_alias("obj");
        node.bindings.push(AliasBinding {
            key,
            alias: alias.clone(),
            table: config.layout.objects.clone(),
            joined_to: node.doc_alias.clone(),
            optional,
        });
        alias
    }

    /// Alias of the property row holding `attribute` of `kind`, stored in
    /// `table`. Binds the owning object first.
    pub fn bind_attribute(
        &mut self,
        node: NodeId,
        kind: &EntityKind,
        attribute: &AttributeName,
        table: &str,
        optional: bool,
        config: &CompilerConfig,
    ) -> String {
        let object = self.bind_entity(node, kind, optional, config);

        let key = BindingKey::Attribute(kind.clone(), attribute.clone());
        let node = &mut self.nodes[node.0];
        if let Some(binding) = node.bindings.iter_mut().find(|binding| binding.key == key) {
            binding.optional &= optional;
            return binding.alias.clone();
        }

        let alias = node.next_alias("prop");
        node.bindings.push(AliasBinding {
            key,
            alias: alias.clone(),
            table: table.to_string(),
            joined_to: object,
            optional,
        });
        alias
    }

    /// A fresh alias for a table scanned inside a subquery of `node`.
    pub fn allocate_alias(&mut self, node: NodeId, prefix: &str) -> String {
        self.nodes[node.0].next_alias(prefix)
    }

    /// Registers every binding, top-down. Parents come before their children
    /// in the arena, so a child may add joins to an ancestor before the
    /// ancestor is compiled.
    pub(crate) fn register(&mut self, config: &CompilerConfig) -> Result<(), CompileError> {
        for index in 0..self.nodes.len() {
            let id = NodeId(index);
            let kind = self.nodes[index].entity_kind.clone();
            self.bind_entity(id, &kind, false, config);

            let mut group = std::mem::take(&mut self.nodes[index].group);
            let registered = group.register_bindings(self, id, false, config);
            self.nodes[index].group = group;
            registered?;
        }
        Ok(())
    }

    /// The `SELECT` of one node, nested queries included as `EXISTS`.
    pub fn compile_select(&self, id: NodeId, config: &CompilerConfig) -> SelectStatement {
        let node = &self.nodes[id.0];
        let mut select = Query::select();
        select
            .column((Ident::new(&node.doc_alias), Ident::new(Column::FullName.as_str())))
            .from_as(Ident::new(&config.layout.documents), Ident::new(&node.doc_alias));

        for binding in &node.bindings {
            let join = if binding.optional {
                JoinType::LeftJoin
            } else {
                JoinType::InnerJoin
            };
            select.join_as(
                join,
                Ident::new(&binding.table),
                Ident::new(&binding.alias),
                join_condition(binding),
            );
        }

        let scope = node.group.emit_into(ClauseScope::new(JoinMode::And), self, config);
        let template = LikeExpr::new(format!("%{}", escape_like(&config.template_suffix)))
            .escape(LIKE_ESCAPE);
        let scope = scope.append(node.record_column().expr().not_like(template));
        if let Some(condition) = scope.finish() {
            select.cond_where(condition);
        }
        select
    }

    /// Sort keys of the root query, in the order they were written.
    pub fn order_keys(&self) -> Vec<(ColumnRef, Order)> {
        let mut keys = Vec::new();
        self.nodes[0].group.collect_order_keys(&mut keys);
        keys
    }
}

fn join_condition(binding: &AliasBinding) -> Condition {
    let column = |alias: &str, name: Column| Expr::col((Ident::new(alias), Ident::new(name.as_str())));
    match &binding.key {
        BindingKey::Entity(kind) => Condition::all()
            .add(
                column(&binding.alias, Column::DocName)
                    .equals((Ident::new(&binding.joined_to), Ident::new(Column::FullName.as_str()))),
            )
            .add(column(&binding.alias, Column::ClassName).eq(kind.qualified())),
        BindingKey::Attribute(_, attribute) => Condition::all()
            .add(
                column(&binding.alias, Column::Id)
                    .equals((Ident::new(&binding.joined_to), Ident::new(Column::Id.as_str()))),
            )
            .add(column(&binding.alias, Column::Name).eq(attribute.name())),
    }
}
