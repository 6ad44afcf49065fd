//! Single and multi-select list predicates.
//!
//! Multi-select values live either in a child table with one row per item
//! (relational storage) or in one `|`-delimited string (flat storage).

use sea_query::{Condition, Expr, LikeExpr, Query, SimpleExpr};
use tracing::debug;

use crate::ast::{FilterSpec, JoinMode};
use crate::clause::ClauseScope;
use crate::config::StorageLayout;
use crate::sql_compiler::{Column, ColumnRef, Ident};

use super::{combine, escape_like, literal_text, LIKE_ESCAPE};

const FLAT_SEPARATOR: char = '|';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListStorage {
    /// One item row per selected value.
    Relational,
    /// All selected values in one delimited string.
    Flat,
    /// Exactly one selected value.
    Single,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListFilter {
    values: Vec<String>,
    storage: ListStorage,
    join: JoinMode,
    /// Attribute name the item rows are keyed by.
    attribute: String,
    items_alias: Option<String>,
}

impl ListFilter {
    pub fn from_spec(spec: &FilterSpec, storage: ListStorage, attribute: impl Into<String>) -> Self {
        Self {
            values: spec.values.iter().filter_map(literal_text).collect(),
            storage,
            join: spec.join_mode.unwrap_or_default(),
            attribute: attribute.into(),
            items_alias: None,
        }
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn storage(&self) -> ListStorage {
        self.storage
    }

    pub fn join(&self) -> JoinMode {
        self.join
    }

    pub fn items_alias(&self) -> Option<&str> {
        self.items_alias.as_deref()
    }

    pub fn set_items_alias(&mut self, alias: String) {
        self.items_alias = Some(alias);
    }

    pub fn is_valid(&self) -> bool {
        !self.values.is_empty()
    }

    /// For relational storage `column` is the id of the owning object row;
    /// otherwise it is the stored value itself.
    pub fn emit(&self, column: &ColumnRef, negate: bool, layout: &StorageLayout) -> Option<Condition> {
        if self.values.is_empty() {
            return None;
        }
        match self.storage {
            ListStorage::Relational => self.emit_relational(column, negate, layout),
            ListStorage::Flat => self.emit_flat(column, negate),
            ListStorage::Single => {
                let operator = if negate { JoinMode::And } else { JoinMode::Or };
                combine(
                    self.values.iter().map(|value| {
                        if negate {
                            column.expr().ne(value.as_str())
                        } else {
                            column.expr().eq(value.as_str())
                        }
                    }),
                    operator,
                )
            }
        }
    }

    fn emit_relational(
        &self,
        object: &ColumnRef,
        negate: bool,
        layout: &StorageLayout,
    ) -> Option<Condition> {
        let alias = self.items_alias.as_deref()?;
        let items = self.values.iter().map(|value| {
            let mut select = Query::select();
            select
                .column((Ident::new(alias), Ident::new(Column::Value.as_str())))
                .from_as(Ident::new(&layout.list_items), Ident::new(alias))
                .and_where(
                    Expr::col((Ident::new(alias), Ident::new(Column::Id.as_str()))).eq(object.expr()),
                )
                .and_where(
                    Expr::col((Ident::new(alias), Ident::new(Column::Name.as_str())))
                        .eq(self.attribute.as_str()),
                );
            Expr::val(value.as_str()).in_subquery(select)
        });

        items
            .fold(ClauseScope::new(self.join).negated(negate), |scope, item| {
                scope.append(item)
            })
            .finish()
    }

    fn emit_flat(&self, column: &ColumnRef, negate: bool) -> Option<Condition> {
        let (first, ignored) = self.values.split_first()?;
        if !ignored.is_empty() {
            debug!(
                attribute = %self.attribute,
                ignored = ?ignored,
                "flat multi-select storage matches only the first value"
            );
        }

        let escaped = escape_like(first);
        let like = |pattern: String| -> SimpleExpr {
            column.expr().like(LikeExpr::new(pattern).escape(LIKE_ESCAPE))
        };
        ClauseScope::new(JoinMode::Or)
            .negated(negate)
            .append(column.expr().eq(first.as_str()))
            .append(like(format!("{}{}%", escaped, FLAT_SEPARATOR)))
            .append(like(format!("%{}{}", FLAT_SEPARATOR, escaped)))
            .append(like(format!("%{}{}{}%", FLAT_SEPARATOR, escaped, FLAT_SEPARATOR)))
            .finish()
    }
}
