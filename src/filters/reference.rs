//! Back-references from a nested query to the record of an enclosing one.

use sea_query::Condition;

use crate::sql_compiler::ColumnRef;

#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceFilter {
    parent_level: usize,
    /// Record column of the referenced ancestor, known once bound.
    pointer: Option<ColumnRef>,
}

impl ReferenceFilter {
    pub fn new(parent_level: usize) -> Self {
        Self {
            parent_level,
            pointer: None,
        }
    }

    pub fn parent_level(&self) -> usize {
        self.parent_level
    }

    pub fn point_at(&mut self, column: ColumnRef) {
        self.pointer = Some(column);
    }

    pub fn pointer(&self) -> Option<&ColumnRef> {
        self.pointer.as_ref()
    }

    pub fn emit(&self, column: &ColumnRef, negate: bool) -> Option<Condition> {
        let pointer = self.pointer.as_ref()?;
        let expr = if negate {
            column.expr().ne(pointer.expr())
        } else {
            column.expr().eq(pointer.expr())
        };
        Some(Condition::all().add(expr))
    }
}
