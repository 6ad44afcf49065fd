//! Scoped assembly of boolean clauses.
//!
//! A [`ClauseScope`] is the state of one parenthesized level of the WHERE
//! clause: the join operator in force, whether anything was emitted yet, and
//! whether the level is negated. Scopes are plain values. A nested level is
//! opened from its parent, filled, and merged back, so a recursive compile
//! never has to restore shared state by hand.

use sea_query::{Condition, ConditionExpression};

use crate::ast::JoinMode;

#[derive(Debug, Clone)]
pub struct ClauseScope {
    operator: JoinMode,
    negate: bool,
    condition: Condition,
}

impl ClauseScope {
    pub fn new(operator: JoinMode) -> Self {
        let condition = match operator {
            JoinMode::And => Condition::all(),
            JoinMode::Or => Condition::any(),
        };
        Self {
            operator,
            negate: false,
            condition,
        }
    }

    /// Negates the whole scope when it is closed.
    pub fn negated(mut self, negate: bool) -> Self {
        self.negate = negate;
        self
    }

    pub fn operator(&self) -> JoinMode {
        self.operator
    }

    /// Whether a clause was already emitted at this level, i.e. whether the
    /// next one needs the join operator in front of it.
    pub fn is_dirty(&self) -> bool {
        !self.condition.is_empty()
    }

    pub fn len(&self) -> usize {
        self.condition.len()
    }

    pub fn is_empty(&self) -> bool {
        !self.is_dirty()
    }

    pub fn append<C>(mut self, clause: C) -> Self
    where
        C: Into<ConditionExpression>,
    {
        self.condition = self.condition.add(clause);
        self
    }

    pub fn append_opt<C>(self, clause: Option<C>) -> Self
    where
        C: Into<ConditionExpression>,
    {
        match clause {
            Some(clause) => self.append(clause),
            None => self,
        }
    }

    /// Opens a nested level with its own operator. The parent is untouched.
    pub fn open(&self, operator: JoinMode) -> ClauseScope {
        ClauseScope::new(operator)
    }

    /// Closes `child` and appends it as one parenthesized clause. An empty
    /// child contributes nothing.
    pub fn close(self, child: ClauseScope) -> Self {
        let closed = child.finish();
        self.append_opt(closed)
    }

    /// The finished condition, or `None` when nothing was emitted.
    pub fn finish(self) -> Option<Condition> {
        if self.condition.is_empty() {
            return None;
        }
        Some(if self.negate {
            self.condition.not()
        } else {
            self.condition
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_query::{Alias, Expr, MysqlQueryBuilder, Query};

    fn render(condition: Condition) -> String {
        Query::select()
            .column(Alias::new("id"))
            .from(Alias::new("t"))
            .cond_where(condition)
            .to_string(MysqlQueryBuilder)
    }

    #[test]
    fn test_empty_scope_finishes_to_none() {
        let scope = ClauseScope::new(JoinMode::And);
        assert!(!scope.is_dirty());
        assert!(scope.finish().is_none());
    }

    #[test]
    fn test_dirty_after_append() {
        let scope = ClauseScope::new(JoinMode::And).append(Expr::col(Alias::new("a")).eq(1));
        assert!(scope.is_dirty());
        assert_eq!(scope.len(), 1);
    }

    #[test]
    fn test_nested_scope_uses_its_own_operator() {
        let root = ClauseScope::new(JoinMode::And).append(Expr::col(Alias::new("a")).eq(1));
        let child = root
            .open(JoinMode::Or)
            .append(Expr::col(Alias::new("b")).eq(2))
            .append(Expr::col(Alias::new("c")).eq(3));
        let root = root.close(child).append(Expr::col(Alias::new("d")).eq(4));

        let sql = render(root.finish().unwrap());
        assert!(sql.contains("`a` = 1 AND (`b` = 2 OR `c` = 3) AND `d` = 4"), "{}", sql);
    }

    #[test]
    fn test_closing_empty_child_is_noop() {
        let root = ClauseScope::new(JoinMode::And);
        let child = root.open(JoinMode::Or);
        let root = root.close(child);
        assert!(!root.is_dirty());
    }

    #[test]
    fn test_negated_scope() {
        let scope = ClauseScope::new(JoinMode::Or)
            .negated(true)
            .append(Expr::col(Alias::new("a")).eq(1))
            .append(Expr::col(Alias::new("b")).eq(2));

        let sql = render(scope.finish().unwrap());
        assert!(sql.contains("NOT (`a` = 1 OR `b` = 2)"), "{}", sql);
    }
}
