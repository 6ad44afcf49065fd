//! String and text predicates.

use sea_query::{Condition, Expr, Func, LikeExpr, SimpleExpr};

use crate::ast::{JoinMode, MatchMode};
use crate::sql_compiler::ColumnRef;

use super::{combine, escape_like, LIKE_ESCAPE};

#[derive(Debug, Clone, PartialEq)]
pub struct StringFilter {
    values: Vec<String>,
    mode: MatchMode,
    /// Long text, users and groups always match by substring.
    force_substring: bool,
    /// For record-level user columns: values with this prefix are complete
    /// user references and match exactly.
    user_prefix: Option<String>,
}

impl StringFilter {
    pub fn new(
        values: Vec<String>,
        mode: MatchMode,
        force_substring: bool,
        user_prefix: Option<String>,
    ) -> Self {
        Self {
            values,
            mode,
            force_substring,
            user_prefix,
        }
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn mode(&self) -> MatchMode {
        if self.force_substring {
            MatchMode::Substring
        } else {
            self.mode
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.values.is_empty()
    }

    pub fn emit(&self, column: &ColumnRef, negate: bool) -> Option<Condition> {
        if self.values.is_empty() {
            return None;
        }

        // A negated alternative of matches is a conjunction of non-matches.
        let operator = if negate { JoinMode::And } else { JoinMode::Or };

        if let Some(prefix) = &self.user_prefix {
            let exprs = self.values.iter().map(|value| {
                let mode = if value.starts_with(prefix.as_str()) {
                    MatchMode::Exact
                } else {
                    MatchMode::Substring
                };
                match_one(column, value, mode, negate)
            });
            return combine(exprs, operator);
        }

        if self.values.len() > 1 && !self.force_substring {
            return Some(Condition::all().add(self.match_set(column, negate)));
        }

        let mode = self.mode();
        combine(
            self.values
                .iter()
                .map(|value| match_one(column, value, mode, negate)),
            operator,
        )
    }

    /// `IN (...)` over all values.
    fn match_set(&self, column: &ColumnRef, negate: bool) -> SimpleExpr {
        let (subject, values): (Expr, Vec<String>) = match self.mode {
            MatchMode::CaseInsensitive => (
                Expr::expr(Func::lower(column.expr())),
                self.values.iter().map(|v| v.to_lowercase()).collect(),
            ),
            MatchMode::Exact | MatchMode::Substring => (column.expr(), self.values.clone()),
        };
        if negate {
            subject.is_not_in(values)
        } else {
            subject.is_in(values)
        }
    }
}

fn match_one(column: &ColumnRef, value: &str, mode: MatchMode, negate: bool) -> SimpleExpr {
    match mode {
        MatchMode::Exact => {
            if negate {
                column.expr().ne(value)
            } else {
                column.expr().eq(value)
            }
        }
        MatchMode::CaseInsensitive => {
            let subject = Expr::expr(Func::lower(column.expr()));
            if negate {
                subject.ne(value.to_lowercase())
            } else {
                subject.eq(value.to_lowercase())
            }
        }
        MatchMode::Substring => {
            let pattern = LikeExpr::new(format!("%{}%", escape_like(value))).escape(LIKE_ESCAPE);
            if negate {
                column.expr().not_like(pattern)
            } else {
                column.expr().like(pattern)
            }
        }
    }
}
