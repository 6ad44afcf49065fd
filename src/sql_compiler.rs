//! SQL compiler that turns a JSON search into a parameterized query using sea-query.

use chrono::{Local, NaiveDate};
use sea_query::{
    Asterisk, Expr, Func, Iden, MysqlQueryBuilder, PostgresQueryBuilder, Query, SelectStatement,
    SqliteQueryBuilder, Value,
};
use tracing::trace;

use crate::ast::FilterSpec;
use crate::config::{CompilerConfig, Dialect};
use crate::error::CompileError;
use crate::node::{BuildContext, QueryTree};
use crate::schema::{MemoizedSchema, SchemaLookup};

/// Fixed column names of the storage layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    FullName,
    Id,
    DocName,
    ClassName,
    Name,
    Value,
}

impl Column {
    pub fn as_str(&self) -> &'static str {
        match self {
            Column::FullName => "full_name",
            Column::Id => "id",
            Column::DocName => "doc_name",
            Column::ClassName => "class_name",
            Column::Name => "name",
            Column::Value => "value",
        }
    }
}

impl Iden for Column {
    fn unquoted(&self, s: &mut dyn std::fmt::Write) {
        write!(s, "{}", self.as_str()).unwrap();
    }
}

/// Table, alias or column name known only at runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident(String);

impl Ident {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl Iden for Ident {
    fn unquoted(&self, s: &mut dyn std::fmt::Write) {
        write!(s, "{}", self.0).unwrap();
    }
}

/// `alias.column`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    table: String,
    column: String,
}

impl ColumnRef {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn expr(&self) -> Expr {
        Expr::col((Ident::new(self.table.as_str()), Ident::new(self.column.as_str())))
    }
}

/// One page of results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: u64,
    pub offset: u64,
}

/// Per-request inputs that are not part of the search document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchContext {
    /// Reference date for ages.
    pub today: NaiveDate,
    pub page: Option<Page>,
}

impl SearchContext {
    pub fn new(today: NaiveDate) -> Self {
        Self { today, page: None }
    }

    pub fn with_page(mut self, limit: u64, offset: u64) -> Self {
        self.page = Some(Page { limit, offset });
        self
    }
}

impl Default for SearchContext {
    fn default() -> Self {
        Self::new(Local::now().date_naive())
    }
}

/// Query text plus the values of its placeholders, in textual order.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub sql: String,
    pub bindings: Vec<Value>,
    /// Whether any search term made it into the query. A query that does not
    /// validate matches every record and is usually not worth running.
    pub validates: bool,
}

/// SQL compiler for JSON searches.
#[derive(Debug, Clone, Default)]
pub struct SqlCompiler {
    config: CompilerConfig,
}

impl SqlCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: CompilerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Compile a search for today's date, without pagination.
    pub fn compile(
        &self,
        spec: &FilterSpec,
        schema: &dyn SchemaLookup,
    ) -> Result<CompiledQuery, CompileError> {
        self.compile_with(spec, schema, &SearchContext::default())
    }

    /// Parse and compile a search document.
    pub fn compile_json(
        &self,
        json: &str,
        schema: &dyn SchemaLookup,
    ) -> Result<CompiledQuery, CompileError> {
        let spec: FilterSpec = serde_json::from_str(json)?;
        self.compile(&spec, schema)
    }

    pub fn compile_with(
        &self,
        spec: &FilterSpec,
        schema: &dyn SchemaLookup,
        context: &SearchContext,
    ) -> Result<CompiledQuery, CompileError> {
        let tree = self.plan(spec, schema, context.today)?;
        let root = tree.root();

        let mut select = tree.compile_select(root, &self.config);
        select.distinct();
        for (column, order) in tree.order_keys() {
            select
                .column((Ident::new(column.table()), Ident::new(column.column())))
                .order_by((Ident::new(column.table()), Ident::new(column.column())), order);
        }
        if let Some(page) = context.page {
            select.limit(page.limit).offset(page.offset);
        }

        Ok(self.finish(&select, tree.node(root).validates_query()))
    }

    /// `SELECT COUNT(*)` over the distinct matches of a search.
    pub fn compile_count(
        &self,
        spec: &FilterSpec,
        schema: &dyn SchemaLookup,
        context: &SearchContext,
    ) -> Result<CompiledQuery, CompileError> {
        let tree = self.plan(spec, schema, context.today)?;
        let root = tree.root();

        let mut matches = tree.compile_select(root, &self.config);
        matches.distinct();
        let count = Query::select()
            .expr(Func::count(Expr::col(Asterisk)))
            .from_subquery(matches, Ident::new("matches"))
            .to_owned();

        Ok(self.finish(&count, tree.node(root).validates_query()))
    }

    fn plan(
        &self,
        spec: &FilterSpec,
        schema: &dyn SchemaLookup,
        today: NaiveDate,
    ) -> Result<QueryTree, CompileError> {
        let schema = MemoizedSchema::new(schema);
        let ctx = BuildContext {
            schema: &schema,
            config: &self.config,
            today,
        };
        let mut tree = QueryTree::build(&ctx, spec)?;
        tree.register(&self.config)?;
        Ok(tree)
    }

    fn finish(&self, select: &SelectStatement, validates: bool) -> CompiledQuery {
        let (sql, values) = match self.config.dialect {
            Dialect::MySql => select.build(MysqlQueryBuilder),
            Dialect::Sqlite => select.build(SqliteQueryBuilder),
            Dialect::Postgres => select.build(PostgresQueryBuilder),
        };
        trace!(sql = %sql, bindings = values.0.len(), validates, "compiled search");
        CompiledQuery {
            sql,
            bindings: values.0,
            validates,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::schema::{StaticSchema, ValueType};

    fn create_test_schema() -> StaticSchema {
        StaticSchema::new()
            .with_attribute("Lib.Record", "status", ValueType::String)
            .with_attribute("Lib.Record", "pages", ValueType::Integer)
            .with_attribute("Lib.Record", "published", ValueType::Date)
            .with_attribute("Lib.Loan", "borrower", ValueType::String)
            .with_attribute("Lib.Loan", "record", ValueType::String)
    }

    fn context() -> SearchContext {
        SearchContext::new(NaiveDate::from_ymd_opt(2024, 3, 15).unwrap())
    }

    fn compile(value: serde_json::Value) -> CompiledQuery {
        let spec: FilterSpec = serde_json::from_value(value).unwrap();
        SqlCompiler::new()
            .compile_with(&spec, &create_test_schema(), &context())
            .unwrap()
    }

    fn placeholders(sql: &str) -> usize {
        sql.matches('?').count()
    }

    #[test]
    fn test_simple_filter_compilation() {
        let result = compile(json!({
            "type": "document",
            "class": "Lib.Record",
            "filters": [{
                "type": "object",
                "class": "Lib.Record",
                "property_name": "status",
                "values": ["open", "closed"]
            }]
        }));

        assert!(result.sql.starts_with("SELECT DISTINCT `doc0`.`full_name` FROM `xwikidoc` AS `doc0`"), "{}", result.sql);
        assert!(result.sql.contains("IN (?, ?)"), "{}", result.sql);
        assert!(result.validates);
        assert_eq!(
            result.bindings,
            vec![
                Value::from("Lib.Record"),
                Value::from("status"),
                Value::from("open"),
                Value::from("closed"),
                Value::from("%Template"),
            ]
        );
        assert_eq!(placeholders(&result.sql), result.bindings.len());
    }

    #[test]
    fn test_joins_are_parameterized() {
        let result = compile(json!({
            "class": "Lib.Record",
            "filters": [{"class": "Lib.Record", "property_name": "pages", "min": 10}]
        }));

        assert!(
            result.sql.contains(
                "INNER JOIN `xwikiobjects` AS `obj0_1` ON `obj0_1`.`doc_name` = `doc0`.`full_name` AND `obj0_1`.`class_name` = ?"
            ),
            "{}",
            result.sql
        );
        assert!(
            result.sql.contains(
                "INNER JOIN `xwikiintegers` AS `prop0_2` ON `prop0_2`.`id` = `obj0_1`.`id` AND `prop0_2`.`name` = ?"
            ),
            "{}",
            result.sql
        );
        assert!(result.sql.contains("`doc0`.`full_name` NOT LIKE ? ESCAPE '!'"), "{}", result.sql);
    }

    #[test]
    fn test_empty_search_does_not_validate() {
        let result = compile(json!({"class": "Lib.Record"}));
        assert!(!result.validates);
        assert_eq!(result.bindings, vec![Value::from("Lib.Record"), Value::from("%Template")]);
    }

    #[test]
    fn test_nested_query_compiles_to_exists() {
        let result = compile(json!({
            "class": "Lib.Record",
            "queries": [{
                "type": "document",
                "class": "Lib.Loan",
                "filters": [
                    {"type": "reference", "class": "Lib.Loan", "property_name": "record"},
                    {"class": "Lib.Loan", "property_name": "borrower", "values": ["ann"], "match": "exact"}
                ]
            }]
        }));

        assert!(result.sql.contains("EXISTS"), "{}", result.sql);
        assert!(result.sql.contains("`prop0_1_2`.`value` = `doc0`.`full_name`"), "{}", result.sql);
        assert_eq!(placeholders(&result.sql), result.bindings.len());
        assert!(result.bindings.contains(&Value::from("ann")));
    }

    #[test]
    fn test_order_and_page_apply_to_root() {
        let spec: FilterSpec = serde_json::from_value(json!({
            "class": "Lib.Record",
            "filters": [
                {"class": "Lib.Record", "property_name": "status", "values": ["open"]},
                {"type": "order", "class": "Lib.Record", "property_name": "pages", "order": "desc"}
            ]
        }))
        .unwrap();
        let result = SqlCompiler::new()
            .compile_with(&spec, &create_test_schema(), &context().with_page(20, 40))
            .unwrap();

        assert!(result.sql.contains("LEFT JOIN `xwikiintegers` AS `prop0_3`"), "{}", result.sql);
        assert!(result.sql.contains("ORDER BY `prop0_3`.`value` DESC"), "{}", result.sql);
        assert!(result.sql.ends_with("LIMIT ? OFFSET ?"), "{}", result.sql);
        assert_eq!(placeholders(&result.sql), result.bindings.len());
    }

    #[test]
    fn test_count_wraps_distinct_matches() {
        let spec: FilterSpec = serde_json::from_value(json!({
            "class": "Lib.Record",
            "filters": [{"class": "Lib.Record", "property_name": "status", "values": ["open"]}]
        }))
        .unwrap();
        let result = SqlCompiler::new()
            .compile_count(&spec, &create_test_schema(), &context())
            .unwrap();

        assert!(result.sql.starts_with("SELECT COUNT(*) FROM (SELECT DISTINCT"), "{}", result.sql);
        assert!(result.sql.ends_with(") AS `matches`"), "{}", result.sql);
    }

    #[test]
    fn test_postgres_placeholders() {
        let config = CompilerConfig {
            dialect: Dialect::Postgres,
            ..Default::default()
        };
        let spec: FilterSpec = serde_json::from_value(json!({
            "class": "Lib.Record",
            "filters": [{"class": "Lib.Record", "property_name": "status", "values": ["open"]}]
        }))
        .unwrap();
        let result = SqlCompiler::from_config(config)
            .compile_with(&spec, &create_test_schema(), &context())
            .unwrap();

        assert!(result.sql.contains("\"obj0_1\".\"class_name\" = $1"), "{}", result.sql);
        assert!(result.sql.contains(&format!("${}", result.bindings.len())), "{}", result.sql);
    }

    #[test]
    fn test_compile_json_rejects_garbage() {
        let err = SqlCompiler::new()
            .compile_json("{not json", &create_test_schema())
            .unwrap_err();
        assert!(matches!(err, CompileError::InvalidJson(_)));
    }
}
