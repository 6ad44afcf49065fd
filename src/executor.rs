//! Running compiled searches against a query engine.

use tracing::{debug, info};
use thiserror::Error;

use crate::ast::FilterSpec;
use crate::error::CompileError;
use crate::schema::SchemaLookup;
use crate::sql_compiler::{CompiledQuery, SearchContext, SqlCompiler};

/// The query engine. Implementations own connections, timeouts and
/// cancellation; the compiler never talks to storage itself.
pub trait QueryExecutor {
    type Error: std::error::Error + 'static;

    /// Runs a record query and returns the matched record names, in order.
    fn fetch_records(&self, query: &CompiledQuery) -> Result<Vec<String>, Self::Error>;

    /// Runs a `COUNT(*)` query.
    fn count(&self, query: &CompiledQuery) -> Result<u64, Self::Error>;
}

#[derive(Debug, Error)]
pub enum SearchError<E>
where
    E: std::error::Error + 'static,
{
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error("query execution failed: {0}")]
    Execution(#[source] E),
}

/// One page of matches plus the total number of matches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPage {
    pub records: Vec<String>,
    pub total: u64,
}

pub struct SearchService<X> {
    compiler: SqlCompiler,
    executor: X,
}

impl<X: QueryExecutor> SearchService<X> {
    pub fn new(compiler: SqlCompiler, executor: X) -> Self {
        Self { compiler, executor }
    }

    pub fn compiler(&self) -> &SqlCompiler {
        &self.compiler
    }

    pub fn executor(&self) -> &X {
        &self.executor
    }

    /// Compiles and runs one search. A search without any search term would
    /// match every record, so it returns an empty page without touching the
    /// executor.
    pub fn search(
        &self,
        spec: &FilterSpec,
        schema: &dyn SchemaLookup,
        context: &SearchContext,
    ) -> Result<SearchPage, SearchError<X::Error>> {
        let page = self.compiler.compile_with(spec, schema, context)?;
        if !page.validates {
            debug!("search has no search terms, returning no records");
            return Ok(SearchPage::default());
        }
        let count = self.compiler.compile_count(spec, schema, context)?;

        let records = self
            .executor
            .fetch_records(&page)
            .map_err(SearchError::Execution)?;
        let total = self.executor.count(&count).map_err(SearchError::Execution)?;

        info!(returned = records.len(), total, "search finished");
        Ok(SearchPage { records, total })
    }
}
