//! Compiles JSON searches over typed records into parameterized SQL.
//!
//! ```no_run
//! use search_compiler::schema::{StaticSchema, ValueType};
//! use search_compiler::sql_compiler::SqlCompiler;
//!
//! let schema = StaticSchema::new().with_attribute("Lib.Record", "status", ValueType::String);
//! let query = SqlCompiler::new().compile_json(
//!     r#"{"type": "document", "class": "Lib.Record",
//!         "filters": [{"class": "Lib.Record", "property_name": "status", "values": ["open"]}]}"#,
//!     &schema,
//! )?;
//! println!("{} {:?}", query.sql, query.bindings);
//! # Ok::<(), search_compiler::error::CompileError>(())
//! ```

pub mod ast;
pub mod clause;
pub mod config;
pub mod error;
pub mod executor;
pub mod filters;
pub mod group;
pub mod identifier;
pub mod node;
pub mod schema;
pub mod sql_compiler;

pub use config::{CompilerConfig, ConfigError, Dialect, StorageLayout};
pub use error::CompileError;
pub use executor::{QueryExecutor, SearchError, SearchPage, SearchService};
pub use schema::{MemoizedSchema, SchemaLookup, StaticSchema, ValueType};
pub use sql_compiler::{CompiledQuery, Page, SearchContext, SqlCompiler};
