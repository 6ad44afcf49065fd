use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::Parser;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use search_compiler::ast::FilterSpec;
use search_compiler::config::{CompilerConfig, ConfigError, Dialect};
use search_compiler::schema::StaticSchema;
use search_compiler::sql_compiler::{CompiledQuery, SearchContext, SqlCompiler};

/// 交互式搜索编译器：输入 JSON 搜索，输出参数化 SQL
#[derive(Parser, Debug)]
#[command(name = "search_compiler")]
#[command(about = "Compile JSON searches into parameterized SQL", long_about = None)]
struct Args {
    /// 编译器配置文件
    #[arg(short, long, default_value = "search_config.json")]
    config: PathBuf,

    /// 属性类型定义文件
    #[arg(short, long)]
    schema: Option<PathBuf>,

    /// 覆盖配置中的 SQL 方言 (mysql, sqlite, postgres)
    #[arg(short, long)]
    dialect: Option<Dialect>,

    /// 计算年龄时使用的日期，默认今天
    #[arg(long)]
    today: Option<NaiveDate>,

    /// 每页记录数
    #[arg(long)]
    limit: Option<u64>,

    /// 跳过的记录数
    #[arg(long, default_value_t = 0)]
    offset: u64,

    /// 直接编译这一条搜索并退出
    query: Option<String>,
}

/// 加载编译器配置，文件不存在时使用默认配置
fn load_config(args: &Args) -> Result<CompilerConfig> {
    let mut config = match CompilerConfig::from_json_file(&args.config) {
        Ok(config) => {
            info!(path = %args.config.display(), "loaded compiler config");
            config
        }
        Err(ConfigError::NotFound(path)) => {
            warn!(path = %path, "config file not found, using defaults");
            CompilerConfig::default()
        }
        Err(e) => return Err(e).context("failed to load compiler config"),
    };
    if let Some(dialect) = args.dialect {
        config.dialect = dialect;
    }
    Ok(config)
}

fn load_schema(args: &Args) -> Result<StaticSchema> {
    match &args.schema {
        Some(path) => {
            let schema = StaticSchema::from_json_file(path)
                .with_context(|| format!("failed to load schema from {}", path.display()))?;
            info!(classes = schema.class_count(), "loaded schema");
            Ok(schema)
        }
        None => {
            warn!("no schema given, only doc.* attributes will resolve");
            Ok(StaticSchema::new())
        }
    }
}

fn print_query(label: &str, query: &CompiledQuery) {
    println!("\n[{}]:", label);
    println!("{}", query.sql);
    println!("绑定参数 ({}):", query.bindings.len());
    for (i, value) in query.bindings.iter().enumerate() {
        println!("  {}: {:?}", i + 1, value);
    }
    if !query.validates {
        println!("⚠️ 搜索没有有效的条件，会匹配所有记录");
    }
}

/// 编译一条输入。以 `:count ` 开头时生成计数查询
fn handle_line(
    line: &str,
    compiler: &SqlCompiler,
    schema: &StaticSchema,
    context: &SearchContext,
) -> Result<()> {
    let (count, json) = match line.strip_prefix(":count ") {
        Some(rest) => (true, rest),
        None => (false, line),
    };
    let spec: FilterSpec = serde_json::from_str(json).context("invalid search JSON")?;

    if count {
        let query = compiler.compile_count(&spec, schema, context)?;
        print_query("计数 SQL", &query);
    } else {
        let query = compiler.compile_with(&spec, schema, context)?;
        print_query("生成的 SQL", &query);
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "search_compiler=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let compiler = SqlCompiler::from_config(load_config(&args)?);
    let schema = load_schema(&args)?;

    let mut context = SearchContext::new(args.today.unwrap_or_else(|| Local::now().date_naive()));
    if let Some(limit) = args.limit {
        context = context.with_page(limit, args.offset);
    }

    if let Some(query) = &args.query {
        return handle_line(query, &compiler, &schema, &context);
    }

    println!("--- 搜索编译器: JSON 到 SQL ---");
    println!("方言: {:?}，输入 JSON 搜索，`:count <json>` 生成计数查询，Ctrl-D 退出", compiler.config().dialect);

    let mut editor = DefaultEditor::new().context("failed to start line editor")?;
    loop {
        match editor.readline("search> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                editor.add_history_entry(line)?;
                if let Err(e) = handle_line(line, &compiler, &schema, &context) {
                    println!("✗ {:#}", e);
                }
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => return Err(e).context("failed to read input"),
        }
    }
    Ok(())
}
