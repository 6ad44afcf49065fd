use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;

use chrono::NaiveDate;
use search_compiler::ast::FilterSpec;
use search_compiler::schema::{StaticSchema, ValueType};
use search_compiler::sql_compiler::{SearchContext, SqlCompiler};

// 创建测试用的属性类型定义
fn create_schema() -> StaticSchema {
    StaticSchema::new()
        .with_attribute("Lib.Record", "status", ValueType::String)
        .with_attribute("Lib.Record", "title", ValueType::String)
        .with_attribute("Lib.Record", "pages", ValueType::Integer)
        .with_attribute("Lib.Record", "published", ValueType::Date)
        .with_attribute("Lib.Record", "tags", ValueType::RelationalList)
        .with_attribute("Lib.Loan", "borrower", ValueType::String)
        .with_attribute("Lib.Loan", "record", ValueType::String)
        .with_attribute("Lib.Loan", "due", ValueType::Date)
}

fn context() -> SearchContext {
    SearchContext::new(NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()).with_page(50, 0)
}

fn test_cases() -> Vec<(&'static str, &'static str)> {
    vec![
        (
            "simple",
            r#"{"type": "document", "class": "Lib.Record", "filters": [
                {"class": "Lib.Record", "property_name": "status", "values": ["open"]}
            ]}"#,
        ),
        (
            "medium",
            r#"{"type": "document", "class": "Lib.Record", "filters": [
                {"class": "Lib.Record", "property_name": "status", "values": ["open", "closed"]},
                {"class": "Lib.Record", "property_name": "pages", "min": 100, "max": 400},
                {"class": "Lib.Record", "property_name": "published", "age": "5"},
                {"type": "order", "class": "Lib.Record", "property_name": "title"}
            ]}"#,
        ),
        (
            "complex",
            r#"{"type": "document", "class": "Lib.Record", "filters": [
                {"type": "expression", "join_mode": "or", "filters": [
                    {"class": "Lib.Record", "property_name": "title", "values": ["dune"], "match": "ci"},
                    {"class": "Lib.Record", "property_name": "tags", "values": ["sf", "classic"]}
                ]},
                {"class": "Lib.Record", "property_name": "doc.creationDate", "after": "2020-01-01"}
            ], "queries": [
                {"type": "document", "class": "Lib.Loan", "negate": true, "filters": [
                    {"type": "reference", "class": "Lib.Loan", "property_name": "record"},
                    {"class": "Lib.Loan", "property_name": "due", "before": "2024-01-01"},
                    {"class": "Lib.Loan", "property_name": "borrower",
                     "ref_values": [{"class": "Lib.Record", "property_name": "status", "parent_level": 1}]}
                ]}
            ]}"#,
        ),
    ]
}

// 基准测试：JSON 解析性能
fn benchmark_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_performance");

    for (name, json) in test_cases() {
        group.bench_with_input(BenchmarkId::new("parse", name), &json, |b, &json| {
            b.iter(|| {
                let spec: FilterSpec = serde_json::from_str(black_box(json)).expect("解析应该成功");
                black_box(spec)
            })
        });
    }

    group.finish();
}

// 基准测试：SQL编译性能
fn benchmark_sql_compiler(c: &mut Criterion) {
    let schema = create_schema();
    let compiler = SqlCompiler::new();
    let context = context();

    let mut group = c.benchmark_group("sql_compiler_performance");

    for (name, json) in test_cases() {
        // 预处理：JSON 解析
        let spec: FilterSpec = serde_json::from_str(json).expect("解析应该成功");

        group.bench_with_input(BenchmarkId::new("compile", name), &spec, |b, spec| {
            b.iter(|| {
                match compiler.compile_with(black_box(spec), &schema, &context) {
                    Ok(result) => black_box(result),
                    Err(_) => panic!("编译失败"),
                }
            })
        });
    }

    group.finish();
}

// 基准测试：完整的端到端处理
fn benchmark_end_to_end(c: &mut Criterion) {
    let schema = create_schema();
    let context = context();

    let mut group = c.benchmark_group("end_to_end_performance");

    for (name, json) in test_cases() {
        group.bench_with_input(BenchmarkId::new("full_pipeline", name), &json, |b, &json| {
            b.iter(|| {
                // 完整的处理流程：解析、编译页面查询和计数查询
                let spec: FilterSpec = serde_json::from_str(black_box(json)).expect("解析应该成功");
                let compiler = SqlCompiler::new();
                let page = compiler.compile_with(&spec, &schema, &context).expect("编译应该成功");
                let count = compiler.compile_count(&spec, &schema, &context).expect("编译应该成功");
                black_box((page, count))
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_parse,
    benchmark_sql_compiler,
    benchmark_end_to_end
);
criterion_main!(benches);
