use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use polars::prelude::*;

use olist_core::config::RunConfig;
use olist_core::error::PipelineError;
use olist_core::sink::{TableRef, Warehouse};

fn scratch(label: &str) -> PathBuf {
    std::env::temp_dir().join(format!("olist-sink-{}-{label}", std::process::id()))
}

fn config(label: &str) -> RunConfig {
    let base = scratch(label);
    RunConfig {
        app_name: "olist-test".into(),
        project: "de25a2".into(),
        dataset: "olist_analytics".into(),
        warehouse_root: base.join("warehouse"),
        staging_location: base.join("staging"),
        sources: HashMap::new(),
    }
}

fn sample() -> DataFrame {
    DataFrame::new(vec![
        Series::new("category".into(), vec!["decor", "toys"]).into(),
        Series::new("total_revenue".into(), vec![30.0, 25.0]).into(),
    ])
    .unwrap()
}

#[test]
fn write_places_parquet_under_project_and_dataset() {
    let config = config("layout");
    let warehouse = Warehouse::open(&config).unwrap();
    let table = config.table("category_overall_performance");

    warehouse.write_table(&sample(), &table).unwrap();

    let path = warehouse.table_path(&table);
    assert!(path.ends_with(
        "de25a2/olist_analytics/category_overall_performance.parquet"
    ));

    let file = fs::File::open(&path).unwrap();
    let read = ParquetReader::new(file).finish().unwrap();
    assert!(read.equals_missing(&sample()));

    warehouse.close().unwrap();
    fs::remove_dir_all(scratch("layout")).ok();
}

#[test]
fn write_replaces_previous_contents() {
    let config = config("overwrite");
    let warehouse = Warehouse::open(&config).unwrap();
    let table = config.table("payment_type_summary");

    warehouse.write_table(&sample(), &table).unwrap();

    let smaller = sample().head(Some(1));
    warehouse.write_table(&smaller, &table).unwrap();

    let file = fs::File::open(warehouse.table_path(&table)).unwrap();
    let read = ParquetReader::new(file).finish().unwrap();
    assert_eq!(read.height(), 1);

    warehouse.close().unwrap();
    fs::remove_dir_all(scratch("overwrite")).ok();
}

#[test]
fn close_removes_the_staging_location() {
    let config = config("close");
    let warehouse = Warehouse::open(&config).unwrap();
    assert!(config.staging_location.exists());

    warehouse.close().unwrap();
    assert!(!config.staging_location.exists());
    fs::remove_dir_all(scratch("close")).ok();
}

#[test]
fn write_failure_names_the_table() {
    let config = config("failure");
    let warehouse = Warehouse::open(&config).unwrap();
    // Remove the staging directory under the open session to force the
    // staged write to fail.
    fs::remove_dir_all(&config.staging_location).unwrap();

    let table = config.table("category_quarterly_sales");
    let err = warehouse.write_table(&sample(), &table).unwrap_err();
    match err {
        PipelineError::SinkWriteFailure { table, .. } => {
            assert_eq!(table, "de25a2.olist_analytics.category_quarterly_sales");
        }
        other => panic!("expected SinkWriteFailure, got {other:?}"),
    }
    fs::remove_dir_all(scratch("failure")).ok();
}

#[test]
fn table_ref_parses_fully_qualified_names_only() {
    let parsed = TableRef::parse("de25a2.olist_analytics.payment_cash_flow").unwrap();
    assert_eq!(parsed.project, "de25a2");
    assert_eq!(parsed.dataset, "olist_analytics");
    assert_eq!(parsed.table, "payment_cash_flow");
    assert_eq!(parsed.to_string(), "de25a2.olist_analytics.payment_cash_flow");

    assert!(TableRef::parse("olist_analytics.payment_cash_flow").is_err());
    assert!(TableRef::parse("a..c").is_err());
}

#[test]
fn open_rejects_a_blank_staging_location() {
    let mut config = config("validate");
    config.staging_location = PathBuf::new();
    let err = Warehouse::open(&config).unwrap_err();
    assert!(matches!(err, PipelineError::Config(_)));
}
