use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use polars::prelude::*;

use olist_core::{pipeline_by_code, publish_results, RunConfig, RunContext, Warehouse};

fn fixtures() -> HashMap<String, PathBuf> {
    let data = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/data");
    [
        "orders",
        "order_items",
        "products",
        "category_translation",
        "payments",
    ]
    .iter()
    .map(|name| (name.to_string(), data.join(format!("{name}.csv"))))
    .collect()
}

fn config(label: &str) -> RunConfig {
    let base = std::env::temp_dir().join(format!("olist-pipeline-{}-{label}", std::process::id()));
    RunConfig {
        app_name: "olist-test".into(),
        project: "de25a2".into(),
        dataset: "olist_analytics".into(),
        warehouse_root: base.join("warehouse"),
        staging_location: base.join("staging"),
        sources: fixtures(),
    }
}

#[test]
fn category_sales_produces_expected_monthly_rollup() {
    let config = config("category");
    let ctx = RunContext { config: &config };
    let pipeline = pipeline_by_code("category_sales").unwrap();

    let results = pipeline.run(&ctx).unwrap();
    assert_eq!(results.len(), 3);

    let monthly = &results[0].frame;
    assert_eq!(
        results[0].table.to_string(),
        "de25a2.olist_analytics.category_monthly_performance"
    );

    // Delivered orders are o1, o2, o4; o3 (shipped) is excluded. The p3 item
    // has no category on either side, so its group key is null.
    assert_eq!(monthly.height(), 2);

    let ym = monthly.column("year_month").unwrap().str().unwrap();
    let category = monthly.column("category_final").unwrap().str().unwrap();
    assert_eq!(ym.get(0), Some("2017-10"));
    assert_eq!(category.get(0), Some("furniture_decor"));
    assert_eq!(ym.get(1), Some("2017-11"));
    assert_eq!(category.get(1), None);

    let revenue = monthly.column("total_revenue").unwrap().f64().unwrap();
    assert_eq!(revenue.get(0), Some(30.0));
    assert_eq!(revenue.get(1), Some(40.0));

    let orders = monthly.column("total_orders").unwrap().i64().unwrap();
    assert_eq!(orders.get(0), Some(2));

    // Each month holds one category, so every rank is 1.
    let rank = monthly.column("rank_in_month").unwrap().i64().unwrap();
    assert_eq!(rank.get(0), Some(1));
    assert_eq!(rank.get(1), Some(1));

    // One month of history per category: the moving average equals the value
    // and there is no prior month to grow from.
    let avg = monthly.column("revenue_3month_avg").unwrap().f64().unwrap();
    assert_eq!(avg.get(0), Some(30.0));
    let growth = monthly.column("growth_rate").unwrap().f64().unwrap();
    assert_eq!(growth.get(0), None);
}

#[test]
fn category_sales_overall_and_quarterly_rollups() {
    let config = config("category-extra");
    let ctx = RunContext { config: &config };
    let pipeline = pipeline_by_code("category_sales").unwrap();

    let results = pipeline.run(&ctx).unwrap();

    let overall = &results[1].frame;
    assert_eq!(overall.height(), 2);
    // Sorted by revenue descending; the uncategorized group leads with 40.0.
    let category = overall.column("category_final").unwrap().str().unwrap();
    let revenue = overall.column("total_revenue").unwrap().f64().unwrap();
    assert_eq!(category.get(0), None);
    assert_eq!(revenue.get(0), Some(40.0));
    assert_eq!(category.get(1), Some("furniture_decor"));
    assert_eq!(revenue.get(1), Some(30.0));

    let quarterly = &results[2].frame;
    assert_eq!(quarterly.height(), 2);
    let year = quarterly.column("year").unwrap().i64().unwrap();
    let quarter = quarterly.column("quarter").unwrap().i64().unwrap();
    assert_eq!(year.get(0), Some(2017));
    assert_eq!(quarter.get(0), Some(4));
}

#[test]
fn payment_behavior_produces_six_result_sets() {
    let config = config("payment");
    let ctx = RunContext { config: &config };
    let pipeline = pipeline_by_code("payment_behavior").unwrap();

    let results = pipeline.run(&ctx).unwrap();
    assert_eq!(results.len(), 6);

    // All four orders pass the status filter (delivered, shipped) and every
    // payment value is positive.
    let summary = &results[0].frame;
    let types = summary.column("payment_type").unwrap().str().unwrap();
    let counts = summary.column("transaction_count").unwrap().i64().unwrap();
    assert_eq!(types.get(0), Some("credit_card"));
    assert_eq!(counts.get(0), Some(2));
    let totals = summary.column("total_value").unwrap().f64().unwrap();
    assert_eq!(totals.get(0), Some(25.0));

    let monthly = &results[1].frame;
    assert_eq!(monthly.height(), 4);
    let ym = monthly.column("year_month").unwrap().str().unwrap();
    let payment_type = monthly.column("payment_type").unwrap().str().unwrap();
    assert_eq!(
        (ym.get(0), payment_type.get(0)),
        (Some("2017-10"), Some("boleto"))
    );
    assert_eq!(
        (ym.get(1), payment_type.get(1)),
        (Some("2017-10"), Some("credit_card"))
    );

    // o1 pays 10.0 over 2 installments.
    let cash_flow = &results[4].frame;
    let inflow = cash_flow
        .column("estimated_monthly_cash_inflow")
        .unwrap()
        .f64()
        .unwrap();
    assert_eq!(inflow.get(1), Some(5.0));

    // credit_card goes 10.0 -> 15.0 month over month.
    let growth_trends = &results[5].frame;
    let cumulative = growth_trends.column("cumulative_value").unwrap().f64().unwrap();
    let growth = growth_trends.column("growth_rate").unwrap().f64().unwrap();
    assert_eq!(cumulative.get(2), Some(25.0));
    assert_eq!(growth.get(2), Some(50.0));
}

#[test]
fn publish_writes_every_result_table() {
    let config = config("publish");
    let ctx = RunContext { config: &config };
    let pipeline = pipeline_by_code("category_sales").unwrap();

    let results = pipeline.run(&ctx).unwrap();
    let warehouse = Warehouse::open(&config).unwrap();
    publish_results(&warehouse, &results).unwrap();

    for result in &results {
        let path = warehouse.table_path(&result.table);
        assert!(path.exists(), "missing {}", path.display());
        let read = ParquetReader::new(fs::File::open(&path).unwrap())
            .finish()
            .unwrap();
        assert_eq!(read.height(), result.frame.height());
    }

    warehouse.close().unwrap();
    fs::remove_dir_all(
        std::env::temp_dir().join(format!("olist-pipeline-{}-publish", std::process::id())),
    )
    .ok();
}

#[test]
fn unknown_pipeline_code_is_not_registered() {
    assert!(pipeline_by_code("no_such_pipeline").is_none());
}
