use polars::prelude::*;

use olist_core::window::{
    with_cumulative_sum, with_growth_rate, with_moving_average, with_rank,
};

fn monthly() -> DataFrame {
    DataFrame::new(vec![
        Series::new(
            "category".into(),
            vec!["decor", "decor", "decor", "decor", "toys"],
        )
        .into(),
        Series::new(
            "year_month".into(),
            vec!["2017-10", "2017-11", "2017-12", "2018-01", "2017-10"],
        )
        .into(),
        Series::new(
            "total_revenue".into(),
            vec![Some(10.0), Some(20.0), Some(30.0), Some(40.0), Some(25.0)],
        )
        .into(),
    ])
    .unwrap()
}

#[test]
fn moving_average_shrinks_at_partition_boundaries() {
    let df = with_moving_average(
        &monthly(),
        "category",
        "year_month",
        "total_revenue",
        3,
        "revenue_3month_avg",
    )
    .unwrap();

    let avg = df.column("revenue_3month_avg").unwrap().f64().unwrap();
    // decor: [10], [10,20], [10,20,30], [20,30,40]
    assert_eq!(avg.get(0), Some(10.0));
    assert_eq!(avg.get(1), Some(15.0));
    assert_eq!(avg.get(2), Some(20.0));
    assert_eq!(avg.get(3), Some(30.0));
    // toys has a single month
    assert_eq!(avg.get(4), Some(25.0));
}

#[test]
fn moving_average_ignores_nulls_inside_the_window() {
    let df = DataFrame::new(vec![
        Series::new("category".into(), vec!["a", "a", "a"]).into(),
        Series::new("ym".into(), vec!["01", "02", "03"]).into(),
        Series::new("v".into(), vec![Some(10.0), None, Some(30.0)]).into(),
    ])
    .unwrap();

    let out = with_moving_average(&df, "category", "ym", "v", 3, "avg").unwrap();
    let avg = out.column("avg").unwrap().f64().unwrap();
    assert_eq!(avg.get(1), Some(10.0));
    assert_eq!(avg.get(2), Some(20.0));
}

#[test]
fn growth_rate_is_null_on_first_row_and_zero_base() {
    let df = DataFrame::new(vec![
        Series::new("category".into(), vec!["a", "a", "a", "a"]).into(),
        Series::new("ym".into(), vec!["01", "02", "03", "04"]).into(),
        Series::new("v".into(), vec![Some(100.0), Some(150.0), Some(0.0), Some(30.0)]).into(),
    ])
    .unwrap();

    let out = with_growth_rate(&df, "category", "ym", "v", "prev", "growth").unwrap();

    let prev = out.column("prev").unwrap().f64().unwrap();
    let growth = out.column("growth").unwrap().f64().unwrap();

    assert_eq!(prev.get(0), None);
    assert_eq!(growth.get(0), None);
    assert_eq!(prev.get(1), Some(100.0));
    assert_eq!(growth.get(1), Some(50.0));
    assert_eq!(growth.get(2), Some(-100.0));
    // previous value of exactly zero never divides
    assert_eq!(prev.get(3), Some(0.0));
    assert_eq!(growth.get(3), None);
}

#[test]
fn growth_rate_partitions_do_not_leak() {
    let out = with_growth_rate(
        &monthly(),
        "category",
        "year_month",
        "total_revenue",
        "prev",
        "growth",
    )
    .unwrap();

    // toys' only row is a partition start even though decor precedes it.
    let prev = out.column("prev").unwrap().f64().unwrap();
    assert_eq!(prev.get(4), None);
}

#[test]
fn cumulative_sum_runs_within_each_partition() {
    let df = DataFrame::new(vec![
        Series::new("t".into(), vec!["card", "card", "card", "boleto"]).into(),
        Series::new("ym".into(), vec!["01", "02", "03", "01"]).into(),
        Series::new("v".into(), vec![None, Some(10.0), Some(5.0), Some(7.0)]).into(),
    ])
    .unwrap();

    let out = with_cumulative_sum(&df, "t", "ym", "v", "cumulative").unwrap();
    let cumulative = out.column("cumulative").unwrap().f64().unwrap();
    assert_eq!(cumulative.get(0), None); // null until the first value
    assert_eq!(cumulative.get(1), Some(10.0));
    assert_eq!(cumulative.get(2), Some(15.0));
    assert_eq!(cumulative.get(3), Some(7.0));
}

#[test]
fn rank_is_competition_style_with_ties() {
    let df = DataFrame::new(vec![
        Series::new("ym".into(), vec!["01", "01", "01", "01"]).into(),
        Series::new("v".into(), vec![Some(30.0), Some(30.0), Some(10.0), None]).into(),
    ])
    .unwrap();

    let out = with_rank(&df, "ym", "v", true, "rank", "pct").unwrap();

    let rank = out.column("rank").unwrap().i64().unwrap();
    assert_eq!(rank.get(0), Some(1));
    assert_eq!(rank.get(1), Some(1)); // tie shares the rank
    assert_eq!(rank.get(2), Some(3)); // next distinct value resumes at position
    assert_eq!(rank.get(3), Some(4)); // null orders last

    let pct = out.column("pct").unwrap().f64().unwrap();
    assert_eq!(pct.get(0), Some(0.0));
    assert_eq!(pct.get(2), Some(2.0 / 3.0));
    assert_eq!(pct.get(3), Some(1.0));
}

#[test]
fn rank_restarts_per_partition_and_single_rows_take_percentile_zero() {
    let out = with_rank(
        &monthly(),
        "year_month",
        "total_revenue",
        true,
        "rank_in_month",
        "revenue_percentile",
    )
    .unwrap();

    let rank = out.column("rank_in_month").unwrap().i64().unwrap();
    let pct = out.column("revenue_percentile").unwrap().f64().unwrap();

    // 2017-10 holds decor (10.0) and toys (25.0); descending puts toys first.
    assert_eq!(rank.get(4), Some(1));
    assert_eq!(rank.get(0), Some(2));
    assert_eq!(pct.get(4), Some(0.0));
    assert_eq!(pct.get(0), Some(1.0));

    // 2017-11 is a single-row partition.
    assert_eq!(rank.get(1), Some(1));
    assert_eq!(pct.get(1), Some(0.0));
}

#[test]
fn window_outputs_align_to_input_row_order() {
    let out = with_moving_average(
        &monthly(),
        "category",
        "year_month",
        "total_revenue",
        3,
        "avg",
    )
    .unwrap();

    // The frame itself is not reordered.
    let ym = out.column("year_month").unwrap().str().unwrap();
    assert_eq!(ym.get(0), Some("2017-10"));
    assert_eq!(ym.get(4), Some("2017-10"));
}
