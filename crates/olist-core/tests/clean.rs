use polars::prelude::*;

use olist_core::clean::{apply_predicates, RowPredicate};

fn orders() -> DataFrame {
    DataFrame::new(vec![
        Series::new(
            "order_id".into(),
            vec![Some("o1"), Some("o2"), Some("o3"), None],
        )
        .into(),
        Series::new(
            "order_status".into(),
            vec![Some("delivered"), Some("canceled"), None, Some("delivered")],
        )
        .into(),
        Series::new(
            "payment_value".into(),
            vec![Some(10.0), Some(-5.0), Some(0.0), Some(3.5)],
        )
        .into(),
    ])
    .unwrap()
}

#[test]
fn status_filter_keeps_only_allowed_values() {
    let df = apply_predicates(
        &orders(),
        &[RowPredicate::status_in("order_status", &["delivered"])],
    )
    .unwrap();

    assert_eq!(df.height(), 2);
    let statuses = df.column("order_status").unwrap().str().unwrap();
    assert!(statuses.into_iter().all(|s| s == Some("delivered")));
}

#[test]
fn null_status_never_matches_an_allow_list() {
    let df = apply_predicates(
        &orders(),
        &[RowPredicate::status_in(
            "order_status",
            &["delivered", "canceled"],
        )],
    )
    .unwrap();
    // Row with the null status is dropped even though the list is broad.
    assert_eq!(df.height(), 3);
}

#[test]
fn positive_filter_drops_zero_negative_and_null() {
    let df = DataFrame::new(vec![Series::new(
        "payment_value".into(),
        vec![Some(1.0), Some(0.0), Some(-2.0), None],
    )
    .into()])
    .unwrap();

    let filtered = apply_predicates(&df, &[RowPredicate::positive("payment_value")]).unwrap();
    assert_eq!(filtered.height(), 1);
}

#[test]
fn predicates_combine_with_and() {
    let df = apply_predicates(
        &orders(),
        &[
            RowPredicate::status_in("order_status", &["delivered"]),
            RowPredicate::not_null("order_id"),
            RowPredicate::positive("payment_value"),
        ],
    )
    .unwrap();

    assert_eq!(df.height(), 1);
    let ids = df.column("order_id").unwrap().str().unwrap();
    assert_eq!(ids.get(0), Some("o1"));
}

#[test]
fn empty_predicate_list_is_identity() {
    let df = apply_predicates(&orders(), &[]).unwrap();
    assert_eq!(df.height(), 4);
}
