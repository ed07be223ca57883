use once_cell::sync::Lazy;
use polars::prelude::DataFrame;
use tracing::info;

use crate::aggregate::{aggregate, AggregateColumn, AggregateFunction, AggregateSpec, SortKey};
use crate::clean::{apply_predicates, RowPredicate};
use crate::config::RunConfig;
use crate::derive::{apply_derivations, ArithmeticOp, BucketBranch, DerivedColumn, TimeBucket};
use crate::error::Result;
use crate::join::{join_on, JoinKind};
use crate::load::read_csv_source;
use crate::schema::{ColumnSpec, ColumnType, TableSchema};
use crate::sink::{TableRef, Warehouse};
use crate::window;

pub struct RunContext<'a> {
    pub config: &'a RunConfig,
}

impl RunContext<'_> {
    fn load(&self, name: &str, schema: &TableSchema) -> Result<DataFrame> {
        read_csv_source(name, self.config.source_location(name)?, schema)
    }
}

pub struct NamedResult {
    pub table: TableRef,
    pub frame: DataFrame,
}

pub trait AnalyticsPipeline: Send + Sync {
    fn code_identifier(&self) -> &'static str;
    fn version(&self) -> &'static str;
    fn run(&self, ctx: &RunContext) -> Result<Vec<NamedResult>>;
}

#[derive(Debug, Clone)]
pub struct PipelineDescriptor {
    pub code: &'static str,
    pub version: &'static str,
    pub description: &'static str,
}

static PIPELINES: Lazy<Vec<PipelineDescriptor>> = Lazy::new(|| {
    vec![
        PipelineDescriptor {
            code: "category_sales",
            version: "0.1.0",
            description: "Monthly and quarterly category revenue with rankings, \
                          moving averages, and growth rates",
        },
        PipelineDescriptor {
            code: "payment_behavior",
            version: "0.1.0",
            description: "Payment type, installment, and cash-flow analysis with \
                          monthly trend windows",
        },
    ]
});

pub fn all_pipeline_descriptors() -> &'static [PipelineDescriptor] {
    PIPELINES.as_slice()
}

pub fn pipeline_by_code(code: &str) -> Option<&'static dyn AnalyticsPipeline> {
    match code {
        "category_sales" => Some(&CategorySalesPipeline),
        "payment_behavior" => Some(&PaymentBehaviorPipeline),
        _ => None,
    }
}

/// Writes each result set independently; a failure halts the remaining writes
/// but does not roll back tables already written.
pub fn publish_results(warehouse: &Warehouse, results: &[NamedResult]) -> Result<()> {
    for result in results {
        warehouse.write_table(&result.frame, &result.table)?;
    }
    Ok(())
}

fn orders_schema() -> TableSchema {
    TableSchema::new(
        "orders",
        vec![
            ColumnSpec::new("order_id", ColumnType::Utf8),
            ColumnSpec::new("order_status", ColumnType::Utf8),
            ColumnSpec::new("order_purchase_timestamp", ColumnType::Datetime),
        ],
    )
}

fn order_items_schema() -> TableSchema {
    TableSchema::new(
        "order_items",
        vec![
            ColumnSpec::new("order_id", ColumnType::Utf8),
            ColumnSpec::new("product_id", ColumnType::Utf8),
            ColumnSpec::new("price", ColumnType::Float64),
            ColumnSpec::new("freight_value", ColumnType::Float64),
        ],
    )
}

fn products_schema() -> TableSchema {
    TableSchema::new(
        "products",
        vec![
            ColumnSpec::new("product_id", ColumnType::Utf8),
            ColumnSpec::new("product_category_name", ColumnType::Utf8),
        ],
    )
}

fn category_translation_schema() -> TableSchema {
    TableSchema::new(
        "category_translation",
        vec![
            ColumnSpec::new("product_category_name", ColumnType::Utf8),
            ColumnSpec::new("product_category_name_english", ColumnType::Utf8),
        ],
    )
}

fn payments_schema() -> TableSchema {
    TableSchema::new(
        "payments",
        vec![
            ColumnSpec::new("order_id", ColumnType::Utf8),
            ColumnSpec::new("payment_type", ColumnType::Utf8),
            ColumnSpec::new("payment_installments", ColumnType::Int64),
            ColumnSpec::new("payment_value", ColumnType::Float64),
        ],
    )
}

/// Category sales performance: monthly and quarterly revenue per product
/// category, with in-month rankings, 3-month moving averages, and
/// month-over-month growth.
pub struct CategorySalesPipeline;

impl AnalyticsPipeline for CategorySalesPipeline {
    fn code_identifier(&self) -> &'static str {
        "category_sales"
    }

    fn version(&self) -> &'static str {
        "0.1.0"
    }

    fn run(&self, ctx: &RunContext) -> Result<Vec<NamedResult>> {
        let orders = ctx.load("orders", &orders_schema())?;
        let order_items = ctx.load("order_items", &order_items_schema())?;
        let products = ctx.load("products", &products_schema())?;
        let translation = ctx.load("category_translation", &category_translation_schema())?;

        let orders = apply_predicates(
            &orders,
            &[RowPredicate::status_in("order_status", &["delivered"])],
        )?;
        let order_items = apply_predicates(
            &order_items,
            &[
                RowPredicate::not_null("order_id"),
                RowPredicate::not_null("product_id"),
                RowPredicate::not_null("price"),
            ],
        )?;
        let products = apply_predicates(
            &products,
            &[RowPredicate::not_null("product_category_name")],
        )?;

        // Fixed join order: the two left joins preserve order-item row
        // identity; the final inner join restricts to delivered orders.
        let items_products = join_on(&order_items, &products, "product_id", JoinKind::Left)?;
        let mut items_category = join_on(
            &items_products,
            &translation,
            "product_category_name",
            JoinKind::Left,
        )?;
        items_category.rename("product_category_name_english", "category".into())?;

        let order_times = orders.select(["order_id", "order_purchase_timestamp"])?;
        let fact = join_on(&items_category, &order_times, "order_id", JoinKind::Inner)?;
        info!(rows = fact.height(), "built category fact table");

        let fact = apply_derivations(
            &fact,
            &[
                DerivedColumn::time_bucket(
                    "order_purchase_timestamp",
                    TimeBucket::YearMonth,
                    "year_month",
                ),
                DerivedColumn::time_bucket("order_purchase_timestamp", TimeBucket::Year, "year"),
                DerivedColumn::time_bucket(
                    "order_purchase_timestamp",
                    TimeBucket::Quarter,
                    "quarter",
                ),
                DerivedColumn::arithmetic(
                    "price",
                    ArithmeticOp::Add,
                    "freight_value",
                    "total_revenue",
                ),
                DerivedColumn::coalesce("category", "product_category_name", "category_final"),
            ],
        )?;

        let monthly = aggregate(
            &fact,
            &AggregateSpec {
                group_by: vec!["year_month".into(), "category_final".into()],
                aggregates: vec![
                    AggregateColumn::new("total_revenue", AggregateFunction::Sum, "total_revenue"),
                    AggregateColumn::new("order_id", AggregateFunction::Count, "total_orders"),
                    AggregateColumn::new("price", AggregateFunction::Mean, "avg_price"),
                    AggregateColumn::new("freight_value", AggregateFunction::Sum, "total_freight"),
                    AggregateColumn::new(
                        "order_id",
                        AggregateFunction::CountDistinct,
                        "unique_orders",
                    ),
                    AggregateColumn::new(
                        "product_id",
                        AggregateFunction::CountDistinct,
                        "unique_products",
                    ),
                ],
                sort: vec![SortKey::asc("year_month"), SortKey::desc("total_revenue")],
            },
        )?;

        let top_categories = aggregate(
            &fact,
            &AggregateSpec {
                group_by: vec!["category_final".into()],
                aggregates: vec![
                    AggregateColumn::new("total_revenue", AggregateFunction::Sum, "total_revenue"),
                    AggregateColumn::new("order_id", AggregateFunction::Count, "total_items_sold"),
                    AggregateColumn::new(
                        "order_id",
                        AggregateFunction::CountDistinct,
                        "unique_orders",
                    ),
                    AggregateColumn::new("price", AggregateFunction::Mean, "avg_price"),
                    AggregateColumn::new(
                        "product_id",
                        AggregateFunction::CountDistinct,
                        "unique_products",
                    ),
                ],
                sort: vec![SortKey::desc("total_revenue")],
            },
        )?;

        let quarterly = aggregate(
            &fact,
            &AggregateSpec {
                group_by: vec!["year".into(), "quarter".into(), "category_final".into()],
                aggregates: vec![
                    AggregateColumn::new("total_revenue", AggregateFunction::Sum, "total_revenue"),
                    AggregateColumn::new("order_id", AggregateFunction::Count, "total_orders"),
                    AggregateColumn::new("price", AggregateFunction::Mean, "avg_price"),
                ],
                sort: vec![
                    SortKey::asc("year"),
                    SortKey::asc("quarter"),
                    SortKey::desc("total_revenue"),
                ],
            },
        )?;

        let monthly = window::with_rank(
            &monthly,
            "year_month",
            "total_revenue",
            true,
            "rank_in_month",
            "revenue_percentile",
        )?;
        let monthly = window::with_moving_average(
            &monthly,
            "category_final",
            "year_month",
            "total_revenue",
            3,
            "revenue_3month_avg",
        )?;
        let monthly = window::with_moving_average(
            &monthly,
            "category_final",
            "year_month",
            "total_orders",
            3,
            "orders_3month_avg",
        )?;
        let monthly = window::with_growth_rate(
            &monthly,
            "category_final",
            "year_month",
            "total_revenue",
            "prev_month_revenue",
            "growth_rate",
        )?;

        Ok(vec![
            NamedResult {
                table: ctx.config.table("category_monthly_performance"),
                frame: monthly,
            },
            NamedResult {
                table: ctx.config.table("category_overall_performance"),
                frame: top_categories,
            },
            NamedResult {
                table: ctx.config.table("category_quarterly_sales"),
                frame: quarterly,
            },
        ])
    }
}

/// Payment behavior and installment analysis: payment-type distribution,
/// monthly and hourly trends, installment patterns, cash-flow estimates, and
/// month-over-month growth per payment type.
pub struct PaymentBehaviorPipeline;

impl AnalyticsPipeline for PaymentBehaviorPipeline {
    fn code_identifier(&self) -> &'static str {
        "payment_behavior"
    }

    fn version(&self) -> &'static str {
        "0.1.0"
    }

    fn run(&self, ctx: &RunContext) -> Result<Vec<NamedResult>> {
        let orders = ctx.load("orders", &orders_schema())?;
        let payments = ctx.load("payments", &payments_schema())?;

        let orders = apply_predicates(
            &orders,
            &[RowPredicate::status_in(
                "order_status",
                &["delivered", "invoiced", "shipped"],
            )],
        )?;
        let payments = apply_predicates(&payments, &[RowPredicate::positive("payment_value")])?;

        // Single inner join; only orders with at least one valid payment
        // survive.
        let fact = join_on(&orders, &payments, "order_id", JoinKind::Inner)?;
        info!(rows = fact.height(), "built payment fact table");

        let fact = apply_derivations(
            &fact,
            &[
                DerivedColumn::time_bucket(
                    "order_purchase_timestamp",
                    TimeBucket::YearMonth,
                    "year_month",
                ),
                DerivedColumn::time_bucket("order_purchase_timestamp", TimeBucket::Year, "year"),
                DerivedColumn::time_bucket("order_purchase_timestamp", TimeBucket::Month, "month"),
                DerivedColumn::time_bucket(
                    "order_purchase_timestamp",
                    TimeBucket::DayOfWeek,
                    "day_of_week",
                ),
                DerivedColumn::time_bucket("order_purchase_timestamp", TimeBucket::Hour, "hour"),
                DerivedColumn::bucket(
                    "payment_value",
                    vec![
                        BucketBranch::new("0-50", None, Some(50.0)),
                        BucketBranch::new("50-100", Some(50.0), Some(100.0)),
                        BucketBranch::new("100-200", Some(100.0), Some(200.0)),
                        BucketBranch::new("200-500", Some(200.0), Some(500.0)),
                    ],
                    "500+",
                    "payment_range",
                ),
                DerivedColumn::bucket(
                    "payment_installments",
                    vec![
                        BucketBranch::new("Single Payment", Some(1.0), Some(2.0)),
                        BucketBranch::new("2-3 Installments", Some(2.0), Some(4.0)),
                        BucketBranch::new("4-6 Installments", Some(4.0), Some(7.0)),
                        BucketBranch::new("7-12 Installments", Some(7.0), Some(13.0)),
                    ],
                    "12+ Installments",
                    "installment_category",
                ),
                DerivedColumn::arithmetic(
                    "payment_value",
                    ArithmeticOp::Divide,
                    "payment_installments",
                    "monthly_installment_amount",
                ),
            ],
        )?;

        let payment_types = aggregate(
            &fact,
            &AggregateSpec {
                group_by: vec!["payment_type".into()],
                aggregates: vec![
                    AggregateColumn::new("order_id", AggregateFunction::Count, "transaction_count"),
                    AggregateColumn::new(
                        "order_id",
                        AggregateFunction::CountDistinct,
                        "unique_orders",
                    ),
                    AggregateColumn::new("payment_value", AggregateFunction::Sum, "total_value"),
                    AggregateColumn::new("payment_value", AggregateFunction::Mean, "avg_value"),
                    AggregateColumn::new("payment_value", AggregateFunction::Min, "min_value"),
                    AggregateColumn::new("payment_value", AggregateFunction::Max, "max_value"),
                    AggregateColumn::new(
                        "payment_installments",
                        AggregateFunction::Mean,
                        "avg_installments",
                    ),
                ],
                sort: vec![SortKey::desc("transaction_count")],
            },
        )?;

        let monthly_payments = aggregate(
            &fact,
            &AggregateSpec {
                group_by: vec!["year_month".into(), "payment_type".into()],
                aggregates: vec![
                    AggregateColumn::new("order_id", AggregateFunction::Count, "transaction_count"),
                    AggregateColumn::new("payment_value", AggregateFunction::Sum, "total_value"),
                    AggregateColumn::new("payment_value", AggregateFunction::Mean, "avg_value"),
                    AggregateColumn::new(
                        "payment_installments",
                        AggregateFunction::Mean,
                        "avg_installments",
                    ),
                ],
                sort: vec![SortKey::asc("year_month"), SortKey::asc("payment_type")],
            },
        )?;

        let installment_patterns = aggregate(
            &fact,
            &AggregateSpec {
                group_by: vec!["payment_range".into(), "installment_category".into()],
                aggregates: vec![
                    AggregateColumn::new("order_id", AggregateFunction::Count, "transaction_count"),
                    AggregateColumn::new(
                        "payment_installments",
                        AggregateFunction::Mean,
                        "avg_installments",
                    ),
                    AggregateColumn::new("payment_value", AggregateFunction::Sum, "total_value"),
                    AggregateColumn::new("payment_value", AggregateFunction::Mean, "avg_value"),
                ],
                sort: vec![
                    SortKey::asc("payment_range"),
                    SortKey::asc("installment_category"),
                ],
            },
        )?;

        let hourly_patterns = aggregate(
            &fact,
            &AggregateSpec {
                group_by: vec!["hour".into(), "payment_type".into()],
                aggregates: vec![
                    AggregateColumn::new("order_id", AggregateFunction::Count, "transaction_count"),
                    AggregateColumn::new("payment_value", AggregateFunction::Mean, "avg_value"),
                ],
                sort: vec![SortKey::asc("hour"), SortKey::asc("payment_type")],
            },
        )?;

        let cash_flow = aggregate(
            &fact,
            &AggregateSpec {
                group_by: vec!["year_month".into(), "payment_type".into()],
                aggregates: vec![
                    AggregateColumn::new(
                        "payment_value",
                        AggregateFunction::Sum,
                        "total_order_value",
                    ),
                    AggregateColumn::new(
                        "monthly_installment_amount",
                        AggregateFunction::Sum,
                        "estimated_monthly_cash_inflow",
                    ),
                    AggregateColumn::new("order_id", AggregateFunction::Count, "transaction_count"),
                    AggregateColumn::new(
                        "payment_installments",
                        AggregateFunction::Mean,
                        "avg_installments",
                    ),
                ],
                sort: vec![SortKey::asc("year_month"), SortKey::asc("payment_type")],
            },
        )?;

        let trends = window::with_cumulative_sum(
            &monthly_payments,
            "payment_type",
            "year_month",
            "total_value",
            "cumulative_value",
        )?;
        let trends = window::with_moving_average(
            &trends,
            "payment_type",
            "year_month",
            "total_value",
            3,
            "moving_avg_3month",
        )?;
        let growth = window::with_growth_rate(
            &trends,
            "payment_type",
            "year_month",
            "total_value",
            "prev_month_value",
            "growth_rate",
        )?;

        Ok(vec![
            NamedResult {
                table: ctx.config.table("payment_type_summary"),
                frame: payment_types,
            },
            NamedResult {
                table: ctx.config.table("payment_monthly_trends"),
                frame: monthly_payments,
            },
            NamedResult {
                table: ctx.config.table("installment_patterns"),
                frame: installment_patterns,
            },
            NamedResult {
                table: ctx.config.table("hourly_payment_patterns"),
                frame: hourly_patterns,
            },
            NamedResult {
                table: ctx.config.table("payment_cash_flow"),
                frame: cash_flow,
            },
            NamedResult {
                table: ctx.config.table("payment_growth_trends"),
                frame: growth,
            },
        ])
    }
}
