use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use polars::prelude::DataFrame;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use olist_core::{
    all_pipeline_descriptors, pipeline_by_code, publish_results, NamedResult, RunConfig,
    RunContext, Warehouse,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Olist analytics pipeline runner", long_about = None)]
struct Cli {
    /// Path to the run configuration (TOML). Falls back to OLIST_CONFIG.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print the first N rows of each result table instead of only row counts
    #[arg(long, global = true, value_name = "N")]
    preview: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the category sales performance pipeline
    CategorySales,
    /// Run the payment behavior pipeline
    PaymentBehavior,
    /// List the available pipelines
    List,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::List => {
            for descriptor in all_pipeline_descriptors() {
                println!("{} v{}: {}", descriptor.code, descriptor.version, descriptor.description);
            }
            Ok(())
        }
        Command::CategorySales => execute("category_sales", &cli),
        Command::PaymentBehavior => execute("payment_behavior", &cli),
    }
}

fn execute(code: &str, cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;
    let pipeline = pipeline_by_code(code)
        .with_context(|| format!("no pipeline registered under '{code}'"))?;

    info!(
        pipeline = pipeline.code_identifier(),
        version = pipeline.version(),
        "starting run"
    );

    let warehouse = Warehouse::open(&config)?;
    let ctx = RunContext { config: &config };

    // The warehouse session is released on both exit paths before the
    // outcome propagates.
    let outcome = pipeline
        .run(&ctx)
        .and_then(|results| publish_results(&warehouse, &results).map(|()| results));
    match outcome {
        Ok(results) => {
            warehouse.close()?;
            report(&results, cli.preview)?;
            info!(pipeline = pipeline.code_identifier(), "run complete");
            Ok(())
        }
        Err(err) => {
            // The run error is the one worth reporting.
            if let Err(close_err) = warehouse.close() {
                warn!(error = %close_err, "failed to release warehouse session");
            }
            Err(err.into())
        }
    }
}

fn load_config(cli: &Cli) -> Result<RunConfig> {
    dotenvy::dotenv().ok();
    let path = match &cli.config {
        Some(path) => path.clone(),
        None => std::env::var("OLIST_CONFIG")
            .map(PathBuf::from)
            .context("pass --config or set OLIST_CONFIG")?,
    };
    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("reading configuration at {}", path.display()))?;
    let config: RunConfig =
        toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
    Ok(config)
}

fn report(results: &[NamedResult], preview: Option<usize>) -> Result<()> {
    for result in results {
        println!("{}: {} rows", result.table, result.frame.height());
        if let Some(rows) = preview {
            println!("{}", render_preview(&result.frame, rows)?);
        }
    }
    Ok(())
}

fn render_preview(df: &DataFrame, rows: usize) -> Result<String> {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(df.get_column_names().iter().map(|name| name.to_string()));

    for row in 0..df.height().min(rows) {
        let mut cells = Vec::with_capacity(df.width());
        for column in df.get_columns() {
            cells.push(format!("{}", column.get(row)?));
        }
        table.add_row(cells);
    }
    Ok(table.to_string())
}
