//! Build the wide per-policy prediction table
//!
//! One row per policy (optionally per effective year) with summed KPIs,
//! representative features, claim flags and projected metrics, plus the
//! flattened per-year allocation table. Checks that aggregation lost no
//! premium or claim cost and prints the conservation report.

use std::fs::File;
use std::path::PathBuf;

use anyhow::Context;
use chrono::{Datelike, NaiveDate};
use clap::Parser;

use pricing_engine::adjust::{inflate_claims, inflate_portfolio, InflationConfig};
use pricing_engine::allocation::{derive_portfolio_years, write_portfolio_csv};
use pricing_engine::analysis::{build_table, AnalysisMode, AnalysisRequest, YearLevel};
use pricing_engine::portfolio::{load_claims, load_portfolio};
use pricing_engine::{AllocationConfig, ColumnSchema, PortfolioShape};

#[derive(Parser, Debug)]
#[command(
    name = "build_prediction_table",
    about = "Per-policy prediction table with conservation check"
)]
struct Args {
    #[arg(long)]
    portfolio: PathBuf,

    #[arg(long)]
    claims: PathBuf,

    /// First calendar year of business production
    #[arg(long)]
    start_year: i32,

    /// Data extraction date, in the input date format
    #[arg(long)]
    extraction_date: String,

    /// One row per full contract instead of per contract-year amendment
    #[arg(long)]
    row_per_contract: bool,

    /// Key rows by (policy, effective year) instead of policy alone
    #[arg(long)]
    per_effective_year: bool,

    /// Compound annual inflation rate for as-if rebasing
    #[arg(long, default_value_t = 0.0)]
    inflation_rate: f64,

    /// Feature columns carried onto the prediction rows (repeatable)
    #[arg(long = "feature")]
    features: Vec<String>,

    /// Output CSV for the prediction table
    #[arg(long, default_value = "prediction_table.csv")]
    output: PathBuf,

    /// Optional output CSV for the flattened per-year allocation
    #[arg(long)]
    allocation_output: Option<PathBuf>,

    /// chrono format of the date columns
    #[arg(long, default_value = "%d/%m/%Y")]
    date_format: String,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut schema = ColumnSchema::default();
    schema.date_format = args.date_format.clone();
    schema.feature_columns = args.features.clone();

    let extraction_date = NaiveDate::parse_from_str(&args.extraction_date, &schema.date_format)
        .with_context(|| format!("Bad extraction date '{}'", args.extraction_date))?;

    let policies = load_portfolio(&args.portfolio, &schema)
        .map_err(|e| anyhow::anyhow!("Loading portfolio: {e}"))?;
    let claims =
        load_claims(&args.claims, &schema).map_err(|e| anyhow::anyhow!("Loading claims: {e}"))?;

    let mut inflation = InflationConfig::new(args.inflation_rate, extraction_date.year());
    inflation.latest_premium = args.row_per_contract;
    let policies = inflate_portfolio(&policies, &inflation);
    let claims = inflate_claims(&claims, &inflation);

    let config = AllocationConfig {
        start_business_year: args.start_year,
        extraction_date,
        shape: if args.row_per_contract {
            PortfolioShape::RowPerContract
        } else {
            PortfolioShape::RowPerContractYear
        },
        add_one_day: true,
    };
    let portfolio = derive_portfolio_years(&policies, &config);

    let level = if args.per_effective_year {
        YearLevel::Effective
    } else {
        YearLevel::Inception
    };
    let request = AnalysisRequest::new(AnalysisMode::PredictionTable { level });
    let table = build_table(&portfolio, &claims, &config, &schema, &request)?;

    let file = File::create(&args.output)
        .with_context(|| format!("Creating {}", args.output.display()))?;
    table
        .write_csv(file)
        .map_err(|e| anyhow::anyhow!("Writing {}: {e}", args.output.display()))?;
    println!(
        "Wrote {} prediction rows to {}",
        table.rows.len(),
        args.output.display()
    );

    if let Some(path) = &args.allocation_output {
        let file =
            File::create(path).with_context(|| format!("Creating {}", path.display()))?;
        write_portfolio_csv(&portfolio, &config, file)
            .map_err(|e| anyhow::anyhow!("Writing {}: {e}", path.display()))?;
        println!("Wrote per-year allocation to {}", path.display());
    }

    // Conservation report: what went in must come out
    if let Some(report) = &table.conservation {
        println!("\nConservation check:");
        println!(
            "  earned premium: {:.2} in, {:.2} out (delta {:+.2})",
            report.premium_in,
            report.premium_out,
            report.premium_delta()
        );
        println!(
            "  capped cost:    {:.2} in, {:.2} out (delta {:+.2})",
            report.cost_in,
            report.cost_out,
            report.cost_delta()
        );
        println!(
            "  {}",
            if report.is_balanced() {
                "balanced"
            } else {
                "MISMATCH - see warnings above"
            }
        );
    }

    Ok(())
}
