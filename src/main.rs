//! Pricing Engine CLI
//!
//! Loads portfolio and claim CSVs, rebases for inflation, allocates exposure
//! and premium into calendar years, and writes the year/feature analysis
//! tables as CSV.

use std::fs::File;
use std::path::PathBuf;

use anyhow::Context;
use chrono::{Datelike, NaiveDate};
use clap::Parser;

use pricing_engine::adjust::{inflate_claims, inflate_portfolio, InflationConfig};
use pricing_engine::allocation::derive_portfolio_years;
use pricing_engine::analysis::{
    run_all_analysis_by_year, run_analysis_by_feature, AnalysisMode, AnalysisRequest,
    AnalysisTable, LossTriangle, ProjectionParams, YearLevel,
};
use pricing_engine::portfolio::{load_claims, load_portfolio};
use pricing_engine::{AllocationConfig, ColumnSchema, PortfolioShape};

#[derive(Parser, Debug)]
#[command(name = "pricing_engine", about = "Portfolio risk-performance analysis")]
struct Args {
    /// Portfolio CSV path
    #[arg(long)]
    portfolio: PathBuf,

    /// Claims CSV path
    #[arg(long)]
    claims: PathBuf,

    /// First calendar year of business production
    #[arg(long)]
    start_year: i32,

    /// Data extraction date, in the input date format
    #[arg(long)]
    extraction_date: String,

    /// The portfolio has one row per full contract instead of one row per
    /// contract-year amendment
    #[arg(long)]
    row_per_contract: bool,

    /// Compound annual inflation rate for as-if rebasing
    #[arg(long, default_value_t = 0.0)]
    inflation_rate: f64,

    /// Target loss ratio for the proposed premium
    #[arg(long, default_value_t = 1.0)]
    target_loss_ratio: f64,

    /// Relative large-loss loading above the cap
    #[arg(long, default_value_t = 0.0)]
    large_loss_loading: f64,

    #[arg(long, default_value_t = 0.0)]
    current_commission: f64,

    #[arg(long, default_value_t = 0.0)]
    new_commission: f64,

    /// Portfolio feature column to analyze (repeatable)
    #[arg(long = "feature")]
    features: Vec<String>,

    /// Claim attribute column to analyze (repeatable)
    #[arg(long = "attribute")]
    attributes: Vec<String>,

    /// IBNR triangle JSON (metric name to incremental series)
    #[arg(long)]
    triangle: Option<PathBuf>,

    /// Directory for the output CSV tables
    #[arg(long, default_value = "analysis_output")]
    output_dir: PathBuf,

    /// chrono format of the date columns
    #[arg(long, default_value = "%d/%m/%Y")]
    date_format: String,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    println!("Pricing Engine v0.1.0");
    println!("=====================\n");

    let mut schema = ColumnSchema::default();
    schema.date_format = args.date_format.clone();
    schema.feature_columns = args.features.clone();
    schema.attribute_columns = args.attributes.clone();

    let extraction_date = NaiveDate::parse_from_str(&args.extraction_date, &schema.date_format)
        .with_context(|| format!("Bad extraction date '{}'", args.extraction_date))?;

    let policies = load_portfolio(&args.portfolio, &schema)
        .map_err(|e| anyhow::anyhow!("Loading portfolio: {e}"))?;
    let claims =
        load_claims(&args.claims, &schema).map_err(|e| anyhow::anyhow!("Loading claims: {e}"))?;
    println!(
        "Loaded {} policy rows and {} claims",
        policies.len(),
        claims.len()
    );

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

    let triangle = match &args.triangle {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("Opening triangle {}", path.display()))?;
            Some(
                LossTriangle::from_json_reader(file)
                    .map_err(|e| anyhow::anyhow!("Reading triangle: {e}"))?,
            )
        }
        None => None,
    };

    let mut request = AnalysisRequest::new(AnalysisMode::YearSummary {
        level: YearLevel::Occurrence,
        features: Vec::new(),
        attributes: Vec::new(),
    });
    request.params = ProjectionParams {
        target_loss_ratio: args.target_loss_ratio,
        large_loss_loading: args.large_loss_loading,
        current_commission: args.current_commission,
        new_commission: args.new_commission,
    };
    request.triangle = triangle;

    let years = run_all_analysis_by_year(&portfolio, &claims, &config, &schema, &[], &[], &request)?;

    // Console summary of the occurrence-year table
    println!("\nRisk performance by occurrence year:");
    println!(
        "{:>16} {:>12} {:>16} {:>16} {:>12} {:>12}",
        "occurrence_year", "exposure", "earned_premium", "capped_cost", "claims", "loss_ratio"
    );
    println!("{}", "-".repeat(90));
    for row in &years.occurrence.rows {
        let label = match row.key().and_then(|k| k.year) {
            Some(year) => year.to_string(),
            None => "Total".to_string(),
        };
        let loss_ratio = row
            .derived
            .as_ref()
            .map(|d| d.projected_capped_loss_ratio)
            .unwrap_or(f64::NAN);
        println!(
            "{:>16} {:>12.4} {:>16.2} {:>16.2} {:>12.1} {:>12.4}",
            label,
            row.kpis.exposure,
            row.kpis.earned_premium,
            row.kpis.capped_cost,
            row.kpis.claim_count,
            loss_ratio,
        );
    }

    std::fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("Creating {}", args.output_dir.display()))?;
    write_table(&args.output_dir, "by_occurrence_year.csv", &years.occurrence)?;
    write_table(&args.output_dir, "by_inception_year.csv", &years.inception)?;
    write_table(&args.output_dir, "by_effective_year.csv", &years.effective)?;

    if !args.features.is_empty() {
        let tables = run_analysis_by_feature(
            &portfolio,
            &claims,
            &config,
            &schema,
            &args.features,
            &args.attributes,
            &request,
        )?;
        for (feature, table) in &tables {
            write_table(&args.output_dir, &format!("by_{}.csv", feature), table)?;
        }
        println!("\nWrote {} feature tables", tables.len());
    } else if !args.attributes.is_empty() {
        // Claim-attribute-only summary with the portfolio broadcast against it
        let attr_request = AnalysisRequest {
            mode: AnalysisMode::FeatureSummary {
                features: Vec::new(),
                attributes: args.attributes.clone(),
            },
            ..request.clone()
        };
        let table =
            pricing_engine::analysis::build_table(&portfolio, &claims, &config, &schema, &attr_request)?;
        write_table(&args.output_dir, "by_claim_attributes.csv", &table)?;
    }

    println!("\nResults written to: {}", args.output_dir.display());
    Ok(())
}

fn write_table(dir: &std::path::Path, name: &str, table: &AnalysisTable) -> anyhow::Result<()> {
    let path = dir.join(name);
    let file = File::create(&path).with_context(|| format!("Creating {}", path.display()))?;
    table
        .write_csv(file)
        .map_err(|e| anyhow::anyhow!("Writing {}: {e}", path.display()))
}
