use anyhow::{Context, Result};
use archive_budget::logging::init_logging;
use archive_budget::{
    load_institutions, AmountRange, Amount, Dimension, Filter, Pipeline, PipelineConfig,
    PipelineOutput, ProjectType, QueryFacade, Snapshot,
};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser)]
#[command(name = "archive-budget")]
#[command(about = "Records-management budget pipeline: normalize, classify, aggregate")]
#[command(version)]
struct Cli {
    /// Pipeline configuration (JSON). Built-in tables when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Institution list (CSV: name, region, parent)
    #[arg(long, global = true)]
    institutions: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Quality report plus buckets for one grouping
    Summary {
        /// Budget table (CSV)
        csv: PathBuf,
        /// Grouping dimensions, comma-separated (e.g. region,project_type)
        #[arg(long, default_value = "region,project_type")]
        by: String,
    },
    /// Largest projects matching a filter
    Top {
        csv: PathBuf,
        #[arg(long, short = 'n', default_value_t = 10)]
        limit: usize,
        /// Regions to keep (repeatable)
        #[arg(long)]
        region: Vec<String>,
        /// Project types to keep, by code or Korean label (repeatable)
        #[arg(long = "type")]
        project_type: Vec<String>,
        /// Minimum amount in won
        #[arg(long)]
        min: Option<i64>,
        /// Maximum amount in won
        #[arg(long)]
        max: Option<i64>,
    },
    /// Print the built-in configuration as JSON
    DefaultConfig,
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    match &cli.command {
        Commands::Summary { csv, by } => {
            let dimensions = Dimension::parse_list(by).map_err(anyhow::Error::msg)?;
            let snapshot = build_snapshot(&cli, csv)?;
            print_summary(&snapshot, &dimensions);
        }
        Commands::Top { csv, limit, region, project_type, min, max } => {
            let filter = build_filter(region, project_type, *min, *max)?;
            let snapshot = build_snapshot(&cli, csv)?;
            print_top(&snapshot, &filter, *limit);
        }
        Commands::DefaultConfig => {
            println!("{}", serde_json::to_string_pretty(&PipelineConfig::default())?);
        }
    }

    Ok(())
}

fn build_snapshot(cli: &Cli, csv_path: &Path) -> Result<Snapshot> {
    let output = run_pipeline(cli.config.as_deref(), cli.institutions.as_deref(), csv_path)?;
    Ok(Snapshot::new(1, output))
}

fn run_pipeline(config: Option<&Path>, institutions: Option<&Path>, csv_path: &Path) -> Result<PipelineOutput> {
    let config = match config {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    };
    let pipeline = Pipeline::new(config)?;

    let institutions = match institutions {
        Some(path) => load_institutions(path, pipeline.regions())?,
        None => Vec::new(),
    };

    let file = File::open(csv_path)
        .with_context(|| format!("Failed to open CSV file: {:?}", csv_path))?;
    let output = pipeline
        .run_csv(file, &institutions)
        .with_context(|| format!("Failed to process {:?}", csv_path))?;

    info!(records = output.records.len(), token = %output.token, "Pipeline finished");
    Ok(output)
}

fn build_filter(regions: &[String], types: &[String], min: Option<i64>, max: Option<i64>) -> Result<Filter> {
    let mut filter = Filter::all();

    for region in regions {
        filter = filter.region(region.clone());
    }
    for raw in types {
        let project_type: ProjectType = raw.parse().map_err(anyhow::Error::msg)?;
        filter = filter.project_type(project_type);
    }
    if min.is_some() || max.is_some() {
        filter = filter.amount_range(AmountRange {
            min: min.map(Amount::from_won),
            max: max.map(Amount::from_won),
        });
    }

    Ok(filter)
}

fn print_summary(snapshot: &Snapshot, dimensions: &[Dimension]) {
    let query = QueryFacade::new(snapshot);
    let summary = query.summary(&Filter::all());
    let quality = snapshot.quality();

    println!("📊 Budget Summary");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Projects:      {}", summary.count);
    println!("Institutions:  {}", summary.institution_count);
    println!("Total:         {}", summary.total_amount);
    println!("Average:       {}", summary.mean_amount);
    println!("Largest:       {}", summary.max_amount);
    if summary.unpriced_count > 0 {
        println!("Unpriced:      {}", summary.unpriced_count);
    }

    println!("\n✅ Data Quality");
    println!("{}", quality.summary());
    for issue in quality.issues() {
        println!("  [{:?}] {}: {}", issue.severity, issue.field, issue.issue);
    }
    for rejection in quality.rejection_errors() {
        println!("  {}", rejection);
    }

    let names: Vec<&str> = dimensions.iter().map(|d| d.as_str()).collect();
    println!("\n📁 By {}", names.join(" × "));
    let grouping = query.aggregate(dimensions);
    for bucket in grouping.ranked() {
        println!("  {:<40} {:>6}  {}", bucket.key.join(" / "), bucket.count, bucket.sum_amount);
    }
}

fn print_top(snapshot: &Snapshot, filter: &Filter, limit: usize) {
    let query = QueryFacade::new(snapshot);

    println!("🏆 Top {} projects", limit);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for (rank, record) in query.top_projects(filter, limit).iter().enumerate() {
        println!(
            "{:>3}. {} | {} | {} | {} | {}",
            rank + 1,
            record.institution_name,
            record.region,
            record.project_type.label_kr(),
            record.project_title,
            record.amount,
        );
    }
}
