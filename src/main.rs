use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod cohort;
mod conversion;
mod ingest;
mod linker;
mod metrics;
mod models;
mod normalize;
mod pipeline;
mod report;
mod retention;
mod rollup;

#[derive(Parser)]
#[command(name = "studio-cohort-metrics")]
#[command(about = "Reconciles intake, attendance, and sales data into per-staff cohort metrics", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline and write the full result as JSON
    Run {
        #[arg(long)]
        intake: PathBuf,
        #[arg(long)]
        attendance: PathBuf,
        #[arg(long)]
        sales: PathBuf,
        /// Output path; stdout when omitted
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Run the pipeline and write a markdown summary
    Report {
        #[arg(long)]
        intake: PathBuf,
        #[arg(long)]
        attendance: PathBuf,
        #[arg(long)]
        sales: PathBuf,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("studio_cohort_metrics=info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            intake,
            attendance,
            sales,
            out,
        } => {
            let result = run_pipeline(&intake, &attendance, &sales)?;
            let json =
                serde_json::to_string_pretty(&result).map_err(pipeline::PipelineError::Json)?;
            match out {
                Some(path) => {
                    std::fs::write(&path, json)?;
                    println!("Result written to {}.", path.display());
                }
                None => println!("{json}"),
            }
        }
        Commands::Report {
            intake,
            attendance,
            sales,
            out,
        } => {
            let result = run_pipeline(&intake, &attendance, &sales)?;
            std::fs::write(&out, report::build_report(&result))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

fn run_pipeline(
    intake: &std::path::Path,
    attendance: &std::path::Path,
    sales: &std::path::Path,
) -> anyhow::Result<models::PipelineResult> {
    let intake_rows = ingest::load_intake(intake)
        .with_context(|| format!("failed to read intake file {}", intake.display()))?;
    let attendance_rows = ingest::load_attendance(attendance)
        .with_context(|| format!("failed to read attendance file {}", attendance.display()))?;
    let sale_rows = ingest::load_sales(sales)
        .with_context(|| format!("failed to read sales file {}", sales.display()))?;

    let result = pipeline::run(&intake_rows, &attendance_rows, &sale_rows, |pct, stage| {
        info!(pct, stage, "pipeline progress");
    })
    .context("pipeline run failed")?;
    Ok(result)
}
