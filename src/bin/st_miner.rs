use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::Parser;
use miette::IntoDiagnostic;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use st_data_miner::aggregator::{Aggregator, build_plans};
use st_data_miner::config::{ConfigLoader, ConfigOverrides};
use st_data_miner::domain::SourceKind;
use st_data_miner::error::MinerError;
use st_data_miner::output::{
    JsonOutput, OutputMode, ReportFormat, RunSummary, print_run_summary, write_workbook,
};
use st_data_miner::report::{OrganizeBy, build_workbook};

#[derive(Parser)]
#[command(name = "st-miner")]
#[command(about = "Collect spatial transcriptomics datasets from NCBI GEO, 10x Genomics and HTAN")]
#[command(version, author)]
struct Cli {
    /// Source to include; repeat for several. Defaults to all of them.
    #[arg(long = "source", value_enum)]
    sources: Vec<SourceKind>,

    /// GEO DataSets search expression.
    #[arg(long)]
    query: Option<String>,

    #[arg(long)]
    max_results: Option<usize>,

    /// Contact address forwarded to NCBI.
    #[arg(long)]
    email: Option<String>,

    #[arg(long)]
    config: Option<String>,

    /// Report path. Defaults to spatial_transcriptomics_catalog.<format>.
    #[arg(long)]
    output: Option<Utf8PathBuf>,

    #[arg(long, value_enum, default_value_t = ReportFormat::Xlsx)]
    format: ReportFormat,

    #[arg(long, value_enum, default_value_t = OrganizeBy::Both)]
    organize_by: OrganizeBy,

    /// Skip the live registry and use curated catalogs only.
    #[arg(long)]
    offline: bool,

    /// Accept an empty live result instead of falling back to the curated list.
    #[arg(long)]
    no_empty_fallback: bool,

    #[arg(long)]
    curated_dir: Option<String>,

    #[arg(long)]
    non_interactive: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(miner) = report.downcast_ref::<MinerError>() {
            return ExitCode::from(map_exit_code(miner));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &MinerError) -> u8 {
    match error {
        MinerError::Configuration(_) | MinerError::ConfigRead(_) | MinerError::ConfigParse(_) => 2,
        MinerError::AllSourcesFailed => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let overrides = ConfigOverrides {
        sources: (!cli.sources.is_empty()).then(|| cli.sources.clone()),
        query: cli.query.clone(),
        max_results: cli.max_results,
        email: cli.email.clone(),
        offline: cli.offline,
        no_empty_fallback: cli.no_empty_fallback,
        curated_dir: cli.curated_dir.clone(),
    };
    let config = ConfigLoader::resolve(cli.config.as_deref(), overrides)?;
    if config.live_enabled() && config.contact.email.is_none() {
        warn!("no contact email configured; NCBI asks E-utilities clients to send one");
    }
    info!(
        sources = ?config.sources,
        live = config.live_enabled(),
        max_results = config.max_results,
        "starting collection"
    );

    let plans = build_plans(&config);
    let result = Aggregator::from_config(&config)?.run(plans)?;

    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| cli.format.default_output());
    let generated_at = chrono::Utc::now().to_rfc3339();
    let workbook = build_workbook(&result, cli.organize_by, generated_at);
    write_workbook(&output, &workbook, cli.format)?;
    info!(output = %output, records = result.records.len(), "report written");

    let summary = RunSummary::new(&output, cli.format, &result, &workbook);
    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_summary(&summary).into_diagnostic(),
        OutputMode::Interactive => {
            print_run_summary(&summary);
            Ok(())
        }
    }
}
