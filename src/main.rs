use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use peak_alloc::PeakAlloc;
use spliceprep::options::{Normalization, ReshapeOptions, RowAlignment, ValidateOptions};
use spliceprep::spliceprep_utils::{DEFAULT_FILTERED_EVENTS_NAME, DEFAULT_TIMEPOINTS};
use spliceprep::{filter_events, merge_replicates, validate, MatrixKind, ReplicateMatrix};
use std::fs;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[global_allocator]
static PEAK_ALLOC: PeakAlloc = PeakAlloc;

#[derive(Debug, Parser)]
#[command(
    name = "spliceprep",
    version,
    about = "Reconcile replicate TPM/PSI matrices and splicing events before differential splicing analysis"
)]
struct Cli {
    /// Only log warnings and errors
    #[arg(long, global = true, default_value_t = false)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Keep the events whose transcripts are quantified in every replicate
    FilterEvents(FilterEventsArgs),
    /// Reshape replicate PSI and TPM matrices into one table per timepoint
    MergeReplicates(MergeReplicatesArgs),
    /// Check raw TPM files for two columns and numeric values
    CheckTpm(CheckTpmArgs),
}

#[derive(Debug, Args)]
struct FilterEventsArgs {
    #[arg(long, help = "Combined events.ioe file")]
    events_ioe: PathBuf,

    #[arg(long, help = "TPM matrix of replicate A")]
    tpm_a: PathBuf,

    #[arg(long, help = "TPM matrix of replicate B")]
    tpm_b: PathBuf,

    #[arg(long, help = "TPM matrix of replicate C")]
    tpm_c: PathBuf,

    #[arg(long, help = "Output directory, created if missing")]
    out_dir: PathBuf,

    #[arg(long, default_value = DEFAULT_FILTERED_EVENTS_NAME)]
    out_name: String,

    #[arg(long, value_enum, default_value_t = Normalization::Exact, help = "How transcript identifiers are compared")]
    normalize: Normalization,
}

#[derive(Debug, Args)]
struct MergeReplicatesArgs {
    #[arg(long)]
    psi_a: PathBuf,

    #[arg(long)]
    psi_b: PathBuf,

    #[arg(long)]
    psi_c: PathBuf,

    #[arg(long)]
    tpm_a: PathBuf,

    #[arg(long)]
    tpm_b: PathBuf,

    #[arg(long)]
    tpm_c: PathBuf,

    #[arg(long, help = "Output directory of the per-timepoint PSI tables")]
    out_psi_dir: PathBuf,

    #[arg(long, help = "Output directory of the per-timepoint TPM tables")]
    out_tpm_dir: PathBuf,

    #[arg(long, default_value = DEFAULT_TIMEPOINTS, help = "Comma-separated timepoint labels, in column order")]
    timepoints: String,

    #[arg(long, default_value = "A,B,C", help = "Comma-separated replicate prefixes, in input order")]
    replicate_prefixes: String,

    #[arg(long, value_enum, default_value_t = RowAlignment::Strict, help = "How replicate rows are matched up")]
    alignment: RowAlignment,
}

#[derive(Debug, Args)]
struct CheckTpmArgs {
    #[arg(long, help = "Directory holding the TPM files")]
    input_dir: PathBuf,

    #[arg(long, default_value = "*.tpm", help = "Shell-style pattern of the file names to check")]
    pattern: String,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let level = if cli.quiet { "warn" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();

    let start = Instant::now();
    info!("Started");
    match cli.command {
        Commands::FilterEvents(args) => run_filter_events(args)?,
        Commands::MergeReplicates(args) => run_merge_replicates(args)?,
        Commands::CheckTpm(args) => run_check_tpm(args)?,
    }
    info!("Completed in {:?}", start.elapsed());
    debug!("Peak memory usage: {:.2} MB", PEAK_ALLOC.peak_usage_as_mb());
    Ok(())
}

fn run_filter_events(args: FilterEventsArgs) -> anyhow::Result<()> {
    fs::create_dir_all(&args.out_dir).with_context(|| {
        format!(
            "Could not create the output directory {}",
            args.out_dir.display()
        )
    })?;
    let tpm_files = [("A", args.tpm_a), ("B", args.tpm_b), ("C", args.tpm_c)];
    let out_path = args.out_dir.join(&args.out_name);
    let summary = filter_events(&args.events_ioe, &tpm_files, &out_path, args.normalize)?;
    print!("{}", summary);
    Ok(())
}

fn run_merge_replicates(args: MergeReplicatesArgs) -> anyhow::Result<()> {
    let opts = ReshapeOptions::from_lists(&args.timepoints, &args.replicate_prefixes, args.alignment)?;
    let labels = opts.replicate_names();
    if labels.len() != 3 {
        anyhow::bail!(
            "Three replicate prefixes are needed for the A, B and C inputs, got {:?}.",
            labels
        )
    }

    let psi_files = [args.psi_a, args.psi_b, args.psi_c];
    let tpm_files = [args.tpm_a, args.tpm_b, args.tpm_c];
    let mut psi = Vec::with_capacity(3);
    let mut tpm = Vec::with_capacity(3);
    for ((label, p), t) in labels.iter().zip(&psi_files).zip(&tpm_files) {
        psi.push(ReplicateMatrix::from_path(p, MatrixKind::Psi, label)?);
        tpm.push(ReplicateMatrix::from_path(t, MatrixKind::Tpm, label)?);
    }

    let written = merge_replicates(&psi, &tpm, &opts, &args.out_psi_dir, &args.out_tpm_dir)?;
    for p in written {
        println!("Saved {}", p.display());
    }
    Ok(())
}

fn run_check_tpm(args: CheckTpmArgs) -> anyhow::Result<()> {
    let reports = validate::validate_dir(&args.input_dir, &ValidateOptions::new(args.pattern))?;
    for r in &reports {
        println!("\n{}", r);
    }
    let n_passed = reports.iter().filter(|r| r.passed()).count();
    println!("{} of {} file(s) passed.", n_passed, reports.len());
    Ok(())
}
