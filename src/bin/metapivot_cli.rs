use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use metapivot::config::{default_threads, PipelineConfig, TieBreak};
use metapivot::error::PivotError;
use metapivot::logging::init_logger;
use metapivot::{convert_alignments, default_prefix, parse_reference_table, profile_alignments};

#[derive(Parser)]
#[command(name = "metapivot", version, about = "Strain and species abundance profiling from read alignments")]
struct Cli {
    /// Log progress at info level
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode an alignment file into a summary file
    Convert(ConvertArgs),
    /// Strain and species reports from a summary file
    Profile(ProfileArgs),
}

#[derive(Args)]
struct ConvertArgs {
    /// Reference table (gid,tid,length,bin_start,bin_end,strain,species)
    #[arg(long)]
    table: PathBuf,

    /// Alignment file, optionally gzipped
    #[arg(long)]
    input: PathBuf,

    #[arg(long)]
    output: PathBuf,

    #[arg(long, default_value_t = default_threads())]
    threads: usize,
}

#[derive(Args)]
struct ProfileArgs {
    #[arg(long)]
    table: PathBuf,

    /// Summary file written by `convert`
    #[arg(long)]
    input: PathBuf,

    /// Report prefix; defaults to the input path cut at the first '.' of its name
    #[arg(long)]
    prefix: Option<PathBuf>,

    #[arg(long, default_value_t = default_threads())]
    threads: usize,

    #[arg(long, default_value_t = metapivot::config::STRAIN_MIN_IDENTITY)]
    strain_min_identity: f64,

    #[arg(long, default_value_t = metapivot::config::SPECIES_MIN_WSEI)]
    species_min_wsei: f64,

    #[arg(long, default_value_t = metapivot::config::READ_MIN_IDENTITY)]
    read_min_identity: f64,

    /// On exact ties keep the alignment appearing later in the file,
    /// independent of thread scheduling
    #[arg(long, default_value_t = false)]
    deterministic_ties: bool,
}

fn spinner(color: &str, msg: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    let template = format!("{{spinner:.{color}}} {{msg}}");
    if let Ok(style) = ProgressStyle::default_spinner().template(&template) {
        spinner.set_style(style.tick_strings(&[
            "⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏",
        ]));
    }
    spinner.set_message(msg.to_string());
    spinner
}

fn run_convert(args: ConvertArgs) -> Result<(), PivotError> {
    let sp = spinner("blue", "Loading reference table...");
    let table = parse_reference_table(&args.table)?;
    sp.finish_with_message(format!("Loaded {} reference genomes.", table.len()));

    let sp = spinner("green", "Converting alignments...");
    let stats = convert_alignments(&table, &args.input, &args.output, args.threads)?;
    sp.finish_with_message(format!(
        "Wrote {} of {} alignments to {}.",
        stats.kept,
        stats.lines,
        args.output.display()
    ));
    Ok(())
}

fn run_profile(args: ProfileArgs) -> Result<(), PivotError> {
    let sp = spinner("blue", "Loading reference table...");
    let table = parse_reference_table(&args.table)?;
    sp.finish_with_message(format!("Loaded {} reference genomes.", table.len()));

    let mut config = PipelineConfig::default().with_threads(args.threads);
    config.strain_min_identity = args.strain_min_identity;
    config.species_min_wsei = args.species_min_wsei;
    config.read_min_identity = args.read_min_identity;
    if args.deterministic_ties {
        config = config.with_tie_break(TieBreak::LastInFile);
    }

    let sp = spinner("green", "Strain and species level assignment...");
    let results = profile_alignments(&table, &args.input, &config)?;
    sp.finish_with_message(format!(
        "{} taxa, {} species, {} reads assigned.",
        results.strain_rows.len(),
        results.species_rows.len(),
        results.read_rows.len()
    ));

    let sp = spinner("yellow", "Writing reports...");
    let prefix = args.prefix.unwrap_or_else(|| default_prefix(&args.input));
    let paths = results.write_reports(&prefix)?;
    sp.finish_with_message(format!(
        "Reports written: {}, {}, {}",
        paths.strain.display(),
        paths.species.display(),
        paths.assignment.display()
    ));
    Ok(())
}

fn exit_code(err: &PivotError) -> ExitCode {
    match err {
        PivotError::ReferenceTable { .. } | PivotError::EmptyReferenceTable => ExitCode::from(2),
        PivotError::Io { .. } | PivotError::ThreadPool(_) => ExitCode::from(1),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    let result = match cli.command {
        Commands::Convert(args) => run_convert(args),
        Commands::Profile(args) => run_profile(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            exit_code(&e)
        }
    }
}
