use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

use ubiome_tree::alignment_stats::alignment_report;
use ubiome_tree::{build_phylogeny, RunConfig};

/// Aggregate per-sample taxon counts into a phylogeny and report how many
/// reads stop at each taxonomic rank.
#[derive(Parser, Debug)]
#[command(name = "ubiome-tree", version, about)]
struct Args {
    /// Run metadata (TOML): samples, taxa_hierarchy, taxa_offset, ...
    #[arg(long)]
    config: PathBuf,

    /// Taxa hierarchy file, one lineage per line (.gz allowed)
    #[arg(long)]
    hierarchy: PathBuf,

    /// Raw count files, one per sample and rank
    #[arg(long, num_args = 1.., required = true)]
    counts: Vec<PathBuf>,

    /// Normalized count tables, one per rank
    #[arg(long, num_args = 1..)]
    norm: Vec<PathBuf>,

    /// Per-sample alignment-stat files with total read counts
    #[arg(long = "align-stats", num_args = 1..)]
    align_stats: Vec<PathBuf>,

    /// Write the alignment summary here instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,

    /// Print the tree's lineage dump to stderr
    #[arg(long)]
    dump_tree: bool,
}

fn spinner(color: &str, msg: &'static str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .tick_strings(&[
                "⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏",
            ])
            .template(&format!("{{spinner:.{}}} {{msg}}", color))
            .expect("Invalid spinner template"),
    );
    spinner.set_message(msg);
    spinner
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    // 1. Metadata
    let config = RunConfig::from_file(&args.config)?;

    // 2. Tree + both aggregation passes
    let spinner_build = spinner("green", "Building phylogeny and aggregating counts...");
    let run = build_phylogeny(config, &args.hierarchy, &args.counts, &args.norm);
    let run = match run {
        Ok(run) => run,
        Err(e) => {
            spinner_build.abandon_with_message("Aggregation failed.");
            return Err(e.into());
        }
    };
    spinner_build.finish_with_message(format!(
        "Aggregated {} taxa over {} samples.",
        run.tree.len(),
        run.samples.len()
    ));

    if args.dump_tree {
        eprint!("{}", run.get_tree_text());
    }

    // 3. Alignment summary
    if args.align_stats.is_empty() {
        log::warn!("No alignment-stat files given; skipping alignment summary");
        return Ok(());
    }
    let spinner_report = spinner("yellow", "Summarizing alignment statistics...");
    let rows = run.alignment_summary(&args.align_stats)?;
    let report = alignment_report(&run.tree, &rows);
    match &args.output {
        Some(path) => fs::write(path, report)?,
        None => print!("{}", report),
    }
    spinner_report.finish_with_message("Alignment summary written.");
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
