//! CLI argument definitions

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "stackbeat",
    about = "Exercise the in-process stack sampler against a synthetic runtime",
    after_help = "\
EXAMPLES:
    stackbeat                               Sample 2 worker threads for 2 seconds
    stackbeat --threads 4 --duration 5      More workers, longer window
    stackbeat --export profile.json         Also write the raw profile report"
)]
pub struct Args {
    /// How long to sample, in seconds
    #[arg(long, default_value = "2")]
    pub duration: u64,

    /// Number of worker threads to sample
    #[arg(long, default_value = "2")]
    pub threads: usize,

    /// Export the raw profile report to a file
    #[arg(long, value_name = "FILE")]
    pub export: Option<PathBuf>,

    /// Suppress the per-thread summary table
    #[arg(short, long)]
    pub quiet: bool,
}
