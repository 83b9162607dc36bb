//! CLI command definitions using clap

use clap::{Parser, Subcommand, ValueEnum};
use codediff::report::{DEFAULT_EXPLAIN_API_URL, DEFAULT_MAX_DIFFS};
use codediff::InclusionCriterion;
use std::path::PathBuf;

/// codediff: compare generated kernels between two compiler test runs
#[derive(Parser, Debug)]
#[command(name = "codediff")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, value_enum, default_value_t = ColorArg::Auto, global = true)]
    pub color: ColorArg,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Parse a run directory into a JSON file
    Parse(ParseArgs),

    /// Concatenate shard JSONs as if they came from a single command
    Join(JoinArgs),

    /// Compute the difference between two parsed runs
    ///
    /// Exits with status 1 if any test differs or the preambles differ.
    Diff(DiffArgs),

    /// Render an HTML report from a diff JSON
    #[command(name = "diff_report")]
    DiffReport(DiffReportArgs),
}

/// Arguments for the parse command
#[derive(Parser, Debug)]
pub struct ParseArgs {
    /// Directory containing 'stdout' and 'cuda/' written by the test harness
    pub dir: PathBuf,

    /// Location to write the JSON file
    pub output_json: PathBuf,
}

/// Arguments for the join command
#[derive(Parser, Debug)]
pub struct JoinArgs {
    /// Location to write the concatenated JSON file
    #[arg(short, long)]
    pub output: PathBuf,

    /// Shard JSON files, joined in the order given
    #[arg(required = true)]
    pub input_jsons: Vec<PathBuf>,
}

/// Arguments for the diff command
#[derive(Parser, Debug)]
pub struct DiffArgs {
    /// Which kernel pairs to include
    #[arg(
        short = 'i',
        long,
        value_enum,
        default_value_t = CriterionArg::MismatchedCudaOrPtx
    )]
    pub kernel_inclusion_criterion: CriterionArg,

    /// Do not print diffs to stdout
    #[arg(long, visible_alias = "no-print-diff")]
    pub hide_diffs: bool,

    /// Baseline run JSON
    pub input_json1: PathBuf,

    /// Run JSON to compare against the baseline
    pub input_json2: PathBuf,

    /// Location to write the diff JSON
    pub output_json: PathBuf,
}

/// Arguments for the diff_report command
#[derive(Parser, Debug)]
pub struct DiffReportArgs {
    /// Hide environment variables and nvcc versions
    #[arg(long)]
    pub hide_env: bool,

    /// Render at most this many kernel diffs (does not affect exit codes)
    #[arg(long, default_value_t = DEFAULT_MAX_DIFFS)]
    pub max_diffs: usize,

    /// Leave the preamble out of the report
    #[arg(long)]
    pub omit_preamble: bool,

    /// Endpoint embedded for the report's "explain diff" tooling
    #[arg(long, env = "CODEDIFF_EXPLAIN_API_URL", default_value = DEFAULT_EXPLAIN_API_URL)]
    pub explain_api_url: String,

    /// Diff JSON written by `codediff diff`
    pub input_json: PathBuf,

    /// Location to write the HTML report
    pub output_html: PathBuf,
}

/// Kernel inclusion criterion argument
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CriterionArg {
    /// Every kernel of every matched test
    #[value(name = "all")]
    All,
    /// Kernels whose CUDA or PTX differs
    #[default]
    #[value(name = "mismatched_cuda_or_ptx")]
    MismatchedCudaOrPtx,
    /// Kernels whose PTX differs
    #[value(name = "mismatched_ptx")]
    MismatchedPtx,
}

impl From<CriterionArg> for InclusionCriterion {
    fn from(arg: CriterionArg) -> Self {
        match arg {
            CriterionArg::All => Self::All,
            CriterionArg::MismatchedCudaOrPtx => Self::MismatchedCudaOrPtx,
            CriterionArg::MismatchedPtx => Self::MismatchedPtx,
        }
    }
}

/// Color argument for CLI
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ColorArg {
    /// Automatic color detection
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl From<ColorArg> for crate::config::ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}
