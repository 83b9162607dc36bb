//! codediff: compare generated kernels between two compiler test runs
//!
//! A test harness captures one command's output into a run directory: its
//! stdout log, the CUDA source of every kernel the compiler generated, and
//! optionally their PTX. codediff parses such directories, lines kernels up
//! test by test, and reports which ones changed.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────┐   ┌─────────────┐   ┌──────────────┐
//! │ run dir      │   │ TestRun     │   │ DiffEngine  │   │ Report       │
//! │ stdout, cuda/│──►│ (LogParser, │──►│ (normalize, │──►│ Generator    │
//! │ ptx/, ...    │   │  preamble)  │   │  unified)   │   │ (HTML)       │
//! └──────────────┘   └─────────────┘   └─────────────┘   └──────────────┘
//!                          │ join (shards)    │ exit 1 on differences
//! ```
//!
//! # Example
//!
//! ```no_run
//! use codediff::{DiffEngine, InclusionCriterion, TestRun};
//!
//! # fn main() -> codediff::CodediffResult<()> {
//! let baseline = TestRun::from_dir("runs/main")?;
//! let candidate = TestRun::from_dir("runs/feature")?;
//! let result = DiffEngine::new(InclusionCriterion::MismatchedCudaOrPtx)
//!     .compare(&baseline, &candidate)?;
//! if result.has_differences() {
//!     println!("{} kernels changed", result.total_num_diffs);
//! }
//! # Ok(())
//! # }
//! ```

#![cfg_attr(test, allow(clippy::large_stack_arrays, clippy::large_stack_frames))]

/// Run comparison
pub mod diff;
/// Git revision metadata
pub mod git;
/// Kernel and test records
pub mod kernel;
/// Stdout log parsing
pub mod log_parser;
/// Source and PTX normalization
pub mod normalize;
/// JSON persistence
pub mod persist;
/// HTML reports
pub mod report;
mod result;
/// Captured runs
pub mod run;

#[cfg(test)]
mod testing;

pub use diff::{
    unified_diff, DiffEngine, InclusionCriterion, KernelDiff, TestDiff, TestDifferences, UnifiedDiff,
};
pub use git::{GitCommand, GitQuery, GitRev};
pub use kernel::{
    BenchmarkResult, CompiledKernel, CompiledTest, KernelBody, KernelCompilationStats, LaunchParams,
    UNGROUPED_KERNELS,
};
pub use log_parser::{CommandType, KernelMap, LogParser};
pub use normalize::{Normalize, PtxNormalizer, SourceNormalizer};
pub use persist::{load_json, save_json};
pub use report::{ReportGenerator, ReportOptions};
pub use result::{CodediffError, CodediffResult};
pub use run::TestRun;
