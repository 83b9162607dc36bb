//! Run comparison and regression gating.
//!
//! Two runs are matched test by test (by name) and kernel by kernel (by
//! position). Kernels are compared as normalized line-level unified diffs of
//! their CUDA source and, when both sides have it, their PTX. A comparison
//! fails when any test differs or the preambles differ; the CLI maps that to
//! exit code 1 for CI gating.

use crate::kernel::{CompiledKernel, CompiledTest};
use crate::normalize::{Normalize, PtxNormalizer};
use crate::result::CodediffResult;
use crate::run::TestRun;
use serde::{Deserialize, Serialize};
use similar::{ChangeTag, DiffTag, TextDiff};
use std::fmt;
use std::ops::Range;

/// Lines of context around each change
pub const DEFAULT_CONTEXT: usize = 5;

/// Which compared kernel pairs are kept in the result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InclusionCriterion {
    /// Every kernel pair of every matched test
    All,
    /// Pairs whose CUDA or PTX differs
    #[default]
    MismatchedCudaOrPtx,
    /// Pairs whose PTX differs
    MismatchedPtx,
}

impl InclusionCriterion {
    /// Whether `diff` should be kept
    pub fn includes(self, diff: &KernelDiff) -> bool {
        let ptx_differs = diff.ptx_diff.as_ref().is_some_and(|d| !d.is_empty());
        match self {
            Self::All => true,
            Self::MismatchedCudaOrPtx => !diff.code_diff.is_empty() || ptx_differs,
            Self::MismatchedPtx => ptx_differs,
        }
    }
}

impl fmt::Display for InclusionCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::All => "all",
            Self::MismatchedCudaOrPtx => "mismatched_cuda_or_ptx",
            Self::MismatchedPtx => "mismatched_ptx",
        })
    }
}

/// Unified diff lines plus change counts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnifiedDiff {
    /// `---`/`+++` headers, `@@` hunk headers and prefixed lines; empty if equal
    pub lines: Vec<String>,
    /// Lines present only in the new text
    pub added: usize,
    /// Lines present only in the old text
    pub removed: usize,
}

/// Compute a unified diff of two line sequences.
///
/// The output follows the classic `diff -u` layout with `context` lines
/// around each change and hunk ranges written as `start,length`.
pub fn unified_diff(old: &[&str], new: &[&str], from: &str, to: &str, context: usize) -> UnifiedDiff {
    let diff = TextDiff::from_slices(old, new);
    if diff.ops().iter().all(|op| op.tag() == DiffTag::Equal) {
        return UnifiedDiff::default();
    }

    let mut out = UnifiedDiff {
        lines: vec![format!("--- {from}"), format!("+++ {to}")],
        ..UnifiedDiff::default()
    };
    for group in diff.grouped_ops(context) {
        let (Some(first), Some(last)) = (group.first(), group.last()) else {
            continue;
        };
        out.lines.push(format!(
            "@@ -{} +{} @@",
            hunk_range(first.old_range().start..last.old_range().end),
            hunk_range(first.new_range().start..last.new_range().end),
        ));
        for op in &group {
            for change in diff.iter_changes(op) {
                let sign = match change.tag() {
                    ChangeTag::Equal => ' ',
                    ChangeTag::Delete => {
                        out.removed += 1;
                        '-'
                    }
                    ChangeTag::Insert => {
                        out.added += 1;
                        '+'
                    }
                };
                out.lines.push(format!("{sign}{}", change.value()));
            }
        }
    }
    out
}

fn hunk_range(range: Range<usize>) -> String {
    match range.len() {
        1 => format!("{}", range.start + 1),
        // empty ranges name the line before the gap
        0 => format!("{},0", range.start),
        len => format!("{},{len}", range.start + 1),
    }
}

/// Comparison of one kernel position within a matched test
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelDiff {
    pub testname: String,
    /// 1-based position within the test
    pub kernel_num: usize,
    pub kernel1: CompiledKernel,
    pub kernel2: CompiledKernel,
    pub code_diff: Vec<String>,
    pub new_lines: usize,
    pub removed_lines: usize,
    /// `None` unless both kernels have PTX
    pub ptx_diff: Option<Vec<String>>,
    pub new_ptx_lines: usize,
    pub removed_ptx_lines: usize,
}

/// A test present in both runs with at least one included kernel difference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestDiff {
    pub testname: String,
    pub test1: CompiledTest,
    pub test2: CompiledTest,
    /// `None` when the tests compiled different numbers of kernels
    pub kernel_diffs: Option<Vec<KernelDiff>>,
}

/// Everything found when comparing two runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestDifferences {
    pub run1: TestRun,
    pub run2: TestRun,
    pub test_diffs: Vec<TestDiff>,
    /// Tests only in `run2`, with kernel bodies loaded
    pub new_tests: Vec<CompiledTest>,
    /// Tests only in `run1`, with kernel bodies loaded
    pub removed_tests: Vec<CompiledTest>,
    pub total_num_diffs: usize,
    pub preamble_diff: String,
    pub env_diff: String,
    #[serde(default)]
    pub inclusion_criterion: InclusionCriterion,
}

impl TestDifferences {
    /// Whether the comparison should fail a CI job
    pub fn has_differences(&self) -> bool {
        !self.test_diffs.is_empty() || !self.preamble_diff.is_empty()
    }

    /// Redact environment and toolchain details before publishing
    pub fn hide_env(&mut self) {
        for run in [&mut self.run1, &mut self.run2] {
            run.env = None;
            run.nvcc_version = None;
        }
        self.env_diff.clear();
    }

    /// Iterate over every recorded kernel diff
    pub fn kernel_diffs(&self) -> impl Iterator<Item = &KernelDiff> {
        self.test_diffs
            .iter()
            .filter_map(|t| t.kernel_diffs.as_deref())
            .flatten()
    }
}

/// Compares runs
#[derive(Debug)]
pub struct DiffEngine {
    criterion: InclusionCriterion,
    context: usize,
    ptx_normalizer: Box<dyn Normalize>,
}

impl Default for DiffEngine {
    fn default() -> Self {
        Self {
            criterion: InclusionCriterion::default(),
            context: DEFAULT_CONTEXT,
            ptx_normalizer: Box::new(PtxNormalizer::default()),
        }
    }
}

impl DiffEngine {
    #[must_use]
    pub fn new(criterion: InclusionCriterion) -> Self {
        Self {
            criterion,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_context(mut self, context: usize) -> Self {
        self.context = context;
        self
    }

    #[must_use]
    pub fn with_ptx_normalizer(mut self, normalizer: impl Normalize + 'static) -> Self {
        self.ptx_normalizer = Box::new(normalizer);
        self
    }

    pub const fn criterion(&self) -> InclusionCriterion {
        self.criterion
    }

    /// Compare `run1` (baseline) against `run2`.
    ///
    /// Kernel bodies missing from either run are read from its directory.
    pub fn compare(&self, run1: &TestRun, run2: &TestRun) -> CodediffResult<TestDifferences> {
        if run1.command != run2.command {
            tracing::warn!(
                "Compared test commands differ:\n  {}: {}\n  {}: {}",
                run1.name,
                run1.command,
                run2.name,
                run2.command
            );
        }
        if run1.exit_code != run2.exit_code {
            tracing::warn!(
                "Exit codes differ: {} returned {}, {} returned {}",
                run1.name,
                run1.exit_code,
                run2.name,
                run2.exit_code
            );
        }

        let mut test_diffs = Vec::new();
        let mut removed_tests = Vec::new();
        let mut total_num_diffs = 0;

        for (name, test1) in &run1.kernel_map {
            let Some(test2) = run2.kernel_map.get(name) else {
                removed_tests.push(loaded_test(run1, name, test1)?);
                continue;
            };

            if test1.kernels.len() != test2.kernels.len() {
                tracing::warn!(
                    "Test {name} has {} kernels in {} but {} in {}. Not showing diffs.",
                    test1.kernels.len(),
                    run1.name,
                    test2.kernels.len(),
                    run2.name
                );
                test_diffs.push(TestDiff {
                    testname: name.clone(),
                    test1: test1.clone(),
                    test2: test2.clone(),
                    kernel_diffs: None,
                });
                continue;
            }

            let mut kernel_diffs = Vec::new();
            for index in 0..test1.kernels.len() {
                let diff = self.diff_kernels(
                    name,
                    index + 1,
                    run1.loaded_kernel(name, index)?,
                    run2.loaded_kernel(name, index)?,
                    &run1.name,
                    &run2.name,
                );
                if self.criterion.includes(&diff) {
                    kernel_diffs.push(diff);
                }
            }
            if !kernel_diffs.is_empty() {
                total_num_diffs += kernel_diffs.len();
                test_diffs.push(TestDiff {
                    testname: name.clone(),
                    test1: test1.clone(),
                    test2: test2.clone(),
                    kernel_diffs: Some(kernel_diffs),
                });
            }
        }

        let mut new_tests = Vec::new();
        for (name, test2) in &run2.kernel_map {
            if !run1.kernel_map.contains_key(name) {
                new_tests.push(loaded_test(run2, name, test2)?);
            }
        }

        let preamble_diff = self.text_diff(&run1.preamble, &run2.preamble, &run1.name, &run2.name);
        let env_diff = self.text_diff(
            run1.env.as_deref().unwrap_or_default(),
            run2.env.as_deref().unwrap_or_default(),
            &run1.name,
            &run2.name,
        );

        tracing::debug!(
            test_diffs = test_diffs.len(),
            total_num_diffs,
            new = new_tests.len(),
            removed = removed_tests.len(),
            "comparison complete"
        );

        Ok(TestDifferences {
            run1: run1.clone(),
            run2: run2.clone(),
            test_diffs,
            new_tests,
            removed_tests,
            total_num_diffs,
            preamble_diff,
            env_diff,
            inclusion_criterion: self.criterion,
        })
    }

    /// Diff two loaded kernels. Unloaded kernels compare as empty.
    pub fn diff_kernels(
        &self,
        testname: &str,
        kernel_num: usize,
        kernel1: CompiledKernel,
        kernel2: CompiledKernel,
        name1: &str,
        name2: &str,
    ) -> KernelDiff {
        let code1 = kernel1.body.as_ref().map_or("", |b| b.code.as_str());
        let code2 = kernel2.body.as_ref().map_or("", |b| b.code.as_str());
        let code = unified_diff(
            &code1.lines().collect::<Vec<_>>(),
            &code2.lines().collect::<Vec<_>>(),
            name1,
            name2,
            self.context,
        );

        let ptx1 = kernel1.body.as_ref().and_then(|b| b.ptx.as_deref());
        let ptx2 = kernel2.body.as_ref().and_then(|b| b.ptx.as_deref());
        let ptx = match (ptx1, ptx2) {
            (Some(ptx1), Some(ptx2)) => {
                let lines1 = self.ptx_normalizer.normalize_lines(ptx1);
                let lines2 = self.ptx_normalizer.normalize_lines(ptx2);
                Some(unified_diff(
                    &lines1.iter().map(String::as_str).collect::<Vec<_>>(),
                    &lines2.iter().map(String::as_str).collect::<Vec<_>>(),
                    name1,
                    name2,
                    self.context,
                ))
            }
            _ => None,
        };

        KernelDiff {
            testname: testname.to_string(),
            kernel_num,
            kernel1,
            kernel2,
            new_lines: code.added,
            removed_lines: code.removed,
            code_diff: code.lines,
            new_ptx_lines: ptx.as_ref().map_or(0, |d| d.added),
            removed_ptx_lines: ptx.as_ref().map_or(0, |d| d.removed),
            ptx_diff: ptx.map(|d| d.lines),
        }
    }

    fn text_diff(&self, text1: &str, text2: &str, name1: &str, name2: &str) -> String {
        unified_diff(
            &text1.lines().collect::<Vec<_>>(),
            &text2.lines().collect::<Vec<_>>(),
            name1,
            name2,
            self.context,
        )
        .lines
        .join("\n")
    }
}

fn loaded_test(run: &TestRun, name: &str, test: &CompiledTest) -> CodediffResult<CompiledTest> {
    let mut test = test.clone();
    test.kernels = (0..test.kernels.len())
        .map(|index| run.loaded_kernel(name, index))
        .collect::<CodediffResult<_>>()?;
    Ok(test)
}
