//! Stdout log parsing.
//!
//! Every supported runner prints kernels the same way:
//!
//! ```text
//! PRINTING: __tmp_kernel_pointwise_f0_c1_r0_g0.cu
//! ptxas info    : Used 32 registers, 380 bytes cmem[0]
//! Launch Parameters: BlockDim.x = 128, BlockDim.y = -1, ...
//! ```
//!
//! [`KernelTracker`] implements that shared protocol. What differs between
//! runners is how tests begin and end, which is supplied by a
//! [`TestBoundary`] implementation.

mod gbench;
mod gtest;
mod pytest;

pub use gbench::GoogleBenchmark;
pub use gtest::GoogleTest;
pub use pytest::Pytest;

use crate::kernel::{CompiledKernel, CompiledTest, UNGROUPED_KERNELS};
use crate::result::CodediffResult;
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::BufRead;
use std::sync::LazyLock;

/// Tests of one run, in the order they finished
pub type KernelMap = IndexMap<String, CompiledTest>;

const PRINTING_PREFIX: &str = "PRINTING: ";
const PTXAS_PREFIX: &str = "ptxas ";
const LAUNCH_PARAMS_PREFIX: &str = "Launch Parameters: ";
const CUDA_EXTENSION: &str = ".cu";

#[allow(clippy::expect_used)]
static ANSI_ESCAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\x{9B}|\x1B\[)[0-?]*[ -/]*[@-~]").expect("static regex"));

/// Kind of command that produced a run's stdout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CommandType {
    /// No test grouping; all kernels land in [`UNGROUPED_KERNELS`]
    #[default]
    Unknown,
    /// GoogleTest binary
    GoogleTest,
    /// Google Benchmark binary
    GoogleBench,
    /// `pytest -v -s`
    Pytest,
}

impl CommandType {
    /// Interpret the contents of a run's `command_type` file.
    ///
    /// Unrecognized names fall back to [`CommandType::Unknown`] with a warning.
    pub fn from_tag(tag: &str) -> Self {
        let lower = tag.trim().to_lowercase();
        match lower.as_str() {
            "gtest" | "googletest" => Self::GoogleTest,
            "gbench" | "googlebench" => Self::GoogleBench,
            "pytest" => Self::Pytest,
            // explicitly unknown, no warning
            s if s.starts_with("unk") => Self::Unknown,
            _ => {
                tracing::warn!("Unrecognized command type '{tag}'. Parsing as UNKNOWN.");
                Self::Unknown
            }
        }
    }

    /// Parse `reader` with the recognizer for this command type
    pub fn parse_log<R: BufRead>(self, reader: R) -> CodediffResult<KernelMap> {
        match self {
            Self::Unknown => LogParser::new(Ungrouped).parse_reader(reader),
            Self::GoogleTest => LogParser::new(GoogleTest).parse_reader(reader),
            Self::GoogleBench => LogParser::new(GoogleBenchmark::default()).parse_reader(reader),
            Self::Pytest => LogParser::new(Pytest::default()).parse_reader(reader),
        }
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "UNKNOWN",
            Self::GoogleTest => "GOOGLETEST",
            Self::GoogleBench => "GOOGLEBENCH",
            Self::Pytest => "PYTEST",
        };
        f.write_str(name)
    }
}

/// Runner-specific recognition of test boundaries
pub trait TestBoundary {
    /// Inspect one ANSI-stripped line before the kernel protocol sees it.
    ///
    /// May open or finalize tests on `tracker`. Returns the part of the line
    /// left for kernel handling, or `None` if the line was consumed.
    fn consume<'l>(&mut self, line: &'l str, tracker: &mut KernelTracker) -> Option<&'l str>;
}

/// Recognizes no test boundaries
#[derive(Debug, Clone, Copy, Default)]
pub struct Ungrouped;

impl TestBoundary for Ungrouped {
    fn consume<'l>(&mut self, line: &'l str, _tracker: &mut KernelTracker) -> Option<&'l str> {
        Some(line)
    }
}

/// Kernel-boundary state shared by all runners
#[derive(Debug, Default)]
pub struct KernelTracker {
    kernel_map: KernelMap,
    current_test: Option<String>,
    kernels: Vec<CompiledKernel>,
    current_file: Option<String>,
    ptxas_info: String,
    launch_params_str: String,
}

impl KernelTracker {
    /// Name of the test currently open, if any
    pub fn current_test(&self) -> Option<&str> {
        self.current_test.as_deref()
    }

    /// Open a test. Empty names are ignored.
    ///
    /// A different test still open with kernels is finalized as passed first,
    /// so its kernels are never attributed to the new one.
    pub fn set_current_test(&mut self, name: &str) {
        let name = name.trim();
        if name.is_empty() {
            tracing::warn!("Ignoring test boundary with an empty test name");
            return;
        }
        if let Some(open) = self.current_test.as_deref() {
            if open != name && (!self.kernels.is_empty() || self.has_kernel_in_flight()) {
                tracing::warn!(
                    test = %open,
                    next = %name,
                    "Test started before the previous one reported a result; closing it"
                );
                self.finalize_test(true);
            }
        }
        self.current_test = Some(name.to_string());
    }

    /// Whether a kernel announcement is still accumulating diagnostics
    pub const fn has_kernel_in_flight(&self) -> bool {
        self.current_file.is_some()
    }

    /// Number of tests finalized so far
    pub fn finalized_count(&self) -> usize {
        self.kernel_map.len()
    }

    fn finalize_kernel(&mut self) {
        if let Some(filename) = self.current_file.take() {
            let kernel = CompiledKernel::with_diagnostics(
                filename,
                std::mem::take(&mut self.ptxas_info),
                std::mem::take(&mut self.launch_params_str),
            );
            self.kernels.push(kernel);
        }
        self.ptxas_info.clear();
        self.launch_params_str.clear();
    }

    /// Close the current test, attaching every kernel seen since the last one.
    ///
    /// Returns the new test, or `None` (with a warning) if no test was open.
    pub fn finalize_test(&mut self, passed: bool) -> Option<&mut CompiledTest> {
        let Some(name) = self.current_test.take() else {
            tracing::warn!("Test result found with no test in progress");
            return None;
        };
        self.finalize_kernel();
        let test = CompiledTest::new(name.clone(), std::mem::take(&mut self.kernels), passed);
        if self.kernel_map.insert(name.clone(), test).is_some() {
            tracing::warn!(test = %name, "Test appeared more than once in log; keeping the last");
        }
        self.kernel_map.get_mut(&name)
    }

    /// Shared kernel protocol. Returns true if the line was consumed.
    fn consume_kernel_line(&mut self, line: &str) -> bool {
        if let Some(filename) = line.strip_prefix(PRINTING_PREFIX) {
            if filename.ends_with(CUDA_EXTENSION) {
                self.finalize_kernel();
                self.current_file = Some(filename.to_string());
            }
        } else if line.starts_with(PTXAS_PREFIX) {
            if self.current_file.is_none() {
                tracing::warn!("Cannot associate ptxas info with CUDA kernel");
                return false;
            }
            self.ptxas_info.push_str(line);
            self.ptxas_info.push('\n');
        } else if line.starts_with(LAUNCH_PARAMS_PREFIX) {
            if self.current_file.is_none() {
                tracing::warn!("Cannot associate launch params with CUDA kernel");
                return false;
            }
            self.launch_params_str.push_str(line);
            self.launch_params_str.push('\n');
        } else {
            return false;
        }
        true
    }

    fn finish(mut self) -> KernelMap {
        self.finalize_kernel();
        if !self.kernels.is_empty() {
            if let Some(test) = &self.current_test {
                tracing::warn!(
                    test = %test,
                    kernels = self.kernels.len(),
                    "Log ended inside a test; its kernels are reported as ungrouped"
                );
            }
            let kernels = std::mem::take(&mut self.kernels);
            match self.kernel_map.get_mut(UNGROUPED_KERNELS) {
                Some(group) => group.kernels.extend(kernels),
                None => {
                    self.kernel_map.insert(
                        UNGROUPED_KERNELS.to_string(),
                        CompiledTest::new(UNGROUPED_KERNELS, kernels, true),
                    );
                }
            }
        }
        self.kernel_map
    }
}

/// Line-driven parser combining the kernel protocol with a test recognizer
#[derive(Debug, Default)]
pub struct LogParser<B> {
    boundary: B,
    tracker: KernelTracker,
}

impl<B: TestBoundary> LogParser<B> {
    /// Parser using `boundary` to find tests
    pub fn new(boundary: B) -> Self {
        Self {
            boundary,
            tracker: KernelTracker::default(),
        }
    }

    /// Feed one raw line (ANSI escapes and trailing whitespace are removed)
    pub fn parse_line(&mut self, raw: &str) {
        let clean = ANSI_ESCAPE.replace_all(raw, "");
        let line = clean.trim_end();
        if let Some(rest) = self.boundary.consume(line, &mut self.tracker) {
            self.tracker.consume_kernel_line(rest);
        }
    }

    /// Feed every line of `text`
    pub fn parse_str(mut self, text: &str) -> KernelMap {
        for line in text.lines() {
            self.parse_line(line);
        }
        self.finish()
    }

    /// Feed every line of `reader`. Invalid UTF-8 is replaced, not rejected.
    pub fn parse_reader<R: BufRead>(mut self, reader: R) -> CodediffResult<KernelMap> {
        for line in reader.split(b'\n') {
            let line = line?;
            self.parse_line(&String::from_utf8_lossy(&line));
        }
        Ok(self.finish())
    }

    /// The test recognizer
    pub const fn boundary(&self) -> &B {
        &self.boundary
    }

    /// Kernel state so far
    pub const fn tracker(&self) -> &KernelTracker {
        &self.tracker
    }

    /// End of input: flush pending kernels and return the tests
    pub fn finish(self) -> KernelMap {
        self.tracker.finish()
    }
}
