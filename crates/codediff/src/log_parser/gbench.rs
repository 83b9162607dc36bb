//! Google Benchmark output, e.g. from `nvfuser_bench`

use super::{KernelTracker, TestBoundary};
use crate::kernel::BenchmarkResult;
use regex::Regex;
use std::sync::LazyLock;

// benchmark_name   34.0 us      1.53 ms   2007  /Launch_Parameters[block(2/2/32)/grid(32/2/2)/49664]
#[allow(clippy::expect_used)]
static RESULT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<testname>\S+)\s+(?P<gputime>[-+.\d]+)\s+(?P<gputimeunit>\S+)\s+(?P<cputime>[-+.\d]+)\s+(?P<cputimeunit>\S+)\s+(?P<iterations>\d+).*$",
    )
    .expect("static regex")
});

const GROUPS: [&str; 6] = [
    "testname",
    "gputime",
    "gputimeunit",
    "cputime",
    "cputimeunit",
    "iterations",
];

/// Recognizes the result line printed when a benchmark finishes.
///
/// Kernels compiled while the benchmark ran precede the line, so a match
/// names the pending test and finalizes it as passed in one step.
#[derive(Debug, Clone)]
pub struct GoogleBenchmark {
    result_line: Regex,
}

impl Default for GoogleBenchmark {
    fn default() -> Self {
        Self {
            result_line: RESULT_LINE.clone(),
        }
    }
}

impl GoogleBenchmark {
    /// Use a different result-line pattern.
    ///
    /// The pattern must define the named groups `testname`, `gputime`,
    /// `gputimeunit`, `cputime`, `cputimeunit` and `iterations`.
    pub fn with_pattern(pattern: &str) -> Result<Self, regex::Error> {
        let result_line = Regex::new(pattern)?;
        let names: Vec<_> = result_line.capture_names().flatten().collect();
        if let Some(missing) = GROUPS.iter().find(|g| !names.contains(*g)) {
            return Err(regex::Error::Syntax(format!(
                "benchmark result pattern lacks named group '{missing}'"
            )));
        }
        Ok(Self { result_line })
    }

    /// Parse a result line without touching any parser state
    pub fn parse_result(&self, line: &str) -> Option<(String, BenchmarkResult)> {
        let caps = self.result_line.captures(line)?;
        let group = |name: &str| caps.name(name).map(|m| m.as_str().to_string());
        Some((
            group("testname")?,
            BenchmarkResult {
                gpu_time: group("gputime")?,
                gpu_time_unit: group("gputimeunit")?,
                cpu_time: group("cputime")?,
                cpu_time_unit: group("cputimeunit")?,
                iterations: group("iterations"),
            },
        ))
    }
}

impl TestBoundary for GoogleBenchmark {
    fn consume<'l>(&mut self, line: &'l str, tracker: &mut KernelTracker) -> Option<&'l str> {
        let Some((name, result)) = self.parse_result(line) else {
            return Some(line);
        };
        tracker.set_current_test(&name);
        if let Some(test) = tracker.finalize_test(true) {
            test.benchmark_result = Some(result);
        }
        None
    }
}
