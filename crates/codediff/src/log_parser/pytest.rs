//! pytest output. Tests must be run with both `-v` and `-s`.

use super::{KernelTracker, TestBoundary};
use regex::Regex;
use std::sync::LazyLock;

#[allow(clippy::expect_used)]
static SHARD_ITEMS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Running \d+ items in this shard: (?P<items>.*)$").expect("static regex")
});

#[allow(clippy::expect_used)]
static COLLECTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^collected (?P<count>\d+) items?\b").expect("static regex"));

// [2024-10-23 02:00:20] tests/python/test_python_frontend.py::TestNvFuserFrontend::test_nanogpt_split_mha_linears
// tests/python/test_python_frontend.py::TestNvFuserFrontend::test_nanogpt_split_mha_linears PASSED
#[allow(clippy::expect_used)]
static TEST_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(?P<timestamp>\[[\d\-: ]+\]) )?(?P<testname>\S+\.py::\S+)\s?(?P<line>.*)$")
        .expect("static regex")
});

#[allow(clippy::expect_used)]
static OUTCOME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<outcome>PASSED|FAILED)(?:\s+\[\s*\d+%\])?$").expect("static regex")
});

/// Recognizes pytest's verbose per-test lines
#[derive(Debug, Clone, Default)]
pub struct Pytest {
    /// Tests announced for this shard, in order
    pub all_test_names: Option<Vec<String>>,
    /// Count from pytest's `collected N items` line
    pub collected: Option<usize>,
}

impl TestBoundary for Pytest {
    fn consume<'l>(&mut self, line: &'l str, tracker: &mut KernelTracker) -> Option<&'l str> {
        if self.all_test_names.is_none() {
            if let Some(caps) = SHARD_ITEMS.captures(line) {
                let names = caps["items"].split(", ").map(str::to_string).collect();
                self.all_test_names = Some(names);
                return None;
            }
        }
        if self.collected.is_none() {
            if let Some(caps) = COLLECTED.captures(line) {
                self.collected = caps["count"].parse().ok();
                return None;
            }
        }

        // The test name is printed without a newline, so the first line of
        // the test's own output follows it on the same line.
        let mut rest = line;
        if let Some(caps) = TEST_LINE.captures(line) {
            if let Some(name) = caps.name("testname") {
                tracker.set_current_test(name.as_str());
            }
            rest = caps.name("line").map_or("", |m| m.as_str());
        }

        match OUTCOME.captures(rest).as_ref().map(|c| &c["outcome"]) {
            Some("PASSED") => {
                tracker.finalize_test(true);
                None
            }
            Some("FAILED") => {
                if tracker.current_test().is_some() {
                    tracker.finalize_test(false);
                }
                None
            }
            _ => Some(rest),
        }
    }
}
