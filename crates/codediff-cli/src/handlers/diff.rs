//! Diff command handler

use crate::config::CliConfig;
use crate::error::CliResult;
use crate::output::ProgressReporter;
use crate::DiffArgs;
use codediff::{load_json, save_json, DiffEngine, InclusionCriterion, TestDifferences, TestRun};

/// Execute the diff command.
///
/// Returns whether differences were found; the caller maps that to the exit status.
pub fn execute_diff(config: &CliConfig, args: &DiffArgs) -> CliResult<bool> {
    let reporter = ProgressReporter::new(config.color.should_color(), config.verbosity.is_quiet());

    let run1: TestRun = load_json(&args.input_json1)?;
    let run2: TestRun = load_json(&args.input_json2)?;

    let criterion = InclusionCriterion::from(args.kernel_inclusion_criterion);
    tracing::info!(%criterion, run1 = %run1.name, run2 = %run2.name, "comparing runs");
    let differences = DiffEngine::new(criterion).compare(&run1, &run2)?;

    if !args.hide_diffs && !config.verbosity.is_quiet() {
        print_differences(&reporter, &differences);
    }
    for warning in mismatch_warnings(&differences) {
        reporter.warning(&warning);
    }

    if !config.verbosity.is_quiet() {
        reporter.lines(&summary_lines(&differences));
    }

    save_json(&args.output_json, &differences)?;
    let found = differences.has_differences();
    if found {
        reporter.failure(&format!("Differences written to {}", args.output_json.display()));
    } else {
        reporter.success(&format!("Wrote {}", args.output_json.display()));
    }
    Ok(found)
}

fn print_differences(reporter: &ProgressReporter, differences: &TestDifferences) {
    if !differences.preamble_diff.is_empty() {
        reporter.header("Preamble");
        let lines: Vec<String> = differences.preamble_diff.lines().map(str::to_string).collect();
        reporter.diff_lines(&lines);
    }
    for kernel in differences.kernel_diffs() {
        reporter.header(&format!("{} kernel {}", kernel.testname, kernel.kernel_num));
        reporter.diff_lines(&kernel.code_diff);
        if let Some(ptx) = &kernel.ptx_diff {
            reporter.diff_lines(ptx);
        }
    }
}

/// One line per matched test whose kernel counts differ
#[must_use]
pub fn mismatch_warnings(differences: &TestDifferences) -> Vec<String> {
    differences
        .test_diffs
        .iter()
        .filter(|t| t.kernel_diffs.is_none())
        .map(|t| {
            format!(
                "{} has {} kernels in {} but {} in {}",
                t.testname,
                t.test1.kernels.len(),
                differences.run1.name,
                t.test2.kernels.len(),
                differences.run2.name
            )
        })
        .collect()
}

/// Human-readable summary of a comparison
#[must_use]
pub fn summary_lines(differences: &TestDifferences) -> Vec<String> {
    let mut lines = Vec::new();
    if differences.test_diffs.is_empty() {
        lines.push("No differences found in overlapping tests!".to_string());
    } else {
        lines.push(format!(
            "{} kernel differences from {} tests found",
            differences.total_num_diffs,
            differences.test_diffs.len()
        ));
    }
    if !differences.new_tests.is_empty() {
        lines.push(format!("{} new tests found", differences.new_tests.len()));
    }
    if !differences.removed_tests.is_empty() {
        lines.push(format!("{} removed tests found", differences.removed_tests.len()));
    }
    if !differences.preamble_diff.is_empty() {
        lines.push("Preambles differ".to_string());
    }
    lines
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::commands::CriterionArg;
    use crate::config::Verbosity;
    use crate::handlers::fixtures::write_gtest_run;
    use crate::handlers::parse::execute_parse;
    use crate::ParseArgs;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn quiet() -> CliConfig {
        CliConfig::new().with_verbosity(Verbosity::Quiet)
    }

    fn parse(root: &Path, name: &str, kernels: &[(&str, &str)]) -> PathBuf {
        let dir = write_gtest_run(root, name, kernels);
        let output_json = root.join(format!("{name}.json"));
        execute_parse(
            &quiet(),
            &ParseArgs {
                dir,
                output_json: output_json.clone(),
            },
        )
        .unwrap();
        output_json
    }

    fn diff_args(root: &Path, a: PathBuf, b: PathBuf) -> DiffArgs {
        DiffArgs {
            kernel_inclusion_criterion: CriterionArg::MismatchedCudaOrPtx,
            hide_diffs: true,
            input_json1: a,
            input_json2: b,
            output_json: root.join("diff.json"),
        }
    }

    #[test]
    fn test_identical_runs_have_no_differences() {
        let temp = TempDir::new().unwrap();
        let a = parse(temp.path(), "a", &[("k1.cu", "  x = 1;")]);
        let b = parse(temp.path(), "b", &[("k1.cu", "  x = 1;")]);
        let args = diff_args(temp.path(), a, b);

        assert!(!execute_diff(&quiet(), &args).unwrap());
        let saved: TestDifferences = load_json(&args.output_json).unwrap();
        assert_eq!(saved.total_num_diffs, 0);
        assert_eq!(summary_lines(&saved), vec!["No differences found in overlapping tests!"]);
    }

    #[test]
    fn test_changed_kernel_is_reported() {
        let temp = TempDir::new().unwrap();
        let a = parse(temp.path(), "a", &[("k1.cu", "  x = 1;"), ("k2.cu", "  y = 1;")]);
        let b = parse(temp.path(), "b", &[("k1.cu", "  x = 1;"), ("k2.cu", "  y = 2;")]);
        let args = diff_args(temp.path(), a, b);

        assert!(execute_diff(&quiet(), &args).unwrap());
        let saved: TestDifferences = load_json(&args.output_json).unwrap();
        assert_eq!(saved.total_num_diffs, 1);
        assert_eq!(saved.test_diffs[0].testname, "Suite.Test1");
        assert_eq!(
            summary_lines(&saved),
            vec!["1 kernel differences from 1 tests found"]
        );
    }

    #[test]
    fn test_new_and_removed_tests_do_not_fail() {
        let temp = TempDir::new().unwrap();
        let a = parse(temp.path(), "a", &[("k1.cu", "  x = 1;")]);
        let b = parse(temp.path(), "b", &[("k1.cu", "  x = 1;"), ("k2.cu", "  y = 1;")]);
        let args = diff_args(temp.path(), a.clone(), b.clone());

        assert!(!execute_diff(&quiet(), &args).unwrap());
        let saved: TestDifferences = load_json(&args.output_json).unwrap();
        assert_eq!(
            summary_lines(&saved),
            vec!["No differences found in overlapping tests!", "1 new tests found"]
        );

        let reversed = diff_args(temp.path(), b, a);
        assert!(!execute_diff(&quiet(), &reversed).unwrap());
        let saved: TestDifferences = load_json(&reversed.output_json).unwrap();
        assert_eq!(saved.removed_tests.len(), 1);
    }

    #[test]
    fn test_kernel_count_mismatch_is_warned() {
        let temp = TempDir::new().unwrap();
        let a = parse(temp.path(), "a", &[("k1.cu", "  x = 1;")]);
        let b = parse(temp.path(), "b", &[("k1.cu", "  x = 1;")]);

        // give the second run's only test an extra kernel
        let mut run2: TestRun = load_json(&b).unwrap();
        let test = run2.kernel_map.get_mut("Suite.Test0").unwrap();
        let extra = test.kernels[0].clone();
        test.kernels.push(extra);
        codediff::save_json(&b, &run2).unwrap();

        let args = diff_args(temp.path(), a, b);
        assert!(execute_diff(&quiet(), &args).unwrap());
        let saved: TestDifferences = load_json(&args.output_json).unwrap();
        assert_eq!(
            mismatch_warnings(&saved),
            vec!["Suite.Test0 has 1 kernels in a but 2 in b"]
        );
    }

    #[test]
    fn test_missing_input_is_an_error() {
        let temp = TempDir::new().unwrap();
        let a = parse(temp.path(), "a", &[("k1.cu", "  x = 1;")]);
        let args = diff_args(temp.path(), a, temp.path().join("missing.json"));
        assert!(execute_diff(&quiet(), &args).is_err());
        assert!(!args.output_json.exists());
    }
}
