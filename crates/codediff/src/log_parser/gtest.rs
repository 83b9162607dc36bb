//! GoogleTest output, e.g. from `test_nvfuser`

use super::{KernelTracker, TestBoundary};

const RUN_PREFIX: &str = "[ RUN      ] ";
const OK_PREFIX: &str = "[       OK ] ";
const FAILED_PREFIX: &str = "[  FAILED  ] ";
const SKIPPED_PREFIX: &str = "[  SKIPPED ] ";

/// Recognizes `[ RUN      ]`, `[       OK ]`, `[  SKIPPED ]` and `[  FAILED  ]` lines
#[derive(Debug, Clone, Copy, Default)]
pub struct GoogleTest;

impl TestBoundary for GoogleTest {
    fn consume<'l>(&mut self, line: &'l str, tracker: &mut KernelTracker) -> Option<&'l str> {
        if let Some(name) = line.strip_prefix(RUN_PREFIX) {
            tracker.set_current_test(name);
        } else if line.starts_with(OK_PREFIX) {
            tracker.finalize_test(true);
        } else if line.starts_with(SKIPPED_PREFIX) {
            // skipped tests may have compiled kernels before GTEST_SKIP;
            // the summary also lists skipped tests once nothing is open
            if tracker.current_test().is_some() {
                tracker.finalize_test(true);
            }
        } else if line.starts_with(FAILED_PREFIX) {
            // The summary at the end repeats failed test names:
            //   [  FAILED  ] 1 test, listed below:
            //   [  FAILED  ] NVFuserTest.FusionTuringMatmulSplitK_CUDA
            // By then every test has been finalized, so nothing is open.
            if tracker.current_test().is_some() {
                tracker.finalize_test(false);
            }
        } else {
            return Some(line);
        }
        None
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::super::LogParser;
    use super::*;
    use crate::kernel::UNGROUPED_KERNELS;

    const LOG: &str = "\
[==========] Running 3 tests from 1 test suite.
[ RUN      ] NVFuserTest.FusionAdd_CUDA
PRINTING: __tmp_kernel_1.cu
ptxas info    : Used 16 registers, 380 bytes cmem[0]
PRINTING: __tmp_kernel_2.cu
[       OK ] NVFuserTest.FusionAdd_CUDA (120 ms)
[ RUN      ] NVFuserTest.FusionMatmul_CUDA
PRINTING: __tmp_kernel_3.cu
[  FAILED  ] NVFuserTest.FusionMatmul_CUDA (15 ms)
[ RUN      ] NVFuserTest.FusionEmpty_CUDA
[       OK ] NVFuserTest.FusionEmpty_CUDA (0 ms)
[==========] 3 tests from 1 test suite ran. (135 ms total)
[  PASSED  ] 2 tests.
[  FAILED  ] 1 test, listed below:
[  FAILED  ] NVFuserTest.FusionMatmul_CUDA

 1 FAILED TEST
";

    #[test]
    fn test_tests_and_kernels_attributed() {
        let map = LogParser::new(GoogleTest).parse_str(LOG);
        let names: Vec<_> = map.keys().map(String::as_str).collect();
        assert_eq!(
            names,
            vec![
                "NVFuserTest.FusionAdd_CUDA",
                "NVFuserTest.FusionMatmul_CUDA",
                "NVFuserTest.FusionEmpty_CUDA"
            ]
        );

        let add = &map["NVFuserTest.FusionAdd_CUDA"];
        assert!(add.passed);
        assert_eq!(add.kernels.len(), 2);
        assert_eq!(add.kernels[0].filename, "__tmp_kernel_1.cu");
        assert!(add.kernels[0].stats.is_some());
        assert!(add.kernels[1].stats.is_none());

        let matmul = &map["NVFuserTest.FusionMatmul_CUDA"];
        assert!(!matmul.passed);
        assert_eq!(matmul.kernels.len(), 1);

        assert!(map["NVFuserTest.FusionEmpty_CUDA"].kernels.is_empty());
        assert!(!map.contains_key(UNGROUPED_KERNELS));
    }

    #[test]
    fn test_failure_summary_does_not_create_tests() {
        let map = LogParser::new(GoogleTest).parse_str(LOG);
        assert_eq!(map.len(), 3);
        assert!(!map.contains_key("1 test, listed below:"));
    }

    #[test]
    fn test_crash_leaves_kernels_ungrouped() {
        let log = "\
[ RUN      ] Suite.Crashes
PRINTING: __tmp_kernel_9.cu
Segmentation fault
";
        let map = LogParser::new(GoogleTest).parse_str(log);
        assert_eq!(map.len(), 1);
        assert_eq!(map[UNGROUPED_KERNELS].kernels[0].filename, "__tmp_kernel_9.cu");
    }

    #[test]
    fn test_skipped_test_keeps_its_kernels() {
        let log = "\
[ RUN      ] Suite.A
PRINTING: __tmp_kernel_1.cu
[  SKIPPED ] Suite.A (0 ms)
[ RUN      ] Suite.B
PRINTING: __tmp_kernel_2.cu
[       OK ] Suite.B (1 ms)
[  SKIPPED ] 1 test, listed below:
[  SKIPPED ] Suite.A
";
        let map = LogParser::new(GoogleTest).parse_str(log);
        assert_eq!(map.len(), 2);
        assert_eq!(map["Suite.A"].kernels.len(), 1);
        assert_eq!(map["Suite.A"].kernels[0].filename, "__tmp_kernel_1.cu");
        assert!(map["Suite.A"].passed);
        assert_eq!(map["Suite.B"].kernels.len(), 1);
        assert_eq!(map["Suite.B"].kernels[0].filename, "__tmp_kernel_2.cu");
    }

    #[test]
    fn test_unterminated_test_closed_by_next_run() {
        let log = "\
[ RUN      ] Suite.A
PRINTING: __tmp_kernel_1.cu
[ RUN      ] Suite.B
PRINTING: __tmp_kernel_2.cu
[       OK ] Suite.B (1 ms)
";
        let mut parser = LogParser::new(GoogleTest);
        for line in log.lines().take(3) {
            parser.parse_line(line);
        }
        assert_eq!(parser.tracker().finalized_count(), 1);
        assert_eq!(parser.tracker().current_test(), Some("Suite.B"));

        let map = LogParser::new(GoogleTest).parse_str(log);
        let names: Vec<_> = map["Suite.A"].kernels.iter().map(|k| k.filename.as_str()).collect();
        assert_eq!(names, vec!["__tmp_kernel_1.cu"]);
        let names: Vec<_> = map["Suite.B"].kernels.iter().map(|k| k.filename.as_str()).collect();
        assert_eq!(names, vec!["__tmp_kernel_2.cu"]);
    }
}
