//! Property-based tests for codediff.
//!
//! Uses proptest to check normalization, diffing, parsing and joining
//! invariants over generated inputs.

use codediff::log_parser::GoogleTest;
use codediff::{
    unified_diff, CommandType, CompiledKernel, CompiledTest, GitRev, KernelMap, LogParser, Normalize,
    PtxNormalizer, SourceNormalizer, TestRun, UNGROUPED_KERNELS,
};
use proptest::prelude::*;
use std::path::PathBuf;

fn mangled(scope: &str, kernel: &str) -> String {
    format!("_ZN{}{scope}{}{kernel}ENS_6TensorIfLi1ELi1EEE", scope.len(), kernel.len())
}

fn ungrouped_run(files: &[String]) -> TestRun {
    ungrouped_shard(files, true)
}

fn ungrouped_shard(files: &[String], passed: bool) -> TestRun {
    let mut kernel_map = KernelMap::new();
    if !files.is_empty() {
        let kernels = files.iter().map(CompiledKernel::new).collect();
        kernel_map.insert(
            UNGROUPED_KERNELS.to_string(),
            CompiledTest::new(UNGROUPED_KERNELS, kernels, passed),
        );
    }
    TestRun {
        directory: PathBuf::from("shard"),
        git: GitRev::default(),
        name: "shard".to_string(),
        command: "run".to_string(),
        command_type: CommandType::Unknown,
        exit_code: 0,
        env: None,
        gpu_names: None,
        nvcc_version: None,
        kernel_map,
        preamble: String::new(),
        preamble_size_lines: 0,
    }
}

fn ungrouped_files(run: &TestRun) -> Vec<String> {
    let mut files: Vec<String> = run
        .kernel_map
        .get(UNGROUPED_KERNELS)
        .map(|t| t.kernels.iter().map(|k| k.filename.clone()).collect())
        .unwrap_or_default();
    files.sort();
    files
}

// === Normalization ===

proptest! {
    /// Sources differing only in kernel counters normalize identically.
    #[test]
    fn prop_kernel_counter_erased(
        a in 0u32..100_000,
        b in 0u32..100_000,
        body in "[a-z =;+*0-9]{0,40}"
    ) {
        let n = SourceNormalizer::default();
        let src_a = format!("__global__ void nvfuser_{a}(Tensor T0) {{ {body} }}");
        let src_b = format!("__global__ void nvfuser_{b}(Tensor T0) {{ {body} }}");
        prop_assert_eq!(n.normalize_lines(&src_a), n.normalize_lines(&src_b));
    }

    /// Mangled names differing only in kernel ordinal collapse to one.
    #[test]
    fn prop_ptx_ordinal_collapses(
        a in 0u32..10_000,
        b in 0u32..10_000,
        hash in "[0-9a-f]{8}"
    ) {
        let n = PtxNormalizer::default();
        let line_a = format!(".entry {}(", mangled(&format!("_GLOBAL__N__{hash}_kernel_{a}_cu"), &format!("nvfuser_{a}")));
        let line_b = format!(".entry {}(", mangled(&format!("_GLOBAL__N__{hash}_kernel_{b}_cu"), &format!("nvfuser_{b}")));
        prop_assert_eq!(n.normalize_line(&line_a), n.normalize_line(&line_b));
    }

    /// Normalization never panics on arbitrary lines.
    #[test]
    fn prop_ptx_normalize_total(line in ".{0,80}") {
        let _ = PtxNormalizer::default().normalize_line(&line);
    }
}

// === Unified diff ===

proptest! {
    /// Identical inputs produce no diff.
    #[test]
    fn prop_identical_is_empty(lines in prop::collection::vec("[a-z]{0,6}", 0..30)) {
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        let d = unified_diff(&refs, &refs, "a", "b", 5);
        prop_assert!(d.lines.is_empty());
    }

    /// Added minus removed equals the change in length.
    #[test]
    fn prop_counts_balance(
        old in prop::collection::vec("[a-c]", 0..20),
        new in prop::collection::vec("[a-c]", 0..20)
    ) {
        let o: Vec<&str> = old.iter().map(String::as_str).collect();
        let n: Vec<&str> = new.iter().map(String::as_str).collect();
        let d = unified_diff(&o, &n, "a", "b", 5);
        prop_assert_eq!(d.added as i64 - d.removed as i64, new.len() as i64 - old.len() as i64);
        prop_assert_eq!(d.lines.is_empty(), old == new);
    }
}

// === Log parsing ===

proptest! {
    /// Every RUN with a terminal OK or FAILED line becomes a test owning its kernels.
    #[test]
    fn prop_gtest_finalizes_each_test(
        tests in prop::collection::vec((0usize..4, any::<bool>()), 1..10)
    ) {
        let mut log = String::new();
        let mut next = 0;
        for (i, (kernels, passed)) in tests.iter().enumerate() {
            log.push_str(&format!("[ RUN      ] Suite.T{i}\n"));
            for _ in 0..*kernels {
                log.push_str(&format!("PRINTING: __tmp_kernel_{next}.cu\n"));
                next += 1;
            }
            let mark = if *passed { "[       OK ]" } else { "[  FAILED  ]" };
            log.push_str(&format!("{mark} Suite.T{i} (1 ms)\n"));
        }
        let map = LogParser::new(GoogleTest).parse_str(&log);
        prop_assert_eq!(map.len(), tests.len());
        for (i, (kernels, passed)) in tests.iter().enumerate() {
            let test = &map[format!("Suite.T{i}").as_str()];
            prop_assert_eq!(test.kernels.len(), *kernels);
            prop_assert_eq!(test.passed, *passed);
        }
    }
}

// === Join ===

proptest! {
    /// Joining shards of ungrouped kernels is order-independent up to order.
    #[test]
    fn prop_join_ungrouped_commutes(
        a in prop::collection::vec("[a-z]{1,8}\\.cu", 0..6),
        b in prop::collection::vec("[a-z]{1,8}\\.cu", 0..6)
    ) {
        let mut ab = ungrouped_run(&a);
        ab.join(ungrouped_run(&b)).unwrap();
        let mut ba = ungrouped_run(&b);
        ba.join(ungrouped_run(&a)).unwrap();
        prop_assert_eq!(ungrouped_files(&ab), ungrouped_files(&ba));
        prop_assert_eq!(ungrouped_files(&ab).len(), a.len() + b.len());
    }

    /// Three shards joined in either leading order agree on kernels and status.
    #[test]
    fn prop_join_ungrouped_three_shards(
        shards in prop::collection::vec(
            (prop::collection::vec("[a-z]{1,8}\\.cu", 0..6), any::<bool>()),
            3
        )
    ) {
        let shard = |i: usize| ungrouped_shard(&shards[i].0, shards[i].1);
        let abc = TestRun::join_all([shard(0), shard(1), shard(2)]).unwrap();
        let bac = TestRun::join_all([shard(1), shard(0), shard(2)]).unwrap();

        prop_assert_eq!(ungrouped_files(&abc), ungrouped_files(&bac));
        let total: usize = shards.iter().map(|(files, _)| files.len()).sum();
        prop_assert_eq!(ungrouped_files(&abc).len(), total);

        let passed = |run: &TestRun| run.kernel_map.get(UNGROUPED_KERNELS).map(|t| t.passed);
        prop_assert_eq!(passed(&abc), passed(&bac));
        let expected = shards
            .iter()
            .filter(|(files, _)| !files.is_empty())
            .map(|(_, ok)| *ok)
            .reduce(|a, b| a && b);
        prop_assert_eq!(passed(&abc), expected);
    }

    /// A named test present in both shards is rejected.
    #[test]
    fn prop_join_rejects_duplicates(name in "[A-Za-z]{1,12}\\.[A-Za-z]{1,12}") {
        let shard = || {
            let mut run = ungrouped_run(&[]);
            run.kernel_map.insert(name.clone(), CompiledTest::new(name.as_str(), vec![], true));
            run
        };
        let mut first = shard();
        prop_assert!(first.join(shard()).is_err());
        prop_assert_eq!(first.kernel_map.len(), 1);
    }
}
