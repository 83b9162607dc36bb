//! Parse command handler

use crate::config::CliConfig;
use crate::error::CliResult;
use crate::output::ProgressReporter;
use crate::ParseArgs;
use codediff::{save_json, TestRun};

/// Execute the parse command: read a run directory, load every kernel body, write JSON
pub fn execute_parse(config: &CliConfig, args: &ParseArgs) -> CliResult<TestRun> {
    let mut reporter = ProgressReporter::new(config.color.should_color_stderr(), config.verbosity.is_quiet());

    let mut run = TestRun::from_dir(&args.dir)?;
    reporter.info(&format!(
        "Parsing {} ({}, {} tests)",
        args.dir.display(),
        run.command_type,
        run.kernel_map.len()
    ));
    tracing::debug!(
        run = %run.name,
        command_type = %run.command_type,
        tests = run.kernel_map.len(),
        "parsed run directory"
    );

    let total = run.kernel_count();
    reporter.start_progress(total as u64, "Loading kernels");
    let tests: Vec<(String, usize)> = run
        .kernel_map
        .iter()
        .map(|(name, test)| (name.clone(), test.kernels.len()))
        .collect();
    for (name, count) in tests {
        reporter.set_message(&name);
        for index in 0..count {
            run.load_kernel(&name, index)?;
            reporter.increment(1);
        }
    }
    reporter.finish();

    save_json(&args.output_json, &run)?;
    reporter.success(&format!(
        "Parsed {} kernels from {} tests into {}",
        total,
        run.kernel_map.len(),
        args.output_json.display()
    ));
    Ok(run)
}
