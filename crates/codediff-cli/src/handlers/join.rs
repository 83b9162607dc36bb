//! Join command handler

use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::output::ProgressReporter;
use crate::JoinArgs;
use codediff::{load_json, save_json, TestRun};

/// Execute the join command: concatenate shard JSONs into one run
pub fn execute_join(config: &CliConfig, args: &JoinArgs) -> CliResult<TestRun> {
    let reporter = ProgressReporter::new(config.color.should_color_stderr(), config.verbosity.is_quiet());

    if args.input_jsons.iter().any(|p| p == &args.output) {
        return Err(CliError::invalid_argument(format!(
            "output {} is also an input",
            args.output.display()
        )));
    }

    let runs = args
        .input_jsons
        .iter()
        .map(|path| {
            tracing::debug!(path = %path.display(), "loading shard");
            load_json::<TestRun>(path)
        })
        .collect::<Result<Vec<_>, _>>()?;

    let joined = TestRun::join_all(runs)?;
    save_json(&args.output, &joined)?;

    reporter.success(&format!(
        "Joined {} shards ({} tests) into {}",
        args.input_jsons.len(),
        joined.kernel_map.len(),
        args.output.display()
    ));
    Ok(joined)
}
