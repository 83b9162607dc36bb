//! Report command handler

use crate::config::CliConfig;
use crate::error::CliResult;
use crate::output::ProgressReporter;
use crate::DiffReportArgs;
use codediff::{load_json, GitCommand, GitRev, ReportGenerator, ReportOptions, TestDifferences};
use std::fs;

/// Execute the diff_report command: render a diff JSON as HTML
pub fn execute_report(config: &CliConfig, args: &DiffReportArgs) -> CliResult<()> {
    let reporter = ProgressReporter::new(config.color.should_color_stderr(), config.verbosity.is_quiet());

    let mut differences: TestDifferences = load_json(&args.input_json)?;
    if args.hide_env {
        differences.hide_env();
    }

    let html = render(&differences, args, GitRev::head(&GitCommand::new()));

    if let Some(parent) = args.output_html.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(&args.output_html, html)?;
    reporter.success(&format!("Report generated at: {}", args.output_html.display()));
    Ok(())
}

/// Render `differences` with the options from `args`
#[must_use]
pub fn render(differences: &TestDifferences, args: &DiffReportArgs, tool_git: GitRev) -> String {
    let options = ReportOptions::default()
        .with_omit_preamble(args.omit_preamble)
        .with_max_diffs(args.max_diffs)
        .with_explain_api_url(args.explain_api_url.as_str());
    ReportGenerator::new(options, tool_git).render(differences)
}
