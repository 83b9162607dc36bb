//! Self-contained HTML rendering of a comparison

use crate::diff::{KernelDiff, TestDiff, TestDifferences};
use crate::git::GitRev;
use crate::kernel::{CompiledKernel, CompiledTest};
use crate::run::TestRun;
use html_escape::{encode_double_quoted_attribute, encode_text};

/// Default endpoint for the "explain this diff" button
pub const DEFAULT_EXPLAIN_API_URL: &str = "/api/explain-diff";

/// Default cap on rendered kernel diffs
pub const DEFAULT_MAX_DIFFS: usize = 200;

/// Rendering options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportOptions {
    /// Leave the preamble text out of the report
    pub omit_preamble: bool,
    /// Render at most this many kernel diffs; the rest are only counted
    pub max_diffs: usize,
    /// Endpoint embedded for client-side tooling
    pub explain_api_url: String,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            omit_preamble: false,
            max_diffs: DEFAULT_MAX_DIFFS,
            explain_api_url: DEFAULT_EXPLAIN_API_URL.to_string(),
        }
    }
}

impl ReportOptions {
    #[must_use]
    pub const fn with_omit_preamble(mut self, omit: bool) -> Self {
        self.omit_preamble = omit;
        self
    }

    #[must_use]
    pub const fn with_max_diffs(mut self, max_diffs: usize) -> Self {
        self.max_diffs = max_diffs;
        self
    }

    #[must_use]
    pub fn with_explain_api_url(mut self, url: impl Into<String>) -> Self {
        self.explain_api_url = url.into();
        self
    }
}

/// Renders [`TestDifferences`] as one HTML document
#[derive(Debug, Clone)]
pub struct ReportGenerator {
    options: ReportOptions,
    /// Revision of the tool producing the report
    tool_git: GitRev,
}

impl ReportGenerator {
    pub const fn new(options: ReportOptions, tool_git: GitRev) -> Self {
        Self { options, tool_git }
    }

    /// Render the full document
    pub fn render(&self, diffs: &TestDifferences) -> String {
        let timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
        let title = format!("Codegen diff: {} vs {}", diffs.run1.name, diffs.run2.name);
        let status = if diffs.has_differences() {
            r#"<span class="fail">DIFFERENCES FOUND</span>"#
        } else {
            r#"<span class="pass">NO DIFFERENCES</span>"#
        };

        let mut body = String::new();
        body.push_str(&render_summary(diffs));
        body.push_str(&render_runs(&diffs.run1, &diffs.run2));
        body.push_str(&self.render_preamble(diffs));
        if !diffs.env_diff.is_empty() {
            body.push_str(&format!(
                "<h2>Environment</h2>\n{}",
                render_diff_lines(diffs.env_diff.lines())
            ));
        }
        body.push_str(&self.render_test_diffs(&diffs.test_diffs, diffs.total_num_diffs));
        body.push_str(&render_test_list("New tests", &diffs.new_tests));
        body.push_str(&render_test_list("Removed tests", &diffs.removed_tests));

        format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title}</title>
    <style>
        body {{ font-family: system-ui, sans-serif; margin: 40px; background: #f5f5f5; }}
        .container {{ max-width: 1400px; margin: 0 auto; background: white; padding: 30px; border-radius: 8px; box-shadow: 0 2px 10px rgba(0,0,0,0.1); }}
        h1 {{ color: #333; border-bottom: 2px solid #76b900; padding-bottom: 10px; }}
        table {{ border-collapse: collapse; margin: 10px 0; }}
        th, td {{ text-align: left; padding: 4px 12px; border-bottom: 1px solid #eee; vertical-align: top; }}
        .summary {{ display: grid; grid-template-columns: repeat(4, 1fr); gap: 20px; margin: 20px 0; }}
        .stat {{ background: #f9f9f9; padding: 20px; border-radius: 8px; text-align: center; }}
        .stat-value {{ font-size: 2em; font-weight: bold; color: #76b900; }}
        .stat-label {{ color: #666; margin-top: 5px; }}
        .pass {{ color: #2e7d32; font-weight: bold; }}
        .fail {{ color: #c62828; font-weight: bold; }}
        pre.diff {{ background: #fafafa; padding: 10px; overflow-x: auto; font-size: 0.85em; }}
        .add {{ background: #e6ffed; }}
        .del {{ background: #ffeef0; }}
        .hunk {{ color: #6f42c1; }}
        .note {{ color: #999; font-style: italic; }}
        .timestamp {{ color: #999; font-size: 0.9em; }}
    </style>
</head>
<body>
    <div class="container" data-explain-api-url="{explain}">
        <h1>{title}</h1>
        <p>{status}</p>
{body}
        <p class="timestamp">Generated: {timestamp} by codediff {tool}</p>
    </div>
</body>
</html>"#,
            title = encode_text(&title),
            explain = encode_double_quoted_attribute(&self.options.explain_api_url),
            tool = render_commit(&self.tool_git),
        )
    }

    fn render_preamble(&self, diffs: &TestDifferences) -> String {
        if !diffs.preamble_diff.is_empty() {
            return format!(
                "<h2>Preamble</h2>\n<p class=\"fail\">Preambles differ</p>\n{}",
                render_diff_lines(diffs.preamble_diff.lines())
            );
        }
        if self.options.omit_preamble {
            return String::new();
        }
        format!(
            "<h2>Preamble</h2>\n<details><summary>{} lines, identical in both runs</summary>\n<pre>{}</pre>\n</details>\n",
            diffs.run1.preamble_size_lines,
            encode_text(&diffs.run1.preamble)
        )
    }

    fn render_test_diffs(&self, test_diffs: &[TestDiff], total: usize) -> String {
        if test_diffs.is_empty() {
            return "<h2>Kernel differences</h2>\n<p class=\"pass\">No differences found in overlapping tests</p>\n"
                .to_string();
        }
        let mut html = format!(
            "<h2>Kernel differences</h2>\n<p>{total} kernel differences from {} tests</p>\n",
            test_diffs.len()
        );
        let mut rendered = 0;
        for test in test_diffs {
            html.push_str(&format!("<h3>{}</h3>\n", encode_text(&test.testname)));
            let Some(kernel_diffs) = &test.kernel_diffs else {
                html.push_str(&format!(
                    "<p class=\"fail\">Kernel count differs: {} vs {}</p>\n",
                    test.test1.kernels.len(),
                    test.test2.kernels.len()
                ));
                continue;
            };
            for kernel_diff in kernel_diffs {
                if rendered >= self.options.max_diffs {
                    html.push_str(&format!(
                        "<p class=\"note\">Showing {rendered} of {total} kernel diffs</p>\n"
                    ));
                    return html;
                }
                html.push_str(&render_kernel_diff(kernel_diff));
                rendered += 1;
            }
        }
        html
    }
}

fn render_commit(git: &GitRev) -> String {
    let hash = if git.abbrev.is_empty() { &git.full_hash } else { &git.abbrev };
    if git.title.is_empty() {
        format!("<code>{}</code>", encode_text(hash))
    } else {
        format!("<code>{}</code> {}", encode_text(hash), encode_text(&git.title))
    }
}

fn render_summary(diffs: &TestDifferences) -> String {
    let stat = |value: usize, label: &str| {
        format!(
            "<div class=\"stat\"><div class=\"stat-value\">{value}</div><div class=\"stat-label\">{label}</div></div>"
        )
    };
    format!(
        "<div class=\"summary\">{}{}{}{}</div>\n<p>Inclusion criterion: <code>{}</code></p>\n",
        stat(diffs.total_num_diffs, "Kernel diffs"),
        stat(diffs.test_diffs.len(), "Tests with diffs"),
        stat(diffs.new_tests.len(), "New tests"),
        stat(diffs.removed_tests.len(), "Removed tests"),
        diffs.inclusion_criterion
    )
}

fn render_runs(run1: &TestRun, run2: &TestRun) -> String {
    let row = |label: &str, f: &dyn Fn(&TestRun) -> String| {
        format!("<tr><th>{label}</th><td>{}</td><td>{}</td></tr>\n", f(run1), f(run2))
    };
    let mut html = String::from("<h2>Runs</h2>\n<table>\n");
    html.push_str(&row("Name", &|r: &TestRun| encode_text(&r.name).into_owned()));
    html.push_str(&row("Commit", &|r: &TestRun| render_commit(&r.git)));
    html.push_str(&row("Author", &|r: &TestRun| {
        encode_text(&format!("{} <{}>", r.git.author_name, r.git.author_email)).into_owned()
    }));
    html.push_str(&row("Commit time", &|r: &TestRun| encode_text(&r.git.commit_time).into_owned()));
    html.push_str(&row("Command", &|r: &TestRun| format!("<code>{}</code>", encode_text(&r.command))));
    html.push_str(&row("Command type", &|r: &TestRun| r.command_type.to_string()));
    html.push_str(&row("Exit code", &|r: &TestRun| {
        let class = if r.exit_code == 0 { "pass" } else { "fail" };
        format!("<span class=\"{class}\">{}</span>", r.exit_code)
    }));
    html.push_str(&row("GPUs", &|r: &TestRun| {
        r.gpu_names
            .as_ref()
            .map(|names| encode_text(&names.join(", ")).into_owned())
            .unwrap_or_default()
    }));
    html.push_str(&row("nvcc", &|r: &TestRun| {
        r.nvcc_version
            .as_ref()
            .map(|v| format!("<pre>{}</pre>", encode_text(v.trim_end())))
            .unwrap_or_default()
    }));
    html.push_str(&row("Uncommitted changes", &|r: &TestRun| {
        r.git
            .diff
            .as_ref()
            .filter(|d| !d.trim().is_empty())
            .map(|d| format!("<details><summary>git diff</summary><pre>{}</pre></details>", encode_text(d)))
            .unwrap_or_default()
    }));
    html.push_str("</table>\n");
    html
}

fn render_kernel_diff(diff: &KernelDiff) -> String {
    let mut html = format!(
        "<div class=\"kernel-diff\">\n<h4>Kernel {} <code>{}</code> / <code>{}</code> (+{} -{})</h4>\n",
        diff.kernel_num,
        encode_text(&diff.kernel1.filename),
        encode_text(&diff.kernel2.filename),
        diff.new_lines,
        diff.removed_lines
    );
    html.push_str(&render_kernel_stats(&diff.kernel1, &diff.kernel2));
    if diff.code_diff.is_empty() {
        html.push_str("<p class=\"note\">CUDA identical</p>\n");
    } else {
        html.push_str(&render_diff_lines(diff.code_diff.iter().map(String::as_str)));
    }
    if let Some(ptx_diff) = diff.ptx_diff.as_ref().filter(|d| !d.is_empty()) {
        html.push_str(&format!(
            "<details><summary>PTX (+{} -{})</summary>\n{}</details>\n",
            diff.new_ptx_lines,
            diff.removed_ptx_lines,
            render_diff_lines(ptx_diff.iter().map(String::as_str))
        ));
    }
    html.push_str("</div>\n");
    html
}

fn render_kernel_stats(kernel1: &CompiledKernel, kernel2: &CompiledKernel) -> String {
    let (Some(s1), Some(s2)) = (&kernel1.stats, &kernel2.stats) else {
        return String::new();
    };
    let registers = |r: Option<u32>| r.map_or_else(|| "-".to_string(), |r| r.to_string());
    format!(
        "<table><tr><th></th><th>registers</th><th>smem</th><th>stack</th><th>spill st/ld</th></tr>\n\
         <tr><td>1</td><td>{}</td><td>{}</td><td>{}</td><td>{}/{}</td></tr>\n\
         <tr><td>2</td><td>{}</td><td>{}</td><td>{}</td><td>{}/{}</td></tr></table>\n",
        registers(s1.registers),
        s1.smem_bytes,
        s1.stack_frame_bytes,
        s1.spill_store_bytes,
        s1.spill_load_bytes,
        registers(s2.registers),
        s2.smem_bytes,
        s2.stack_frame_bytes,
        s2.spill_store_bytes,
        s2.spill_load_bytes,
    )
}

fn render_diff_lines<'a>(lines: impl Iterator<Item = &'a str>) -> String {
    let mut html = String::from("<pre class=\"diff\">");
    for line in lines {
        let class = if line.starts_with("@@") {
            "hunk"
        } else if line.starts_with('+') {
            "add"
        } else if line.starts_with('-') {
            "del"
        } else {
            "ctx"
        };
        html.push_str(&format!("<span class=\"{class}\">{}</span>\n", encode_text(line)));
    }
    html.push_str("</pre>\n");
    html
}

fn render_test_list(heading: &str, tests: &[CompiledTest]) -> String {
    if tests.is_empty() {
        return String::new();
    }
    let mut html = format!("<h2>{heading} ({})</h2>\n<ul>\n", tests.len());
    for test in tests {
        let outcome = if test.passed { "pass" } else { "fail" };
        html.push_str(&format!(
            "<li><span class=\"{outcome}\">{}</span> ({} kernels)",
            encode_text(&test.name),
            test.kernels.len()
        ));
        let sources: Vec<_> = test
            .kernels
            .iter()
            .filter_map(|k| k.body.as_ref().map(|b| (k, b)))
            .collect();
        if !sources.is_empty() {
            html.push_str("<details><summary>kernels</summary>\n");
            for (kernel, body) in sources {
                html.push_str(&format!(
                    "<p><code>{}</code></p><pre>{}</pre>\n",
                    encode_text(&kernel.filename),
                    encode_text(&body.code)
                ));
            }
            html.push_str("</details>");
        }
        html.push_str("</li>\n");
    }
    html.push_str("</ul>\n");
    html
}
