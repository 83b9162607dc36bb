//! Captured runs.
//!
//! A run directory is produced by the test harness for one command:
//!
//! ```text
//! <run>/git_hash, command, exitcode, stdout      required
//! <run>/run_name, git_diff, command_type, env,
//!       nvcc_version, gpu_names                   optional
//! <run>/cuda/*.cu                                 generated kernels
//! <run>/ptx/*.ptx                                 PTX, when kept
//! ```

use crate::git::{GitCommand, GitQuery, GitRev};
use crate::kernel::{CompiledKernel, KernelBody, UNGROUPED_KERNELS};
use crate::log_parser::{CommandType, KernelMap};
use crate::normalize::{normalize_index_typedef, Normalize, SourceNormalizer};
use crate::result::{CodediffError, CodediffResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Upper bound on kernel files examined when detecting the preamble
pub const MAX_PREAMBLE_FILES: usize = 50;

#[allow(clippy::expect_used)]
static KERNEL_DEFINITION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"void (nvfuser|kernel)_?\d+\b").expect("static regex"));

#[allow(clippy::expect_used)]
static INDEX_TYPEDEF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"typedef\s+(\S*)\s+nvfuser_index_t;").expect("static regex"));

static SOURCE_NORMALIZER: LazyLock<SourceNormalizer> = LazyLock::new(SourceNormalizer::default);

/// A single process that might contain many kernels, grouped into tests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestRun {
    pub directory: PathBuf,
    pub git: GitRev,
    pub name: String,
    pub command: String,
    pub command_type: CommandType,
    pub exit_code: i32,
    pub env: Option<String>,
    pub gpu_names: Option<Vec<String>>,
    pub nvcc_version: Option<String>,
    /// Test name to test, in log order
    pub kernel_map: KernelMap,
    /// Lines shared by the start of (nearly) every kernel file
    pub preamble: String,
    /// Number of lines in `preamble`; the preamble's byte length varies with
    /// the index type, so stripping goes by line count
    pub preamble_size_lines: usize,
}

impl TestRun {
    /// Read a run directory, resolving git metadata with the `git` binary
    pub fn from_dir(directory: impl AsRef<Path>) -> CodediffResult<Self> {
        Self::from_dir_with_git(directory, &GitCommand::new())
    }

    /// Read a run directory, resolving git metadata through `git`
    pub fn from_dir_with_git(directory: impl AsRef<Path>, git: &dyn GitQuery) -> CodediffResult<Self> {
        let directory = directory.as_ref().to_path_buf();
        if !directory.is_dir() {
            return Err(CodediffError::NotADirectory { path: directory });
        }

        let name = match read_optional(&directory.join("run_name"))? {
            Some(name) => name.trim_end().to_string(),
            None => directory
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| directory.display().to_string()),
        };

        let git_diff = read_optional(&directory.join("git_diff"))?;
        let git_hash = read_required(&directory, "git_hash")?;
        let git = GitRev::resolve(git_hash.trim(), git_diff, git);

        let command = read_required(&directory, "command")?.trim_end().to_string();

        let command_type = match read_optional(&directory.join("command_type"))? {
            Some(tag) => CommandType::from_tag(&tag),
            None => {
                tracing::warn!(
                    "Could not find {}. Parsing as UNKNOWN command type means kernels will be ungrouped.",
                    directory.join("command_type").display()
                );
                CommandType::Unknown
            }
        };

        // testdir is set by the harness script and differs between every run
        let env = read_optional(&directory.join("env"))?.map(|env| {
            env.split_inclusive('\n')
                .filter(|line| !line.starts_with("testdir="))
                .collect::<String>()
        });

        let nvcc_version = read_optional(&directory.join("nvcc_version"))?;

        let gpu_names = read_optional(&directory.join("gpu_names"))?.map(|names| {
            names
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect()
        });

        let exit_code_path = directory.join("exitcode");
        let exit_code_text = read_required(&directory, "exitcode")?;
        let exit_code = exit_code_text
            .trim()
            .parse()
            .map_err(|_| CodediffError::InvalidExitCode {
                path: exit_code_path,
                value: exit_code_text.trim().to_string(),
            })?;

        let kernel_map = compute_kernel_map(&directory, command_type)?;
        let preamble_lines = detect_preamble(&directory.join("cuda"))?;

        tracing::debug!(
            run = %name,
            tests = kernel_map.len(),
            preamble_lines = preamble_lines.len(),
            "parsed run directory"
        );

        Ok(Self {
            directory,
            git,
            name,
            command,
            command_type,
            exit_code,
            env,
            gpu_names,
            nvcc_version,
            kernel_map,
            preamble_size_lines: preamble_lines.len(),
            preamble: preamble_lines.join("\n"),
        })
    }

    /// Total kernels across all tests
    pub fn kernel_count(&self) -> usize {
        self.kernel_map.values().map(|t| t.kernels.len()).sum()
    }

    /// Read a kernel's source (and PTX, if present) from the run directory.
    ///
    /// `nvfuser_<N>` identifiers are rewritten to `nvfuser_N`. With
    /// `strip_preamble`, lines belonging to the preamble and the closing brace
    /// of the enclosing namespace are dropped.
    pub fn load_kernel_body(&self, filename: &str, strip_preamble: bool) -> CodediffResult<KernelBody> {
        let cuda_dir = self.directory.join("cuda");
        let text = match fs::read(cuda_dir.join(filename)) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(CodediffError::MissingFile {
                    dir: cuda_dir,
                    name: filename.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        let mut index_type = None;
        let mut lines = Vec::new();
        for (i, line) in text.lines().enumerate() {
            if index_type.is_none() {
                index_type = INDEX_TYPEDEF.captures(line).map(|c| c[1].to_string());
            }
            if !strip_preamble || i >= self.preamble_size_lines {
                lines.push(SOURCE_NORMALIZER.normalize_line(line).into_owned());
            }
        }
        trim_trailing_blank(&mut lines);
        if strip_preamble && lines.last().is_some_and(|l| l.trim_end() == "}") {
            lines.pop();
            trim_trailing_blank(&mut lines);
        }
        let code = lines.join("\n").trim_end().to_string();

        let ptx_path = self
            .directory
            .join("ptx")
            .join(Path::new(filename).with_extension("ptx"));
        let ptx = read_optional(&ptx_path)?.map(|p| p.trim_end().to_string());

        Ok(KernelBody {
            code,
            ptx,
            index_type,
        })
    }

    /// Load (or reload) the body of one kernel, stripping the preamble
    pub fn load_kernel(&mut self, test: &str, index: usize) -> CodediffResult<&CompiledKernel> {
        let filename = self.kernel(test, index)?.filename.clone();
        let body = self.load_kernel_body(&filename, true)?;
        let kernel = self
            .kernel_map
            .get_mut(test)
            .and_then(|t| t.kernels.get_mut(index))
            .ok_or_else(|| unknown_kernel(test, index))?;
        kernel.body = Some(body);
        Ok(kernel)
    }

    /// Copy of a kernel with its body, reading it from disk only if not yet loaded
    pub fn loaded_kernel(&self, test: &str, index: usize) -> CodediffResult<CompiledKernel> {
        let mut kernel = self.kernel(test, index)?.clone();
        if kernel.body.is_none() {
            kernel.body = Some(self.load_kernel_body(&kernel.filename, true)?);
        }
        Ok(kernel)
    }

    fn kernel(&self, test: &str, index: usize) -> CodediffResult<&CompiledKernel> {
        self.kernel_map
            .get(test)
            .and_then(|t| t.kernels.get(index))
            .ok_or_else(|| unknown_kernel(test, index))
    }

    /// Concatenate a shard of the same logical run into this one.
    ///
    /// Both runs must come from the same commit, preamble and command type.
    /// Nothing is modified if any check fails.
    pub fn join(&mut self, other: Self) -> CodediffResult<()> {
        if self.git != other.git {
            return Err(CodediffError::JoinMismatch { field: "git revision" });
        }
        if self.preamble_size_lines != other.preamble_size_lines || self.preamble != other.preamble {
            return Err(CodediffError::JoinMismatch { field: "preamble" });
        }
        if self.command_type != other.command_type {
            return Err(CodediffError::JoinMismatch { field: "command type" });
        }
        if let Some(name) = other
            .kernel_map
            .keys()
            .find(|name| name.as_str() != UNGROUPED_KERNELS && self.kernel_map.contains_key(*name))
        {
            return Err(CodediffError::DuplicateTest { name: name.clone() });
        }

        // name of the receiver is kept

        if other.nvcc_version != self.nvcc_version {
            self.nvcc_version = concat_optional(self.nvcc_version.take(), other.nvcc_version, "");
        }

        // shards usually run on different nodes, so their envs differ
        if other.env != self.env {
            self.env = concat_optional(self.env.take(), other.env, "\n");
        }

        match (&mut self.gpu_names, other.gpu_names) {
            (Some(mine), Some(theirs)) => mine.extend(theirs),
            (mine @ None, theirs) => *mine = theirs,
            (Some(_), None) => {}
        }

        self.command = format!("{} && {}", self.command, other.command);

        // a non-zero sum means at least one shard failed
        self.exit_code = self.exit_code.saturating_add(other.exit_code);

        for (name, test) in other.kernel_map {
            if name == UNGROUPED_KERNELS {
                if let Some(group) = self.kernel_map.get_mut(&name) {
                    group.kernels.extend(test.kernels);
                    group.passed &= test.passed;
                    continue;
                }
            }
            self.kernel_map.insert(name, test);
        }
        Ok(())
    }

    /// Join a sequence of shards, left to right
    pub fn join_all(runs: impl IntoIterator<Item = Self>) -> CodediffResult<Self> {
        let mut runs = runs.into_iter();
        let mut joined = runs.next().ok_or(CodediffError::NoRuns)?;
        for run in runs {
            joined.join(run)?;
        }
        Ok(joined)
    }
}

/// Run the log parser matching `command_type` over `<dir>/stdout`
fn compute_kernel_map(directory: &Path, command_type: CommandType) -> CodediffResult<KernelMap> {
    let file = match fs::File::open(directory.join("stdout")) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(CodediffError::MissingFile {
                dir: directory.to_path_buf(),
                name: "stdout".to_string(),
            })
        }
        Err(e) => return Err(e.into()),
    };
    command_type.parse_log(BufReader::new(file))
}

/// Find the lines shared by the start of every kernel file in `cuda_dir`.
///
/// Files are visited in name order and at most [`MAX_PREAMBLE_FILES`] are read.
/// Each file contributes its lines up to the kernel definition; the preamble is
/// their longest common prefix.
pub fn detect_preamble(cuda_dir: &Path) -> CodediffResult<Vec<String>> {
    let entries = match fs::read_dir(cuda_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "cu") {
            files.push(path);
        }
    }
    files.sort();

    let mut preamble: Option<Vec<String>> = None;
    for path in files.iter().take(MAX_PREAMBLE_FILES) {
        let text = String::from_utf8_lossy(&fs::read(path)?).into_owned();
        let head = text
            .lines()
            .map(|line| normalize_index_typedef(line.trim_end()))
            .take_while(|line| !KERNEL_DEFINITION.is_match(line));

        if let Some(lines) = preamble.as_mut() {
            let common = lines
                .iter()
                .zip(head)
                .take_while(|(kept, line)| kept.as_str() == *line)
                .count();
            lines.truncate(common);
        } else {
            preamble = Some(head.map(str::to_string).collect());
        }

        if preamble.as_ref().is_some_and(Vec::is_empty) {
            break;
        }
    }
    Ok(preamble.unwrap_or_default())
}

fn unknown_kernel(test: &str, index: usize) -> CodediffError {
    CodediffError::UnknownKernel {
        test: test.to_string(),
        index,
    }
}

fn trim_trailing_blank(lines: &mut Vec<String>) {
    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }
}

fn concat_optional(mine: Option<String>, theirs: Option<String>, separator: &str) -> Option<String> {
    match (mine, theirs) {
        (Some(mine), Some(theirs)) => Some(format!("{mine}{separator}{theirs}")),
        (mine, theirs) => mine.or(theirs),
    }
}

fn read_optional(path: &Path) -> CodediffResult<Option<String>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn read_required(directory: &Path, name: &str) -> CodediffResult<String> {
    read_optional(&directory.join(name))?.ok_or_else(|| CodediffError::MissingFile {
        dir: directory.to_path_buf(),
        name: name.to_string(),
    })
}
