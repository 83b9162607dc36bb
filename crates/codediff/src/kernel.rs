//! Kernel and test records built while parsing a run's stdout.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;

#[allow(clippy::expect_used)]
static ENTRY_FUNCTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Compiling entry function '(.*)' for '(.*)'").expect("static regex")
});

#[allow(clippy::expect_used)]
static CMEM_BANK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+) bytes cmem\[(\d+)\]").expect("static regex"));

#[allow(clippy::expect_used)]
static LAUNCH_PARAMS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"Launch Parameters: BlockDim\.x = (-?\d+), BlockDim\.y = (-?\d+), BlockDim\.z = (-?\d+), GridDim\.x = (-?\d+), GridDim\.y = (-?\d+), GridDim\.z = (-?\d+), Smem Size = (-?\d+)$",
    )
    .expect("static regex")
});

/// Name of the synthetic test holding kernels that no test boundary claimed
pub const UNGROUPED_KERNELS: &str = "Ungrouped Kernels";

/// Resource usage reported by `ptxas -v` for one kernel.
///
/// Example block:
///
/// ```text
/// ptxas info    : 307 bytes gmem
/// ptxas info    : Compiling entry function '_ZN..._kernel...' for 'sm_86'
/// ptxas         .     0 bytes stack frame, 0 bytes spill stores, 0 bytes spill loads
/// ptxas info    : Used 203 registers, 16 bytes smem, 472 bytes cmem[0], 8 bytes cmem[2]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KernelCompilationStats {
    /// Registers per thread
    pub registers: Option<u32>,
    /// Static shared memory bytes
    pub smem_bytes: u64,
    /// Global memory bytes
    pub gmem_bytes: u64,
    /// Constant memory bytes, by bank
    pub cmem_bank_bytes: BTreeMap<u32, u64>,
    /// Stack frame bytes
    pub stack_frame_bytes: u64,
    /// Spill store bytes
    pub spill_store_bytes: u64,
    /// Spill load bytes
    pub spill_load_bytes: u64,
    /// Mangled entry-point name
    pub mangled_name: Option<String>,
    /// Target architecture, e.g. `sm_86`
    pub arch: Option<String>,
}

impl KernelCompilationStats {
    /// Parse a block of `ptxas` lines. Returns `None` for an empty block.
    pub fn parse(ptxas_info: &str) -> Option<Self> {
        if ptxas_info.trim().is_empty() {
            return None;
        }

        let (mangled_name, arch) = match ENTRY_FUNCTION.captures(ptxas_info) {
            Some(caps) => (Some(caps[1].to_string()), Some(caps[2].to_string())),
            None => (None, None),
        };

        let mut cmem_bank_bytes = BTreeMap::new();
        for caps in CMEM_BANK.captures_iter(ptxas_info) {
            if let (Ok(nbytes), Ok(bank)) = (caps[1].parse::<u64>(), caps[2].parse::<u32>()) {
                cmem_bank_bytes.insert(bank, nbytes);
            }
        }

        Some(Self {
            registers: find_count(ptxas_info, "registers"),
            smem_bytes: find_count(ptxas_info, "bytes smem").unwrap_or(0),
            gmem_bytes: find_count(ptxas_info, "bytes gmem").unwrap_or(0),
            cmem_bank_bytes,
            stack_frame_bytes: find_count(ptxas_info, "bytes stack frame").unwrap_or(0),
            spill_store_bytes: find_count(ptxas_info, "bytes spill stores").unwrap_or(0),
            spill_load_bytes: find_count(ptxas_info, "bytes spill loads").unwrap_or(0),
            mangled_name,
            arch,
        })
    }
}

/// First integer immediately preceding `label`, e.g. `203` in `203 registers`
fn find_count<T: std::str::FromStr>(text: &str, label: &str) -> Option<T> {
    text.match_indices(label).find_map(|(pos, _)| {
        let head = text[..pos].strip_suffix(' ')?;
        let digits = head.bytes().rev().take_while(u8::is_ascii_digit).count();
        head[head.len() - digits..].parse().ok()
    })
}

/// Block and grid dimensions of a kernel launch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchParams {
    /// `BlockDim.{x,y,z}`
    pub block_dim: [i64; 3],
    /// `GridDim.{x,y,z}`; `-1` means unset
    pub grid_dim: [i64; 3],
    /// Dynamic shared memory bytes
    pub dynamic_smem_bytes: i64,
}

impl LaunchParams {
    /// Parse one `Launch Parameters: ...` line
    pub fn parse_line(line: &str) -> Option<Self> {
        let caps = LAUNCH_PARAMS.captures(line)?;
        let mut values = [0_i64; 7];
        for (slot, i) in values.iter_mut().zip(1..) {
            *slot = caps[i].parse().ok()?;
        }
        Some(Self {
            block_dim: [values[0], values[1], values[2]],
            grid_dim: [values[3], values[4], values[5]],
            dynamic_smem_bytes: values[6],
        })
    }

    /// Parse every dump for one kernel, keeping the first.
    ///
    /// Launch parameters are printed once per launch, so a kernel that ran
    /// several times produces several lines.
    pub fn parse_dumps(filename: &str, dumps: &str) -> Option<Self> {
        let mut first: Option<Self> = None;
        for line in dumps.lines().filter(|l| !l.trim().is_empty()) {
            let Some(params) = Self::parse_line(line) else {
                tracing::warn!(kernel = filename, line, "Could not parse launch parameters");
                continue;
            };
            match first {
                None => first = Some(params),
                Some(kept) => {
                    if kept != params {
                        tracing::warn!(
                            kernel = filename,
                            "Found multiple mismatched launch params for one kernel. Only using first"
                        );
                        break;
                    }
                }
            }
        }
        first
    }
}

/// Loaded contents of a kernel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelBody {
    /// CUDA source, possibly with the preamble stripped
    pub code: String,
    /// PTX, if the run kept it
    pub ptx: Option<String>,
    /// Type named by the `nvfuser_index_t` typedef
    pub index_type: Option<String>,
}

/// One generated kernel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledKernel {
    /// File name under the run's `cuda/` directory
    pub filename: String,
    /// Raw `ptxas` lines printed for this kernel
    #[serde(default)]
    pub ptxas_info: String,
    /// Raw `Launch Parameters:` lines printed for this kernel
    #[serde(default)]
    pub launch_params_str: String,
    /// Parsed `ptxas` resource usage
    #[serde(default)]
    pub stats: Option<KernelCompilationStats>,
    /// Parsed launch parameters
    #[serde(default)]
    pub launch_params: Option<LaunchParams>,
    /// Contents, once loaded
    #[serde(default)]
    pub body: Option<KernelBody>,
}

impl CompiledKernel {
    /// Kernel announced by `filename` with no diagnostics
    #[must_use]
    pub fn new(filename: impl Into<String>) -> Self {
        Self::with_diagnostics(filename, String::new(), String::new())
    }

    /// Kernel with its accumulated `ptxas` and launch-parameter text
    #[must_use]
    pub fn with_diagnostics(
        filename: impl Into<String>,
        ptxas_info: String,
        launch_params_str: String,
    ) -> Self {
        let filename = filename.into();
        let stats = KernelCompilationStats::parse(&ptxas_info);
        let launch_params = LaunchParams::parse_dumps(&filename, &launch_params_str);
        Self {
            filename,
            ptxas_info,
            launch_params_str,
            stats,
            launch_params,
            body: None,
        }
    }

    /// Whether the body has been loaded
    pub const fn is_loaded(&self) -> bool {
        self.body.is_some()
    }
}

/// Timing line printed by a Google Benchmark binary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub gpu_time: String,
    pub gpu_time_unit: String,
    pub cpu_time: String,
    pub cpu_time_unit: String,
    pub iterations: Option<String>,
}

/// One grouping of kernels. A run holds many of these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledTest {
    pub name: String,
    pub kernels: Vec<CompiledKernel>,
    #[serde(default = "default_passed")]
    pub passed: bool,
    #[serde(default)]
    pub benchmark_result: Option<BenchmarkResult>,
}

const fn default_passed() -> bool {
    true
}

impl CompiledTest {
    /// Test with the given kernels and pass status
    #[must_use]
    pub fn new(name: impl Into<String>, kernels: Vec<CompiledKernel>, passed: bool) -> Self {
        Self {
            name: name.into(),
            kernels,
            passed,
            benchmark_result: None,
        }
    }
}
