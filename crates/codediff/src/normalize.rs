//! Text normalization applied before comparing kernels.
//!
//! Generated code carries details that change between otherwise identical
//! compilations: an auto-incrementing kernel counter in CUDA sources, the
//! kernel ordinal baked into PTX mangled names, and non-repeatable call
//! sequence comments in PTX. Each artifact kind gets one [`Normalize`]
//! implementation; the patterns are replaceable for other toolchains.

use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;

/// Placeholder written for the `nvfuser_index_t` typedef when comparing preambles
pub const INDEX_TYPEDEF_PLACEHOLDER: &str =
    "typedef int nvfuser_index_t; // NOTE: index type hard-coded as int for display only";

#[allow(clippy::expect_used)]
static KERNEL_COUNTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bnvfuser_\d+\b").expect("static regex"));

#[allow(clippy::expect_used)]
static MANGLED_SCOPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<prefix>.*\b_Z?ZN)(?P<scopelen>\d+)_").expect("static regex"));

#[allow(clippy::expect_used)]
static LEADING_LENGTH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+").expect("static regex"));

#[allow(clippy::expect_used)]
static LINE_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"//.*$").expect("static regex"));

/// Rewrites text so that incidental differences compare equal
pub trait Normalize: std::fmt::Debug {
    /// Normalize a single line
    fn normalize_line<'a>(&self, line: &'a str) -> Cow<'a, str>;

    /// Normalize every line of `text`
    fn normalize_lines(&self, text: &str) -> Vec<String> {
        text.lines()
            .map(|line| self.normalize_line(line).into_owned())
            .collect()
    }
}

/// CUDA source normalization: `nvfuser_123` becomes `nvfuser_N`
#[derive(Debug, Clone)]
pub struct SourceNormalizer {
    counter: Regex,
    replacement: String,
}

impl Default for SourceNormalizer {
    fn default() -> Self {
        Self {
            counter: KERNEL_COUNTER.clone(),
            replacement: "nvfuser_N".to_string(),
        }
    }
}

impl SourceNormalizer {
    /// Replace matches of `pattern` with `replacement` instead of the nvFuser counter
    pub fn with_pattern(pattern: &str, replacement: impl Into<String>) -> Result<Self, regex::Error> {
        Ok(Self {
            counter: Regex::new(pattern)?,
            replacement: replacement.into(),
        })
    }
}

impl Normalize for SourceNormalizer {
    fn normalize_line<'a>(&self, line: &'a str) -> Cow<'a, str> {
        self.counter.replace_all(line, self.replacement.as_str())
    }
}

/// PTX normalization: demangle kernel scope/name and drop `//` comments.
///
/// A name like
/// `_ZN76_GLOBAL__N__00000000_37___tmp_kernel_4_cu_8995cef2_3255329nvfuser_4ENS_6TensorIfLi2ELi2EEES1_S1_`
/// becomes `_ZN11kernelscope6kernelENS_6TensorIfLi2ELi2EEES1_S1_`.
#[derive(Debug, Clone)]
pub struct PtxNormalizer {
    mangled_scope: Regex,
    comment: Regex,
}

impl Default for PtxNormalizer {
    fn default() -> Self {
        Self {
            mangled_scope: MANGLED_SCOPE.clone(),
            comment: LINE_COMMENT.clone(),
        }
    }
}

impl PtxNormalizer {
    /// Use a different mangled-scope pattern.
    ///
    /// The pattern must define the named groups `prefix` (everything up to the
    /// first length field) and `scopelen` (the scope name's decimal length).
    pub fn with_pattern(mangled_scope: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            mangled_scope: Regex::new(mangled_scope)?,
            comment: LINE_COMMENT.clone(),
        })
    }

    fn demangle<'a>(&self, line: &'a str) -> Cow<'a, str> {
        let Some(caps) = self.mangled_scope.captures(line) else {
            return Cow::Borrowed(line);
        };
        let (Some(prefix), Some(scopelen)) = (caps.name("prefix"), caps.name("scopelen")) else {
            return Cow::Borrowed(line);
        };
        let Ok(scope_chars) = scopelen.as_str().parse::<usize>() else {
            return Cow::Borrowed(line);
        };

        let mut remainder = skip_chars(&line[scopelen.end()..], scope_chars);
        let mut kernel = "";
        if let Some(len) = LEADING_LENGTH.find(remainder) {
            if let Ok(name_chars) = len.as_str().parse::<usize>() {
                kernel = "6kernel";
                remainder = skip_chars(&remainder[len.end()..], name_chars);
            }
        }

        Cow::Owned(format!(
            "{}11kernelscope{kernel}{remainder}",
            prefix.as_str()
        ))
    }
}

impl Normalize for PtxNormalizer {
    fn normalize_line<'a>(&self, line: &'a str) -> Cow<'a, str> {
        match self.demangle(line) {
            Cow::Borrowed(line) => self.comment.replace(line, ""),
            Cow::Owned(line) => Cow::Owned(self.comment.replace(&line, "").into_owned()),
        }
    }
}

/// `text` without its first `n` characters; empty if it is shorter
fn skip_chars(text: &str, n: usize) -> &str {
    text.char_indices().nth(n).map_or("", |(i, _)| &text[i..])
}

/// Replace an `nvfuser_index_t` typedef with a fixed line; other lines pass through
pub fn normalize_index_typedef(line: &str) -> &str {
    if line.starts_with("typedef ") && line.ends_with(" nvfuser_index_t;") {
        INDEX_TYPEDEF_PLACEHOLDER
    } else {
        line
    }
}
