//! Command handlers
//!
//! Each handler module contains:
//! - The execution logic for a CLI command
//! - Pure helper functions
//! - Tests against on-disk fixtures

pub mod diff;
pub mod join;
pub mod parse;
pub mod report;

pub use diff::{execute_diff, mismatch_warnings, summary_lines};
pub use join::execute_join;
pub use parse::execute_parse;
pub use report::execute_report;
