//! Suite definitions: the ordered list of testcase invocations to run.
//!
//! A suite file is line-oriented text. Each non-blank, non-comment line
//! names a testcase followed by `key=value` parameters:
//!
//! ```text
//! # smoke checks
//! exec_check command="show version" expect=Version
//! exec_check data=commands.csv parallel
//! ```
//!
//! `data=` references a tabular parameter file and `parallel` marks the
//! entry safe to run alongside its neighbors; everything else is a static
//! parameter for the testcase. The suite name is the file stem, supplied
//! by the caller.

pub mod parse;

pub use parse::{ParseError, parse_suite};

use std::path::PathBuf;

use crate::testcase::ParamMap;
use crate::util::span::Span;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suite {
    pub name: String,
    pub entries: Vec<SuiteEntry>,
}

/// One suite line, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuiteEntry {
    pub testcase: String,
    pub params: ParamMap,
    /// Tabular data file reference, as written (resolved by the planner).
    pub data: Option<PathBuf>,
    pub parallel: bool,
    pub span: Span,
}
