//! netrig: test orchestration for network device labs.
//!
//! The engine resolves a declared device/link topology, plans an ordered
//! suite of testcases against it, and runs the plan with exclusive device
//! ownership, retry and abort policy, and per-run log capture.
//!
//! Pipeline: [`topo`] and [`data`] feed the [`plan`] module, which produces
//! an execution plan the [`runner`] consumes; the runner obtains device
//! sessions through the [`plugin`] registry and records outcomes through
//! [`logs`]. The [`cli`] module is the thin front end over all of it.

pub mod cli;
pub mod data;
pub mod logs;
pub mod plan;
pub mod plugin;
pub mod runner;
pub mod suite;
pub mod testcase;
pub mod topo;
pub mod util;
