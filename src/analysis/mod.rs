//! Analysis modules.
//!
//! Live aggregation during a scan cycle, and core frequency selection and
//! assignment over a parsed report.

pub mod aggregator;
pub mod assignment;

pub use aggregator::Aggregator;
pub use assignment::{assign, choose_core, core_entries, CoreAssignment};
