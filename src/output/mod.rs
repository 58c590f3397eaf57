//! Output module for reporting harvest results
//!
//! This module handles:
//! - Per-source statistics read back from the outputs
//! - Printing run summaries

pub mod stats;

pub use stats::{load_statistics, print_run_summary, print_statistics, SourceStatistics};
