//! Report generation and persistence.
//!
//! This module prints the intermittent tests, saves the summary file and
//! renders the optional digest.

pub mod generator;
pub mod store;

pub use generator::{generate_json_report, generate_markdown_report, intermittent_lines};
pub use store::{save_summary, write_atomic};
