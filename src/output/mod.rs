//! Output formatting module
//!
//! Renders a finished run as a spec tree, JSON, CSV or a one-line summary.

mod formatter;

pub use formatter::{write_summary_to_file, OutputFormat, ResultFormatter};
