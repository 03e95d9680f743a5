pub mod output;

pub use output::{Output, format_bytes, format_duration_ms};
