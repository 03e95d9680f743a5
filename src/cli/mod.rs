pub mod commands;
pub mod ui;

pub use commands::{OutputFormat, RepoOptions};
pub use ui::Output;
