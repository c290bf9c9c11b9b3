pub mod cli;
pub mod load_config;
pub mod package_manager;

pub use cli::{run, Cli, Commands};
