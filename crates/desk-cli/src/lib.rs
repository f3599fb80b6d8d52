//! CLI flags and configuration loading for the Desk bot.
//!
//! Flags fall back to `DESK_*` environment variables; an optional JSON config
//! file in the bot's historical layout takes precedence over both.

pub mod cli_args;
pub mod config_file;
pub mod settings;

pub use cli_args::Cli;
pub use config_file::{load_config_file, ConfigFile};
pub use settings::{resolve_settings, DeskSettings};
