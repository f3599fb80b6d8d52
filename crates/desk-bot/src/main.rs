mod bootstrap_helpers;

use anyhow::{Context, Result};
use clap::Parser;
use desk_cli::{load_config_file, resolve_settings, Cli};
use desk_discord_runtime::{run_discord_runtime, DiscordRuntimeConfig};

use crate::bootstrap_helpers::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let file = load_config_file(&cli.config)?;
    if file.is_none() {
        tracing::info!(path = %cli.config.display(), "config file not found; using flags and environment");
    }
    let settings = resolve_settings(&cli, file).context("failed to resolve configuration")?;
    tracing::info!(
        guild_id = settings.guild_id,
        record_file = %settings.record_path.display(),
        cooldown_secs = settings.tickets.cooldown.as_secs(),
        max_tickets_per_user = settings.tickets.max_tickets_per_user,
        "starting desk"
    );

    run_discord_runtime(DiscordRuntimeConfig {
        bot_token: settings.bot_token,
        guild_id: settings.guild_id,
        tickets: settings.tickets,
        record_path: settings.record_path,
    })
    .await
}
