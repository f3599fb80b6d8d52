//! Merges the config file with flags and environment into runtime settings.

use std::{path::PathBuf, time::Duration};

use anyhow::{anyhow, bail, Result};
use desk_tickets::{
    config::{DEFAULT_MAX_TICKETS_PER_USER, DEFAULT_RATE_LIMIT_SECONDS},
    CategoryId, ChannelId, RoleId, TicketConfig,
};

use crate::{Cli, ConfigFile};

/// Fully resolved startup settings.
#[derive(Clone)]
pub struct DeskSettings {
    pub bot_token: String,
    pub guild_id: u64,
    pub tickets: TicketConfig,
    pub record_path: PathBuf,
}

impl std::fmt::Debug for DeskSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeskSettings")
            .field("bot_token", &"<redacted>")
            .field("guild_id", &self.guild_id)
            .field("tickets", &self.tickets)
            .field("record_path", &self.record_path)
            .finish()
    }
}

fn required(value: Option<u64>, name: &str) -> Result<u64> {
    match value {
        Some(0) => bail!("{name} must be a non-zero id"),
        Some(value) => Ok(value),
        None => bail!("missing required setting '{name}'"),
    }
}

/// File values win; flags and environment fill whatever the file leaves out.
pub fn resolve_settings(cli: &Cli, file: Option<ConfigFile>) -> Result<DeskSettings> {
    let file = file.unwrap_or_default();

    let bot_token = file
        .bot_token
        .filter(|token| !token.trim().is_empty())
        .or_else(|| cli.bot_token.clone())
        .filter(|token| !token.trim().is_empty())
        .ok_or_else(|| anyhow!("no bot token provided (set bot_token or DISCORD_BOT_TOKEN)"))?;

    let tickets = TicketConfig {
        staff_role_id: RoleId::new(required(file.staff_role_id.or(cli.staff_role_id), "staff_role_id")?),
        unlimited_tickets_role_id: file
            .unlimited_tickets_role_id
            .or(cli.unlimited_tickets_role_id)
            .filter(|role| *role != 0)
            .map(RoleId::new),
        intake_channel_id: ChannelId::new(required(
            file.ticket_channel_id.or(cli.ticket_channel_id),
            "ticket_channel_id",
        )?),
        archive_channel_id: ChannelId::new(required(
            file.transcripts_channel_id.or(cli.transcripts_channel_id),
            "transcripts_channel_id",
        )?),
        support_category_id: CategoryId::new(required(
            file.categories.support.or(cli.support_category_id),
            "categories.support",
        )?),
        partnership_category_id: CategoryId::new(required(
            file.categories.partnership.or(cli.partnership_category_id),
            "categories.partnership",
        )?),
        transfer_category_id: CategoryId::new(required(
            file.categories.transfer.or(cli.transfer_category_id),
            "categories.transfer",
        )?),
        cooldown: Duration::from_secs(
            file.settings
                .rate_limit_seconds
                .or(cli.rate_limit_seconds)
                .unwrap_or(DEFAULT_RATE_LIMIT_SECONDS),
        ),
        max_tickets_per_user: file
            .settings
            .max_tickets_per_user
            .or(cli.max_tickets_per_user)
            .unwrap_or(DEFAULT_MAX_TICKETS_PER_USER),
        close_grace_delay: Duration::from_millis(cli.close_grace_ms),
        recovery_history_window: cli.recovery_window,
    };
    tickets
        .validate()
        .map_err(|error| anyhow!("invalid ticket configuration: {error}"))?;

    Ok(DeskSettings {
        bot_token,
        guild_id: required(file.guild_id.or(cli.guild_id), "guild_id")?,
        tickets,
        record_path: cli.record_file.clone(),
    })
}
