use std::path::PathBuf;

use clap::Parser;
use desk_tickets::{
    config::{DEFAULT_CLOSE_GRACE_DELAY_MS, DEFAULT_RECOVERY_HISTORY_WINDOW},
    DEFAULT_RECORD_FILE,
};

fn parse_positive_usize(value: &str) -> Result<usize, String> {
    let parsed = value
        .parse::<usize>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_snowflake(value: &str) -> Result<u64, String> {
    let parsed = value
        .trim()
        .parse::<u64>()
        .map_err(|error| format!("failed to parse id: {error}"))?;
    if parsed == 0 {
        return Err("id must be non-zero".to_string());
    }
    Ok(parsed)
}

#[derive(Debug, Parser)]
#[command(
    name = "desk",
    about = "Support ticket bot for Discord servers",
    version
)]
pub struct Cli {
    #[arg(
        long,
        env = "DESK_CONFIG",
        default_value = "config.json",
        help = "JSON config file. Values found there take precedence over flags and environment."
    )]
    pub config: PathBuf,

    #[arg(long, env = "DISCORD_BOT_TOKEN", hide_env_values = true, help = "Discord bot token.")]
    pub bot_token: Option<String>,

    #[arg(long, env = "DESK_GUILD_ID", value_parser = parse_snowflake, help = "Server (guild) the bot manages.")]
    pub guild_id: Option<u64>,

    #[arg(long, env = "DESK_STAFF_ROLE_ID", value_parser = parse_snowflake)]
    pub staff_role_id: Option<u64>,

    #[arg(
        long,
        env = "DESK_UNLIMITED_TICKETS_ROLE_ID",
        value_parser = parse_snowflake,
        help = "Role exempt from the open ticket cap."
    )]
    pub unlimited_tickets_role_id: Option<u64>,

    #[arg(
        long,
        env = "DESK_TICKET_CHANNEL_ID",
        value_parser = parse_snowflake,
        help = "Channel holding the ticket intake panel."
    )]
    pub ticket_channel_id: Option<u64>,

    #[arg(
        long,
        env = "DESK_TRANSCRIPTS_CHANNEL_ID",
        value_parser = parse_snowflake,
        help = "Channel receiving ticket transcripts."
    )]
    pub transcripts_channel_id: Option<u64>,

    #[arg(long, env = "DESK_SUPPORT_CATEGORY_ID", value_parser = parse_snowflake)]
    pub support_category_id: Option<u64>,

    #[arg(long, env = "DESK_PARTNERSHIP_CATEGORY_ID", value_parser = parse_snowflake)]
    pub partnership_category_id: Option<u64>,

    #[arg(long, env = "DESK_TRANSFER_CATEGORY_ID", value_parser = parse_snowflake)]
    pub transfer_category_id: Option<u64>,

    #[arg(
        long,
        env = "DESK_RATE_LIMIT_SECONDS",
        help = "Cooldown between ticket interactions per user (default 10)."
    )]
    pub rate_limit_seconds: Option<u64>,

    #[arg(
        long,
        env = "DESK_MAX_TICKETS_PER_USER",
        value_parser = parse_positive_usize,
        help = "Open tickets allowed per user (default 1)."
    )]
    pub max_tickets_per_user: Option<usize>,

    #[arg(
        long,
        env = "DESK_CLOSE_GRACE_MS",
        default_value_t = DEFAULT_CLOSE_GRACE_DELAY_MS,
        help = "Delay between closing a ticket and deleting its channel."
    )]
    pub close_grace_ms: u64,

    #[arg(
        long,
        env = "DESK_RECOVERY_WINDOW",
        default_value_t = DEFAULT_RECOVERY_HISTORY_WINDOW,
        value_parser = parse_positive_usize,
        help = "Recent messages scanned per ticket when restoring controls at startup."
    )]
    pub recovery_window: usize,

    #[arg(long, env = "DESK_RECORD_FILE", default_value = DEFAULT_RECORD_FILE)]
    pub record_file: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_flags() {
        let cli = Cli::try_parse_from(["desk"]).expect("parse");
        assert_eq!(cli.config, PathBuf::from("config.json"));
        assert_eq!(cli.close_grace_ms, DEFAULT_CLOSE_GRACE_DELAY_MS);
        assert_eq!(cli.recovery_window, DEFAULT_RECOVERY_HISTORY_WINDOW);
        assert_eq!(cli.record_file, PathBuf::from(DEFAULT_RECORD_FILE));
    }

    #[test]
    fn rejects_zero_ids_and_caps() {
        assert!(Cli::try_parse_from(["desk", "--staff-role-id", "0"]).is_err());
        assert!(Cli::try_parse_from(["desk", "--max-tickets-per-user", "0"]).is_err());
        let cli = Cli::try_parse_from(["desk", "--guild-id", "123"]).expect("parse");
        assert_eq!(cli.guild_id, Some(123));
    }
}
