//! Staff `!` command parsing and reply text.

use desk_tickets::UserId;
use serenity::all::Permissions;

use super::COMMAND_PREFIX;

/// Who may run a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum CommandAuthority {
    StaffRole,
    Administrator,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum DeskCommand {
    SetupTickets,
    AddUser { user_id: UserId },
    TransferTicket,
    TicketStats,
    Invalid { message: String },
}

impl DeskCommand {
    pub(super) fn name(&self) -> &'static str {
        match self {
            Self::SetupTickets => "setup_tickets",
            Self::AddUser { .. } => "add_user",
            Self::TransferTicket => "transfer_ticket",
            Self::TicketStats => "ticket_stats",
            Self::Invalid { .. } => "invalid",
        }
    }

    /// Posting the intake panel is a server setup step and needs the
    /// administrator permission; ticket commands need the staff role.
    pub(super) fn authority(&self) -> CommandAuthority {
        match self {
            Self::SetupTickets => CommandAuthority::Administrator,
            _ => CommandAuthority::StaffRole,
        }
    }
}

/// The guild owner always passes; anyone else needs a role carrying
/// `ADMINISTRATOR`, counting the @everyone role.
pub(super) fn grants_administrator(
    is_owner: bool,
    role_permissions: impl IntoIterator<Item = Permissions>,
) -> bool {
    is_owner
        || role_permissions
            .into_iter()
            .any(|permissions| permissions.contains(Permissions::ADMINISTRATOR))
}

/// Parses `<@123>`, `<@!123>` or a bare numeric id.
pub(super) fn parse_user_reference(raw: &str) -> Option<UserId> {
    let trimmed = raw.trim();
    let digits = trimmed
        .strip_prefix("<@")
        .and_then(|rest| rest.strip_suffix('>'))
        .map(|inner| inner.trim_start_matches('!'))
        .unwrap_or(trimmed);
    match digits.parse::<u64>() {
        Ok(0) | Err(_) => None,
        Ok(id) => Some(UserId::new(id)),
    }
}

fn no_arguments(command: DeskCommand, remainder: &str, usage: &str) -> DeskCommand {
    if remainder.is_empty() {
        command
    } else {
        DeskCommand::Invalid {
            message: format!("Usage: {usage}"),
        }
    }
}

/// Returns `None` for anything that is not one of the ticket commands, so
/// unrelated chatter and unknown commands are ignored.
pub(super) fn parse_desk_command(content: &str) -> Option<DeskCommand> {
    let trimmed = content.trim();
    let body = trimmed.strip_prefix(COMMAND_PREFIX)?;
    let mut parts = body.splitn(2, char::is_whitespace);
    let command = parts.next().unwrap_or_default();
    let remainder = parts.next().unwrap_or_default().trim();
    let parsed = match command {
        "setup_tickets" => no_arguments(DeskCommand::SetupTickets, remainder, "!setup_tickets"),
        "transfer_ticket" => no_arguments(DeskCommand::TransferTicket, remainder, "!transfer_ticket"),
        "ticket_stats" => no_arguments(DeskCommand::TicketStats, remainder, "!ticket_stats"),
        "add_user" => {
            let mut args = remainder.split_whitespace();
            match (args.next().and_then(parse_user_reference), args.next()) {
                (Some(user_id), None) => DeskCommand::AddUser { user_id },
                _ => DeskCommand::Invalid {
                    message: "Usage: !add_user @member".to_string(),
                },
            }
        }
        _ => return None,
    };
    Some(parsed)
}

pub(super) fn denied_reply(authority: CommandAuthority) -> &'static str {
    match authority {
        CommandAuthority::StaffRole => "❌ You don't have the required role to use this command.",
        CommandAuthority::Administrator => "❌ You don't have permission to use this command.",
    }
}
