//! Discord gateway runtime that routes interactions into the ticket lifecycle.

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use desk_tickets::{
    Actor, ChannelId, JsonFileRecordStore, Notice, RecordStore, RecoveryReconciler, RoleId,
    TicketConfig, TicketError, TicketLifecycle, TicketPlatform, TicketType, UserId,
};
use serenity::all::{
    ActionRowComponent, Client, ComponentInteraction, ComponentInteractionDataKind, Context,
    CreateInteractionResponse, CreateInteractionResponseMessage, EditInteractionResponse,
    EventHandler, GatewayIntents, Http, Interaction, Member, Message, ModalInteraction,
    ModalInteractionData, Ready,
};

mod discord_command_helpers;
mod discord_platform;
mod discord_render_helpers;

use discord_command_helpers::{
    denied_reply, grants_administrator, parse_desk_command, CommandAuthority, DeskCommand,
};
pub use discord_platform::SerenityPlatform;
use discord_render_helpers::{close_reason_modal, confirm_close_row};

const COMMAND_PREFIX: char = '!';
const TICKET_TYPE_SELECT_ID: &str = "desk_ticket_type";
const CLOSE_TICKET_ID: &str = "desk_close_ticket";
const CLOSE_WITH_REASON_ID: &str = "desk_close_with_reason";
const CONFIRM_CLOSE_ID: &str = "desk_confirm_close";
const CLOSE_REASON_MODAL_ID: &str = "desk_close_reason_modal";
const CLOSE_REASON_INPUT_ID: &str = "desk_close_reason";
const CLOSE_REASON_MAX_CHARS: u16 = 500;
const FOOTER_MARKER_SEPARATOR: &str = " • ";
const HISTORY_PAGE_SIZE: usize = 100;

/// Everything the runtime needs to start: credentials, guild and ticket settings.
#[derive(Clone)]
pub struct DiscordRuntimeConfig {
    pub bot_token: String,
    pub guild_id: u64,
    pub tickets: TicketConfig,
    pub record_path: PathBuf,
}

fn gateway_intents() -> GatewayIntents {
    GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MEMBERS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT
}

/// Restores open tickets over REST, then runs the gateway until shutdown.
pub async fn run_discord_runtime(config: DiscordRuntimeConfig) -> Result<()> {
    let http = Arc::new(Http::new(&config.bot_token));
    let platform: Arc<dyn TicketPlatform> = Arc::new(
        SerenityPlatform::connect(Arc::clone(&http), config.guild_id)
            .await
            .context("failed to reach the Discord API")?,
    );
    let store: Arc<dyn RecordStore> = Arc::new(JsonFileRecordStore::new(&config.record_path));
    let tickets = Arc::new(config.tickets);

    RecoveryReconciler::new(Arc::clone(&tickets), Arc::clone(&store), Arc::clone(&platform))
        .run()
        .await;

    let handler = DeskHandler {
        lifecycle: Arc::new(TicketLifecycle::new(tickets, store, platform)),
    };
    let mut client = Client::builder(&config.bot_token, gateway_intents())
        .event_handler(handler)
        .await
        .context("failed to build Discord client")?;

    let shard_manager = Arc::clone(&client.shard_manager);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested");
            shard_manager.shutdown_all().await;
        }
    });

    client.start().await.context("Discord gateway stopped")
}

pub(crate) fn actor_from_member(member: &Member) -> Actor {
    Actor::new(
        UserId::new(member.user.id.get()),
        member.display_name(),
        member.roles.iter().map(|role| RoleId::new(role.get())).collect(),
    )
}

/// Resolves the administrator permission over REST; no gateway cache is kept.
async fn is_administrator(ctx: &Context, message: &Message) -> serenity::Result<bool> {
    let Some(guild_id) = message.guild_id else {
        return Ok(false);
    };
    let guild = guild_id.to_partial_guild(ctx).await?;
    let member_roles = message
        .member
        .as_ref()
        .map(|member| member.roles.clone())
        .unwrap_or_default();
    let role_permissions = guild
        .roles
        .iter()
        .filter(|(id, _)| id.get() == guild_id.get() || member_roles.contains(*id))
        .map(|(_, role)| role.permissions);
    Ok(grants_administrator(guild.owner_id == message.author.id, role_permissions))
}

fn modal_reason(data: &ModalInteractionData) -> Option<String> {
    data.components
        .iter()
        .flat_map(|row| row.components.iter())
        .find_map(|component| match component {
            ActionRowComponent::InputText(input) if input.custom_id == CLOSE_REASON_INPUT_ID => {
                input.value.clone()
            }
            _ => None,
        })
}

/// Logs infrastructure failures; every error still yields a short reply.
fn error_reply(error: &TicketError, action: &str) -> String {
    if !error.is_caller_facing() {
        tracing::error!(%error, action, "ticket operation failed");
    }
    error.user_message()
}

struct DeskHandler {
    lifecycle: Arc<TicketLifecycle>,
}

impl DeskHandler {
    fn config(&self) -> &TicketConfig {
        self.lifecycle.config()
    }

    async fn create_ticket(&self, actor: &Actor, values: &[String]) -> String {
        let Some(ticket_type) = values.first().and_then(|value| value.parse::<TicketType>().ok()) else {
            return "❌ Unknown ticket type.".to_string();
        };
        match self.lifecycle.create(actor, ticket_type).await {
            Ok(created) => format!(
                "✅ Your {} ticket has been created: <#{}>",
                ticket_type.label().to_lowercase(),
                created.channel.id
            ),
            Err(error) => error_reply(&error, "create ticket"),
        }
    }

    async fn close_ticket(&self, channel_id: ChannelId, actor: &Actor, reason: Option<&str>) -> String {
        match self.lifecycle.close(channel_id, actor, reason).await {
            Ok(_) => format!(
                "🔒 Ticket will be deleted in {} seconds...",
                self.config().close_grace_delay.as_secs()
            ),
            Err(error) => error_reply(&error, "close ticket"),
        }
    }

    async fn handle_component(&self, ctx: &Context, interaction: &ComponentInteraction) -> serenity::Result<()> {
        let Some(member) = interaction.member.as_ref() else {
            return Ok(());
        };
        let actor = actor_from_member(member);
        let channel_id = ChannelId::new(interaction.channel_id.get());

        match interaction.data.custom_id.as_str() {
            TICKET_TYPE_SELECT_ID => {
                let values = match &interaction.data.kind {
                    ComponentInteractionDataKind::StringSelect { values } => values.clone(),
                    _ => Vec::new(),
                };
                interaction.defer_ephemeral(&ctx.http).await?;
                let reply = self.create_ticket(&actor, &values).await;
                interaction
                    .edit_response(&ctx.http, EditInteractionResponse::new().content(reply))
                    .await?;
            }
            CLOSE_TICKET_ID => {
                let response = match self.lifecycle.authorize_close(channel_id, &actor).await {
                    Ok(_) => CreateInteractionResponseMessage::new()
                        .content("⚠️ Are you sure you want to close this ticket? This action cannot be undone.")
                        .components(vec![confirm_close_row()]),
                    Err(error) => CreateInteractionResponseMessage::new()
                        .content(error_reply(&error, "close ticket")),
                };
                interaction
                    .create_response(&ctx.http, CreateInteractionResponse::Message(response.ephemeral(true)))
                    .await?;
            }
            CLOSE_WITH_REASON_ID => {
                let response = match self.lifecycle.authorize_close(channel_id, &actor).await {
                    Ok(_) => CreateInteractionResponse::Modal(close_reason_modal()),
                    Err(error) => CreateInteractionResponse::Message(
                        CreateInteractionResponseMessage::new()
                            .content(error_reply(&error, "close ticket"))
                            .ephemeral(true),
                    ),
                };
                interaction.create_response(&ctx.http, response).await?;
            }
            CONFIRM_CLOSE_ID => {
                interaction.defer_ephemeral(&ctx.http).await?;
                let reply = self.close_ticket(channel_id, &actor, None).await;
                interaction
                    .edit_response(&ctx.http, EditInteractionResponse::new().content(reply))
                    .await?;
            }
            other => tracing::debug!(custom_id = other, "ignoring unknown component"),
        }
        Ok(())
    }

    async fn handle_modal(&self, ctx: &Context, interaction: &ModalInteraction) -> serenity::Result<()> {
        if interaction.data.custom_id != CLOSE_REASON_MODAL_ID {
            return Ok(());
        }
        let Some(member) = interaction.member.as_ref() else {
            return Ok(());
        };
        let actor = actor_from_member(member);
        let reason = modal_reason(&interaction.data);
        interaction.defer_ephemeral(&ctx.http).await?;
        let reply = self
            .close_ticket(
                ChannelId::new(interaction.channel_id.get()),
                &actor,
                reason.as_deref(),
            )
            .await;
        interaction
            .edit_response(&ctx.http, EditInteractionResponse::new().content(reply))
            .await?;
        Ok(())
    }

    /// Runs a staff command. `None` means the command posted its own notice.
    async fn run_command(&self, channel_id: ChannelId, actor: &Actor, command: DeskCommand) -> Option<String> {
        let platform = self.lifecycle.platform();
        let outcome = match command {
            DeskCommand::Invalid { message } => return Some(message),
            DeskCommand::SetupTickets => platform
                .send_notice(channel_id, &Notice::IntakePanel)
                .await
                .map(|_| tracing::info!(%channel_id, user = %actor.display_name, "posted intake panel"))
                .map_err(TicketError::from),
            DeskCommand::AddUser { user_id } => {
                self.lifecycle.add_participant(channel_id, user_id).await
            }
            DeskCommand::TransferTicket => self
                .lifecycle
                .transfer(channel_id, self.config().transfer_category_id)
                .await
                .map(|_| ()),
            DeskCommand::TicketStats => {
                let stats = self.lifecycle.stats().await;
                platform
                    .send_notice(channel_id, &Notice::Stats(stats))
                    .await
                    .map(|_| ())
                    .map_err(TicketError::from)
            }
        };
        outcome.err().map(|error| error_reply(&error, "staff command"))
    }
}

#[async_trait]
impl EventHandler for DeskHandler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        tracing::info!(user = %ready.user.name, guilds = ready.guilds.len(), "Discord gateway ready");
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        let outcome = match &interaction {
            Interaction::Component(component) => self.handle_component(&ctx, component).await,
            Interaction::Modal(modal) => self.handle_modal(&ctx, modal).await,
            _ => Ok(()),
        };
        if let Err(error) = outcome {
            tracing::warn!(%error, "failed to answer interaction");
        }
    }

    async fn message(&self, ctx: Context, message: Message) {
        if message.author.bot || message.guild_id.is_none() {
            return;
        }
        let Some(command) = parse_desk_command(&message.content) else {
            return;
        };
        let roles = message
            .member
            .as_ref()
            .map(|member| member.roles.iter().map(|role| RoleId::new(role.get())).collect())
            .unwrap_or_default();
        let actor = Actor::new(UserId::new(message.author.id.get()), message.author.name.clone(), roles);
        let channel_id = ChannelId::new(message.channel_id.get());
        tracing::debug!(%channel_id, command = command.name(), user = %actor.display_name, "staff command");

        let authority = command.authority();
        let allowed = match authority {
            CommandAuthority::StaffRole => self.config().is_staff(&actor),
            CommandAuthority::Administrator => match is_administrator(&ctx, &message).await {
                Ok(allowed) => allowed,
                Err(error) => {
                    tracing::warn!(%channel_id, %error, "could not check administrator permission");
                    false
                }
            },
        };
        let reply = if allowed {
            self.run_command(channel_id, &actor, command).await
        } else {
            Some(denied_reply(authority).to_string())
        };
        if let Some(reply) = reply {
            if let Err(error) = message.channel_id.say(&ctx.http, reply).await {
                tracing::warn!(%channel_id, %error, "failed to reply to command");
            }
        }
    }
}
