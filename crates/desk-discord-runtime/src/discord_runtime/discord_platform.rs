//! [`TicketPlatform`] over the Discord HTTP API.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use desk_tickets::{
    platform::{
        AccessGrant, CategoryInfo, ChannelAccess, ChannelInfo, GrantTarget, MemberInfo,
        NewTicketChannel, TranscriptFile,
    },
    CategoryId, ChannelId, ControlSet, HistoryMessage, MessageId, Notice, NoticeMarker,
    PlatformError, PlatformResult, RoleId, TicketPlatform, UserId,
};
use serenity::all::{
    Channel, ChannelId as DiscordChannelId, ChannelType, CreateAttachment, CreateChannel,
    EditChannel, EditMessage, GetMessages, GuildChannel, GuildId, Http, Message,
    MessageId as DiscordMessageId, PermissionOverwrite, PermissionOverwriteType, Permissions,
    RoleId as DiscordRoleId, Timestamp, UserId as DiscordUserId,
};

use super::{
    discord_render_helpers::{control_rows, parse_footer_marker, render_notice},
    HISTORY_PAGE_SIZE,
};

pub struct SerenityPlatform {
    http: Arc<Http>,
    guild_id: GuildId,
    self_user_id: DiscordUserId,
}

impl SerenityPlatform {
    /// Resolves the bot's own identity so history can tell self-authored
    /// messages apart.
    pub async fn connect(http: Arc<Http>, guild_id: u64) -> PlatformResult<Self> {
        let guild_id = GuildId::new(nonzero(guild_id, "guild")?);
        let current_user = http
            .get_current_user()
            .await
            .map_err(|error| platform_error(error, "current user"))?;
        tracing::info!(user = %current_user.name, %guild_id, "connected to Discord API");
        Ok(Self {
            http,
            guild_id,
            self_user_id: current_user.id,
        })
    }

    fn http(&self) -> &Http {
        &self.http
    }

    fn overwrite(&self, grant: &AccessGrant) -> PlatformResult<PermissionOverwrite> {
        let kind = match grant.target {
            GrantTarget::Everyone => PermissionOverwriteType::Role(DiscordRoleId::new(self.guild_id.get())),
            GrantTarget::Role(role_id) => PermissionOverwriteType::Role(discord_role(role_id)?),
            GrantTarget::Member(user_id) => PermissionOverwriteType::Member(discord_user(user_id)?),
        };
        Ok(PermissionOverwrite {
            allow: permissions(&grant.allow),
            deny: permissions(&grant.deny),
            kind,
        })
    }

    fn overwrites(&self, grants: &[AccessGrant]) -> PlatformResult<Vec<PermissionOverwrite>> {
        grants.iter().map(|grant| self.overwrite(grant)).collect()
    }

    fn history_message(&self, message: &Message) -> HistoryMessage {
        HistoryMessage {
            id: MessageId::new(message.id.get()),
            author_name: message.author.name.clone(),
            from_self: message.author.id == self.self_user_id,
            content: message.content.clone(),
            created_at: to_utc(message.timestamp),
            has_embeds: !message.embeds.is_empty(),
            attachments: message
                .attachments
                .iter()
                .map(|attachment| attachment.filename.clone())
                .collect(),
            marker: message_marker(message),
        }
    }

    /// Walks history newest to oldest in pages, stopping at `limit` messages
    /// when given. Returns oldest first.
    async fn fetch_history(&self, channel_id: ChannelId, limit: Option<usize>) -> PlatformResult<Vec<HistoryMessage>> {
        let channel = discord_channel(channel_id)?;
        let mut collected = Vec::new();
        let mut before: Option<DiscordMessageId> = None;
        loop {
            let page_size = match limit {
                Some(limit) => limit.saturating_sub(collected.len()).min(HISTORY_PAGE_SIZE),
                None => HISTORY_PAGE_SIZE,
            };
            if page_size == 0 {
                break;
            }
            let mut request = GetMessages::new().limit(page_size as u8);
            if let Some(before) = before {
                request = request.before(before);
            }
            let page = channel
                .messages(self.http(), request)
                .await
                .map_err(|error| platform_error(error, &format!("history of channel {channel_id}")))?;
            before = page.last().map(|message| message.id);
            let exhausted = page.len() < page_size;
            collected.extend(page.iter().map(|message| self.history_message(message)));
            if exhausted || before.is_none() {
                break;
            }
        }
        collected.reverse();
        Ok(collected)
    }
}

fn nonzero(raw: u64, what: &str) -> PlatformResult<u64> {
    if raw == 0 {
        Err(PlatformError::NotFound(format!("{what} 0")))
    } else {
        Ok(raw)
    }
}

fn discord_channel(id: ChannelId) -> PlatformResult<DiscordChannelId> {
    Ok(DiscordChannelId::new(nonzero(id.get(), "channel")?))
}

fn discord_category(id: CategoryId) -> PlatformResult<DiscordChannelId> {
    Ok(DiscordChannelId::new(nonzero(id.get(), "category")?))
}

fn discord_role(id: RoleId) -> PlatformResult<DiscordRoleId> {
    Ok(DiscordRoleId::new(nonzero(id.get(), "role")?))
}

fn discord_user(id: UserId) -> PlatformResult<DiscordUserId> {
    Ok(DiscordUserId::new(nonzero(id.get(), "user")?))
}

pub(super) fn permissions(access: &[ChannelAccess]) -> Permissions {
    access.iter().fold(Permissions::empty(), |acc, access| {
        acc | match access {
            ChannelAccess::View => Permissions::VIEW_CHANNEL,
            ChannelAccess::Send => Permissions::SEND_MESSAGES,
            ChannelAccess::ReadHistory => Permissions::READ_MESSAGE_HISTORY,
        }
    })
}

fn to_utc(timestamp: Timestamp) -> DateTime<Utc> {
    DateTime::from_timestamp(timestamp.unix_timestamp(), 0).unwrap_or_default()
}

fn message_marker(message: &Message) -> Option<NoticeMarker> {
    message
        .embeds
        .iter()
        .filter_map(|embed| embed.footer.as_ref())
        .find_map(|footer| parse_footer_marker(&footer.text))
}

fn channel_info(channel: &GuildChannel) -> ChannelInfo {
    ChannelInfo {
        id: ChannelId::new(channel.id.get()),
        name: channel.name.clone(),
        category_id: channel.parent_id.map(|parent| CategoryId::new(parent.get())),
        created_at: to_utc(channel.id.created_at()),
    }
}

pub(super) fn status_error(status: Option<u16>, context: &str, detail: &str) -> PlatformError {
    match status {
        Some(404) => PlatformError::NotFound(context.to_string()),
        Some(403) => PlatformError::Forbidden(format!("{context}: {detail}")),
        _ => PlatformError::Request(format!("{context}: {detail}")),
    }
}

fn platform_error(error: serenity::Error, context: &str) -> PlatformError {
    let status = match &error {
        serenity::Error::Http(http_error) => http_error.status_code().map(|status| status.as_u16()),
        _ => None,
    };
    status_error(status, context, &error.to_string())
}

/// Maps a 404 to `None` so resolve calls can report absence.
fn optional<T>(result: serenity::Result<T>, context: &str) -> PlatformResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(error) => match platform_error(error, context) {
            PlatformError::NotFound(_) => Ok(None),
            other => Err(other),
        },
    }
}

#[async_trait]
impl TicketPlatform for SerenityPlatform {
    async fn resolve_category(&self, category_id: CategoryId) -> PlatformResult<Option<CategoryInfo>> {
        if category_id.get() == 0 {
            return Ok(None);
        }
        let channel = optional(
            discord_category(category_id)?.to_channel(self.http()).await,
            &format!("category {category_id}"),
        )?;
        Ok(channel
            .and_then(Channel::guild)
            .filter(|channel| channel.kind == ChannelType::Category && channel.guild_id == self.guild_id)
            .map(|channel| CategoryInfo {
                id: category_id,
                name: channel.name,
            }))
    }

    async fn resolve_channel(&self, channel_id: ChannelId) -> PlatformResult<Option<ChannelInfo>> {
        if channel_id.get() == 0 {
            return Ok(None);
        }
        let channel = optional(
            discord_channel(channel_id)?.to_channel(self.http()).await,
            &format!("channel {channel_id}"),
        )?;
        Ok(channel
            .and_then(Channel::guild)
            .filter(|channel| channel.kind != ChannelType::Category)
            .map(|channel| channel_info(&channel)))
    }

    async fn resolve_member(&self, user_id: UserId) -> PlatformResult<Option<MemberInfo>> {
        if user_id.get() == 0 {
            return Ok(None);
        }
        let member = optional(
            self.guild_id.member(self.http(), discord_user(user_id)?).await,
            &format!("member {user_id}"),
        )?;
        Ok(member.map(|member| MemberInfo {
            user_id,
            display_name: member.display_name().to_string(),
            roles: member.roles.iter().map(|role| RoleId::new(role.get())).collect(),
        }))
    }

    async fn create_ticket_channel(&self, request: NewTicketChannel) -> PlatformResult<ChannelInfo> {
        let builder = CreateChannel::new(request.name.as_str())
            .kind(ChannelType::Text)
            .category(discord_category(request.category_id)?)
            .topic(request.topic.as_str())
            .permissions(self.overwrites(&request.grants)?);
        let channel = self
            .guild_id
            .create_channel(self.http(), builder)
            .await
            .map_err(|error| platform_error(error, &format!("create channel {}", request.name)))?;
        Ok(channel_info(&channel))
    }

    async fn replace_channel_grants(&self, channel_id: ChannelId, grants: &[AccessGrant]) -> PlatformResult<()> {
        discord_channel(channel_id)?
            .edit(self.http(), EditChannel::new().permissions(self.overwrites(grants)?))
            .await
            .map_err(|error| platform_error(error, &format!("permissions of channel {channel_id}")))?;
        Ok(())
    }

    async fn upsert_channel_grant(&self, channel_id: ChannelId, grant: AccessGrant) -> PlatformResult<()> {
        discord_channel(channel_id)?
            .create_permission(self.http(), self.overwrite(&grant)?)
            .await
            .map_err(|error| platform_error(error, &format!("permissions of channel {channel_id}")))
    }

    async fn move_channel(&self, channel_id: ChannelId, category_id: CategoryId) -> PlatformResult<()> {
        discord_channel(channel_id)?
            .edit(
                self.http(),
                EditChannel::new().category(Some(discord_category(category_id)?)),
            )
            .await
            .map_err(|error| platform_error(error, &format!("move channel {channel_id}")))?;
        Ok(())
    }

    async fn delete_channel(&self, channel_id: ChannelId, reason: &str) -> PlatformResult<()> {
        self.http
            .delete_channel(discord_channel(channel_id)?, Some(reason))
            .await
            .map_err(|error| platform_error(error, &format!("delete channel {channel_id}")))?;
        Ok(())
    }

    async fn send_notice(&self, channel_id: ChannelId, notice: &Notice) -> PlatformResult<MessageId> {
        let message = discord_channel(channel_id)?
            .send_message(self.http(), render_notice(notice).create_message())
            .await
            .map_err(|error| platform_error(error, &format!("send to channel {channel_id}")))?;
        Ok(MessageId::new(message.id.get()))
    }

    async fn send_notice_with_file(
        &self,
        channel_id: ChannelId,
        notice: &Notice,
        file: TranscriptFile,
    ) -> PlatformResult<MessageId> {
        let builder = render_notice(notice)
            .create_message()
            .add_file(CreateAttachment::bytes(file.content.into_bytes(), file.file_name));
        let message = discord_channel(channel_id)?
            .send_message(self.http(), builder)
            .await
            .map_err(|error| platform_error(error, &format!("upload to channel {channel_id}")))?;
        Ok(MessageId::new(message.id.get()))
    }

    async fn send_direct_notice(&self, user_id: UserId, notice: &Notice) -> PlatformResult<()> {
        discord_user(user_id)?
            .direct_message(self.http(), render_notice(notice).create_message())
            .await
            .map_err(|error| platform_error(error, &format!("direct message to {user_id}")))?;
        Ok(())
    }

    async fn attach_controls(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        controls: ControlSet,
    ) -> PlatformResult<()> {
        let message_id = DiscordMessageId::new(nonzero(message_id.get(), "message")?);
        discord_channel(channel_id)?
            .edit_message(
                self.http(),
                message_id,
                EditMessage::new().components(control_rows(controls)),
            )
            .await
            .map_err(|error| platform_error(error, &format!("edit message {message_id}")))?;
        Ok(())
    }

    async fn fetch_all_history(&self, channel_id: ChannelId) -> PlatformResult<Vec<HistoryMessage>> {
        self.fetch_history(channel_id, None).await
    }

    async fn fetch_recent_history(
        &self,
        channel_id: ChannelId,
        limit: usize,
    ) -> PlatformResult<Vec<HistoryMessage>> {
        self.fetch_history(channel_id, Some(limit)).await
    }
}
