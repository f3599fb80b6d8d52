//! In-memory [`TicketPlatform`] used by unit and integration tests.

use std::{
    collections::{HashMap, HashSet},
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;

use crate::{
    error::{PlatformError, PlatformResult},
    ids::{CategoryId, ChannelId, MessageId, RoleId, UserId},
    platform::{
        AccessGrant, CategoryInfo, ChannelInfo, ControlSet, HistoryMessage, MemberInfo,
        NewTicketChannel, Notice, TicketPlatform, TranscriptFile,
    },
};

pub const SELF_AUTHOR_NAME: &str = "Desk";

#[derive(Debug, Clone)]
struct FakeChannel {
    info: ChannelInfo,
    topic: String,
    grants: Vec<AccessGrant>,
    messages: Vec<HistoryMessage>,
    controls: HashMap<MessageId, ControlSet>,
}

#[derive(Debug, Default)]
struct PlatformState {
    categories: HashMap<CategoryId, CategoryInfo>,
    channels: HashMap<ChannelId, FakeChannel>,
    members: HashMap<UserId, MemberInfo>,
    deleted: Vec<(ChannelId, String)>,
    channel_notices: Vec<(ChannelId, Notice)>,
    direct_notices: Vec<(UserId, Notice)>,
    file_deliveries: Vec<(ChannelId, Notice, TranscriptFile)>,
    control_attachments: Vec<(ChannelId, MessageId, ControlSet)>,
    next_id: u64,
    refuse_direct_messages: bool,
    fail_file_delivery: bool,
    fail_history: bool,
    fail_channel_creation: bool,
    fail_grants: HashSet<ChannelId>,
    failing_channel_lookups: usize,
    latency: Option<Duration>,
}

impl PlatformState {
    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        10_000 + self.next_id
    }

    fn channel_mut(&mut self, channel_id: ChannelId) -> PlatformResult<&mut FakeChannel> {
        self.channels
            .get_mut(&channel_id)
            .ok_or_else(|| PlatformError::NotFound(format!("channel {channel_id}")))
    }

    fn post(&mut self, channel_id: ChannelId, notice: &Notice, attachments: Vec<String>) -> PlatformResult<MessageId> {
        let id = MessageId::new(self.allocate_id());
        let channel = self.channel_mut(channel_id)?;
        channel.messages.push(HistoryMessage {
            id,
            author_name: SELF_AUTHOR_NAME.to_string(),
            from_self: true,
            content: String::new(),
            created_at: Utc::now(),
            has_embeds: true,
            attachments,
            marker: notice.marker(),
        });
        if let Some(marker) = notice.marker() {
            channel.controls.insert(id, marker.controls());
        }
        self.channel_notices.push((channel_id, notice.clone()));
        Ok(id)
    }
}

/// Chat platform double that keeps every channel, message and delivery in memory.
#[derive(Debug, Default)]
pub struct InMemoryPlatform {
    state: Mutex<PlatformState>,
}

impl InMemoryPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, PlatformState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_category(&self, id: CategoryId, name: &str) -> CategoryInfo {
        let info = CategoryInfo {
            id,
            name: name.to_string(),
        };
        self.state().categories.insert(id, info.clone());
        info
    }

    pub fn remove_category(&self, id: CategoryId) {
        self.state().categories.remove(&id);
    }

    pub fn add_channel(&self, id: ChannelId, name: &str, category_id: Option<CategoryId>) -> ChannelInfo {
        let info = ChannelInfo {
            id,
            name: name.to_string(),
            category_id,
            created_at: Utc::now(),
        };
        self.state().channels.insert(
            id,
            FakeChannel {
                info: info.clone(),
                topic: String::new(),
                grants: Vec::new(),
                messages: Vec::new(),
                controls: HashMap::new(),
            },
        );
        info
    }

    /// Deletes a channel behind the bot's back.
    pub fn remove_channel(&self, id: ChannelId) {
        self.state().channels.remove(&id);
    }

    pub fn add_member(&self, user_id: UserId, display_name: &str, roles: Vec<RoleId>) -> MemberInfo {
        let info = MemberInfo {
            user_id,
            display_name: display_name.to_string(),
            roles,
        };
        self.state().members.insert(user_id, info.clone());
        info
    }

    pub fn remove_member(&self, user_id: UserId) {
        self.state().members.remove(&user_id);
    }

    pub fn push_message(&self, channel_id: ChannelId, message: HistoryMessage) {
        if let Some(channel) = self.state().channels.get_mut(&channel_id) {
            channel.messages.push(message);
        }
    }

    /// Drops every control registration of a channel, as a restart would.
    pub fn forget_controls(&self, channel_id: ChannelId) {
        if let Some(channel) = self.state().channels.get_mut(&channel_id) {
            channel.controls.clear();
        }
    }

    pub fn set_grants(&self, channel_id: ChannelId, grants: Vec<AccessGrant>) {
        if let Some(channel) = self.state().channels.get_mut(&channel_id) {
            channel.grants = grants;
        }
    }

    pub fn channel(&self, channel_id: ChannelId) -> Option<ChannelInfo> {
        self.state()
            .channels
            .get(&channel_id)
            .map(|channel| channel.info.clone())
    }

    pub fn channel_topic(&self, channel_id: ChannelId) -> Option<String> {
        self.state()
            .channels
            .get(&channel_id)
            .map(|channel| channel.topic.clone())
    }

    pub fn channel_grants(&self, channel_id: ChannelId) -> Vec<AccessGrant> {
        self.state()
            .channels
            .get(&channel_id)
            .map(|channel| channel.grants.clone())
            .unwrap_or_default()
    }

    pub fn channel_messages(&self, channel_id: ChannelId) -> Vec<HistoryMessage> {
        self.state()
            .channels
            .get(&channel_id)
            .map(|channel| channel.messages.clone())
            .unwrap_or_default()
    }

    pub fn channel_controls(&self, channel_id: ChannelId) -> HashMap<MessageId, ControlSet> {
        self.state()
            .channels
            .get(&channel_id)
            .map(|channel| channel.controls.clone())
            .unwrap_or_default()
    }

    pub fn channel_count(&self) -> usize {
        self.state().channels.len()
    }

    pub fn deleted_channels(&self) -> Vec<(ChannelId, String)> {
        self.state().deleted.clone()
    }

    pub fn channel_notices(&self) -> Vec<(ChannelId, Notice)> {
        self.state().channel_notices.clone()
    }

    pub fn direct_notices(&self) -> Vec<(UserId, Notice)> {
        self.state().direct_notices.clone()
    }

    pub fn file_deliveries(&self) -> Vec<(ChannelId, Notice, TranscriptFile)> {
        self.state().file_deliveries.clone()
    }

    pub fn control_attachments(&self) -> Vec<(ChannelId, MessageId, ControlSet)> {
        self.state().control_attachments.clone()
    }

    pub fn set_refuse_direct_messages(&self, refuse: bool) {
        self.state().refuse_direct_messages = refuse;
    }

    pub fn set_fail_file_delivery(&self, fail: bool) {
        self.state().fail_file_delivery = fail;
    }

    pub fn set_fail_history(&self, fail: bool) {
        self.state().fail_history = fail;
    }

    pub fn set_fail_channel_creation(&self, fail: bool) {
        self.state().fail_channel_creation = fail;
    }

    pub fn fail_grants_for(&self, channel_id: ChannelId) {
        self.state().fail_grants.insert(channel_id);
    }

    /// The next `count` channel lookups fail as a transient request error.
    pub fn fail_next_channel_lookups(&self, count: usize) {
        self.state().failing_channel_lookups = count;
    }

    /// Delay applied to channel creation and full history fetches.
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.state().latency = latency;
    }

    async fn simulate_latency(&self) {
        let latency = self.state().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl TicketPlatform for InMemoryPlatform {
    async fn resolve_category(&self, category_id: CategoryId) -> PlatformResult<Option<CategoryInfo>> {
        Ok(self.state().categories.get(&category_id).cloned())
    }

    async fn resolve_channel(&self, channel_id: ChannelId) -> PlatformResult<Option<ChannelInfo>> {
        {
            let mut state = self.state();
            if state.failing_channel_lookups > 0 {
                state.failing_channel_lookups -= 1;
                return Err(PlatformError::Request(format!("lookup of channel {channel_id} timed out")));
            }
        }
        Ok(self.channel(channel_id))
    }

    async fn resolve_member(&self, user_id: UserId) -> PlatformResult<Option<MemberInfo>> {
        Ok(self.state().members.get(&user_id).cloned())
    }

    async fn create_ticket_channel(&self, request: NewTicketChannel) -> PlatformResult<ChannelInfo> {
        self.simulate_latency().await;
        let mut state = self.state();
        if state.fail_channel_creation {
            return Err(PlatformError::Forbidden("missing manage channels".to_string()));
        }
        if !state.categories.contains_key(&request.category_id) {
            return Err(PlatformError::NotFound(format!("category {}", request.category_id)));
        }
        let id = ChannelId::new(state.allocate_id());
        let info = ChannelInfo {
            id,
            name: request.name,
            category_id: Some(request.category_id),
            created_at: Utc::now(),
        };
        state.channels.insert(
            id,
            FakeChannel {
                info: info.clone(),
                topic: request.topic,
                grants: request.grants,
                messages: Vec::new(),
                controls: HashMap::new(),
            },
        );
        Ok(info)
    }

    async fn replace_channel_grants(&self, channel_id: ChannelId, grants: &[AccessGrant]) -> PlatformResult<()> {
        let mut state = self.state();
        if state.fail_grants.contains(&channel_id) {
            return Err(PlatformError::Forbidden(format!("edit channel {channel_id}")));
        }
        state.channel_mut(channel_id)?.grants = grants.to_vec();
        Ok(())
    }

    async fn upsert_channel_grant(&self, channel_id: ChannelId, grant: AccessGrant) -> PlatformResult<()> {
        let mut state = self.state();
        let channel = state.channel_mut(channel_id)?;
        channel.grants.retain(|existing| existing.target != grant.target);
        channel.grants.push(grant);
        Ok(())
    }

    async fn move_channel(&self, channel_id: ChannelId, category_id: CategoryId) -> PlatformResult<()> {
        let mut state = self.state();
        if !state.categories.contains_key(&category_id) {
            return Err(PlatformError::NotFound(format!("category {category_id}")));
        }
        state.channel_mut(channel_id)?.info.category_id = Some(category_id);
        Ok(())
    }

    async fn delete_channel(&self, channel_id: ChannelId, reason: &str) -> PlatformResult<()> {
        let mut state = self.state();
        if state.channels.remove(&channel_id).is_none() {
            return Err(PlatformError::NotFound(format!("channel {channel_id}")));
        }
        state.deleted.push((channel_id, reason.to_string()));
        Ok(())
    }

    async fn send_notice(&self, channel_id: ChannelId, notice: &Notice) -> PlatformResult<MessageId> {
        self.state().post(channel_id, notice, Vec::new())
    }

    async fn send_notice_with_file(
        &self,
        channel_id: ChannelId,
        notice: &Notice,
        file: TranscriptFile,
    ) -> PlatformResult<MessageId> {
        let mut state = self.state();
        if state.fail_file_delivery {
            return Err(PlatformError::Request("upload rejected".to_string()));
        }
        let id = state.post(channel_id, notice, vec![file.file_name.clone()])?;
        state.file_deliveries.push((channel_id, notice.clone(), file));
        Ok(id)
    }

    async fn send_direct_notice(&self, user_id: UserId, notice: &Notice) -> PlatformResult<()> {
        let mut state = self.state();
        if state.refuse_direct_messages {
            return Err(PlatformError::Forbidden(format!("direct messages to {user_id}")));
        }
        state.direct_notices.push((user_id, notice.clone()));
        Ok(())
    }

    async fn attach_controls(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        controls: ControlSet,
    ) -> PlatformResult<()> {
        let mut state = self.state();
        let channel = state.channel_mut(channel_id)?;
        if !channel.messages.iter().any(|message| message.id == message_id) {
            return Err(PlatformError::NotFound(format!("message {message_id}")));
        }
        channel.controls.insert(message_id, controls);
        state
            .control_attachments
            .push((channel_id, message_id, controls));
        Ok(())
    }

    async fn fetch_all_history(&self, channel_id: ChannelId) -> PlatformResult<Vec<HistoryMessage>> {
        self.simulate_latency().await;
        let mut state = self.state();
        if state.fail_history {
            return Err(PlatformError::Request("history unavailable".to_string()));
        }
        Ok(state.channel_mut(channel_id)?.messages.clone())
    }

    async fn fetch_recent_history(
        &self,
        channel_id: ChannelId,
        limit: usize,
    ) -> PlatformResult<Vec<HistoryMessage>> {
        let mut state = self.state();
        if state.fail_history {
            return Err(PlatformError::Request("history unavailable".to_string()));
        }
        let messages = &state.channel_mut(channel_id)?.messages;
        let start = messages.len().saturating_sub(limit);
        Ok(messages[start..].to_vec())
    }
}
