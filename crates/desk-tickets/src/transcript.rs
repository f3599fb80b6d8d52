//! Transcript rendering and delivery to the archive channel.

use std::sync::Arc;

use desk_core::current_unix_timestamp;

use crate::{
    error::TicketError,
    ids::ChannelId,
    platform::{ChannelInfo, HistoryMessage, Notice, TicketPlatform, TranscriptFile},
};

/// Summary delivered next to the transcript file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptSummary {
    pub channel_id: ChannelId,
    pub channel_name: String,
    pub category_name: Option<String>,
    pub message_count: usize,
    pub file_name: String,
}

pub type ArchiveResult = Result<TranscriptSummary, TicketError>;

/// Renders one history message as a transcript line (no trailing newline).
pub fn render_transcript_line(message: &HistoryMessage) -> String {
    let content = if message.content.is_empty() {
        "[No content]"
    } else {
        message.content.as_str()
    };
    let mut line = format!(
        "[{}] {}: {}",
        message.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
        message.author_name,
        content
    );
    if message.has_embeds {
        line.push_str(" [Contains embeds]");
    }
    if !message.attachments.is_empty() {
        line.push_str(&format!(
            " [Attachments: {}]",
            message.attachments.join(", ")
        ));
    }
    line
}

/// Renders a whole history, one line per message, oldest first.
pub fn render_transcript(messages: &[HistoryMessage]) -> String {
    let mut transcript = String::new();
    for message in messages {
        transcript.push_str(&render_transcript_line(message));
        transcript.push('\n');
    }
    transcript
}

pub fn transcript_file_name(channel_name: &str, unix_seconds: u64) -> String {
    format!("transcript-{channel_name}-{unix_seconds}.txt")
}

/// Archives a ticket channel's full history into the archive channel.
#[derive(Clone)]
pub struct TranscriptArchiver {
    platform: Arc<dyn TicketPlatform>,
    destination: ChannelId,
}

impl TranscriptArchiver {
    pub fn new(platform: Arc<dyn TicketPlatform>, destination: ChannelId) -> Self {
        Self {
            platform,
            destination,
        }
    }

    /// Best effort: errors describe what failed; closure never depends on it.
    pub async fn archive(&self, channel: &ChannelInfo) -> ArchiveResult {
        if self
            .platform
            .resolve_channel(self.destination)
            .await?
            .is_none()
        {
            return Err(TicketError::NotFound(format!(
                "transcript channel {}",
                self.destination
            )));
        }

        let history = self.platform.fetch_all_history(channel.id).await?;
        let category_name = match channel.category_id {
            Some(category_id) => self
                .platform
                .resolve_category(category_id)
                .await
                .ok()
                .flatten()
                .map(|category| category.name),
            None => None,
        };

        let summary = TranscriptSummary {
            channel_id: channel.id,
            channel_name: channel.name.clone(),
            category_name,
            message_count: history.len(),
            file_name: transcript_file_name(&channel.name, current_unix_timestamp()),
        };
        let file = TranscriptFile {
            file_name: summary.file_name.clone(),
            content: render_transcript(&history),
        };
        self.platform
            .send_notice_with_file(self.destination, &Notice::Transcript(summary.clone()), file)
            .await
            .map_err(|error| TicketError::DeliveryFailed(error.to_string()))?;

        tracing::info!(
            channel_id = %channel.id,
            channel = %channel.name,
            messages = summary.message_count,
            "generated transcript"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::{
        fake_platform::InMemoryPlatform,
        ids::{CategoryId, MessageId},
    };

    fn message(id: u64, author: &str, content: &str) -> HistoryMessage {
        HistoryMessage {
            id: MessageId::new(id),
            author_name: author.to_string(),
            from_self: false,
            content: content.to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 7, 4, 18, 5, id as u32).unwrap(),
            has_embeds: false,
            attachments: Vec::new(),
            marker: None,
        }
    }

    #[test]
    fn renders_markers_and_placeholders() {
        let mut with_embed = message(1, "desk", "");
        with_embed.has_embeds = true;
        with_embed.attachments = vec!["a.png".into(), "b.log".into()];
        assert_eq!(
            render_transcript_line(&with_embed),
            "[2024-07-04 18:05:01 UTC] desk: [No content] [Contains embeds] [Attachments: a.png, b.log]"
        );
        assert_eq!(
            render_transcript_line(&message(2, "alice", "hi")),
            "[2024-07-04 18:05:02 UTC] alice: hi"
        );
    }

    #[tokio::test]
    async fn archives_three_messages_with_attachment_line() {
        let platform = Arc::new(InMemoryPlatform::new());
        platform.add_category(CategoryId::new(700), "Support");
        let archive = platform.add_channel(ChannelId::new(601), "transcripts", None);
        let ticket = platform.add_channel(
            ChannelId::new(900),
            "ticket-support-alice",
            Some(CategoryId::new(700)),
        );
        platform.push_message(ticket.id, message(1, "alice", "my build fails"));
        let mut with_file = message(2, "alice", "here is the log");
        with_file.attachments = vec!["log.txt".into()];
        platform.push_message(ticket.id, with_file);
        platform.push_message(ticket.id, message(3, "staff", "thanks"));

        let archiver = TranscriptArchiver::new(platform.clone(), archive.id);
        let summary = archiver.archive(&ticket).await.expect("archive");
        assert_eq!(summary.message_count, 3);
        assert_eq!(summary.category_name.as_deref(), Some("Support"));
        assert!(summary.file_name.starts_with("transcript-ticket-support-alice-"));

        let deliveries = platform.file_deliveries();
        assert_eq!(deliveries.len(), 1);
        let (destination, _, file) = &deliveries[0];
        assert_eq!(*destination, archive.id);
        let lines = file.content.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].contains("[Attachments: log.txt]"));
        assert!(!lines[0].contains("[Attachments"));
    }

    #[tokio::test]
    async fn missing_destination_is_reported_not_panicked() {
        let platform = Arc::new(InMemoryPlatform::new());
        let ticket = platform.add_channel(ChannelId::new(900), "ticket", None);
        let archiver = TranscriptArchiver::new(platform.clone(), ChannelId::new(601));
        let error = archiver.archive(&ticket).await.expect_err("no destination");
        assert!(matches!(error, TicketError::NotFound(_)));
        assert!(platform.file_deliveries().is_empty());
    }

    #[tokio::test]
    async fn refused_upload_is_delivery_failed() {
        let platform = Arc::new(InMemoryPlatform::new());
        platform.add_channel(ChannelId::new(601), "transcripts", None);
        let ticket = platform.add_channel(ChannelId::new(900), "ticket", None);
        platform.set_fail_file_delivery(true);
        let archiver = TranscriptArchiver::new(platform.clone(), ChannelId::new(601));
        let error = archiver.archive(&ticket).await.expect_err("refused");
        assert!(matches!(error, TicketError::DeliveryFailed(_)));
    }
}
