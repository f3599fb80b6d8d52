//! Embed, component and modal rendering for ticket notices.

use desk_tickets::{
    platform::{ClosureNotice, TicketOpenedNotice},
    ControlSet, Notice, NoticeMarker, TicketStats, TicketType, TranscriptSummary, UserId,
};
use serenity::all::{
    ButtonStyle, Colour, CreateActionRow, CreateButton, CreateEmbed, CreateEmbedFooter,
    CreateInputText, CreateMessage, CreateModal, CreateSelectMenu, CreateSelectMenuKind,
    CreateSelectMenuOption, InputTextStyle, Timestamp,
};

use super::{
    CLOSE_REASON_INPUT_ID, CLOSE_REASON_MAX_CHARS, CLOSE_REASON_MODAL_ID, CLOSE_TICKET_ID,
    CLOSE_WITH_REASON_ID, CONFIRM_CLOSE_ID, FOOTER_MARKER_SEPARATOR, TICKET_TYPE_SELECT_ID,
};

const UNKNOWN: &str = "Unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum NoticeColour {
    Blue,
    Red,
    Green,
}

impl NoticeColour {
    fn colour(self) -> Colour {
        match self {
            Self::Blue => Colour::BLUE,
            Self::Red => Colour::RED,
            Self::Green => Colour::DARK_GREEN,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct EmbedField {
    pub(super) name: String,
    pub(super) value: String,
    pub(super) inline: bool,
}

/// Platform-neutral shape of a notice before it becomes serenity builders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct NoticeView {
    pub(super) title: String,
    pub(super) description: Option<String>,
    pub(super) colour: NoticeColour,
    pub(super) fields: Vec<EmbedField>,
    pub(super) footer: Option<String>,
    pub(super) timestamped: bool,
    pub(super) controls: Option<ControlSet>,
}

impl NoticeView {
    fn new(title: impl Into<String>, colour: NoticeColour) -> Self {
        Self {
            title: title.into(),
            description: None,
            colour,
            fields: Vec::new(),
            footer: None,
            timestamped: false,
            controls: None,
        }
    }

    fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    fn field(mut self, name: &str, value: impl Into<String>, inline: bool) -> Self {
        self.fields.push(EmbedField {
            name: name.to_string(),
            value: value.into(),
            inline,
        });
        self
    }

    pub(super) fn embed(&self) -> CreateEmbed {
        let mut embed = CreateEmbed::new()
            .title(&self.title)
            .colour(self.colour.colour())
            .fields(
                self.fields
                    .iter()
                    .map(|field| (field.name.clone(), field.value.clone(), field.inline)),
            );
        if let Some(description) = &self.description {
            embed = embed.description(description);
        }
        if let Some(footer) = &self.footer {
            embed = embed.footer(CreateEmbedFooter::new(footer));
        }
        if self.timestamped {
            embed = embed.timestamp(Timestamp::now());
        }
        embed
    }

    pub(super) fn create_message(&self) -> CreateMessage {
        let message = CreateMessage::new().embed(self.embed());
        match self.controls {
            Some(controls) => message.components(control_rows(controls)),
            None => message,
        }
    }
}

/// Appends the stable marker to a footer so recovery can find the message.
pub(super) fn footer_with_marker(base: &str, marker: NoticeMarker) -> String {
    format!("{base}{FOOTER_MARKER_SEPARATOR}{}", marker.as_str())
}

pub(super) fn parse_footer_marker(footer: &str) -> Option<NoticeMarker> {
    footer
        .rsplit(FOOTER_MARKER_SEPARATOR)
        .next()
        .and_then(NoticeMarker::parse)
}

fn mention(user_id: UserId) -> String {
    format!("<@{user_id}>")
}

fn discord_time(unix_seconds: i64) -> String {
    format!("<t:{unix_seconds}:F>")
}

pub(super) fn render_notice(notice: &Notice) -> NoticeView {
    let mut view = match notice {
        Notice::TicketOpened(opened) => render_ticket_opened(opened),
        Notice::TicketClosed(closed) => render_ticket_closed(closed),
        Notice::Transcript(summary) => render_transcript_summary(summary),
        Notice::Transferred {
            from_category,
            to_category,
        } => NoticeView::new("📁 Ticket Transferred", NoticeColour::Blue).description(format!(
            "Ticket moved from **{}** to **{to_category}**",
            from_category.as_deref().unwrap_or(UNKNOWN)
        )),
        Notice::ParticipantAdded { user_id } => NoticeView::new("✅ User Added", NoticeColour::Green)
            .description(format!("{} has been added to this ticket.", mention(*user_id))),
        Notice::IntakePanel => render_intake_panel(),
        Notice::Stats(stats) => render_stats(stats),
    };
    if let Some(marker) = notice.marker() {
        view.controls = Some(marker.controls());
    }
    view
}

fn render_ticket_opened(opened: &TicketOpenedNotice) -> NoticeView {
    let mut view = NoticeView::new(opened.ticket_type.opening_title(), NoticeColour::Blue)
        .description(opened.ticket_type.opening_body())
        .field("Created by", mention(opened.requester), true)
        .field("Created at", discord_time(opened.created_at.timestamp()), true);
    view.footer = Some(footer_with_marker(
        &format!("Ticket ID: {}", opened.channel_id),
        NoticeMarker::TicketControls,
    ));
    view
}

fn render_ticket_closed(closed: &ClosureNotice) -> NoticeView {
    NoticeView::new("🔒 Ticket Closed", NoticeColour::Red)
        .description("This ticket has been closed.")
        .field("Ticket ID", closed.channel_id.to_string(), false)
        .field(
            "Opened By",
            closed
                .opened_by
                .map(mention)
                .unwrap_or_else(|| "Unknown User".to_string()),
            true,
        )
        .field("Closed By", mention(closed.closed_by), true)
        .field("Created", discord_time(closed.created_at.timestamp()), false)
        .field(
            "Category",
            closed.category_name.as_deref().unwrap_or(UNKNOWN),
            true,
        )
        .field("Reason", closed.reason.as_str(), true)
}

fn render_transcript_summary(summary: &TranscriptSummary) -> NoticeView {
    let mut view = NoticeView::new("📄 Ticket Transcript", NoticeColour::Blue)
        .description(format!("Transcript for **{}**", summary.channel_name))
        .field("Messages", summary.message_count.to_string(), true)
        .field("Channel ID", summary.channel_id.to_string(), true)
        .field(
            "Category",
            summary.category_name.as_deref().unwrap_or(UNKNOWN),
            true,
        );
    view.timestamped = true;
    view
}

fn render_intake_panel() -> NoticeView {
    let types = TicketType::ALL
        .iter()
        .map(|ticket_type| {
            format!(
                "{} **{}** - {}",
                ticket_type.emoji(),
                ticket_type.label(),
                ticket_type.description()
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    let mut view = NoticeView::new("🎫 Ticket System", NoticeColour::Green)
        .description(
            "Use the dropdown menu below to create a ticket according to your needs.\n\n\
             **Please note:** Abuse of the ticket system may result in warnings or restrictions.",
        )
        .field("📋 Available Ticket Types", types, false);
    view.footer = Some(footer_with_marker(
        "Select a ticket type from the dropdown below",
        NoticeMarker::IntakePanel,
    ));
    view
}

fn render_stats(stats: &TicketStats) -> NoticeView {
    let mut view = NoticeView::new("📊 Ticket Statistics", NoticeColour::Blue)
        .field("Total Tickets", stats.total.to_string(), true)
        .field("Open Tickets", stats.open.to_string(), true)
        .field("Closed Tickets", stats.closed.to_string(), true);
    let breakdown = stats.type_breakdown();
    if !breakdown.is_empty() {
        view = view.field("By Type", breakdown.join("\n"), false);
    }
    view.timestamped = true;
    view
}

pub(super) fn control_rows(controls: ControlSet) -> Vec<CreateActionRow> {
    match controls {
        ControlSet::TicketActions => vec![CreateActionRow::Buttons(vec![
            CreateButton::new(CLOSE_TICKET_ID)
                .label("Close Ticket")
                .style(ButtonStyle::Danger)
                .emoji('🔒'),
            CreateButton::new(CLOSE_WITH_REASON_ID)
                .label("Close with Reason")
                .style(ButtonStyle::Secondary)
                .emoji('📝'),
        ])],
        ControlSet::TicketTypeSelect => {
            let options = TicketType::ALL
                .iter()
                .map(|ticket_type| {
                    CreateSelectMenuOption::new(ticket_type.label(), ticket_type.as_str())
                        .description(ticket_type.description())
                        .emoji(ticket_type.emoji())
                })
                .collect();
            vec![CreateActionRow::SelectMenu(
                CreateSelectMenu::new(TICKET_TYPE_SELECT_ID, CreateSelectMenuKind::String { options })
                    .placeholder("Choose your ticket type...")
                    .min_values(1)
                    .max_values(1),
            )]
        }
    }
}

pub(super) fn confirm_close_row() -> CreateActionRow {
    CreateActionRow::Buttons(vec![CreateButton::new(CONFIRM_CLOSE_ID)
        .label("Confirm Close")
        .style(ButtonStyle::Danger)
        .emoji('✅')])
}

pub(super) fn close_reason_modal() -> CreateModal {
    CreateModal::new(CLOSE_REASON_MODAL_ID, "Close Ticket with Reason").components(vec![
        CreateActionRow::InputText(
            CreateInputText::new(InputTextStyle::Paragraph, "Reason for closing", CLOSE_REASON_INPUT_ID)
                .placeholder("Enter the reason for closing this ticket...")
                .max_length(CLOSE_REASON_MAX_CHARS),
        ),
    ])
}
