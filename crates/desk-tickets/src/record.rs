//! Ticket records, ticket types and the per-ticket state machine.

use std::{fmt, str::FromStr};

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::TicketError,
    ids::{CategoryId, ChannelId, UserId},
};

/// Kind of request a ticket was opened for. Immutable after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketType {
    Support,
    Partnership,
}

impl TicketType {
    pub const ALL: [TicketType; 2] = [TicketType::Support, TicketType::Partnership];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Support => "support",
            Self::Partnership => "partnership",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Support => "Support",
            Self::Partnership => "Partnership",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Support => "Get help with technical issues or general questions",
            Self::Partnership => "Discuss partnership opportunities",
        }
    }

    pub fn emoji(self) -> char {
        match self {
            Self::Support => '🛠',
            Self::Partnership => '🤝',
        }
    }

    /// Title of the opening message posted into a new ticket channel.
    pub fn opening_title(self) -> &'static str {
        match self {
            Self::Support => "Support Ticket",
            Self::Partnership => "Partnership Inquiry",
        }
    }

    pub fn opening_body(self) -> &'static str {
        match self {
            Self::Support => {
                "Thank you for creating a support ticket. Our team will assist you shortly."
            }
            Self::Partnership => {
                "Thank you for your interest in partnering with us. Please provide all necessary details."
            }
        }
    }
}

impl fmt::Display for TicketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "support" => Ok(Self::Support),
            "partnership" => Ok(Self::Partnership),
            other => Err(format!("unknown ticket type '{other}'")),
        }
    }
}

/// Persisted status of a ticket record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    #[default]
    Open,
    Closed,
}

/// Live state of a ticket. `Closing` only exists in memory while a close runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TicketState {
    Open,
    Closing,
    Closed,
}

impl TicketState {
    /// Returns true when this state can transition to `next`.
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Open, Self::Closing) | (Self::Closing, Self::Closed) | (Self::Closing, Self::Open)
        )
    }

    /// Returns the typed rejection for a transition the table does not allow.
    pub fn ensure_transition(self, next: Self, channel_id: ChannelId) -> Result<(), TicketError> {
        if self.can_transition_to(next) {
            return Ok(());
        }
        match (self, next) {
            (Self::Closing | Self::Closed, Self::Closing) => {
                Err(TicketError::AlreadyClosed(channel_id))
            }
            (from, to) => Err(TicketError::InvalidTransition { from, to }),
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl From<TicketStatus> for TicketState {
    fn from(status: TicketStatus) -> Self {
        match status {
            TicketStatus::Open => Self::Open,
            TicketStatus::Closed => Self::Closed,
        }
    }
}

/// One ticket in the record log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketRecord {
    pub channel_id: ChannelId,
    pub user_id: UserId,
    pub category_id: CategoryId,
    pub ticket_type: TicketType,
    #[serde(with = "timestamp_format")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub status: TicketStatus,
    #[serde(
        default,
        with = "timestamp_format::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub closed_at: Option<DateTime<Utc>>,
}

impl TicketRecord {
    pub fn open(
        channel_id: ChannelId,
        user_id: UserId,
        category_id: CategoryId,
        ticket_type: TicketType,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            channel_id,
            user_id,
            category_id,
            ticket_type,
            created_at,
            status: TicketStatus::Open,
            closed_at: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == TicketStatus::Open
    }

    /// Marks the record closed. A record that is already closed keeps its
    /// original `closed_at`.
    pub fn mark_closed(&mut self, at: DateTime<Utc>) {
        if self.status == TicketStatus::Closed {
            return;
        }
        self.status = TicketStatus::Closed;
        self.closed_at = Some(at);
    }
}

/// Parses RFC 3339 timestamps, falling back to offset-less ISO 8601 which is
/// read as UTC. Logs written by earlier deployments use the offset-less form.
pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    let raw = raw.trim();
    if let Ok(value) = DateTime::parse_from_rfc3339(raw) {
        return Ok(value.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|error| format!("invalid timestamp '{raw}': {error}"))
}

mod timestamp_format {
    use chrono::{DateTime, Utc};
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    use super::{parse_timestamp, SecondsFormat};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Micros, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_timestamp(&raw).map_err(D::Error::custom)
    }

    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

        use super::parse_timestamp;

        pub fn serialize<S: Serializer>(
            value: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(value) => super::serialize(value, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            let raw = Option::<String>::deserialize(deserializer)?;
            raw.map(|raw| parse_timestamp(&raw).map_err(D::Error::custom))
                .transpose()
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    fn sample_record() -> TicketRecord {
        TicketRecord::open(
            ChannelId::new(900),
            UserId::new(42),
            CategoryId::new(10),
            TicketType::Support,
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap(),
        )
    }

    #[test]
    fn open_record_serializes_without_closed_at() {
        let value = serde_json::to_value(sample_record()).expect("encode");
        assert_eq!(
            value,
            json!({
                "channel_id": 900,
                "user_id": 42,
                "category_id": 10,
                "ticket_type": "support",
                "created_at": "2024-05-01T12:30:00.000000Z",
                "status": "open"
            })
        );
    }

    #[test]
    fn legacy_offsetless_timestamps_are_read_as_utc() {
        let record: TicketRecord = serde_json::from_value(json!({
            "channel_id": 1,
            "user_id": 2,
            "category_id": 3,
            "ticket_type": "partnership",
            "created_at": "2024-05-01T12:30:00.123456",
            "status": "closed",
            "closed_at": "2024-05-02T08:00:00"
        }))
        .expect("decode");
        assert_eq!(record.ticket_type, TicketType::Partnership);
        assert_eq!(record.status, TicketStatus::Closed);
        assert_eq!(
            record.closed_at,
            Some(Utc.with_ymd_and_hms(2024, 5, 2, 8, 0, 0).unwrap())
        );
    }

    #[test]
    fn mark_closed_sets_timestamp_once() {
        let mut record = sample_record();
        let first = Utc.with_ymd_and_hms(2024, 5, 3, 0, 0, 0).unwrap();
        record.mark_closed(first);
        record.mark_closed(first + chrono::Duration::hours(1));
        assert_eq!(record.status, TicketStatus::Closed);
        assert_eq!(record.closed_at, Some(first));
    }

    #[test]
    fn state_table_allows_only_close_path_and_rollback() {
        use TicketState::*;
        assert!(Open.can_transition_to(Closing));
        assert!(Closing.can_transition_to(Closed));
        assert!(Closing.can_transition_to(Open));
        assert!(!Open.can_transition_to(Closed));
        assert!(!Closed.can_transition_to(Open));
        assert!(!Closing.can_transition_to(Closing));
        assert!(Closed.is_terminal());
    }

    #[test]
    fn closing_a_closing_or_closed_ticket_is_already_closed() {
        let channel = ChannelId::new(5);
        assert!(matches!(
            TicketState::Closing.ensure_transition(TicketState::Closing, channel),
            Err(TicketError::AlreadyClosed(id)) if id == channel
        ));
        assert!(matches!(
            TicketState::Closed.ensure_transition(TicketState::Closing, channel),
            Err(TicketError::AlreadyClosed(_))
        ));
        assert!(matches!(
            TicketState::Closed.ensure_transition(TicketState::Open, channel),
            Err(TicketError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn ticket_type_parses_case_insensitively() {
        assert_eq!("Support".parse::<TicketType>(), Ok(TicketType::Support));
        assert!("billing".parse::<TicketType>().is_err());
    }
}
