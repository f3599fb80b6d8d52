//! Read-only ticket statistics.

use std::collections::BTreeMap;

use crate::record::{TicketRecord, TicketStatus, TicketType};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TicketStats {
    pub total: usize,
    pub open: usize,
    pub closed: usize,
    pub by_type: BTreeMap<TicketType, usize>,
}

impl TicketStats {
    pub fn from_records(records: &[TicketRecord]) -> Self {
        let mut stats = Self {
            total: records.len(),
            ..Self::default()
        };
        for record in records {
            match record.status {
                TicketStatus::Open => stats.open += 1,
                TicketStatus::Closed => stats.closed += 1,
            }
            *stats.by_type.entry(record.ticket_type).or_default() += 1;
        }
        stats
    }

    /// `Label: count` lines, one per ticket type seen.
    pub fn type_breakdown(&self) -> Vec<String> {
        self.by_type
            .iter()
            .map(|(ticket_type, count)| format!("{}: {count}", ticket_type.label()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::ids::{CategoryId, ChannelId, UserId};

    #[test]
    fn counts_status_and_type() {
        let mut records = vec![
            TicketRecord::open(ChannelId::new(1), UserId::new(1), CategoryId::new(1), TicketType::Support, Utc::now()),
            TicketRecord::open(ChannelId::new(2), UserId::new(2), CategoryId::new(1), TicketType::Support, Utc::now()),
            TicketRecord::open(ChannelId::new(3), UserId::new(3), CategoryId::new(2), TicketType::Partnership, Utc::now()),
        ];
        records[0].mark_closed(Utc::now());

        let stats = TicketStats::from_records(&records);
        assert_eq!((stats.total, stats.open, stats.closed), (3, 2, 1));
        assert_eq!(stats.by_type.get(&TicketType::Support), Some(&2));
        assert_eq!(stats.type_breakdown(), vec!["Support: 2", "Partnership: 1"]);
    }

    #[test]
    fn empty_log_reports_zeroes() {
        let stats = TicketStats::from_records(&[]);
        assert_eq!(stats, TicketStats::default());
        assert!(stats.type_breakdown().is_empty());
    }
}
