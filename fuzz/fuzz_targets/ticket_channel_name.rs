#![no_main]

use desk_tickets::{ticket_channel_name, TicketType, UserId};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let display_name = String::from_utf8_lossy(data);
    for ticket_type in TicketType::ALL {
        let name = ticket_channel_name(ticket_type, &display_name, UserId::new(42));
        assert!(name.starts_with("ticket-"));
        assert!(name.chars().count() <= 100);
        assert!(!name.chars().any(char::is_whitespace));
    }
});
