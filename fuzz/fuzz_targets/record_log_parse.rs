#![no_main]

use desk_tickets::parse_record_log;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let raw = String::from_utf8_lossy(data);
    let Ok(records) = parse_record_log(&raw) else {
        return;
    };
    let rendered = serde_json::to_string_pretty(&records).expect("records serialize");
    let reparsed = parse_record_log(&rendered).expect("rendered log parses");
    assert_eq!(reparsed.len(), records.len());
    let rerendered = serde_json::to_string_pretty(&reparsed).expect("records serialize");
    assert_eq!(rerendered, rendered);
});
