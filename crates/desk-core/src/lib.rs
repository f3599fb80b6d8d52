//! Low-level utilities shared across Desk crates.
//!
//! Provides atomic file-write helpers used by the ticket record log and the
//! Unix clock readings used to name temporary and archived artifacts.

pub mod atomic_io;
pub mod time_utils;

pub use atomic_io::{copy_aside, write_text_atomic};
pub use time_utils::{current_unix_timestamp, current_unix_timestamp_ms};

#[cfg(test)]
mod tests {
    use std::fs::read_to_string;

    use super::*;

    #[test]
    fn time_utils_round_trip_bounds() {
        let now_s = current_unix_timestamp();
        let now_ms = current_unix_timestamp_ms();
        let now_ms_s = now_ms / 1_000;
        assert!(now_ms_s >= now_s);
        assert!(now_ms_s <= now_s.saturating_add(1));
    }

    #[test]
    fn write_text_atomic_creates_missing_parent_and_replaces_content() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let path = tempdir.path().join("data").join("tickets.json");
        write_text_atomic(&path, "[]").expect("first write");
        write_text_atomic(&path, "[1]").expect("second write");
        assert_eq!(read_to_string(&path).expect("read"), "[1]");

        let leftovers = std::fs::read_dir(path.parent().expect("parent"))
            .expect("list")
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().contains(".tmp-"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn write_text_atomic_rejects_directory_destination() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let error = write_text_atomic(tempdir.path(), "x").expect_err("directory target");
        assert!(error.to_string().contains("is a directory"));
    }

    #[test]
    fn copy_aside_keeps_original_and_writes_tagged_sibling() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let path = tempdir.path().join("tickets.json");
        std::fs::write(&path, "{not json").expect("seed");

        let backup = copy_aside(&path, "corrupt").expect("copy aside");
        assert!(backup
            .file_name()
            .and_then(|name| name.to_str())
            .expect("name")
            .starts_with("tickets.json.corrupt-"));
        assert_eq!(read_to_string(&backup).expect("backup"), "{not json");
        assert_eq!(read_to_string(&path).expect("original"), "{not json");
    }
}
