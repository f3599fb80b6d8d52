use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// On-disk configuration. Every field is optional; gaps are filled from
/// flags and environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub bot_token: Option<String>,
    pub guild_id: Option<u64>,
    pub staff_role_id: Option<u64>,
    pub unlimited_tickets_role_id: Option<u64>,
    pub ticket_channel_id: Option<u64>,
    pub transcripts_channel_id: Option<u64>,
    pub categories: CategorySection,
    pub settings: SettingsSection,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CategorySection {
    pub support: Option<u64>,
    pub partnership: Option<u64>,
    pub transfer: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SettingsSection {
    pub rate_limit_seconds: Option<u64>,
    pub max_tickets_per_user: Option<usize>,
}

/// Reads `path` if it exists. A missing file is not an error.
pub fn load_config_file(path: &Path) -> Result<Option<ConfigFile>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let parsed = serde_json::from_str::<ConfigFile>(&raw)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;
    Ok(Some(parsed))
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn parses_nested_sections_and_ignores_unknown_keys() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
  "bot_token": "abc",
  "staff_role_id": 11,
  "ticket_channel_id": 12,
  "transcripts_channel_id": 13,
  "categories": {"support": 21, "partnership": 22, "transfer": 23},
  "settings": {"rate_limit_seconds": 30},
  "embed_color": "blue"
}"#,
        )
        .expect("write");

        let config = load_config_file(&path).expect("load").expect("present");
        assert_eq!(config.bot_token.as_deref(), Some("abc"));
        assert_eq!(config.categories.transfer, Some(23));
        assert_eq!(config.settings.rate_limit_seconds, Some(30));
        assert_eq!(config.settings.max_tickets_per_user, None);
        assert_eq!(config.unlimited_tickets_role_id, None);
    }

    #[test]
    fn missing_file_is_none_and_malformed_file_errors() {
        let dir = tempdir().expect("tempdir");
        assert_eq!(load_config_file(&dir.path().join("absent.json")).expect("load"), None);

        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").expect("write");
        let error = load_config_file(&path).expect_err("malformed");
        assert!(format!("{error:#}").contains("failed to parse config file"));
    }
}
