use crate::models::{Backup, WatchedRecord};
use anyhow::{Context, Result};
use chrono::Utc;
use std::path::Path;
use tracing::{info, instrument};

pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn new_backup(
    server_url: &str,
    user_id: &str,
    user_name: &str,
    watched_items: Vec<WatchedRecord>,
) -> Backup {
    Backup {
        created_at: Utc::now(),
        server_url: server_url.to_string(),
        user_id: user_id.to_string(),
        user_name: user_name.to_string(),
        app_version: APP_VERSION.to_string(),
        watched_items,
    }
}

#[instrument(skip(backup), fields(items = backup.watched_items.len()))]
pub fn save(backup: &Backup, path: &Path) -> Result<()> {
    let data = serde_json::to_string_pretty(backup).context("serializing backup")?;
    std::fs::write(path, data)
        .with_context(|| format!("writing backup file {}", path.display()))?;
    info!("Backed up {} watched items to {}", backup.watched_items.len(), path.display());
    Ok(())
}

#[instrument]
pub fn load(path: &Path) -> Result<Backup> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("reading backup file {}", path.display()))?;
    let backup: Backup = serde_json::from_str(&data)
        .with_context(|| format!("parsing backup file {}", path.display()))?;
    Ok(backup)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ItemKind, ProviderIds};

    #[test]
    fn saved_backup_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backup.json");

        let mut provider_ids = ProviderIds::new();
        provider_ids.insert("Imdb".to_string(), "tt1".to_string());
        let backup = new_backup(
            "http://media:8096",
            "uid",
            "alice",
            vec![WatchedRecord {
                id: "m1".to_string(),
                name: "Heat".to_string(),
                kind: ItemKind::Movie,
                series_name: None,
                season_name: None,
                played_date: Some(Utc::now()),
                provider_ids,
            }],
        );

        save(&backup, &path).unwrap();
        let loaded = load(&path).unwrap();

        assert_eq!(loaded.user_name, "alice");
        assert_eq!(loaded.app_version, APP_VERSION);
        assert_eq!(loaded.watched_items, backup.watched_items);
    }

    #[test]
    fn reads_backup_written_by_earlier_releases() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.json");
        std::fs::write(
            &path,
            r#"{
  "created_at": "2024-03-01T10:00:00.123456789+01:00",
  "server_url": "http://old:8096",
  "user_id": "abc",
  "user_name": "bob",
  "version": "1.0.0",
  "watched_items": [
    {
      "id": "e1",
      "name": "Ep5",
      "type": 2,
      "series_name": "Show",
      "season_name": "Season 1",
      "played_date": "0001-01-01T00:00:00Z"
    }
  ]
}"#,
        )
        .unwrap();

        let backup = load(&path).unwrap();
        let item = &backup.watched_items[0];
        assert_eq!(item.kind, ItemKind::Episode);
        assert_eq!(item.secondary_key(), "Season 1:Ep5");
        assert!(item.provider_ids.is_empty());
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(&dir.path().join("nope.json")).is_err());
    }
}
