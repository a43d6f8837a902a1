use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Provider name (e.g. `Imdb`, `Tmdb`, `Tvdb`) to external ID.
pub type ProviderIds = BTreeMap<String, String>;

/// Local runtime in minutes keyed by `(season, episode)`.
pub type LocalRuntimes = HashMap<(i32, i32), i32>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum ItemKind {
    Unknown,
    Movie,
    Episode,
}

impl From<u8> for ItemKind {
    fn from(value: u8) -> Self {
        match value {
            1 => ItemKind::Movie,
            2 => ItemKind::Episode,
            _ => ItemKind::Unknown,
        }
    }
}

impl From<ItemKind> for u8 {
    fn from(kind: ItemKind) -> Self {
        match kind {
            ItemKind::Unknown => 0,
            ItemKind::Movie => 1,
            ItemKind::Episode => 2,
        }
    }
}

/// Builds the name based fallback key. Episodes are qualified by season name
/// because episode titles repeat across seasons.
pub fn secondary_key(kind: ItemKind, season_name: Option<&str>, name: &str) -> String {
    match kind {
        ItemKind::Episode => format!("{}:{}", season_name.unwrap_or_default(), name),
        _ => name.to_string(),
    }
}

/// A single watched entry captured in a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WatchedRecord {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ItemKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub season_name: Option<String>,
    #[serde(default)]
    pub played_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub provider_ids: ProviderIds,
}

impl WatchedRecord {
    pub fn secondary_key(&self) -> String {
        secondary_key(self.kind, self.season_name.as_deref(), &self.name)
    }
}

/// The on-disk snapshot of a user's watch state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Backup {
    pub created_at: DateTime<Utc>,
    pub server_url: String,
    pub user_id: String,
    pub user_name: String,
    #[serde(rename = "version")]
    pub app_version: String,
    pub watched_items: Vec<WatchedRecord>,
}

/// A movie or episode as it currently exists on the target server.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetItem {
    pub id: String,
    pub kind: ItemKind,
    pub name: String,
    pub played: bool,
    pub provider_ids: ProviderIds,
    pub season_name: Option<String>,
}

impl TargetItem {
    pub fn secondary_key(&self) -> String {
        secondary_key(self.kind, self.season_name.as_deref(), &self.name)
    }
}

#[derive(Debug, Clone)]
pub struct SeriesInfo {
    pub id: String,
    pub name: String,
    pub provider_ids: ProviderIds,
}

/// An episode on the local server, with the fields both restore and the
/// missing episode scan need.
#[derive(Debug, Clone)]
pub struct LibraryEpisode {
    pub id: String,
    pub name: String,
    pub season_name: String,
    pub season_number: i32,
    pub episode_number: i32,
    pub runtime_minutes: i32,
    pub provider_ids: ProviderIds,
    pub played: bool,
}

impl From<&LibraryEpisode> for TargetItem {
    fn from(episode: &LibraryEpisode) -> Self {
        TargetItem {
            id: episode.id.clone(),
            kind: ItemKind::Episode,
            name: episode.name.clone(),
            played: episode.played,
            provider_ids: episode.provider_ids.clone(),
            season_name: Some(episode.season_name.clone()),
        }
    }
}

/// An episode as listed by the authoritative catalog.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CatalogEpisode {
    #[serde(rename = "seasonNumber", default, deserialize_with = "null_as_default")]
    pub season_number: i32,
    #[serde(rename = "number", default, deserialize_with = "null_as_default")]
    pub episode_number: i32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub overview: String,
    #[serde(rename = "aired", default, deserialize_with = "null_as_default")]
    pub air_date: String,
    #[serde(rename = "runtime", default, deserialize_with = "null_as_default")]
    pub runtime_minutes: i32,
}

/// Treats an explicit `null` like a missing field.
pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Provider ID maps where both the map and individual IDs may be `null`.
pub fn provider_ids_skip_nulls<'de, D>(deserializer: D) -> Result<ProviderIds, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<BTreeMap<String, Option<String>>>::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(provider, id)| id.map(|id| (provider, id)))
        .collect())
}

#[derive(Debug, Clone, PartialEq)]
pub struct MissingEpisode {
    pub season_number: i32,
    pub episode_number: i32,
    pub name: String,
    pub air_date: String,
    pub overview: String,
}

pub fn local_runtimes(episodes: &[LibraryEpisode]) -> LocalRuntimes {
    episodes
        .iter()
        .map(|ep| ((ep.season_number, ep.episode_number), ep.runtime_minutes))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_kind_is_stored_as_integer() {
        let record = WatchedRecord {
            id: "abc".to_string(),
            name: "Ep5".to_string(),
            kind: ItemKind::Episode,
            series_name: Some("Show".to_string()),
            season_name: Some("Season 1".to_string()),
            played_date: None,
            provider_ids: ProviderIds::new(),
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], 2);
        assert!(json.get("provider_ids").is_none());
    }

    #[test]
    fn unknown_kind_values_decode_as_unknown() {
        let json = r#"{"id":"1","name":"x","type":7,"played_date":"2024-01-02T03:04:05Z"}"#;
        let record: WatchedRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.kind, ItemKind::Unknown);
        assert!(record.played_date.is_some());
    }

    #[test]
    fn episode_keys_are_qualified_by_season() {
        assert_eq!(
            secondary_key(ItemKind::Episode, Some("Season 1"), "Ep5"),
            "Season 1:Ep5"
        );
        assert_eq!(secondary_key(ItemKind::Movie, Some("ignored"), "Heat"), "Heat");
    }

    #[test]
    fn catalog_episode_tolerates_nulls() {
        let json = r#"{"seriesId":12,"seasonNumber":1,"number":3,"name":null,"overview":null,"aired":null,"runtime":null}"#;
        let ep: CatalogEpisode = serde_json::from_str(json).unwrap();
        assert_eq!(ep.runtime_minutes, 0);
        assert_eq!(ep.air_date, "");
        assert_eq!(ep.episode_number, 3);
    }
}
