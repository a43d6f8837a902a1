use crate::config::Connection;
use crate::http::HttpClient;
use crate::missing::LocalLibrary;
use crate::models::{
    null_as_default, provider_ids_skip_nulls, ItemKind, LibraryEpisode, ProviderIds, SeriesInfo,
    TargetItem, WatchedRecord,
};
use crate::restore::LiveCatalog;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use serde::Deserialize;
use tracing::{debug, info, instrument};
use uuid::Uuid;

const CLIENT_NAME: &str = "Jellyfin Manager";
const TICKS_PER_MINUTE: i64 = 60 * 10_000_000;

pub struct JellyfinClient {
    http: HttpClient,
    connection: Connection,
    user_id: String,
    device_id: Uuid,
}

#[derive(Debug, Deserialize)]
struct ItemsResponse {
    #[serde(rename = "Items", default, deserialize_with = "null_as_default")]
    items: Vec<ItemDto>,
}

#[derive(Debug, Deserialize)]
struct UserDto {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "Name")]
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct UserData {
    #[serde(rename = "Played", default, deserialize_with = "null_as_default")]
    played: bool,
    #[serde(rename = "LastPlayedDate", default)]
    last_played_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct ItemDto {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "Name", default, deserialize_with = "null_as_default")]
    name: String,
    #[serde(rename = "Type", default, deserialize_with = "null_as_default")]
    item_type: String,
    #[serde(rename = "SeriesName")]
    series_name: Option<String>,
    #[serde(rename = "SeasonName")]
    season_name: Option<String>,
    #[serde(rename = "IndexNumber")]
    index_number: Option<i32>,
    #[serde(rename = "ParentIndexNumber")]
    parent_index_number: Option<i32>,
    #[serde(rename = "RunTimeTicks")]
    run_time_ticks: Option<i64>,
    #[serde(rename = "ProviderIds", default, deserialize_with = "provider_ids_skip_nulls")]
    provider_ids: ProviderIds,
    #[serde(rename = "UserData", default, deserialize_with = "null_as_default")]
    user_data: UserData,
}

impl ItemDto {
    fn kind(&self) -> ItemKind {
        match self.item_type.as_str() {
            "Movie" => ItemKind::Movie,
            "Episode" => ItemKind::Episode,
            _ => ItemKind::Unknown,
        }
    }

    fn into_watched(self) -> WatchedRecord {
        WatchedRecord {
            kind: self.kind(),
            id: self.id,
            name: self.name,
            series_name: self.series_name,
            season_name: self.season_name,
            played_date: self.user_data.last_played_date,
            provider_ids: self.provider_ids,
        }
    }

    fn into_movie(self) -> TargetItem {
        TargetItem {
            id: self.id,
            kind: ItemKind::Movie,
            name: self.name,
            played: self.user_data.played,
            provider_ids: self.provider_ids,
            season_name: None,
        }
    }

    fn into_episode(self) -> LibraryEpisode {
        LibraryEpisode {
            runtime_minutes: ticks_to_minutes(self.run_time_ticks.unwrap_or(0)),
            season_number: self.parent_index_number.unwrap_or(0),
            episode_number: self.index_number.unwrap_or(0),
            id: self.id,
            name: self.name,
            season_name: self.season_name.unwrap_or_default(),
            provider_ids: self.provider_ids,
            played: self.user_data.played,
        }
    }

    fn into_series(self) -> SeriesInfo {
        SeriesInfo {
            id: self.id,
            name: self.name,
            provider_ids: self.provider_ids,
        }
    }
}

fn ticks_to_minutes(ticks: i64) -> i32 {
    i32::try_from(ticks.max(0) / TICKS_PER_MINUTE).unwrap_or(i32::MAX)
}

fn find_user_id(users: &[UserDto], user_name: &str) -> Option<String> {
    users
        .iter()
        .find(|u| u.name.to_lowercase() == user_name.to_lowercase())
        .map(|u| u.id.clone())
}

impl JellyfinClient {
    /// Connects and resolves the configured user name to its ID.
    #[instrument(skip(http, connection), fields(server = %connection.server_url))]
    pub async fn connect(http: HttpClient, connection: Connection) -> Result<Self> {
        let mut client = Self {
            http,
            connection,
            user_id: String::new(),
            device_id: Uuid::new_v4(),
        };

        let users: Vec<UserDto> = client.get("/Users").await?;
        client.user_id = find_user_id(&users, &client.connection.user_name)
            .ok_or_else(|| anyhow!("user not found: {}", client.connection.user_name))?;

        info!("Logged in to {} as {}", client.connection.server_url, client.connection.user_name);
        Ok(client)
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    fn headers(&self) -> Result<HeaderMap> {
        let token = &self.connection.api_key;
        let authorization = format!(
            "MediaBrowser Client=\"{}\", Device=\"Rust Client\", DeviceId=\"{}\", Version=\"{}\", Token=\"{}\"",
            CLIENT_NAME,
            self.device_id,
            env!("CARGO_PKG_VERSION"),
            token
        );

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&authorization)?);
        headers.insert("X-Emby-Token", HeaderValue::from_str(token)?);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        let url = format!("{}{}", self.connection.server_url, endpoint);
        self.http.get_json(&url, self.headers()?).await
    }

    async fn items(&self, query: &str) -> Result<Vec<ItemDto>> {
        let endpoint = format!("/Items?userId={}&{}", self.user_id, query);
        let response: ItemsResponse = self.get(&endpoint).await?;
        debug!("Received {} items", response.items.len());
        Ok(response.items)
    }

    #[instrument(skip(self))]
    pub async fn get_watched_items(&self) -> Result<Vec<WatchedRecord>> {
        let items = self
            .items("Filters=IsPlayed&Recursive=true&IncludeItemTypes=Movie,Episode&Fields=Path,ProviderIds,SeriesName,SeasonName")
            .await
            .context("fetching watched items")?;
        Ok(items.into_iter().map(ItemDto::into_watched).collect())
    }
}

#[async_trait]
impl LocalLibrary for JellyfinClient {
    #[instrument(skip(self))]
    async fn get_all_series(&self) -> Result<Vec<SeriesInfo>> {
        let items = self
            .items("Recursive=true&IncludeItemTypes=Series&Fields=ProviderIds")
            .await
            .context("fetching series")?;
        Ok(items.into_iter().map(ItemDto::into_series).collect())
    }

    #[instrument(skip(self))]
    async fn get_episodes_for_series(&self, series_id: &str) -> Result<Vec<LibraryEpisode>> {
        let query = format!(
            "ParentId={}&Recursive=true&IncludeItemTypes=Episode&Fields=ProviderIds,SeriesName,SeasonName,UserData",
            urlencoding::encode(series_id)
        );
        let items = self.items(&query).await.context("fetching episodes")?;
        Ok(items.into_iter().map(ItemDto::into_episode).collect())
    }
}

#[async_trait]
impl LiveCatalog for JellyfinClient {
    #[instrument(skip(self))]
    async fn get_all_movies(&self) -> Result<Vec<TargetItem>> {
        let items = self
            .items("Recursive=true&IncludeItemTypes=Movie&Fields=ProviderIds,UserData")
            .await
            .context("fetching movies")?;
        Ok(items.into_iter().map(ItemDto::into_movie).collect())
    }

    #[instrument(skip(self))]
    async fn search_series(&self, name: &str) -> Result<Vec<(String, String)>> {
        let query = format!(
            "SearchTerm={}&IncludeItemTypes=Series&Recursive=true&Limit=10",
            urlencoding::encode(name)
        );
        let items = self.items(&query).await.context("searching series")?;
        Ok(items.into_iter().map(|i| (i.id, i.name)).collect())
    }

    #[instrument(skip(self))]
    async fn mark_as_watched(&self, item_id: &str) -> Result<()> {
        let url = format!(
            "{}/UserPlayedItems/{}?userId={}",
            self.connection.server_url,
            urlencoding::encode(item_id),
            self.user_id
        );
        self.http.post(&url, self.headers()?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_episode_items() {
        let json = serde_json::json!({
            "Items": [{
                "Id": "ep1",
                "Name": "Pilot",
                "Type": "Episode",
                "SeriesName": "Show",
                "SeasonName": "Season 1",
                "IndexNumber": 1,
                "ParentIndexNumber": 1,
                "RunTimeTicks": 26_999_000_000i64,
                "ProviderIds": { "Tvdb": "123", "Imdb": "tt9" },
                "UserData": { "Played": true }
            }]
        });

        let response: ItemsResponse = serde_json::from_value(json).unwrap();
        let episode = response.items.into_iter().next().unwrap().into_episode();

        assert_eq!(episode.runtime_minutes, 44);
        assert_eq!((episode.season_number, episode.episode_number), (1, 1));
        assert_eq!(episode.season_name, "Season 1");
        assert!(episode.played);
        assert_eq!(episode.provider_ids.get("Tvdb").map(String::as_str), Some("123"));
    }

    #[test]
    fn decodes_watched_items_without_optional_fields() {
        let json = serde_json::json!({
            "Items": [
                { "Id": "m1", "Name": "Heat", "Type": "Movie",
                  "UserData": { "Played": true, "LastPlayedDate": "2023-05-01T20:00:00.0000000Z" } },
                { "Id": "x", "Name": "Trailer", "Type": "Trailer" }
            ]
        });

        let response: ItemsResponse = serde_json::from_value(json).unwrap();
        let watched: Vec<_> = response.items.into_iter().map(ItemDto::into_watched).collect();

        assert_eq!(watched[0].kind, ItemKind::Movie);
        assert!(watched[0].played_date.is_some());
        assert!(watched[0].provider_ids.is_empty());
        assert_eq!(watched[1].kind, ItemKind::Unknown);
    }

    #[test]
    fn null_fields_decode_as_empty() {
        let json = serde_json::json!({
            "Items": [
                { "Id": "m1", "Name": null, "Type": "Movie",
                  "ProviderIds": { "Imdb": "tt1", "Tmdb": null },
                  "UserData": { "Played": null } },
                { "Id": "m2", "Name": "Ronin", "Type": "Movie",
                  "ProviderIds": null, "UserData": null }
            ]
        });

        let response: ItemsResponse = serde_json::from_value(json).unwrap();
        let movies: Vec<_> = response.items.into_iter().map(ItemDto::into_movie).collect();

        assert_eq!(movies[0].name, "");
        assert_eq!(movies[0].provider_ids.len(), 1);
        assert_eq!(movies[0].provider_ids.get("Imdb").map(String::as_str), Some("tt1"));
        assert!(!movies[0].played);
        assert!(movies[1].provider_ids.is_empty());
        assert!(!movies[1].played);
    }

    #[test]
    fn null_item_list_decodes_as_empty() {
        let response: ItemsResponse = serde_json::from_str(r#"{"Items":null}"#).unwrap();
        assert!(response.items.is_empty());
    }

    #[test]
    fn user_lookup_ignores_case() {
        let users = vec![
            UserDto { id: "1".to_string(), name: "Admin".to_string() },
            UserDto { id: "2".to_string(), name: "Alice".to_string() },
        ];
        assert_eq!(find_user_id(&users, "alice"), Some("2".to_string()));
        assert_eq!(find_user_id(&users, "bob"), None);
    }

    #[test]
    fn runtime_ticks_round_down_to_minutes() {
        assert_eq!(ticks_to_minutes(0), 0);
        assert_eq!(ticks_to_minutes(TICKS_PER_MINUTE - 1), 0);
        assert_eq!(ticks_to_minutes(90 * TICKS_PER_MINUTE), 90);
        assert_eq!(ticks_to_minutes(-5), 0);
    }
}
