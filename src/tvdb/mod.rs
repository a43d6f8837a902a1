use crate::http::HttpClient;
use crate::missing::EpisodeSource;
use crate::models::CatalogEpisode;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

const BASE_URL: &str = "https://api4.thetvdb.com/v4";

pub struct TvdbClient {
    http: HttpClient,
    api_key: String,
    base_url: String,
    token: Option<String>,
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    apikey: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    data: LoginData,
}

#[derive(Debug, Deserialize)]
struct LoginData {
    token: String,
}

#[derive(Debug, Deserialize)]
struct EpisodesPage {
    data: EpisodesData,
    #[serde(default)]
    links: Links,
}

#[derive(Debug, Deserialize)]
struct EpisodesData {
    #[serde(default)]
    episodes: Vec<CatalogEpisode>,
}

#[derive(Debug, Default, Deserialize)]
struct Links {
    next: Option<String>,
}

impl Links {
    fn has_next(&self) -> bool {
        self.next.as_deref().is_some_and(|n| !n.is_empty())
    }
}

impl TvdbClient {
    pub fn new(http: HttpClient, api_key: String) -> Self {
        Self {
            http,
            api_key,
            base_url: BASE_URL.to_string(),
            token: None,
        }
    }

    /// Exchanges the API key for a bearer token.
    #[instrument(skip(self))]
    pub async fn login(&mut self) -> Result<()> {
        let url = format!("{}/login", self.base_url);
        let body = LoginRequest {
            apikey: &self.api_key,
        };

        let response: LoginResponse = self
            .http
            .post_json(&url, HeaderMap::new(), &body)
            .await
            .context("TVDB login failed")?;

        self.token = Some(response.data.token);
        info!("TVDB authentication successful");
        Ok(())
    }

    fn headers(&self) -> Result<HeaderMap> {
        let token = self
            .token
            .as_ref()
            .ok_or_else(|| anyhow!("not authenticated with TVDB, login first"))?;

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", token))?);
        Ok(headers)
    }
}

#[async_trait]
impl EpisodeSource for TvdbClient {
    /// Follows pagination until the response carries no next link.
    #[instrument(skip(self))]
    async fn series_episodes(&self, series_id: &str) -> Result<Vec<CatalogEpisode>> {
        let headers = self.headers()?;
        let mut episodes = Vec::new();
        let mut page = 0;

        loop {
            let url = format!(
                "{}/series/{}/episodes/default?page={}",
                self.base_url,
                urlencoding::encode(series_id),
                page
            );
            let response: EpisodesPage = self
                .http
                .get_json(&url, headers.clone())
                .await
                .with_context(|| format!("fetching episodes page {}", page))?;

            debug!("Page {} returned {} episodes", page, response.data.episodes.len());
            episodes.extend(response.data.episodes);

            if !response.links.has_next() {
                break;
            }
            page += 1;
        }

        Ok(episodes)
    }
}
