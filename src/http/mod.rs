use anyhow::{Context, Result};
use reqwest::header::HeaderMap;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, error, instrument};

const USER_AGENT: &str = concat!("jellyfin-manager/", env!("CARGO_PKG_VERSION"));

#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }

    async fn check(response: Response, method: &str) -> Result<Response> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("HTTP {} failed with status: {}", method, status);
            return Err(anyhow::anyhow!(
                "API returned status {}: {}",
                status.as_u16(),
                body
            ));
        }
        Ok(response)
    }

    #[instrument(skip(self, headers), fields(url = %url))]
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str, headers: HeaderMap) -> Result<T> {
        debug!("Making GET request");
        let response = self.client.get(url).headers(headers).send().await?;
        let response = Self::check(response, "GET").await?;
        let json = response
            .json::<T>()
            .await
            .context("decoding response")?;
        Ok(json)
    }

    #[instrument(skip(self, headers, body), fields(url = %url))]
    pub async fn post_json<T: DeserializeOwned, B: serde::Serialize>(
        &self,
        url: &str,
        headers: HeaderMap,
        body: &B,
    ) -> Result<T> {
        debug!("Making POST request");
        let response = self
            .client
            .post(url)
            .headers(headers)
            .json(body)
            .send()
            .await?;
        let response = Self::check(response, "POST").await?;
        let json = response
            .json::<T>()
            .await
            .context("decoding response")?;
        Ok(json)
    }

    /// POST without a body, ignoring whatever the server returns on success.
    #[instrument(skip(self, headers), fields(url = %url))]
    pub async fn post(&self, url: &str, headers: HeaderMap) -> Result<()> {
        debug!("Making POST request");
        let response = self.client.post(url).headers(headers).send().await?;
        Self::check(response, "POST").await?;
        Ok(())
    }
}
