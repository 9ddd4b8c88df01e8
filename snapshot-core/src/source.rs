use std::time::Duration;

use async_trait::async_trait;
use reqwest::{redirect, Client, ClientBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::config::SourceConfig;
use crate::error::FetchError;
use crate::models::{EntityDetail, Snapshot};

/// The slow, unreliable upstream the refresh worker pulls from.
///
/// Both calls may fail or hang; the worker wraps each of them in its own timeout.
#[async_trait]
pub trait DataSource: Send + Sync + 'static {
    async fn fetch_snapshot(&self) -> Result<Snapshot, FetchError>;

    /// `Ok(None)` means the upstream has nothing for `id`, which is not an error.
    async fn fetch_detail(&self, id: &str) -> Result<Option<EntityDetail>, FetchError>;
}

/// DataSource backed by an upstream service that already serves structured JSON.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: Client,
    base: Url,
}

impl HttpSource {
    /// Fails when `base_url` does not parse or cannot take path segments.
    pub fn new(client: Client, base_url: &str) -> Result<Self, FetchError> {
        let base = Url::parse(base_url.trim())?;
        if base.cannot_be_a_base() {
            return Err(FetchError::UnsupportedBase(base.to_string()));
        }
        Ok(Self { client, base })
    }

    pub fn from_config(config: &SourceConfig) -> Result<Self, FetchError> {
        let client = build_client(config)?;
        Self::new(client, &config.base_url)
    }

    pub fn base_url(&self) -> &str {
        self.base.as_str().trim_end_matches('/')
    }

    /// Appends `segments` to the base path; each one is percent-encoded on its own,
    /// so an id can never escape its segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, FetchError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| FetchError::UnsupportedBase(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<Option<T>, FetchError> {
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!(%url, "upstream has no record");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        let bytes = response.bytes().await?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }
}

#[async_trait]
impl DataSource for HttpSource {
    async fn fetch_snapshot(&self) -> Result<Snapshot, FetchError> {
        let url = self.endpoint(&["snapshot"])?;
        match self.get_json(url.clone()).await? {
            Some(snapshot) => Ok(snapshot),
            None => Err(FetchError::Status {
                status: 404,
                url: url.to_string(),
            }),
        }
    }

    async fn fetch_detail(&self, id: &str) -> Result<Option<EntityDetail>, FetchError> {
        let url = self.endpoint(&["detail", id])?;
        let detail: Option<EntityDetail> = self.get_json(url).await?;
        Ok(detail.map(EntityDetail::with_derived_pivot))
    }
}

pub fn build_client(config: &SourceConfig) -> Result<Client, FetchError> {
    let client = ClientBuilder::new()
        .redirect(redirect::Policy::limited(5))
        .user_agent(config.user_agent.clone())
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .build()?;
    Ok(client)
}
