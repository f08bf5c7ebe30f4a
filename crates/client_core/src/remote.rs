//! Remote catalog access. Raw wire records are mapped to [`CatalogItem`]s here
//! and never leave this module.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use shared::{
    domain::{CatalogItem, ItemId},
    protocol::{DetailRecord, ListPageResponse},
};
use tracing::debug;
use url::Url;

use crate::error::FetchError;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Reference to one catalog entry's detail record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailRef {
    pub name: String,
    pub detail_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogListing {
    pub entries: Vec<DetailRef>,
    pub has_more: bool,
}

#[async_trait]
pub trait RemoteCatalogClient: Send + Sync {
    async fn list_page(&self, limit: u32, offset: u32) -> Result<CatalogListing, FetchError>;
    async fn get_detail(&self, detail: &DetailRef) -> Result<CatalogItem, FetchError>;
}

/// Stand-in used when no catalog endpoint is configured.
pub struct OfflineCatalogClient;

#[async_trait]
impl RemoteCatalogClient for OfflineCatalogClient {
    async fn list_page(&self, limit: u32, offset: u32) -> Result<CatalogListing, FetchError> {
        Err(FetchError::Unavailable(format!(
            "no catalog endpoint configured (limit={limit} offset={offset})"
        )))
    }

    async fn get_detail(&self, detail: &DetailRef) -> Result<CatalogItem, FetchError> {
        Err(FetchError::Unavailable(format!(
            "no catalog endpoint configured ({})",
            detail.detail_url
        )))
    }
}

pub struct HttpCatalogClient {
    http: Client,
    base_url: Url,
}

impl HttpCatalogClient {
    pub fn new(base_url: &str) -> Result<Self, FetchError> {
        Self::with_timeout(base_url, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, FetchError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: normalize_base_url(base_url)?,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn detail_ref_for(&self, id: ItemId) -> Result<DetailRef, FetchError> {
        let url = self.base_url.join(&format!("pokemon/{}/", id.0))?;
        Ok(DetailRef {
            name: id.to_string(),
            detail_url: url.to_string(),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, FetchError> {
        let res = self.http.get(url.clone()).send().await?;
        let status = res.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(res.json().await?)
    }
}

#[async_trait]
impl RemoteCatalogClient for HttpCatalogClient {
    async fn list_page(&self, limit: u32, offset: u32) -> Result<CatalogListing, FetchError> {
        let mut url = self.base_url.join("pokemon")?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string())
            .append_pair("offset", &offset.to_string());
        debug!(%url, "catalog: list page");

        let body: ListPageResponse = self.get_json(url).await?;
        let has_more = body.has_more();
        Ok(CatalogListing {
            entries: body
                .results
                .into_iter()
                .map(|entry| DetailRef {
                    name: entry.name,
                    detail_url: entry.url,
                })
                .collect(),
            has_more,
        })
    }

    async fn get_detail(&self, detail: &DetailRef) -> Result<CatalogItem, FetchError> {
        let url = Url::parse(&detail.detail_url)?;
        let record: DetailRecord = self.get_json(url).await?;
        Ok(CatalogItem::try_from(record)?)
    }
}

// `Url::join` replaces the last path segment unless the base ends with '/'.
fn normalize_base_url(raw: &str) -> Result<Url, url::ParseError> {
    let trimmed = raw.trim();
    if trimmed.ends_with('/') {
        Url::parse(trimmed)
    } else {
        Url::parse(&format!("{trimmed}/"))
    }
}

#[cfg(test)]
#[path = "tests/remote_tests.rs"]
mod tests;
