//! Blocking (synchronous) API.
//!
//! Wraps the async clients with a current-thread Tokio runtime so the batch
//! engine, which is synchronous and rayon-parallel, never manages a runtime
//! of its own.

use std::time::Duration;

use tracing::debug;

use crate::error::{CloudError, Result};
use crate::stac_client::{ItemSearch, StacCatalog, StacClient, StacClientOptions};
use crate::stac_models::{StacItem, StacItemCollection, StacSearchParams};

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| CloudError::Network(e.to_string()))
}

/// Blocking wrapper around [`StacClient`].
pub struct StacClientBlocking {
    rt: tokio::runtime::Runtime,
    inner: StacClient,
}

impl StacClientBlocking {
    /// Create a new blocking STAC client.
    pub fn new(catalog: StacCatalog, options: StacClientOptions) -> Result<Self> {
        Ok(Self {
            rt: runtime()?,
            inner: StacClient::new(catalog, options)?,
        })
    }

    pub fn catalog(&self) -> &StacCatalog {
        self.inner.catalog()
    }

    /// Execute a single search request (blocking).
    pub fn search(&self, params: &StacSearchParams) -> Result<StacItemCollection> {
        self.rt.block_on(self.inner.search(params))
    }

    /// Search with automatic pagination (blocking).
    pub fn search_all(&self, params: &StacSearchParams) -> Result<Vec<StacItem>> {
        self.rt.block_on(self.inner.search_all(params))
    }

    /// Run a full [`ItemSearch`] (blocking).
    pub fn search_items(&self, search: &ItemSearch) -> Result<Vec<StacItem>> {
        self.rt.block_on(self.inner.search_items(search))
    }
}

/// Blocking whole-object HTTP GET.
pub struct HttpFetcher {
    rt: tokio::runtime::Runtime,
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            rt: runtime()?,
            client,
        })
    }

    /// Fetch the full body of `url`. Non-success statuses are errors.
    pub fn get(&self, url: &str) -> Result<Vec<u8>> {
        debug!("GET {url}");
        self.rt.block_on(async {
            let resp = self.client.get(url).send().await?;
            let status = resp.status();
            if !status.is_success() {
                return Err(CloudError::Asset {
                    href: url.to_string(),
                    reason: format!("HTTP {status}"),
                });
            }
            Ok(resp.bytes().await?.to_vec())
        })
    }
}
