use async_trait::async_trait;
use reqwest::{Client, Url};
use std::fmt;
use std::time::Duration;
use tracing::{info, instrument};

use crate::error::ApiError;
use crate::http::{build_client, endpoint, log_request, read_json};
use crate::model::{BookDetail, SearchPage, Volume, VolumesResponse, PAGE_SIZE};

const CATALOG_API_BASE: &str = "https://www.googleapis.com/books/v1/";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// The external book search collaborator.
#[async_trait]
pub trait BookCatalog: Send + Sync {
    /// Fetch page `page_index` (each page holds up to `PAGE_SIZE` items
    /// starting at `page_index * PAGE_SIZE`).
    async fn search(&self, terms: &str, page_index: u32) -> Result<SearchPage, ApiError>;

    async fn volume(&self, id: &str) -> Result<BookDetail, ApiError>;
}

#[derive(Clone)]
pub struct CatalogClient {
    http: Client,
    base_url: Url,
}

impl fmt::Debug for CatalogClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl CatalogClient {
    pub fn new() -> Result<Self, ApiError> {
        let base_url = Url::parse(CATALOG_API_BASE).expect("valid default catalog URL");
        Self::with_base_url(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_base_url(base_url: Url, timeout: Duration) -> Result<Self, ApiError> {
        Ok(Self {
            http: build_client(timeout)?,
            base_url,
        })
    }

    pub fn search_request(&self, terms: &str, page_index: u32) -> Result<reqwest::Request, ApiError> {
        let mut url = endpoint(&self.base_url, &["volumes"])?;
        let start_index = u64::from(page_index) * u64::from(PAGE_SIZE);
        url.query_pairs_mut()
            .append_pair("q", terms)
            .append_pair("startIndex", &start_index.to_string())
            .append_pair("maxResults", &PAGE_SIZE.to_string());
        Ok(self.http.get(url).build()?)
    }

    pub fn volume_request(&self, id: &str) -> Result<reqwest::Request, ApiError> {
        let url = endpoint(&self.base_url, &["volumes", id])?;
        Ok(self.http.get(url).build()?)
    }
}

#[async_trait]
impl BookCatalog for CatalogClient {
    #[instrument(skip(self))]
    async fn search(&self, terms: &str, page_index: u32) -> Result<SearchPage, ApiError> {
        let request = self.search_request(terms, page_index)?;
        log_request(&request);
        let res = self.http.execute(request).await?;
        let payload: VolumesResponse = read_json(res).await?;
        let page = SearchPage::from(payload);
        info!(
            items = page.items.len(),
            total = page.total_available,
            "catalog page fetched"
        );
        Ok(page)
    }

    #[instrument(skip(self))]
    async fn volume(&self, id: &str) -> Result<BookDetail, ApiError> {
        let request = self.volume_request(id)?;
        log_request(&request);
        let res = self.http.execute(request).await?;
        let volume: Volume = read_json(res).await?;
        Ok(BookDetail::from(volume))
    }
}
