//! Async STAC client for searching spatio-temporal asset catalogs.
//!
//! Supports Earth Search and the USGS LandsatLook server out of the box, plus
//! arbitrary STAC API endpoints via [`StacCatalog::Custom`]. [`ItemSearch`]
//! describes one logical search that may fan out into several requests
//! (one per bbox when an area straddles the antimeridian).

use std::collections::HashSet;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, warn};
use wofs_core::BBox;

use crate::error::{CloudError, Result};
use crate::stac_models::{StacItem, StacItemCollection, StacLink, StacSearchParams};

// ---------------------------------------------------------------------------
// Catalog enum
// ---------------------------------------------------------------------------

/// Well-known STAC catalogs plus custom endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StacCatalog {
    /// AWS Earth Search (Element 84).
    EarthSearch,
    /// USGS LandsatLook STAC server.
    LandsatLook,
    /// Any STAC API endpoint (provide the root URL, e.g.
    /// `"https://stac.example.com"`).
    Custom(String),
}

impl StacCatalog {
    /// Return the full POST `/search` URL for this catalog.
    pub fn search_url(&self) -> String {
        match self {
            Self::EarthSearch => "https://earth-search.aws.element84.com/v1/search".to_string(),
            Self::LandsatLook => "https://landsatlook.usgs.gov/stac-server/search".to_string(),
            Self::Custom(base) => {
                let base = base.trim_end_matches('/');
                if base.ends_with("/search") {
                    base.to_string()
                } else {
                    format!("{}/search", base)
                }
            }
        }
    }

    /// Parse a shorthand string into a catalog.
    ///
    /// Recognized shorthands: `"es"`, `"earth-search"`, `"landsatlook"`,
    /// `"usgs"`. Anything else is treated as a custom URL.
    pub fn from_str_or_url(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "es" | "earth-search" | "earthsearch" => Self::EarthSearch,
            "landsatlook" | "usgs" => Self::LandsatLook,
            _ => Self::Custom(s.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Configuration for [`StacClient`].
#[derive(Debug, Clone)]
pub struct StacClientOptions {
    /// Per-request timeout (default 60 s).
    pub request_timeout: Duration,
    /// Transport retries on transient failures (default 3).
    pub max_retries: u32,
    /// Cap on items collected across pages; `None` collects everything.
    pub max_items: Option<usize>,
    /// Items per page requested from the server.
    pub page_size: u32,
}

impl Default for StacClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(60),
            max_retries: 3,
            max_items: None,
            page_size: 100,
        }
    }
}

// ---------------------------------------------------------------------------
// Item search
// ---------------------------------------------------------------------------

/// One logical item search.
#[derive(Debug, Clone, Default)]
pub struct ItemSearch {
    pub collections: Vec<String>,
    /// STAC datetime, e.g. `"2023"` or `"2020/2023"`
    pub datetime: Option<String>,
    /// WGS84 boxes; each becomes its own request. Empty means no spatial filter.
    pub bboxes: Vec<BBox>,
    pub query: Option<Value>,
    /// Platforms to drop from the results, e.g. `landsat-7`
    pub exclude_platforms: Vec<String>,
}

impl ItemSearch {
    pub fn new<S: AsRef<str>>(collections: &[S]) -> Self {
        Self {
            collections: collections.iter().map(|c| c.as_ref().to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn datetime(mut self, datetime: impl Into<String>) -> Self {
        self.datetime = Some(datetime.into());
        self
    }

    pub fn bboxes(mut self, bboxes: Vec<BBox>) -> Self {
        self.bboxes = bboxes;
        self
    }

    pub fn exclude_platforms<S: AsRef<str>>(mut self, platforms: &[S]) -> Self {
        self.exclude_platforms = platforms.iter().map(|p| p.as_ref().to_string()).collect();
        self
    }

    /// Restrict to one Landsat WRS-2 path/row (zero padded to three digits).
    pub fn landsat_path_row(mut self, path: u32, row: u32) -> Self {
        self.query = Some(json!({
            "landsat:wrs_path": {"eq": format!("{path:03}")},
            "landsat:wrs_row": {"eq": format!("{row:03}")},
        }));
        self
    }

    /// Request bodies, one per bbox.
    pub fn requests(&self, page_size: u32) -> Vec<StacSearchParams> {
        let mut base = StacSearchParams::new().limit(page_size);
        if !self.collections.is_empty() {
            base = base.collections(self.collections.as_slice());
        }
        if let Some(dt) = &self.datetime {
            base = base.datetime(dt);
        }
        if let Some(q) = &self.query {
            base = base.query(q.clone());
        }
        if self.bboxes.is_empty() {
            return vec![base];
        }
        self.bboxes
            .iter()
            .map(|b| base.clone().bbox(b.min_x, b.min_y, b.max_x, b.max_y))
            .collect()
    }

    fn excluded(&self, item: &StacItem) -> bool {
        let Some(platform) = item.properties.platform.as_deref() else {
            return false;
        };
        let platform = normalize_platform(platform);
        self.exclude_platforms
            .iter()
            .any(|p| normalize_platform(p) == platform)
    }

    /// Drop excluded platforms and items already seen, keeping order.
    pub fn filter(&self, items: Vec<StacItem>) -> Vec<StacItem> {
        let mut seen = HashSet::new();
        items
            .into_iter()
            .filter(|item| !self.excluded(item))
            .filter(|item| seen.insert(item.id.clone()))
            .collect()
    }

    fn describe(&self) -> String {
        format!(
            "collections {:?}, datetime {}, {} bbox(es)",
            self.collections,
            self.datetime.as_deref().unwrap_or("any"),
            self.bboxes.len()
        )
    }
}

/// `LANDSAT_7`, `Landsat-7` and `landsat-7` all compare equal.
fn normalize_platform(p: &str) -> String {
    p.to_lowercase().replace('_', "-")
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// One page request: the initial POST, or wherever a `next` link points
#[derive(Debug, Clone, PartialEq)]
enum PageRequest {
    Post { url: String, body: Value },
    Get { url: String },
}

impl PageRequest {
    fn url(&self) -> &str {
        match self {
            Self::Post { url, .. } | Self::Get { url } => url,
        }
    }

    fn follow(&self, link: &StacLink) -> PageRequest {
        let is_post = link
            .method
            .as_deref()
            .is_some_and(|m| m.eq_ignore_ascii_case("POST"));
        if !is_post {
            return Self::Get {
                url: link.href.clone(),
            };
        }
        let previous = match self {
            Self::Post { body, .. } => body.clone(),
            Self::Get { .. } => json!({}),
        };
        Self::Post {
            url: link.href.clone(),
            body: next_body(link, &previous),
        }
    }
}

/// Async client for STAC Item Search
pub struct StacClient {
    catalog: StacCatalog,
    client: reqwest::Client,
    options: StacClientOptions,
}

impl StacClient {
    pub fn new(catalog: StacCatalog, options: StacClientOptions) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(options.request_timeout)
            .build()?;
        Ok(Self {
            catalog,
            client,
            options,
        })
    }

    pub fn catalog(&self) -> &StacCatalog {
        &self.catalog
    }

    fn first_page(&self, params: &StacSearchParams) -> Result<PageRequest> {
        Ok(PageRequest::Post {
            url: self.catalog.search_url(),
            body: serde_json::to_value(params).map_err(|e| CloudError::Parse(e.to_string()))?,
        })
    }

    /// One page of results for `params`.
    pub async fn search(&self, params: &StacSearchParams) -> Result<StacItemCollection> {
        self.fetch_page(&self.first_page(params)?).await
    }

    /// Every page for `params`, up to `max_items` items.
    pub async fn search_all(&self, params: &StacSearchParams) -> Result<Vec<StacItem>> {
        let cap = self.options.max_items.unwrap_or(usize::MAX);
        let mut request = self.first_page(params)?;
        let mut items = Vec::new();
        loop {
            let page = self.fetch_page(&request).await?;
            let next = page.next_link().map(|link| request.follow(link));
            let fetched = page.features.len();
            items.extend(page.features);
            match next {
                Some(next) if fetched > 0 && items.len() < cap => {
                    debug!("STAC: {} items so far, fetching {}", items.len(), next.url());
                    request = next;
                }
                _ => break,
            }
        }
        items.truncate(cap);
        Ok(items)
    }

    /// Run every request of `search`, merge and filter the results.
    ///
    /// Zero matching items is reported as [`CloudError::EmptyCollection`].
    pub async fn search_items(&self, search: &ItemSearch) -> Result<Vec<StacItem>> {
        let mut items = Vec::new();
        for params in search.requests(self.options.page_size) {
            items.extend(self.search_all(&params).await?);
        }
        let found = items.len();
        let items = search.filter(items);
        debug!("STAC: {} items ({} before filtering) for {}", items.len(), found, search.describe());
        if items.is_empty() {
            return Err(CloudError::EmptyCollection(search.describe()));
        }
        Ok(items)
    }

    /// Fetch with exponential backoff (500 ms, 1 s, 2 s, ...) on retryable
    /// failures.
    async fn fetch_page(&self, request: &PageRequest) -> Result<StacItemCollection> {
        let mut attempt = 0;
        loop {
            match self.try_fetch(request).await {
                Ok(page) => return Ok(page),
                Err(e) if attempt < self.options.max_retries && retryable(&e) => {
                    attempt += 1;
                    let delay = Duration::from_millis(500 << (attempt - 1));
                    warn!("STAC request to {} failed: {e}; retry {attempt} in {delay:?}", request.url());
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn try_fetch(&self, request: &PageRequest) -> Result<StacItemCollection> {
        let builder = match request {
            PageRequest::Post { url, body } => self.client.post(url).json(body),
            PageRequest::Get { url } => self.client.get(url),
        };
        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(CloudError::Catalog {
                status: status.as_u16(),
                body: text.chars().take(500).collect(),
            });
        }
        serde_json::from_str(&text).map_err(|e| CloudError::Parse(format!("search response: {e}")))
    }
}

/// Transport failures, throttling and server errors; any other 4xx means
/// the request itself is wrong.
fn retryable(error: &CloudError) -> bool {
    match error {
        CloudError::Http(_) | CloudError::Network(_) => true,
        CloudError::Catalog { status, .. } => *status == 429 || *status >= 500,
        _ => false,
    }
}

/// Body for a POST `next` link: the link body, merged over the previous
/// request when the link asks for it.
fn next_body(link: &StacLink, previous: &Value) -> Value {
    let Some(body) = &link.body else {
        return previous.clone();
    };
    if !link.merge.unwrap_or(false) {
        return body.clone();
    }
    let mut merged = previous.clone();
    if let (Value::Object(into), Value::Object(from)) = (&mut merged, body) {
        into.extend(from.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    merged
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, platform: &str) -> StacItem {
        serde_json::from_value(json!({
            "type": "Feature",
            "id": id,
            "properties": {"datetime": "2023-01-01T00:00:00Z", "platform": platform},
            "assets": {}
        }))
        .unwrap()
    }

    #[test]
    fn catalog_search_urls() {
        assert_eq!(
            StacCatalog::EarthSearch.search_url(),
            "https://earth-search.aws.element84.com/v1/search"
        );
        assert_eq!(
            StacCatalog::LandsatLook.search_url(),
            "https://landsatlook.usgs.gov/stac-server/search"
        );
        assert_eq!(
            StacCatalog::Custom("https://stac.example.com".into()).search_url(),
            "https://stac.example.com/search"
        );
        assert_eq!(
            StacCatalog::Custom("https://stac.example.com/search/".into()).search_url(),
            "https://stac.example.com/search"
        );
    }

    #[test]
    fn catalog_from_str_or_url() {
        assert_eq!(StacCatalog::from_str_or_url("es"), StacCatalog::EarthSearch);
        assert_eq!(StacCatalog::from_str_or_url("USGS"), StacCatalog::LandsatLook);
        assert!(matches!(
            StacCatalog::from_str_or_url("https://My-Stac.com"),
            StacCatalog::Custom(ref u) if u == "https://My-Stac.com"
        ));
    }

    #[test]
    fn one_request_per_bbox() {
        let search = ItemSearch::new(&["landsat-c2l2-sr"])
            .datetime("2023")
            .bboxes(vec![
                BBox::new(179.0, -18.0, 180.0, -17.0),
                BBox::new(-180.0, -18.0, -179.0, -17.0),
            ]);
        let reqs = search.requests(50);
        assert_eq!(reqs.len(), 2);
        assert_eq!(reqs[1].bbox, Some([-180.0, -18.0, -179.0, -17.0]));
        assert_eq!(reqs[0].limit, Some(50));
        assert_eq!(reqs[0].datetime.as_deref(), Some("2023"));
        assert_eq!(ItemSearch::new(&["x"]).requests(10).len(), 1);
    }

    #[test]
    fn path_row_query_is_padded() {
        let search = ItemSearch::new(&["landsat-c2l2-sr"]).landsat_path_row(73, 7);
        let q = search.query.unwrap();
        assert_eq!(q["landsat:wrs_path"]["eq"], "073");
        assert_eq!(q["landsat:wrs_row"]["eq"], "007");
    }

    #[test]
    fn filter_drops_platforms_and_duplicates() {
        let search = ItemSearch::new(&["x"]).exclude_platforms(&["landsat-7"]);
        let items = vec![
            item("a", "LANDSAT_8"),
            item("b", "LANDSAT_7"),
            item("a", "LANDSAT_8"),
            item("c", "landsat-9"),
        ];
        let kept: Vec<_> = search.filter(items).into_iter().map(|i| i.id).collect();
        assert_eq!(kept, ["a", "c"]);
    }

    #[test]
    fn merged_next_body() {
        let link: StacLink = serde_json::from_value(json!({
            "rel": "next", "href": "https://x/search", "method": "POST",
            "body": {"next": "tok"}, "merge": true
        }))
        .unwrap();
        let previous = json!({"collections": ["c"], "limit": 10});
        let body = next_body(&link, &previous);
        assert_eq!(body["next"], "tok");
        assert_eq!(body["limit"], 10);

        let replace = StacLink { merge: Some(false), ..link };
        assert_eq!(next_body(&replace, &previous), json!({"next": "tok"}));
    }

    #[test]
    fn follow_get_and_post_links() {
        let first = PageRequest::Post {
            url: "https://x/search".into(),
            body: json!({"limit": 10}),
        };
        let get: StacLink =
            serde_json::from_value(json!({"rel": "next", "href": "https://x/search?page=2"})).unwrap();
        assert_eq!(
            first.follow(&get),
            PageRequest::Get {
                url: "https://x/search?page=2".into()
            }
        );

        let post: StacLink = serde_json::from_value(json!({
            "rel": "next", "href": "https://x/search", "method": "post",
            "body": {"token": "t2"}, "merge": true
        }))
        .unwrap();
        let next = first.follow(&post);
        assert_eq!(
            next,
            PageRequest::Post {
                url: "https://x/search".into(),
                body: json!({"limit": 10, "token": "t2"}),
            }
        );
    }

    #[test]
    fn only_transient_failures_are_retried() {
        assert!(retryable(&CloudError::Network("reset".into())));
        assert!(retryable(&CloudError::Catalog { status: 503, body: String::new() }));
        assert!(retryable(&CloudError::Catalog { status: 429, body: String::new() }));
        assert!(!retryable(&CloudError::Catalog { status: 400, body: String::new() }));
        assert!(!retryable(&CloudError::Parse("bad json".into())));
    }

    #[tokio::test]
    #[ignore]
    async fn search_landsatlook() {
        let client = StacClient::new(StacCatalog::LandsatLook, StacClientOptions::default()).unwrap();
        let search = ItemSearch::new(&["landsat-c2l2-sr"])
            .datetime("2023-01")
            .landsat_path_row(73, 72);
        let items = client.search_items(&search).await.unwrap();
        assert!(!items.is_empty());
    }
}
