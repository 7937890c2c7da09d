//! Async STAC client for searching spatio-temporal asset catalogs.
//!
//! Supports Planetary Computer and Earth Search out of the box, plus
//! arbitrary STAC API endpoints via [`StacEndpoint::Custom`].

use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{CloudError, Result};
use crate::stac_models::{StacItem, StacItemCollection, StacLink, StacSearchParams};

// ---------------------------------------------------------------------------
// Endpoint enum
// ---------------------------------------------------------------------------

/// Well-known STAC APIs plus custom endpoints.
#[derive(Debug, Clone, PartialEq)]
pub enum StacEndpoint {
    /// Microsoft Planetary Computer STAC API.
    PlanetaryComputer,
    /// AWS Earth Search (Element 84).
    EarthSearch,
    /// Any STAC API root URL
    Custom(String),
}

impl StacEndpoint {
    /// Return the full POST `/search` URL for this endpoint.
    pub fn search_url(&self) -> String {
        match self {
            Self::PlanetaryComputer => {
                "https://planetarycomputer.microsoft.com/api/stac/v1/search".to_string()
            }
            Self::EarthSearch => "https://earth-search.aws.element84.com/v1/search".to_string(),
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

    /// Parse a shorthand string into an endpoint.
    ///
    /// Recognized shorthands: `"pc"`, `"planetary-computer"`, `"es"`,
    /// `"earth-search"`. Anything else is treated as a custom URL.
    pub fn from_str_or_url(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "pc" | "planetary-computer" | "planetarycomputer" => Self::PlanetaryComputer,
            "es" | "earth-search" | "earthsearch" => Self::EarthSearch,
            _ => Self::Custom(s.to_string()),
        }
    }

    /// Whether asset hrefs need SAS token signing before download.
    pub fn needs_signing(&self) -> bool {
        matches!(self, Self::PlanetaryComputer)
    }
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Configuration for [`StacClient`].
#[derive(Debug, Clone)]
pub struct StacClientOptions {
    /// Per-request timeout (default 30 s).
    pub request_timeout: Duration,
    /// Maximum retries on transient failures (default 3).
    pub max_retries: u32,
    /// Maximum total items to fetch across pages (default 100).
    pub max_items: usize,
}

impl Default for StacClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            max_retries: 3,
            max_items: 100,
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Async client for STAC Item Search and asset download.
pub struct StacClient {
    endpoint: StacEndpoint,
    client: reqwest::Client,
    options: StacClientOptions,
}

impl StacClient {
    pub fn new(endpoint: StacEndpoint, options: StacClientOptions) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(options.request_timeout)
            .build()
            .map_err(|e| CloudError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            endpoint,
            client,
            options,
        })
    }

    pub fn endpoint(&self) -> &StacEndpoint {
        &self.endpoint
    }

    pub fn options(&self) -> &StacClientOptions {
        &self.options
    }

    // ── Single-page search ──────────────────────────────────────────

    /// Execute a single search request and return one page of results.
    pub async fn search(&self, params: &StacSearchParams) -> Result<StacItemCollection> {
        let url = self.endpoint.search_url();
        self.post_search(&url, params).await
    }

    // ── Paginated search ────────────────────────────────────────────

    /// Search with automatic pagination, collecting up to `max_items` items.
    pub async fn search_all(&self, params: &StacSearchParams) -> Result<Vec<StacItem>> {
        let mut all_items: Vec<StacItem> = Vec::new();
        let max = self.options.max_items;

        let mut page = self.search(params).await?;

        loop {
            let next = page.next_link().cloned();
            all_items.append(&mut page.features);

            if all_items.len() >= max {
                break;
            }

            match next {
                Some(link) => {
                    page = self.follow_next(&link, params).await?;
                    if page.is_empty() {
                        break;
                    }
                }
                None => break,
            }
        }

        all_items.truncate(max);
        debug!("STAC search returned {} item(s)", all_items.len());
        Ok(all_items)
    }

    // ── Asset access ────────────────────────────────────────────────

    /// Sign an asset href for Planetary Computer via the `/sign` endpoint.
    ///
    /// For other endpoints the href is returned unchanged.
    pub async fn sign_asset_href(&self, href: &str) -> Result<String> {
        if !self.endpoint.needs_signing() {
            return Ok(href.to_string());
        }
        self.sign_pc_href(href).await
    }

    /// Download a whole asset, retrying transient failures.
    pub async fn download(&self, href: &str) -> Result<Vec<u8>> {
        let signed = self.sign_asset_href(href).await?;
        let mut last_err = None;

        for attempt in 0..=self.options.max_retries {
            if attempt > 0 {
                backoff(attempt).await;
            }
            match self.client.get(&signed).send().await {
                Ok(r) if r.status().is_success() => {
                    let bytes = r.bytes().await?;
                    debug!("downloaded {} ({} bytes)", href, bytes.len());
                    return Ok(bytes.to_vec());
                }
                Ok(r) => {
                    let status = r.status();
                    last_err = Some(CloudError::Network(format!("HTTP {} fetching {}", status, href)));
                    if status.is_client_error() {
                        break;
                    }
                }
                Err(e) if e.is_timeout() || e.is_connect() => {
                    warn!("download attempt {} for {} failed: {}", attempt + 1, href, e);
                    last_err = Some(CloudError::Http(e));
                }
                Err(e) => return Err(CloudError::Http(e)),
            }
        }

        Err(last_err.unwrap_or_else(|| CloudError::Network(format!("download of {} failed", href))))
    }

    // ── Private helpers ─────────────────────────────────────────────

    async fn post_search(&self, url: &str, params: &StacSearchParams) -> Result<StacItemCollection> {
        let mut last_err = None;

        for attempt in 0..=self.options.max_retries {
            if attempt > 0 {
                backoff(attempt).await;
            }

            let resp = self.client.post(url).json(params).send().await;

            match resp {
                Ok(r) if r.status().is_success() => {
                    let body = r
                        .text()
                        .await
                        .map_err(|e| CloudError::Network(format!("reading response body: {e}")))?;
                    return serde_json::from_str(&body)
                        .map_err(|e| CloudError::InvalidResponse(format!("parsing STAC response: {e}")));
                }
                Ok(r) => {
                    let status = r.status();
                    let body = r.text().await.unwrap_or_default();
                    last_err = Some(CloudError::Network(format!(
                        "STAC search returned HTTP {}: {}",
                        status,
                        body.chars().take(500).collect::<String>()
                    )));
                    // client errors will not improve on retry
                    if status.is_client_error() {
                        break;
                    }
                }
                Err(e) => {
                    last_err = Some(CloudError::Network(format!("STAC search request failed: {e}")));
                }
            }
        }

        Err(last_err.unwrap_or_else(|| CloudError::Network("STAC search failed".into())))
    }

    /// Follow a pagination link, POST (body/merge) or GET.
    async fn follow_next(&self, link: &StacLink, original: &StacSearchParams) -> Result<StacItemCollection> {
        let method = link.method.as_deref().unwrap_or("GET").to_uppercase();

        if method == "POST" {
            let next = next_page_params(link, original)?;
            self.post_search(&link.href, &next).await
        } else {
            let resp = self
                .client
                .get(&link.href)
                .send()
                .await
                .map_err(|e| CloudError::Network(format!("GET pagination: {e}")))?;

            if !resp.status().is_success() {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                return Err(CloudError::Network(format!(
                    "STAC pagination returned HTTP {}: {}",
                    status,
                    body.chars().take(500).collect::<String>()
                )));
            }

            let body = resp
                .text()
                .await
                .map_err(|e| CloudError::Network(format!("reading pagination body: {e}")))?;
            serde_json::from_str(&body)
                .map_err(|e| CloudError::InvalidResponse(format!("parsing pagination response: {e}")))
        }
    }

    async fn sign_pc_href(&self, href: &str) -> Result<String> {
        let resp = self
            .client
            .get("https://planetarycomputer.microsoft.com/api/sas/v1/sign")
            .query(&[("href", href)])
            .send()
            .await
            .map_err(|e| CloudError::Auth(format!("sign request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(CloudError::Auth(format!(
                "sign returned HTTP {}: {}",
                status,
                body.chars().take(300).collect::<String>()
            )));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| CloudError::Auth(format!("parsing sign response: {e}")))?;

        body["href"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| CloudError::Auth("sign response missing 'href' field".into()))
    }
}

/// Exponential backoff: 500ms, 1s, 2s, ...
async fn backoff(attempt: u32) {
    let delay = Duration::from_millis(500 * (1 << (attempt - 1).min(6)));
    tokio::time::sleep(delay).await;
}

/// Request body for a POST `next` link.
///
/// With `merge: true` the link body overlays the original parameters;
/// otherwise the link body replaces them.
fn next_page_params(link: &StacLink, original: &StacSearchParams) -> Result<StacSearchParams> {
    let body = match (&link.body, link.merge.unwrap_or(false)) {
        (Some(link_body), true) => {
            let mut base = serde_json::to_value(original)
                .map_err(|e| CloudError::InvalidResponse(format!("serializing params: {e}")))?;
            if let (Some(base_obj), Some(link_obj)) = (base.as_object_mut(), link_body.as_object()) {
                for (k, v) in link_obj {
                    base_obj.insert(k.clone(), v.clone());
                }
            }
            base
        }
        (Some(link_body), false) => link_body.clone(),
        (None, _) => return Ok(original.clone()),
    };
    serde_json::from_value(body)
        .map_err(|e| CloudError::InvalidResponse(format!("parsing next-page body: {e}")))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
