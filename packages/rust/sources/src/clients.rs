//! HTTP-backed implementations of the boundary capabilities.
//!
//! Each client owns a `reqwest::Client` with the service's timeout budget.
//! Wire formats are JSON; binary payloads travel base64-encoded.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, instrument, warn};
use url::Url;

use copyforge_shared::{
    CapabilityError, ConfidenceTier, CopyforgeError, DocumentAnalysis, DocumentBlock, FetchConfig,
    ListingRecord, OcrEngine, OcrOutput, PageFetcher, Result, SearchIndex, ServiceEndpoint,
};

/// User-Agent for service calls (page fetches use the configured browser UA).
const SERVICE_USER_AGENT: &str = concat!("Copyforge/", env!("CARGO_PKG_VERSION"));

fn build_client(timeout: Duration, user_agent: &str) -> Result<Client> {
    Client::builder()
        .user_agent(user_agent)
        .redirect(reqwest::redirect::Policy::limited(5))
        .timeout(timeout)
        .build()
        .map_err(|e| CopyforgeError::Network(format!("failed to build HTTP client: {e}")))
}

/// Map a transport failure onto the capability taxonomy.
fn transport_error(e: reqwest::Error, timeout: Duration) -> CapabilityError {
    if e.is_timeout() {
        CapabilityError::Timeout {
            secs: timeout.as_secs(),
        }
    } else if e.is_connect() {
        CapabilityError::Unreachable(e.to_string())
    } else {
        CapabilityError::Unavailable(e.to_string())
    }
}

/// Map a non-success service status onto the capability taxonomy.
fn status_error(status: StatusCode, body: &str) -> CapabilityError {
    let detail = format!("HTTP {status}: {}", body.chars().take(200).collect::<String>());
    match status.as_u16() {
        415 => CapabilityError::Unsupported(detail),
        422 => CapabilityError::Unreadable(detail),
        _ => CapabilityError::Unavailable(detail),
    }
}

async fn send_json<T: for<'de> Deserialize<'de>>(
    request: RequestBuilder,
    timeout: Duration,
) -> std::result::Result<T, CapabilityError> {
    let response = request
        .send()
        .await
        .map_err(|e| transport_error(e, timeout))?;
    read_json(response, timeout).await
}

async fn read_json<T: for<'de> Deserialize<'de>>(
    response: Response,
    timeout: Duration,
) -> std::result::Result<T, CapabilityError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(status_error(status, &body));
    }
    response
        .json::<T>()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                CapabilityError::Timeout {
                    secs: timeout.as_secs(),
                }
            } else {
                CapabilityError::Malformed(e.to_string())
            }
        })
}

fn with_key(request: RequestBuilder, key: Option<&str>) -> RequestBuilder {
    match key {
        Some(k) => request.bearer_auth(k),
        None => request,
    }
}

fn endpoint_url(service: &str, config: &ServiceEndpoint) -> Result<Option<Url>> {
    config
        .endpoint
        .as_deref()
        .map(|e| {
            Url::parse(e)
                .map_err(|err| CopyforgeError::config(format!("invalid {service} endpoint '{e}': {err}")))
        })
        .transpose()
}

// ---------------------------------------------------------------------------
// Document analysis
// ---------------------------------------------------------------------------

/// Document analysis over HTTP: `POST {content, mimeType}` → `{blocks}`.
pub struct HttpDocumentAnalysis {
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
    timeout: Duration,
}

#[derive(Deserialize)]
struct BlocksResponse {
    #[serde(default)]
    blocks: Vec<DocumentBlock>,
}

impl HttpDocumentAnalysis {
    /// `None` when no endpoint is configured.
    pub fn from_config(config: &ServiceEndpoint) -> Result<Option<Self>> {
        let Some(endpoint) = endpoint_url("document analysis", config)? else {
            return Ok(None);
        };
        Ok(Some(Self {
            client: build_client(config.timeout(), SERVICE_USER_AGENT)?,
            endpoint,
            api_key: config.api_key(),
            timeout: config.timeout(),
        }))
    }
}

#[async_trait]
impl DocumentAnalysis for HttpDocumentAnalysis {
    #[instrument(skip_all, fields(mime_type = %mime_type, bytes = bytes.len()))]
    async fn analyze(
        &self,
        bytes: &[u8],
        mime_type: &str,
    ) -> std::result::Result<Vec<DocumentBlock>, CapabilityError> {
        let body = serde_json::json!({
            "content": BASE64.encode(bytes),
            "mimeType": mime_type,
        });
        let request = with_key(self.client.post(self.endpoint.clone()), self.api_key.as_deref())
            .json(&body);
        let response: BlocksResponse = send_json(request, self.timeout).await?;
        debug!(blocks = response.blocks.len(), "document analysed");
        Ok(response.blocks)
    }
}

// ---------------------------------------------------------------------------
// OCR
// ---------------------------------------------------------------------------

/// OCR over HTTP: `POST {image}` → `{text, confidence}`.
pub struct HttpOcr {
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
    timeout: Duration,
}

#[derive(Deserialize)]
struct OcrResponse {
    #[serde(default)]
    text: String,
    #[serde(default = "default_tier")]
    confidence: ConfidenceTier,
}

fn default_tier() -> ConfidenceTier {
    ConfidenceTier::Medium
}

impl HttpOcr {
    pub fn from_config(config: &ServiceEndpoint) -> Result<Option<Self>> {
        let Some(endpoint) = endpoint_url("ocr", config)? else {
            return Ok(None);
        };
        Ok(Some(Self {
            client: build_client(config.timeout(), SERVICE_USER_AGENT)?,
            endpoint,
            api_key: config.api_key(),
            timeout: config.timeout(),
        }))
    }
}

#[async_trait]
impl OcrEngine for HttpOcr {
    #[instrument(skip_all, fields(bytes = image.len()))]
    async fn recognize(&self, image: &[u8]) -> std::result::Result<OcrOutput, CapabilityError> {
        let body = serde_json::json!({ "image": BASE64.encode(image) });
        let request = with_key(self.client.post(self.endpoint.clone()), self.api_key.as_deref())
            .json(&body);
        let response: OcrResponse = send_json(request, self.timeout).await?;
        Ok(OcrOutput {
            text: response.text,
            tier: response.confidence,
        })
    }
}

// ---------------------------------------------------------------------------
// Search index
// ---------------------------------------------------------------------------

/// Search index over HTTP: `GET ?q=&limit=` → `{results}`. 404 means no match.
pub struct HttpSearchIndex {
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
    timeout: Duration,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<ListingRecord>,
}

impl HttpSearchIndex {
    pub fn from_config(config: &ServiceEndpoint) -> Result<Option<Self>> {
        let Some(endpoint) = endpoint_url("search", config)? else {
            return Ok(None);
        };
        Ok(Some(Self {
            client: build_client(config.timeout(), SERVICE_USER_AGENT)?,
            endpoint,
            api_key: config.api_key(),
            timeout: config.timeout(),
        }))
    }
}

#[async_trait]
impl SearchIndex for HttpSearchIndex {
    #[instrument(skip(self))]
    async fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> std::result::Result<Vec<ListingRecord>, CapabilityError> {
        let limit_param = limit.to_string();
        let request = with_key(self.client.get(self.endpoint.clone()), self.api_key.as_deref())
            .query(&[("q", query), ("limit", limit_param.as_str())]);
        let response = request
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let mut parsed: SearchResponse = read_json(response, self.timeout).await?;
        parsed.results.truncate(limit);
        Ok(parsed.results)
    }
}

// ---------------------------------------------------------------------------
// Web fetch
// ---------------------------------------------------------------------------

/// Plain HTTP page fetcher with SSRF protection.
pub struct HttpPageFetcher {
    client: Client,
    timeout: Duration,
    /// Allow localhost/private IPs (for tests against mock servers).
    allow_private_hosts: bool,
}

impl HttpPageFetcher {
    pub fn from_config(config: &FetchConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        Ok(Self {
            client: build_client(timeout, &config.user_agent)?,
            timeout,
            allow_private_hosts: false,
        })
    }

    /// Allow fetching localhost/private IPs.
    pub fn allow_private_hosts(mut self) -> Self {
        self.allow_private_hosts = true;
        self
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    #[instrument(skip_all, fields(url = %url))]
    async fn fetch(&self, url: &Url) -> std::result::Result<String, CapabilityError> {
        if !self.allow_private_hosts && is_ssrf_target(url) {
            warn!(%url, "SSRF protection: blocked");
            return Err(CapabilityError::Unreachable(format!(
                "{url}: refusing to fetch a private or non-HTTP address"
            )));
        }

        let response = self
            .client
            .get(url.as_str())
            .header(reqwest::header::ACCEPT, "text/html,application/xhtml+xml")
            .send()
            .await
            .map_err(|e| match transport_error(e, self.timeout) {
                CapabilityError::Unavailable(m) => CapabilityError::Unreachable(m),
                other => other,
            })?;

        let status = response.status();
        if status == StatusCode::FORBIDDEN {
            return Err(CapabilityError::Unreachable(format!(
                "{url}: HTTP 403, the site blocks automated access"
            )));
        }
        if !status.is_success() {
            return Err(CapabilityError::Unreachable(format!("{url}: HTTP {status}")));
        }

        response
            .text()
            .await
            .map_err(|e| CapabilityError::Unreachable(format!("{url}: body read failed: {e}")))
    }
}

// ---------------------------------------------------------------------------
// SSRF protection
// ---------------------------------------------------------------------------

/// Check if a URL targets a potentially dangerous resource.
pub(crate) fn is_ssrf_target(url: &Url) -> bool {
    match url.scheme() {
        "http" | "https" => {}
        _ => return true,
    }

    match url.host() {
        Some(url::Host::Ipv4(v4)) => is_private_ip(&IpAddr::V4(v4)),
        Some(url::Host::Ipv6(v6)) => is_private_ip(&IpAddr::V6(v6)),
        Some(url::Host::Domain(host)) => {
            host == "localhost" || host.ends_with(".local") || host.ends_with(".internal")
        }
        None => true,
    }
}

/// Check if an IP is in a private/reserved range.
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // 100.64.0.0/10 (Carrier-grade NAT)
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64)
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn endpoint(server: &MockServer, p: &str) -> ServiceEndpoint {
        ServiceEndpoint {
            endpoint: Some(format!("{}{p}", server.uri())),
            api_key_env: None,
            timeout_secs: 5,
        }
    }

    #[test]
    fn ssrf_blocks_private_and_non_http() {
        assert!(is_ssrf_target(&Url::parse("file:///etc/passwd").unwrap()));
        assert!(is_ssrf_target(&Url::parse("http://192.168.1.1/admin").unwrap()));
        assert!(is_ssrf_target(&Url::parse("http://127.0.0.1:8080/").unwrap()));
        assert!(is_ssrf_target(&Url::parse("http://[::1]/").unwrap()));
        assert!(is_ssrf_target(&Url::parse("http://localhost:3000/").unwrap()));
        assert!(!is_ssrf_target(&Url::parse("https://shop.example.com/p/pan").unwrap()));
    }

    #[test]
    fn missing_endpoint_means_unavailable_capability() {
        let config = ServiceEndpoint {
            endpoint: None,
            api_key_env: None,
            timeout_secs: 5,
        };
        assert!(HttpOcr::from_config(&config).unwrap().is_none());
        assert!(HttpSearchIndex::from_config(&config).unwrap().is_none());
    }

    #[tokio::test]
    async fn fetcher_returns_markup() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/product/pan"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<h1>Pan</h1>"))
            .mount(&server)
            .await;

        let fetcher = HttpPageFetcher::from_config(&FetchConfig::default())
            .unwrap()
            .allow_private_hosts();
        let url = Url::parse(&format!("{}/product/pan", server.uri())).unwrap();
        assert_eq!(fetcher.fetch(&url).await.unwrap(), "<h1>Pan</h1>");
    }

    #[tokio::test]
    async fn fetcher_maps_status_to_unreachable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/blocked"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let fetcher = HttpPageFetcher::from_config(&FetchConfig::default())
            .unwrap()
            .allow_private_hosts();
        let url = Url::parse(&format!("{}/blocked", server.uri())).unwrap();
        let err = fetcher.fetch(&url).await.unwrap_err();
        assert!(matches!(err, CapabilityError::Unreachable(ref m) if m.contains("403")));

        let url = Url::parse(&format!("{}/missing", server.uri())).unwrap();
        assert!(matches!(
            fetcher.fetch(&url).await,
            Err(CapabilityError::Unreachable(_))
        ));
    }

    #[tokio::test]
    async fn fetcher_refuses_private_hosts_by_default() {
        let fetcher = HttpPageFetcher::from_config(&FetchConfig::default()).unwrap();
        let url = Url::parse("http://10.0.0.1/").unwrap();
        assert!(matches!(
            fetcher.fetch(&url).await,
            Err(CapabilityError::Unreachable(_))
        ));
    }

    #[tokio::test]
    async fn document_analysis_posts_base64_and_parses_blocks() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/analyze"))
            .and(body_partial_json(serde_json::json!({
                "mimeType": "application/pdf",
                "content": BASE64.encode(b"%PDF-1.7"),
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "blocks": [
                    {"type": "heading", "text": "Chef's Knife 20cm", "level": 2},
                    {"type": "list_item", "text": "Forged steel"}
                ]
            })))
            .mount(&server)
            .await;

        let client = HttpDocumentAnalysis::from_config(&endpoint(&server, "/analyze"))
            .unwrap()
            .unwrap();
        let blocks = client.analyze(b"%PDF-1.7", "application/pdf").await.unwrap();
        assert_eq!(blocks.len(), 2);
    }

    #[tokio::test]
    async fn document_analysis_maps_unreadable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(422).set_body_string("corrupt file"))
            .mount(&server)
            .await;

        let client = HttpDocumentAnalysis::from_config(&endpoint(&server, "/analyze"))
            .unwrap()
            .unwrap();
        let err = client.analyze(b"junk", "application/pdf").await.unwrap_err();
        assert!(matches!(err, CapabilityError::Unreadable(_)));
    }

    #[tokio::test]
    async fn ocr_parses_text_and_tier() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ocr"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "text": "DUALIT 4 SLICE TOASTER",
                "confidence": "high"
            })))
            .mount(&server)
            .await;

        let client = HttpOcr::from_config(&endpoint(&server, "/ocr")).unwrap().unwrap();
        let out = client.recognize(&[0xFF, 0xD8, 0xFF]).await.unwrap();
        assert_eq!(out.text, "DUALIT 4 SLICE TOASTER");
        assert_eq!(out.tier, ConfidenceTier::High);
    }

    #[tokio::test]
    async fn ocr_server_error_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = HttpOcr::from_config(&endpoint(&server, "/ocr")).unwrap().unwrap();
        assert!(matches!(
            client.recognize(b"img").await,
            Err(CapabilityError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn search_sends_query_and_limits_results() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "5012345678900"))
            .and(query_param("limit", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [
                    {"title": "Toaster", "link": "https://example.com/a"},
                    {"title": "Toaster 2", "link": "https://example.com/b"}
                ]
            })))
            .mount(&server)
            .await;

        let client = HttpSearchIndex::from_config(&endpoint(&server, "/search"))
            .unwrap()
            .unwrap();
        let results = client.search("5012345678900", 1).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "Toaster");
    }

    #[tokio::test]
    async fn search_not_found_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = HttpSearchIndex::from_config(&endpoint(&server, "/search"))
            .unwrap()
            .unwrap();
        assert!(client.search("nothing", 5).await.unwrap().is_empty());
    }
}
