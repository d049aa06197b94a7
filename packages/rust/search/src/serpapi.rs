//! SerpAPI search transport.
//!
//! Every call issues one HTTP request, then pauses for the configured delay
//! before handing control back, so a sequential caller never exceeds the
//! provider's rate limit.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, instrument, warn};
use url::Url;

use orgscan_shared::{OrgScanError, Result, SearchItem};

use crate::{SearchProvider, SearchRequest};

/// User-Agent string for search requests.
const USER_AGENT: &str = concat!("orgscan/", env!("CARGO_PKG_VERSION"));

/// Message SerpAPI returns (with HTTP 200) when the engine found nothing.
const NO_RESULTS_MARKER: &str = "hasn't returned any results";

/// Message fragment SerpAPI uses for a bad key.
const INVALID_KEY_MARKER: &str = "invalid api key";

/// Connection settings for [`SerpApiClient`].
#[derive(Debug, Clone)]
pub struct SerpApiOptions {
    /// Search endpoint, e.g. `https://serpapi.com/search`.
    pub endpoint: String,
    /// `engine` parameter.
    pub engine: String,
    /// API key; an empty key fails every call with an auth error.
    pub api_key: String,
    /// Pause after every call.
    pub delay: Duration,
    /// Hard limit on a single call.
    pub timeout: Duration,
}

/// SerpAPI response envelope (only the fields we read).
#[derive(Debug, Deserialize)]
struct SerpResponse {
    #[serde(default)]
    organic_results: Vec<SearchItem>,
    #[serde(default)]
    error: Option<String>,
}

/// Paced SerpAPI client.
pub struct SerpApiClient {
    client: Client,
    endpoint: Url,
    engine: String,
    api_key: String,
    delay: Duration,
    timeout: Duration,
}

impl SerpApiClient {
    /// Create a new client. Fails only on a malformed endpoint or HTTP client setup.
    pub fn new(options: SerpApiOptions) -> Result<Self> {
        let endpoint = Url::parse(&options.endpoint).map_err(|e| {
            OrgScanError::config(format!("invalid search endpoint '{}': {e}", options.endpoint))
        })?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(options.timeout)
            .build()
            .map_err(|e| OrgScanError::Provider(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            engine: options.engine,
            api_key: options.api_key,
            delay: options.delay,
            timeout: options.timeout,
        })
    }

    async fn request(&self, request: &SearchRequest<'_>) -> Result<Vec<SearchItem>> {
        let num = request.num.to_string();
        let mut params: Vec<(&str, &str)> = vec![
            ("engine", self.engine.as_str()),
            ("q", request.query),
            ("num", num.as_str()),
            ("api_key", self.api_key.as_str()),
        ];
        if let Some(locale) = request.locale {
            params.push(("hl", locale));
        }
        if let Some(window) = request.time_window {
            params.push(("tbs", window));
        }

        let response = self
            .client
            .get(self.endpoint.clone())
            .query(&params)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    OrgScanError::Provider(format!(
                        "request timed out after {:.0}s",
                        self.timeout.as_secs_f64()
                    ))
                } else {
                    // Strip the URL: it carries the API key.
                    OrgScanError::Provider(format!("request failed: {}", e.without_url()))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| OrgScanError::Provider(format!("body read failed: {}", e.without_url())))?;

        interpret_response(status, &body, request.num as usize)
    }
}

#[async_trait]
impl SearchProvider for SerpApiClient {
    fn name(&self) -> &str {
        "serpapi"
    }

    #[instrument(skip_all, fields(num = request.num))]
    async fn search(&self, request: &SearchRequest<'_>) -> Result<Vec<SearchItem>> {
        if self.api_key.trim().is_empty() {
            return Err(OrgScanError::Auth("SerpAPI key is missing".into()));
        }

        debug!(query = request.query, "querying SerpAPI");
        let result = self.request(request).await;

        if let Err(e) = &result {
            warn!(error = %e, "SerpAPI call failed");
        }

        // Rate limiting
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        result
    }
}

/// Map an HTTP status + body to items or a classified error.
fn interpret_response(status: StatusCode, body: &str, limit: usize) -> Result<Vec<SearchItem>> {
    let parsed: Option<SerpResponse> = serde_json::from_str(body).ok();
    let provider_message = parsed
        .as_ref()
        .and_then(|p| p.error.clone())
        .unwrap_or_default();

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(OrgScanError::Auth(format!(
            "SerpAPI rejected the key (HTTP {}): {provider_message}",
            status.as_u16()
        )));
    }

    if !status.is_success() {
        if provider_message.to_lowercase().contains(INVALID_KEY_MARKER) {
            return Err(OrgScanError::Auth(provider_message));
        }
        return Err(OrgScanError::Provider(format!(
            "HTTP {}: {}",
            status.as_u16(),
            if provider_message.is_empty() {
                status.canonical_reason().unwrap_or("unknown error")
            } else {
                provider_message.as_str()
            }
        )));
    }

    let Some(parsed) = parsed else {
        return Err(OrgScanError::Provider("malformed SerpAPI payload".into()));
    };

    if let Some(message) = parsed.error {
        let lowered = message.to_lowercase();
        if lowered.contains(NO_RESULTS_MARKER) {
            return Ok(Vec::new());
        }
        if lowered.contains(INVALID_KEY_MARKER) {
            return Err(OrgScanError::Auth(message));
        }
        return Err(OrgScanError::Provider(message));
    }

    let mut items = parsed.organic_results;
    items.truncate(limit);
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, key: &str) -> SerpApiClient {
        SerpApiClient::new(SerpApiOptions {
            endpoint: format!("{}/search", server.uri()),
            engine: "google".into(),
            api_key: key.into(),
            delay: Duration::ZERO,
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    fn results_body() -> serde_json::Value {
        serde_json::json!({
            "search_metadata": { "status": "Success" },
            "organic_results": [
                {
                    "position": 1,
                    "title": "Acme Coop drone program",
                    "link": "https://acme.coop/drones",
                    "snippet": "Acme Coop inspects power lines with drones."
                },
                {
                    "position": 2,
                    "title": "Untitled",
                    "link": "https://example.com/2"
                }
            ]
        })
    }

    #[test]
    fn no_results_message_is_empty_list() {
        let body = r#"{"error": "Google hasn't returned any results for this query."}"#;
        let items = interpret_response(StatusCode::OK, body, 10).unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn malformed_payload_is_provider_error() {
        let err = interpret_response(StatusCode::OK, "<html>oops</html>", 10).unwrap_err();
        assert!(matches!(err, OrgScanError::Provider(_)));
    }

    #[test]
    fn results_are_truncated_to_limit() {
        let body = results_body().to_string();
        let items = interpret_response(StatusCode::OK, &body, 1).unwrap();
        assert_eq!(items.len(), 1);
    }

    #[tokio::test]
    async fn search_parses_organic_results() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("engine", "google"))
            .and(query_param("q", "\"Acme Coop\" AND (\"drone\")"))
            .and(query_param("num", "10"))
            .and(query_param("hl", "en"))
            .and(query_param("api_key", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(results_body()))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, "secret");
        let mut request = SearchRequest::new("\"Acme Coop\" AND (\"drone\")", 10);
        request.locale = Some("en");
        let items = client.search(&request).await.unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].link, "https://acme.coop/drones");
        assert!(items[1].snippet.is_empty());
    }

    #[tokio::test]
    async fn time_window_is_forwarded() {
        let server = MockServer::start().await;

        Mock::given(path("/search"))
            .and(query_param("tbs", "qdr:y8"))
            .respond_with(ResponseTemplate::new(200).set_body_json(results_body()))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, "secret");
        let mut request = SearchRequest::new("q", 10);
        request.time_window = Some("qdr:y8");
        assert_eq!(client.search(&request).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn rejected_key_is_auth_error() {
        let server = MockServer::start().await;

        Mock::given(path("/search"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(serde_json::json!({ "error": "Invalid API key." })),
            )
            .mount(&server)
            .await;

        let client = client_for(&server, "wrong");
        let err = client.search(&SearchRequest::new("q", 10)).await.unwrap_err();
        assert!(matches!(err, OrgScanError::Auth(_)));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn missing_key_fails_without_request() {
        let server = MockServer::start().await;

        Mock::given(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(results_body()))
            .expect(0)
            .mount(&server)
            .await;

        let client = client_for(&server, "  ");
        let err = client.search(&SearchRequest::new("q", 10)).await.unwrap_err();
        assert!(matches!(err, OrgScanError::Auth(_)));
    }

    #[tokio::test]
    async fn server_error_is_provider_error() {
        let server = MockServer::start().await;

        Mock::given(path("/search"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = client_for(&server, "secret");
        let err = client.search(&SearchRequest::new("q", 10)).await.unwrap_err();
        assert!(matches!(err, OrgScanError::Provider(_)));
        assert!(err.to_string().contains("503"));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn slow_provider_times_out() {
        let server = MockServer::start().await;

        Mock::given(path("/search"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(results_body())
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let client = SerpApiClient::new(SerpApiOptions {
            endpoint: format!("{}/search", server.uri()),
            engine: "google".into(),
            api_key: "secret".into(),
            delay: Duration::ZERO,
            timeout: Duration::from_millis(200),
        })
        .unwrap();

        let err = client.search(&SearchRequest::new("q", 10)).await.unwrap_err();
        assert!(matches!(err, OrgScanError::Provider(_)));
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn delay_applies_after_each_call() {
        let server = MockServer::start().await;

        Mock::given(path("/search"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = SerpApiClient::new(SerpApiOptions {
            endpoint: format!("{}/search", server.uri()),
            engine: "google".into(),
            api_key: "secret".into(),
            delay: Duration::from_millis(150),
            timeout: Duration::from_secs(5),
        })
        .unwrap();

        let start = Instant::now();
        let _ = client.search(&SearchRequest::new("q", 10)).await;
        assert!(start.elapsed() >= Duration::from_millis(150));
    }

    #[test]
    fn bad_endpoint_is_config_error() {
        let result = SerpApiClient::new(SerpApiOptions {
            endpoint: "not a url".into(),
            engine: "google".into(),
            api_key: "k".into(),
            delay: Duration::ZERO,
            timeout: Duration::from_secs(1),
        });
        assert!(matches!(result, Err(OrgScanError::Config { .. })));
    }
}
