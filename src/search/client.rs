use reqwest::Client;
use tracing::{debug, warn};

use super::types::{SearchRecord, SearchResponse};
use crate::config::ApiKey;

const API_URL: &str = "https://serpapi.com/search.json";
const ENGINE: &str = "google";
/// Organic results kept per query.
pub const MAX_RECORDS: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid search URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Web search returning at most [`MAX_RECORDS`] records.
///
/// Never fails: implementations log the problem and return an empty vector,
/// so callers must tolerate an empty result set.
pub trait SearchProvider {
    async fn search(&self, query: &str) -> Vec<SearchRecord>;
}

#[derive(Clone)]
pub struct SerpApiClient {
    http: Client,
    api_key: ApiKey,
    base_url: String,
}

impl SerpApiClient {
    pub fn new(http: Client, api_key: ApiKey) -> Self {
        Self {
            http,
            api_key,
            base_url: API_URL.to_string(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_base_url(http: Client, base_url: &str) -> Self {
        Self {
            http,
            api_key: ApiKey::new("test-key"),
            base_url: base_url.to_string(),
        }
    }

    async fn try_search(&self, query: &str) -> Result<Vec<SearchRecord>, SearchError> {
        let url = url::Url::parse_with_params(
            &self.base_url,
            &[
                ("api_key", self.api_key.expose()),
                ("q", query),
                ("engine", ENGINE),
            ],
        )?;

        let response = self
            .http
            .get(url)
            .header("User-Agent", crate::USER_AGENT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<SearchResponse>(&text)
                .ok()
                .and_then(|body| body.error)
                .unwrap_or_else(|| {
                    let end = text.floor_char_boundary(200);
                    format!("HTTP {status}: {}", &text[..end])
                });
            return Err(SearchError::Api {
                code: status.as_u16(),
                message,
            });
        }

        let body: SearchResponse = response.json().await?;
        Ok(normalize(body))
    }
}

impl SearchProvider for SerpApiClient {
    async fn search(&self, query: &str) -> Vec<SearchRecord> {
        debug!(query, "searching");
        match self.try_search(query).await {
            Ok(records) => {
                debug!(count = records.len(), "search complete");
                records
            }
            Err(e) => {
                warn!(error = %e, query, "search failed");
                Vec::new()
            }
        }
    }
}

fn normalize(body: SearchResponse) -> Vec<SearchRecord> {
    body.organic_results
        .unwrap_or_default()
        .into_iter()
        .take(MAX_RECORDS)
        .map(SearchRecord::from)
        .collect()
}


#[cfg(test)]
mod http_tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> SerpApiClient {
        SerpApiClient::with_base_url(Client::new(), &format!("{}/search.json", server.uri()))
    }

    #[tokio::test]
    async fn search_sends_query_and_engine() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search.json"))
            .and(query_param("q", "email for Acme"))
            .and(query_param("engine", "google"))
            .and(query_param("api_key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "organic_results": [
                    {"title": "Acme", "snippet": "contact@acme.test", "link": "https://acme.test"}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let records = client(&server).search("email for Acme").await;

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].snippet, "contact@acme.test");
        assert_eq!(records[0].link, "https://acme.test");
    }

    #[tokio::test]
    async fn search_returns_at_most_three_records() {
        let server = MockServer::start().await;
        let results: Vec<_> = (0..8)
            .map(|i| serde_json::json!({"title": format!("r{i}"), "link": format!("https://r{i}.test")}))
            .collect();
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "organic_results": results })),
            )
            .mount(&server)
            .await;

        let records = client(&server).search("anything").await;

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].title, "r0");
        assert_eq!(records[0].snippet, "");
    }

    #[tokio::test]
    async fn search_error_status_returns_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(serde_json::json!({"error": "Invalid API key."})),
            )
            .mount(&server)
            .await;

        let c = client(&server);
        assert!(c.search("anything").await.is_empty());

        match c.try_search("anything").await {
            Err(SearchError::Api { code: 401, message }) => {
                assert_eq!(message, "Invalid API key.");
            }
            other => panic!("expected Api(401), got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn search_invalid_body_returns_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        assert!(client(&server).search("anything").await.is_empty());
    }

    #[tokio::test]
    async fn search_transport_failure_returns_empty() {
        let server = MockServer::start().await;
        let c = client(&server);
        drop(server);

        assert!(c.search("anything").await.is_empty());
    }
}
