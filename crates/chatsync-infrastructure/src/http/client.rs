//! Shared REST plumbing for the HTTP authorities.

use std::time::Duration;

use chatsync_core::error::{ChatSyncError, Result};
use reqwest::{Client, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Base URL plus a configured `reqwest` client.
///
/// Every endpoint lives under `/api/` and ends with a slash. Transport
/// failures and 5xx statuses become `AuthorityUnavailable`; other non-2xx
/// statuses become `Rejected` carrying the status and the server's
/// `detail` text, for the calling authority to refine.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base: Url,
}

impl ApiClient {
    pub fn new(base: &str, timeout: Duration) -> Result<Self> {
        let base = Url::parse(base.trim())
            .map_err(|e| ChatSyncError::unavailable(format!("invalid api base '{}': {}", base, e)))?;
        if base.cannot_be_a_base() {
            return Err(ChatSyncError::unavailable(format!(
                "api base '{}' cannot carry a path",
                base
            )));
        }
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChatSyncError::unavailable(format!("http client: {}", e)))?;
        Ok(Self { http, base })
    }

    /// `{base}/api/{segments..}/`, each segment percent-encoded.
    pub fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().push("api").extend(segments).push("");
        }
        url
    }

    pub fn get(&self, url: Url) -> RequestBuilder {
        self.http.get(url)
    }

    pub fn post(&self, url: Url) -> RequestBuilder {
        self.http.post(url)
    }

    pub fn put(&self, url: Url) -> RequestBuilder {
        self.http.put(url)
    }

    pub fn delete(&self, url: Url) -> RequestBuilder {
        self.http.delete(url)
    }

    /// Sends `request` and returns the JSON body (`Null` when empty).
    pub async fn execute(&self, request: RequestBuilder) -> Result<Value> {
        let response = request
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| ChatSyncError::unavailable(transport_detail(&e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ChatSyncError::unavailable(transport_detail(&e)))?;

        if status.is_server_error() {
            return Err(ChatSyncError::unavailable(format!(
                "authority returned {}",
                status
            )));
        }
        if !status.is_success() {
            return Err(ChatSyncError::rejected(status.as_u16(), detail_of(&text)));
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text)
            .map_err(|e| ChatSyncError::decode(format!("response body is not JSON: {}", e)))
    }

    /// `execute` followed by a typed decode.
    pub async fn execute_as<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let body = self.execute(request).await?;
        serde_json::from_value(body).map_err(|e| ChatSyncError::decode(e.to_string()))
    }
}

/// HTTP status carried by a `Rejected` error.
pub fn rejected_status(err: &ChatSyncError) -> Option<u16> {
    match err {
        ChatSyncError::Rejected { status, .. } => Some(*status),
        _ => None,
    }
}

fn transport_detail(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        "request timed out".to_string()
    } else if err.is_connect() {
        format!("connection failed: {}", err)
    } else {
        err.to_string()
    }
}

/// The server's `detail` field when present, else the raw body.
fn detail_of(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("detail").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(base: &str) -> ApiClient {
        ApiClient::new(base, Duration::from_secs(2)).unwrap()
    }

    #[test]
    fn test_endpoint_keeps_base_path_and_trailing_slash() {
        let api = client("http://localhost:8000");
        assert_eq!(
            api.endpoint(&["accounts", "a b"]).as_str(),
            "http://localhost:8000/api/accounts/a%20b/"
        );

        let prefixed = client("http://host/chat/");
        assert_eq!(
            prefixed.endpoint(&["messages"]).as_str(),
            "http://host/chat/api/messages/"
        );
    }

    #[test]
    fn test_rejects_unusable_base() {
        assert!(ApiClient::new("not a url", Duration::from_secs(1)).is_err());
        assert!(ApiClient::new("mailto:x@y", Duration::from_secs(1)).is_err());
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/boom/"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/bad/"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(serde_json::json!({"detail": "nope"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/empty/"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let api = client(&server.uri());
        let err = api.execute(api.get(api.endpoint(&["boom"]))).await.unwrap_err();
        assert!(err.is_unavailable());

        let err = api.execute(api.get(api.endpoint(&["bad"]))).await.unwrap_err();
        assert_eq!(err, ChatSyncError::rejected(400, "nope"));

        let body = api.execute(api.get(api.endpoint(&["empty"]))).await.unwrap();
        assert_eq!(body, Value::Null);
    }

    #[tokio::test]
    async fn test_unreachable_server_is_unavailable() {
        // Port 9 (discard) is essentially never listening on loopback.
        let api = client("http://127.0.0.1:9");
        let err = api.execute(api.get(api.endpoint(&["messages"]))).await.unwrap_err();
        assert!(err.is_unavailable());
    }
}
