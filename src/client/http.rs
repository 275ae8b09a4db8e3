//! Shared REST plumbing
//!
//! Both the Rancher and the Harvester clients speak token-authenticated
//! JSON over HTTPS; this module holds the one request helper they share.
//! Responses come back as `(status, body)` pairs with the body parsed
//! leniently: a non-JSON payload degrades to a JSON string instead of an
//! error, since several endpoints (kubeconfig generation in particular)
//! return plain text.

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Client;
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::utils::poll::{FetchError, Observation};

/// Errors from the REST layer
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("invalid bearer token: {0}")]
    Token(#[from] reqwest::header::InvalidHeaderValue),

    #[error("authentication rejected (status {code})")]
    Auth { code: u16 },

    #[error("API error (status {code}): {message}")]
    Api { code: u16, message: String },
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;

impl From<ClientError> for FetchError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Auth { code } => FetchError::Auth { code },
            other => FetchError::Transient(other.to_string()),
        }
    }
}

/// One API response: HTTP status plus leniently parsed body.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub code: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }
}

impl From<ApiResponse> for Observation {
    fn from(resp: ApiResponse) -> Self {
        Observation::new(resp.code, resp.body)
    }
}

/// Token-authenticated REST client bound to one API base URL.
#[derive(Debug, Clone)]
pub struct RestClient {
    base_url: Url,
    http: Client,
}

impl RestClient {
    /// Build a client for the given endpoint.
    ///
    /// `insecure` disables certificate verification; lab Rancher and
    /// Harvester installs habitually run on self-signed certificates.
    pub fn new(base_url: &str, token: &str, insecure: bool) -> ClientResult<Self> {
        let base_url = Url::parse(base_url)?;

        let mut auth = HeaderValue::from_str(&format!("Bearer {token}"))?;
        auth.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let http = Client::builder()
            .default_headers(headers)
            .danger_accept_invalid_certs(insecure)
            .build()?;

        Ok(Self { base_url, http })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub async fn get(&self, path: &str) -> ClientResult<ApiResponse> {
        let url = self.base_url.join(path)?;
        self.dispatch(self.http.get(url)).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> ClientResult<ApiResponse> {
        let url = self.base_url.join(path)?;
        self.dispatch(self.http.post(url).json(body)).await
    }

    pub async fn put(&self, path: &str, body: &Value) -> ClientResult<ApiResponse> {
        let url = self.base_url.join(path)?;
        self.dispatch(self.http.put(url).json(body)).await
    }

    pub async fn delete(&self, path: &str) -> ClientResult<ApiResponse> {
        let url = self.base_url.join(path)?;
        self.dispatch(self.http.delete(url)).await
    }

    /// POST returning the raw response text, for endpoints that answer
    /// with plain text rather than a JSON document.
    pub async fn post_raw(&self, path: &str, body: &Value) -> ClientResult<(u16, String)> {
        let url = self.base_url.join(path)?;
        let resp = self.http.post(url).json(body).send().await?;
        let code = resp.status().as_u16();
        if code == 401 || code == 403 {
            return Err(ClientError::Auth { code });
        }
        let text = resp.text().await?;
        Ok((code, text))
    }

    async fn dispatch(&self, req: reqwest::RequestBuilder) -> ClientResult<ApiResponse> {
        let resp = req.send().await?;
        let code = resp.status().as_u16();
        if code == 401 || code == 403 {
            return Err(ClientError::Auth { code });
        }
        let text = resp.text().await?;
        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
        Ok(ApiResponse { code, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn client_creation_normalizes_base_url() {
        let client = RestClient::new("https://rancher.local", "token-abc", false).unwrap();
        assert_eq!(client.base_url().as_str(), "https://rancher.local/");
    }

    #[test]
    fn invalid_url_is_rejected() {
        let result = RestClient::new("not a url", "token", false);
        assert!(matches!(result, Err(ClientError::InvalidUrl(_))));
    }

    #[test]
    fn auth_errors_map_to_fatal_fetch_errors() {
        let err: FetchError = ClientError::Auth { code: 401 }.into();
        assert!(err.is_fatal());

        let err: FetchError = ClientError::Api {
            code: 500,
            message: "boom".into(),
        }
        .into();
        assert!(!err.is_fatal());
    }

    #[test]
    fn response_success_range() {
        let ok = ApiResponse {
            code: 201,
            body: json!({}),
        };
        assert!(ok.is_success());

        let not_found = ApiResponse {
            code: 404,
            body: json!({}),
        };
        assert!(!not_found.is_success());
    }

    #[test]
    fn response_converts_to_observation() {
        let resp = ApiResponse {
            code: 200,
            body: json!({"status": {"ready": true}}),
        };
        let obs: Observation = resp.into();
        assert_eq!(obs.code, 200);
        assert_eq!(obs.body.pointer("/status/ready"), Some(&json!(true)));
    }
}
