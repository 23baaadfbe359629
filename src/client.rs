/// Typed request client for the dashboard backend
///
/// Every failure is folded into an [`ErrorInfo`]; nothing past this module
/// has to deal with transport errors.
use crate::config::BackendConfig;
use crate::metrics::METRICS;
use crate::types::{
    ApiRequest, ApiResult, ApiSuccess, Deployment, Endpoint, Envelope, EnvVar, ErrorInfo,
    GetEnvRequest, Method, OAuthRequest, OAuthToken, Profile,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Transport seam: turns one request into one untyped result
#[async_trait]
pub trait Backend: Send + Sync {
    async fn request(&self, request: ApiRequest) -> ApiResult<Value>;
}

/// reqwest-backed transport
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        // Url::join replaces the last segment unless the base ends with '/'
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        let base_url = Url::parse(&normalized)
            .with_context(|| format!("Invalid backend URL: {}", base_url))?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("maintdash/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, base_url })
    }

    pub fn from_config(config: &BackendConfig) -> Result<Self> {
        Self::new(&config.base_url, Duration::from_secs(config.timeout_secs))
    }

    fn url_for(&self, endpoint: Endpoint) -> Result<Url, ErrorInfo> {
        self.base_url
            .join(endpoint.path())
            .map_err(|e| ErrorInfo::malformed(format!("Invalid endpoint URL: {}", e)))
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn request(&self, request: ApiRequest) -> ApiResult<Value> {
        let url = self.url_for(request.endpoint)?;

        let mut builder = match request.method {
            Method::Get => {
                let builder = self.client.get(url);
                match &request.payload {
                    Some(payload) => builder.query(payload),
                    None => builder,
                }
            }
            Method::Post => {
                let builder = self.client.post(url);
                match &request.payload {
                    Some(payload) => builder.json(payload),
                    None => builder,
                }
            }
        };

        if let Some(token) = &request.token {
            builder = builder.bearer_auth(token);
        }

        let res = builder
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| ErrorInfo::network(e.to_string()))?;

        let status = res.status();
        let body = res
            .bytes()
            .await
            .map_err(|e| ErrorInfo::network(e.to_string()))?;

        decode_envelope(status, &body)
    }
}

/// Interpret a raw response body in the light of its HTTP status
pub(crate) fn decode_envelope(status: reqwest::StatusCode, body: &[u8]) -> ApiResult<Value> {
    match serde_json::from_slice::<Envelope>(body) {
        Ok(envelope) => envelope.into_result(status.as_u16()),
        Err(_) if !status.is_success() => {
            let text = String::from_utf8_lossy(body);
            let message = if text.trim().is_empty() {
                status.canonical_reason().unwrap_or("Request failed").to_string()
            } else {
                text.trim().to_string()
            };
            Err(ErrorInfo::http(status.as_u16(), message))
        }
        Err(e) => Err(ErrorInfo::malformed(format!("Unreadable response body: {}", e))),
    }
}

/// Typed wrapper over a [`Backend`]
#[derive(Clone)]
pub struct RequestClient {
    backend: Arc<dyn Backend>,
}

impl RequestClient {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    pub fn from_config(config: &BackendConfig) -> Result<Self> {
        Ok(Self::new(Arc::new(HttpBackend::from_config(config)?)))
    }

    /// Send one request and decode its `data` as `T`
    pub async fn send<T: DeserializeOwned>(
        &self,
        endpoint: Endpoint,
        method: Method,
        payload: Option<Value>,
        token: Option<&str>,
    ) -> ApiResult<T> {
        debug!(%endpoint, %method, authenticated = token.is_some(), "backend request");

        let request = ApiRequest {
            endpoint,
            method,
            payload,
            token: token.map(str::to_string),
        };

        let result = self.backend.request(request).await.and_then(|success| {
            let data = serde_json::from_value::<T>(success.data).map_err(|e| {
                ErrorInfo::malformed(format!("Unexpected {} payload: {}", endpoint, e))
            })?;
            Ok(ApiSuccess {
                message: success.message,
                status_code: success.status_code,
                data,
            })
        });

        let outcome = match &result {
            Ok(_) => "success".to_string(),
            Err(error) => error.status_code.to_string(),
        };
        METRICS
            .backend_requests_total
            .with_label_values(&[endpoint.as_str(), method.as_str(), &outcome])
            .inc();

        if let Err(error) = &result {
            debug!(%endpoint, "backend request failed {}", error);
        }

        result
    }

    /// Exchange an OAuth authorization code for a session token
    pub async fn oauth(&self, code: &str) -> ApiResult<OAuthToken> {
        let payload = to_payload(&OAuthRequest {
            code: code.to_string(),
        })?;
        // A success without `data` is a success without a token
        let response = self
            .send::<Option<OAuthToken>>(Endpoint::OAuth, Method::Post, Some(payload), None)
            .await?;
        Ok(ApiSuccess {
            message: response.message,
            status_code: response.status_code,
            data: response.data.unwrap_or_default(),
        })
    }

    /// Look up the profile behind a session token
    pub async fn profile(&self, token: &str) -> ApiResult<Profile> {
        self.send(Endpoint::Profile, Method::Get, None, Some(token))
            .await
    }

    pub async fn deployments(&self, token: &str) -> ApiResult<Vec<Deployment>> {
        self.send(Endpoint::Deployments, Method::Get, None, Some(token))
            .await
    }

    pub async fn get_env(&self, token: &str, project_name: &str) -> ApiResult<Vec<EnvVar>> {
        let payload = to_payload(&GetEnvRequest {
            project_name: project_name.to_string(),
        })?;
        self.send(Endpoint::GetEnv, Method::Post, Some(payload), Some(token))
            .await
    }

    pub async fn healthcheck(&self) -> ApiResult<Value> {
        self.send(Endpoint::Healthcheck, Method::Get, None, None)
            .await
    }
}

fn to_payload<T: Serialize>(payload: &T) -> Result<Value, ErrorInfo> {
    serde_json::to_value(payload)
        .map_err(|e| ErrorInfo::malformed(format!("Unserializable payload: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StatusCode;

    #[test]
    fn test_decode_success() {
        let body = br#"{"status":"success","message":"ok","status_code":200,"data":[1,2]}"#;
        let success = decode_envelope(reqwest::StatusCode::OK, body).unwrap();
        assert_eq!(success.data, serde_json::json!([1, 2]));
    }

    #[test]
    fn test_decode_non_json_error() {
        let error = decode_envelope(reqwest::StatusCode::BAD_GATEWAY, b"").unwrap_err();
        assert_eq!(error.status_code, StatusCode::Http(502));
        assert_eq!(error.message, "Bad Gateway");
    }

    #[test]
    fn test_decode_malformed_success() {
        let error = decode_envelope(reqwest::StatusCode::OK, b"<html>").unwrap_err();
        assert_eq!(
            error.status_code,
            StatusCode::Symbolic(StatusCode::MALFORMED.to_string())
        );
    }

    #[test]
    fn test_endpoint_urls_keep_base_path() {
        let backend = HttpBackend::new("https://maint.metakgp.org/api", Duration::from_secs(1)).unwrap();
        let url = backend.url_for(Endpoint::GetEnv).unwrap();
        assert_eq!(url.as_str(), "https://maint.metakgp.org/api/get_env");
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(HttpBackend::new("not a url", Duration::from_secs(1)).is_err());
    }
}
