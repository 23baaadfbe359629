use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Logical backend endpoint (closed set, never a free-form URL)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    #[serde(rename = "oauth")]
    OAuth,
    Profile,
    Deployments,
    GetEnv,
    Healthcheck,
}

impl Endpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Endpoint::OAuth => "oauth",
            Endpoint::Profile => "profile",
            Endpoint::Deployments => "deployments",
            Endpoint::GetEnv => "get_env",
            Endpoint::Healthcheck => "healthcheck",
        }
    }

    /// Path relative to the backend base URL
    pub fn path(&self) -> &'static str {
        self.as_str()
    }
}

impl FromStr for Endpoint {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "oauth" => Ok(Endpoint::OAuth),
            "profile" => Ok(Endpoint::Profile),
            "deployments" => Ok(Endpoint::Deployments),
            "get_env" => Ok(Endpoint::GetEnv),
            "healthcheck" => Ok(Endpoint::Healthcheck),
            other => anyhow::bail!("Unknown endpoint: {}", other),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP methods the backend accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "get",
            Method::Post => "post",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status code carried by an error result: an HTTP status or a symbolic
/// code for failures that never produced one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatusCode {
    Http(u16),
    Symbolic(String),
}

impl StatusCode {
    pub const NETWORK: &'static str = "network";
    pub const MALFORMED: &'static str = "malformed";
    pub const STORAGE: &'static str = "storage";

    /// Read a `status_code` field that may be a number or a string
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n
                .as_u64()
                .and_then(|n| u16::try_from(n).ok())
                .map(StatusCode::Http),
            Value::String(s) => match s.parse::<u16>() {
                Ok(code) => Some(StatusCode::Http(code)),
                Err(_) => Some(StatusCode::Symbolic(s.clone())),
            },
            _ => None,
        }
    }

    pub fn as_http(&self) -> Option<u16> {
        match self {
            StatusCode::Http(code) => Some(*code),
            StatusCode::Symbolic(_) => None,
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusCode::Http(code) => write!(f, "{}", code),
            StatusCode::Symbolic(code) => f.write_str(code),
        }
    }
}

/// Error half of a backend result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub status_code: StatusCode,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(status_code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status_code,
            message: message.into(),
        }
    }

    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::new(StatusCode::Http(status), message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(StatusCode::Symbolic(StatusCode::NETWORK.to_string()), message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(StatusCode::Symbolic(StatusCode::MALFORMED.to_string()), message)
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(StatusCode::Symbolic(StatusCode::STORAGE.to_string()), message)
    }

    /// The backend looked at the credentials and refused them
    pub fn is_rejection(&self) -> bool {
        matches!(self.status_code, StatusCode::Http(401) | StatusCode::Http(403))
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}): {}", self.status_code, self.message)
    }
}

impl std::error::Error for ErrorInfo {}

/// Success half of a backend result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiSuccess<T> {
    pub message: String,
    pub status_code: u16,
    pub data: T,
}

pub type ApiResult<T> = Result<ApiSuccess<T>, ErrorInfo>;

/// Response envelope as the backend serializes it
///
/// `status_code` is optional on the wire (the HTTP status is used when it is
/// missing) and error envelopes may carry a `data: null` that is ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Envelope {
    Success {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status_code: Option<Value>,
        #[serde(default)]
        data: Option<Value>,
    },
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status_code: Option<Value>,
    },
}

impl Envelope {
    pub fn success(message: impl Into<String>, data: Value) -> Self {
        Envelope::Success {
            message: message.into(),
            status_code: Some(Value::from(200)),
            data: Some(data),
        }
    }

    pub fn error(message: impl Into<String>, status_code: Value) -> Self {
        Envelope::Error {
            message: message.into(),
            status_code: Some(status_code),
        }
    }

    /// Combine the envelope with the HTTP status it arrived with
    pub fn into_result(self, http_status: u16) -> ApiResult<Value> {
        let http_ok = (200..300).contains(&http_status);
        match self {
            Envelope::Success { message, data, .. } if http_ok => Ok(ApiSuccess {
                message,
                status_code: http_status,
                data: data.unwrap_or(Value::Null),
            }),
            Envelope::Success { message, .. } => Err(ErrorInfo::http(http_status, message)),
            Envelope::Error {
                message,
                status_code,
            } => {
                let status_code = status_code
                    .as_ref()
                    .and_then(StatusCode::from_json)
                    .unwrap_or(StatusCode::Http(http_status));
                Err(ErrorInfo::new(status_code, message))
            }
        }
    }
}

/// A request as handed to a [`crate::client::Backend`]
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub endpoint: Endpoint,
    pub method: Method,
    pub payload: Option<Value>,
    pub token: Option<String>,
}

// Endpoint payloads

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthRequest {
    pub code: String,
}

/// `token` is optional so a success without one can be told apart
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OAuthToken {
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    pub name: String,
    pub repo_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetEnvRequest {
    pub project_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub key: String,
    pub value: String,
}
