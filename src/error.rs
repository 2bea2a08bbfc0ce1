use rmcp::model::ErrorCode;
use rmcp::service::ServiceError;
use rmcp::ErrorData as McpError;
use serde_json::json;

/// Error data tag marking a server-side failure as an upstream API failure.
const UPSTREAM_KIND: &str = "upstream";

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A caller-supplied argument violates a precondition.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The hydrology API returned an error status, timed out, or sent malformed JSON.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// The channel to the tool registry process failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// The registry answered with an error it did not attribute to the caller or upstream.
    #[error("registry error: {0}")]
    Registry(String),

    /// The series could not be rendered.
    #[error("render error: {0}")]
    Render(String),

    /// The decision step failed to produce a usable tool call.
    #[error("tool selection failed: {0}")]
    Selection(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }

    pub fn is_invalid_parameter(&self) -> bool {
        matches!(self, Self::InvalidParameter(_))
    }

    pub fn is_upstream(&self) -> bool {
        matches!(self, Self::Upstream(_))
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    pub fn is_render(&self) -> bool {
        matches!(self, Self::Render(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Upstream(format!("request timed out: {}", e))
        } else {
            Self::Upstream(e.to_string())
        }
    }
}

impl From<Error> for McpError {
    fn from(e: Error) -> Self {
        match e {
            Error::InvalidParameter(msg) => McpError::invalid_params(msg, None),
            Error::Upstream(msg) => {
                McpError::internal_error(msg, Some(json!({ "kind": UPSTREAM_KIND })))
            }
            other => McpError::internal_error(other.to_string(), None),
        }
    }
}

impl From<ServiceError> for Error {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::McpError(data) => Self::from_error_data(data),
            other => Self::Transport(other.to_string()),
        }
    }
}

impl Error {
    /// Recovers the error kind a registry server reported over the wire.
    pub fn from_error_data(data: McpError) -> Self {
        let is_upstream = data
            .data
            .as_ref()
            .and_then(|d| d.get("kind"))
            .and_then(|k| k.as_str())
            == Some(UPSTREAM_KIND);

        if data.code == ErrorCode::INVALID_PARAMS {
            Self::InvalidParameter(data.message.into_owned())
        } else if is_upstream {
            Self::Upstream(data.message.into_owned())
        } else {
            Self::Registry(format!("code {}: {}", data.code.0, data.message))
        }
    }
}
