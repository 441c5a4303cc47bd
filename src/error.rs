use thiserror::Error;

/// Fallback text when the backend gives no usable message.
pub const GENERIC_FAILURE: &str = "Something went wrong";
pub const SESSION_EXPIRED: &str = "Session expired. Please log in again.";
pub const NO_RESPONSE: &str = "No response from server.";

#[derive(Error, Debug)]
pub enum TaskMasterError {
    #[error("WebSocket connection error: {0}")]
    WebSocketError(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON serialization/deserialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("URL parsing error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("HTTP client error: {0}")]
    HttpClientError(#[from] reqwest::Error),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Connection timeout")]
    Timeout,

    #[error("Connection closed unexpectedly")]
    ConnectionClosed,

    #[error("Namespace connect rejected: {message}")]
    ConnectRejected { message: String },

    #[error("Maximum reconnection attempts exceeded")]
    MaxReconnectsExceeded,

    #[error("Invalid message format: {0}")]
    InvalidMessage(String),

    #[error("Invalid request header: {0}")]
    InvalidHeader(String),

    #[error("Credential store error: {0}")]
    CredentialStore(String),

    #[error("Metrics server error: {0}")]
    MetricsError(String),
}

/// Uniform failure shape for every backend call.
///
/// Each variant renders to the single human-readable message a view shows.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Bad credentials on login. The form stays editable.
    #[error("{message}")]
    Auth { message: String },

    /// A 401 on any authenticated call; the stored credential has been cleared.
    #[error("Session expired. Please log in again.")]
    SessionExpired,

    /// The request never got a response.
    #[error("No response from server.")]
    Network,

    #[error("{message}")]
    Validation { message: String },

    #[error("{message}")]
    NotFound { message: String },

    #[error("{message}")]
    Server { status: Option<u16>, message: String },
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation {
            message: message.into(),
        }
    }

    pub fn message(&self) -> String {
        self.to_string()
    }

    /// True when the caller should send the user back to the login screen.
    pub fn requires_login(&self) -> bool {
        matches!(self, ApiError::SessionExpired)
    }
}
