use miette::Diagnostic;
use thiserror::Error;

/// Main error type for the application
#[derive(Debug, Error, Diagnostic)]
pub enum Error {
    /// Network failure, timeout, rate limit or server error. Retried on the next tick.
    #[error("Provider temporarily unavailable: {0}")]
    #[diagnostic(code(calendarlink::transient_provider))]
    TransientProvider(String),

    /// Invalid or expired credentials. Does not heal on retry.
    #[error("Authorization error: {0}")]
    #[diagnostic(
        code(calendarlink::auth),
        help("re-authorize the account, e.g. with the authorize_google binary")
    )]
    Auth(String),

    #[error("Malformed input: {0}")]
    #[diagnostic(code(calendarlink::malformed_input))]
    MalformedInput(String),

    #[error("Not found: {0}")]
    #[diagnostic(code(calendarlink::not_found))]
    NotFound(String),

    #[error("Environment error: {0}")]
    #[diagnostic(code(calendarlink::environment))]
    Environment(String),

    #[error("Configuration error: {0}")]
    #[diagnostic(code(calendarlink::config))]
    Config(String),

    #[error("Component error: {0}")]
    #[diagnostic(code(calendarlink::component))]
    Component(String),

    #[error(transparent)]
    #[diagnostic(code(calendarlink::io))]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(calendarlink::serialization))]
    Serialization(String),

    #[error("Other error: {0}")]
    #[diagnostic(code(calendarlink::other))]
    Other(String),
}

impl Error {
    /// Whether the failure is expected to clear up by itself on a later cycle
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::TransientProvider(_))
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, Error::Auth(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

// Implement From for TOML deserialization errors
impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<roxmltree::Error> for Error {
    fn from(err: roxmltree::Error) -> Self {
        Error::TransientProvider(format!("Invalid XML response: {}", err))
    }
}

// Transport failures never carry a usable body, so only the status decides
// between an auth failure and something worth retrying.
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Error::from_status(status.as_u16(), &err.to_string()),
            None => Error::TransientProvider(err.to_string()),
        }
    }
}

impl Error {
    /// Classify an HTTP status returned by a provider
    pub fn from_status(status: u16, message: &str) -> Self {
        match status {
            401 | 403 => Error::Auth(format!("HTTP {} - {}", status, message)),
            404 | 410 => Error::NotFound(format!("HTTP {} - {}", status, message)),
            400 | 422 => Error::MalformedInput(format!("HTTP {} - {}", status, message)),
            _ => Error::TransientProvider(format!("HTTP {} - {}", status, message)),
        }
    }
}

/// Type alias for Result with our Error type
pub type CalendarResult<T> = Result<T, Error>;

/// Helper to create environment errors
pub fn env_error(var: &str) -> Error {
    Error::Environment(format!("Invalid environment variable: {}", var))
}

/// Helper to create configuration errors
pub fn config_error(message: &str) -> Error {
    Error::Config(message.to_string())
}

/// Helper to create component errors
pub fn component_error(message: &str) -> Error {
    Error::Component(message.to_string())
}

/// Helper to create transient provider errors
pub fn transient_error(message: &str) -> Error {
    Error::TransientProvider(message.to_string())
}

/// Helper to create authorization errors
pub fn auth_error(message: &str) -> Error {
    Error::Auth(message.to_string())
}

/// Helper to create malformed input errors
pub fn malformed_input(message: &str) -> Error {
    Error::MalformedInput(message.to_string())
}

/// Helper to create not found errors
pub fn not_found_error(message: &str) -> Error {
    Error::NotFound(message.to_string())
}

/// Helper to create other errors
pub fn other_error(message: &str) -> Error {
    Error::Other(message.to_string())
}
