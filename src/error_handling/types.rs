use std::fmt;

#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    TomlError(String),
    MissingValue(String),
    NotInRange(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::TomlError(e) => write!(f, "TOML parsing error: {}", e),
            ConfigError::MissingValue(e) => write!(f, "Missing configuration value: {}", e),
            ConfigError::NotInRange(e) => write!(f, "Value out of range: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::IoError(err)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::TomlError(err.to_string())
    }
}

#[derive(Debug)]
pub enum StorageError {
    ConnectionFailed,
    WriteFailed,
    ReadFailed,
    NotConfigured(String),
    QueryFailed(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::ConnectionFailed => write!(f, "Storage connection failed"),
            StorageError::WriteFailed => write!(f, "Storage write failed"),
            StorageError::ReadFailed => write!(f, "Storage read failed"),
            StorageError::NotConfigured(e) => write!(f, "Storage not configured: {}", e),
            StorageError::QueryFailed(e) => write!(f, "Database query failed: {}", e),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<sea_orm::DbErr> for StorageError {
    fn from(err: sea_orm::DbErr) -> Self {
        StorageError::QueryFailed(err.to_string())
    }
}

/// Failures reported by the external generative API client.
#[derive(Debug)]
pub enum ProviderError {
    /// No API key in the configuration nor in the environment.
    MissingApiKey,
    /// The service answered 503/429 or otherwise reported it is overloaded.
    Overloaded(String),
    /// Transport failure or non-success status.
    Request(String),
    /// The response could not be interpreted (no image, bad JSON, bad base64).
    InvalidResponse(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::MissingApiKey => write!(f, "API key is not configured"),
            ProviderError::Overloaded(e) => write!(f, "Provider overloaded: {}", e),
            ProviderError::Request(e) => write!(f, "Provider request failed: {}", e),
            ProviderError::InvalidResponse(e) => write!(f, "Provider response invalid: {}", e),
        }
    }
}

impl std::error::Error for ProviderError {}

/// Closed classification of everything that can end a generation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationErrorKind {
    /// The user's input is unusable. The message is safe to display.
    Validation,
    /// The provider API key is missing.
    MissingCredentials,
    /// The provider is overloaded or temporarily unavailable.
    Overloaded,
    /// Anything else. Only the generic message reaches the client.
    Internal,
}

impl GenerationErrorKind {
    /// Error code stored on the generation row and returned to clients.
    pub fn code(&self) -> &'static str {
        match self {
            GenerationErrorKind::Validation => "generation_error",
            GenerationErrorKind::MissingCredentials => "missing_api_key",
            GenerationErrorKind::Overloaded => "gemini_overloaded",
            GenerationErrorKind::Internal => "internal_server_error_contact_admin",
        }
    }
}

pub const MISSING_API_KEY_MESSAGE: &str = "API key is not configured.";
pub const OVERLOADED_MESSAGE: &str =
    "The image service is overloaded right now. Please try again later.";
pub const INTERNAL_ERROR_MESSAGE: &str =
    "An internal error occurred. Please contact the administrator.";

#[derive(Debug, Clone)]
pub struct GenerationError {
    pub kind: GenerationErrorKind,
    /// User-facing message.
    pub message: String,
    /// Full server-side detail, never sent to clients.
    pub detail: Option<String>,
}

impl GenerationError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self {
            kind: GenerationErrorKind::Validation,
            message: message.into(),
            detail: None,
        }
    }

    pub fn missing_credentials() -> Self {
        Self {
            kind: GenerationErrorKind::MissingCredentials,
            message: MISSING_API_KEY_MESSAGE.to_string(),
            detail: None,
        }
    }

    pub fn overloaded(detail: impl Into<String>) -> Self {
        Self {
            kind: GenerationErrorKind::Overloaded,
            message: OVERLOADED_MESSAGE.to_string(),
            detail: Some(detail.into()),
        }
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self {
            kind: GenerationErrorKind::Internal,
            message: INTERNAL_ERROR_MESSAGE.to_string(),
            detail: Some(detail.into()),
        }
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// Detail if present, message otherwise.
    pub fn full_detail(&self) -> String {
        self.detail.clone().unwrap_or_else(|| self.message.clone())
    }
}

impl fmt::Display for GenerationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{} ({}): {}", self.message, self.code(), detail),
            None => write!(f, "{} ({})", self.message, self.code()),
        }
    }
}

impl std::error::Error for GenerationError {}

impl From<ProviderError> for GenerationError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::MissingApiKey => GenerationError::missing_credentials(),
            ProviderError::Overloaded(detail) => GenerationError::overloaded(detail),
            other => GenerationError::internal(other.to_string()),
        }
    }
}

impl From<StorageError> for GenerationError {
    fn from(err: StorageError) -> Self {
        GenerationError::internal(err.to_string())
    }
}

#[derive(Debug)]
pub enum AuthError {
    MissingCredentials,
    InvalidCredentials,
    Inactive,
    Unauthenticated,
    Forbidden(String),
    NotFound(String),
    Invalid(String),
    Hashing(String),
    Storage(StorageError),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::MissingCredentials => write!(f, "Please enter a username and password."),
            AuthError::InvalidCredentials => write!(f, "Invalid username or password."),
            AuthError::Inactive => write!(f, "This account is disabled."),
            AuthError::Unauthenticated => write!(f, "Authentication required."),
            AuthError::Forbidden(e) => write!(f, "{}", e),
            AuthError::NotFound(e) => write!(f, "{}", e),
            AuthError::Invalid(e) => write!(f, "{}", e),
            AuthError::Hashing(e) => write!(f, "Password hashing failed: {}", e),
            AuthError::Storage(e) => write!(f, "Storage error: {}", e),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<StorageError> for AuthError {
    fn from(err: StorageError) -> Self {
        AuthError::Storage(err)
    }
}

impl From<sea_orm::DbErr> for AuthError {
    fn from(err: sea_orm::DbErr) -> Self {
        AuthError::Storage(StorageError::from(err))
    }
}

#[derive(Debug)]
pub enum ChatError {
    SessionNotFound,
    Generation(GenerationError),
    Storage(StorageError),
}

impl fmt::Display for ChatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatError::SessionNotFound => write!(f, "Chat session not found"),
            ChatError::Generation(e) => write!(f, "Chat generation error: {}", e),
            ChatError::Storage(e) => write!(f, "Chat storage error: {}", e),
        }
    }
}

impl std::error::Error for ChatError {}

impl From<GenerationError> for ChatError {
    fn from(err: GenerationError) -> Self {
        ChatError::Generation(err)
    }
}

impl From<StorageError> for ChatError {
    fn from(err: StorageError) -> Self {
        ChatError::Storage(err)
    }
}

impl From<sea_orm::DbErr> for ChatError {
    fn from(err: sea_orm::DbErr) -> Self {
        ChatError::Storage(StorageError::from(err))
    }
}

#[derive(Debug)]
pub enum WebError {
    BindFailed(String),
}

impl fmt::Display for WebError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebError::BindFailed(e) => write!(f, "Web server bind failed: {}", e),
        }
    }
}

impl std::error::Error for WebError {}

#[derive(Debug)]
pub enum ControllerError {
    ConfigurationError(ConfigError),
    StorageError(StorageError),
    AuthError(AuthError),
    WebError(WebError),
}

impl fmt::Display for ControllerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerError::ConfigurationError(e) => write!(f, "Configuration error: {}", e),
            ControllerError::StorageError(e) => write!(f, "Storage error: {}", e),
            ControllerError::AuthError(e) => write!(f, "Account bootstrap error: {}", e),
            ControllerError::WebError(e) => write!(f, "Web error: {}", e),
        }
    }
}

impl std::error::Error for ControllerError {}

impl From<ConfigError> for ControllerError {
    fn from(err: ConfigError) -> Self {
        ControllerError::ConfigurationError(err)
    }
}

impl From<StorageError> for ControllerError {
    fn from(err: StorageError) -> Self {
        ControllerError::StorageError(err)
    }
}

impl From<AuthError> for ControllerError {
    fn from(err: AuthError) -> Self {
        ControllerError::AuthError(err)
    }
}

impl From<WebError> for ControllerError {
    fn from(err: WebError) -> Self {
        ControllerError::WebError(err)
    }
}
