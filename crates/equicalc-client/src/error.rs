//! Error types for the calculation service
//!
//! Failures carry a structured [`ErrorCode`] from the service boundary all
//! the way to the display layer. When the service omits the code, the HTTP
//! status decides; matching words inside the message is the last resort and
//! is flagged as such through [`CodeSource::MessageHeuristic`].

use std::fmt;

/// Failure code reported by the calculation service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Request parameters rejected
    Validation,
    /// Calculation could not be completed
    Calculation,
    /// Too many requests
    RateLimit,
    /// Resource not found
    NotFound,
    /// Server-side fault
    Internal,
    /// No usable classification
    Unknown,
}

impl ErrorCode {
    /// Parse the wire code (`VALIDATION_ERROR`, ...)
    #[must_use]
    pub fn from_wire(code: &str) -> Option<Self> {
        match code.trim().to_ascii_uppercase().as_str() {
            "VALIDATION_ERROR" => Some(Self::Validation),
            "CALCULATION_ERROR" => Some(Self::Calculation),
            "RATE_LIMIT_EXCEEDED" => Some(Self::RateLimit),
            "NOT_FOUND" => Some(Self::NotFound),
            "INTERNAL_ERROR" => Some(Self::Internal),
            _ => None,
        }
    }

    /// Wire representation
    #[must_use]
    pub fn as_wire(&self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION_ERROR",
            Self::Calculation => "CALCULATION_ERROR",
            Self::RateLimit => "RATE_LIMIT_EXCEEDED",
            Self::NotFound => "NOT_FOUND",
            Self::Internal => "INTERNAL_ERROR",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Classify by HTTP status; `None` when the status says nothing useful
    #[must_use]
    pub fn from_status(status: u16) -> Option<Self> {
        match status {
            400 | 422 => Some(Self::Validation),
            404 => Some(Self::NotFound),
            429 => Some(Self::RateLimit),
            500..=599 => Some(Self::Internal),
            _ => None,
        }
    }

    /// Degraded fallback: guess from the message text
    ///
    /// Only used when neither a code nor a decisive status is available.
    #[must_use]
    pub fn infer_from_message(message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("validation") || lower.contains("invalid") {
            Self::Validation
        } else if lower.contains("rate limit") || lower.contains("too many") {
            Self::RateLimit
        } else if lower.contains("not found") {
            Self::NotFound
        } else if lower.contains("calculat") {
            Self::Calculation
        } else if lower.contains("internal") {
            Self::Internal
        } else {
            Self::Unknown
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// Where an [`ErrorCode`] came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CodeSource {
    /// Code field in the error body
    Structured,
    /// Derived from the HTTP status
    HttpStatus,
    /// Guessed from the message text
    MessageHeuristic,
    /// Produced locally (e.g. undecodable success body)
    #[default]
    Local,
}

/// Additional context from service errors for debugging
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ErrorContext {
    /// HTTP status code
    pub http_status: Option<u16>,
    /// Request id echoed by the service (x-request-id header)
    pub request_id: Option<String>,
    /// Provenance of the error code
    pub code_source: CodeSource,
}

impl ErrorContext {
    /// Empty context, code produced locally
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the HTTP status
    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    /// Attach the request id echoed by the service
    #[must_use]
    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    /// Record where the error code came from
    #[must_use]
    pub fn with_source(mut self, source: CodeSource) -> Self {
        self.code_source = source;
        self
    }
}

/// Display classification of a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No response received
    Network,
    /// Inputs rejected by the service
    Validation,
    /// Calculation failed server-side
    Calculation,
    /// Throttled
    RateLimit,
    /// Unknown resource
    NotFound,
    /// Server fault
    Internal,
    /// Unclassified
    Unknown,
}

impl From<ErrorCode> for ErrorKind {
    fn from(code: ErrorCode) -> Self {
        match code {
            ErrorCode::Validation => Self::Validation,
            ErrorCode::Calculation => Self::Calculation,
            ErrorCode::RateLimit => Self::RateLimit,
            ErrorCode::NotFound => Self::NotFound,
            ErrorCode::Internal => Self::Internal,
            ErrorCode::Unknown => Self::Unknown,
        }
    }
}

impl ErrorKind {
    /// Short user-facing title
    #[must_use]
    pub fn title(&self) -> &'static str {
        match self {
            Self::Network => "Connection problem",
            Self::Validation => "Invalid parameters",
            Self::Calculation => "Calculation failed",
            Self::RateLimit => "Too many requests",
            Self::NotFound => "Not found",
            Self::Internal => "Server error",
            Self::Unknown => "Unexpected error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// Errors that can occur when calling the calculation service
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ServiceError {
    /// No response received
    #[error("network failure: {message}")]
    Network { message: String },

    /// Response received carrying a failure
    #[error("service failure [{code}]: {message}")]
    Service {
        code: ErrorCode,
        message: String,
        context: ErrorContext,
    },
}

impl ServiceError {
    /// Create a network failure
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a service failure with a known code
    pub fn service(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Service {
            code,
            message: message.into(),
            context: ErrorContext::new(),
        }
    }

    /// Create a service failure with context
    pub fn service_with_context(
        code: ErrorCode,
        message: impl Into<String>,
        context: ErrorContext,
    ) -> Self {
        Self::Service {
            code,
            message: message.into(),
            context,
        }
    }

    /// Display classification
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network { .. } => ErrorKind::Network,
            Self::Service { code, .. } => ErrorKind::from(*code),
        }
    }

    /// Service code, if a response was received
    #[must_use]
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Network { .. } => None,
            Self::Service { code, .. } => Some(*code),
        }
    }

    /// Whether retrying the same request may succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } => true,
            Self::Service { code, .. } => matches!(code, ErrorCode::RateLimit | ErrorCode::Internal),
        }
    }

    /// Get the error context if available
    #[must_use]
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Self::Network { .. } => None,
            Self::Service { context, .. } => Some(context),
        }
    }

    /// Human-readable message without the classification prefix
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Network { message } | Self::Service { message, .. } => message,
        }
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        Self::network(err.to_string())
    }
}
