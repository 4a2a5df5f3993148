//! Centralized Error Handling Module
//!
//! Every failure carries a unique error code so that logs can be grepped and
//! aggregated per category.
//!
//! Error codes follow pattern: CATEGORY_SPECIFIC_ERROR
//! - RPC_xxx: endpoint (JSON-RPC) errors
//! - HTTP_xxx: explorer / price service errors
//! - LIMIT_xxx: rate limiter and circuit breaker
//! - CFG_xxx: configuration errors

use std::fmt;

/// Application-wide error type
#[derive(Debug)]
pub struct AppError {
    /// Unique error code for logging/monitoring
    pub code: ErrorCode,
    /// Human-readable message
    pub message: String,
    /// Optional underlying error
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    /// Create a new AppError
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Create AppError with source error
    pub fn with_source(
        code: ErrorCode,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Get error code as string (for logging)
    pub fn code_str(&self) -> &'static str {
        self.code.as_str()
    }

    /// Cancellation is not a failure and must never be retried
    pub fn is_cancelled(&self) -> bool {
        self.code == ErrorCode::Cancelled
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Unique error codes for monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // ============================================
    // RPC Errors
    // ============================================
    /// RPC connection failed
    RpcConnectionFailed,
    /// RPC request timeout
    RpcTimeout,
    /// RPC rate limited (HTTP 429 / -32005)
    RpcRateLimited,
    /// RPC returned error response (revert, bad params, ...)
    RpcError,
    /// Invalid RPC response
    RpcInvalidResponse,

    // ============================================
    // External HTTP services (explorer, prices)
    // ============================================
    /// Non-2xx status
    HttpStatus,

    // ============================================
    // Rate limiting / circuit breaker
    // ============================================
    /// Circuit breaker is cooling down, call was not attempted
    CircuitOpen,
    /// Token bucket wait loop hit its iteration cap
    RateLimiterExhausted,

    // ============================================
    // Input / configuration
    // ============================================
    /// Malformed account address
    InvalidAddress,
    /// Invalid configuration value
    ConfigInvalidValue,

    // ============================================
    // Decoding
    // ============================================
    /// ABI return data could not be decoded
    AbiDecode,

    // ============================================
    // Control flow
    // ============================================
    /// Cancellation token fired
    Cancelled,

    /// Unknown error
    Unknown,
}

impl ErrorCode {
    /// Get string representation of error code
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RpcConnectionFailed => "RPC_CONNECTION_FAILED",
            Self::RpcTimeout => "RPC_TIMEOUT",
            Self::RpcRateLimited => "RPC_RATE_LIMITED",
            Self::RpcError => "RPC_ERROR",
            Self::RpcInvalidResponse => "RPC_INVALID_RESPONSE",

            Self::HttpStatus => "HTTP_STATUS",

            Self::CircuitOpen => "LIMIT_CIRCUIT_OPEN",
            Self::RateLimiterExhausted => "LIMIT_EXHAUSTED",

            Self::InvalidAddress => "INVALID_ADDRESS",
            Self::ConfigInvalidValue => "CFG_INVALID_VALUE",

            Self::AbiDecode => "ABI_DECODE",

            Self::Cancelled => "CANCELLED",

            Self::Unknown => "UNKNOWN_ERROR",
        }
    }
}

// ============================================
// Convenience constructors
// ============================================

impl AppError {
    /// Cancellation token fired
    pub fn cancelled() -> Self {
        Self::new(ErrorCode::Cancelled, "Operation cancelled")
    }

    /// RPC connection failed
    pub fn rpc_connection_failed(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::RpcConnectionFailed, msg)
    }

    /// RPC timeout
    pub fn rpc_timeout(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::RpcTimeout, msg)
    }

    /// RPC rate limited
    pub fn rpc_rate_limited() -> Self {
        Self::new(ErrorCode::RpcRateLimited, "Rate limited (HTTP 429)")
    }

    /// RPC error object in a response
    pub fn rpc_error(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::RpcError, msg)
    }

    /// Malformed RPC response
    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::RpcInvalidResponse, msg)
    }

    /// Circuit breaker open
    pub fn circuit_open(remaining_ms: u128) -> Self {
        Self::new(
            ErrorCode::CircuitOpen,
            format!("Circuit open, cooling down for {}ms", remaining_ms),
        )
    }

    /// Invalid account address
    pub fn invalid_address(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidAddress, msg)
    }

    /// Invalid configuration value
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigInvalidValue, msg)
    }
}

// ============================================
// Result type alias
// ============================================

/// Application Result type
pub type AppResult<T> = Result<T, AppError>;

// ============================================
// Conversion from common error types
// ============================================

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::new(ErrorCode::RpcTimeout, "Request timeout")
        } else if err.is_connect() {
            Self::with_source(ErrorCode::RpcConnectionFailed, "Connection failed", err)
        } else if err.is_decode() {
            Self::with_source(ErrorCode::RpcInvalidResponse, "Response decode failed", err)
        } else {
            Self::new(ErrorCode::Unknown, err.to_string())
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source(ErrorCode::RpcInvalidResponse, "JSON parse error", err)
    }
}

impl From<alloy_sol_types::Error> for AppError {
    fn from(err: alloy_sol_types::Error) -> Self {
        Self::new(ErrorCode::AbiDecode, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = AppError::rpc_timeout("Connection timed out");
        assert_eq!(err.code, ErrorCode::RpcTimeout);
        assert_eq!(err.code_str(), "RPC_TIMEOUT");
        assert_eq!(err.to_string(), "[RPC_TIMEOUT] Connection timed out");
    }

    #[test]
    fn test_cancelled_is_distinct() {
        assert!(AppError::cancelled().is_cancelled());
        assert!(!AppError::rpc_rate_limited().is_cancelled());
    }
}
