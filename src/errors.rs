//! Error types for the paypay-ao library.
//!
//! A single [`PayPayError`] enum covers every failure the SDK can produce,
//! tagged precisely enough for callers to branch on: input validation, key
//! material problems, crypto failures, transport faults and gateway
//! rejections. [`PayPayError::is_retryable`] and [`PayPayError::retry_delay`]
//! encode the retry policy used by the client.

use std::fmt;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;

/// First-attempt retry delay in milliseconds.
pub const RETRY_BASE_DELAY_MS: u64 = 1_000;

/// Ceiling applied to the exponential backoff, in milliseconds.
pub const RETRY_MAX_DELAY_MS: u64 = 30_000;

/// Main error type for PayPay gateway operations.
#[derive(Error, Debug)]
pub enum PayPayError {
    /// Caller input rejected before any crypto or network work happened
    #[error("Invalid {field}: {message}")]
    Validation {
        /// Name of the offending field
        field: String,
        /// The value as the caller provided it
        value: String,
        /// What is wrong with it
        message: String,
        /// Human-readable description of the accepted format
        expected: String,
    },

    /// Key material failed PEM marker or structural validation
    #[error("Key format error: {0}")]
    KeyFormat(String),

    /// RSA encrypt/sign/decrypt failure, or use of cleared key material
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Transport-level failure while talking to the gateway
    #[error("Network error ({kind}): {message}")]
    Network {
        /// What kind of transport fault this was
        kind: NetworkErrorKind,
        /// Underlying error text
        message: String,
    },

    /// The gateway answered with a non-success business code
    #[error("Gateway error {code}: {message}")]
    Gateway {
        /// Which family of rejection this code belongs to
        kind: GatewayErrorKind,
        /// Raw gateway code, preserved verbatim
        code: String,
        /// Best available human message (`sub_msg`, then `msg`)
        message: String,
        /// Raw `sub_code` when the gateway sent one
        sub_code: Option<String>,
        /// Raw `sub_msg` when the gateway sent one
        sub_msg: Option<String>,
    },

    /// Error during JSON serialization/deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Client configuration is unusable
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for PayPay gateway operations.
pub type Result<T> = std::result::Result<T, PayPayError>;

/// Transport fault categories, used to decide retryability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkErrorKind {
    /// The request exceeded the configured deadline
    Timeout,
    /// TCP/TLS connection could not be established
    Connect,
    /// Host name resolution failed
    Dns,
    /// The gateway answered with a non-success HTTP status
    Status(u16),
    /// Any other transport failure
    Other,
}

impl NetworkErrorKind {
    /// Whether a fresh attempt at the same request may succeed.
    ///
    /// Timeouts, connection and DNS failures are transient by nature.
    /// HTTP statuses retry only for server errors, 429 and 408.
    pub fn is_retryable(self) -> bool {
        match self {
            NetworkErrorKind::Timeout
            | NetworkErrorKind::Connect
            | NetworkErrorKind::Dns
            | NetworkErrorKind::Other => true,
            NetworkErrorKind::Status(code) => code >= 500 || code == 429 || code == 408,
        }
    }
}

impl fmt::Display for NetworkErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkErrorKind::Timeout => write!(f, "timeout"),
            NetworkErrorKind::Connect => write!(f, "connect"),
            NetworkErrorKind::Dns => write!(f, "dns"),
            NetworkErrorKind::Status(code) => write!(f, "http status {code}"),
            NetworkErrorKind::Other => write!(f, "other"),
        }
    }
}

/// Families of gateway rejection codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayErrorKind {
    /// The gateway rejected a parameter value or shape
    Validation,
    /// Signature or encryption-key problems on the gateway side
    Crypto,
    /// Partner not authorized for the requested operation
    Auth,
    /// Partner exceeded the allowed request rate
    RateLimit,
    /// The gateway is temporarily unable to serve requests
    ServiceUnavailable,
    /// The payment itself failed (declined, insufficient funds)
    PaymentFailed,
    /// A code this library does not recognize
    Unknown,
}

impl GatewayErrorKind {
    /// Maps a raw gateway code (numeric or symbolic) to its family.
    ///
    /// Unrecognized codes map to [`GatewayErrorKind::Unknown`]; the raw
    /// code always travels alongside in [`PayPayError::Gateway`].
    pub fn from_code(code: &str) -> Self {
        match code {
            "20001" | "40001" | "40002" | "40003" | "INVALID_PARAMETER"
            | "MISSING_PARAMETER" => GatewayErrorKind::Validation,
            "40004" | "40005" | "INVALID_SIGNATURE" | "SIGNATURE_ERROR" => {
                GatewayErrorKind::Crypto
            }
            "UNAUTHORIZED" | "FORBIDDEN" => GatewayErrorKind::Auth,
            "RATE_LIMIT_EXCEEDED" => GatewayErrorKind::RateLimit,
            "20000" | "50000" | "SERVICE_UNAVAILABLE" | "INTERNAL_ERROR" => {
                GatewayErrorKind::ServiceUnavailable
            }
            "50001" | "PAYMENT_FAILED" | "INSUFFICIENT_FUNDS" => GatewayErrorKind::PaymentFailed,
            _ => GatewayErrorKind::Unknown,
        }
    }
}

impl fmt::Display for GatewayErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GatewayErrorKind::Validation => "validation",
            GatewayErrorKind::Crypto => "crypto",
            GatewayErrorKind::Auth => "auth",
            GatewayErrorKind::RateLimit => "rate limit",
            GatewayErrorKind::ServiceUnavailable => "service unavailable",
            GatewayErrorKind::PaymentFailed => "payment failed",
            GatewayErrorKind::Unknown => "unknown",
        };
        write!(f, "{name}")
    }
}

impl PayPayError {
    /// Builds a [`PayPayError::Validation`] for `field`.
    pub fn validation(
        field: impl Into<String>,
        value: impl Into<String>,
        message: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        PayPayError::Validation {
            field: field.into(),
            value: value.into(),
            message: message.into(),
            expected: expected.into(),
        }
    }

    /// Whether retrying the same request may succeed.
    ///
    /// Transport faults and gateway availability problems are retryable.
    /// Validation, key, crypto and payment rejections are not: the retry
    /// would carry the exact same doomed request.
    pub fn is_retryable(&self) -> bool {
        match self {
            PayPayError::Network { kind, .. } => kind.is_retryable(),
            PayPayError::Gateway { kind, .. } => matches!(
                kind,
                GatewayErrorKind::ServiceUnavailable | GatewayErrorKind::RateLimit
            ),
            _ => false,
        }
    }

    /// Suggested wait before retry number `attempt` (1-based).
    ///
    /// Exponential backoff starting at [`RETRY_BASE_DELAY_MS`], capped at
    /// [`RETRY_MAX_DELAY_MS`], with 25% jitter either side of the capped
    /// value. Returns [`Duration::ZERO`] for non-retryable errors.
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        if !self.is_retryable() {
            return Duration::ZERO;
        }
        let exp = attempt.saturating_sub(1).min(15);
        let capped = RETRY_BASE_DELAY_MS
            .saturating_mul(1u64 << exp)
            .min(RETRY_MAX_DELAY_MS);
        let jitter = capped / 4;
        let millis = rand::thread_rng().gen_range(capped - jitter..=capped + jitter);
        Duration::from_millis(millis)
    }

    /// Stable machine-readable code for logs and metrics.
    ///
    /// Gateway errors return the raw gateway code; every other variant maps
    /// to a fixed library code.
    pub fn code(&self) -> &str {
        match self {
            PayPayError::Validation { .. } => "VALIDATION_ERROR",
            PayPayError::KeyFormat(_) => "KEY_FORMAT_ERROR",
            PayPayError::Crypto(_) => "CRYPTO_ERROR",
            PayPayError::Network { .. } => "NETWORK_ERROR",
            PayPayError::Gateway { code, .. } => code,
            PayPayError::Json(_) => "SERIALIZATION_ERROR",
            PayPayError::Config(_) => "CONFIGURATION_ERROR",
        }
    }

    /// Structured form of the error for log sinks.
    ///
    /// Always `{code, message, details, retryable, timestamp}`. Validation
    /// errors put the offending field, value and expected format under
    /// `details`; gateway rejections put `sub_code` and `sub_msg` there.
    /// Variants with nothing beyond the message serialize `details` as null.
    pub fn to_json(&self) -> serde_json::Value {
        let details = match self {
            PayPayError::Validation {
                field,
                value,
                expected,
                ..
            } => serde_json::json!({
                "field": field,
                "value": value,
                "expected": expected,
            }),
            PayPayError::Gateway {
                sub_code, sub_msg, ..
            } => serde_json::json!({
                "sub_code": sub_code,
                "sub_msg": sub_msg,
            }),
            _ => serde_json::Value::Null,
        };
        serde_json::json!({
            "code": self.code(),
            "message": self.to_string(),
            "details": details,
            "retryable": self.is_retryable(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })
    }
}

impl From<reqwest::Error> for PayPayError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            NetworkErrorKind::Timeout
        } else if let Some(status) = err.status() {
            NetworkErrorKind::Status(status.as_u16())
        } else if err.is_connect() {
            if error_chain_mentions_dns(&err) {
                NetworkErrorKind::Dns
            } else {
                NetworkErrorKind::Connect
            }
        } else {
            NetworkErrorKind::Other
        };
        PayPayError::Network {
            kind,
            message: err.to_string(),
        }
    }
}

impl From<base64::DecodeError> for PayPayError {
    fn from(err: base64::DecodeError) -> Self {
        PayPayError::Crypto(format!("base64 decode failed: {err}"))
    }
}

impl From<rsa::Error> for PayPayError {
    fn from(err: rsa::Error) -> Self {
        PayPayError::Crypto(err.to_string())
    }
}

impl From<url::ParseError> for PayPayError {
    fn from(err: url::ParseError) -> Self {
        PayPayError::Config(format!("invalid endpoint URL: {err}"))
    }
}

fn error_chain_mentions_dns(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut source = err.source();
    while let Some(inner) = source {
        let text = inner.to_string().to_ascii_lowercase();
        if text.contains("dns") || text.contains("lookup") {
            return true;
        }
        source = inner.source();
    }
    false
}
