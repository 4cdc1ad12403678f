/// Centralized error types for the KIS client
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KisError {
    // Authentication Errors
    #[error("Authentication failed: {message}")]
    Authentication { message: String, code: Option<String> },

    #[error("Token expired: {message}")]
    TokenExpired { message: String, code: Option<String> },

    // Vendor Errors
    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("KIS API error: {code} - {message}")]
    Api { code: String, message: String },

    // Order Errors
    #[error("Order failed: {code} - {message}")]
    Order { code: String, message: String },

    #[error("Insufficient balance: {message}")]
    InsufficientBalance { code: String, message: String },

    #[error("Market closed: {message}")]
    MarketClosed { code: String, message: String },

    // Network Errors
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Feed not connected: {0}")]
    NotConnected(String),

    // Data Errors
    #[error("Deserialization failed: {0}")]
    Deserialization(#[from] serde_json::Error),

    #[error("Decode failed: {0}")]
    Decode(String),

    // Configuration Errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    // File I/O Errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cancelled: {0}")]
    Cancelled(String),
}

pub type Result<T> = std::result::Result<T, KisError>;

impl KisError {
    /// Map a vendor `msg_cd` to its error kind.
    ///
    /// Codes missing from the table become a generic [`KisError::Api`].
    pub fn from_vendor_code(code: &str, message: &str) -> Self {
        let code_owned = code.to_string();
        let message = message.to_string();
        match code {
            "EGW00001" => KisError::Authentication { message, code: Some(code_owned) },
            "EGW00002" | "EGW00123" => KisError::TokenExpired { message, code: Some(code_owned) },
            "EGW00201" => KisError::RateLimit(format!("{} ({})", message, code_owned)),
            "OPSP0001" => KisError::InsufficientBalance { code: code_owned, message },
            "OPSP0010" => KisError::MarketClosed { code: code_owned, message },
            _ => KisError::Api { code: code_owned, message },
        }
    }

    /// Re-tag a generic API failure raised on an order endpoint.
    pub fn into_order_error(self) -> Self {
        match self {
            KisError::Api { code, message } => KisError::Order { code, message },
            other => other,
        }
    }

    pub(crate) fn auth(message: impl Into<String>) -> Self {
        KisError::Authentication { message: message.into(), code: None }
    }

    /// Vendor code carried by the error, if any
    pub fn vendor_code(&self) -> Option<&str> {
        match self {
            KisError::Authentication { code, .. } | KisError::TokenExpired { code, .. } => {
                code.as_deref()
            }
            KisError::Api { code, .. }
            | KisError::Order { code, .. }
            | KisError::InsufficientBalance { code, .. }
            | KisError::MarketClosed { code, .. } => Some(code.as_str()),
            _ => None,
        }
    }

    pub fn is_authentication(&self) -> bool {
        matches!(self, KisError::Authentication { .. } | KisError::TokenExpired { .. })
    }

    pub fn is_order_error(&self) -> bool {
        matches!(
            self,
            KisError::Order { .. } | KisError::InsufficientBalance { .. } | KisError::MarketClosed { .. }
        )
    }

    /// Check if a caller-side retry could succeed.
    ///
    /// Nothing in this crate retries on its own.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            KisError::RateLimit(_)
                | KisError::Http(_)
                | KisError::TokenExpired { .. }
                | KisError::WebSocket(_)
        )
    }

    /// Get error code for logging/monitoring
    pub fn error_code(&self) -> &str {
        match self {
            KisError::Authentication { .. } => "AUTH_001",
            KisError::TokenExpired { .. } => "AUTH_002",
            KisError::RateLimit(_) => "API_001",
            KisError::Api { .. } => "API_002",
            KisError::Order { .. } => "ORDER_001",
            KisError::InsufficientBalance { .. } => "ORDER_002",
            KisError::MarketClosed { .. } => "ORDER_003",
            KisError::Http(_) => "NET_001",
            KisError::WebSocket(_) => "NET_002",
            KisError::NotConnected(_) => "NET_003",
            KisError::Deserialization(_) => "DATA_001",
            KisError::Decode(_) => "DATA_002",
            KisError::Config(_) => "CFG_001",
            KisError::InvalidParameter(_) => "CFG_002",
            KisError::Io(_) => "FILE_001",
            KisError::Cancelled(_) => "GEN_001",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vendor_code_table() {
        assert!(matches!(
            KisError::from_vendor_code("EGW00001", "invalid appkey"),
            KisError::Authentication { .. }
        ));
        assert!(matches!(
            KisError::from_vendor_code("EGW00123", "token expired"),
            KisError::TokenExpired { .. }
        ));
        assert!(matches!(
            KisError::from_vendor_code("EGW00201", "too many requests"),
            KisError::RateLimit(_)
        ));
        assert!(matches!(
            KisError::from_vendor_code("OPSP0001", "잔고 부족"),
            KisError::InsufficientBalance { .. }
        ));
        assert!(matches!(
            KisError::from_vendor_code("OPSP0010", "장 마감"),
            KisError::MarketClosed { .. }
        ));

        let unknown = KisError::from_vendor_code("UNKNOWN", "something");
        assert!(matches!(unknown, KisError::Api { .. }));
        assert_eq!(unknown.vendor_code(), Some("UNKNOWN"));
    }

    #[test]
    fn test_order_retag_keeps_specialized_kinds() {
        let generic = KisError::from_vendor_code("APBK0919", "주문 거부").into_order_error();
        assert!(matches!(generic, KisError::Order { .. }));
        assert!(generic.is_order_error());

        let balance = KisError::from_vendor_code("OPSP0001", "잔고 부족").into_order_error();
        assert!(matches!(balance, KisError::InsufficientBalance { .. }));

        let auth = KisError::from_vendor_code("EGW00001", "auth").into_order_error();
        assert!(auth.is_authentication());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(KisError::RateLimit("x".into()).error_code(), "API_001");
        assert!(KisError::RateLimit("x".into()).is_recoverable());
        assert!(!KisError::Cancelled("x".into()).is_recoverable());
    }
}
