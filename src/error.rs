//! Error types for the remote-input bridge.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use ginkgo_talk::{Result, SessionAuthority};
//!
//! fn example(authority: &SessionAuthority, device: &str, code: &str) -> Result<()> {
//!     let expires_at = authority.pair(device, code)?;
//!     println!("paired until {expires_at}");
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Access | [`Error::Unauthorized`], [`Error::PairingRequired`], [`Error::PairingRejected`] |
//! | Request | [`Error::MalformedRequest`], [`Error::NotFound`], [`Error::MethodNotAllowed`], [`Error::InvalidLanAddress`] |
//! | Collaborators | [`Error::Transform`], [`Error::TransformUnavailable`], [`Error::Injection`] |
//! | Startup | [`Error::Identity`], [`Error::Settings`] |
//! | Connection | [`Error::ConnectionClosed`], [`Error::WebSocket`], [`Error::Http`], [`Error::Tls`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::Certificate`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use hyper::StatusCode;
use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Access Errors
    // ========================================================================
    /// Missing or incorrect bearer token.
    ///
    /// Never retried automatically.
    #[error("unauthorized")]
    Unauthorized,

    /// Token is valid but the device does not hold the pairing slot.
    #[error("pair required")]
    PairingRequired,

    /// Pair attempt refused (wrong code or missing device id).
    #[error("{reason}")]
    PairingRejected {
        /// Why the attempt was refused.
        reason: String,
        /// Whether the refusal is a bad request rather than a bad secret.
        bad_request: bool,
    },

    // ========================================================================
    // Request Errors
    // ========================================================================
    /// Undecodable request or message body.
    #[error("{message}")]
    MalformedRequest {
        /// Description of what could not be decoded.
        message: String,
    },

    /// Unknown route.
    #[error("not found")]
    NotFound,

    /// Known route, unsupported method.
    #[error("method not allowed")]
    MethodNotAllowed,

    /// LAN address override is not a valid IPv4 address.
    #[error("invalid lanIp")]
    InvalidLanAddress {
        /// The rejected value.
        value: String,
    },

    // ========================================================================
    // Collaborator Errors
    // ========================================================================
    /// Text transform service failed.
    ///
    /// Surfaced to the client as `ai_error`; never retried.
    #[error("{message}")]
    Transform {
        /// Failure description from the transform client.
        message: String,
    },

    /// Text transform service has no API key configured.
    #[error("AI not configured: set an API key first")]
    TransformUnavailable,

    /// Host input injection failed.
    ///
    /// Surfaced to the client as `error`; partial sequences are possible.
    #[error("{message}")]
    Injection {
        /// Failure description from the injector backend.
        message: String,
    },

    // ========================================================================
    // Startup Errors
    // ========================================================================
    /// TLS identity could not be generated. Fatal at startup.
    #[error("Identity error: {message}")]
    Identity {
        /// Description of the identity failure.
        message: String,
    },

    /// Persisted settings could not be written.
    #[error("Settings error: {message}")]
    Settings {
        /// Description of the settings failure.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Realtime connection closed while writing.
    #[error("Connection closed")]
    ConnectionClosed,

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// HTTP serving error.
    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    /// TLS configuration error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Certificate generation or parsing error.
    #[error("Certificate error: {0}")]
    Certificate(#[from] rcgen::Error),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a pairing rejection for a wrong pair code.
    #[inline]
    pub fn invalid_pair_code() -> Self {
        Self::PairingRejected {
            reason: "invalid pair code".into(),
            bad_request: false,
        }
    }

    /// Creates a pairing rejection for a missing device id.
    #[inline]
    pub fn missing_device_id() -> Self {
        Self::PairingRejected {
            reason: "missing device id".into(),
            bad_request: true,
        }
    }

    /// Creates a malformed request error.
    #[inline]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedRequest {
            message: message.into(),
        }
    }

    /// Creates an invalid LAN address error.
    #[inline]
    pub fn invalid_lan_address(value: impl Into<String>) -> Self {
        Self::InvalidLanAddress {
            value: value.into(),
        }
    }

    /// Creates a transform service error.
    #[inline]
    pub fn transform(message: impl Into<String>) -> Self {
        Self::Transform {
            message: message.into(),
        }
    }

    /// Creates an injection error.
    #[inline]
    pub fn injection(message: impl Into<String>) -> Self {
        Self::Injection {
            message: message.into(),
        }
    }

    /// Creates an identity error.
    #[inline]
    pub fn identity(message: impl Into<String>) -> Self {
        Self::Identity {
            message: message.into(),
        }
    }

    /// Creates a settings error.
    #[inline]
    pub fn settings(message: impl Into<String>) -> Self {
        Self::Settings {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this error refuses access to a gated resource.
    #[inline]
    #[must_use]
    pub fn is_access_error(&self) -> bool {
        matches!(
            self,
            Self::Unauthorized | Self::PairingRequired | Self::PairingRejected { .. }
        )
    }

    /// Returns `true` if this error ends a realtime connection.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::ConnectionClosed | Self::WebSocket(_) | Self::Http(_) | Self::Io(_)
        )
    }

    /// HTTP status used when this error answers an API request.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::PairingRequired => StatusCode::FORBIDDEN,
            Self::PairingRejected { bad_request, .. } => {
                if *bad_request {
                    StatusCode::BAD_REQUEST
                } else {
                    StatusCode::FORBIDDEN
                }
            }
            Self::MalformedRequest { .. } | Self::InvalidLanAddress { .. } | Self::Json(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
