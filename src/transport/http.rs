//! JSON API handlers.
//!
//! | Route | Method | Gate | Purpose |
//! |-------|--------|------|---------|
//! | `/api/pair` | GET | token | Pairing state of the caller |
//! | `/api/pair` | POST | token | Claim the pairing slot with the pair code |
//! | `/api/status` | GET | token | Connection, AI and pairing status |
//! | `/api/config` | GET | token + pairing | Transform settings, key masked |
//! | `/api/config` | POST | token + pairing | Partial settings update |
//!
//! Credentials come from the query string (`token`, `device_id`) or from
//! the `X-GTalk-Token` / `X-GTalk-Device` headers. Errors are answered as
//! `{"error": "..."}` with the matching status code.

// ============================================================================
// Imports
// ============================================================================

use http_body_util::{BodyExt, Full, Limited};
use hyper::body::{Body, Bytes};
use hyper::header::{CACHE_CONTROL, CONTENT_TYPE, HeaderMap, HeaderValue};
use hyper::{Response, StatusCode, Uri};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{info, warn};

use crate::config::{ConfigPatch, SettingsUpdate};
use crate::error::{Error, Result};
use crate::events::ServerEvent;
use crate::session::format_timestamp;

use super::state::ServerState;

// ============================================================================
// Constants
// ============================================================================

/// Header carrying the bearer token.
pub const TOKEN_HEADER: &str = "x-gtalk-token";

/// Header carrying the device identifier.
pub const DEVICE_HEADER: &str = "x-gtalk-device";

/// Largest accepted request body.
pub const MAX_BODY_BYTES: usize = 64 * 1024;

/// Response type shared by every handler.
pub type HttpResponse = Response<Full<Bytes>>;

// ============================================================================
// Credentials
// ============================================================================

/// Token and device id presented with a request.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// Bearer token, empty if absent.
    pub token: String,
    /// Device identifier, empty if absent.
    pub device_id: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("device_id", &self.device_id)
            .finish_non_exhaustive()
    }
}

impl Credentials {
    /// Extracts credentials; the query string wins over headers.
    #[must_use]
    pub fn from_parts(uri: &Uri, headers: &HeaderMap) -> Self {
        let mut token = String::new();
        let mut device_id = String::new();

        if let Some(query) = uri.query() {
            for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
                match key.as_ref() {
                    "token" if token.is_empty() => token = value.trim().to_string(),
                    "device_id" if device_id.is_empty() => device_id = value.trim().to_string(),
                    _ => {}
                }
            }
        }

        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.trim().to_string())
                .unwrap_or_default()
        };
        if token.is_empty() {
            token = header(TOKEN_HEADER);
        }
        if device_id.is_empty() {
            device_id = header(DEVICE_HEADER);
        }

        Self { token, device_id }
    }
}

// ============================================================================
// Response Bodies
// ============================================================================

/// Body of `GET /api/pair`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PairStateBody {
    paired: bool,
    pair_required: bool,
    pair_expires_at: String,
}

/// Body of a successful `POST /api/pair`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PairedBody<'a> {
    ok: bool,
    paired: bool,
    pair_required: bool,
    pair_expires_at: String,
    token: &'a str,
}

/// Body of `GET /api/status`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusBody {
    connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_addr: Option<String>,
    server_addr: String,
    started_at: String,
    ai_available: bool,
    paired: bool,
    pair_required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pair_expires_at: Option<String>,
}

/// Body of `POST /api/pair`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PairRequest {
    #[serde(default)]
    code: String,
    #[serde(default)]
    device_id: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// `GET /api/pair`.
///
/// # Errors
///
/// Returns [`Error::Unauthorized`] for a bad token.
pub fn pair_state(state: &ServerState, creds: &Credentials) -> Result<HttpResponse> {
    state.authority.require_token(&creds.token)?;

    let pairing = state.authority.pairing_state(&creds.device_id);
    Ok(json_response(
        StatusCode::OK,
        &PairStateBody {
            paired: pairing.paired,
            pair_required: !pairing.paired,
            pair_expires_at: pairing.expires_at_rfc3339(),
        },
    ))
}

/// `POST /api/pair`.
///
/// # Errors
///
/// - [`Error::Unauthorized`] for a bad token
/// - [`Error::MalformedRequest`] for an undecodable body
/// - [`Error::PairingRejected`] for a missing device id or wrong code
pub fn pair(state: &ServerState, creds: &Credentials, body: &[u8]) -> Result<HttpResponse> {
    state.authority.require_token(&creds.token)?;

    let request: PairRequest = decode_body(body)?;
    let device_id = if creds.device_id.is_empty() {
        request.device_id.trim().to_string()
    } else {
        creds.device_id.clone()
    };

    let expires_at = state.authority.pair(&device_id, request.code.trim())?;
    state.events.publish(ServerEvent::DevicePaired {
        device_id,
        expires_at,
    });

    Ok(json_response(
        StatusCode::OK,
        &PairedBody {
            ok: true,
            paired: true,
            pair_required: false,
            pair_expires_at: format_timestamp(expires_at),
            token: state.authority.token(),
        },
    ))
}

/// `GET /api/status`.
///
/// # Errors
///
/// Returns [`Error::Unauthorized`] for a bad token.
pub fn status(state: &ServerState, creds: &Credentials) -> Result<HttpResponse> {
    state.authority.require_token(&creds.token)?;

    let current = state.hub.current();
    let pairing = state.authority.pairing_state(&creds.device_id);

    Ok(json_response(
        StatusCode::OK,
        &StatusBody {
            connected: current.is_some(),
            client_addr: current.map(|ticket| ticket.remote_addr.to_string()),
            server_addr: state.server_url(),
            started_at: state.started_at_rfc3339(),
            ai_available: state.transform.is_available(),
            paired: pairing.paired,
            pair_required: !pairing.paired,
            pair_expires_at: pairing.expires_at.map(format_timestamp),
        },
    ))
}

/// `GET /api/config`.
///
/// # Errors
///
/// - [`Error::Unauthorized`] for a bad token
/// - [`Error::PairingRequired`] if the device is not paired
pub fn config(state: &ServerState, creds: &Credentials) -> Result<HttpResponse> {
    require_paired(state, creds)?;

    let settings = state.settings.snapshot();
    Ok(json_response(
        StatusCode::OK,
        &json!({
            "apiKey": settings.masked_api_key(),
            "baseUrl": settings.base_url,
            "model": settings.model,
            "lanIp": state.lan_override(),
            "aiAvailable": state.transform.is_available(),
        }),
    ))
}

/// `POST /api/config`.
///
/// The whole update is validated before anything is applied.
///
/// # Errors
///
/// - [`Error::Unauthorized`] for a bad token
/// - [`Error::PairingRequired`] if the device is not paired
/// - [`Error::MalformedRequest`] for an undecodable body
/// - [`Error::InvalidLanAddress`] for a bad `lanIp`
pub fn update_config(state: &ServerState, creds: &Credentials, body: &[u8]) -> Result<HttpResponse> {
    require_paired(state, creds)?;

    let patch: ConfigPatch = decode_body(body)?;
    let update = SettingsUpdate::try_from(patch)?;

    if let Some(lan) = update.lan_ip {
        state.resolver.set_override(lan);
    }
    let settings = state.settings.apply(update);
    info!(device_id = %creds.device_id, "Settings updated from client");
    state.events.publish(ServerEvent::SettingsChanged);

    Ok(json_response(
        StatusCode::OK,
        &json!({
            "ok": true,
            "aiAvailable": state.transform.is_available(),
            "model": settings.model,
            "baseUrl": settings.base_url,
            "lanIp": state.lan_override(),
        }),
    ))
}

/// Token check followed by pairing check.
///
/// # Errors
///
/// - [`Error::Unauthorized`] for a bad token
/// - [`Error::PairingRequired`] if the device is not paired
pub fn require_paired(state: &ServerState, creds: &Credentials) -> Result<()> {
    state.authority.require_token(&creds.token)?;
    state.authority.require_pairing(&creds.device_id)?;
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

/// Reads a request body, refusing anything over [`MAX_BODY_BYTES`].
///
/// # Errors
///
/// Returns [`Error::MalformedRequest`] if the body is too large or unreadable.
pub async fn read_body<B>(body: B) -> Result<Bytes>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    Limited::new(body, MAX_BODY_BYTES)
        .collect()
        .await
        .map(|collected| collected.to_bytes())
        .map_err(|e| {
            warn!(error = %e, "Failed to read request body");
            Error::malformed("invalid request")
        })
}

fn decode_body<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    serde_json::from_slice(body).map_err(|_| Error::malformed("invalid request"))
}

/// Serializes `body` as a JSON response.
#[must_use]
pub fn json_response<T: Serialize + ?Sized>(status: StatusCode, body: &T) -> HttpResponse {
    let (status, bytes) = match serde_json::to_vec(body) {
        Ok(bytes) => (status, bytes),
        Err(e) => {
            warn!(error = %e, "Failed to serialize response");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                br#"{"error":"internal error"}"#.to_vec(),
            )
        }
    };

    let mut response = Response::new(Full::new(Bytes::from(bytes)));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

/// Answers `error` as `{"error": "..."}` with its status code.
#[must_use]
pub fn error_response(error: &Error) -> HttpResponse {
    let status = error.status_code();
    let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
        "internal error".to_string()
    } else {
        error.to_string()
    };
    json_response(status, &json!({ "error": message }))
}

// ============================================================================
// Tests
// ============================================================================
