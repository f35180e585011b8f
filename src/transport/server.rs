//! TLS listener and request routing.
//!
//! Every accepted TCP stream goes through a TLS handshake and is then
//! served as HTTP/1.1 with upgrade support. `GET /ws` becomes the realtime
//! connection; everything else is answered by the JSON API.
//!
//! # Connection Flow
//!
//! 1. `Server::bind` binds the listener and fixes the advertised port
//! 2. `Server::run` announces [`ServerEvent::Started`] and accepts forever
//! 3. Each stream is handshaked on its own task; failures are logged at trace
//! 4. `/ws` checks token and pairing before answering `101 Switching Protocols`
//! 5. The upgraded stream takes the hub slot and runs the message loop

// ============================================================================
// Imports
// ============================================================================

use std::convert::Infallible;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use http_body_util::Full;
use hyper::body::{Body, Bytes};
use hyper::header::{
    CONNECTION, HeaderMap, HeaderName, HeaderValue, SEC_WEBSOCKET_ACCEPT, SEC_WEBSOCKET_KEY,
    SEC_WEBSOCKET_VERSION, UPGRADE,
};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::Role;
use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::events::ServerEvent;

use super::connection::Connection;
use super::http::{self, Credentials, HttpResponse};
use super::state::ServerState;

// ============================================================================
// Constants
// ============================================================================

/// Realtime endpoint path.
pub const WS_PATH: &str = "/ws";

/// Only WebSocket version accepted.
const WS_VERSION: &str = "13";

// ============================================================================
// Server
// ============================================================================

/// A bound TLS server.
pub struct Server {
    /// TCP listener.
    listener: TcpListener,
    /// TLS acceptor serving the host identity.
    acceptor: TlsAcceptor,
    /// Shared components.
    state: ServerState,
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("local_addr", &self.listener.local_addr().ok())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Server {
    /// Binds `addr` and prepares TLS with `tls`.
    ///
    /// Use port 0 to let the OS pick; the state then advertises the
    /// assigned port.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if binding fails.
    pub async fn bind(
        addr: SocketAddr,
        tls: rustls::ServerConfig,
        mut state: ServerState,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        state.port = listener.local_addr()?.port();

        debug!(%addr, port = state.port, "TLS server bound");

        Ok(Self {
            listener,
            acceptor: TlsAcceptor::from(Arc::new(tls)),
            state,
        })
    }

    /// Returns the local socket address.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the socket is gone.
    #[inline]
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Returns the shared state, with the bound port applied.
    #[inline]
    #[must_use]
    pub fn state(&self) -> &ServerState {
        &self.state
    }

    /// Accepts and serves connections until the task is dropped.
    pub async fn run(self) {
        let Self {
            listener,
            acceptor,
            state,
        } = self;

        let url = state.server_url();
        info!(%url, "Server listening");
        state.events.publish(ServerEvent::Started {
            url,
            pairing_url: state.pairing_url(),
            pair_code: state.authority.pair_code().to_string(),
        });

        loop {
            match listener.accept().await {
                Ok((stream, remote)) => {
                    tokio::spawn(serve_stream(
                        stream,
                        remote,
                        acceptor.clone(),
                        state.clone(),
                    ));
                }
                Err(e) => warn!(error = %e, "Accept failed"),
            }
        }
    }
}

/// Handshakes and serves one TCP stream.
async fn serve_stream(
    stream: TcpStream,
    remote: SocketAddr,
    acceptor: TlsAcceptor,
    state: ServerState,
) {
    let tls = match acceptor.accept(stream).await {
        Ok(tls) => tls,
        Err(e) => {
            // browsers probe and drop until the certificate is trusted
            trace!(%remote, error = %e, "TLS handshake failed");
            return;
        }
    };

    let service = service_fn(move |req| {
        let state = state.clone();
        async move { Ok::<_, Infallible>(route(&state, remote, req).await) }
    });

    if let Err(e) = http1::Builder::new()
        .serve_connection(TokioIo::new(tls), service)
        .with_upgrades()
        .await
    {
        warn!(%remote, error = %e, "HTTP connection error");
    }
}

// ============================================================================
// Routing
// ============================================================================

/// Routes one request to its handler.
pub async fn route<B>(state: &ServerState, remote: SocketAddr, req: Request<B>) -> HttpResponse
where
    B: Body + Send + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let creds = Credentials::from_parts(req.uri(), req.headers());
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    trace!(%remote, %method, %path, "Request");

    let result = match (path.as_str(), &method) {
        (WS_PATH, &Method::GET) => upgrade(state, remote, &creds, req),

        ("/api/pair", &Method::GET) => http::pair_state(state, &creds),
        ("/api/pair", &Method::POST) => {
            match gated_body(state.authority.require_token(&creds.token), req).await {
                Ok(body) => http::pair(state, &creds, &body),
                Err(e) => Err(e),
            }
        }

        ("/api/status", &Method::GET) => http::status(state, &creds),

        ("/api/config", &Method::GET) => http::config(state, &creds),
        ("/api/config", &Method::POST) => {
            match gated_body(http::require_paired(state, &creds), req).await {
                Ok(body) => http::update_config(state, &creds, &body),
                Err(e) => Err(e),
            }
        }

        (WS_PATH | "/api/pair" | "/api/status" | "/api/config", _) => Err(Error::MethodNotAllowed),
        _ => Err(Error::NotFound),
    };

    result.unwrap_or_else(|e| {
        if e.is_access_error() {
            info!(%remote, %path, status = %e.status_code(), error = %e, "Access refused");
        } else {
            debug!(%remote, %path, status = %e.status_code(), error = %e, "Request refused");
        }
        http::error_response(&e)
    })
}

/// Reads the body only once the access check `gate` has passed.
async fn gated_body<B>(gate: Result<()>, req: Request<B>) -> Result<Bytes>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    gate?;
    http::read_body(req.into_body()).await
}

// ============================================================================
// Realtime Upgrade
// ============================================================================

/// Answers a realtime upgrade and spawns the connection task.
///
/// # Errors
///
/// - [`Error::Unauthorized`] for a bad token
/// - [`Error::PairingRequired`] if the device is not paired
/// - [`Error::MalformedRequest`] if the request is not a WebSocket upgrade
fn upgrade<B>(
    state: &ServerState,
    remote: SocketAddr,
    creds: &Credentials,
    req: Request<B>,
) -> Result<HttpResponse>
where
    B: Body + Send + 'static,
{
    http::require_paired(state, creds)?;

    let key = websocket_key(req.headers())
        .ok_or_else(|| Error::malformed("websocket upgrade required"))?;
    let accept = HeaderValue::from_str(&derive_accept_key(key.as_bytes()))
        .map_err(|_| Error::malformed("invalid websocket key"))?;

    let state = state.clone();
    tokio::spawn(async move {
        match hyper::upgrade::on(req).await {
            Ok(upgraded) => {
                let ws =
                    WebSocketStream::from_raw_socket(TokioIo::new(upgraded), Role::Server, None)
                        .await;
                serve_realtime(&state, remote, ws).await;
            }
            Err(e) => warn!(%remote, error = %e, "WebSocket upgrade failed"),
        }
    });

    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
    let headers = response.headers_mut();
    headers.insert(UPGRADE, HeaderValue::from_static("websocket"));
    headers.insert(CONNECTION, HeaderValue::from_static("Upgrade"));
    headers.insert(SEC_WEBSOCKET_ACCEPT, accept);
    Ok(response)
}

/// Returns the client key if `headers` describe a WebSocket upgrade.
fn websocket_key(headers: &HeaderMap) -> Option<&str> {
    let has_token = |name: HeaderName, token: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| {
                v.split(',')
                    .any(|part| part.trim().eq_ignore_ascii_case(token))
            })
    };

    if !has_token(UPGRADE, "websocket") || !has_token(CONNECTION, "upgrade") {
        return None;
    }
    if headers
        .get(SEC_WEBSOCKET_VERSION)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        != Some(WS_VERSION)
    {
        return None;
    }

    headers
        .get(SEC_WEBSOCKET_KEY)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|key| !key.is_empty())
}

/// Owns an upgraded connection from hub accept to release.
async fn serve_realtime<S>(state: &ServerState, remote: SocketAddr, ws: WebSocketStream<S>)
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send,
{
    let (ticket, close_signal) = state.hub.accept(remote);
    info!(addr = %remote, "Phone connected");
    state
        .events
        .publish(ServerEvent::ClientConnected { addr: remote });

    let connection = Connection::new(ws, ticket.clone(), close_signal);
    let reason = connection.run(&state.dispatcher).await;

    state.hub.release(&ticket);
    info!(addr = %remote, ?reason, "Phone disconnected");
    state
        .events
        .publish(ServerEvent::ClientDisconnected { addr: remote });
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use chrono::Utc;
    use http_body_util::BodyExt;
    use serde_json::Value;

    use crate::config::{Settings, SettingsStore};
    use crate::events::EventBus;
    use crate::net::AddressResolver;
    use crate::protocol::{Mode, ProtocolDispatcher};
    use crate::services::{InputEvent, InputInjector, TextTransform};
    use crate::session::{Session, SessionAuthority};
    use crate::transport::hub::ConnectionHub;

    const TOKEN: &str = "00112233445566778899aabbccddeeff";

    struct Noop;

    impl InputInjector for Noop {
        fn inject(&self, _event: &InputEvent) -> Result<()> {
            Ok(())
        }
    }

    struct Offline;

    #[async_trait]
    impl TextTransform for Offline {
        fn is_available(&self) -> bool {
            false
        }

        async fn transform(&self, _text: &str, _mode: Mode) -> Result<String> {
            Err(Error::TransformUnavailable)
        }
    }

    fn state() -> ServerState {
        let transform: Arc<dyn TextTransform> = Arc::new(Offline);
        ServerState {
            port: 9527,
            started_at: Utc::now(),
            resolver: Arc::new(
                AddressResolver::system().with_override(Some("10.1.2.3".parse().expect("ip"))),
            ),
            authority: Arc::new(SessionAuthority::new(Session::with_secrets(TOKEN, "1234"))),
            hub: Arc::new(ConnectionHub::new()),
            settings: Arc::new(SettingsStore::from_parts(
                std::env::temp_dir().join("ginkgo-talk-unused.json"),
                Settings::default(),
            )),
            transform: transform.clone(),
            dispatcher: Arc::new(ProtocolDispatcher::new(transform, Arc::new(Noop))),
            events: EventBus::new(),
        }
    }

    fn remote() -> SocketAddr {
        "10.1.2.50:41000".parse().expect("addr")
    }

    fn request(method: Method, uri: &str) -> hyper::http::request::Builder {
        Request::builder().method(method).uri(uri)
    }

    fn empty(builder: hyper::http::request::Builder) -> Request<Full<Bytes>> {
        builder.body(Full::new(Bytes::new())).expect("request")
    }

    fn ws_request(uri: &str) -> Request<Full<Bytes>> {
        empty(
            request(Method::GET, uri)
                .header(UPGRADE, "websocket")
                .header(CONNECTION, "keep-alive, Upgrade")
                .header(SEC_WEBSOCKET_VERSION, "13")
                .header(SEC_WEBSOCKET_KEY, "dGhlIHNhbXBsZSBub25jZQ=="),
        )
    }

    async fn error_of(response: HttpResponse) -> String {
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();
        let body: Value = serde_json::from_slice(&bytes).expect("json");
        body["error"].as_str().expect("error field").to_string()
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let state = state();
        let response = route(&state, remote(), empty(request(Method::GET, "/nope"))).await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(error_of(response).await, "not found");
    }

    #[tokio::test]
    async fn test_wrong_method_is_405() {
        let state = state();

        for (method, uri) in [
            (Method::DELETE, "/api/pair"),
            (Method::POST, "/api/status"),
            (Method::PUT, "/api/config"),
            (Method::POST, "/ws"),
        ] {
            let response = route(&state, remote(), empty(request(method, uri))).await;
            assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED, "{uri}");
        }
    }

    #[tokio::test]
    async fn test_status_route_with_header_token() {
        let state = state();
        let req = empty(request(Method::GET, "/api/status").header(http::TOKEN_HEADER, TOKEN));

        let response = route(&state, remote(), req).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_pair_route_reads_body() {
        let state = state();
        let req = request(Method::POST, &format!("/api/pair?token={TOKEN}&device_id=p1"))
            .body(Full::new(Bytes::from_static(br#"{"code":"1234"}"#)))
            .expect("request");

        let response = route(&state, remote(), req).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(state.authority.pairing_state("p1").paired);
    }

    #[tokio::test]
    async fn test_access_checked_before_body_is_read() {
        let state = state();
        let oversized = Bytes::from(vec![b'x'; http::MAX_BODY_BYTES + 1]);

        let req = request(Method::POST, "/api/pair?token=wrong&device_id=p1")
            .body(Full::new(oversized.clone()))
            .expect("request");
        let response = route(&state, remote(), req).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let req = request(Method::POST, &format!("/api/config?token={TOKEN}&device_id=p1"))
            .body(Full::new(oversized.clone()))
            .expect("request");
        let response = route(&state, remote(), req).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let req = request(Method::POST, &format!("/api/pair?token={TOKEN}&device_id=p1"))
            .body(Full::new(oversized))
            .expect("request");
        let response = route(&state, remote(), req).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_ws_refused_before_upgrade() {
        let state = state();

        let response = route(&state, remote(), ws_request("/ws?token=wrong&device_id=p1")).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = route(&state, remote(), ws_request(&format!("/ws?token={TOKEN}&device_id=p1"))).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(error_of(response).await, "pair required");
    }

    #[tokio::test]
    async fn test_ws_without_upgrade_headers_is_400() {
        let state = state();
        state.authority.pair("p1", "1234").expect("pair");

        let uri = format!("/ws?token={TOKEN}&device_id=p1");
        let response = route(&state, remote(), empty(request(Method::GET, &uri))).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_ws_upgrade_response() {
        let state = state();
        state.authority.pair("p1", "1234").expect("pair");

        let uri = format!("/ws?token={TOKEN}&device_id=p1");
        let response = route(&state, remote(), ws_request(&uri)).await;

        assert_eq!(response.status(), StatusCode::SWITCHING_PROTOCOLS);
        assert_eq!(
            response.headers().get(SEC_WEBSOCKET_ACCEPT).expect("accept"),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn test_websocket_key_requires_version_13() {
        let mut headers = HeaderMap::new();
        headers.insert(UPGRADE, HeaderValue::from_static("WebSocket"));
        headers.insert(CONNECTION, HeaderValue::from_static("Upgrade"));
        headers.insert(SEC_WEBSOCKET_KEY, HeaderValue::from_static("abc"));
        headers.insert(SEC_WEBSOCKET_VERSION, HeaderValue::from_static("8"));
        assert_eq!(websocket_key(&headers), None);

        headers.insert(SEC_WEBSOCKET_VERSION, HeaderValue::from_static("13"));
        assert_eq!(websocket_key(&headers), Some("abc"));
    }
}
