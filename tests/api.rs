//! End-to-end tests over real TLS.
//!
//! Each test binds a server on `127.0.0.1:0` with a freshly generated
//! identity and talks to it the way the phone does.

// ============================================================================
// Imports
// ============================================================================

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, ServerName};
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use ginkgo_talk::config::{Settings, SettingsStore, SETTINGS_FILE};
use ginkgo_talk::identity::{Identity, IdentityManager};
use ginkgo_talk::net::AddressResolver;
use ginkgo_talk::{
    Error, InputEvent, InputInjector, Mode, Result, Server, ServerState, Session, TextTransform,
};

// ============================================================================
// Fixtures
// ============================================================================

const TOKEN: &str = "0f1e2d3c4b5a69788796a5b4c3d2e1f0";
const CODE: &str = "2468";

#[derive(Default)]
struct Recorder(Mutex<Vec<InputEvent>>);

impl InputInjector for Recorder {
    fn inject(&self, event: &InputEvent) -> Result<()> {
        self.0.lock().push(event.clone());
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

struct Harness {
    _dir: TempDir,
    addr: SocketAddr,
    identity: Identity,
    recorder: Arc<Recorder>,
    http: reqwest::Client,
    task: JoinHandle<()>,
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl Harness {
    async fn start() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let identity = IdentityManager::new(dir.path())
            .obtain("127.0.0.1")
            .expect("identity");
        let recorder = Arc::new(Recorder::default());
        let settings = Arc::new(SettingsStore::from_parts(
            dir.path().join(SETTINGS_FILE),
            Settings::default(),
        ));

        let state = ServerState::with_session(
            0,
            AddressResolver::system().with_override(Some(Ipv4Addr::LOCALHOST)),
            settings,
            Arc::new(Offline),
            recorder.clone(),
            Session::with_secrets(TOKEN, CODE),
        );
        let server = Server::bind(
            SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
            identity.server_config().expect("tls config"),
            state,
        )
        .await
        .expect("bind");
        let addr = server.local_addr().expect("addr");
        let task = tokio::spawn(server.run());

        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .expect("client");

        Self {
            _dir: dir,
            addr,
            identity,
            recorder,
            http,
            task,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("https://{}{}", self.addr, path)
    }

    async fn get(&self, path: &str) -> (u16, Value) {
        let response = self.http.get(self.url(path)).send().await.expect("send");
        let status = response.status().as_u16();
        (status, response.json().await.expect("json"))
    }

    async fn post(&self, path: &str, body: Value) -> (u16, Value) {
        let response = self
            .http
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .expect("send");
        let status = response.status().as_u16();
        (status, response.json().await.expect("json"))
    }

    async fn pair(&self, device_id: &str) {
        let (status, _) = self
            .post(
                &format!("/api/pair?token={TOKEN}"),
                json!({ "code": CODE, "deviceId": device_id }),
            )
            .await;
        assert_eq!(status, 200);
    }

    /// Opens a WebSocket trusting only the server's own certificate.
    async fn connect_ws(&self, device_id: &str) -> WebSocketStream<TlsStream<TcpStream>> {
        let cert = CertificateDer::from_pem_slice(self.identity.cert_pem().as_bytes())
            .expect("cert pem");
        let mut roots = rustls::RootCertStore::empty();
        roots.add(cert).expect("root");

        let config = rustls::ClientConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .expect("versions")
        .with_root_certificates(roots)
        .with_no_client_auth();

        let tcp = TcpStream::connect(self.addr).await.expect("tcp");
        let name = ServerName::try_from("127.0.0.1").expect("server name");
        let tls = TlsConnector::from(Arc::new(config))
            .connect(name, tcp)
            .await
            .expect("tls");

        let url = format!(
            "wss://{}/ws?token={TOKEN}&device_id={device_id}",
            self.addr
        );
        let (ws, _) = tokio_tungstenite::client_async(url, tls)
            .await
            .expect("upgrade");
        ws
    }
}

async fn next_json(ws: &mut WebSocketStream<TlsStream<TcpStream>>) -> Value {
    loop {
        match ws.next().await.expect("frame").expect("ok frame") {
            WsMessage::Text(text) => return serde_json::from_str(text.as_str()).expect("json"),
            WsMessage::Close(_) => panic!("unexpected close"),
            _ => {}
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_status_requires_token() {
    let harness = Harness::start().await;

    let (status, body) = harness.get("/api/status").await;
    assert_eq!(status, 401);
    assert_eq!(body, json!({ "error": "unauthorized" }));

    let response = harness
        .http
        .get(harness.url("/api/status"))
        .header("X-GTalk-Token", TOKEN)
        .send()
        .await
        .expect("send");
    assert_eq!(response.status().as_u16(), 200);

    let body: Value = response.json().await.expect("json");
    assert_eq!(body["connected"], false);
    assert_eq!(body["aiAvailable"], false);
    assert_eq!(body["pairRequired"], true);
    assert_eq!(
        body["serverAddr"],
        format!("https://127.0.0.1:{}", harness.addr.port())
    );
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let harness = Harness::start().await;

    let (status, body) = harness.get("/api/nothing").await;
    assert_eq!(status, 404);
    assert_eq!(body["error"], "not found");
}

#[tokio::test]
async fn test_pairing_gates_config() {
    let harness = Harness::start().await;
    let config = format!("/api/config?token={TOKEN}&device_id=phone-a");

    let (status, body) = harness.get(&config).await;
    assert_eq!(status, 403);
    assert_eq!(body["error"], "pair required");

    let (status, body) = harness
        .post(
            &format!("/api/pair?token={TOKEN}&device_id=phone-a"),
            json!({ "code": "0000" }),
        )
        .await;
    assert_eq!(status, 403);
    assert_eq!(body["error"], "invalid pair code");

    harness.pair("phone-a").await;

    let (status, body) = harness.get(&config).await;
    assert_eq!(status, 200);
    assert_eq!(body["apiKey"], "");
    assert_eq!(body["aiAvailable"], false);

    let (status, _) = harness
        .get(&format!("/api/config?token={TOKEN}&device_id=phone-b"))
        .await;
    assert_eq!(status, 403);
}

#[tokio::test]
async fn test_config_update_round_trip() {
    let harness = Harness::start().await;
    harness.pair("phone-a").await;
    let config = format!("/api/config?token={TOKEN}&device_id=phone-a");

    let (status, body) = harness
        .post(&config, json!({ "lanIp": "not-an-ip" }))
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "invalid lanIp");

    let (status, body) = harness
        .post(
            &config,
            json!({ "apiKey": " sk-abcdefghijklmnop ", "model": "deepseek-reasoner" }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["ok"], true);
    assert_eq!(body["model"], "deepseek-reasoner");

    let (_, body) = harness.get(&config).await;
    assert_eq!(body["apiKey"], "sk-a****mnop");
}

#[tokio::test]
async fn test_ws_refused_without_pairing() {
    let harness = Harness::start().await;

    let (status, _) = harness
        .get(&format!("/ws?token={TOKEN}&device_id=phone-a"))
        .await;
    assert_eq!(status, 403);

    let (status, _) = harness.get("/ws?token=nope&device_id=phone-a").await;
    assert_eq!(status, 401);
}

#[tokio::test]
async fn test_ws_text_is_typed_and_acked() {
    let harness = Harness::start().await;
    harness.pair("phone-a").await;

    let mut ws = harness.connect_ws("phone-a").await;
    ws.send(WsMessage::Text(
        r#"{"type":"text","text":"hello","mode":"tidy"}"#.into(),
    ))
    .await
    .expect("send");

    assert_eq!(
        next_json(&mut ws).await,
        json!({ "type": "ack", "text": "hello", "original": "hello", "mode": "tidy", "status": "sent" })
    );
    assert_eq!(
        harness.recorder.0.lock()[0],
        InputEvent::Type("hello".into())
    );

    let response = harness
        .http
        .get(harness.url(&format!("/api/status?token={TOKEN}")))
        .send()
        .await
        .expect("send");
    let body: Value = response.json().await.expect("json");
    assert_eq!(body["connected"], true);
}

#[tokio::test]
async fn test_second_connection_supersedes_first() {
    let harness = Harness::start().await;
    harness.pair("phone-a").await;

    let mut first = harness.connect_ws("phone-a").await;
    let mut second = harness.connect_ws("phone-a").await;

    let closed = loop {
        match first.next().await {
            Some(Ok(WsMessage::Close(_))) | None | Some(Err(_)) => break true,
            Some(Ok(_)) => {}
        }
    };
    assert!(closed);

    second
        .send(WsMessage::Text(r#"{"type":"command","text":"clear"}"#.into()))
        .await
        .expect("send");
    assert_eq!(
        next_json(&mut second).await,
        json!({ "type": "ack", "status": "cleared" })
    );
}
