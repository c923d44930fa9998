use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::Router;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::Mutex as AsyncMutex;

use talks_client::{
    ClientConfig, IceCandidate, SessionDescription, TalkScript, TalksApi, TalksClient, TalksError,
};

const CREDENTIAL: &str = "Basic dGVzdDp0ZXN0";

#[derive(Debug, Clone)]
struct Recorded {
    method: Method,
    path: String,
    headers: HeaderMap,
    body: Value,
}

#[derive(Default)]
struct StubState {
    requests: Vec<Recorded>,
    responses: VecDeque<(StatusCode, String)>,
}

#[derive(Clone, Default)]
struct Stub {
    state: Arc<AsyncMutex<StubState>>,
}

impl Stub {
    async fn respond_with(&self, status: StatusCode, body: impl Into<String>) {
        self.state
            .lock()
            .await
            .responses
            .push_back((status, body.into()));
    }

    async fn requests(&self) -> Vec<Recorded> {
        self.state.lock().await.requests.clone()
    }
}

async fn record(
    State(stub): State<Stub>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, String) {
    let mut guard = stub.state.lock().await;
    guard.requests.push(Recorded {
        method,
        path: uri.path().to_string(),
        headers,
        body: serde_json::from_slice(&body).unwrap_or(Value::Null),
    });
    guard
        .responses
        .pop_front()
        .unwrap_or((StatusCode::OK, String::new()))
}

async fn spawn_stub(stub: Stub) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind stub");
    let addr = listener.local_addr().expect("stub addr");
    let app = Router::new().fallback(record).with_state(stub);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

fn client(base_url: String) -> TalksClient {
    TalksClient::new(ClientConfig {
        base_url,
        authorization: Some(CREDENTIAL.to_string()),
        request_timeout: Duration::from_secs(5),
    })
    .expect("client")
}

fn stream_body() -> String {
    json!({
        "id": "strm_1",
        "offer": { "type": "offer", "sdp": "v=0\r\no=- 1 2 IN IP4 127.0.0.1\r\n" },
        "ice_servers": [
            { "urls": "stun:stun.l.google.com:19302" },
            { "urls": ["turn:turn.example:3478?transport=udp"], "username": "u", "credential": "c" }
        ],
        "session_id": "tok_1"
    })
    .to_string()
}

#[tokio::test]
async fn create_stream_posts_source_and_decodes_session() {
    let stub = Stub::default();
    stub.respond_with(StatusCode::CREATED, stream_body()).await;
    let api = client(spawn_stub(stub.clone()).await);

    let stream = api
        .create_stream("https://example.com/avatar.jpg")
        .await
        .expect("create stream");
    assert_eq!(stream.id, "strm_1");
    assert_eq!(stream.session_id, "tok_1");
    assert_eq!(stream.offer.sdp_type, "offer");
    assert_eq!(stream.ice_servers.len(), 2);
    assert_eq!(
        stream.ice_servers[0].urls,
        vec!["stun:stun.l.google.com:19302".to_string()]
    );
    assert_eq!(stream.ice_servers[1].username.as_deref(), Some("u"));

    let requests = stub.requests().await;
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.method, Method::POST);
    assert_eq!(request.path, "/talks/streams");
    assert_eq!(request.body, json!({ "source_url": "https://example.com/avatar.jpg" }));
    assert_eq!(request.headers["accept"], "application/json");
    assert_eq!(request.headers["content-type"], "application/json");
    assert_eq!(request.headers["authorization"], CREDENTIAL);
}

#[tokio::test]
async fn create_stream_reports_server_errors() {
    let stub = Stub::default();
    stub.respond_with(StatusCode::INTERNAL_SERVER_ERROR, "boom")
        .await;
    let api = client(spawn_stub(stub).await);

    let err = api.create_stream("src").await.expect_err("server error");
    match err {
        TalksError::RemoteServer { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body, "boom");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn create_stream_distinguishes_empty_and_malformed_bodies() {
    let stub = Stub::default();
    stub.respond_with(StatusCode::OK, "").await;
    stub.respond_with(StatusCode::OK, r#"{"id":"strm_1"}"#).await;
    let api = client(spawn_stub(stub).await);

    let empty = api.create_stream("src").await.expect_err("empty body");
    assert!(matches!(empty, TalksError::EmptyResponse), "{empty:?}");

    let malformed = api.create_stream("src").await.expect_err("bad schema");
    assert!(matches!(malformed, TalksError::Decode(_)), "{malformed:?}");
}

#[tokio::test]
async fn send_answer_uses_session_token_for_correlation() {
    let stub = Stub::default();
    let api = client(spawn_stub(stub.clone()).await);

    api.send_answer("strm_1", "tok_1", &SessionDescription::new("answer", "v=0"))
        .await
        .expect("answer accepted");

    let requests = stub.requests().await;
    assert_eq!(requests[0].path, "/talks/streams/strm_1/sdp");
    assert_eq!(
        requests[0].body,
        json!({ "answer": { "type": "answer", "sdp": "v=0" }, "session_id": "tok_1" })
    );
}

#[tokio::test]
async fn only_http_200_counts_as_accepted() {
    let stub = Stub::default();
    stub.respond_with(StatusCode::CREATED, "").await;
    stub.respond_with(StatusCode::BAD_REQUEST, "nope").await;
    let api = client(spawn_stub(stub).await);

    let err = api
        .send_answer("strm_1", "tok_1", &SessionDescription::new("answer", "v=0"))
        .await
        .expect_err("201 is not accepted");
    assert_eq!(err.status(), Some(201));

    let candidate = IceCandidate {
        candidate: "candidate:1 1 udp 1 10.0.0.2 5000 typ host".into(),
        sdp_mid: Some("0".into()),
        sdp_mline_index: Some(0),
    };
    let err = api
        .send_ice_candidate("strm_1", &candidate)
        .await
        .expect_err("400 is not accepted");
    assert_eq!(err.status(), Some(400));
}

#[tokio::test]
async fn send_ice_candidate_is_keyed_by_stream_id() {
    let stub = Stub::default();
    let api = client(spawn_stub(stub.clone()).await);

    let candidate = IceCandidate {
        candidate: "candidate:2 1 udp 1686052607 203.0.113.7 61000 typ srflx".into(),
        sdp_mid: Some("1".into()),
        sdp_mline_index: Some(1),
    };
    api.send_ice_candidate("strm_1", &candidate)
        .await
        .expect("candidate accepted");

    let requests = stub.requests().await;
    assert_eq!(requests[0].path, "/talks/streams/strm_1/ice");
    assert_eq!(
        requests[0].body,
        json!({
            "candidate": "candidate:2 1 udp 1686052607 203.0.113.7 61000 typ srflx",
            "sdpMid": "1",
            "sdpMLineIndex": 1,
            "session_id": "strm_1"
        })
    );
}

#[tokio::test]
async fn start_and_delete_target_the_stream_resource() {
    let stub = Stub::default();
    let api = client(spawn_stub(stub.clone()).await);

    api.start_talk("strm_1", "tok_1", &TalkScript::text("hello there"))
        .await
        .expect("talk started");
    api.delete_stream("strm_1", "tok_1")
        .await
        .expect("stream deleted");

    let requests = stub.requests().await;
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].method, Method::POST);
    assert_eq!(requests[0].path, "/talks/streams/strm_1");
    assert_eq!(
        requests[0].body,
        json!({ "script": { "type": "text", "input": "hello there" }, "session_id": "tok_1" })
    );
    assert_eq!(requests[1].method, Method::DELETE);
    assert_eq!(requests[1].path, "/talks/streams/strm_1");
    assert_eq!(requests[1].body, json!({ "session_id": "tok_1" }));
}

#[tokio::test]
async fn unreachable_service_is_a_network_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    let api = client(format!("http://{addr}"));

    let err = api.create_stream("src").await.expect_err("refused");
    assert!(matches!(err, TalksError::Network(_)), "{err:?}");
}
