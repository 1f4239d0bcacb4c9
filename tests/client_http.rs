use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::{json, Value};
use server_manager::{
    watch, NewServer, RemoteError, ServerApi, ServerClient, ServerService, StalePolicy, Status,
    TracingNotifier,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

#[derive(Clone, Default)]
struct Backend {
    saved: Arc<Mutex<Vec<Value>>>,
    pings: Arc<AtomicUsize>,
    lists: Arc<AtomicUsize>,
    failing_lists: usize,
}

fn server_json(id: i64, ip: &str, status: &str) -> Value {
    json!({
        "id": id,
        "name": format!("server-{}", id),
        "ipAddress": ip,
        "memory": "16 GB",
        "type": "Linux",
        "imageUrl": format!("http://images/{}.png", id),
        "status": status,
    })
}

fn envelope(message: &str, data: Value) -> Value {
    json!({
        "timeStamp": chrono::Utc::now().naive_utc(),
        "statusCode": 200,
        "status": "OK",
        "message": message,
        "data": data,
    })
}

async fn list_servers(State(backend): State<Backend>) -> Response {
    let attempt = backend.lists.fetch_add(1, Ordering::SeqCst);
    if attempt < backend.failing_lists {
        return (StatusCode::SERVICE_UNAVAILABLE, "starting up").into_response();
    }
    Json(envelope(
        "Servers retrieved",
        json!({ "servers": [
            server_json(1, "10.0.0.1", "SERVER_DOWN"),
            server_json(2, "10.0.0.2", "SERVER_UP"),
        ]}),
    ))
    .into_response()
}

async fn ping_server(State(backend): State<Backend>, Path(ip): Path<String>) -> Response {
    backend.pings.fetch_add(1, Ordering::SeqCst);
    match ip.as_str() {
        "0.0.0.0" => (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response(),
        "garbage" => (StatusCode::OK, "not json").into_response(),
        _ => {
            let id: i64 = ip
                .rsplit('.')
                .next()
                .and_then(|last| last.parse().ok())
                .unwrap_or(0);
            Json(envelope(
                "Ping success",
                json!({ "server": server_json(id, &ip, "SERVER_UP") }),
            ))
            .into_response()
        }
    }
}

async fn save_server(State(backend): State<Backend>, Json(body): Json<Value>) -> Json<Value> {
    backend.saved.lock().unwrap().push(body.clone());
    let mut server = body;
    server["id"] = json!(42);
    Json(envelope("Server created", json!({ "server": server })))
}

async fn delete_server(Path(id): Path<i64>) -> Response {
    if id == 404 {
        let mut body = envelope("Server not found", json!({}));
        body["statusCode"] = json!(404);
        return (StatusCode::NOT_FOUND, Json(body)).into_response();
    }
    Json(envelope("Server deleted", json!({ "deleted": true }))).into_response()
}

async fn spawn_backend() -> anyhow::Result<(String, Backend)> {
    spawn_backend_with(Backend::default()).await
}

async fn spawn_backend_with(backend: Backend) -> anyhow::Result<(String, Backend)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let app = Router::new()
        .route("/server/list", get(list_servers))
        .route("/server/ping/:ip", get(ping_server))
        .route("/server/save", post(save_server))
        .route("/server/delete/:id", delete(delete_server))
        .with_state(backend.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("http://{addr}/"), backend))
}

fn client(base_url: &str) -> ServerClient {
    ServerClient::new(base_url, Duration::from_secs(5), 2).unwrap()
}

#[tokio::test]
async fn list_decodes_envelope() -> anyhow::Result<()> {
    let (url, _) = spawn_backend().await?;
    let client = client(&url);
    assert!(!client.base_url().ends_with('/'));

    let response = client.list().await?;

    assert_eq!(response.status_code, 200);
    assert_eq!(response.message, "Servers retrieved");
    let ids: Vec<i64> = response.servers().iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![1, 2]);
    assert_eq!(response.servers()[0].status, Status::Down);
    Ok(())
}

#[tokio::test]
async fn ping_uses_address_in_path() -> anyhow::Result<()> {
    let (url, backend) = spawn_backend().await?;

    let response = client(&url).ping("10.0.0.7").await?;

    let server = response.data.server.expect("single record");
    assert_eq!(server.id, 7);
    assert_eq!(server.ip_address, "10.0.0.7");
    assert_eq!(server.status, Status::Up);
    assert_eq!(backend.pings.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn save_posts_candidate_without_id() -> anyhow::Result<()> {
    let (url, backend) = spawn_backend().await?;
    let candidate = NewServer {
        name: "edge".into(),
        ip_address: "192.168.1.9".into(),
        status: Status::Down,
        kind: "Router".into(),
        image_url: "http://images/edge.png".into(),
    };

    let response = client(&url).save(&candidate).await?;

    let saved = backend.saved.lock().unwrap().clone();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0]["ipAddress"], "192.168.1.9");
    assert_eq!(saved[0]["status"], "SERVER_DOWN");
    assert!(saved[0].get("id").is_none());
    let server = response.data.server.expect("created record");
    assert_eq!(server.id, 42);
    assert_eq!(server.name, "edge");
    Ok(())
}

#[tokio::test]
async fn non_success_status_uses_envelope_message() -> anyhow::Result<()> {
    let (url, _) = spawn_backend().await?;

    let err = client(&url).delete(404).await.unwrap_err();

    match &err {
        RemoteError::Status { code, message } => {
            assert_eq!(*code, 404);
            assert_eq!(message, "Server not found");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.detail(), "404 - Server not found");
    assert!(client(&url).delete(3).await.is_ok());
    Ok(())
}

#[tokio::test]
async fn non_success_status_falls_back_to_raw_body() -> anyhow::Result<()> {
    let (url, _) = spawn_backend().await?;

    let err = client(&url).ping("0.0.0.0").await.unwrap_err();

    assert_eq!(err.detail(), "500 - boom");
    Ok(())
}

#[tokio::test]
async fn success_with_invalid_body_is_a_decode_error() -> anyhow::Result<()> {
    let (url, _) = spawn_backend().await?;

    let err = client(&url).ping("garbage").await.unwrap_err();

    assert!(matches!(err, RemoteError::Decode(_)));
    assert!(err.detail().contains("not json"));
    Ok(())
}

#[tokio::test]
async fn unreachable_backend_is_a_transport_error() -> anyhow::Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);

    let err = client(&format!("http://{addr}")).list().await.unwrap_err();

    assert!(matches!(err, RemoteError::Transport(_)));
    Ok(())
}

#[tokio::test]
async fn sweep_refreshes_every_record() -> anyhow::Result<()> {
    let (url, backend) = spawn_backend().await?;
    let (service, _states) = ServerService::new(
        Arc::new(client(&url)),
        Arc::new(TracingNotifier),
        StalePolicy::LastCompletionWins,
    );

    assert!(!service.list().await.is_error());
    let ids: Vec<i64> = service.snapshot().servers().iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![2, 1]);

    let failures = watch::sweep(&service).await;

    assert_eq!(failures, 0);
    assert_eq!(backend.pings.load(Ordering::SeqCst), 2);
    let snapshot = service.snapshot();
    let ids: Vec<i64> = snapshot.servers().iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![2, 1]);
    assert!(snapshot.servers().iter().all(|s| s.status == Status::Up));
    Ok(())
}

#[tokio::test]
async fn watch_runs_until_shutdown() -> anyhow::Result<()> {
    let (url, backend) = spawn_backend().await?;
    let (service, mut states) = ServerService::new(
        Arc::new(client(&url)),
        Arc::new(TracingNotifier),
        StalePolicy::LastCompletionWins,
    );
    let service = Arc::new(service);

    watch::run(
        service.clone(),
        Duration::from_millis(20),
        tokio::time::sleep(Duration::from_millis(300)),
    )
    .await;

    assert!(backend.pings.load(Ordering::SeqCst) >= 2);
    let mut emitted = 0;
    while let Ok(state) = states.try_recv() {
        assert!(!state.is_error());
        emitted += 1;
    }
    // List plus at least one sweep of two pings, two states each.
    assert!(emitted >= 6);
    assert_eq!(emitted % 2, 0);
    Ok(())
}

#[tokio::test]
async fn truncated_error_body_keeps_status_code() -> anyhow::Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        if let Ok((mut socket, _)) = listener.accept().await {
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            // Promises more body than it sends, then hangs up.
            let response: &[u8] = b"HTTP/1.1 503 Service Unavailable\r\n\
                content-length: 100\r\n\r\nshort";
            let _ = socket.write_all(response).await;
        }
    });

    let err = client(&format!("http://{addr}")).list().await.unwrap_err();

    match err {
        RemoteError::Status { code, message } => {
            assert_eq!(code, 503);
            assert_eq!(message, "Service Unavailable");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn watch_retries_startup_list_until_backend_answers() -> anyhow::Result<()> {
    let (url, backend) = spawn_backend_with(Backend {
        failing_lists: 2,
        ..Backend::default()
    })
    .await?;
    let (service, mut states) = ServerService::new(
        Arc::new(client(&url)),
        Arc::new(TracingNotifier),
        StalePolicy::LastCompletionWins,
    );
    let service = Arc::new(service);

    watch::run(
        service.clone(),
        Duration::from_millis(20),
        tokio::time::sleep(Duration::from_millis(300)),
    )
    .await;

    assert_eq!(backend.lists.load(Ordering::SeqCst), 3);
    assert!(backend.pings.load(Ordering::SeqCst) >= 2);
    let ids: Vec<i64> = service.snapshot().servers().iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![2, 1]);

    let mut errors = 0;
    while let Ok(state) = states.try_recv() {
        if state.is_error() {
            errors += 1;
        }
    }
    assert_eq!(errors, 2);
    Ok(())
}
