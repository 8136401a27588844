use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use bytes::Bytes;
use serde_json::{Value, json};

use super::*;
use crate::ErrorKind;

#[derive(Default)]
struct FakeServer {
    log: Mutex<Vec<String>>,
    reject_initialized: bool,
}

impl FakeServer {
    fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

fn json_response(id: Option<RpcId>, result: Value) -> Response {
    let body = serde_json::to_string(&JsonRpcResponse::success(id, result))
        .unwrap();
    (
        [
            (header::CONTENT_TYPE, "application/json"),
            (header::HeaderName::from_static(SESSION_ID_HEADER), "s-1"),
        ],
        body,
    )
        .into_response()
}

fn sse_response(messages: &[Value]) -> Response {
    let mut body = String::new();
    for message in messages {
        body.push_str(&format!("event: message\ndata: {message}\n\n"));
    }
    axum::http::Response::builder()
        .header(header::CONTENT_TYPE, "text/event-stream")
        .body(Body::from(body))
        .unwrap()
}

async fn handle_post(
    State(server): State<Arc<FakeServer>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let request: JsonRpcRequest = serde_json::from_str(&body).unwrap();
    server.log.lock().unwrap().push(request.method.clone());

    if request.method != "initialize"
        && headers.get(SESSION_ID_HEADER).and_then(|v| v.to_str().ok())
            != Some("s-1")
    {
        return StatusCode::NOT_FOUND.into_response();
    }
    if request.id.is_none() {
        if server.reject_initialized {
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
        return StatusCode::ACCEPTED.into_response();
    }

    let params = request.params.unwrap_or(Value::Null);
    match request.method.as_str() {
        "initialize" => json_response(
            request.id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": {} },
                "serverInfo": { "name": "fake", "version": "0.1.0" }
            }),
        ),
        "tools/list" => {
            let page = match params.get("cursor").and_then(Value::as_str) {
                None => json!({
                    "tools": [{
                        "name": "echo",
                        "description": "Echoes its input",
                        "inputSchema": { "type": "object" }
                    }],
                    "nextCursor": "2"
                }),
                Some("2") => json!({
                    "tools": [{
                        "name": "fail",
                        "inputSchema": { "type": "object" }
                    }]
                }),
                Some(_) => json!({ "tools": [], "nextCursor": "loop" }),
            };
            json_response(request.id, page)
        }
        "tools/call" => match params["name"].as_str() {
            Some("echo") => sse_response(&[
                json!({
                    "jsonrpc": "2.0",
                    "method": "notifications/progress",
                    "params": { "progress": 1 }
                }),
                serde_json::to_value(JsonRpcResponse::success(
                    request.id,
                    json!({
                        "content": [{
                            "type": "text",
                            "text": params["arguments"].to_string()
                        }]
                    }),
                ))
                .unwrap(),
            ]),
            Some("fail") => json_response(
                request.id,
                json!({
                    "content": [{ "type": "text", "text": "boom" }],
                    "isError": true
                }),
            ),
            _ => {
                let body = serde_json::to_string(&JsonRpcResponse::error(
                    request.id,
                    crate::rpc::error_codes::INVALID_PARAMS,
                    "Unknown tool",
                ))
                .unwrap();
                ([(header::CONTENT_TYPE, "application/json")], body)
                    .into_response()
            }
        },
        _ => StatusCode::BAD_REQUEST.into_response(),
    }
}

async fn handle_delete(
    State(server): State<Arc<FakeServer>>,
    headers: HeaderMap,
) -> StatusCode {
    let session_id = headers
        .get(SESSION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    server.log.lock().unwrap().push(format!("DELETE {session_id}"));
    StatusCode::OK
}

async fn spawn_server() -> (Arc<FakeServer>, HttpGateway) {
    spawn_fake(FakeServer::default()).await
}

async fn spawn_fake(server: FakeServer) -> (Arc<FakeServer>, HttpGateway) {
    let server = Arc::new(server);
    let app = Router::new()
        .route("/mcp", post(handle_post).delete(handle_delete))
        .with_state(server.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (server, HttpGateway::new(format!("http://{addr}/mcp")))
}

#[tokio::test]
async fn test_list_tools_follows_pages() {
    let (server, gateway) = spawn_server().await;

    let tools = gateway.list_tools().await.unwrap();
    let names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, ["echo", "fail"]);
    assert_eq!(tools[0].description, "Echoes its input");
    assert_eq!(tools[1].description, "");

    assert_eq!(
        server.log(),
        [
            "initialize",
            "notifications/initialized",
            "tools/list",
            "tools/list",
            "DELETE s-1",
        ]
    );
}

#[tokio::test]
async fn test_call_tool_over_event_stream() {
    let (server, gateway) = spawn_server().await;

    let mut arguments = Map::new();
    arguments.insert("postal_code".to_owned(), json!("1000001"));
    let result = gateway.call_tool("echo", arguments).await.unwrap();
    assert_eq!(result.to_text(), r#"{"postal_code":"1000001"}"#);
    assert!(!result.is_error);

    assert_eq!(
        server.log(),
        [
            "initialize",
            "notifications/initialized",
            "tools/call",
            "DELETE s-1",
        ]
    );
}

#[tokio::test]
async fn test_unknown_tool() {
    let (server, gateway) = spawn_server().await;

    let err = gateway.call_tool("nope", Map::new()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ToolInvocation);
    assert!(err.reason().contains("Unknown tool"));
    // The session is released even though the call failed.
    assert_eq!(server.log().last().map(String::as_str), Some("DELETE s-1"));
}

#[tokio::test]
async fn test_failed_handshake_releases_session() {
    let (server, gateway) = spawn_fake(FakeServer {
        reject_initialized: true,
        ..FakeServer::default()
    })
    .await;

    let err = gateway.list_tools().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Protocol);
    assert_eq!(
        server.log(),
        ["initialize", "notifications/initialized", "DELETE s-1"]
    );
}

#[tokio::test]
async fn test_tool_reported_failure() {
    let (_server, gateway) = spawn_server().await;

    let err = gateway.call_tool("fail", Map::new()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ToolInvocation);
    assert!(err.reason().contains("boom"));
}

#[tokio::test]
async fn test_unreachable_gateway() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let gateway = HttpGateway::new(format!("http://{addr}/mcp"));
    let err = gateway.list_tools().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);
}

#[tokio::test]
async fn test_event_stream_selects_matching_id() {
    let chunks = VecDeque::from([
        Bytes::from_static(
            b"data: {\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{\"stale\":true}}\n\n",
        ),
        Bytes::from_static(b"data: {\"jsonrpc\":\"2.0\",\"id\":2,"),
        Bytes::from_static(b"\"result\":{\"ok\":true}}\n\n"),
    ]);
    let response = read_event_stream(
        Chunks::from_vec_deque(chunks),
        &RpcId::Number(2),
    )
    .await
    .unwrap();
    assert_eq!(response.result, Some(json!({ "ok": true })));
}

#[tokio::test]
async fn test_event_stream_without_response() {
    let chunks = VecDeque::from([Bytes::from_static(
        b"data: {\"jsonrpc\":\"2.0\",\"method\":\"notifications/message\"}\n\n",
    )]);
    let err = read_event_stream(Chunks::from_vec_deque(chunks), &RpcId::Number(1))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Protocol);
}
