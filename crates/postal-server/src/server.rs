use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::Serialize;
use serde_json::{Value, json};
use tool_chat_gateway::rpc::{
    CallToolParams, Implementation, InitializeParams, InitializeResult,
    JsonRpcRequest, JsonRpcResponse, ListToolsResult, PROTOCOL_VERSION,
    RpcId, SESSION_ID_HEADER, error_codes,
};
use tool_chat_gateway::{ToolContent, ToolResult};
use uuid::Uuid;

use crate::tool::Toolbox;

/// Serves a [`Toolbox`] over streamable HTTP at `/mcp`.
///
/// Every `initialize` opens a session whose id the client must send back
/// in the `mcp-session-id` header. Requests for unknown sessions get a
/// `404`, and `DELETE /mcp` ends a session. Responses are always plain
/// JSON, the server never opens an event stream.
pub struct McpServer {
    info: Implementation,
    instructions: Option<String>,
    toolbox: Toolbox,
    sessions: Mutex<HashSet<String>>,
}

impl McpServer {
    /// Creates a server that identifies itself as `name`.
    pub fn new<S: Into<String>>(name: S, toolbox: Toolbox) -> Self {
        Self {
            info: Implementation {
                name: name.into(),
                version: env!("CARGO_PKG_VERSION").to_owned(),
            },
            instructions: None,
            toolbox,
            sessions: Mutex::default(),
        }
    }

    /// Sets the instructions sent to clients during the handshake.
    #[inline]
    pub fn with_instructions<S: Into<String>>(mut self, instructions: S) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Returns the number of open sessions.
    #[inline]
    pub fn session_count(&self) -> usize {
        self.lock_sessions().len()
    }

    /// Wraps the server into a router.
    pub fn into_router(self) -> Router {
        Self::router(Arc::new(self))
    }

    /// Creates a router sharing `server`, so the caller can keep looking
    /// at it.
    pub fn router(server: Arc<Self>) -> Router {
        Router::new()
            .route("/mcp", post(handle_post).delete(handle_delete))
            .with_state(server)
    }

    #[inline]
    fn lock_sessions(&self) -> MutexGuard<'_, HashSet<String>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn initialize(&self, id: Option<RpcId>, params: Option<Value>) -> Response {
        let params: InitializeParams =
            match serde_json::from_value(params.unwrap_or(Value::Null)) {
                Ok(params) => params,
                Err(err) => {
                    return invalid_params(id, err);
                }
            };
        let session_id = Uuid::new_v4().to_string();
        info!(
            "new session {session_id} for {} {} (protocol {})",
            params.client_info.name,
            params.client_info.version,
            params.protocol_version
        );
        self.lock_sessions().insert(session_id.clone());

        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_owned(),
            capabilities: json!({ "tools": { "listChanged": false } })
                .as_object()
                .cloned()
                .unwrap_or_default(),
            server_info: self.info.clone(),
            instructions: self.instructions.clone(),
        };
        let mut resp = success(id, &result);
        if let Ok(value) = HeaderValue::from_str(&session_id) {
            resp.headers_mut().insert(SESSION_ID_HEADER, value);
        }
        resp
    }

    async fn dispatch(
        &self,
        id: RpcId,
        method: &str,
        params: Option<Value>,
    ) -> Response {
        match method {
            "ping" => success(Some(id), &json!({})),
            "tools/list" => {
                let result = ListToolsResult {
                    tools: self.toolbox.descriptors(),
                    next_cursor: None,
                };
                success(Some(id), &result)
            }
            "tools/call" => self.call_tool(id, params).await,
            _ => {
                debug!("unknown method: {method}");
                error(
                    Some(id),
                    error_codes::METHOD_NOT_FOUND,
                    format!("Method not found: {method}"),
                )
            }
        }
    }

    async fn call_tool(&self, id: RpcId, params: Option<Value>) -> Response {
        let params: CallToolParams =
            match serde_json::from_value(params.unwrap_or(Value::Null)) {
                Ok(params) => params,
                Err(err) => return invalid_params(Some(id), err),
            };
        let name = params.name;
        let Some(fut) =
            self.toolbox.execute(&name, Value::Object(params.arguments))
        else {
            warn!("unknown tool: {name}");
            return error(
                Some(id),
                error_codes::INVALID_PARAMS,
                format!("Unknown tool: {name}"),
            );
        };

        let result = match fut.await {
            Ok(value) => ToolResult {
                content: vec![ToolContent::Text {
                    text: value.to_string(),
                }],
                structured_content: Some(value).filter(Value::is_object),
                is_error: false,
            },
            Err(err) => {
                debug!("tool {name} failed: {err}");
                ToolResult {
                    content: vec![ToolContent::Text {
                        text: err.to_string(),
                    }],
                    structured_content: None,
                    is_error: true,
                }
            }
        };
        success(Some(id), &result)
    }
}

async fn handle_post(
    State(server): State<Arc<McpServer>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request: JsonRpcRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => {
            debug!("unparsable request: {err}");
            let resp = JsonRpcResponse::error(
                None,
                error_codes::PARSE_ERROR,
                format!("Parse error: {err}"),
            );
            return (StatusCode::BAD_REQUEST, Json(resp)).into_response();
        }
    };
    trace!("got {} ({:?})", request.method, request.id);

    if request.method == "initialize" {
        return server.initialize(request.id, request.params);
    }
    if let Err(status) = check_session(&server, &headers) {
        return status.into_response();
    }
    let Some(id) = request.id else {
        // Notifications need no answer.
        return StatusCode::ACCEPTED.into_response();
    };
    server.dispatch(id, &request.method, request.params).await
}

async fn handle_delete(
    State(server): State<Arc<McpServer>>,
    headers: HeaderMap,
) -> StatusCode {
    let Some(session_id) = session_id(&headers) else {
        return StatusCode::BAD_REQUEST;
    };
    if server.lock_sessions().remove(session_id) {
        debug!("session {session_id} closed");
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    }
}

#[inline]
fn session_id(headers: &HeaderMap) -> Option<&str> {
    headers.get(SESSION_ID_HEADER).and_then(|v| v.to_str().ok())
}

fn check_session(
    server: &McpServer,
    headers: &HeaderMap,
) -> Result<(), StatusCode> {
    let Some(session_id) = session_id(headers) else {
        return Err(StatusCode::BAD_REQUEST);
    };
    if !server.lock_sessions().contains(session_id) {
        debug!("unknown session: {session_id}");
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(())
}

fn success<T: Serialize>(id: Option<RpcId>, result: &T) -> Response {
    match serde_json::to_value(result) {
        Ok(result) => Json(JsonRpcResponse::success(id, result)).into_response(),
        Err(err) => error(id, error_codes::INTERNAL_ERROR, err.to_string()),
    }
}

#[inline]
fn error(id: Option<RpcId>, code: i64, message: String) -> Response {
    Json(JsonRpcResponse::error(id, code, message)).into_response()
}

#[inline]
fn invalid_params(id: Option<RpcId>, err: serde_json::Error) -> Response {
    error(
        id,
        error_codes::INVALID_PARAMS,
        format!("Invalid params: {err}"),
    )
}
