#[cfg(test)]
mod tests;

use async_trait::async_trait;
use mime::Mime;
use reqwest::{Client, RequestBuilder, Response, StatusCode, header};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tool_chat_sse::{Chunks, Sse};
use tracing::Instrument;

use crate::rpc::{
    CallToolParams, Implementation, InitializeParams, InitializeResult,
    JsonRpcError, JsonRpcRequest, JsonRpcResponse, ListToolsParams,
    ListToolsResult, PROTOCOL_VERSION, PROTOCOL_VERSION_HEADER, RpcId,
    SESSION_ID_HEADER,
};
use crate::{Error, ToolDescriptor, ToolGateway, ToolResult};

const ACCEPT_BOTH: &str = "application/json, text/event-stream";

/// A tool gateway reached over streamable HTTP.
///
/// The gateway holds no connection between operations. Every call runs
/// the `initialize` handshake, performs its operation, and then ends the
/// session, so a hanging server only ever blocks the current call.
#[derive(Clone, Debug)]
pub struct HttpGateway {
    client: Client,
    endpoint: String,
    client_info: Implementation,
}

impl HttpGateway {
    /// Creates a gateway for the given endpoint URL.
    #[inline]
    pub fn new<S: Into<String>>(endpoint: S) -> Self {
        Self::with_client(Client::new(), endpoint)
    }

    /// Creates a gateway that sends requests with `client`.
    #[inline]
    pub fn with_client<S: Into<String>>(client: Client, endpoint: S) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            client_info: Implementation {
                name: env!("CARGO_PKG_NAME").to_owned(),
                version: env!("CARGO_PKG_VERSION").to_owned(),
            },
        }
    }

    /// Returns the endpoint URL.
    #[inline]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn connect(&self) -> Result<Connection<'_>, Error> {
        let mut conn = Connection {
            gateway: self,
            session_id: None,
            protocol_version: None,
            next_id: 0,
        };
        match conn.handshake().await {
            Ok(()) => Ok(conn),
            Err(err) => {
                // The server may have opened a session before failing.
                conn.close().await;
                Err(err)
            }
        }
    }
}

#[async_trait]
impl ToolGateway for HttpGateway {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, Error> {
        let mut conn = self.connect().await?;
        let result = conn.list_tools().await;
        conn.close().await;
        result
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<ToolResult, Error> {
        let span = debug_span!("gateway call", tool = name);
        async move {
            let mut conn = self.connect().await?;
            let result = conn.call_tool(name, arguments).await;
            conn.close().await;
            result
        }
        .instrument(span)
        .await
    }
}

/// One session with the gateway, from `initialize` to `close`.
struct Connection<'a> {
    gateway: &'a HttpGateway,
    session_id: Option<String>,
    protocol_version: Option<String>,
    next_id: i64,
}

impl Connection<'_> {
    /// Runs `initialize` and confirms it with `notifications/initialized`.
    async fn handshake(&mut self) -> Result<(), Error> {
        let params = InitializeParams {
            protocol_version: PROTOCOL_VERSION.to_owned(),
            capabilities: Map::new(),
            client_info: self.gateway.client_info.clone(),
        };
        let result: InitializeResult = self
            .request("initialize", &params)
            .await?
            .map_err(|err| rpc_error(Error::connection(), "initialize", err))?;
        debug!(
            "connected to {} {} (protocol {}, session {:?})",
            result.server_info.name,
            result.server_info.version,
            result.protocol_version,
            self.session_id,
        );
        self.protocol_version = Some(result.protocol_version);
        self.notify("notifications/initialized").await
    }

    async fn list_tools(&mut self) -> Result<Vec<ToolDescriptor>, Error> {
        let mut tools = vec![];
        let mut params = ListToolsParams::default();
        loop {
            let page: ListToolsResult = self
                .request("tools/list", &params)
                .await?
                .map_err(|err| rpc_error(Error::protocol(), "tools/list", err))?;
            tools.extend(page.tools);

            match page.next_cursor {
                Some(cursor) if params.cursor.as_ref() == Some(&cursor) => {
                    return Err(Error::protocol()
                        .with_reason(format!("cursor `{cursor}` repeated")));
                }
                Some(cursor) => params.cursor = Some(cursor),
                None => break,
            }
        }
        debug!("listed {} tools", tools.len());
        Ok(tools)
    }

    async fn call_tool(
        &mut self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<ToolResult, Error> {
        let params = CallToolParams {
            name: name.to_owned(),
            arguments,
        };
        let result: ToolResult =
            self.request("tools/call", &params).await?.map_err(|err| {
                rpc_error(Error::tool_invocation(), "tools/call", err)
            })?;
        if result.is_error {
            return Err(Error::tool_invocation().with_reason(format!(
                "tool `{name}` failed: {}",
                result.to_text()
            )));
        }
        Ok(result)
    }

    /// Ends the session. Failures only get logged, the operation result is
    /// what callers care about.
    async fn close(self) {
        let Some(session_id) = self.session_id else {
            return;
        };
        let resp = self
            .gateway
            .client
            .delete(&self.gateway.endpoint)
            .header(SESSION_ID_HEADER, &session_id)
            .send()
            .await;
        match resp {
            Ok(resp)
                if resp.status().is_success()
                    || resp.status() == StatusCode::METHOD_NOT_ALLOWED =>
            {
                trace!("session {session_id} closed");
            }
            Ok(resp) => {
                warn!("closing session {session_id} got {}", resp.status());
            }
            Err(err) => warn!("closing session {session_id} failed: {err}"),
        }
    }

    /// Sends a request and waits for the response with the same id.
    ///
    /// The outer `Result` reports transport and decoding failures, the
    /// inner one the JSON-RPC error the server answered with.
    async fn request<P: Serialize, R: DeserializeOwned>(
        &mut self,
        method: &str,
        params: &P,
    ) -> Result<Result<R, JsonRpcError>, Error> {
        self.next_id += 1;
        let id = RpcId::Number(self.next_id);
        let params = serde_json::to_value(params).map_err(|err| {
            Error::protocol().with_reason(format!("bad params: {err}"))
        })?;
        let request = JsonRpcRequest::new(id.clone(), method, Some(params));
        trace!("sending {method} ({id:?})");

        let resp = self.post(&request).send().await.map_err(|err| {
            Error::connection().with_reason(format!("{method}: {err}"))
        })?;
        let resp = check_status(resp, method)?;
        if let Some(session_id) = resp
            .headers()
            .get(SESSION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            self.session_id.get_or_insert_with(|| session_id.to_owned());
        }

        let response = read_response(resp, &id).await?;
        match (response.result, response.error) {
            (_, Some(err)) => Ok(Err(err)),
            (Some(result), None) => serde_json::from_value(result)
                .map(Ok)
                .map_err(|err| {
                    Error::protocol()
                        .with_reason(format!("bad {method} result: {err}"))
                }),
            (None, None) => Err(Error::protocol()
                .with_reason(format!("{method} response has no result"))),
        }
    }

    async fn notify(&self, method: &str) -> Result<(), Error> {
        let notification = JsonRpcRequest::notification(method);
        let resp = self.post(&notification).send().await.map_err(|err| {
            Error::connection().with_reason(format!("{method}: {err}"))
        })?;
        check_status(resp, method)?;
        Ok(())
    }

    fn post(&self, body: &JsonRpcRequest) -> RequestBuilder {
        let mut builder = self
            .gateway
            .client
            .post(&self.gateway.endpoint)
            .header(header::ACCEPT, ACCEPT_BOTH)
            .json(body);
        if let Some(session_id) = &self.session_id {
            builder = builder.header(SESSION_ID_HEADER, session_id);
        }
        if let Some(version) = &self.protocol_version {
            builder = builder.header(PROTOCOL_VERSION_HEADER, version);
        }
        builder
    }
}

#[inline]
fn check_status(resp: Response, method: &str) -> Result<Response, Error> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let error = if status == StatusCode::NOT_FOUND {
        // Either a wrong endpoint or a session the server forgot about.
        Error::connection()
    } else {
        Error::protocol()
    };
    Err(error.with_reason(format!("{method}: HTTP status {status}")))
}

#[inline]
fn rpc_error(error: Error, method: &str, err: JsonRpcError) -> Error {
    error.with_reason(format!("{method}: {} ({})", err.message, err.code))
}

async fn read_response(
    resp: Response,
    id: &RpcId,
) -> Result<JsonRpcResponse, Error> {
    let content_type = resp
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<Mime>().ok());
    match content_type {
        Some(m) if m.subtype() == mime::EVENT_STREAM => {
            read_event_stream(Chunks::from_response(resp), id).await
        }
        Some(m) if m.subtype() == mime::JSON => {
            let body = resp.bytes().await.map_err(|err| {
                Error::connection().with_reason(format!("{err}"))
            })?;
            let response: JsonRpcResponse = serde_json::from_slice(&body)
                .map_err(|err| {
                    Error::protocol().with_reason(format!("{err}"))
                })?;
            check_response_id(response, id)
        }
        other => Err(Error::protocol()
            .with_reason(format!("unexpected content type: {other:?}"))),
    }
}

/// Reads events until the response to `id` shows up. Server notifications
/// and requests in between are skipped.
async fn read_event_stream(
    chunks: Chunks,
    id: &RpcId,
) -> Result<JsonRpcResponse, Error> {
    let mut sse = Sse::new(chunks);
    loop {
        let event = sse
            .next_event()
            .await
            .map_err(|err| Error::connection().with_reason(format!("{err:?}")))?
            .ok_or_else(|| {
                Error::protocol().with_reason("stream ended without a response")
            })?;
        let message: Value = serde_json::from_str(&event)
            .map_err(|err| Error::protocol().with_reason(format!("{err}")))?;
        let is_response = message.get("method").is_none()
            && (message.get("result").is_some()
                || message.get("error").is_some());
        if !is_response {
            trace!("skipping server message: {event}");
            continue;
        }
        let response: JsonRpcResponse = serde_json::from_value(message)
            .map_err(|err| Error::protocol().with_reason(format!("{err}")))?;
        if response.id.as_ref() == Some(id) {
            return Ok(response);
        }
        warn!("skipping response to another request: {:?}", response.id);
    }
}

#[inline]
fn check_response_id(
    response: JsonRpcResponse,
    id: &RpcId,
) -> Result<JsonRpcResponse, Error> {
    if response.id.as_ref() != Some(id) {
        return Err(Error::protocol().with_reason(format!(
            "expected response to {id:?}, got {:?}",
            response.id
        )));
    }
    Ok(response)
}
