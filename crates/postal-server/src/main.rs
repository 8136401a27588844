//! Serves `get_address_by_postal_code` at `http://$POSTAL_SERVER_ADDR/mcp`.

#[macro_use]
extern crate tracing;

use std::env;

use tokio::net::TcpListener;
use tool_chat_postal_server::tool::Toolbox;
use tool_chat_postal_server::{McpServer, PostalCodeTool, ZIPCLOUD_BASE_URL};

const DEFAULT_ADDR: &str = "127.0.0.1:8000";

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let addr =
        env::var("POSTAL_SERVER_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_owned());
    let zipcloud_url = env::var("ZIPCLOUD_BASE_URL")
        .unwrap_or_else(|_| ZIPCLOUD_BASE_URL.to_owned());

    let toolbox =
        Toolbox::new().with_tool(PostalCodeTool::with_base_url(zipcloud_url));
    let router = McpServer::new("postal-server", toolbox)
        .with_instructions("Looks up Japanese addresses by postal code.")
        .into_router();

    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err) => {
            eprintln!("cannot listen on {addr}: {err}");
            return;
        }
    };
    info!("listening on http://{addr}/mcp");

    let result = axum::serve(listener, router)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("shutting down");
        })
        .await;
    if let Err(err) = result {
        error!("server error: {err}");
    }
}
