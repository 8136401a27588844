//! The `get_address_by_postal_code` tool, backed by the zipcloud API.

use std::time::Duration;

use reqwest::{Client, Url};
use schemars::{JsonSchema, schema_for};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::tool::{Error as ToolError, Tool, ToolResult};

/// The public zipcloud search endpoint.
pub const ZIPCLOUD_BASE_URL: &str = "https://zipcloud.ibsnet.co.jp/api/search";

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Input of [`PostalCodeTool`].
#[derive(Deserialize, JsonSchema)]
pub struct PostalCodeParameters {
    #[schemars(
        description = "Japanese postal code, 7 digits with or without a hyphen."
    )]
    postal_code: String,
}

#[derive(Deserialize)]
struct ZipcloudResponse {
    status: u16,
    message: Option<String>,
    results: Option<Vec<Map<String, Value>>>,
}

/// Looks up the address of a Japanese postal code.
///
/// The tool never fails. Unknown codes, malformed codes and any trouble
/// talking to zipcloud all produce an empty mapping.
pub struct PostalCodeTool {
    client: Client,
    base_url: String,
    parameter_schema: Value,
}

impl PostalCodeTool {
    /// Creates a tool that queries the public zipcloud API.
    #[inline]
    pub fn new() -> Self {
        Self::with_base_url(ZIPCLOUD_BASE_URL)
    }

    /// Creates a tool that queries zipcloud at `base_url`.
    pub fn with_base_url<S: Into<String>>(base_url: S) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            parameter_schema: schema_for!(PostalCodeParameters).to_value(),
        }
    }
}

impl Default for PostalCodeTool {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Tool for PostalCodeTool {
    type Input = PostalCodeParameters;

    fn name(&self) -> &str {
        "get_address_by_postal_code"
    }

    fn description(&self) -> &str {
        r#"
Looks up the address of a Japanese postal code.
Returns the prefecture (address1), the city (address2), the town (address3)
and their kana readings, or an empty object if the code is unknown."#
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    #[allow(clippy::manual_async_fn)]
    fn execute(
        &self,
        input: PostalCodeParameters,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let client = self.client.clone();
        let base_url = self.base_url.clone();
        async move {
            let address = lookup(&client, &base_url, &input.postal_code).await;
            Ok(Value::Object(address))
        }
    }
}

async fn lookup(
    client: &Client,
    base_url: &str,
    postal_code: &str,
) -> Map<String, Value> {
    let Some(code) = normalize_postal_code(postal_code) else {
        debug!("malformed postal code: {postal_code:?}");
        return Map::new();
    };
    match fetch(client, base_url, &code).await {
        Ok(address) => address,
        Err(err) => {
            warn!("looking up {code} failed: {err}");
            Map::new()
        }
    }
}

/// Returns the 7 digits of a postal code written as `1000001` or
/// `100-0001`.
fn normalize_postal_code(postal_code: &str) -> Option<String> {
    let postal_code = postal_code.trim();
    let digits = match postal_code.split_once('-') {
        Some((head, tail)) if head.len() == 3 => format!("{head}{tail}"),
        Some(_) => return None,
        None => postal_code.to_owned(),
    };
    (digits.len() == 7 && digits.bytes().all(|b| b.is_ascii_digit()))
        .then_some(digits)
}

async fn fetch(
    client: &Client,
    base_url: &str,
    code: &str,
) -> Result<Map<String, Value>, ToolError> {
    let url = Url::parse_with_params(base_url, [("zipcode", code)])
        .map_err(|err| ToolError::execution_error().with_reason(err.to_string()))?;
    let resp = client
        .get(url)
        .timeout(LOOKUP_TIMEOUT)
        .send()
        .await
        .map_err(|err| ToolError::execution_error().with_reason(err.to_string()))?;
    let status = resp.status();
    if !status.is_success() {
        return Err(ToolError::execution_error()
            .with_reason(format!("zipcloud returned {status}")));
    }
    let body = resp
        .bytes()
        .await
        .map_err(|err| ToolError::execution_error().with_reason(err.to_string()))?;
    parse_lookup(&body)
}

/// Picks the first address out of a zipcloud response body.
fn parse_lookup(body: &[u8]) -> Result<Map<String, Value>, ToolError> {
    let resp: ZipcloudResponse = serde_json::from_slice(body)
        .map_err(|err| ToolError::execution_error().with_reason(err.to_string()))?;
    if resp.status != 200 {
        return Err(ToolError::execution_error().with_reason(format!(
            "zipcloud status {}: {}",
            resp.status,
            resp.message.unwrap_or_default()
        )));
    }
    Ok(resp
        .results
        .and_then(|results| results.into_iter().next())
        .unwrap_or_default())
}
