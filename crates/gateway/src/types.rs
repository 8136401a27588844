use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Describes a tool exposed by the gateway.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    /// Name of the tool.
    pub name: String,
    /// Human-readable description of the tool.
    #[serde(default)]
    pub description: String,
    /// JSON schema describing the accepted arguments.
    pub input_schema: Value,
}

/// A content block in a tool result.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolContent {
    /// Plain text.
    Text {
        /// The text.
        text: String,
    },
    /// Base64 encoded image data.
    #[serde(rename_all = "camelCase")]
    Image {
        /// The encoded image.
        data: String,
        /// MIME type of the image.
        mime_type: String,
    },
    /// An embedded resource.
    Resource {
        /// The resource, kept as received.
        resource: Value,
    },
    /// Any content type this client doesn't know about.
    #[serde(other)]
    Unsupported,
}

/// What the gateway returns for one tool call.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    /// Content blocks of the result.
    #[serde(default)]
    pub content: Vec<ToolContent>,
    /// Structured output, if the tool provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<Value>,
    /// Whether the tool reported a failure.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl ToolResult {
    /// Creates a successful result with one text block.
    #[inline]
    pub fn text<S: Into<String>>(text: S) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            structured_content: None,
            is_error: false,
        }
    }

    /// Renders the result as text for the transcript.
    ///
    /// Text blocks are joined with line feeds. Structured content is used
    /// only when there are no content blocks at all.
    pub fn to_text(&self) -> String {
        if self.content.is_empty() {
            return self
                .structured_content
                .as_ref()
                .map(Value::to_string)
                .unwrap_or_default();
        }
        let blocks: Vec<_> = self
            .content
            .iter()
            .map(|block| match block {
                ToolContent::Text { text } => text.clone(),
                ToolContent::Image { mime_type, .. } => {
                    format!("[image: {mime_type}]")
                }
                ToolContent::Resource { resource } => resource.to_string(),
                ToolContent::Unsupported => "[unsupported content]".to_owned(),
            })
            .collect();
        blocks.join("\n")
    }
}
