//! Tools the server exposes, and the registry that dispatches calls.

mod error;

use std::pin::Pin;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tool_chat_gateway::ToolDescriptor;

pub use error::{Error, ErrorKind};

/// The result of a tool call.
pub type ToolResult = Result<Value, Error>;

/// A tool that clients can call.
///
/// Implementations should be stateless. Anything a call needs, like an
/// HTTP client or a base URL, is set up when the tool is created.
pub trait Tool: Send + Sync + 'static {
    /// The type of input that the tool accepts.
    type Input: DeserializeOwned;

    /// Returns the name of the tool.
    fn name(&self) -> &str;

    /// Returns the description of the tool.
    fn description(&self) -> &str;

    /// Returns the parameter schema of the tool.
    fn parameter_schema(&self) -> &Value;

    /// Executes the tool with the given input.
    ///
    /// This method must return a future that is fully independent of
    /// `self`.
    fn execute(
        &self,
        input: Self::Input,
    ) -> impl Future<Output = ToolResult> + Send + 'static;
}

trait ToolObject: Send + Sync + 'static {
    fn descriptor(&self) -> ToolDescriptor;

    fn name(&self) -> &str;

    fn execute(
        &self,
        arguments: Value,
    ) -> Pin<Box<dyn Future<Output = ToolResult> + Send>>;
}

struct AnyTool<T: Tool>(T);

impl<T: Tool> ToolObject for AnyTool<T> {
    #[inline]
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.0.name().to_owned(),
            description: self.0.description().trim().to_owned(),
            input_schema: self.0.parameter_schema().clone(),
        }
    }

    #[inline]
    fn name(&self) -> &str {
        self.0.name()
    }

    fn execute(
        &self,
        arguments: Value,
    ) -> Pin<Box<dyn Future<Output = ToolResult> + Send>> {
        let input: T::Input = match serde_json::from_value(arguments) {
            Ok(input) => input,
            Err(err) => {
                let reason = format!("{err}");
                return Box::pin(std::future::ready(ToolResult::Err(
                    Error::invalid_input().with_reason(reason),
                )));
            }
        };
        Box::pin(self.0.execute(input))
    }
}

/// The set of tools a server exposes, in registration order.
#[derive(Default)]
pub struct Toolbox {
    tools: Vec<Box<dyn ToolObject>>,
}

impl Toolbox {
    /// Creates an empty toolbox.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool. A tool with the same name replaces the old one.
    pub fn with_tool<T: Tool>(mut self, tool: T) -> Self {
        self.tools.retain(|t| t.name() != tool.name());
        self.tools.push(Box::new(AnyTool(tool)));
        self
    }

    /// Returns the descriptors of all tools.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools.iter().map(|tool| tool.descriptor()).collect()
    }

    /// Starts executing the named tool, or returns `None` if there is no
    /// such tool.
    pub fn execute(
        &self,
        name: &str,
        arguments: Value,
    ) -> Option<Pin<Box<dyn Future<Output = ToolResult> + Send>>> {
        let tool = self.tools.iter().find(|tool| tool.name() == name)?;
        trace!("executing {name} with {arguments}");
        Some(tool.execute(arguments))
    }
}

#[cfg(test)]
mod tests {
    use std::future::ready;

    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    #[derive(Deserialize)]
    struct EchoInput {
        text: String,
    }

    struct EchoTool {
        schema: Value,
    }

    impl Tool for EchoTool {
        type Input = EchoInput;

        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "\n  Echoes the text back.\n"
        }

        fn parameter_schema(&self) -> &Value {
            &self.schema
        }

        fn execute(
            &self,
            input: EchoInput,
        ) -> impl Future<Output = ToolResult> + Send + 'static {
            ready(Ok(json!({ "text": input.text })))
        }
    }

    fn toolbox() -> Toolbox {
        Toolbox::new().with_tool(EchoTool {
            schema: json!({ "type": "object" }),
        })
    }

    #[test]
    fn test_descriptors() {
        let descriptors = toolbox().descriptors();
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].name, "echo");
        assert_eq!(descriptors[0].description, "Echoes the text back.");
        assert_eq!(descriptors[0].input_schema, json!({ "type": "object" }));
    }

    #[tokio::test]
    async fn test_execute() {
        let toolbox = toolbox();
        let result = toolbox
            .execute("echo", json!({ "text": "hi" }))
            .unwrap()
            .await
            .unwrap();
        assert_eq!(result, json!({ "text": "hi" }));

        let err = toolbox
            .execute("echo", json!({ "txt": "hi" }))
            .unwrap()
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        assert!(toolbox.execute("missing", json!({})).is_none());
    }
}
