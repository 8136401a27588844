use std::sync::Arc;

use tool_chat_core::{
    ConversationLoop, ConversationLoopBuilder, Error, LoopConfig, Transcript,
    Turn,
};
use tool_chat_gateway::{ToolDescriptor, ToolGateway};
use tool_chat_model::ModelProvider;

/// A session builder.
///
/// See [`Session`].
pub struct SessionBuilder {
    loop_builder: ConversationLoopBuilder,
}

impl SessionBuilder {
    /// Creates a session builder with a model provider and a tool gateway.
    pub fn with_model_provider<M: ModelProvider + 'static>(
        provider: M,
        gateway: Arc<dyn ToolGateway>,
    ) -> Self {
        let loop_builder =
            ConversationLoopBuilder::with_model_provider(provider, gateway);
        Self { loop_builder }
    }

    /// Sets limits and the tool execution mode.
    #[inline]
    pub fn loop_config(mut self, config: LoopConfig) -> Self {
        self.loop_builder = self.loop_builder.config(config);
        self
    }

    /// Attaches a callback invoked for every turn the model or a tool adds.
    #[inline]
    pub fn on_turn(
        mut self,
        on_turn: impl Fn(&Turn) + Send + Sync + 'static,
    ) -> Self {
        self.loop_builder = self.loop_builder.on_turn(on_turn);
        self
    }

    /// Attaches a callback receiving assistant text as it streams in.
    #[inline]
    pub fn on_delta(
        mut self,
        on_delta: impl Fn(&str) + Send + Sync + 'static,
    ) -> Self {
        self.loop_builder = self.loop_builder.on_delta(on_delta);
        self
    }

    /// Builds a new session.
    pub fn build(self) -> Session {
        Session {
            conversation: self.loop_builder.build(),
            transcript: Transcript::new(),
        }
    }
}

/// A chat session, like a window that displays messages and has an input
/// box.
///
/// The session owns the transcript, which survives across messages until
/// [`reset`](Session::reset) is called.
pub struct Session {
    conversation: ConversationLoop,
    transcript: Transcript,
}

impl Session {
    /// Sends a message and runs the conversation loop until the model
    /// answers. Returns the turns added after the user message.
    ///
    /// If the loop fails, everything it appended is dropped and only the
    /// user message is kept, so the next message starts from a transcript
    /// the model can accept.
    pub async fn send_message(&mut self, message: &str) -> Result<&[Turn], Error> {
        self.transcript.push(Turn::user(message));
        let checkpoint = self.transcript.len();

        if let Err(err) = self.advance().await {
            error!("message failed: {err}");
            self.transcript.truncate(checkpoint);
            return Err(err);
        }
        Ok(self.transcript.turns_since(checkpoint))
    }

    async fn advance(&mut self) -> Result<(), Error> {
        // The catalog may change between messages, but stays fixed for a
        // single run.
        let tools = self.conversation.gateway().list_tools().await?;
        debug!("{} tools available", tools.len());
        self.conversation.run(&mut self.transcript, &tools).await
    }

    /// Fetches the tool catalog from the gateway.
    #[inline]
    pub async fn tools(&self) -> Result<Vec<ToolDescriptor>, Error> {
        Ok(self.conversation.gateway().list_tools().await?)
    }

    /// Returns the transcript so far.
    #[inline]
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Clears the transcript.
    #[inline]
    pub fn reset(&mut self) {
        self.transcript.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::{Map, Value, json};
    use tool_chat_core::ErrorKind;
    use tool_chat_gateway::{
        Error as GatewayError, ErrorKind as GatewayErrorKind, ToolResult,
    };
    use tool_chat_test_model::{PresetResponse, TestModelProvider};

    use super::*;

    #[derive(Default)]
    struct FakeGateway {
        down: Mutex<bool>,
    }

    #[async_trait]
    impl ToolGateway for FakeGateway {
        async fn list_tools(
            &self,
        ) -> Result<Vec<ToolDescriptor>, GatewayError> {
            if *self.down.lock().unwrap() {
                return Err(GatewayError::connection());
            }
            Ok(vec![ToolDescriptor {
                name: "get_address_by_postal_code".to_owned(),
                description: "Looks up an address".to_owned(),
                input_schema: json!({ "type": "object" }),
            }])
        }

        async fn call_tool(
            &self,
            _name: &str,
            arguments: Map<String, Value>,
        ) -> Result<ToolResult, GatewayError> {
            match arguments.get("postal_code").and_then(Value::as_str) {
                Some("1000001") => Ok(ToolResult::text(
                    r#"{"address1":"東京都","address2":"千代田区","address3":"千代田"}"#,
                )),
                _ => Ok(ToolResult::text("{}")),
            }
        }
    }

    fn session(
        steps: impl IntoIterator<Item = PresetResponse>,
    ) -> (Session, TestModelProvider, Arc<FakeGateway>) {
        let mut provider = TestModelProvider::default();
        for step in steps {
            provider.add_assistant_response_step(step);
        }
        let gateway = Arc::new(FakeGateway::default());
        let session =
            SessionBuilder::with_model_provider(provider.clone(), gateway.clone())
                .build();
        (session, provider, gateway)
    }

    #[tokio::test]
    async fn test_send_message() {
        let (mut session, provider, _) = session([
            PresetResponse::with_tool_calls([(
                "call_0",
                "get_address_by_postal_code",
                r#"{"postal_code":"1000001"}"#,
            )]),
            PresetResponse::with_text("It is in Chiyoda, Tokyo."),
        ]);

        let new_turns = session.send_message("Where is 1000001?").await.unwrap();
        assert_eq!(new_turns.len(), 3);
        assert_eq!(
            new_turns.last(),
            Some(&Turn::assistant("It is in Chiyoda, Tokyo."))
        );
        assert_eq!(session.transcript().len(), 4);
        assert_eq!(provider.requests()[0].tools.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_message_keeps_user_turn() {
        let (mut session, _, _) = session([
            PresetResponse::with_text("hello"),
            PresetResponse::with_tool_calls([(
                "call_0",
                "get_address_by_postal_code",
                "{oops",
            )]),
            PresetResponse::with_text("fine"),
        ]);

        session.send_message("hi").await.unwrap();
        let err = session.send_message("where?").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArgumentParse);
        assert_eq!(
            session.transcript().turns(),
            [
                Turn::user("hi"),
                Turn::assistant("hello"),
                Turn::user("where?"),
            ]
        );

        // The session keeps working after a failure.
        session.send_message("again").await.unwrap();
        assert_eq!(session.transcript().last(), Some(&Turn::assistant("fine")));
    }

    #[tokio::test]
    async fn test_failed_run_drops_observed_turns() {
        let mut provider = TestModelProvider::default();
        provider.add_assistant_response_step(PresetResponse::with_tool_calls([(
            "call_0",
            "get_address_by_postal_code",
            r#"{"postal_code":"1000001"}"#,
        )]));
        // The second model call fails after the tool already ran.
        provider.add_assistant_response_step(
            PresetResponse::with_text("never").with_failures(0),
        );
        let observed = Arc::new(Mutex::new(vec![]));
        let mut session = SessionBuilder::with_model_provider(
            provider,
            Arc::new(FakeGateway::default()),
        )
        .on_turn({
            let observed = observed.clone();
            move |turn| observed.lock().unwrap().push(turn.clone())
        })
        .build();

        assert!(session.send_message("Where is 1000001?").await.is_err());
        let observed = observed.lock().unwrap();
        assert_eq!(observed.len(), 2);
        assert!(matches!(observed[1], Turn::ToolResult { .. }));
        assert_eq!(
            session.transcript().turns(),
            [Turn::user("Where is 1000001?")]
        );
    }

    #[tokio::test]
    async fn test_gateway_down() {
        let (mut session, provider, gateway) =
            session([PresetResponse::with_text("unreachable")]);
        *gateway.down.lock().unwrap() = true;

        let err = session.send_message("hi").await.unwrap_err();
        assert_eq!(
            err.kind(),
            ErrorKind::Gateway(GatewayErrorKind::Connection)
        );
        assert_eq!(provider.request_count(), 0);
        assert_eq!(session.transcript().turns(), [Turn::user("hi")]);
        assert!(session.tools().await.is_err());
    }

    #[tokio::test]
    async fn test_reset() {
        let (mut session, provider, _) = session([
            PresetResponse::with_text("hello"),
            PresetResponse::with_text("hello again"),
        ]);
        session.send_message("hi").await.unwrap();
        session.reset();
        assert!(session.transcript().is_empty());

        session.send_message("hi").await.unwrap();
        assert_eq!(provider.requests()[1].messages.len(), 1);
    }
}
