use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tool_chat_gateway::{
    Error as GatewayError, ErrorKind as GatewayErrorKind, ToolDescriptor,
    ToolGateway, ToolResult,
};
use tool_chat_model::{ErrorKind as ModelErrorKind, ModelMessage};
use tool_chat_test_model::{PresetEvent, PresetResponse, TestModelProvider};

use super::*;
use crate::ErrorKind;

/// Answers `lookup` with the postal code it got, sleeping for `delay_ms`
/// first when the arguments carry one. `fail` always fails.
#[derive(Default)]
struct FakeGateway {
    calls: Mutex<Vec<(String, Map<String, Value>)>>,
    finished: Mutex<Vec<String>>,
}

impl FakeGateway {
    fn calls(&self) -> Vec<(String, Map<String, Value>)> {
        self.calls.lock().unwrap().clone()
    }

    fn finished(&self) -> Vec<String> {
        self.finished.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolGateway for FakeGateway {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, GatewayError> {
        Ok(catalog())
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<ToolResult, GatewayError> {
        self.calls
            .lock()
            .unwrap()
            .push((name.to_owned(), arguments.clone()));
        if let Some(delay) = arguments.get("delay_ms").and_then(Value::as_u64)
        {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        let code = arguments
            .get("postal_code")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        self.finished.lock().unwrap().push(code.clone());
        match name {
            "lookup" => Ok(ToolResult::text(format!("address of {code}"))),
            _ => Err(GatewayError::tool_invocation()
                .with_reason(format!("Unknown tool: {name}"))),
        }
    }
}

fn catalog() -> Vec<ToolDescriptor> {
    vec![ToolDescriptor {
        name: "lookup".to_owned(),
        description: "Looks up an address".to_owned(),
        input_schema: json!({
            "type": "object",
            "properties": { "postal_code": { "type": "string" } }
        }),
    }]
}

struct Fixture {
    provider: TestModelProvider,
    gateway: Arc<FakeGateway>,
    turns: Arc<Mutex<Vec<Turn>>>,
}

impl Fixture {
    fn new(steps: impl IntoIterator<Item = PresetResponse>) -> Self {
        let mut provider = TestModelProvider::default();
        for step in steps {
            provider.add_assistant_response_step(step);
        }
        Self {
            provider,
            gateway: Arc::new(FakeGateway::default()),
            turns: Arc::new(Mutex::new(vec![])),
        }
    }

    fn builder(&self) -> ConversationLoopBuilder {
        let turns = Arc::clone(&self.turns);
        ConversationLoopBuilder::with_model_provider(
            self.provider.clone(),
            self.gateway.clone(),
        )
        .on_turn(move |turn| turns.lock().unwrap().push(turn.clone()))
    }

    fn observed_turns(&self) -> Vec<Turn> {
        self.turns.lock().unwrap().clone()
    }
}

fn tool_result(id: &str, content: &str) -> Turn {
    Turn::ToolResult {
        tool_call_id: id.to_owned(),
        name: "lookup".to_owned(),
        content: content.to_owned(),
    }
}

#[tokio::test]
async fn test_final_answer_without_tools() {
    let fixture = Fixture::new([PresetResponse::with_text("hello")]);
    let conversation = fixture.builder().build();

    let mut transcript = Transcript::from(vec![Turn::user("hi")]);
    conversation.run(&mut transcript, &catalog()).await.unwrap();

    assert_eq!(
        transcript.turns(),
        [Turn::user("hi"), Turn::assistant("hello")]
    );
    assert_eq!(fixture.provider.request_count(), 1);
    assert!(fixture.gateway.calls().is_empty());
    assert_eq!(fixture.observed_turns(), [Turn::assistant("hello")]);
}

#[tokio::test]
async fn test_tool_round_trip() {
    let fixture = Fixture::new([
        PresetResponse::with_tool_calls([
            ("call_a", "lookup", r#"{"postal_code":"1000001"}"#),
            ("call_b", "lookup", r#"{"postal_code":"0600000"}"#),
        ]),
        PresetResponse::with_text("Both are in Japan."),
    ]);
    let conversation = fixture.builder().build();

    let mut transcript = Transcript::from(vec![Turn::user("where?")]);
    conversation.run(&mut transcript, &catalog()).await.unwrap();

    let turns = transcript.turns();
    assert_eq!(turns.len(), 5);
    let Turn::AssistantWithToolRequests { text, requests } = &turns[1] else {
        panic!("expected tool requests, got {:?}", turns[1]);
    };
    assert_eq!(*text, None);
    assert_eq!(requests.len(), 2);
    assert_eq!(turns[2], tool_result("call_a", "address of 1000001"));
    assert_eq!(turns[3], tool_result("call_b", "address of 0600000"));
    assert_eq!(turns[4], Turn::assistant("Both are in Japan."));
    assert_eq!(fixture.observed_turns(), turns[1..]);

    let calls = fixture.gateway.calls();
    let codes: Vec<_> = calls
        .iter()
        .map(|(name, args)| (name.as_str(), args["postal_code"].clone()))
        .collect();
    assert_eq!(
        codes,
        [("lookup", json!("1000001")), ("lookup", json!("0600000"))]
    );

    // Every result is in place before the model is asked again, and the
    // whole history is resent.
    let requests = fixture.provider.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].messages.len(), 4);
    assert!(matches!(
        &requests[1].messages[3],
        ModelMessage::Tool(result) if result.id == "call_b"
    ));
    assert_eq!(requests[1].tools.len(), 1);
}

#[tokio::test]
async fn test_history_is_kept_across_runs() {
    let fixture = Fixture::new([
        PresetResponse::with_text("hello"),
        PresetResponse::with_text("bye"),
    ]);
    let conversation = fixture.builder().build();

    let mut transcript = Transcript::from(vec![Turn::user("hi")]);
    conversation.run(&mut transcript, &[]).await.unwrap();
    transcript.push(Turn::user("see you"));
    conversation.run(&mut transcript, &[]).await.unwrap();

    assert_eq!(transcript.len(), 4);
    assert_eq!(fixture.provider.requests()[1].messages.len(), 3);
}

#[tokio::test]
async fn test_malformed_arguments_abort() {
    let fixture = Fixture::new([
        PresetResponse::with_tool_calls([
            ("call_a", "lookup", r#"{"postal_code":"1000001"}"#),
            ("call_b", "lookup", r#"{"postal_code":"#),
            ("call_c", "lookup", r#"{"postal_code":"0600000"}"#),
        ]),
        PresetResponse::with_text("unreachable"),
    ]);
    let conversation = fixture.builder().build();

    let mut transcript = Transcript::from(vec![Turn::user("where?")]);
    let err = conversation
        .run(&mut transcript, &catalog())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ArgumentParse);
    assert!(err.reason().contains("call_b"));

    assert_eq!(fixture.gateway.calls().len(), 1);
    assert_eq!(fixture.provider.request_count(), 1);
    assert_eq!(fixture.provider.remaining_steps(), 1);
    // The first result stays, nothing is rolled back.
    assert_eq!(transcript.len(), 3);
    assert_eq!(
        transcript.last(),
        Some(&tool_result("call_a", "address of 1000001"))
    );
}

#[tokio::test]
async fn test_non_object_arguments_abort() {
    let fixture = Fixture::new([PresetResponse::with_tool_calls([(
        "call_a",
        "lookup",
        r#"["1000001"]"#,
    )])]);
    let conversation = fixture.builder().build();

    let mut transcript = Transcript::from(vec![Turn::user("where?")]);
    let err = conversation.run(&mut transcript, &[]).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ArgumentParse);
    assert!(fixture.gateway.calls().is_empty());
}

#[tokio::test]
async fn test_gateway_error_propagates() {
    let fixture = Fixture::new([
        PresetResponse::with_tool_calls([("call_a", "missing", "{}")]),
        PresetResponse::with_text("unreachable"),
    ]);
    let conversation = fixture.builder().build();

    let mut transcript = Transcript::from(vec![Turn::user("hi")]);
    let err = conversation.run(&mut transcript, &[]).await.unwrap_err();
    assert_eq!(
        err.kind(),
        ErrorKind::Gateway(GatewayErrorKind::ToolInvocation)
    );
    assert!(err.reason().contains("missing"));
    assert_eq!(fixture.provider.request_count(), 1);
}

#[tokio::test]
async fn test_model_failure_leaves_transcript() {
    let fixture = Fixture::new([
        PresetResponse::with_text("never").with_failures(0),
    ]);
    let conversation = fixture.builder().build();

    let mut transcript = Transcript::from(vec![Turn::user("hi")]);
    let err = conversation.run(&mut transcript, &[]).await.unwrap_err();
    assert_eq!(
        err.kind(),
        ErrorKind::ModelInvocation(ModelErrorKind::RateLimitExceeded)
    );
    assert_eq!(transcript.turns(), [Turn::user("hi")]);
}

#[tokio::test]
async fn test_max_iterations() {
    let fixture = Fixture::new((0..3).map(|idx| {
        PresetResponse::with_events([PresetEvent::ToolCall(ToolRequest {
            id: format!("call_{idx}"),
            name: "lookup".to_owned(),
            arguments: r#"{"postal_code":"1000001"}"#.to_owned(),
        })])
    }));
    let conversation = fixture.builder().max_iterations(2).build();

    let mut transcript = Transcript::from(vec![Turn::user("loop")]);
    let err = conversation.run(&mut transcript, &[]).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::LoopExceeded);
    assert_eq!(fixture.provider.request_count(), 2);
    assert_eq!(fixture.gateway.calls().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_timeout() {
    let mut fixture = Fixture::new([PresetResponse::with_text("too late")]);
    fixture.provider.set_delay(Duration::from_secs(10));
    let conversation =
        fixture.builder().timeout(Duration::from_secs(1)).build();

    let mut transcript = Transcript::from(vec![Turn::user("hi")]);
    let err = conversation.run(&mut transcript, &[]).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::LoopExceeded);
    assert_eq!(transcript.len(), 1);
}

#[tokio::test]
async fn test_concurrent_results_keep_request_order() {
    let fixture = Fixture::new([
        PresetResponse::with_tool_calls([
            ("call_a", "lookup", r#"{"postal_code":"1","delay_ms":30}"#),
            ("call_b", "lookup", r#"{"postal_code":"2"}"#),
        ]),
        PresetResponse::with_text("done"),
    ]);
    let conversation = fixture
        .builder()
        .execution_mode(ExecutionMode::Concurrent)
        .build();

    let mut transcript = Transcript::from(vec![Turn::user("go")]);
    conversation.run(&mut transcript, &[]).await.unwrap();

    // The second call finishes first, but results follow request order.
    assert_eq!(fixture.gateway.finished(), ["2", "1"]);
    assert_eq!(transcript.turns()[2], tool_result("call_a", "address of 1"));
    assert_eq!(transcript.turns()[3], tool_result("call_b", "address of 2"));
}

#[tokio::test]
async fn test_concurrent_parses_before_calling() {
    let fixture = Fixture::new([PresetResponse::with_tool_calls([
        ("call_a", "lookup", r#"{"postal_code":"1"}"#),
        ("call_b", "lookup", "not json"),
    ])]);
    let conversation = fixture
        .builder()
        .execution_mode(ExecutionMode::Concurrent)
        .build();

    let mut transcript = Transcript::from(vec![Turn::user("go")]);
    let err = conversation.run(&mut transcript, &[]).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ArgumentParse);
    assert!(fixture.gateway.calls().is_empty());
    assert_eq!(transcript.len(), 2);
}

#[tokio::test]
async fn test_deltas_are_forwarded() {
    let fixture = Fixture::new([PresetResponse::with_events([
        PresetEvent::MessageDelta("Hel".to_owned()),
        PresetEvent::MessageDelta("lo".to_owned()),
    ])]);
    let deltas = Arc::new(Mutex::new(String::new()));
    let conversation = fixture
        .builder()
        .on_delta({
            let deltas = Arc::clone(&deltas);
            move |delta: &str| deltas.lock().unwrap().push_str(delta)
        })
        .build();

    let mut transcript = Transcript::from(vec![Turn::user("hi")]);
    conversation.run(&mut transcript, &[]).await.unwrap();
    assert_eq!(*deltas.lock().unwrap(), "Hello");
    assert_eq!(transcript.last(), Some(&Turn::assistant("Hello")));
}
