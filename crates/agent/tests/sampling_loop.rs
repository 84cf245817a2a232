//! End-to-end sampling-loop scenarios with scripted providers and
//! in-process tools.

mod common;

use std::sync::Arc;

use serde_json::json;

use deskpilot_agent::{SamplingLoop, SessionContext, StopReason, ToolDispatcher};
use deskpilot_core::error::ProviderError;
use deskpilot_core::event::{AgentEvent, EventBus};
use deskpilot_core::message::{ContentBlock, Conversation, Message, ToolResultContent, TurnKind};
use deskpilot_core::tool::ToolRegistry;
use deskpilot_mcp::RemoteToolGateway;

use common::*;

fn start(prompt: &str) -> Conversation {
    let mut conv = Conversation::new();
    conv.push(Message::user(prompt));
    conv
}

#[tokio::test]
async fn two_tool_calls_make_one_result_turn() {
    let provider = shared(ScriptedProvider::new(vec![
        Ok(vec![
            ContentBlock::text("Let me check two things."),
            tool_use("toolu_a", "echo", json!({"text": "first"})),
            tool_use("toolu_b", "echo", json!({"text": "second"})),
        ]),
        Ok(vec![ContentBlock::text("All done.")]),
    ]));
    let recorded = shared(Recorded::default());
    let session = SessionContext::new(recorded.clone());
    let agent = SamplingLoop::new(provider.clone(), config());

    let mut conv = start("check");
    let outcome = agent
        .run_with_tools(&mut conv, &session, ToolDispatcher::local_only(local_tools()))
        .await;

    assert!(matches!(outcome.stop, StopReason::Completed));
    assert_eq!(outcome.provider_calls, 2);
    assert_eq!(conv.len(), 4);

    let assistant = &conv.messages[1];
    let results = &conv.messages[2];
    assert_eq!(results.kind(), TurnKind::ToolResults);

    let result_ids: Vec<&str> = results
        .blocks()
        .unwrap()
        .iter()
        .map(|b| match b {
            ContentBlock::ToolResult(r) => r.tool_use_id.as_str(),
            other => panic!("unexpected block {other:?}"),
        })
        .collect();
    assert_eq!(result_ids, assistant.tool_use_ids());

    match &results.blocks().unwrap()[1] {
        ContentBlock::ToolResult(r) => {
            assert!(!r.is_error);
            assert_eq!(r.content, vec![ToolResultContent::Text { text: "second".into() }]);
        }
        _ => unreachable!(),
    }

    // The second request saw the tool results.
    let second = &provider.requests.lock().unwrap()[1];
    assert_eq!(second.messages.len(), 3);

    assert_eq!(recorded.blocks.lock().unwrap().len(), 4);
    assert_eq!(recorded.tool_outputs.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn no_tool_use_terminates_after_one_call() {
    let provider = shared(ScriptedProvider::new(vec![Ok(vec![ContentBlock::text("Hello!")])]));
    let session = SessionContext::new(shared(Recorded::default()));
    let agent = SamplingLoop::new(provider.clone(), config());

    let mut conv = start("hi");
    let outcome = agent
        .run_with_tools(&mut conv, &session, ToolDispatcher::local_only(local_tools()))
        .await;

    assert!(matches!(outcome.stop, StopReason::Completed));
    assert_eq!(provider.call_count(), 1);
    assert_eq!(conv.len(), 2);
    assert_eq!(conv.messages[1].kind(), TurnKind::Assistant);
}

#[tokio::test]
async fn timeout_stops_before_next_call() {
    let provider = shared(ScriptedProvider::new(vec![
        Ok(vec![tool_use("toolu_1", "echo", json!({"text": "x"}))]),
        Ok(vec![ContentBlock::text("never sent")]),
    ]));
    let recorded = shared(Recorded::default());
    let probe = recorded.clone();
    // Fires once the first response has been observed.
    let session = SessionContext::new(recorded.clone())
        .with_timeout(move || !probe.api_calls.lock().unwrap().is_empty());
    let agent = SamplingLoop::new(provider.clone(), config());

    let mut conv = start("go");
    let outcome = agent
        .run_with_tools(&mut conv, &session, ToolDispatcher::local_only(local_tools()))
        .await;

    assert!(matches!(outcome.stop, StopReason::TimedOut));
    assert_eq!(provider.call_count(), 1);
    assert_eq!(conv.len(), 3);
    assert_eq!(conv.messages[2].kind(), TurnKind::ToolResults);
}

#[tokio::test]
async fn timeout_before_first_call_sends_nothing() {
    let provider = shared(ScriptedProvider::new(vec![]));
    let session = SessionContext::new(shared(Recorded::default())).with_timeout(|| true);
    let agent = SamplingLoop::new(provider.clone(), config());

    let mut conv = start("go");
    let outcome = agent
        .run_with_tools(&mut conv, &session, ToolDispatcher::local_only(local_tools()))
        .await;

    assert!(matches!(outcome.stop, StopReason::TimedOut));
    assert_eq!(outcome.provider_calls, 0);
    assert_eq!(conv.len(), 1);
}

#[tokio::test]
async fn provider_failure_returns_transcript_so_far() {
    let provider = shared(ScriptedProvider::new(vec![
        Ok(vec![tool_use("toolu_1", "echo", json!({"text": "ok"}))]),
        Err(ProviderError::Api {
            status_code: 400,
            message: "messages: roles must alternate".into(),
        }),
    ]));
    let recorded = shared(Recorded::default());
    let session = SessionContext::new(recorded.clone());
    let agent = SamplingLoop::new(provider.clone(), config());

    let mut conv = start("go");
    let outcome = agent
        .run_with_tools(&mut conv, &session, ToolDispatcher::local_only(local_tools()))
        .await;

    assert!(matches!(
        outcome.stop,
        StopReason::ProviderFailed(ProviderError::Api { status_code: 400, .. })
    ));
    assert_eq!(conv.len(), 3);

    // The observer fired exactly once per send, including the failed one.
    let api_calls = recorded.api_calls.lock().unwrap();
    assert_eq!(api_calls.len(), 2);
    assert!(api_calls[0].is_none());
    assert!(api_calls[1].as_deref().unwrap().contains("roles must alternate"));
}

#[tokio::test]
async fn remote_servers_are_closed_after_provider_failure() {
    let provider = shared(ScriptedProvider::new(vec![Err(ProviderError::Network(
        "connection reset".into(),
    ))]));
    let session = SessionContext::new(shared(Recorded::default()));
    let agent = SamplingLoop::new(provider, config());

    let (server, hung_up) = watched_mcp_server(vec!["fetch"]);
    let mut remote = RemoteToolGateway::new();
    remote.attach(server).await.unwrap();

    let mut conv = start("go");
    let outcome = agent
        .run_with_tools(&mut conv, &session, ToolDispatcher::new(local_tools(), remote))
        .await;

    assert!(matches!(outcome.stop, StopReason::ProviderFailed(_)));
    assert_hung_up(hung_up).await;
}

#[tokio::test]
async fn remote_servers_are_closed_after_timeout() {
    let provider = shared(ScriptedProvider::new(vec![Ok(vec![tool_use(
        "toolu_1",
        "fetch",
        json!({}),
    )])]));
    let recorded = shared(Recorded::default());
    let observed = recorded.clone();
    let session = SessionContext::new(recorded.clone())
        .with_timeout(move || !observed.api_calls.lock().unwrap().is_empty());
    let agent = SamplingLoop::new(provider, config());

    let (server, hung_up) = watched_mcp_server(vec!["fetch"]);
    let mut remote = RemoteToolGateway::new();
    remote.attach(server).await.unwrap();

    let mut conv = start("go");
    let outcome = agent
        .run_with_tools(&mut conv, &session, ToolDispatcher::new(local_tools(), remote))
        .await;

    assert!(matches!(outcome.stop, StopReason::TimedOut));
    // The remote call went through before the deadline hit.
    let outputs = recorded.tool_outputs.lock().unwrap();
    assert_eq!(outputs[0].1.output.as_deref(), Some("fetch ran remotely"));
    drop(outputs);
    assert_hung_up(hung_up).await;
}

#[tokio::test]
async fn unknown_tool_becomes_error_result() {
    let provider = shared(ScriptedProvider::new(vec![
        Ok(vec![tool_use("toolu_1", "teleport", json!({}))]),
        Ok(vec![ContentBlock::text("I cannot do that.")]),
    ]));
    let session = SessionContext::new(shared(Recorded::default()));
    let agent = SamplingLoop::new(provider.clone(), config());

    let mut remote = RemoteToolGateway::new();
    remote.attach(fake_mcp_server(vec!["fetch"])).await.unwrap();

    let mut conv = start("go");
    let outcome = agent
        .run_with_tools(&mut conv, &session, ToolDispatcher::new(local_tools(), remote))
        .await;

    assert!(matches!(outcome.stop, StopReason::Completed));
    match &conv.messages[2].blocks().unwrap()[0] {
        ContentBlock::ToolResult(r) => {
            assert!(r.is_error);
            match &r.content[0] {
                ToolResultContent::Text { text } => assert!(text.contains("teleport")),
                other => panic!("unexpected content {other:?}"),
            }
        }
        other => panic!("unexpected block {other:?}"),
    }
}

#[tokio::test]
async fn remote_tools_are_published_and_called() {
    let provider = shared(ScriptedProvider::new(vec![
        Ok(vec![
            tool_use("toolu_1", "fetch", json!({"url": "https://example.com"})),
            tool_use("toolu_2", "echo", json!({"text": "local"})),
        ]),
        Ok(vec![ContentBlock::text("Fetched.")]),
    ]));
    let recorded = shared(Recorded::default());
    let session = SessionContext::new(recorded.clone());
    let agent = SamplingLoop::new(provider.clone(), config());

    let mut remote = RemoteToolGateway::new();
    // "echo" is also local; the local one wins.
    remote.attach(fake_mcp_server(vec!["fetch", "echo"])).await.unwrap();

    let mut conv = start("fetch it");
    agent
        .run_with_tools(&mut conv, &session, ToolDispatcher::new(local_tools(), remote))
        .await;

    let published: Vec<String> = provider.requests.lock().unwrap()[0]
        .tools
        .iter()
        .map(|t| t.name.clone())
        .collect();
    assert_eq!(published, vec!["echo", "screenshot", "fetch"]);

    let outputs = recorded.tool_outputs.lock().unwrap();
    assert_eq!(outputs[0].1.output.as_deref(), Some("fetch ran remotely"));
    assert_eq!(outputs[1].1.output.as_deref(), Some("local"));
}

#[tokio::test]
async fn images_are_pruned_without_caching() {
    let mut turns = Vec::new();
    for i in 0..4 {
        turns.push(Ok(vec![tool_use(&format!("toolu_{i}"), "screenshot", json!({}))]));
    }
    turns.push(Ok(vec![ContentBlock::text("Seen enough.")]));
    let provider = shared(ScriptedProvider::new(turns));
    let session = SessionContext::new(shared(Recorded::default()));

    let mut cfg = config();
    cfg.image_retention = Some((2, 1));
    let agent = SamplingLoop::new(provider.clone(), cfg);

    let mut conv = start("look");
    agent
        .run_with_tools(&mut conv, &session, ToolDispatcher::local_only(local_tools()))
        .await;

    // The last request carried four screenshots before pruning; two remain.
    let last = provider.requests.lock().unwrap().last().cloned().unwrap();
    let mut last_conv = Conversation::new();
    last_conv.messages = last.messages;
    assert_eq!(last_conv.tool_result_image_count(), 2);
}

#[tokio::test]
async fn caching_disables_image_pruning() {
    let provider = shared(
        ScriptedProvider::new(vec![
            Ok(vec![tool_use("toolu_0", "screenshot", json!({}))]),
            Ok(vec![tool_use("toolu_1", "screenshot", json!({}))]),
            Ok(vec![ContentBlock::text("ok")]),
        ])
        .with_caching(),
    );
    let session = SessionContext::new(shared(Recorded::default()));

    let mut cfg = config();
    cfg.image_retention = Some((1, 1));
    let agent = SamplingLoop::new(provider.clone(), cfg);

    let mut conv = start("look");
    agent
        .run_with_tools(&mut conv, &session, ToolDispatcher::local_only(local_tools()))
        .await;

    assert_eq!(conv.tool_result_image_count(), 2);
    let last = provider.requests.lock().unwrap().last().cloned().unwrap();
    assert!(last.betas.iter().any(|b| b == "prompt-caching-2024-07-31"));
}

#[tokio::test]
async fn thinking_signature_round_trips() {
    let thinking = ContentBlock::Thinking {
        thinking: "The user wants a listing.".into(),
        signature: Some("sig-abc".into()),
    };
    let provider = shared(ScriptedProvider::new(vec![
        Ok(vec![
            thinking.clone(),
            ContentBlock::text(""),
            tool_use("toolu_1", "echo", json!({"text": "ls"})),
        ]),
        Ok(vec![ContentBlock::text("Done")]),
    ]));
    let session = SessionContext::new(shared(Recorded::default()));
    let agent = SamplingLoop::new(provider.clone(), config());

    let mut conv = start("list");
    agent
        .run_with_tools(&mut conv, &session, ToolDispatcher::local_only(ToolRegistry::new()))
        .await;

    let assistant = conv.messages[1].blocks().unwrap();
    assert_eq!(assistant.len(), 2, "empty text block is dropped");
    assert_eq!(assistant[0], thinking);

    let second = &provider.requests.lock().unwrap()[1];
    assert_eq!(second.messages[1].blocks().unwrap()[0], thinking);
}

#[tokio::test]
async fn tool_events_reach_the_bus() {
    let provider = shared(ScriptedProvider::new(vec![
        Ok(vec![
            tool_use("toolu_1", "screenshot", json!({})),
            tool_use("toolu_2", "missing", json!({"x": 1})),
        ]),
        Ok(vec![ContentBlock::text("Done")]),
    ]));
    let bus = Arc::new(EventBus::new(16));
    let mut rx = bus.subscribe();
    let session = SessionContext::new(shared(Recorded::default())).with_recorder(bus.clone(), "task-42");
    let agent = SamplingLoop::new(provider, config());

    let mut conv = start("go");
    agent
        .run_with_tools(&mut conv, &session, ToolDispatcher::local_only(local_tools()))
        .await;

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    assert_eq!(events.len(), 4);
    match events[1].as_ref() {
        AgentEvent::ToolCallEnd { result, success, task_id, .. } => {
            assert_eq!(task_id, "task-42");
            assert!(success);
            assert_eq!(result.as_deref(), Some("[Screenshot Taken]"));
        }
        other => panic!("unexpected event {other:?}"),
    }
    match events[3].as_ref() {
        AgentEvent::ToolCallEnd { success, error, .. } => {
            assert!(!success);
            assert!(error.is_some());
        }
        other => panic!("unexpected event {other:?}"),
    }
}
