// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end turn scenarios against in-memory collaborators.

use std::sync::Arc;

use chrono::Utc;
use parley_agent::{Turn, TurnHandler, TurnInput, TurnOutcome, TurnSettings};
use parley_billing::{AccessGate, Capability, DenyReason, PricingTable};
use parley_config::ParleyConfig;
use parley_core::{
    ChatGateway, ContentPart, GeneratedImage, MessageContent, ParleyError, PendingFileMeta, Role,
    UserId,
};
use parley_gateway::HttpGateway;
use parley_session::{ConversationLimits, ConversationStore, KeySpace, MemoryStore};
use parley_test_utils::{InMemoryLedger, MockFileFetcher, MockGateway, MockReply};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const USER: UserId = UserId(7);

struct Harness {
    handler: TurnHandler,
    conversations: ConversationStore,
    ledger: Arc<InMemoryLedger>,
    files: Arc<MockFileFetcher>,
}

fn harness(gateway: Arc<dyn ChatGateway>) -> Harness {
    let config = ParleyConfig::default();
    let conversations = ConversationStore::new(
        Arc::new(MemoryStore::new()),
        KeySpace::new("test"),
        ConversationLimits::default(),
    );
    let ledger = Arc::new(InMemoryLedger::new());
    let files = Arc::new(MockFileFetcher::new());
    let gate = AccessGate::new(
        Arc::new(PricingTable::builtin()),
        ledger.clone(),
        ledger.clone(),
        Arc::new(conversations.clone()),
        config.billing.daily_base_limit,
    );
    let handler = TurnHandler::new(
        conversations.clone(),
        gate,
        gateway,
        files.clone(),
        TurnSettings::from_config(&config, "You are a test bot.".into()),
    );
    Harness {
        handler,
        conversations,
        ledger,
        files,
    }
}

fn text(t: &str) -> TurnInput {
    TurnInput::Text { text: t.into() }
}

#[tokio::test]
async fn retried_gateway_call_is_recorded_and_billed_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "Recovered answer"}}],
            "usage": {"prompt_tokens": 4, "completion_tokens": 2, "total_tokens": 6}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = ParleyConfig::default();
    config.gateway.api_key = Some("test-key".into());
    config.gateway.base_url = server.uri();
    config.retry.base_delay_ms = 5;
    config.retry.max_delay_ms = 20;
    let gateway = Arc::new(HttpGateway::new(&config).unwrap());

    let h = harness(gateway);
    h.ledger.set_balance(USER, 10.0).await;

    let outcome = h
        .handler
        .handle(Turn::new(USER, text("hello")).with_model("openai/gpt-4o"))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        TurnOutcome::Reply {
            text: "Recovered answer".into(),
            images: vec![]
        }
    );

    let history = h.conversations.get_history(USER).await;
    let assistant: Vec<_> = history.iter().filter(|e| e.role == Role::Assistant).collect();
    assert_eq!(assistant.len(), 1);
    assert_eq!(history.len(), 2);

    let deductions = h.ledger.deductions().await;
    assert_eq!(deductions.len(), 1);
    assert_eq!(deductions[0].amount, 5.0);
}

#[tokio::test]
async fn failed_call_leaves_no_trace() {
    let gateway = Arc::new(MockGateway::with_replies(vec![MockReply::Status(404)]));
    let h = harness(gateway.clone());
    h.ledger.set_balance(USER, 10.0).await;

    let err = h
        .handler
        .handle(Turn::new(USER, text("hello")).with_model("openai/gpt-4o"))
        .await
        .unwrap_err();
    assert!(matches!(err, ParleyError::Gateway { status: Some(404), .. }));
    assert!(h.conversations.get_history(USER).await.is_empty());
    assert!(h.ledger.deductions().await.is_empty());
}

#[tokio::test]
async fn failed_deduction_discards_the_reply() {
    let gateway = Arc::new(MockGateway::new());
    let h = harness(gateway.clone());
    h.ledger.set_balance(USER, 10.0).await;
    h.ledger.fail_deductions().await;

    let err = h
        .handler
        .handle(Turn::new(USER, text("hello")).with_model("openai/gpt-4o"))
        .await
        .unwrap_err();
    assert!(matches!(err, ParleyError::Internal(_)));
    assert_eq!(gateway.calls(), 1);
    assert!(h.conversations.get_history(USER).await.is_empty());
    assert!(h.ledger.deductions().await.is_empty());
}

#[tokio::test]
async fn free_tier_stops_after_daily_limit() {
    let gateway = Arc::new(MockGateway::new());
    let h = harness(gateway.clone());

    for i in 1..=30 {
        let outcome = h.handler.handle(Turn::new(USER, text("hi"))).await.unwrap();
        assert!(matches!(outcome, TurnOutcome::Reply { .. }), "message {i}");
    }
    let outcome = h.handler.handle(Turn::new(USER, text("hi"))).await.unwrap();
    assert_eq!(outcome, TurnOutcome::Denied(DenyReason::DailyLimitReached));
    assert_eq!(gateway.calls(), 30);
    assert!(h.ledger.deductions().await.is_empty());
    assert_eq!(h.conversations.get_history(USER).await.len(), 20);
}

#[tokio::test]
async fn missing_capability_short_circuits() {
    let gateway = Arc::new(MockGateway::new());
    let h = harness(gateway.clone());

    let outcome = h
        .handler
        .handle(Turn::new(
            USER,
            TurnInput::Audio {
                caption: None,
                data_base64: "T2dnUw==".into(),
                format: "ogg".into(),
            },
        ))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        TurnOutcome::Unsupported {
            capability: Capability::Audio
        }
    );
    assert_eq!(gateway.calls(), 0);
    assert!(h.conversations.get_history(USER).await.is_empty());
}

#[tokio::test]
async fn insufficient_balance_is_denied_before_the_gateway() {
    let gateway = Arc::new(MockGateway::new());
    let h = harness(gateway.clone());
    h.ledger.set_balance(USER, 4.999).await;

    let outcome = h
        .handler
        .handle(Turn::new(USER, text("hi")).with_model("openai/gpt-4o"))
        .await
        .unwrap();
    assert_eq!(outcome, TurnOutcome::Denied(DenyReason::InsufficientFunds));
    assert_eq!(gateway.calls(), 0);
}

#[tokio::test]
async fn pending_file_is_extracted_and_consumed() {
    let gateway = Arc::new(MockGateway::new());
    let h = harness(gateway.clone());
    h.files.insert("f-1", "city,population\nOslo,700000\n").await;
    h.conversations
        .set_pending_file(
            USER,
            &PendingFileMeta {
                file_id: "f-1".into(),
                file_name: "cities.csv".into(),
                mime_type: "text/csv".into(),
                size: 29,
                timestamp: Utc::now(),
            },
        )
        .await
        .unwrap();

    h.handler
        .handle(Turn::new(USER, text("what is in the file?")))
        .await
        .unwrap();

    let requests = gateway.requests().await;
    let injected = requests[0].messages.iter().any(|m| match &m.content {
        MessageContent::Text(t) => t.contains("city: Oslo") && t.contains("cities.csv"),
        MessageContent::Parts(_) => false,
    });
    assert!(injected);
    assert!(h.conversations.take_pending_file(USER).await.is_none());

    let history = h.conversations.get_history(USER).await;
    assert_eq!(history[0].content, "[file: cities.csv] what is in the file?");
}

#[tokio::test]
async fn unreadable_file_surfaces_extraction_error() {
    let gateway = Arc::new(MockGateway::new());
    let h = harness(gateway.clone());
    h.files.insert("f-2", vec![0x89, b'P', b'N', b'G']).await;
    h.conversations
        .set_pending_file(
            USER,
            &PendingFileMeta {
                file_id: "f-2".into(),
                file_name: "photo.png".into(),
                mime_type: "image/png".into(),
                size: 4,
                timestamp: Utc::now(),
            },
        )
        .await
        .unwrap();

    let err = h.handler.handle(Turn::new(USER, text("read it"))).await.unwrap_err();
    assert!(matches!(err, ParleyError::Extraction { .. }));
    assert_eq!(gateway.calls(), 0);
}

#[tokio::test]
async fn image_turn_gives_later_turns_visual_context() {
    let gateway = Arc::new(MockGateway::new());
    let h = harness(gateway.clone());
    let photo = "data:image/jpeg;base64,/9j/".to_string();

    h.handler
        .handle(Turn::new(
            USER,
            TurnInput::Image {
                caption: Some("what is this?".into()),
                images: vec![photo.clone()],
            },
        ))
        .await
        .unwrap();
    assert_eq!(h.conversations.get_last_image(USER).await, Some(photo.clone()));

    h.handler
        .handle(Turn::new(USER, text("and what colour is it?")))
        .await
        .unwrap();
    let requests = gateway.requests().await;
    let last = requests[1].messages.last().unwrap();
    match &last.content {
        MessageContent::Parts(parts) => assert!(parts.contains(&ContentPart::image(photo))),
        other => panic!("expected image context, got {other:?}"),
    }
}

#[tokio::test]
async fn image_generation_is_billed_at_model_price() {
    let image = GeneratedImage {
        data: vec![1, 2, 3],
        mime_type: "image/png".into(),
    };
    let gateway = Arc::new(MockGateway::with_replies(vec![MockReply::Images(vec![
        image.clone(),
    ])]));
    let h = harness(gateway.clone());
    h.ledger.set_balance(USER, 20.0).await;

    let outcome = h
        .handler
        .handle(Turn::new(
            USER,
            TurnInput::GenerateImage {
                prompt: "a lighthouse at dusk".into(),
            },
        ))
        .await
        .unwrap();
    match outcome {
        TurnOutcome::Reply { images, .. } => assert_eq!(images, vec![image]),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(
        h.conversations.get_last_image(USER).await.as_deref(),
        Some("data:image/png;base64,AQID")
    );
    let deductions = h.ledger.deductions().await;
    assert_eq!(deductions.len(), 1);
    assert_eq!(deductions[0].amount, 8.0);
    assert_eq!(
        gateway.requests().await[0].modalities.as_deref(),
        Some(&["image".to_string(), "text".to_string()][..])
    );
}

#[tokio::test]
async fn image_generation_without_images_is_not_charged() {
    let gateway = Arc::new(MockGateway::with_replies(vec![MockReply::Text(
        "I can't draw that.".into(),
    )]));
    let h = harness(gateway);
    h.ledger.set_balance(USER, 20.0).await;

    let err = h
        .handler
        .handle(Turn::new(
            USER,
            TurnInput::GenerateImage {
                prompt: "something".into(),
            },
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, ParleyError::Gateway { .. }));
    assert!(h.ledger.deductions().await.is_empty());
}
