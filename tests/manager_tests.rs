//! AI client manager behaviour against scripted providers.

mod common;

use common::mocks::{ScriptedClient, StreamScript};
use futures::StreamExt;
use labrelay::llm::{
    AiClientManager, CostLedger, CostTracker, ModelPricing, ParticipantCoordinator, StreamEvent,
    collect_stream_text,
};
use labrelay::types::AppError;
use labrelay::utils::toml_config::ManagerConfig;
use std::collections::HashMap;
use std::sync::Arc;

fn manager_with(clients: &[Arc<ScriptedClient>]) -> AiClientManager {
    let config = ManagerConfig::default();
    let mut manager = AiClientManager::new(&config)
        .with_participants(ParticipantCoordinator::with_seed(config.participation.clone(), 7));
    for client in clients {
        manager.register(client.clone());
    }
    manager
}

async fn collect_events(manager: &AiClientManager, provider: Option<&str>) -> Vec<StreamEvent> {
    manager
        .generate_text("Summarise the findings", provider, None)
        .collect()
        .await
}

// ============= get_response =============

#[tokio::test]
async fn test_success_resets_health() {
    let openai = ScriptedClient::replying("openai", "answer").then_fail("rate limit exceeded").shared();
    let manager = manager_with(&[openai.clone()]);

    let text = manager.get_response("openai", "hi", None).await.unwrap();

    assert_eq!(text, "answer");
    assert_eq!(openai.calls(), 2);
    assert_eq!(manager.health().failures("openai"), 0);
}

#[tokio::test]
async fn test_consecutive_failures_are_counted_and_classified() {
    let openai = ScriptedClient::failing("openai", "openai API error 401: invalid key").shared();
    let manager = manager_with(&[openai.clone()]);

    let err = manager.get_response("openai", "hi", None).await.unwrap_err();

    assert!(matches!(err, AppError::Api { ref provider, .. } if provider == "openai"));
    assert_eq!(openai.calls(), 3);
    assert_eq!(manager.health().failures("openai"), 3);
    assert!(manager.available_providers().is_empty());
}

#[tokio::test]
async fn test_network_failures_are_classified_as_network() {
    let xai = ScriptedClient::failing("xai", "xai network connection failed: refused").shared();
    let manager = manager_with(&[xai]);

    let err = manager.get_response("xai", "hi", None).await.unwrap_err();
    assert!(matches!(err, AppError::Network { ref provider, .. } if provider == "xai"));
}

#[tokio::test]
async fn test_unhealthy_provider_is_not_called() {
    let openai = ScriptedClient::replying("openai", "answer").shared();
    let manager = manager_with(&[openai.clone()]);
    manager.health().mark_unhealthy("openai");

    let err = manager.get_response("openai", "hi", None).await.unwrap_err();

    assert!(matches!(err, AppError::ProviderUnavailable(_)));
    assert_eq!(openai.calls(), 0);
}

#[tokio::test]
async fn test_unknown_provider_is_unavailable() {
    let manager = manager_with(&[]);
    let err = manager.get_response("nope", "hi", None).await.unwrap_err();
    assert!(matches!(err, AppError::ProviderUnavailable(_)));
}

#[tokio::test]
async fn test_health_counts_k_failures_then_success_resets() {
    let openai = ScriptedClient::replying("openai", "ok")
        .then_fail("boom")
        .then_fail("boom")
        .shared();
    let manager = manager_with(&[openai]);

    manager.health().record_failure("openai");
    assert_eq!(manager.health().failures("openai"), 1);

    // one prior failure + two scripted failures leaves one attempt
    let text = manager.get_response("openai", "hi", None).await;
    assert!(text.is_err());
    assert_eq!(manager.health().failures("openai"), 3);

    manager.health().record_success("openai");
    assert_eq!(manager.available_providers(), vec!["openai"]);
    assert_eq!(manager.get_response("openai", "hi", None).await.unwrap(), "ok");
    assert_eq!(manager.health().failures("openai"), 0);
}

// ============= generate_text =============

#[tokio::test]
async fn test_stream_success() {
    let openai = ScriptedClient::replying("openai", "unused")
        .then_stream(StreamScript::ok(&["Hel", "lo"]))
        .shared();
    let manager = manager_with(&[openai]);

    let events = collect_events(&manager, None).await;

    assert_eq!(
        events,
        vec![
            StreamEvent::Delta {
                provider: "openai".into(),
                text: "Hel".into()
            },
            StreamEvent::Delta {
                provider: "openai".into(),
                text: "lo".into()
            },
            StreamEvent::Done {
                provider: "openai".into()
            },
        ]
    );
}

#[tokio::test]
async fn test_mid_stream_failure_fails_over_and_discards_partial_output() {
    let openai = ScriptedClient::replying("openai", "unused")
        .then_stream(StreamScript::broken(&["partial ", "answ"], "connection reset by peer"))
        .shared();
    let xai = ScriptedClient::replying("xai", "unused")
        .then_stream(StreamScript::ok(&["full ", "answer"]))
        .shared();
    let manager = manager_with(&[openai.clone(), xai.clone()]);

    let events = collect_events(&manager, Some("openai")).await;

    assert!(events.contains(&StreamEvent::Failover {
        from: "openai".into(),
        to: "xai".into(),
        discarded: 2,
    }));
    assert_eq!(
        events.last(),
        Some(&StreamEvent::Done {
            provider: "xai".into()
        })
    );
    assert!(!manager.health().is_available("openai"));
    assert_eq!(openai.stream_calls(), 1);
    assert_eq!(xai.stream_calls(), 1);

    let text = collect_stream_text(futures::stream::iter(events)).await.unwrap();
    assert_eq!(text, "full answer");
}

#[tokio::test]
async fn test_refused_stream_fails_over_without_discarding() {
    let openai = ScriptedClient::replying("openai", "unused")
        .then_stream(StreamScript::Refuse("openai API error 500: overloaded".into()))
        .shared();
    let xai = ScriptedClient::replying("xai", "from xai").shared();
    let manager = manager_with(&[openai, xai]);

    let text = collect_stream_text(manager.generate_text("q", Some("openai"), None))
        .await
        .unwrap();
    assert_eq!(text, "from xai");
}

#[tokio::test]
async fn test_all_providers_failing_ends_with_in_band_error() {
    let openai = ScriptedClient::failing("openai", "openai API error 500: down").shared();
    let xai = ScriptedClient::failing("xai", "xai network timeout").shared();
    let manager = manager_with(&[openai, xai]);

    let events = collect_events(&manager, None).await;

    assert_eq!(
        events.iter().filter(|e| matches!(e, StreamEvent::Failover { .. })).count(),
        1
    );
    match events.last() {
        Some(StreamEvent::Error {
            provider: Some(provider),
            message,
        }) => {
            assert_eq!(provider, "xai");
            assert!(message.contains("timeout"));
        }
        other => panic!("expected in-band error, got {:?}", other),
    }
    assert!(manager.available_providers().is_empty());
}

#[tokio::test]
async fn test_stream_with_no_providers() {
    let manager = manager_with(&[]);
    let events = collect_events(&manager, None).await;
    assert_eq!(
        events,
        vec![StreamEvent::Error {
            provider: None,
            message: "no providers available".into()
        }]
    );

    let err = collect_stream_text(futures::stream::iter(events)).await.unwrap_err();
    assert!(matches!(err, AppError::ProviderUnavailable(_)));
}

#[tokio::test]
async fn test_stream_round_robins_between_requests() {
    let openai = ScriptedClient::replying("openai", "a").shared();
    let xai = ScriptedClient::replying("xai", "b").shared();
    let manager = manager_with(&[openai.clone(), xai.clone()]);

    let first = collect_stream_text(manager.generate_text("q", None, None)).await.unwrap();
    let second = collect_stream_text(manager.generate_text("q", None, None)).await.unwrap();

    assert_eq!((first.as_str(), second.as_str()), ("a", "b"));
    assert_eq!(openai.stream_calls(), 1);
    assert_eq!(xai.stream_calls(), 1);
}

// ============= cost accounting =============

#[tokio::test]
async fn test_total_cost_matches_sum_of_actual_records() {
    let pricing = HashMap::from([(
        "gpt-4o-mini".to_string(),
        ModelPricing {
            input_per_1k: 0.15,
            output_per_1k: 0.6,
        },
    )]);
    let ledger = Arc::new(CostLedger::new(pricing));
    let openai = ScriptedClient::replying("openai", "answer")
        .with_model("gpt-4o-mini")
        .with_usage(120, 40)
        .shared();
    let manager = manager_with(&[openai]).with_cost_tracker(ledger.clone());

    assert_eq!(manager.total_cost(), 0.0);

    for _ in 0..4 {
        manager.get_response("openai", "hi", None).await.unwrap();
    }

    let actual: Vec<_> = ledger
        .records()
        .into_iter()
        .filter(|r| r.kind == labrelay::llm::CostKind::Actual)
        .collect();
    assert_eq!(actual.len(), 4);
    let sum: f64 = actual.iter().map(|r| r.cost).sum();
    assert!((manager.total_cost() - sum).abs() < 1e-12);
    assert!((ledger.cost_by_provider()["openai"] - sum).abs() < 1e-12);
    assert!((ledger.cost_by_model()["gpt-4o-mini"] - sum).abs() < 1e-12);

    // one estimate precedes every call
    assert_eq!(ledger.records().len(), 8);
}

#[tokio::test]
async fn test_failed_calls_record_estimates_only() {
    let ledger = Arc::new(CostLedger::default());
    let openai = ScriptedClient::failing("openai", "bad request").shared();
    let manager = manager_with(&[openai]).with_cost_tracker(ledger.clone());

    let _ = manager.get_response("openai", "hi", None).await;

    assert!(ledger
        .records()
        .iter()
        .all(|r| r.kind == labrelay::llm::CostKind::Estimated));
    assert_eq!(manager.total_cost(), 0.0);
}

// ============= fan-out, embeddings, estimates =============

#[tokio::test]
async fn test_respond_all_honours_mentions() {
    let openai = ScriptedClient::replying("openai", "from openai").shared();
    let xai = ScriptedClient::replying("xai", "from xai").shared();
    let manager = manager_with(&[openai.clone(), xai.clone()]);

    let replies = manager.respond_all("@xai what do you think?", None).await;

    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].provider, "xai");
    assert_eq!(replies[0].result.as_deref().unwrap(), "from xai");
    assert_eq!(openai.calls(), 0);
}

#[tokio::test]
async fn test_respond_all_engaging_question_reaches_everyone() {
    let openai = ScriptedClient::replying("openai", "one").shared();
    let xai = ScriptedClient::replying("xai", "two").shared();
    let manager = manager_with(&[openai, xai]);

    let replies = manager
        .respond_all("What is your opinion on this approach?", None)
        .await;

    let providers: Vec<_> = replies.iter().map(|r| r.provider.as_str()).collect();
    assert_eq!(providers, vec!["openai", "xai"]);
    assert!(replies.iter().all(|r| r.result.is_ok()));
}

#[tokio::test]
async fn test_embed_and_estimate() {
    let openai = ScriptedClient::replying("openai", "x").shared();
    let manager = manager_with(&[openai]);

    let vector = manager.embed(Some("openai"), "abcd").await.unwrap();
    assert_eq!(vector, vec![4.0, 1.0]);

    assert_eq!(manager.estimate_tokens("openai", "12345678"), 2);
    assert_eq!(manager.estimate_tokens("missing", "12345678"), 0);
    assert!(manager.embed(Some("missing"), "x").await.is_err());
}
