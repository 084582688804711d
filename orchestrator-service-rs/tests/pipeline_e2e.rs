//! End-to-end pipeline runs with scripted tool transports.
//!
//! No test here touches the network: primaries are either unconfigured or
//! scripted, and every fallback is the deterministic local stand-in.

mod support;

use std::sync::Arc;
use std::time::Duration;

use orchestrator_service::{
    OrchestrationError, PipelineSettings, SubmitRequest, WorkflowOrchestrator,
};
use shared_types_rs::{
    ActionStatus, OverallStatus, Request, StageName, StagePayload, StageStatus, StatusRecord,
};
use tool_sdk::registry::default_catalog;
use tool_sdk::{capability, FallbackStrategy, MemoryConfigProvider, ToolRegistry};

use support::{offline_orchestrator, offline_registry, orchestrator, quick_retry, ScriptedInvoker};

fn request(text: &str, id: &str) -> Request {
    Request::new(text, Some(id.to_string())).unwrap()
}

fn action_statuses(record: &StatusRecord) -> Vec<ActionStatus> {
    let result = record.result.as_ref().expect("completed workflow has a result");
    match &result.find(StageName::Action).expect("action envelope").payload {
        StagePayload::Actions { executed_actions, .. } => {
            executed_actions.iter().map(|a| a.status).collect()
        }
        other => panic!("unexpected payload: {:?}", other),
    }
}

async fn wait_for_stage(orchestrator: &WorkflowOrchestrator, id: &str, stage: StageName) {
    for _ in 0..200 {
        let record = orchestrator.status(id).unwrap();
        if record.stage_status(stage) == StageStatus::Running {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("{} never started", stage);
}

#[tokio::test]
async fn test_offline_run_completes_through_fallbacks() {
    let orchestrator = WorkflowOrchestrator::from_providers(
        &MemoryConfigProvider::new(),
        &MemoryConfigProvider::new(),
    )
    .unwrap();

    let record = orchestrator.run(request("AI policy news", "r-offline")).await.unwrap();

    assert_eq!(record.overall_status, OverallStatus::Completed);
    assert_eq!(record.terminal_reason, None);
    for stage in StageName::ALL {
        assert_eq!(record.stage_status(stage), StageStatus::Succeeded);
    }

    let order: Vec<StageName> = record.stage_history.iter().map(|r| r.stage_name).collect();
    assert_eq!(order, StageName::ALL.to_vec());
    for pair in record.stage_history.windows(2) {
        assert!(pair[0].ended_at.unwrap() <= pair[1].started_at.unwrap());
    }

    let report = record.result.as_ref().unwrap();
    assert_eq!(report.lineage().count(), 4);
    assert!(report.lineage().all(|envelope| !envelope.used_fallback.is_empty()));
    let trail = report.fallback_trail();
    for name in [capability::WEB_SEARCH, capability::ANALYSIS, capability::STORAGE] {
        assert!(trail.contains(name));
    }

    match &report.payload {
        StagePayload::Report {
            report_refs,
            delivery_results,
            ..
        } => {
            assert_eq!(report_refs.len(), 3);
            assert_eq!(delivery_results.len(), 3);
        }
        other => panic!("unexpected payload: {:?}", other),
    }

    match &report.find(StageName::Collector).unwrap().payload {
        StagePayload::Collected { query, sources, .. } => {
            assert_eq!(query, "policy news");
            assert!(!sources.is_empty());
        }
        other => panic!("unexpected payload: {:?}", other),
    }
    assert_eq!(action_statuses(&record).len(), 3);
    assert_eq!(orchestrator.resolver_metrics()["primary_success"], "0");
}

#[tokio::test]
async fn test_requests_without_content_words_complete_offline() {
    let orchestrator = WorkflowOrchestrator::from_providers(
        &MemoryConfigProvider::new(),
        &MemoryConfigProvider::new(),
    )
    .unwrap();

    for (id, text) in [("r-ai", "AI"), ("r-5g", "What is 5G?")] {
        let record = orchestrator.run(request(text, id)).await.unwrap();
        assert_eq!(record.overall_status, OverallStatus::Completed, "{}", text);

        let report = record.result.as_ref().unwrap();
        match &report.find(StageName::Collector).unwrap().payload {
            StagePayload::Collected { sources, dropped, .. } => {
                assert_eq!(*dropped, 0);
                assert!(sources.iter().all(|s| s.relevance_score > 0.0));
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }
}

#[tokio::test]
async fn test_failed_extraction_skips_only_that_source() {
    let fallback = Arc::new(
        ScriptedInvoker::new().fail_when(capability::CONTENT_EXTRACTION, "search/policy-news/2"),
    );
    let orchestrator = offline_orchestrator(fallback);

    let record = orchestrator.run(request("AI policy news", "r-skip")).await.unwrap();

    assert_eq!(record.overall_status, OverallStatus::Completed);
    let report = record.result.as_ref().unwrap();
    match &report.find(StageName::Collector).unwrap().payload {
        StagePayload::Collected { sources, failed, discovered, .. } => {
            assert_eq!(*discovered, 3);
            assert_eq!(*failed, 1);
            assert_eq!(sources.len(), 2);
            assert!(sources.iter().all(|s| !s.source_id.ends_with("policy-news/2")));
        }
        other => panic!("unexpected payload: {:?}", other),
    }
}

#[tokio::test]
async fn test_unavailable_extraction_stops_the_pipeline() {
    let primary = Arc::new(ScriptedInvoker::new().fail(capability::CONTENT_EXTRACTION));
    let mut builder = ToolRegistry::builder();
    for (role, descriptor) in default_catalog() {
        let descriptor = if descriptor.capability_name == capability::CONTENT_EXTRACTION {
            descriptor
                .endpoint("http://extract.invalid")
                .fallback(FallbackStrategy::None)
        } else {
            descriptor
        };
        builder = builder.capability(role, descriptor);
    }
    let builder = builder
        .credentials_from(&MemoryConfigProvider::new().with("FIRECRAWL_API_KEY", "key"))
        .primary_invoker(primary.clone())
        .retry_config(quick_retry());
    let orchestrator = orchestrator(builder, PipelineSettings::default());

    let record = orchestrator.run(request("AI policy news", "r-fail")).await.unwrap();

    assert_eq!(record.overall_status, OverallStatus::Failed);
    assert_eq!(record.stage_history.len(), 1);
    let collector = record.stage_record(StageName::Collector).unwrap();
    assert_eq!(collector.status, StageStatus::Failed);
    assert!(collector.error_summary.as_deref().unwrap().contains("content_extraction"));
    for stage in [StageName::Processor, StageName::Action, StageName::Reporter] {
        assert_eq!(record.stage_status(stage), StageStatus::Pending);
    }
    assert!(record.result.is_none());
    assert!(record.terminal_reason.as_deref().unwrap().starts_with("collector failed"));

    // only extraction reaches the primary; nothing after the collector runs
    assert!(primary.calls().iter().all(|c| c == capability::CONTENT_EXTRACTION));
}

#[tokio::test]
async fn test_duplicate_id_rejected_while_in_flight() {
    let fallback = Arc::new(ScriptedInvoker::new().delay(capability::WEB_SEARCH, Duration::from_millis(200)));
    let orchestrator = offline_orchestrator(fallback);

    let handle = orchestrator
        .submit(SubmitRequest::new("AI policy news").with_id("r1"))
        .unwrap();
    let err = orchestrator
        .submit(SubmitRequest::new("something else").with_id("r1"))
        .unwrap_err();
    assert!(matches!(err, OrchestrationError::DuplicateRequest(ref id) if id == "r1"));

    let record = handle.wait().await.unwrap();
    assert_eq!(record.overall_status, OverallStatus::Completed);

    // still reserved within the retention window
    assert!(orchestrator.run(request("again", "r1")).await.is_err());
}

#[tokio::test]
async fn test_action_stage_survives_partial_failure() {
    let fallback = Arc::new(
        ScriptedInvoker::new()
            .fail_when(capability::STORAGE, "improve_data_quality")
            .fail_when(capability::STORAGE, "follow_up_insight"),
    );
    let orchestrator = offline_orchestrator(fallback);

    let record = orchestrator.run(request("AI policy news", "r-partial")).await.unwrap();

    assert_eq!(record.overall_status, OverallStatus::Completed);
    assert_eq!(
        action_statuses(&record),
        vec![ActionStatus::Failed, ActionStatus::Failed, ActionStatus::Succeeded]
    );
}

#[tokio::test]
async fn test_action_stage_fails_when_every_action_fails() {
    let fallback = Arc::new(ScriptedInvoker::new().fail(capability::STORAGE));
    let orchestrator = offline_orchestrator(fallback);

    let record = orchestrator.run(request("AI policy news", "r-none")).await.unwrap();

    assert_eq!(record.overall_status, OverallStatus::Failed);
    assert_eq!(record.stage_status(StageName::Processor), StageStatus::Succeeded);
    assert_eq!(record.stage_status(StageName::Action), StageStatus::Failed);
    assert_eq!(record.stage_status(StageName::Reporter), StageStatus::Pending);
    let summary = record.stage_record(StageName::Action).unwrap().error_summary.clone().unwrap();
    assert!(summary.contains("none of the 3 planned actions succeeded"));
}

#[tokio::test]
async fn test_terminal_snapshots_are_stable() {
    let orchestrator = offline_orchestrator(Arc::new(ScriptedInvoker::new()));
    orchestrator.run(request("AI policy news", "r-stable")).await.unwrap();

    let first = orchestrator.status("r-stable").unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    let second = orchestrator.status("r-stable").unwrap();

    assert_eq!(first, second);
    assert!(!orchestrator.cancel("r-stable").unwrap());
    assert_eq!(orchestrator.status("r-stable").unwrap(), first);
}

#[tokio::test]
async fn test_cancel_stops_before_next_stage() {
    let fallback = Arc::new(ScriptedInvoker::new().delay(capability::WEB_SEARCH, Duration::from_millis(200)));
    let orchestrator = offline_orchestrator(fallback.clone());

    let handle = orchestrator
        .submit(SubmitRequest::new("AI policy news").with_id("r-cancel"))
        .unwrap();
    wait_for_stage(&orchestrator, "r-cancel", StageName::Collector).await;
    assert!(orchestrator.cancel("r-cancel").unwrap());

    let record = handle.wait().await.unwrap();
    assert_eq!(record.overall_status, OverallStatus::Failed);
    assert_eq!(record.terminal_reason.as_deref(), Some("cancelled"));
    assert_eq!(record.stage_status(StageName::Collector), StageStatus::Succeeded);
    assert_eq!(record.stage_status(StageName::Processor), StageStatus::Pending);
    assert!(!fallback.calls().iter().any(|c| c == capability::ANALYSIS));
}

#[tokio::test]
async fn test_stage_timeout_fails_the_stage() {
    let fallback = Arc::new(ScriptedInvoker::new().delay(capability::ANALYSIS, Duration::from_secs(5)));
    let settings = PipelineSettings {
        stage_timeout: Duration::from_millis(300),
        ..PipelineSettings::default()
    };
    let orchestrator = orchestrator(offline_registry(fallback), settings);

    let record = orchestrator.run(request("AI policy news", "r-slow")).await.unwrap();

    assert_eq!(record.overall_status, OverallStatus::Failed);
    let processor = record.stage_record(StageName::Processor).unwrap();
    assert_eq!(processor.status, StageStatus::Failed);
    assert!(processor.error_summary.as_deref().unwrap().contains("timed out"));
    assert_eq!(record.stage_status(StageName::Action), StageStatus::Pending);
}

#[tokio::test]
async fn test_invalid_and_unknown_requests() {
    let orchestrator = offline_orchestrator(Arc::new(ScriptedInvoker::new()));

    let err = orchestrator.submit(SubmitRequest::new("   ")).unwrap_err();
    assert!(matches!(err, OrchestrationError::InvalidRequest(_)));
    assert!(orchestrator.list_statuses().is_empty());

    assert!(matches!(
        orchestrator.status("missing"),
        Err(OrchestrationError::NotFound(_))
    ));
    assert!(matches!(
        orchestrator.cancel("missing"),
        Err(OrchestrationError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_concurrent_requests_run_independently() {
    let orchestrator = offline_orchestrator(Arc::new(ScriptedInvoker::new()));

    let handles: Vec<_> = (0..5)
        .map(|i| {
            orchestrator
                .submit(SubmitRequest::new(format!("AI policy news part {}", i)))
                .unwrap()
        })
        .collect();
    for handle in handles {
        let id = handle.request_id.clone();
        let record = handle.wait().await.unwrap();
        assert_eq!(record.request_id, id);
        assert!(id.starts_with("req_"));
        assert_eq!(record.overall_status, OverallStatus::Completed);
    }

    assert_eq!(orchestrator.list_statuses().len(), 5);
}
