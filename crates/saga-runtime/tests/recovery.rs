mod common;

use std::sync::Arc;

use tokio::sync::Notify;

use saga_core::{ErrorCode, SagaEvent, SessionId};
use saga_llm::AgentError;
use saga_runtime::SessionPhase;

use common::{Harness, Step, test_config, types};

#[tokio::test]
async fn stale_handle_recovers_with_context() {
    let mut h = Harness::new(test_config()).await;
    let session = h.orchestrator.open_session(SessionId::from("s1")).await.unwrap();
    let _ = session.submit_input("open the gate").await.unwrap();
    session.wait_idle().await.unwrap();
    let _ = h.drain_events();

    h.agent.push(Step::HandleInvalid);
    let _ = session.submit_input("look around").await.unwrap();
    session.wait_idle().await.unwrap();

    let requests = h.agent.requests();
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[1].handle.as_deref(), Some("h-1"));
    assert!(requests[2].handle.is_none());
    let context = requests[2].context.as_deref().unwrap();
    assert!(context.contains("[PLAYER] open the gate"));
    assert_eq!(requests[2].input, "look around");

    let events = h.drain_events();
    assert!(events.iter().any(|e| matches!(e, SagaEvent::RecoveryStarted { attempt: 1, .. })));
    assert!(types(&events).contains(&"recovery_complete"));

    let record = h.store.record("s1").await;
    assert_eq!(record.recovery_attempts, 0);
    assert_eq!(record.handle.as_deref(), Some("h-3"));
    assert_eq!(record.history.len(), 4);
}

#[tokio::test]
async fn second_invalidation_is_fatal() {
    let mut h = Harness::new(test_config()).await;
    let session = h.orchestrator.open_session(SessionId::from("s1")).await.unwrap();
    let _ = session.submit_input("open the gate").await.unwrap();
    session.wait_idle().await.unwrap();
    let _ = h.drain_events();

    h.agent.push(Step::HandleInvalid);
    h.agent.push(Step::HandleInvalid);
    let _ = session.submit_input("look around").await.unwrap();
    session.wait_idle().await.unwrap();

    assert_eq!(h.agent.requests().len(), 3);
    let events = h.drain_events();
    let recoveries = events
        .iter()
        .filter(|e| matches!(e, SagaEvent::RecoveryStarted { .. }))
        .count();
    assert_eq!(recoveries, 1);
    assert!(events.iter().any(|e| matches!(
        e,
        SagaEvent::Error { code: ErrorCode::HandleInvalid, retryable: false, input: Some(i), .. }
            if i == "look around"
    )));

    let record = h.store.record("s1").await;
    assert_eq!(record.history.len(), 2);
    assert_eq!(record.recovery_attempts, 1);
    assert!(record.handle.is_none());

    // the next successful turn clears the counter
    let _ = session.submit_input("try again").await.unwrap();
    session.wait_idle().await.unwrap();
    let record = h.store.record("s1").await;
    assert_eq!(record.recovery_attempts, 0);
    assert_eq!(record.history.len(), 4);
    assert!(h.agent.requests()[3].context.is_some());
}

#[tokio::test]
async fn counter_persisted_before_reissue() {
    let mut h = Harness::new(test_config()).await;
    let session = h.orchestrator.open_session(SessionId::from("s1")).await.unwrap();
    let _ = session.submit_input("open the gate").await.unwrap();
    session.wait_idle().await.unwrap();

    let gate = Arc::new(Notify::new());
    h.agent.push(Step::HandleInvalid);
    h.agent.push(Step::gated(&gate, "You look around."));
    let _ = session.submit_input("look around").await.unwrap();
    let _ = h
        .wait_for(|e| matches!(e, SagaEvent::RecoveryStarted { .. }))
        .await;

    // the reissued generation is ordinary processing again
    let status = session.status().await.unwrap();
    assert_eq!(status.phase, SessionPhase::Processing);
    assert!(!status.has_handle);
    assert!(h.agent.requests()[2].handle.is_none());
    let stored = h.store.record("s1").await;
    assert_eq!(stored.recovery_attempts, 1);
    assert!(stored.handle.is_none());

    gate.notify_one();
    session.wait_idle().await.unwrap();
    assert_eq!(h.store.record("s1").await.recovery_attempts, 0);
}

#[tokio::test]
async fn transient_error_does_not_recover() {
    let mut h = Harness::new(test_config()).await;
    let session = h.orchestrator.open_session(SessionId::from("s1")).await.unwrap();
    let _ = session.submit_input("open the gate").await.unwrap();
    session.wait_idle().await.unwrap();

    h.agent.push(Step::Fail(AgentError::Api {
        status: 503,
        message: "overloaded".into(),
        code: None,
        retryable: true,
    }));
    let _ = session.submit_input("look around").await.unwrap();
    session.wait_idle().await.unwrap();

    assert_eq!(h.agent.requests().len(), 2);
    assert!(!types(&h.drain_events()).contains(&"recovery_started"));
    let record = h.store.record("s1").await;
    assert_eq!(record.handle.as_deref(), Some("h-1"));
    assert_eq!(record.recovery_attempts, 0);
}
