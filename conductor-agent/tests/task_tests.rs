// ABOUTME: Tests for WorkerTask lifecycle, event fan-out, and start/kill races using the mock backend.
// ABOUTME: No real agent processes are spawned.

use conductor_agent::backends::{BackendKind, BackendSpec, MockConfig};
use conductor_agent::{AgentEvent, EventReceiver, LifecycleState, WorkerError, WorkerTask};
use std::time::Duration;

fn assert_send<T: Send>() {}
fn assert_sync<T: Sync>() {}

fn mock_task(id: &str, config: MockConfig) -> WorkerTask {
    WorkerTask::new(id, BackendSpec::Mock(config))
}

/// Collect events until the turn ends
async fn collect_turn(events: &mut EventReceiver) -> Vec<AgentEvent> {
    let mut collected = Vec::new();
    while let Ok(Some(event)) = tokio::time::timeout(Duration::from_secs(5), events.recv()).await
    {
        let done = event.is_turn_end();
        collected.push(event);
        if done {
            break;
        }
    }
    collected
}

#[test]
fn test_worker_task_is_send_sync() {
    assert_send::<WorkerTask>();
    assert_sync::<WorkerTask>();
    assert_send::<EventReceiver>();
}

#[tokio::test]
async fn test_new_task_is_idle() {
    let task = mock_task("conv-1", MockConfig::new());
    assert_eq!(task.state(), LifecycleState::Idle);
    assert_eq!(task.kind(), BackendKind::Mock);
    assert_eq!(task.conversation_id(), "conv-1");
}

#[tokio::test]
async fn test_send_input_before_start_fails() {
    let task = mock_task("conv-1", MockConfig::new());
    let result = task.send_input("hello").await;
    assert!(matches!(result, Err(WorkerError::NotStarted)));
}

#[tokio::test]
async fn test_start_reaches_running_and_announces_session() {
    let task = mock_task("conv-1", MockConfig::new());
    let mut events = task.subscribe();

    task.start().await.unwrap();
    assert_eq!(task.state(), LifecycleState::Running);

    let first = events.recv().await.unwrap();
    match first {
        AgentEvent::SessionConfigured { session_id } => {
            assert!(session_id.starts_with("mock-session-"))
        }
        other => panic!("expected session_configured, got {:?}", other),
    }
}

#[tokio::test]
async fn test_concurrent_starts_both_succeed() {
    let task = mock_task("conv-1", MockConfig::new());
    let (a, b) = tokio::join!(task.start(), task.start());
    assert!(a.is_ok());
    assert!(b.is_ok());
    assert_eq!(task.state(), LifecycleState::Running);
}

#[tokio::test]
async fn test_events_arrive_in_order() {
    let mock = MockConfig::new().respond_text("hello", "Hi there!");
    let task = mock_task("conv-1", mock);
    let mut events = task.subscribe();

    task.start().await.unwrap();
    task.send_input("hello world").await.unwrap();

    let turn = collect_turn(&mut events).await;
    let types: Vec<&str> = turn.iter().map(|e| e.event_type()).collect();
    assert_eq!(
        types,
        vec!["session_configured", "agent_message_delta", "task_complete"]
    );
    assert!(matches!(
        &turn[2],
        AgentEvent::TaskComplete { last_message: Some(m), .. } if m == "Hi there!"
    ));
}

#[tokio::test]
async fn test_unmatched_prompt_gets_default_reply() {
    let task = mock_task("conv-1", MockConfig::new());
    let mut events = task.subscribe();

    task.start().await.unwrap();
    task.send_input("anything").await.unwrap();

    let turn = collect_turn(&mut events).await;
    assert!(turn.iter().any(|e| matches!(
        e,
        AgentEvent::AgentMessageDelta { delta } if delta.contains("no expectation")
    )));
}

#[tokio::test]
async fn test_kill_before_start_is_terminal() {
    let task = mock_task("conv-1", MockConfig::new());
    task.kill();
    assert_eq!(task.state(), LifecycleState::Killed);

    let result = task.start().await;
    assert!(matches!(result, Err(WorkerError::Terminated)));
    assert_eq!(task.state(), LifecycleState::Killed);
}

#[tokio::test]
async fn test_kill_is_idempotent() {
    let task = mock_task("conv-1", MockConfig::new());
    task.start().await.unwrap();

    task.kill();
    task.kill();
    assert_eq!(task.state(), LifecycleState::Killed);

    let result = task.send_input("hello").await;
    assert!(matches!(result, Err(WorkerError::Terminated)));
}

#[tokio::test]
async fn test_event_stream_ends_after_kill() {
    let task = mock_task("conv-1", MockConfig::new());
    let mut events = task.subscribe();
    task.start().await.unwrap();

    task.kill();

    // Buffered events are still delivered, then the stream ends
    let first = events.recv().await;
    assert!(matches!(first, Some(AgentEvent::SessionConfigured { .. })));
    let end = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap();
    assert!(end.is_none());
}

#[tokio::test]
async fn test_exit_after_marks_exited() {
    let mock = MockConfig::new()
        .respond_text("one", "first")
        .exit_after(1);
    let task = mock_task("conv-1", mock);
    let mut events = task.subscribe();

    task.start().await.unwrap();
    task.send_input("one").await.unwrap();

    let mut state = task.watch_state();
    tokio::time::timeout(
        Duration::from_secs(5),
        state.wait_for(|s| *s == LifecycleState::Exited),
    )
    .await
    .unwrap()
    .unwrap();

    let mut types = Vec::new();
    while let Some(event) = events.recv().await {
        types.push(event.event_type().to_string());
    }
    assert_eq!(
        types,
        vec!["session_configured", "agent_message_delta", "task_complete"]
    );

    // Exited is sticky
    task.kill();
    assert_eq!(task.state(), LifecycleState::Exited);
    assert!(matches!(
        task.send_input("two").await,
        Err(WorkerError::Terminated)
    ));
}

#[tokio::test]
async fn test_failed_start_reports_error_and_exits() {
    let task = mock_task("conv-1", MockConfig::new().fail_start("binary missing"));

    let result = task.start().await;
    match result {
        Err(WorkerError::StartFailed(message)) => assert_eq!(message, "binary missing"),
        other => panic!("expected StartFailed, got {:?}", other),
    }
    assert_eq!(task.state(), LifecycleState::Exited);
}

#[tokio::test]
async fn test_codex_start_fails_for_missing_working_dir() {
    let spec = BackendSpec::from_config(
        BackendKind::Codex,
        &serde_json::json!({"working_dir": "/nonexistent/conductor/dir"}),
    )
    .unwrap();
    let task = WorkerTask::new("conv-1", spec);

    let result = task.start().await;
    assert!(matches!(result, Err(WorkerError::StartFailed(_))));
    assert_eq!(task.state(), LifecycleState::Exited);
}

#[tokio::test]
async fn test_mock_spec_from_config_json() {
    let spec = BackendSpec::from_config(
        BackendKind::Mock,
        &serde_json::json!({
            "responses": [{
                "pattern": "ping",
                "events": [{"type": "task_complete", "payload": {"last_message": "pong"}}]
            }]
        }),
    )
    .unwrap();
    let task = WorkerTask::new("conv-1", spec);
    let mut events = task.subscribe();

    task.start().await.unwrap();
    task.send_input("ping").await.unwrap();

    let turn = collect_turn(&mut events).await;
    assert!(matches!(
        turn.last(),
        Some(AgentEvent::TaskComplete { last_message: Some(m), .. }) if m == "pong"
    ));
}
