use super::*;
use crate::streaming::{consume_resume_stream, ResumeStreamEvent};
use crate::types::{ExecutionState, ResumeAction, ResumeData};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> ExecutionClient {
    ExecutionClient::builder()
        .base_url(server.uri())
        .bearer_token("test-token")
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_status_request() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/execution/status/thread-1"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "thread_id": "thread-1",
            "status": "interrupted",
            "current_node": "ask_human",
            "interrupts": [{"id": "int-1", "type": "ask_human", "data": {"question": "Proceed?"}}],
            "checkpoints": 3
        })))
        .expect(1)
        .mount(&server)
        .await;

    let status = client(&server).status("thread-1").await.unwrap();
    assert_eq!(status.status, ExecutionState::Interrupted);
    assert_eq!(status.current_node.as_deref(), Some("ask_human"));
    assert_eq!(status.interrupts[0].id, "int-1");
    assert_eq!(status.checkpoints, 3);
    assert!(status.durable);
}

#[tokio::test]
async fn test_status_body_without_thread_id() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/execution/status/thread-9"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "running"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let status = client(&server).status("thread-9").await.unwrap();
    assert_eq!(status.thread_id, "thread-9");
    assert_eq!(status.status, ExecutionState::Running);
}

#[tokio::test]
async fn test_history_with_limit() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/execution/history/thread-1"))
        .and(query_param("limit", "10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "thread_id": "thread-1",
            "checkpoints": [
                {"checkpoint_id": "cp-1", "node": "agent", "timestamp": "2024-01-01T00:00:00Z"},
                {"checkpoint_id": "cp-2", "node": "tools"}
            ],
            "total": 2
        })))
        .expect(1)
        .mount(&server)
        .await;

    let history = client(&server).history("thread-1", Some(10)).await.unwrap();
    assert_eq!(history.checkpoints.len(), 2);
    assert_eq!(history.checkpoints[1].checkpoint_id, "cp-2");
    assert_eq!(history.total, Some(2));
}

#[tokio::test]
async fn test_health() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/execution/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "healthy",
            "durable_execution": true
        })))
        .mount(&server)
        .await;

    let health = client(&server).health().await.unwrap();
    assert!(health.is_healthy());
    assert!(health.durable_execution);
}

#[tokio::test]
async fn test_error_body_detail() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/execution/status/missing"))
        .respond_with(
            ResponseTemplate::new(404)
                .set_body_json(serde_json::json!({"detail": "Thread missing not found"})),
        )
        .mount(&server)
        .await;

    let err = client(&server).status("missing").await.unwrap_err();
    match err {
        ExecutionError::Http { status, message } => {
            assert_eq!(status, 404);
            assert_eq!(message, "Thread missing not found");
        }
        other => panic!("Expected Http error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_malformed_success_body() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/execution/status/t"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let err = client(&server).status("t").await.unwrap_err();
    assert!(matches!(err, ExecutionError::InvalidResponse(_)));
}

#[tokio::test]
async fn test_rollback_success() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/execution/rollback/thread-1"))
        .and(query_param("checkpoint_id", "cp-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": true,
            "message": "Rolled back to cp-1",
            "thread_id": "thread-1",
            "checkpoint_id": "cp-1"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let result = client(&server).rollback("thread-1", "cp-1").await.unwrap();
    assert!(result.success);
    assert_eq!(result.message, "Rolled back to cp-1");
}

#[tokio::test]
async fn test_rollback_handled_statuses() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/execution/rollback/thread-1"))
        .and(query_param("checkpoint_id", "gone"))
        .respond_with(
            ResponseTemplate::new(404)
                .set_body_json(serde_json::json!({"detail": "Checkpoint not found"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/execution/rollback/thread-1"))
        .and(query_param("checkpoint_id", "busy"))
        .respond_with(ResponseTemplate::new(409))
        .mount(&server)
        .await;

    let client = client(&server);

    let missing = client.rollback("thread-1", "gone").await.unwrap();
    assert!(!missing.success);
    assert_eq!(missing.message, "Checkpoint not found");
    assert_eq!(missing.checkpoint_id.as_deref(), Some("gone"));

    let conflict = client.rollback("thread-1", "busy").await.unwrap();
    assert!(!conflict.success);
    assert_eq!(conflict.message, "HTTP 409");
}

#[tokio::test]
async fn test_rollback_server_error_is_not_handled() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/execution/rollback/thread-1"))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(serde_json::json!({"error": "boom"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server).rollback("thread-1", "cp-1").await.unwrap_err();
    assert_eq!(err.status(), Some(500));
}

#[tokio::test]
async fn test_resume_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/execution/resume"))
        .and(body_json(serde_json::json!({
            "thread_id": "thread-1",
            "action": "continue",
            "interrupt_id": "int-1",
            "resume_data": {"approved": true}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": true,
            "thread_id": "thread-1",
            "status": "running"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let request = ResumeRequest::new("thread-1", ResumeAction::Continue)
        .interrupt("int-1")
        .data(ResumeData::approval(true));
    let result = client(&server).resume(&request).await.unwrap();
    assert!(result.success);
    assert_eq!(result.status, Some(ExecutionState::Running));
}

#[tokio::test]
async fn test_resume_stream() {
    let server = MockServer::start().await;

    let body = concat!(
        "data: {\"type\":\"resume_start\",\"thread_id\":\"thread-1\"}\n\n",
        "data: {\"type\":\"graph_update\",\"data\":{\"agent\":{\"messages\":[]}}}\n\n",
        "data: {\"type\":\"resume_end\",\"status\":\"completed\"}\n\n",
        "data: [DONE]\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/api/execution/resume-stream"))
        .and(header("accept", "text/event-stream"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(body),
        )
        .expect(1)
        .mount(&server)
        .await;

    let request = ResumeRequest::new("thread-1", ResumeAction::Continue);
    let stream = client(&server).resume_stream(&request).await.unwrap();

    let seen = parking_lot::Mutex::new(Vec::new());
    let callbacks = |e: &ResumeStreamEvent| seen.lock().push(e.clone());
    let summary = consume_resume_stream(stream, &callbacks).await.unwrap();

    assert_eq!(summary.events, 3);
    assert!(summary.done_received);
    assert!(matches!(seen.lock()[1], ResumeStreamEvent::GraphUpdate(_)));
}

#[tokio::test]
async fn test_resume_stream_error_status() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/execution/resume-stream"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(serde_json::json!({"message": "No interrupt to resume"})),
        )
        .mount(&server)
        .await;

    let request = ResumeRequest::new("thread-1", ResumeAction::Skip);
    let result = client(&server).resume_stream(&request).await;
    match result {
        Err(ExecutionError::Http { status, message }) => {
            assert_eq!(status, 400);
            assert_eq!(message, "No interrupt to resume");
        }
        Err(other) => panic!("Expected Http error, got {:?}", other),
        Ok(_) => panic!("Expected an error"),
    }
}

#[tokio::test]
async fn test_token_source_consulted_per_request() {
    struct Counting(std::sync::atomic::AtomicUsize);

    #[async_trait]
    impl TokenSource for Counting {
        async fn token(&self) -> Option<String> {
            let n = self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Some(format!("token-{}", n))
        }
    }

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/execution/health"))
        .and(header("authorization", "Bearer token-0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "ok"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/execution/health"))
        .and(header("authorization", "Bearer token-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "ok"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = ExecutionClient::builder()
        .base_url(server.uri())
        .token_source(Arc::new(Counting(std::sync::atomic::AtomicUsize::new(0))))
        .build()
        .unwrap();

    client.health().await.unwrap();
    client.health().await.unwrap();
}

#[tokio::test]
async fn test_connection_refused_is_network_error() {
    let client = ExecutionClient::new("http://127.0.0.1:1").unwrap();
    let err = client.status("t").await.unwrap_err();
    assert!(matches!(err, ExecutionError::Network(_)));
}
