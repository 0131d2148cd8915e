//! Engine client behavior against a local HTTP stub: terminal error
//! histories, hung responses, and overloaded-engine status codes.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_matches::assert_matches;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use uuid::Uuid;

use prism_core::retry::PollPolicy;
use prism_engine::{await_completion, EngineClient, EngineError, SessionRegistry};

/// Serve one canned response per accepted connection, logging each raw
/// request. Responses carry `Connection: close` so the client opens a
/// fresh connection per request.
async fn spawn_stub(responses: Vec<String>) -> (String, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    let requests = Arc::new(Mutex::new(Vec::new()));

    let log = Arc::clone(&requests);
    tokio::spawn(async move {
        for response in responses {
            let Ok((mut sock, _)) = listener.accept().await else {
                return;
            };
            let request = read_request(&mut sock).await;
            log.lock().unwrap().push(request);
            let _ = sock.write_all(response.as_bytes()).await;
            let _ = sock.shutdown().await;
        }
    });

    (base_url, requests)
}

/// Read one HTTP request: headers, then `Content-Length` bytes of body.
async fn read_request(sock: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = sock.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        let Some(header_end) = find(&buf, b"\r\n\r\n") else {
            continue;
        };
        let headers = String::from_utf8_lossy(&buf[..header_end]).to_lowercase();
        let content_length = headers
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        if buf.len() >= header_end + 4 + content_length {
            break;
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn json_response(status: &str, body: &serde_json::Value) -> String {
    let body = body.to_string();
    format!(
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
}

#[tokio::test]
async fn error_history_fails_the_wait_on_the_first_poll() {
    let history = json!({
        "p1": {
            "status": {
                "status_str": "error",
                "completed": false,
                "messages": [
                    ["execution_start", {}],
                    ["execution_error", {"exception_message": "CUDA out of memory"}]
                ]
            },
            "outputs": {}
        }
    });
    let (base_url, requests) = spawn_stub(vec![json_response("200 OK", &history)]).await;

    let client = EngineClient::new(base_url);
    let registry = SessionRegistry::new();
    let job_id = Uuid::new_v4();
    registry.register(job_id, "p1");

    let policy = PollPolicy {
        interval: Duration::from_millis(50),
        deadline: Duration::from_secs(5),
    };
    let result = await_completion(&client, &registry, job_id, "p1", &policy, |_| {}).await;

    assert_matches!(result, Err(EngineError::Execution(message)) if message == "CUDA out of memory");
    // Terminal on the spot: exactly one history request went out.
    assert_eq!(requests.lock().unwrap().len(), 1);
    assert_eq!(registry.get(job_id).map(|s| s.polls), Some(1));
}

#[tokio::test]
async fn hung_history_response_still_times_out_at_the_deadline() {
    // Accept the connection and hold the socket open without answering.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        let _held = listener.accept().await;
        std::future::pending::<()>().await;
    });

    let client = EngineClient::new(base_url);
    let registry = SessionRegistry::new();
    let job_id = Uuid::new_v4();
    registry.register(job_id, "p1");

    let policy = PollPolicy {
        interval: Duration::from_millis(50),
        deadline: Duration::from_millis(500),
    };
    let result = tokio::time::timeout(
        Duration::from_secs(5),
        await_completion(&client, &registry, job_id, "p1", &policy, |_| {}),
    )
    .await
    .expect("the deadline must bound a hung response");

    assert_matches!(result, Err(EngineError::Timeout(d)) if d == policy.deadline);
}

#[tokio::test]
async fn server_errors_on_submit_stay_retryable() {
    let (base_url, _) =
        spawn_stub(vec![json_response("503 Service Unavailable", &json!({"error": "overloaded"}))])
            .await;

    let client = EngineClient::new(base_url);
    let graph = prism_compiler::PromptGraph::default();
    let result = client.submit_prompt(&graph, "test-client").await;

    let error = result.unwrap_err();
    assert_matches!(error, EngineError::Unavailable(_));
    assert!(error.is_transient());
}

#[tokio::test]
async fn client_errors_on_submit_are_terminal() {
    let (base_url, _) =
        spawn_stub(vec![json_response("400 Bad Request", &json!({"error": "bad graph"}))]).await;

    let client = EngineClient::new(base_url);
    let graph = prism_compiler::PromptGraph::default();
    let result = client.submit_prompt(&graph, "test-client").await;

    let error = result.unwrap_err();
    assert_matches!(error, EngineError::Rejected(_));
    assert!(!error.is_transient());
}
