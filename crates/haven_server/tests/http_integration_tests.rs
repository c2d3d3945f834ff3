//! Integration tests for the HTTP endpoints.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use haven_chat::mock::{RecordingImageAnalyzer, ScriptedGenerator};
use haven_chat::{ChatService, ModelSettings, CLARIFYING_QUESTION};
use haven_server::{app, AppState};
use tower::ServiceExt;

const BOUNDARY: &str = "haven-test-boundary";

enum Part<'a> {
    Text(&'a str, &'a str),
    File(&'a str, &'a str, &'a [u8]),
}

fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Part::File(name, content_type, bytes) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"photo\"\r\nContent-Type: {}\r\n\r\n",
                        name, content_type
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn post(uri: &str, parts: &[Part<'_>]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}

fn router(generator: &ScriptedGenerator) -> Router {
    let chat = ChatService::new(
        Arc::new(generator.clone()),
        Arc::new(RecordingImageAnalyzer::new()),
        &ModelSettings::default(),
    );
    app(AppState::new(chat), 1024 * 1024)
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_health() {
    let response = router(&ScriptedGenerator::new())
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_stream_endpoint_emits_deltas_then_end() {
    let generator = ScriptedGenerator::new()
        .with_completion("Tenancy Agreement Expert")
        .with_text_stream(&["**Tenancy Agreement Expert:**", " Rent is due monthly."]);

    let response = router(&generator)
        .oneshot(post(
            "/api/chat/multiagent/stream",
            &[Part::Text("text", "When is rent due?")],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/event-stream"
    );
    assert_eq!(response.headers().get(header::CACHE_CONTROL).unwrap(), "no-cache");

    let body = body_text(response).await;
    assert!(body.contains(r#""delta":"**Tenancy Agreement Expert:**""#), "{body}");
    assert!(body.contains(r#""agent":"Tenancy Agreement Expert""#));
    assert!(body.trim_end().ends_with("event: end\ndata: {}"), "{body}");
    assert_eq!(body.matches("event: end").count(), 1);
}

#[tokio::test]
async fn test_stream_endpoint_rejects_empty_turn() {
    let generator = ScriptedGenerator::new();
    let response = router(&generator)
        .oneshot(post("/api/chat/multiagent/stream", &[Part::Text("text", "  ")]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_text(response).await;
    assert!(body.contains(r#""error":"Please provide text or an image.""#), "{body}");
    assert!(body.contains(r#""agent":null"#));
    assert!(body.contains("event: end"));
    assert_eq!(generator.call_count(), 0);
}

#[tokio::test]
async fn test_stream_endpoint_failure_names_routed_agent() {
    let generator = ScriptedGenerator::new()
        .with_completion("Tenancy Agreement Expert")
        .with_stream_failure("429 Too Many Requests");

    let response = router(&generator)
        .oneshot(post(
            "/api/chat/multiagent/stream",
            &[Part::Text("text", "What happens if I break my lease early?")],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains(r#""agent":"Tenancy Agreement Expert""#), "{body}");
    assert!(body.contains("429 Too Many Requests"), "{body}");
    assert!(!body.contains(r#""agent":null"#), "{body}");
    assert!(body.trim_end().ends_with("event: end\ndata: {}"), "{body}");
}

#[tokio::test]
async fn test_stream_endpoint_routes_image_to_issue_detector() {
    let generator = ScriptedGenerator::new()
        .with_text_stream(&["**Property Issue Expert:**", " That is mold."]);

    let response = router(&generator)
        .oneshot(post(
            "/api/chat/multiagent/stream",
            &[
                Part::Text("text", "What is this?"),
                Part::File("image", "image/jpeg", b"\xff\xd8\xff"),
            ],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains(r#""agent":"Property Issue Detector""#), "{body}");
    assert!(generator.completion_requests().is_empty());
    assert_eq!(
        generator.stream_requests()[0].messages.last().unwrap().text(),
        "What is this? (See the attached image.)"
    );
}

#[tokio::test]
async fn test_json_endpoint_returns_reply() {
    let generator = ScriptedGenerator::new().with_completion("Query Clarification Agent");

    let response = router(&generator)
        .oneshot(post("/api/chat/multiagent", &[Part::Text("text", "Hello")]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(json["response"], CLARIFYING_QUESTION);
    assert_eq!(json["agent"], "Query Clarification Agent");
}

#[tokio::test]
async fn test_json_endpoint_uses_history_field() {
    let generator = ScriptedGenerator::new()
        .with_completion("Property Issue Detector")
        .with_text_stream(&["**Property Issue Expert:** Call a plumber."]);
    let history = r#"[{"role":"user","content":"Hi"},{"role":"assistant","content":"How can I help?"}]"#;

    let response = router(&generator)
        .oneshot(post(
            "/api/chat/multiagent",
            &[
                Part::Text("text", "The pipe burst"),
                Part::Text("history", history),
            ],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(generator.stream_requests()[0].messages.len(), 4);
}

#[tokio::test]
async fn test_json_endpoint_ignores_malformed_history() {
    let generator = ScriptedGenerator::new()
        .with_completion("Tenancy Agreement Expert")
        .with_text_stream(&["**Tenancy Agreement Expert:** Yes."]);

    let response = router(&generator)
        .oneshot(post(
            "/api/chat/multiagent",
            &[
                Part::Text("text", "Can I paint my walls?"),
                Part::Text("history", "not json"),
            ],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(generator.stream_requests()[0].messages.len(), 2);
}

#[tokio::test]
async fn test_json_endpoint_status_codes() {
    let response = router(&ScriptedGenerator::new())
        .oneshot(post("/api/chat/multiagent", &[]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let generator = ScriptedGenerator::new()
        .with_completion("Tenancy Agreement Expert")
        .with_stream_failure("502 Bad Gateway");
    let response = router(&generator)
        .oneshot(post("/api/chat/multiagent", &[Part::Text("text", "rent?")]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert!(json["error"].as_str().unwrap().contains("502 Bad Gateway"));
}
