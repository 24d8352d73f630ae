//! The OpenAI-compatible model backend against a throwaway axum server.
//!
//! The server picks its answer from the request's `model` field, so each
//! test names the failure it wants to see.

#![cfg(feature = "server")]

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use paperless_ocr_webhook::pipeline::refine::fallback;
use paperless_ocr_webhook::prompts::{FORMAT_SYSTEM_PROMPT, TITLE_SYSTEM_PROMPT};
use paperless_ocr_webhook::{
    build_model, LlmSettings, RefineError, Refiner, RefinementMode, TextModel,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const TITLE: &str = "Service contract ACME";

#[derive(Default)]
struct Recorded {
    requests: Vec<Value>,
    authorization: Vec<Option<String>>,
}

type Shared = Arc<Mutex<Recorded>>;

fn answer(content: Value, finish_reason: &str) -> Response {
    Json(json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": finish_reason,
        }],
    }))
    .into_response()
}

async fn chat(
    State(rec): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    {
        let mut rec = rec.lock().unwrap();
        rec.authorization.push(
            headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        );
        rec.requests.push(body.clone());
    }

    let model = body["model"].as_str().unwrap_or_default();
    let system = body["messages"][0]["content"].as_str().unwrap_or_default();
    let user = body["messages"][1]["content"].as_str().unwrap_or_default();
    let is_title = system == TITLE_SYSTEM_PROMPT;

    match model {
        "healthy" if is_title => answer(json!(TITLE), "stop"),
        "healthy" => answer(json!(user.replace('\n', " ")), "stop"),
        "truncated" if is_title => answer(json!(TITLE), "stop"),
        "truncated" => answer(json!("Line 1 of the contract\nLine 2 of the"), "length"),
        "status-500" => {
            (StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded").into_response()
        }
        "not-json" => (
            [(header::CONTENT_TYPE, "text/html")],
            "<html><body>Bad gateway</body></html>",
        )
            .into_response(),
        "no-choices" => Json(json!({"choices": []})).into_response(),
        "null-content" => answer(Value::Null, "stop"),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn spawn_endpoint() -> (String, Shared) {
    let rec: Shared = Arc::default();
    let app = Router::new()
        .route("/v1/chat/completions", post(chat))
        .with_state(rec.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/v1"), rec)
}

fn model(base_url: &str, name: &str) -> Arc<dyn TextModel> {
    build_model(&LlmSettings {
        base_url: Some(base_url.to_string()),
        api_key: Some("sk-test".into()),
        model: name.into(),
        ..LlmSettings::default()
    })
    .unwrap()
}

fn refiner(model: Arc<dyn TextModel>) -> Refiner {
    Refiner::new(
        RefinementMode::TitleAndFormat,
        Some(model),
        Duration::from_secs(5),
    )
}

fn contract_ocr() -> String {
    (1..=50)
        .map(|i| format!("Line {i} of the contract"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[tokio::test]
async fn healthy_endpoint_reformats_and_titles() {
    let (base, rec) = spawn_endpoint().await;
    let ocr = contract_ocr();
    let out = refiner(model(&base, "healthy")).refine(&ocr).await;

    assert_eq!(out.title, TITLE);
    assert_eq!(out.content, ocr.replace('\n', " "));

    let rec = rec.lock().unwrap();
    assert_eq!(rec.requests.len(), 2);
    assert!(rec
        .authorization
        .iter()
        .all(|a| a.as_deref() == Some("Bearer sk-test")));
    let format_request = rec
        .requests
        .iter()
        .find(|r| r["messages"][0]["content"] == FORMAT_SYSTEM_PROMPT)
        .expect("format request sent");
    assert_eq!(format_request["messages"][1]["content"], ocr.as_str());
    assert_eq!(format_request["max_tokens"], 4096);
}

#[tokio::test]
async fn token_limit_cut_off_keeps_full_ocr_text() {
    let (base, _) = spawn_endpoint().await;
    let ocr = contract_ocr();
    let model = model(&base, "truncated");

    let err = model
        .complete(FORMAT_SYSTEM_PROMPT, &ocr)
        .await
        .unwrap_err();
    assert!(matches!(err, RefineError::Truncated), "got {err:?}");

    let out = refiner(model).refine(&ocr).await;
    assert_eq!(out.content, ocr);
    assert_eq!(out.content.lines().count(), 50);
    assert_eq!(out.title, TITLE);
}

#[tokio::test]
async fn endpoint_failures_are_classified() {
    let (base, _) = spawn_endpoint().await;

    let err = model(&base, "status-500")
        .complete(FORMAT_SYSTEM_PROMPT, "text")
        .await
        .unwrap_err();
    assert!(matches!(err, RefineError::Status { status: 500 }), "got {err:?}");

    let err = model(&base, "not-json")
        .complete(FORMAT_SYSTEM_PROMPT, "text")
        .await
        .unwrap_err();
    assert!(matches!(err, RefineError::Malformed(_)), "got {err:?}");

    for name in ["no-choices", "null-content"] {
        let err = model(&base, name)
            .complete(FORMAT_SYSTEM_PROMPT, "text")
            .await
            .unwrap_err();
        assert!(matches!(err, RefineError::EmptyResponse), "{name}: got {err:?}");
    }
}

#[tokio::test]
async fn failing_endpoint_falls_back_to_ocr_text() {
    let (base, _) = spawn_endpoint().await;
    let ocr = contract_ocr();
    for name in ["status-500", "not-json", "no-choices", "null-content"] {
        let out = refiner(model(&base, name)).refine(&ocr).await;
        assert_eq!(out, fallback(&ocr), "{name}");
    }
}

#[tokio::test]
async fn unreachable_endpoint_falls_back() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}/v1", listener.local_addr().unwrap());
    drop(listener);

    let ocr = contract_ocr();
    let model = model(&base, "healthy");
    let err = model.complete(TITLE_SYSTEM_PROMPT, &ocr).await.unwrap_err();
    assert!(matches!(err, RefineError::Transport(_)), "got {err:?}");
    assert_eq!(refiner(model).refine(&ocr).await, fallback(&ocr));
}
