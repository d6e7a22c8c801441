mod common;

use axum::http::StatusCode;
use common::*;
use documate_gateway::proxy::RotationOrder;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_humanize_rotates_past_failing_model() {
    let server = MockServer::start().await;
    let chat_path = format!("{}/chat/completions", CHAT_PREFIX);
    Mock::given(method("POST"))
        .and(path(chat_path.as_str()))
        .and(body_partial_json(json!({ "model": "first" })))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": { "message": "overloaded" }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(chat_path.as_str()))
        .and(body_partial_json(json!({ "model": "second", "temperature": 0.7 })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(chat_text("Here is the rewrite: We utilize tools. We do not worry.")),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(chat_path.as_str()))
        .and(body_partial_json(json!({ "model": "third" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_text("unused")))
        .expect(0)
        .mount(&server)
        .await;

    let mut config = test_config(&server);
    config.endpoints.humanize.models = vec!["first".into(), "second".into(), "third".into()];

    let response = send(
        app(config, all_secrets()),
        post_json("/api/humanize", &json!({ "text": "We leverage tools.", "tone": "Casual" })),
    )
    .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(
        response.json(),
        json!({ "success": true, "text": "We use tools. We don't worry." })
    );
}

#[tokio::test]
async fn test_humanize_exhaustion_uses_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({
            "error": { "message": "unavailable" }
        })))
        .expect(2)
        .mount(&server)
        .await;

    let mut config = test_config(&server);
    config.endpoints.humanize.models = vec!["a".into(), "b".into()];

    let response = send(
        app(config, all_secrets()),
        post_json("/api/humanize", &json!({ "text": "hello" })),
    )
    .await;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    let body = response.json();
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("unavailable"));
}

#[tokio::test]
async fn test_humanize_prefers_long_caller_key() {
    let server = MockServer::start().await;
    let caller_key = "gsk_caller_supplied_key_12345";
    Mock::given(method("POST"))
        .and(header("authorization", format!("Bearer {}", caller_key).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_text("Fine text.")))
        .expect(1)
        .mount(&server)
        .await;

    let response = send(
        app(test_config(&server), all_secrets()),
        post_json("/api/humanize", &json!({ "text": "hello", "apiKey": caller_key })),
    )
    .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()["text"], "Fine text.");
}

#[tokio::test]
async fn test_grade_tries_models_in_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-2.0-flash:generateContent"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": { "message": "quota" }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-1.5-pro:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-1.5-flash:generateContent"))
        .and(header("x-goog-api-key", "secret-GEMINI_API_KEY"))
        .respond_with(ResponseTemplate::new(200).set_body_json(gemini_text("**Grade: B+**")))
        .expect(1)
        .mount(&server)
        .await;

    let response = send(
        app(test_config(&server), all_secrets()),
        post_json(
            "/api/grade",
            &json!({ "studentText": "My essay", "instructions": "Grade it" }),
        ),
    )
    .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json(), json!({ "success": true, "data": "**Grade: B+**" }));
}

#[tokio::test]
async fn test_flashcards_empty_array_is_soft_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/fc-empty:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(gemini_text("[]")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/fc-good:generateContent"))
        .and(header("x-goog-api-key", "secret-FLASHCARD_1"))
        .and(body_partial_json(json!({
            "generationConfig": { "responseMimeType": "application/json" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(gemini_text(
            r#"[{"front": "ATP", "back": "Energy currency"}]"#,
        )))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = test_config(&server);
    config.endpoints.flashcards.models = vec!["fc-empty".into(), "fc-good".into()];
    config.endpoints.flashcards.rotation = RotationOrder::Ordered;

    let response = send(
        app(config, all_secrets()),
        post_json("/api/flashcards", &json!({ "inputText": "Cellular respiration" })),
    )
    .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(
        response.json(),
        json!({ "flashcards": [{ "front": "ATP", "back": "Energy currency" }] })
    );
}

#[tokio::test]
async fn test_flashcards_exhaustion() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(gemini_text("[]")))
        .expect(3)
        .mount(&server)
        .await;

    let mut config = test_config(&server);
    config.endpoints.flashcards.models = vec!["a".into(), "b".into(), "c".into()];

    let response = send(
        app(config, all_secrets()),
        post_json("/api/flashcards", &json!({ "inputText": "x" })),
    )
    .await;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    let body = response.json();
    assert_eq!(body["error"], "Flashcard Generation Failed");
    assert!(body["message"]
        .as_str()
        .unwrap()
        .starts_with("Could not generate flashcards after trying all models. Last error: "));
}

#[tokio::test]
async fn test_flashcards_require_input() {
    let server = MockServer::start().await;
    let response = send(
        app(test_config(&server), all_secrets()),
        post_json("/api/flashcards", &json!({ "uploadedFiles": [] })),
    )
    .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        response.json(),
        json!({ "error": "Bad Request", "message": "Please provide text or upload files." })
    );
}

#[tokio::test]
async fn test_rubric_grade_single_model() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-1.5-flash:generateContent"))
        .and(header("x-goog-api-key", "secret-GRADER_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(gemini_text("# Overall Grade\nA")))
        .expect(1)
        .mount(&server)
        .await;

    let response = send(
        app(test_config(&server), all_secrets()),
        post_json(
            "/api/grade/rubric",
            &json!({
                "rubricData": { "combinedText": "Clarity 10pts", "imageParts": [] },
                "essayData": { "combinedText": "Essay", "imageParts": [] },
                "strictness": 4
            }),
        ),
    )
    .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json(), json!({ "text": "# Overall Grade\nA" }));
}

#[tokio::test]
async fn test_grade_empty_answer_moves_to_next_model() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-2.0-flash:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(gemini_text("")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-1.5-pro:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(gemini_text("real grade")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-1.5-flash:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(gemini_text("unused")))
        .expect(0)
        .mount(&server)
        .await;

    let response = send(
        app(test_config(&server), all_secrets()),
        post_json("/api/grade", &json!({ "studentText": "My essay" })),
    )
    .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json(), json!({ "success": true, "data": "real grade" }));
}
