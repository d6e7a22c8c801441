mod common;

use std::time::{Duration, Instant};

use axum::http::StatusCode;
use common::*;
use documate_gateway::proxy::RotationOrder;
use serde_json::json;
use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ARTICLE: &str = r#"<html><head><title>Mitosis</title>
<meta name="author" content="R. Hooke"></head>
<body><nav>Menu</nav><p>Cells   divide.</p><script>track()</script></body></html>"#;

#[tokio::test]
async fn test_scrape_isolates_failures_and_timeouts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ok"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(ARTICLE, "text/html"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(ARTICLE, "text/html")
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let mut config = test_config(&server);
    config.scrape.timeout_ms = 300;
    let urls: Vec<String> = ["/ok", "/gone", "/slow"]
        .iter()
        .map(|p| format!("{}{}", server.uri(), p))
        .collect();

    let started = Instant::now();
    let response = send(
        app(config, all_secrets()),
        post_json("/api/scrape", &json!({ "urls": urls })),
    )
    .await;
    assert!(started.elapsed() < Duration::from_secs(2));

    assert_eq!(response.status, StatusCode::OK);
    let results = response.json()["results"].clone();
    assert_eq!(
        results[0],
        json!({
            "url": urls[0],
            "status": "ok",
            "meta": { "author": "R. Hooke", "date": "", "site": "" },
            "content": "Cells divide."
        })
    );
    assert_eq!(
        results[1],
        json!({ "url": urls[1], "status": "failed", "error": "Failed to load" })
    );
    assert_eq!(
        results[2],
        json!({ "url": urls[2], "status": "failed", "error": "Timed out after 300 ms" })
    );
}

#[tokio::test]
async fn test_scrape_requires_url_array() {
    let server = MockServer::start().await;
    for body in [json!({}), json!({ "urls": "https://a.test" })] {
        let response = send(app(test_config(&server), all_secrets()), post_json("/api/scrape", &body)).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(response.json(), json!({ "error": "No URLs provided" }));
    }
}

#[tokio::test]
async fn test_search_formats_hits() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/customsearch/v1"))
        .and(query_param("cx", "secret-DOCUMATE_SEARCHID_1"))
        .and(query_param("q", "mitosis"))
        .and(header("x-goog-api-key", "secret-DOCUMATE_SEARCH_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                { "title": "Mitosis", "link": "https://bio.test/mitosis", "snippet": "Cell division" },
                { "title": "Meiosis", "link": "https://bio.test/meiosis", "snippet": "Gametes" }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = send(
        app(test_config(&server), all_secrets()),
        post_json("/api/search", &json!({ "query": "mitosis" })),
    )
    .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(
        response.json(),
        json!({
            "results": "ID: 1\nTITLE: Mitosis\nURL: https://bio.test/mitosis\nSNIPPET: Cell division\n\n---\n\nID: 2\nTITLE: Meiosis\nURL: https://bio.test/meiosis\nSNIPPET: Gametes"
        })
    );
}

#[tokio::test]
async fn test_search_empty_and_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("q", "nothing"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "kind": "customsearch#search" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("q", "broken"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "code": 400, "message": "Invalid Value" }
        })))
        .mount(&server)
        .await;
    let config = test_config(&server);

    let response = send(app(config.clone(), all_secrets()), post_json("/api/search", &json!({ "query": "nothing" }))).await;
    assert_eq!(response.json(), json!({ "results": [] }));

    let response = send(app(config.clone(), all_secrets()), post_json("/api/search", &json!({ "query": "broken" }))).await;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.json(), json!({ "error": "Google Search Error: Invalid Value" }));

    let response = send(app(config, all_secrets()), post_json("/api/search", &json!({}))).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json(), json!({ "error": "Query is required." }));
}

#[tokio::test]
async fn test_citation_pipeline() {
    let server = MockServer::start().await;
    let chat_path = format!("{}/chat/completions", CHAT_PREFIX);

    Mock::given(method("POST"))
        .and(path(chat_path.as_str()))
        .and(body_string_contains("Generate a google search query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_text("\"cell division\"")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/customsearch/v1"))
        .and(query_param("q", "cell division"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                { "title": "Down", "link": format!("{}/missing", server.uri()), "snippet": "" },
                { "title": "Mitosis", "link": format!("{}/article", server.uri()), "snippet": "" }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/article"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(ARTICLE, "text/html"))
        .mount(&server)
        .await;

    let citations = json!({
        "insertions": [{ "anchor": "Cells divide", "source_id": 1, "citation_text": "(Hooke)" }],
        "formatted_citations": { "1": "Hooke, R. Mitosis." }
    });
    Mock::given(method("POST"))
        .and(path(chat_path.as_str()))
        .and(body_string_contains("Insert citations into text"))
        .and(body_partial_json(json!({ "response_format": { "type": "json_object" } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_text(&citations.to_string())))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = test_config(&server);
    config.endpoints.citation.models = vec!["m1".into()];

    let response = send(
        app(config, all_secrets()),
        post_json(
            "/api/citation",
            &json!({ "context": "Cells divide.", "style": "MLA" }),
        ),
    )
    .await;

    assert_eq!(response.status, StatusCode::OK);
    let body = response.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["result"], citations);
    assert_eq!(
        body["sources"],
        json!([{
            "id": 1,
            "title": "Mitosis",
            "link": format!("{}/article", server.uri()),
            "content": "Cells divide."
        }])
    );
}

#[tokio::test]
async fn test_citation_bibliography_is_plain_text() {
    let server = MockServer::start().await;
    let chat_path = format!("{}/chat/completions", CHAT_PREFIX);
    Mock::given(method("POST"))
        .and(path(chat_path.as_str()))
        .and(body_string_contains("Generate a google search query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_text("photosynthesis")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/customsearch/v1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(chat_path.as_str()))
        .and(body_string_contains("Create a bibliography in APA style"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_text("1. Source list")))
        .expect(1)
        .mount(&server)
        .await;

    let response = send(
        app(test_config(&server), all_secrets()),
        post_json(
            "/api/citation",
            &json!({ "context": "Plants make sugar.", "outputType": "bibliography" }),
        ),
    )
    .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(
        response.json(),
        json!({ "success": true, "sources": [], "result": "1. Source list" })
    );
}

#[tokio::test]
async fn test_citation_empty_bibliography_rotates() {
    let server = MockServer::start().await;
    let chat_path = format!("{}/chat/completions", CHAT_PREFIX);
    Mock::given(method("POST"))
        .and(path(chat_path.as_str()))
        .and(body_string_contains("Generate a google search query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_text("photosynthesis")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/customsearch/v1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(chat_path.as_str()))
        .and(body_string_contains("Create a bibliography"))
        .and(body_partial_json(json!({ "model": "m1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_text("  ")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(chat_path.as_str()))
        .and(body_string_contains("Create a bibliography"))
        .and(body_partial_json(json!({ "model": "m2" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_text("1. Source list")))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = test_config(&server);
    config.endpoints.citation.models = vec!["m1".into(), "m2".into()];
    config.endpoints.citation.rotation = RotationOrder::Ordered;

    let response = send(
        app(config, all_secrets()),
        post_json(
            "/api/citation",
            &json!({ "context": "Plants make sugar.", "outputType": "bibliography" }),
        ),
    )
    .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()["result"], "1. Source list");
}

#[tokio::test]
async fn test_scrape_reports_non_string_entries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ok"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(ARTICLE, "text/html"))
        .expect(1)
        .mount(&server)
        .await;
    let url = format!("{}/ok", server.uri());

    let response = send(
        app(test_config(&server), all_secrets()),
        post_json("/api/scrape", &json!({ "urls": [null, url, 7] })),
    )
    .await;

    assert_eq!(response.status, StatusCode::OK);
    let results = response.json()["results"].clone();
    assert_eq!(results.as_array().unwrap().len(), 3);
    assert_eq!(
        results[0],
        json!({ "url": "null", "status": "failed", "error": "Invalid URL" })
    );
    assert_eq!(results[1]["status"], "ok");
    assert_eq!(
        results[2],
        json!({ "url": "7", "status": "failed", "error": "Invalid URL" })
    );
}
