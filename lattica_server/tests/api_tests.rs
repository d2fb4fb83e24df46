//! Integration tests for the Lattica REST API.
//!
//! Runs against the embedded in-memory stores and the offline collaborator
//! fallbacks via `tower::ServiceExt` (no TCP listener needed).

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use lattica_config::LatticaConfig;
use lattica_server::state::AppState;

fn app() -> Router {
    let state = AppState::from_config(LatticaConfig::default()).expect("state builds");
    lattica_server::router(Arc::new(state))
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}

fn multipart_body(files: &[(&str, &str)]) -> (String, String) {
    let boundary = "lattica-test-boundary";
    let mut body = String::new();
    for (filename, content) in files {
        body.push_str(&format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"files\"; \
             filename=\"{filename}\"\r\nContent-Type: text/plain\r\n\r\n{content}\r\n"
        ));
    }
    body.push_str(&format!("--{boundary}--\r\n"));
    (format!("multipart/form-data; boundary={boundary}"), body)
}

async fn ingest(app: &Router, domain: &str, files: &[(&str, &str)]) -> Value {
    let (content_type, body) = multipart_body(files);
    let response = app
        .clone()
        .oneshot(
            Request::post(format!("/ingest-documents?domain={domain}"))
                .header(header::CONTENT_TYPE, content_type)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await
}

async fn post_json(app: &Router, path: &str, payload: Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::post(path)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    (status, body_json(response).await)
}

async fn get_json(app: &Router, path: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::get(path).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    (status, body_json(response).await)
}

async fn delete_json(app: &Router, path: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::delete(path).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    (status, body_json(response).await)
}

#[tokio::test]
async fn test_health() {
    let app = app();
    let (status, body) = get_json(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert!(body["timestamp"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn test_supported_formats() {
    let app = app();
    let (status, body) = get_json(&app, "/supported-formats").await;
    assert_eq!(status, StatusCode::OK);
    let formats: Vec<&str> = body["formats"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    assert!(formats.contains(&"txt"));
    assert!(formats.contains(&"csv"));
    assert_eq!(body["features"]["knowledge_graph"], true);
    assert_eq!(body["features"]["llm_synthesis"], false, "no LLM configured");
}

#[tokio::test]
async fn test_ingest_reports_counts() {
    let app = app();
    let body = ingest(
        &app,
        "general",
        &[("acme.txt", "Alice works for Acme. Acme is headquartered in Paris.")],
    )
    .await;
    assert_eq!(body["status"], "success");
    assert_eq!(body["documents"][0]["filename"], "acme.txt");
    assert!(body["documents"][0]["chunks"].as_u64().unwrap() >= 1);
    assert!(body["documents"][0]["entities"].as_u64().unwrap() >= 3);
    assert!(body["total_relations"].as_u64().unwrap() >= 1);
}

/// Basic factual retrieval end to end (plain-text ingest, hybrid search).
#[tokio::test]
async fn test_basic_factual_retrieval() {
    let app = app();
    ingest(
        &app,
        "general",
        &[("acme.txt", "Alice works for Acme. Acme is headquartered in Paris.")],
    )
    .await;

    let (status, body) = post_json(
        &app,
        "/search-advanced",
        json!({"query": "Where is Acme located?", "search_type": "hybrid", "top_k": 3}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["search_type"], "hybrid");
    let results = body["results"].as_array().unwrap();
    assert!(!results.is_empty());
    assert!(
        results[0]["text"].as_str().unwrap().contains("Paris"),
        "top chunk answers the question: {}",
        results[0]["text"]
    );
    let entities: Vec<&str> = body["query_analysis"]["entities"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    assert!(entities.contains(&"Acme"));
}

/// Comparative planning surfaces graph-heavy strategy weights.
#[tokio::test]
async fn test_comparative_intent_analysis() {
    let app = app();
    let (status, body) = post_json(
        &app,
        "/analyze-query-intent",
        json!({"query": "Compare supervised and unsupervised learning"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["intent_type"], "COMPARATIVE");
    assert_eq!(body["reasoning_required"], true);

    let strategy = body["strategy"].as_array().unwrap();
    let weight_of = |kind: &str| -> f64 {
        strategy
            .iter()
            .find(|c| c["kind"] == kind)
            .and_then(|c| c["weight"].as_f64())
            .unwrap_or(0.0)
    };
    assert!(weight_of("graph") >= weight_of("vector"));

    let entities: Vec<String> = body["entities"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    assert!(entities.iter().any(|e| e.contains("supervised")));
    assert!(entities.iter().any(|e| e.contains("unsupervised")));
}

/// Filtered projection honors caps and endpoint-subset invariants.
#[tokio::test]
async fn test_filtered_projection_caps() {
    let app = app();
    // A corpus with many distinct entities and relations.
    let mut text = String::new();
    for i in 0..30 {
        text.push_str(&format!("Maker{i} supplies Vendor{i}. "));
    }
    ingest(&app, "general", &[("supply.txt", text.as_str())]).await;

    let (status, body) = post_json(
        &app,
        "/knowledge-graph/filtered",
        json!({
            "max_entities": 10,
            "max_relations": 15,
            "min_occurrence": 1,
            "sort_by": "occurrence",
            "sort_order": "desc"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let entities = body["entities"].as_array().unwrap();
    let relations = body["relations"].as_array().unwrap();
    assert!(entities.len() <= 10);
    assert!(relations.len() <= 15);
    assert!(body["totals_before_filter"]["entities"].as_u64().unwrap() >= 30);

    let kept: Vec<&str> = entities.iter().map(|e| e["id"].as_str().unwrap()).collect();
    for relation in relations {
        assert!(kept.contains(&relation["source_id"].as_str().unwrap()));
        assert!(kept.contains(&relation["target_id"].as_str().unwrap()));
    }
}

#[tokio::test]
async fn test_projection_oversized_request_never_errors() {
    let app = app();
    ingest(&app, "general", &[("tiny.txt", "Alice works for Acme.")]).await;
    let (status, body) = post_json(
        &app,
        "/knowledge-graph/filtered",
        json!({"max_entities": 10000, "max_relations": 10000}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let returned = body["entities"].as_array().unwrap().len() as u64;
    assert_eq!(returned, body["totals_before_filter"]["entities"].as_u64().unwrap());
}

#[tokio::test]
async fn test_projection_invalid_filter_rejected() {
    let app = app();
    let (status, body) = post_json(
        &app,
        "/knowledge-graph/filtered",
        json!({"max_entities": 0}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");
    assert_eq!(body["kind"], "invalid_input");
}

/// Ingest-then-delete returns the graph to its pre-ingest state.
#[tokio::test]
async fn test_delete_round_trip() {
    let app = app();
    let (_, before) = get_json(&app, "/knowledge-graph/stats").await;

    ingest(
        &app,
        "general",
        &[("temp.txt", "Alice works for Acme. Acme is headquartered in Paris.")],
    )
    .await;
    let (_, during) = get_json(&app, "/knowledge-graph/stats").await;
    assert!(during["stats"]["entity_count"].as_u64().unwrap() >= 3);

    let (status, body) = delete_json(&app, "/documents/temp.txt").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert!(body["removed_chunks"].as_u64().unwrap() >= 1);

    let (_, after) = get_json(&app, "/knowledge-graph/stats").await;
    assert_eq!(after["stats"], before["stats"], "stats return to pre-ingest values");

    // No zero-occurrence entities survive the delete.
    let (_, top) = get_json(&app, "/knowledge-graph/top-entities?limit=100").await;
    assert_eq!(top["count"], 0);

    // Idempotent: deleting again succeeds with zero counts.
    let (status, body) = delete_json(&app, "/documents/temp.txt").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["removed_chunks"], 0);
}

/// Causal reasoning over ingested cause/effect statements.
#[tokio::test]
async fn test_causal_reasoning_chains() {
    let app = app();
    ingest(
        &app,
        "medical",
        &[
            ("smoking.txt", "Smoking causes Lung Cancer."),
            ("pollution.txt", "Air Pollution causes Lung Cancer."),
        ],
    )
    .await;

    let (status, body) = post_json(
        &app,
        "/causal-reasoning",
        json!({"query": "What causes lung cancer?"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reasoning_type"], "causal");
    let paths = body["paths"].as_array().unwrap();
    assert!(paths.len() >= 2, "both causal chains found: {body}");
    let all_entities: Vec<String> = paths
        .iter()
        .flat_map(|p| p["entities"].as_array().unwrap().iter())
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    assert!(all_entities.contains(&"Smoking".to_string()));
    assert!(all_entities.contains(&"Air Pollution".to_string()));

    // Ranked by confidence descending.
    let confidences: Vec<f64> = paths
        .iter()
        .map(|p| p["confidence"].as_f64().unwrap())
        .collect();
    for pair in confidences.windows(2) {
        assert!(pair[0] >= pair[1]);
    }
}

/// Empty corpus: queries succeed with empty evidence and a degraded answer.
#[tokio::test]
async fn test_empty_corpus_query() {
    let app = app();
    let (status, body) = post_json(
        &app,
        "/enhanced-query",
        json!({"query": "anything about anything"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["answer"], "");
    assert_eq!(body["degraded"], true);
    assert!(body["results"].as_array().unwrap().is_empty());
    assert!(body["reasoning_paths"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_enhanced_query_answers_from_context() {
    let app = app();
    ingest(
        &app,
        "general",
        &[("acme.txt", "Alice works for Acme. Acme is headquartered in Paris.")],
    )
    .await;
    let (status, body) = post_json(
        &app,
        "/enhanced-query",
        json!({"query": "Where is Acme headquartered?"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    // No LLM configured: the fused context is the degraded answer body.
    assert_eq!(body["degraded"], true);
    assert!(body["answer"].as_str().unwrap().contains("Paris"));
    assert!(body["confidence"].as_f64().unwrap() > 0.0);
}

#[tokio::test]
async fn test_documents_list() {
    let app = app();
    ingest(&app, "general", &[("a.txt", "Alpha content here.")]).await;
    ingest(&app, "special", &[("b.txt", "Beta content here.")]).await;

    let (status, body) = get_json(&app, "/documents/list").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_documents"], 2);
    assert_eq!(body["vector_store_documents"], 2);
    let names: Vec<&str> = body["documents"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["a.txt", "b.txt"]);
}

#[tokio::test]
async fn test_clear_all_idempotent() {
    let app = app();
    ingest(&app, "general", &[("a.txt", "Alice works for Acme.")]).await;
    let (status, body) = delete_json(&app, "/clear-all").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");

    let (_, stats) = get_json(&app, "/knowledge-graph/stats").await;
    assert_eq!(stats["stats"]["entity_count"], 0);
    assert_eq!(stats["stats"]["chunk_count"], 0);

    // Second wipe is a no-op success.
    let (status, _) = delete_json(&app, "/clear-all").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_search_type_keyword_only() {
    let app = app();
    ingest(&app, "general", &[("acme.txt", "Acme is headquartered in Paris.")]).await;
    let (status, body) = post_json(
        &app,
        "/search-advanced",
        json!({"query": "headquartered Paris", "search_type": "keyword", "top_k": 5}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["search_type"], "keyword");
    let results = body["results"].as_array().unwrap();
    assert!(!results.is_empty());
    for result in results {
        let strategies = result["strategies"].as_array().unwrap();
        assert_eq!(strategies.len(), 1);
        assert_eq!(strategies[0], "keyword");
    }
}

#[tokio::test]
async fn test_domain_scoped_search() {
    let app = app();
    ingest(&app, "alpha", &[("a.txt", "Turbine blades spin fast.")]).await;
    ingest(&app, "beta", &[("b.txt", "Turbine maintenance schedule.")]).await;

    let (status, body) = post_json(
        &app,
        "/search-advanced",
        json!({"query": "turbine", "search_type": "hybrid", "top_k": 10, "domain": "alpha"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let results = body["results"].as_array().unwrap();
    assert!(!results.is_empty());
    for result in results {
        assert_eq!(result["domain"], "alpha");
    }
}

#[tokio::test]
async fn test_domains_and_domain_stats() {
    let app = app();
    ingest(&app, "alpha", &[("a.txt", "Alice works for Acme.")]).await;
    ingest(&app, "beta", &[("b.txt", "Bob works for Initech.")]).await;

    let (status, body) = get_json(&app, "/knowledge-graph/domains").await;
    assert_eq!(status, StatusCode::OK);
    let domains: Vec<&str> = body["domains"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    assert!(domains.contains(&"alpha"));
    assert!(domains.contains(&"beta"));

    let (status, body) = get_json(&app, "/knowledge-graph/domain-stats").await;
    assert_eq!(status, StatusCode::OK);
    let entries = body["domains"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    for entry in entries {
        assert!(entry["chunks"].as_u64().unwrap() >= 1);
    }
}

#[tokio::test]
async fn test_export_rejects_unknown_format() {
    let app = app();
    let (status, body) = get_json(&app, "/knowledge-graph/export?format=xml").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "invalid_input");
}

#[tokio::test]
async fn test_export_bounded() {
    let app = app();
    ingest(&app, "general", &[("acme.txt", "Alice works for Acme. Acme is headquartered in Paris.")]).await;
    let (status, body) = get_json(&app, "/knowledge-graph/export?format=json&max_entities=2").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["entities"].as_array().unwrap().len() <= 2);
}

#[tokio::test]
async fn test_multi_hop_reasoning_endpoint() {
    let app = app();
    ingest(
        &app,
        "general",
        &[("chain.txt", "Alice works for Acme. Acme is headquartered in Paris.")],
    )
    .await;
    let (status, body) = post_json(
        &app,
        "/multi-hop-reasoning",
        json!({"query": "How is Alice connected to Paris?", "max_hops": 3}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reasoning_type"], "multi_hop");
    // Paths exist when both endpoints resolved in the graph.
    assert!(body["count"].as_u64().is_some());
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = app();
    let _ = get_json(&app, "/health").await;
    let response = app
        .clone()
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("lattica_requests_total"));
}

#[tokio::test]
async fn test_csv_ingest_end_to_end() {
    let app = app();
    ingest(
        &app,
        "general",
        &[("people.csv", "name,employer\nAlice,Acme\nBob,Initech\n")],
    )
    .await;
    let (status, body) = post_json(
        &app,
        "/search-advanced",
        json!({"query": "employer Acme", "search_type": "keyword", "top_k": 5}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let results = body["results"].as_array().unwrap();
    assert!(!results.is_empty());
    assert!(results[0]["text"].as_str().unwrap().contains("Alice"));
}
