use std::path::PathBuf;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use pulse_api::{build_app, ServiceConfig};
use pulse_ml::StackOptions;
use serde_json::{json, Value};
use tower::ServiceExt;

fn rules_options() -> StackOptions {
    StackOptions {
        model_path: PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("target/no-such-model.json"),
        ..StackOptions::default()
    }
}

async fn rules_app() -> Router {
    build_app(rules_options(), ServiceConfig::default())
        .await
        .expect("app should build")
}

async fn demo_app() -> Router {
    let options = StackOptions {
        train_demo: true,
        ..rules_options()
    };
    build_app(options, ServiceConfig::default())
        .await
        .expect("app should build")
}

async fn post_json(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    read(app.oneshot(request).await.unwrap()).await
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    read(app.oneshot(request).await.unwrap()).await
}

async fn read(response: axum::response::Response) -> (StatusCode, Value) {
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn health_reports_rule_mode_without_model() {
    let (status, body) = get_json(rules_app().await, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["classifier"], "rules");
    assert!(body["model"].is_null());
    assert!(body["metrics"]["requests_total"].is_number());
}

#[tokio::test]
async fn responses_carry_request_id() {
    let response = rules_app()
        .await
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn kitchen_leak_is_plumbing() {
    let (status, body) = post_json(
        rules_app().await,
        "/ml/classify-complaint",
        json!({ "text": "Water leaking from kitchen pipe" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["category"], "plumbing");
    assert_eq!(body["source"], "rules");
    assert!(body["confidence"].as_f64().unwrap() >= 0.5);

    let top = body["top_k"].as_array().unwrap();
    assert!(!top.is_empty() && top.len() <= 5);
    assert_eq!(top[0]["category"], "plumbing");
}

#[tokio::test]
async fn empty_text_classifies_as_general() {
    let (status, body) =
        post_json(rules_app().await, "/ml/classify-complaint", json!({ "text": "" })).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["category"], "general");
}

#[tokio::test]
async fn predict_rejects_missing_title_and_description() {
    let (status, body) = post_json(rules_app().await, "/predict", json!({})).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "empty_title_description");
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn predict_combines_category_and_urgency() {
    let (status, body) = post_json(
        rules_app().await,
        "/predict",
        json!({
            "title": "Sparks from socket",
            "description": "danger, short circuit near the electrical board"
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["category"], "electrical");
    assert_eq!(body["urgency"], "high");
}

#[tokio::test]
async fn predict_category_rejects_blank_text() {
    let (status, body) =
        post_json(rules_app().await, "/ml/predict_category", json!({ "text": "   " })).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "empty_text");
}

#[tokio::test]
async fn cluster_rejects_empty_batch() {
    let (status, body) =
        post_json(rules_app().await, "/ml/cluster", json!({ "complaints": [] })).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "empty_batch");
}

#[tokio::test]
async fn identical_complaints_cluster_to_every_member() {
    let complaints = (1..=7)
        .map(|id| json!({ "id": id, "title": "leak", "description": "" }))
        .collect::<Vec<_>>();
    let (status, body) = post_json(
        rules_app().await,
        "/ml/cluster",
        json!({ "complaints": complaints }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let clusters = body["clusters"].as_array().unwrap();
    assert!(!clusters.is_empty() && clusters.len() <= 6);

    let members = clusters
        .iter()
        .flat_map(|cluster| cluster["members"].as_array().unwrap().clone())
        .collect::<Vec<_>>();
    assert_eq!(members.len(), 7);
    assert!(members.contains(&json!(1)));
    assert!(members.contains(&json!(7)));
}

#[tokio::test]
async fn zero_clusters_means_default() {
    let complaints = json!([
        { "title": "leak in pipe" },
        { "title": "rats in basement" },
        { "title": "gate lock broken" }
    ]);
    let (status, body) = post_json(
        rules_app().await,
        "/ml/cluster",
        json!({ "complaints": complaints, "n_clusters": 0 }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let total = body["clusters"]
        .as_array()
        .unwrap()
        .iter()
        .map(|cluster| cluster["members"].as_array().unwrap().len())
        .sum::<usize>();
    assert_eq!(total, 3);
}

#[tokio::test]
async fn urgent_chat_suggests_plumbing() {
    let (status, body) = post_json(
        rules_app().await,
        "/ml/chat",
        json!({ "message": "urgent leak in bathroom now" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["urgency"], "high");
    assert_eq!(body["suggested_category"], "plumbing");
    assert!(!body["session_id"].as_str().unwrap().is_empty());
    assert!(body["prefill"]["title"].as_str().unwrap().starts_with('U'));
}

#[tokio::test]
async fn chat_keeps_given_session() {
    let (_, body) = post_json(
        rules_app().await,
        "/ml/chat",
        json!({ "session_id": "abc-123", "message": "hello" }),
    )
    .await;

    assert_eq!(body["session_id"], "abc-123");
    assert_eq!(body["urgency"], "low");
    assert!(body["suggested_category"].is_null());
}

#[tokio::test]
async fn labels_follow_keyword_table_in_rule_mode() {
    let (status, body) = get_json(rules_app().await, "/ml/labels").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["source"], "rules");
    assert_eq!(body["labels"].as_array().unwrap().len(), 6);
}

#[tokio::test]
async fn diagnose_without_encoder_has_no_tokens() {
    let (status, body) =
        post_json(rules_app().await, "/ml/diagnose", json!({ "text": "water leak" })).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["predicted"], "plumbing");
    assert_eq!(body["top_tokens"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn demo_model_serves_trained_labels() {
    let app = demo_app().await;

    let (_, health) = get_json(app.clone(), "/health").await;
    assert_eq!(health["classifier"], "tfidf-logistic");
    assert!(health["model"]["version"].is_string());

    let (_, labels) = get_json(app.clone(), "/ml/labels").await;
    assert_eq!(labels["source"], "model");
    assert!(labels["labels"]
        .as_array()
        .unwrap()
        .contains(&json!("Plumbing")));

    let (status, body) = post_json(
        app.clone(),
        "/ml/predict_category",
        json!({ "text": "Light switch sparking" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["source"], "model");
    assert_eq!(body["candidates"].as_array().unwrap().len(), 7);

    let (_, diagnosis) = post_json(
        app,
        "/ml/diagnose",
        json!({ "text": "kitchen sink leaking" }),
    )
    .await;
    let tokens = diagnosis["top_tokens"].as_array().unwrap();
    assert!(!tokens.is_empty() && tokens.len() <= 8);
}

#[tokio::test]
async fn cluster_echoes_any_json_id() {
    let (status, body) = post_json(
        rules_app().await,
        "/ml/cluster",
        json!({
            "complaints": [
                { "id": 1.5, "title": "pipe leak" },
                { "id": true, "title": "water leak" },
                { "id": 18446744073709551615u64, "title": "rats in store" }
            ]
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let members = body["clusters"]
        .as_array()
        .unwrap()
        .iter()
        .flat_map(|cluster| cluster["members"].as_array().unwrap().clone())
        .collect::<Vec<_>>();
    assert_eq!(members.len(), 3);
    assert!(members.contains(&json!(1.5)));
    assert!(members.contains(&json!(true)));
    assert!(members.contains(&json!(18446744073709551615u64)));
}

#[tokio::test]
async fn cluster_members_stay_unique_when_ids_are_mixed() {
    let (status, body) = post_json(
        rules_app().await,
        "/ml/cluster",
        json!({
            "complaints": [
                { "id": 1, "title": "pipe leak" },
                { "title": "water leak pipe" }
            ]
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let members = body["clusters"]
        .as_array()
        .unwrap()
        .iter()
        .flat_map(|cluster| cluster["members"].as_array().unwrap().clone())
        .collect::<Vec<_>>();
    assert_eq!(members.len(), 2);
    assert_ne!(members[0], members[1]);
    assert!(members.contains(&json!(1)));
}

async fn preflight(app: Router, origin: &str) -> axum::response::Response {
    let request = Request::builder()
        .method("OPTIONS")
        .uri("/ml/classify-complaint")
        .header("origin", origin)
        .header("access-control-request-method", "PUT")
        .header("access-control-request-headers", "authorization,x-requested-with")
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

#[tokio::test]
async fn preflight_allows_any_method_and_header() {
    let response = preflight(rules_app().await, "https://desk.example").await;

    assert!(response.status().is_success());
    let headers = response.headers();
    assert_eq!(headers["access-control-allow-origin"], "*");
    assert_eq!(headers["access-control-allow-methods"], "*");
    assert_eq!(headers["access-control-allow-headers"], "*");
}

#[tokio::test]
async fn configured_origins_are_enforced() {
    let config = ServiceConfig {
        allowed_origins: vec!["https://desk.example".to_string()],
        ..ServiceConfig::default()
    };
    let app = build_app(rules_options(), config)
        .await
        .expect("app should build");

    let allowed = preflight(app.clone(), "https://desk.example").await;
    assert_eq!(
        allowed.headers()["access-control-allow-origin"],
        "https://desk.example"
    );
    assert_eq!(allowed.headers()["access-control-allow-headers"], "*");

    let other = preflight(app, "https://elsewhere.example").await;
    assert!(!other.headers().contains_key("access-control-allow-origin"));
}
