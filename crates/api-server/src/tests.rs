use super::*;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use ml_engine::{fixtures, ModelRegistry};
use serde_json::{json, Value};
use tower::ServiceExt;

const ADMIN_KEY: &str = "admin-secret-key";
const USER_KEY: &str = "alice-secret-key";
const OTHER_KEY: &str = "bob-secret-key";

async fn test_state(registry: ModelRegistry, keys: &str) -> AppState {
    let db = PredictionDb::new("sqlite::memory:").await.unwrap();
    let models = Arc::new(ModelHandle::new(registry, "./does-not-exist"));
    AppState::new(db, models, Explainer::default(), ApiKeys::parse(keys))
}

async fn secured_app() -> Router {
    let keys = format!("{ADMIN_KEY}:root:admin,{USER_KEY}:alice:user,{OTHER_KEY}:bob:user");
    build_router(test_state(fixtures::registry(), &keys).await, &[])
}

fn request(method: &str, uri: &str, key: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(key) = key {
        builder = builder.header("X-API-Key", key);
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

fn abc_stock() -> Value {
    let year = |revenue: f64, ebitda: f64, book_value: f64| {
        json!({
            "revenue": revenue,
            "ebitda": ebitda,
            "book_value": book_value,
            "debt": 10.0,
            "cash": 3.0,
            "working_capital": 4.0,
            "capex": 1.0
        })
    };
    json!({
        "ticker": "abc",
        "company_name": "ABC Industries",
        "sector": "Technology",
        "valuation": {
            "pe_ratio": 15.0,
            "pb_ratio": 1.2,
            "roe": 18.0,
            "profit_margin": 12.0,
            "debt_equity": 0.4
        },
        "history": {
            "two_years_ago": year(10.0, 4.0, 20.0),
            "last_year": year(12.0, 5.0, 20.0),
            "current": year(15.0, 6.0, 25.0)
        }
    })
}

#[tokio::test]
async fn test_health_is_open() {
    let app = secured_app().await;
    let (status, body) = send(&app, request("GET", "/health", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_model_health_reports_readiness() {
    let app = secured_app().await;
    let (status, body) = send(&app, request("GET", "/api/predict/health", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["healthy"], true);
    assert_eq!(body["status"], "ready");
    assert_eq!(body["models"]["growth"], true);

    let partial = ModelRegistry::from_artifacts([fixtures::valuation_model()]);
    let app = build_router(test_state(partial, "").await, &[]);
    let (status, body) = send(&app, request("GET", "/api/predict/health", None, None)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["healthy"], false);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["models"]["valuation"], true);
    assert_eq!(body["models"]["health"], false);
}

#[tokio::test]
async fn test_auth_failures() {
    let app = secured_app().await;
    let body = Some(json!({ "ticker": "ABC" }));

    let (status, json) = send(&app, request("POST", "/api/predict", None, body.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["success"], false);

    let (status, _) = send(&app, request("POST", "/api/predict", Some("wrong-key"), body)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, request("GET", "/api/admin/stats", Some(USER_KEY), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, request("PUT", "/api/stocks", Some(USER_KEY), Some(abc_stock()))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_prediction_flow() {
    let app = secured_app().await;

    let (status, saved) = send(&app, request("PUT", "/api/stocks", Some(ADMIN_KEY), Some(abc_stock()))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(saved["data"]["stock"]["ticker"], "ABC");
    assert!(saved["data"]["ratios"]["revenue_growth_1y"].is_number());

    let (status, body) = send(
        &app,
        request("POST", "/api/predict", Some(USER_KEY), Some(json!({ "ticker": "abc" }))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let data = &body["data"];
    assert_eq!(data["stock_info"]["ticker"], "ABC");
    assert_eq!(data["model1"]["label"], "UNDERVALUED");
    assert_eq!(data["model2"]["label"], "EXCELLENT");
    assert!(data["ensemble"]["confidence"].as_f64().unwrap() <= 0.95);
    let id = data["prediction_id"].as_i64().unwrap();

    let (status, history) = send(&app, request("GET", "/api/predict/history", Some(USER_KEY), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history["data"]["total"], 1);
    assert_eq!(history["data"]["items"][0]["id"], id);

    let detail_uri = format!("/api/predict/history/{id}");
    let (status, detail) = send(&app, request("GET", &detail_uri, Some(USER_KEY), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["data"]["user_id"], "alice");

    let (status, _) = send(&app, request("GET", &detail_uri, Some(OTHER_KEY), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, stats) = send(&app, request("GET", "/api/admin/stats", Some(ADMIN_KEY), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["data"]["overview"]["total_predictions"], 1);
    assert_eq!(stats["data"]["sector_breakdown"][0]["sector"], "Technology");
}

#[tokio::test]
async fn test_error_status_mapping() {
    let app = secured_app().await;

    let (status, body) = send(
        &app,
        request("POST", "/api/predict", Some(USER_KEY), Some(json!({ "ticker": "zzz" }))),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Stock with ticker ZZZ not found");

    let (status, _) = send(
        &app,
        request("GET", "/api/predict/history?limit=500", Some(USER_KEY), None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        request("GET", "/api/admin/top-stocks?limit=0", Some(ADMIN_KEY), None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_missing_model_is_unavailable() {
    let partial = ModelRegistry::from_artifacts([fixtures::valuation_model(), fixtures::health_model()]);
    let app = build_router(test_state(partial, "").await, &[]);

    let (status, _) = send(&app, request("PUT", "/api/stocks", None, Some(abc_stock()))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app,
        request("POST", "/api/predict", None, Some(json!({ "ticker": "ABC" }))),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_development_mode_identity() {
    let app = build_router(test_state(fixtures::registry(), "").await, &[]);
    send(&app, request("PUT", "/api/stocks", None, Some(abc_stock()))).await;

    let (status, body) = send(
        &app,
        request("POST", "/api/predict", None, Some(json!({ "ticker": "ABC" }))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let id = body["data"]["prediction_id"].as_i64().unwrap();
    let (_, detail) = send(&app, request("GET", &format!("/api/predict/history/{id}"), None, None)).await;
    assert_eq!(detail["data"]["user_id"], "dev");
}

#[tokio::test]
async fn test_history_summary_fields() {
    let app = build_router(test_state(fixtures::registry(), "").await, &[]);
    let mut stock = abc_stock();
    stock["sector"] = Value::Null;
    let (status, saved) = send(&app, request("PUT", "/api/stocks", None, Some(stock))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(saved["data"]["stock"]["sector"], "Unknown");

    let (status, body) = send(
        &app,
        request("POST", "/api/predict", None, Some(json!({ "ticker": "ABC" }))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["stock_info"]["sector"], "Unknown");

    let (status, history) = send(&app, request("GET", "/api/predict/history", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    let item = history["data"]["items"][0].as_object().unwrap();
    let mut keys: Vec<&str> = item.keys().map(String::as_str).collect();
    keys.sort_unstable();
    assert_eq!(
        keys,
        vec![
            "company_name",
            "final_confidence",
            "final_recommendation",
            "id",
            "predicted_at",
            "sector",
            "ticker",
        ]
    );
    assert_eq!(item["ticker"], "ABC");
    assert_eq!(item["sector"], "Unknown");
    assert_eq!(item["final_recommendation"], body["data"]["ensemble"]["recommendation"]);
    assert_eq!(item["final_confidence"], body["data"]["ensemble"]["confidence"]);
    assert!(item["predicted_at"].is_string());
}

#[tokio::test]
async fn test_reload_reports_missing_models() {
    let app = secured_app().await;
    let (status, body) = send(
        &app,
        request("POST", "/api/admin/models/reload", Some(ADMIN_KEY), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["ready"], false);

    let (status, _) = send(&app, request("GET", "/api/predict/health", None, None)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_request_id_and_security_headers() {
    let app = secured_app().await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("x-request-id", "req-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.headers()["x-request-id"], "req-123");
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let generated = response.headers()["x-request-id"].to_str().unwrap();
    assert_eq!(generated.len(), 36);
}
