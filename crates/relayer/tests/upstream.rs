//! Startup fetch against a local stub server.

use std::collections::HashMap;
use std::time::Duration;

use axum::extract::Query;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use relayer::config::Config;
use relayer::upstream::{fetch_records, FetchError};
use serde_json::{json, Value};

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}/v2/history", addr)
}

fn config(url: &str) -> Config {
    Config::for_test(url, Duration::from_secs(30))
}

#[tokio::test]
async fn fetches_records_in_order_with_limit() {
    let app = Router::new().route(
        "/v2/history",
        get(|Query(q): Query<HashMap<String, String>>| async move {
            let limit: usize = q.get("limit").and_then(|l| l.parse().ok()).unwrap_or(0);
            Json(
                (0..limit.min(3))
                    .map(|i| json!({ "id": format!("R{i}"), "code": 551 }))
                    .collect::<Vec<_>>(),
            )
        }),
    );
    let url = serve(app).await;

    let records = fetch_records(&config(&url)).await.unwrap();
    assert_eq!(records.len(), 3);
    let ids: Vec<&Value> = records.iter().map(|r| &r.0["id"]).collect();
    assert_eq!(ids, vec!["R0", "R1", "R2"]);
}

#[tokio::test]
async fn empty_array_rejects_startup() {
    let app = Router::new().route("/v2/history", get(|| async { Json(Vec::<Value>::new()) }));
    let url = serve(app).await;

    let err = fetch_records(&config(&url)).await.unwrap_err();
    assert!(matches!(err, FetchError::Empty(_)), "got {err:?}");
}

#[tokio::test]
async fn non_ok_status_is_fatal() {
    let app = Router::new().route(
        "/v2/history",
        get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "down") }),
    );
    let url = serve(app).await;

    let err = fetch_records(&config(&url)).await.unwrap_err();
    assert!(matches!(err, FetchError::Status(s) if s.as_u16() == 503), "got {err:?}");
}

#[tokio::test]
async fn non_object_elements_are_rejected() {
    let app = Router::new().route("/v2/history", get(|| async { Json(json!([1, 2, 3])) }));
    let url = serve(app).await;

    let err = fetch_records(&config(&url)).await.unwrap_err();
    assert!(matches!(err, FetchError::Decode(_)), "got {err:?}");
}

#[tokio::test]
async fn unreachable_upstream_is_a_request_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = fetch_records(&config(&format!("http://{addr}/v2/history")))
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Request(_)), "got {err:?}");
}

#[tokio::test]
async fn configured_limit_replaces_one_in_the_url() {
    let app = Router::new().route(
        "/v2/history",
        get(|Query(pairs): Query<Vec<(String, String)>>| async move {
            Json(
                pairs
                    .into_iter()
                    .map(|(k, v)| json!({ "key": k, "value": v }))
                    .collect::<Vec<_>>(),
            )
        }),
    );
    let url = serve(app).await;

    let records = fetch_records(&config(&format!("{url}?limit=5&codes=551")))
        .await
        .unwrap();
    let seen: Vec<(&Value, &Value)> = records
        .iter()
        .map(|r| (&r.0["key"], &r.0["value"]))
        .collect();
    assert_eq!(
        seen,
        vec![
            (&json!("codes"), &json!("551")),
            (&json!("limit"), &json!("100")),
        ]
    );
}
