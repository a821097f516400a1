// tests/http_api.rs

mod common;

use std::sync::Arc;

use serde_json::{json, Value};

use quizline_backend::domain::Difficulty;
use quizline_backend::routes::build_router;
use quizline_backend::store::{LocalStore, Partition};

use common::*;

/// Spawn the app on a random port. Returns the base URL.
async fn spawn_app(store: Arc<LocalStore>) -> String {
  let state = test_state(5, store, None, Arc::new(RecordingScores::default())).await;
  let app = build_router(state);

  let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("Failed to bind random port");
  let port = listener.local_addr().unwrap().port();
  tokio::spawn(async move {
    axum::serve(listener, app).await.unwrap();
  });
  format!("http://127.0.0.1:{port}")
}

#[tokio::test]
async fn health_reports_store_and_version() {
  let address = spawn_app(Arc::new(LocalStore::open_in_memory().unwrap())).await;
  let body: Value = reqwest::get(format!("{address}/api/v1/health")).await.unwrap().json().await.unwrap();
  assert_eq!(body["ok"], json!(true));
  assert_eq!(body["storeAvailable"], json!(true));
  assert!(body["contentVersion"].as_str().is_some_and(|v| !v.is_empty()));
}

#[tokio::test]
async fn topics_fall_back_to_seeds() {
  let address = spawn_app(Arc::new(LocalStore::open_in_memory().unwrap())).await;
  let body: Value = reqwest::get(format!("{address}/api/v1/topics")).await.unwrap().json().await.unwrap();
  let predefined = body["predefined"].as_array().unwrap();
  assert!(predefined.iter().any(|t| t["value"] == "geography"));
  assert_eq!(body["custom"], json!([]));
}

#[tokio::test]
async fn cache_stats_and_partition_clear() {
  let store = geography_store(2);
  store.save_batch(Partition::Custom, &[question(Some("c-1"), "volcanoes_1", Difficulty::Easy, "Lava?")]);
  let address = spawn_app(store).await;
  let client = reqwest::Client::new();

  let stats: Value = client.get(format!("{address}/api/v1/cache/stats")).send().await.unwrap().json().await.unwrap();
  assert_eq!(stats, json!({ "total": 7, "predefined": 6, "custom": 1 }));

  let narrowed: Value = client
    .get(format!("{address}/api/v1/cache/stats?topic=geography&difficulty=hard"))
    .send()
    .await
    .unwrap()
    .json()
    .await
    .unwrap();
  assert_eq!(narrowed["predefined"], json!(2));
  assert_eq!(narrowed["custom"], json!(0));

  let res = client
    .post(format!("{address}/api/v1/cache/clear"))
    .json(&json!({ "partition": "custom" }))
    .send()
    .await
    .unwrap();
  assert_eq!(res.status().as_u16(), 200);

  let stats: Value = client.get(format!("{address}/api/v1/cache/stats")).send().await.unwrap().json().await.unwrap();
  assert_eq!(stats, json!({ "total": 6, "predefined": 6, "custom": 0 }));

  let res = client
    .post(format!("{address}/api/v1/cache/clear"))
    .json(&json!({ "partition": "everything" }))
    .send()
    .await
    .unwrap();
  assert!(res.status().is_client_error());
}

#[tokio::test]
async fn cache_stats_unavailable_without_store() {
  let address = spawn_app(Arc::new(LocalStore::unavailable())).await;
  let res = reqwest::get(format!("{address}/api/v1/cache/stats")).await.unwrap();
  assert_eq!(res.status().as_u16(), 503);
  let body: Value = res.json().await.unwrap();
  assert_eq!(body["error"], json!("local store unavailable"));
}
