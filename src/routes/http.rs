//! HTTP endpoint handlers. These are thin wrappers over the store and the
//! topic catalogue; gameplay lives on the WebSocket.

use std::sync::Arc;

use axum::{
  extract::{Query, State},
  response::IntoResponse,
  Json,
};
use tracing::{info, instrument};

use crate::error::{AppError, StoreError};
use crate::protocol::*;
use crate::state::AppState;
use crate::store::{CountCriteria, Partition};
use crate::version_gate::CONTENT_VERSION;

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(HealthOut { ok: true, content_version: CONTENT_VERSION, store_available: state.store.is_available() })
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_topics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(TopicsOut { predefined: state.topics.clone(), custom: state.store.custom_topics() })
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_custom_topics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(state.store.custom_topics())
}

#[instrument(level = "info", skip(state), fields(topic = ?q.topic, difficulty = ?q.difficulty))]
pub async fn http_get_cache_stats(
  State(state): State<Arc<AppState>>,
  Query(q): Query<CacheStatsQuery>,
) -> Result<Json<CacheStatsOut>, AppError> {
  if !state.store.is_available() {
    return Err(StoreError::Unavailable.into());
  }
  let criteria = |partition| CountCriteria {
    partition: Some(partition),
    topic_value: q.topic.clone(),
    difficulty: q.difficulty,
  };
  let predefined = state.admin.count_by(&criteria(Partition::Predefined));
  let custom = state.admin.count_by(&criteria(Partition::Custom));
  Ok(Json(CacheStatsOut { total: state.admin.count(), predefined, custom }))
}

#[instrument(level = "info", skip(state, body), fields(partition = ?body.partition))]
pub async fn http_post_cache_clear(
  State(state): State<Arc<AppState>>,
  Json(body): Json<ClearIn>,
) -> Result<Json<ClearOut>, AppError> {
  state.admin.clear(body.partition.partition())?;
  info!(target: "store", partition = ?body.partition, "Cache cleared via admin endpoint");
  Ok(Json(ClearOut { cleared: body.partition }))
}
