//! Remote persistent store client and score recorder.
//!
//! The remote store is a plain JSON-over-HTTP collection service:
//!   GET  {base}/questions?topic=..&difficulty=..&limit=..  -> [raw document]
//!   GET  {base}/questions?topic=..                          -> [raw document]
//!   GET  {base}/topics                                      -> [TopicDefinition]
//!   POST {base}/scores                                      <- RoundSummary
//!
//! Documents are returned raw (legacy or canonical shape); normalization is the
//! caller's job.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::USER_AGENT;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::domain::{Difficulty, LocalizedText, TopicDefinition};
use crate::error::RemoteError;

#[async_trait]
pub trait RemoteStore: Send + Sync {
  /// Up to `limit` raw documents for one (topic, difficulty) partition.
  async fn fetch_page(&self, topic_value: &str, difficulty: Difficulty, limit: usize) -> Result<Vec<Value>, RemoteError>;

  /// Every raw document of a topic, all difficulties.
  async fn fetch_all_for_topic(&self, topic_value: &str) -> Result<Vec<Value>, RemoteError>;

  async fn fetch_topic_definitions(&self) -> Result<Vec<TopicDefinition>, RemoteError>;
}

/// Tally of a finished round, handed to the score collaborator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundSummary {
  pub topic_value: String,
  pub topic_name: LocalizedText,
  pub is_custom: bool,
  pub mode: String,
  pub correct: usize,
  pub total: usize,
  pub finished_at: DateTime<Utc>,
}

#[async_trait]
pub trait ScoreRecorder: Send + Sync {
  async fn record(&self, summary: &RoundSummary) -> Result<(), RemoteError>;
}

/// Used when no remote is configured: the tally only reaches the logs.
pub struct LogScoreRecorder;

#[async_trait]
impl ScoreRecorder for LogScoreRecorder {
  async fn record(&self, summary: &RoundSummary) -> Result<(), RemoteError> {
    info!(target: "round", topic = %summary.topic_value, correct = summary.correct, total = summary.total, mode = %summary.mode, "Round finished (no score backend)");
    Ok(())
  }
}

#[derive(Clone)]
pub struct HttpRemoteStore {
  client: reqwest::Client,
  pub base_url: String,
}

impl HttpRemoteStore {
  pub fn new(base_url: impl Into<String>) -> Result<Self, RemoteError> {
    let client = reqwest::Client::builder().timeout(Duration::from_secs(10)).build()?;
    Ok(Self { client, base_url: base_url.into() })
  }

  async fn get_json<T: for<'a> Deserialize<'a>>(&self, path: &str, query: &[(&str, String)]) -> Result<T, RemoteError> {
    let url = format!("{}{}", self.base_url, path);
    let res = self
      .client
      .get(&url)
      .header(USER_AGENT, "quizline-backend/0.1")
      .query(query)
      .send()
      .await?;
    if !res.status().is_success() {
      let status = res.status().as_u16();
      let message = res.text().await.unwrap_or_default();
      return Err(RemoteError::Status { status, message });
    }
    Ok(res.json::<T>().await?)
  }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
  #[instrument(level = "debug", skip(self), fields(%difficulty))]
  async fn fetch_page(&self, topic_value: &str, difficulty: Difficulty, limit: usize) -> Result<Vec<Value>, RemoteError> {
    self
      .get_json(
        "/questions",
        &[
          ("topic", topic_value.to_string()),
          ("difficulty", difficulty.as_str().to_string()),
          ("limit", limit.to_string()),
        ],
      )
      .await
  }

  #[instrument(level = "debug", skip(self))]
  async fn fetch_all_for_topic(&self, topic_value: &str) -> Result<Vec<Value>, RemoteError> {
    self.get_json("/questions", &[("topic", topic_value.to_string())]).await
  }

  #[instrument(level = "debug", skip(self))]
  async fn fetch_topic_definitions(&self) -> Result<Vec<TopicDefinition>, RemoteError> {
    self.get_json("/topics", &[]).await
  }
}

#[async_trait]
impl ScoreRecorder for HttpRemoteStore {
  #[instrument(level = "info", skip(self, summary), fields(topic = %summary.topic_value, correct = summary.correct, total = summary.total))]
  async fn record(&self, summary: &RoundSummary) -> Result<(), RemoteError> {
    let url = format!("{}/scores", self.base_url);
    let res = self
      .client
      .post(&url)
      .header(USER_AGENT, "quizline-backend/0.1")
      .json(summary)
      .send()
      .await?;
    if !res.status().is_success() {
      let status = res.status().as_u16();
      let message = res.text().await.unwrap_or_default();
      warn!(target: "round", status, "Score backend rejected round summary");
      return Err(RemoteError::Status { status, message });
    }
    Ok(())
  }
}
