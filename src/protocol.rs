//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};

use crate::difficulty::DifficultyMode;
use crate::domain::{CustomTopicMeta, Difficulty, Lang, LocalizedText, TopicDefinition, TopicRef};
use crate::error::{RoundError, TopicError};
use crate::remote::RoundSummary;
use crate::session::{ActiveQuestion, Feedback};
use crate::store::Partition;
use crate::supplier::Tier;

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
  Ping,
  ListTopics,
  StartRound {
    topic: String,
    #[serde(default)]
    mode: DifficultyMode,
    #[serde(default)]
    lang: Lang,
  },
  Answer {
    seq: u64,
    index: usize,
  },
  NextQuestion,
  /// Ask again after a recoverable failure.
  Retry,
  QuitRound,
  ProposeTopic {
    text: String,
  },
  ConfirmTopic {
    #[serde(default)]
    mode: DifficultyMode,
    #[serde(default)]
    lang: Lang,
  },
  CancelTopic,
  SelectCustomTopic {
    topic: String,
    #[serde(default)]
    mode: DifficultyMode,
    #[serde(default)]
    lang: Lang,
  },
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
  Pong,
  Topics(TopicsOut),
  Question(QuestionOut),
  Tick {
    seq: u64,
    remaining: u32,
  },
  Feedback(Feedback),
  RoundOver {
    summary: RoundSummary,
    completed: bool,
  },
  TopicProposal {
    name: LocalizedText,
    instructions: String,
  },
  TopicRejected {
    reason: String,
  },
  TopicReady {
    topic: TopicRef,
  },
  Error {
    kind: String,
    message: String,
    retryable: bool,
  },
}

impl ServerWsMessage {
  pub fn error(kind: &str, message: impl Into<String>, retryable: bool) -> Self {
    ServerWsMessage::Error { kind: kind.to_string(), message: message.into(), retryable }
  }
}

impl From<&RoundError> for ServerWsMessage {
  fn from(e: &RoundError) -> Self {
    ServerWsMessage::error(e.kind(), e.to_string(), e.retryable())
  }
}

impl From<&TopicError> for ServerWsMessage {
  fn from(e: &TopicError) -> Self {
    match e {
      TopicError::Rejected(reason) => ServerWsMessage::TopicRejected { reason: reason.clone() },
      other => ServerWsMessage::error(other.kind(), other.to_string(), other.retryable()),
    }
  }
}

/// A question as shown to the player. Never carries the correct index.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionOut {
  pub seq: u64,
  pub number: usize,
  pub total: usize,
  pub topic: TopicRef,
  pub difficulty: Difficulty,
  pub source: Tier,
  pub question: LocalizedText,
  pub answers: Vec<LocalizedText>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub hint: Option<LocalizedText>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub image_url: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub image_credit: Option<String>,
  pub time_limit: u32,
}

pub fn question_out(q: &ActiveQuestion, topic: &TopicRef, total: usize, time_limit: u32) -> QuestionOut {
  QuestionOut {
    seq: q.seq,
    number: q.number,
    total,
    topic: topic.clone(),
    difficulty: q.difficulty,
    source: q.tier,
    question: q.question.question.clone(),
    answers: q.answers.clone(),
    hint: q.question.hint.clone(),
    image_url: q.question.image_url.clone(),
    image_credit: q.question.image_credit.clone(),
    time_limit,
  }
}

//
// HTTP request/response DTOs
//

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicsOut {
  pub predefined: Vec<TopicDefinition>,
  pub custom: Vec<CustomTopicMeta>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthOut {
  pub ok: bool,
  pub content_version: &'static str,
  pub store_available: bool,
}

/// Optional narrowing for cache stats.
#[derive(Debug, Default, Deserialize)]
pub struct CacheStatsQuery {
  pub topic: Option<String>,
  pub difficulty: Option<Difficulty>,
}

#[derive(Debug, Serialize)]
pub struct CacheStatsOut {
  pub total: usize,
  pub predefined: usize,
  pub custom: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClearTarget {
  Predefined,
  Custom,
  All,
}

impl ClearTarget {
  pub fn partition(self) -> Option<Partition> {
    match self {
      ClearTarget::Predefined => Some(Partition::Predefined),
      ClearTarget::Custom => Some(Partition::Custom),
      ClearTarget::All => None,
    }
  }
}

#[derive(Debug, Deserialize)]
pub struct ClearIn {
  pub partition: ClearTarget,
}

#[derive(Debug, Serialize)]
pub struct ClearOut {
  pub cleared: ClearTarget,
}
