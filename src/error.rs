//! Error taxonomy for the engine and the HTTP surface.
//!
//! Tier failures (store, remote) are recovered inside the supplier. Only
//! generation failures, exhaustion and version-gate failures travel further.

use axum::{
  http::StatusCode,
  response::{IntoResponse, Json},
};
use serde_json::json;

use crate::domain::Difficulty;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
  #[error("local store unavailable")]
  Unavailable,

  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("stored payload is not valid JSON: {0}")]
  Json(#[from] serde_json::Error),

  #[error("local store lock poisoned")]
  Poisoned,
}

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
  #[error("remote store request failed: {0}")]
  Http(#[from] reqwest::Error),

  #[error("remote store returned HTTP {status}: {message}")]
  Status { status: u16, message: String },
}

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
  #[error("question generator not configured")]
  Disabled,

  #[error("generator request failed: {0}")]
  Http(#[from] reqwest::Error),

  #[error("generator returned HTTP {status}: {message}")]
  Api { status: u16, message: String },

  #[error("generator response could not be parsed: {0}")]
  Parse(String),

  #[error("generator returned no usable questions")]
  Empty,
}

/// Why the supplier could not deliver a question.
#[derive(Debug, thiserror::Error)]
pub enum SupplyError {
  /// Every tier missed. Retrying may help.
  #[error("no question available for {topic}/{difficulty}: {source}")]
  NoQuestionAvailable {
    topic: String,
    difficulty: Difficulty,
    #[source]
    source: GenerationError,
  },

  /// A custom topic's generated batch for this difficulty is used up.
  #[error("questions for {topic}/{difficulty} are exhausted")]
  Exhausted { topic: String, difficulty: Difficulty },
}

impl SupplyError {
  pub fn kind(&self) -> &'static str {
    match self {
      SupplyError::NoQuestionAvailable { .. } => "generation_failed",
      SupplyError::Exhausted { .. } => "exhausted",
    }
  }

  /// Whether asking again for the same topic and difficulty can succeed.
  pub fn retryable(&self) -> bool {
    matches!(self, SupplyError::NoQuestionAvailable { .. })
  }
}

/// Round-level failures reported to the player.
#[derive(Debug, thiserror::Error)]
pub enum RoundError {
  #[error(transparent)]
  Supply(#[from] SupplyError),

  #[error("no round in progress")]
  NoRound,

  #[error("the round is over")]
  Finished,

  #[error("the current question has not been answered yet")]
  QuestionOpen,

  #[error("no question is waiting for an answer")]
  NothingToAnswer,

  #[error("answer is for question {got}, current question is {current}")]
  StaleQuestion { got: u64, current: u64 },

  #[error("answer index {0} is out of range")]
  InvalidAnswer(usize),
}

impl RoundError {
  pub fn kind(&self) -> &'static str {
    match self {
      RoundError::Supply(e) => e.kind(),
      RoundError::NoRound | RoundError::Finished | RoundError::QuestionOpen | RoundError::NothingToAnswer => {
        "invalid_state"
      }
      RoundError::StaleQuestion { .. } | RoundError::InvalidAnswer(_) => "invalid_answer",
    }
  }

  pub fn retryable(&self) -> bool {
    match self {
      RoundError::Supply(e) => e.retryable(),
      _ => false,
    }
  }
}

/// Startup cache purge failure. Fatal.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
  #[error("could not read or write the content version token: {0}")]
  Token(#[from] std::io::Error),

  #[error("could not purge the local store: {0}")]
  Purge(#[source] StoreError),
}

#[derive(Debug, thiserror::Error)]
pub enum TopicError {
  #[error("topic rejected: {0}")]
  Rejected(String),

  #[error("cannot {action} while {state}")]
  InvalidTransition { action: &'static str, state: &'static str },

  #[error("unknown custom topic '{0}'")]
  Unknown(String),

  #[error(transparent)]
  Generation(#[from] GenerationError),

  #[error(transparent)]
  Store(#[from] StoreError),
}

impl TopicError {
  pub fn kind(&self) -> &'static str {
    match self {
      TopicError::Rejected(_) => "topic_rejected",
      TopicError::InvalidTransition { .. } => "invalid_state",
      TopicError::Unknown(_) => "unknown_topic",
      TopicError::Generation(_) => "generation_failed",
      TopicError::Store(_) => "store_failed",
    }
  }

  pub fn retryable(&self) -> bool {
    matches!(self, TopicError::Generation(_) | TopicError::Store(_))
  }
}

/// Errors returned by HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
  #[error(transparent)]
  Store(#[from] StoreError),
}

impl IntoResponse for AppError {
  fn into_response(self) -> axum::response::Response {
    let (status, message) = match self {
      AppError::Store(StoreError::Unavailable) => {
        (StatusCode::SERVICE_UNAVAILABLE, "local store unavailable".to_string())
      }
      AppError::Store(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}
