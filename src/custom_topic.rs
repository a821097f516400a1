//! Custom topic lifecycle.
//!
//! `idle -> validating -> confirming -> generating_batch -> ready`
//!
//! - A rejected proposal returns to `idle` with the reason.
//! - Cancelling a proposal returns to `idle`; nothing has been persisted yet.
//! - Confirming assigns the topic its value, registers it, then generates one
//!   batch at the round's starting difficulty into the custom partition. A
//!   failed batch leaves the proposal pending so the player can confirm again
//!   under the same value.
//! - Re-selecting a registered topic skips straight to `ready`, generating a
//!   batch only for a difficulty that has none.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::{CustomTopicMeta, Difficulty, LocalizedText, TopicRef};
use crate::error::{GenerationError, TopicError};
use crate::generator::{GenerationRequest, QuestionGenerator, TopicValidation};
use crate::store::{LocalStore, Partition};
use crate::util::{slugify, trunc_for_log};

/// A validated topic waiting for the player's confirmation.
#[derive(Clone, Debug, PartialEq)]
pub struct TopicProposal {
  pub name: LocalizedText,
  pub instructions: String,
  /// Set by the first confirmation; reused if its batch has to be retried.
  pub registered: Option<CustomTopicMeta>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TopicFlowState {
  Idle,
  Validating,
  Confirming(TopicProposal),
  GeneratingBatch,
  Ready(CustomTopicMeta),
}

impl TopicFlowState {
  pub fn as_str(&self) -> &'static str {
    match self {
      TopicFlowState::Idle => "idle",
      TopicFlowState::Validating => "validating",
      TopicFlowState::Confirming(_) => "confirming",
      TopicFlowState::GeneratingBatch => "generating_batch",
      TopicFlowState::Ready(_) => "ready",
    }
  }
}

pub struct CustomTopicFlow {
  store: Arc<LocalStore>,
  generator: Option<Arc<dyn QuestionGenerator>>,
  batch_size: usize,
  state: TopicFlowState,
}

impl CustomTopicFlow {
  pub fn new(store: Arc<LocalStore>, generator: Option<Arc<dyn QuestionGenerator>>, batch_size: usize) -> Self {
    Self { store, generator, batch_size: batch_size.max(1), state: TopicFlowState::Idle }
  }

  pub fn state(&self) -> &TopicFlowState { &self.state }

  fn generator(&self) -> Result<&Arc<dyn QuestionGenerator>, TopicError> {
    self.generator.as_ref().ok_or(TopicError::Generation(GenerationError::Disabled))
  }

  fn ensure_not_busy(&self, action: &'static str) -> Result<(), TopicError> {
    match self.state {
      TopicFlowState::Validating | TopicFlowState::GeneratingBatch => {
        Err(TopicError::InvalidTransition { action, state: self.state.as_str() })
      }
      _ => Ok(()),
    }
  }

  /// Send a free-text topic to the validator.
  #[instrument(level = "info", skip(self, raw), fields(len = raw.len()))]
  pub async fn submit(&mut self, raw: &str) -> Result<TopicProposal, TopicError> {
    self.ensure_not_busy("propose a topic")?;
    let raw = raw.trim();
    if raw.is_empty() {
      self.state = TopicFlowState::Idle;
      return Err(TopicError::Rejected("Topic is empty.".into()));
    }
    let generator = self.generator()?.clone();

    self.state = TopicFlowState::Validating;
    let verdict = generator.validate_topic(raw).await;
    match verdict {
      Ok(TopicValidation::Accepted { name, instructions }) => {
        let proposal = TopicProposal { name, instructions, registered: None };
        info!(target: "topic", name = %proposal.name.primary, "Topic proposal accepted by validator");
        self.state = TopicFlowState::Confirming(proposal.clone());
        Ok(proposal)
      }
      Ok(TopicValidation::Rejected { reason }) => {
        info!(target: "topic", raw = %trunc_for_log(raw, 60), %reason, "Topic rejected");
        self.state = TopicFlowState::Idle;
        Err(TopicError::Rejected(reason))
      }
      Err(e) => {
        warn!(target: "topic", error = %e, "Topic validation failed");
        self.state = TopicFlowState::Idle;
        Err(e.into())
      }
    }
  }

  /// Drop the pending proposal.
  pub fn cancel(&mut self) -> Result<(), TopicError> {
    match self.state {
      TopicFlowState::Confirming(_) => {
        self.state = TopicFlowState::Idle;
        Ok(())
      }
      _ => Err(TopicError::InvalidTransition { action: "cancel", state: self.state.as_str() }),
    }
  }

  /// Accept the pending proposal and generate its first batch.
  #[instrument(level = "info", skip(self), fields(difficulty = %start))]
  pub async fn confirm(&mut self, start: Difficulty) -> Result<TopicRef, TopicError> {
    let mut proposal = match &self.state {
      TopicFlowState::Confirming(p) => p.clone(),
      other => return Err(TopicError::InvalidTransition { action: "confirm", state: other.as_str() }),
    };
    let meta = match &proposal.registered {
      Some(meta) => meta.clone(),
      None => {
        let created_at = Utc::now();
        CustomTopicMeta {
          custom_topic_value: format!("{}_{}", slugify(&proposal.name.primary), created_at.timestamp_millis()),
          name: proposal.name.clone(),
          instructions: proposal.instructions.clone(),
          created_at,
        }
      }
    };
    proposal.registered = Some(meta.clone());

    self.state = TopicFlowState::GeneratingBatch;
    let result = match self.store.register_custom_topic(&meta) {
      Ok(()) => self.generate_batch(&meta, start).await,
      Err(e) => Err(e.into()),
    };
    match result {
      Ok(saved) => {
        info!(target: "topic", value = %meta.custom_topic_value, saved, "Custom topic ready");
        let topic = TopicRef::from(&meta);
        self.state = TopicFlowState::Ready(meta);
        Ok(topic)
      }
      Err(e) => {
        warn!(target: "topic", value = %meta.custom_topic_value, error = %e, "Custom topic batch failed");
        self.state = TopicFlowState::Confirming(proposal);
        Err(e)
      }
    }
  }

  /// Replay a registered topic at `difficulty`.
  #[instrument(level = "info", skip(self), fields(difficulty = %difficulty))]
  pub async fn select_existing(&mut self, value: &str, difficulty: Difficulty) -> Result<TopicRef, TopicError> {
    self.ensure_not_busy("select a topic")?;
    let meta = self.store.custom_topic(value).ok_or_else(|| TopicError::Unknown(value.to_string()))?;

    if !self.store.has_batch(value, difficulty) {
      let previous = std::mem::replace(&mut self.state, TopicFlowState::GeneratingBatch);
      if let Err(e) = self.generate_batch(&meta, difficulty).await {
        warn!(target: "topic", %value, error = %e, "Batch for uncovered difficulty failed");
        self.state = previous;
        return Err(e);
      }
    }
    let topic = TopicRef::from(&meta);
    self.state = TopicFlowState::Ready(meta);
    Ok(topic)
  }

  async fn generate_batch(&self, meta: &CustomTopicMeta, difficulty: Difficulty) -> Result<usize, TopicError> {
    let generator = self.generator()?;
    let request = GenerationRequest {
      topic_value: meta.custom_topic_value.clone(),
      topic_label: meta.name.primary.clone(),
      difficulty,
      already_asked: Vec::new(),
      instructions: Some(meta.instructions.clone()).filter(|i| !i.trim().is_empty()),
      count: self.batch_size,
    };
    let mut questions = generator.generate(&request).await?;
    for q in &mut questions {
      q.id = Some(Uuid::new_v4().to_string());
      q.topic_value = meta.custom_topic_value.clone();
      q.difficulty = difficulty;
    }
    let saved = self.store.try_save_batch(Partition::Custom, &questions)?;
    self.store.mark_batch_generated(&meta.custom_topic_value, difficulty)?;
    info!(target: "topic", value = %meta.custom_topic_value, %difficulty, saved, "Custom batch stored");
    Ok(saved)
  }
}
