//! Question supplier: the three-tier fallback.
//!
//! Tiers are tried strictly in order, first hit wins:
//!   1. Local store (already canonical)
//!   2. Remote store, predefined topics only (normalized, exclusion-filtered,
//!      random pick)
//!   3. Generator, given the asked texts instead of ids
//!
//! A custom topic whose batch for the difficulty has been used up reports
//! `Exhausted` instead of falling through. Supplying never mutates the
//! exclusion set; the round records what it actually served.

use std::sync::Arc;

use rand::seq::SliceRandom;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::domain::{Difficulty, Lang, Question, QuestionId, TopicRef};
use crate::error::{GenerationError, SupplyError};
use crate::exclusion::ExclusionSet;
use crate::generator::{GenerationRequest, QuestionGenerator};
use crate::normalize::{normalize_all, normalize_record};
use crate::remote::RemoteStore;
use crate::store::{LocalStore, Partition};

/// Which source produced a question.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
  LocalStore,
  RemoteStore,
  Generator,
}

impl Tier {
  pub fn as_str(&self) -> &'static str {
    match self {
      Tier::LocalStore => "local_store",
      Tier::RemoteStore => "remote_store",
      Tier::Generator => "generator",
    }
  }
}

pub struct SupplyRequest<'a> {
  pub topic: &'a TopicRef,
  pub difficulty: Difficulty,
  pub exclusions: &'a ExclusionSet,
  /// Language the player reads; ephemeral ids hash this side of the text.
  pub lang: Lang,
}

#[derive(Clone, Debug)]
pub struct Supplied {
  pub question: Question,
  pub identity: QuestionId,
  pub tier: Tier,
}

pub struct QuestionSupplier {
  store: Arc<LocalStore>,
  remote: Option<Arc<dyn RemoteStore>>,
  generator: Option<Arc<dyn QuestionGenerator>>,
  remote_page_size: usize,
}

impl QuestionSupplier {
  pub fn new(
    store: Arc<LocalStore>,
    remote: Option<Arc<dyn RemoteStore>>,
    generator: Option<Arc<dyn QuestionGenerator>>,
    remote_page_size: usize,
  ) -> Self {
    Self { store, remote, generator, remote_page_size: remote_page_size.max(1) }
  }

  pub fn store(&self) -> &Arc<LocalStore> { &self.store }

  pub fn generator(&self) -> Option<&Arc<dyn QuestionGenerator>> { self.generator.as_ref() }

  #[instrument(
    level = "info",
    skip(self, req),
    fields(topic = %req.topic.value, difficulty = %req.difficulty, custom = req.topic.is_custom, excluded = req.exclusions.len())
  )]
  pub async fn supply(&self, req: &SupplyRequest<'_>) -> Result<Supplied, SupplyError> {
    let topic = &req.topic.value;
    let partition = Partition::for_topic(req.topic.is_custom);

    // 1) Local store
    if let Some(q) = self.store.query_unasked(partition, topic, req.difficulty, req.exclusions) {
      info!(target: "supplier", %topic, difficulty = %req.difficulty, tier = "local_store", "Question served");
      return Ok(self.supplied(q, Tier::LocalStore, req.lang));
    }
    debug!(target: "supplier", %topic, difficulty = %req.difficulty, "Local store miss");

    if req.topic.is_custom {
      // Custom topics have no remote presence. A batch that ran dry is final.
      if self.store.has_batch(topic, req.difficulty) {
        warn!(target: "supplier", %topic, difficulty = %req.difficulty, "Custom topic batch exhausted");
        return Err(SupplyError::Exhausted { topic: topic.clone(), difficulty: req.difficulty });
      }
    } else if let Some(q) = self.from_remote(req).await {
      info!(target: "supplier", %topic, difficulty = %req.difficulty, tier = "remote_store", "Question served");
      return Ok(self.supplied(q, Tier::RemoteStore, req.lang));
    }

    // 3) Generator
    match self.from_generator(req).await {
      Ok(q) => {
        info!(target: "supplier", %topic, difficulty = %req.difficulty, tier = "generator", "Question served");
        Ok(self.supplied(q, Tier::Generator, req.lang))
      }
      Err(source) => {
        warn!(target: "supplier", %topic, difficulty = %req.difficulty, error = %source, "All tiers missed");
        Err(SupplyError::NoQuestionAvailable { topic: topic.clone(), difficulty: req.difficulty, source })
      }
    }
  }

  fn supplied(&self, question: Question, tier: Tier, lang: Lang) -> Supplied {
    let identity = question.identity(lang);
    Supplied { question, identity, tier }
  }

  async fn from_remote(&self, req: &SupplyRequest<'_>) -> Option<Question> {
    let remote = self.remote.as_ref()?;
    let docs = match remote.fetch_page(&req.topic.value, req.difficulty, self.remote_page_size).await {
      Ok(docs) => docs,
      Err(e) => {
        warn!(target: "supplier", topic = %req.topic.value, error = %e, "Remote fetch failed; falling through");
        return None;
      }
    };
    let survivors: Vec<Question> = normalize_all(&docs, &req.topic.value, req.difficulty)
      .into_iter()
      .filter(|q| q.topic_value == req.topic.value && q.difficulty == req.difficulty)
      .filter(|q| !req.exclusions.excludes(q, req.lang))
      .collect();
    debug!(target: "supplier", fetched = docs.len(), survivors = survivors.len(), "Remote page filtered");
    survivors.choose(&mut rand::thread_rng()).cloned()
  }

  async fn from_generator(&self, req: &SupplyRequest<'_>) -> Result<Question, GenerationError> {
    let generator = self.generator.as_ref().ok_or(GenerationError::Disabled)?;
    let request = GenerationRequest {
      topic_value: req.topic.value.clone(),
      topic_label: req.topic.name.primary.clone(),
      difficulty: req.difficulty,
      already_asked: req.exclusions.asked_texts().to_vec(),
      instructions: req.topic.instructions.clone(),
      count: 1,
    };
    let generated = generator.generate(&request).await?;
    generated
      .into_iter()
      .find(|q| !req.exclusions.excludes(q, req.lang))
      .ok_or(GenerationError::Empty)
  }

  /// First play of a predefined topic: pull every remote question into the
  /// local store. Returns how many were saved.
  #[instrument(level = "info", skip(self))]
  pub async fn warm_topic(&self, topic_value: &str) -> usize {
    let Some(remote) = self.remote.as_ref() else { return 0 };
    if !self.store.is_available() || self.store.is_downloaded(topic_value) {
      return 0;
    }
    let docs = match remote.fetch_all_for_topic(topic_value).await {
      Ok(docs) => docs,
      Err(e) => {
        warn!(target: "supplier", %topic_value, error = %e, "Topic warm-up failed");
        return 0;
      }
    };
    let questions: Vec<Question> = docs
      .iter()
      .filter_map(|doc| {
        let difficulty = doc_difficulty(doc)?;
        normalize_record(doc, topic_value, difficulty)
      })
      .filter(|q| q.topic_value == topic_value)
      .collect();
    let saved = match self.store.try_save_batch(Partition::Predefined, &questions) {
      Ok(saved) => saved,
      Err(e) => {
        warn!(target: "supplier", %topic_value, error = %e, "Warm-up write failed; topic left unmarked");
        return 0;
      }
    };
    self.store.mark_downloaded(topic_value);
    info!(target: "supplier", %topic_value, fetched = docs.len(), saved, "Topic warmed into local store");
    saved
  }
}

fn doc_difficulty(doc: &Value) -> Option<Difficulty> {
  doc.get("difficulty")?.as_str()?.parse().ok()
}
