//! Game round session.
//!
//! One session plays a fixed number of questions on one topic:
//!   - ask the supplier for a question at the controller's difficulty
//!   - shuffle the four answers and remember where the correct one landed
//!   - arm a countdown; an answer or the countdown expiring resolves the
//!     question, whichever comes first
//!   - on resolution update the score, the controller and the exclusion set
//!
//! Submitting an answer cancels the countdown before anything else happens.
//! A timeout for a question that is already resolved (or no longer current)
//! is ignored.

use std::time::Duration;

use chrono::Utc;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};

use crate::difficulty::{DifficultyController, DifficultyMode};
use crate::domain::{Difficulty, Lang, LocalizedText, Question, QuestionId, TopicRef};
use crate::error::RoundError;
use crate::exclusion::ExclusionSet;
use crate::remote::RoundSummary;
use crate::supplier::{QuestionSupplier, SupplyRequest, Tier};

#[derive(Clone, Debug)]
pub struct RoundConfig {
  pub topic: TopicRef,
  pub mode: DifficultyMode,
  pub lang: Lang,
  pub length: usize,
  pub timer_seconds: u32,
}

/// Emitted by a running countdown.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CountdownEvent {
  Tick { seq: u64, remaining: u32 },
  Expired { seq: u64 },
}

/// Handle to a running countdown task. Cancelled on drop.
pub struct Countdown {
  handle: JoinHandle<()>,
}

impl Countdown {
  /// Count `seconds` down, one `tick` per step, reporting to `tx`.
  pub fn start(seq: u64, seconds: u32, tick: Duration, tx: mpsc::Sender<CountdownEvent>) -> Self {
    let handle = tokio::spawn(async move {
      let mut remaining = seconds;
      while remaining > 0 {
        tokio::time::sleep(tick).await;
        remaining -= 1;
        let event = if remaining == 0 {
          CountdownEvent::Expired { seq }
        } else {
          CountdownEvent::Tick { seq, remaining }
        };
        if tx.send(event).await.is_err() {
          return;
        }
      }
      if seconds == 0 {
        let _ = tx.send(CountdownEvent::Expired { seq }).await;
      }
    });
    Self { handle }
  }

  pub fn cancel(self) {
    self.handle.abort();
  }
}

impl Drop for Countdown {
  fn drop(&mut self) {
    self.handle.abort();
  }
}

/// How a question was resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "index", rename_all = "snake_case")]
pub enum Selection {
  Answer(usize),
  Timeout,
}

/// The question currently on screen.
#[derive(Clone, Debug)]
pub struct ActiveQuestion {
  pub seq: u64,
  /// 1-based position in the round.
  pub number: usize,
  pub difficulty: Difficulty,
  pub question: Question,
  pub identity: QuestionId,
  pub tier: Tier,
  /// Shuffled answers.
  pub answers: Vec<LocalizedText>,
  pub correct_index: usize,
  pub resolution: Option<Selection>,
}

/// Result of resolving one question.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
  pub seq: u64,
  pub selection: Selection,
  pub correct: bool,
  pub correct_index: usize,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub explanation: Option<LocalizedText>,
  pub score: usize,
  pub answered: usize,
  pub total: usize,
  pub next_difficulty: Difficulty,
  pub round_complete: bool,
}

/// Shuffle the four answers with an unbiased permutation. Returns the answers
/// in display order and the index the correct answer ended up at.
pub fn shuffle_answers<R: Rng + ?Sized>(question: &Question, rng: &mut R) -> (Vec<LocalizedText>, usize) {
  let source = question.answers();
  let mut order = [0usize, 1, 2, 3];
  order.shuffle(rng);
  let answers = order.iter().map(|&i| source[i].clone()).collect();
  let correct_index = order.iter().position(|&i| i == 0).unwrap_or(0);
  (answers, correct_index)
}

pub struct RoundSession {
  config: RoundConfig,
  exclusions: ExclusionSet,
  controller: DifficultyController,
  current: Option<ActiveQuestion>,
  countdown: Option<Countdown>,
  next_seq: u64,
  correct: usize,
  answered: usize,
}

impl RoundSession {
  /// `first_seq` numbers the first question. Callers that run several rounds
  /// over one countdown channel continue from the previous round's
  /// [`next_seq`](Self::next_seq) so events from an old round never match.
  pub fn new(config: RoundConfig, first_seq: u64) -> Self {
    let controller = DifficultyController::new(config.mode);
    Self {
      config,
      exclusions: ExclusionSet::new(),
      controller,
      current: None,
      countdown: None,
      next_seq: first_seq,
      correct: 0,
      answered: 0,
    }
  }

  pub fn config(&self) -> &RoundConfig { &self.config }

  pub fn topic(&self) -> &TopicRef { &self.config.topic }

  pub fn current(&self) -> Option<&ActiveQuestion> { self.current.as_ref() }

  pub fn difficulty(&self) -> Difficulty { self.controller.current() }

  pub fn exclusions(&self) -> &ExclusionSet { &self.exclusions }

  pub fn score(&self) -> usize { self.correct }

  pub fn answered(&self) -> usize { self.answered }

  pub fn is_complete(&self) -> bool { self.answered >= self.config.length }

  /// Sequence number the next presented question will carry.
  pub fn next_seq(&self) -> u64 { self.next_seq }

  /// Fetch and present the next question. A failure leaves the session
  /// exactly as it was, so the same request can be retried.
  #[instrument(level = "info", skip(self, supplier), fields(topic = %self.config.topic.value, difficulty = %self.controller.current()))]
  pub async fn next_question(&mut self, supplier: &QuestionSupplier) -> Result<&ActiveQuestion, RoundError> {
    if self.is_complete() {
      return Err(RoundError::Finished);
    }
    if self.current.as_ref().is_some_and(|q| q.resolution.is_none()) {
      return Err(RoundError::QuestionOpen);
    }

    let difficulty = self.controller.current();
    let request = SupplyRequest {
      topic: &self.config.topic,
      difficulty,
      exclusions: &self.exclusions,
      lang: self.config.lang,
    };
    let supplied = supplier.supply(&request).await?;

    let (answers, correct_index) = shuffle_answers(&supplied.question, &mut rand::thread_rng());
    let seq = self.next_seq;
    self.next_seq += 1;
    debug!(target: "round", seq, id = %supplied.identity, tier = supplied.tier.as_str(), "Question presented");
    self.countdown = None;
    Ok(self.current.insert(ActiveQuestion {
      seq,
      number: self.answered + 1,
      difficulty,
      question: supplied.question,
      identity: supplied.identity,
      tier: supplied.tier,
      answers,
      correct_index,
      resolution: None,
    }))
  }

  /// Start the countdown for the current open question.
  pub fn arm_countdown(&mut self, tx: mpsc::Sender<CountdownEvent>, tick: Duration) {
    let Some(q) = self.current.as_ref().filter(|q| q.resolution.is_none()) else { return };
    self.countdown = Some(Countdown::start(q.seq, self.config.timer_seconds, tick, tx));
  }

  /// Record the player's answer for question `seq`.
  pub fn submit_answer(&mut self, seq: u64, index: usize) -> Result<Feedback, RoundError> {
    let q = self.current.as_ref().ok_or(RoundError::NothingToAnswer)?;
    if q.seq != seq {
      return Err(RoundError::StaleQuestion { got: seq, current: q.seq });
    }
    if q.resolution.is_some() {
      return Err(RoundError::NothingToAnswer);
    }
    if index >= q.answers.len() {
      return Err(RoundError::InvalidAnswer(index));
    }
    if let Some(countdown) = self.countdown.take() {
      countdown.cancel();
    }
    self.resolve(Selection::Answer(index)).ok_or(RoundError::NothingToAnswer)
  }

  /// Countdown expiry for question `seq`. Returns None when the question was
  /// already resolved or is no longer current.
  pub fn handle_timeout(&mut self, seq: u64) -> Option<Feedback> {
    let q = self.current.as_ref()?;
    if q.seq != seq || q.resolution.is_some() {
      debug!(target: "round", seq, "Late timeout ignored");
      return None;
    }
    self.countdown = None;
    self.resolve(Selection::Timeout)
  }

  fn resolve(&mut self, selection: Selection) -> Option<Feedback> {
    let lang = self.config.lang;
    let q = self.current.as_mut()?;
    let correct = selection == Selection::Answer(q.correct_index);
    q.resolution = Some(selection);
    self.exclusions.insert(&q.question, lang);
    self.answered += 1;
    if correct {
      self.correct += 1;
    }
    let next_difficulty = self.controller.record(correct);
    info!(target: "round", seq = q.seq, correct, score = self.correct, answered = self.answered, %next_difficulty, "Question resolved");
    Some(Feedback {
      seq: q.seq,
      selection,
      correct,
      correct_index: q.correct_index,
      explanation: q.question.explanation.clone(),
      score: self.correct,
      answered: self.answered,
      total: self.config.length,
      next_difficulty,
      round_complete: self.answered >= self.config.length,
    })
  }

  /// Stop any running countdown.
  pub fn teardown(&mut self) {
    self.countdown = None;
  }

  pub fn summary(&self) -> RoundSummary {
    RoundSummary {
      topic_value: self.config.topic.value.clone(),
      topic_name: self.config.topic.name.clone(),
      is_custom: self.config.topic.is_custom,
      mode: self.config.mode.to_string(),
      correct: self.correct,
      total: self.answered,
      finished_at: Utc::now(),
    }
  }
}
