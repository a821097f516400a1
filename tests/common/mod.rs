// tests/common/mod.rs
#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use quizline_backend::config::{AppConfig, QuizConfig};
use quizline_backend::domain::{Difficulty, LocalizedText, Question};
use quizline_backend::error::{GenerationError, RemoteError};
use quizline_backend::generator::{GenerationRequest, QuestionGenerator, TopicValidation};
use quizline_backend::remote::{RoundSummary, ScoreRecorder};
use quizline_backend::state::AppState;
use quizline_backend::store::{LocalStore, Partition};

pub fn text(s: &str) -> LocalizedText {
  LocalizedText::new(s, format!("{s} (es)"))
}

pub fn question(id: Option<&str>, topic: &str, difficulty: Difficulty, prompt: &str) -> Question {
  Question {
    id: id.map(str::to_string),
    topic_value: topic.to_string(),
    difficulty,
    question: text(prompt),
    correct_answer: text("right"),
    distractors: [text("wrong 1"), text("wrong 2"), text("wrong 3")],
    explanation: Some(text("because")),
    hint: None,
    image_url: None,
    image_credit: None,
  }
}

/// Accepts every topic and generates numbered, id-less questions.
#[derive(Default)]
pub struct ScriptedGenerator {
  pub calls: AtomicUsize,
}

#[async_trait]
impl QuestionGenerator for ScriptedGenerator {
  async fn generate(&self, request: &GenerationRequest) -> Result<Vec<Question>, GenerationError> {
    let call = self.calls.fetch_add(1, Ordering::SeqCst);
    Ok(
      (0..request.count)
        .map(|i| question(None, &request.topic_value, request.difficulty, &format!("Generated {call}-{i}")))
        .collect(),
    )
  }

  async fn validate_topic(&self, raw_topic: &str) -> Result<TopicValidation, GenerationError> {
    if raw_topic.contains("nonsense") {
      return Ok(TopicValidation::Rejected { reason: "Not a quiz topic".into() });
    }
    Ok(TopicValidation::Accepted {
      name: LocalizedText::new("Volcanoes", "Volcanes"),
      instructions: "Famous eruptions and volcano types".into(),
    })
  }
}

#[derive(Default)]
pub struct RecordingScores {
  pub rounds: Mutex<Vec<RoundSummary>>,
}

#[async_trait]
impl ScoreRecorder for RecordingScores {
  async fn record(&self, summary: &RoundSummary) -> Result<(), RemoteError> {
    self.rounds.lock().unwrap().push(summary.clone());
    Ok(())
  }
}

pub fn test_config(round_length: usize) -> AppConfig {
  let mut quiz = QuizConfig::default();
  quiz.game.round_length = round_length;
  quiz.game.timer_seconds = 2;
  quiz.game.custom_batch_size = 8;
  AppConfig { port: 0, data_dir: PathBuf::from("./unused"), remote_base_url: None, quiz }
}

/// In-memory store preloaded with `per_level` geography questions at every
/// difficulty.
pub fn geography_store(per_level: usize) -> Arc<LocalStore> {
  let store = Arc::new(LocalStore::open_in_memory().unwrap());
  for difficulty in Difficulty::ALL {
    let batch: Vec<Question> = (0..per_level)
      .map(|i| {
        let id = format!("geo-{difficulty}-{i}");
        question(Some(&id), "geography", difficulty, &format!("Geography {difficulty} {i}"))
      })
      .collect();
    store.save_batch(Partition::Predefined, &batch);
  }
  store
}

pub async fn test_state(
  round_length: usize,
  store: Arc<LocalStore>,
  generator: Option<Arc<ScriptedGenerator>>,
  scores: Arc<RecordingScores>,
) -> Arc<AppState> {
  let generator = generator.map(|g| g as Arc<dyn QuestionGenerator>);
  Arc::new(AppState::assemble(test_config(round_length), store, None, generator, scores).await)
}
