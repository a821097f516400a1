//! Contract of the AI question-generation collaborator.

use async_trait::async_trait;

use crate::domain::{Difficulty, LocalizedText, Question};
use crate::error::GenerationError;

/// One generation call.
///
/// The generator has no notion of store ids, so exclusions travel as the texts
/// of the questions already asked.
#[derive(Clone, Debug)]
pub struct GenerationRequest {
  pub topic_value: String,
  /// Human-readable topic label used in the prompt.
  pub topic_label: String,
  pub difficulty: Difficulty,
  pub already_asked: Vec<LocalizedText>,
  pub instructions: Option<String>,
  pub count: usize,
}

/// Verdict on a player's free-text topic.
#[derive(Clone, Debug, PartialEq)]
pub enum TopicValidation {
  Accepted { name: LocalizedText, instructions: String },
  Rejected { reason: String },
}

#[async_trait]
pub trait QuestionGenerator: Send + Sync {
  /// Canonical questions tagged with the request's topic and difficulty.
  /// Returned questions carry no store id.
  async fn generate(&self, request: &GenerationRequest) -> Result<Vec<Question>, GenerationError>;

  async fn validate_topic(&self, raw_topic: &str) -> Result<TopicValidation, GenerationError>;
}

/// Render asked questions as a bullet list for prompts.
pub fn render_already_asked(asked: &[LocalizedText]) -> String {
  if asked.is_empty() {
    return "(none)".into();
  }
  asked
    .iter()
    .map(|t| format!("- {} / {}", t.primary, t.secondary))
    .collect::<Vec<_>>()
    .join("\n")
}
