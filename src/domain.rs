//! Domain models: difficulty levels, bilingual text, the canonical question,
//! question identities and the topic records the engine works with.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Question difficulty. Ordered `Easy < Medium < Hard`. Serialized lowercase;
/// parsed case-insensitively.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Difficulty {
  Easy,
  Medium,
  Hard,
}

impl Difficulty {
  pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];

  pub fn as_str(&self) -> &'static str {
    match self {
      Difficulty::Easy => "easy",
      Difficulty::Medium => "medium",
      Difficulty::Hard => "hard",
    }
  }

  /// One level up, clamped at `Hard`.
  pub fn harder(self) -> Self {
    match self {
      Difficulty::Easy => Difficulty::Medium,
      Difficulty::Medium | Difficulty::Hard => Difficulty::Hard,
    }
  }

  /// One level down, clamped at `Easy`.
  pub fn easier(self) -> Self {
    match self {
      Difficulty::Hard => Difficulty::Medium,
      Difficulty::Medium | Difficulty::Easy => Difficulty::Easy,
    }
  }
}

impl Default for Difficulty {
  fn default() -> Self { Difficulty::Medium }
}

impl fmt::Display for Difficulty {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Difficulty {
  type Err = String;
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "easy" => Ok(Difficulty::Easy),
      "medium" => Ok(Difficulty::Medium),
      "hard" => Ok(Difficulty::Hard),
      other => Err(format!("unknown difficulty '{other}'")),
    }
  }
}

impl TryFrom<String> for Difficulty {
  type Error = String;
  fn try_from(s: String) -> Result<Self, Self::Error> { s.parse() }
}

/// Which of the two configured languages the player reads.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lang {
  Primary,
  Secondary,
}

impl Default for Lang {
  fn default() -> Self { Lang::Primary }
}

/// Paired-language text.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalizedText {
  #[serde(rename = "primaryLang")]
  pub primary: String,
  #[serde(rename = "secondaryLang")]
  pub secondary: String,
}

impl LocalizedText {
  pub fn new(primary: impl Into<String>, secondary: impl Into<String>) -> Self {
    Self { primary: primary.into(), secondary: secondary.into() }
  }

  pub fn get(&self, lang: Lang) -> &str {
    match lang {
      Lang::Primary => &self.primary,
      Lang::Secondary => &self.secondary,
    }
  }

  /// Both sides carry non-blank text.
  pub fn is_complete(&self) -> bool {
    !self.primary.trim().is_empty() && !self.secondary.trim().is_empty()
  }
}

/// Stable identity of a served question.
///
/// Persisted questions carry their store id; generator-only questions get an
/// ephemeral id derived from a hash of their question text, so two deliveries
/// of the same generated text compare equal.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum QuestionId {
  Persisted(String),
  Ephemeral(Uuid),
}

impl QuestionId {
  pub fn ephemeral_for(question_text: &str) -> Self {
    QuestionId::Ephemeral(Uuid::new_v5(&Uuid::NAMESPACE_OID, question_text.trim().as_bytes()))
  }

  pub fn persisted(&self) -> Option<&str> {
    match self {
      QuestionId::Persisted(id) => Some(id),
      QuestionId::Ephemeral(_) => None,
    }
  }
}

impl fmt::Display for QuestionId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      QuestionId::Persisted(id) => write!(f, "{id}"),
      QuestionId::Ephemeral(hash) => write!(f, "ephemeral:{hash}"),
    }
  }
}

/// The canonical question: one correct answer plus exactly three distractors.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub id: Option<String>,
  pub topic_value: String,
  pub difficulty: Difficulty,
  pub question: LocalizedText,
  pub correct_answer: LocalizedText,
  pub distractors: [LocalizedText; 3],
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub explanation: Option<LocalizedText>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub hint: Option<LocalizedText>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub image_url: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub image_credit: Option<String>,
}

impl Question {
  /// Identity used by the exclusion set. Questions without a store id are
  /// identified by the text the player saw.
  pub fn identity(&self, lang: Lang) -> QuestionId {
    match &self.id {
      Some(id) => QuestionId::Persisted(id.clone()),
      None => QuestionId::ephemeral_for(self.question.get(lang)),
    }
  }

  /// Correct answer first, distractors after, in stored order.
  pub fn answers(&self) -> [&LocalizedText; 4] {
    [&self.correct_answer, &self.distractors[0], &self.distractors[1], &self.distractors[2]]
  }
}

/// Predefined topic as listed in the catalogue.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicDefinition {
  pub value: String,
  pub name: LocalizedText,
  #[serde(default)]
  pub category: String,
  /// Category-specific guidance for the generator.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub instructions: Option<String>,
}

/// Registry entry for a user-created topic. Created once, never mutated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomTopicMeta {
  pub custom_topic_value: String,
  pub name: LocalizedText,
  pub instructions: String,
  pub created_at: DateTime<Utc>,
}

/// What a round is played on.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicRef {
  pub value: String,
  pub name: LocalizedText,
  pub is_custom: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub instructions: Option<String>,
}

impl From<&TopicDefinition> for TopicRef {
  fn from(t: &TopicDefinition) -> Self {
    Self { value: t.value.clone(), name: t.name.clone(), is_custom: false, instructions: t.instructions.clone() }
  }
}

impl From<&CustomTopicMeta> for TopicRef {
  fn from(m: &CustomTopicMeta) -> Self {
    Self {
      value: m.custom_topic_value.clone(),
      name: m.name.clone(),
      is_custom: true,
      instructions: Some(m.instructions.clone()),
    }
  }
}
