//! Configuration: environment variables plus an optional TOML file.
//!
//! See `QuizConfig` for the TOML schema. Every section is optional; missing
//! values fall back to defaults.

use std::path::PathBuf;

use serde::Deserialize;
use tracing::{error, info};

/// Settings read from the environment at startup.
#[derive(Clone, Debug)]
pub struct AppConfig {
  pub port: u16,
  pub data_dir: PathBuf,
  pub remote_base_url: Option<String>,
  pub quiz: QuizConfig,
}

impl AppConfig {
  pub fn from_env() -> Self {
    let port = std::env::var("PORT").ok().and_then(|p| p.parse::<u16>().ok()).unwrap_or(3000);
    let data_dir = std::env::var("DATA_DIR").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("./data"));
    let remote_base_url = std::env::var("REMOTE_BASE_URL")
      .ok()
      .map(|s| s.trim_end_matches('/').to_string())
      .filter(|s| !s.is_empty());
    let quiz = load_quiz_config_from_env().unwrap_or_default();
    Self { port, data_dir, remote_base_url, quiz }
  }

  pub fn db_path(&self) -> PathBuf {
    self.data_dir.join("quiz_cache.sqlite3")
  }

  pub fn version_token_path(&self) -> PathBuf {
    self.data_dir.join("content_version")
  }
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct QuizConfig {
  #[serde(default)]
  pub game: GameConfig,
  #[serde(default)]
  pub languages: Languages,
  #[serde(default)]
  pub prompts: Prompts,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct GameConfig {
  /// Questions per round.
  pub round_length: usize,
  /// Countdown per question.
  pub timer_seconds: u32,
  /// Questions generated per custom topic and difficulty.
  pub custom_batch_size: usize,
  /// Upper bound on candidates fetched from the remote store per request.
  pub remote_page_size: usize,
}

impl Default for GameConfig {
  fn default() -> Self {
    Self { round_length: 10, timer_seconds: 20, custom_batch_size: 30, remote_page_size: 20 }
  }
}

/// Language codes of the two sides of every `LocalizedText`.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Languages {
  pub primary: String,
  pub secondary: String,
}

impl Default for Languages {
  fn default() -> Self {
    Self { primary: "en".into(), secondary: "es".into() }
  }
}

/// Prompts used by the generator client. Placeholders in `{braces}` are filled
/// at call time.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub question_system: String,
  pub question_user_template: String,
  pub topic_validation_system: String,
  pub topic_validation_user_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      question_system: "You write bilingual multiple-choice trivia questions. Respond ONLY with strict JSON.".into(),
      question_user_template: "Write {count} multiple-choice question(s) about the topic '{topic}' at difficulty '{difficulty}'.\n\
Every text field is an object {\"primaryLang\": <{primary} text>, \"secondaryLang\": <{secondary} text>}.\n\
Return JSON {\"questions\": [{\"question\", \"correctAnswer\", \"distractors\" (exactly 3), \"explanation\", \"hint\"}]}.\n\
Exactly one answer is correct; distractors must be plausible and distinct.\n\
{instructions}\n\
Do NOT repeat or paraphrase any of these already asked questions:\n{already_asked}".into(),
      topic_validation_system: "You review free-text quiz topics proposed by players. Respond ONLY with strict JSON.".into(),
      topic_validation_user_template: "Proposed topic: {topic}\n\
Decide whether it is a safe, answerable trivia topic with enough material for a few dozen questions.\n\
Return JSON {\"valid\": boolean, \"reason\": string, \"name\": {\"primaryLang\": <{primary}>, \"secondaryLang\": <{secondary}>}, \"instructions\": string}.\n\
When valid, 'name' is a short refined title and 'instructions' tells a question writer what to cover.".into(),
    }
  }
}

/// Load `QuizConfig` from QUIZ_CONFIG_PATH. On any IO/parse error, returns None.
pub fn load_quiz_config_from_env() -> Option<QuizConfig> {
  let path = std::env::var("QUIZ_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<QuizConfig>(&s) {
      Ok(cfg) => {
        info!(target: "quizline_backend", %path, "Loaded quiz config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "quizline_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "quizline_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}
