//! Minimal OpenAI client implementing the question generator.
//!
//! We only call chat.completions with a strict JSON object response format.
//! Calls are instrumented and log model names, latencies and token usage (not contents).
//!
//! NOTE: We never log the API key.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, instrument, warn};

use crate::config::{Languages, Prompts};
use crate::domain::{LocalizedText, Question};
use crate::error::GenerationError;
use crate::generator::{render_already_asked, GenerationRequest, QuestionGenerator, TopicValidation};
use crate::normalize::normalize_all;
use crate::util::{fill_template, trunc_for_log};

#[derive(Clone)]
pub struct OpenAI {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub fast_model: String,
  pub strong_model: String,
  pub prompts: Prompts,
  pub languages: Languages,
}

impl OpenAI {
  /// Construct the client if we find OPENAI_API_KEY; otherwise return None.
  pub fn from_env(prompts: Prompts, languages: Languages) -> Option<Self> {
    let api_key = std::env::var("OPENAI_API_KEY").ok()?;
    let base_url =
      std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
    let fast_model =
      std::env::var("OPENAI_FAST_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into());
    let strong_model =
      std::env::var("OPENAI_STRONG_MODEL").unwrap_or_else(|_| "gpt-4o".into());

    // Batch generation of a custom topic is a long call.
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(90))
      .build()
      .ok()?;

    Some(Self { client, api_key, base_url, fast_model, strong_model, prompts, languages })
  }

  /// JSON-object chat completion. Generic over the target type T.
  #[instrument(level = "info", skip(self, system, user), fields(model = %model))]
  async fn chat_json<T: for<'a> Deserialize<'a>>(
    &self,
    model: &str,
    system: &str,
    user: &str,
    temperature: f32,
  ) -> Result<T, GenerationError> {
    let url = format!("{}/chat/completions", self.base_url);
    let req = ChatCompletionRequest {
      model: model.to_string(),
      messages: vec![
        ChatMessageReq { role: "system".into(), content: system.into() },
        ChatMessageReq { role: "user".into(), content: user.into() },
      ],
      temperature,
      response_format: Some(ResponseFormat { r#type: "json_object".into() }),
    };

    let res = self.client.post(&url)
      .header(USER_AGENT, "quizline-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(&req).send().await?;

    if !res.status().is_success() {
      let status = res.status().as_u16();
      let body = res.text().await.unwrap_or_default();
      let message = extract_openai_error(&body).unwrap_or(body);
      return Err(GenerationError::Api { status, message });
    }

    let body: ChatCompletionResponse = res.json().await?;
    if let Some(usage) = &body.usage {
      info!(prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "OpenAI usage");
    }
    let text = body.choices.first()
      .and_then(|c| c.message.content.clone())
      .unwrap_or_default();

    serde_json::from_str::<T>(&text).map_err(|e| {
      warn!(error = %e, preview = %trunc_for_log(&text, 120), "Model returned malformed JSON");
      GenerationError::Parse(e.to_string())
    })
  }
}

#[async_trait]
impl QuestionGenerator for OpenAI {
  #[instrument(
    level = "info",
    skip(self, request),
    fields(topic = %request.topic_value, difficulty = %request.difficulty, count = request.count, excluded = request.already_asked.len(), model = %self.strong_model)
  )]
  async fn generate(&self, request: &GenerationRequest) -> Result<Vec<Question>, GenerationError> {
    #[derive(Deserialize)]
    struct Gen { #[serde(default)] questions: Vec<Value> }

    let count = request.count.to_string();
    let already_asked = render_already_asked(&request.already_asked);
    let instructions = request
      .instructions
      .as_deref()
      .map(|i| format!("Additional guidance: {i}"))
      .unwrap_or_default();
    let user = fill_template(
      &self.prompts.question_user_template,
      &[
        ("count", count.as_str()),
        ("topic", request.topic_label.as_str()),
        ("difficulty", request.difficulty.as_str()),
        ("primary", self.languages.primary.as_str()),
        ("secondary", self.languages.secondary.as_str()),
        ("instructions", instructions.as_str()),
        ("already_asked", already_asked.as_str()),
      ],
    );

    let start = std::time::Instant::now();
    let result = self.chat_json::<Gen>(&self.strong_model, &self.prompts.question_system, &user, 0.9).await;
    let elapsed = start.elapsed();
    let gen = match result {
      Ok(g) => {
        info!(?elapsed, raw = g.questions.len(), "Model response received successfully");
        g
      }
      Err(e) => {
        error!(?elapsed, error = %e, "Model call failed during question generation");
        return Err(e);
      }
    };

    let mut questions = normalize_all(&gen.questions, &request.topic_value, request.difficulty);
    for q in &mut questions {
      q.id = None;
      q.topic_value = request.topic_value.clone();
      q.difficulty = request.difficulty;
    }
    questions.truncate(request.count.max(1));
    if questions.is_empty() {
      return Err(GenerationError::Empty);
    }
    Ok(questions)
  }

  #[instrument(level = "info", skip(self, raw_topic), fields(topic_len = raw_topic.len(), model = %self.fast_model))]
  async fn validate_topic(&self, raw_topic: &str) -> Result<TopicValidation, GenerationError> {
    #[derive(Deserialize)]
    struct Val {
      valid: bool,
      #[serde(default)] reason: String,
      #[serde(default)] name: Option<LocalizedText>,
      #[serde(default)] instructions: String,
    }

    let user = fill_template(
      &self.prompts.topic_validation_user_template,
      &[
        ("topic", raw_topic.trim()),
        ("primary", self.languages.primary.as_str()),
        ("secondary", self.languages.secondary.as_str()),
      ],
    );
    let v: Val = self.chat_json(&self.fast_model, &self.prompts.topic_validation_system, &user, 0.2).await?;

    match (v.valid, v.name) {
      (true, Some(name)) if name.is_complete() => Ok(TopicValidation::Accepted {
        name,
        instructions: v.instructions,
      }),
      (true, _) => Err(GenerationError::Parse("accepted topic without a bilingual name".into())),
      (false, _) => Ok(TopicValidation::Rejected {
        reason: if v.reason.trim().is_empty() { "Topic not suitable for a quiz.".into() } else { v.reason },
      }),
    }
  }
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
  #[serde(skip_serializing_if = "Option::is_none")]
  response_format: Option<ResponseFormat>,
}
#[derive(Serialize)]
struct ChatMessageReq { role: String, content: String }
#[derive(Serialize)]
struct ResponseFormat { #[serde(rename = "type")] r#type: String }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

/// Try to extract a clean error message from OpenAI error body.
fn extract_openai_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  match serde_json::from_str::<EWrap>(body) {
    Ok(w) => Some(w.error.message),
    Err(_) => None,
  }
}
