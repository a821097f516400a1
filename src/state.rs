//! Application state shared by every connection.
//!
//! This module owns:
//!   - the local store (behind the `CacheAdmin` view for admin routes)
//!   - the question supplier with its optional remote store and generator
//!   - the score recorder
//!   - the topic catalogue loaded at startup
//!
//! `initialize` runs the version gate before anything else touches the store.

use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use crate::config::AppConfig;
use crate::custom_topic::CustomTopicFlow;
use crate::difficulty::DifficultyMode;
use crate::domain::{Lang, TopicDefinition, TopicRef};
use crate::error::GateError;
use crate::generator::QuestionGenerator;
use crate::openai::OpenAI;
use crate::remote::{HttpRemoteStore, LogScoreRecorder, RemoteStore, ScoreRecorder};
use crate::seeds::seed_topics;
use crate::session::RoundConfig;
use crate::store::{CacheAdmin, LocalStore};
use crate::supplier::QuestionSupplier;
use crate::version_gate::{run_version_gate, FileTokenStore, GateOutcome, CONTENT_VERSION};

pub struct AppState {
  pub config: AppConfig,
  pub store: Arc<LocalStore>,
  pub admin: Arc<dyn CacheAdmin>,
  pub supplier: Arc<QuestionSupplier>,
  pub scores: Arc<dyn ScoreRecorder>,
  pub topics: Vec<TopicDefinition>,
}

impl AppState {
  /// Open the store, run the version gate, wire collaborators from the
  /// environment and load the topic catalogue. A gate failure is fatal.
  #[instrument(level = "info", skip_all, fields(data_dir = %config.data_dir.display()))]
  pub async fn initialize(config: AppConfig) -> Result<Self, GateError> {
    let store = Arc::new(LocalStore::open(&config.db_path()));
    let tokens = FileTokenStore::new(config.version_token_path());
    match run_version_gate(&store, &tokens, CONTENT_VERSION)? {
      GateOutcome::Current => info!(target: "quizline_backend", version = CONTENT_VERSION, "Cache is current"),
      GateOutcome::Purged { previous } => {
        info!(target: "quizline_backend", ?previous, version = CONTENT_VERSION, "Cache purged for new content version")
      }
      GateOutcome::StoreUnavailable => {
        warn!(target: "quizline_backend", "Local store unavailable; serving from remote store and generator only")
      }
    }

    let http_remote = match &config.remote_base_url {
      Some(url) => match HttpRemoteStore::new(url.clone()) {
        Ok(r) => Some(Arc::new(r)),
        Err(e) => {
          error!(target: "quizline_backend", error = %e, "Cannot build remote store client; remote tier disabled");
          None
        }
      },
      None => None,
    };
    let (remote, scores) = match http_remote {
      Some(r) => {
        info!(target: "quizline_backend", base_url = %r.base_url, "Remote store enabled");
        let remote: Arc<dyn RemoteStore> = r.clone();
        let scores: Arc<dyn ScoreRecorder> = r;
        (Some(remote), scores)
      }
      None => {
        info!(target: "quizline_backend", "Remote store disabled (no REMOTE_BASE_URL)");
        let scores: Arc<dyn ScoreRecorder> = Arc::new(LogScoreRecorder);
        (None, scores)
      }
    };

    let openai = OpenAI::from_env(config.quiz.prompts.clone(), config.quiz.languages.clone());
    if let Some(oa) = &openai {
      info!(target: "quizline_backend", base_url = %oa.base_url, fast_model = %oa.fast_model, strong_model = %oa.strong_model, "OpenAI enabled.");
    } else {
      info!(target: "quizline_backend", "OpenAI disabled (no OPENAI_API_KEY). Generator tier and custom topics unavailable.");
    }
    let generator = openai.map(|oa| Arc::new(oa) as Arc<dyn QuestionGenerator>);

    Ok(Self::assemble(config, store, remote, generator, scores).await)
  }

  /// Build state from ready collaborators and load the topic catalogue.
  pub async fn assemble(
    config: AppConfig,
    store: Arc<LocalStore>,
    remote: Option<Arc<dyn RemoteStore>>,
    generator: Option<Arc<dyn QuestionGenerator>>,
    scores: Arc<dyn ScoreRecorder>,
  ) -> Self {
    let topics = load_catalogue(&store, remote.as_deref()).await;
    let supplier = Arc::new(QuestionSupplier::new(
      store.clone(),
      remote,
      generator,
      config.quiz.game.remote_page_size,
    ));
    Self { config, admin: store.clone(), store, supplier, scores, topics }
  }

  /// Predefined topic from the catalogue, or a registered custom topic.
  pub fn topic_ref(&self, value: &str) -> Option<TopicRef> {
    self
      .topics
      .iter()
      .find(|t| t.value == value)
      .map(TopicRef::from)
      .or_else(|| self.store.custom_topic(value).as_ref().map(TopicRef::from))
  }

  pub fn custom_topic_flow(&self) -> CustomTopicFlow {
    CustomTopicFlow::new(
      self.store.clone(),
      self.supplier.generator().cloned(),
      self.config.quiz.game.custom_batch_size,
    )
  }

  pub fn round_config(&self, topic: TopicRef, mode: DifficultyMode, lang: Lang) -> RoundConfig {
    RoundConfig {
      topic,
      mode,
      lang,
      length: self.config.quiz.game.round_length.max(1),
      timer_seconds: self.config.quiz.game.timer_seconds,
    }
  }
}

/// Remote catalogue (cached on success), else the cached copy, else the
/// built-in seeds.
#[instrument(level = "info", skip_all)]
pub async fn load_catalogue(store: &LocalStore, remote: Option<&dyn RemoteStore>) -> Vec<TopicDefinition> {
  if let Some(remote) = remote {
    match remote.fetch_topic_definitions().await {
      Ok(topics) if !topics.is_empty() => {
        store.cache_topic_definitions(&topics);
        info!(target: "quizline_backend", count = topics.len(), source = "remote", "Topic catalogue loaded");
        return topics;
      }
      Ok(_) => warn!(target: "quizline_backend", "Remote topic catalogue is empty"),
      Err(e) => warn!(target: "quizline_backend", error = %e, "Remote topic catalogue unavailable"),
    }
  }
  if let Some(topics) = store.cached_topic_definitions().filter(|t| !t.is_empty()) {
    info!(target: "quizline_backend", count = topics.len(), source = "cache", "Topic catalogue loaded");
    return topics;
  }
  let topics = seed_topics();
  info!(target: "quizline_backend", count = topics.len(), source = "seeds", "Topic catalogue loaded");
  topics
}
