//! Local structured store (SQLite).
//!
//! Layout:
//!   - `predefined_questions` / `custom_questions`: one row per question, keyed
//!     by (topic_value, difficulty, id), canonical JSON payload
//!   - `custom_topics`: registry of user-created topics
//!   - `custom_batches`: which (topic, difficulty) pairs already got a batch
//!   - `metadata_cache`: cached topic catalogue
//!   - `downloaded_topics`: predefined topics already warmed from the remote
//!
//! Every public operation fails closed: when the database could not be opened
//! or a query fails, reads return nothing and writes are skipped. Callers treat
//! that exactly like a cache miss. The `try_*` variants surface the error for
//! the few callers that must know (the version gate).

use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use rand::seq::SliceRandom;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use crate::domain::{CustomTopicMeta, Difficulty, Question, TopicDefinition};
use crate::error::StoreError;
use crate::exclusion::ExclusionSet;

const TOPICS_CACHE_KEY: &str = "topics";

/// Content partition. Each lives in its own table so one can be wiped alone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Partition {
  Predefined,
  Custom,
}

impl Partition {
  fn table(self) -> &'static str {
    match self {
      Partition::Predefined => "predefined_questions",
      Partition::Custom => "custom_questions",
    }
  }

  pub fn for_topic(is_custom: bool) -> Self {
    if is_custom { Partition::Custom } else { Partition::Predefined }
  }
}

/// Filter for diagnostic counts. Empty criteria count everything.
#[derive(Clone, Debug, Default)]
pub struct CountCriteria {
  pub partition: Option<Partition>,
  pub topic_value: Option<String>,
  pub difficulty: Option<Difficulty>,
}

/// Administrative view over the cache.
pub trait CacheAdmin: Send + Sync {
  /// Wipe one partition, or everything when `None`.
  fn clear(&self, partition: Option<Partition>) -> Result<(), StoreError>;
  fn count(&self) -> usize;
  fn count_by(&self, criteria: &CountCriteria) -> usize;
}

pub struct LocalStore {
  conn: Option<Mutex<Connection>>,
}

impl LocalStore {
  /// Open (or create) the database file. Never fails: an unusable database
  /// yields a store that behaves as permanently empty.
  #[instrument(level = "info", fields(path = %path.display()))]
  pub fn open(path: &Path) -> Self {
    if let Some(dir) = path.parent() {
      if let Err(e) = std::fs::create_dir_all(dir) {
        error!(target: "store", error = %e, "Cannot create data directory; local store disabled");
        return Self::unavailable();
      }
    }
    match Connection::open(path).map_err(StoreError::from).and_then(Self::from_connection) {
      Ok(store) => {
        info!(target: "store", "Local store opened");
        store
      }
      Err(e) => {
        error!(target: "store", error = %e, "Cannot open local store; running without cache");
        Self::unavailable()
      }
    }
  }

  pub fn open_in_memory() -> Result<Self, StoreError> {
    Self::from_connection(Connection::open_in_memory()?)
  }

  pub fn unavailable() -> Self {
    Self { conn: None }
  }

  pub fn from_connection(conn: Connection) -> Result<Self, StoreError> {
    init_schema(&conn)?;
    Ok(Self { conn: Some(Mutex::new(conn)) })
  }

  pub fn is_available(&self) -> bool {
    self.conn.is_some()
  }

  #[cfg(test)]
  pub(crate) fn execute_raw(&self, sql: &str) -> Result<(), StoreError> {
    self.with_conn(|conn| {
      conn.execute_batch(sql)?;
      Ok(())
    })
  }

  fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T, StoreError>) -> Result<T, StoreError> {
    let mutex = self.conn.as_ref().ok_or(StoreError::Unavailable)?;
    let mut guard = mutex.lock().map_err(|_| StoreError::Poisoned)?;
    f(&mut guard)
  }

  /// Log and swallow a store error, returning the fallback value.
  fn fail_closed<T>(op: &'static str, result: Result<T, StoreError>, fallback: T) -> T {
    match result {
      Ok(v) => v,
      Err(StoreError::Unavailable) => {
        debug!(target: "store", %op, "Store unavailable; treating as miss");
        fallback
      }
      Err(e) => {
        warn!(target: "store", %op, error = %e, "Store operation failed; treating as miss");
        fallback
      }
    }
  }

  // ---- questions ----

  /// Upsert questions by id. Questions without an id are skipped.
  pub fn try_save_batch(&self, partition: Partition, questions: &[Question]) -> Result<usize, StoreError> {
    self.with_conn(|conn| {
      let tx = conn.transaction()?;
      let mut saved = 0usize;
      {
        let sql = format!(
          "INSERT OR REPLACE INTO {} (topic_value, difficulty, id, payload) VALUES (?1, ?2, ?3, ?4)",
          partition.table()
        );
        let mut stmt = tx.prepare(&sql)?;
        for q in questions {
          let Some(id) = q.id.as_deref() else {
            warn!(target: "store", topic = %q.topic_value, "Skipping question without id");
            continue;
          };
          let payload = serde_json::to_string(q)?;
          stmt.execute(params![q.topic_value, q.difficulty.as_str(), id, payload])?;
          saved += 1;
        }
      }
      tx.commit()?;
      Ok(saved)
    })
  }

  #[instrument(level = "debug", skip(self, questions), fields(?partition, n = questions.len()))]
  pub fn save_batch(&self, partition: Partition, questions: &[Question]) -> usize {
    let saved = Self::fail_closed("save_batch", self.try_save_batch(partition, questions), 0);
    debug!(target: "store", saved, "Batch saved");
    saved
  }

  pub fn try_query_unasked(
    &self,
    partition: Partition,
    topic_value: &str,
    difficulty: Difficulty,
    excluded: &ExclusionSet,
  ) -> Result<Option<Question>, StoreError> {
    self.with_conn(|conn| {
      let ids: Vec<String> = {
        let sql = format!("SELECT id FROM {} WHERE topic_value = ?1 AND difficulty = ?2", partition.table());
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![topic_value, difficulty.as_str()], |row| row.get::<_, String>(0))?;
        rows.collect::<Result<_, _>>()?
      };
      let candidates: Vec<&String> = ids.iter().filter(|id| !excluded.contains_persisted(id)).collect();
      let Some(chosen) = candidates.choose(&mut rand::thread_rng()) else {
        return Ok(None);
      };

      let sql = format!(
        "SELECT payload FROM {} WHERE topic_value = ?1 AND difficulty = ?2 AND id = ?3",
        partition.table()
      );
      let payload: Option<String> = conn
        .query_row(&sql, params![topic_value, difficulty.as_str(), chosen], |row| row.get(0))
        .optional()?;
      match payload {
        Some(p) => Ok(Some(serde_json::from_str(&p)?)),
        None => Ok(None),
      }
    })
  }

  /// Uniformly random question of the partition not in `excluded`, if any.
  #[instrument(level = "debug", skip(self, excluded), fields(?partition, %topic_value, %difficulty, excluded = excluded.len()))]
  pub fn query_unasked(
    &self,
    partition: Partition,
    topic_value: &str,
    difficulty: Difficulty,
    excluded: &ExclusionSet,
  ) -> Option<Question> {
    Self::fail_closed(
      "query_unasked",
      self.try_query_unasked(partition, topic_value, difficulty, excluded),
      None,
    )
  }

  fn try_count(&self, criteria: &CountCriteria) -> Result<usize, StoreError> {
    let partitions = match criteria.partition {
      Some(p) => vec![p],
      None => vec![Partition::Predefined, Partition::Custom],
    };
    self.with_conn(|conn| {
      let mut total = 0usize;
      for p in partitions {
        let sql = format!(
          "SELECT count(*) FROM {} WHERE (?1 IS NULL OR topic_value = ?1) AND (?2 IS NULL OR difficulty = ?2)",
          p.table()
        );
        let n: i64 = conn.query_row(
          &sql,
          params![criteria.topic_value, criteria.difficulty.map(|d| d.as_str())],
          |row| row.get(0),
        )?;
        total += n as usize;
      }
      Ok(total)
    })
  }

  fn try_clear_partition(&self, partition: Partition) -> Result<(), StoreError> {
    self.with_conn(|conn| {
      let tx = conn.transaction()?;
      tx.execute(&format!("DELETE FROM {}", partition.table()), [])?;
      match partition {
        Partition::Predefined => tx.execute("DELETE FROM downloaded_topics", [])?,
        Partition::Custom => tx.execute("DELETE FROM custom_batches", [])?,
      };
      tx.commit()?;
      Ok(())
    })
  }

  /// Remove every partition, the custom topic registry, the cached catalogue
  /// and the downloaded-topic markers in one transaction.
  pub fn try_purge_all(&self) -> Result<(), StoreError> {
    self.with_conn(|conn| {
      let tx = conn.transaction()?;
      tx.execute_batch(
        "
        DELETE FROM predefined_questions;
        DELETE FROM custom_questions;
        DELETE FROM custom_topics;
        DELETE FROM custom_batches;
        DELETE FROM metadata_cache;
        DELETE FROM downloaded_topics;
        ",
      )?;
      tx.commit()?;
      Ok(())
    })
  }

  // ---- custom topics ----

  pub fn register_custom_topic(&self, meta: &CustomTopicMeta) -> Result<(), StoreError> {
    self.with_conn(|conn| {
      let payload = serde_json::to_string(meta)?;
      conn.execute(
        "INSERT OR IGNORE INTO custom_topics (custom_topic_value, payload, created_at) VALUES (?1, ?2, ?3)",
        params![meta.custom_topic_value, payload, meta.created_at.to_rfc3339()],
      )?;
      Ok(())
    })
  }

  pub fn custom_topic(&self, value: &str) -> Option<CustomTopicMeta> {
    let result: Result<Option<CustomTopicMeta>, StoreError> = self.with_conn(|conn| {
      let payload: Option<String> = conn
        .query_row("SELECT payload FROM custom_topics WHERE custom_topic_value = ?1", [value], |row| row.get(0))
        .optional()?;
      match payload {
        Some(p) => Ok(Some(serde_json::from_str(&p)?)),
        None => Ok(None),
      }
    });
    Self::fail_closed("custom_topic", result, None)
  }

  pub fn custom_topics(&self) -> Vec<CustomTopicMeta> {
    let result = self.with_conn(|conn| {
      let mut stmt = conn.prepare("SELECT payload FROM custom_topics ORDER BY created_at DESC")?;
      let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
      let mut out: Vec<CustomTopicMeta> = Vec::new();
      for payload in rows {
        out.push(serde_json::from_str(&payload?)?);
      }
      Ok(out)
    });
    Self::fail_closed("custom_topics", result, Vec::new())
  }

  pub fn mark_batch_generated(&self, topic_value: &str, difficulty: Difficulty) -> Result<(), StoreError> {
    self.with_conn(|conn| {
      conn.execute(
        "INSERT OR REPLACE INTO custom_batches (topic_value, difficulty, generated_at) VALUES (?1, ?2, ?3)",
        params![topic_value, difficulty.as_str(), Utc::now().timestamp()],
      )?;
      Ok(())
    })
  }

  pub fn has_batch(&self, topic_value: &str, difficulty: Difficulty) -> bool {
    let result = self.with_conn(|conn| {
      let found: Option<i64> = conn
        .query_row(
          "SELECT 1 FROM custom_batches WHERE topic_value = ?1 AND difficulty = ?2",
          params![topic_value, difficulty.as_str()],
          |row| row.get(0),
        )
        .optional()?;
      Ok(found.is_some())
    });
    Self::fail_closed("has_batch", result, false)
  }

  // ---- catalogue + markers ----

  pub fn cache_topic_definitions(&self, topics: &[TopicDefinition]) {
    let result = self.with_conn(|conn| {
      let payload = serde_json::to_string(topics)?;
      conn.execute(
        "INSERT OR REPLACE INTO metadata_cache (key, payload, updated_at) VALUES (?1, ?2, ?3)",
        params![TOPICS_CACHE_KEY, payload, Utc::now().timestamp()],
      )?;
      Ok(())
    });
    Self::fail_closed("cache_topic_definitions", result, ())
  }

  pub fn cached_topic_definitions(&self) -> Option<Vec<TopicDefinition>> {
    let result: Result<Option<Vec<TopicDefinition>>, StoreError> = self.with_conn(|conn| {
      let payload: Option<String> = conn
        .query_row("SELECT payload FROM metadata_cache WHERE key = ?1", [TOPICS_CACHE_KEY], |row| row.get(0))
        .optional()?;
      match payload {
        Some(p) => Ok(Some(serde_json::from_str(&p)?)),
        None => Ok(None),
      }
    });
    Self::fail_closed("cached_topic_definitions", result, None)
  }

  pub fn mark_downloaded(&self, topic_value: &str) {
    let result = self.with_conn(|conn| {
      conn.execute(
        "INSERT OR REPLACE INTO downloaded_topics (topic_value, downloaded_at) VALUES (?1, ?2)",
        params![topic_value, Utc::now().timestamp()],
      )?;
      Ok(())
    });
    Self::fail_closed("mark_downloaded", result, ())
  }

  pub fn is_downloaded(&self, topic_value: &str) -> bool {
    let result = self.with_conn(|conn| {
      let found: Option<i64> = conn
        .query_row("SELECT 1 FROM downloaded_topics WHERE topic_value = ?1", [topic_value], |row| row.get(0))
        .optional()?;
      Ok(found.is_some())
    });
    Self::fail_closed("is_downloaded", result, false)
  }
}

impl CacheAdmin for LocalStore {
  #[instrument(level = "info", skip(self))]
  fn clear(&self, partition: Option<Partition>) -> Result<(), StoreError> {
    let result = match partition {
      Some(p) => self.try_clear_partition(p),
      None => self.try_purge_all(),
    };
    match &result {
      Ok(()) => info!(target: "store", ?partition, "Cache cleared"),
      Err(e) => warn!(target: "store", ?partition, error = %e, "Cache clear failed"),
    }
    result
  }

  fn count(&self) -> usize {
    self.count_by(&CountCriteria::default())
  }

  fn count_by(&self, criteria: &CountCriteria) -> usize {
    Self::fail_closed("count", self.try_count(criteria), 0)
  }
}

fn init_schema(conn: &Connection) -> Result<(), StoreError> {
  conn.execute_batch(
    "
    CREATE TABLE IF NOT EXISTS predefined_questions (
        topic_value TEXT NOT NULL,
        difficulty TEXT NOT NULL CHECK (difficulty IN ('easy','medium','hard')),
        id TEXT NOT NULL,
        payload TEXT NOT NULL,
        PRIMARY KEY (topic_value, difficulty, id)
    );
    CREATE TABLE IF NOT EXISTS custom_questions (
        topic_value TEXT NOT NULL,
        difficulty TEXT NOT NULL CHECK (difficulty IN ('easy','medium','hard')),
        id TEXT NOT NULL,
        payload TEXT NOT NULL,
        PRIMARY KEY (topic_value, difficulty, id)
    );
    CREATE TABLE IF NOT EXISTS custom_topics (
        custom_topic_value TEXT PRIMARY KEY,
        payload TEXT NOT NULL,
        created_at TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS custom_batches (
        topic_value TEXT NOT NULL,
        difficulty TEXT NOT NULL,
        generated_at INTEGER NOT NULL,
        PRIMARY KEY (topic_value, difficulty)
    );
    CREATE TABLE IF NOT EXISTS metadata_cache (
        key TEXT PRIMARY KEY,
        payload TEXT NOT NULL,
        updated_at INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS downloaded_topics (
        topic_value TEXT PRIMARY KEY,
        downloaded_at INTEGER NOT NULL
    );
    ",
  )?;
  Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
  use std::collections::HashSet;

  use super::*;
  use crate::domain::{Lang, LocalizedText};

  pub(crate) fn question(id: Option<&str>, topic: &str, difficulty: Difficulty, text: &str) -> Question {
    let l = |s: &str| LocalizedText::new(s, format!("{s} (es)"));
    Question {
      id: id.map(str::to_string),
      topic_value: topic.to_string(),
      difficulty,
      question: l(text),
      correct_answer: l("right"),
      distractors: [l("w1"), l("w2"), l("w3")],
      explanation: None,
      hint: None,
      image_url: None,
      image_credit: None,
    }
  }

  fn seeded() -> LocalStore {
    let store = LocalStore::open_in_memory().unwrap();
    let batch: Vec<Question> = (1..=5)
      .map(|i| question(Some(&format!("g{i}")), "geography", Difficulty::Medium, &format!("Q{i}")))
      .collect();
    assert_eq!(store.save_batch(Partition::Predefined, &batch), 5);
    store
  }

  #[test]
  fn query_unasked_drains_partition_without_repeats() {
    let store = seeded();
    let mut excluded = ExclusionSet::new();
    let pre = question(Some("g3"), "geography", Difficulty::Medium, "Q3");
    excluded.insert(&pre, Lang::Primary);

    let mut seen = HashSet::new();
    while let Some(q) = store.query_unasked(Partition::Predefined, "geography", Difficulty::Medium, &excluded) {
      let id = q.id.clone().unwrap();
      assert!(!excluded.contains_persisted(&id));
      assert!(seen.insert(id));
      excluded.insert(&q, Lang::Primary);
    }
    let expected: HashSet<String> = ["g1", "g2", "g4", "g5"].iter().map(|s| s.to_string()).collect();
    assert_eq!(seen, expected);
  }

  #[test]
  fn upsert_by_id_is_idempotent() {
    let store = seeded();
    let again = vec![question(Some("g1"), "geography", Difficulty::Medium, "Q1 edited")];
    store.save_batch(Partition::Predefined, &again);
    store.save_batch(Partition::Predefined, &again);
    assert_eq!(store.count(), 5);
    assert_eq!(
      store.count_by(&CountCriteria { difficulty: Some(Difficulty::Hard), ..Default::default() }),
      0
    );
  }

  #[test]
  fn partitions_clear_independently() {
    let store = seeded();
    let custom = vec![question(Some("c1"), "cats_1", Difficulty::Easy, "Cat?")];
    store.save_batch(Partition::Custom, &custom);
    store.mark_batch_generated("cats_1", Difficulty::Easy).unwrap();

    store.clear(Some(Partition::Custom)).unwrap();
    assert_eq!(store.count_by(&CountCriteria { partition: Some(Partition::Custom), ..Default::default() }), 0);
    assert_eq!(store.count_by(&CountCriteria { partition: Some(Partition::Predefined), ..Default::default() }), 5);
    assert!(!store.has_batch("cats_1", Difficulty::Easy));
  }

  #[test]
  fn unavailable_store_fails_closed() {
    let store = LocalStore::unavailable();
    let q = question(Some("x"), "t", Difficulty::Easy, "Q");
    assert_eq!(store.save_batch(Partition::Predefined, &[q]), 0);
    assert!(store.query_unasked(Partition::Predefined, "t", Difficulty::Easy, &ExclusionSet::new()).is_none());
    assert_eq!(store.count(), 0);
    assert!(store.custom_topics().is_empty());
    assert!(matches!(store.try_purge_all(), Err(StoreError::Unavailable)));
  }

  #[test]
  fn questions_without_id_are_not_persisted() {
    let store = LocalStore::open_in_memory().unwrap();
    let q = question(None, "t", Difficulty::Easy, "Q");
    assert_eq!(store.save_batch(Partition::Custom, &[q]), 0);
  }
}
