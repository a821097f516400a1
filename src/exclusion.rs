//! Per-round memory of served questions.

use std::collections::HashSet;

use crate::domain::{Lang, LocalizedText, Question, QuestionId};

/// Identities (and texts) of the questions already served in a round.
///
/// Grows monotonically; a new round starts with a fresh set. The texts are kept
/// alongside the ids because the generator has no notion of ids and is told
/// what was asked in plain language.
#[derive(Clone, Debug, Default)]
pub struct ExclusionSet {
  ids: HashSet<QuestionId>,
  asked: Vec<LocalizedText>,
}

impl ExclusionSet {
  pub fn new() -> Self { Self::default() }

  /// Record a served question. Returns false if it was already present.
  pub fn insert(&mut self, question: &Question, lang: Lang) -> bool {
    let fresh = self.ids.insert(question.identity(lang));
    if fresh {
      self.asked.push(question.question.clone());
    }
    fresh
  }

  pub fn insert_id(&mut self, id: QuestionId) -> bool {
    self.ids.insert(id)
  }

  pub fn contains_persisted(&self, id: &str) -> bool {
    self.ids.contains(&QuestionId::Persisted(id.to_string()))
  }

  /// Would serving this question repeat one from the round?
  pub fn excludes(&self, question: &Question, lang: Lang) -> bool {
    self.ids.contains(&question.identity(lang))
  }

  /// Asked question texts, for generator prompts.
  pub fn asked_texts(&self) -> &[LocalizedText] {
    &self.asked
  }

  pub fn len(&self) -> usize { self.ids.len() }

  pub fn is_empty(&self) -> bool { self.ids.is_empty() }
}
