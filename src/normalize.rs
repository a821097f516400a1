//! Inbound record normalization.
//!
//! Remote documents and generator output arrive in one of two shapes:
//!   - canonical: `correctAnswer` + `distractors[3]`
//!   - legacy: `answers[4]` + `correctAnswerIndex`
//!
//! Parsing tries the canonical shape first, then the legacy one, and rejects
//! anything else. Nothing is guessed: a record that does not convert cleanly is
//! dropped.

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::domain::{Difficulty, LocalizedText, Question};

/// Fields shared by both shapes.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Common {
  #[serde(default)]
  id: Option<String>,
  #[serde(default)]
  topic_value: Option<String>,
  #[serde(default)]
  difficulty: Option<Difficulty>,
  question: LocalizedText,
  #[serde(default)]
  explanation: Option<LocalizedText>,
  #[serde(default)]
  hint: Option<LocalizedText>,
  #[serde(default)]
  image_url: Option<String>,
  #[serde(default)]
  image_credit: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CanonicalRecord {
  #[serde(flatten)]
  common: Common,
  correct_answer: LocalizedText,
  distractors: Vec<LocalizedText>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyRecord {
  #[serde(flatten)]
  common: Common,
  answers: Vec<Option<LocalizedText>>,
  correct_answer_index: i64,
}

#[derive(Debug)]
enum InboundRecord {
  Canonical(CanonicalRecord),
  Legacy(LegacyRecord),
}

impl InboundRecord {
  fn parse(value: &Value) -> Option<Self> {
    if let Ok(rec) = serde_json::from_value::<CanonicalRecord>(value.clone()) {
      return Some(InboundRecord::Canonical(rec));
    }
    if let Ok(rec) = serde_json::from_value::<LegacyRecord>(value.clone()) {
      return Some(InboundRecord::Legacy(rec));
    }
    None
  }
}

/// Split a legacy answer list into (correct, distractors).
///
/// The correct answer is `answers[index]`; the distractors are the other three
/// in their original order. Returns `None` when the list is not exactly four
/// entries long, the index is outside `0..=3`, or any entry is missing.
pub fn split_legacy_answers(
  answers: &[Option<LocalizedText>],
  correct_index: i64,
) -> Option<(LocalizedText, [LocalizedText; 3])> {
  if answers.len() != 4 || !(0..=3).contains(&correct_index) {
    return None;
  }
  let idx = correct_index as usize;
  let correct = answers[idx].clone()?;
  let mut rest = Vec::with_capacity(3);
  for (i, a) in answers.iter().enumerate() {
    if i != idx {
      rest.push(a.clone()?);
    }
  }
  let distractors: [LocalizedText; 3] = rest.try_into().ok()?;
  Some((correct, distractors))
}

/// Convert one raw document into a canonical question.
///
/// `topic_value` and `difficulty` fill in fields the document may omit (remote
/// pages are already scoped to a partition).
pub fn normalize_record(value: &Value, topic_value: &str, difficulty: Difficulty) -> Option<Question> {
  let (common, correct_answer, distractors) = match InboundRecord::parse(value)? {
    InboundRecord::Canonical(rec) => {
      let distractors: [LocalizedText; 3] = rec.distractors.try_into().ok()?;
      (rec.common, rec.correct_answer, distractors)
    }
    InboundRecord::Legacy(rec) => {
      let (correct, distractors) = split_legacy_answers(&rec.answers, rec.correct_answer_index)?;
      (rec.common, correct, distractors)
    }
  };

  let complete = common.question.is_complete()
    && correct_answer.is_complete()
    && distractors.iter().all(LocalizedText::is_complete);
  if !complete {
    return None;
  }

  Some(Question {
    id: common.id.filter(|s| !s.trim().is_empty()),
    topic_value: common.topic_value.unwrap_or_else(|| topic_value.to_string()),
    difficulty: common.difficulty.unwrap_or(difficulty),
    question: common.question,
    correct_answer,
    distractors,
    explanation: common.explanation,
    hint: common.hint,
    image_url: common.image_url,
    image_credit: common.image_credit,
  })
}

/// Normalize a batch, dropping anything that does not convert.
pub fn normalize_all(values: &[Value], topic_value: &str, difficulty: Difficulty) -> Vec<Question> {
  let out: Vec<Question> = values
    .iter()
    .filter_map(|v| normalize_record(v, topic_value, difficulty))
    .collect();
  if out.len() < values.len() {
    debug!(target: "supplier", %topic_value, %difficulty, received = values.len(), kept = out.len(), "Dropped malformed records");
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn t(s: &str) -> Value {
    json!({ "primaryLang": s, "secondaryLang": format!("{s} (es)") })
  }

  fn lt(s: &str) -> LocalizedText {
    LocalizedText::new(s, format!("{s} (es)"))
  }

  #[test]
  fn legacy_record_keeps_correct_and_orders_distractors() {
    for idx in 0..4i64 {
      let doc = json!({
        "id": "q1",
        "question": t("Capital of France?"),
        "answers": [t("A"), t("B"), t("C"), t("D")],
        "correctAnswerIndex": idx,
      });
      let q = normalize_record(&doc, "geography", Difficulty::Easy).expect("valid legacy record");
      let letters = ["A", "B", "C", "D"];
      assert_eq!(q.correct_answer, lt(letters[idx as usize]));
      let expected: Vec<LocalizedText> = letters
        .iter()
        .enumerate()
        .filter(|(i, _)| *i as i64 != idx)
        .map(|(_, l)| lt(l))
        .collect();
      assert_eq!(q.distractors.to_vec(), expected);
      assert_eq!(q.topic_value, "geography");
      assert_eq!(q.difficulty, Difficulty::Easy);
    }
  }

  #[test]
  fn legacy_record_with_out_of_range_index_is_dropped() {
    for idx in [-1i64, 4, 17] {
      let doc = json!({
        "question": t("Q"),
        "answers": [t("A"), t("B"), t("C"), t("D")],
        "correctAnswerIndex": idx,
      });
      assert!(normalize_record(&doc, "geography", Difficulty::Medium).is_none());
    }
  }

  #[test]
  fn legacy_record_with_missing_answer_is_dropped() {
    let doc = json!({
      "question": t("Q"),
      "answers": [t("A"), null, t("C"), t("D")],
      "correctAnswerIndex": 0,
    });
    assert!(normalize_record(&doc, "geography", Difficulty::Medium).is_none());

    let short = json!({
      "question": t("Q"),
      "answers": [t("A"), t("B"), t("C")],
      "correctAnswerIndex": 0,
    });
    assert!(normalize_record(&short, "geography", Difficulty::Medium).is_none());
  }

  #[test]
  fn canonical_record_passes_through() {
    let doc = json!({
      "id": "q9",
      "topicValue": "history",
      "difficulty": "hard",
      "question": t("Who?"),
      "correctAnswer": t("Right"),
      "distractors": [t("W1"), t("W2"), t("W3")],
      "hint": t("Think"),
    });
    let q = normalize_record(&doc, "ignored", Difficulty::Easy).expect("canonical");
    assert_eq!(q.id.as_deref(), Some("q9"));
    assert_eq!(q.topic_value, "history");
    assert_eq!(q.difficulty, Difficulty::Hard);
    assert_eq!(q.correct_answer, lt("Right"));
    assert_eq!(q.hint, Some(lt("Think")));
  }

  #[test]
  fn canonical_with_wrong_distractor_count_is_not_coerced() {
    let doc = json!({
      "question": t("Who?"),
      "correctAnswer": t("Right"),
      "distractors": [t("W1"), t("W2")],
    });
    assert!(normalize_record(&doc, "x", Difficulty::Easy).is_none());
  }

  #[test]
  fn blank_text_is_rejected() {
    let doc = json!({
      "question": { "primaryLang": "", "secondaryLang": "¿?" },
      "correctAnswer": t("Right"),
      "distractors": [t("W1"), t("W2"), t("W3")],
    });
    assert!(normalize_record(&doc, "x", Difficulty::Easy).is_none());
  }

  #[test]
  fn normalize_all_drops_only_bad_records() {
    let docs = vec![
      json!({ "question": t("Q1"), "answers": [t("A"), t("B"), t("C"), t("D")], "correctAnswerIndex": 2 }),
      json!({ "question": t("Q2"), "answers": [t("A"), t("B"), t("C"), t("D")], "correctAnswerIndex": 9 }),
      json!({ "nonsense": true }),
    ];
    let out = normalize_all(&docs, "geo", Difficulty::Medium);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].correct_answer, lt("C"));
  }

  #[test]
  fn difficulty_is_read_case_insensitively() {
    let doc = json!({
      "question": t("Q"),
      "answers": [t("A"), t("B"), t("C"), t("D")],
      "correctAnswerIndex": 0,
      "difficulty": "Medium",
    });
    let q = normalize_record(&doc, "geo", Difficulty::Easy).expect("capitalized difficulty");
    assert_eq!(q.difficulty, Difficulty::Medium);
    assert_eq!(serde_json::to_value(q.difficulty).unwrap(), json!("medium"));
  }
}
