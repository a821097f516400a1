//! Built-in topic catalogue, used when neither the remote store nor the local
//! cache can provide one.

use crate::domain::{LocalizedText, TopicDefinition};

fn topic(value: &str, en: &str, es: &str, category: &str, instructions: &str) -> TopicDefinition {
  TopicDefinition {
    value: value.into(),
    name: LocalizedText::new(en, es),
    category: category.into(),
    instructions: Some(instructions.into()),
  }
}

pub fn seed_topics() -> Vec<TopicDefinition> {
  vec![
    topic(
      "geography",
      "Geography",
      "Geografía",
      "world",
      "Countries, capitals, rivers, mountains and borders. Avoid trick questions about disputed territories.",
    ),
    topic(
      "history",
      "History",
      "Historia",
      "world",
      "Well documented events, people and dates. Prefer questions answerable without exact day-level dates.",
    ),
    topic(
      "science",
      "Science",
      "Ciencia",
      "knowledge",
      "Physics, chemistry, biology and astronomy at a general audience level.",
    ),
    topic(
      "art",
      "Art",
      "Arte",
      "culture",
      "Painters, movements and famous works. Mention the artist when asking about a work.",
    ),
    topic(
      "music",
      "Music",
      "Música",
      "culture",
      "Composers, instruments, genres and landmark recordings across eras.",
    ),
    topic(
      "sports",
      "Sports",
      "Deportes",
      "leisure",
      "Rules, records and major tournaments. Avoid statistics that change every season.",
    ),
  ]
}

#[cfg(test)]
mod tests {
  use std::collections::HashSet;

  use super::*;

  #[test]
  fn seed_topics_have_unique_values_and_bilingual_names() {
    let topics = seed_topics();
    let values: HashSet<_> = topics.iter().map(|t| t.value.as_str()).collect();
    assert_eq!(values.len(), topics.len());
    assert!(topics.iter().all(|t| t.name.is_complete()));
  }
}
