// tests/round_flow.rs

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use quizline_backend::difficulty::DifficultyMode;
use quizline_backend::domain::{Difficulty, Lang};
use quizline_backend::protocol::{ClientWsMessage, QuestionOut, ServerWsMessage};
use quizline_backend::routes::ws::ClientSession;
use quizline_backend::session::{CountdownEvent, Selection};
use quizline_backend::store::{LocalStore, Partition};
use quizline_backend::supplier::Tier;

use common::*;

fn expect_question(msgs: &[ServerWsMessage]) -> &QuestionOut {
  msgs
    .iter()
    .find_map(|m| match m {
      ServerWsMessage::Question(q) => Some(q),
      _ => None,
    })
    .unwrap_or_else(|| panic!("no question in {msgs:?}"))
}

fn correct_index(q: &QuestionOut) -> usize {
  q.answers.iter().position(|a| a.primary == "right").unwrap()
}

#[tokio::test]
async fn adaptive_round_plays_to_completion_and_records_score() {
  let scores = Arc::new(RecordingScores::default());
  let state = test_state(3, geography_store(4), None, scores.clone()).await;
  let (tx, _rx) = mpsc::channel(16);
  let mut client = ClientSession::new(state, tx, Duration::from_secs(60));

  let msgs = client
    .handle(ClientWsMessage::StartRound { topic: "geography".into(), mode: DifficultyMode::Adaptive, lang: Lang::Primary })
    .await;
  let q = expect_question(&msgs);
  assert_eq!(q.difficulty, Difficulty::Medium);
  assert_eq!(q.source, Tier::LocalStore);
  assert_eq!((q.number, q.total), (1, 3));

  // correct: medium -> hard
  let msgs = client.handle(ClientWsMessage::Answer { seq: q.seq, index: correct_index(q) }).await;
  assert!(matches!(&msgs[..], [ServerWsMessage::Feedback(f)] if f.correct && f.next_difficulty == Difficulty::Hard));

  let msgs = client.handle(ClientWsMessage::NextQuestion).await;
  let q = expect_question(&msgs);
  assert_eq!(q.difficulty, Difficulty::Hard);

  // wrong: hard -> medium
  let wrong = (correct_index(q) + 1) % 4;
  let msgs = client.handle(ClientWsMessage::Answer { seq: q.seq, index: wrong }).await;
  assert!(matches!(&msgs[..], [ServerWsMessage::Feedback(f)] if !f.correct && f.next_difficulty == Difficulty::Medium));

  let msgs = client.handle(ClientWsMessage::NextQuestion).await;
  let q = expect_question(&msgs);
  let msgs = client.handle(ClientWsMessage::Answer { seq: q.seq, index: correct_index(q) }).await;
  match &msgs[..] {
    [ServerWsMessage::Feedback(f), ServerWsMessage::RoundOver { summary, completed: true }] => {
      assert!(f.round_complete);
      assert_eq!((summary.correct, summary.total), (2, 3));
    }
    other => panic!("unexpected {other:?}"),
  }
  assert!(client.round().is_none());

  let recorded = scores.rounds.lock().unwrap();
  assert_eq!(recorded.len(), 1);
  assert_eq!(recorded[0].topic_value, "geography");
  assert!(!recorded[0].is_custom);
}

#[tokio::test]
async fn round_never_repeats_a_question() {
  let state = test_state(4, geography_store(4), None, Arc::new(RecordingScores::default())).await;
  let (tx, _rx) = mpsc::channel(16);
  let mut client = ClientSession::new(state, tx, Duration::from_secs(60));

  let mut seen = std::collections::HashSet::new();
  let mut msgs = client
    .handle(ClientWsMessage::StartRound {
      topic: "geography".into(),
      mode: DifficultyMode::Fixed(Difficulty::Easy),
      lang: Lang::Primary,
    })
    .await;
  for _ in 0..4 {
    let q = expect_question(&msgs);
    assert_eq!(q.difficulty, Difficulty::Easy);
    assert!(seen.insert(q.question.primary.clone()));
    client.handle(ClientWsMessage::Answer { seq: q.seq, index: 0 }).await;
    msgs = client.handle(ClientWsMessage::NextQuestion).await;
  }
  assert_eq!(seen.len(), 4);
}

#[tokio::test]
async fn failed_fetch_offers_retry_without_touching_the_round() {
  let store = Arc::new(LocalStore::open_in_memory().unwrap());
  let state = test_state(3, store.clone(), None, Arc::new(RecordingScores::default())).await;
  let (tx, _rx) = mpsc::channel(16);
  let mut client = ClientSession::new(state, tx, Duration::from_secs(60));

  let msgs = client
    .handle(ClientWsMessage::StartRound { topic: "history".into(), mode: DifficultyMode::Adaptive, lang: Lang::Primary })
    .await;
  assert!(matches!(&msgs[..], [ServerWsMessage::Error { kind, retryable: true, .. }] if kind == "generation_failed"));
  let round = client.round().unwrap();
  assert!(round.exclusions().is_empty());
  assert_eq!(round.difficulty(), Difficulty::Medium);

  store.save_batch(Partition::Predefined, &[question(Some("h-1"), "history", Difficulty::Medium, "History 1")]);
  let msgs = client.handle(ClientWsMessage::Retry).await;
  assert_eq!(expect_question(&msgs).number, 1);
}

#[tokio::test]
async fn countdown_expiry_resolves_as_timeout() {
  let state = test_state(3, geography_store(2), None, Arc::new(RecordingScores::default())).await;
  let (tx, mut rx) = mpsc::channel(16);
  let mut client = ClientSession::new(state, tx, Duration::from_millis(5));

  let msgs = client
    .handle(ClientWsMessage::StartRound { topic: "geography".into(), mode: DifficultyMode::Adaptive, lang: Lang::Primary })
    .await;
  let seq = expect_question(&msgs).seq;

  // timer_seconds = 2: one tick, then expiry
  let tick = rx.recv().await.unwrap();
  assert_eq!(tick, CountdownEvent::Tick { seq, remaining: 1 });
  assert!(matches!(&client.on_countdown(tick).await[..], [ServerWsMessage::Tick { remaining: 1, .. }]));

  let expired = rx.recv().await.unwrap();
  let msgs = client.on_countdown(expired).await;
  match &msgs[..] {
    [ServerWsMessage::Feedback(f)] => {
      assert_eq!(f.selection, Selection::Timeout);
      assert!(!f.correct);
      assert_eq!(f.next_difficulty, Difficulty::Easy);
    }
    other => panic!("unexpected {other:?}"),
  }

  // an answer after the timeout is refused and the score stays put
  let msgs = client.handle(ClientWsMessage::Answer { seq, index: 0 }).await;
  assert!(matches!(&msgs[..], [ServerWsMessage::Error { .. }]));
  assert_eq!(client.round().unwrap().score(), 0);
}

#[tokio::test]
async fn custom_topic_from_proposal_to_exhaustion() {
  let store = Arc::new(LocalStore::open_in_memory().unwrap());
  let generator = Arc::new(ScriptedGenerator::default());
  let scores = Arc::new(RecordingScores::default());
  let state = test_state(10, store.clone(), Some(generator.clone()), scores).await;
  let (tx, _rx) = mpsc::channel(16);
  let mut client = ClientSession::new(state.clone(), tx, Duration::from_secs(60));

  let msgs = client.handle(ClientWsMessage::ProposeTopic { text: "nonsense words".into() }).await;
  assert!(matches!(&msgs[..], [ServerWsMessage::TopicRejected { .. }]));

  let msgs = client.handle(ClientWsMessage::ProposeTopic { text: "volcanoes".into() }).await;
  assert!(matches!(&msgs[..], [ServerWsMessage::TopicProposal { name, .. }] if name.primary == "Volcanoes"));
  assert!(store.custom_topics().is_empty());

  let msgs = client
    .handle(ClientWsMessage::ConfirmTopic { mode: DifficultyMode::Fixed(Difficulty::Easy), lang: Lang::Primary })
    .await;
  let value = match &msgs[0] {
    ServerWsMessage::TopicReady { topic } if topic.is_custom => topic.value.clone(),
    other => panic!("unexpected {other:?}"),
  };
  assert!(value.starts_with("volcanoes_"));
  let mut q = expect_question(&msgs).seq;
  assert_eq!(expect_question(&msgs).source, Tier::LocalStore);

  // batch of 8 at easy, round of 10: the ninth request is exhausted
  for _ in 1..8 {
    client.handle(ClientWsMessage::Answer { seq: q, index: 0 }).await;
    let msgs = client.handle(ClientWsMessage::NextQuestion).await;
    q = expect_question(&msgs).seq;
  }
  client.handle(ClientWsMessage::Answer { seq: q, index: 0 }).await;
  let msgs = client.handle(ClientWsMessage::NextQuestion).await;
  assert!(matches!(&msgs[..], [ServerWsMessage::Error { kind, retryable: false, .. }] if kind == "exhausted"));
  assert_eq!(generator.calls.load(std::sync::atomic::Ordering::SeqCst), 1);

  // a fresh connection replays the topic without generating again
  let (tx, _rx) = mpsc::channel(16);
  let mut replay = ClientSession::new(state, tx, Duration::from_secs(60));
  let msgs = replay
    .handle(ClientWsMessage::SelectCustomTopic {
      topic: value.clone(),
      mode: DifficultyMode::Fixed(Difficulty::Easy),
      lang: Lang::Secondary,
    })
    .await;
  assert!(matches!(&msgs[0], ServerWsMessage::TopicReady { .. }));
  assert_eq!(expect_question(&msgs).source, Tier::LocalStore);
  assert_eq!(generator.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
  assert_eq!(store.custom_topics().len(), 1);
}

#[tokio::test]
async fn events_from_a_replaced_round_never_resolve_the_new_one() {
  let state = test_state(3, geography_store(4), None, Arc::new(RecordingScores::default())).await;
  let (tx, mut rx) = mpsc::channel(16);
  let mut client = ClientSession::new(state, tx, Duration::from_millis(5));
  let start = || ClientWsMessage::StartRound { topic: "geography".into(), mode: DifficultyMode::Adaptive, lang: Lang::Primary };

  let first = expect_question(&client.handle(start()).await).seq;
  // let the first countdown run out with nobody draining the channel
  tokio::time::sleep(Duration::from_millis(100)).await;

  let msgs = client.handle(start()).await;
  let second = expect_question(&msgs).seq;
  assert_ne!(first, second);

  let mut stale = Vec::new();
  while let Ok(event) = rx.try_recv() {
    let seq = match event {
      CountdownEvent::Tick { seq, .. } | CountdownEvent::Expired { seq } => seq,
    };
    if seq == first {
      stale.push(event);
    }
  }
  assert!(stale.contains(&CountdownEvent::Expired { seq: first }));
  for event in stale {
    assert!(client.on_countdown(event).await.is_empty());
  }

  let msgs = client.handle(ClientWsMessage::Answer { seq: first, index: 0 }).await;
  assert!(matches!(&msgs[..], [ServerWsMessage::Error { kind, .. }] if kind == "invalid_answer"));

  let round = client.round().unwrap();
  assert_eq!(round.answered(), 0);
  assert_eq!(round.difficulty(), Difficulty::Medium);
  assert!(round.current().unwrap().resolution.is_none());
}
