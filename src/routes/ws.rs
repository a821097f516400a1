//! WebSocket upgrade + message loop.
//!
//! One connection owns one round and one custom topic flow. Client messages
//! and countdown events are multiplexed with `tokio::select!`; each input may
//! produce zero or more server messages.

use std::sync::Arc;
use std::time::Duration;

use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

use crate::custom_topic::CustomTopicFlow;
use crate::difficulty::DifficultyMode;
use crate::domain::{Lang, TopicRef};
use crate::error::RoundError;
use crate::protocol::{question_out, ClientWsMessage, ServerWsMessage, TopicsOut};
use crate::session::{CountdownEvent, Feedback, RoundSession};
use crate::state::AppState;

const COUNTDOWN_TICK: Duration = Duration::from_secs(1);

#[instrument(level = "info", skip(ws, state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "quizline_backend", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  info!(target: "quizline_backend", "WebSocket connected");
  let (tx, mut rx) = mpsc::channel::<CountdownEvent>(16);
  let mut client = ClientSession::new(state, tx, COUNTDOWN_TICK);

  'conn: loop {
    let replies = tokio::select! {
      incoming = socket.recv() => match incoming {
        Some(Ok(Message::Text(txt))) => match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(msg) => {
            debug!(target: "quizline_backend", "WS received: {:?}", &msg);
            client.handle(msg).await
          }
          Err(e) => vec![ServerWsMessage::error("bad_request", format!("Invalid JSON: {e}"), false)],
        },
        Some(Ok(Message::Ping(payload))) => {
          let _ = socket.send(Message::Pong(payload)).await;
          continue;
        }
        Some(Ok(Message::Close(_))) | None => break,
        Some(Ok(_)) => continue,
        Some(Err(e)) => {
          warn!(target: "quizline_backend", error = %e, "WS receive error");
          break;
        }
      },
      Some(event) = rx.recv() => client.on_countdown(event).await,
    };

    for reply in replies {
      let out = serde_json::to_string(&reply).unwrap_or_else(|e| {
        serde_json::json!({ "type": "error", "kind": "internal", "message": format!("Serialization error: {e}"), "retryable": false })
          .to_string()
      });
      if let Err(e) = socket.send(Message::Text(out)).await {
        error!(target: "quizline_backend", error = %e, "WS send error");
        break 'conn;
      }
    }
  }

  client.teardown();
  info!(target: "quizline_backend", "WebSocket disconnected");
}

/// Per-connection game state.
///
/// Question sequence numbers are unique for the whole connection, so a
/// countdown event or answer left over from an earlier round never matches a
/// question of the current one.
pub struct ClientSession {
  state: Arc<AppState>,
  tx: mpsc::Sender<CountdownEvent>,
  tick: Duration,
  round: Option<RoundSession>,
  topics: CustomTopicFlow,
  next_seq: u64,
}

impl ClientSession {
  pub fn new(state: Arc<AppState>, tx: mpsc::Sender<CountdownEvent>, tick: Duration) -> Self {
    let topics = state.custom_topic_flow();
    Self { state, tx, tick, round: None, topics, next_seq: 1 }
  }

  pub fn round(&self) -> Option<&RoundSession> { self.round.as_ref() }

  pub async fn handle(&mut self, msg: ClientWsMessage) -> Vec<ServerWsMessage> {
    match msg {
      ClientWsMessage::Ping => vec![ServerWsMessage::Pong],

      ClientWsMessage::ListTopics => vec![ServerWsMessage::Topics(TopicsOut {
        predefined: self.state.topics.clone(),
        custom: self.state.store.custom_topics(),
      })],

      ClientWsMessage::StartRound { topic, mode, lang } => match self.state.topic_ref(&topic) {
        Some(t) if t.is_custom => self.select_custom(&t.value, mode, lang).await,
        Some(t) => {
          self.retire_round();
          self.state.supplier.warm_topic(&t.value).await;
          self.start_round(t, mode, lang).await
        }
        None => vec![ServerWsMessage::error("unknown_topic", format!("unknown topic '{topic}'"), false)],
      },

      ClientWsMessage::Answer { seq, index } => {
        let Some(round) = self.round.as_mut() else { return vec![(&RoundError::NoRound).into()] };
        match round.submit_answer(seq, index) {
          Ok(feedback) => self.after_feedback(feedback).await,
          Err(e) => vec![(&e).into()],
        }
      }

      ClientWsMessage::NextQuestion | ClientWsMessage::Retry => self.present_next().await,

      ClientWsMessage::QuitRound => match self.retire_round() {
        Some(round) => {
          info!(target: "round", topic = %round.topic().value, answered = round.answered(), "Round abandoned");
          vec![ServerWsMessage::RoundOver { summary: round.summary(), completed: false }]
        }
        None => vec![(&RoundError::NoRound).into()],
      },

      ClientWsMessage::ProposeTopic { text } => match self.topics.submit(&text).await {
        Ok(p) => vec![ServerWsMessage::TopicProposal { name: p.name, instructions: p.instructions }],
        Err(e) => vec![(&e).into()],
      },

      ClientWsMessage::ConfirmTopic { mode, lang } => {
        self.retire_round();
        match self.topics.confirm(mode.starting_difficulty()).await {
          Ok(topic) => {
            let mut out = vec![ServerWsMessage::TopicReady { topic: topic.clone() }];
            out.extend(self.start_round(topic, mode, lang).await);
            out
          }
          Err(e) => vec![(&e).into()],
        }
      }

      ClientWsMessage::CancelTopic => match self.topics.cancel() {
        Ok(()) => Vec::new(),
        Err(e) => vec![(&e).into()],
      },

      ClientWsMessage::SelectCustomTopic { topic, mode, lang } => self.select_custom(&topic, mode, lang).await,
    }
  }

  async fn select_custom(&mut self, value: &str, mode: DifficultyMode, lang: Lang) -> Vec<ServerWsMessage> {
    self.retire_round();
    match self.topics.select_existing(value, mode.starting_difficulty()).await {
      Ok(topic) => {
        let mut out = vec![ServerWsMessage::TopicReady { topic: topic.clone() }];
        out.extend(self.start_round(topic, mode, lang).await);
        out
      }
      Err(e) => vec![(&e).into()],
    }
  }

  async fn start_round(&mut self, topic: TopicRef, mode: DifficultyMode, lang: Lang) -> Vec<ServerWsMessage> {
    self.retire_round();
    info!(target: "round", topic = %topic.value, custom = topic.is_custom, %mode, first_seq = self.next_seq, "Round started");
    self.round = Some(RoundSession::new(self.state.round_config(topic, mode, lang), self.next_seq));
    self.present_next().await
  }

  async fn present_next(&mut self) -> Vec<ServerWsMessage> {
    let supplier = self.state.supplier.clone();
    let Some(round) = self.round.as_mut() else { return vec![(&RoundError::NoRound).into()] };
    let cfg = round.config().clone();
    let out = match round.next_question(&supplier).await {
      Ok(q) => question_out(q, &cfg.topic, cfg.length, cfg.timer_seconds),
      Err(e) => {
        warn!(target: "round", error = %e, kind = e.kind(), "Next question unavailable");
        return vec![(&e).into()];
      }
    };
    round.arm_countdown(self.tx.clone(), self.tick);
    vec![ServerWsMessage::Question(out)]
  }

  pub async fn on_countdown(&mut self, event: CountdownEvent) -> Vec<ServerWsMessage> {
    let Some(round) = self.round.as_mut() else { return Vec::new() };
    let open_seq = round.current().filter(|q| q.resolution.is_none()).map(|q| q.seq);
    match event {
      CountdownEvent::Tick { seq, remaining } if open_seq == Some(seq) => {
        vec![ServerWsMessage::Tick { seq, remaining }]
      }
      CountdownEvent::Tick { .. } => Vec::new(),
      CountdownEvent::Expired { seq } => match round.handle_timeout(seq) {
        Some(feedback) => self.after_feedback(feedback).await,
        None => Vec::new(),
      },
    }
  }

  async fn after_feedback(&mut self, feedback: Feedback) -> Vec<ServerWsMessage> {
    let complete = feedback.round_complete;
    let mut out = vec![ServerWsMessage::Feedback(feedback)];
    if complete {
      if let Some(round) = self.retire_round() {
        let summary = round.summary();
        if let Err(e) = self.state.scores.record(&summary).await {
          warn!(target: "round", error = %e, "Score recording failed");
        }
        info!(target: "round", topic = %summary.topic_value, correct = summary.correct, total = summary.total, "Round complete");
        out.push(ServerWsMessage::RoundOver { summary, completed: true });
      }
    }
    out
  }

  /// Stop the current round's countdown and detach it, carrying its sequence
  /// counter over to the next round.
  fn retire_round(&mut self) -> Option<RoundSession> {
    let mut round = self.round.take()?;
    round.teardown();
    self.next_seq = round.next_seq();
    Some(round)
  }

  pub fn teardown(&mut self) {
    if let Some(round) = self.round.as_mut() {
      round.teardown();
    }
  }
}
