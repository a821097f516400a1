//! Adaptive difficulty controller.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::Difficulty;

/// How a round picks the difficulty of each question.
///
/// On the wire: `"adaptive"` or a difficulty name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DifficultyMode {
  Adaptive,
  Fixed(Difficulty),
}

impl Default for DifficultyMode {
  fn default() -> Self { DifficultyMode::Adaptive }
}

impl DifficultyMode {
  /// Difficulty of the first question of a round.
  pub fn starting_difficulty(self) -> Difficulty {
    match self {
      DifficultyMode::Adaptive => Difficulty::Medium,
      DifficultyMode::Fixed(d) => d,
    }
  }
}

impl fmt::Display for DifficultyMode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      DifficultyMode::Adaptive => f.write_str("adaptive"),
      DifficultyMode::Fixed(d) => write!(f, "{d}"),
    }
  }
}

impl FromStr for DifficultyMode {
  type Err = String;
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "adaptive" => Ok(DifficultyMode::Adaptive),
      other => other.parse::<Difficulty>().map(DifficultyMode::Fixed),
    }
  }
}

impl TryFrom<String> for DifficultyMode {
  type Error = String;
  fn try_from(s: String) -> Result<Self, Self::Error> { s.parse() }
}

impl From<DifficultyMode> for String {
  fn from(mode: DifficultyMode) -> Self { mode.to_string() }
}

/// Three-state machine `easy < medium < hard`.
///
/// Correct answers move one level up, incorrect answers and timeouts one level
/// down, clamped at both ends. In fixed mode the level never moves.
#[derive(Clone, Debug)]
pub struct DifficultyController {
  mode: DifficultyMode,
  current: Difficulty,
}

impl DifficultyController {
  pub fn new(mode: DifficultyMode) -> Self {
    Self { mode, current: mode.starting_difficulty() }
  }

  /// Difficulty of the next question.
  pub fn current(&self) -> Difficulty { self.current }

  /// Feed one outcome; returns the difficulty for the next question.
  pub fn record(&mut self, correct: bool) -> Difficulty {
    if self.mode == DifficultyMode::Adaptive {
      self.current = if correct { self.current.harder() } else { self.current.easier() };
    }
    self.current
  }
}
