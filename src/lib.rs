//! Quizline · bilingual quiz question engine
//!
//! - Local SQLite cache with predefined and custom partitions, gated by a
//!   content version token
//! - Three-tier question supplier: local store, remote store, AI generator
//! - Custom topic lifecycle, adaptive difficulty, timed game rounds
//! - Axum HTTP + WebSocket surface (see `routes`)

pub mod config;
pub mod custom_topic;
pub mod difficulty;
pub mod domain;
pub mod error;
pub mod exclusion;
pub mod generator;
pub mod normalize;
pub mod openai;
pub mod protocol;
pub mod remote;
pub mod routes;
pub mod seeds;
pub mod session;
pub mod state;
pub mod store;
pub mod supplier;
pub mod telemetry;
pub mod util;
pub mod version_gate;
