//! Loki - wake word voice assistant
//!
//! This library provides the core of the Loki assistant:
//! - Voice capture (wake word detection, VAD-gated command recording)
//! - STT and TTS through OpenAI-compatible services
//! - Two-stage intent classification (embedding fast path, LLM slow path)
//! - Agent dispatch
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │              Audio callback (real time)              │
//! │   cpal frames → wake word → VAD → command buffer     │
//! └────────────────────┬────────────────────────────────┘
//!                      │ take_command (50ms poll)
//! ┌────────────────────▼────────────────────────────────┐
//! │                    Daemon                            │
//! │   STT  →  fast classifier  →  LLM classifier        │
//! └────────────────────┬────────────────────────────────┘
//!                      │ confidence gate
//! ┌────────────────────▼────────────────────────────────┐
//! │                    Agents                            │
//! │   system_control  │  calculation  │  general        │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod agents;
pub mod config;
pub mod daemon;
pub mod error;
pub mod intent;
pub mod voice;

pub use config::Config;
pub use daemon::{ACKNOWLEDGE_RESPONSE, CommandOutcome, Daemon, FAILURE_RESPONSE};
pub use error::{Error, Result};
