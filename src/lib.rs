//! Voxpipe: voice-driven command pipeline for a French sales copilot.
//!
//! Turns recognized speech into confirmed CRM writes:
//! Recognizer → Session → Intent → Orchestrator → Store → TTS
//!
//! # Architecture
//!
//! The pipeline is built from small stages, each usable on its own:
//! - **Session**: wake-word gating, silence segmentation and
//!   speaking/listening exclusion over host-provided speech engines
//! - **Intent**: ordered French rule cascade, pending-confirmation aware
//! - **Entities**: clients, contacts, amounts, dates, times, priorities
//! - **Orchestrator**: one pending command at a time, confirmed by voice
//!   before anything is written through the [`crm::CrmStore`] seam
//! - **Copilot**: glue that answers commands itself and delegates the rest
//!   to the host's chat assistant, flattened for speech

pub mod config;
pub mod copilot;
pub mod crm;
pub mod drafts;
pub mod error;
pub mod intent;
pub mod matcher;
pub mod normalize;
pub mod orchestrator;
pub mod session;
pub mod speakable;
pub mod speech;

pub use config::CopilotConfig;
pub use copilot::{ChatDelegate, Copilot};
pub use crm::{ActionItem, CrmStore, Deal, MemoryStore};
pub use error::{Result, VoiceError};
pub use intent::{Intent, IntentDetector, IntentKind};
pub use matcher::ItemMatcher;
pub use orchestrator::{Orchestrator, TurnOutcome};
pub use session::{ListeningMode, SessionEvent, SessionHandle, VoiceState};
pub use speakable::clean_for_speech;
