//! Warden Common - shared types and ports for the warden daemon.
//!
//! Data model (resources, transcripts, alerts, healing records), daemon
//! configuration, and the decision-engine abstraction. Daemon logic lives in
//! the `wardend` crate.

pub mod alert;
pub mod config;
pub mod healing;
pub mod llm_client;
pub mod resource;
pub mod snapshot;
pub mod transcript;

pub use alert::*;
pub use config::*;
pub use healing::*;
pub use llm_client::*;
pub use resource::*;
pub use snapshot::*;
pub use transcript::*;
