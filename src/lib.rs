//! Virtual try-on orchestration: admission control, image preparation,
//! garment classification, job submission and polling, and sample
//! selection in front of a rate-limited inference provider.

pub mod config;
pub mod error;
pub mod garment;
pub mod gate;
pub mod orchestrator;
pub mod preprocess;
pub mod provider;
pub mod scoring;
pub mod selector;
pub mod state_machine;
pub mod submitter;

pub use config::VestirConfig;
pub use error::VestirError;
pub use orchestrator::{Orchestrator, TryOnOptions, TryOnResult};
