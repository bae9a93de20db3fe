pub mod client;
pub mod error;
pub mod types;

pub use client::{ProviderClient, TryOnProvider};
pub use error::{ErrorClass, ProviderError};
pub use types::{ProviderFailure, RunInputs, RunRequest, RunResponse, StatusResponse};
