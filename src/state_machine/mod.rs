mod job;
mod poller;
mod state;

pub use job::{FailureCategory, JobHandle, JobStatus};
pub use poller::{JobPoller, PollOutcome};
pub use state::Transition;

#[cfg(test)]
pub(crate) use poller::tests as poller_tests;
