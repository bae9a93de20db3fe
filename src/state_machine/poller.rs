use std::time::Duration;

use tokio::time::{Instant, sleep, timeout};

use super::job::{FailureCategory, JobHandle, JobStatus};
use super::state::Transition;
use crate::config::PollingConfig;
use crate::gate::exponential_delay;
use crate::provider::{ErrorClass, TryOnProvider};

/// Terminal result of polling a job.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Completed { outputs: Vec<String> },
    /// Non-retryable provider failure.
    Failed {
        category: FailureCategory,
        reason: String,
    },
    /// Client budget exhausted. The provider job is left running.
    TimedOut { elapsed: Duration },
}

/// Polls one job to a terminal status within a wall-clock budget.
pub struct JobPoller<'a, P> {
    provider: &'a P,
    config: PollingConfig,
}

impl<'a, P: TryOnProvider> JobPoller<'a, P> {
    pub fn new(provider: &'a P, config: PollingConfig) -> Self {
        Self { provider, config }
    }

    /// Delay before the next check after `failures` consecutive transport
    /// errors: the base interval doubled per failure, capped.
    pub fn retry_delay(&self, failures: u32) -> Duration {
        let cap = self.config.max_backoff().max(self.config.interval());
        exponential_delay(self.config.poll_interval_ms, failures, cap.as_millis() as u64)
    }

    pub async fn poll(&self, handle: &mut JobHandle, budget: Duration) -> PollOutcome {
        let started = Instant::now();
        if handle.status == JobStatus::Completed {
            return PollOutcome::Completed {
                outputs: handle.outputs.clone(),
            };
        }

        match timeout(budget, self.poll_until_terminal(handle)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                handle.observe(JobStatus::TimedOut);
                let elapsed = started.elapsed();
                tracing::warn!(
                    job_id = %handle.id,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Polling budget exhausted",
                );
                PollOutcome::TimedOut { elapsed }
            }
        }
    }

    async fn poll_until_terminal(&self, handle: &mut JobHandle) -> PollOutcome {
        let mut failures = 0u32;
        let mut checks = 0u32;

        loop {
            checks += 1;
            let delay = match self.provider.status(&handle.id).await {
                Ok(response) => {
                    failures = 0;
                    let outputs = response.output.unwrap_or_default();
                    let observed = match JobStatus::from_provider(&response.status) {
                        // No output, no result: the handle ends Failed.
                        Some(JobStatus::Completed) if outputs.is_empty() => {
                            handle.observe(JobStatus::Failed);
                            tracing::warn!(job_id = %handle.id, "Job completed without output");
                            return PollOutcome::Failed {
                                category: FailureCategory::Internal,
                                reason: "job completed without output".into(),
                            };
                        }
                        other => other,
                    };
                    match observed {
                        Some(status) => {
                            if let Transition::Advanced(next) = handle.observe(status) {
                                tracing::info!(job_id = %handle.id, status = %next, "Job advanced");
                            }
                        }
                        None => tracing::debug!(
                            job_id = %handle.id,
                            status = %response.status,
                            "Unknown provider status, still polling",
                        ),
                    }
                    tracing::debug!(job_id = %handle.id, checks, status = %handle.status, "Polled job");

                    match handle.status {
                        JobStatus::Completed => {
                            handle.outputs = outputs.clone();
                            return PollOutcome::Completed { outputs };
                        }
                        JobStatus::Failed => {
                            let reason = response
                                .error
                                .map(|e| e.describe())
                                .unwrap_or_else(|| format!("job {}", response.status));
                            let category = FailureCategory::normalize(&reason);
                            tracing::warn!(job_id = %handle.id, %category, %reason, "Job failed");
                            return PollOutcome::Failed { category, reason };
                        }
                        _ => self.config.interval(),
                    }
                }
                Err(e) if e.class() == ErrorClass::Validation => {
                    tracing::warn!(job_id = %handle.id, error = %e, "Status check rejected");
                    handle.observe(JobStatus::Failed);
                    return PollOutcome::Failed {
                        category: FailureCategory::InvalidInput,
                        reason: e.to_string(),
                    };
                }
                Err(e) => {
                    failures += 1;
                    let delay = self.retry_delay(failures);
                    tracing::warn!(
                        job_id = %handle.id,
                        failures,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Status check failed, backing off",
                    );
                    delay
                }
            };

            sleep(delay).await;
        }
    }
}
