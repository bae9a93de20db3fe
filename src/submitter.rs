//! Builds the provider request and submits it.

use std::time::Duration;

use thiserror::Error;
use tokio::time::sleep;
use uuid::Uuid;

use crate::config::ProviderConfig;
use crate::garment::{Complexity, GarmentProfile};
use crate::gate::exponential_delay;
use crate::provider::{ErrorClass, ProviderError, RunInputs, RunRequest, TryOnProvider};
use crate::state_machine::{FailureCategory, JobHandle, JobStatus};

const RETRY_BASE_MS: u64 = 1_000;
const RETRY_CAP_MS: u64 = 4_000;

/// Everything sent to the provider for one try-on. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct TryOnRequest {
    pub avatar_image: String,
    pub garment_image: String,
    pub profile: GarmentProfile,
    pub sample_count: u32,
    pub seed: u32,
    pub output_format: String,
}

/// Complex garments get several candidates to choose from.
pub fn sample_count_for(complexity: Complexity, max_samples: u32) -> u32 {
    match complexity {
        Complexity::Complex => max_samples.max(1),
        Complexity::Simple | Complexity::Moderate => 1,
    }
}

pub fn mode_for(complexity: Complexity) -> &'static str {
    match complexity {
        Complexity::Simple => "performance",
        Complexity::Moderate => "balanced",
        Complexity::Complex => "quality",
    }
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("{source}")]
    Provider {
        source: ProviderError,
        attempts: u32,
    },

    #[error("provider rejected the job: {reason}")]
    Rejected {
        category: FailureCategory,
        reason: String,
        attempts: u32,
    },

    #[error("provider response had neither a job id nor output")]
    EmptyResponse { attempts: u32 },
}

impl SubmitError {
    pub fn attempts(&self) -> u32 {
        match self {
            SubmitError::Provider { attempts, .. }
            | SubmitError::Rejected { attempts, .. }
            | SubmitError::EmptyResponse { attempts } => *attempts,
        }
    }

    /// Whether the provider answered 429, which counts against the gate.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, SubmitError::Provider { source, .. } if source.class() == ErrorClass::RateLimited)
    }
}

/// An accepted job.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub handle: JobHandle,
    pub attempts: u32,
}

pub struct TryOnSubmitter<'a, P> {
    provider: &'a P,
    config: &'a ProviderConfig,
    max_attempts: u32,
}

impl<'a, P: TryOnProvider> TryOnSubmitter<'a, P> {
    pub fn new(provider: &'a P, config: &'a ProviderConfig, max_attempts: u32) -> Self {
        Self {
            provider,
            config,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn build_request(&self, request: &TryOnRequest) -> RunRequest {
        let mode = self
            .config
            .mode_override
            .as_deref()
            .unwrap_or_else(|| mode_for(request.profile.complexity));
        RunRequest {
            model: self.config.model.clone(),
            inputs: RunInputs {
                model_image: request.avatar_image.clone(),
                garment_image: request.garment_image.clone(),
                category: request.profile.category.provider_token().to_string(),
                segmentation_free: request.profile.skip_segmentation,
                mode: mode.to_string(),
                seed: request.seed,
                num_samples: request.sample_count,
                output_format: request.output_format.clone(),
            },
        }
    }

    /// Submit, retrying transient failures. A synchronous answer yields an
    /// already-completed handle.
    pub async fn submit(&self, request: &TryOnRequest) -> Result<Submission, SubmitError> {
        let body = self.build_request(request);
        let mut attempts = 0u32;

        let response = loop {
            attempts += 1;
            match self.provider.run(&body).await {
                Ok(response) => break response,
                Err(e) if e.class() == ErrorClass::Transient && attempts < self.max_attempts => {
                    let delay = self.retry_delay(attempts);
                    tracing::warn!(
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Submit failed, retrying",
                    );
                    sleep(delay).await;
                }
                Err(source) => {
                    tracing::warn!(attempt = attempts, error = %source, "Submit failed");
                    return Err(SubmitError::Provider { source, attempts });
                }
            }
        };

        if let Some(outputs) = response.output.filter(|o| !o.is_empty()) {
            let id = response.id.unwrap_or_else(|| Uuid::new_v4().to_string());
            tracing::info!(job_id = %id, outputs = outputs.len(), "Provider answered synchronously");
            return Ok(Submission {
                handle: JobHandle::completed(id, outputs),
                attempts,
            });
        }

        let Some(id) = response.id else {
            if let Some(failure) = response.error {
                let reason = failure.describe();
                return Err(SubmitError::Rejected {
                    category: FailureCategory::normalize(&reason),
                    reason,
                    attempts,
                });
            }
            return Err(SubmitError::EmptyResponse { attempts });
        };

        let mut handle = JobHandle::submitted(id);
        if let Some(status) = response.status.as_deref().and_then(JobStatus::from_provider) {
            handle.observe(status);
        }
        tracing::info!(job_id = %handle.id, status = %handle.status, attempts, "Job submitted");
        Ok(Submission { handle, attempts })
    }

    fn retry_delay(&self, attempt: u32) -> Duration {
        exponential_delay(RETRY_BASE_MS, attempt - 1, RETRY_CAP_MS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::garment::{Category, FittingType};
    use crate::provider::{ProviderFailure, RunResponse, StatusResponse};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct RunScript {
        responses: Mutex<VecDeque<Result<RunResponse, ProviderError>>>,
        seen: Mutex<Vec<RunRequest>>,
    }

    impl RunScript {
        fn new(responses: Vec<Result<RunResponse, ProviderError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    impl TryOnProvider for RunScript {
        async fn run(&self, req: &RunRequest) -> Result<RunResponse, ProviderError> {
            self.seen.lock().unwrap().push(req.clone());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ProviderError::ParseError("script exhausted".into())))
        }

        async fn status(&self, _job_id: &str) -> Result<StatusResponse, ProviderError> {
            unreachable!("submitter never polls")
        }
    }

    fn request(complexity: Complexity) -> TryOnRequest {
        TryOnRequest {
            avatar_image: "data:image/jpeg;base64,AAAA".into(),
            garment_image: "https://cdn.example.com/g.png".into(),
            profile: GarmentProfile {
                category: Category::OnePiece,
                fitting_type: FittingType::Fitted,
                complexity,
                skip_segmentation: false,
            },
            sample_count: 1,
            seed: 7,
            output_format: "png".into(),
        }
    }

    fn queued(id: &str) -> Result<RunResponse, ProviderError> {
        Ok(RunResponse {
            id: Some(id.into()),
            status: Some("in_queue".into()),
            ..Default::default()
        })
    }

    fn server_error() -> Result<RunResponse, ProviderError> {
        Err(ProviderError::Transient {
            status: 503,
            message: "unavailable".into(),
        })
    }

    #[test]
    fn request_body_uses_provider_vocabulary() {
        let provider = RunScript::new(vec![]);
        let config = ProviderConfig::default();
        let submitter = TryOnSubmitter::new(&provider, &config, 2);

        let body = submitter.build_request(&request(Complexity::Moderate));
        assert_eq!(body.model, "tryon-v1.6");
        assert_eq!(body.inputs.category, "one-pieces");
        assert_eq!(body.inputs.mode, "balanced");
        assert!(!body.inputs.segmentation_free);
        assert_eq!(body.inputs.seed, 7);
    }

    #[test]
    fn mode_override_wins() {
        let provider = RunScript::new(vec![]);
        let config = ProviderConfig {
            mode_override: Some("quality".into()),
            ..ProviderConfig::default()
        };
        let submitter = TryOnSubmitter::new(&provider, &config, 2);
        let body = submitter.build_request(&request(Complexity::Simple));
        assert_eq!(body.inputs.mode, "quality");
    }

    #[test]
    fn sample_count_by_complexity() {
        assert_eq!(sample_count_for(Complexity::Complex, 2), 2);
        assert_eq!(sample_count_for(Complexity::Moderate, 2), 1);
        assert_eq!(sample_count_for(Complexity::Complex, 0), 1);
    }

    #[tokio::test]
    async fn async_job_returns_handle() {
        let provider = RunScript::new(vec![queued("job-9")]);
        let config = ProviderConfig::default();
        let submitter = TryOnSubmitter::new(&provider, &config, 2);

        let submission = submitter.submit(&request(Complexity::Simple)).await.unwrap();
        assert_eq!(submission.handle.id, "job-9");
        assert_eq!(submission.handle.status, JobStatus::Queued);
        assert_eq!(submission.attempts, 1);
    }

    #[tokio::test]
    async fn synchronous_output_short_circuits() {
        let provider = RunScript::new(vec![Ok(RunResponse {
            output: Some(vec!["https://cdn/out.png".into()]),
            ..Default::default()
        })]);
        let config = ProviderConfig::default();
        let submitter = TryOnSubmitter::new(&provider, &config, 2);

        let submission = submitter.submit(&request(Complexity::Simple)).await.unwrap();
        assert_eq!(submission.handle.status, JobStatus::Completed);
        assert_eq!(submission.handle.outputs, vec!["https://cdn/out.png".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_is_retried() {
        let provider = RunScript::new(vec![server_error(), queued("job-2")]);
        let config = ProviderConfig::default();
        let submitter = TryOnSubmitter::new(&provider, &config, 2);

        let submission = submitter.submit(&request(Complexity::Simple)).await.unwrap();
        assert_eq!(submission.attempts, 2);
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_are_bounded() {
        let provider = RunScript::new(vec![server_error(), server_error(), queued("late")]);
        let config = ProviderConfig::default();
        let submitter = TryOnSubmitter::new(&provider, &config, 2);

        let err = submitter.submit(&request(Complexity::Simple)).await.unwrap_err();
        assert_eq!(err.attempts(), 2);
        assert!(!err.is_rate_limited());
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn rate_limit_is_not_retried() {
        let provider = RunScript::new(vec![Err(ProviderError::RateLimited {
            retry_after_ms: 1000,
        })]);
        let config = ProviderConfig::default();
        let submitter = TryOnSubmitter::new(&provider, &config, 3);

        let err = submitter.submit(&request(Complexity::Simple)).await.unwrap_err();
        assert!(err.is_rate_limited());
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn validation_is_not_retried() {
        let provider = RunScript::new(vec![Err(ProviderError::Validation {
            status: 422,
            message: "unsupported category".into(),
        })]);
        let config = ProviderConfig::default();
        let submitter = TryOnSubmitter::new(&provider, &config, 3);

        let err = submitter.submit(&request(Complexity::Simple)).await.unwrap_err();
        assert_eq!(err.attempts(), 1);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn inline_rejection_is_normalized() {
        let provider = RunScript::new(vec![Ok(RunResponse {
            error: Some(ProviderFailure::Message("content moderation flagged".into())),
            ..Default::default()
        })]);
        let config = ProviderConfig::default();
        let submitter = TryOnSubmitter::new(&provider, &config, 2);

        match submitter.submit(&request(Complexity::Simple)).await {
            Err(SubmitError::Rejected { category, .. }) => {
                assert_eq!(category, FailureCategory::ContentPolicy)
            }
            other => panic!("expected Rejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_response_is_an_error() {
        let provider = RunScript::new(vec![Ok(RunResponse::default())]);
        let config = ProviderConfig::default();
        let submitter = TryOnSubmitter::new(&provider, &config, 2);
        assert!(matches!(
            submitter.submit(&request(Complexity::Simple)).await,
            Err(SubmitError::EmptyResponse { attempts: 1 })
        ));
    }
}
