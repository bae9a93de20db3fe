use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::VestirConfig;
use crate::error::VestirError;
use crate::garment::{Category, Complexity, FittingType, GarmentAnalyzer, GarmentProfile};
use crate::gate::{GateRejection, RequestGate};
use crate::preprocess::background::BackgroundRemover;
use crate::preprocess::{ImagePreprocessor, ImageRole, Modification, PreprocessError};
use crate::provider::{ErrorClass, TryOnProvider};
use crate::scoring::QualityScorer;
use crate::selector::{SampleSelector, Selection, validate_outputs};
use crate::state_machine::{FailureCategory, JobPoller, PollOutcome};
use crate::submitter::{SubmitError, TryOnRequest, TryOnSubmitter, sample_count_for};

/// Per-call knobs. Everything is optional.
#[derive(Debug, Clone, Default)]
pub struct TryOnOptions {
    /// Free text used to classify the garment. Falls back to the garment
    /// URL when absent.
    pub garment_description: Option<String>,
    /// Polling budget; defaults to `polling.max_poll_budget_ms`.
    pub timeout_ms: Option<u64>,
    pub sample_count: Option<u32>,
    pub seed: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Diagnostics {
    pub request_id: String,
    pub started_at: DateTime<Utc>,
    pub category: Category,
    pub fitting_type: FittingType,
    pub complexity: Complexity,
    pub attempts: u32,
    pub processing_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_category: Option<FailureCategory>,
    /// Wait estimate when the provider or the gate pushed back.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    pub avatar_modifications: Vec<Modification>,
    pub garment_modifications: Vec<Modification>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_score: Option<f64>,
}

impl Diagnostics {
    fn new(request_id: String, profile: &GarmentProfile) -> Self {
        Self {
            request_id,
            started_at: Utc::now(),
            category: profile.category,
            fitting_type: profile.fitting_type,
            complexity: profile.complexity,
            attempts: 0,
            processing_time_ms: 0,
            error: None,
            failure_category: None,
            retry_after_ms: None,
            job_id: None,
            avatar_modifications: Vec::new(),
            garment_modifications: Vec::new(),
            selected_score: None,
        }
    }
}

/// Outcome of [`Orchestrator::try_on`]. `image_url` is always displayable:
/// either the try-on output or the caller's original avatar.
#[derive(Debug, Clone, Serialize)]
pub struct TryOnResult {
    pub success: bool,
    pub image_url: String,
    pub fallback_used: bool,
    pub diagnostics: Diagnostics,
}

/// Why a call fell back to the original avatar.
#[derive(Debug, Error)]
pub enum FallbackReason {
    #[error("gate rejected request: {0}")]
    Gate(#[from] GateRejection),

    #[error("{role} preprocessing failed: {source}")]
    Preprocess {
        role: ImageRole,
        source: PreprocessError,
    },

    #[error("submit failed: {0}")]
    Submit(#[from] SubmitError),

    #[error("job failed ({category}): {reason}")]
    JobFailed {
        category: FailureCategory,
        reason: String,
    },

    #[error("job timed out after {}ms", elapsed.as_millis())]
    TimedOut { elapsed: Duration },

    #[error("job produced no valid output")]
    NoValidOutput,
}

impl FallbackReason {
    pub fn failure_category(&self) -> Option<FailureCategory> {
        match self {
            FallbackReason::Gate(_) => Some(FailureCategory::ProviderUnavailable),
            FallbackReason::Preprocess { .. } => Some(FailureCategory::InvalidImage),
            FallbackReason::Submit(SubmitError::Provider { source, .. }) => {
                Some(match source.class() {
                    ErrorClass::Validation => FailureCategory::InvalidInput,
                    _ => FailureCategory::ProviderUnavailable,
                })
            }
            FallbackReason::Submit(SubmitError::Rejected { category, .. }) => Some(*category),
            FallbackReason::Submit(SubmitError::EmptyResponse { .. }) => Some(FailureCategory::Internal),
            FallbackReason::JobFailed { category, .. } => Some(*category),
            FallbackReason::TimedOut { .. } => None,
            FallbackReason::NoValidOutput => Some(FailureCategory::Internal),
        }
    }
}

/// Classification hint: the description, else the garment itself when it is
/// a URL (product paths often name the category).
fn garment_hint<'a>(garment: &'a str, options: &'a TryOnOptions) -> &'a str {
    match options.garment_description.as_deref() {
        Some(description) if !description.trim().is_empty() => description,
        _ if garment.starts_with("http://") || garment.starts_with("https://") => garment,
        _ => "",
    }
}

/// Composes gate, preprocessing, classification, submission, polling and
/// selection into [`Orchestrator::try_on`].
pub struct Orchestrator<P, S, R> {
    config: VestirConfig,
    gate: RequestGate,
    analyzer: GarmentAnalyzer,
    preprocessor: ImagePreprocessor<R>,
    provider: P,
    scorer: S,
}

impl<P, S, R> Orchestrator<P, S, R>
where
    P: TryOnProvider,
    S: QualityScorer,
    R: BackgroundRemover,
{
    pub fn new(config: VestirConfig, gate: RequestGate, provider: P, scorer: S, remover: R) -> Self {
        let preprocessor =
            ImagePreprocessor::new(config.images.clone(), config.background.clone(), remover);
        Self {
            config,
            gate,
            analyzer: GarmentAnalyzer::default(),
            preprocessor,
            provider,
            scorer,
        }
    }

    pub fn gate(&self) -> &RequestGate {
        &self.gate
    }

    /// Run one try-on.
    ///
    /// Only a missing avatar or garment is an error. Every availability
    /// failure comes back as `fallback_used: true` with the original avatar.
    pub async fn try_on(
        &self,
        avatar: &str,
        garment: &str,
        options: &TryOnOptions,
    ) -> Result<TryOnResult, VestirError> {
        if avatar.trim().is_empty() {
            return Err(VestirError::MissingImage(ImageRole::Avatar));
        }
        if garment.trim().is_empty() {
            return Err(VestirError::MissingImage(ImageRole::Garment));
        }

        let request_id = Uuid::new_v4().to_string();
        let span = tracing::info_span!("try_on", request_id = %request_id);
        Ok(self
            .try_on_traced(request_id, avatar, garment, options)
            .instrument(span)
            .await)
    }

    async fn try_on_traced(
        &self,
        request_id: String,
        avatar: &str,
        garment: &str,
        options: &TryOnOptions,
    ) -> TryOnResult {
        let started = Instant::now();
        let profile = self.analyzer.classify(garment_hint(garment, options));
        let mut diagnostics = Diagnostics::new(request_id, &profile);
        tracing::info!(
            category = %profile.category,
            fitting = %profile.fitting_type,
            complexity = %profile.complexity,
            "Try-on started",
        );

        let outcome = self.run(avatar, garment, profile, options, &mut diagnostics).await;
        diagnostics.processing_time_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(image_url) => {
                tracing::info!(
                    elapsed_ms = diagnostics.processing_time_ms,
                    attempts = diagnostics.attempts,
                    "Try-on completed",
                );
                TryOnResult {
                    success: true,
                    image_url,
                    fallback_used: false,
                    diagnostics,
                }
            }
            Err(reason) => {
                tracing::warn!(error = %reason, "Falling back to original avatar");
                diagnostics.failure_category = reason.failure_category();
                diagnostics.error = Some(reason.to_string());
                TryOnResult {
                    success: true,
                    image_url: avatar.to_string(),
                    fallback_used: true,
                    diagnostics,
                }
            }
        }
    }

    async fn run(
        &self,
        avatar: &str,
        garment: &str,
        profile: GarmentProfile,
        options: &TryOnOptions,
        diagnostics: &mut Diagnostics,
    ) -> Result<String, FallbackReason> {
        let mut ticket = match self.gate.admit().await {
            Ok(ticket) => ticket,
            Err(rejection) => {
                diagnostics.retry_after_ms = Some(rejection.wait().as_millis() as u64);
                return Err(rejection.into());
            }
        };

        let (avatar_prepared, garment_prepared) = tokio::join!(
            self.preprocessor.prepare(avatar, ImageRole::Avatar),
            self.preprocessor.prepare(garment, ImageRole::Garment),
        );
        let avatar_prepared = avatar_prepared.map_err(|source| FallbackReason::Preprocess {
            role: ImageRole::Avatar,
            source,
        })?;
        let garment_prepared = garment_prepared.map_err(|source| FallbackReason::Preprocess {
            role: ImageRole::Garment,
            source,
        })?;
        diagnostics.avatar_modifications = avatar_prepared.modifications();
        diagnostics.garment_modifications = garment_prepared.modifications();

        let jpeg_token = &self.config.provider.jpeg_token;
        let request = TryOnRequest {
            avatar_image: avatar_prepared.to_provider_string(jpeg_token),
            garment_image: garment_prepared.to_provider_string(jpeg_token),
            profile,
            sample_count: options.sample_count.unwrap_or_else(|| {
                sample_count_for(profile.complexity, self.config.tryon.max_samples)
            }),
            seed: options.seed.unwrap_or_else(rand::random),
            output_format: self.config.provider.output_format.clone(),
        };

        let submitter = TryOnSubmitter::new(
            &self.provider,
            &self.config.provider,
            self.config.tryon.max_submit_attempts,
        );
        let submission = match submitter.submit(&request).await {
            Ok(submission) => {
                ticket.record_success();
                submission
            }
            Err(e) => {
                diagnostics.attempts = e.attempts();
                if e.is_rate_limited() {
                    let wait = ticket.record_rate_limited().unwrap_or_else(|| {
                        self.gate.backoff_delay(ticket.state().consecutive_failures)
                    });
                    diagnostics.retry_after_ms = Some(wait.as_millis() as u64);
                }
                return Err(e.into());
            }
        };
        diagnostics.attempts = submission.attempts;

        let mut handle = submission.handle;
        diagnostics.job_id = Some(handle.id.clone());
        let budget = options
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.config.polling.budget());
        let poller = JobPoller::new(&self.provider, self.config.polling.clone());
        let outputs = match poller.poll(&mut handle, budget).await {
            PollOutcome::Completed { outputs } => outputs,
            PollOutcome::Failed { category, reason } => {
                return Err(FallbackReason::JobFailed { category, reason });
            }
            PollOutcome::TimedOut { elapsed } => return Err(FallbackReason::TimedOut { elapsed }),
        };
        drop(ticket);

        let outputs = validate_outputs(outputs);
        let selection = if self.config.scoring.enabled {
            SampleSelector::new(&self.scorer, self.config.scoring.neutral_score)
                .select_best(&outputs)
                .await
        } else {
            outputs.first().map(|url| Selection {
                url: url.clone(),
                score: None,
                candidates: Vec::new(),
            })
        };
        let selection = selection.ok_or(FallbackReason::NoValidOutput)?;
        diagnostics.selected_score = selection.score;
        Ok(selection.url)
    }
}
