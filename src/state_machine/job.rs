use serde::{Deserialize, Serialize};

/// Lifecycle of a provider job as seen by the client.
///
/// `Submitted → Queued → Processing → {Completed | Failed}`; `TimedOut` is
/// client-only and reachable from any non-terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Submitted,
    Queued,
    Processing,
    Completed,
    Failed,
    TimedOut,
}

impl JobStatus {
    /// Map the provider's status vocabulary. `None` for unknown values.
    pub fn from_provider(status: &str) -> Option<Self> {
        match status.trim().to_ascii_lowercase().as_str() {
            "starting" | "submitted" | "pending" => Some(JobStatus::Submitted),
            "in_queue" | "queued" => Some(JobStatus::Queued),
            "processing" | "running" => Some(JobStatus::Processing),
            "completed" | "succeeded" => Some(JobStatus::Completed),
            "failed" | "canceled" | "cancelled" | "error" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::TimedOut
        )
    }

    /// Position along the happy path, used to reject regressions.
    pub(super) fn rank(&self) -> u8 {
        match self {
            JobStatus::Submitted => 0,
            JobStatus::Queued => 1,
            JobStatus::Processing => 2,
            JobStatus::Completed | JobStatus::Failed | JobStatus::TimedOut => 3,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Submitted => write!(f, "SUBMITTED"),
            JobStatus::Queued => write!(f, "QUEUED"),
            JobStatus::Processing => write!(f, "PROCESSING"),
            JobStatus::Completed => write!(f, "COMPLETED"),
            JobStatus::Failed => write!(f, "FAILED"),
            JobStatus::TimedOut => write!(f, "TIMED_OUT"),
        }
    }
}

/// Normalized reason for a provider-side failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    InvalidImage,
    PoseUndetected,
    ContentPolicy,
    InvalidInput,
    ProviderUnavailable,
    Internal,
    Unknown,
}

const FAILURE_RULES: &[(&[&str], FailureCategory)] = &[
    (
        &["imageload", "image load", "invalid image", "decode", "corrupt"],
        FailureCategory::InvalidImage,
    ),
    (
        &["pose", "no person", "body not", "keypoint"],
        FailureCategory::PoseUndetected,
    ),
    (
        &["moderation", "nsfw", "content policy", "inappropriate"],
        FailureCategory::ContentPolicy,
    ),
    (
        &["validation", "invalid input", "unsupported", "not found"],
        FailureCategory::InvalidInput,
    ),
    (
        &["unavailable", "capacity", "overloaded", "timeout", "timed out"],
        FailureCategory::ProviderUnavailable,
    ),
    (
        &["pipeline", "internal", "out of memory", "exception"],
        FailureCategory::Internal,
    ),
];

impl FailureCategory {
    /// First matching rule over the lowercased reason.
    pub fn normalize(reason: &str) -> Self {
        let lower = reason.to_lowercase();
        FAILURE_RULES
            .iter()
            .find(|(needles, _)| needles.iter().any(|n| lower.contains(n)))
            .map(|&(_, category)| category)
            .unwrap_or(FailureCategory::Unknown)
    }
}

impl std::fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureCategory::InvalidImage => "invalid_image",
            FailureCategory::PoseUndetected => "pose_undetected",
            FailureCategory::ContentPolicy => "content_policy",
            FailureCategory::InvalidInput => "invalid_input",
            FailureCategory::ProviderUnavailable => "provider_unavailable",
            FailureCategory::Internal => "internal",
            FailureCategory::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// A submitted job. Only the poller mutates `status` after submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    pub id: String,
    pub status: JobStatus,
    pub status_history: Vec<JobStatus>,
    /// Output URLs, filled on completion.
    pub outputs: Vec<String>,
}

impl JobHandle {
    pub fn submitted(id: String) -> Self {
        Self {
            id,
            status: JobStatus::Submitted,
            status_history: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// Handle for a provider that answered synchronously.
    pub fn completed(id: String, outputs: Vec<String>) -> Self {
        Self {
            id,
            status: JobStatus::Completed,
            status_history: vec![JobStatus::Submitted],
            outputs,
        }
    }
}
