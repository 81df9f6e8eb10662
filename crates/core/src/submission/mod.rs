//! Submission of finished flow records: rate limiting, primary persistence,
//! best-effort dependent records and the fallback relay.

pub mod coordinator;
pub mod rate_limit;

use serde::{Deserialize, Serialize};

pub use coordinator::{CoordinatorSettings, SubmissionCoordinator};
pub use rate_limit::{Clock, ManualClock, RateLimitConfig, RateLimiter, SystemClock};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Primary,
    Fallback,
    Failed,
}

impl OutcomeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Fallback => "fallback",
            Self::Failed => "failed",
        }
    }
}

/// Why a submission ended as `Failed`. Carried as data; the coordinator
/// never returns an error.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum SubmissionFailure {
    RateLimited { retry_after_secs: u64 },
    /// Another submission for the same session has not resolved yet.
    InFlight,
    Unavailable { primary: String, fallback: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionOutcome {
    pub kind: OutcomeKind,
    pub failure: Option<SubmissionFailure>,
    /// Id of the primary record when the primary store accepted it.
    pub record_id: Option<String>,
}

impl SubmissionOutcome {
    pub fn primary(record_id: impl Into<String>) -> Self {
        Self { kind: OutcomeKind::Primary, failure: None, record_id: Some(record_id.into()) }
    }

    pub fn fallback() -> Self {
        Self { kind: OutcomeKind::Fallback, failure: None, record_id: None }
    }

    pub fn failed(failure: SubmissionFailure) -> Self {
        Self { kind: OutcomeKind::Failed, failure: Some(failure), record_id: None }
    }

    pub fn is_success(&self) -> bool {
        self.kind != OutcomeKind::Failed
    }

    pub fn retry_after_secs(&self) -> Option<u64> {
        match self.failure {
            Some(SubmissionFailure::RateLimited { retry_after_secs }) => Some(retry_after_secs),
            _ => None,
        }
    }
}
