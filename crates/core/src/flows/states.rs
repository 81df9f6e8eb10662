use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::flows::completion::SubmissionRequest;
use crate::flows::definition::FlowType;
use crate::submission::OutcomeKind;
use crate::validation::ValidationError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum FlowState {
    NotStarted,
    InProgress { step_index: usize },
    AwaitingSubmission,
    Completed { outcome: OutcomeKind },
    Abandoned,
}

impl FlowState {
    pub fn accepts_input(&self) -> bool {
        matches!(self, Self::InProgress { .. })
    }
}

/// Handed out when a flow reaches `AwaitingSubmission`. The generation ties
/// the eventual outcome back to the session run that produced it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmissionTicket {
    pub generation: u64,
    pub request: SubmissionRequest,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepResult {
    /// Validation failed; the cursor did not move.
    Rejected(ValidationError),
    /// The step was accepted and the next prompt was emitted.
    Advanced { step_index: usize },
    /// The last step was accepted; the record must now be submitted.
    ReadyToSubmit(SubmissionTicket),
}

/// What the engine did with a submission outcome.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    Completed { flow_type: FlowType, outcome: OutcomeKind },
    /// Submission was refused by the rate limiter; the record is retained.
    Deferred { retry_after_secs: u64 },
    /// The outcome belonged to an abandoned or restarted run.
    Stale,
    /// A duplicate submit was suppressed while the original was in flight.
    /// The record stays pending and can be retried.
    Ignored,
}
