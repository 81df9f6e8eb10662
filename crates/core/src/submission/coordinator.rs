use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{error, info, warn};

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::conversation::NewConversationMessage;
use crate::domain::lead::LeadId;
use crate::flows::completion::{
    PropertyDraft, SubmissionPayload, SubmissionRequest, DEFAULT_MAX_DEPENDENT_PROPERTIES,
};
use crate::flows::states::SessionId;
use crate::relay::{FallbackRelay, RelayError};
use crate::store::{RecordStore, StoreError};
use crate::submission::rate_limit::RateLimiter;
use crate::submission::{SubmissionFailure, SubmissionOutcome};

pub const DEFAULT_SUBMISSION_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_PAGE_CONTEXT: &str = "chat_widget";
const AUDIT_ACTOR: &str = "submission-coordinator";

/// A session run: the session plus the correlation id minted by each `start`.
type RunKey = (SessionId, String);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoordinatorSettings {
    /// Applied to every backend and relay call.
    pub timeout: Duration,
    pub max_dependent_properties: usize,
    pub page_context: String,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_SUBMISSION_TIMEOUT_SECS),
            max_dependent_properties: DEFAULT_MAX_DEPENDENT_PROPERTIES,
            page_context: DEFAULT_PAGE_CONTEXT.to_string(),
        }
    }
}

/// Submits finished records: rate limit, primary store, best-effort
/// dependent records, then the fallback relay when the primary fails.
/// Always answers with a tagged [`SubmissionOutcome`].
pub struct SubmissionCoordinator {
    store: Arc<dyn RecordStore>,
    relay: Arc<dyn FallbackRelay>,
    limiter: RateLimiter,
    settings: CoordinatorSettings,
    audit: Arc<dyn AuditSink>,
    in_flight: Mutex<HashSet<RunKey>>,
}

struct InFlightGuard<'a> {
    runs: &'a Mutex<HashSet<RunKey>>,
    key: RunKey,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut runs = match self.runs.lock() {
            Ok(runs) => runs,
            Err(poisoned) => poisoned.into_inner(),
        };
        runs.remove(&self.key);
    }
}

impl SubmissionCoordinator {
    pub fn new(
        store: Arc<dyn RecordStore>,
        relay: Arc<dyn FallbackRelay>,
        limiter: RateLimiter,
        settings: CoordinatorSettings,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self { store, relay, limiter, settings, audit, in_flight: Mutex::new(HashSet::new()) }
    }

    pub fn settings(&self) -> &CoordinatorSettings {
        &self.settings
    }

    pub async fn submit(&self, request: &SubmissionRequest) -> SubmissionOutcome {
        let context = AuditContext::new(
            request.session_id.to_string(),
            request.correlation_id.clone(),
            Some(request.flow_type.as_str().to_string()),
            AUDIT_ACTOR,
        );

        let Some(_guard) = self.claim(request) else {
            self.emit(
                &context,
                "submission.duplicate_ignored",
                AuditCategory::Submission,
                AuditOutcome::Rejected,
                Vec::new(),
            );
            return SubmissionOutcome::failed(SubmissionFailure::InFlight);
        };

        if !self.limiter.is_allowed(&request.identity_key) {
            let cooldown = self.limiter.remaining_cooldown(&request.identity_key);
            let retry_after_secs = cooldown_secs(cooldown);
            warn!(
                event_name = "submission.rate_limited",
                correlation_id = %request.correlation_id,
                session_id = %request.session_id,
                flow_type = %request.flow_type,
                retry_after_secs,
                "submission refused by rate limiter"
            );
            self.emit(
                &context,
                "submission.rate_limited",
                AuditCategory::RateLimit,
                AuditOutcome::Rejected,
                vec![("retry_after_secs", retry_after_secs.to_string())],
            );
            return SubmissionOutcome::failed(SubmissionFailure::RateLimited { retry_after_secs });
        }

        let primary_error = match self.submit_primary(request, &context).await {
            Ok(record_id) => {
                info!(
                    event_name = "submission.primary_succeeded",
                    correlation_id = %request.correlation_id,
                    session_id = %request.session_id,
                    flow_type = %request.flow_type,
                    record_id = %record_id,
                    "record stored"
                );
                self.emit(
                    &context,
                    "submission.primary_succeeded",
                    AuditCategory::Persistence,
                    AuditOutcome::Success,
                    vec![("record_id", record_id.clone())],
                );
                return SubmissionOutcome::primary(record_id);
            }
            Err(error) => error,
        };

        warn!(
            event_name = "submission.primary_failed",
            correlation_id = %request.correlation_id,
            session_id = %request.session_id,
            flow_type = %request.flow_type,
            error = %primary_error,
            "primary persistence failed, trying fallback relay"
        );
        self.emit(
            &context,
            "submission.primary_failed",
            AuditCategory::Persistence,
            AuditOutcome::Failed,
            vec![("error", primary_error.to_string())],
        );

        match self.relay_with_timeout(request).await {
            Ok(()) => {
                info!(
                    event_name = "submission.fallback_succeeded",
                    correlation_id = %request.correlation_id,
                    session_id = %request.session_id,
                    flow_type = %request.flow_type,
                    "record delivered through fallback relay"
                );
                self.emit(
                    &context,
                    "submission.fallback_succeeded",
                    AuditCategory::Relay,
                    AuditOutcome::Success,
                    Vec::new(),
                );
                SubmissionOutcome::fallback()
            }
            Err(relay_error) => {
                error!(
                    event_name = "submission.failed",
                    correlation_id = %request.correlation_id,
                    session_id = %request.session_id,
                    flow_type = %request.flow_type,
                    primary_error = %primary_error,
                    fallback_error = %relay_error,
                    "submission lost: primary store and fallback relay both failed"
                );
                self.emit(
                    &context,
                    "submission.failed",
                    AuditCategory::Relay,
                    AuditOutcome::Failed,
                    vec![
                        ("primary_error", primary_error.to_string()),
                        ("fallback_error", relay_error.to_string()),
                    ],
                );
                SubmissionOutcome::failed(SubmissionFailure::Unavailable {
                    primary: primary_error.to_string(),
                    fallback: relay_error.to_string(),
                })
            }
        }
    }

    /// Latches the run that produced `request`. A later run of the same
    /// session gets its own key and is never blocked by an earlier one.
    fn claim(&self, request: &SubmissionRequest) -> Option<InFlightGuard<'_>> {
        let key = (request.session_id.clone(), request.correlation_id.clone());
        let mut runs = match self.in_flight.lock() {
            Ok(runs) => runs,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !runs.insert(key.clone()) {
            return None;
        }
        Some(InFlightGuard { runs: &self.in_flight, key })
    }

    /// Stores the parent record and returns its id. Dependent records are
    /// attempted afterwards and never fail the submission.
    async fn submit_primary(
        &self,
        request: &SubmissionRequest,
        context: &AuditContext,
    ) -> Result<String, StoreError> {
        match &request.payload {
            SubmissionPayload::Lead { lead, properties } => {
                let stored = self.timed(self.store.insert_lead(lead.clone())).await?;
                self.insert_properties(request, context, &stored.id, properties).await;
                self.insert_conversation(request, context, Some(&stored.id)).await;
                Ok(stored.id.0)
            }
            SubmissionPayload::JobApplication { application, resume } => {
                let mut application = application.clone();
                if let Some(resume) = resume {
                    let url = self.timed(self.store.store_attachment(resume)).await?;
                    application.resume_url = Some(url);
                }
                let stored = self.timed(self.store.insert_job_application(application)).await?;
                self.insert_conversation(request, context, None).await;
                Ok(stored.id.0)
            }
        }
    }

    async fn insert_properties(
        &self,
        request: &SubmissionRequest,
        context: &AuditContext,
        lead_id: &LeadId,
        drafts: &[PropertyDraft],
    ) {
        for draft in drafts.iter().take(self.settings.max_dependent_properties) {
            let property = draft.clone().into_new_property(lead_id.clone());
            if let Err(error) = self.timed(self.store.insert_property(property)).await {
                self.dependent_failed(request, context, "property", &error);
            }
        }
    }

    async fn insert_conversation(
        &self,
        request: &SubmissionRequest,
        context: &AuditContext,
        lead_id: Option<&LeadId>,
    ) {
        for entry in &request.transcript {
            let message = NewConversationMessage {
                lead_id: lead_id.cloned(),
                message: entry.text.clone(),
                is_from_user: !entry.originated_from_system,
                page_context: self.settings.page_context.clone(),
            };
            if let Err(error) = self.timed(self.store.insert_conversation(message)).await {
                self.dependent_failed(request, context, "conversation", &error);
                // The backend is refusing writes; the remaining rows would fail too.
                if matches!(error, StoreError::Timeout(_) | StoreError::Unavailable(_)) {
                    break;
                }
            }
        }
    }

    fn dependent_failed(
        &self,
        request: &SubmissionRequest,
        context: &AuditContext,
        collection: &str,
        error: &StoreError,
    ) {
        warn!(
            event_name = "submission.dependent_record_failed",
            correlation_id = %request.correlation_id,
            session_id = %request.session_id,
            collection,
            error = %error,
            "dependent record was not stored"
        );
        self.emit(
            context,
            "submission.dependent_record_failed",
            AuditCategory::Persistence,
            AuditOutcome::Failed,
            vec![("collection", collection.to_string()), ("error", error.to_string())],
        );
    }

    async fn relay_with_timeout(&self, request: &SubmissionRequest) -> Result<(), RelayError> {
        let payload = request.relay_payload();
        let relayed = self.relay.relay(request.flow_type, &payload);
        match tokio::time::timeout(self.settings.timeout, relayed).await {
            Ok(result) => result,
            Err(_) => Err(RelayError::Timeout(self.settings.timeout)),
        }
    }

    async fn timed<T, F>(&self, call: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.settings.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.settings.timeout)),
        }
    }

    fn emit(
        &self,
        context: &AuditContext,
        event_type: &str,
        category: AuditCategory,
        outcome: AuditOutcome,
        metadata: Vec<(&str, String)>,
    ) {
        let event = metadata
            .into_iter()
            .fold(AuditEvent::new(context, event_type, category, outcome), |event, (key, value)| {
                event.with_metadata(key, value)
            });
        self.audit.emit(event);
    }
}

/// Whole seconds, rounded up, never zero for a blocked key.
fn cooldown_secs(cooldown: Duration) -> u64 {
    let secs = cooldown.as_secs() + u64::from(cooldown.subsec_nanos() > 0);
    secs.max(1)
}
