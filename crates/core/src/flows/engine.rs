use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::flows::completion::{
    build_request, terminal_message, CompletionSettings, SubmissionRequest,
};
use crate::flows::definition::{FlowCatalog, FlowDefinition, FlowStep, FlowType, InputKind};
use crate::flows::record::{FieldValue, PartialRecord, StepInput};
use crate::flows::states::{FlowState, Resolution, SessionId, StepResult, SubmissionTicket};
use crate::flows::transcript::{EntryKind, TranscriptEntry, TranscriptLog};
use crate::sanitize::{sanitize_filename, sanitize_text};
use crate::submission::{SubmissionFailure, SubmissionOutcome};
use crate::validation::{validate_step, ValidationError, ValidationLimits};

const AUDIT_ACTOR: &str = "visitor";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EngineSettings {
    pub limits: ValidationLimits,
    pub completion: CompletionSettings,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowError {
    #[error("no flow has been started")]
    NotStarted,
    #[error("flow is not accepting input in state {state:?}")]
    NotAcceptingInput { state: FlowState },
    #[error("step `{field}` is required and cannot be skipped")]
    StepNotOptional { field: String },
    #[error("a submission for this session is already in flight")]
    SubmissionInFlight,
    #[error("a finished record is waiting to be submitted")]
    SubmissionPending,
    #[error("there is no pending submission to retry")]
    NoPendingSubmission,
    #[error("flow type `{0}` is not configured")]
    UnknownFlowType(FlowType),
}

/// One visitor's run through a guided flow.
///
/// The engine is synchronous: it never performs I/O. When the last step is
/// accepted it hands out a [`SubmissionTicket`]; the caller submits the
/// request and feeds the outcome back through [`FlowEngine::resolve_submission`].
/// Every `start`, `reset` and `abandon` bumps the generation so outcomes for
/// an earlier run are recognised as stale.
pub struct FlowEngine {
    catalog: FlowCatalog,
    settings: EngineSettings,
    audit: Arc<dyn AuditSink>,
    session_id: SessionId,
    correlation_id: String,
    generation: u64,
    definition: Option<Arc<FlowDefinition>>,
    state: FlowState,
    record: PartialRecord,
    transcript: TranscriptLog,
    pending: Option<SubmissionRequest>,
    in_flight: bool,
}

impl FlowEngine {
    pub fn new(catalog: FlowCatalog, settings: EngineSettings, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            catalog,
            settings,
            audit,
            session_id: SessionId::generate(),
            correlation_id: Uuid::new_v4().to_string(),
            generation: 0,
            definition: None,
            state: FlowState::NotStarted,
            record: PartialRecord::default(),
            transcript: TranscriptLog::default(),
            pending: None,
            in_flight: false,
        }
    }

    pub fn with_session_id(mut self, session_id: SessionId) -> Self {
        self.session_id = session_id;
        self
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn state(&self) -> &FlowState {
        &self.state
    }

    pub fn record(&self) -> &PartialRecord {
        &self.record
    }

    pub fn transcript(&self) -> &TranscriptLog {
        &self.transcript
    }

    pub fn flow_type(&self) -> Option<FlowType> {
        self.definition.as_ref().map(|definition| definition.flow_type())
    }

    pub fn pending_request(&self) -> Option<&SubmissionRequest> {
        self.pending.as_ref()
    }

    pub fn is_submission_in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn current_step(&self) -> Option<&FlowStep> {
        match (&self.state, &self.definition) {
            (FlowState::InProgress { step_index }, Some(definition)) => {
                definition.step(*step_index)
            }
            _ => None,
        }
    }

    /// Step cursor: the index of the current step, or the definition length
    /// once every step has been accepted.
    pub fn cursor(&self) -> Option<usize> {
        let definition = self.definition.as_ref()?;
        match self.state {
            FlowState::InProgress { step_index } => Some(step_index),
            FlowState::AwaitingSubmission | FlowState::Completed { .. } => Some(definition.len()),
            FlowState::NotStarted | FlowState::Abandoned => None,
        }
    }

    pub fn start(&mut self, flow_type: FlowType) -> Result<(), FlowError> {
        if self.state == FlowState::AwaitingSubmission {
            return Err(if self.in_flight {
                FlowError::SubmissionInFlight
            } else {
                FlowError::SubmissionPending
            });
        }

        let definition =
            self.catalog.get(flow_type).ok_or(FlowError::UnknownFlowType(flow_type))?;

        self.clear_session();
        self.correlation_id = Uuid::new_v4().to_string();
        let first_prompt = definition.step(0).map(prompt_text);
        self.definition = Some(definition);
        self.state = FlowState::InProgress { step_index: 0 };
        if let Some(prompt) = first_prompt {
            self.transcript.append(TranscriptEntry::system(EntryKind::Prompt, prompt));
        }

        self.emit("flow.started", AuditCategory::Flow, AuditOutcome::Success, Vec::new());
        Ok(())
    }

    pub fn submit_step_input(
        &mut self,
        input: impl Into<StepInput>,
    ) -> Result<StepResult, FlowError> {
        let (step_index, step) = self.active_step()?;
        let input = input.into();

        let accepted = validate_step(&step, &input, &self.settings.limits)
            .and_then(|value| self.sanitize_value(&step, value));
        match accepted {
            Ok(value) => Ok(self.accept(step_index, &step, value, false)),
            Err(error) => {
                self.transcript.append(TranscriptEntry::system(EntryKind::Error, error.user_message()));
                self.emit(
                    "flow.step_rejected",
                    AuditCategory::Validation,
                    AuditOutcome::Rejected,
                    vec![
                        ("field", step.field.to_string()),
                        ("reason", rejection_code(&error).to_string()),
                    ],
                );
                Ok(StepResult::Rejected(error))
            }
        }
    }

    /// Skips the current step. Only optional steps can be skipped.
    pub fn skip(&mut self) -> Result<StepResult, FlowError> {
        let (step_index, step) = self.active_step()?;
        if !step.optional {
            return Err(FlowError::StepNotOptional { field: step.field.to_string() });
        }
        Ok(self.accept(step_index, &step, None, true))
    }

    /// Returns to `NotStarted`, discarding the record and the transcript.
    pub fn reset(&mut self) {
        let flow_type = self.flow_type();
        self.clear_session();
        self.state = FlowState::NotStarted;
        self.emit_for(
            flow_type,
            "flow.reset",
            AuditCategory::Flow,
            AuditOutcome::Success,
            Vec::new(),
        );
    }

    /// Discards the session because the widget was closed. An in-flight
    /// submission still completes, but its outcome will be stale.
    pub fn abandon(&mut self) {
        if matches!(self.state, FlowState::NotStarted | FlowState::Abandoned) {
            return;
        }
        let flow_type = self.flow_type();
        let was_in_flight = self.in_flight;
        self.clear_session();
        self.state = FlowState::Abandoned;
        self.emit_for(
            flow_type,
            "flow.abandoned",
            AuditCategory::Flow,
            AuditOutcome::Success,
            vec![("submission_in_flight", was_in_flight.to_string())],
        );
    }

    /// Re-issues the ticket for a record that was refused by the rate limiter.
    pub fn retry_submission(&mut self) -> Result<SubmissionTicket, FlowError> {
        if self.state != FlowState::AwaitingSubmission {
            return Err(FlowError::NoPendingSubmission);
        }
        if self.in_flight {
            return Err(FlowError::SubmissionInFlight);
        }
        let request = self.pending.clone().ok_or(FlowError::NoPendingSubmission)?;
        self.in_flight = true;
        Ok(SubmissionTicket { generation: self.generation, request })
    }

    pub fn resolve_submission(
        &mut self,
        generation: u64,
        outcome: &SubmissionOutcome,
    ) -> Resolution {
        if generation != self.generation || self.state != FlowState::AwaitingSubmission {
            return Resolution::Stale;
        }

        match &outcome.failure {
            Some(SubmissionFailure::InFlight) => {
                // The record stays pending so the visitor can retry it.
                self.in_flight = false;
                Resolution::Ignored
            }
            Some(SubmissionFailure::RateLimited { retry_after_secs }) => {
                self.in_flight = false;
                self.transcript.append(TranscriptEntry::system(
                    EntryKind::Notice,
                    format!(
                        "You've sent several requests in a short time. Please try again in {}.",
                        format_cooldown(*retry_after_secs)
                    ),
                ));
                self.emit(
                    "flow.submission_deferred",
                    AuditCategory::RateLimit,
                    AuditOutcome::Rejected,
                    vec![("retry_after_secs", retry_after_secs.to_string())],
                );
                Resolution::Deferred { retry_after_secs: *retry_after_secs }
            }
            _ => {
                let flow_type = match self.flow_type() {
                    Some(flow_type) => flow_type,
                    None => return Resolution::Stale,
                };
                let message =
                    terminal_message(flow_type, outcome.kind, &self.settings.completion);
                self.transcript.append(TranscriptEntry::system(EntryKind::Confirmation, message));
                self.pending = None;
                self.in_flight = false;
                self.record.clear();
                self.state = FlowState::Completed { outcome: outcome.kind };
                let audit_outcome = if outcome.is_success() {
                    AuditOutcome::Success
                } else {
                    AuditOutcome::Failed
                };
                self.emit(
                    "flow.completed",
                    AuditCategory::Flow,
                    audit_outcome,
                    vec![("outcome", outcome.kind.as_str().to_string())],
                );
                Resolution::Completed { flow_type, outcome: outcome.kind }
            }
        }
    }

    fn active_step(&self) -> Result<(usize, FlowStep), FlowError> {
        match (&self.state, &self.definition) {
            (FlowState::InProgress { step_index }, Some(definition)) => definition
                .step(*step_index)
                .cloned()
                .map(|step| (*step_index, step))
                .ok_or_else(|| FlowError::NotAcceptingInput { state: self.state.clone() }),
            (FlowState::NotStarted | FlowState::Abandoned, _) => Err(FlowError::NotStarted),
            (state, _) => Err(FlowError::NotAcceptingInput { state: state.clone() }),
        }
    }

    fn sanitize_value(
        &self,
        step: &FlowStep,
        value: Option<FieldValue>,
    ) -> Result<Option<FieldValue>, ValidationError> {
        let sanitized = match value {
            None => return Ok(None),
            Some(FieldValue::Text(text)) => {
                let clean = sanitize_text(&text);
                if clean.is_empty() {
                    return if step.optional {
                        Ok(None)
                    } else {
                        Err(ValidationError::MissingRequired { field: step.field.to_string() })
                    };
                }
                FieldValue::Text(clean)
            }
            Some(FieldValue::Choice(options)) => FieldValue::Choice(options),
            Some(FieldValue::File(mut upload)) => {
                upload.file_name =
                    sanitize_filename(&upload.file_name, self.settings.limits.max_filename_len);
                FieldValue::File(upload)
            }
        };
        Ok(Some(sanitized))
    }

    fn accept(
        &mut self,
        step_index: usize,
        step: &FlowStep,
        value: Option<FieldValue>,
        skipped: bool,
    ) -> StepResult {
        let recorded = value.is_some();
        match value {
            Some(value) => {
                self.transcript.append(TranscriptEntry::user(value.display()));
                self.record.insert(step.field.clone(), value);
            }
            None => {
                self.transcript.append(TranscriptEntry::system(EntryKind::Notice, "Skipped."));
            }
        }

        let event = if skipped { "flow.step_skipped" } else { "flow.step_accepted" };
        self.emit(
            event,
            AuditCategory::Flow,
            AuditOutcome::Success,
            vec![
                ("field", step.field.to_string()),
                ("step_index", step_index.to_string()),
                ("recorded", recorded.to_string()),
            ],
        );

        self.advance(step_index)
    }

    fn advance(&mut self, step_index: usize) -> StepResult {
        let Some(definition) = self.definition.clone() else {
            return StepResult::Advanced { step_index };
        };

        let next = step_index + 1;
        if let Some(step) = definition.step(next) {
            self.state = FlowState::InProgress { step_index: next };
            self.transcript.append(TranscriptEntry::system(EntryKind::Prompt, prompt_text(step)));
            return StepResult::Advanced { step_index: next };
        }

        self.state = FlowState::AwaitingSubmission;
        let request = build_request(
            definition.flow_type(),
            &self.record,
            &self.transcript,
            &self.session_id,
            &self.correlation_id,
            &self.settings.completion,
        );
        self.pending = Some(request.clone());
        self.in_flight = true;
        self.emit(
            "flow.awaiting_submission",
            AuditCategory::Flow,
            AuditOutcome::Success,
            vec![("fields", self.record.len().to_string())],
        );
        StepResult::ReadyToSubmit(SubmissionTicket { generation: self.generation, request })
    }

    fn clear_session(&mut self) {
        self.generation += 1;
        self.record.clear();
        self.transcript.clear();
        self.pending = None;
        self.in_flight = false;
        self.definition = None;
    }

    fn emit(
        &self,
        event_type: &str,
        category: AuditCategory,
        outcome: AuditOutcome,
        metadata: Vec<(&str, String)>,
    ) {
        self.emit_for(self.flow_type(), event_type, category, outcome, metadata);
    }

    fn emit_for(
        &self,
        flow_type: Option<FlowType>,
        event_type: &str,
        category: AuditCategory,
        outcome: AuditOutcome,
        metadata: Vec<(&str, String)>,
    ) {
        let context = AuditContext::new(
            self.session_id.to_string(),
            self.correlation_id.clone(),
            flow_type.map(|flow_type| flow_type.as_str().to_string()),
            AUDIT_ACTOR,
        );
        let event = metadata
            .into_iter()
            .fold(AuditEvent::new(&context, event_type, category, outcome), |event, (key, value)| {
                event.with_metadata(key, value)
            });
        self.audit.emit(event);
    }
}

fn prompt_text(step: &FlowStep) -> String {
    let mut prompt = step.prompt.clone();
    if let InputKind::Choice { options, multiple } = &step.input_kind {
        let hint = if *multiple { "choose any of" } else { "choose one of" };
        prompt.push_str(&format!(" ({hint}: {})", options.join(", ")));
    }
    if step.optional {
        prompt.push_str(" You can skip this one.");
    }
    prompt
}

fn rejection_code(error: &ValidationError) -> &'static str {
    match error {
        ValidationError::MissingRequired { .. } => "missing_required",
        ValidationError::InvalidFormat { .. } => "invalid_format",
        ValidationError::TooLong { .. } => "too_long",
        ValidationError::InvalidCharacters { .. } => "invalid_characters",
        ValidationError::FileTooLarge { .. } => "file_too_large",
        ValidationError::UnsupportedType { .. } => "unsupported_type",
    }
}

fn format_cooldown(seconds: u64) -> String {
    match seconds {
        0 | 1 => "1 second".to_string(),
        2..=59 => format!("{seconds} seconds"),
        _ => {
            let minutes = seconds.div_ceil(60);
            if minutes == 1 {
                "1 minute".to_string()
            } else {
                format!("{minutes} minutes")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::audit::InMemoryAuditSink;
    use crate::domain::upload::FileUpload;
    use crate::flows::definition::{fields, FlowCatalog, FlowType};
    use crate::flows::record::{FieldValue, StepInput};
    use crate::flows::states::{FlowState, Resolution, StepResult};
    use crate::flows::transcript::EntryKind;
    use crate::submission::{OutcomeKind, SubmissionFailure, SubmissionOutcome};
    use crate::validation::ValidationError;

    use super::{EngineSettings, FlowEngine, FlowError};

    fn engine() -> (FlowEngine, InMemoryAuditSink) {
        let sink = InMemoryAuditSink::default();
        let catalog = FlowCatalog::builtin().expect("builtin catalog is valid");
        (FlowEngine::new(catalog, EngineSettings::default(), Arc::new(sink.clone())), sink)
    }

    fn ticket_of(result: StepResult) -> super::SubmissionTicket {
        match result {
            StepResult::ReadyToSubmit(ticket) => ticket,
            other => panic!("expected a submission ticket, got {other:?}"),
        }
    }

    #[test]
    fn connect_flow_walks_every_step_once() {
        let (mut engine, sink) = engine();
        engine.start(FlowType::Connect).expect("start");
        assert_eq!(engine.state(), &FlowState::InProgress { step_index: 0 });

        assert_eq!(
            engine.submit_step_input("Ana").expect("name"),
            StepResult::Advanced { step_index: 1 }
        );
        assert_eq!(
            engine.submit_step_input("ana@x.com").expect("email"),
            StepResult::Advanced { step_index: 2 }
        );
        let ticket = ticket_of(engine.submit_step_input("need help").expect("help"));

        assert_eq!(engine.state(), &FlowState::AwaitingSubmission);
        assert_eq!(engine.cursor(), Some(3));
        assert_eq!(engine.record().text(fields::NAME), Some("Ana"));
        assert_eq!(engine.record().text(fields::EMAIL), Some("ana@x.com"));
        assert_eq!(engine.record().text(fields::HELP_MESSAGE), Some("need help"));
        assert_eq!(ticket.request.flow_type, FlowType::Connect);
        assert_eq!(ticket.generation, engine.generation());
        assert!(sink.event_types().contains(&"flow.awaiting_submission".to_string()));
    }

    #[test]
    fn invalid_email_keeps_cursor_and_record() {
        let (mut engine, _) = engine();
        engine.start(FlowType::Connect).expect("start");
        engine.submit_step_input("Ana").expect("name");
        let before = engine.record().clone();

        let result = engine.submit_step_input("not-an-email").expect("input handled");

        assert!(matches!(result, StepResult::Rejected(ValidationError::InvalidFormat { .. })));
        assert_eq!(engine.state(), &FlowState::InProgress { step_index: 1 });
        assert_eq!(engine.record(), &before);
        assert_eq!(engine.transcript().last().map(|entry| entry.kind), Some(EntryKind::Error));
    }

    #[test]
    fn blank_required_value_is_missing_required() {
        let (mut engine, _) = engine();
        engine.start(FlowType::Waitlist).expect("start");

        for blank in ["", "   ", "\n\t"] {
            let result = engine.submit_step_input(blank).expect("input handled");
            assert!(matches!(result, StepResult::Rejected(ValidationError::MissingRequired { .. })));
            assert_eq!(engine.state(), &FlowState::InProgress { step_index: 0 });
        }
    }

    #[test]
    fn markup_only_answer_counts_as_blank() {
        let (mut engine, _) = engine();
        engine.start(FlowType::Connect).expect("start");
        engine.submit_step_input("Ana").expect("name");
        engine.submit_step_input("ana@x.com").expect("email");

        let result = engine.submit_step_input("<script></script>").expect("input handled");
        assert!(matches!(result, StepResult::Rejected(ValidationError::MissingRequired { .. })));
    }

    #[test]
    fn answers_are_sanitized_before_storage_and_echo() {
        let (mut engine, _) = engine();
        engine.start(FlowType::Connect).expect("start");
        engine.submit_step_input("Ana").expect("name");
        engine.submit_step_input("ana@x.com").expect("email");
        engine.submit_step_input("need <b>help</b> javascript:now").expect("help");

        assert_eq!(engine.record().text(fields::HELP_MESSAGE), Some("need help now"));
        let echoed = engine
            .transcript()
            .entries()
            .iter()
            .rev()
            .find(|entry| !entry.originated_from_system)
            .map(|entry| entry.text.clone());
        assert_eq!(echoed.as_deref(), Some("need help now"));
    }

    #[test]
    fn skipping_optional_steps_writes_nothing() {
        let (mut engine, sink) = engine();
        engine.start(FlowType::CareersApplication).expect("start");
        engine.submit_step_input("Ana").expect("name");
        engine.submit_step_input("ana@x.com").expect("email");
        engine.submit_step_input("property manager").expect("role");
        engine.skip().expect("linkedin is optional");
        engine.submit_step_input("I like people").expect("motivation");
        engine.skip().expect("resume is optional");
        let ticket = ticket_of(engine.skip().expect("notes are optional"));

        assert!(!engine.record().contains(fields::ADDITIONAL_NOTES));
        assert!(!engine.record().contains(fields::RESUME));
        assert_eq!(engine.record().text(fields::ROLE_APPLIED), Some("Property Manager"));
        assert_eq!(engine.state(), &FlowState::AwaitingSubmission);
        assert_eq!(ticket.request.fields.len(), 4);
        assert_eq!(
            sink.event_types().iter().filter(|event| *event == "flow.step_skipped").count(),
            3
        );
    }

    #[test]
    fn required_steps_cannot_be_skipped() {
        let (mut engine, _) = engine();
        engine.start(FlowType::Connect).expect("start");

        assert_eq!(
            engine.skip(),
            Err(FlowError::StepNotOptional { field: fields::NAME.to_string() })
        );
        assert_eq!(engine.state(), &FlowState::InProgress { step_index: 0 });
    }

    #[test]
    fn resume_file_name_is_sanitized() {
        let (mut engine, _) = engine();
        engine.start(FlowType::CareersApplication).expect("start");
        engine.submit_step_input("Ana").expect("name");
        engine.submit_step_input("ana@x.com").expect("email");
        engine.submit_step_input("Other").expect("role");
        engine.skip().expect("linkedin");
        engine.submit_step_input("motivated").expect("motivation");
        let upload = FileUpload::new("../my  cv (final).pdf", "application/pdf", vec![0; 16]);
        engine.submit_step_input(StepInput::File(upload)).expect("resume");

        match engine.record().get(fields::RESUME) {
            Some(FieldValue::File(stored)) => assert_eq!(stored.file_name, "my_cv_final_.pdf"),
            other => panic!("expected stored resume, got {other:?}"),
        }
    }

    #[test]
    fn input_before_start_is_refused() {
        let (mut engine, _) = engine();
        assert_eq!(engine.submit_step_input("Ana"), Err(FlowError::NotStarted));
        assert_eq!(engine.skip(), Err(FlowError::NotStarted));
    }

    fn finish_connect(engine: &mut FlowEngine) -> super::SubmissionTicket {
        engine.start(FlowType::Connect).expect("start");
        engine.submit_step_input("Ana").expect("name");
        engine.submit_step_input("ana@x.com").expect("email");
        ticket_of(engine.submit_step_input("need help").expect("help"))
    }

    #[test]
    fn fallback_outcome_completes_flow_with_success_message() {
        let (mut engine, _) = engine();
        let ticket = finish_connect(&mut engine);

        let resolution = engine.resolve_submission(ticket.generation, &SubmissionOutcome::fallback());

        assert_eq!(
            resolution,
            Resolution::Completed { flow_type: FlowType::Connect, outcome: OutcomeKind::Fallback }
        );
        assert_eq!(engine.state(), &FlowState::Completed { outcome: OutcomeKind::Fallback });
        assert!(engine.record().is_empty());
        assert_eq!(
            engine.transcript().last().map(|entry| entry.kind),
            Some(EntryKind::Confirmation)
        );
        assert_eq!(engine.submit_step_input("again"), Err(FlowError::NotAcceptingInput {
            state: FlowState::Completed { outcome: OutcomeKind::Fallback }
        }));
    }

    #[test]
    fn total_failure_still_completes_the_flow() {
        let (mut engine, _) = engine();
        let ticket = finish_connect(&mut engine);

        let outcome = SubmissionOutcome::failed(SubmissionFailure::Unavailable {
            primary: "timeout".to_string(),
            fallback: "status 500".to_string(),
        });
        engine.resolve_submission(ticket.generation, &outcome);

        assert_eq!(engine.state(), &FlowState::Completed { outcome: OutcomeKind::Failed });
        let last = engine.transcript().last().map(|entry| entry.text.clone()).unwrap_or_default();
        assert!(last.contains("email us"));
    }

    #[test]
    fn rate_limited_submission_keeps_record_and_allows_retry() {
        let (mut engine, _) = engine();
        let ticket = finish_connect(&mut engine);
        assert_eq!(engine.retry_submission(), Err(FlowError::SubmissionInFlight));

        let outcome =
            SubmissionOutcome::failed(SubmissionFailure::RateLimited { retry_after_secs: 90 });
        let resolution = engine.resolve_submission(ticket.generation, &outcome);

        assert_eq!(resolution, Resolution::Deferred { retry_after_secs: 90 });
        assert_eq!(engine.state(), &FlowState::AwaitingSubmission);
        assert_eq!(engine.record().text(fields::EMAIL), Some("ana@x.com"));
        let notice = engine.transcript().last().map(|entry| entry.text.clone()).unwrap_or_default();
        assert!(notice.contains("2 minutes"));

        let retry = engine.retry_submission().expect("pending record can be retried");
        assert_eq!(retry.request, ticket.request);
        assert_eq!(engine.start(FlowType::Connect), Err(FlowError::SubmissionInFlight));
    }

    #[test]
    fn suppressed_duplicate_leaves_record_retryable() {
        let (mut engine, _) = engine();
        let ticket = finish_connect(&mut engine);

        let outcome = SubmissionOutcome::failed(SubmissionFailure::InFlight);
        let resolution = engine.resolve_submission(ticket.generation, &outcome);

        assert_eq!(resolution, Resolution::Ignored);
        assert_eq!(engine.state(), &FlowState::AwaitingSubmission);
        assert!(!engine.is_submission_in_flight());
        let retry = engine.retry_submission().expect("pending record can be retried");
        assert_eq!(retry.request, ticket.request);
    }

    #[test]
    fn outcome_for_abandoned_run_is_stale() {
        let (mut engine, sink) = engine();
        let ticket = finish_connect(&mut engine);

        engine.abandon();
        let resolution = engine.resolve_submission(ticket.generation, &SubmissionOutcome::primary("lead-1"));

        assert_eq!(resolution, Resolution::Stale);
        assert_eq!(engine.state(), &FlowState::Abandoned);
        assert!(engine.transcript().is_empty());
        assert!(engine.record().is_empty());
        assert!(sink.event_types().contains(&"flow.abandoned".to_string()));
    }

    #[test]
    fn completed_flow_requires_explicit_restart() {
        let (mut engine, _) = engine();
        let ticket = finish_connect(&mut engine);
        engine.resolve_submission(ticket.generation, &SubmissionOutcome::primary("lead-1"));

        engine.start(FlowType::Waitlist).expect("restart");
        assert_eq!(engine.state(), &FlowState::InProgress { step_index: 0 });
        assert_eq!(engine.transcript().len(), 1);
        assert!(engine.generation() > ticket.generation);
    }

    #[test]
    fn reset_clears_everything() {
        let (mut engine, _) = engine();
        engine.start(FlowType::Connect).expect("start");
        engine.submit_step_input("Ana").expect("name");

        engine.reset();

        assert_eq!(engine.state(), &FlowState::NotStarted);
        assert!(engine.record().is_empty());
        assert!(engine.transcript().is_empty());
        assert_eq!(engine.flow_type(), None);
    }

    #[test]
    fn choice_prompts_list_the_options() {
        let (mut engine, _) = engine();
        engine.start(FlowType::GeneralAssessment).expect("start");
        engine.submit_step_input("Ana").expect("name");
        engine.submit_step_input("ana@x.com").expect("email");
        engine.skip().expect("location");
        let result = engine.submit_step_input("two").expect("count handled");
        assert!(matches!(result, StepResult::Rejected(ValidationError::InvalidFormat { .. })));
        engine.submit_step_input("2").expect("count");

        let prompt = engine.transcript().last().map(|entry| entry.text.clone()).unwrap_or_default();
        assert!(prompt.contains("choose one of"));
    }
}
