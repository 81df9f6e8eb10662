pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod relay;
pub mod sanitize;
pub mod store;
pub mod submission;
pub mod validation;
pub mod widget;

#[cfg(test)]
mod test_support;

pub use audit::{AuditEvent, AuditSink, InMemoryAuditSink, NoopAuditSink, TracingAuditSink};
pub use config::{AppConfig, BackendKind, ConfigError, LoadOptions, LogFormat};
pub use domain::application::{JobApplication, JobApplicationId, NewJobApplication};
pub use domain::conversation::{ConversationId, ConversationMessage, NewConversationMessage};
pub use domain::lead::{Lead, LeadId, NewLead};
pub use domain::property::{NewProperty, Property, PropertyId};
pub use domain::report::{NewReport, Report, ReportId};
pub use domain::upload::FileUpload;
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use flows::{
    FlowCatalog, FlowEngine, FlowError, FlowState, FlowType, SessionId, StepInput, StepResult,
};
pub use relay::{FallbackRelay, RelayError, RelayPayload};
pub use store::{Collection, RecordStore, Selection, SortDirection, StoreError};
pub use submission::{OutcomeKind, SubmissionCoordinator, SubmissionFailure, SubmissionOutcome};
pub use validation::{ValidationError, ValidationLimits};
pub use widget::{ChatWidget, WidgetReply, WidgetVisibility};
