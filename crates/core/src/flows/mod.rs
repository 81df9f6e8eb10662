pub mod completion;
pub mod definition;
pub mod engine;
pub mod record;
pub mod states;
pub mod transcript;

pub use completion::{
    build_request, terminal_message, CompletionSettings, PropertyDraft, SubmissionPayload,
    SubmissionRequest,
};
pub use definition::{
    fields, DefinitionError, FieldKey, FlowCatalog, FlowDefinition, FlowStep, FlowType, InputKind,
    SubmissionTarget, Validator,
};
pub use engine::{EngineSettings, FlowEngine, FlowError};
pub use record::{FieldValue, PartialRecord, StepInput};
pub use states::{FlowState, Resolution, SessionId, StepResult, SubmissionTicket};
pub use transcript::{EntryKind, TranscriptEntry, TranscriptLog};
