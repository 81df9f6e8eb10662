use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod fields {
    pub const NAME: &str = "name";
    pub const EMAIL: &str = "email";
    pub const LOCATION: &str = "location";
    pub const LOCATIONS: &str = "locations";
    pub const MESSAGE: &str = "message";
    pub const HELP_MESSAGE: &str = "help_message";
    pub const NUMBER_OF_PROPERTIES: &str = "number_of_properties";
    pub const PROPERTY_TYPE: &str = "property_type";
    pub const PLATFORM_USAGE: &str = "platform_usage";
    pub const ROLE_APPLIED: &str = "role_applied";
    pub const LINKEDIN_URL: &str = "linkedin_url";
    pub const MOTIVATION: &str = "motivation";
    pub const RESUME: &str = "resume";
    pub const ADDITIONAL_NOTES: &str = "additional_notes";
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FlowType {
    Waitlist,
    ManagementSignup,
    Connect,
    CareersApplication,
    GeneralAssessment,
}

/// Which backend collection a completed flow lands in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionTarget {
    Lead,
    JobApplication,
}

impl FlowType {
    pub const ALL: [FlowType; 5] = [
        FlowType::Waitlist,
        FlowType::ManagementSignup,
        FlowType::Connect,
        FlowType::CareersApplication,
        FlowType::GeneralAssessment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waitlist => "waitlist",
            Self::ManagementSignup => "management-signup",
            Self::Connect => "connect",
            Self::CareersApplication => "careers-application",
            Self::GeneralAssessment => "general-assessment",
        }
    }

    pub fn target(&self) -> SubmissionTarget {
        match self {
            Self::CareersApplication => SubmissionTarget::JobApplication,
            Self::Waitlist | Self::ManagementSignup | Self::Connect | Self::GeneralAssessment => {
                SubmissionTarget::Lead
            }
        }
    }

    /// Value written to the `source` column of the stored record.
    pub fn record_source(&self) -> &'static str {
        match self {
            Self::Waitlist => "waitlist_chatbot",
            Self::ManagementSignup => "management_signup_chatbot",
            Self::Connect => "connect_chatbot",
            Self::CareersApplication => "careers_chatbot",
            Self::GeneralAssessment => "assessment_chatbot",
        }
    }
}

impl fmt::Display for FlowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FlowType {
    type Err = DefinitionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace('_', "-");
        FlowType::ALL
            .into_iter()
            .find(|flow_type| flow_type.as_str() == normalized)
            .ok_or_else(|| DefinitionError::UnknownFlowType(value.trim().to_string()))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldKey(pub String);

impl FieldKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum InputKind {
    TextLine,
    TextBlock,
    Choice { options: Vec<String>, multiple: bool },
    File,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Validator {
    Name,
    Email,
    Url,
    PositiveInteger,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowStep {
    pub field: FieldKey,
    pub prompt: String,
    pub input_kind: InputKind,
    pub validator: Option<Validator>,
    pub optional: bool,
}

impl FlowStep {
    pub fn text_line(field: &str, prompt: &str) -> Self {
        Self::new(field, prompt, InputKind::TextLine)
    }

    pub fn text_block(field: &str, prompt: &str) -> Self {
        Self::new(field, prompt, InputKind::TextBlock)
    }

    pub fn choice(field: &str, prompt: &str, options: &[&str]) -> Self {
        Self::new(
            field,
            prompt,
            InputKind::Choice {
                options: options.iter().map(|option| option.to_string()).collect(),
                multiple: false,
            },
        )
    }

    pub fn multi_choice(field: &str, prompt: &str, options: &[&str]) -> Self {
        Self::new(
            field,
            prompt,
            InputKind::Choice {
                options: options.iter().map(|option| option.to_string()).collect(),
                multiple: true,
            },
        )
    }

    pub fn file(field: &str, prompt: &str) -> Self {
        Self::new(field, prompt, InputKind::File)
    }

    fn new(field: &str, prompt: &str, input_kind: InputKind) -> Self {
        Self {
            field: FieldKey::new(field),
            prompt: prompt.to_string(),
            input_kind,
            validator: None,
            optional: false,
        }
    }

    pub fn validated(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DefinitionError {
    #[error("flow `{0}` must declare at least one step")]
    Empty(FlowType),
    #[error("flow `{flow_type}` declares field `{field}` more than once")]
    DuplicateField { flow_type: FlowType, field: FieldKey },
    #[error("flow `{flow_type}` choice step `{field}` has no options")]
    ChoiceWithoutOptions { flow_type: FlowType, field: FieldKey },
    #[error("unknown flow type `{0}`")]
    UnknownFlowType(String),
}

/// Ordered steps for one flow type. Construction rejects definitions that
/// could never complete, so the engine never meets an empty flow at runtime.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FlowDefinition {
    flow_type: FlowType,
    steps: Vec<FlowStep>,
}

impl FlowDefinition {
    pub fn new(flow_type: FlowType, steps: Vec<FlowStep>) -> Result<Self, DefinitionError> {
        if steps.is_empty() {
            return Err(DefinitionError::Empty(flow_type));
        }

        let mut seen = BTreeSet::new();
        for step in &steps {
            if !seen.insert(step.field.clone()) {
                return Err(DefinitionError::DuplicateField {
                    flow_type,
                    field: step.field.clone(),
                });
            }
            if let InputKind::Choice { options, .. } = &step.input_kind {
                if options.is_empty() {
                    return Err(DefinitionError::ChoiceWithoutOptions {
                        flow_type,
                        field: step.field.clone(),
                    });
                }
            }
        }

        Ok(Self { flow_type, steps })
    }

    pub fn flow_type(&self) -> FlowType {
        self.flow_type
    }

    pub fn steps(&self) -> &[FlowStep] {
        &self.steps
    }

    pub fn step(&self, index: usize) -> Option<&FlowStep> {
        self.steps.get(index)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

const PROPERTY_TYPES: &[&str] = &["Apartment", "Villa", "House", "Guesthouse", "Other"];
const PLATFORMS: &[&str] = &["Airbnb", "Booking.com", "Vrbo", "Direct bookings", "None yet"];
const ROLES: &[&str] = &[
    "Property Manager",
    "Guest Experience Specialist",
    "Operations Coordinator",
    "Maintenance Technician",
    "Software Engineer",
    "Other",
];

#[derive(Clone, Debug)]
pub struct FlowCatalog {
    definitions: BTreeMap<FlowType, Arc<FlowDefinition>>,
}

impl FlowCatalog {
    pub fn empty() -> Self {
        Self { definitions: BTreeMap::new() }
    }

    pub fn with_definition(mut self, definition: FlowDefinition) -> Self {
        self.definitions.insert(definition.flow_type(), Arc::new(definition));
        self
    }

    pub fn get(&self, flow_type: FlowType) -> Option<Arc<FlowDefinition>> {
        self.definitions.get(&flow_type).cloned()
    }

    pub fn flow_types(&self) -> impl Iterator<Item = FlowType> + '_ {
        self.definitions.keys().copied()
    }

    pub fn builtin() -> Result<Self, DefinitionError> {
        use fields::*;

        let waitlist = FlowDefinition::new(
            FlowType::Waitlist,
            vec![
                FlowStep::text_line(NAME, "Hi there! What's your name?").validated(Validator::Name),
                FlowStep::text_line(EMAIL, "Thanks! Which email should we use to reach you?")
                    .validated(Validator::Email),
                FlowStep::text_line(LOCATION, "Where is your property located?").optional(),
                FlowStep::choice(PROPERTY_TYPE, "What kind of property is it?", PROPERTY_TYPES)
                    .optional(),
                FlowStep::text_block(MESSAGE, "Anything else you'd like us to know?").optional(),
            ],
        )?;

        let management_signup = FlowDefinition::new(
            FlowType::ManagementSignup,
            vec![
                FlowStep::text_line(NAME, "Let's get your properties set up. What's your name?")
                    .validated(Validator::Name),
                FlowStep::text_line(EMAIL, "What's the best email to reach you?")
                    .validated(Validator::Email),
                FlowStep::text_block(
                    LOCATIONS,
                    "Where are your properties? List one location per line or separate them with commas.",
                ),
                FlowStep::choice(PROPERTY_TYPE, "What type of properties are they?", PROPERTY_TYPES),
                FlowStep::multi_choice(
                    PLATFORM_USAGE,
                    "Which booking platforms do you currently use?",
                    PLATFORMS,
                )
                .optional(),
                FlowStep::text_block(MESSAGE, "Anything else we should know before we call you?")
                    .optional(),
            ],
        )?;

        let connect = FlowDefinition::new(
            FlowType::Connect,
            vec![
                FlowStep::text_line(NAME, "Happy to connect! What's your name?")
                    .validated(Validator::Name),
                FlowStep::text_line(EMAIL, "What's your email address?")
                    .validated(Validator::Email),
                FlowStep::text_block(HELP_MESSAGE, "How can we help you?"),
            ],
        )?;

        let careers = FlowDefinition::new(
            FlowType::CareersApplication,
            vec![
                FlowStep::text_line(NAME, "Thanks for your interest in joining us! What's your full name?")
                    .validated(Validator::Name),
                FlowStep::text_line(EMAIL, "What's your email address?")
                    .validated(Validator::Email),
                FlowStep::choice(ROLE_APPLIED, "Which role are you applying for?", ROLES),
                FlowStep::text_line(LINKEDIN_URL, "Share your LinkedIn profile URL, or skip.")
                    .validated(Validator::Url)
                    .optional(),
                FlowStep::text_block(MOTIVATION, "Why would you like to work with us?"),
                FlowStep::file(RESUME, "Attach your resume (PDF, DOC or DOCX, up to 10 MB), or skip.")
                    .optional(),
                FlowStep::text_block(ADDITIONAL_NOTES, "Anything else you'd like to add?")
                    .optional(),
            ],
        )?;

        let assessment = FlowDefinition::new(
            FlowType::GeneralAssessment,
            vec![
                FlowStep::text_line(NAME, "Let's assess your rental potential. What's your name?")
                    .validated(Validator::Name),
                FlowStep::text_line(EMAIL, "Where should we send the assessment?")
                    .validated(Validator::Email),
                FlowStep::text_line(LOCATION, "Which city or area are your properties in?")
                    .optional(),
                FlowStep::text_line(NUMBER_OF_PROPERTIES, "How many properties do you own?")
                    .validated(Validator::PositiveInteger),
                FlowStep::choice(PROPERTY_TYPE, "What type of properties are they?", PROPERTY_TYPES),
                FlowStep::text_block(MESSAGE, "Any goals or questions for our team?").optional(),
            ],
        )?;

        Ok(Self::empty()
            .with_definition(waitlist)
            .with_definition(management_signup)
            .with_definition(connect)
            .with_definition(careers)
            .with_definition(assessment))
    }
}

#[cfg(test)]
mod tests {
    use super::{
        fields, DefinitionError, FlowCatalog, FlowDefinition, FlowStep, FlowType,
        SubmissionTarget,
    };

    #[test]
    fn builtin_catalog_covers_every_flow_type() {
        let catalog = FlowCatalog::builtin().expect("builtin definitions are valid");
        for flow_type in FlowType::ALL {
            let definition = catalog.get(flow_type).expect("definition registered");
            assert!(!definition.is_empty());
            assert_eq!(definition.flow_type(), flow_type);
        }
    }

    #[test]
    fn empty_definition_is_rejected_at_construction() {
        let error = FlowDefinition::new(FlowType::Connect, Vec::new())
            .expect_err("empty definition must be rejected");
        assert_eq!(error, DefinitionError::Empty(FlowType::Connect));
    }

    #[test]
    fn duplicate_fields_and_empty_choices_are_rejected() {
        let error = FlowDefinition::new(
            FlowType::Waitlist,
            vec![
                FlowStep::text_line(fields::NAME, "Name?"),
                FlowStep::text_line(fields::NAME, "Name again?"),
            ],
        )
        .expect_err("duplicate field must be rejected");
        assert!(matches!(error, DefinitionError::DuplicateField { .. }));

        let error = FlowDefinition::new(
            FlowType::Waitlist,
            vec![FlowStep::choice(fields::PROPERTY_TYPE, "Type?", &[])],
        )
        .expect_err("choice without options must be rejected");
        assert!(matches!(error, DefinitionError::ChoiceWithoutOptions { .. }));
    }

    #[test]
    fn flow_type_parses_from_kebab_or_snake_case() {
        assert_eq!("careers-application".parse::<FlowType>(), Ok(FlowType::CareersApplication));
        assert_eq!(" Management_Signup ".parse::<FlowType>(), Ok(FlowType::ManagementSignup));
        assert!(matches!(
            "newsletter".parse::<FlowType>(),
            Err(DefinitionError::UnknownFlowType(ref value)) if value == "newsletter"
        ));
    }

    #[test]
    fn only_careers_targets_job_applications() {
        for flow_type in FlowType::ALL {
            let expected = if flow_type == FlowType::CareersApplication {
                SubmissionTarget::JobApplication
            } else {
                SubmissionTarget::Lead
            };
            assert_eq!(flow_type.target(), expected);
        }
    }
}
