//! Flow-type specific shaping of a finished record, applied once when the
//! engine enters `AwaitingSubmission`.

use crate::domain::application::NewJobApplication;
use crate::domain::lead::{LeadId, NewLead};
use crate::domain::property::NewProperty;
use crate::domain::upload::FileUpload;
use crate::flows::definition::{fields, FlowType};
use crate::flows::record::{FieldValue, PartialRecord};
use crate::flows::states::SessionId;
use crate::flows::transcript::{TranscriptEntry, TranscriptLog};
use crate::relay::RelayPayload;
use crate::submission::OutcomeKind;

pub const ANONYMOUS_IDENTITY: &str = "anonymous";
pub const DEFAULT_MAX_DEPENDENT_PROPERTIES: usize = 10;
pub const DEFAULT_CONTACT_EMAIL: &str = "hello@leadflow.example";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletionSettings {
    pub max_dependent_properties: usize,
    pub contact_email: String,
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            max_dependent_properties: DEFAULT_MAX_DEPENDENT_PROPERTIES,
            contact_email: DEFAULT_CONTACT_EMAIL.to_string(),
        }
    }
}

/// Property record waiting for its parent lead id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PropertyDraft {
    pub name: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub property_type: Option<String>,
}

impl PropertyDraft {
    pub fn into_new_property(self, lead_id: LeadId) -> NewProperty {
        NewProperty {
            name: self.name,
            lead_id,
            address: self.address,
            city: self.city,
            country: None,
            property_type: self.property_type,
            number_of_rooms: None,
            has_pool: None,
            active: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmissionPayload {
    Lead { lead: NewLead, properties: Vec<PropertyDraft> },
    JobApplication { application: NewJobApplication, resume: Option<FileUpload> },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmissionRequest {
    pub session_id: SessionId,
    pub correlation_id: String,
    pub flow_type: FlowType,
    /// Rate-limit key: the submitter's email, or `anonymous`.
    pub identity_key: String,
    pub payload: SubmissionPayload,
    /// Collected answers in step order, as displayed.
    pub fields: Vec<(String, String)>,
    pub transcript: Vec<TranscriptEntry>,
}

impl SubmissionRequest {
    pub fn transcript_summary(&self) -> String {
        self.transcript
            .iter()
            .map(|entry| {
                let speaker = if entry.originated_from_system { "Assistant" } else { "Visitor" };
                format!("{speaker}: {}", entry.text)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Flattened payload for the fallback relay.
    pub fn relay_payload(&self) -> RelayPayload {
        let mut payload = RelayPayload::default();
        let submitter = self
            .fields
            .iter()
            .find(|(key, _)| key == fields::NAME)
            .map(|(_, value)| value.as_str())
            .unwrap_or("website visitor");
        payload.push("_subject", format!("New {} submission from {submitter}", self.flow_type));
        payload.push("flow_type", self.flow_type.as_str());
        payload.push("source", self.flow_type.record_source());
        for (key, value) in &self.fields {
            payload.push(key.clone(), value.clone());
        }

        match &self.payload {
            SubmissionPayload::Lead { properties, .. } => {
                if !properties.is_empty() {
                    let names =
                        properties.iter().map(|draft| draft.name.as_str()).collect::<Vec<_>>();
                    payload.push("properties", names.join("; "));
                }
            }
            SubmissionPayload::JobApplication { resume, .. } => {
                if let Some(resume) = resume {
                    payload.attach(fields::RESUME, resume.clone());
                }
            }
        }

        payload.push("conversation", self.transcript_summary());
        payload
    }
}

pub fn build_request(
    flow_type: FlowType,
    record: &PartialRecord,
    transcript: &TranscriptLog,
    session_id: &SessionId,
    correlation_id: &str,
    settings: &CompletionSettings,
) -> SubmissionRequest {
    let identity_key = record
        .text(fields::EMAIL)
        .map(|email| email.trim().to_ascii_lowercase())
        .filter(|email| !email.is_empty())
        .unwrap_or_else(|| ANONYMOUS_IDENTITY.to_string());

    let fields = record
        .iter()
        .filter(|(_, value)| !matches!(value, FieldValue::File(_)))
        .map(|(key, value)| (key.as_str().to_string(), value.display()))
        .collect();

    SubmissionRequest {
        session_id: session_id.clone(),
        correlation_id: correlation_id.to_string(),
        flow_type,
        identity_key,
        payload: shape_payload(flow_type, record, settings),
        fields,
        transcript: transcript.entries().to_vec(),
    }
}

fn shape_payload(
    flow_type: FlowType,
    record: &PartialRecord,
    settings: &CompletionSettings,
) -> SubmissionPayload {
    let text = |field: &str| record.text(field).map(str::to_string);
    let name = text(fields::NAME).unwrap_or_default();
    let email = text(fields::EMAIL).unwrap_or_default();
    let property_type = text(fields::PROPERTY_TYPE);
    let cap = settings.max_dependent_properties;

    match flow_type {
        FlowType::Waitlist => SubmissionPayload::Lead {
            lead: NewLead {
                name,
                email,
                location: text(fields::LOCATION),
                message: text(fields::MESSAGE),
                property_type,
                source: flow_type.record_source().to_string(),
                ..NewLead::default()
            },
            properties: Vec::new(),
        },
        FlowType::Connect => SubmissionPayload::Lead {
            lead: NewLead {
                name,
                email,
                message: text(fields::HELP_MESSAGE),
                source: flow_type.record_source().to_string(),
                ..NewLead::default()
            },
            properties: Vec::new(),
        },
        FlowType::ManagementSignup => {
            let locations = split_locations(record.text(fields::LOCATIONS).unwrap_or_default());
            let platform_usage = match record.get(fields::PLATFORM_USAGE) {
                Some(FieldValue::Choice(options)) => options.clone(),
                Some(other) => vec![other.display()],
                None => Vec::new(),
            };
            let properties = locations
                .iter()
                .take(cap)
                .map(|location| PropertyDraft {
                    name: format!("Property in {location}"),
                    address: Some(location.clone()),
                    city: None,
                    property_type: property_type.clone(),
                })
                .collect();
            SubmissionPayload::Lead {
                lead: NewLead {
                    name,
                    email,
                    location: (!locations.is_empty()).then(|| locations.join("; ")),
                    message: text(fields::MESSAGE),
                    number_of_properties: u32::try_from(locations.len()).ok(),
                    property_type,
                    platform_usage,
                    source: flow_type.record_source().to_string(),
                },
                properties,
            }
        }
        FlowType::GeneralAssessment => {
            let stated = parse_property_count(record.text(fields::NUMBER_OF_PROPERTIES));
            let location = text(fields::LOCATION);
            let owner = if name.is_empty() { "Owner".to_string() } else { name.clone() };
            let properties = (1..=stated as usize)
                .take(cap)
                .map(|index| PropertyDraft {
                    name: format!("{owner} property {index}"),
                    address: None,
                    city: location.clone(),
                    property_type: property_type.clone(),
                })
                .collect();
            SubmissionPayload::Lead {
                lead: NewLead {
                    name,
                    email,
                    location,
                    message: text(fields::MESSAGE),
                    number_of_properties: Some(stated),
                    property_type,
                    source: flow_type.record_source().to_string(),
                    ..NewLead::default()
                },
                properties,
            }
        }
        FlowType::CareersApplication => {
            let motivation = match (text(fields::MOTIVATION), text(fields::ADDITIONAL_NOTES)) {
                (Some(motivation), Some(notes)) => {
                    Some(format!("{motivation}\n\nAdditional notes: {notes}"))
                }
                (Some(motivation), None) => Some(motivation),
                (None, Some(notes)) => Some(format!("Additional notes: {notes}")),
                (None, None) => None,
            };
            let resume = match record.get(fields::RESUME) {
                Some(FieldValue::File(upload)) => Some(upload.clone()),
                _ => None,
            };
            SubmissionPayload::JobApplication {
                application: NewJobApplication {
                    name,
                    email,
                    role_applied: text(fields::ROLE_APPLIED),
                    motivation,
                    linkedin_url: text(fields::LINKEDIN_URL),
                    resume_url: None,
                    source: flow_type.record_source().to_string(),
                },
                resume,
            }
        }
    }
}

/// Splits a free-text list of locations on newlines, commas and semicolons.
pub fn split_locations(text: &str) -> Vec<String> {
    let mut locations: Vec<String> = Vec::new();
    for item in text.split(['\n', ',', ';']).map(str::trim).filter(|item| !item.is_empty()) {
        if !locations.iter().any(|existing| existing.eq_ignore_ascii_case(item)) {
            locations.push(item.to_string());
        }
    }
    locations
}

/// Stated property count; a missing or non-numeric answer counts as one.
pub fn parse_property_count(value: Option<&str>) -> u32 {
    value.and_then(|value| value.trim().parse::<u32>().ok()).filter(|count| *count > 0).unwrap_or(1)
}

pub fn terminal_message(
    flow_type: FlowType,
    outcome: OutcomeKind,
    settings: &CompletionSettings,
) -> String {
    if outcome == OutcomeKind::Failed {
        return format!(
            "We're sorry, we couldn't send your details just now. Please email us at {} and we'll pick it up from there.",
            settings.contact_email
        );
    }

    match flow_type {
        FlowType::Waitlist => {
            "You're on the waitlist! We'll be in touch as soon as a spot opens up.".to_string()
        }
        FlowType::ManagementSignup => {
            "Thanks! Our onboarding team will reach out within one business day to get your properties set up."
                .to_string()
        }
        FlowType::Connect => {
            "Thanks for reaching out! A member of our team will get back to you shortly."
                .to_string()
        }
        FlowType::CareersApplication => {
            "Thank you for applying! Our hiring team will review your application and contact you if there's a match."
                .to_string()
        }
        FlowType::GeneralAssessment => {
            "Thanks! We'll prepare your property assessment and email it to you within 48 hours."
                .to_string()
        }
    }
}
