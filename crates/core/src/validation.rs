//! Field constraints applied before a step is accepted.
//!
//! Every check is pure. The required check always runs first: an empty
//! optional field short-circuits to "accepted, nothing recorded".

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::domain::upload::FileUpload;
use crate::flows::definition::{FlowStep, InputKind, Validator};
use crate::flows::record::{FieldValue, StepInput};

pub const DEFAULT_MAX_TEXT_LEN: usize = 2_000;
pub const DEFAULT_MAX_NAME_LEN: usize = 100;
pub const DEFAULT_MAX_FILE_BYTES: u64 = 10 * 1024 * 1024;
pub const DEFAULT_MAX_FILENAME_LEN: usize = 100;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationLimits {
    pub max_text_len: usize,
    pub max_name_len: usize,
    pub max_file_bytes: u64,
    pub allowed_file_extensions: Vec<String>,
    pub max_filename_len: usize,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            max_text_len: DEFAULT_MAX_TEXT_LEN,
            max_name_len: DEFAULT_MAX_NAME_LEN,
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            allowed_file_extensions: vec!["pdf".to_string(), "doc".to_string(), "docx".to_string()],
            max_filename_len: DEFAULT_MAX_FILENAME_LEN,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "code")]
pub enum ValidationError {
    #[error("`{field}` is required")]
    MissingRequired { field: String },
    #[error("`{field}` has an invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
    #[error("`{field}` is longer than {max} characters")]
    TooLong { field: String, max: usize },
    #[error("`{field}` contains unsupported characters")]
    InvalidCharacters { field: String },
    #[error("`{field}` is larger than {max_bytes} bytes")]
    FileTooLarge { field: String, max_bytes: u64 },
    #[error("`{field}` has unsupported file type `{file_type}`")]
    UnsupportedType { field: String, file_type: String },
}

impl ValidationError {
    pub fn field(&self) -> &str {
        match self {
            Self::MissingRequired { field }
            | Self::InvalidFormat { field, .. }
            | Self::TooLong { field, .. }
            | Self::InvalidCharacters { field }
            | Self::FileTooLarge { field, .. }
            | Self::UnsupportedType { field, .. } => field,
        }
    }

    /// Inline message shown to the visitor in the transcript.
    pub fn user_message(&self) -> String {
        match self {
            Self::MissingRequired { .. } => {
                "This one is required. Please enter a response to continue.".to_string()
            }
            Self::InvalidFormat { reason, .. } => format!("That doesn't look right: {reason}."),
            Self::TooLong { max, .. } => {
                format!("That's a bit long. Please keep it under {max} characters.")
            }
            Self::InvalidCharacters { .. } => {
                "Please use only letters, spaces, apostrophes and hyphens.".to_string()
            }
            Self::FileTooLarge { max_bytes, .. } => {
                format!("That file is too large. The limit is {} MB.", max_bytes / (1024 * 1024))
            }
            Self::UnsupportedType { .. } => {
                "That file type isn't supported. Please upload a PDF, DOC or DOCX file."
                    .to_string()
            }
        }
    }
}

/// Validates `input` against `step`. `Ok(None)` means an optional step was
/// left empty and no value should be recorded.
pub fn validate_step(
    step: &FlowStep,
    input: &StepInput,
    limits: &ValidationLimits,
) -> Result<Option<FieldValue>, ValidationError> {
    let field = step.field.as_str();

    if input.is_blank() {
        return if step.optional {
            Ok(None)
        } else {
            Err(ValidationError::MissingRequired { field: field.to_string() })
        };
    }

    match (&step.input_kind, input) {
        (InputKind::File, StepInput::File(upload)) => {
            check_file(field, upload, limits)?;
            Ok(Some(FieldValue::File(upload.clone())))
        }
        (InputKind::File, StepInput::Text(_)) => Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "expected a file attachment".to_string(),
        }),
        (_, StepInput::File(_)) => Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "expected a text answer".to_string(),
        }),
        (InputKind::Choice { options, multiple }, StepInput::Text(text)) => {
            check_length(field, text, limits.max_text_len)?;
            let chosen = check_choice(field, text, options, *multiple)?;
            Ok(Some(FieldValue::Choice(chosen)))
        }
        (InputKind::TextLine | InputKind::TextBlock, StepInput::Text(text)) => {
            let value = text.trim();
            let max_len = match step.validator {
                Some(Validator::Name) => limits.max_name_len,
                _ => limits.max_text_len,
            };
            check_length(field, value, max_len)?;
            match step.validator {
                Some(Validator::Name) => check_name_characters(field, value)?,
                Some(Validator::Email) => check_email(field, value)?,
                Some(Validator::Url) => check_url(field, value)?,
                Some(Validator::PositiveInteger) => {
                    check_positive_integer(field, value)?;
                }
                None => {}
            }
            Ok(Some(FieldValue::Text(value.to_string())))
        }
    }
}

pub fn check_required(field: &str, value: &str, optional: bool) -> Result<(), ValidationError> {
    if !optional && value.trim().is_empty() {
        return Err(ValidationError::MissingRequired { field: field.to_string() });
    }
    Ok(())
}

fn email_pattern() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(r"^[^\s@]+@[^\s@.]+(\.[^\s@.]+)+$").expect("email pattern is valid")
    })
}

pub fn check_email(field: &str, value: &str) -> Result<(), ValidationError> {
    if email_pattern().is_match(value.trim()) {
        Ok(())
    } else {
        Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "please enter a valid email address".to_string(),
        })
    }
}

pub fn check_url(field: &str, value: &str) -> Result<(), ValidationError> {
    let invalid = || ValidationError::InvalidFormat {
        field: field.to_string(),
        reason: "please enter a full link starting with http:// or https://".to_string(),
    };

    let parsed = Url::parse(value.trim()).map_err(|_| invalid())?;
    let supported_scheme = matches!(parsed.scheme(), "http" | "https");
    let has_host = parsed.host_str().map(|host| !host.is_empty()).unwrap_or(false);
    if supported_scheme && has_host {
        Ok(())
    } else {
        Err(invalid())
    }
}

pub fn check_length(field: &str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.trim().chars().count() > max {
        return Err(ValidationError::TooLong { field: field.to_string(), max });
    }
    Ok(())
}

pub fn check_name_characters(field: &str, value: &str) -> Result<(), ValidationError> {
    let allowed = value
        .trim()
        .chars()
        .all(|ch| ch.is_alphabetic() || matches!(ch, ' ' | '\'' | '\u{2019}' | '-'));
    if allowed {
        Ok(())
    } else {
        Err(ValidationError::InvalidCharacters { field: field.to_string() })
    }
}

pub fn check_positive_integer(field: &str, value: &str) -> Result<u32, ValidationError> {
    match value.trim().parse::<u32>() {
        Ok(parsed) if parsed > 0 => Ok(parsed),
        _ => Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "please enter a whole number, like 3".to_string(),
        }),
    }
}

/// Matches `value` against `options` case-insensitively and returns the
/// canonical spelling. Multi-choice answers are comma separated.
pub fn check_choice(
    field: &str,
    value: &str,
    options: &[String],
    multiple: bool,
) -> Result<Vec<String>, ValidationError> {
    let items: Vec<&str> = if multiple {
        value.split(',').map(str::trim).filter(|item| !item.is_empty()).collect()
    } else {
        vec![value.trim()]
    };

    let mut chosen = Vec::with_capacity(items.len());
    for item in items {
        let Some(option) = options.iter().find(|option| option.eq_ignore_ascii_case(item)) else {
            return Err(ValidationError::InvalidFormat {
                field: field.to_string(),
                reason: format!("please choose one of: {}", options.join(", ")),
            });
        };
        if !chosen.contains(option) {
            chosen.push(option.clone());
        }
    }

    if chosen.is_empty() {
        return Err(ValidationError::MissingRequired { field: field.to_string() });
    }
    Ok(chosen)
}

pub fn check_file(
    field: &str,
    upload: &FileUpload,
    limits: &ValidationLimits,
) -> Result<(), ValidationError> {
    if upload.size_bytes() > limits.max_file_bytes {
        return Err(ValidationError::FileTooLarge {
            field: field.to_string(),
            max_bytes: limits.max_file_bytes,
        });
    }

    let extension = upload.extension().unwrap_or_default();
    let extension_allowed =
        limits.allowed_file_extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(&extension));
    if !extension_allowed {
        let file_type = if extension.is_empty() { "unknown".to_string() } else { extension };
        return Err(ValidationError::UnsupportedType { field: field.to_string(), file_type });
    }

    let content_type = upload.content_type.trim().to_ascii_lowercase();
    let content_type = content_type.split(';').next().unwrap_or_default().trim();
    let generic = content_type.is_empty() || content_type == "application/octet-stream";
    if !generic && mime_for_extension(&extension).map(|mime| mime != content_type).unwrap_or(true)
    {
        return Err(ValidationError::UnsupportedType {
            field: field.to_string(),
            file_type: content_type.to_string(),
        });
    }

    Ok(())
}

pub fn mime_for_extension(extension: &str) -> Option<&'static str> {
    match extension.to_ascii_lowercase().as_str() {
        "pdf" => Some("application/pdf"),
        "doc" => Some("application/msword"),
        "docx" => Some("application/vnd.openxmlformats-officedocument.wordprocessingml.document"),
        _ => None,
    }
}
