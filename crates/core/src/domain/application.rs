use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobApplicationId(pub String);

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewJobApplication {
    pub name: String,
    pub email: String,
    pub role_applied: Option<String>,
    pub motivation: Option<String>,
    pub linkedin_url: Option<String>,
    pub resume_url: Option<String>,
    pub source: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobApplication {
    pub id: JobApplicationId,
    pub name: String,
    pub email: String,
    pub role_applied: Option<String>,
    pub motivation: Option<String>,
    pub linkedin_url: Option<String>,
    pub resume_url: Option<String>,
    pub source: String,
    pub created_at: DateTime<Utc>,
}

impl JobApplication {
    pub fn from_new(
        id: JobApplicationId,
        application: NewJobApplication,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name: application.name,
            email: application.email,
            role_applied: application.role_applied,
            motivation: application.motivation,
            linkedin_url: application.linkedin_url,
            resume_url: application.resume_url,
            source: application.source,
            created_at,
        }
    }
}
