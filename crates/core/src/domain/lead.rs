use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeadId(pub String);

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLead {
    pub name: String,
    pub email: String,
    pub location: Option<String>,
    pub message: Option<String>,
    pub number_of_properties: Option<u32>,
    pub property_type: Option<String>,
    #[serde(default, deserialize_with = "crate::domain::null_as_default")]
    pub platform_usage: Vec<String>,
    pub source: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lead {
    pub id: LeadId,
    pub name: String,
    pub email: String,
    pub location: Option<String>,
    pub message: Option<String>,
    pub number_of_properties: Option<u32>,
    pub property_type: Option<String>,
    #[serde(default, deserialize_with = "crate::domain::null_as_default")]
    pub platform_usage: Vec<String>,
    pub source: String,
    pub created_at: DateTime<Utc>,
}

impl Lead {
    pub fn from_new(id: LeadId, lead: NewLead, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            name: lead.name,
            email: lead.email,
            location: lead.location,
            message: lead.message,
            number_of_properties: lead.number_of_properties,
            property_type: lead.property_type,
            platform_usage: lead.platform_usage,
            source: lead.source,
            created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Lead;

    #[test]
    fn null_platform_usage_decodes_as_empty_list() {
        let lead: Lead = serde_json::from_value(serde_json::json!({
            "id": "6f1c",
            "name": "Ana",
            "email": "ana@x.com",
            "location": null,
            "message": null,
            "number_of_properties": 2,
            "property_type": "villa",
            "platform_usage": null,
            "source": "waitlist_chatbot",
            "created_at": "2026-03-01T10:00:00Z"
        }))
        .expect("lead row should decode");

        assert!(lead.platform_usage.is_empty());
        assert_eq!(lead.number_of_properties, Some(2));
    }
}
