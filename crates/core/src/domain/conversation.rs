use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::lead::LeadId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewConversationMessage {
    pub lead_id: Option<LeadId>,
    pub message: String,
    pub is_from_user: bool,
    pub page_context: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub id: ConversationId,
    pub lead_id: Option<LeadId>,
    pub message: String,
    pub is_from_user: bool,
    pub page_context: String,
    pub created_at: DateTime<Utc>,
}

impl ConversationMessage {
    pub fn from_new(
        id: ConversationId,
        message: NewConversationMessage,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            lead_id: message.lead_id,
            message: message.message,
            is_from_user: message.is_from_user,
            page_context: message.page_context,
            created_at,
        }
    }
}
