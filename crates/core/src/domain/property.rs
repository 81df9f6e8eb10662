use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::lead::LeadId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProperty {
    pub name: String,
    pub lead_id: LeadId,
    pub address: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub property_type: Option<String>,
    pub number_of_rooms: Option<u32>,
    pub has_pool: Option<bool>,
    pub active: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub id: PropertyId,
    pub name: String,
    pub lead_id: LeadId,
    pub address: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub property_type: Option<String>,
    pub number_of_rooms: Option<u32>,
    pub has_pool: Option<bool>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Property {
    pub fn from_new(id: PropertyId, property: NewProperty, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            name: property.name,
            lead_id: property.lead_id,
            address: property.address,
            city: property.city,
            country: property.country,
            property_type: property.property_type,
            number_of_rooms: property.number_of_rooms,
            has_pool: property.has_pool,
            active: property.active,
            created_at,
        }
    }
}
