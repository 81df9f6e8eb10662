use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::property::PropertyId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReportId(pub String);

/// Monthly performance figures for one property. `month` is `YYYY-MM`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewReport {
    pub property_id: PropertyId,
    pub month: String,
    pub revenue: Decimal,
    pub occupancy_rate: Decimal,
    pub maintenance_issues: u32,
    pub guest_rating: Decimal,
    pub number_of_bookings: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub id: ReportId,
    pub property_id: PropertyId,
    pub month: String,
    pub revenue: Decimal,
    pub occupancy_rate: Decimal,
    pub maintenance_issues: u32,
    pub guest_rating: Decimal,
    pub number_of_bookings: u32,
    pub created_at: DateTime<Utc>,
}

impl Report {
    pub fn from_new(id: ReportId, report: NewReport, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            property_id: report.property_id,
            month: report.month,
            revenue: report.revenue,
            occupancy_rate: report.occupancy_rate,
            maintenance_issues: report.maintenance_issues,
            guest_rating: report.guest_rating,
            number_of_bookings: report.number_of_bookings,
            created_at,
        }
    }
}
