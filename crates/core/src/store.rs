//! Primary persistence seam.
//!
//! The hosted backend is an opaque record store with fixed-schema collections.
//! Implementations live in `leadflow-db`; everything here is shared between
//! them so that selection rules behave identically across backends.

use std::cmp::Ordering as CmpOrdering;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::domain::application::{JobApplication, NewJobApplication};
use crate::domain::conversation::{ConversationMessage, NewConversationMessage};
use crate::domain::lead::{Lead, NewLead};
use crate::domain::property::{NewProperty, Property};
use crate::domain::report::{NewReport, Report};
use crate::domain::upload::FileUpload;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Lead,
    Property,
    JobApplication,
    Conversation,
    Report,
}

impl Collection {
    pub const ALL: [Collection; 5] = [
        Collection::Lead,
        Collection::Property,
        Collection::JobApplication,
        Collection::Conversation,
        Collection::Report,
    ];

    pub fn table(&self) -> &'static str {
        match self {
            Self::Lead => "lead",
            Self::Property => "property",
            Self::JobApplication => "job_application",
            Self::Conversation => "conversation",
            Self::Report => "report",
        }
    }

    /// Columns a `Selection` may filter or order on.
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Self::Lead => &[
                "id",
                "name",
                "email",
                "location",
                "message",
                "number_of_properties",
                "property_type",
                "source",
                "created_at",
            ],
            Self::Property => &[
                "id",
                "name",
                "lead_id",
                "address",
                "city",
                "country",
                "property_type",
                "number_of_rooms",
                "has_pool",
                "active",
                "created_at",
            ],
            Self::JobApplication => &[
                "id",
                "name",
                "email",
                "role_applied",
                "motivation",
                "linkedin_url",
                "resume_url",
                "source",
                "created_at",
            ],
            Self::Conversation => {
                &["id", "lead_id", "message", "is_from_user", "page_context", "created_at"]
            }
            Self::Report => &[
                "id",
                "property_id",
                "month",
                "revenue",
                "occupancy_rate",
                "maintenance_issues",
                "guest_rating",
                "number_of_bookings",
                "created_at",
            ],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    pub value: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ordering {
    pub field: String,
    pub direction: SortDirection,
}

/// Equality filters, an optional ordering and an optional limit.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub filters: Vec<Filter>,
    pub order: Option<Ordering>,
    pub limit: Option<u32>,
}

impl Selection {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn filter(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter { field: field.into(), value: value.into() });
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.order = Some(Ordering { field: field.into(), direction });
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn validate(&self, collection: Collection) -> Result<(), StoreError> {
        let columns = collection.columns();
        for filter in &self.filters {
            if !columns.contains(&filter.field.as_str()) {
                return Err(StoreError::InvalidSelection {
                    collection: collection.table(),
                    message: format!("unknown filter column `{}`", filter.field),
                });
            }
            if filter.value.is_array() || filter.value.is_object() {
                return Err(StoreError::InvalidSelection {
                    collection: collection.table(),
                    message: format!("filter on `{}` must be a scalar value", filter.field),
                });
            }
        }
        if let Some(order) = &self.order {
            if !columns.contains(&order.field.as_str()) {
                return Err(StoreError::InvalidSelection {
                    collection: collection.table(),
                    message: format!("unknown order column `{}`", order.field),
                });
            }
        }
        Ok(())
    }

    /// Applies the selection to already-materialised records. Used by stores
    /// that hold their rows in memory.
    pub fn apply<T>(&self, records: impl IntoIterator<Item = T>) -> Vec<T>
    where
        T: Serialize,
    {
        let mut rows = records
            .into_iter()
            .filter_map(|record| {
                let value = serde_json::to_value(&record).ok()?;
                self.matches(&value).then_some((value, record))
            })
            .collect::<Vec<_>>();

        if let Some(order) = &self.order {
            rows.sort_by(|(left, _), (right, _)| {
                let ordering = compare_values(
                    left.get(&order.field).unwrap_or(&Value::Null),
                    right.get(&order.field).unwrap_or(&Value::Null),
                );
                match order.direction {
                    SortDirection::Ascending => ordering,
                    SortDirection::Descending => ordering.reverse(),
                }
            });
        }

        let limit = self.limit.map(|limit| limit as usize).unwrap_or(usize::MAX);
        rows.into_iter().take(limit).map(|(_, record)| record).collect()
    }

    pub fn matches(&self, record: &Value) -> bool {
        self.filters.iter().all(|filter| {
            let actual = record.get(&filter.field).unwrap_or(&Value::Null);
            loosely_equal(actual, &filter.value)
        })
    }
}

fn loosely_equal(actual: &Value, expected: &Value) -> bool {
    if actual == expected {
        return true;
    }
    match (scalar_text(actual), scalar_text(expected)) {
        (Some(left), Some(right)) => left == right,
        _ => false,
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn compare_values(left: &Value, right: &Value) -> CmpOrdering {
    match (left, right) {
        (Value::Null, Value::Null) => CmpOrdering::Equal,
        (Value::Null, _) => CmpOrdering::Less,
        (_, Value::Null) => CmpOrdering::Greater,
        _ => match (numeric(left), numeric(right)) {
            (Some(left), Some(right)) => left.partial_cmp(&right).unwrap_or(CmpOrdering::Equal),
            _ => scalar_text(left).cmp(&scalar_text(right)),
        },
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.parse::<f64>().ok(),
        _ => None,
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("backend request failed: {0}")]
    Transport(String),
    #[error("backend returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("decode error: {0}")]
    Decode(String),
    #[error("invalid selection for `{collection}`: {message}")]
    InvalidSelection { collection: &'static str, message: String },
    #[error("no `{collection}` record was returned")]
    NotFound { collection: &'static str },
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("backend call timed out after {0:?}")]
    Timeout(Duration),
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert_lead(&self, lead: NewLead) -> Result<Lead, StoreError>;
    async fn insert_property(&self, property: NewProperty) -> Result<Property, StoreError>;
    async fn insert_job_application(
        &self,
        application: NewJobApplication,
    ) -> Result<JobApplication, StoreError>;
    async fn insert_conversation(
        &self,
        message: NewConversationMessage,
    ) -> Result<ConversationMessage, StoreError>;
    async fn insert_report(&self, report: NewReport) -> Result<Report, StoreError>;

    /// Stores an uploaded file and returns the URL it can be fetched from.
    async fn store_attachment(&self, upload: &FileUpload) -> Result<String, StoreError>;

    async fn select_leads(&self, selection: &Selection) -> Result<Vec<Lead>, StoreError>;
    async fn select_properties(&self, selection: &Selection) -> Result<Vec<Property>, StoreError>;
    async fn select_job_applications(
        &self,
        selection: &Selection,
    ) -> Result<Vec<JobApplication>, StoreError>;
    async fn select_conversations(
        &self,
        selection: &Selection,
    ) -> Result<Vec<ConversationMessage>, StoreError>;
    async fn select_reports(&self, selection: &Selection) -> Result<Vec<Report>, StoreError>;

    async fn count(&self, collection: Collection, selection: &Selection)
        -> Result<u64, StoreError>;
}

#[cfg(test)]
mod tests {
    use serde::Serialize;
    use serde_json::json;

    use super::{Collection, Selection, SortDirection, StoreError};

    #[derive(Clone, Debug, PartialEq, Serialize)]
    struct Row {
        id: &'static str,
        property_id: &'static str,
        month: &'static str,
        revenue: &'static str,
        active: bool,
    }

    fn rows() -> Vec<Row> {
        vec![
            Row { id: "r1", property_id: "p1", month: "2026-01", revenue: "900.00", active: true },
            Row { id: "r2", property_id: "p2", month: "2026-01", revenue: "50.00", active: false },
            Row { id: "r3", property_id: "p1", month: "2026-02", revenue: "1200.50", active: true },
            Row { id: "r4", property_id: "p1", month: "2026-03", revenue: "80.00", active: true },
        ]
    }

    #[test]
    fn equality_filters_and_limit_are_applied() {
        let selection = Selection::all().filter("property_id", "p1").limit(2);
        let selected = selection.apply(rows());

        assert_eq!(selected.iter().map(|row| row.id).collect::<Vec<_>>(), vec!["r1", "r3"]);
    }

    #[test]
    fn decimal_strings_order_numerically() {
        let selection = Selection::all().order_by("revenue", SortDirection::Descending);
        let selected = selection.apply(rows());

        assert_eq!(
            selected.iter().map(|row| row.id).collect::<Vec<_>>(),
            vec!["r3", "r1", "r4", "r2"]
        );
    }

    #[test]
    fn boolean_filter_matches_textual_value() {
        let selected = Selection::all().filter("active", "false").apply(rows());
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].id, "r2");

        let selected = Selection::all().filter("active", true).apply(rows());
        assert_eq!(selected.len(), 3);
    }

    #[test]
    fn unknown_columns_are_rejected_before_reaching_a_backend() {
        let error = Selection::all()
            .filter("name; DROP TABLE lead", "x")
            .validate(Collection::Lead)
            .expect_err("unknown column must be rejected");
        assert!(matches!(error, StoreError::InvalidSelection { collection: "lead", .. }));

        let error = Selection::all()
            .filter("email", json!(["a", "b"]))
            .validate(Collection::Lead)
            .expect_err("non-scalar filter must be rejected");
        assert!(error.to_string().contains("scalar"));

        assert!(Selection::all()
            .filter("property_id", "p1")
            .order_by("month", SortDirection::Ascending)
            .validate(Collection::Report)
            .is_ok());
    }
}
