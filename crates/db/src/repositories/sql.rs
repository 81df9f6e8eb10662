use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::query::Query;
use sqlx::sqlite::SqliteRow;
use sqlx::{Database, Row, Sqlite};
use tracing::debug;
use uuid::Uuid;

use leadflow_core::domain::application::{JobApplication, JobApplicationId, NewJobApplication};
use leadflow_core::domain::conversation::{
    ConversationId, ConversationMessage, NewConversationMessage,
};
use leadflow_core::domain::lead::{Lead, LeadId, NewLead};
use leadflow_core::domain::property::{NewProperty, Property, PropertyId};
use leadflow_core::domain::report::{NewReport, Report, ReportId};
use leadflow_core::domain::upload::FileUpload;
use leadflow_core::store::{Collection, RecordStore, Selection, SortDirection, StoreError};

use super::RepositoryError;
use crate::DbPool;

const ATTACHMENT_SCHEME: &str = "attachment://";

/// SQLite-backed record store. Decimals are kept as TEXT, timestamps as
/// RFC 3339 strings with microsecond precision and lists as JSON TEXT.
#[derive(Clone)]
pub struct SqlRecordStore {
    pool: DbPool,
}

impl SqlRecordStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Loads an attachment previously returned by `store_attachment`.
    pub async fn load_attachment(&self, url: &str) -> Result<Option<FileUpload>, StoreError> {
        let Some(id) = url
            .strip_prefix(ATTACHMENT_SCHEME)
            .and_then(|rest| rest.split('/').next())
            .filter(|id| !id.is_empty())
        else {
            return Ok(None);
        };

        let row = sqlx::query(
            "SELECT file_name, content_type, content FROM attachment WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(FileUpload {
            file_name: row.try_get("file_name").map_err(RepositoryError::from)?,
            content_type: row.try_get("content_type").map_err(RepositoryError::from)?,
            bytes: row.try_get("content").map_err(RepositoryError::from)?,
        }))
    }

    async fn save_lead(&self, lead: &Lead) -> Result<(), RepositoryError> {
        let platform_usage = serde_json::to_string(&lead.platform_usage)
            .map_err(|error| RepositoryError::Decode(format!("platform_usage: {error}")))?;

        sqlx::query(
            "INSERT INTO lead (
                id, name, email, location, message, number_of_properties,
                property_type, platform_usage, source, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&lead.id.0)
        .bind(&lead.name)
        .bind(&lead.email)
        .bind(&lead.location)
        .bind(&lead.message)
        .bind(lead.number_of_properties.map(i64::from))
        .bind(&lead.property_type)
        .bind(platform_usage)
        .bind(&lead.source)
        .bind(format_timestamp(&lead.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_property(&self, property: &Property) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO property (
                id, name, lead_id, address, city, country, property_type,
                number_of_rooms, has_pool, active, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&property.id.0)
        .bind(&property.name)
        .bind(&property.lead_id.0)
        .bind(&property.address)
        .bind(&property.city)
        .bind(&property.country)
        .bind(&property.property_type)
        .bind(property.number_of_rooms.map(i64::from))
        .bind(property.has_pool)
        .bind(property.active)
        .bind(format_timestamp(&property.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_job_application(
        &self,
        application: &JobApplication,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO job_application (
                id, name, email, role_applied, motivation, linkedin_url,
                resume_url, source, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&application.id.0)
        .bind(&application.name)
        .bind(&application.email)
        .bind(&application.role_applied)
        .bind(&application.motivation)
        .bind(&application.linkedin_url)
        .bind(&application.resume_url)
        .bind(&application.source)
        .bind(format_timestamp(&application.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_conversation(
        &self,
        message: &ConversationMessage,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO conversation (
                id, lead_id, message, is_from_user, page_context, created_at
            ) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&message.id.0)
        .bind(message.lead_id.as_ref().map(|id| id.0.as_str()))
        .bind(&message.message)
        .bind(message.is_from_user)
        .bind(&message.page_context)
        .bind(format_timestamp(&message.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_report(&self, report: &Report) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO report (
                id, property_id, month, revenue, occupancy_rate, maintenance_issues,
                guest_rating, number_of_bookings, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&report.id.0)
        .bind(&report.property_id.0)
        .bind(&report.month)
        .bind(report.revenue.to_string())
        .bind(report.occupancy_rate.to_string())
        .bind(i64::from(report.maintenance_issues))
        .bind(report.guest_rating.to_string())
        .bind(i64::from(report.number_of_bookings))
        .bind(format_timestamp(&report.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_attachment(&self, id: &str, upload: &FileUpload) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO attachment (id, file_name, content_type, content, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(&upload.file_name)
        .bind(&upload.content_type)
        .bind(&upload.bytes)
        .bind(format_timestamp(&created_now()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fetch_rows(
        &self,
        collection: Collection,
        selection: &Selection,
    ) -> Result<Vec<SqliteRow>, StoreError> {
        let statement = SelectStatement::build(collection, selection, "*")?;
        debug!(
            event_name = "store.select",
            collection = collection.table(),
            filters = selection.filters.len(),
            "selecting records"
        );
        let rows = statement
            .bind(sqlx::query(&statement.sql))
            .fetch_all(&self.pool)
            .await
            .map_err(RepositoryError::from)?;
        Ok(rows)
    }
}

#[async_trait]
impl RecordStore for SqlRecordStore {
    async fn insert_lead(&self, lead: NewLead) -> Result<Lead, StoreError> {
        let lead = Lead::from_new(LeadId(Uuid::new_v4().to_string()), lead, created_now());
        self.save_lead(&lead).await?;
        Ok(lead)
    }

    async fn insert_property(&self, property: NewProperty) -> Result<Property, StoreError> {
        let property =
            Property::from_new(PropertyId(Uuid::new_v4().to_string()), property, created_now());
        self.save_property(&property).await?;
        Ok(property)
    }

    async fn insert_job_application(
        &self,
        application: NewJobApplication,
    ) -> Result<JobApplication, StoreError> {
        let application = JobApplication::from_new(
            JobApplicationId(Uuid::new_v4().to_string()),
            application,
            created_now(),
        );
        self.save_job_application(&application).await?;
        Ok(application)
    }

    async fn insert_conversation(
        &self,
        message: NewConversationMessage,
    ) -> Result<ConversationMessage, StoreError> {
        let message = ConversationMessage::from_new(
            ConversationId(Uuid::new_v4().to_string()),
            message,
            created_now(),
        );
        self.save_conversation(&message).await?;
        Ok(message)
    }

    async fn insert_report(&self, report: NewReport) -> Result<Report, StoreError> {
        let report = Report::from_new(ReportId(Uuid::new_v4().to_string()), report, created_now());
        self.save_report(&report).await?;
        Ok(report)
    }

    async fn store_attachment(&self, upload: &FileUpload) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        self.save_attachment(&id, upload).await?;
        Ok(format!("{ATTACHMENT_SCHEME}{id}/{}", upload.file_name))
    }

    async fn select_leads(&self, selection: &Selection) -> Result<Vec<Lead>, StoreError> {
        let rows = self.fetch_rows(Collection::Lead, selection).await?;
        Ok(rows.iter().map(lead_from_row).collect::<Result<Vec<_>, RepositoryError>>()?)
    }

    async fn select_properties(&self, selection: &Selection) -> Result<Vec<Property>, StoreError> {
        let rows = self.fetch_rows(Collection::Property, selection).await?;
        Ok(rows.iter().map(property_from_row).collect::<Result<Vec<_>, RepositoryError>>()?)
    }

    async fn select_job_applications(
        &self,
        selection: &Selection,
    ) -> Result<Vec<JobApplication>, StoreError> {
        let rows = self.fetch_rows(Collection::JobApplication, selection).await?;
        Ok(rows.iter().map(job_application_from_row).collect::<Result<Vec<_>, RepositoryError>>()?)
    }

    async fn select_conversations(
        &self,
        selection: &Selection,
    ) -> Result<Vec<ConversationMessage>, StoreError> {
        let rows = self.fetch_rows(Collection::Conversation, selection).await?;
        Ok(rows.iter().map(conversation_from_row).collect::<Result<Vec<_>, RepositoryError>>()?)
    }

    async fn select_reports(&self, selection: &Selection) -> Result<Vec<Report>, StoreError> {
        let rows = self.fetch_rows(Collection::Report, selection).await?;
        Ok(rows.iter().map(report_from_row).collect::<Result<Vec<_>, RepositoryError>>()?)
    }

    async fn count(&self, collection: Collection, selection: &Selection) -> Result<u64, StoreError> {
        let inner = SelectStatement::build(collection, selection, "1")?;
        let statement = SelectStatement {
            sql: format!("SELECT COUNT(*) AS count FROM ({})", inner.sql),
            binds: inner.binds,
        };
        let count = statement
            .bind(sqlx::query(&statement.sql))
            .fetch_one(&self.pool)
            .await
            .map_err(RepositoryError::from)?
            .try_get::<i64, _>("count")
            .map_err(RepositoryError::from)?;
        Ok(u64::try_from(count).unwrap_or_default())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ColumnKind {
    Text,
    Integer,
    Boolean,
    Decimal,
}

impl ColumnKind {
    fn of(collection: Collection, column: &str) -> Self {
        match (collection, column) {
            (Collection::Lead, "number_of_properties")
            | (Collection::Property, "number_of_rooms")
            | (Collection::Report, "maintenance_issues" | "number_of_bookings") => Self::Integer,
            (Collection::Property, "has_pool" | "active")
            | (Collection::Conversation, "is_from_user") => Self::Boolean,
            (Collection::Report, "revenue" | "occupancy_rate" | "guest_rating") => Self::Decimal,
            _ => Self::Text,
        }
    }

    /// Column expression used in WHERE and ORDER BY. Decimal TEXT columns
    /// compare numerically.
    fn expression(self, column: &str) -> String {
        match self {
            Self::Decimal => format!("CAST({column} AS REAL)"),
            _ => column.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Bind {
    Text(String),
    Integer(i64),
    Real(f64),
}

impl Bind {
    /// Converts a filter value to the column's storage type. `None` means the
    /// filter tests for NULL.
    fn coerce(kind: ColumnKind, value: &Value) -> Option<Self> {
        let text = match value {
            Value::Null => return None,
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };

        let coerced = match kind {
            ColumnKind::Text => None,
            ColumnKind::Integer => text.trim().parse::<i64>().ok().map(Self::Integer),
            ColumnKind::Boolean => match text.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Some(Self::Integer(1)),
                "false" | "0" => Some(Self::Integer(0)),
                _ => None,
            },
            ColumnKind::Decimal => text.trim().parse::<f64>().ok().map(Self::Real),
        };
        Some(coerced.unwrap_or(Self::Text(text)))
    }
}

/// Parameterised SELECT built from an already validated `Selection`. Column
/// names come from the collection allow-list; values are always bound.
#[derive(Debug)]
struct SelectStatement {
    sql: String,
    binds: Vec<Bind>,
}

impl SelectStatement {
    fn build(
        collection: Collection,
        selection: &Selection,
        projection: &str,
    ) -> Result<Self, StoreError> {
        selection.validate(collection)?;

        let mut sql = format!("SELECT {projection} FROM {}", collection.table());
        let mut binds = Vec::new();
        let mut clauses = Vec::new();

        for filter in &selection.filters {
            let kind = ColumnKind::of(collection, &filter.field);
            match Bind::coerce(kind, &filter.value) {
                None => clauses.push(format!("{} IS NULL", filter.field)),
                Some(bind @ Bind::Text(_)) => {
                    clauses.push(format!("{} = ?", filter.field));
                    binds.push(bind);
                }
                Some(bind) => {
                    clauses.push(format!("{} = ?", kind.expression(&filter.field)));
                    binds.push(bind);
                }
            }
        }

        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        match &selection.order {
            Some(order) => {
                let kind = ColumnKind::of(collection, &order.field);
                let direction = match order.direction {
                    SortDirection::Ascending => "ASC",
                    SortDirection::Descending => "DESC",
                };
                sql.push_str(&format!(
                    " ORDER BY {} {direction}, rowid ASC",
                    kind.expression(&order.field)
                ));
            }
            None => sql.push_str(" ORDER BY rowid ASC"),
        }

        if let Some(limit) = selection.limit {
            sql.push_str(" LIMIT ?");
            binds.push(Bind::Integer(i64::from(limit)));
        }

        Ok(Self { sql, binds })
    }

    fn bind<'q>(
        &self,
        mut query: Query<'q, Sqlite, <Sqlite as Database>::Arguments<'q>>,
    ) -> Query<'q, Sqlite, <Sqlite as Database>::Arguments<'q>> {
        for bind in &self.binds {
            query = match bind {
                Bind::Text(value) => query.bind(value.clone()),
                Bind::Integer(value) => query.bind(*value),
                Bind::Real(value) => query.bind(*value),
            };
        }
        query
    }
}

fn lead_from_row(row: &SqliteRow) -> Result<Lead, RepositoryError> {
    Ok(Lead {
        id: LeadId(row.try_get("id")?),
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        location: row.try_get("location")?,
        message: row.try_get("message")?,
        number_of_properties: parse_optional_u32(
            "number_of_properties",
            row.try_get("number_of_properties")?,
        )?,
        property_type: row.try_get("property_type")?,
        platform_usage: parse_string_list("platform_usage", row.try_get("platform_usage")?)?,
        source: row.try_get("source")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

fn property_from_row(row: &SqliteRow) -> Result<Property, RepositoryError> {
    Ok(Property {
        id: PropertyId(row.try_get("id")?),
        name: row.try_get("name")?,
        lead_id: LeadId(row.try_get("lead_id")?),
        address: row.try_get("address")?,
        city: row.try_get("city")?,
        country: row.try_get("country")?,
        property_type: row.try_get("property_type")?,
        number_of_rooms: parse_optional_u32("number_of_rooms", row.try_get("number_of_rooms")?)?,
        has_pool: row.try_get("has_pool")?,
        active: row.try_get("active")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

fn job_application_from_row(row: &SqliteRow) -> Result<JobApplication, RepositoryError> {
    Ok(JobApplication {
        id: JobApplicationId(row.try_get("id")?),
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        role_applied: row.try_get("role_applied")?,
        motivation: row.try_get("motivation")?,
        linkedin_url: row.try_get("linkedin_url")?,
        resume_url: row.try_get("resume_url")?,
        source: row.try_get("source")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

fn conversation_from_row(row: &SqliteRow) -> Result<ConversationMessage, RepositoryError> {
    Ok(ConversationMessage {
        id: ConversationId(row.try_get("id")?),
        lead_id: row.try_get::<Option<String>, _>("lead_id")?.map(LeadId),
        message: row.try_get("message")?,
        is_from_user: row.try_get("is_from_user")?,
        page_context: row.try_get("page_context")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

fn report_from_row(row: &SqliteRow) -> Result<Report, RepositoryError> {
    Ok(Report {
        id: ReportId(row.try_get("id")?),
        property_id: PropertyId(row.try_get("property_id")?),
        month: row.try_get("month")?,
        revenue: parse_decimal("revenue", row.try_get("revenue")?)?,
        occupancy_rate: parse_decimal("occupancy_rate", row.try_get("occupancy_rate")?)?,
        maintenance_issues: parse_u32("maintenance_issues", row.try_get("maintenance_issues")?)?,
        guest_rating: parse_decimal("guest_rating", row.try_get("guest_rating")?)?,
        number_of_bookings: parse_u32("number_of_bookings", row.try_get("number_of_bookings")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

fn created_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

fn parse_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!(
            "invalid value for `{column}` (expected non-negative u32): {value}"
        ))
    })
}

fn parse_optional_u32(column: &str, value: Option<i64>) -> Result<Option<u32>, RepositoryError> {
    value.map(|value| parse_u32(column, value)).transpose()
}

fn parse_decimal(column: &str, value: String) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(value.trim()).map_err(|error| {
        RepositoryError::Decode(format!("invalid decimal in `{column}`: `{value}` ({error})"))
    })
}

fn parse_string_list(column: &str, value: Option<String>) -> Result<Vec<String>, RepositoryError> {
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(Vec::new()),
        Some(raw) => serde_json::from_str(raw).map_err(|error| {
            RepositoryError::Decode(format!("invalid JSON list in `{column}`: {error}"))
        }),
    }
}
