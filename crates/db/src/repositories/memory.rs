use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use leadflow_core::domain::application::{JobApplication, JobApplicationId, NewJobApplication};
use leadflow_core::domain::conversation::{
    ConversationId, ConversationMessage, NewConversationMessage,
};
use leadflow_core::domain::lead::{Lead, LeadId, NewLead};
use leadflow_core::domain::property::{NewProperty, Property, PropertyId};
use leadflow_core::domain::report::{NewReport, Report, ReportId};
use leadflow_core::domain::upload::FileUpload;
use leadflow_core::store::{Collection, RecordStore, Selection, StoreError};

const ATTACHMENT_PREFIX: &str = "memory://attachments/";

#[derive(Default)]
struct Records {
    leads: Vec<Lead>,
    properties: Vec<Property>,
    applications: Vec<JobApplication>,
    conversations: Vec<ConversationMessage>,
    reports: Vec<Report>,
    attachments: HashMap<String, FileUpload>,
}

/// Record store that keeps every collection in process memory, in insertion
/// order. Writes to a collection can be switched to fail, which is how tests
/// exercise the fallback and best-effort paths.
#[derive(Default)]
pub struct InMemoryRecordStore {
    records: RwLock<Records>,
    failing: RwLock<HashSet<Collection>>,
    failing_attachments: RwLock<bool>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes inserts into `collection` fail with a 503 until cleared.
    pub async fn fail_writes(&self, collection: Collection, fail: bool) {
        let mut failing = self.failing.write().await;
        if fail {
            failing.insert(collection);
        } else {
            failing.remove(&collection);
        }
    }

    pub async fn fail_attachments(&self, fail: bool) {
        *self.failing_attachments.write().await = fail;
    }

    pub async fn attachment(&self, url: &str) -> Option<FileUpload> {
        let id = url.strip_prefix(ATTACHMENT_PREFIX)?.split('/').next()?;
        self.records.read().await.attachments.get(id).cloned()
    }

    async fn check_writable(&self, collection: Collection) -> Result<(), StoreError> {
        if self.failing.read().await.contains(&collection) {
            return Err(StoreError::Status {
                status: 503,
                body: format!("writes to `{}` are disabled", collection.table()),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn insert_lead(&self, lead: NewLead) -> Result<Lead, StoreError> {
        self.check_writable(Collection::Lead).await?;
        let lead = Lead::from_new(LeadId(Uuid::new_v4().to_string()), lead, Utc::now());
        self.records.write().await.leads.push(lead.clone());
        Ok(lead)
    }

    async fn insert_property(&self, property: NewProperty) -> Result<Property, StoreError> {
        self.check_writable(Collection::Property).await?;
        let mut records = self.records.write().await;
        if !records.leads.iter().any(|lead| lead.id == property.lead_id) {
            return Err(StoreError::Status {
                status: 409,
                body: format!("lead `{}` does not exist", property.lead_id.0),
            });
        }
        let property =
            Property::from_new(PropertyId(Uuid::new_v4().to_string()), property, Utc::now());
        records.properties.push(property.clone());
        Ok(property)
    }

    async fn insert_job_application(
        &self,
        application: NewJobApplication,
    ) -> Result<JobApplication, StoreError> {
        self.check_writable(Collection::JobApplication).await?;
        let application = JobApplication::from_new(
            JobApplicationId(Uuid::new_v4().to_string()),
            application,
            Utc::now(),
        );
        self.records.write().await.applications.push(application.clone());
        Ok(application)
    }

    async fn insert_conversation(
        &self,
        message: NewConversationMessage,
    ) -> Result<ConversationMessage, StoreError> {
        self.check_writable(Collection::Conversation).await?;
        let message = ConversationMessage::from_new(
            ConversationId(Uuid::new_v4().to_string()),
            message,
            Utc::now(),
        );
        self.records.write().await.conversations.push(message.clone());
        Ok(message)
    }

    async fn insert_report(&self, report: NewReport) -> Result<Report, StoreError> {
        self.check_writable(Collection::Report).await?;
        let report = Report::from_new(ReportId(Uuid::new_v4().to_string()), report, Utc::now());
        self.records.write().await.reports.push(report.clone());
        Ok(report)
    }

    async fn store_attachment(&self, upload: &FileUpload) -> Result<String, StoreError> {
        if *self.failing_attachments.read().await {
            return Err(StoreError::Status {
                status: 503,
                body: "attachment storage is disabled".to_string(),
            });
        }
        let id = Uuid::new_v4().to_string();
        let url = format!("{ATTACHMENT_PREFIX}{id}/{}", upload.file_name);
        self.records.write().await.attachments.insert(id, upload.clone());
        Ok(url)
    }

    async fn select_leads(&self, selection: &Selection) -> Result<Vec<Lead>, StoreError> {
        selection.validate(Collection::Lead)?;
        Ok(selection.apply(self.records.read().await.leads.iter().cloned()))
    }

    async fn select_properties(&self, selection: &Selection) -> Result<Vec<Property>, StoreError> {
        selection.validate(Collection::Property)?;
        Ok(selection.apply(self.records.read().await.properties.iter().cloned()))
    }

    async fn select_job_applications(
        &self,
        selection: &Selection,
    ) -> Result<Vec<JobApplication>, StoreError> {
        selection.validate(Collection::JobApplication)?;
        Ok(selection.apply(self.records.read().await.applications.iter().cloned()))
    }

    async fn select_conversations(
        &self,
        selection: &Selection,
    ) -> Result<Vec<ConversationMessage>, StoreError> {
        selection.validate(Collection::Conversation)?;
        Ok(selection.apply(self.records.read().await.conversations.iter().cloned()))
    }

    async fn select_reports(&self, selection: &Selection) -> Result<Vec<Report>, StoreError> {
        selection.validate(Collection::Report)?;
        Ok(selection.apply(self.records.read().await.reports.iter().cloned()))
    }

    async fn count(&self, collection: Collection, selection: &Selection) -> Result<u64, StoreError> {
        let count = match collection {
            Collection::Lead => self.select_leads(selection).await?.len(),
            Collection::Property => self.select_properties(selection).await?.len(),
            Collection::JobApplication => self.select_job_applications(selection).await?.len(),
            Collection::Conversation => self.select_conversations(selection).await?.len(),
            Collection::Report => self.select_reports(selection).await?.len(),
        };
        Ok(count as u64)
    }
}
