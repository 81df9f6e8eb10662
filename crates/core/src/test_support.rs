//! In-process fakes for the record store and relay seams.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::domain::application::{JobApplication, JobApplicationId, NewJobApplication};
use crate::domain::conversation::{ConversationId, ConversationMessage, NewConversationMessage};
use crate::domain::lead::{Lead, LeadId, NewLead};
use crate::domain::property::{NewProperty, Property, PropertyId};
use crate::domain::report::{NewReport, Report, ReportId};
use crate::domain::upload::FileUpload;
use crate::flows::definition::FlowType;
use crate::relay::{FallbackRelay, RelayError, RelayPayload};
use crate::store::{Collection, RecordStore, Selection, StoreError};

#[derive(Default)]
struct Records {
    leads: Vec<Lead>,
    properties: Vec<Property>,
    applications: Vec<JobApplication>,
    conversations: Vec<ConversationMessage>,
    reports: Vec<Report>,
}

#[derive(Clone, Default)]
pub(crate) struct FakeStore {
    records: Arc<Mutex<Records>>,
    fail_primary: Arc<AtomicBool>,
    fail_dependents: Arc<AtomicBool>,
    delay: Arc<Mutex<Option<Duration>>>,
}

impl FakeStore {
    pub(crate) fn fail_primary(&self, fail: bool) {
        self.fail_primary.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_dependents(&self, fail: bool) {
        self.fail_dependents.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn delay(&self, delay: Duration) {
        *self.delay.lock().expect("delay lock") = Some(delay);
    }

    pub(crate) fn leads(&self) -> Vec<Lead> {
        self.records.lock().expect("records lock").leads.clone()
    }

    pub(crate) fn properties(&self) -> Vec<Property> {
        self.records.lock().expect("records lock").properties.clone()
    }

    pub(crate) fn applications(&self) -> Vec<JobApplication> {
        self.records.lock().expect("records lock").applications.clone()
    }

    pub(crate) fn conversations(&self) -> Vec<ConversationMessage> {
        self.records.lock().expect("records lock").conversations.clone()
    }

    async fn pause(&self) {
        let delay = *self.delay.lock().expect("delay lock");
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn check(&self, flag: &AtomicBool) -> Result<(), StoreError> {
        if flag.load(Ordering::SeqCst) {
            return Err(StoreError::Status { status: 503, body: "injected failure".to_string() });
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for FakeStore {
    async fn insert_lead(&self, lead: NewLead) -> Result<Lead, StoreError> {
        self.pause().await;
        self.check(&self.fail_primary)?;
        let lead = Lead::from_new(LeadId(Uuid::new_v4().to_string()), lead, Utc::now());
        self.records.lock().expect("records lock").leads.push(lead.clone());
        Ok(lead)
    }

    async fn insert_property(&self, property: NewProperty) -> Result<Property, StoreError> {
        self.pause().await;
        self.check(&self.fail_dependents)?;
        let property =
            Property::from_new(PropertyId(Uuid::new_v4().to_string()), property, Utc::now());
        self.records.lock().expect("records lock").properties.push(property.clone());
        Ok(property)
    }

    async fn insert_job_application(
        &self,
        application: NewJobApplication,
    ) -> Result<JobApplication, StoreError> {
        self.pause().await;
        self.check(&self.fail_primary)?;
        let application = JobApplication::from_new(
            JobApplicationId(Uuid::new_v4().to_string()),
            application,
            Utc::now(),
        );
        self.records.lock().expect("records lock").applications.push(application.clone());
        Ok(application)
    }

    async fn insert_conversation(
        &self,
        message: NewConversationMessage,
    ) -> Result<ConversationMessage, StoreError> {
        self.pause().await;
        self.check(&self.fail_dependents)?;
        let message = ConversationMessage::from_new(
            ConversationId(Uuid::new_v4().to_string()),
            message,
            Utc::now(),
        );
        self.records.lock().expect("records lock").conversations.push(message.clone());
        Ok(message)
    }

    async fn insert_report(&self, report: NewReport) -> Result<Report, StoreError> {
        let report = Report::from_new(ReportId(Uuid::new_v4().to_string()), report, Utc::now());
        self.records.lock().expect("records lock").reports.push(report.clone());
        Ok(report)
    }

    async fn store_attachment(&self, upload: &FileUpload) -> Result<String, StoreError> {
        self.pause().await;
        self.check(&self.fail_primary)?;
        Ok(format!("memory://attachments/{}", upload.file_name))
    }

    async fn select_leads(&self, selection: &Selection) -> Result<Vec<Lead>, StoreError> {
        Ok(selection.apply(self.leads()))
    }

    async fn select_properties(&self, selection: &Selection) -> Result<Vec<Property>, StoreError> {
        Ok(selection.apply(self.properties()))
    }

    async fn select_job_applications(
        &self,
        selection: &Selection,
    ) -> Result<Vec<JobApplication>, StoreError> {
        Ok(selection.apply(self.applications()))
    }

    async fn select_conversations(
        &self,
        selection: &Selection,
    ) -> Result<Vec<ConversationMessage>, StoreError> {
        Ok(selection.apply(self.conversations()))
    }

    async fn select_reports(&self, selection: &Selection) -> Result<Vec<Report>, StoreError> {
        let reports = self.records.lock().expect("records lock").reports.clone();
        Ok(selection.apply(reports))
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

#[derive(Clone, Default)]
pub(crate) struct FakeRelay {
    calls: Arc<AtomicUsize>,
    fail: Arc<AtomicBool>,
    payloads: Arc<Mutex<Vec<RelayPayload>>>,
}

impl FakeRelay {
    pub(crate) fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn last_payload(&self) -> Option<RelayPayload> {
        self.payloads.lock().expect("payload lock").last().cloned()
    }
}

#[async_trait]
impl FallbackRelay for FakeRelay {
    async fn relay(&self, _flow_type: FlowType, payload: &RelayPayload) -> Result<(), RelayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(RelayError::Status(500));
        }
        self.payloads.lock().expect("payload lock").push(payload.clone());
        Ok(())
    }
}
