//! Client for the hosted record backend, which exposes PostgREST-style
//! collection endpoints and an object storage API for attachments.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

use leadflow_core::config::BackendConfig;
use leadflow_core::domain::application::{JobApplication, NewJobApplication};
use leadflow_core::domain::conversation::{ConversationMessage, NewConversationMessage};
use leadflow_core::domain::lead::{Lead, NewLead};
use leadflow_core::domain::property::{NewProperty, Property};
use leadflow_core::domain::report::{NewReport, Report};
use leadflow_core::domain::upload::FileUpload;
use leadflow_core::sanitize::sanitize_filename;
use leadflow_core::store::{Collection, RecordStore, Selection, SortDirection, StoreError};
use leadflow_core::validation::DEFAULT_MAX_FILENAME_LEN;

#[derive(Clone)]
pub struct RestSettings {
    pub base_url: Url,
    pub api_key: SecretString,
    pub storage_bucket: String,
    pub timeout: Duration,
}

impl RestSettings {
    pub fn from_config(config: &BackendConfig) -> Result<Self, StoreError> {
        let raw_url = config.rest_url.as_deref().ok_or_else(|| {
            StoreError::Unavailable("backend.rest_url is not configured".to_string())
        })?;
        let mut base_url = Url::parse(raw_url)
            .map_err(|error| StoreError::Unavailable(format!("invalid backend.rest_url: {error}")))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let api_key = config.api_key.clone().ok_or_else(|| {
            StoreError::Unavailable("backend.api_key is not configured".to_string())
        })?;

        Ok(Self {
            base_url,
            api_key,
            storage_bucket: config.storage_bucket.clone(),
            timeout: Duration::from_secs(config.timeout_secs.max(1)),
        })
    }
}

pub struct RestRecordStore {
    client: Client,
    settings: RestSettings,
}

impl RestRecordStore {
    pub fn new(settings: RestSettings) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|error| StoreError::Transport(error.to_string()))?;
        Ok(Self { client, settings })
    }

    pub fn settings(&self) -> &RestSettings {
        &self.settings
    }

    fn endpoint(&self, path: &str) -> Result<Url, StoreError> {
        self.settings
            .base_url
            .join(path)
            .map_err(|error| StoreError::Transport(format!("invalid backend path `{path}`: {error}")))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let key = self.settings.api_key.expose_secret();
        request.header("apikey", key).header(AUTHORIZATION, format!("Bearer {key}"))
    }

    async fn insert<N, T>(&self, collection: Collection, record: &N) -> Result<T, StoreError>
    where
        N: Serialize + Sync,
        T: DeserializeOwned + Send,
    {
        let url = self.endpoint(&format!("rest/v1/{}", collection.table()))?;
        let request = self
            .authorize(self.client.post(url))
            .header("Prefer", "return=representation")
            .json(record);
        let response = self.send(request).await?;

        let mut rows: Vec<T> = decode(response).await?;
        if rows.is_empty() {
            return Err(StoreError::NotFound { collection: collection.table() });
        }
        Ok(rows.swap_remove(0))
    }

    async fn select<T>(
        &self,
        collection: Collection,
        selection: &Selection,
    ) -> Result<Vec<T>, StoreError>
    where
        T: DeserializeOwned + Send,
    {
        selection.validate(collection)?;
        let mut url = self.endpoint(&format!("rest/v1/{}", collection.table()))?;
        url.query_pairs_mut().extend_pairs(query_pairs(selection, "*"));

        debug!(
            event_name = "store.select",
            collection = collection.table(),
            filters = selection.filters.len(),
            "selecting records from hosted backend"
        );
        let response = self.send(self.authorize(self.client.get(url))).await?;
        decode(response).await
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, StoreError> {
        let response = request.send().await.map_err(|error| {
            if error.is_timeout() {
                StoreError::Timeout(self.settings.timeout)
            } else {
                StoreError::Transport(error.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                event_name = "store.request_rejected",
                status = status.as_u16(),
                "hosted backend rejected request"
            );
            return Err(StoreError::Status { status: status.as_u16(), body });
        }
        Ok(response)
    }
}

#[async_trait]
impl RecordStore for RestRecordStore {
    async fn insert_lead(&self, lead: NewLead) -> Result<Lead, StoreError> {
        self.insert(Collection::Lead, &lead).await
    }

    async fn insert_property(&self, property: NewProperty) -> Result<Property, StoreError> {
        self.insert(Collection::Property, &property).await
    }

    async fn insert_job_application(
        &self,
        application: NewJobApplication,
    ) -> Result<JobApplication, StoreError> {
        self.insert(Collection::JobApplication, &application).await
    }

    async fn insert_conversation(
        &self,
        message: NewConversationMessage,
    ) -> Result<ConversationMessage, StoreError> {
        self.insert(Collection::Conversation, &message).await
    }

    async fn insert_report(&self, report: NewReport) -> Result<Report, StoreError> {
        self.insert(Collection::Report, &report).await
    }

    async fn store_attachment(&self, upload: &FileUpload) -> Result<String, StoreError> {
        let file_name = sanitize_filename(&upload.file_name, DEFAULT_MAX_FILENAME_LEN);
        let object_path = format!("{}-{file_name}", Uuid::new_v4());
        let bucket = &self.settings.storage_bucket;
        let url = self.endpoint(&format!("storage/v1/object/{bucket}/{object_path}"))?;

        let mut headers = HeaderMap::new();
        let content_type = if upload.content_type.is_empty() {
            HeaderValue::from_static("application/octet-stream")
        } else {
            HeaderValue::from_str(&upload.content_type)
                .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"))
        };
        headers.insert(CONTENT_TYPE, content_type);

        let request =
            self.authorize(self.client.post(url)).headers(headers).body(upload.bytes.clone());
        self.send(request).await?;

        let public = self.endpoint(&format!("storage/v1/object/public/{bucket}/{object_path}"))?;
        Ok(public.to_string())
    }

    async fn select_leads(&self, selection: &Selection) -> Result<Vec<Lead>, StoreError> {
        self.select(Collection::Lead, selection).await
    }

    async fn select_properties(&self, selection: &Selection) -> Result<Vec<Property>, StoreError> {
        self.select(Collection::Property, selection).await
    }

    async fn select_job_applications(
        &self,
        selection: &Selection,
    ) -> Result<Vec<JobApplication>, StoreError> {
        self.select(Collection::JobApplication, selection).await
    }

    async fn select_conversations(
        &self,
        selection: &Selection,
    ) -> Result<Vec<ConversationMessage>, StoreError> {
        self.select(Collection::Conversation, selection).await
    }

    async fn select_reports(&self, selection: &Selection) -> Result<Vec<Report>, StoreError> {
        self.select(Collection::Report, selection).await
    }

    async fn count(&self, collection: Collection, selection: &Selection) -> Result<u64, StoreError> {
        selection.validate(collection)?;
        let mut url = self.endpoint(&format!("rest/v1/{}", collection.table()))?;
        let first_row = Selection { limit: Some(1), ..selection.clone() };
        url.query_pairs_mut().extend_pairs(query_pairs(&first_row, "id"));

        let request = self.authorize(self.client.get(url)).header("Prefer", "count=exact");
        let response = self.send(request).await?;
        let range = response
            .headers()
            .get("content-range")
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| StoreError::Decode("missing Content-Range header".to_string()))?;
        let total = parse_content_range_total(range)?;

        Ok(match selection.limit {
            Some(limit) => total.min(u64::from(limit)),
            None => total,
        })
    }
}

/// Renders a selection as PostgREST query parameters.
fn query_pairs(selection: &Selection, projection: &str) -> Vec<(String, String)> {
    let mut pairs = vec![("select".to_string(), projection.to_string())];
    for filter in &selection.filters {
        let condition = match &filter.value {
            Value::Null => "is.null".to_string(),
            Value::String(text) => format!("eq.{text}"),
            other => format!("eq.{other}"),
        };
        pairs.push((filter.field.clone(), condition));
    }
    if let Some(order) = &selection.order {
        let direction = match order.direction {
            SortDirection::Ascending => "asc",
            SortDirection::Descending => "desc",
        };
        pairs.push(("order".to_string(), format!("{}.{direction}", order.field)));
    }
    if let Some(limit) = selection.limit {
        pairs.push(("limit".to_string(), limit.to_string()));
    }
    pairs
}

/// Reads the total from a `Content-Range` value such as `0-24/311` or `*/0`.
fn parse_content_range_total(range: &str) -> Result<u64, StoreError> {
    range
        .rsplit_once('/')
        .and_then(|(_, total)| total.trim().parse::<u64>().ok())
        .ok_or_else(|| StoreError::Decode(format!("unparseable Content-Range `{range}`")))
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, StoreError> {
    response.json::<T>().await.map_err(|error| StoreError::Decode(error.to_string()))
}
