//! Fallback relay seam: a form endpoint that accepts a flattened payload when
//! primary persistence is unavailable.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::upload::FileUpload;
use crate::flows::FlowType;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayPayload {
    pub fields: Vec<(String, String)>,
    pub attachments: Vec<(String, FileUpload)>,
}

impl RelayPayload {
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.push((key.into(), value.into()));
    }

    pub fn attach(&mut self, key: impl Into<String>, upload: FileUpload) {
        self.attachments.push((key.into(), upload));
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.iter().find(|(name, _)| name == key).map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("no relay endpoint configured for flow `{0}`")]
    MissingEndpoint(String),
    #[error("relay request failed: {0}")]
    Transport(String),
    #[error("relay returned status {0}")]
    Status(u16),
    #[error("relay call timed out after {0:?}")]
    Timeout(Duration),
}

#[async_trait]
pub trait FallbackRelay: Send + Sync {
    async fn relay(&self, flow_type: FlowType, payload: &RelayPayload) -> Result<(), RelayError>;
}
