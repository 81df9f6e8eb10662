//! Form-relay client used when the record backend is unreachable.

use std::time::Duration;

use async_trait::async_trait;
use leadflow_core::config::RelayConfig;
use leadflow_core::flows::FlowType;
use leadflow_core::relay::{FallbackRelay, RelayError, RelayPayload};
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use tracing::warn;

pub struct HttpFormRelay {
    client: Client,
    config: RelayConfig,
    timeout: Duration,
}

impl HttpFormRelay {
    pub fn new(config: RelayConfig, timeout: Duration) -> Result<Self, RelayError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| RelayError::Transport(error.to_string()))?;
        Ok(Self { client, config, timeout })
    }

    fn form(payload: &RelayPayload) -> Form {
        let mut form = Form::new();
        for (key, value) in &payload.fields {
            form = form.text(key.clone(), value.clone());
        }
        for (key, upload) in &payload.attachments {
            let part = Part::bytes(upload.bytes.clone()).file_name(upload.file_name.clone());
            let part = if upload.content_type.is_empty() {
                part
            } else {
                match part.mime_str(&upload.content_type) {
                    Ok(part) => part,
                    Err(_) => Part::bytes(upload.bytes.clone()).file_name(upload.file_name.clone()),
                }
            };
            form = form.part(key.clone(), part);
        }
        form
    }
}

#[async_trait]
impl FallbackRelay for HttpFormRelay {
    async fn relay(&self, flow_type: FlowType, payload: &RelayPayload) -> Result<(), RelayError> {
        let endpoint = self
            .config
            .endpoint_for(flow_type)
            .ok_or_else(|| RelayError::MissingEndpoint(flow_type.as_str().to_string()))?;

        let response = self
            .client
            .post(endpoint)
            .header("Accept", "application/json")
            .multipart(Self::form(payload))
            .send()
            .await
            .map_err(|error| {
                if error.is_timeout() {
                    RelayError::Timeout(self.timeout)
                } else {
                    RelayError::Transport(error.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(
                event_name = "relay.request_rejected",
                flow_type = flow_type.as_str(),
                status = status.as_u16(),
                "form relay rejected submission"
            );
            return Err(RelayError::Status(status.as_u16()));
        }
        Ok(())
    }
}
