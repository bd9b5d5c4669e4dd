//! REDCap API client
//!
//! REDCap exposes a single form-encoded POST endpoint; the `content` and
//! `action` fields select the operation.

use super::traits::ConsentRegistry;
use crate::config::RegistryConfig;
use crate::domain::consent::{ConsentRecord, ImportResponse};
use crate::domain::{RegistryError, Result, WbhiError};
use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use secrecy::ExposeSecret;
use std::time::Duration;

/// REDCap client
pub struct RedcapClient {
    api_url: String,
    client: Client,
    config: RegistryConfig,
}

impl RedcapClient {
    /// Creates a client from registry configuration
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the HTTP client cannot be built.
    pub fn new(config: &RegistryConfig) -> Result<Self> {
        let client = ClientBuilder::new()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                WbhiError::Configuration(format!("Failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            api_url: config.api_url.clone(),
            client,
            config: config.clone(),
        })
    }

    async fn post(&self, form: &[(&str, &str)]) -> Result<reqwest::Response> {
        let token = self.config.api_token.expose_secret();
        let mut fields: Vec<(&str, &str)> = vec![("token", token.as_ref())];
        fields.extend_from_slice(form);

        let resp = self
            .client
            .post(&self.api_url)
            .form(&fields)
            .send()
            .await
            .map_err(|e| RegistryError::ConnectionFailed(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(RegistryError::RequestFailed { status, message }.into());
        }
        Ok(resp)
    }
}

#[async_trait]
impl ConsentRegistry for RedcapClient {
    async fn export_records(&self) -> Result<Vec<ConsentRecord>> {
        let resp = self
            .post(&[
                ("content", "record"),
                ("action", "export"),
                ("format", "json"),
                ("type", "flat"),
            ])
            .await?;

        let records: Vec<ConsentRecord> = resp
            .json()
            .await
            .map_err(|e| RegistryError::InvalidResponse(e.to_string()))?;

        tracing::info!(count = records.len(), "Exported consent records");
        Ok(records)
    }

    async fn import_records(&self, records: &[ConsentRecord]) -> Result<ImportResponse> {
        let data = serde_json::to_string(records)?;
        let resp = self
            .post(&[
                ("content", "record"),
                ("action", "import"),
                ("format", "json"),
                ("type", "flat"),
                ("overwriteBehavior", "normal"),
                ("returnContent", "count"),
                ("data", &data),
            ])
            .await?;

        let response: ImportResponse = resp
            .json()
            .await
            .map_err(|e| RegistryError::InvalidResponse(e.to_string()))?;

        tracing::info!(
            submitted = records.len(),
            imported = response.count,
            "Imported consent records"
        );
        Ok(response)
    }
}
