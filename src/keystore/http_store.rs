//! Centralized parameter-store backend.
//!
//! Speaks to a shared parameter/secret service over HTTP so independently
//! deployed services can converge on the same key material without talking
//! to each other. Wire contract:
//!
//! - `GET  {base}/params/{name}` -> 200 with a JSON array of key records,
//!   404 when the parameter does not exist yet (normal first-run state)
//! - `PUT  {base}/params/{name}/{sequence}` with a record body -> 2xx on
//!   create, 409 when that ring position is already taken
//!
//! The parameter name is the sanitized purpose chain, so one store instance
//! can safely back multiple independent protections.

use async_trait::async_trait;
use reqwest::StatusCode;

use super::{KeyRecord, KeyStore, KeyStoreError, sanitize_purpose};

pub struct HttpParamStore {
    base_url: String,
    client: reqwest::Client,
}

impl HttpParamStore {
    pub fn new(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { base_url, client }
    }

    fn param_url(&self, purpose: &str) -> String {
        format!("{}/params/{}", self.base_url, sanitize_purpose(purpose))
    }
}

#[async_trait]
impl KeyStore for HttpParamStore {
    async fn get_all(&self, purpose: &str) -> Result<Vec<KeyRecord>, KeyStoreError> {
        let response = self
            .client
            .get(self.param_url(purpose))
            .send()
            .await
            .map_err(|e| KeyStoreError::Unavailable(e.to_string()))?;

        match response.status() {
            // Parameter not found is the expected first-run state.
            StatusCode::NOT_FOUND => Ok(Vec::new()),
            status if status.is_success() => {
                let mut records: Vec<KeyRecord> = response
                    .json()
                    .await
                    .map_err(|e| KeyStoreError::Corrupt(e.to_string()))?;
                records.sort_by_key(|r| r.sequence);
                Ok(records)
            }
            status => Err(KeyStoreError::Unavailable(format!(
                "parameter store returned {}",
                status
            ))),
        }
    }

    async fn put(&self, purpose: &str, record: &KeyRecord) -> Result<(), KeyStoreError> {
        let url = format!("{}/{}", self.param_url(purpose), record.sequence);
        let response = self
            .client
            .put(url)
            .json(record)
            .send()
            .await
            .map_err(|e| KeyStoreError::Unavailable(e.to_string()))?;

        match response.status() {
            StatusCode::CONFLICT => Err(KeyStoreError::Conflict),
            status if status.is_success() => Ok(()),
            status => Err(KeyStoreError::Unavailable(format!(
                "parameter store returned {}",
                status
            ))),
        }
    }
}
