// Bulk-fetch collaborator: the trait the aggregator seeds from, and its HTTP implementation.

use anyhow::Context;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;
use tracing::instrument;

use crate::config::BackendConfig;
use crate::models::{AnomalyEvent, Snapshot};

/// Batch source for the initial load and `refresh()`. The three calls are
/// independent; no transactional guarantee is assumed across them.
pub trait BulkFetch: Send + Sync + 'static {
    fn current_snapshot(&self) -> impl Future<Output = anyhow::Result<Snapshot>> + Send;

    fn snapshot_history(
        &self,
        limit: usize,
    ) -> impl Future<Output = anyhow::Result<Vec<Snapshot>>> + Send;

    fn recent_anomalies(
        &self,
        limit: usize,
    ) -> impl Future<Output = anyhow::Result<Vec<AnomalyEvent>>> + Send;
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("request to {endpoint} failed: {source}")]
    Http {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{endpoint} returned HTTP {status}")]
    Status { endpoint: String, status: StatusCode },
    #[error("{endpoint} responded with status {status:?}")]
    Rejected { endpoint: String, status: String },
    #[error("{endpoint} returned no data")]
    Empty { endpoint: String },
}

/// `{ "status": "success", "data": ... }`
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct MetricsPage {
    metrics: Vec<Snapshot>,
}

#[derive(Debug, Deserialize)]
struct AnomalyPage {
    anomalies: Vec<AnomalyEvent>,
}

/// REST client for the monitoring backend.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    api_prefix: String,
}

impl ApiClient {
    pub fn new(base_url: &str, api_prefix: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(crate::version::user_agent())
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_prefix: api_prefix.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &BackendConfig) -> anyhow::Result<Self> {
        Self::new(
            &config.base_url,
            &config.api_prefix,
            Duration::from_millis(config.request_timeout_ms),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// True when `/health` answers with a success status; transport errors count as unhealthy.
    pub async fn health_check(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(error = %e, operation = "health_check", "health check failed");
                false
            }
        }
    }

    #[instrument(skip(self), fields(client = "api"))]
    async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        limit: Option<usize>,
    ) -> Result<T, ApiError> {
        let url = format!("{}{}{}", self.base_url, self.api_prefix, endpoint);
        let mut request = self.client.get(&url);
        if let Some(limit) = limit {
            request = request.query(&[("limit", limit)]);
        }
        let response = request.send().await.map_err(|source| ApiError::Http {
            endpoint: endpoint.to_string(),
            source,
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                endpoint: endpoint.to_string(),
                status,
            });
        }

        let envelope: Envelope<T> = response.json().await.map_err(|source| ApiError::Http {
            endpoint: endpoint.to_string(),
            source,
        })?;
        if envelope.status != "success" {
            return Err(ApiError::Rejected {
                endpoint: endpoint.to_string(),
                status: envelope.status,
            });
        }
        envelope.data.ok_or_else(|| ApiError::Empty {
            endpoint: endpoint.to_string(),
        })
    }
}

impl BulkFetch for ApiClient {
    async fn current_snapshot(&self) -> anyhow::Result<Snapshot> {
        self.get("/metrics/current", None)
            .await
            .context("fetch current snapshot")
    }

    async fn snapshot_history(&self, limit: usize) -> anyhow::Result<Vec<Snapshot>> {
        let page: MetricsPage = self
            .get("/metrics/history", Some(limit))
            .await
            .context("fetch snapshot history")?;
        Ok(page.metrics)
    }

    async fn recent_anomalies(&self, limit: usize) -> anyhow::Result<Vec<AnomalyEvent>> {
        let page: AnomalyPage = self
            .get("/anomalies", Some(limit))
            .await
            .context("fetch anomalies")?;
        Ok(page.anomalies)
    }
}
