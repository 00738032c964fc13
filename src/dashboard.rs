//! Client for the finance and health dashboard backend.
//!
//! Each call is a single request against a fixed path under the backend's base
//! URL. Read endpoints answer a non-success status with an empty value of the
//! shape the dashboard expects (`[]`, `null` or `{"data": []}`) instead of an
//! error. Transport failures and unparseable bodies are still errors, except
//! for the health check, which reports them as `{"status": "error"}`.

use reqwest::Client;
use serde_json::{Value, json};

use crate::error::Result;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_TRANSACTION_DAYS: u32 = 30;
pub const DEFAULT_CORRELATION_DAYS: u32 = 14;

#[derive(Debug, Clone)]
pub struct DashboardClient {
    client: Client,
    base_url: String,
}

impl Default for DashboardClient {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl DashboardClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client: Client::new(), base_url }
    }

    #[must_use]
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// GET `path`, or `empty` when the backend answers with a non-success status.
    async fn get_or(&self, path: &str, empty: Value) -> Result<Value> {
        let url = self.url(path);
        tracing::debug!("GET {url}");
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            tracing::debug!("{url} answered {}", response.status());
            return Ok(empty);
        }
        Ok(response.json().await?)
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value> {
        let url = self.url(path);
        tracing::debug!("POST {url}");
        let response = self.client.post(&url).json(&body).send().await?;
        Ok(response.json().await?)
    }

    /// Bank transactions from the last `days` days; `[]` when unavailable.
    pub async fn banking_transactions(&self, days: u32) -> Result<Value> {
        self.get_or(&format!("/finance/banking/transactions?days={days}"), json!([])).await
    }

    pub async fn whoop_profile(&self) -> Result<Value> {
        self.get_or("/health/whoop/profile", Value::Null).await
    }

    pub async fn whoop_latest(&self) -> Result<Value> {
        self.get_or("/health/whoop/latest", Value::Null).await
    }

    /// Backend liveness. Never fails: an unreachable backend or a body that is
    /// not JSON yields `{"status": "error"}`.
    pub async fn health_check(&self) -> Value {
        let url = self.url("/health");
        let body = match self.client.get(&url).send().await {
            Ok(response) => response.json::<Value>().await,
            Err(e) => Err(e),
        };
        body.unwrap_or_else(|e| {
            tracing::warn!("health check against {url} failed: {e}");
            json!({ "status": "error" })
        })
    }

    pub async fn create_link_token(&self, user_id: &str) -> Result<Value> {
        self.post("/finance/plaid/create_link_token", json!({ "user_id": user_id })).await
    }

    pub async fn exchange_public_token(&self, public_token: &str) -> Result<Value> {
        self.post("/finance/plaid/exchange_public_token", json!({ "public_token": public_token })).await
    }

    pub async fn unified_score(&self) -> Result<Value> {
        self.get_or("/finance/analytics/unified-score", Value::Null).await
    }

    pub async fn wellness_roi(&self) -> Result<Value> {
        self.get_or("/finance/analytics/wellness-roi", Value::Null).await
    }

    /// Daily health/spending pairs for the last `days` days; `{"data": []}` when
    /// unavailable.
    pub async fn health_correlation(&self, days: u32) -> Result<Value> {
        self.get_or(&format!("/finance/analytics/correlation?days={days}"), json!({ "data": [] })).await
    }
}
