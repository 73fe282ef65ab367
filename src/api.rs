use std::collections::BTreeMap;

use anyhow::{anyhow, Result};
use log::{error, info, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tauri::State;

use crate::diagnosis::CombinedSubmission;
use crate::AppState;

const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Backend base URL: runtime environment first, then the value embedded
/// at build time, then the development default.
fn backend_base_url() -> String {
    let _ = dotenvy::dotenv();
    if let Ok(value) = std::env::var("BURNOUT_BACKEND_URL") {
        if !value.is_empty() {
            return value;
        }
    }
    if let Some(embedded) = option_env!("BURNOUT_BACKEND_URL") {
        if !embedded.is_empty() {
            return embedded.to_string();
        }
    }
    DEFAULT_BASE_URL.to_string()
}

#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    pub user_id: i64,
    pub name: Option<String>,
    pub position: String,
    pub is_hr: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    detail: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeseriesQuery {
    pub characteristic: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    pub start_date: String,
    pub end_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cities: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub departments: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub positions: Option<Vec<String>>,
}

/// The series arrives keyed by the requested characteristic name, so the
/// value columns stay dynamic (`burnout_score`, `exhaustion`, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeseriesResponse {
    pub test_datetime: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_users: Option<i64>,
    #[serde(flatten)]
    pub series: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceItem {
    pub id: i64,
    pub name: String,
}

#[derive(Clone)]
pub struct BurnoutApiClient {
    client: Client,
    base_url: String,
}

impl Default for BurnoutApiClient {
    fn default() -> Self {
        Self::new()
    }
}

impl BurnoutApiClient {
    pub fn new() -> Self {
        let base_url = backend_base_url();
        info!("🌐 Backend base URL: {}", base_url);
        Self {
            client: Client::new(),
            base_url,
        }
    }

    #[cfg(test)]
    pub fn with_base_url(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
        }
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<LoginResponse> {
        let response = self
            .client
            .post(format!("{}/api/login", self.base_url))
            .json(&serde_json::json!({ "username": username, "password": password }))
            .send()
            .await
            .map_err(|e| anyhow!("Не удалось подключиться к серверу: {}", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response
                .json::<ApiErrorBody>()
                .await
                .ok()
                .and_then(|body| body.detail)
                .unwrap_or_else(|| "Ошибка авторизации".to_string());
            error!("Login failed with {}: {}", status, detail);
            return Err(anyhow!(detail));
        }

        Ok(response.json::<LoginResponse>().await?)
    }

    /// Submits the combined diagnosis payload; the response `message` is
    /// the free-text recommendation generated server-side.
    pub async fn submit_results(&self, submission: &CombinedSubmission) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/api/submit_results", self.base_url))
            .json(submission)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Ошибка {}: {}", status.as_u16(), body));
        }

        Ok(response.json::<SubmitResponse>().await?.message)
    }

    pub async fn get_timeseries(&self, query: &TimeseriesQuery) -> Result<TimeseriesResponse> {
        let response = self
            .client
            .post(format!("{}/api/get_timeseries", self.base_url))
            .json(query)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("Ошибка сети: {}", response.status()));
        }

        Ok(response.json::<TimeseriesResponse>().await?)
    }

    async fn fetch_reference(&self, path: &str) -> Result<Vec<ReferenceItem>> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("Ошибка сети: {}", response.status()));
        }

        Ok(response.json::<Vec<ReferenceItem>>().await?)
    }
}

/// Reference dictionaries for the organizational statistics filters.
#[derive(Debug, Clone, Serialize)]
pub struct ReferenceData {
    pub cities: Vec<ReferenceItem>,
    pub departments: Vec<ReferenceItem>,
    pub positions: Vec<ReferenceItem>,
}

#[tauri::command]
pub async fn fetch_timeseries(
    query: TimeseriesQuery,
    state: State<'_, AppState>,
) -> Result<TimeseriesResponse, String> {
    info!(
        "📈 Timeseries query: characteristic={} user_id={:?} range={}..{}",
        query.characteristic, query.user_id, query.start_date, query.end_date
    );
    state
        .api
        .get_timeseries(&query)
        .await
        .map_err(|e| e.to_string())
}

/// One failing dictionary does not block the others; the dashboard simply
/// renders an empty filter list for it.
#[tauri::command]
pub async fn fetch_reference_data(state: State<'_, AppState>) -> Result<ReferenceData, String> {
    let (cities, departments, positions) = tokio::join!(
        state.api.fetch_reference("/api/get_cities"),
        state.api.fetch_reference("/api/get_departments"),
        state.api.fetch_reference("/api/get_positions"),
    );

    let unwrap_or_empty = |name: &str, result: Result<Vec<ReferenceItem>>| match result {
        Ok(items) => items,
        Err(e) => {
            warn!("Failed to load {} dictionary: {}", name, e);
            Vec::new()
        }
    };

    Ok(ReferenceData {
        cities: unwrap_or_empty("cities", cities),
        departments: unwrap_or_empty("departments", departments),
        positions: unwrap_or_empty("positions", positions),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeseries_query_omits_absent_filters() {
        let query = TimeseriesQuery {
            characteristic: "burnout_score".to_string(),
            user_id: Some(5),
            start_date: "2025-05-30".to_string(),
            end_date: "2025-08-30".to_string(),
            cities: None,
            departments: None,
            positions: None,
        };

        let json = serde_json::to_value(&query).unwrap();
        assert_eq!(json["characteristic"], "burnout_score");
        assert_eq!(json["user_id"], 5);
        assert!(json.get("cities").is_none());
        assert!(json.get("departments").is_none());
        assert!(json.get("positions").is_none());
    }

    #[test]
    fn test_timeseries_response_keeps_dynamic_series() {
        let raw = serde_json::json!({
            "test_datetime": ["2025-06-01", "2025-07-01"],
            "total_users": 12,
            "burnout_score": [0.31, 0.44]
        });

        let parsed: TimeseriesResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(parsed.test_datetime.len(), 2);
        assert_eq!(parsed.total_users, Some(12));
        assert_eq!(parsed.series["burnout_score"][1], 0.44);
    }

    #[test]
    fn test_base_url_defaults_to_localhost() {
        let client = BurnoutApiClient::with_base_url(backend_base_url());
        // No env override in the test environment.
        if std::env::var("BURNOUT_BACKEND_URL").is_err() && option_env!("BURNOUT_BACKEND_URL").is_none() {
            assert_eq!(client.base_url, DEFAULT_BASE_URL);
        }
    }
}
