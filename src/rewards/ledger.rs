//! HTTP client for the reward ledger

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use uuid::Uuid;

use crate::config::Config;

/// One credit grant as posted to the ledger
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardGrant {
    pub account_id: Uuid,
    pub amount: u32,
    pub reason: String,
    pub granted_at: DateTime<Utc>,
}

impl RewardGrant {
    pub fn new(account_id: Uuid, amount: u32, reason: &str) -> Self {
        Self {
            account_id,
            amount,
            reason: reason.to_string(),
            granted_at: Utc::now(),
        }
    }
}

/// Ledger client authenticated with a service key
#[derive(Clone)]
pub struct RewardLedger {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl RewardLedger {
    /// `None` when no ledger endpoint is configured
    pub fn from_config(config: &Config) -> Option<Self> {
        config
            .reward_ledger_url
            .as_ref()
            .map(|url| Self::new(url.clone(), config.reward_ledger_key.clone()))
    }

    pub fn new(endpoint: String, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn grants_url(&self) -> String {
        format!("{}/grants", self.endpoint)
    }

    /// Post a single grant
    pub async fn record(&self, grant: &RewardGrant) -> Result<(), LedgerError> {
        let mut request = self
            .client
            .post(self.grants_url())
            .header("Content-Type", "application/json")
            .json(grant);

        if let Some(key) = &self.api_key {
            request = request
                .header("apikey", key)
                .header("Authorization", format!("Bearer {}", key));
        }

        let response = request.send().await.map_err(LedgerError::Request)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LedgerError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}

/// Ledger errors
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error (status {status}): {body}")]
    Api { status: u16, body: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn grant_serializes_camel_case() {
        let account_id = Uuid::nil();
        let grant = RewardGrant {
            account_id,
            amount: 12,
            reason: "Snake game: 12 credits".to_string(),
            granted_at: DateTime::from_timestamp(0, 0).unwrap_or_default(),
        };
        let value = serde_json::to_value(&grant).unwrap();
        assert_eq!(value["accountId"], json!(account_id.to_string()));
        assert_eq!(value["amount"], 12);
        assert_eq!(value["reason"], "Snake game: 12 credits");
        assert!(value.get("grantedAt").is_some());
    }

    #[test]
    fn endpoint_trailing_slash_is_trimmed() {
        let ledger = RewardLedger::new("https://ledger.example/api/".to_string(), None);
        assert_eq!(ledger.grants_url(), "https://ledger.example/api/grants");
    }

    #[test]
    fn missing_url_disables_ledger() {
        let config = Config {
            server_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "info".to_string(),
            session_jwt_secret: "secret".to_string(),
            client_origin: "*".to_string(),
            reward_ledger_url: None,
            reward_ledger_key: Some("key".to_string()),
            game: Default::default(),
        };
        assert!(RewardLedger::from_config(&config).is_none());
    }
}
