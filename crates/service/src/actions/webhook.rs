use async_trait::async_trait;
use reqwest::Url;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::ActionHandler;
use crate::errors::ServiceError;

/// Body POSTed to a webhook when its action fires.
#[derive(Debug, Serialize)]
pub struct WebhookPayload<'a> {
    pub action: &'a str,
    pub key: &'a str,
    pub value: &'a Value,
}

/// Action that forwards `(key, value)` to an HTTP endpoint as JSON.
/// Any non-2xx response counts as a failed invocation.
pub struct WebhookAction {
    action: String,
    url: Url,
    client: reqwest::Client,
}

impl WebhookAction {
    pub fn new(action: impl Into<String>, url: &str, client: reqwest::Client) -> Result<Self, ServiceError> {
        let url = Url::parse(url).map_err(|e| ServiceError::Config(format!("invalid webhook url {url}: {e}")))?;
        Ok(Self { action: action.into(), url, client })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl ActionHandler for WebhookAction {
    async fn handle(&self, key: &str, value: &Value) -> Result<Value, ServiceError> {
        let payload = WebhookPayload { action: &self.action, key, value };
        let resp = self
            .client
            .post(self.url.clone())
            .json(&payload)
            .send()
            .await
            .map_err(|e| ServiceError::callback(&self.action, e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ServiceError::callback(&self.action, format!("webhook responded with {status}")));
        }
        debug!(action = %self.action, %status, "webhook delivered");
        // responses are informational; an empty or non-JSON body is fine
        let body = resp.bytes().await.map_err(|e| ServiceError::callback(&self.action, e))?;
        Ok(serde_json::from_slice(&body).unwrap_or(Value::Null))
    }
}
