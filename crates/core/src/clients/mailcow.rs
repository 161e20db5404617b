//! Mailcow API client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, ACCEPT};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::errors::ClientError;
use crate::targets::{CreateMailbox, MailTarget};

use super::{check_response, header_value, http_client};

/// Body of `POST /api/v1/add/mailbox`.
#[derive(Debug, Serialize)]
struct AddMailboxRequest<'a> {
    local_part: &'a str,
    domain: &'a str,
    name: &'a str,
    authsource: &'a str,
    active: &'static str,
    force_pw_update: &'static str,
    tls_enforce_in: &'static str,
    tls_enforce_out: &'static str,
}

/// One entry of the status list Mailcow answers write requests with.
#[derive(Debug, Clone, Deserialize)]
pub struct MailcowStatus {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub msg: Value,
}

#[derive(Clone)]
pub struct MailcowClient {
    http: reqwest::Client,
    api_url: String,
}

impl MailcowClient {
    pub fn new(url: &str, api_key: &str, timeout: Duration) -> Result<Self, ClientError> {
        let api_url = format!("{}/api/v1", url.trim_end_matches('/'));
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", header_value(api_key)?);
        headers.insert(ACCEPT, header_value("application/json")?);
        let http = http_client(timeout, false, headers)?;
        info!(api_url = %api_url, "created MailcowClient");
        Ok(Self { http, api_url })
    }

    /// Fetch a mailbox by address. Mailcow answers unknown addresses with an
    /// empty object.
    #[instrument(skip(self))]
    pub async fn get_mailbox(&self, address: &str) -> Result<Option<Value>, ClientError> {
        let url = format!("{}/get/mailbox/{}", self.api_url, address);
        let resp = self.http.get(&url).send().await?;
        check_response(&resp)?;
        let body: Value = resp.json().await?;
        Ok(mailbox_from_body(body))
    }

    #[instrument(skip(self))]
    pub async fn add_mailbox(&self, request: &CreateMailbox) -> Result<(), ClientError> {
        let url = format!("{}/add/mailbox", self.api_url);
        let body = AddMailboxRequest {
            local_part: &request.local_part,
            domain: &request.domain,
            name: &request.name,
            authsource: &request.auth_source,
            active: "1",
            force_pw_update: "0",
            tls_enforce_in: "0",
            tls_enforce_out: "0",
        };
        let resp = self.http.post(&url).json(&body).send().await?;
        check_response(&resp)?;
        let statuses: Vec<MailcowStatus> = resp.json().await?;
        check_statuses(&statuses)?;
        debug!(address = %request.address(), "mailbox created");
        Ok(())
    }
}

fn mailbox_from_body(body: Value) -> Option<Value> {
    match &body {
        Value::Null => None,
        Value::Object(map) if map.is_empty() => None,
        Value::Array(items) if items.is_empty() => None,
        _ => Some(body),
    }
}

/// Mailcow reports failures with HTTP 200 and a `danger` or `error` entry.
fn check_statuses(statuses: &[MailcowStatus]) -> Result<(), ClientError> {
    for status in statuses {
        if status.kind == "danger" || status.kind == "error" {
            let msg = match &status.msg {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            warn!(kind = %status.kind, msg = %msg, "mailcow rejected request");
            return Err(ClientError::Rejected(msg));
        }
    }
    Ok(())
}

#[async_trait]
impl MailTarget for MailcowClient {
    async fn test_connection(&self) -> Result<(), ClientError> {
        let url = format!("{}/get/status/containers", self.api_url);
        let resp = self.http.get(&url).send().await?;
        check_response(&resp)?;
        Ok(())
    }

    async fn mailbox_exists(&self, address: &str) -> Result<bool, ClientError> {
        Ok(self.get_mailbox(address).await?.is_some())
    }

    async fn create_mailbox(&self, request: &CreateMailbox) -> Result<(), ClientError> {
        self.add_mailbox(request).await
    }
}
