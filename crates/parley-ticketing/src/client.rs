//! REST table API client.

use crate::error::{TicketingError, TicketingResult};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// The parts of a created or fetched record the saga needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRecord {
    pub sys_id: String,
    /// Human-readable number (`HRC0001234`), present on task-like tables.
    pub number: Option<String>,
}

impl TableRecord {
    fn from_result(table: &str, result: &Value) -> TicketingResult<Self> {
        let sys_id = result
            .get("sys_id")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| TicketingError::MissingField {
                table: table.to_string(),
                field: "sys_id",
            })?;
        let number = result
            .get("number")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        Ok(Self {
            sys_id: sys_id.to_string(),
            number,
        })
    }
}

#[derive(Deserialize)]
struct Envelope {
    result: Value,
}

/// Insert and fetch on named tables.
#[async_trait]
pub trait TicketingBackend: Send + Sync {
    async fn insert(&self, table: &str, body: Value) -> TicketingResult<TableRecord>;

    async fn fetch(&self, table: &str, sys_id: &str) -> TicketingResult<TableRecord>;
}

/// Client for `{base_url}/{table}` with basic auth.
pub struct TableClient {
    base_url: String,
    user: String,
    password: String,
    client: reqwest::Client,
}

impl TableClient {
    pub fn new(
        base_url: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
        timeout: Duration,
    ) -> TicketingResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            user: user.into(),
            password: password.into(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn read(&self, table: &str, res: reqwest::Response) -> TicketingResult<TableRecord> {
        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            warn!(table, status, "ticketing request failed");
            return Err(TicketingError::Status {
                table: table.to_string(),
                status,
                body,
            });
        }
        let envelope: Envelope = res.json().await?;
        TableRecord::from_result(table, &envelope.result)
    }
}

#[async_trait]
impl TicketingBackend for TableClient {
    async fn insert(&self, table: &str, body: Value) -> TicketingResult<TableRecord> {
        let url = format!("{}/{}", self.base_url, table);
        debug!(table, "ticketing insert");
        let res = self
            .client
            .post(&url)
            .basic_auth(&self.user, Some(&self.password))
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&body)
            .send()
            .await?;
        let record = self.read(table, res).await?;
        debug!(table, sys_id = %record.sys_id, "ticketing insert done");
        Ok(record)
    }

    async fn fetch(&self, table: &str, sys_id: &str) -> TicketingResult<TableRecord> {
        let url = format!("{}/{}/{}", self.base_url, table, sys_id);
        debug!(table, sys_id, "ticketing fetch");
        let res = self
            .client
            .get(&url)
            .basic_auth(&self.user, Some(&self.password))
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;
        self.read(table, res).await
    }
}
