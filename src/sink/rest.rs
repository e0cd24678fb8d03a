use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{error::AgentError, event::PlateRecord, sink::retry_bounded};

const MAX_ATTEMPTS: usize = 5;
const RETRY_DELAY: Duration = Duration::from_secs(2);

#[derive(Serialize)]
struct AuthRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct AuthResponse {
    token: String,
}

/// Authenticated REST backend. A fresh token is acquired for every
/// persistence attempt instead of being cached; stale-token failures are
/// impossible at the cost of one extra round trip per record.
pub struct RestSink {
    client: Client,
    auth_url: Url,
    insert_url: Url,
    username: String,
    password: String,
}

impl RestSink {
    pub fn new(
        client: Client,
        auth_url: Url,
        insert_url: Url,
        username: String,
        password: String,
    ) -> RestSink {
        RestSink {
            client,
            auth_url,
            insert_url,
            username,
            password,
        }
    }

    async fn authenticate(&self) -> Result<String, AgentError> {
        let response = self
            .client
            .post(self.auth_url.clone())
            .json(&AuthRequest {
                username: &self.username,
                password: &self.password,
            })
            .send()
            .await
            .map_err(|e| AgentError::Auth(format!("token request failed: {e}")))?;
        if response.status() != StatusCode::OK {
            return Err(AgentError::Auth(format!(
                "token endpoint HTTP status {}",
                response.status()
            )));
        }
        let body: AuthResponse = response
            .json()
            .await
            .map_err(|e| AgentError::Auth(format!("token missing from response: {e}")))?;
        Ok(body.token)
    }

    async fn insert(&self, record: &PlateRecord) -> Result<(), AgentError> {
        // Auth failure aborts the attempt before the insert POST.
        let token = self.authenticate().await?;
        let response = self
            .client
            .post(self.insert_url.clone())
            .bearer_auth(token)
            .json(record)
            .send()
            .await
            .map_err(|e| AgentError::Persistence(format!("insert request failed: {e}")))?;
        if response.status() != StatusCode::OK {
            return Err(AgentError::Persistence(format!(
                "insert endpoint HTTP status {}",
                response.status()
            )));
        }
        Ok(())
    }

    /// Retries the whole token-plus-insert operation up to the bound,
    /// fixed delay, no backoff. After exhaustion the event is gone from
    /// the sink's perspective; the snapshot is still on disk.
    pub async fn record(&self, record: &PlateRecord) -> Result<(), AgentError> {
        retry_bounded(MAX_ATTEMPTS, RETRY_DELAY, || self.insert(record)).await
    }
}
