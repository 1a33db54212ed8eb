use std::time::Duration;

use presence_common::{GatewayConfig, LightCommand};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

/// Total tries per command, with no delay between them.
pub const MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, Serialize)]
struct IntentRequest<'a> {
    what: LightCommand,
    auth: &'a str,
}

/// Why a single delivery attempt failed.
#[derive(Debug, thiserror::Error)]
pub enum AttemptError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("response is not valid JSON")]
    InvalidBody(#[from] serde_json::Error),
    #[error("response has no status field: {0}")]
    MissingStatus(String),
}

/// Every attempt failed; `last` is the error of the final one.
#[derive(Debug, thiserror::Error)]
#[error("gateway did not accept {command} after {attempts} attempts")]
pub struct GatewayError {
    pub command: LightCommand,
    pub attempts: u32,
    #[source]
    pub last: AttemptError,
}

#[derive(Debug, Clone)]
pub struct GatewayClient {
    http: reqwest::Client,
    url: String,
    auth: String,
}

impl GatewayClient {
    pub fn new(config: &GatewayConfig) -> reqwest::Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let http = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http,
            url: config.url.clone(),
            auth: config.auth.clone(),
        })
    }

    /// Posts `command` to the gateway and returns the reported status.
    pub async fn send(&self, command: LightCommand) -> Result<Value, GatewayError> {
        let payload = IntentRequest {
            what: command,
            auth: &self.auth,
        };

        let mut attempts = 1;
        loop {
            match self.post(&payload).await {
                Ok(status) => {
                    info!("request status: {status}");
                    return Ok(status);
                }
                Err(err) if attempts < MAX_ATTEMPTS => {
                    debug!("gateway attempt {attempts} for {command} failed: {err}");
                    attempts += 1;
                }
                Err(last) => {
                    return Err(GatewayError {
                        command,
                        attempts,
                        last,
                    })
                }
            }
        }
    }

    async fn post(&self, payload: &IntentRequest<'_>) -> Result<Value, AttemptError> {
        let body = self
            .http
            .post(&self.url)
            .json(payload)
            .send()
            .await?
            .bytes()
            .await?;

        let mut response: Value = serde_json::from_slice(&body)?;
        match response.get_mut("status") {
            Some(status) => Ok(status.take()),
            None => Err(AttemptError::MissingStatus(
                String::from_utf8_lossy(&body).into_owned(),
            )),
        }
    }
}
