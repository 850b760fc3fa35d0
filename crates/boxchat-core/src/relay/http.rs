//! HTTP relay client on reqwest

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;

use super::{AuthRequest, OutgoingPayload, RelayApi, RelayError, ServerMessage};
use crate::error::{ChatError, ChatResult};

#[derive(Debug, Deserialize)]
struct AuthResponse {
    ok: bool,
    #[serde(default)]
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    ok: bool,
    #[serde(default)]
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default = "default_ok")]
    ok: bool,
}

fn default_ok() -> bool {
    true
}

/// [`RelayApi`] over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpRelay {
    client: Client,
    base_url: String,
}

impl HttpRelay {
    /// Build a client for the relay at `base_url` with a per-request timeout.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> ChatResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChatError::Unknown(format!("HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

fn transport_error(e: reqwest::Error) -> RelayError {
    if e.is_decode() {
        RelayError::Decode(e.to_string())
    } else {
        RelayError::Unreachable(e.to_string())
    }
}

/// Map non-success statuses onto [`RelayError`].
async fn check_status(response: Response) -> Result<Response, RelayError> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(RelayError::Unauthorized {
            status: status.as_u16(),
        });
    }
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(RelayError::Http {
            status: status.as_u16(),
            message,
        });
    }
    Ok(response)
}

async fn read_json<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, RelayError> {
    let bytes = response.bytes().await.map_err(transport_error)?;
    serde_json::from_slice(&bytes).map_err(|e| RelayError::Decode(e.to_string()))
}

#[async_trait]
impl RelayApi for HttpRelay {
    async fn authenticate(&self, request: &AuthRequest) -> Result<String, RelayError> {
        let response = self
            .client
            .post(self.url("/auth"))
            .json(request)
            .send()
            .await
            .map_err(transport_error)?;
        let body: AuthResponse = read_json(check_status(response).await?).await?;

        match body.token {
            Some(token) if body.ok && !token.is_empty() => Ok(token),
            _ => Err(RelayError::Rejected("auth did not return a token".to_string())),
        }
    }

    async fn fetch_messages(&self, token: &str) -> Result<Vec<ServerMessage>, RelayError> {
        let response = self
            .client
            .get(self.url("/user/messages"))
            .bearer_auth(token)
            .send()
            .await
            .map_err(transport_error)?;
        read_json(check_status(response).await?).await
    }

    async fn send_message(
        &self,
        token: &str,
        payload: &OutgoingPayload,
    ) -> Result<String, RelayError> {
        let body = payload.to_msgpack()?;
        let response = self
            .client
            .post(self.url("/message"))
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(body)
            .send()
            .await
            .map_err(transport_error)?;
        let body: SendResponse = read_json(check_status(response).await?).await?;

        match body.id {
            Some(id) if body.ok && !id.is_empty() => Ok(id),
            _ => Err(RelayError::Rejected("send did not return an id".to_string())),
        }
    }

    async fn acknowledge(&self, token: &str, ids: &[String]) -> Result<(), RelayError> {
        let response = self
            .client
            .post(self.url("/message/read"))
            .bearer_auth(token)
            .json(ids)
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response).await?;

        // Empty body or missing `ok` counts as success.
        let bytes = response.bytes().await.map_err(transport_error)?;
        if bytes.is_empty() {
            return Ok(());
        }
        match serde_json::from_slice::<Envelope>(&bytes) {
            Ok(Envelope { ok: false }) => Err(RelayError::Rejected("ack refused".to_string())),
            _ => Ok(()),
        }
    }
}
