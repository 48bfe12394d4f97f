//! HTTP-backed `CloudClient` (§4.2), modeled on the teacher's
//! `llm::openai_compatible::OpenAiCompatibleProvider`: a `reqwest::Client`,
//! a retry-with-backoff wrapper around a single internal request function,
//! and response normalization for a remote API whose exact response shape
//! varies by endpoint.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::cloud::{AddMemoryContent, CloudClient};
use crate::error::CloudError;
use crate::model::{ChatMessage, Memory};

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 250;

pub struct HttpCloudClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpCloudClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Result<Self, CloudError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CloudError::Network(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn classify_status(status: StatusCode, body: &str) -> CloudError {
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            CloudError::Auth(format!("status {}: {}", status.as_u16(), body))
        } else if status.is_client_error() {
            CloudError::Client {
                status: status.as_u16(),
                message: body.to_string(),
            }
        } else {
            CloudError::Server {
                status: status.as_u16(),
                message: body.to_string(),
            }
        }
    }

    /// Send `request`, retrying up to [`MAX_RETRIES`] times with jittered
    /// exponential backoff on retryable errors only (§4.2).
    async fn send_with_retry<T: Serialize + ?Sized, R: for<'de> Deserialize<'de>>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<&T>,
    ) -> Result<R, CloudError> {
        let mut delay_ms = INITIAL_BACKOFF_MS;

        for attempt in 0..=MAX_RETRIES {
            match self.send_once(method.clone(), path, body).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if attempt == MAX_RETRIES || !err.is_retryable() {
                        return Err(err);
                    }
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_retries = MAX_RETRIES,
                        delay_ms,
                        error = %err,
                        "cloud request failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    let jitter = (delay_ms as f64 * 0.2) as u64;
                    delay_ms = (delay_ms * 2).saturating_add(jitter);
                }
            }
        }
        unreachable!("loop always returns on final attempt")
    }

    async fn send_once<T: Serialize + ?Sized, R: for<'de> Deserialize<'de>>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<&T>,
    ) -> Result<R, CloudError> {
        let mut builder = self
            .client
            .request(method, self.url(path))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json");
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| CloudError::Network(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| CloudError::InvalidResponse(e.to_string()))?;

        if !status.is_success() {
            return Err(Self::classify_status(status, &text));
        }

        serde_json::from_str(&text).map_err(|e| {
            CloudError::InvalidResponse(format!("{e}: {}", truncate(&text, 200)))
        })
    }
}

fn truncate(s: &str, max: usize) -> String {
    crate::util::truncate_preview(s, max).to_string()
}

/// The remote API may return either a bare array or an envelope with a
/// `results` or `memories` field (§4.2) — this enum normalizes both.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MemoryListResponse {
    Bare(Vec<Memory>),
    Results { results: Vec<Memory> },
    Memories { memories: Vec<Memory> },
}

impl MemoryListResponse {
    fn into_vec(self) -> Vec<Memory> {
        match self {
            MemoryListResponse::Bare(v) => v,
            MemoryListResponse::Results { results } => results,
            MemoryListResponse::Memories { memories } => memories,
        }
    }
}

#[derive(Debug, Serialize)]
struct AddMemoryRequest<'a> {
    user_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    messages: Option<&'a [ChatMessage]>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    metadata: HashMap<String, serde_json::Value>,
}

#[async_trait]
impl CloudClient for HttpCloudClient {
    async fn add_memory(
        &self,
        user_id: &str,
        content: AddMemoryContent,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Result<Vec<Memory>, CloudError> {
        let (content_ref, messages_ref);
        match &content {
            AddMemoryContent::Content(text) => {
                content_ref = Some(text.as_str());
                messages_ref = None;
            }
            AddMemoryContent::Messages(messages) => {
                content_ref = None;
                messages_ref = Some(messages.as_slice());
            }
        }
        let request = AddMemoryRequest {
            user_id,
            content: content_ref,
            messages: messages_ref,
            metadata,
        };
        let response: MemoryListResponse = self
            .send_with_retry(reqwest::Method::POST, "v1/memories", Some(&request))
            .await?;
        Ok(response.into_vec())
    }

    async fn search(&self, user_id: &str, query: &str, limit: usize) -> Result<Vec<Memory>, CloudError> {
        let path = format!(
            "v1/memories/search?user_id={}&query={}&limit={}",
            urlencode(user_id),
            urlencode(query),
            limit
        );
        let response: MemoryListResponse = self
            .send_with_retry::<(), _>(reqwest::Method::GET, &path, None)
            .await?;
        Ok(response.into_vec())
    }

    async fn get(&self, user_id: &str, id: &str) -> Result<Memory, CloudError> {
        let path = format!("v1/memories/{}?user_id={}", urlencode(id), urlencode(user_id));
        self.send_with_retry::<(), _>(reqwest::Method::GET, &path, None).await
    }

    async fn list_all(&self, user_id: &str, limit: usize) -> Result<Vec<Memory>, CloudError> {
        let path = format!("v1/memories?user_id={}&limit={}", urlencode(user_id), limit);
        let response: MemoryListResponse = self
            .send_with_retry::<(), _>(reqwest::Method::GET, &path, None)
            .await?;
        Ok(response.into_vec())
    }

    async fn delete(&self, user_id: &str, id: &str) -> Result<(), CloudError> {
        let path = format!("v1/memories/{}?user_id={}", urlencode(id), urlencode(user_id));
        let _: serde_json::Value = self
            .send_with_retry::<(), _>(reqwest::Method::DELETE, &path, None)
            .await?;
        Ok(())
    }
}

fn urlencode(s: &str) -> String {
    percent_encode(s)
}

/// Minimal percent-encoding for query parameters. The cloud API is treated
/// as opaque (§1): no URL crate dependency is pulled in just for this.
fn percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
