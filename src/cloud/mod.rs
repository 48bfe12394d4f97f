//! Cloud Client (C2): the opaque remote memory API. Only the interface is
//! specified — this module provides an HTTP implementation and a demo/
//! offline substitute with the same contract (§4.2).

mod demo_client;
mod http_client;

use std::collections::HashMap;

use async_trait::async_trait;

pub use demo_client::DemoCloudClient;
pub use http_client::HttpCloudClient;

use crate::error::CloudError;
use crate::model::{ChatMessage, Memory, WriteInput};

/// Text payload for `add_memory`: either raw content or a message transcript.
#[derive(Debug, Clone)]
pub enum AddMemoryContent {
    Content(String),
    Messages(Vec<ChatMessage>),
}

impl From<WriteInput> for AddMemoryContent {
    fn from(input: WriteInput) -> Self {
        match input {
            WriteInput::Content(text) => AddMemoryContent::Content(text),
            WriteInput::Messages(messages) => AddMemoryContent::Messages(messages),
        }
    }
}

/// Contract shared by the HTTP-backed cloud client and the in-memory demo
/// substitute (§4.2). The rest of the system MUST NOT branch on which impl
/// is in play.
#[async_trait]
pub trait CloudClient: Send + Sync {
    async fn add_memory(
        &self,
        user_id: &str,
        content: AddMemoryContent,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Result<Vec<Memory>, CloudError>;

    async fn search(&self, user_id: &str, query: &str, limit: usize) -> Result<Vec<Memory>, CloudError>;

    async fn get(&self, user_id: &str, id: &str) -> Result<Memory, CloudError>;

    async fn list_all(&self, user_id: &str, limit: usize) -> Result<Vec<Memory>, CloudError>;

    async fn delete(&self, user_id: &str, id: &str) -> Result<(), CloudError>;

    /// Whether this is the demo/offline substitute — used only by the
    /// Degradation Controller to report mode, never to change request shape.
    fn is_demo(&self) -> bool {
        false
    }
}
