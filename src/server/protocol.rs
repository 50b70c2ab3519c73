use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::chain::ChatTurn;

/// Input accepted by every `/chat` endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatInput {
    pub question: String,
    #[serde(default)]
    pub chat_history: Vec<ChatTurn>,
}

/// `POST /chat/invoke` and `POST /chat/stream` body
#[derive(Debug, Clone, Deserialize)]
pub struct InvokeRequest {
    pub input: ChatInput,
    /// Runnable config; accepted and ignored
    #[serde(default)]
    pub config: Option<Value>,
}

/// `POST /chat/batch` body
#[derive(Debug, Clone, Deserialize)]
pub struct BatchRequest {
    pub inputs: Vec<ChatInput>,
    #[serde(default)]
    pub config: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatOutput {
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub run_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvokeResponse {
    pub output: ChatOutput,
    pub metadata: RunMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchMetadata {
    pub run_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResponse {
    pub output: Vec<ChatOutput>,
    pub metadata: BatchMetadata,
}
