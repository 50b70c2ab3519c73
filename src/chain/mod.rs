// Conversational retrieval chain
// Condense follow-ups, retrieve context, ask the chat model for the answer


use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::debug;

use crate::llm::{ChatMessage, ChatModel};
use crate::retriever::DocumentRetriever;

const CONDENSE_QUESTION_TEMPLATE: &str = "Given the following conversation and a follow up question, \
rephrase the follow up question to be a standalone question, in its original language.";

const ANSWER_SYSTEM_TEMPLATE: &str = "Use the following pieces of context to answer the user's question. \n\
If you don't know the answer, just say that you don't know, don't try to make up an answer.\n\
----------------\n";

/// Separator between retrieved chunks in the answer prompt
const CONTEXT_SEPARATOR: &str = "\n\n";

/// One entry of the conversation history
///
/// Accepts `["human text", "ai text"]` pairs or `{"role"|"type": ..., "content": ...}` messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatTurn {
    Pair(String, String),
    Message(TurnMessage),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnMessage {
    #[serde(alias = "type")]
    pub role: String,
    pub content: String,
}

impl ChatTurn {
    /// Expand into chat messages for the model
    #[inline]
    pub fn to_messages(&self) -> Vec<ChatMessage> {
        match self {
            Self::Pair(human, ai) => vec![ChatMessage::user(human), ChatMessage::assistant(ai)],
            Self::Message(message) => vec![message.to_chat_message()],
        }
    }
}

impl TurnMessage {
    #[inline]
    pub fn to_chat_message(&self) -> ChatMessage {
        match self.role.to_lowercase().as_str() {
            "ai" | "assistant" => ChatMessage::assistant(&self.content),
            "system" => ChatMessage::system(&self.content),
            _ => ChatMessage::user(&self.content),
        }
    }
}

/// Answers a question given the conversation so far
#[async_trait]
pub trait Chain: Send + Sync {
    async fn invoke(&self, question: &str, chat_history: &[ChatTurn]) -> Result<String>;
}

pub struct ConversationalRetrievalChain {
    llm: Arc<dyn ChatModel>,
    retriever: Arc<dyn DocumentRetriever>,
}

impl std::fmt::Debug for ConversationalRetrievalChain {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationalRetrievalChain")
            .finish_non_exhaustive()
    }
}

impl ConversationalRetrievalChain {
    #[inline]
    pub fn new(llm: Arc<dyn ChatModel>, retriever: Arc<dyn DocumentRetriever>) -> Self {
        Self { llm, retriever }
    }

    /// Rewrite a follow-up into a question that stands on its own
    async fn condense_question(&self, question: &str, chat_history: &[ChatTurn]) -> Result<String> {
        let prompt = format!(
            "{}\n\nChat History:\n{}\nFollow Up Input: {}\nStandalone question:",
            CONDENSE_QUESTION_TEMPLATE,
            format_history(chat_history),
            question
        );

        let standalone = self.llm.complete(&[ChatMessage::user(prompt)]).await?;
        debug!("Condensed follow-up into: {}", standalone);
        Ok(standalone)
    }
}

#[async_trait]
impl Chain for ConversationalRetrievalChain {
    async fn invoke(&self, question: &str, chat_history: &[ChatTurn]) -> Result<String> {
        let standalone = if chat_history.is_empty() {
            question.to_string()
        } else {
            self.condense_question(question, chat_history).await?
        };

        let chunks = self.retriever.retrieve(&standalone).await?;
        debug!("Answering with {} context chunks", chunks.len());

        let context = chunks
            .iter()
            .map(|chunk| chunk.content.as_str())
            .collect::<Vec<_>>()
            .join(CONTEXT_SEPARATOR);

        let messages = [
            ChatMessage::system(format!("{}{}", ANSWER_SYSTEM_TEMPLATE, context)),
            ChatMessage::user(standalone),
        ];

        self.llm.complete(&messages).await
    }
}

/// Render history as `Human:`/`Assistant:` lines for the condense prompt
#[inline]
pub fn format_history(chat_history: &[ChatTurn]) -> String {
    let mut rendered = String::new();
    for message in chat_history.iter().flat_map(ChatTurn::to_messages) {
        let speaker = match message.role.as_str() {
            "assistant" => "Assistant",
            "system" => "System",
            _ => "Human",
        };
        let _ = writeln!(rendered, "{}: {}", speaker, message.content);
    }
    rendered
}
