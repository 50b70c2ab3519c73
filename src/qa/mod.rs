// Question answering service
// Normalize, gate, then either refuse or delegate to the retrieval chain

#[cfg(test)]
mod tests;

use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info};

use crate::chain::{Chain, ChatTurn};
use crate::embeddings::Embedder;
use crate::gate::{AllowList, GateDecision, normalize_question};

/// Replies with the configured refusal text without consulting any model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefusalResponder {
    text: String,
}

impl RefusalResponder {
    #[inline]
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    #[inline]
    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Forwards the question to the retrieval chain
#[derive(Clone)]
pub struct DelegatingResponder {
    chain: Arc<dyn Chain>,
}

impl std::fmt::Debug for DelegatingResponder {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelegatingResponder").finish_non_exhaustive()
    }
}

impl DelegatingResponder {
    #[inline]
    pub fn new(chain: Arc<dyn Chain>) -> Self {
        Self { chain }
    }
}

/// What answers an admitted or rejected question
#[derive(Debug, Clone)]
pub enum Responder {
    Refusal(RefusalResponder),
    Delegating(DelegatingResponder),
}

impl Responder {
    #[inline]
    pub async fn answer(&self, question: &str, chat_history: &[ChatTurn]) -> Result<String> {
        match self {
            Self::Refusal(refusal) => Ok(refusal.text.clone()),
            Self::Delegating(delegating) => delegating.chain.invoke(question, chat_history).await,
        }
    }
}

/// Handles one question end to end. Shared read-only across requests.
pub struct QaService {
    allow_list: AllowList,
    embedder: Arc<dyn Embedder>,
    refusal: RefusalResponder,
    delegating: DelegatingResponder,
}

impl std::fmt::Debug for QaService {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QaService")
            .field("allow_list", &self.allow_list)
            .field("refusal", &self.refusal)
            .finish_non_exhaustive()
    }
}

impl QaService {
    #[inline]
    pub fn new(
        allow_list: AllowList,
        embedder: Arc<dyn Embedder>,
        chain: Arc<dyn Chain>,
        refusal_text: impl Into<String>,
    ) -> Self {
        Self {
            allow_list,
            embedder,
            refusal: RefusalResponder::new(refusal_text),
            delegating: DelegatingResponder::new(chain),
        }
    }

    #[inline]
    pub fn allow_list(&self) -> &AllowList {
        &self.allow_list
    }

    /// Pick the responder for a gate decision
    #[inline]
    pub fn responder_for(&self, decision: &GateDecision) -> Responder {
        if decision.is_allowed() {
            Responder::Delegating(self.delegating.clone())
        } else {
            Responder::Refusal(self.refusal.clone())
        }
    }

    /// Answer a question, refusing anything the allow list does not admit
    ///
    /// Admitted questions reach the chain normalized, with the history untouched.
    #[inline]
    pub async fn handle(&self, question: &str, chat_history: &[ChatTurn]) -> Result<String> {
        let normalized = normalize_question(question);
        let decision = self
            .allow_list
            .check(self.embedder.as_ref(), &normalized)
            .await?;

        match &decision {
            GateDecision::Allowed { topic, similarity } => {
                info!("Question admitted as '{}' ({:.3})", topic, similarity);
            }
            GateDecision::Rejected { best_similarity } => {
                info!("Question refused (best similarity {:.3})", best_similarity);
            }
        }

        let answer = self
            .responder_for(&decision)
            .answer(&normalized, chat_history)
            .await?;
        debug!("Answer has {} characters", answer.chars().count());
        Ok(answer)
    }
}
