use super::*;
use crate::gate::AllowListEntry;
use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

const REFUSAL: &str = "Sorry, I can only answer questions about refunds and shipping.";

/// Maps anything mentioning refunds or shipping onto the matching axis, everything else elsewhere
struct KeywordEmbedder;

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                if text.contains("refund") {
                    vec![1.0, 0.0, 0.0]
                } else if text.contains("shipping") {
                    vec![0.0, 1.0, 0.0]
                } else {
                    vec![0.0, 0.0, 1.0]
                }
            })
            .collect())
    }
}

#[derive(Default)]
struct CountingChain {
    calls: AtomicUsize,
    received: Mutex<Vec<(String, Vec<ChatTurn>)>>,
}

impl CountingChain {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Chain for CountingChain {
    async fn invoke(&self, question: &str, chat_history: &[ChatTurn]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.received
            .lock()
            .expect("lock should not be poisoned")
            .push((question.to_string(), chat_history.to_vec()));
        Ok(format!("generated answer for {}", question))
    }
}

struct FailingChain;

#[async_trait]
impl Chain for FailingChain {
    async fn invoke(&self, _question: &str, _chat_history: &[ChatTurn]) -> Result<String> {
        Err(anyhow::anyhow!("model unavailable"))
    }
}

fn allow_list() -> AllowList {
    AllowList::from_entries(
        vec![
            AllowListEntry {
                question: "refund policy".to_string(),
                vector: vec![1.0, 0.0, 0.0],
            },
            AllowListEntry {
                question: "shipping times".to_string(),
                vector: vec![0.0, 1.0, 0.0],
            },
        ],
        0.85,
    )
}

fn service(chain: Arc<dyn Chain>) -> QaService {
    QaService::new(allow_list(), Arc::new(KeywordEmbedder), chain, REFUSAL)
}

#[tokio::test]
async fn rejected_question_gets_refusal_and_never_reaches_chain() {
    let chain = Arc::new(CountingChain::default());
    let qa = service(Arc::clone(&chain) as Arc<dyn Chain>);

    let answer = qa
        .handle("What programming language is this", &[])
        .await
        .expect("refusal is not an error");

    assert_eq!(answer, REFUSAL);
    assert_eq!(chain.calls(), 0);
}

#[tokio::test]
async fn admitted_question_is_normalized_and_history_is_untouched() {
    let chain = Arc::new(CountingChain::default());
    let qa = service(Arc::clone(&chain) as Arc<dyn Chain>);
    let history = vec![
        ChatTurn::Pair("Hello".to_string(), "Hi there".to_string()),
        ChatTurn::Message(crate::chain::TurnMessage {
            role: "user".to_string(),
            content: "  Mixed CASE stays  ".to_string(),
        }),
    ];

    let answer = qa
        .handle("  What is your REFUND policy?  ", &history)
        .await
        .expect("chain should answer");

    assert_eq!(answer, "generated answer for what is your refund policy?");
    assert_eq!(chain.calls(), 1);
    let received = chain.received.lock().expect("lock should not be poisoned");
    assert_eq!(received[0].0, "what is your refund policy?");
    assert_eq!(received[0].1, history);
}

#[tokio::test]
async fn canonical_question_is_admitted() {
    let chain = Arc::new(CountingChain::default());
    let qa = service(Arc::clone(&chain) as Arc<dyn Chain>);

    let answer = qa
        .handle("shipping times", &[])
        .await
        .expect("chain should answer");

    assert_ne!(answer, REFUSAL);
    assert_eq!(chain.calls(), 1);
}

#[tokio::test]
async fn chain_failure_propagates() {
    let qa = service(Arc::new(FailingChain));

    let result = qa.handle("refund policy", &[]).await;

    assert!(result.is_err());
}

#[tokio::test]
async fn refusal_does_not_depend_on_chain_health() {
    let qa = service(Arc::new(FailingChain));

    let answer = qa
        .handle("tell me a joke", &[])
        .await
        .expect("refusal should not touch the chain");

    assert_eq!(answer, REFUSAL);
}

#[test]
fn responder_selection_follows_decision() {
    let qa = service(Arc::new(CountingChain::default()));

    let allowed = qa.responder_for(&GateDecision::Allowed {
        topic: "refund policy".to_string(),
        similarity: 0.9,
    });
    let rejected = qa.responder_for(&GateDecision::Rejected {
        best_similarity: 0.2,
    });

    assert!(matches!(allowed, Responder::Delegating(_)));
    match rejected {
        Responder::Refusal(refusal) => assert_eq!(refusal.text(), REFUSAL),
        other => panic!("expected refusal responder, got {:?}", other),
    }
}

#[tokio::test]
async fn refusal_responder_ignores_input() {
    let responder = Responder::Refusal(RefusalResponder::new(REFUSAL));

    let answer = responder
        .answer("anything", &[ChatTurn::Pair("a".to_string(), "b".to_string())])
        .await
        .expect("refusal should succeed");

    assert_eq!(answer, REFUSAL);
}
