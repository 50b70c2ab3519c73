// Allow-list gate
// Decides whether a question is close enough to a canonical question to be answered


use anyhow::{Result, anyhow};
use tracing::{debug, info};

use crate::embeddings::Embedder;

/// Lowercase a question and trim surrounding whitespace
///
/// Idempotent: `normalize_question(normalize_question(q)) == normalize_question(q)`.
#[inline]
pub fn normalize_question(question: &str) -> String {
    question.trim().to_lowercase()
}

/// Cosine similarity of two vectors, `0.0` when either has zero norm or the lengths differ
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (dot, norm_a, norm_b) = a
        .iter()
        .zip(b)
        .fold((0.0_f32, 0.0_f32, 0.0_f32), |(dot, na, nb), (x, y)| {
            (x.mul_add(*y, dot), x.mul_add(*x, na), y.mul_add(*y, nb))
        });

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// A canonical question with its embedding
#[derive(Debug, Clone, PartialEq)]
pub struct AllowListEntry {
    pub question: String,
    pub vector: Vec<f32>,
}

/// Outcome of checking a question against the allow list
#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    Allowed { topic: String, similarity: f32 },
    Rejected { best_similarity: f32 },
}

impl GateDecision {
    #[inline]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

/// Embedded canonical questions plus the acceptance threshold. Immutable once built.
#[derive(Debug, Clone)]
pub struct AllowList {
    entries: Vec<AllowListEntry>,
    threshold: f32,
}

impl AllowList {
    /// Embed every canonical question once
    ///
    /// Entries are kept in lexicographic order so that similarity ties resolve to the first one.
    #[inline]
    pub async fn build<I, S>(embedder: &dyn Embedder, canonical: I, threshold: f32) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut questions: Vec<String> = canonical.into_iter().map(Into::into).collect();
        questions.sort();
        questions.dedup();

        if questions.is_empty() {
            return Err(anyhow!("Allow list needs at least one canonical question"));
        }

        let vectors = embedder.embed_documents(&questions).await?;
        if vectors.len() != questions.len() {
            return Err(anyhow!(
                "Expected {} allow-list embeddings, got {}",
                questions.len(),
                vectors.len()
            ));
        }

        let entries = questions
            .into_iter()
            .zip(vectors)
            .map(|(question, vector)| AllowListEntry { question, vector })
            .collect::<Vec<_>>();

        info!(
            "Allow list ready with {} canonical questions (threshold {})",
            entries.len(),
            threshold
        );
        Ok(Self::from_entries(entries, threshold))
    }

    /// Build from precomputed entries, sorting them by question
    #[inline]
    pub fn from_entries(mut entries: Vec<AllowListEntry>, threshold: f32) -> Self {
        entries.sort_by(|a, b| a.question.cmp(&b.question));
        Self { entries, threshold }
    }

    #[inline]
    pub fn entries(&self) -> &[AllowListEntry] {
        &self.entries
    }

    #[inline]
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Embed the normalized question and compare it against every entry
    #[inline]
    pub async fn check(&self, embedder: &dyn Embedder, question: &str) -> Result<GateDecision> {
        let query = embedder.embed_query(&normalize_question(question)).await?;
        Ok(self.decide(&query))
    }

    /// Score a question embedding. Allowed iff the best similarity is at least the threshold.
    #[inline]
    pub fn decide(&self, query: &[f32]) -> GateDecision {
        let mut best: Option<(&AllowListEntry, f32)> = None;
        for entry in &self.entries {
            let similarity = cosine_similarity(query, &entry.vector);
            if best.is_none_or(|(_, top)| similarity > top) {
                best = Some((entry, similarity));
            }
        }

        match best {
            Some((entry, similarity)) if similarity >= self.threshold => {
                debug!(
                    "Question matched '{}' with similarity {:.4}",
                    entry.question, similarity
                );
                GateDecision::Allowed {
                    topic: entry.question.clone(),
                    similarity,
                }
            }
            Some((_, similarity)) => {
                debug!(
                    "Question rejected, best similarity {:.4} below {}",
                    similarity, self.threshold
                );
                GateDecision::Rejected {
                    best_similarity: similarity,
                }
            }
            None => GateDecision::Rejected {
                best_similarity: 0.0,
            },
        }
    }
}
