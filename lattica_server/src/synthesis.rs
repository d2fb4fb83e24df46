//! Answer synthesis from fused retrieval context.
//!
//! When an LLM collaborator is configured and enabled, the synthesizer asks
//! it to answer from the retrieved evidence. On any failure — or with the
//! collaborator absent or disabled — it falls back to returning the fused
//! context itself as the answer body with `degraded = true`, so the query
//! path never depends on the LLM being up.

use std::sync::Arc;

use tracing::warn;

use lattica_core::RankedContext;
use lattica_extraction::LlmCollaborator;

const SYNTHESIS_SYSTEM_PROMPT: &str = "Answer the question using only the provided context \
passages. Be concise. If the context does not contain the answer, say so.";

/// A synthesized answer plus its degradation flag.
#[derive(Debug, Clone)]
pub struct SynthesizedAnswer {
    /// Answer body.
    pub answer: String,
    /// True when the LLM was skipped or failed and the raw context was
    /// returned instead.
    pub degraded: bool,
}

/// Answer synthesizer over an optional LLM collaborator.
pub struct AnswerSynthesizer {
    llm: Option<Arc<dyn LlmCollaborator>>,
}

impl AnswerSynthesizer {
    /// Create a synthesizer. `None` disables LLM synthesis entirely.
    pub fn new(llm: Option<Arc<dyn LlmCollaborator>>) -> Self {
        Self { llm }
    }

    /// Produce an answer for `query` from the fused context.
    pub async fn synthesize(&self, query: &str, context: &RankedContext) -> SynthesizedAnswer {
        if context.chunks.is_empty() {
            return SynthesizedAnswer {
                answer: String::new(),
                degraded: true,
            };
        }
        let Some(llm) = &self.llm else {
            return SynthesizedAnswer {
                answer: context_fallback(context),
                degraded: true,
            };
        };
        let prompt = build_prompt(query, context);
        match llm.complete(SYNTHESIS_SYSTEM_PROMPT, &prompt).await {
            Ok(answer) if !answer.trim().is_empty() => SynthesizedAnswer {
                answer: answer.trim().to_string(),
                degraded: false,
            },
            Ok(_) => SynthesizedAnswer {
                answer: context_fallback(context),
                degraded: true,
            },
            Err(err) => {
                warn!(error = %err, "answer synthesis failed, returning fused context");
                SynthesizedAnswer {
                    answer: context_fallback(context),
                    degraded: true,
                }
            }
        }
    }
}

fn build_prompt(query: &str, context: &RankedContext) -> String {
    let mut prompt = String::new();
    prompt.push_str("Context passages:\n");
    for (i, scored) in context.chunks.iter().enumerate() {
        prompt.push_str(&format!("[{}] {}\n", i + 1, scored.chunk.text));
    }
    if !context.paths.is_empty() {
        prompt.push_str("\nKnowledge-graph paths:\n");
        for path in &context.paths {
            prompt.push_str(&format!(
                "- {} (confidence {:.2})\n",
                path.entities.join(" → "),
                path.confidence
            ));
        }
    }
    prompt.push_str(&format!("\nQuestion: {query}\n"));
    prompt
}

/// The degraded answer body: the top fused passages, stitched together.
fn context_fallback(context: &RankedContext) -> String {
    context
        .chunks
        .iter()
        .take(3)
        .map(|scored| scored.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}
