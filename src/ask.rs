//! Query pipeline: embed the question, pull the nearest documents, and have
//! the analyzer answer from their contexts.

use anyhow::{bail, Result};
use serde::Serialize;

use crate::analyzer::analyze;
use crate::config::Config;
use crate::embedding::embed_text;
use crate::models::Document;
use crate::outcome::Outcome;
use crate::providers::Providers;
use crate::store::DocumentStore;

/// Answer returned when retrieval finds nothing.
pub const NO_RELEVANT_INFORMATION: &str =
    "I couldn't find any relevant information in the project memory.";

#[derive(Debug, Clone, Serialize)]
pub struct AskResponse {
    pub answer: String,
    /// Filenames the answer was drawn from, nearest first. Absent when
    /// nothing relevant was found.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<String>>,
    /// Whether `answer` came from the model; not part of the wire format.
    #[serde(skip)]
    pub outcome: Outcome,
}

impl AskResponse {
    fn nothing_found() -> Self {
        Self {
            answer: NO_RELEVANT_INFORMATION.to_string(),
            sources: None,
            outcome: Outcome::Success,
        }
    }
}

pub async fn ask(config: &Config, providers: &Providers, query: &str) -> Result<AskResponse> {
    if query.trim().is_empty() {
        bail!("query must not be empty");
    }

    let query_embedding = embed_text(providers.embedder.as_ref(), query).await;

    let store = DocumentStore::open(config).await?;
    let docs = retrieve(&store, &query_embedding.value, config.retrieval.top_k).await;
    store.close().await;
    let docs = docs?;

    if docs.is_empty() {
        tracing::info!("no documents matched query");
        return Ok(AskResponse::nothing_found());
    }

    let prompt = build_prompt(query, &docs);
    let answer = analyze(providers.analyzer.as_ref(), &prompt).await;

    Ok(AskResponse {
        answer: answer.value,
        sources: Some(docs.into_iter().map(|d| d.filename).collect()),
        outcome: answer.outcome,
    })
}

/// Nearest documents for `embedding`, in distance order.
///
/// Ids present in the vector table but missing from `documents` drop out
/// here, so the result can be shorter than the neighbor list.
async fn retrieve(store: &DocumentStore, embedding: &[f32], k: i64) -> Result<Vec<Document>> {
    let neighbors = store.nearest(embedding, k).await?;
    if neighbors.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<i64> = neighbors.iter().map(|n| n.id).collect();
    store.fetch(&ids).await
}

fn build_prompt(query: &str, docs: &[Document]) -> String {
    let mut context = String::from("Based on the following project data:\n\n");
    for doc in docs {
        context.push_str(&format!(
            "- Document: {}\n  Content: {}\n\n",
            doc.filename,
            doc.context_text()
        ));
    }

    format!(
        "Answer the following question: '{}' based on this context:\n{}",
        query, context
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContextSnapshot;

    #[test]
    fn test_prompt_lists_documents_in_order() {
        let docs: Vec<Document> = [("b.pdf", "second"), ("a.mov", "first")]
            .iter()
            .enumerate()
            .map(|(i, (name, ctx))| Document {
                id: i as i64,
                filename: name.to_string(),
                content: serde_json::to_string(&ContextSnapshot {
                    filename: name.to_string(),
                    context: ctx.to_string(),
                    timestamp: 0.0,
                })
                .unwrap(),
            })
            .collect();

        let prompt = build_prompt("what changed?", &docs);
        assert!(prompt.starts_with("Answer the following question: 'what changed?' based on this context:\nBased on the following project data:\n\n"));
        let b = prompt.find("- Document: b.pdf\n  Content: second").unwrap();
        let a = prompt.find("- Document: a.mov\n  Content: first").unwrap();
        assert!(b < a);
    }

    #[test]
    fn test_nothing_found_omits_sources() {
        let json = serde_json::to_value(AskResponse::nothing_found()).unwrap();
        assert_eq!(json, serde_json::json!({"answer": NO_RELEVANT_INFORMATION}));
    }
}
