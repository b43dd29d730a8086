//! Context retrieval for the knowledge handler.
//!
//! Retrievers never fail: an unavailable source, an empty index, or a query
//! with no matches all yield [`NO_RESULTS`].

pub mod local;
pub mod web;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{Result, ServiceError};
use crate::infer::{Inference, TaskHint};
use crate::prompts::{render, PromptSet};

pub use local::{Chunk, LocalIndex};
pub use web::DuckDuckGoRetriever;

/// Sentinel returned when no source produced any context.
pub const NO_RESULTS: &str = "No results found.";

/// Retrieval settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Index text documents under the data root.
    pub local_enabled: bool,
    /// Add DuckDuckGo text-search results to knowledge context.
    pub web_enabled: bool,
    pub max_results: usize,
    /// Chunk size in characters.
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            local_enabled: true,
            web_enabled: true,
            max_results: 3,
            chunk_size: 1000,
            chunk_overlap: 100,
        }
    }
}

impl RetrievalConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_results == 0 {
            return Err(ServiceError::Config(
                "retrieval.max_results must be greater than zero".into(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(ServiceError::Config(
                "retrieval.chunk_size must be greater than zero".into(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ServiceError::Config(format!(
                "retrieval.chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// A source of context text for a query.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query: &str) -> String;
}

/// Queries several labelled sources in order and joins what they found.
#[derive(Default)]
pub struct CompositeRetriever {
    sources: Vec<(String, Arc<dyn Retriever>)>,
}

impl CompositeRetriever {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, label: impl Into<String>, source: Arc<dyn Retriever>) -> Self {
        self.sources.push((label.into(), source));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[async_trait]
impl Retriever for CompositeRetriever {
    async fn retrieve(&self, query: &str) -> String {
        let mut sections = Vec::new();
        for (label, source) in &self.sources {
            let text = source.retrieve(query).await;
            if text.trim().is_empty() || text == NO_RESULTS {
                debug!(source = %label, "retrieval source returned nothing");
                continue;
            }
            sections.push(format!("## {label}\n{text}"));
        }
        if sections.is_empty() {
            NO_RESULTS.to_string()
        } else {
            sections.join("\n\n")
        }
    }
}

/// Terminal handler for knowledge queries: retrieve context, then answer.
pub struct KnowledgeHandler {
    retriever: Arc<dyn Retriever>,
    infer: Arc<dyn Inference>,
    prompts: Arc<PromptSet>,
}

impl KnowledgeHandler {
    pub fn new(
        retriever: Arc<dyn Retriever>,
        infer: Arc<dyn Inference>,
        prompts: Arc<PromptSet>,
    ) -> Self {
        Self {
            retriever,
            infer,
            prompts,
        }
    }

    pub async fn research(&self, query: &str) -> String {
        let context = self.retriever.retrieve(query).await;
        debug!(
            context_chars = context.len(),
            found = context != NO_RESULTS,
            "knowledge context retrieved"
        );
        let prompt = render(
            &self.prompts.research,
            &[
                ("query", query),
                ("context", context.as_str()),
                ("no_results", NO_RESULTS),
            ],
        );
        self.infer.infer(&prompt, TaskHint::General).await
    }
}
