//! In-memory `ToolCatalog`/`ToolIndex`/`Embedder` fakes for tests.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::PipelineError;

use super::{CandidateTool, Embedder, ToolCatalog, ToolIndex, ToolSpec};

pub struct InMemoryCatalog {
    tools: HashMap<String, ToolSpec>,
}

impl InMemoryCatalog {
    pub fn new(tools: Vec<ToolSpec>) -> Self {
        Self {
            tools: tools.into_iter().map(|t| (t.name.clone(), t)).collect(),
        }
    }
}

#[async_trait]
impl ToolCatalog for InMemoryCatalog {
    async fn get_by_name(&self, name: &str) -> Option<ToolSpec> {
        self.tools.get(name).cloned()
    }

    async fn get_all(&self) -> Vec<ToolSpec> {
        self.tools.values().cloned().collect()
    }
}

pub struct InMemoryIndex {
    rows: Vec<CandidateTool>,
}

impl InMemoryIndex {
    pub fn new(rows: Vec<CandidateTool>) -> Self {
        Self { rows }
    }
}

#[async_trait]
impl ToolIndex for InMemoryIndex {
    async fn retrieve_candidates(
        &self,
        query_text: &str,
        _query_vector: Option<&[f32]>,
        platform_filter: Option<&str>,
        max_rows: usize,
    ) -> Result<Vec<CandidateTool>, PipelineError> {
        let query_lower = query_text.to_lowercase();
        let mut scored: Vec<(f64, &CandidateTool)> = self
            .rows
            .iter()
            .filter(|row| match (platform_filter, &row.platform) {
                (Some(filter), Some(platform)) => filter.eq_ignore_ascii_case(platform),
                (Some(_), None) => false,
                (None, _) => true,
            })
            .map(|row| {
                let mut score = 0.0;
                let haystack = format!("{} {} {}", row.name, row.desc, row.tags.join(" ")).to_lowercase();
                for word in query_lower.split_whitespace() {
                    if haystack.contains(word) {
                        score += 1.0;
                    }
                }
                (score, row)
            })
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap());
        Ok(scored.into_iter().take(max_rows).map(|(_, row)| row.clone()).collect())
    }

    async fn catalog_size(&self) -> usize {
        self.rows.len()
    }
}

/// A deterministic fake embedder: hashes words into a small fixed-size
/// vector so cosine similarity is meaningful for tests without pulling
/// in a real model.
pub struct FakeEmbedder {
    dim: usize,
}

impl FakeEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, PipelineError> {
        let mut vector = vec![0.0f32; self.dim];
        for word in text.to_lowercase().split_whitespace() {
            let hash: usize = word.bytes().map(|b| b as usize).sum();
            vector[hash % self.dim] += 1.0;
        }
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dim
    }
}

/// An embedder that always fails, for exercising keyword-only fallback.
pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, PipelineError> {
        Err(PipelineError::Embedding("embedding backend unreachable".to_string()))
    }

    fn dimension(&self) -> usize {
        0
    }
}
