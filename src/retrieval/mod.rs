//! Tool catalog, tool index, and embedder collaborators (§4.6), plus
//! token-budgeted candidate retrieval.

pub mod testing;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::RetrievalConfig;
use crate::error::PipelineError;

/// Authoritative tool specification, as served by the `ToolCatalog`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub platform: Option<String>,
    pub capabilities: Vec<String>,
    pub inputs_needed: Vec<String>,
    pub permission_level: String,
    pub production_safe: bool,
    pub dependencies: Vec<String>,
}

/// Read-only authoritative tool specifications.
#[async_trait]
pub trait ToolCatalog: Send + Sync {
    async fn get_by_name(&self, name: &str) -> Option<ToolSpec>;
    async fn get_all(&self) -> Vec<ToolSpec>;
}

/// A denormalized, minimal projection row used for retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateTool {
    pub id: String,
    pub name: String,
    pub desc: String,
    pub tags: Vec<String>,
    pub platform: Option<String>,
    pub cost: f64,
}

/// Read-only, minimal projection suitable for approximate nearest
/// neighbor and keyword search.
#[async_trait]
pub trait ToolIndex: Send + Sync {
    async fn retrieve_candidates(
        &self,
        query_text: &str,
        query_vector: Option<&[f32]>,
        platform_filter: Option<&str>,
        max_rows: usize,
    ) -> Result<Vec<CandidateTool>, PipelineError>;

    fn calculate_token_budget(&self, ctx: u32, config: &RetrievalConfig, reserve: u32) -> (u32, usize) {
        calculate_token_budget(ctx, config, reserve)
    }

    async fn catalog_size(&self) -> usize;
}

/// `max_rows = floor((ctx - base_tokens - reserve) / tokens_per_row_est)` (§4.6 step 3).
pub fn calculate_token_budget(ctx: u32, config: &RetrievalConfig, reserve: u32) -> (u32, usize) {
    let overhead = config.base_tokens + reserve;
    let budget_tokens = ctx.saturating_sub(overhead);
    let max_rows = (budget_tokens / config.tokens_per_row_est.max(1)) as usize;
    (budget_tokens, max_rows)
}

/// `D`-dimensional embedding of free text.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, PipelineError>;
    fn dimension(&self) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_budget_floors_to_whole_rows() {
        let config = RetrievalConfig {
            tokens_per_row_est: 40,
            base_tokens: 1500,
            fallback_to_keyword: true,
        };
        let (budget, max_rows) = calculate_token_budget(8192, &config, 1024);
        assert_eq!(budget, 5668);
        assert_eq!(max_rows, 141);
    }

    #[test]
    fn token_budget_never_goes_negative() {
        let config = RetrievalConfig {
            tokens_per_row_est: 40,
            base_tokens: 1500,
            fallback_to_keyword: true,
        };
        let (budget, max_rows) = calculate_token_budget(1000, &config, 1024);
        assert_eq!(budget, 0);
        assert_eq!(max_rows, 0);
    }
}
