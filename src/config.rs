use serde::Deserialize;

/// Typed configuration for the pipeline. Sourcing the values (env, file,
/// flags) is glue the embedding application owns; this crate only needs
/// the destination shape and conservative defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub llm: LlmConfig,
    pub retrieval: RetrievalConfig,
    pub classifier: ClassifierConfig,
    pub planner: PlannerConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            retrieval: RetrievalConfig::default(),
            classifier: ClassifierConfig::default(),
            planner: PlannerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub enum LlmDialect {
    PlainGenerate,
    ChatCompletions,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub dialect: LlmDialect,
    pub context_window: u32,
    pub output_reserve: u32,
    pub safety_margin: u32,
    pub hard_min_tokens: u32,
    pub pool_max_idle_per_host: usize,
    pub max_concurrent_requests: usize,
    pub request_timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            dialect: LlmDialect::PlainGenerate,
            context_window: 8192,
            output_reserve: 1024,
            safety_margin: 256,
            hard_min_tokens: 256,
            pool_max_idle_per_host: 20,
            max_concurrent_requests: 50,
            request_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub tokens_per_row_est: u32,
    pub base_tokens: u32,
    pub fallback_to_keyword: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            tokens_per_row_est: 40,
            base_tokens: 1500,
            fallback_to_keyword: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub confidence_llm_threshold: f64,
    pub intent_temperature: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            confidence_llm_threshold: 0.6,
            intent_temperature: 0.1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub long_running_threshold_s: u32,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            long_running_threshold_s: 60,
        }
    }
}
