//! Decision pipeline for an operations-automation assistant.
//!
//! A natural-language request flows through three stages: Stage A
//! classifies intent, entities, confidence, and risk into a `Decision`;
//! Stage AB retrieves and selects a minimal set of tools into a
//! `Selection`; Stage C turns a ready selection into a validated,
//! dependency-ordered `Plan`. [`orchestrator::Orchestrator`] threads a
//! request through whichever of these a particular request needs.

pub mod config;
pub mod context;
pub mod error;
pub mod llm;
pub mod orchestrator;
pub mod parser;
pub mod prompts;
pub mod record;
pub mod retrieval;
pub mod stage_a;
pub mod stage_ab;
pub mod stage_c;
pub mod telemetry;

pub use config::PipelineConfig;
pub use context::RequestContext;
pub use error::{ErrorReport, PipelineError};
pub use orchestrator::{Orchestrator, PipelineOutcome};
pub use record::{Decision, Plan, Selection};
