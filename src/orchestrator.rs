//! The thin coordinator tying Stage A, Stage AB, and Stage C together
//! (§5): routes on each stage's `next_stage`, checks the deadline
//! between stages, and records per-stage telemetry.

use std::sync::Arc;
use std::time::Instant;

use crate::context::RequestContext;
use crate::error::{ErrorReport, PipelineError};
use crate::record::decision::{Decision, NextStage};
use crate::record::plan::Plan;
use crate::record::selection::Selection;
use crate::stage_a::Classifier;
use crate::stage_ab::Selector;
use crate::stage_c::Planner;
use crate::telemetry::PipelineTelemetry;

/// Where the pipeline stopped and what it produced along the way.
#[derive(Debug, Clone)]
pub enum PipelineOutcome {
    /// Stage A routed straight to a response; no tools were ever considered.
    InfoOnly { decision: Decision },
    /// Stage AB found nothing to select, or selection is missing inputs.
    NeedsMoreInfo { decision: Decision, selection: Selection },
    /// A fully validated, ready-to-execute plan.
    Ready {
        decision: Decision,
        selection: Selection,
        plan: Plan,
    },
}

pub struct Orchestrator {
    classifier: Classifier,
    selector: Selector,
    planner: Planner,
    telemetry: PipelineTelemetry,
}

impl Orchestrator {
    pub fn new(classifier: Classifier, selector: Selector, planner: Planner) -> Self {
        Self {
            classifier,
            selector,
            planner,
            telemetry: PipelineTelemetry::new(),
        }
    }

    pub fn telemetry(&self) -> &PipelineTelemetry {
        &self.telemetry
    }

    pub async fn run(
        &self,
        request: &str,
        context: Option<&RequestContext>,
    ) -> Result<PipelineOutcome, PipelineError> {
        let decision = self.run_stage_a(request, context).await?;
        if decision.next_stage == NextStage::StageD {
            return Ok(PipelineOutcome::InfoOnly { decision });
        }

        check_deadline(context)?;
        let selection = self.run_stage_ab(&decision).await?;
        if selection.next_stage == NextStage::StageD || !selection.ready_for_execution {
            return Ok(PipelineOutcome::NeedsMoreInfo { decision, selection });
        }

        check_deadline(context)?;
        let plan = self.run_stage_c(&decision, &selection).await?;
        Ok(PipelineOutcome::Ready { decision, selection, plan })
    }

    /// Builds a structured, user-visible failure report for a pipeline
    /// error observed at `stage`.
    pub fn report_error(&self, stage: &'static str, err: &PipelineError, elapsed_ms: u64) -> ErrorReport {
        ErrorReport::from_error(stage, err, elapsed_ms)
    }

    async fn run_stage_a(&self, request: &str, context: Option<&RequestContext>) -> Result<Decision, PipelineError> {
        let started = Instant::now();
        let result = self.classifier.classify(request, context).await;
        self.record("stage_a", started, &result);
        result
    }

    async fn run_stage_ab(&self, decision: &Decision) -> Result<Selection, PipelineError> {
        let started = Instant::now();
        let result = self.selector.process(decision).await;
        match result {
            Ok((selection, _telemetry)) => {
                self.telemetry
                    .record_stage("stage_ab", started.elapsed().as_millis() as u64, 1, None);
                Ok(selection)
            }
            Err(err) => {
                self.telemetry.record_stage(
                    "stage_ab",
                    started.elapsed().as_millis() as u64,
                    1,
                    Some(err.to_string()),
                );
                Err(err)
            }
        }
    }

    async fn run_stage_c(&self, decision: &Decision, selection: &Selection) -> Result<Plan, PipelineError> {
        let started = Instant::now();
        let result = self.planner.create_plan(decision, selection).await;
        self.record("stage_c", started, &result);
        result
    }

    fn record<T>(&self, stage: &'static str, started: Instant, result: &Result<T, PipelineError>) {
        let elapsed_ms = started.elapsed().as_millis() as u64;
        let error = result.as_ref().err().map(ToString::to_string);
        self.telemetry.record_stage(stage, elapsed_ms, 1, error);
    }
}

fn check_deadline(context: Option<&RequestContext>) -> Result<(), PipelineError> {
    if let Some(ctx) = context {
        if ctx.is_expired() {
            return Err(PipelineError::Cancelled("request deadline exceeded before the next stage"));
        }
    }
    Ok(())
}

/// Wires up a full in-process pipeline from its three stage
/// collaborators and a shared LLM client; a convenience for callers who
/// don't need to configure stages independently.
pub fn build_with_shared_llm(
    llm: Arc<dyn crate::llm::LlmClient>,
    catalog: Arc<dyn crate::retrieval::ToolCatalog>,
    index: Arc<dyn crate::retrieval::ToolIndex>,
    embedder: Arc<dyn crate::retrieval::Embedder>,
    config: crate::config::PipelineConfig,
) -> Orchestrator {
    let classifier = Classifier::new(llm.clone(), config.classifier);
    let selector = Selector::new(llm.clone(), catalog, index, embedder, config.llm, config.retrieval);
    let planner = Planner::new(llm, config.planner);
    Orchestrator::new(classifier, selector, planner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedLlmClient;
    use crate::llm::LlmClient;
    use crate::retrieval::testing::{FakeEmbedder, InMemoryCatalog, InMemoryIndex};

    #[tokio::test]
    async fn info_only_request_short_circuits_before_selection() {
        let llm: Arc<dyn LlmClient> = Arc::new(ScriptedLlmClient::with_content(vec![
            r#"{"category": "information", "action": "answer_question", "confidence": 0.9, "capabilities": []}"#,
            r#"{"entities": []}"#,
        ]));
        let catalog: Arc<dyn crate::retrieval::ToolCatalog> = Arc::new(InMemoryCatalog::new(vec![]));
        let index: Arc<dyn crate::retrieval::ToolIndex> = Arc::new(InMemoryIndex::new(vec![]));
        let embedder: Arc<dyn crate::retrieval::Embedder> = Arc::new(FakeEmbedder::new(8));
        let orchestrator = build_with_shared_llm(llm, catalog, index, embedder, crate::config::PipelineConfig::default());

        let outcome = orchestrator.run("what is kubernetes", None).await.unwrap();
        assert!(matches!(outcome, PipelineOutcome::InfoOnly { .. }));
        assert_eq!(orchestrator.telemetry().records().len(), 1);
    }
}
