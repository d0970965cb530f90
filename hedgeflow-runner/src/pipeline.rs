//! Builds the analysis graph and drives one request through it.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, info_span, warn};

use hedgeflow_core::data::DataError;
use hedgeflow_core::graph::{GraphBuilder, GraphError, Record, TaskGraph};

use crate::config::ConfigError;
use crate::context::PipelineContext;
use crate::decision::Decision;
use crate::field::{keys, Field};
use crate::llm::LlmError;
use crate::request::{RequestError, RunRequest, ValidatedRequest};
use crate::stages::{
    FundamentalsStage, MarketDataStage, PortfolioManagerStage, RiskManagerStage, SentimentStage,
    TechnicalsStage, ValuationStage,
};

/// Failures that stop a run before any stage executes.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid request: {0}")]
    Request(#[from] RequestError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("graph error: {0}")]
    Graph(#[from] GraphError),
    #[error("data error: {0}")]
    Data(#[from] DataError),
    #[error("chat model error: {0}")]
    Llm(#[from] LlmError),
}

/// The fixed seven-stage graph. Analysts are registered in the order their
/// outputs are merged.
pub fn build_graph(ctx: &Arc<PipelineContext>) -> Result<TaskGraph<Field>, GraphError> {
    let analysts = [keys::TECHNICALS, keys::FUNDAMENTALS, keys::SENTIMENT, keys::VALUATION];
    GraphBuilder::new()
        .node(keys::MARKET, MarketDataStage::new(Arc::clone(ctx)), &[])
        .node(keys::TECHNICALS, TechnicalsStage, &[keys::MARKET])
        .node(keys::FUNDAMENTALS, FundamentalsStage, &[keys::MARKET])
        .node(keys::SENTIMENT, SentimentStage::new(Arc::clone(ctx)), &[keys::MARKET])
        .node(keys::VALUATION, ValuationStage, &[keys::MARKET])
        .node(keys::RISK, RiskManagerStage, &analysts)
        .node(keys::DECISION, PortfolioManagerStage::new(Arc::clone(ctx)), &[keys::RISK])
        .build()
}

/// The record the entry stage starts from.
pub fn seed_record(request: &ValidatedRequest, run_id: &str) -> Record<Field> {
    Record::new()
        .with(keys::RUN_ID, Field::Text(run_id.to_string()))
        .with(keys::SUBJECT, Field::Text(request.subject.clone()))
        .with(keys::START_DATE, Field::Date(request.start))
        .with(keys::END_DATE, Field::Date(request.end))
        .with(keys::PORTFOLIO, Field::Portfolio(request.portfolio))
        .with(keys::SHOW_REASONING, Field::Flag(request.show_reasoning))
        .with(keys::NUM_OF_NEWS, Field::Count(request.num_of_news))
}

/// Validate `request`, run every stage and return the terminal decision.
///
/// Invalid requests fail before any provider call. Past that point stage
/// failures only degrade the result: a run always yields a decision.
pub fn run_pipeline(request: &RunRequest, ctx: Arc<PipelineContext>) -> Result<Decision, PipelineError> {
    let validated = request.validate(ctx.data.today())?;
    let run_id = validated.run_id();
    let graph = build_graph(&ctx)?;

    let span = info_span!("pipeline", run_id = %run_id, subject = %validated.subject);
    let _guard = span.enter();
    info!(
        start = %validated.start,
        end = %validated.end,
        provider = ctx.data.provider_name(),
        "run started"
    );

    let report = graph.execute_with_report(seed_record(&validated, &run_id));
    let degraded: Vec<String> = report.degraded().map(|o| o.node.clone()).collect();
    for outcome in report.degraded() {
        warn!(stage = %outcome.node, status = ?outcome.status, "stage degraded");
    }

    let mut decision = match report.record.get(keys::DECISION).and_then(Field::as_decision) {
        Some(d) => d.clone(),
        None => Decision::hold(&run_id, &validated.subject, "No decision was produced; holding"),
    };
    decision.degraded_stages = degraded;
    info!(
        action = %decision.action,
        quantity = decision.quantity,
        degraded = decision.degraded_stages.len(),
        "run finished"
    );
    Ok(decision)
}
