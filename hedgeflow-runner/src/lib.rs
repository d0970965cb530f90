//! hedgeflow runner: turns a run request into a trading decision.
//!
//! This crate builds on `hedgeflow-core` to provide:
//! - Run requests with validation and deterministic run ids
//! - TOML pipeline configuration
//! - The seven analysis stages and the graph that wires them
//! - Chat model and news feed boundaries
//! - The terminal decision shape

pub mod config;
pub mod context;
pub mod decision;
pub mod field;
pub mod llm;
pub mod news;
pub mod pipeline;
pub mod request;
pub mod stages;

pub use config::{ConfigError, PipelineConfig};
pub use context::PipelineContext;
pub use decision::{AgentSignal, Decision, RiskAssessment, TradeAction};
pub use field::Field;
pub use llm::{ChatMessage, ChatModel, LlmError, OpenRouterClient, RetryingChatModel};
pub use news::{DirectoryNewsFeed, NewsFeed, NewsItem};
pub use pipeline::{build_graph, run_pipeline, PipelineError};
pub use request::{Portfolio, RequestError, RunRequest, ValidatedRequest};
