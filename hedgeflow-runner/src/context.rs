//! Everything a run needs, constructed once and handed to every stage.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use hedgeflow_core::data::{DataAccess, JsonCache, YahooProvider};

use crate::config::PipelineConfig;
use crate::llm::{ChatModel, LlmError, OpenRouterClient, RetryingChatModel};
use crate::news::{DirectoryNewsFeed, NewsFeed};
use crate::pipeline::PipelineError;

pub struct PipelineContext {
    pub config: PipelineConfig,
    pub data: DataAccess,
    chat: Option<Arc<dyn ChatModel>>,
    news: Option<Arc<dyn NewsFeed>>,
}

impl PipelineContext {
    /// A context with no chat model and no news feed.
    pub fn new(config: PipelineConfig, data: DataAccess) -> Self {
        Self {
            config,
            data,
            chat: None,
            news: None,
        }
    }

    pub fn with_chat_model(mut self, model: Arc<dyn ChatModel>) -> Self {
        self.chat = Some(model);
        self
    }

    pub fn with_news_feed(mut self, feed: Arc<dyn NewsFeed>) -> Self {
        self.news = Some(feed);
        self
    }

    /// Wire the live stack: Yahoo provider behind the JSON cache, plus an
    /// OpenRouter model when its API key is set and a news directory when one
    /// is configured.
    pub fn from_config(config: PipelineConfig) -> Result<Self, PipelineError> {
        let provider = YahooProvider::new(config.circuit_breaker(), config.provider_timeout())?;
        let cache = JsonCache::new(&config.cache_dir).with_policy(config.cache_policy());
        let data = DataAccess::new(Arc::new(provider), cache).with_retry(config.retry_policy());

        let chat: Option<Arc<dyn ChatModel>> =
            match OpenRouterClient::from_config(&config.llm, config.provider_timeout()) {
                Ok(client) => Some(Arc::new(RetryingChatModel::new(
                    client,
                    config.llm.max_retries,
                    Duration::from_millis(config.llm.initial_delay_ms),
                ))),
                Err(LlmError::MissingApiKey(var)) => {
                    info!(env = %var, "no chat model configured; using deterministic reasoning");
                    None
                }
                Err(e) => return Err(e.into()),
            };

        let news: Option<Arc<dyn NewsFeed>> = config
            .news_dir
            .as_ref()
            .map(|dir| Arc::new(DirectoryNewsFeed::new(dir)) as Arc<dyn NewsFeed>);

        Ok(Self {
            config,
            data,
            chat,
            news,
        })
    }

    pub fn chat_model(&self) -> Option<Arc<dyn ChatModel>> {
        self.chat.clone()
    }

    pub fn news_feed(&self) -> Option<&dyn NewsFeed> {
        self.news.as_deref()
    }
}
