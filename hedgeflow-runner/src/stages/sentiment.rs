//! Combined sentiment: news, fear & greed, options and insider activity.

use std::sync::Arc;

use chrono::Duration;
use tracing::debug;

use hedgeflow_core::graph::{Record, Stage, StageError};
use hedgeflow_core::signals::{
    fear_greed_index, insider_sentiment, options_sentiment, weighted_sentiment, SubScores,
};

use super::{report, unavailable};
use crate::context::PipelineContext;
use crate::decision::AgentSignal;
use crate::field::{keys, require, Field};
use crate::news::news_score;

/// Price window for the fear & greed composite.
pub const SENTIMENT_HISTORY_DAYS: i64 = 180;

pub struct SentimentStage {
    ctx: Arc<PipelineContext>,
}

impl SentimentStage {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self { ctx }
    }
}

impl Stage<Field> for SentimentStage {
    fn name(&self) -> &str {
        keys::SENTIMENT
    }

    fn run(&self, input: &Record<Field>) -> Result<Record<Field>, StageError> {
        let subject = require(input, keys::SUBJECT, Field::as_text)?;
        let end = *require(input, keys::END_DATE, Field::as_date)?;
        let num_of_news = *require(input, keys::NUM_OF_NEWS, Field::as_count)? as usize;
        let market = require(input, keys::MARKET, Field::as_market)?;
        let insider_trades = require(input, keys::INSIDER_TRADES, Field::as_insider_trades)?;

        let ctx = &self.ctx;
        let ((prices, options), (news, article_count)) = rayon::join(
            || {
                rayon::join(
                    || {
                        ctx.data.price_history(
                            subject,
                            end - Duration::days(SENTIMENT_HISTORY_DAYS),
                            end,
                        )
                    },
                    || ctx.data.options_data(subject),
                )
            },
            || news_score(ctx.news_feed(), ctx.chat_model(), subject, end, num_of_news),
        );

        let fear_greed = fear_greed_index(&prices.value, market);
        let options_view = options_sentiment((!options.is_degraded()).then_some(&options.value));
        let insider_view = insider_sentiment(insider_trades);

        let weighted = weighted_sentiment(
            &SubScores {
                news,
                fear_greed: fear_greed / 100.0,
                options: options_view.confidence,
                insider: insider_view.confidence,
            },
            &ctx.config.sentiment_weights,
        );
        debug!(subject, score = weighted.score, "weighted sentiment");

        let put_call = options_view.metric("put_call_ratio").unwrap_or(0.0);
        let buy_ratio = insider_view.metric("buy_ratio").unwrap_or(0.0);
        let mut lines = vec![
            format!("Combined sentiment analysis for {subject} as of {end}:"),
            format!("- News sentiment: {news:.2} (based on {article_count} recent articles)"),
            format!("- Fear & Greed index: {fear_greed:.1}/100"),
            format!(
                "- Options sentiment: {} (put/call ratio {put_call:.2})",
                options_view.signal
            ),
            format!(
                "- Insider trading: {} (buy ratio {buy_ratio:.2})",
                insider_view.signal
            ),
            format!("Overall weighted sentiment score: {:.2}", weighted.score),
        ];
        if prices.is_degraded() {
            lines.push("Price history unavailable; momentum not scored".to_string());
        }
        if options.is_degraded() {
            lines.push("Options data unavailable; options scored neutral".to_string());
        }

        let signal = AgentSignal::new(
            keys::SENTIMENT,
            weighted.signal,
            weighted.confidence,
            lines.join("\n"),
        )
        .with_metric("news", news)
        .with_metric("fear_greed", fear_greed)
        .with_metric("options", options_view.confidence)
        .with_metric("insider", insider_view.confidence)
        .with_metric("weighted_score", weighted.score);

        report(input, &signal);
        Ok(Record::new().with(keys::SENTIMENT, Field::Signal(signal)))
    }

    fn fallback(&self, _input: &Record<Field>, error: &StageError) -> Record<Field> {
        unavailable(keys::SENTIMENT, error)
    }
}
