//! News boundary: recent articles for a subject and an LLM-derived score.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::llm::{ChatMessage, ChatModel, LlmError};

/// Articles older than this, relative to the analysis date, are ignored.
pub const NEWS_WINDOW_DAYS: i64 = 7;
/// Score used whenever there is nothing to go on.
pub const NEUTRAL_NEWS_SCORE: f64 = 0.5;

const PUBLISH_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Error)]
pub enum NewsError {
    #[error("read news file {path}: {message}")]
    Read { path: PathBuf, message: String },

    #[error("news file {path} is malformed: {message}")]
    Malformed { path: PathBuf, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub source: String,
    #[serde(with = "publish_time")]
    pub publish_time: NaiveDateTime,
    #[serde(default)]
    pub url: Option<String>,
}

mod publish_time {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::PUBLISH_TIME_FORMAT;

    pub fn serialize<S: Serializer>(t: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&t.format(PUBLISH_TIME_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveDateTime::parse_from_str(&raw, PUBLISH_TIME_FORMAT).map_err(serde::de::Error::custom)
    }
}

/// Source of news articles.
pub trait NewsFeed: Send + Sync {
    /// Up to `max` articles about `subject` published in the
    /// [`NEWS_WINDOW_DAYS`] before `as_of`, newest first.
    fn recent_news(
        &self,
        subject: &str,
        as_of: NaiveDate,
        max: usize,
    ) -> Result<Vec<NewsItem>, NewsError>;
}

/// Keep articles strictly after midnight `NEWS_WINDOW_DAYS` before `as_of`
/// and no later than the end of `as_of`; newest first, at most `max`.
pub fn within_window(mut items: Vec<NewsItem>, as_of: NaiveDate, max: usize) -> Vec<NewsItem> {
    let cutoff = (as_of - Duration::days(NEWS_WINDOW_DAYS)).and_hms_opt(0, 0, 0);
    let horizon = (as_of + Duration::days(1)).and_hms_opt(0, 0, 0);
    items.retain(|item| {
        cutoff.map_or(true, |c| item.publish_time > c)
            && horizon.map_or(true, |h| item.publish_time < h)
    });
    items.sort_by(|a, b| b.publish_time.cmp(&a.publish_time));
    items.truncate(max);
    items
}

#[derive(Deserialize)]
struct NewsFile {
    #[serde(default)]
    news: Vec<NewsItem>,
}

/// Reads previously collected articles from `{dir}/{SUBJECT}_news.json`.
/// A missing file means no news.
pub struct DirectoryNewsFeed {
    dir: PathBuf,
}

impl DirectoryNewsFeed {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn file_for(&self, subject: &str) -> PathBuf {
        self.dir.join(format!("{}_news.json", subject.to_uppercase()))
    }

    fn load(path: &Path) -> Result<Vec<NewsItem>, NewsError> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(NewsError::Read {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })
            }
        };
        let file: NewsFile = serde_json::from_str(&content).map_err(|e| NewsError::Malformed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(file.news)
    }
}

impl NewsFeed for DirectoryNewsFeed {
    fn recent_news(
        &self,
        subject: &str,
        as_of: NaiveDate,
        max: usize,
    ) -> Result<Vec<NewsItem>, NewsError> {
        let path = self.file_for(subject);
        let items = Self::load(&path)?;
        debug!(subject, path = %path.display(), total = items.len(), "loaded news file");
        Ok(within_window(items, as_of, max))
    }
}

/// Asks a chat model to rate articles in [-1, 1] and maps the rating to
/// [0, 1].
pub struct LlmNewsScorer {
    model: Arc<dyn ChatModel>,
}

impl LlmNewsScorer {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    pub fn score(&self, subject: &str, items: &[NewsItem]) -> Result<f64, LlmError> {
        if items.is_empty() {
            return Ok(NEUTRAL_NEWS_SCORE);
        }
        let articles = items
            .iter()
            .map(|n| {
                format!(
                    "Title: {}\nSource: {}\nPublished: {}\n{}",
                    n.title,
                    n.source,
                    n.publish_time.format(PUBLISH_TIME_FORMAT),
                    n.content
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n");
        let messages = [
            ChatMessage::system(
                "You are a financial news analyst. Rate the overall sentiment of the \
                 articles for the stock's price outlook on a scale from -1 (very \
                 negative) to 1 (very positive). Reply with the number only.",
            ),
            ChatMessage::user(format!("Stock: {subject}\n\n{articles}")),
        ];
        let reply = self.model.complete(&messages)?;
        let raw = parse_rating(&reply).ok_or_else(|| LlmError::Unparseable(reply.clone()))?;
        Ok((raw.clamp(-1.0, 1.0) + 1.0) / 2.0)
    }
}

/// First number in the reply, tolerating surrounding prose.
fn parse_rating(reply: &str) -> Option<f64> {
    reply
        .split(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-'))
        .filter(|tok| !tok.is_empty())
        .find_map(|tok| tok.parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

/// News score for the sentiment stage: neutral when there is no feed, no
/// chat model, no articles, or any failure. Returns the score and the number
/// of articles it was based on.
pub fn news_score(
    feed: Option<&dyn NewsFeed>,
    model: Option<Arc<dyn ChatModel>>,
    subject: &str,
    as_of: NaiveDate,
    max: usize,
) -> (f64, usize) {
    let Some(feed) = feed else {
        return (NEUTRAL_NEWS_SCORE, 0);
    };
    let items = match feed.recent_news(subject, as_of, max) {
        Ok(items) => items,
        Err(e) => {
            warn!(subject, error = %e, "news unavailable; using neutral score");
            return (NEUTRAL_NEWS_SCORE, 0);
        }
    };
    let Some(model) = model else {
        return (NEUTRAL_NEWS_SCORE, items.len());
    };
    match LlmNewsScorer::new(model).score(subject, &items) {
        Ok(score) => (score, items.len()),
        Err(e) => {
            warn!(subject, error = %e, "news scoring failed; using neutral score");
            (NEUTRAL_NEWS_SCORE, items.len())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(title: &str, ts: &str) -> NewsItem {
        NewsItem {
            title: title.into(),
            content: String::new(),
            source: "wire".into(),
            publish_time: NaiveDateTime::parse_from_str(ts, PUBLISH_TIME_FORMAT).unwrap(),
            url: None,
        }
    }

    fn as_of() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 11, 15).unwrap()
    }

    struct Fixed(&'static str);

    impl ChatModel for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn complete(&self, _: &[ChatMessage]) -> Result<String, LlmError> {
            Ok(self.0.to_string())
        }
    }

    #[test]
    fn window_keeps_last_seven_days_newest_first() {
        let kept = within_window(
            vec![
                item("old", "2024-11-08 00:00:00"),
                item("edge", "2024-11-08 00:00:01"),
                item("today", "2024-11-15 23:59:59"),
                item("future", "2024-11-16 00:00:00"),
                item("mid", "2024-11-12 09:30:00"),
            ],
            as_of(),
            10,
        );
        let titles: Vec<_> = kept.iter().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, ["today", "mid", "edge"]);
    }

    #[test]
    fn window_truncates_to_max() {
        let kept = within_window(
            vec![
                item("a", "2024-11-14 00:00:00"),
                item("b", "2024-11-13 00:00:00"),
                item("c", "2024-11-12 00:00:00"),
            ],
            as_of(),
            2,
        );
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].title, "a");
    }

    #[test]
    fn rating_maps_to_unit_interval() {
        let items = [item("x", "2024-11-14 00:00:00")];
        let score = |reply: &'static str| LlmNewsScorer::new(Arc::new(Fixed(reply))).score("AAPL", &items);
        assert!((score("0.3").unwrap() - 0.65).abs() < 1e-12);
        assert!((score("Sentiment: -1").unwrap() - 0.0).abs() < 1e-12);
        assert!((score("5").unwrap() - 1.0).abs() < 1e-12);
        assert!(matches!(score("no idea"), Err(LlmError::Unparseable(_))));
    }

    #[test]
    fn directory_feed_reads_subject_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("AAPL_news.json"),
            r#"{"news":[{"title":"Beat","publish_time":"2024-11-14 16:05:00","source":"wire"}]}"#,
        )
        .unwrap();
        let feed = DirectoryNewsFeed::new(dir.path());

        let items = feed.recent_news("aapl", as_of(), 5).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Beat");
        assert!(feed.recent_news("MSFT", as_of(), 5).unwrap().is_empty());
    }

    #[test]
    fn news_score_is_neutral_without_feed_or_model() {
        assert_eq!(news_score(None, None, "AAPL", as_of(), 5), (0.5, 0));

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("AAPL_news.json"), "not json").unwrap();
        let feed = DirectoryNewsFeed::new(dir.path());
        let model: Arc<dyn ChatModel> = Arc::new(Fixed("1"));
        assert_eq!(news_score(Some(&feed), Some(model), "AAPL", as_of(), 5), (0.5, 0));
    }
}
