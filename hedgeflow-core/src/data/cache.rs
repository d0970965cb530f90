//! JSON file cache, one file per key.
//!
//! Layout:
//! - `{cache_dir}/{kind}/{SUBJECT}.json`
//! - `{cache_dir}/{kind}/{SUBJECT}/{range}.json` for date-ranged kinds
//!
//! Features:
//! - Atomic writes (write to .tmp, rename into place)
//! - Quarantine for unreadable files ({filename}.quarantined)
//! - Optional time-to-live measured against the file's modification time
//!
//! Reads and writes of different keys never touch the same file. Two writers
//! racing on one key both write identical content, so last-rename-wins is fine.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::provider::DataError;
use crate::domain::RecordKind;

/// Distinguishes temp files of concurrent writers within one process.
static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Identifies one cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub kind: RecordKind,
    pub subject: String,
    pub range: Option<String>,
}

impl CacheKey {
    pub fn new(kind: RecordKind, subject: &str) -> Self {
        Self {
            kind,
            subject: subject.to_string(),
            range: None,
        }
    }

    /// Key for a date-ranged kind, e.g. `2024-01-02_2024-06-28`.
    pub fn with_range(mut self, range: impl Into<String>) -> Self {
        self.range = Some(range.into());
        self
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.range {
            Some(range) => write!(f, "{}/{}/{}", self.kind, self.subject, range),
            None => write!(f, "{}/{}", self.kind, self.subject),
        }
    }
}

/// Expiry policy. With no TTL, entries live until deleted by hand.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CachePolicy {
    pub ttl: Option<Duration>,
}

impl CachePolicy {
    pub fn never_expire() -> Self {
        Self { ttl: None }
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self { ttl: Some(ttl) }
    }
}

/// Per-kind cache occupancy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStatus {
    pub kind: RecordKind,
    pub entries: usize,
    pub bytes: u64,
}

/// The JSON cache.
#[derive(Debug, Clone)]
pub struct JsonCache {
    cache_dir: PathBuf,
    policy: CachePolicy,
}

impl JsonCache {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            policy: CachePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: CachePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Root directory of the cache.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    /// Path of the file backing `key`.
    pub fn entry_path(&self, key: &CacheKey) -> PathBuf {
        let kind_dir = self.cache_dir.join(key.kind.as_str());
        let subject = sanitize(&key.subject);
        match &key.range {
            Some(range) => kind_dir.join(subject).join(format!("{}.json", sanitize(range))),
            None => kind_dir.join(format!("{subject}.json")),
        }
    }

    /// Read an entry. Missing, expired and unreadable entries are all misses;
    /// unreadable files are quarantined so they are not re-read.
    pub fn read<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let path = self.entry_path(key);
        let meta = fs::metadata(&path).ok()?;

        if let (Some(ttl), Ok(modified)) = (self.policy.ttl, meta.modified()) {
            let age = SystemTime::now()
                .duration_since(modified)
                .unwrap_or(Duration::ZERO);
            if age > ttl {
                debug!(%key, ?age, "cache entry expired");
                return None;
            }
        }

        let parsed = fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|content| serde_json::from_str(&content).map_err(|e| e.to_string()));

        match parsed {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(%key, path = %path.display(), error = %e, "quarantining unreadable cache entry");
                let _ = fs::rename(&path, quarantine_path(&path));
                None
            }
        }
    }

    /// Write an entry atomically: write to `.tmp`, then rename into place.
    pub fn write<T: Serialize>(&self, key: &CacheKey, value: &T) -> Result<(), DataError> {
        let path = self.entry_path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| DataError::CacheError(format!("failed to create dir: {e}")))?;
        }

        let json = serde_json::to_string_pretty(value)
            .map_err(|e| DataError::CacheError(format!("serialization: {e}")))?;

        let seq = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let tmp_path = path.with_extension(format!("json.{}.{seq}.tmp", std::process::id()));
        fs::write(&tmp_path, json)
            .map_err(|e| DataError::CacheError(format!("write {}: {e}", tmp_path.display())))?;

        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            DataError::CacheError(format!("atomic rename failed: {e}"))
        })
    }

    /// Remove one entry. Returns whether a file was deleted.
    pub fn invalidate(&self, key: &CacheKey) -> Result<bool, DataError> {
        let path = self.entry_path(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(DataError::CacheError(format!("remove {}: {e}", path.display()))),
        }
    }

    /// Entry counts and sizes per record kind.
    pub fn status(&self) -> Vec<CacheStatus> {
        RecordKind::ALL
            .iter()
            .map(|kind| {
                let mut status = CacheStatus {
                    kind: *kind,
                    entries: 0,
                    bytes: 0,
                };
                tally(&self.cache_dir.join(kind.as_str()), &mut status);
                status
            })
            .collect()
    }
}

/// Count `.json` files below `dir`, one level of subject directories deep.
fn tally(dir: &Path, status: &mut CacheStatus) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            tally(&path, status);
        } else if path.extension().and_then(|e| e.to_str()) == Some("json") {
            status.entries += 1;
            status.bytes += entry.metadata().map(|m| m.len()).unwrap_or(0);
        }
    }
}

fn quarantine_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".quarantined");
    PathBuf::from(name)
}

/// Keep subject and range strings safe to use as single path components.
/// Never returns an empty string or one starting with a dot.
fn sanitize(component: &str) -> String {
    let cleaned: String = component
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '^' | '=') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.is_empty() {
        "_".repeat(cleaned.len().max(1))
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MarketSnapshot;

    fn snapshot() -> MarketSnapshot {
        MarketSnapshot {
            market_cap: 1.0e12,
            volume: 5.0e7,
            average_volume: 4.0e7,
            vix: 14.2,
            vix_50d_avg: 15.0,
            treasury_yield: 4.1,
            ..Default::default()
        }
    }

    #[test]
    fn write_and_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = JsonCache::new(dir.path());
        let key = CacheKey::new(RecordKind::MarketData, "AAPL");

        cache.write(&key, &snapshot()).unwrap();
        let loaded: MarketSnapshot = cache.read(&key).unwrap();
        assert_eq!(loaded, snapshot());
    }

    #[test]
    fn layout_nests_ranged_entries_under_subject() {
        let cache = JsonCache::new("/tmp/c");
        let plain = CacheKey::new(RecordKind::InsiderTrades, "MSFT");
        let ranged =
            CacheKey::new(RecordKind::PriceHistory, "MSFT").with_range("2024-01-02_2024-06-28");

        assert_eq!(
            cache.entry_path(&plain),
            PathBuf::from("/tmp/c/insider_trades/MSFT.json")
        );
        assert_eq!(
            cache.entry_path(&ranged),
            PathBuf::from("/tmp/c/price_history/MSFT/2024-01-02_2024-06-28.json")
        );
    }

    #[test]
    fn missing_entry_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = JsonCache::new(dir.path());
        let key = CacheKey::new(RecordKind::OptionsData, "NOPE");
        assert!(cache.read::<MarketSnapshot>(&key).is_none());
    }

    #[test]
    fn corrupt_entry_is_quarantined() {
        let dir = tempfile::tempdir().unwrap();
        let cache = JsonCache::new(dir.path());
        let key = CacheKey::new(RecordKind::MarketData, "BAD");
        let path = cache.entry_path(&key);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{ not json").unwrap();

        assert!(cache.read::<MarketSnapshot>(&key).is_none());
        assert!(!path.exists());
        assert!(quarantine_path(&path).exists());
    }

    #[test]
    fn expired_entry_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = JsonCache::new(dir.path()).with_policy(CachePolicy::with_ttl(Duration::ZERO));
        let key = CacheKey::new(RecordKind::MarketData, "AAPL");
        cache.write(&key, &snapshot()).unwrap();
        std::thread::sleep(Duration::from_millis(20));

        assert!(cache.read::<MarketSnapshot>(&key).is_none());
    }

    #[test]
    fn invalidate_removes_entry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = JsonCache::new(dir.path());
        let key = CacheKey::new(RecordKind::MarketData, "AAPL");
        cache.write(&key, &snapshot()).unwrap();

        assert!(cache.invalidate(&key).unwrap());
        assert!(!cache.invalidate(&key).unwrap());
        assert!(cache.read::<MarketSnapshot>(&key).is_none());
    }

    #[test]
    fn status_counts_entries_per_kind() {
        let dir = tempfile::tempdir().unwrap();
        let cache = JsonCache::new(dir.path());
        cache
            .write(&CacheKey::new(RecordKind::MarketData, "AAPL"), &snapshot())
            .unwrap();
        cache
            .write(&CacheKey::new(RecordKind::MarketData, "MSFT"), &snapshot())
            .unwrap();
        cache
            .write(
                &CacheKey::new(RecordKind::PriceHistory, "AAPL").with_range("a_b"),
                &Vec::<u8>::new(),
            )
            .unwrap();

        let status = cache.status();
        let market = status
            .iter()
            .find(|s| s.kind == RecordKind::MarketData)
            .unwrap();
        let prices = status
            .iter()
            .find(|s| s.kind == RecordKind::PriceHistory)
            .unwrap();
        assert_eq!(market.entries, 2);
        assert!(market.bytes > 0);
        assert_eq!(prices.entries, 1);
    }

    #[test]
    fn sanitize_strips_path_separators() {
        assert_eq!(sanitize("../etc/passwd"), "_etc_passwd");
        assert_eq!(sanitize("^VIX"), "^VIX");
        assert_eq!(sanitize("BRK.B"), "BRK.B");
    }

    #[test]
    fn dot_only_subjects_stay_inside_kind_dir() {
        let cache = JsonCache::new("/tmp/c");
        let key = CacheKey::new(RecordKind::PriceHistory, "..").with_range("2024-01-02_2024-06-28");
        assert_eq!(
            cache.entry_path(&key),
            PathBuf::from("/tmp/c/price_history/__/2024-01-02_2024-06-28.json")
        );
        assert_eq!(sanitize("."), "_");
        assert_eq!(sanitize(""), "_");
    }

    #[test]
    fn concurrent_writers_of_one_key_never_leave_partial_entries() {
        let dir = tempfile::tempdir().unwrap();
        let cache = JsonCache::new(dir.path());
        let key = CacheKey::new(RecordKind::MarketData, "AAPL");

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..20 {
                        cache.write(&key, &snapshot()).unwrap();
                        let loaded: Option<MarketSnapshot> = cache.read(&key);
                        assert_eq!(loaded, Some(snapshot()));
                    }
                });
            }
        });

        let leftovers: Vec<_> = fs::read_dir(dir.path().join("market_data"))
            .unwrap()
            .flatten()
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| name != "AAPL.json")
            .collect();
        assert!(leftovers.is_empty(), "{leftovers:?}");
    }
}
