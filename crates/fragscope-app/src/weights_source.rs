// Learned weight sources and the staleness cache in front of them.
//
// A source fetches a `WeightsResponse` from somewhere (a JSON or CSV file
// written by the offline learner, or the weights HTTP endpoint). The cache
// keeps the last snapshot for a staleness window and refetches after it.
// Any fetch failure, or a weight set with no metric weights, leaves the
// engine without weights, which selects the fallback formula; it is logged,
// never raised.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use fragscope_core::weights::WeightMetadata;
use fragscope_core::{WeightsResponse, WeightsSnapshot};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::{Config, WeightsSourceKind};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum WeightsError {
    #[error("failed to read weights file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid weights JSON in {path}: {source}")]
    Json {
        path: String,
        source: serde_json::Error,
    },

    #[error("CSV error in weights file {path}: {source}")]
    Csv { path: String, source: csv::Error },

    #[error("weights request to {url} failed: {source}")]
    Http { url: String, source: reqwest::Error },
}

// ---------------------------------------------------------------------------
// Source trait
// ---------------------------------------------------------------------------

#[async_trait::async_trait]
pub trait WeightsSource: Send + Sync {
    async fn fetch_weights(&self) -> Result<WeightsResponse, WeightsError>;

    /// Human-readable location, for logs.
    fn describe(&self) -> String;
}

// ---------------------------------------------------------------------------
// File source
// ---------------------------------------------------------------------------

/// Offline learner output, one `metric,weight` pair per row. The learner
/// also writes its provenance as `metadata_*` rows in the same columns, so
/// the weight is kept as text until the row kind is known.
#[derive(Debug, Deserialize)]
struct RawWeightRow {
    #[serde(alias = "feature")]
    metric: String,
    weight: String,
}

/// Prefix of the provenance rows in learner CSVs.
const METADATA_KEY_PREFIX: &str = "metadata_";

/// Reads weights from disk: `.json` files hold a `WeightsResponse`,
/// anything else is parsed as `metric,weight` CSV.
#[derive(Debug, Clone)]
pub struct FileWeightsSource {
    path: PathBuf,
}

impl FileWeightsSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn is_json(&self) -> bool {
        self.path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"))
    }
}

/// Parse a learner CSV. `metadata_version`, `metadata_date` and
/// `metadata_samples` rows fill the metadata; every other row is a metric
/// weight. Non-finite or unparseable weights and malformed rows are skipped
/// with a warning. Metadata fields absent from the file stay empty.
pub fn load_weights_csv_from_reader<R: Read>(rdr: R) -> Result<WeightsResponse, csv::Error> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(rdr);
    let mut resp = WeightsResponse::default();
    for result in reader.deserialize::<RawWeightRow>() {
        let row = match result {
            Ok(row) => row,
            Err(e) => {
                warn!("skipping malformed weight row: {}", e);
                continue;
            }
        };

        if let Some(field) = row.metric.strip_prefix(METADATA_KEY_PREFIX) {
            apply_metadata_row(&mut resp.metadata, field, &row.weight);
            continue;
        }

        match row.weight.parse::<f64>() {
            Ok(w) if w.is_finite() => {
                resp.weights.insert(row.metric, w);
            }
            Ok(_) => warn!("skipping weight '{}': non-finite value", row.metric),
            Err(_) => warn!(
                "skipping weight '{}': '{}' is not a number",
                row.metric, row.weight
            ),
        }
    }
    Ok(resp)
}

fn apply_metadata_row(metadata: &mut WeightMetadata, field: &str, value: &str) {
    match field {
        "version" => metadata.version = value.to_string(),
        "date" => metadata.date = value.to_string(),
        "samples" => match value.parse::<f64>() {
            Ok(n) if n.is_finite() && n >= 0.0 => metadata.samples = n.round() as u64,
            _ => warn!("ignoring metadata_samples '{}': not a count", value),
        },
        other => debug!("ignoring unknown metadata row '{}'", other),
    }
}

fn file_modified_date(path: &Path) -> String {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map(|t| DateTime::<Utc>::from(t).format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

#[async_trait::async_trait]
impl WeightsSource for FileWeightsSource {
    async fn fetch_weights(&self) -> Result<WeightsResponse, WeightsError> {
        let path_str = self.path.display().to_string();
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| WeightsError::Io {
                path: path_str.clone(),
                source: e,
            })?;

        if self.is_json() {
            return serde_json::from_slice(&bytes).map_err(|e| WeightsError::Json {
                path: path_str,
                source: e,
            });
        }

        let mut resp =
            load_weights_csv_from_reader(bytes.as_slice()).map_err(|e| WeightsError::Csv {
                path: path_str.clone(),
                source: e,
            })?;
        // Older learner files carry no metadata rows.
        if resp.metadata.version.is_empty() {
            resp.metadata.version = self
                .path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();
        }
        if resp.metadata.date.is_empty() {
            resp.metadata.date = file_modified_date(&self.path);
        }
        Ok(resp)
    }

    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }
}

// ---------------------------------------------------------------------------
// HTTP source
// ---------------------------------------------------------------------------

/// GETs a `WeightsResponse` from the weights endpoint.
pub struct HttpWeightsSource {
    http: reqwest::Client,
    url: String,
    token: Option<String>,
}

impl HttpWeightsSource {
    /// Build a source whose requests give up after `timeout`.
    pub fn new(url: String, timeout: Duration, token: Option<String>) -> Result<Self, WeightsError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WeightsError::Http {
                url: url.clone(),
                source: e,
            })?;
        Ok(Self::with_client(http, url, token))
    }

    /// Use a preconfigured client.
    pub fn with_client(http: reqwest::Client, url: String, token: Option<String>) -> Self {
        Self {
            http,
            url,
            token: token.filter(|t| !t.trim().is_empty()),
        }
    }
}

#[async_trait::async_trait]
impl WeightsSource for HttpWeightsSource {
    async fn fetch_weights(&self) -> Result<WeightsResponse, WeightsError> {
        let mut request = self.http.get(&self.url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let to_err = |e| WeightsError::Http {
            url: self.url.clone(),
            source: e,
        };
        let response = request
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(to_err)?;
        response.json::<WeightsResponse>().await.map_err(to_err)
    }

    fn describe(&self) -> String {
        format!("endpoint {}", self.url)
    }
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct CacheEntry {
    fetched_at: DateTime<Utc>,
    snapshot: Option<Arc<WeightsSnapshot>>,
}

/// Holds the most recent weights snapshot and refreshes it once it is older
/// than the staleness window.
///
/// The current time is passed in by the caller.
pub struct WeightsCache {
    source: Option<Box<dyn WeightsSource>>,
    staleness: chrono::Duration,
    entry: Mutex<Option<CacheEntry>>,
}

impl WeightsCache {
    pub fn new(source: Box<dyn WeightsSource>, staleness: chrono::Duration) -> Self {
        Self {
            source: Some(source),
            staleness,
            entry: Mutex::new(None),
        }
    }

    /// A cache that never has weights.
    pub fn disabled() -> Self {
        Self {
            source: None,
            staleness: chrono::Duration::zero(),
            entry: Mutex::new(None),
        }
    }

    /// Build the cache described by `config.weights`.
    pub fn from_config(config: &Config) -> Result<Self, WeightsError> {
        let w = &config.weights;
        let staleness = chrono::Duration::minutes(w.staleness_minutes);
        let cache = match w.source {
            WeightsSourceKind::File => {
                Self::new(Box::new(FileWeightsSource::new(&w.path)), staleness)
            }
            WeightsSourceKind::Http => {
                let source = HttpWeightsSource::new(
                    w.url.clone(),
                    Duration::from_secs(w.timeout_secs),
                    config.credentials.weights_api_token.clone(),
                )?;
                Self::new(Box::new(source), staleness)
            }
            WeightsSourceKind::None => Self::disabled(),
        };
        Ok(cache)
    }

    /// Current weights, refreshing first if the cached value is older than
    /// the staleness window. `None` means the engine should use its fallback.
    pub async fn get_weights(&self, now: DateTime<Utc>) -> Option<Arc<WeightsSnapshot>> {
        let source = self.source.as_ref()?;

        let mut entry = self.entry.lock().await;
        if let Some(cached) = entry.as_ref() {
            if now - cached.fetched_at < self.staleness {
                debug!("using cached weights from {}", cached.fetched_at);
                return cached.snapshot.clone();
            }
        }

        let snapshot = match source.fetch_weights().await.map(WeightsSnapshot::from) {
            Ok(snap) if !snap.has_metric_weights() => {
                warn!(
                    "weights from {} have no metric weights, using fallback formula",
                    source.describe()
                );
                None
            }
            Ok(snap) => {
                info!(
                    "loaded {} weights (version '{}') from {}",
                    snap.len(),
                    snap.version(),
                    source.describe()
                );
                Some(Arc::new(snap))
            }
            Err(e) => {
                warn!("failed to fetch weights: {}; using fallback formula", e);
                None
            }
        };

        *entry = Some(CacheEntry {
            fetched_at: now,
            snapshot: snapshot.clone(),
        });
        snapshot
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    // ---- Helpers ----

    /// Scripted source: returns each queued result once, then errors.
    struct ScriptedSource {
        calls: Arc<AtomicUsize>,
        results: std::sync::Mutex<Vec<Option<BTreeMap<String, f64>>>>,
    }

    impl ScriptedSource {
        fn new(results: Vec<Option<BTreeMap<String, f64>>>) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let source = Self {
                calls: calls.clone(),
                results: std::sync::Mutex::new(results.into_iter().rev().collect()),
            };
            (source, calls)
        }
    }

    #[async_trait::async_trait]
    impl WeightsSource for ScriptedSource {
        async fn fetch_weights(&self) -> Result<WeightsResponse, WeightsError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.results.lock().unwrap().pop().flatten() {
                Some(weights) => Ok(WeightsResponse {
                    weights,
                    metadata: WeightMetadata::default(),
                }),
                None => Err(WeightsError::Io {
                    path: "scripted".into(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "scripted failure"),
                }),
            }
        }

        fn describe(&self) -> String {
            "scripted".into()
        }
    }

    fn weights(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn temp_file(name: &str, contents: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("fragscope_weights_tests");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    // ---- Cache ----

    #[tokio::test]
    async fn cache_serves_fresh_snapshot_without_refetch() {
        let (source, calls) = ScriptedSource::new(vec![Some(weights(&[("kills", 0.1)]))]);
        let cache = WeightsCache::new(Box::new(source), chrono::Duration::minutes(15));

        let first = cache.get_weights(t0()).await.unwrap();
        let second = cache
            .get_weights(t0() + chrono::Duration::minutes(14))
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cache_refreshes_after_staleness_window() {
        let (source, calls) = ScriptedSource::new(vec![
            Some(weights(&[("kills", 0.1)])),
            Some(weights(&[("kills", 0.2)])),
        ]);
        let cache = WeightsCache::new(Box::new(source), chrono::Duration::minutes(15));

        let first = cache.get_weights(t0()).await.unwrap();
        let later = cache
            .get_weights(t0() + chrono::Duration::minutes(15))
            .await
            .unwrap();
        assert_eq!(first.get("kills"), Some(0.1));
        assert_eq!(later.get("kills"), Some(0.2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_refresh_makes_weights_unavailable() {
        let (source, calls) = ScriptedSource::new(vec![Some(weights(&[("kills", 0.1)])), None]);
        let cache = WeightsCache::new(Box::new(source), chrono::Duration::minutes(15));

        assert!(cache.get_weights(t0()).await.is_some());
        let stale = t0() + chrono::Duration::minutes(20);
        assert!(cache.get_weights(stale).await.is_none());
        // Failure is cached for the window too.
        assert!(cache
            .get_weights(stale + chrono::Duration::minutes(1))
            .await
            .is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn empty_weights_are_unavailable() {
        let (source, _) = ScriptedSource::new(vec![Some(BTreeMap::new())]);
        let cache = WeightsCache::new(Box::new(source), chrono::Duration::minutes(15));
        assert!(cache.get_weights(t0()).await.is_none());
    }

    #[tokio::test]
    async fn role_multipliers_alone_are_unavailable() {
        let (source, _) = ScriptedSource::new(vec![Some(weights(&[("role_AWP", 1.1)]))]);
        let cache = WeightsCache::new(Box::new(source), chrono::Duration::minutes(15));
        assert!(cache.get_weights(t0()).await.is_none());
    }

    #[tokio::test]
    async fn disabled_cache_never_has_weights() {
        let cache = WeightsCache::disabled();
        assert!(cache.get_weights(t0()).await.is_none());
    }

    // ---- File source ----

    #[tokio::test]
    async fn file_source_reads_json() {
        let path = temp_file(
            "weights_v2.json",
            r#"{"weights": {"kills": 0.1, "role_IGL": 1.15},
                "metadata": {"version": "v2", "date": "2025-02-20", "samples": 96}}"#,
        );
        let resp = FileWeightsSource::new(&path).fetch_weights().await.unwrap();
        assert_eq!(resp.weights.get("role_IGL"), Some(&1.15));
        assert_eq!(resp.metadata.version, "v2");
        assert_eq!(resp.metadata.samples, 96);
    }

    #[tokio::test]
    async fn file_source_reads_learner_csv() {
        let path = temp_file(
            "learned_weights.csv",
            "metric,weight\nfirst_kill_success,0.25\nflash_efficiency,0.2\nbroken,abc\n",
        );
        let resp = FileWeightsSource::new(&path).fetch_weights().await.unwrap();
        assert_eq!(resp.weights.len(), 2);
        assert_eq!(resp.weights.get("first_kill_success"), Some(&0.25));
        assert_eq!(resp.metadata.version, "learned_weights");
        assert_eq!(resp.metadata.samples, 0);
    }

    #[test]
    fn learner_csv_metadata_rows_fill_metadata() {
        let csv_data = "\
feature,weight
metadata_version,202503011200
metadata_date,2025-03-01
metadata_samples,1240
kd,0.4
adr_norm,0.6";

        let resp = load_weights_csv_from_reader(csv_data.as_bytes()).unwrap();
        assert_eq!(resp.weights, weights(&[("adr_norm", 0.6), ("kd", 0.4)]));
        assert_eq!(resp.metadata.version, "202503011200");
        assert_eq!(resp.metadata.date, "2025-03-01");
        assert_eq!(resp.metadata.samples, 1240);
    }

    #[tokio::test]
    async fn file_source_keeps_learner_csv_metadata() {
        let path = temp_file(
            "learned_weights_2025-03-01.csv",
            "feature,weight\nmetadata_version,202503011200\nmetadata_date,2025-03-01\n\
             metadata_samples,1240\nkd,0.4\n",
        );
        let resp = FileWeightsSource::new(&path).fetch_weights().await.unwrap();
        assert_eq!(resp.metadata.version, "202503011200");
        assert_eq!(resp.metadata.date, "2025-03-01");
        assert_eq!(resp.weights.len(), 1);
    }

    #[tokio::test]
    async fn metadata_only_learner_csv_is_unavailable() {
        let path = temp_file(
            "metadata_only.csv",
            "feature,weight\nmetadata_version,202503011200\nmetadata_samples,0\n",
        );
        let source = FileWeightsSource::new(&path);
        assert!(source.fetch_weights().await.unwrap().weights.is_empty());

        let cache = WeightsCache::new(Box::new(source), chrono::Duration::minutes(15));
        assert!(cache.get_weights(t0()).await.is_none());
    }

    #[tokio::test]
    async fn file_source_missing_file_is_io_error() {
        let source = FileWeightsSource::new("/definitely/not/here.json");
        match source.fetch_weights().await.unwrap_err() {
            WeightsError::Io { path, .. } => assert!(path.ends_with("here.json")),
            other => panic!("expected Io, got: {other}"),
        }
    }

    #[tokio::test]
    async fn file_source_bad_json_is_json_error() {
        let path = temp_file("broken.json", "{not json");
        let err = FileWeightsSource::new(&path).fetch_weights().await.unwrap_err();
        assert!(matches!(err, WeightsError::Json { .. }));
    }

    // ---- HTTP source ----

    fn local_source(url: String) -> HttpWeightsSource {
        let http = reqwest::Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        HttpWeightsSource::with_client(http, url, Some("test-token".into()))
    }

    /// Serve one canned HTTP response on a local port and return its URL.
    async fn serve_once(status: &'static str, body: &'static str) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        });
        format!("http://{addr}/api/weights")
    }

    #[tokio::test]
    async fn http_source_parses_response() {
        let url = serve_once(
            "200 OK",
            r#"{"weights":{"kills":0.1},"metadata":{"version":"v5","date":"2025-03-01","samples":10}}"#,
        )
        .await;
        let source = local_source(url);
        let resp = source.fetch_weights().await.unwrap();
        assert_eq!(resp.weights.get("kills"), Some(&0.1));
        assert_eq!(resp.metadata.version, "v5");
    }

    #[tokio::test]
    async fn http_error_status_is_unavailable_through_cache() {
        let url = serve_once("500 Internal Server Error", "{}").await;
        let source = local_source(url);
        let cache = WeightsCache::new(Box::new(source), chrono::Duration::minutes(15));
        assert!(cache.get_weights(t0()).await.is_none());
    }
}
