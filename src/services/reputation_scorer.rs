//! Registry-derived reputation scoring, rate limited and cached per §4.3.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::models::ecosystem::Ecosystem;
use crate::models::reputation::{ReputationFactors, ReputationResult};
use crate::services::analyzer::EcosystemAnalyzer;
use crate::services::cache::Cache;
use crate::services::http_client::HttpClient;
use crate::utils::error::AuditError;

const DEFAULT_RATE_PER_SECOND: f64 = 10.0;
const REPUTATION_CACHE_TTL_HOURS: f64 = 24.0;
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Token-bucket-style limiter: a caller arriving earlier than `1/rate` after the previous
/// request sleeps the residual. Shared by every call through one `ReputationScorer` instance.
struct RateLimiter {
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RateLimiter {
    fn new(requests_per_second: f64) -> Self {
        let rate = if requests_per_second > 0.0 { requests_per_second } else { DEFAULT_RATE_PER_SECOND };
        Self {
            min_interval: Duration::from_secs_f64(1.0 / rate),
            last_request: Mutex::new(None),
        }
    }

    async fn wait_turn(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

pub struct ReputationScorer {
    http: HttpClient,
    cache: Arc<Cache>,
    limiter: RateLimiter,
}

impl ReputationScorer {
    pub fn new(http: HttpClient, cache: Arc<Cache>, requests_per_second: f64) -> Self {
        Self { http, cache, limiter: RateLimiter::new(requests_per_second) }
    }

    /// Computes `name@version`'s reputation under `ecosystem`, consulting the Cache first.
    pub async fn calculate(
        &self,
        analyzer: &dyn EcosystemAnalyzer,
        name: &str,
        version: &str,
    ) -> Result<ReputationResult, AuditError> {
        let cache_key = self.cache.key(&format!("reputation:{}:{name}:{version}", analyzer.ecosystem()), None);

        if let Some(cached) = self.cache.get(&cache_key).await {
            if let Ok(result) = serde_json::from_value(cached) {
                debug!(name, version, "reputation cache hit");
                return Ok(result);
            }
        }

        self.limiter.wait_turn().await;

        let url = analyzer.get_registry_url(name);
        let raw: Option<Value> = self.http.get_json(&url, FETCH_TIMEOUT).await?;
        let raw = raw.unwrap_or(Value::Null);

        let factors = match analyzer.ecosystem() {
            Ecosystem::Npm => extract_npm_factors(&raw),
            Ecosystem::Pypi => extract_pypi_factors(&raw),
        };

        let result = ReputationResult::from_factors(factors, raw);

        if let Ok(value) = serde_json::to_value(&result) {
            self.cache.store(&cache_key, value, REPUTATION_CACHE_TTL_HOURS).await;
        }

        Ok(result)
    }
}

fn parse_iso_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc)).ok()
}

fn days_since(date: DateTime<Utc>) -> i64 {
    (Utc::now() - date).num_days()
}

fn age_score(days_since_creation: i64) -> f64 {
    match days_since_creation {
        d if d < 30 => 0.2,
        d if d < 90 => 0.5,
        d if d < 365 => 0.7,
        d if d < 730 => 0.9,
        _ => 1.0,
    }
}

fn downloads_score(weekly: Option<u64>) -> f64 {
    match weekly {
        None => 0.5,
        Some(d) if d < 100 => 0.2,
        Some(d) if d < 1_000 => 0.5,
        Some(d) if d < 10_000 => 0.7,
        Some(d) if d < 100_000 => 0.9,
        Some(_) => 1.0,
    }
}

fn maintenance_score(days_since_update: i64) -> f64 {
    match days_since_update {
        d if d > 730 => 0.2,
        d if d > 365 => 0.5,
        d if d > 180 => 0.7,
        _ => 1.0,
    }
}

fn author_score(has_org_or_multi_maintainer: bool, has_named_author: bool) -> f64 {
    if has_org_or_multi_maintainer {
        1.0
    } else if has_named_author {
        0.8
    } else {
        0.3
    }
}

fn extract_npm_factors(raw: &Value) -> ReputationFactors {
    let created = raw
        .get("time")
        .and_then(|t| t.get("created"))
        .and_then(|v| v.as_str())
        .and_then(parse_iso_date)
        .map(days_since);

    let modified = raw
        .get("time")
        .and_then(|t| t.get("modified"))
        .and_then(|v| v.as_str())
        .and_then(parse_iso_date)
        .map(days_since);

    let maintainer_count = raw.get("maintainers").and_then(|v| v.as_array()).map(|a| a.len()).unwrap_or(0);
    let has_author = raw
        .get("author")
        .map(|a| match a {
            Value::String(s) => !s.is_empty(),
            Value::Object(o) => o.get("name").and_then(|n| n.as_str()).is_some_and(|n| !n.is_empty()),
            _ => false,
        })
        .unwrap_or(false);

    ReputationFactors {
        age: created.map(age_score).unwrap_or(0.5),
        downloads: downloads_score(None),
        author: author_score(maintainer_count >= 2, has_author),
        maintenance: modified.map(maintenance_score).unwrap_or(0.5),
    }
}

fn extract_pypi_factors(raw: &Value) -> ReputationFactors {
    let release_dates: Vec<DateTime<Utc>> = raw
        .get("releases")
        .and_then(|v| v.as_object())
        .map(|releases| {
            releases
                .values()
                .filter_map(|files| files.as_array())
                .flatten()
                .filter_map(|file| file.get("upload_time_iso_8601").and_then(|v| v.as_str()))
                .filter_map(parse_iso_date)
                .collect()
        })
        .unwrap_or_default();

    let created = release_dates.iter().min().copied().map(days_since);
    let last_updated = release_dates.iter().max().copied().map(days_since);

    let author = raw.get("info").and_then(|i| i.get("author")).and_then(|v| v.as_str());
    let has_author = author.is_some_and(|a| !a.trim().is_empty());

    ReputationFactors {
        age: created.map(age_score).unwrap_or(0.5),
        downloads: downloads_score(None),
        author: author_score(false, has_author),
        maintenance: last_updated.map(maintenance_score).unwrap_or(0.5),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_age_score_buckets_monotonic() {
        assert!(age_score(10) < age_score(100));
        assert!(age_score(100) < age_score(400));
        assert!(age_score(400) < age_score(800));
        assert!(age_score(800) <= age_score(10_000));
    }

    #[test]
    fn test_maintenance_score_buckets_monotonic_with_recency() {
        // more recent update (fewer days since) must score no lower
        assert!(maintenance_score(10) >= maintenance_score(200));
        assert!(maintenance_score(200) >= maintenance_score(400));
        assert!(maintenance_score(400) >= maintenance_score(800));
    }

    #[test]
    fn test_downloads_score_monotonic() {
        assert!(downloads_score(Some(50)) < downloads_score(Some(500)));
        assert!(downloads_score(Some(500)) < downloads_score(Some(5_000)));
        assert!(downloads_score(Some(5_000)) < downloads_score(Some(50_000)));
        assert!(downloads_score(Some(50_000)) < downloads_score(Some(200_000)));
        assert_eq!(downloads_score(None), 0.5);
    }

    #[test]
    fn test_author_score_tiers() {
        assert_eq!(author_score(true, true), 1.0);
        assert_eq!(author_score(false, true), 0.8);
        assert_eq!(author_score(false, false), 0.3);
    }

    #[test]
    fn test_extract_npm_factors_missing_fields_neutral() {
        let factors = extract_npm_factors(&Value::Null);
        assert_eq!(factors.age, 0.5);
        assert_eq!(factors.downloads, 0.5);
        assert_eq!(factors.maintenance, 0.5);
        assert_eq!(factors.author, 0.3);
    }

    #[test]
    fn test_extract_pypi_factors_missing_fields_neutral() {
        let factors = extract_pypi_factors(&Value::Null);
        assert_eq!(factors.downloads, 0.5);
        assert_eq!(factors.age, 0.5);
    }

    #[tokio::test]
    async fn test_rate_limiter_enforces_min_interval() {
        let limiter = RateLimiter::new(20.0);
        let start = Instant::now();
        limiter.wait_turn().await;
        limiter.wait_turn().await;
        assert!(start.elapsed() >= Duration::from_millis(45));
    }
}
