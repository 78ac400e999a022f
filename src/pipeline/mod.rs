//! Rate-limited batch geocoding.
//!
//! Resolves addresses one at a time through an injected [`Geocoder`],
//! spacing external calls by a minimum delay and never letting a failed
//! lookup abort the batch.

mod cache;
mod rate_limit;

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::geocoder::Geocoder;
use crate::models::{AddressRecord, Status};

pub use cache::{normalize_address, GeocodeCache};
pub use rate_limit::RateLimiter;

/// Counts per status for a finished batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub resolved: usize,
    pub not_found: usize,
    pub service_errors: usize,
}

impl BatchSummary {
    pub fn from_records(records: &[AddressRecord]) -> Self {
        let mut summary = Self::default();
        for record in records {
            match record.status() {
                Status::Resolved => summary.resolved += 1,
                Status::NotFound => summary.not_found += 1,
                Status::ServiceError => summary.service_errors += 1,
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.resolved + self.not_found + self.service_errors
    }
}

pub struct Pipeline<G> {
    geocoder: G,
    limiter: RateLimiter,
    cache: Option<GeocodeCache>,
    calls: usize,
    cache_hits: usize,
}

impl<G: Geocoder> Pipeline<G> {
    /// Pipeline with an in-memory cache for duplicate addresses
    pub fn new(geocoder: G, min_delay: Duration) -> Self {
        Self::with_cache(geocoder, min_delay, Some(GeocodeCache::new()))
    }

    /// Pipeline that resolves every address independently
    pub fn without_cache(geocoder: G, min_delay: Duration) -> Self {
        Self::with_cache(geocoder, min_delay, None)
    }

    pub fn with_cache(geocoder: G, min_delay: Duration, cache: Option<GeocodeCache>) -> Self {
        Self {
            geocoder,
            limiter: RateLimiter::new(min_delay),
            cache,
            calls: 0,
            cache_hits: 0,
        }
    }

    /// Number of external calls issued so far
    pub fn calls(&self) -> usize {
        self.calls
    }

    pub fn cache_hits(&self) -> usize {
        self.cache_hits
    }

    pub fn cache(&self) -> Option<&GeocodeCache> {
        self.cache.as_ref()
    }

    /// Resolve every address, one record per input in input order
    pub async fn resolve<S: AsRef<str>>(&mut self, addresses: &[S]) -> Vec<AddressRecord> {
        self.resolve_with(addresses, |_| {}).await
    }

    /// Like [`resolve`](Self::resolve), calling `on_record` after each lookup
    pub async fn resolve_with<S, F>(&mut self, addresses: &[S], mut on_record: F) -> Vec<AddressRecord>
    where
        S: AsRef<str>,
        F: FnMut(&AddressRecord),
    {
        let calls_before = self.calls;
        let hits_before = self.cache_hits;

        let mut records = Vec::with_capacity(addresses.len());
        for address in addresses {
            let record = self.resolve_one(address.as_ref()).await;
            on_record(&record);
            records.push(record);
        }

        let summary = BatchSummary::from_records(&records);
        info!(
            "Geocoded {} addresses: {} resolved, {} not found, {} service errors ({} calls, {} cache hits)",
            summary.total(),
            summary.resolved,
            summary.not_found,
            summary.service_errors,
            self.calls - calls_before,
            self.cache_hits - hits_before
        );

        records
    }

    /// Resolve a single address; failures become records, never errors
    pub async fn resolve_one(&mut self, address: &str) -> AddressRecord {
        let query = address.trim();
        if query.is_empty() {
            return AddressRecord::not_found(address);
        }

        if let Some(cached) = self.cache.as_ref().and_then(|c| c.get(query)) {
            self.cache_hits += 1;
            debug!(%query, "Geocoding cache hit");
            return match cached {
                Some(coordinate) => AddressRecord::resolved(address, coordinate),
                None => AddressRecord::not_found(address),
            };
        }

        self.limiter.acquire().await;
        self.calls += 1;
        debug!(%query, "Geocoding address");

        match self.geocoder.geocode(query).await {
            Ok(Some(coordinate)) if coordinate.is_valid() => {
                if let Some(cache) = self.cache.as_mut() {
                    cache.insert(query, Some(coordinate));
                }
                AddressRecord::resolved(address, coordinate)
            }
            Ok(Some(coordinate)) => {
                warn!(%query, ?coordinate, "Geocoder returned out-of-range coordinate");
                AddressRecord::service_error(
                    address,
                    format!(
                        "coordinate out of range: {}, {}",
                        coordinate.latitude, coordinate.longitude
                    ),
                )
            }
            Ok(None) => {
                debug!(%query, "No geocoding match");
                if let Some(cache) = self.cache.as_mut() {
                    cache.insert(query, None);
                }
                AddressRecord::not_found(address)
            }
            Err(e) => {
                warn!(%query, "Geocoding failed: {}", e);
                AddressRecord::service_error(address, e.to_string())
            }
        }
    }

    /// Re-run the lookups that failed with a service error, in place.
    ///
    /// Runs at most `rounds` passes and stops as soon as no service errors
    /// remain. Returns how many service errors are left.
    pub async fn retry_service_errors(&mut self, records: &mut [AddressRecord], rounds: usize) -> usize {
        for round in 1..=rounds {
            let failed: Vec<usize> = records
                .iter()
                .enumerate()
                .filter(|(_, r)| r.status() == Status::ServiceError)
                .map(|(i, _)| i)
                .collect();

            if failed.is_empty() {
                return 0;
            }

            info!(
                "Retrying {} failed lookups (round {}/{})",
                failed.len(),
                round,
                rounds
            );

            for i in failed {
                let address = records[i].address().to_string();
                records[i] = self.resolve_one(&address).await;
            }
        }

        records
            .iter()
            .filter(|r| r.status() == Status::ServiceError)
            .count()
    }
}

/// Resolve `addresses` with a fresh cached pipeline
pub async fn resolve<G, S>(geocoder: G, addresses: &[S], min_delay: Duration) -> Vec<AddressRecord>
where
    G: Geocoder,
    S: AsRef<str>,
{
    Pipeline::new(geocoder, min_delay).resolve(addresses).await
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use tokio::time::Instant;

    use super::*;
    use crate::geocoder::GeocodeError;
    use crate::models::Coordinate;

    #[derive(Clone, Copy)]
    enum Reply {
        Hit(f64, f64),
        Miss,
        Fail,
    }

    /// Answers from a fixed table and records every call
    #[derive(Clone, Default)]
    struct ScriptedGeocoder {
        replies: HashMap<String, Reply>,
        calls: Arc<Mutex<Vec<(String, Instant)>>>,
        /// Addresses that fail on their first call only
        flaky: Arc<Mutex<Vec<String>>>,
    }

    impl ScriptedGeocoder {
        fn with(mut self, address: &str, reply: Reply) -> Self {
            self.replies.insert(address.to_string(), reply);
            self
        }

        fn flaky(self, address: &str) -> Self {
            self.flaky.lock().unwrap().push(address.to_string());
            self
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        fn call_times(&self) -> Vec<Instant> {
            self.calls.lock().unwrap().iter().map(|(_, t)| *t).collect()
        }
    }

    #[async_trait]
    impl Geocoder for ScriptedGeocoder {
        async fn geocode(&self, address: &str) -> Result<Option<Coordinate>, GeocodeError> {
            self.calls
                .lock()
                .unwrap()
                .push((address.to_string(), Instant::now()));

            {
                let mut flaky = self.flaky.lock().unwrap();
                if let Some(pos) = flaky.iter().position(|a| a == address) {
                    flaky.remove(pos);
                    return Err(GeocodeError::Status(503));
                }
            }

            match self.replies.get(address).copied().unwrap_or(Reply::Miss) {
                Reply::Hit(lat, lon) => Ok(Some(Coordinate::new(lat, lon))),
                Reply::Miss => Ok(None),
                Reply::Fail => Err(GeocodeError::Request("connection reset".into())),
            }
        }
    }

    const MAIN_ST: &str = "123 Main St, Austin, TX 78701";

    #[tokio::test(start_paused = true)]
    async fn test_single_resolved_address() {
        let geocoder = ScriptedGeocoder::default().with(MAIN_ST, Reply::Hit(30.27, -97.74));
        let records = resolve(geocoder, &[MAIN_ST], Duration::from_secs(1)).await;

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status(), Status::Resolved);
        assert_eq!(records[0].latitude(), Some(30.27));
        assert_eq!(records[0].longitude(), Some(-97.74));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_and_unmatched_addresses() {
        let geocoder = ScriptedGeocoder::default();
        let mut pipeline = Pipeline::new(geocoder.clone(), Duration::from_secs(1));
        let records = pipeline.resolve(&["", "Nowhere, ZZ 00000"]).await;

        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.status() == Status::NotFound));
        assert!(records.iter().all(|r| r.coordinate().is_none()));
        // Only the non-empty address reaches the service
        assert_eq!(geocoder.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_whitespace_address_issues_no_call() {
        let geocoder = ScriptedGeocoder::default();
        let mut pipeline = Pipeline::new(geocoder.clone(), Duration::from_secs(1));
        let records = pipeline.resolve(&["   \t"]).await;

        assert_eq!(records[0].status(), Status::NotFound);
        assert_eq!(geocoder.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_does_not_abort_batch() {
        let geocoder = ScriptedGeocoder::default()
            .with("a", Reply::Hit(1.0, 2.0))
            .with("b", Reply::Fail)
            .with("c", Reply::Hit(3.0, 4.0));
        let mut pipeline = Pipeline::new(geocoder, Duration::from_secs(1));
        let records = pipeline.resolve(&["a", "b", "c"]).await;

        let statuses: Vec<Status> = records.iter().map(|r| r.status()).collect();
        assert_eq!(
            statuses,
            vec![Status::Resolved, Status::ServiceError, Status::Resolved]
        );
        assert!(records[1].coordinate().is_none());
        assert!(records[1].detail().unwrap().contains("connection reset"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_output_preserves_order_and_length() {
        let geocoder = ScriptedGeocoder::default()
            .with("x", Reply::Hit(10.0, 10.0))
            .with("y", Reply::Hit(20.0, 20.0));
        let input = ["y", "", "x", "y", "missing", "x"];
        let records = resolve(geocoder, &input, Duration::from_millis(100)).await;

        assert_eq!(records.len(), input.len());
        for (record, address) in records.iter().zip(input) {
            assert_eq!(record.address(), address);
        }
        assert_eq!(records[0].latitude(), Some(20.0));
        assert_eq!(records[2].latitude(), Some(10.0));
        assert_eq!(records[4].status(), Status::NotFound);
    }

    #[tokio::test(start_paused = true)]
    async fn test_calls_respect_min_delay() {
        let geocoder = ScriptedGeocoder::default();
        let delay = Duration::from_secs(5);
        let mut pipeline = Pipeline::without_cache(geocoder.clone(), delay);

        let start = Instant::now();
        pipeline.resolve(&["a", "b", "c", "d"]).await;
        assert!(start.elapsed() >= delay * 3);

        let times = geocoder.call_times();
        assert_eq!(times.len(), 4);
        for pair in times.windows(2) {
            assert!(pair[1] - pair[0] >= delay);
        }
    }

    #[tokio::test]
    async fn test_min_delay_on_wall_clock() {
        let delay = Duration::from_millis(30);
        let start = std::time::Instant::now();
        resolve(ScriptedGeocoder::default(), &["a", "b", "c"], delay).await;
        assert!(start.elapsed() >= delay * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicates_served_from_cache() {
        let geocoder = ScriptedGeocoder::default().with("123 Main St", Reply::Hit(30.27, -97.74));
        let mut pipeline = Pipeline::new(geocoder.clone(), Duration::from_secs(1));

        let start = Instant::now();
        let records = pipeline
            .resolve(&["123 Main St", "123  main st", " 123 MAIN ST "])
            .await;

        assert_eq!(geocoder.call_count(), 1);
        assert_eq!(pipeline.cache_hits(), 2);
        assert!(records.iter().all(|r| r.is_resolved()));
        // Cache hits do not wait on the rate limiter
        assert_eq!(start.elapsed(), Duration::ZERO);
        // Records keep the caller's spelling
        assert_eq!(records[2].address(), " 123 MAIN ST ");
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_is_cached() {
        let geocoder = ScriptedGeocoder::default();
        let mut pipeline = Pipeline::new(geocoder.clone(), Duration::from_secs(1));
        let records = pipeline.resolve(&["nowhere", "nowhere"]).await;

        assert_eq!(geocoder.call_count(), 1);
        assert!(records.iter().all(|r| r.status() == Status::NotFound));
    }

    #[tokio::test(start_paused = true)]
    async fn test_service_errors_are_not_cached() {
        let geocoder = ScriptedGeocoder::default().with("down", Reply::Fail);
        let mut pipeline = Pipeline::new(geocoder.clone(), Duration::from_secs(1));
        pipeline.resolve(&["down", "down"]).await;

        assert_eq!(geocoder.call_count(), 2);
        assert!(pipeline.cache().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_without_cache_resolves_duplicates_independently() {
        let geocoder = ScriptedGeocoder::default().with("a", Reply::Hit(1.0, 1.0));
        let mut pipeline = Pipeline::without_cache(geocoder.clone(), Duration::from_secs(1));
        pipeline.resolve(&["a", "a", "a"]).await;

        assert_eq!(geocoder.call_count(), 3);
        assert_eq!(pipeline.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_range_coordinate_is_service_error() {
        let geocoder = ScriptedGeocoder::default().with("bad", Reply::Hit(123.0, 0.0));
        let records = resolve(geocoder, &["bad"], Duration::ZERO).await;

        assert_eq!(records[0].status(), Status::ServiceError);
        assert!(records[0].coordinate().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_with_reports_each_record() {
        let geocoder = ScriptedGeocoder::default().with("a", Reply::Hit(1.0, 1.0));
        let mut pipeline = Pipeline::new(geocoder, Duration::from_secs(1));

        let mut seen = Vec::new();
        pipeline
            .resolve_with(&["a", "", "b"], |r| seen.push(r.status()))
            .await;

        assert_eq!(
            seen,
            vec![Status::Resolved, Status::NotFound, Status::NotFound]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_only_touches_service_errors() {
        let geocoder = ScriptedGeocoder::default()
            .with("ok", Reply::Hit(1.0, 1.0))
            .with("flaky", Reply::Hit(2.0, 2.0))
            .flaky("flaky");
        let mut pipeline = Pipeline::new(geocoder.clone(), Duration::from_secs(1));

        let mut records = pipeline.resolve(&["ok", "flaky", "none"]).await;
        assert_eq!(records[1].status(), Status::ServiceError);
        assert_eq!(geocoder.call_count(), 3);

        let remaining = pipeline.retry_service_errors(&mut records, 3).await;
        assert_eq!(remaining, 0);
        assert_eq!(records[1].status(), Status::Resolved);
        assert_eq!(records[1].latitude(), Some(2.0));
        // One retry call; "ok" and "none" were left alone
        assert_eq!(geocoder.call_count(), 4);
        assert_eq!(records[2].status(), Status::NotFound);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_gives_up_after_rounds() {
        let geocoder = ScriptedGeocoder::default().with("down", Reply::Fail);
        let mut pipeline = Pipeline::new(geocoder.clone(), Duration::from_secs(1));

        let mut records = pipeline.resolve(&["down"]).await;
        let remaining = pipeline.retry_service_errors(&mut records, 2).await;

        assert_eq!(remaining, 1);
        assert_eq!(geocoder.call_count(), 3);
    }

    #[test]
    fn test_batch_summary() {
        let records = vec![
            AddressRecord::resolved("a", Coordinate::new(0.0, 0.0)),
            AddressRecord::not_found("b"),
            AddressRecord::not_found("c"),
            AddressRecord::service_error("d", "HTTP 429"),
        ];
        let summary = BatchSummary::from_records(&records);
        assert_eq!(
            summary,
            BatchSummary {
                resolved: 1,
                not_found: 2,
                service_errors: 1
            }
        );
        assert_eq!(summary.total(), 4);
    }
}
