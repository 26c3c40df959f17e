//! Rate-limited HTTP client
//!
//! Paces outbound requests to an external authority with a fixed number of
//! send slots. A slot taken at time `t` becomes reusable at `t + interval`,
//! whether or not the request that took it has answered: latency neither
//! frees a slot early nor holds it past its release. The interval adapts to
//! the service's answers:
//! - ten consecutive successes halve it, down to the configured floor
//! - `429` / `503` double it, up to the configured ceiling, and the request is retried

use geokg_core::{GeoKgError, RateLimitConfig, Result};
use parking_lot::Mutex;
use reqwest::{Client, Request, Response, Url};
use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Length of the rolling send-time and status windows
pub const WINDOW: usize = 10;

// ============================================================================
// Send schedule
// ============================================================================

/// Result of asking the schedule for a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    Granted,
    /// All slots taken; the earliest one is released at this instant
    Wait(Instant),
}

/// Explicit release schedule for send slots.
///
/// Each taken slot is one pending release instant. Pure bookkeeping over
/// caller-supplied instants, so pacing rules can be checked without a
/// runtime.
#[derive(Debug)]
pub struct SendSchedule {
    capacity: usize,
    releases: Vec<Instant>,
}

impl SendSchedule {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            releases: Vec::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Take a slot at `now`, released at `now + interval`
    pub fn reserve(&mut self, now: Instant, interval: Duration) -> Reservation {
        self.releases.retain(|at| *at > now);

        match self.releases.iter().min() {
            Some(at) if self.releases.len() >= self.capacity => Reservation::Wait(*at),
            _ => {
                self.releases.push(now + interval);
                Reservation::Granted
            }
        }
    }

    /// Slots whose release is still pending at `now`
    pub fn occupied(&self, now: Instant) -> usize {
        self.releases.iter().filter(|at| **at > now).count()
    }
}

// ============================================================================
// Client
// ============================================================================

/// Anything carrying an HTTP status code
pub trait HasStatus {
    fn status_code(&self) -> u16;
}

impl HasStatus for Response {
    fn status_code(&self) -> u16 {
        self.status().as_u16()
    }
}

fn is_throttled(status: u16) -> bool {
    status == 429 || status == 503
}

fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

#[derive(Debug)]
struct PacingState {
    schedule: SendSchedule,
    interval: Duration,
    send_times: VecDeque<Instant>,
    statuses: VecDeque<u16>,
}

/// HTTP client that paces requests and backs off under throttling
pub struct RateLimitedClient {
    http: Client,
    label: String,
    state: Mutex<PacingState>,
    min_interval: Duration,
    max_interval: Duration,
    max_attempts: u32,
    timeout: Duration,
}

impl std::fmt::Debug for RateLimitedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitedClient")
            .field("label", &self.label)
            .field("interval", &self.interval())
            .field("capacity", &self.state.lock().schedule.capacity())
            .finish()
    }
}

impl RateLimitedClient {
    /// Paced client whose HTTP requests, bodies included, are bounded by
    /// `config.timeout()`
    pub fn new(label: impl Into<String>, config: &RateLimitConfig) -> Result<Self> {
        let label = label.into();
        let http = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| GeoKgError::ConfigError(format!("http client for {label}: {e}")))?;

        let interval = config.interval();
        Ok(Self {
            http,
            label,
            state: Mutex::new(PacingState {
                schedule: SendSchedule::new(config.max_in_flight),
                interval,
                send_times: VecDeque::with_capacity(WINDOW),
                statuses: VecDeque::with_capacity(WINDOW),
            }),
            min_interval: config.min_interval().min(interval),
            max_interval: config.max_interval(),
            max_attempts: config.max_attempts.max(1),
            timeout: config.timeout(),
        })
    }

    pub fn with_http_client(mut self, http: Client) -> Self {
        self.http = http;
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Current pacing interval
    pub fn interval(&self) -> Duration {
        self.state.lock().interval
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send instants of the last ten requests, oldest first
    pub fn recent_send_times(&self) -> Vec<Instant> {
        self.state.lock().send_times.iter().copied().collect()
    }

    /// Status codes of the last ten responses, oldest first
    pub fn recent_statuses(&self) -> Vec<u16> {
        self.state.lock().statuses.iter().copied().collect()
    }

    /// Slots taken within the current interval
    pub fn occupied_slots(&self) -> usize {
        self.state.lock().schedule.occupied(Instant::now())
    }

    async fn acquire(&self) {
        loop {
            let release = {
                let mut state = self.state.lock();
                let now = Instant::now();
                let interval = state.interval;
                match state.schedule.reserve(now, interval) {
                    Reservation::Granted => {
                        if state.send_times.len() == WINDOW {
                            state.send_times.pop_front();
                        }
                        state.send_times.push_back(now);
                        return;
                    }
                    Reservation::Wait(at) => at,
                }
            };
            tokio::time::sleep_until(release).await;
        }
    }

    fn record_status(&self, status: u16) {
        let mut state = self.state.lock();
        if state.statuses.len() == WINDOW {
            state.statuses.pop_front();
        }
        state.statuses.push_back(status);

        if is_throttled(status) {
            let doubled = state.interval.saturating_mul(2).min(self.max_interval);
            state.interval = doubled.max(self.min_interval);
            tracing::warn!(
                client = %self.label,
                status,
                interval_secs = state.interval.as_secs_f64(),
                "Throttled, backing off"
            );
        } else if state.statuses.len() == WINDOW && state.statuses.iter().all(|s| is_success(*s)) {
            let halved = (state.interval / 2).max(self.min_interval);
            if halved != state.interval {
                state.interval = halved;
                tracing::info!(
                    client = %self.label,
                    interval_secs = halved.as_secs_f64(),
                    "Interval reduced"
                );
            }
        }
    }

    /// Run `op` under pacing, retrying on `429`/`503`.
    ///
    /// Returns `Ok(None)` once `max_attempts` throttled answers have been
    /// seen. Transport errors and timeouts are returned as errors.
    pub async fn execute<T, F, Fut>(&self, mut op: F) -> Result<Option<T>>
    where
        T: HasStatus,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        for attempt in 1..=self.max_attempts {
            self.acquire().await;
            let outcome = tokio::time::timeout(self.timeout, op()).await;

            let response = match outcome {
                Ok(result) => result?,
                Err(_) => return Err(GeoKgError::Timeout(self.timeout)),
            };

            let status = response.status_code();
            self.record_status(status);
            if is_throttled(status) {
                tracing::debug!(client = %self.label, attempt, status, "Retrying throttled request");
                continue;
            }
            return Ok(Some(response));
        }

        tracing::warn!(
            client = %self.label,
            attempts = self.max_attempts,
            "Rate limit retries exhausted"
        );
        Ok(None)
    }

    /// Send a prepared request under pacing
    pub async fn send(&self, request: Request) -> Result<Option<Response>> {
        let target = format!(
            "{}{}",
            request.url().host_str().unwrap_or_default(),
            request.url().path()
        );

        self.execute(|| {
            let attempt = request.try_clone();
            let http = self.http.clone();
            let target = target.clone();
            async move {
                let attempt = attempt.ok_or_else(|| {
                    GeoKgError::AuthorityError(format!("request to {target} cannot be retried"))
                })?;
                http.execute(attempt)
                    .await
                    .map_err(|e| GeoKgError::AuthorityError(format!("request to {target} failed: {e}")))
            }
        })
        .await
    }

    /// Paced GET
    pub async fn get(&self, url: Url) -> Result<Option<Response>> {
        let request = self
            .http
            .get(url)
            .build()
            .map_err(|e| GeoKgError::AuthorityError(format!("invalid request: {e}")))?;
        self.send(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug)]
    struct Reply(u16);

    impl HasStatus for Reply {
        fn status_code(&self) -> u16 {
            self.0
        }
    }

    fn config(interval_secs: f64, max_in_flight: usize) -> RateLimitConfig {
        RateLimitConfig {
            interval_secs,
            max_in_flight,
            ..RateLimitConfig::default()
        }
    }

    #[test]
    fn test_schedule_releases_on_deadline() {
        let t0 = Instant::now();
        let interval = Duration::from_secs(2);
        let mut schedule = SendSchedule::new(2);

        assert_eq!(schedule.reserve(t0, interval), Reservation::Granted);
        assert_eq!(schedule.reserve(t0, interval), Reservation::Granted);
        assert_eq!(schedule.reserve(t0, interval), Reservation::Wait(t0 + interval));
        assert_eq!(
            schedule.reserve(t0 + Duration::from_secs(1), interval),
            Reservation::Wait(t0 + interval)
        );
        assert_eq!(schedule.occupied(t0 + Duration::from_secs(1)), 2);

        // both slots come free at the deadline, with nothing else to wait on
        let due = t0 + interval;
        assert_eq!(schedule.occupied(due), 0);
        assert_eq!(schedule.reserve(due, interval), Reservation::Granted);
        assert_eq!(schedule.reserve(due, interval), Reservation::Granted);
        assert_eq!(schedule.reserve(due, interval), Reservation::Wait(due + interval));
    }

    #[test]
    fn test_zero_interval_never_waits() {
        let t0 = Instant::now();
        let mut schedule = SendSchedule::new(1);
        for _ in 0..5 {
            assert_eq!(schedule.reserve(t0, Duration::ZERO), Reservation::Granted);
        }
        assert_eq!(schedule.occupied(t0), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_slot_spacing() {
        let client = RateLimitedClient::new("test", &config(1.0, 1)).unwrap();
        let mut starts = Vec::new();
        for _ in 0..5 {
            client
                .execute(|| {
                    starts.push(Instant::now());
                    async { Ok(Reply(200)) }
                })
                .await
                .unwrap();
        }
        for pair in starts.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_secs(1));
        }
        assert_eq!(client.recent_send_times(), starts);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_batch_waits_full_interval() {
        let k = 3;
        let t = Duration::from_secs(2);
        let client = Arc::new(RateLimitedClient::new("test", &config(2.0, k)).unwrap());

        let tasks = (0..2 * k).map(|_| {
            let client = client.clone();
            async move {
                let mut started = None;
                client
                    .execute(|| {
                        started = Some(Instant::now());
                        async { Ok(Reply(200)) }
                    })
                    .await
                    .unwrap();
                started.unwrap()
            }
        });
        let mut starts = futures::future::join_all(tasks).await;
        starts.sort();

        for later in &starts[k..] {
            assert!(*later - starts[0] >= t);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_responses_do_not_delay_next_send() {
        let client = Arc::new(RateLimitedClient::new("test", &config(1.0, 1)).unwrap());
        let sends = Arc::new(Mutex::new(Vec::new()));
        let started = Instant::now();

        let tasks = (0..3).map(|_| {
            let client = client.clone();
            let sends = sends.clone();
            async move {
                client
                    .execute(|| {
                        sends.lock().push(Instant::now() - started);
                        async {
                            tokio::time::sleep(Duration::from_secs(3)).await;
                            Ok(Reply(200))
                        }
                    })
                    .await
                    .unwrap()
            }
        });
        futures::future::join_all(tasks).await;

        let mut offsets = sends.lock().clone();
        offsets.sort();
        assert_eq!(
            offsets,
            vec![Duration::ZERO, Duration::from_secs(1), Duration::from_secs(2)]
        );
        // last send at 2s plus its 3s response
        assert_eq!(Instant::now() - started, Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_responses_do_not_burst() {
        let client = RateLimitedClient::new("test", &config(60.0, 1)).unwrap();

        let mut first = tokio_test::task::spawn(client.execute(|| async { Ok(Reply(200)) }));
        assert!(tokio_test::assert_ready!(first.poll()).unwrap().is_some());
        drop(first);
        assert_eq!(client.occupied_slots(), 1);

        let mut second = tokio_test::task::spawn(client.execute(|| async { Ok(Reply(200)) }));
        tokio_test::assert_pending!(second.poll());

        tokio::time::advance(Duration::from_secs(30)).await;
        tokio_test::assert_pending!(second.poll());

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(tokio_test::assert_ready!(second.poll()).unwrap().is_some());
        assert_eq!(client.recent_send_times().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_doubles_interval_and_retries() {
        let client = RateLimitedClient::new("test", &config(1.0, 1)).unwrap();
        let calls = AtomicUsize::new(0);

        let reply = client
            .execute(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move { Ok(Reply(if n < 2 { 429 } else { 200 })) }
            })
            .await
            .unwrap();

        assert_eq!(reply.map(|r| r.0), Some(200));
        assert_eq!(client.interval(), Duration::from_secs(4));
        assert_eq!(client.recent_statuses(), vec![429, 429, 200]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_return_none() {
        let cfg = RateLimitConfig {
            interval_secs: 1.0,
            max_interval_secs: 3.0,
            max_attempts: 3,
            ..RateLimitConfig::default()
        };
        let client = RateLimitedClient::new("test", &cfg).unwrap();

        let reply = client
            .execute(|| async { Ok(Reply(503)) })
            .await
            .unwrap();

        assert!(reply.is_none());
        assert_eq!(client.interval(), Duration::from_secs(3));
        assert_eq!(client.recent_statuses().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ten_successes_halve_to_floor() {
        let cfg = RateLimitConfig {
            interval_secs: 2.0,
            min_interval_secs: Some(0.25),
            ..RateLimitConfig::default()
        };
        let client = RateLimitedClient::new("test", &cfg).unwrap();

        for _ in 0..9 {
            client.execute(|| async { Ok(Reply(200)) }).await.unwrap();
        }
        assert_eq!(client.interval(), Duration::from_secs(2));

        client.execute(|| async { Ok(Reply(200)) }).await.unwrap();
        assert_eq!(client.interval(), Duration::from_secs(1));

        for _ in 0..5 {
            client.execute(|| async { Ok(Reply(200)) }).await.unwrap();
        }
        assert_eq!(client.interval(), Duration::from_millis(250));
        assert_eq!(client.recent_statuses().len(), WINDOW);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_an_error() {
        let cfg = RateLimitConfig {
            timeout_secs: 1.0,
            ..RateLimitConfig::default()
        };
        let client = RateLimitedClient::new("test", &cfg).unwrap();

        let err = client
            .execute(|| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(Reply(200))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, GeoKgError::Timeout(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_propagates() {
        let client = RateLimitedClient::new("test", &config(1.0, 1)).unwrap();
        let err = client
            .execute(|| async {
                Err::<Reply, _>(GeoKgError::AuthorityError("connection refused".to_string()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, GeoKgError::AuthorityError(_)));
    }
}
