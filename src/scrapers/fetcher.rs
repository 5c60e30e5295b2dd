//! Paced, disguised and retried HTTP fetching.
//!
//! Every fetch sleeps a random pacing delay first, then issues up to
//! `max_retries` GET requests. Each attempt draws a fresh user agent,
//! referer and (optionally) proxy from the configured pools. Failed attempts
//! back off exponentially:
//!
//! ```text
//! delay after failed attempt n (0-indexed) = base_delay * 2^n
//! ```
//!
//! The retry loop is an explicit state machine
//! (`Idle -> Attempting(n) -> {Succeeded, Attempting(n+1), Failed}`) and
//! never surfaces an error: exhaustion is reported through [`FetchResult`].

use std::time::{Duration, Instant};

use rand::Rng;
use rand::seq::IndexedRandom;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, REFERER, USER_AGENT};
use reqwest::{Client, Proxy, StatusCode};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::PipelineConfig;
use crate::error::FetchError;
use crate::models::FetchResult;
use crate::utils::truncate_for_log;

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// Retry and pacing parameters for one fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchPolicy {
    /// Total attempts, including the first one.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub pacing_min: Duration,
    pub pacing_max: Duration,
}

impl FetchPolicy {
    /// Delay to wait after failed attempt `attempt` (0-indexed).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

/// Headers and routing chosen for a single attempt.
#[derive(Debug, Clone, Copy)]
pub struct RequestSpec<'a> {
    pub url: &'a str,
    pub user_agent: &'a str,
    pub referer: &'a str,
    pub accept_language: &'a str,
    pub proxy: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// Something that can perform a single HTTP GET.
///
/// The production implementation is [`ReqwestTransport`]; tests substitute
/// stubs that return canned responses.
pub trait Transport {
    async fn get(&self, request: RequestSpec<'_>) -> Result<HttpResponse, FetchError>;
}

/// reqwest-backed transport with one pooled client per route.
///
/// reqwest binds proxies at client construction, so a client is built for
/// the direct route and for each configured proxy. Connections are reused
/// across all URLs fetched through the same route.
#[derive(Debug)]
pub struct ReqwestTransport {
    direct: Client,
    proxied: Vec<(String, Client)>,
}

impl ReqwestTransport {
    /// Build the direct client and one client per proxy.
    ///
    /// # Arguments
    ///
    /// * `timeout` - Per-request timeout applied to every client
    /// * `proxies` - Proxy URLs; each gets its own connection pool
    ///
    /// # Errors
    ///
    /// [`FetchError::Transport`] when a proxy URL is rejected by reqwest or a
    /// client cannot be built.
    pub fn new(timeout: Duration, proxies: &[String]) -> Result<Self, FetchError> {
        let direct = Client::builder().timeout(timeout).build()?;
        let mut proxied = Vec::with_capacity(proxies.len());
        for proxy in proxies {
            let client = Client::builder()
                .timeout(timeout)
                .proxy(Proxy::all(proxy.as_str())?)
                .build()?;
            proxied.push((proxy.clone(), client));
        }
        Ok(Self { direct, proxied })
    }

    fn client_for(&self, proxy: Option<&str>) -> &Client {
        proxy
            .and_then(|p| self.proxied.iter().find(|(url, _)| url == p))
            .map(|(_, client)| client)
            .unwrap_or(&self.direct)
    }
}

impl Transport for ReqwestTransport {
    async fn get(&self, request: RequestSpec<'_>) -> Result<HttpResponse, FetchError> {
        let builder = self
            .client_for(request.proxy)
            .get(request.url)
            .header(USER_AGENT, request.user_agent)
            .header(ACCEPT, ACCEPT_HTML)
            .header(ACCEPT_LANGUAGE, request.accept_language)
            .header(REFERER, request.referer);
        let response = builder.send().await?;
        let status = response.status();
        let body = if status == StatusCode::OK {
            response.text().await?
        } else {
            String::new()
        };
        Ok(HttpResponse {
            status: status.as_u16(),
            body,
        })
    }
}

/// States of the per-URL retry loop.
#[derive(Debug)]
enum RetryState {
    Idle,
    Attempting(u32),
    Succeeded { html: String, attempts: u32 },
    Failed { attempts: u32 },
}

/// Fetcher that paces, disguises and retries every request.
#[derive(Debug)]
pub struct RateLimitedFetcher<T> {
    transport: T,
    user_agents: Vec<String>,
    proxies: Vec<String>,
    referers: Vec<String>,
    accept_language: String,
}

impl RateLimitedFetcher<ReqwestTransport> {
    /// Build the production fetcher from configuration.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, FetchError> {
        let transport = ReqwestTransport::new(config.request_timeout(), &config.proxies)?;
        Ok(Self::new(transport, config))
    }
}

impl<T: Transport> RateLimitedFetcher<T> {
    pub fn new(transport: T, config: &PipelineConfig) -> Self {
        Self {
            transport,
            user_agents: config
                .user_agents
                .iter()
                .filter(|ua| !ua.trim().is_empty())
                .cloned()
                .collect(),
            proxies: config.proxies.clone(),
            referers: config
                .referers
                .iter()
                .filter(|r| !r.trim().is_empty())
                .cloned()
                .collect(),
            accept_language: config.accept_language.clone(),
        }
    }

    #[cfg(test)]
    pub(crate) fn transport(&self) -> &T {
        &self.transport
    }

    /// Fetch `url`, retrying per `policy`. Never fails: exhaustion and
    /// cancellation are reported as an unsuccessful [`FetchResult`].
    #[instrument(level = "info", skip_all, fields(%url))]
    pub async fn fetch<R: Rng>(
        &self,
        url: &str,
        policy: &FetchPolicy,
        rng: &mut R,
        cancel: &CancellationToken,
    ) -> FetchResult {
        let t0 = Instant::now();
        let mut state = RetryState::Idle;

        loop {
            state = match state {
                RetryState::Idle => {
                    if policy.max_retries == 0 {
                        RetryState::Failed { attempts: 0 }
                    } else {
                        let pacing = pacing_delay(policy, rng);
                        debug!(?pacing, "Pacing before first request");
                        if pause(pacing, cancel).await {
                            RetryState::Attempting(0)
                        } else {
                            RetryState::Failed { attempts: 0 }
                        }
                    }
                }
                RetryState::Attempting(n) => {
                    if cancel.is_cancelled() {
                        warn!(attempt = n, "Fetch cancelled before request");
                        RetryState::Failed { attempts: n }
                    } else {
                        match self.attempt(url, rng).await {
                            Ok(html) => RetryState::Succeeded {
                                html,
                                attempts: n + 1,
                            },
                            Err(e) => {
                                let attempts = n + 1;
                                if attempts >= policy.max_retries {
                                    warn!(
                                        attempt = attempts,
                                        max = policy.max_retries,
                                        error = %e,
                                        "Fetch attempt failed; retries exhausted"
                                    );
                                    RetryState::Failed { attempts }
                                } else {
                                    let delay = policy.backoff(n);
                                    warn!(
                                        attempt = attempts,
                                        max = policy.max_retries,
                                        ?delay,
                                        error = %e,
                                        "Fetch attempt failed; backing off"
                                    );
                                    if pause(delay, cancel).await {
                                        RetryState::Attempting(attempts)
                                    } else {
                                        warn!(attempt = attempts, "Fetch cancelled during backoff");
                                        RetryState::Failed { attempts }
                                    }
                                }
                            }
                        }
                    }
                }
                RetryState::Succeeded { html, attempts } => {
                    info!(
                        attempts,
                        bytes = html.len(),
                        elapsed_ms = t0.elapsed().as_millis(),
                        "Fetched article"
                    );
                    return FetchResult::success(html, attempts);
                }
                RetryState::Failed { attempts } => {
                    warn!(
                        attempts,
                        elapsed_ms = t0.elapsed().as_millis(),
                        "Giving up on URL"
                    );
                    return FetchResult::failure(attempts);
                }
            };
        }
    }

    async fn attempt<R: Rng>(&self, url: &str, rng: &mut R) -> Result<String, FetchError> {
        let user_agent = self
            .user_agents
            .choose(rng)
            .map(String::as_str)
            .unwrap_or_default();
        let referer = self
            .referers
            .choose(rng)
            .map(String::as_str)
            .unwrap_or_default();
        let proxy = self.proxies.choose(rng).map(String::as_str);
        debug!(
            user_agent = %truncate_for_log(user_agent, 40),
            %referer,
            ?proxy,
            "Issuing GET"
        );

        let response = self
            .transport
            .get(RequestSpec {
                url,
                user_agent,
                referer,
                accept_language: &self.accept_language,
                proxy,
            })
            .await?;

        if response.status == StatusCode::OK.as_u16() {
            Ok(response.body)
        } else {
            Err(FetchError::Status(response.status))
        }
    }
}

fn pacing_delay<R: Rng>(policy: &FetchPolicy, rng: &mut R) -> Duration {
    if policy.pacing_max <= policy.pacing_min {
        return policy.pacing_min;
    }
    let secs = rng.random_range(policy.pacing_min.as_secs_f64()..=policy.pacing_max.as_secs_f64());
    Duration::from_secs_f64(secs)
}

/// Sleep for `delay` unless `cancel` fires first. Returns `false` when cancelled.
pub async fn pause(delay: Duration, cancel: &CancellationToken) -> bool {
    if cancel.is_cancelled() {
        return false;
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = sleep(delay) => true,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Transport stub serving canned responses per URL.
    ///
    /// Each URL maps to a queue of statuses; the last one repeats once the
    /// queue is drained. Unknown URLs get a 404.
    #[derive(Debug, Default)]
    pub(crate) struct StubTransport {
        routes: HashMap<String, (Vec<u16>, String)>,
        pub calls: AtomicU32,
        pub seen: Mutex<Vec<(String, String, String, Option<String>)>>,
        served: Mutex<HashMap<String, usize>>,
    }

    impl StubTransport {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn route(mut self, url: &str, statuses: &[u16], body: &str) -> Self {
            self.routes
                .insert(url.to_string(), (statuses.to_vec(), body.to_string()));
            self
        }

        pub(crate) fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Transport for StubTransport {
        async fn get(&self, request: RequestSpec<'_>) -> Result<HttpResponse, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push((
                request.url.to_string(),
                request.user_agent.to_string(),
                request.referer.to_string(),
                request.proxy.map(str::to_string),
            ));
            let Some((statuses, body)) = self.routes.get(request.url) else {
                return Ok(HttpResponse {
                    status: 404,
                    body: String::new(),
                });
            };
            let mut served = self.served.lock().unwrap();
            let idx = served.entry(request.url.to_string()).or_insert(0);
            let status = statuses[(*idx).min(statuses.len() - 1)];
            *idx += 1;
            if status == 0 {
                return Err(FetchError::Transport("connection reset".into()));
            }
            Ok(HttpResponse {
                status,
                body: if status == 200 { body.clone() } else { String::new() },
            })
        }
    }

    fn policy(max_retries: u32) -> FetchPolicy {
        FetchPolicy {
            max_retries,
            base_delay: Duration::from_secs(1),
            pacing_min: Duration::from_secs(1),
            pacing_max: Duration::from_secs(5),
        }
    }

    fn fetcher(transport: StubTransport) -> RateLimitedFetcher<StubTransport> {
        RateLimitedFetcher::new(transport, &PipelineConfig::default())
    }

    #[test]
    fn test_backoff_doubles() {
        let p = policy(5);
        assert_eq!(p.backoff(0), Duration::from_secs(1));
        assert_eq!(p.backoff(1), Duration::from_secs(2));
        assert_eq!(p.backoff(2), Duration::from_secs(4));
        assert_eq!(p.backoff(40), Duration::from_secs(u32::MAX as u64));
    }

    #[test]
    fn test_pacing_within_range() {
        let p = policy(1);
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..100 {
            let d = pacing_delay(&p, &mut rng);
            assert!(d >= Duration::from_secs(1) && d <= Duration::from_secs(5));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_503_makes_exactly_max_attempts() {
        let f = fetcher(StubTransport::new().route("https://x", &[503], ""));
        let mut rng = StdRng::seed_from_u64(7);
        let result = f
            .fetch("https://x", &policy(3), &mut rng, &CancellationToken::new())
            .await;
        assert!(!result.succeeded);
        assert_eq!(result.attempts, 3);
        assert!(result.html.is_none());
        assert_eq!(f.transport.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_timing_follows_policy() {
        let f = fetcher(StubTransport::new().route("https://x", &[503], ""));
        let p = FetchPolicy {
            pacing_min: Duration::ZERO,
            pacing_max: Duration::ZERO,
            ..policy(3)
        };
        let started = tokio::time::Instant::now();
        let result = f
            .fetch("https://x", &p, &mut StdRng::seed_from_u64(1), &CancellationToken::new())
            .await;
        assert_eq!(result.attempts, 3);
        // 1s after the first failure, 2s after the second, none after the last.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(3), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(3100), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failures() {
        let f = fetcher(StubTransport::new().route("https://x", &[500, 0, 200], "<p>ok</p>"));
        let result = f
            .fetch("https://x", &policy(5), &mut StdRng::seed_from_u64(3), &CancellationToken::new())
            .await;
        assert!(result.succeeded);
        assert_eq!(result.attempts, 3);
        assert_eq!(result.html.as_deref(), Some("<p>ok</p>"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_retries_makes_no_request() {
        let f = fetcher(StubTransport::new().route("https://x", &[200], "<p>ok</p>"));
        let result = f
            .fetch("https://x", &policy(0), &mut StdRng::seed_from_u64(3), &CancellationToken::new())
            .await;
        assert!(!result.succeeded);
        assert_eq!(result.attempts, 0);
        assert_eq!(f.transport.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_fetch_stops_without_requests() {
        let f = fetcher(StubTransport::new().route("https://x", &[200], "<p>ok</p>"));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = f
            .fetch("https://x", &policy(3), &mut StdRng::seed_from_u64(3), &cancel)
            .await;
        assert!(!result.succeeded);
        assert_eq!(f.transport.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_headers_drawn_from_pools() {
        let mut config = PipelineConfig::default();
        config.user_agents = vec!["ua-one".into(), "ua-two".into()];
        config.proxies = vec!["http://p1:8080".into()];
        config.referers = vec!["https://ref.example/".into()];
        let f = RateLimitedFetcher::new(StubTransport::new().route("https://x", &[503], ""), &config);
        f.fetch("https://x", &policy(4), &mut StdRng::seed_from_u64(11), &CancellationToken::new())
            .await;

        let seen = f.transport.seen.lock().unwrap();
        assert_eq!(seen.len(), 4);
        for (url, ua, referer, proxy) in seen.iter() {
            assert_eq!(url, "https://x");
            assert!(ua == "ua-one" || ua == "ua-two");
            assert_eq!(referer, "https://ref.example/");
            assert_eq!(proxy.as_deref(), Some("http://p1:8080"));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_proxy_pool_means_direct() {
        let f = fetcher(StubTransport::new().route("https://x", &[200], "<p>ok</p>"));
        f.fetch("https://x", &policy(1), &mut StdRng::seed_from_u64(5), &CancellationToken::new())
            .await;
        let seen = f.transport.seen.lock().unwrap();
        assert_eq!(seen[0].3, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_request_waits_for_pacing() {
        let f = fetcher(StubTransport::new().route("https://x", &[200], "<p>ok</p>"));
        let started = tokio::time::Instant::now();
        let result = f
            .fetch("https://x", &policy(3), &mut StdRng::seed_from_u64(9), &CancellationToken::new())
            .await;
        assert!(result.succeeded);
        assert_eq!(result.attempts, 1);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(1), "{elapsed:?}");
        assert!(elapsed <= Duration::from_secs(5), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_attempt_carries_a_referer() {
        let f = fetcher(StubTransport::new().route("https://x", &[503], ""));
        f.fetch("https://x", &policy(3), &mut StdRng::seed_from_u64(2), &CancellationToken::new())
            .await;
        let defaults = PipelineConfig::default().referers;
        let seen = f.transport.seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert!(seen.iter().all(|(_, _, referer, _)| defaults.contains(referer)));
    }
}
