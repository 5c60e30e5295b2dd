//! Per-URL orchestration: fetch, date, segment, classify, collect.
//!
//! Each URL moves through
//!
//! ```text
//! Fetching -> FetchFailed                                  (0 records)
//!          -> Fetched -> DateResolving -> Segmenting -> ClassifyingEach -> Done
//! ```
//!
//! URLs are processed one after another in input order. A failed fetch, an
//! empty page or a failed classification only costs the affected URL or
//! segment; the run itself fails only when its input list is unusable.

use std::time::Instant;

use rand::Rng;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::classifier::{SentimentClassifier, SentimentModel};
use crate::error::PipelineError;
use crate::models::DatasetRecord;
use crate::scrapers::{article, dates};
use crate::scrapers::fetcher::{FetchPolicy, RateLimitedFetcher, Transport};
use crate::segmenter;
use crate::utils::truncate_for_log;

/// How a single URL ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlOutcome {
    FetchFailed,
    NoText,
    Done { cases: usize, skipped: usize },
    Cancelled,
}

/// Observational counters for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub urls_total: usize,
    pub urls_processed: usize,
    pub urls_fetch_failed: usize,
    pub urls_without_text: usize,
    pub records: usize,
    pub classification_failures: usize,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Records in URL order, then segmentation order within a URL.
    pub records: Vec<DatasetRecord>,
    pub stats: RunStats,
}

/// Drives fetching, segmentation and classification for a list of URLs.
#[derive(Debug)]
pub struct Pipeline<T, M, R> {
    fetcher: RateLimitedFetcher<T>,
    classifier: SentimentClassifier<M>,
    policy: FetchPolicy,
    rng: R,
    cancel: CancellationToken,
}

impl<T, M, R> Pipeline<T, M, R>
where
    T: Transport,
    M: SentimentModel,
    R: Rng,
{
    /// Assemble a pipeline from its stages.
    ///
    /// # Arguments
    ///
    /// * `fetcher` - Paced, retrying fetcher for article pages
    /// * `classifier` - Sentiment adapter applied to every sentence group
    /// * `policy` - Retry and pacing parameters for each fetch
    /// * `rng` - Source of every random draw (pacing, headers, group sizes)
    ///
    /// # Example
    ///
    /// ```ignore
    /// let fetcher = RateLimitedFetcher::from_config(&config)?;
    /// let mut pipeline = Pipeline::new(fetcher, classifier, config.fetch_policy(), StdRng::seed_from_u64(7));
    /// let report = pipeline.run(&urls).await?;
    /// ```
    pub fn new(
        fetcher: RateLimitedFetcher<T>,
        classifier: SentimentClassifier<M>,
        policy: FetchPolicy,
        rng: R,
    ) -> Self {
        Self {
            fetcher,
            classifier,
            policy,
            rng,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that stops the run at its next suspension point when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Process every URL and collect the resulting records.
    ///
    /// # Errors
    ///
    /// [`PipelineError`] if `urls` is empty or contains a blank entry. Nothing
    /// is fetched in that case.
    #[instrument(level = "info", skip_all, fields(urls = urls.len()))]
    pub async fn run(&mut self, urls: &[String]) -> Result<RunReport, PipelineError> {
        validate_urls(urls)?;

        let t0 = Instant::now();
        let mut report = RunReport {
            records: Vec::new(),
            stats: RunStats {
                urls_total: urls.len(),
                ..Default::default()
            },
        };

        for (index, url) in urls.iter().enumerate() {
            if self.cancel.is_cancelled() {
                report.stats.cancelled = true;
                warn!(remaining = urls.len() - index, "Run cancelled; skipping remaining URLs");
                break;
            }

            let outcome = self.process_url(url, &mut report.records).await;
            match outcome {
                UrlOutcome::FetchFailed => {
                    report.stats.urls_fetch_failed += 1;
                    warn!(%url, "Scraped URL - fetch failed, no records");
                }
                UrlOutcome::NoText => {
                    report.stats.urls_without_text += 1;
                    warn!(%url, "Scraped URL - no article text found");
                }
                UrlOutcome::Done { cases, skipped } => {
                    report.stats.urls_processed += 1;
                    report.stats.classification_failures += skipped;
                    info!(%url, cases, skipped, "Scraped URL - cases extracted");
                }
                UrlOutcome::Cancelled => {
                    report.stats.cancelled = true;
                    warn!(%url, "Run cancelled while processing URL");
                    break;
                }
            }
        }

        report.stats.records = report.records.len();
        info!(
            total = report.stats.urls_total,
            processed = report.stats.urls_processed,
            fetch_failed = report.stats.urls_fetch_failed,
            without_text = report.stats.urls_without_text,
            records = report.stats.records,
            classification_failures = report.stats.classification_failures,
            cancelled = report.stats.cancelled,
            elapsed_ms = t0.elapsed().as_millis(),
            "Completed dataset run"
        );
        Ok(report)
    }

    /// Run one URL through every stage, appending its records to `records`.
    #[instrument(level = "info", skip_all, fields(%url))]
    async fn process_url(&mut self, url: &str, records: &mut Vec<DatasetRecord>) -> UrlOutcome {
        let fetched = self
            .fetcher
            .fetch(url, &self.policy, &mut self.rng, &self.cancel)
            .await;
        let html = match fetched.html {
            Some(html) if fetched.succeeded => html,
            _ if self.cancel.is_cancelled() => return UrlOutcome::Cancelled,
            _ => return UrlOutcome::FetchFailed,
        };

        let date = dates::resolve(&html, url);
        let text = article::extract_text(&html);
        debug!(?date, chars = text.len(), "Parsed article");
        if text.trim().is_empty() {
            return UrlOutcome::NoText;
        }

        let mut cases = 0;
        let mut skipped = 0;
        let groups = segmenter::segment(&text, &mut self.rng);
        let sentences = groups.sentence_count();
        // Collected up front so the rng borrow ends before classification.
        let groups: Vec<_> = groups.collect();
        debug!(sentences, groups = groups.len(), "Segmented article");
        for group in groups {
            if self.cancel.is_cancelled() {
                return UrlOutcome::Cancelled;
            }
            match self.classifier.classify(&group.text, &self.cancel).await {
                Ok(result) => {
                    records.push(DatasetRecord::new(
                        url,
                        date.as_deref(),
                        group.text,
                        result,
                    ));
                    cases += 1;
                }
                Err(_) if self.cancel.is_cancelled() => return UrlOutcome::Cancelled,
                Err(e) => {
                    warn!(
                        error = %e,
                        case = %truncate_for_log(&group.text, 120),
                        "Failed to classify case; skipping"
                    );
                    skipped += 1;
                }
            }
        }
        UrlOutcome::Done { cases, skipped }
    }
}

fn validate_urls(urls: &[String]) -> Result<(), PipelineError> {
    if urls.is_empty() {
        return Err(PipelineError::NoUrls);
    }
    if let Some(index) = urls.iter().position(|u| u.trim().is_empty()) {
        return Err(PipelineError::BlankUrl { index });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::tests::FixedModel;
    use crate::classifier::{ClassScore, RetryModel};
    use crate::config::PipelineConfig;
    use crate::error::ModelError;
    use crate::models::numeric_label;
    use crate::scrapers::fetcher::tests::StubTransport;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const TWO_SENTENCES: &str = r#"<html><head>
        <meta property="article:published_time" content="2024-05-01T00:00:00Z">
        </head><body><p>Nvidia beat expectations.</p><p>Investors cheered the results.</p></body></html>"#;

    fn pipeline(
        transport: StubTransport,
        model: FixedModel,
    ) -> Pipeline<StubTransport, FixedModel, StdRng> {
        let config = PipelineConfig::default();
        let policy = FetchPolicy {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            pacing_min: Duration::from_secs(1),
            pacing_max: Duration::from_secs(5),
        };
        Pipeline::new(
            RateLimitedFetcher::new(transport, &config),
            SentimentClassifier::new(model, config.truncation),
            policy,
            StdRng::seed_from_u64(42),
        )
    }

    fn positive_model() -> FixedModel {
        FixedModel::new(&[("positive", 0.7), ("neutral", 0.2), ("negative", 0.1)])
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_fetch_yields_no_records() {
        let mut p = pipeline(StubTransport::new().route("https://x", &[503], ""), positive_model());
        let report = p.run(&["https://x".to_string()]).await.unwrap();
        assert!(report.records.is_empty());
        assert_eq!(report.stats.urls_fetch_failed, 1);
        assert_eq!(p.fetcher_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_sentence_article_is_labeled_positive() {
        let mut p = pipeline(
            StubTransport::new().route("https://y", &[200], TWO_SENTENCES),
            positive_model(),
        );
        let report = p.run(&["https://y".to_string()]).await.unwrap();
        assert!(!report.records.is_empty());
        for record in &report.records {
            assert!(record.label.eq_ignore_ascii_case("positive"));
            assert_eq!(record.numeric_label, 1);
            assert_eq!(record.numeric_label, numeric_label(&record.label));
            assert_eq!(record.url, "https://y");
            assert_eq!(record.date.as_deref(), Some("2024-05-01T00:00:00Z"));
            assert!(!record.case_text.is_empty());
            assert_eq!(record.positive_prob, 0.7);
        }
        let joined = report
            .records
            .iter()
            .map(|r| r.case_text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        assert_eq!(joined, "Nvidia beat expectations. Investors cheered the results.");
    }

    #[tokio::test(start_paused = true)]
    async fn test_classification_failure_skips_only_that_case() {
        let html = "<p>Alpha rose. Beta fell. Gamma held. Delta boom. Epsilon rose. Zeta fell. Eta held.</p>";
        let model = positive_model().failing_on("boom");
        let mut p = pipeline(StubTransport::new().route("https://z", &[200], html), model);
        let report = p.run(&["https://z".to_string()]).await.unwrap();

        assert_eq!(report.stats.classification_failures, 1);
        assert!(report.records.iter().all(|r| !r.case_text.contains("boom")));
        assert!(!report.records.is_empty());
        assert_eq!(report.stats.urls_processed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mixed_urls_keep_input_order() {
        let transport = StubTransport::new()
            .route("https://a", &[200], "<p>First article sentence.</p>")
            .route("https://b", &[500], "")
            .route("https://c", &[200], "<div>no paragraphs</div>")
            .route("https://d", &[200], "<p>Last article sentence.</p>");
        let mut p = pipeline(transport, positive_model());
        let urls: Vec<String> = ["https://a", "https://b", "https://c", "https://d"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let report = p.run(&urls).await.unwrap();

        let record_urls: Vec<&str> = report.records.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(record_urls, vec!["https://a", "https://d"]);
        assert_eq!(report.stats.urls_total, 4);
        assert_eq!(report.stats.urls_processed, 2);
        assert_eq!(report.stats.urls_fetch_failed, 1);
        assert_eq!(report.stats.urls_without_text, 1);
        assert_eq!(report.stats.records, 2);
        assert!(!report.stats.cancelled);
    }

    #[tokio::test]
    async fn test_empty_url_list_is_fatal() {
        let mut p = pipeline(StubTransport::new(), positive_model());
        assert_eq!(p.run(&[]).await.unwrap_err(), PipelineError::NoUrls);
        let err = p
            .run(&["https://a".to_string(), "  ".to_string()])
            .await
            .unwrap_err();
        assert_eq!(err, PipelineError::BlankUrl { index: 1 });
        assert_eq!(p.fetcher_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_run_stops_early() {
        let mut p = pipeline(
            StubTransport::new().route("https://y", &[200], TWO_SENTENCES),
            positive_model(),
        );
        p.cancellation_token().cancel();
        let report = p.run(&["https://y".to_string()]).await.unwrap();
        assert!(report.records.is_empty());
        assert!(report.stats.cancelled);
        assert_eq!(p.fetcher_calls(), 0);
    }

    /// Fails every call, cancelling the run on the first one.
    struct CancellingModel {
        calls: Arc<AtomicUsize>,
    }

    impl SentimentModel for CancellingModel {
        async fn predict(
            &self,
            _text: &str,
            cancel: &CancellationToken,
        ) -> Result<Vec<ClassScore>, ModelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            cancel.cancel();
            Err(ModelError::Status {
                status: 503,
                body: "unavailable".into(),
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_classification_stops_retries() {
        let calls = Arc::new(AtomicUsize::new(0));
        let config = PipelineConfig::default();
        let model = RetryModel::new(
            CancellingModel {
                calls: Arc::clone(&calls),
            },
            5,
            Duration::from_secs(1),
        );
        let mut p = Pipeline::new(
            RateLimitedFetcher::new(
                StubTransport::new().route("https://y", &[200], TWO_SENTENCES),
                &config,
            ),
            SentimentClassifier::new(model, config.truncation),
            config.fetch_policy(),
            StdRng::seed_from_u64(42),
        );

        let started = tokio::time::Instant::now();
        let report = p.run(&["https://y".to_string()]).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(report.records.is_empty());
        assert!(report.stats.cancelled);
        assert_eq!(report.stats.classification_failures, 0);
        // Pacing tops out at 5s; no classifier backoff follows the cancel.
        assert!(started.elapsed() <= Duration::from_secs(5), "{:?}", started.elapsed());
    }

    impl Pipeline<StubTransport, FixedModel, StdRng> {
        fn fetcher_calls(&self) -> u32 {
            self.fetcher.transport().calls()
        }
    }
}
