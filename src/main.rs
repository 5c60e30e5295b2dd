//! # News Sentiment Dataset
//!
//! Builds a sentence-level sentiment dataset from news articles: each URL is
//! fetched politely, its paragraph text and publication date are extracted,
//! the text is cut into short randomized groups of sentences, and every group
//! is scored by an external sentiment classifier.
//!
//! ## Usage
//!
//! ```sh
//! news_sentiment_dataset build -i aggregated_urls.csv -o dataset.csv
//! news_sentiment_dataset relabel -i dataset.csv -o dataset_updated.csv
//! ```
//!
//! ## Architecture
//!
//! The application follows a pipeline architecture, one URL at a time:
//! 1. **Fetching**: paced, disguised GET with exponential backoff
//! 2. **Parsing**: paragraph text and publication date
//! 3. **Segmenting**: one to three sentences per case
//! 4. **Classifying**: per-case sentiment, failures skipped
//! 5. **Output**: CSV table (and optional JSON document)

use std::error::Error;
use std::time::Duration;

use clap::Parser;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod classifier;
mod cli;
mod config;
mod error;
mod inputs;
mod models;
mod outputs;
mod pipeline;
mod relabel;
mod scrapers;
mod segmenter;
mod utils;

use classifier::{HttpSentimentModel, RetryModel, SentimentClassifier};
use cli::{BuildArgs, Cli, Command, CommonArgs, RelabelArgs};
use config::PipelineConfig;
use outputs::{csv as csv_out, json as json_out};
use pipeline::Pipeline;
use scrapers::fetcher::RateLimitedFetcher;
use utils::ensure_writable_parent;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("news_sentiment_dataset starting up");

    let cli = Cli::parse();
    debug!(?cli, "Parsed CLI arguments");

    let result = match cli.command {
        Command::Build(args) => run_build(args).await,
        Command::Relabel(args) => run_relabel(args).await,
    };

    let elapsed = start_time.elapsed();
    match &result {
        Ok(()) => info!(?elapsed, secs = elapsed.as_secs(), "Execution complete"),
        Err(e) => error!(?elapsed, error = %e, "Execution failed"),
    }
    result
}

async fn load_config(common: &CommonArgs) -> Result<PipelineConfig, Box<dyn Error>> {
    let mut config = PipelineConfig::load(common.config.as_deref()).await?;
    if let Some(url) = &common.classifier_url {
        config.classifier.endpoint = url.clone();
        config.validate()?;
    }
    info!(
        endpoint = %config.classifier.endpoint,
        max_retries = config.max_retries,
        proxies = config.proxies.len(),
        user_agents = config.user_agents.len(),
        "Configuration ready"
    );
    Ok(config)
}

fn build_classifier(
    config: &PipelineConfig,
) -> Result<SentimentClassifier<RetryModel<HttpSentimentModel>>, Box<dyn Error>> {
    let model = HttpSentimentModel::new(&config.classifier)?;
    if config.classifier.api_token().is_none() {
        warn!(
            env = %config.classifier.api_token_env,
            "No classifier API token found; sending unauthenticated requests"
        );
    }
    let model = RetryModel::new(model, config.classifier.max_retries, Duration::from_secs(1));
    Ok(SentimentClassifier::new(model, config.truncation))
}

/// Cancel `cancel` on Ctrl-C so the run stops and keeps what it has.
fn cancel_on_interrupt(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; finishing with the records collected so far");
            cancel.cancel();
        }
    });
}

#[instrument(level = "info", skip_all, fields(input = %args.input, output = %args.output))]
async fn run_build(args: BuildArgs) -> Result<(), Box<dyn Error>> {
    let mut config = load_config(&args.common).await?;
    if let Some(max_retries) = args.max_retries {
        config.max_retries = max_retries;
    }

    // Fatal preconditions are checked before any network activity.
    let urls = inputs::load_urls(&args.input).await.map_err(|e| {
        error!(path = %args.input, error = %e, "Failed to read URL list");
        e
    })?;
    if let Err(e) = ensure_writable_parent(&args.output).await {
        error!(
            path = %args.output,
            error = %e,
            "Output location is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }
    if let Some(json_path) = &args.json_output {
        ensure_writable_parent(json_path).await?;
    }

    let rng = match args.seed {
        Some(seed) => {
            info!(seed, "Using seeded randomness");
            StdRng::seed_from_u64(seed)
        }
        None => StdRng::from_os_rng(),
    };
    let fetcher = RateLimitedFetcher::from_config(&config)?;
    let classifier = build_classifier(&config)?;
    let mut pipeline = Pipeline::new(fetcher, classifier, config.fetch_policy(), rng);

    let cancel = pipeline.cancellation_token();
    cancel_on_interrupt(cancel.clone());
    if let Some(secs) = args.deadline_secs {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            warn!(deadline_secs = secs, "Deadline reached; stopping run");
            cancel.cancel();
        });
    }

    let report = pipeline.run(&urls).await?;

    csv_out::write_dataset(&report.records, &args.output).await?;
    if let Some(json_path) = &args.json_output {
        json_out::write_dataset(&report.records, &report.stats, json_path).await?;
    }

    info!(
        records = report.stats.records,
        urls = report.stats.urls_total,
        skipped_urls = report.stats.urls_fetch_failed + report.stats.urls_without_text,
        cancelled = report.stats.cancelled,
        path = %args.output,
        "Dataset saved"
    );
    Ok(())
}

#[instrument(level = "info", skip_all, fields(input = %args.input, output = %args.output))]
async fn run_relabel(args: RelabelArgs) -> Result<(), Box<dyn Error>> {
    let config = load_config(&args.common).await?;
    ensure_writable_parent(&args.output).await?;
    let classifier = build_classifier(&config)?;
    let cancel = CancellationToken::new();
    cancel_on_interrupt(cancel.clone());
    let stats = relabel::relabel_file(&classifier, &args.input, &args.output, &cancel).await?;
    info!(
        rows = stats.rows,
        relabeled = stats.relabeled,
        cancelled = stats.cancelled,
        path = %args.output,
        "Updated dataset saved"
    );
    Ok(())
}
