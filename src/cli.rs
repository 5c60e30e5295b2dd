//! Command-line interface definitions.
//!
//! Options shared by both subcommands can also be provided via environment
//! variables.

use clap::{Args, Parser, Subcommand};

/// Build a sentence-level sentiment dataset from news article URLs.
///
/// # Examples
///
/// ```sh
/// # Scrape and label every URL in a CSV with a `url` column
/// news_sentiment_dataset build -i aggregated_urls.csv -o dataset.csv
///
/// # Reproducible grouping, JSON copy, stop after ten minutes
/// news_sentiment_dataset build -i urls.txt -o dataset.csv --json-output dataset.json \
///     --seed 7 --deadline-secs 600
///
/// # Re-score an existing dataset with the configured classifier
/// news_sentiment_dataset relabel -i dataset.csv -o dataset_updated.csv
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch, segment and classify articles into a new dataset
    Build(BuildArgs),
    /// Re-run the classifier over the `case_text` column of an existing dataset
    Relabel(RelabelArgs),
}

/// Options shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Optional path to a YAML config file
    #[arg(short, long, env = "NSD_CONFIG")]
    pub config: Option<String>,

    /// Sentiment classifier endpoint (overrides the config file)
    #[arg(long, env = "NSD_CLASSIFIER_URL")]
    pub classifier_url: Option<String>,
}

#[derive(Args, Debug)]
pub struct BuildArgs {
    /// URL list: a CSV with a `url` column, or one URL per line
    #[arg(short, long)]
    pub input: String,

    /// Output path for the dataset CSV
    #[arg(short, long)]
    pub output: String,

    /// Optional output path for a JSON copy of the dataset
    #[arg(long)]
    pub json_output: Option<String>,

    /// Total fetch attempts per URL (overrides the config file)
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Seed for pacing, header and grouping randomness
    #[arg(long)]
    pub seed: Option<u64>,

    /// Stop the run after this many seconds, keeping what was collected
    #[arg(long)]
    pub deadline_secs: Option<u64>,

    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Args, Debug)]
pub struct RelabelArgs {
    /// Existing dataset CSV with a `case_text` column
    #[arg(short, long)]
    pub input: String,

    /// Output path for the relabeled CSV
    #[arg(short, long)]
    pub output: String,

    #[command(flatten)]
    pub common: CommonArgs,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_parsing() {
        let cli = Cli::parse_from([
            "news_sentiment_dataset",
            "build",
            "--input",
            "urls.csv",
            "--output",
            "out/dataset.csv",
            "--seed",
            "7",
            "--max-retries",
            "5",
        ]);

        let Command::Build(args) = cli.command else {
            panic!("expected build subcommand");
        };
        assert_eq!(args.input, "urls.csv");
        assert_eq!(args.output, "out/dataset.csv");
        assert_eq!(args.seed, Some(7));
        assert_eq!(args.max_retries, Some(5));
        assert_eq!(args.json_output, None);
        assert_eq!(args.deadline_secs, None);
    }

    #[test]
    fn test_relabel_short_flags() {
        let cli = Cli::parse_from([
            "news_sentiment_dataset",
            "relabel",
            "-i",
            "/tmp/in.csv",
            "-o",
            "/tmp/out.csv",
            "-c",
            "/tmp/config.yaml",
        ]);

        let Command::Relabel(args) = cli.command else {
            panic!("expected relabel subcommand");
        };
        assert_eq!(args.input, "/tmp/in.csv");
        assert_eq!(args.output, "/tmp/out.csv");
        assert_eq!(args.common.config.as_deref(), Some("/tmp/config.yaml"));
    }

    #[test]
    fn test_missing_subcommand_is_error() {
        assert!(Cli::try_parse_from(["news_sentiment_dataset"]).is_err());
    }
}
