//! layerlens-cli -- Command-line interface for the layerlens image scanner
//!
//! Resolves the target (remote reference or local archive), wires up the
//! scanning pipeline, and renders the per-tag report.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod error;
mod output;
mod report;

use cli::Cli;
use error::CliError;
use output::OutputWriter;

use layerlens_core::config::{ExcludedPatterns, RegexCorpus, ScanConfig, ScanConfigBuilder};
use layerlens_core::error::LayerlensError;
use layerlens_core::types::{FinalOutput, ImageRef, ScanSet};
use layerlens_deps_audit::{
    DefaultAdvisories, DependencyAnalyzer, DepsDevClient, GemAdvisoryDb, HttpRegistryProbe,
};
use layerlens_image_scanner::{
    ImageProvider, ImageScanner, RemoteProvider, ScanOptions, TarballProvider,
};

/// Environment variable overriding the default ECR region.
const ECR_REGION_ENV: &str = "LAYERLENS_ECR_REGION";

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Compact logs to stderr so the report on stdout stays pipeable
    let log_level = cli.log_level.as_deref().unwrap_or("info");
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    match run(cli).await {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            tracing::error!(error = %e, "scan failed");
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = build_config(&cli)?;
    let scans = ScanSet::from_csv(cli.scans.as_deref().unwrap_or(""));
    let options = ScanOptions {
        scans,
        all_tags: cli.all_tags,
    };

    // Regex corpus and exclusion patterns load once, shared read-only afterwards
    let corpus = {
        let path = cli.regex_db.clone();
        tokio::task::spawn_blocking(move || RegexCorpus::load(&path))
            .await
            .map_err(|e| CliError::Config(e.to_string()))??
    };
    tracing::info!(patterns = corpus.len(), db = %cli.regex_db.display(), "regex corpus loaded");

    let excluded = match cli.exclude_file.clone() {
        Some(path) => {
            tokio::task::spawn_blocking(move || ExcludedPatterns::load(&path))
                .await
                .map_err(|e| CliError::Config(e.to_string()))??
        }
        None => ExcludedPatterns::default_patterns(),
    };

    let gems = match cli.gem_advisory_db.clone() {
        Some(path) => {
            tokio::task::spawn_blocking(move || GemAdvisoryDb::load(&path))
                .await
                .map_err(|e| CliError::Config(e.to_string()))??
        }
        None => GemAdvisoryDb::empty(),
    };

    let advisories = DefaultAdvisories::new(DepsDevClient::new(&config)?, gems);
    let probe = HttpRegistryProbe::new(&config)?;
    let analyzer = Arc::new(
        DependencyAnalyzer::new(Arc::new(advisories), Arc::new(probe))
            .gem_confusion_enabled(config.gem_confusion_enabled),
    );

    let writer = OutputWriter::new(cli.format, cli.output.clone());

    tracing::info!(target = %cli.target, "starting scan");
    let results = if cli.target.ends_with(".tar") {
        let provider = TarballProvider::open(&cli.target)
            .await
            .map_err(LayerlensError::from)?;
        scan_with(provider, config, corpus, excluded, analyzer, options).await?
    } else {
        let image_ref = ImageRef::parse(&cli.target).map_err(LayerlensError::from)?;
        let provider = RemoteProvider::new(image_ref, &config).map_err(LayerlensError::from)?;
        scan_with(provider, config, corpus, excluded, analyzer, options).await?
    };

    tracing::info!("scanning completed");
    output::print_summary(&results);
    writer.write(&results)
}

/// Run the scanner against a resolved provider, cancelling on Ctrl-C.
async fn scan_with<P: ImageProvider>(
    provider: P,
    config: ScanConfig,
    corpus: RegexCorpus,
    excluded: ExcludedPatterns,
    analyzer: Arc<DependencyAnalyzer>,
    options: ScanOptions,
) -> Result<Vec<FinalOutput>, CliError> {
    let scanner = ImageScanner::new(
        provider,
        config,
        Arc::new(corpus),
        Arc::new(excluded),
        analyzer,
    );

    let cancel = scanner.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling scan");
            cancel.cancel();
        }
    });

    Ok(scanner.scan(options).await?)
}

/// Build the scan configuration from CLI flags and environment.
fn build_config(cli: &Cli) -> Result<ScanConfig, CliError> {
    let mut builder = ScanConfigBuilder::new().gem_confusion_enabled(cli.gem_confusion);
    if let Ok(region) = std::env::var(ECR_REGION_ENV) {
        builder = builder.ecr_region(region);
    }
    Ok(builder.build()?)
}
