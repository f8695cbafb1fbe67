use {
    crate::infra,
    anyhow::{Context, ensure},
    std::path::Path,
    tokio::fs,
};

/// Loads the configuration from a TOML file. Missing settings fall back to
/// their defaults, unknown settings are rejected.
pub async fn load(path: &Path) -> anyhow::Result<infra::Config> {
    let data = fs::read_to_string(path)
        .await
        .with_context(|| format!("I/O error while reading {path:?}"))?;
    parse(&data).with_context(|| format!("invalid configuration in {path:?}"))
}

/// Parses and validates a TOML configuration document.
pub fn parse(data: &str) -> anyhow::Result<infra::Config> {
    let config: infra::Config = toml::de::from_str(data).context("TOML syntax error")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &infra::Config) -> anyhow::Result<()> {
    ensure!(
        config.auction.max_concurrent_bidding > 0,
        "auction.max-concurrent-bidding must be positive"
    );
    ensure!(
        !config.auction.overall_timeout.is_zero(),
        "auction.overall-timeout must be positive"
    );
    ensure!(
        config.reporting.max_registered_interactions_per_destination
            <= config.reporting.max_registered_interactions_total,
        "per destination interaction cap exceeds the total cap"
    );
    let throttle = &config.throttle;
    ensure!(
        [
            throttle.run_auction,
            throttle.report_impression,
            throttle.report_interaction,
            throttle.overrides,
        ]
        .iter()
        .all(|rate| rate.is_finite() && *rate >= 0.0),
        "throttle rates must be finite and non-negative"
    );
    ensure!(
        config.debug_reporting.batch_size > 0,
        "debug-reporting.batch-size must be positive"
    );
    Ok(())
}
