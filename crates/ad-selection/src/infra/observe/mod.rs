//! This module implements the observability for ad selection. It exposes
//! functions which represent events that are meaningful to the system. These
//! functions are called when the corresponding events occur. They log the event
//! and update the metrics, if the event is worth measuring.

use {
    crate::{
        domain::{
            Error,
            Status,
            auction::{self, AdTechIdentifier, AuctionConfig, Selection},
            bidding,
            candidate::GroupRef,
            reporting::{Destination, interaction::Interaction},
            scoring,
        },
        infra::{http, persistence, throttle::Api},
    },
    std::time::Duration,
    strum::IntoStaticStr,
    tokio::task::JoinError,
    url::Url,
};

mod metrics;

pub use observe::future::Measure;

/// Setup the observability. The config is passed to the tracing subscriber.
pub fn init(config: &observe::Config) {
    observe::tracing::initialize(config);
    metrics::init();
}

/// Kind of report a notification belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Report {
    Impression,
    Interaction,
}

/// Why a candidate group's bid did not make it to winner selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
pub enum DiscardReason {
    NoBid,
    Failed,
    Timeout,
    NonPositiveScore,
}

fn label(value: impl Into<&'static str>) -> &'static str {
    value.into()
}

/// Observe that a request did not pass gating.
pub fn request_rejected(api: Api, caller: &str, err: &Error) {
    tracing::debug!(%api, %caller, ?err, "request rejected");
}

/// Observe that an auction passed gating and validation.
pub fn auction_started(caller: &str, config: &AuctionConfig) {
    tracing::debug!(
        %caller,
        seller = %config.seller,
        buyers = config.buyers.len(),
        "running auction"
    );
}

/// Observe the number of candidate groups bidding in an auction.
pub fn candidates(count: usize) {
    tracing::debug!(count, "loaded candidate groups");
}

/// Observe that a group was skipped because it has no ads.
pub fn group_without_ads(group: &GroupRef) {
    tracing::debug!(%group, "skipping candidate group without ads");
}

/// Observe that a bid was discarded.
pub fn bid_discarded(group: &GroupRef, reason: DiscardReason) {
    tracing::debug!(%group, ?reason, "discarded bid");
    metrics::get()
        .discarded_bids
        .with_label_values(&[label(reason)])
        .inc();
}

/// Observe that bidding for a group failed.
pub fn bidding_failed(group: &GroupRef, err: &bidding::Error) {
    tracing::info!(%group, ?err, "bidding failed");
    metrics::get()
        .discarded_bids
        .with_label_values(&[label(DiscardReason::Failed)])
        .inc();
}

/// Observe that a bidding task panicked or got cancelled.
pub fn bidding_task_failed(err: &JoinError) {
    tracing::error!(?err, "bidding task failed");
}

/// Observe that the seller decision logic failed.
pub fn scoring_failed(err: &scoring::Error) {
    tracing::warn!(?err, "scoring failed");
}

/// Observe that finalized debug reports could not be queued.
pub fn debug_reports_not_queued(id: auction::Id, err: &persistence::Error) {
    tracing::warn!(%id, ?err, "failed to queue debug reports");
}

/// Observe the terminal outcome of an auction.
pub fn auction_finished(
    caller: &str,
    selection: Option<&Selection>,
    status: Status,
    elapsed: Duration,
) {
    let elapsed_ms = elapsed.as_millis();
    match selection {
        Some(selection) => tracing::info!(
            %caller,
            id = %selection.id,
            render_uri = %selection.render_uri,
            ?status,
            elapsed_ms,
            "auction finished"
        ),
        None => tracing::info!(%caller, ?status, elapsed_ms, "auction finished"),
    }
    let metrics = metrics::get();
    metrics
        .api_calls
        .with_label_values(&[label(Api::RunAuction), label(status)])
        .inc();
    metrics.auction_duration_seconds.observe(elapsed.as_secs_f64());
}

/// Observe the terminal outcome of an impression report.
pub fn impression_reported(caller: &str, id: auction::Id, status: Status, elapsed: Duration) {
    tracing::info!(
        %caller,
        %id,
        ?status,
        elapsed_ms = elapsed.as_millis(),
        "impression reported"
    );
    metrics::get()
        .api_calls
        .with_label_values(&[label(Api::ReportImpression), label(status)])
        .inc();
}

/// Observe the terminal outcome of an interaction report.
pub fn interaction_reported(interaction: &Interaction, status: Status, elapsed: Duration) {
    tracing::info!(
        caller = %interaction.caller_package,
        id = %interaction.auction_id,
        key = %interaction.key,
        destinations = interaction.destinations.bits(),
        ?status,
        elapsed_ms = elapsed.as_millis(),
        "interaction reported"
    );
    metrics::get()
        .api_calls
        .with_label_values(&[label(Api::ReportInteraction), label(status)])
        .inc();
}

/// Observe that a reporting URI was skipped because it is invalid or its ad
/// tech is not enrolled.
pub fn reporting_uri_rejected(destination: Destination, uri: &Url) {
    tracing::info!(%destination, %uri, "skipping reporting uri");
}

/// Observe that a registered interaction URI was skipped.
pub fn interaction_uri_rejected(destination: Destination, uri: &Url) {
    tracing::debug!(%destination, %uri, "skipping interaction reporting uri");
}

/// Observe the interaction URIs persisted for a destination.
pub fn interactions_registered(id: auction::Id, destination: Destination, count: usize) {
    tracing::debug!(%id, %destination, count, "registered interactions");
    metrics::get()
        .registered_interactions
        .with_label_values(&[label(destination)])
        .inc_by(count as u64);
}

/// Observe that registered interactions could not be persisted.
pub fn interaction_registration_failed(
    id: auction::Id,
    destination: Destination,
    err: &persistence::Error,
) {
    tracing::warn!(%id, %destination, ?err, "failed to register interactions");
}

/// Observe that no URI was registered for an interaction.
pub fn no_registered_interaction(id: auction::Id, destination: Destination) {
    tracing::debug!(%id, %destination, "no registered interaction uri");
}

/// Observe a delivered notification.
pub fn notification_sent(report: Report, destination: Destination, uri: &Url) {
    tracing::debug!(?report, %destination, %uri, "notification sent");
    metrics::get()
        .notifications
        .with_label_values(&[label(report), label(destination), "success"])
        .inc();
}

/// Observe a failed notification. Notifications are never retried.
pub fn notification_failed(report: Report, destination: Destination, uri: &Url, err: &http::Error) {
    tracing::info!(?report, %destination, %uri, ?err, "notification failed");
    metrics::get()
        .notifications
        .with_label_values(&[label(report), label(destination), "failure"])
        .inc();
}

/// Observe that a notification task panicked or got cancelled.
pub fn delivery_task_failed(err: &JoinError) {
    tracing::error!(?err, "notification task failed");
}

/// Observe that an interaction was registered with the attribution service.
pub fn attribution_registered(destination: Destination, uri: &Url) {
    tracing::debug!(%destination, %uri, "registered interaction for attribution");
}

/// Observe that attribution registration failed.
pub fn attribution_registration_failed(destination: Destination, uri: &Url, err: &anyhow::Error) {
    tracing::info!(%destination, %uri, ?err, "attribution registration failed");
}

/// Observe that a developer override lookup failed.
pub fn override_lookup_failed(caller: &str, err: &persistence::Error) {
    tracing::warn!(%caller, ?err, "failed to look up developer override");
}

/// Observe an added developer override.
pub fn override_added(caller: &str, kind: &'static str) {
    tracing::info!(%caller, kind, "added developer override");
}

/// Observe removed developer overrides.
pub fn override_removed(caller: &str, kind: &'static str) {
    tracing::info!(%caller, kind, "removed developer override");
}

/// Observe that a debug report was dropped while finalizing.
pub fn debug_report_dropped(ad_tech: &AdTechIdentifier, reason: &'static str) {
    tracing::debug!(%ad_tech, reason, "dropped debug report");
}

/// Observe that sending a debug report failed.
pub fn debug_report_failed(uri: &Url, err: &http::Error) {
    tracing::debug!(%uri, ?err, "debug report failed");
    metrics::get()
        .debug_reports
        .with_label_values(&["failure"])
        .inc();
}

/// Observe a sent batch of debug reports.
pub fn debug_reports_sent(sent: usize, total: usize) {
    tracing::debug!(sent, total, "sent debug reports");
    metrics::get()
        .debug_reports
        .with_label_values(&["success"])
        .inc_by(sent as u64);
}

/// Observe removed expired auction results.
pub fn expired_results_removed(count: usize) {
    tracing::info!(count, "removed expired auction results");
    metrics::get().expired_results.inc_by(count as u64);
}

/// Observe that a maintenance job failed.
pub fn maintenance_failed(err: &anyhow::Error) {
    tracing::warn!(?err, "maintenance job failed");
}
