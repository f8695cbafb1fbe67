//! Background jobs. The host schedules them and triggers
//! `run_maintenance` periodically.

use {
    crate::{
        domain::reporting::DebugReportSender,
        infra::{observe, persistence::ResultStore},
    },
    anyhow::{Context, ensure},
    chrono::{DateTime, Utc},
    futures::future::join_all,
    std::{sync::Arc, time::Duration},
};

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Maintaining: Send + Sync {
    async fn run_maintenance(&self) -> anyhow::Result<()>;
}

/// Runs every registered job on each invocation. A failing job doesn't stop
/// the others.
pub struct Maintenance {
    pub jobs: Vec<Arc<dyn Maintaining>>,
}

#[async_trait::async_trait]
impl Maintaining for Maintenance {
    async fn run_maintenance(&self) -> anyhow::Result<()> {
        let mut failures = 0;
        for result in join_all(self.jobs.iter().map(|job| job.run_maintenance())).await {
            if let Err(err) = result {
                observe::maintenance_failed(&err);
                failures += 1;
            }
        }
        ensure!(failures == 0, "{failures} maintenance jobs failed");
        Ok(())
    }
}

/// Deletes expired auction results together with their registered
/// interactions.
pub struct ResultCleaner {
    results: Arc<dyn ResultStore>,
    expiry: Duration,
}

impl ResultCleaner {
    pub fn new(results: Arc<dyn ResultStore>, expiry: Duration) -> Self {
        Self { results, expiry }
    }

    /// Removes results created more than the expiry before `now`. Returns
    /// how many were removed.
    pub async fn run_at(&self, now: DateTime<Utc>) -> anyhow::Result<usize> {
        let expiry = chrono::Duration::from_std(self.expiry).context("expiry out of range")?;
        let ids = self.results.results_created_before(now - expiry).await?;
        if ids.is_empty() {
            return Ok(0);
        }
        self.results.delete_results(&ids).await?;
        observe::expired_results_removed(ids.len());
        Ok(ids.len())
    }
}

#[async_trait::async_trait]
impl Maintaining for ResultCleaner {
    async fn run_maintenance(&self) -> anyhow::Result<()> {
        self.run_at(Utc::now()).await.map(|_| ())
    }
}

#[async_trait::async_trait]
impl Maintaining for DebugReportSender {
    async fn run_maintenance(&self) -> anyhow::Result<()> {
        self.run_once().await.map(|_| ())
    }
}
