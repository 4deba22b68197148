use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::config::ReconciliationConfig;
use crate::ledger::{LedgerError, Reconciliation, WithdrawalLedger};

/// Counts from one pass over stuck withdrawals.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    pub completed: usize,
    pub failed: usize,
    pub unchanged: usize,
    pub errors: usize,
}

/// Periodically asks the gateway about withdrawals stuck in processing,
/// for when a webhook never arrives.
pub struct ReconciliationSweep {
    ledger: Arc<WithdrawalLedger>,
    config: ReconciliationConfig,
}

impl ReconciliationSweep {
    pub fn new(ledger: Arc<WithdrawalLedger>, config: ReconciliationConfig) -> Self {
        Self { ledger, config }
    }

    pub async fn run(&self) {
        loop {
            match self.run_once().await {
                Ok(report) if report.examined > 0 => info!(
                    "Reconciliation cycle completed: {} examined, {} completed, {} failed, {} unchanged, {} errors",
                    report.examined, report.completed, report.failed, report.unchanged, report.errors
                ),
                Ok(_) => debug!("Reconciliation cycle found nothing to do"),
                Err(e) => error!("Reconciliation cycle failed: {:?}", e),
            }
            sleep(Duration::from_secs(self.config.interval_sec)).await;
        }
    }

    pub async fn run_once(&self) -> Result<SweepReport, LedgerError> {
        let Some(cutoff) = self.cutoff() else {
            return Ok(SweepReport::default());
        };
        let stale = self
            .ledger
            .stale_withdrawals(cutoff, self.config.batch_size)
            .await?;

        let mut report = SweepReport {
            examined: stale.len(),
            ..SweepReport::default()
        };

        for withdrawal in &stale {
            match self.ledger.reconcile(withdrawal).await {
                Ok(Reconciliation::Completed) => report.completed += 1,
                Ok(Reconciliation::Failed) => report.failed += 1,
                Ok(Reconciliation::Unchanged) => report.unchanged += 1,
                Err(e) => {
                    warn!("Could not reconcile withdrawal {}: {:?}", withdrawal.id, e);
                    report.errors += 1;
                }
            }
        }

        Ok(report)
    }

    /// Requests last touched before this instant are stale. `None` when the
    /// window reaches back past the representable range.
    fn cutoff(&self) -> Option<DateTime<Utc>> {
        let window = TimeDelta::from_std(Duration::from_secs(self.config.stale_after_sec)).ok()?;
        Utc::now().checked_sub_signed(window)
    }
}
