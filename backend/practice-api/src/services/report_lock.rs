use std::sync::Arc;

use super::disclosure_gate::DisclosureGate;
use super::oracle::LearningOracle;
use super::session_cell::SessionCell;
use crate::error::{EngineError, Rejection};
use crate::metrics::{record_rejection, REPORTS_FILED_TOTAL};
use crate::models::report::ReportReceipt;
use crate::models::Change;

/// Files at most one problem report per session and locks it afterwards.
pub struct ReportLock {
    oracle: Arc<dyn LearningOracle>,
    gate: DisclosureGate,
}

impl ReportLock {
    pub fn new(oracle: Arc<dyn LearningOracle>) -> Self {
        Self {
            gate: DisclosureGate::new(oracle.clone()),
            oracle,
        }
    }

    pub async fn file_report(
        &self,
        cell: &SessionCell,
        description: &str,
    ) -> Result<ReportReceipt, EngineError> {
        let description = description.trim();
        if description.is_empty() {
            record_rejection("validation");
            return Err(Rejection::BlankDescription.into());
        }

        let guard = cell.begin()?;
        if cell.read(|s| s.reported()) {
            record_rejection("validation");
            return Err(Rejection::AlreadyReported.into());
        }

        let handle = cell.handle();
        tracing::info!("Filing problem report for {}", handle);

        let receipt = match self.oracle.file_problem_report(handle, description).await {
            Ok(receipt) => receipt,
            Err(e) => {
                tracing::warn!("Problem report for {} failed: {}", handle, e);
                return Err(e.into());
            }
        };

        let applied = cell.commit(&guard, Change::Reported)?;
        if !applied.effective {
            return Err(Rejection::AlreadyReported.into());
        }

        REPORTS_FILED_TOTAL.with_label_values(&[handle.kind()]).inc();
        tracing::info!(
            "Problem report filed for {} (report_id={:?})",
            handle,
            receipt.report_id
        );

        if applied.solution_forced {
            self.gate.record_forced(handle).await;
        }

        drop(guard);
        Ok(receipt)
    }
}
