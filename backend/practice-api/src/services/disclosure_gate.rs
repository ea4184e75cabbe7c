use std::sync::Arc;

use super::oracle::{LearningOracle, OracleError};
use super::session_cell::SessionCell;
use crate::error::EngineError;
use crate::metrics::{DISCLOSURES_TOTAL, FORCED_DISCLOSURE_FAILURES_TOTAL};
use crate::models::{Change, DisclosureKind, DisclosureTrigger, UnitHandle};

/// Hint and solution visibility for one session.
///
/// Each disclosure type is recorded with the learning API at most once,
/// whether the student asked for it or a terminal transition forced it.
pub struct DisclosureGate {
    oracle: Arc<dyn LearningOracle>,
}

impl DisclosureGate {
    pub fn new(oracle: Arc<dyn LearningOracle>) -> Self {
        Self { oracle }
    }

    pub async fn reveal_hint(&self, cell: &SessionCell) -> Result<bool, EngineError> {
        self.reveal(cell, DisclosureKind::Hint).await
    }

    pub async fn reveal_solution(&self, cell: &SessionCell) -> Result<bool, EngineError> {
        self.reveal(cell, DisclosureKind::Solution).await
    }

    async fn reveal(&self, cell: &SessionCell, kind: DisclosureKind) -> Result<bool, EngineError> {
        // Already open: no recording, and no need to wait for other calls.
        if cell.read(|s| s.is_disclosed(kind)) {
            return Ok(true);
        }

        let guard = cell.begin()?;
        // A forced disclosure may have landed between the check and `begin`.
        if cell.read(|s| s.is_disclosed(kind)) {
            return Ok(true);
        }

        let handle = cell.handle();
        tracing::info!("Recording {} view for {}", kind.as_str(), handle);

        if let Err(e) = self.record(handle, kind).await {
            tracing::warn!("Failed to record {} view for {}: {}", kind.as_str(), handle, e);
            return Err(e.into());
        }

        let change = match kind {
            DisclosureKind::Hint => Change::HintDisclosed,
            DisclosureKind::Solution => Change::SolutionDisclosed,
        };
        cell.commit(&guard, change)?;

        DISCLOSURES_TOTAL
            .with_label_values(&[kind.as_str(), DisclosureTrigger::Requested.as_str()])
            .inc();

        Ok(true)
    }

    async fn record(&self, handle: UnitHandle, kind: DisclosureKind) -> Result<(), OracleError> {
        match kind {
            DisclosureKind::Hint => self.oracle.record_hint_view(handle).await,
            DisclosureKind::Solution => self.oracle.record_solution_view(handle).await,
        }
    }

    /// Records the solution view owed by a terminal transition.
    ///
    /// The flag is already set by the transition itself; a failed recording is
    /// logged and counted but cannot undo a verdict the learning API already
    /// holds.
    pub(crate) async fn record_forced(&self, handle: UnitHandle) {
        match self.oracle.record_solution_view(handle).await {
            Ok(()) => {
                tracing::info!("Solution disclosed automatically for {}", handle);
                DISCLOSURES_TOTAL
                    .with_label_values(&[
                        DisclosureKind::Solution.as_str(),
                        DisclosureTrigger::Forced.as_str(),
                    ])
                    .inc();
            }
            Err(e) => {
                tracing::error!("Failed to record forced solution view for {}: {}", handle, e);
                FORCED_DISCLOSURE_FAILURES_TOTAL.inc();
            }
        }
    }
}
