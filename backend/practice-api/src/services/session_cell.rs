use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::EngineError;
use crate::metrics::{record_rejection, SESSIONS_ACTIVE};
use crate::models::event::{AttemptJudged, Disclosed, ReportFiled, StatusChanged};
use crate::models::{
    Applied, Change, DisclosureKind, DisclosureTrigger, InteractionSession, SessionEvent,
    SessionSnapshot, SessionStatus, UnitHandle,
};

const EVENT_BUFFER: usize = 64;

pub fn event_channel() -> broadcast::Sender<SessionEvent> {
    broadcast::channel(EVENT_BUFFER).0
}

/// Holds a flag for as long as one operation is in flight.
pub struct FlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> FlightGuard<'a> {
    /// Fails with `Busy` instead of waiting when the flag is already held.
    pub fn acquire(flag: &'a AtomicBool) -> Result<Self, EngineError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| {
                record_rejection("busy");
                EngineError::Busy
            })?;
        Ok(Self { flag })
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// An `InteractionSession` shared between a view and the engine.
///
/// Mutations go through `begin` + `commit`: at most one operation is in flight
/// per cell, and nothing is committed once the owner has retired the cell.
pub struct SessionCell {
    id: Uuid,
    state: Mutex<InteractionSession>,
    in_flight: AtomicBool,
    retired: AtomicBool,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionCell {
    pub fn new(session: InteractionSession) -> Self {
        Self::with_events(session, event_channel())
    }

    pub fn with_events(session: InteractionSession, events: broadcast::Sender<SessionEvent>) -> Self {
        SESSIONS_ACTIVE.inc();
        Self {
            id: Uuid::new_v4(),
            state: Mutex::new(session),
            in_flight: AtomicBool::new(false),
            retired: AtomicBool::new(false),
            events,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    fn lock(&self) -> MutexGuard<'_, InteractionSession> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn read<R>(&self, f: impl FnOnce(&InteractionSession) -> R) -> R {
        f(&self.lock())
    }

    pub fn handle(&self) -> UnitHandle {
        self.read(|s| s.handle())
    }

    pub fn status(&self) -> SessionStatus {
        self.read(|s| s.status())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.read(|s| s.snapshot())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    /// Marks the cell as no longer current. Responses still in flight are
    /// dropped when they come back.
    ///
    /// Taken under the state lock so that no commit straddles the flip.
    pub fn retire(&self) {
        let handle = {
            let session = self.lock();
            if self.retired.swap(true, Ordering::AcqRel) {
                return;
            }
            session.handle()
        };
        SESSIONS_ACTIVE.dec();
        tracing::debug!("Session {} retired ({})", self.id, handle);
    }

    pub fn begin(&self) -> Result<FlightGuard<'_>, EngineError> {
        if self.is_retired() {
            record_rejection("stale");
            return Err(EngineError::Stale);
        }
        FlightGuard::acquire(&self.in_flight)
    }

    /// Applies a change on behalf of the in-flight operation and publishes
    /// the resulting events.
    pub fn commit(&self, _guard: &FlightGuard<'_>, change: Change) -> Result<Applied, EngineError> {
        let (applied, events) = {
            let mut session = self.lock();
            let handle = session.handle();
            if self.is_retired() {
                tracing::warn!(
                    "Dropping response for retired session {} ({})",
                    self.id,
                    handle
                );
                record_rejection("stale");
                return Err(EngineError::Stale);
            }
            let requested = match &change {
                Change::HintDisclosed => Some(DisclosureKind::Hint),
                Change::SolutionDisclosed => Some(DisclosureKind::Solution),
                _ => None,
            };
            let judged = matches!(change, Change::Attempt { .. });
            let reported = matches!(change, Change::Reported);

            let applied = session.apply(change);
            if !applied.effective {
                return Ok(applied);
            }

            let now = Utc::now();
            let mut events = Vec::new();
            if judged {
                if let Some(attempt) = session.attempts().last() {
                    events.push(SessionEvent::AttemptJudged(AttemptJudged {
                        handle,
                        attempt: attempt.clone(),
                        remaining_attempts: session.remaining_attempts(),
                        timestamp: now,
                    }));
                }
            }
            if let Some(kind) = requested {
                events.push(SessionEvent::Disclosed(Disclosed {
                    handle,
                    kind,
                    trigger: DisclosureTrigger::Requested,
                    timestamp: now,
                }));
            }
            if reported {
                events.push(SessionEvent::ReportFiled(ReportFiled {
                    handle,
                    timestamp: now,
                }));
            }
            if applied.status_changed() {
                events.push(SessionEvent::StatusChanged(StatusChanged {
                    handle,
                    from: applied.from,
                    to: applied.to,
                    timestamp: now,
                }));
            }
            if applied.solution_forced {
                events.push(SessionEvent::Disclosed(Disclosed {
                    handle,
                    kind: DisclosureKind::Solution,
                    trigger: DisclosureTrigger::Forced,
                    timestamp: now,
                }));
            }
            (applied, events)
        };

        if applied.status_changed() {
            tracing::info!(
                "Session {} ({}) {} -> {}",
                self.id,
                self.handle(),
                applied.from.as_str(),
                applied.to.as_str()
            );
        }
        for event in events {
            self.emit(event);
        }

        Ok(applied)
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

impl Drop for SessionCell {
    fn drop(&mut self) {
        self.retire();
    }
}
