use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use super::episode_sequencer::CaseProgress;
use super::oracle::LearningOracle;
use super::session_cell::SessionCell;
use crate::error::EngineError;

/// An open learning-mode task and the oracle bound to its student.
#[derive(Clone)]
pub struct TaskEntry {
    pub cell: Arc<SessionCell>,
    pub oracle: Arc<dyn LearningOracle>,
}

/// A case run belongs to the student whose token opened it; two students on
/// the same case never share a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CaseKey {
    owner: Option<String>,
    case_id: i64,
}

impl CaseKey {
    pub fn new(owner: Option<String>, case_id: i64) -> Self {
        Self { owner, case_id }
    }
}

/// In-memory sessions owned by the gateway.
#[derive(Default)]
pub struct SessionRegistry {
    tasks: RwLock<HashMap<Uuid, TaskEntry>>,
    cases: RwLock<HashMap<CaseKey, Arc<CaseProgress>>>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SessionRegistry {
    pub fn insert_task(&self, entry: TaskEntry) -> Uuid {
        let id = entry.cell.id();
        write(&self.tasks).insert(id, entry);
        id
    }

    pub fn task(&self, id: Uuid) -> Result<TaskEntry, EngineError> {
        read(&self.tasks)
            .get(&id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("task session {}", id)))
    }

    pub fn remove_task(&self, id: Uuid) -> Result<(), EngineError> {
        let entry = write(&self.tasks)
            .remove(&id)
            .ok_or_else(|| EngineError::NotFound(format!("task session {}", id)))?;
        entry.cell.retire();
        Ok(())
    }

    /// Replaces the same student's earlier run of the case; the old run is
    /// retired.
    pub fn insert_case(&self, key: CaseKey, case: Arc<CaseProgress>) {
        let previous = write(&self.cases).insert(key, case);
        if let Some(previous) = previous {
            previous.retire();
        }
    }

    pub fn case(&self, key: &CaseKey) -> Result<Arc<CaseProgress>, EngineError> {
        read(&self.cases)
            .get(key)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("case {}", key.case_id)))
    }

    pub fn remove_case(&self, key: &CaseKey) -> Result<(), EngineError> {
        let case = write(&self.cases)
            .remove(key)
            .ok_or_else(|| EngineError::NotFound(format!("case {}", key.case_id)))?;
        case.retire();
        Ok(())
    }

    pub fn task_count(&self) -> usize {
        read(&self.tasks).len()
    }

    pub fn case_count(&self) -> usize {
        read(&self.cases).len()
    }
}
