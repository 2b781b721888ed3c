//! Task-group communication registry.

use std::sync::{Arc, LazyLock};

use dashmap::DashMap;
use relaybyte_types::RunState;

use crate::error::{EngineError, Result};
use crate::statistics::communication::Communication;

static GLOBAL: LazyLock<TaskGroupRegistry> = LazyLock::new(TaskGroupRegistry::new);

/// Map from task-group id to its aggregated communication.
///
/// The job-level communication is never stored; it is folded from every
/// registered group on request.
#[derive(Debug, Default)]
pub struct TaskGroupRegistry {
    groups: DashMap<u32, Arc<Communication>>,
}

impl TaskGroupRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry shared by containers that do not pass their
    /// own handle around. Call [`clear`](Self::clear) between jobs.
    #[must_use]
    pub fn global() -> &'static TaskGroupRegistry {
        &GLOBAL
    }

    /// Register (or re-register) a task group.
    pub fn register(&self, task_group_id: u32, communication: Arc<Communication>) {
        self.groups.insert(task_group_id, communication);
    }

    /// Replace the communication of an already registered group.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownTaskGroup`] when the id was never
    /// registered.
    pub fn update(&self, task_group_id: u32, communication: Arc<Communication>) -> Result<()> {
        match self.groups.get_mut(&task_group_id) {
            Some(mut slot) => {
                *slot = communication;
                Ok(())
            }
            None => Err(EngineError::UnknownTaskGroup(task_group_id)),
        }
    }

    #[must_use]
    pub fn get(&self, task_group_id: u32) -> Option<Arc<Communication>> {
        self.groups.get(&task_group_id).map(|c| Arc::clone(&c))
    }

    /// Registered ids, sorted.
    #[must_use]
    pub fn ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.groups.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        ids
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Fold every registered group into a fresh communication seeded as
    /// succeeded. With no groups registered the result stays succeeded.
    #[must_use]
    pub fn job_communication(&self) -> Communication {
        let job = Communication::with_state(RunState::Succeeded);
        let groups: Vec<Arc<Communication>> =
            self.groups.iter().map(|e| Arc::clone(e.value())).collect();
        for group in groups {
            job.merge_from(&group);
        }
        job
    }

    pub fn clear(&self) {
        self.groups.clear();
    }
}
