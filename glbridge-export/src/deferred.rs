//! Deferred cleanup after an export
//!
//! Temporary objects must not be destroyed inside the operation that created
//! and substituted them, so cleanup is queued as two tasks: destroying temps
//! first, restoring original state second. Each task carries names only and
//! has a completion marker, so it runs at most once however often the queue
//! is ticked.

use crate::host::Host;
use glbridge_core::{ExportSelection, SubdivisionLevels};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Delays before each cleanup phase, measured from the end of the export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupDelays {
    pub destroy_temps_ms: u64,
    pub restore_state_ms: u64,
}

impl Default for CleanupDelays {
    fn default() -> Self {
        Self {
            destroy_temps_ms: 100,
            restore_state_ms: 250,
        }
    }
}

impl CleanupDelays {
    pub fn destroy_temps(&self) -> Duration {
        Duration::from_millis(self.destroy_temps_ms)
    }

    pub fn restore_state(&self) -> Duration {
        Duration::from_millis(self.restore_state_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

#[derive(Debug, Clone, PartialEq)]
pub enum DeferredTask {
    DestroyTemps {
        names: Vec<String>,
    },
    RestoreState {
        subdivision: Vec<(String, SubdivisionLevels)>,
        selection: ExportSelection,
    },
}

impl DeferredTask {
    pub fn kind(&self) -> &'static str {
        match self {
            DeferredTask::DestroyTemps { .. } => "destroy_temps",
            DeferredTask::RestoreState { .. } => "restore_state",
        }
    }

    /// Apply the task to the host, returning how many items it touched
    fn run(&self, host: &mut dyn Host) -> usize {
        match self {
            DeferredTask::DestroyTemps { names } => {
                let mut destroyed = 0;
                for name in names {
                    if host.destroy_temp(name) {
                        destroyed += 1;
                    } else {
                        debug!(temp = %name, "temporary object already gone");
                    }
                }
                destroyed
            }
            DeferredTask::RestoreState {
                subdivision,
                selection,
            } => {
                let mut restored = 0;
                for (object, levels) in subdivision {
                    if host.set_subdivision(object, *levels) {
                        restored += 1;
                    } else {
                        warn!(object = %object, "could not restore subdivision levels");
                    }
                }
                host.set_selection(selection);
                restored
            }
        }
    }
}

/// Record of a task that ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskRun {
    pub id: TaskId,
    pub kind: &'static str,
    pub affected: usize,
}

#[derive(Debug)]
struct Scheduled {
    id: TaskId,
    due: Instant,
    task: DeferredTask,
}

#[derive(Debug, Default)]
pub struct DeferredQueue {
    pending: Vec<Scheduled>,
    completed: HashSet<TaskId>,
    next_id: u64,
}

impl DeferredQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, task: DeferredTask, delay: Duration, now: Instant) -> TaskId {
        let id = TaskId(self.next_id);
        self.next_id += 1;
        debug!(task = task.kind(), ?delay, "scheduled deferred task");
        self.pending.push(Scheduled {
            id,
            due: now + delay,
            task,
        });
        id
    }

    pub fn is_complete(&self, id: TaskId) -> bool {
        self.completed.contains(&id)
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_empty()
    }

    /// Earliest time a pending task becomes due
    pub fn next_due(&self) -> Option<Instant> {
        self.pending.iter().map(|s| s.due).min()
    }

    /// Run every task due at `now`, earliest first
    pub fn tick(&mut self, host: &mut dyn Host, now: Instant) -> Vec<TaskRun> {
        self.run_where(host, |s| s.due <= now)
    }

    /// Run everything still pending regardless of its due time
    pub fn flush(&mut self, host: &mut dyn Host) -> Vec<TaskRun> {
        self.run_where(host, |_| true)
    }

    fn run_where(&mut self, host: &mut dyn Host, ready: impl Fn(&Scheduled) -> bool) -> Vec<TaskRun> {
        let (mut due, rest): (Vec<Scheduled>, Vec<Scheduled>) = self.pending.drain(..).partition(|s| ready(s));
        self.pending = rest;
        due.sort_by_key(|s| (s.due, s.id));

        let mut runs = Vec::with_capacity(due.len());
        for scheduled in due {
            // marked before running so a task can never run twice
            if !self.completed.insert(scheduled.id) {
                continue;
            }
            let affected = scheduled.task.run(host);
            info!(task = scheduled.task.kind(), affected, "deferred task complete");
            runs.push(TaskRun {
                id: scheduled.id,
                kind: scheduled.task.kind(),
                affected,
            });
        }
        runs
    }
}
