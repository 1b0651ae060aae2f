//! Auto-snapshot policy.
//!
//! Two triggers: a periodic snapshot while the timeline holds anything, and
//! a debounced snapshot shortly after the last tracked edit. Save failures
//! are logged and reported through [`SaveStatus`]; they never propagate
//! into the editing session.

use storyreel_common::{AutosaveConfig, RateController};

use crate::project::Project;
use crate::store::{save_project, ProjectStore};

/// Why a snapshot was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveReason {
    Periodic,
    AfterEdit,
}

/// Outcome of the most recent auto-snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SaveStatus {
    #[default]
    Idle,
    Saved { at: String },
    Failed { message: String },
}

/// Decides when a snapshot is due, from a caller-supplied clock.
#[derive(Debug)]
pub struct AutosavePolicy {
    enabled: bool,
    periodic: RateController,
    debounce_ns: u64,
    dirty_since_ns: Option<u64>,
}

impl AutosavePolicy {
    pub fn new(config: &AutosaveConfig) -> Self {
        Self {
            enabled: config.enabled,
            periodic: RateController::with_interval_ns(
                config.interval_secs.max(1).saturating_mul(1_000_000_000),
            ),
            debounce_ns: config.debounce_ms.saturating_mul(1_000_000),
            dirty_since_ns: None,
        }
    }

    /// Record an edit at `now_ns`. Repeated edits restart the debounce.
    pub fn mark_dirty(&mut self, now_ns: u64) {
        self.dirty_since_ns = Some(now_ns);
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty_since_ns.is_some()
    }

    /// Whether a snapshot should be taken at `now_ns`.
    pub fn poll(&mut self, now_ns: u64, has_content: bool) -> Option<SaveReason> {
        if !self.enabled {
            return None;
        }

        if let Some(since) = self.dirty_since_ns {
            if now_ns.saturating_sub(since) >= self.debounce_ns {
                self.dirty_since_ns = None;
                self.periodic.reset(now_ns);
                return Some(SaveReason::AfterEdit);
            }
        }

        if has_content && self.periodic.should_tick(now_ns) {
            return Some(SaveReason::Periodic);
        }
        None
    }
}

/// Couples a policy with a store and tracks the last outcome.
pub struct Autosaver<'a> {
    store: &'a dyn ProjectStore,
    policy: AutosavePolicy,
    status: SaveStatus,
}

impl<'a> Autosaver<'a> {
    pub fn new(store: &'a dyn ProjectStore, config: &AutosaveConfig) -> Self {
        let mut policy = AutosavePolicy::new(config);
        // The first periodic window starts now rather than firing immediately.
        policy.periodic.reset(0);
        Self {
            store,
            policy,
            status: SaveStatus::Idle,
        }
    }

    pub fn mark_dirty(&mut self, now_ns: u64) {
        self.policy.mark_dirty(now_ns);
    }

    pub fn status(&self) -> &SaveStatus {
        &self.status
    }

    /// Snapshot `project` if the policy says so. Returns the reason when a
    /// save was attempted.
    pub fn tick(&mut self, now_ns: u64, project: &Project) -> Option<SaveReason> {
        let reason = self.policy.poll(now_ns, project.timeline.has_content())?;
        self.status = match save_project(self.store, project) {
            Ok(()) => SaveStatus::Saved {
                at: storyreel_common::now_rfc3339(),
            },
            Err(e) => {
                tracing::error!(project = %project.id, error = %e, ?reason, "Auto-save failed");
                SaveStatus::Failed {
                    message: e.to_string(),
                }
            }
        };
        Some(reason)
    }
}
