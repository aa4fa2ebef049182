//! Optimistic mutations
//!
//! Toggle and delete update the displayed list before the server answers.
//! Each is an explicit two-phase object: `apply` snapshots what rollback
//! needs and performs the local change; on a confirmed failure the caller
//! runs the rollback. Keeping the phases as values makes the rollback
//! contract testable without any transport.
//!
//! The two rollbacks are deliberately different. A toggle is a direct field
//! inversion. A failed delete triggers a full resync instead of reinserting
//! the row, because the item's exact position under the active server-side
//! sort order is not locally reconstructible.

use crate::model::Task;

/// In-flight optimistic completion toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToggleMutation {
    pub id: i64,
    pub new_value: bool,
    prev_value: bool,
}

impl ToggleMutation {
    /// Rewrite the matching task's `is_done` in place. Returns `None` when
    /// the id is not in the view (stale UI event): nothing changes.
    pub fn apply(tasks: &mut [Task], id: i64, new_value: bool) -> Option<Self> {
        let task = tasks.iter_mut().find(|t| t.id == id)?;
        let prev_value = task.is_done;
        task.is_done = new_value;
        Some(Self {
            id,
            new_value,
            prev_value,
        })
    }

    /// Restore the pre-mutation value after a confirmed failure. A no-op if
    /// the task has meanwhile left the view (e.g. an interleaved refetch).
    pub fn rollback(self, tasks: &mut [Task]) {
        if let Some(task) = tasks.iter_mut().find(|t| t.id == self.id) {
            task.is_done = self.prev_value;
        }
    }
}

/// In-flight optimistic removal. The UI's confirm step happens before
/// `apply`; cancel means `apply` is never called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteMutation {
    pub id: i64,
}

impl DeleteMutation {
    /// Remove the matching task from the view. Returns `None` when the id is
    /// not present.
    pub fn apply(tasks: &mut Vec<Task>, id: i64) -> Option<Self> {
        if !tasks.iter().any(|t| t.id == id) {
            return None;
        }
        tasks.retain(|t| t.id != id);
        Some(Self { id })
    }

    /// What to do after a confirmed failure: not reinsertion — the caller
    /// must refetch the authoritative list.
    pub fn recovery(self) -> MutationRecovery {
        MutationRecovery::Resync
    }
}

/// Recovery action a failed mutation demands from its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationRecovery {
    /// Re-derive ground truth with a full list fetch.
    Resync,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tasks() -> Vec<Task> {
        vec![
            Task {
                id: 1,
                title: "Defeat 10 slimes".to_string(),
                description: None,
                is_done: false,
                user: "hero".to_string(),
            },
            Task {
                id: 5,
                title: "Find the key".to_string(),
                description: Some("under the mat".to_string()),
                is_done: true,
                user: "hero".to_string(),
            },
        ]
    }

    #[test]
    fn test_toggle_applies_immediately() {
        let mut list = tasks();
        let mutation = ToggleMutation::apply(&mut list, 1, true).unwrap();
        assert!(list[0].is_done);
        assert_eq!(mutation.id, 1);
        assert_eq!(mutation.new_value, true);
    }

    #[test]
    fn test_toggle_rollback_restores_exact_prior_value() {
        let mut list = tasks();
        let mutation = ToggleMutation::apply(&mut list, 5, false).unwrap();
        assert!(!list[1].is_done);

        // Network failed: invert back.
        mutation.rollback(&mut list);
        assert!(list[1].is_done);
        assert_eq!(list, tasks());
    }

    #[test]
    fn test_toggle_missing_id_is_noop() {
        let mut list = tasks();
        assert!(ToggleMutation::apply(&mut list, 999, true).is_none());
        assert_eq!(list, tasks());
    }

    #[test]
    fn test_toggle_rollback_tolerates_vanished_task() {
        let mut list = tasks();
        let mutation = ToggleMutation::apply(&mut list, 1, true).unwrap();
        // A refetch replaced the list while the request was in flight.
        list.retain(|t| t.id != 1);
        mutation.rollback(&mut list);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_delete_removes_immediately() {
        let mut list = tasks();
        let mutation = DeleteMutation::apply(&mut list, 5).unwrap();
        assert_eq!(list.len(), 1);
        assert!(list.iter().all(|t| t.id != 5));
        assert_eq!(mutation.id, 5);
    }

    #[test]
    fn test_delete_missing_id_is_noop() {
        let mut list = tasks();
        assert!(DeleteMutation::apply(&mut list, 999).is_none());
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_failed_delete_demands_resync_not_reinsertion() {
        let mut list = tasks();
        let mutation = DeleteMutation::apply(&mut list, 1).unwrap();
        assert_eq!(mutation.recovery(), MutationRecovery::Resync);
        // The item stays gone locally until the resync lands.
        assert!(list.iter().all(|t| t.id != 1));
    }
}
