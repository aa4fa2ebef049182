//! Task list fetch state
//!
//! The list screen can have several fetches in flight at once (a settled
//! search, a sort change, a focus refetch). Each invocation gets a strictly
//! increasing generation tag; only the response to the most recently issued
//! request is ever applied. Last request wins, not last response.
//!
//! This state machine is transport-free: the caller spawns the actual HTTP
//! request and feeds the result back through [`TaskListState::complete`].

use crate::model::Task;

/// What kind of fetch is being issued, which decides the UX flag it raises.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    /// First load of the screen, or a query/sort change: primary spinner.
    Initial,
    /// Focus refetch after a form screen: no indicator at all.
    Background,
    /// User-initiated refresh: the refreshing indicator, not the spinner.
    Refresh,
}

/// Outcome of feeding a response into the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Response applied; the view now shows it.
    Applied,
    /// Fetch failed; prior view preserved, error recorded.
    Failed,
    /// A newer request had already been issued; response discarded.
    Stale,
}

/// Fetch bookkeeping plus the current view of the list.
#[derive(Debug, Default)]
pub struct TaskListState {
    tasks: Vec<Task>,
    /// Generation of the most recently issued fetch.
    generation: u64,
    /// Generation that raised the primary spinner, while it is up.
    loading_gen: Option<u64>,
    /// Generation that raised the refreshing indicator, while it is up.
    refreshing_gen: Option<u64>,
    error: Option<String>,
    /// True once any fetch has completed, so the UI can tell "empty because
    /// nothing loaded yet" from "empty result".
    loaded_once: bool,
}

impl TaskListState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a new fetch and return its generation tag. The caller passes the
    /// tag back in [`TaskListState::complete`].
    pub fn begin(&mut self, kind: FetchKind) -> u64 {
        self.generation += 1;
        match kind {
            FetchKind::Initial => self.loading_gen = Some(self.generation),
            FetchKind::Refresh => self.refreshing_gen = Some(self.generation),
            FetchKind::Background => {}
        }
        self.generation
    }

    /// Feed a fetch response back in.
    ///
    /// Whatever the outcome, the flag this generation raised comes down — the
    /// guaranteed-cleanup path. The list itself only changes when the
    /// response belongs to the latest issued generation.
    pub fn complete(
        &mut self,
        generation: u64,
        result: Result<Vec<Task>, String>,
    ) -> FetchOutcome {
        if self.loading_gen == Some(generation) {
            self.loading_gen = None;
        }
        if self.refreshing_gen == Some(generation) {
            self.refreshing_gen = None;
        }

        if generation != self.generation {
            return FetchOutcome::Stale;
        }

        self.loaded_once = true;
        match result {
            Ok(tasks) => {
                self.tasks = tasks;
                self.error = None;
                FetchOutcome::Applied
            }
            Err(e) => {
                self.error = Some(e);
                FetchOutcome::Failed
            }
        }
    }

    /// Invalidate all in-flight fetches without issuing a new one, and drop
    /// the cached view. Used when the owning screen goes away (logout): a
    /// late response becomes a discarded no-op instead of resurrecting state.
    pub fn invalidate(&mut self) {
        self.generation += 1;
        self.loading_gen = None;
        self.refreshing_gen = None;
        self.tasks.clear();
        self.error = None;
        self.loaded_once = false;
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn tasks_mut(&mut self) -> &mut Vec<Task> {
        &mut self.tasks
    }

    pub fn is_loading(&self) -> bool {
        self.loading_gen.is_some()
    }

    pub fn is_refreshing(&self) -> bool {
        self.refreshing_gen.is_some()
    }

    pub fn loaded_once(&self) -> bool {
        self.loaded_once
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: i64, title: &str) -> Task {
        Task {
            id,
            title: title.to_string(),
            description: None,
            is_done: false,
            user: "hero".to_string(),
        }
    }

    #[test]
    fn test_single_fetch_applies() {
        let mut state = TaskListState::new();
        let gen = state.begin(FetchKind::Initial);
        assert!(state.is_loading());

        let outcome = state.complete(gen, Ok(vec![task(1, "a")]));
        assert_eq!(outcome, FetchOutcome::Applied);
        assert!(!state.is_loading());
        assert_eq!(state.tasks().len(), 1);
        assert!(state.loaded_once());
    }

    #[test]
    fn test_stale_response_discarded_after_newer_applied() {
        let mut state = TaskListState::new();
        let gen_old = state.begin(FetchKind::Initial);
        let gen_new = state.begin(FetchKind::Background);

        // Newer response lands first and is applied.
        assert_eq!(
            state.complete(gen_new, Ok(vec![task(2, "new")])),
            FetchOutcome::Applied
        );
        // The older response arrives late and must not overwrite it.
        assert_eq!(
            state.complete(gen_old, Ok(vec![task(1, "old")])),
            FetchOutcome::Stale
        );
        assert_eq!(state.tasks()[0].id, 2);
    }

    #[test]
    fn test_stale_response_discarded_even_before_newer_lands() {
        let mut state = TaskListState::new();
        let gen_old = state.begin(FetchKind::Initial);
        let _gen_new = state.begin(FetchKind::Initial);

        // A newer request has been issued, so the old response is already
        // dead on arrival.
        assert_eq!(
            state.complete(gen_old, Ok(vec![task(1, "old")])),
            FetchOutcome::Stale
        );
        assert!(state.tasks().is_empty());
    }

    #[test]
    fn test_each_generation_lowers_its_own_flag() {
        let mut state = TaskListState::new();
        let gen_initial = state.begin(FetchKind::Initial);
        let gen_refresh = state.begin(FetchKind::Refresh);
        assert!(state.is_loading());
        assert!(state.is_refreshing());

        // The superseded initial fetch still lowers the spinner it raised.
        state.complete(gen_initial, Ok(vec![]));
        assert!(!state.is_loading());
        assert!(state.is_refreshing());

        state.complete(gen_refresh, Ok(vec![]));
        assert!(!state.is_refreshing());
    }

    #[test]
    fn test_failure_preserves_previous_list_and_lowers_flags() {
        let mut state = TaskListState::new();
        let gen = state.begin(FetchKind::Initial);
        state.complete(gen, Ok(vec![task(1, "keep me")]));

        let gen = state.begin(FetchKind::Refresh);
        let outcome = state.complete(gen, Err("connection refused".to_string()));
        assert_eq!(outcome, FetchOutcome::Failed);
        assert!(!state.is_refreshing());
        assert_eq!(state.tasks().len(), 1);
        assert_eq!(state.error(), Some("connection refused"));

        // The next successful fetch clears the error.
        let gen = state.begin(FetchKind::Background);
        state.complete(gen, Ok(vec![]));
        assert_eq!(state.error(), None);
    }

    #[test]
    fn test_invalidate_discards_in_flight_responses() {
        let mut state = TaskListState::new();
        let gen = state.begin(FetchKind::Initial);
        state.complete(gen, Ok(vec![task(1, "a")]));

        let gen_inflight = state.begin(FetchKind::Background);
        state.invalidate();
        assert!(state.tasks().is_empty());
        assert!(!state.is_loading());

        assert_eq!(
            state.complete(gen_inflight, Ok(vec![task(9, "ghost")])),
            FetchOutcome::Stale
        );
        assert!(state.tasks().is_empty());
        assert!(!state.loaded_once());
    }

    #[test]
    fn test_background_fetch_raises_no_flags() {
        let mut state = TaskListState::new();
        let gen = state.begin(FetchKind::Background);
        assert!(!state.is_loading());
        assert!(!state.is_refreshing());
        state.complete(gen, Ok(vec![]));
        assert!(state.loaded_once());
    }
}
