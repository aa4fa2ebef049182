//! Interactive TUI client
//!
//! One cooperative event loop owns all mutable state. Key presses and async
//! completions (session load, fetches, mutations, debounce emissions,
//! reminder timers) are interleaved on that loop: background work is spawned
//! onto the runtime and reports back over an unbounded channel, so no state
//! is ever touched from two places at once.

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
    Frame, Terminal,
};
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use questlog_lib::{
    api::ApiClient,
    debounce::QueryDebouncer,
    model::{NewTask, SortKey, Task, TaskPatch},
    mutate::{DeleteMutation, MutationRecovery, ToggleMutation},
    session::{ScreenGroup, SessionGate},
    sync::{FetchKind, FetchOutcome, TaskListState},
};

// ============================================================================
// Modes and Screens
// ============================================================================

/// Active screen. Login/Register form the auth group; everything else sits
/// behind the session gate.
#[derive(Clone, Copy, PartialEq)]
enum TuiMode {
    Login,
    Register,
    TaskList,
    NewQuest,
    EditQuest,
    ConfirmDelete,
    Profile,
}

/// Which group a screen belongs to. The gate routes on this.
fn screen_group(mode: TuiMode) -> ScreenGroup {
    match mode {
        TuiMode::Login | TuiMode::Register => ScreenGroup::Auth,
        TuiMode::TaskList
        | TuiMode::NewQuest
        | TuiMode::EditQuest
        | TuiMode::ConfirmDelete
        | TuiMode::Profile => ScreenGroup::Main,
    }
}

/// Completions delivered back to the event loop by spawned work.
enum AppEvent {
    LoginDone(Result<String, String>),
    RegisterDone(Result<(), String>),
    TasksFetched {
        generation: u64,
        result: Result<Vec<Task>, String>,
    },
    ToggleDone {
        id: i64,
        result: Result<Task, String>,
    },
    DeleteDone {
        id: i64,
        result: Result<(), String>,
    },
    CreateDone(Result<Task, String>),
    DetailLoaded(Result<Task, String>),
    SaveDone(Result<Task, String>),
    DebouncedQuery(String),
    Reminder(String),
}

// ============================================================================
// Form State
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
enum AuthField {
    Username,
    Email,
    Password,
}

/// Shared state for the login and register forms. Login skips the email row.
#[derive(Default)]
struct AuthForm {
    username: String,
    email: String,
    password: String,
    focus: usize,
    busy: bool,
}

impl AuthForm {
    fn fields(mode: TuiMode) -> &'static [AuthField] {
        if mode == TuiMode::Register {
            &[AuthField::Username, AuthField::Email, AuthField::Password]
        } else {
            &[AuthField::Username, AuthField::Password]
        }
    }

    fn focused(&self, mode: TuiMode) -> AuthField {
        let fields = Self::fields(mode);
        fields[self.focus.min(fields.len() - 1)]
    }

    fn cycle(&mut self, mode: TuiMode) {
        self.focus = (self.focus + 1) % Self::fields(mode).len();
    }

    fn value_mut(&mut self, mode: TuiMode) -> &mut String {
        match self.focused(mode) {
            AuthField::Username => &mut self.username,
            AuthField::Email => &mut self.email,
            AuthField::Password => &mut self.password,
        }
    }

    fn reset(&mut self) {
        *self = AuthForm::default();
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum QuestField {
    Title,
    Description,
    Remind,
}

/// State for the new-quest and edit-quest forms. The edit form holds its own
/// copy of the task fetched from the server; it never aliases the list.
#[derive(Default)]
struct QuestForm {
    title: String,
    description: String,
    remind_secs: String,
    focus: usize,
    busy: bool,
    /// `Some(id)` while editing an existing quest.
    editing_id: Option<i64>,
    /// True while the edit form waits for its detail fetch.
    loading: bool,
}

impl QuestForm {
    fn fields(&self) -> &'static [QuestField] {
        if self.editing_id.is_some() {
            // The reminder timer only exists on creation.
            &[QuestField::Title, QuestField::Description]
        } else {
            &[
                QuestField::Title,
                QuestField::Description,
                QuestField::Remind,
            ]
        }
    }

    fn focused(&self) -> QuestField {
        let fields = self.fields();
        fields[self.focus.min(fields.len() - 1)]
    }

    fn cycle(&mut self) {
        self.focus = (self.focus + 1) % self.fields().len();
    }

    fn value_mut(&mut self) -> &mut String {
        match self.focused() {
            QuestField::Title => &mut self.title,
            QuestField::Description => &mut self.description,
            QuestField::Remind => &mut self.remind_secs,
        }
    }
}

// ============================================================================
// Application State
// ============================================================================

struct TuiApp {
    mode: TuiMode,
    gate: SessionGate,
    api: ApiClient,
    tx: UnboundedSender<AppEvent>,

    // Task list screen
    list: TaskListState,
    list_state: ListState,
    search_input: String,
    search_focused: bool,
    debounced_query: String,
    debouncer: QueryDebouncer,
    sort: SortKey,
    /// Toggles awaiting server confirmation, kept for rollback.
    inflight_toggles: Vec<ToggleMutation>,
    /// Quest id awaiting delete confirmation.
    confirm_delete: Option<i64>,

    // Forms
    auth_form: AuthForm,
    quest_form: QuestForm,

    status_message: String,
    should_quit: bool,
}

impl TuiApp {
    fn new(gate: SessionGate, api: ApiClient, tx: UnboundedSender<AppEvent>) -> Self {
        let debounce_tx = tx.clone();
        let (fwd_tx, mut fwd_rx) = mpsc::unbounded_channel::<String>();
        // Re-wrap debounce emissions as app events so the loop drains one
        // channel only.
        tokio::spawn(async move {
            while let Some(query) = fwd_rx.recv().await {
                if debounce_tx.send(AppEvent::DebouncedQuery(query)).is_err() {
                    break;
                }
            }
        });

        Self {
            mode: TuiMode::Login,
            gate,
            api,
            tx,
            list: TaskListState::new(),
            list_state: ListState::default(),
            search_input: String::new(),
            search_focused: false,
            debounced_query: String::new(),
            debouncer: QueryDebouncer::new(fwd_tx),
            sort: SortKey::default(),
            inflight_toggles: Vec::new(),
            confirm_delete: None,
            auth_form: AuthForm::default(),
            quest_form: QuestForm::default(),
            status_message: String::new(),
            should_quit: false,
        }
    }

    // ------------------------------------------------------------------
    // Routing
    // ------------------------------------------------------------------

    /// Apply the gate's routing decision. Idempotent: nothing happens when
    /// the current screen already sits in the required group.
    fn route(&mut self) {
        match self.gate.route(screen_group(self.mode)) {
            Some(ScreenGroup::Auth) => {
                self.mode = TuiMode::Login;
            }
            Some(ScreenGroup::Main) => {
                self.mode = TuiMode::TaskList;
                self.spawn_fetch(FetchKind::Initial);
            }
            None => {}
        }
    }

    fn logout(&mut self) {
        // Tear down everything owned by the list screen before leaving it:
        // the pending debounce timer and any in-flight fetch generations.
        self.debouncer.cancel();
        self.list.invalidate();
        self.inflight_toggles.clear();
        self.confirm_delete = None;
        self.search_input.clear();
        self.debounced_query.clear();
        self.search_focused = false;
        self.list_state = ListState::default();
        self.auth_form.reset();

        let _ = self.gate.set_token(None);
        self.api.set_token(None);
        self.status_message = "Logged out.".to_string();
        self.route();
    }

    // ------------------------------------------------------------------
    // Spawned operations
    // ------------------------------------------------------------------

    fn spawn_fetch(&mut self, kind: FetchKind) {
        let generation = self.list.begin(kind);
        let api = self.api.clone();
        let search = self.debounced_query.clone();
        let sort = self.sort;
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = api
                .list_tasks(&search, sort)
                .await
                .map_err(|e| e.to_string());
            let _ = tx.send(AppEvent::TasksFetched { generation, result });
        });
    }

    fn spawn_login(&mut self) {
        if self.auth_form.username.is_empty() || self.auth_form.password.is_empty() {
            self.status_message = "Please enter username and password".to_string();
            return;
        }
        self.auth_form.busy = true;
        self.status_message = "Logging in...".to_string();
        let api = self.api.clone();
        let username = self.auth_form.username.clone();
        let password = self.auth_form.password.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = api
                .login(&username, &password)
                .await
                .map_err(|e| e.to_string());
            let _ = tx.send(AppEvent::LoginDone(result));
        });
    }

    fn spawn_register(&mut self) {
        if self.auth_form.username.is_empty()
            || self.auth_form.email.is_empty()
            || self.auth_form.password.is_empty()
        {
            self.status_message = "Please fill all fields".to_string();
            return;
        }
        self.auth_form.busy = true;
        self.status_message = "Creating account...".to_string();
        let api = self.api.clone();
        let username = self.auth_form.username.clone();
        let email = self.auth_form.email.clone();
        let password = self.auth_form.password.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = api
                .register(&username, &email, &password)
                .await
                .map_err(|e| e.to_string());
            let _ = tx.send(AppEvent::RegisterDone(result));
        });
    }

    /// Optimistic completion toggle: the list changes now, the server hears
    /// about it in the background.
    fn toggle_selected(&mut self) {
        let Some(task) = self.selected_task() else {
            return;
        };
        let id = task.id;
        let new_value = !task.is_done;
        let Some(mutation) = ToggleMutation::apply(self.list.tasks_mut(), id, new_value) else {
            return;
        };
        self.inflight_toggles.push(mutation);

        let api = self.api.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let patch = TaskPatch {
                is_done: Some(new_value),
                ..Default::default()
            };
            let result = api.update_task(id, &patch).await.map_err(|e| e.to_string());
            let _ = tx.send(AppEvent::ToggleDone { id, result });
        });
    }

    /// Optimistic delete, called only after the confirm modal said yes.
    fn delete_confirmed(&mut self, id: i64) {
        if DeleteMutation::apply(self.list.tasks_mut(), id).is_none() {
            return;
        }
        self.clamp_selection();

        let api = self.api.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = api.delete_task(id).await.map_err(|e| e.to_string());
            let _ = tx.send(AppEvent::DeleteDone { id, result });
        });
    }

    fn spawn_create(&mut self) {
        if self.quest_form.title.trim().is_empty() {
            self.status_message = "Please enter a quest title".to_string();
            return;
        }
        self.quest_form.busy = true;
        let api = self.api.clone();
        let new_task = NewTask {
            title: self.quest_form.title.clone(),
            description: if self.quest_form.description.is_empty() {
                None
            } else {
                Some(self.quest_form.description.clone())
            },
        };
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = api.create_task(&new_task).await.map_err(|e| e.to_string());
            let _ = tx.send(AppEvent::CreateDone(result));
        });
    }

    /// Open the edit form. It fetches its own copy of the quest; the list's
    /// cached copy is never shared with it.
    fn open_edit(&mut self) {
        let Some(task) = self.selected_task() else {
            return;
        };
        let id = task.id;
        self.quest_form = QuestForm {
            editing_id: Some(id),
            loading: true,
            ..Default::default()
        };
        self.mode = TuiMode::EditQuest;

        let api = self.api.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = api.get_task(id).await.map_err(|e| e.to_string());
            let _ = tx.send(AppEvent::DetailLoaded(result));
        });
    }

    fn spawn_save(&mut self) {
        let Some(id) = self.quest_form.editing_id else {
            return;
        };
        if self.quest_form.title.trim().is_empty() {
            self.status_message = "Title cannot be empty".to_string();
            return;
        }
        self.quest_form.busy = true;
        let api = self.api.clone();
        let patch = TaskPatch {
            title: Some(self.quest_form.title.clone()),
            description: Some(self.quest_form.description.clone()),
            is_done: None,
        };
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = api.update_task(id, &patch).await.map_err(|e| e.to_string());
            let _ = tx.send(AppEvent::SaveDone(result));
        });
    }

    /// Local in-memory reminder: fires once after the delay, process-local,
    /// gone on exit.
    fn spawn_reminder(&self, title: String, secs: u64) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            let _ = tx.send(AppEvent::Reminder(title));
        });
    }

    // ------------------------------------------------------------------
    // Event application
    // ------------------------------------------------------------------

    fn apply_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::LoginDone(Ok(token)) => {
                self.auth_form.busy = false;
                self.api.set_token(Some(token.clone()));
                let _ = self.gate.set_token(Some(token));
                self.auth_form.reset();
                self.status_message = "Welcome back.".to_string();
                self.route();
            }
            AppEvent::LoginDone(Err(e)) => {
                self.auth_form.busy = false;
                self.status_message = e;
            }
            AppEvent::RegisterDone(Ok(())) => {
                self.auth_form.busy = false;
                self.auth_form.password.clear();
                self.mode = TuiMode::Login;
                self.status_message = "Account created. Please log in.".to_string();
            }
            AppEvent::RegisterDone(Err(e)) => {
                self.auth_form.busy = false;
                self.status_message = format!("Failed to create account: {}", e);
            }
            AppEvent::TasksFetched { generation, result } => {
                match self.list.complete(generation, result) {
                    FetchOutcome::Applied => {
                        self.clamp_selection();
                    }
                    FetchOutcome::Failed => {
                        // Prior list stays on screen; only the status changes.
                        let detail = self.list.error().unwrap_or("unknown error").to_string();
                        self.status_message = format!("Failed to load quest log: {}", detail);
                    }
                    FetchOutcome::Stale => {}
                }
            }
            AppEvent::ToggleDone { id, result } => {
                let mutation = self
                    .inflight_toggles
                    .iter()
                    .position(|m| m.id == id)
                    .map(|i| self.inflight_toggles.remove(i));
                if let Err(e) = result {
                    if let Some(mutation) = mutation {
                        mutation.rollback(self.list.tasks_mut());
                    }
                    self.status_message = format!("Failed to update quest status: {}", e);
                }
            }
            AppEvent::DeleteDone { id, result } => {
                if let Err(e) = result {
                    self.status_message = format!("Failed to delete quest: {}", e);
                    // The row is already gone locally; re-derive ground truth
                    // instead of guessing where it belonged.
                    match (DeleteMutation { id }).recovery() {
                        MutationRecovery::Resync => self.spawn_fetch(FetchKind::Background),
                    }
                }
            }
            AppEvent::CreateDone(Ok(task)) => {
                self.quest_form.busy = false;
                if let Ok(secs) = self.quest_form.remind_secs.trim().parse::<u64>() {
                    if secs > 0 {
                        self.status_message = format!(
                            "Timer set! Reminder for \"{}\" in {} sec.",
                            task.title, secs
                        );
                        self.spawn_reminder(task.title.clone(), secs);
                    }
                }
                self.return_to_list();
            }
            AppEvent::CreateDone(Err(e)) => {
                self.quest_form.busy = false;
                self.status_message = format!("Failed to create quest: {}", e);
            }
            AppEvent::DetailLoaded(Ok(task)) => {
                self.quest_form.loading = false;
                self.quest_form.title = task.title;
                self.quest_form.description = task.description.unwrap_or_default();
            }
            AppEvent::DetailLoaded(Err(e)) => {
                self.status_message = format!("Failed to load quest data: {}", e);
                self.return_to_list();
            }
            AppEvent::SaveDone(Ok(_)) => {
                self.quest_form.busy = false;
                self.return_to_list();
            }
            AppEvent::SaveDone(Err(e)) => {
                self.quest_form.busy = false;
                self.status_message = format!("Failed to save changes: {}", e);
            }
            AppEvent::DebouncedQuery(query) => {
                // Only a settled value that actually differs re-fetches.
                if self.mode != TuiMode::Login
                    && self.mode != TuiMode::Register
                    && query != self.debounced_query
                {
                    self.debounced_query = query;
                    self.spawn_fetch(FetchKind::Initial);
                }
            }
            AppEvent::Reminder(title) => {
                self.status_message = format!("REMINDER! {}", title);
            }
        }
    }

    /// Leave a form screen for the list, refetching in the background so
    /// out-of-band edits show up without a spinner.
    fn return_to_list(&mut self) {
        self.mode = TuiMode::TaskList;
        self.spawn_fetch(FetchKind::Background);
    }

    // ------------------------------------------------------------------
    // Selection helpers
    // ------------------------------------------------------------------

    fn selected_task(&self) -> Option<&Task> {
        let index = self.list_state.selected()?;
        self.list.tasks().get(index)
    }

    fn clamp_selection(&mut self) {
        let len = self.list.tasks().len();
        if len == 0 {
            self.list_state.select(None);
        } else {
            match self.list_state.selected() {
                Some(i) if i >= len => self.list_state.select(Some(len - 1)),
                None => self.list_state.select(Some(0)),
                _ => {}
            }
        }
    }

    fn select_next(&mut self) {
        let len = self.list.tasks().len();
        if len == 0 {
            return;
        }
        let next = match self.list_state.selected() {
            Some(i) => (i + 1).min(len - 1),
            None => 0,
        };
        self.list_state.select(Some(next));
    }

    fn select_prev(&mut self) {
        if let Some(i) = self.list_state.selected() {
            self.list_state.select(Some(i.saturating_sub(1)));
        }
    }

    // ------------------------------------------------------------------
    // Key handling
    // ------------------------------------------------------------------

    fn handle_key(&mut self, key: KeyEvent) {
        match self.mode {
            TuiMode::Login => self.handle_login_key(key),
            TuiMode::Register => self.handle_register_key(key),
            TuiMode::TaskList => self.handle_list_key(key),
            TuiMode::NewQuest | TuiMode::EditQuest => self.handle_form_key(key),
            TuiMode::ConfirmDelete => self.handle_confirm_key(key),
            TuiMode::Profile => {
                // Any key returns to the list.
                self.mode = TuiMode::TaskList;
            }
        }
    }

    fn handle_login_key(&mut self, key: KeyEvent) {
        if self.auth_form.busy {
            return;
        }
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('r') {
            self.auth_form.reset();
            self.mode = TuiMode::Register;
            self.status_message = String::new();
            return;
        }
        match key.code {
            KeyCode::Esc => self.should_quit = true,
            KeyCode::Tab | KeyCode::Down => self.auth_form.cycle(TuiMode::Login),
            KeyCode::Enter => self.spawn_login(),
            KeyCode::Backspace => {
                self.auth_form.value_mut(TuiMode::Login).pop();
            }
            KeyCode::Char(c) => {
                self.auth_form.value_mut(TuiMode::Login).push(c);
            }
            _ => {}
        }
    }

    fn handle_register_key(&mut self, key: KeyEvent) {
        if self.auth_form.busy {
            return;
        }
        match key.code {
            KeyCode::Esc => {
                // Back to login, never out of the auth group.
                self.auth_form.reset();
                self.mode = TuiMode::Login;
            }
            KeyCode::Tab | KeyCode::Down => self.auth_form.cycle(TuiMode::Register),
            KeyCode::Enter => self.spawn_register(),
            KeyCode::Backspace => {
                self.auth_form.value_mut(TuiMode::Register).pop();
            }
            KeyCode::Char(c) => {
                self.auth_form.value_mut(TuiMode::Register).push(c);
            }
            _ => {}
        }
    }

    fn handle_list_key(&mut self, key: KeyEvent) {
        if self.search_focused {
            match key.code {
                KeyCode::Esc | KeyCode::Enter => self.search_focused = false,
                KeyCode::Backspace => {
                    self.search_input.pop();
                    self.debouncer.update(self.search_input.clone());
                }
                KeyCode::Char(c) => {
                    self.search_input.push(c);
                    self.debouncer.update(self.search_input.clone());
                }
                _ => {}
            }
            return;
        }

        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Char('/') => {
                self.search_focused = true;
                self.status_message = String::new();
            }
            KeyCode::Char('j') | KeyCode::Down => self.select_next(),
            KeyCode::Char('k') | KeyCode::Up => self.select_prev(),
            KeyCode::Char(' ') => self.toggle_selected(),
            KeyCode::Char('d') => {
                let selected = self.selected_task().map(|t| t.id);
                if let Some(id) = selected {
                    self.confirm_delete = Some(id);
                    self.mode = TuiMode::ConfirmDelete;
                }
            }
            KeyCode::Char('n') => {
                self.quest_form = QuestForm::default();
                self.mode = TuiMode::NewQuest;
            }
            KeyCode::Enter => self.open_edit(),
            KeyCode::Char('s') => {
                self.sort = self.sort.next();
                self.status_message = format!("Sort: {}", self.sort.label());
                self.spawn_fetch(FetchKind::Initial);
            }
            KeyCode::Char('r') => self.spawn_fetch(FetchKind::Refresh),
            KeyCode::Char('p') => self.mode = TuiMode::Profile,
            KeyCode::Char('o') => self.logout(),
            _ => {}
        }
    }

    fn handle_form_key(&mut self, key: KeyEvent) {
        if self.quest_form.busy || self.quest_form.loading {
            return;
        }
        match key.code {
            KeyCode::Esc => {
                // Cancel: no mutation happened, but refetch on the way back
                // like any other focus return.
                self.return_to_list();
            }
            KeyCode::Tab | KeyCode::Down => self.quest_form.cycle(),
            KeyCode::Enter => {
                if self.quest_form.editing_id.is_some() {
                    self.spawn_save();
                } else {
                    self.spawn_create();
                }
            }
            KeyCode::Backspace => {
                self.quest_form.value_mut().pop();
            }
            KeyCode::Char(c) => {
                self.quest_form.value_mut().push(c);
            }
            _ => {}
        }
    }

    fn handle_confirm_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('y') | KeyCode::Enter => {
                if let Some(id) = self.confirm_delete.take() {
                    self.delete_confirmed(id);
                }
                self.mode = TuiMode::TaskList;
            }
            KeyCode::Char('n') | KeyCode::Esc => {
                // Cancel performs no state change at all.
                self.confirm_delete = None;
                self.mode = TuiMode::TaskList;
            }
            _ => {}
        }
    }
}

// ============================================================================
// Entry Point and Event Loop
// ============================================================================

pub(crate) async fn run_tui(mut gate: SessionGate, api: ApiClient) -> Result<(), String> {
    // Resolve the session before any screen exists: no routing decision is
    // made while the status is unknown.
    gate.load().await;

    // Setup terminal
    enable_raw_mode().map_err(|e| e.to_string())?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen).map_err(|e| e.to_string())?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).map_err(|e| e.to_string())?;

    let (tx, rx) = mpsc::unbounded_channel();
    let mut app = TuiApp::new(gate, api, tx);
    app.route();
    app.status_message = match app.mode {
        TuiMode::TaskList => "/ to search, q to quit.".to_string(),
        _ => "Log in to see your quest log.".to_string(),
    };

    // Main loop
    let result = run_tui_loop(&mut terminal, &mut app, rx).await;

    // Restore terminal
    disable_raw_mode().map_err(|e| e.to_string())?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen).map_err(|e| e.to_string())?;
    terminal.show_cursor().map_err(|e| e.to_string())?;

    result
}

async fn run_tui_loop(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    app: &mut TuiApp,
    mut rx: UnboundedReceiver<AppEvent>,
) -> Result<(), String> {
    loop {
        // Apply every completion that arrived since the last frame.
        while let Ok(event) = rx.try_recv() {
            app.apply_event(event);
        }

        if app.should_quit {
            return Ok(());
        }

        terminal
            .draw(|f| draw_ui(f, app))
            .map_err(|e| e.to_string())?;

        // Handle input. The short poll keeps async completions flowing.
        if event::poll(Duration::from_millis(50)).map_err(|e| e.to_string())? {
            if let Event::Key(key) = event::read().map_err(|e| e.to_string())? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                app.handle_key(key);
            }
        }
    }
}

// ============================================================================
// Drawing
// ============================================================================

const ACCENT: Color = Color::Cyan;
const DANGER: Color = Color::Red;
const DIM: Color = Color::DarkGray;

fn draw_ui(f: &mut Frame, app: &mut TuiApp) {
    match app.mode {
        TuiMode::Login => draw_auth(f, app, "LOGIN"),
        TuiMode::Register => draw_auth(f, app, "REGISTER"),
        TuiMode::TaskList => draw_task_list(f, app),
        TuiMode::NewQuest | TuiMode::EditQuest => draw_quest_form(f, app),
        TuiMode::ConfirmDelete => {
            draw_task_list(f, app);
            draw_confirm_modal(f);
        }
        TuiMode::Profile => draw_profile(f, app),
    }
}

fn input_line(label: &str, value: &str, focused: bool, mask: bool) -> Line<'static> {
    let shown = if mask {
        "*".repeat(value.chars().count())
    } else {
        value.to_string()
    };
    let cursor = if focused { "_" } else { "" };
    let style = if focused {
        Style::default().fg(ACCENT)
    } else {
        Style::default()
    };
    Line::from(vec![
        Span::styled(format!("{:<10}", label), Style::default().fg(DIM)),
        Span::styled(format!("{}{}", shown, cursor), style),
    ])
}

fn draw_auth(f: &mut Frame, app: &TuiApp, title: &str) {
    let area = centered_rect(50, 40, f.size());
    let is_register = app.mode == TuiMode::Register;

    let mut lines = vec![
        Line::from(Span::styled(
            title.to_string(),
            Style::default().fg(ACCENT).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        input_line(
            "username",
            &app.auth_form.username,
            app.auth_form.focused(app.mode) == AuthField::Username,
            false,
        ),
    ];
    if is_register {
        lines.push(input_line(
            "email",
            &app.auth_form.email,
            app.auth_form.focused(app.mode) == AuthField::Email,
            false,
        ));
    }
    lines.push(input_line(
        "password",
        &app.auth_form.password,
        app.auth_form.focused(app.mode) == AuthField::Password,
        true,
    ));
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        if app.auth_form.busy {
            "LOADING...".to_string()
        } else if is_register {
            "Enter: create account   Esc: back to login".to_string()
        } else {
            "Enter: continue   Ctrl-r: register   Esc: quit".to_string()
        },
        Style::default().fg(DIM),
    )));
    lines.push(Line::from(Span::styled(
        app.status_message.clone(),
        Style::default().fg(DANGER),
    )));

    let block = Block::default().borders(Borders::ALL).title(" questlog ");
    let paragraph = Paragraph::new(lines).block(block).wrap(Wrap { trim: false });
    f.render_widget(Clear, area);
    f.render_widget(paragraph, area);
}

fn draw_task_list(f: &mut Frame, app: &mut TuiApp) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Search + sort bar
            Constraint::Min(0),    // Quest list
            Constraint::Length(1), // Status bar
        ])
        .split(f.size());

    // Search bar
    let search_style = if app.search_focused {
        Style::default().fg(ACCENT)
    } else {
        Style::default()
    };
    let cursor = if app.search_focused { "_" } else { "" };
    let search = Paragraph::new(Line::from(vec![
        Span::styled(format!("{}{}", app.search_input, cursor), search_style),
    ]))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!(" Search quests  [sort: {}] ", app.sort.label())),
    );
    f.render_widget(search, chunks[0]);

    // Quest list / loading / empty state
    let title = if app.list.is_refreshing() {
        " Quest Log (refreshing...) "
    } else {
        " Quest Log "
    };
    let block = Block::default().borders(Borders::ALL).title(title);

    if app.list.is_loading() {
        let loading = Paragraph::new("Loading...")
            .alignment(Alignment::Center)
            .block(block);
        f.render_widget(loading, chunks[1]);
    } else if app.list.tasks().is_empty() {
        let text = if !app.list.loaded_once() {
            ""
        } else if app.debounced_query.is_empty() {
            "Your quest log is empty"
        } else {
            "No quests found"
        };
        let empty = Paragraph::new(text)
            .alignment(Alignment::Center)
            .style(Style::default().fg(DIM))
            .block(block);
        f.render_widget(empty, chunks[1]);
    } else {
        let items: Vec<ListItem> = app
            .list
            .tasks()
            .iter()
            .map(|task| {
                let (mark, style) = if task.is_done {
                    (
                        "◆",
                        Style::default().fg(DIM).add_modifier(Modifier::CROSSED_OUT),
                    )
                } else {
                    ("◇", Style::default())
                };
                ListItem::new(Line::from(vec![
                    Span::styled(format!("{} ", mark), Style::default().fg(ACCENT)),
                    Span::styled(task.title.clone(), style),
                ]))
            })
            .collect();
        let list = List::new(items)
            .block(block)
            .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
            .highlight_symbol("> ");
        f.render_stateful_widget(list, chunks[1], &mut app.list_state);
    }

    // Status bar
    let status = if app.search_focused {
        format!("Search: {}_  (Enter/Esc to finish)", app.search_input)
    } else if app.status_message.is_empty() {
        "space toggle  d delete  n new  Enter edit  / search  s sort  r refresh  p profile  o logout  q quit"
            .to_string()
    } else {
        app.status_message.clone()
    };
    let status_bar =
        Paragraph::new(status).style(Style::default().bg(Color::DarkGray).fg(Color::White));
    f.render_widget(status_bar, chunks[2]);
}

fn draw_quest_form(f: &mut Frame, app: &TuiApp) {
    let area = centered_rect(60, 50, f.size());
    let editing = app.quest_form.editing_id.is_some();
    let title = if editing { "EDIT QUEST" } else { "NEW QUEST" };

    let mut lines = vec![
        Line::from(Span::styled(
            title.to_string(),
            Style::default().fg(ACCENT).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
    ];

    if app.quest_form.loading {
        lines.push(Line::from("Loading..."));
    } else {
        lines.push(input_line(
            "title",
            &app.quest_form.title,
            app.quest_form.focused() == QuestField::Title,
            false,
        ));
        lines.push(input_line(
            "descr",
            &app.quest_form.description,
            app.quest_form.focused() == QuestField::Description,
            false,
        ));
        if !editing {
            lines.push(input_line(
                "remind s",
                &app.quest_form.remind_secs,
                app.quest_form.focused() == QuestField::Remind,
                false,
            ));
        }
        lines.push(Line::from(""));
        let hint = if app.quest_form.busy {
            "SAVING..."
        } else if editing {
            "Enter: save changes   Esc: cancel"
        } else {
            "Enter: accept quest   Esc: cancel"
        };
        lines.push(Line::from(Span::styled(
            hint.to_string(),
            Style::default().fg(DIM),
        )));
    }
    lines.push(Line::from(Span::styled(
        app.status_message.clone(),
        Style::default().fg(DANGER),
    )));

    let block = Block::default().borders(Borders::ALL).title(" questlog ");
    let paragraph = Paragraph::new(lines).block(block).wrap(Wrap { trim: false });
    f.render_widget(Clear, area);
    f.render_widget(paragraph, area);
}

fn draw_confirm_modal(f: &mut Frame) {
    let area = centered_rect(40, 20, f.size());
    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Delete Quest ")
        .style(Style::default().fg(DANGER));
    let text = Paragraph::new(vec![
        Line::from("Are you sure you want to delete this quest?"),
        Line::from(""),
        Line::from(Span::styled(
            "y: delete   n: cancel",
            Style::default().fg(DIM),
        )),
    ])
    .alignment(Alignment::Center)
    .block(block)
    .wrap(Wrap { trim: false });
    f.render_widget(Clear, area);
    f.render_widget(text, area);
}

fn draw_profile(f: &mut Frame, app: &TuiApp) {
    let area = centered_rect(50, 40, f.size());
    let user = app
        .list
        .tasks()
        .first()
        .map(|t| t.user.clone())
        .unwrap_or_else(|| "adventurer".to_string());
    let text = Paragraph::new(vec![
        Line::from(Span::styled(
            "PROFILE",
            Style::default().fg(ACCENT).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(format!("user:    {}", user)),
        Line::from(format!("server:  {}", app.api.base_url())),
        Line::from(""),
        Line::from(Span::styled(
            "User settings and stats can go here.",
            Style::default().fg(DIM),
        )),
        Line::from(Span::styled(
            "Press any key to go back.",
            Style::default().fg(DIM),
        )),
    ])
    .block(Block::default().borders(Borders::ALL).title(" questlog "))
    .wrap(Wrap { trim: false });
    f.render_widget(Clear, area);
    f.render_widget(text, area);
}

/// Centered sub-rectangle, percentage based.
fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_mode_belongs_to_exactly_one_group() {
        let auth = [TuiMode::Login, TuiMode::Register];
        let main = [
            TuiMode::TaskList,
            TuiMode::NewQuest,
            TuiMode::EditQuest,
            TuiMode::ConfirmDelete,
            TuiMode::Profile,
        ];
        for mode in auth {
            assert_eq!(screen_group(mode), ScreenGroup::Auth);
        }
        for mode in main {
            assert_eq!(screen_group(mode), ScreenGroup::Main);
        }
    }

    #[test]
    fn test_auth_form_field_cycle() {
        let mut form = AuthForm::default();
        assert_eq!(form.focused(TuiMode::Login), AuthField::Username);
        form.cycle(TuiMode::Login);
        assert_eq!(form.focused(TuiMode::Login), AuthField::Password);
        form.cycle(TuiMode::Login);
        assert_eq!(form.focused(TuiMode::Login), AuthField::Username);

        // Register adds the email row between the two.
        form.reset();
        form.cycle(TuiMode::Register);
        assert_eq!(form.focused(TuiMode::Register), AuthField::Email);
    }

    #[test]
    fn test_quest_form_hides_reminder_when_editing() {
        let form = QuestForm {
            editing_id: Some(3),
            ..Default::default()
        };
        assert!(!form.fields().contains(&QuestField::Remind));

        let form = QuestForm::default();
        assert!(form.fields().contains(&QuestField::Remind));
    }

    #[test]
    fn test_centered_rect_is_contained() {
        let outer = Rect::new(0, 0, 100, 40);
        let inner = centered_rect(50, 50, outer);
        assert!(inner.width <= outer.width);
        assert!(inner.height <= outer.height);
        assert!(inner.x >= outer.x && inner.y >= outer.y);
    }
}
