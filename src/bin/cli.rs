//! Questlog CLI - command-line client for the quest-log server
//!
//! Usage: questlog [OPTIONS] <COMMAND>
//!
//! One-shot subcommands for scripting (JSON output supported) plus the
//! interactive TUI (`questlog tui`).

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use questlog_lib::{
    api::ApiClient,
    app_data_dir,
    model::{NewTask, SortKey, TaskPatch},
    session::{SessionGate, SessionStatus, SessionStore},
    settings,
};
use std::io::Write;

// ============================================================================
// Logging Infrastructure
// ============================================================================

use chrono::{Datelike, Local, Timelike};
use std::fs::{self, File, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;

pub(crate) static LOG_FILE: Mutex<Option<File>> = Mutex::new(None);

/// Initialize logging - creates log file and cleans old logs
fn init_logging() -> Option<PathBuf> {
    let log_dir = app_data_dir().join("logs");

    if fs::create_dir_all(&log_dir).is_err() {
        return None;
    }

    // Clean logs older than 7 days
    if let Ok(entries) = fs::read_dir(&log_dir) {
        let cutoff = Local::now() - chrono::Duration::days(7);
        for entry in entries.flatten() {
            let path = entry.path();
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if name.starts_with("questlog-") && name.ends_with(".log") {
                    // Parse date from filename: questlog-YYYY-MM-DD.log
                    if let Some(date_str) =
                        name.strip_prefix("questlog-").and_then(|s| s.strip_suffix(".log"))
                    {
                        if let Ok(date) = chrono::NaiveDate::parse_from_str(date_str, "%Y-%m-%d") {
                            if date < cutoff.date_naive() {
                                let _ = fs::remove_file(&path);
                            }
                        }
                    }
                }
            }
        }
    }

    // Create today's log file
    let today = Local::now();
    let log_filename = format!(
        "questlog-{:04}-{:02}-{:02}.log",
        today.year(),
        today.month(),
        today.day()
    );
    let log_path = log_dir.join(&log_filename);

    if let Ok(file) = OpenOptions::new().create(true).append(true).open(&log_path) {
        *LOG_FILE.lock().unwrap() = Some(file);
        Some(log_path)
    } else {
        None
    }
}

/// Log to both terminal and file
pub(crate) fn log_both(msg: &str) {
    let now = Local::now();
    let timestamp = format!("[{:02}:{:02}:{:02}]", now.hour(), now.minute(), now.second());

    println!("{}", msg);

    if let Ok(mut guard) = LOG_FILE.lock() {
        if let Some(ref mut file) = *guard {
            let _ = writeln!(file, "{} {}", timestamp, msg);
        }
    }
}

/// Log error to both terminal and file
pub(crate) fn elog_both(msg: &str) {
    let now = Local::now();
    let timestamp = format!("[{:02}:{:02}:{:02}]", now.hour(), now.minute(), now.second());

    eprintln!("{}", msg);

    if let Ok(mut guard) = LOG_FILE.lock() {
        if let Some(ref mut file) = *guard {
            let _ = writeln!(file, "{} [ERROR] {}", timestamp, msg);
        }
    }
}

/// Macro for logging to both terminal and file
macro_rules! log {
    ($($arg:tt)*) => {
        log_both(&format!($($arg)*))
    };
}

/// Macro for error logging to both terminal and file
macro_rules! elog {
    ($($arg:tt)*) => {
        elog_both(&format!($($arg)*))
    };
}

#[path = "cli/tui.rs"]
mod tui;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "questlog", version, about = "Terminal client for a quest-log task server")]
struct Cli {
    /// Server base URL (overrides the configured one)
    #[arg(long, global = true)]
    server: Option<String>,

    /// Output JSON instead of human-readable text
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and store the session token
    Login {
        username: String,
        /// Password (prompted if omitted; note the prompt echoes)
        #[arg(long)]
        password: Option<String>,
    },
    /// Create an account
    Register {
        username: String,
        email: String,
        /// Password (prompted if omitted; note the prompt echoes)
        #[arg(long)]
        password: Option<String>,
    },
    /// Log out and discard the stored token
    Logout,
    /// List quests
    List {
        /// Filter by title/description substring
        #[arg(long, default_value = "")]
        search: String,
        /// Sort order: newest, oldest, title, completed, active
        #[arg(long, default_value = "newest")]
        sort: String,
    },
    /// Create a quest
    Add {
        title: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// Mark a quest as completed
    Done { id: i64 },
    /// Mark a quest as active again
    Undone { id: i64 },
    /// Delete a quest
    Rm {
        id: i64,
        /// Skip the confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },
    /// Show one quest
    Show { id: i64 },
    /// Edit a quest's title or description
    Edit {
        id: i64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Show or change configuration
    Config {
        #[command(subcommand)]
        cmd: ConfigCommands,
    },
    /// Launch the interactive TUI
    Tui,
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the active configuration
    Show,
    /// Set the server base URL
    SetServer { url: String },
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() {
    // Ignore SIGPIPE so piping through head/tail doesn't kill the process.
    #[cfg(unix)]
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_IGN);
    }

    // Exit cleanly on broken pipe instead of panicking.
    // println! internally unwraps write results, so even with SIGPIPE ignored,
    // it panics when the pipe is closed. This hook catches that and exits quietly.
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe") {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    // The TUI owns the terminal, so it skips terminal logging entirely;
    // everything it has to say goes through its own status line.
    if !matches!(cli.command, Commands::Tui) {
        if let Some(log_path) = init_logging() {
            if cli.verbose {
                eprintln!("Logging to: {}", log_path.display());
            }
        }
    }

    if let Err(e) = run_cli(cli).await {
        elog!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run_cli(cli: Cli) -> Result<(), String> {
    // Initialize settings first (needed for the server URL)
    settings::init(app_data_dir());

    // Handle completions first (no session needed)
    if let Commands::Completions { shell } = &cli.command {
        generate(*shell, &mut Cli::command(), "questlog", &mut std::io::stdout());
        return Ok(());
    }

    let server_url = cli.server.clone().unwrap_or_else(settings::get_server_url);

    if cli.verbose {
        eprintln!("[verbose] Server: {}", server_url);
    }

    // Load the session before anything else: routing and the bearer header
    // both hang off it.
    let store = SessionStore::new(&app_data_dir());
    let mut gate = SessionGate::new(store);
    gate.load().await;

    let mut api = ApiClient::new(&server_url).map_err(|e| e.to_string())?;
    api.set_token(gate.token().map(|t| t.to_string()));

    match cli.command {
        Commands::Login { username, password } => {
            let password = match password {
                Some(p) => p,
                None => prompt("Password: ")?,
            };
            let token = api
                .login(&username, &password)
                .await
                .map_err(|e| e.to_string())?;
            // Wait for persistence: a one-shot process exits right after.
            gate.set_token(Some(token))
                .await
                .map_err(|e| format!("Persistence task failed: {}", e))?;
            log!("Logged in as {}.", username);
            Ok(())
        }
        Commands::Register {
            username,
            email,
            password,
        } => {
            let password = match password {
                Some(p) => p,
                None => prompt("Password: ")?,
            };
            api.register(&username, &email, &password)
                .await
                .map_err(|e| e.to_string())?;
            log!("Account created. Log in with: questlog login {}", username);
            Ok(())
        }
        Commands::Logout => {
            gate.set_token(None)
                .await
                .map_err(|e| format!("Persistence task failed: {}", e))?;
            log!("Logged out.");
            Ok(())
        }
        Commands::List { search, sort } => {
            require_session(&gate)?;
            let sort =
                SortKey::parse(&sort).ok_or_else(|| format!("Unknown sort key '{}'", sort))?;
            let tasks = api
                .list_tasks(&search, sort)
                .await
                .map_err(|e| e.to_string())?;
            if cli.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&tasks).map_err(|e| e.to_string())?
                );
            } else if tasks.is_empty() {
                if search.is_empty() {
                    log!("Your quest log is empty.");
                } else {
                    log!("No quests found for '{}'.", search);
                }
            } else {
                for task in &tasks {
                    let mark = if task.is_done { "x" } else { " " };
                    log!("[{}] #{:<4} {}", mark, task.id, task.title);
                }
            }
            Ok(())
        }
        Commands::Add { title, description } => {
            require_session(&gate)?;
            if title.trim().is_empty() {
                return Err("Quest title cannot be empty".to_string());
            }
            let task = api
                .create_task(&NewTask { title, description })
                .await
                .map_err(|e| e.to_string())?;
            if cli.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&task).map_err(|e| e.to_string())?
                );
            } else {
                log!("Accepted quest #{}: {}", task.id, task.title);
            }
            Ok(())
        }
        Commands::Done { id } => set_done(&api, &gate, id, true).await,
        Commands::Undone { id } => set_done(&api, &gate, id, false).await,
        Commands::Rm { id, yes } => {
            require_session(&gate)?;
            if !yes {
                let answer = prompt(&format!("Delete quest #{}? [y/N] ", id))?;
                if !matches!(answer.as_str(), "y" | "Y" | "yes") {
                    log!("Cancelled.");
                    return Ok(());
                }
            }
            api.delete_task(id).await.map_err(|e| e.to_string())?;
            log!("Deleted quest #{}.", id);
            Ok(())
        }
        Commands::Show { id } => {
            require_session(&gate)?;
            let task = api.get_task(id).await.map_err(|e| e.to_string())?;
            if cli.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&task).map_err(|e| e.to_string())?
                );
            } else {
                let mark = if task.is_done { "completed" } else { "active" };
                log!("#{} {} ({})", task.id, task.title, mark);
                if let Some(desc) = &task.description {
                    if !desc.is_empty() {
                        log!("  {}", desc);
                    }
                }
            }
            Ok(())
        }
        Commands::Edit {
            id,
            title,
            description,
        } => {
            require_session(&gate)?;
            if title.is_none() && description.is_none() {
                return Err("Nothing to change: pass --title and/or --description".to_string());
            }
            let patch = TaskPatch {
                title,
                description,
                is_done: None,
            };
            let task = api
                .update_task(id, &patch)
                .await
                .map_err(|e| e.to_string())?;
            log!("Updated quest #{}: {}", task.id, task.title);
            Ok(())
        }
        Commands::Config { cmd } => match cmd {
            ConfigCommands::Show => {
                log!("server:   {}", server_url);
                log!("data dir: {}", app_data_dir().display());
                let session = match gate.status() {
                    SessionStatus::Authenticated => "logged in",
                    _ => "logged out",
                };
                log!("session:  {}", session);
                Ok(())
            }
            ConfigCommands::SetServer { url } => {
                settings::set_server_url(url.clone())?;
                log!("Server set to {}", url);
                Ok(())
            }
        },
        Commands::Tui => tui::run_tui(gate, api).await,
        Commands::Completions { .. } => unreachable!("handled above"),
    }
}

/// One-shot commands fail fast without a session; the TUI routes to the
/// login screen instead.
fn require_session(gate: &SessionGate) -> Result<(), String> {
    match gate.status() {
        SessionStatus::Authenticated => Ok(()),
        _ => Err("Not logged in. Run `questlog login <username>` first.".to_string()),
    }
}

async fn set_done(api: &ApiClient, gate: &SessionGate, id: i64, done: bool) -> Result<(), String> {
    require_session(gate)?;
    let patch = TaskPatch {
        is_done: Some(done),
        ..Default::default()
    };
    let task = api
        .update_task(id, &patch)
        .await
        .map_err(|e| e.to_string())?;
    if task.is_done {
        log!("Quest #{} completed.", task.id);
    } else {
        log!("Quest #{} is active again.", task.id);
    }
    Ok(())
}

fn prompt(message: &str) -> Result<String, String> {
    print!("{}", message);
    std::io::stdout()
        .flush()
        .map_err(|e| format!("Failed to flush stdout: {}", e))?;
    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .map_err(|e| format!("Failed to read input: {}", e))?;
    Ok(line.trim().to_string())
}
