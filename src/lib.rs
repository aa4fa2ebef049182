pub mod api;
pub mod debounce;
pub mod model;
pub mod mutate;
pub mod session;
pub mod settings;
pub mod sync;

use std::path::PathBuf;

/// App data directory (`~/.local/share/questlog` or platform equivalent).
/// Falls back to the working directory when the platform dir is unavailable.
pub fn app_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|p| p.join("questlog"))
        .unwrap_or_else(|| PathBuf::from("."))
}
