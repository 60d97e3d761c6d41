// Application state module
// Immutable shared state built once at startup

use std::io;
use std::path::{Path, PathBuf};

use super::types::Config;

/// Shared application state
///
/// The static root is canonicalized once here; the per-request traversal
/// guard compares resolved paths against this prefix.
pub struct AppState {
    pub config: Config,
    pub static_root: PathBuf,
}

impl AppState {
    /// Create `AppState`, resolving the static root to an absolute path
    ///
    /// Fails when the configured root does not exist or is unreadable, so
    /// a misconfigured server refuses to start instead of serving 404s.
    pub fn new(config: Config) -> io::Result<Self> {
        let static_root = Path::new(&config.static_files.root).canonicalize()?;
        Ok(Self {
            config,
            static_root,
        })
    }
}
