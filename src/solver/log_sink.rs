use std::fs::{self, File};
use std::path::Path;
use std::sync::Mutex;

use tracing::{Level, warn};

/// Run `f` with every `tracing` event on this thread written to `log_file`.
///
/// The caller's dispatcher is restored when `f` returns or unwinds. Without a
/// path, or when the file cannot be created, `f` runs under the caller's
/// dispatcher unchanged.
pub fn with_log_sink<T>(log_file: Option<&Path>, f: impl FnOnce() -> T) -> T {
    let Some(path) = log_file else {
        return f();
    };
    let file = match open_sink(path) {
        Ok(file) => file,
        Err(err) => {
            warn!(
                "[splitsail:solver] cannot open solver log {}: {err}; logging inline",
                path.display()
            );
            return f();
        }
    };
    let subscriber = tracing_subscriber::fmt()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false)
        .with_max_level(Level::DEBUG)
        .finish();
    tracing::subscriber::with_default(subscriber, f)
}

fn open_sink(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    File::create(path)
}
