use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::{debug, warn};

use crate::ports::diagnostics::DiagnosticsSink;

/// Writes each dump to `<dir>/<label>_<timestamp>.html`.
pub struct FileDiagnostics {
    directory: PathBuf,
}

impl FileDiagnostics {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn path_for(&self, label: &str) -> PathBuf {
        let stamp = Local::now().format("%Y%m%d_%H%M%S%.f");
        let label: String = label
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        self.directory.join(format!("{label}_{stamp}.html"))
    }
}

impl DiagnosticsSink for FileDiagnostics {
    fn dump(&self, label: &str, body: &str) {
        if let Err(e) = std::fs::create_dir_all(&self.directory) {
            warn!(dir = %self.directory.display(), error = %e, "Cannot create diagnostics directory");
            return;
        }
        let path = self.path_for(label);
        match std::fs::write(&path, body) {
            Ok(()) => debug!(path = %path.display(), bytes = body.len(), "Saved diagnostic page"),
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to save diagnostic page"),
        }
    }
}

/// Discards every dump.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDiagnostics;

impl DiagnosticsSink for NoopDiagnostics {
    fn dump(&self, _label: &str, _body: &str) {}
}
