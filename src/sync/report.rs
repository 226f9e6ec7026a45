use crate::sync::engine::SyncStatus;
use std::path::Path;

/// Prints one line per reconciled entry, honoring quiet/verbose. `Current`
/// entries only surface under verbose; warnings always go to stderr.
#[derive(Debug, Clone, Copy)]
pub struct Reporter {
    pub quiet: bool,
    pub verbose: bool,
}

impl Reporter {
    pub fn new(quiet: bool, verbose: bool) -> Self {
        Self { quiet, verbose }
    }

    pub fn status(&self, status: SyncStatus, path: &Path) {
        if self.quiet {
            return;
        }
        if status == SyncStatus::Current && !self.verbose {
            return;
        }
        println!("{} {}", status.letter(), path.display());
    }

    pub fn info(&self, text: impl AsRef<str>) {
        if self.verbose && !self.quiet {
            println!("{}", text.as_ref());
        }
    }

    pub fn warn(&self, text: impl AsRef<str>) {
        eprintln!("warning: {}", text.as_ref());
    }
}
