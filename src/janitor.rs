//! Cache eviction by age.
//!
//! The cache grows without bound as distinct derivatives are requested;
//! nothing in the serving path ever deletes. [`sweep`] is the counterpart:
//! run it periodically (cron, a timer, an operator command) to drop every
//! entry older than a configured age. Anything still wanted is regenerated
//! on its next request.
//!
//! The sweep takes the current time as an argument instead of reading the
//! clock itself, so age decisions are reproducible under test. Failures are
//! isolated per entry: one undeletable file is counted and skipped, never
//! aborting the rest of the sweep. Removal is also safe against in-flight
//! requests — a request that already read an entry's bytes keeps serving
//! them, and one that finds the file gone regenerates it.

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

/// What one sweep did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub removed: u32,
    pub kept: u32,
    pub failed: u32,
}

impl fmt::Display for SweepReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.failed > 0 {
            write!(
                f,
                "{} removed, {} kept, {} failed",
                self.removed, self.kept, self.failed
            )
        } else {
            write!(f, "{} removed, {} kept", self.removed, self.kept)
        }
    }
}

/// Remove every cache entry whose mtime is `max_age` or more before `now`.
///
/// A `max_age` of zero therefore clears the whole cache. Entries with an
/// mtime in the future count as age zero and are kept. Subdirectories are
/// not entries and are left alone. Only a failure to list the root itself
/// is an error; everything per-entry is counted in the report.
pub fn sweep(root: &Path, max_age: Duration, now: SystemTime) -> io::Result<SweepReport> {
    let mut report = SweepReport::default();

    for entry in fs::read_dir(root)? {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("sweep could not read a directory entry: {e}");
                report.failed += 1;
                continue;
            }
        };
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let modified = match entry.metadata().and_then(|m| m.modified()) {
            Ok(t) => t,
            Err(e) => {
                warn!("sweep could not stat {}: {e}", path.display());
                report.failed += 1;
                continue;
            }
        };
        let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
        if age < max_age {
            report.kept += 1;
            continue;
        }

        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("swept {} (age {}s)", path.display(), age.as_secs());
                report.removed += 1;
            }
            Err(e) => {
                warn!("sweep could not remove {}: {e}", path.display());
                report.failed += 1;
            }
        }
    }

    Ok(report)
}
