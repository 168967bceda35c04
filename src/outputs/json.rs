//! JSON run reports.
//!
//! Reports are grouped by local date and named after the edition:
//! ```text
//! report_dir/
//! └── 2025-10-14/
//!     ├── morning.json
//!     ├── afternoon.json
//!     └── evening.json
//! ```
//! A later run in the same edition replaces the earlier report.

use crate::models::RunReport;
use std::io;
use std::path::PathBuf;
use tokio::fs;
use tracing::{error, info, instrument};

/// Write `report` to `{report_dir}/{local_date}/{edition}.json` and return
/// the path written.
#[instrument(level = "info", skip_all, fields(report_dir = %report_dir))]
pub async fn write_report(report: &RunReport, report_dir: &str) -> io::Result<PathBuf> {
    let json = serde_json::to_string_pretty(report)?;

    let dir = PathBuf::from(report_dir).join(&report.local_date);
    if let Err(e) = fs::create_dir_all(&dir).await {
        error!(dir = %dir.display(), error = %e, "Failed to create report dir");
        return Err(e);
    }

    let path = dir.join(format!("{}.json", report.edition));
    fs::write(&path, json).await?;
    info!(path = %path.display(), "Wrote run report");
    Ok(path)
}
