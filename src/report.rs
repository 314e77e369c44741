//! JSON run reports.
//!
//! Reports are grouped by local date:
//! ```text
//! report_dir/
//! └── 2025-05-06/
//!     ├── 081502-technology.json
//!     └── 121010-trending.json
//! ```

use crate::models::RunReport;
use crate::utils::{ensure_writable_dir, slugify};
use chrono::{DateTime, Local};
use std::error::Error;
use tokio::fs;
use tracing::{error, info, instrument};

/// Path of the report for a run labelled `label` that finished at `at`.
pub fn report_path(report_dir: &str, label: &str, at: DateTime<Local>) -> String {
    let slug = slugify(label, 40);
    let slug = if slug.is_empty() { "run".to_string() } else { slug };
    format!(
        "{}/{}/{}-{}.json",
        report_dir.trim_end_matches('/'),
        at.format("%Y-%m-%d"),
        at.format("%H%M%S"),
        slug
    )
}

/// Serialize a [`RunReport`] under `{report_dir}/{date}/{HHMMSS}-{label}.json`.
///
/// Returns the written path.
#[instrument(level = "info", skip_all, fields(report_dir = %report_dir, label = %report.label))]
pub async fn write_report(report: &RunReport, report_dir: &str) -> Result<String, Box<dyn Error>> {
    let json = serde_json::to_string_pretty(report)?;

    let now = Local::now();
    let path = report_path(report_dir, &report.label, now);
    let dir = format!("{}/{}", report_dir.trim_end_matches('/'), now.format("%Y-%m-%d"));

    if let Err(e) = ensure_writable_dir(&dir).await {
        error!(%dir, error = %e, "report directory is not writable");
        return Err(e);
    }

    fs::write(&path, json).await?;
    info!(
        path = %path,
        posts = report.total_published(),
        "wrote run report"
    );
    Ok(path)
}
