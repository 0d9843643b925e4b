//! Terminal rendering of the dashboard view-model

use std::fmt::Write;

use crate::sync::AddHostsReport;
use crate::upload::UploadEvent;
use crate::view::{DashboardView, HostRow, JobRow, PatchRow, Statistics};

pub const MSG_PRECHECKS_STARTED: &str = "Pre-checks initiated";
pub const MSG_PHASE1_STARTED: &str = "Phase 1 initiated";
pub const MSG_PHASE2_STARTED: &str = "Phase 2 initiated";
pub const MSG_HOST_REMOVED: &str = "Host removed successfully";
pub const MSG_HOST_REFRESHED: &str = "Host refresh requested";
pub const MSG_PATCH_UPLOADED: &str = "Patch uploaded successfully";
pub const MSG_PATCH_DELETED: &str = "Patch deleted successfully";
pub const MSG_SETTINGS_SAVED: &str = "Settings saved successfully";
pub const MSG_CANCELLED: &str = "Cancelled";

fn line(cells: &[&str], widths: &[usize]) -> String {
    cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| {
            let pad = width.saturating_sub(cell.chars().count());
            format!("{}{}", cell, " ".repeat(pad))
        })
        .collect::<Vec<_>>()
        .join("  ")
        .trim_end()
        .to_string()
}

/// Left-aligned columns sized to their widest cell
fn table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    let _ = writeln!(out, "{}", line(headers, &widths));
    let _ = writeln!(
        out,
        "{}",
        widths
            .iter()
            .map(|w| "─".repeat(*w))
            .collect::<Vec<_>>()
            .join("  ")
    );
    for row in rows {
        let cells: Vec<&str> = row.iter().map(String::as_str).collect();
        let _ = writeln!(out, "{}", line(&cells, &widths));
    }
    out
}

pub fn statistics(stats: &Statistics) -> String {
    format!(
        "📊 Total: {}   Pre-check passed: {}   Phase 1 complete: {}   Fully patched: {}",
        stats.total, stats.precheck_passed, stats.phase1_completed, stats.fully_patched
    )
}

pub fn hosts(rows: &[HostRow]) -> String {
    if rows.is_empty() {
        return "No hosts registered.\n".to_string();
    }
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            vec![
                if row.selected { "[x]" } else { "[ ]" }.to_string(),
                row.ip_address.clone(),
                row.hostname.clone(),
                row.current_build.clone(),
                row.target_build.clone(),
                if row.failed {
                    format!("❌ {}", row.status)
                } else {
                    row.status.clone()
                },
                row.ssh.to_string(),
                row.last_checked.clone(),
            ]
        })
        .collect();
    table(
        &[
            "", "IP", "HOSTNAME", "CURRENT", "TARGET", "STATUS", "SSH", "LAST CHECKED",
        ],
        &cells,
    )
}

pub fn jobs(rows: &[JobRow]) -> String {
    if rows.is_empty() {
        return "No jobs.\n".to_string();
    }
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            vec![
                row.host_ip.clone(),
                row.job_type.clone(),
                row.status.clone(),
                row.started.clone(),
                row.completed.clone(),
                row.error.clone(),
            ]
        })
        .collect();
    table(
        &["HOST", "TYPE", "STATUS", "STARTED", "COMPLETED", "ERROR"],
        &cells,
    )
}

pub fn patches(rows: &[PatchRow]) -> String {
    if rows.is_empty() {
        return "No patches uploaded.\n".to_string();
    }
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| vec![row.filename.clone(), row.size.clone(), row.uploaded.clone()])
        .collect();
    table(&["FILENAME", "SIZE", "UPLOADED"], &cells)
}

/// Full dashboard screen
pub fn dashboard(view: &DashboardView) -> String {
    let mut out = String::new();
    match &view.user {
        Some(user) => {
            let _ = writeln!(out, "🔓 Logged in as {}", user);
        }
        None => {
            let _ = writeln!(out, "🔒 Read-only (run `esxi-dash login` for admin commands)");
        }
    }
    let _ = writeln!(out, "{}", statistics(&view.statistics));
    out.push('\n');

    if !view.running.is_empty() {
        let _ = writeln!(out, "⏳ RUNNING JOBS");
        for card in &view.running {
            let _ = writeln!(out, "   {}  (started {})", card.title, card.started);
        }
        out.push('\n');
    }

    let _ = writeln!(out, "🖥️  HOSTS");
    out.push_str(&hosts(&view.hosts));
    out.push('\n');

    let _ = writeln!(out, "📜 JOBS");
    out.push_str(&jobs(&view.jobs));

    if view.affordances.patch_upload {
        out.push('\n');
        let _ = writeln!(out, "📦 PATCHES");
        out.push_str(&patches(&view.patches));
    }
    out
}

pub fn add_hosts_report(report: &AddHostsReport) -> String {
    format!("✅ {}", report.summary())
}

/// One line per upload event
pub fn upload_event(event: &UploadEvent) -> String {
    match event {
        UploadEvent::Started {
            filename,
            total_bytes,
        } => format!("📤 Uploading {} ({} bytes)", filename, total_bytes),
        UploadEvent::Progress(percent) => {
            let filled = usize::from(*percent) / 5;
            format!(
                "   [{}{}] {:>3}%",
                "#".repeat(filled),
                " ".repeat(20 - filled),
                percent
            )
        }
        UploadEvent::Completed { .. } => format!("✅ {}", MSG_PATCH_UPLOADED),
        UploadEvent::Failed { filename, reason } => {
            format!("❌ Upload of {} failed: {}", filename, reason)
        }
    }
}

pub fn success(message: &str) -> String {
    format!("✅ {}", message)
}

pub fn failure(message: &str) -> String {
    format!("❌ {}", message)
}
