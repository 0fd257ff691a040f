// src/cli/process.rs
use serde::Serialize;
use std::fmt::Write as _;

use super::{CliError, ProcessArgs};
use crate::review::client::BackendClient;
use crate::review::duplicates::{detect, DuplicateGroups};
use crate::review::error::ReviewError;
use crate::review::files::{display_path, load_uploads};
use crate::review::grid::{CellIndex, ReviewGrid};
use crate::review::queue::{run_sequentially, ImageQueue, ProcessedImage};
use crate::review::verification::{execute_commit, FinishOutcome, VerificationCoordinator};
use crate::settings::{credentials, ConsoleSettings};

const CELL_WIDTH: usize = 14;

#[derive(Serialize)]
struct DuplicateReport {
    serial_number: String,
    ordinal: usize,
    count: usize,
}

#[derive(Serialize)]
struct ImageReport<'a> {
    file_name: &'a str,
    status: &'static str,
    attempts: u32,
    error: Option<&'a str>,
    grid: Option<&'a ReviewGrid>,
    duplicates: Vec<DuplicateReport>,
}

pub fn run(args: ProcessArgs) -> Result<bool, CliError> {
    let mut settings = ConsoleSettings::load().unwrap_or_else(|e| {
        eprintln!("Warning: {} (using defaults)", e);
        ConsoleSettings::default()
    });
    if let Some(url) = args.api_url.as_deref() {
        settings.api_base_url = url.trim().to_string();
    }

    let token = credentials::load_token()?.ok_or(ReviewError::MissingToken)?;
    let client = BackendClient::new(&settings.api_base_url, token, settings.request_timeout())?;

    let (uploads, failures) = load_uploads(&args.files);
    for (path, err) in &failures {
        eprintln!("Skipping {}: {}", display_path(path), err);
    }
    if uploads.is_empty() {
        return Err(CliError::NoImages);
    }
    if !args.json {
        println!(
            "Processing {} image(s) for project '{}' via {}\n",
            uploads.len(),
            args.project,
            client.base_url()
        );
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let mut queue = ImageQueue::default();
    queue.enqueue_all(uploads.clone());
    let summary = runtime.block_on(run_sequentially(
        &client,
        &args.project,
        &uploads,
        settings.inter_image_pause(),
        &mut queue,
    ));

    // Reports are printed before verification removes images from the queue.
    let snapshot = queue.snapshot();
    if args.json {
        let reports: Vec<ImageReport> = snapshot.iter().map(image_report).collect();
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        for image in snapshot.iter() {
            print!("{}", render_image(image));
        }
        println!(
            "Done: {} completed, {} failed.",
            summary.completed, summary.failed
        );
    }

    let mut all_ok = summary.failed == 0;
    if args.verify {
        let commit_failures = runtime.block_on(verify_completed(&client, &args.project, &mut queue));
        all_ok &= commit_failures == 0;
    }
    Ok(all_ok)
}

/// Commits every completed image as-is. Returns the number of failures.
async fn verify_completed(client: &BackendClient, project_id: &str, queue: &mut ImageQueue) -> usize {
    let mut coordinator = VerificationCoordinator::default();
    let mut failures = 0;
    for id in queue.carousel_ids() {
        let Some(image) = queue.get(id) else {
            continue;
        };
        let name = image.display_name().to_string();
        let plan = match coordinator.begin_commit(image, project_id) {
            Ok(Some(plan)) => plan,
            Ok(None) => continue,
            Err(e) => {
                eprintln!("Cannot verify {}: {}", name, e);
                failures += 1;
                continue;
            }
        };
        let result = execute_commit(client, &plan).await;
        if let Err(e) = &result {
            eprintln!("Verification of {} failed: {}", name, e);
        }
        match coordinator.finish_commit(queue, id, &result) {
            FinishOutcome::Removed { .. } => println!("Verified {}", name),
            FinishOutcome::Failed | FinishOutcome::Unknown => failures += 1,
        }
    }
    failures
}

fn image_report(image: &ProcessedImage) -> ImageReport<'_> {
    let duplicates = image.grid.as_deref().map(detect).unwrap_or_default();
    ImageReport {
        file_name: image.display_name(),
        status: image.status.label(),
        attempts: image.attempts,
        error: image.error_message.as_deref(),
        grid: image.grid.as_deref(),
        duplicates: duplicates
            .groups()
            .iter()
            .map(|group| DuplicateReport {
                serial_number: group.serial_number.clone(),
                ordinal: group.ordinal,
                count: group.occurrences.len(),
            })
            .collect(),
    }
}

fn render_image(image: &ProcessedImage) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "== {} [{}] (attempt {})",
        image.display_name(),
        image.status.label(),
        image.attempts
    );
    if let Some(message) = &image.error_message {
        let _ = writeln!(out, "   error: {}", message);
    }
    if let Some(grid) = image.grid.as_deref() {
        let duplicates = detect(grid);
        let _ = writeln!(out, "   {}", grid.describe());
        out.push_str(&render_grid(grid, &duplicates));
        out.push_str(&render_duplicate_legend(&duplicates));
    }
    out.push('\n');
    out
}

/// Text table; duplicated cells are suffixed with `*<ordinal>`.
fn render_grid(grid: &ReviewGrid, duplicates: &DuplicateGroups) -> String {
    let mut out = String::new();
    let _ = write!(out, "{:<5}", "");
    for position in 1..=grid.columns() {
        let _ = write!(out, "{:<width$}", format!("P{}", position), width = CELL_WIDTH);
    }
    out.push('\n');
    for (r, cells) in grid.row_slices().enumerate() {
        let _ = write!(out, "{:<5}", format!("R{}", r + 1));
        for (c, cell) in cells.iter().enumerate() {
            let mut text = if cell.is_empty() {
                "-".to_string()
            } else {
                cell.serial_number.trim().to_string()
            };
            if let Some(group) = duplicates.group_for(CellIndex::new(r, c)) {
                let _ = write!(text, "*{}", group.ordinal);
            }
            let _ = write!(out, "{:<width$}", text, width = CELL_WIDTH);
        }
        out.push('\n');
    }
    out
}

fn render_duplicate_legend(duplicates: &DuplicateGroups) -> String {
    if duplicates.is_empty() {
        return String::new();
    }
    let mut out = String::from("   duplicates:");
    for group in duplicates.groups() {
        let _ = write!(
            out,
            " *{} {} (x{})",
            group.ordinal,
            group.serial_number,
            group.occurrences.len()
        );
    }
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::test_support::completed_queue;

    #[test]
    fn grid_text_marks_duplicates() {
        let (queue, ids) = completed_queue(&["a.png"]);
        let grid = queue.get(ids[0]).and_then(|img| img.grid.clone()).unwrap();
        let duplicates = detect(&grid);
        let text = render_grid(&grid, &duplicates);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("P1") && lines[0].contains("P2"));
        assert!(lines[1].starts_with("R1"));
        assert!(lines[1].contains("S1*1"));
        assert!(lines[1].contains("S2"));
        assert!(!lines[1].contains("S2*"));
        assert!(lines[2].contains("S1*1"));
        assert_eq!(render_duplicate_legend(&duplicates), "   duplicates: *1 S1 (x2)\n");
    }

    #[test]
    fn json_report_lists_duplicates() {
        let (queue, ids) = completed_queue(&["a.png"]);
        let image = queue.get(ids[0]).unwrap();
        let report = image_report(image);
        assert_eq!(report.status, "completed");
        assert_eq!(report.duplicates.len(), 1);
        assert_eq!(report.duplicates[0].serial_number, "S1");
        assert_eq!(report.duplicates[0].count, 2);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["grid"]["cells"][0][1]["serial_number"], "S2");
    }
}
