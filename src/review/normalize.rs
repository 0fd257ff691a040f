// src/review/normalize.rs
//! Grid normalization: turns any [`ExtractionPayload`] into a complete
//! rectangular [`ReviewGrid`] suitable for direct indexed rendering.

use bevy::log::{debug, warn};
use regex::Regex;
use std::sync::LazyLock;

use super::extraction::{ContainerNumber, ExtractionPayload, RawPosition};
use super::grid::{parse_confidence, GridCell, ReviewGrid, MAX_GRID_SIDE};
use std::collections::BTreeMap;

static ROW_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Row\s+row(\d+):").expect("row header pattern is valid"));
static POSITION_ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Position\s+(\d+):\s+([A-Za-z0-9\-]+)\s+\((\d+)%\)")
        .expect("position pattern is valid")
});

/// Single entry point for both response shapes.
pub fn normalize(payload: &ExtractionPayload) -> ReviewGrid {
    match payload {
        ExtractionPayload::Structured {
            rows,
            columns,
            cells,
        } => normalize_structured(*rows, *columns, cells),
        ExtractionPayload::LegacyText { text, containers } => normalize_legacy(text, containers),
    }
}

fn within_bounds(row: u32, position: u32) -> bool {
    (1..=MAX_GRID_SIDE).contains(&row) && (1..=MAX_GRID_SIDE).contains(&position)
}

fn normalize_structured(
    declared_rows: u32,
    declared_columns: u32,
    cells: &BTreeMap<u32, BTreeMap<u32, RawPosition>>,
) -> ReviewGrid {
    let mut placed: Vec<(u32, u32, &RawPosition)> = Vec::new();
    for (&row, positions) in cells {
        for (&position, raw) in positions {
            if !within_bounds(row, position) {
                warn!(
                    "Structured extraction: skipping '{}' at row {} position {} (grid side limit {})",
                    raw.number, row, position, MAX_GRID_SIDE
                );
                continue;
            }
            placed.push((row, position, raw));
        }
    }

    if declared_rows > MAX_GRID_SIDE || declared_columns > MAX_GRID_SIDE {
        warn!(
            "Structured extraction: declared grid {}x{} exceeds the side limit {}; clamping.",
            declared_rows, declared_columns, MAX_GRID_SIDE
        );
    }
    let observed_rows = placed.iter().map(|(row, _, _)| *row).max().unwrap_or(0);
    let observed_columns = placed.iter().map(|(_, position, _)| *position).max().unwrap_or(0);
    let rows = declared_rows.min(MAX_GRID_SIDE).max(observed_rows) as usize;
    let columns = declared_columns.min(MAX_GRID_SIDE).max(observed_columns) as usize;
    let mut grid = ReviewGrid::empty(rows, columns);

    for (row, position, raw) in placed {
        if raw.number.trim().is_empty() {
            continue;
        }
        grid.place(GridCell::extracted(
            row,
            position,
            raw.number.clone(),
            parse_confidence(&raw.confidence),
        ));
    }
    grid
}

#[derive(Debug, Clone, PartialEq)]
struct LegacyHit<'a> {
    row: u32,
    position: u32,
    container: &'a ContainerNumber,
}

fn normalize_legacy(text: &str, containers: &[ContainerNumber]) -> ReviewGrid {
    let hits = parse_legacy_positions(text, containers);

    if hits.is_empty() {
        return pack_containers(containers);
    }

    let rows = hits.iter().map(|h| h.row).max().unwrap_or(0) as usize;
    let columns = hits.iter().map(|h| h.position).max().unwrap_or(0) as usize;
    let mut grid = ReviewGrid::empty(rows, columns);
    for hit in hits {
        grid.place(GridCell::extracted(
            hit.row,
            hit.position,
            hit.container.number.clone(),
            hit.container.confidence,
        ));
    }
    grid
}

/// Scans `Row row<N>:` sections for `Position <P>: <serial> (<NN>%)` entries.
/// Entries whose serial is not in `containers` are dropped.
fn parse_legacy_positions<'a>(text: &str, containers: &'a [ContainerNumber]) -> Vec<LegacyHit<'a>> {
    let mut hits = Vec::new();
    let mut current_row: Option<u32> = None;

    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        if let Some(caps) = ROW_HEADER.captures(line) {
            current_row = caps[1].parse::<u32>().ok().filter(|&r| r > 0);
        }
        let Some(row) = current_row else {
            continue;
        };
        for caps in POSITION_ENTRY.captures_iter(line) {
            let Some(position) = caps[1].parse::<u32>().ok().filter(|&p| p > 0) else {
                continue;
            };
            let serial = &caps[2];
            if !within_bounds(row, position) {
                warn!(
                    "Legacy extraction: skipping '{}' at row {} position {} (grid side limit {})",
                    serial, row, position, MAX_GRID_SIDE
                );
                continue;
            }
            match containers.iter().find(|c| c.number == serial) {
                Some(container) => hits.push(LegacyHit {
                    row,
                    position,
                    container,
                }),
                None => {
                    debug!(
                        "Legacy extraction: dropping unresolved serial '{}' at row {} position {}",
                        serial,
                        row,
                        position
                    );
                }
            }
        }
    }
    hits
}

/// Row-major packing into a near-square grid when no layout is known.
fn pack_containers(containers: &[ContainerNumber]) -> ReviewGrid {
    let n = containers.len();
    if n == 0 {
        return ReviewGrid::default();
    }
    let rows = (n as f64).sqrt().ceil() as usize;
    let columns = n.div_ceil(rows);
    let mut grid = ReviewGrid::empty(rows, columns);
    for (index, container) in containers.iter().enumerate() {
        let row = (index / columns) as u32 + 1;
        let position = (index % columns) as u32 + 1;
        grid.place(GridCell::extracted(
            row,
            position,
            container.number.clone(),
            container.confidence,
        ));
    }
    grid
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(number: &str, confidence: &str) -> RawPosition {
        RawPosition {
            number: number.to_string(),
            confidence: confidence.to_string(),
        }
    }

    fn container(number: &str, confidence: f32) -> ContainerNumber {
        ContainerNumber {
            number: number.to_string(),
            confidence,
        }
    }

    fn structured(rows: u32, columns: u32, entries: &[(u32, u32, &str, &str)]) -> ExtractionPayload {
        let mut cells: BTreeMap<u32, BTreeMap<u32, RawPosition>> = BTreeMap::new();
        for &(r, p, n, c) in entries {
            cells.entry(r).or_default().insert(p, raw(n, c));
        }
        ExtractionPayload::Structured {
            rows,
            columns,
            cells,
        }
    }

    #[test]
    fn structured_result_fills_every_slot() {
        let payload = structured(3, 4, &[(2, 3, "X", "88%"), (1, 1, "Y", "91%")]);
        let grid = normalize(&payload);
        assert_eq!((grid.rows(), grid.columns()), (3, 4));
        assert_eq!(grid.indexed_cells().count(), 12);
        for (idx, cell) in grid.indexed_cells() {
            assert_eq!(cell.row as usize, idx.row + 1);
            assert_eq!(cell.position as usize, idx.col + 1);
        }
        assert_eq!(grid.get(2, 3).unwrap().confidence, 88.0);
        assert!(grid.get(3, 4).unwrap().serial_number.is_empty());
    }

    #[test]
    fn structured_sparse_entries_widen_the_grid() {
        let payload = structured(1, 1, &[(2, 5, "Z", "99%")]);
        let grid = normalize(&payload);
        assert_eq!((grid.rows(), grid.columns()), (2, 5));
        assert_eq!(grid.get(2, 5).unwrap().serial_number, "Z");
    }

    #[test]
    fn oversized_positions_are_skipped_not_allocated() {
        let payload = structured(
            1,
            2,
            &[(1, 3_000_000_000, "HUGE", "90%"), (u32::MAX, 1, "TALL", "90%"), (1, 2, "OK", "90%")],
        );
        let grid = normalize(&payload);
        assert_eq!((grid.rows(), grid.columns()), (1, 2));
        assert_eq!(grid.get(1, 2).unwrap().serial_number, "OK");
        assert_eq!(grid.filled_count(), 1);
    }

    #[test]
    fn declared_dimensions_are_clamped() {
        let grid = normalize(&structured(1, 4_000_000_000, &[(1, 1, "A", "90%")]));
        assert_eq!(grid.rows(), 1);
        assert_eq!(grid.columns(), MAX_GRID_SIDE as usize);

        let grid = normalize(&structured(u32::MAX, u32::MAX, &[]));
        assert_eq!((grid.rows(), grid.columns()), (MAX_GRID_SIDE as usize, MAX_GRID_SIDE as usize));
    }

    #[test]
    fn oversized_legacy_positions_are_skipped() {
        let text = "Row row1: Position 1: AB-1 (95%)\nRow row4000000000:\n  Position 1: AB-2 (80%)\nRow row2:\n  Position 9999999: AB-3 (60%)";
        let known = vec![container("AB-1", 95.0), container("AB-2", 80.0), container("AB-3", 60.0)];
        let grid = normalize(&ExtractionPayload::LegacyText {
            text: text.to_string(),
            containers: known,
        });
        assert_eq!((grid.rows(), grid.columns()), (1, 1));
        assert_eq!(grid.get(1, 1).unwrap().serial_number, "AB-1");
    }

    #[test]
    fn malformed_confidence_degrades_to_zero() {
        let grid = normalize(&structured(1, 2, &[(1, 1, "A", "abc"), (1, 2, "B", "")]));
        assert_eq!(grid.get(1, 1).unwrap().confidence, 0.0);
        assert_eq!(grid.get(1, 2).unwrap().confidence, 0.0);
        assert!(grid.get(1, 1).unwrap().is_original);
    }

    #[test]
    fn legacy_text_resolves_known_containers() {
        let text = "Detected layout\nRow row1: Position 1: AB-1 (95%)\n  Position 2: AB-2 (80%)\nRow row2:\n  Position 2: ZZ-9 (70%)\n  Position 1: AB-3 (60%)";
        let known = vec![
            container("AB-1", 95.0),
            container("AB-2", 80.0),
            container("AB-3", 60.0),
        ];
        let grid = normalize(&ExtractionPayload::LegacyText {
            text: text.to_string(),
            containers: known,
        });
        assert_eq!((grid.rows(), grid.columns()), (2, 2));
        assert_eq!(grid.get(1, 1).unwrap().serial_number, "AB-1");
        assert_eq!(grid.get(1, 2).unwrap().confidence, 80.0);
        assert_eq!(grid.get(2, 1).unwrap().serial_number, "AB-3");
        // ZZ-9 is not a known container and is dropped.
        assert!(grid.get(2, 2).unwrap().serial_number.is_empty());
    }

    #[test]
    fn unparseable_text_packs_containers_near_square() {
        let known: Vec<_> = (1..=5).map(|i| container(&format!("S{}", i), 90.0)).collect();
        let grid = normalize(&ExtractionPayload::LegacyText {
            text: "no layout here".into(),
            containers: known,
        });
        // ceil(sqrt(5)) = 3 rows, ceil(5 / 3) = 2 columns
        assert_eq!((grid.rows(), grid.columns()), (3, 2));
        assert_eq!(grid.get(1, 2).unwrap().serial_number, "S2");
        assert_eq!(grid.get(3, 1).unwrap().serial_number, "S5");
        assert!(grid.get(3, 2).unwrap().serial_number.is_empty());
    }

    #[test]
    fn nothing_at_all_yields_empty_grid() {
        let grid = normalize(&ExtractionPayload::LegacyText {
            text: String::new(),
            containers: Vec::new(),
        });
        assert!(grid.is_empty());
    }
}
