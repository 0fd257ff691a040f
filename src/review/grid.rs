// src/review/grid.rs
//! Canonical container grid: one cell per (row, position), always rectangular.

use serde::Serialize;
use std::fmt;

/// Confidence assigned to values typed by the operator.
pub const USER_ASSERTED_CONFIDENCE: f32 = 100.0;

/// Largest row count or position accepted from an extraction result.
pub const MAX_GRID_SIDE: u32 = 256;

/// A single (row, position) slot. `row` and `position` are 1-based.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridCell {
    pub row: u32,
    pub position: u32,
    pub serial_number: String,
    /// 0..=100
    pub confidence: f32,
    /// `true` when the value came verbatim from the extraction result.
    pub is_original: bool,
}

impl GridCell {
    pub fn empty(row: u32, position: u32) -> Self {
        Self {
            row,
            position,
            serial_number: String::new(),
            confidence: 0.0,
            is_original: false,
        }
    }

    pub fn extracted(row: u32, position: u32, serial_number: String, confidence: f32) -> Self {
        Self {
            row,
            position,
            serial_number,
            confidence: clamp_confidence(confidence),
            is_original: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.serial_number.trim().is_empty()
    }

    pub fn level(&self) -> ConfidenceLevel {
        ConfidenceLevel::from_confidence(self.confidence)
    }
}

/// Zero-based index into a [`ReviewGrid`] (row index, column index).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CellIndex {
    pub row: usize,
    pub col: usize,
}

impl CellIndex {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

impl fmt::Display for CellIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.row, self.col)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

impl ConfidenceLevel {
    pub const HIGH_THRESHOLD: f32 = 90.0;
    pub const MEDIUM_THRESHOLD: f32 = 70.0;

    pub fn from_confidence(confidence: f32) -> Self {
        if confidence >= Self::HIGH_THRESHOLD {
            ConfidenceLevel::High
        } else if confidence >= Self::MEDIUM_THRESHOLD {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ConfidenceLevel::High => "High (≥90%)",
            ConfidenceLevel::Medium => "Medium (70-89%)",
            ConfidenceLevel::Low => "Low (<70%)",
        }
    }
}

/// Parses an extraction confidence such as `"87%"` into `87.0`.
/// Anything unparseable yields `0.0`.
pub fn parse_confidence(raw: &str) -> f32 {
    let trimmed = raw.trim();
    let number = trimmed.strip_suffix('%').unwrap_or(trimmed).trim();
    match number.parse::<f32>() {
        Ok(value) if value.is_finite() => clamp_confidence(value),
        _ => 0.0,
    }
}

fn clamp_confidence(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 100.0)
    } else {
        0.0
    }
}

/// Rectangular grid of cells. Every row has the same length.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ReviewGrid {
    cells: Vec<Vec<GridCell>>,
}

impl ReviewGrid {
    /// Builds a grid of empty cells.
    pub fn empty(rows: usize, columns: usize) -> Self {
        let cells = (0..rows)
            .map(|r| {
                (0..columns)
                    .map(|c| GridCell::empty(r as u32 + 1, c as u32 + 1))
                    .collect()
            })
            .collect();
        Self { cells }
    }

    pub fn rows(&self) -> usize {
        self.cells.len()
    }

    pub fn columns(&self) -> usize {
        self.cells.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.rows() == 0 || self.columns() == 0
    }

    pub fn row_slices(&self) -> impl Iterator<Item = &[GridCell]> {
        self.cells.iter().map(Vec::as_slice)
    }

    /// Cells in row-major order paired with their zero-based index.
    pub fn indexed_cells(&self) -> impl Iterator<Item = (CellIndex, &GridCell)> {
        self.cells.iter().enumerate().flat_map(|(r, row)| {
            row.iter()
                .enumerate()
                .map(move |(c, cell)| (CellIndex::new(r, c), cell))
        })
    }

    /// 1-based lookup.
    pub fn get(&self, row: u32, position: u32) -> Option<&GridCell> {
        let (r, c) = Self::zero_based(row, position)?;
        self.cells.get(r).and_then(|cells| cells.get(c))
    }

    pub fn contains(&self, row: u32, position: u32) -> bool {
        self.get(row, position).is_some()
    }

    /// Places an extracted value; out-of-range coordinates are ignored.
    pub(crate) fn place(&mut self, cell: GridCell) -> bool {
        let Some((r, c)) = Self::zero_based(cell.row, cell.position) else {
            return false;
        };
        match self.cells.get_mut(r).and_then(|cells| cells.get_mut(c)) {
            Some(slot) => {
                *slot = cell;
                true
            }
            None => false,
        }
    }

    /// Applies an operator edit. The cell becomes user-asserted.
    pub fn set_serial(&mut self, row: u32, position: u32, value: &str) -> bool {
        let Some((r, c)) = Self::zero_based(row, position) else {
            return false;
        };
        let Some(slot) = self.cells.get_mut(r).and_then(|cells| cells.get_mut(c)) else {
            return false;
        };
        slot.serial_number = value.to_string();
        slot.confidence = USER_ASSERTED_CONFIDENCE;
        slot.is_original = false;
        true
    }

    /// Number of cells holding a serial number.
    pub fn filled_count(&self) -> usize {
        self.indexed_cells().filter(|(_, cell)| !cell.is_empty()).count()
    }

    /// e.g. `3 rows × 5 columns (15 products)`
    pub fn describe(&self) -> String {
        format!(
            "{} rows × {} columns ({} products)",
            self.rows(),
            self.columns(),
            self.filled_count()
        )
    }

    fn zero_based(row: u32, position: u32) -> Option<(usize, usize)> {
        if row == 0 || position == 0 {
            return None;
        }
        Some((row as usize - 1, position as usize - 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_percent_confidence() {
        assert_eq!(parse_confidence("87%"), 87.0);
        assert_eq!(parse_confidence(" 95 % "), 95.0);
        assert_eq!(parse_confidence("42"), 42.0);
    }

    #[test]
    fn malformed_confidence_is_zero() {
        assert_eq!(parse_confidence("abc"), 0.0);
        assert_eq!(parse_confidence(""), 0.0);
        assert_eq!(parse_confidence("%"), 0.0);
        assert_eq!(parse_confidence("NaN%"), 0.0);
    }

    #[test]
    fn confidence_is_clamped() {
        assert_eq!(parse_confidence("140%"), 100.0);
        assert_eq!(parse_confidence("-5%"), 0.0);
    }

    #[test]
    fn confidence_levels() {
        assert_eq!(ConfidenceLevel::from_confidence(95.0), ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::from_confidence(90.0), ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::from_confidence(70.0), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::from_confidence(69.9), ConfidenceLevel::Low);
    }

    #[test]
    fn edit_marks_cell_user_asserted() {
        let mut grid = ReviewGrid::empty(2, 2);
        assert!(grid.place(GridCell::extracted(1, 2, "B".into(), 70.0)));
        assert!(grid.set_serial(1, 2, "B1"));
        let cell = grid.get(1, 2).unwrap();
        assert_eq!(cell.serial_number, "B1");
        assert!(!cell.is_original);
        assert_eq!(cell.confidence, USER_ASSERTED_CONFIDENCE);
        assert!(!grid.set_serial(3, 1, "X"));
        assert!(!grid.set_serial(0, 1, "X"));
    }

    #[test]
    fn empty_grid_is_rectangular() {
        let grid = ReviewGrid::empty(3, 4);
        assert_eq!(grid.rows(), 3);
        assert_eq!(grid.columns(), 4);
        assert!(grid.row_slices().all(|row| row.len() == 4));
        assert_eq!(grid.get(3, 4).map(|c| (c.row, c.position)), Some((3, 4)));
        assert_eq!(grid.describe(), "3 rows × 4 columns (0 products)");
    }
}
