// src/review/duplicates.rs
// Duplicate serial detection for the displayed grid.
//
// Groups are ordered by where their serial first appears (row-major), and
// colors come from that order, so an edit that changes which serials repeat
// may shift colors between groups. Recompute from the current grid; never cache.

use std::collections::HashMap;

use super::grid::{CellIndex, ReviewGrid};

const GOLDEN_ANGLE_DEGREES: f32 = 137.5;
const SATURATION_STEPS: [f32; 3] = [0.70, 0.85, 0.55];
const LIGHTNESS_STEPS: [f32; 2] = [0.50, 0.38];

/// HSL color, hue in degrees, saturation/lightness in 0..=1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HighlightColor {
    pub hue: f32,
    pub saturation: f32,
    pub lightness: f32,
}

impl HighlightColor {
    pub fn for_group(group_index: usize) -> Self {
        Self {
            hue: (group_index as f32 * GOLDEN_ANGLE_DEGREES) % 360.0,
            saturation: SATURATION_STEPS[group_index % SATURATION_STEPS.len()],
            lightness: LIGHTNESS_STEPS[group_index % LIGHTNESS_STEPS.len()],
        }
    }

    /// Same hue, washed out for cell backgrounds.
    pub fn tint(self) -> Self {
        Self {
            lightness: 0.90,
            ..self
        }
    }

    pub fn to_rgb(self) -> [u8; 3] {
        let s = self.saturation.clamp(0.0, 1.0);
        let l = self.lightness.clamp(0.0, 1.0);
        let c = (1.0 - (2.0 * l - 1.0).abs()) * s;
        let h = self.hue.rem_euclid(360.0) / 60.0;
        let x = c * (1.0 - (h % 2.0 - 1.0).abs());
        let (r, g, b) = match h as u32 {
            0 => (c, x, 0.0),
            1 => (x, c, 0.0),
            2 => (0.0, c, x),
            3 => (0.0, x, c),
            4 => (x, 0.0, c),
            _ => (c, 0.0, x),
        };
        let m = l - c / 2.0;
        let channel = |v: f32| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;
        [channel(r), channel(g), channel(b)]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateGroup {
    pub serial_number: String,
    /// 1-based ordinal shown in the legend.
    pub ordinal: usize,
    pub occurrences: Vec<CellIndex>,
    pub color: HighlightColor,
}

#[derive(Debug, Clone, Default)]
pub struct DuplicateGroups {
    groups: Vec<DuplicateGroup>,
    by_cell: HashMap<CellIndex, usize>,
}

impl DuplicateGroups {
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn groups(&self) -> &[DuplicateGroup] {
        &self.groups
    }

    /// Occurrences for a serial (trimmed), if it is duplicated.
    pub fn get(&self, serial_number: &str) -> Option<&[CellIndex]> {
        let key = serial_number.trim();
        self.groups
            .iter()
            .find(|g| g.serial_number == key)
            .map(|g| g.occurrences.as_slice())
    }

    pub fn group_for(&self, index: CellIndex) -> Option<&DuplicateGroup> {
        self.by_cell.get(&index).and_then(|&g| self.groups.get(g))
    }

    /// Total number of cells taking part in any duplicate group.
    pub fn duplicated_cells(&self) -> usize {
        self.by_cell.len()
    }
}

pub fn detect(grid: &ReviewGrid) -> DuplicateGroups {
    let mut first_seen: Vec<&str> = Vec::new();
    let mut occurrences: HashMap<&str, Vec<CellIndex>> = HashMap::new();

    for (index, cell) in grid.indexed_cells() {
        let serial = cell.serial_number.trim();
        if serial.is_empty() {
            continue;
        }
        let entry = occurrences.entry(serial).or_default();
        if entry.is_empty() {
            first_seen.push(serial);
        }
        entry.push(index);
    }

    let mut result = DuplicateGroups::default();
    for serial in first_seen {
        let Some(cells) = occurrences.remove(serial) else {
            continue;
        };
        if cells.len() < 2 {
            continue;
        }
        let group_index = result.groups.len();
        for cell in &cells {
            result.by_cell.insert(*cell, group_index);
        }
        result.groups.push(DuplicateGroup {
            serial_number: serial.to_string(),
            ordinal: group_index + 1,
            occurrences: cells,
            color: HighlightColor::for_group(group_index),
        });
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::grid::GridCell;

    fn grid_of(rows: &[&[&str]]) -> ReviewGrid {
        let columns = rows.iter().map(|r| r.len()).max().unwrap_or(0);
        let mut grid = ReviewGrid::empty(rows.len(), columns);
        for (r, row) in rows.iter().enumerate() {
            for (c, serial) in row.iter().enumerate() {
                if !serial.is_empty() {
                    grid.place(GridCell::extracted(
                        r as u32 + 1,
                        c as u32 + 1,
                        serial.to_string(),
                        90.0,
                    ));
                }
            }
        }
        grid
    }

    #[test]
    fn single_repeat_forms_one_group() {
        let grid = grid_of(&[&["X", "Y"], &["Z", "X"]]);
        let groups = detect(&grid);
        assert_eq!(groups.len(), 1);
        assert_eq!(
            groups.get("X"),
            Some(&[CellIndex::new(0, 0), CellIndex::new(1, 1)][..])
        );
        assert_eq!(groups.duplicated_cells(), 2);
    }

    #[test]
    fn unique_serials_yield_nothing() {
        let groups = detect(&grid_of(&[&["A", "B"], &["C", ""]]));
        assert!(groups.is_empty());
    }

    #[test]
    fn blanks_and_whitespace_are_not_duplicates() {
        let groups = detect(&grid_of(&[&["", " "], &["  ", ""]]));
        assert!(groups.is_empty());
    }

    #[test]
    fn serials_compare_trimmed() {
        let mut grid = grid_of(&[&["Q", "R"]]);
        grid.set_serial(1, 2, " Q ");
        let groups = detect(&grid);
        assert_eq!(groups.get("Q").map(<[CellIndex]>::len), Some(2));
    }

    #[test]
    fn groups_follow_first_seen_order() {
        // "B" appears first, then "A".
        let groups = detect(&grid_of(&[&["B", "A", "B"], &["A", "C", "C"]]));
        let order: Vec<_> = groups.groups().iter().map(|g| g.serial_number.as_str()).collect();
        assert_eq!(order, vec!["B", "A", "C"]);
        assert_eq!(groups.groups()[1].ordinal, 2);
        assert_eq!(
            groups.group_for(CellIndex::new(1, 0)).map(|g| g.serial_number.as_str()),
            Some("A")
        );
    }

    #[test]
    fn palette_uses_golden_angle() {
        assert_eq!(HighlightColor::for_group(0).hue, 0.0);
        assert_eq!(HighlightColor::for_group(1).hue, 137.5);
        assert_eq!(HighlightColor::for_group(3).hue, 52.5);
        let a = HighlightColor::for_group(4);
        let b = HighlightColor::for_group(5);
        assert_ne!((a.saturation, a.lightness), (b.saturation, b.lightness));
    }

    #[test]
    fn hsl_primary_conversion() {
        let red = HighlightColor {
            hue: 0.0,
            saturation: 1.0,
            lightness: 0.5,
        };
        assert_eq!(red.to_rgb(), [255, 0, 0]);
        let blue = HighlightColor {
            hue: 240.0,
            saturation: 1.0,
            lightness: 0.5,
        };
        assert_eq!(blue.to_rgb(), [0, 0, 255]);
    }

    #[test]
    fn two_by_two_scenario() {
        use crate::review::grid::ConfidenceLevel;
        let mut grid = ReviewGrid::empty(2, 2);
        grid.place(GridCell::extracted(1, 1, "A".into(), 90.0));
        grid.place(GridCell::extracted(1, 2, "B".into(), 70.0));
        grid.place(GridCell::extracted(2, 1, "A".into(), 95.0));
        let groups = detect(&grid);
        assert_eq!(groups.len(), 1);
        assert_eq!(
            groups.get("A"),
            Some(&[CellIndex::new(0, 0), CellIndex::new(1, 0)][..])
        );
        assert_eq!(grid.get(1, 1).unwrap().level(), ConfidenceLevel::High);
        assert_eq!(grid.get(2, 1).unwrap().level(), ConfidenceLevel::High);
        assert_eq!(grid.get(1, 2).unwrap().level(), ConfidenceLevel::Medium);
    }
}
