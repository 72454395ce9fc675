//! Sampling grid clipped to a leaf outline
//!
//! The grid is a derived view: it is recomputed from the polygon, the image
//! calibration and the grid size whenever any of them changes, and never stored.

use crate::error::ValidationError;
use crate::geometry::{calculate_cell_size, generate_grid_cells, GridCell, Point};
use serde::{Deserialize, Serialize};

pub const MIN_GRID_SIZE_MM: f64 = 0.1;
pub const MAX_GRID_SIZE_MM: f64 = 100.0;
pub const DEFAULT_GRID_SIZE_MM: f64 = 1.0;

/// Square millimetres per square centimetre
const MM2_PER_CM2: f64 = 100.0;

/// Accept grid sizes between 0.1 and 100 mm inclusive
pub fn validate_grid_size(grid_size_mm: f64) -> Result<f64, ValidationError> {
    if grid_size_mm.is_finite() && (MIN_GRID_SIZE_MM..=MAX_GRID_SIZE_MM).contains(&grid_size_mm) {
        Ok(grid_size_mm)
    } else {
        Err(ValidationError::InvalidGridSize {
            value: grid_size_mm,
            min: MIN_GRID_SIZE_MM,
            max: MAX_GRID_SIZE_MM,
        })
    }
}

/// Grid currently overlaid on the active polygon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridState {
    pub grid_size_mm: f64,
    pub cell_size_px: f64,
    pub cells: Vec<GridCell>,
    pub is_visible: bool,
}

impl Default for GridState {
    fn default() -> Self {
        Self::hidden(DEFAULT_GRID_SIZE_MM)
    }
}

impl GridState {
    /// Invisible grid with no cells
    pub fn hidden(grid_size_mm: f64) -> Self {
        Self { grid_size_mm, cell_size_px: 0.0, cells: Vec::new(), is_visible: false }
    }

    /// Compute the grid for a polygon.
    ///
    /// Open polygons and missing calibrations give a hidden grid.
    pub fn compute(vertices: &[Point], closed: bool, px_per_cm: f64, grid_size_mm: f64) -> Self {
        let cell_size_px = calculate_cell_size(px_per_cm, grid_size_mm);
        if !closed || vertices.len() < 3 || cell_size_px <= 0.0 {
            return Self { cell_size_px, ..Self::hidden(grid_size_mm) };
        }

        let cells = generate_grid_cells(vertices, cell_size_px);
        log::debug!(
            "grid regenerated: {} cells of {:.2}px ({} mm)",
            cells.len(),
            cell_size_px,
            grid_size_mm
        );
        Self { grid_size_mm, cell_size_px, cells, is_visible: true }
    }

    pub fn summary(&self) -> GridSummary {
        let rows = self.cells.iter().map(|c| c.row + 1).max().unwrap_or(0);
        let cols = self.cells.iter().map(|c| c.col + 1).max().unwrap_or(0);
        let cell_area_cm2 = (self.grid_size_mm * self.grid_size_mm) / MM2_PER_CM2;
        GridSummary {
            rows,
            cols,
            cell_count: self.cells.len(),
            grid_size_mm: self.grid_size_mm,
            cell_size_px: self.cell_size_px,
            covered_area_cm2: self.cells.len() as f64 * cell_area_cm2,
            is_visible: self.is_visible,
        }
    }
}

/// Counts reported for a grid
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridSummary {
    /// Rows spanned by included cells (highest row index + 1)
    pub rows: u32,
    /// Columns spanned by included cells (highest column index + 1)
    pub cols: u32,
    pub cell_count: usize,
    pub grid_size_mm: f64,
    pub cell_size_px: f64,
    /// Total area of the included cells in square centimetres
    pub covered_area_cm2: f64,
    pub is_visible: bool,
}
