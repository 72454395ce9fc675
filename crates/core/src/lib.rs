//! Herbivory Counter Core Library
//!
//! Geometry and editing state for annotating leaf-damage images: scale
//! calibration, leaf outline polygons and the sampling grid clipped to them.

pub mod config;
pub mod error;
pub mod geometry;
pub mod grid;
pub mod persistence;
pub mod polygon_tool;
pub mod scale_tool;
pub mod session;

pub use config::{ConfigError, EditorConfig};
pub use error::{ValidationError, ValidationResult};
pub use geometry::{
    bounding_box, calculate_cell_size, calculate_scale, distance, generate_grid_cells,
    is_near, is_point_in_polygon, polygon_area, BoundingBox, GridCell, Point,
};
pub use grid::{validate_grid_size, GridState, GridSummary, DEFAULT_GRID_SIZE_MM};
pub use persistence::{
    InMemoryAdapter, PersistenceAdapter, PersistenceError, PersistenceResult, PolygonRecord,
    ScaleData,
};
pub use polygon_tool::{EditKey, PolygonEvent, PolygonSnapshot, PolygonTool};
pub use scale_tool::{CursorHint, Endpoint, ScaleEvent, ScaleLine, ScaleTool, ScaleValue};
pub use session::{EditorEvent, EditorSession, LeafSummary, Mode};
