//! Persistence adapter
//!
//! The editor relays every committed mutation through a [`PersistenceAdapter`].
//! Implementations live outside the core (the host client in `herbivory-host`)
//! plus the in-memory adapter below, which also backs the unit tests.

use crate::geometry::Point;
use crate::scale_tool::ScaleLine;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Error types for persistence operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PersistenceError {
    #[error("No database open")]
    NotOpen,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

/// Result type for persistence operations
pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Persisted calibration for one image
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaleData {
    pub px_per_cm: f64,
    pub line_start_x: f64,
    pub line_start_y: f64,
    pub line_end_x: f64,
    pub line_end_y: f64,
    pub cm_value: f64,
}

impl ScaleData {
    pub fn from_line(line: &ScaleLine, px_per_cm: f64, cm_value: f64) -> Self {
        Self {
            px_per_cm,
            line_start_x: line.start.x,
            line_start_y: line.start.y,
            line_end_x: line.end.x,
            line_end_y: line.end.y,
            cm_value,
        }
    }

    pub fn line_start(&self) -> Point {
        Point::new(self.line_start_x, self.line_start_y)
    }

    pub fn line_end(&self) -> Point {
        Point::new(self.line_end_x, self.line_end_y)
    }
}

/// Stored polygon outline for one leaf
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolygonRecord {
    pub id: i64,
    pub image_id: i64,
    pub leaf_id: String,
    pub vertices: Vec<Point>,
}

/// Storage operations the editor needs, keyed by image id
pub trait PersistenceAdapter {
    fn get_scale(&mut self, image_id: i64) -> PersistenceResult<Option<ScaleData>>;

    fn save_scale(&mut self, image_id: i64, scale: &ScaleData) -> PersistenceResult<()>;

    fn clear_scale(&mut self, image_id: i64) -> PersistenceResult<()>;

    fn get_polygons(&mut self, image_id: i64) -> PersistenceResult<Vec<PolygonRecord>>;

    /// Insert or replace the polygon for `(image_id, leaf_id)`, returning its id
    fn upsert_polygon(
        &mut self,
        image_id: i64,
        leaf_id: &str,
        vertices: &[Point],
    ) -> PersistenceResult<i64>;

    /// Delete a polygon and every cell classified inside it. Unknown ids are a no-op.
    fn delete_polygon(&mut self, polygon_id: i64) -> PersistenceResult<()>;
}

macro_rules! forward_adapter {
    ($($ty:ty),*) => {$(
        impl<A: PersistenceAdapter + ?Sized> PersistenceAdapter for $ty {
            fn get_scale(&mut self, image_id: i64) -> PersistenceResult<Option<ScaleData>> {
                (**self).get_scale(image_id)
            }

            fn save_scale(&mut self, image_id: i64, scale: &ScaleData) -> PersistenceResult<()> {
                (**self).save_scale(image_id, scale)
            }

            fn clear_scale(&mut self, image_id: i64) -> PersistenceResult<()> {
                (**self).clear_scale(image_id)
            }

            fn get_polygons(&mut self, image_id: i64) -> PersistenceResult<Vec<PolygonRecord>> {
                (**self).get_polygons(image_id)
            }

            fn upsert_polygon(
                &mut self,
                image_id: i64,
                leaf_id: &str,
                vertices: &[Point],
            ) -> PersistenceResult<i64> {
                (**self).upsert_polygon(image_id, leaf_id, vertices)
            }

            fn delete_polygon(&mut self, polygon_id: i64) -> PersistenceResult<()> {
                (**self).delete_polygon(polygon_id)
            }
        }
    )*};
}

forward_adapter!(Box<A>, &mut A);

/// Adapter keeping everything in memory
///
/// Can be told to fail writes, which lets callers exercise their error paths.
#[derive(Debug, Default, Clone)]
pub struct InMemoryAdapter {
    scales: HashMap<i64, ScaleData>,
    polygons: Vec<PolygonRecord>,
    /// polygon id -> classified cell count, stands in for the cells table
    cells: HashMap<i64, usize>,
    next_id: i64,
    fail_writes: bool,
    fail_reads: bool,
}

impl InMemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write return a storage error
    pub fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    /// Make every read return a storage error
    pub fn set_fail_reads(&mut self, fail: bool) {
        self.fail_reads = fail;
    }

    /// All stored polygons, across images
    pub fn polygons(&self) -> &[PolygonRecord] {
        &self.polygons
    }

    pub fn scale(&self, image_id: i64) -> Option<&ScaleData> {
        self.scales.get(&image_id)
    }

    /// Record `count` classified cells for a polygon
    pub fn add_cells(&mut self, polygon_id: i64, count: usize) {
        *self.cells.entry(polygon_id).or_default() += count;
    }

    pub fn cell_count(&self, polygon_id: i64) -> usize {
        self.cells.get(&polygon_id).copied().unwrap_or(0)
    }

    fn check_write(&self) -> PersistenceResult<()> {
        if self.fail_writes {
            return Err(PersistenceError::Storage("write rejected".to_string()));
        }
        Ok(())
    }

    fn check_read(&self) -> PersistenceResult<()> {
        if self.fail_reads {
            return Err(PersistenceError::Storage("read rejected".to_string()));
        }
        Ok(())
    }
}

impl PersistenceAdapter for InMemoryAdapter {
    fn get_scale(&mut self, image_id: i64) -> PersistenceResult<Option<ScaleData>> {
        self.check_read()?;
        Ok(self.scales.get(&image_id).copied())
    }

    fn save_scale(&mut self, image_id: i64, scale: &ScaleData) -> PersistenceResult<()> {
        self.check_write()?;
        self.scales.insert(image_id, *scale);
        Ok(())
    }

    fn clear_scale(&mut self, image_id: i64) -> PersistenceResult<()> {
        self.check_write()?;
        self.scales.remove(&image_id);
        Ok(())
    }

    fn get_polygons(&mut self, image_id: i64) -> PersistenceResult<Vec<PolygonRecord>> {
        self.check_read()?;
        Ok(self
            .polygons
            .iter()
            .filter(|p| p.image_id == image_id)
            .cloned()
            .collect())
    }

    fn upsert_polygon(
        &mut self,
        image_id: i64,
        leaf_id: &str,
        vertices: &[Point],
    ) -> PersistenceResult<i64> {
        self.check_write()?;
        if let Some(existing) = self
            .polygons
            .iter_mut()
            .find(|p| p.image_id == image_id && p.leaf_id == leaf_id)
        {
            existing.vertices = vertices.to_vec();
            return Ok(existing.id);
        }

        self.next_id += 1;
        self.polygons.push(PolygonRecord {
            id: self.next_id,
            image_id,
            leaf_id: leaf_id.to_string(),
            vertices: vertices.to_vec(),
        });
        Ok(self.next_id)
    }

    fn delete_polygon(&mut self, polygon_id: i64) -> PersistenceResult<()> {
        self.check_write()?;
        self.polygons.retain(|p| p.id != polygon_id);
        self.cells.remove(&polygon_id);
        Ok(())
    }
}
