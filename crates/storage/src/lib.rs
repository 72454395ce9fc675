//! Per-folder annotation store
//!
//! One `herbivory.json` file in the image folder holds four tables: images,
//! polygons, cells and app_state. Every mutation rewrites the file atomically.

mod records;
mod scan;

pub use records::{CellCategory, CellRecord, ImageRecord, PolygonRow};
pub use scan::{is_image_file, scan_images, IMAGE_EXTENSIONS};

use herbivory_core::{Point, ScaleData};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

const STORE_SCHEMA_VERSION: u32 = 1;

/// Name of the store file inside an image folder
pub const DATABASE_FILENAME: &str = "herbivory.json";

/// Table names, in creation order
pub const TABLES: [&str; 4] = ["images", "polygons", "cells", "app_state"];

const IMAGE_COLUMNS: &[&str] = &[
    "id",
    "filepath",
    "sheet_id",
    "scale_px_per_cm",
    "scale_line_start_x",
    "scale_line_start_y",
    "scale_line_end_x",
    "scale_line_end_y",
    "scale_cm_value",
    "completed",
    "created_at",
];
const POLYGON_COLUMNS: &[&str] = &["id", "image_id", "leaf_id", "vertices", "created_at"];
const CELL_COLUMNS: &[&str] =
    &["id", "polygon_id", "grid_row", "grid_col", "category", "researcher", "updated_at"];
const APP_STATE_COLUMNS: &[&str] = &["key", "value"];

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("store version {0} is newer than this build understands")]
    UnsupportedVersion(u32),
    #[error("{table} {id} not found")]
    NotFound { table: &'static str, id: i64 },
    #[error("UNIQUE constraint failed: {0}")]
    Unique(String),
    #[error("FOREIGN KEY constraint failed: {table} {id} does not exist")]
    ForeignKey { table: &'static str, id: i64 },
}

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Tables {
    images: Vec<ImageRecord>,
    polygons: Vec<PolygonRow>,
    cells: Vec<CellRecord>,
    app_state: BTreeMap<String, String>,
    /// Last id handed out per table
    sequences: BTreeMap<String, i64>,
}

impl Tables {
    fn next_id(&mut self, table: &str) -> i64 {
        let seq = self.sequences.entry(table.to_string()).or_insert(0);
        *seq += 1;
        *seq
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreEnvelope {
    version: u32,
    tables: Tables,
}

/// Open store for one image folder
#[derive(Debug)]
pub struct Database {
    path: PathBuf,
    tables: Tables,
}

impl Database {
    /// Open the store in `folder`, creating an empty one if none exists
    pub fn open(folder: impl AsRef<Path>) -> StorageResult<Self> {
        let path = Self::path_in(folder.as_ref());
        if path.exists() {
            let bytes = fs::read(&path)?;
            let envelope: StoreEnvelope = serde_json::from_slice(&bytes)?;
            if envelope.version > STORE_SCHEMA_VERSION {
                return Err(StorageError::UnsupportedVersion(envelope.version));
            }
            log::debug!("opened store {}", path.display());
            return Ok(Self { path, tables: envelope.tables });
        }

        fs::create_dir_all(folder.as_ref())?;
        let db = Self { path, tables: Tables::default() };
        db.save()?;
        log::info!("created store {}", db.path.display());
        Ok(db)
    }

    /// Whether `folder` already holds a store
    pub fn exists(folder: impl AsRef<Path>) -> bool {
        Self::path_in(folder.as_ref()).exists()
    }

    pub fn path_in(folder: &Path) -> PathBuf {
        folder.join(DATABASE_FILENAME)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn tables(&self) -> Vec<String> {
        TABLES.iter().map(|t| t.to_string()).collect()
    }

    pub fn table_columns(&self, table: &str) -> Option<&'static [&'static str]> {
        match table {
            "images" => Some(IMAGE_COLUMNS),
            "polygons" => Some(POLYGON_COLUMNS),
            "cells" => Some(CELL_COLUMNS),
            "app_state" => Some(APP_STATE_COLUMNS),
            _ => None,
        }
    }

    // ---- app state ----

    pub fn set_app_state(&mut self, key: &str, value: &str) -> StorageResult<()> {
        self.tables.app_state.insert(key.to_string(), value.to_string());
        self.save()
    }

    pub fn get_app_state(&self, key: &str) -> Option<String> {
        self.tables.app_state.get(key).cloned()
    }

    // ---- images ----

    pub fn insert_image(&mut self, filepath: &str) -> StorageResult<i64> {
        if self.get_image_by_path(filepath).is_some() {
            return Err(StorageError::Unique(format!("images.filepath {filepath}")));
        }
        let id = self.tables.next_id("images");
        self.tables.images.push(ImageRecord::new(id, filepath.to_string(), timestamp()));
        self.save()?;
        Ok(id)
    }

    pub fn get_image(&self, id: i64) -> Option<&ImageRecord> {
        self.tables.images.iter().find(|img| img.id == id)
    }

    pub fn get_image_by_path(&self, filepath: &str) -> Option<&ImageRecord> {
        self.tables.images.iter().find(|img| img.filepath == filepath)
    }

    pub fn all_images(&self) -> &[ImageRecord] {
        &self.tables.images
    }

    /// Register every image file in `folder` not yet known, returning how many were added
    pub fn register_folder_images(&mut self, folder: &Path) -> StorageResult<usize> {
        let mut added = 0;
        for path in scan_images(folder)? {
            let filepath = path.to_string_lossy();
            if self.get_image_by_path(&filepath).is_none() {
                self.insert_image(&filepath)?;
                added += 1;
            }
        }
        if added > 0 {
            log::info!("registered {} new images from {}", added, folder.display());
        }
        Ok(added)
    }

    pub fn image_scale(&self, id: i64) -> StorageResult<Option<ScaleData>> {
        Ok(self.image(id)?.scale())
    }

    pub fn update_image_scale(&mut self, id: i64, scale: &ScaleData) -> StorageResult<()> {
        self.image_mut(id)?.set_scale(Some(scale));
        self.save()
    }

    pub fn clear_image_scale(&mut self, id: i64) -> StorageResult<()> {
        self.image_mut(id)?.set_scale(None);
        self.save()
    }

    pub fn update_image_sheet_id(&mut self, id: i64, sheet_id: &str) -> StorageResult<()> {
        self.image_mut(id)?.sheet_id = Some(sheet_id.to_string());
        self.save()
    }

    pub fn mark_image_completed(&mut self, id: i64, completed: bool) -> StorageResult<()> {
        self.image_mut(id)?.completed = completed;
        self.save()
    }

    // ---- polygons ----

    pub fn insert_polygon(
        &mut self,
        image_id: i64,
        leaf_id: &str,
        vertices: &[Point],
    ) -> StorageResult<i64> {
        if self.get_image(image_id).is_none() {
            return Err(StorageError::ForeignKey { table: "images", id: image_id });
        }
        let id = self.tables.next_id("polygons");
        self.tables.polygons.push(PolygonRow {
            id,
            image_id,
            leaf_id: leaf_id.to_string(),
            vertices: vertices.to_vec(),
            created_at: timestamp(),
        });
        self.save()?;
        Ok(id)
    }

    pub fn get_polygon(&self, id: i64) -> Option<&PolygonRow> {
        self.tables.polygons.iter().find(|p| p.id == id)
    }

    pub fn polygons_for_image(&self, image_id: i64) -> Vec<PolygonRow> {
        self.tables.polygons.iter().filter(|p| p.image_id == image_id).cloned().collect()
    }

    pub fn update_polygon_vertices(&mut self, id: i64, vertices: &[Point]) -> StorageResult<()> {
        let polygon = self
            .tables
            .polygons
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(StorageError::NotFound { table: "polygons", id })?;
        polygon.vertices = vertices.to_vec();
        self.save()
    }

    /// Update the polygon stored for `(image_id, leaf_id)` or insert a new one
    pub fn upsert_polygon(
        &mut self,
        image_id: i64,
        leaf_id: &str,
        vertices: &[Point],
    ) -> StorageResult<i64> {
        let existing = self
            .tables
            .polygons
            .iter()
            .find(|p| p.image_id == image_id && p.leaf_id == leaf_id)
            .map(|p| p.id);

        match existing {
            Some(id) => {
                self.update_polygon_vertices(id, vertices)?;
                Ok(id)
            }
            None => self.insert_polygon(image_id, leaf_id, vertices),
        }
    }

    /// Delete a polygon and its cells. Returns false if it did not exist.
    pub fn delete_polygon(&mut self, id: i64) -> StorageResult<bool> {
        let before = self.tables.polygons.len();
        self.tables.polygons.retain(|p| p.id != id);
        if self.tables.polygons.len() == before {
            return Ok(false);
        }
        self.tables.cells.retain(|c| c.polygon_id != id);
        self.save()?;
        Ok(true)
    }

    // ---- cells ----

    /// Insert or replace the classification of one grid cell
    pub fn upsert_cell(
        &mut self,
        polygon_id: i64,
        grid_row: u32,
        grid_col: u32,
        category: CellCategory,
        researcher: &str,
    ) -> StorageResult<i64> {
        if self.get_polygon(polygon_id).is_none() {
            return Err(StorageError::ForeignKey { table: "polygons", id: polygon_id });
        }

        let updated_at = timestamp();
        let existing = self.tables.cells.iter().position(|c| {
            c.polygon_id == polygon_id && c.grid_row == grid_row && c.grid_col == grid_col
        });

        let id = match existing {
            Some(index) => {
                let cell = &mut self.tables.cells[index];
                cell.category = category;
                cell.researcher = researcher.to_string();
                cell.updated_at = updated_at;
                cell.id
            }
            None => {
                let id = self.tables.next_id("cells");
                self.tables.cells.push(CellRecord {
                    id,
                    polygon_id,
                    grid_row,
                    grid_col,
                    category,
                    researcher: researcher.to_string(),
                    updated_at,
                });
                id
            }
        };
        self.save()?;
        Ok(id)
    }

    pub fn cells_for_polygon(&self, polygon_id: i64) -> Vec<CellRecord> {
        self.tables.cells.iter().filter(|c| c.polygon_id == polygon_id).cloned().collect()
    }

    pub fn get_cell(&self, polygon_id: i64, grid_row: u32, grid_col: u32) -> Option<&CellRecord> {
        self.tables
            .cells
            .iter()
            .find(|c| c.polygon_id == polygon_id && c.grid_row == grid_row && c.grid_col == grid_col)
    }

    pub fn delete_cells_for_polygon(&mut self, polygon_id: i64) -> StorageResult<usize> {
        let before = self.tables.cells.len();
        self.tables.cells.retain(|c| c.polygon_id != polygon_id);
        let removed = before - self.tables.cells.len();
        if removed > 0 {
            self.save()?;
        }
        Ok(removed)
    }

    fn image(&self, id: i64) -> StorageResult<&ImageRecord> {
        self.get_image(id).ok_or(StorageError::NotFound { table: "images", id })
    }

    fn image_mut(&mut self, id: i64) -> StorageResult<&mut ImageRecord> {
        self.tables
            .images
            .iter_mut()
            .find(|img| img.id == id)
            .ok_or(StorageError::NotFound { table: "images", id })
    }

    fn save(&self) -> StorageResult<()> {
        let envelope = StoreEnvelope { version: STORE_SCHEMA_VERSION, tables: self.tables.clone() };
        let bytes = serde_json::to_vec_pretty(&envelope)?;

        // Write to a sibling temp file, then swap it in
        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, bytes)?;
        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

fn timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}
