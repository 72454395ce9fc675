//! Rows of the four store tables

use herbivory_core::{Point, PolygonRecord, ScaleData};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRecord {
    pub id: i64,
    pub filepath: String,
    pub sheet_id: Option<String>,
    pub scale_px_per_cm: Option<f64>,
    pub scale_line_start_x: Option<f64>,
    pub scale_line_start_y: Option<f64>,
    pub scale_line_end_x: Option<f64>,
    pub scale_line_end_y: Option<f64>,
    pub scale_cm_value: Option<f64>,
    pub completed: bool,
    pub created_at: String,
}

impl ImageRecord {
    pub(crate) fn new(id: i64, filepath: String, created_at: String) -> Self {
        Self {
            id,
            filepath,
            sheet_id: None,
            scale_px_per_cm: None,
            scale_line_start_x: None,
            scale_line_start_y: None,
            scale_line_end_x: None,
            scale_line_end_y: None,
            scale_cm_value: None,
            completed: false,
            created_at,
        }
    }

    /// Calibration stored for this image, when every scale column is set
    pub fn scale(&self) -> Option<ScaleData> {
        Some(ScaleData {
            px_per_cm: self.scale_px_per_cm?,
            line_start_x: self.scale_line_start_x?,
            line_start_y: self.scale_line_start_y?,
            line_end_x: self.scale_line_end_x?,
            line_end_y: self.scale_line_end_y?,
            cm_value: self.scale_cm_value?,
        })
    }

    pub(crate) fn set_scale(&mut self, scale: Option<&ScaleData>) {
        self.scale_px_per_cm = scale.map(|s| s.px_per_cm);
        self.scale_line_start_x = scale.map(|s| s.line_start_x);
        self.scale_line_start_y = scale.map(|s| s.line_start_y);
        self.scale_line_end_x = scale.map(|s| s.line_end_x);
        self.scale_line_end_y = scale.map(|s| s.line_end_y);
        self.scale_cm_value = scale.map(|s| s.cm_value);
    }

    /// Last path component of the image file
    pub fn filename(&self) -> &str {
        self.filepath
            .rsplit(['/', '\\'])
            .next()
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.filepath)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolygonRow {
    pub id: i64,
    pub image_id: i64,
    pub leaf_id: String,
    pub vertices: Vec<Point>,
    pub created_at: String,
}

impl From<PolygonRow> for PolygonRecord {
    fn from(row: PolygonRow) -> Self {
        Self { id: row.id, image_id: row.image_id, leaf_id: row.leaf_id, vertices: row.vertices }
    }
}

/// Classification of one grid cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellCategory {
    Absent,
    Present,
    Unsure,
}

impl CellCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            CellCategory::Absent => "absent",
            CellCategory::Present => "present",
            CellCategory::Unsure => "unsure",
        }
    }
}

impl fmt::Display for CellCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CellCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "absent" => Ok(CellCategory::Absent),
            "present" => Ok(CellCategory::Present),
            "unsure" => Ok(CellCategory::Unsure),
            other => Err(format!("unknown cell category: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellRecord {
    pub id: i64,
    pub polygon_id: i64,
    pub grid_row: u32,
    pub grid_col: u32,
    pub category: CellCategory,
    pub researcher: String,
    pub updated_at: String,
}
