use crate::state::HostState;
use crate::{HostError, HostResult};
use herbivory_core::{Point, PolygonRecord, ScaleData};
use herbivory_storage::{CellCategory, CellRecord, Database};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// Response payloads. `success` is added when the payload is sent.

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageSummary {
    pub id: i64,
    pub filepath: String,
    pub filename: String,
    pub sheet_id: Option<String>,
    pub completed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderOpenedResponse {
    pub folder_path: PathBuf,
    pub images: Vec<ImageSummary>,
    pub database_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TablesResponse {
    pub tables: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScaleResponse {
    pub scale: Option<ScaleData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolygonsResponse {
    pub polygons: Vec<PolygonRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolygonUpsertResponse {
    pub polygon_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellUpsertResponse {
    pub cell_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellsResponse {
    pub cells: Vec<CellRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppStateResponse {
    pub value: Option<String>,
}

fn database(state: &HostState) -> HostResult<&Database> {
    state.database().ok_or(HostError::NoDatabase)
}

fn database_mut(state: &mut HostState) -> HostResult<&mut Database> {
    state.database_mut().ok_or(HostError::NoDatabase)
}

// Commands

/// Open (or create) the store in `folder` and register the images found there
pub fn open_folder(state: &mut HostState, folder: &Path) -> HostResult<FolderOpenedResponse> {
    if !folder.is_dir() {
        return Err(HostError::FolderNotFound(folder.to_path_buf()));
    }

    // Drop the previous store before opening another one
    state.database = None;
    state.folder = None;

    let mut db = Database::open(folder)?;
    db.register_folder_images(folder)?;

    let images = db
        .all_images()
        .iter()
        .map(|img| ImageSummary {
            id: img.id,
            filepath: img.filepath.clone(),
            filename: img.filename().to_string(),
            sheet_id: img.sheet_id.clone(),
            completed: img.completed,
        })
        .collect::<Vec<_>>();
    let database_path = db.path().to_path_buf();
    log::info!("opened folder {} with {} images", folder.display(), images.len());

    state.database = Some(db);
    state.folder = Some(folder.to_path_buf());

    Ok(FolderOpenedResponse { folder_path: folder.to_path_buf(), images, database_path })
}

pub fn database_exists(folder: &Path) -> bool {
    Database::exists(folder)
}

pub fn get_tables(state: &HostState) -> HostResult<TablesResponse> {
    Ok(TablesResponse { tables: database(state)?.tables() })
}

pub fn save_scale(state: &mut HostState, image_id: i64, scale: &ScaleData) -> HostResult<()> {
    database_mut(state)?.update_image_scale(image_id, scale)?;
    Ok(())
}

pub fn get_scale(state: &HostState, image_id: i64) -> HostResult<ScaleResponse> {
    Ok(ScaleResponse { scale: database(state)?.image_scale(image_id)? })
}

pub fn clear_scale(state: &mut HostState, image_id: i64) -> HostResult<()> {
    database_mut(state)?.clear_image_scale(image_id)?;
    Ok(())
}

pub fn set_completed(state: &mut HostState, image_id: i64, completed: bool) -> HostResult<()> {
    database_mut(state)?.mark_image_completed(image_id, completed)?;
    Ok(())
}

pub fn set_sheet_id(state: &mut HostState, image_id: i64, sheet_id: &str) -> HostResult<()> {
    database_mut(state)?.update_image_sheet_id(image_id, sheet_id)?;
    Ok(())
}

pub fn polygons_for_image(state: &HostState, image_id: i64) -> HostResult<PolygonsResponse> {
    let polygons = database(state)?
        .polygons_for_image(image_id)
        .into_iter()
        .map(PolygonRecord::from)
        .collect();
    Ok(PolygonsResponse { polygons })
}

pub fn upsert_polygon(
    state: &mut HostState,
    image_id: i64,
    leaf_id: &str,
    vertices: &[Point],
) -> HostResult<PolygonUpsertResponse> {
    let polygon_id = database_mut(state)?.upsert_polygon(image_id, leaf_id, vertices)?;
    Ok(PolygonUpsertResponse { polygon_id })
}

pub fn delete_polygon(state: &mut HostState, polygon_id: i64) -> HostResult<()> {
    if !database_mut(state)?.delete_polygon(polygon_id)? {
        log::debug!("polygon {} was already gone", polygon_id);
    }
    Ok(())
}

pub fn upsert_cell(
    state: &mut HostState,
    polygon_id: i64,
    grid_row: u32,
    grid_col: u32,
    category: CellCategory,
    researcher: &str,
) -> HostResult<CellUpsertResponse> {
    let cell_id =
        database_mut(state)?.upsert_cell(polygon_id, grid_row, grid_col, category, researcher)?;
    Ok(CellUpsertResponse { cell_id })
}

pub fn cells_for_polygon(state: &HostState, polygon_id: i64) -> HostResult<CellsResponse> {
    Ok(CellsResponse { cells: database(state)?.cells_for_polygon(polygon_id) })
}

pub fn get_app_state(state: &HostState, key: &str) -> HostResult<AppStateResponse> {
    Ok(AppStateResponse { value: database(state)?.get_app_state(key) })
}

pub fn set_app_state(state: &mut HostState, key: &str, value: &str) -> HostResult<()> {
    database_mut(state)?.set_app_state(key, value)?;
    Ok(())
}
