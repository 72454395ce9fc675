//! Host boundary for the annotation editor
//!
//! The UI talks to the host through named procedures. Arguments are a
//! positional JSON array and every answer is a JSON object carrying
//! `success` plus either the payload fields or an `error` message.
//! [`HostClient`] speaks the same procedures to back an editor session.

pub mod client;
pub mod commands;
pub mod state;

pub use client::HostClient;
pub use commands::{
    AppStateResponse, CellUpsertResponse, CellsResponse, FolderOpenedResponse, ImageSummary,
    PolygonUpsertResponse, PolygonsResponse, ScaleResponse, TablesResponse,
};
pub use state::HostState;

use herbivory_core::{Point, ScaleData};
use herbivory_storage::{CellCategory, StorageError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

pub const NO_DATABASE: &str = "No database open";

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("No database open")]
    NoDatabase,
    #[error("Unknown procedure: {0}")]
    UnknownProcedure(String),
    #[error("Invalid arguments for {procedure}: {source}")]
    InvalidArguments {
        procedure: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("Folder not found: {}", .0.display())]
    FolderNotFound(PathBuf),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("Response encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type HostResult<T> = Result<T, HostError>;

/// Procedures the host answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Procedure {
    OpenFolder,
    DatabaseExists,
    GetTables,
    SaveScale,
    GetScale,
    ClearScale,
    SetCompleted,
    SetSheetId,
    PolygonsForImage,
    UpsertPolygon,
    DeletePolygon,
    UpsertCell,
    CellsForPolygon,
    GetAppState,
    SetAppState,
}

impl Procedure {
    pub const ALL: [Procedure; 15] = [
        Procedure::OpenFolder,
        Procedure::DatabaseExists,
        Procedure::GetTables,
        Procedure::SaveScale,
        Procedure::GetScale,
        Procedure::ClearScale,
        Procedure::SetCompleted,
        Procedure::SetSheetId,
        Procedure::PolygonsForImage,
        Procedure::UpsertPolygon,
        Procedure::DeletePolygon,
        Procedure::UpsertCell,
        Procedure::CellsForPolygon,
        Procedure::GetAppState,
        Procedure::SetAppState,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Procedure::OpenFolder => "folder:open",
            Procedure::DatabaseExists => "database:exists",
            Procedure::GetTables => "database:getTables",
            Procedure::SaveScale => "image:saveScale",
            Procedure::GetScale => "image:getScale",
            Procedure::ClearScale => "image:clearScale",
            Procedure::SetCompleted => "image:setCompleted",
            Procedure::SetSheetId => "image:setSheetId",
            Procedure::PolygonsForImage => "polygon:getForImage",
            Procedure::UpsertPolygon => "polygon:upsert",
            Procedure::DeletePolygon => "polygon:delete",
            Procedure::UpsertCell => "cell:upsert",
            Procedure::CellsForPolygon => "cell:getForPolygon",
            Procedure::GetAppState => "appState:get",
            Procedure::SetAppState => "appState:set",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }

    /// Whether the procedure only makes sense with a folder open
    pub fn requires_database(&self) -> bool {
        !matches!(self, Procedure::OpenFolder | Procedure::DatabaseExists)
    }
}

/// Failure answer sent back to the caller
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

/// Request/response front for the store of the open folder
#[derive(Debug, Default)]
pub struct Host {
    state: HostState,
}

impl Host {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap the host so several clients can share it
    pub fn shared(self) -> Arc<Mutex<Host>> {
        Arc::new(Mutex::new(self))
    }

    pub fn state(&self) -> &HostState {
        &self.state
    }

    /// Run a procedure and encode its answer
    pub fn invoke(&mut self, procedure: &str, args: Value) -> Value {
        log::debug!("invoke {} {}", procedure, args);
        match self.dispatch(procedure, args) {
            Ok(Value::Object(mut fields)) => {
                fields.insert("success".to_string(), Value::Bool(true));
                Value::Object(fields)
            }
            Ok(Value::Null) => json!({ "success": true }),
            // Bare answers such as database:exists
            Ok(other) => other,
            Err(err) => {
                if !matches!(err, HostError::NoDatabase) {
                    log::warn!("{} failed: {}", procedure, err);
                }
                serde_json::to_value(ErrorResponse { success: false, error: err.to_string() })
                    .unwrap_or_else(|_| json!({ "success": false }))
            }
        }
    }

    fn dispatch(&mut self, name: &str, args: Value) -> HostResult<Value> {
        let procedure =
            Procedure::from_name(name).ok_or_else(|| HostError::UnknownProcedure(name.to_string()))?;
        if procedure.requires_database() && self.state.database.is_none() {
            return Err(HostError::NoDatabase);
        }

        let state = &mut self.state;
        match procedure {
            Procedure::OpenFolder => {
                let (folder,): (PathBuf,) = decode(procedure, args)?;
                encode(commands::open_folder(state, &folder)?)
            }
            Procedure::DatabaseExists => {
                let (folder,): (PathBuf,) = decode(procedure, args)?;
                Ok(Value::Bool(commands::database_exists(&folder)))
            }
            Procedure::GetTables => encode(commands::get_tables(state)?),
            Procedure::SaveScale => {
                let (image_id, scale): (i64, ScaleData) = decode(procedure, args)?;
                encode(commands::save_scale(state, image_id, &scale)?)
            }
            Procedure::GetScale => {
                let (image_id,): (i64,) = decode(procedure, args)?;
                encode(commands::get_scale(state, image_id)?)
            }
            Procedure::ClearScale => {
                let (image_id,): (i64,) = decode(procedure, args)?;
                encode(commands::clear_scale(state, image_id)?)
            }
            Procedure::SetCompleted => {
                let (image_id, completed): (i64, bool) = decode(procedure, args)?;
                encode(commands::set_completed(state, image_id, completed)?)
            }
            Procedure::SetSheetId => {
                let (image_id, sheet_id): (i64, String) = decode(procedure, args)?;
                encode(commands::set_sheet_id(state, image_id, &sheet_id)?)
            }
            Procedure::PolygonsForImage => {
                let (image_id,): (i64,) = decode(procedure, args)?;
                encode(commands::polygons_for_image(state, image_id)?)
            }
            Procedure::UpsertPolygon => {
                let (image_id, leaf_id, vertices): (i64, String, Vec<Point>) =
                    decode(procedure, args)?;
                encode(commands::upsert_polygon(state, image_id, &leaf_id, &vertices)?)
            }
            Procedure::DeletePolygon => {
                let (polygon_id,): (i64,) = decode(procedure, args)?;
                encode(commands::delete_polygon(state, polygon_id)?)
            }
            Procedure::UpsertCell => {
                let (polygon_id, row, col, category, researcher): (
                    i64,
                    u32,
                    u32,
                    CellCategory,
                    String,
                ) = decode(procedure, args)?;
                encode(commands::upsert_cell(state, polygon_id, row, col, category, &researcher)?)
            }
            Procedure::CellsForPolygon => {
                let (polygon_id,): (i64,) = decode(procedure, args)?;
                encode(commands::cells_for_polygon(state, polygon_id)?)
            }
            Procedure::GetAppState => {
                let (key,): (String,) = decode(procedure, args)?;
                encode(commands::get_app_state(state, &key)?)
            }
            Procedure::SetAppState => {
                let (key, value): (String, String) = decode(procedure, args)?;
                encode(commands::set_app_state(state, &key, &value)?)
            }
        }
    }
}

fn decode<T: DeserializeOwned>(procedure: Procedure, args: Value) -> HostResult<T> {
    serde_json::from_value(args)
        .map_err(|source| HostError::InvalidArguments { procedure: procedure.name(), source })
}

fn encode<T: Serialize>(payload: T) -> HostResult<Value> {
    Ok(serde_json::to_value(payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn folder_with_images(names: &[&str]) -> tempfile::TempDir {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        for name in names {
            fs::write(temp.path().join(name), b"img").expect("write should succeed");
        }
        temp
    }

    fn open_host(folder: &tempfile::TempDir) -> Host {
        let mut host = Host::new();
        let opened = host.invoke("folder:open", json!([folder.path()]));
        assert_eq!(opened["success"], true, "{opened}");
        host
    }

    fn square() -> Value {
        json!([
            { "x": 0.0, "y": 0.0 },
            { "x": 10.0, "y": 0.0 },
            { "x": 10.0, "y": 10.0 },
            { "x": 0.0, "y": 10.0 }
        ])
    }

    #[test]
    fn every_store_procedure_needs_an_open_folder() {
        let mut host = Host::new();
        for procedure in Procedure::ALL.iter().filter(|p| p.requires_database()) {
            let answer = host.invoke(procedure.name(), json!([1]));
            assert_eq!(answer["success"], false, "{}", procedure.name());
            assert_eq!(answer["error"], NO_DATABASE);
        }
    }

    #[test]
    fn procedure_names_round_trip() {
        for procedure in Procedure::ALL {
            assert_eq!(Procedure::from_name(procedure.name()), Some(procedure));
        }
        assert_eq!(Procedure::from_name("dialog:openFolder"), None);
    }

    #[test]
    fn open_folder_registers_images() {
        let folder = folder_with_images(&["b.png", "a.jpg", "notes.txt"]);
        let mut host = Host::new();

        assert_eq!(host.invoke("database:exists", json!([folder.path()])), json!(false));
        let opened = host.invoke("folder:open", json!([folder.path()]));
        assert_eq!(opened["success"], true);
        assert_eq!(opened["images"].as_array().map(Vec::len), Some(2));
        assert_eq!(opened["images"][0]["filename"], "a.jpg");
        assert_eq!(opened["images"][0]["completed"], false);
        assert!(opened["images"][0]["sheetId"].is_null());
        assert!(opened["databasePath"]
            .as_str()
            .is_some_and(|p| p.ends_with("herbivory.json")));
        assert_eq!(host.invoke("database:exists", json!([folder.path()])), json!(true));

        // Reopening does not duplicate images
        let again = host.invoke("folder:open", json!([folder.path()]));
        assert_eq!(again["images"].as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn open_missing_folder_fails() {
        let mut host = Host::new();
        let answer = host.invoke("folder:open", json!(["/definitely/not/here"]));
        assert_eq!(answer["success"], false);
        assert!(answer["error"].as_str().is_some_and(|e| e.starts_with("Folder not found")));
    }

    #[test]
    fn tables_are_listed() {
        let folder = folder_with_images(&[]);
        let mut host = open_host(&folder);
        let answer = host.invoke("database:getTables", json!([]));
        assert_eq!(answer["tables"], json!(["images", "polygons", "cells", "app_state"]));
    }

    #[test]
    fn scale_save_get_clear() {
        let folder = folder_with_images(&["a.jpg"]);
        let mut host = open_host(&folder);
        let scale = json!({
            "pxPerCm": 30.0, "lineStartX": 100.0, "lineStartY": 200.0,
            "lineEndX": 400.0, "lineEndY": 200.0, "cmValue": 10.0
        });

        assert_eq!(host.invoke("image:saveScale", json!([1, scale])), json!({ "success": true }));
        let fetched = host.invoke("image:getScale", json!([1]));
        assert_eq!(fetched["scale"]["pxPerCm"], 30.0);

        host.invoke("image:clearScale", json!([1]));
        assert!(host.invoke("image:getScale", json!([1]))["scale"].is_null());

        let missing = host.invoke("image:saveScale", json!([42, scale]));
        assert_eq!(missing["success"], false);
    }

    #[test]
    fn polygon_upsert_and_cascading_delete() {
        let folder = folder_with_images(&["a.jpg"]);
        let mut host = open_host(&folder);

        let first = host.invoke("polygon:upsert", json!([1, "01", square()]));
        let polygon_id = first["polygonId"].as_i64().expect("id should be returned");
        let again = host.invoke("polygon:upsert", json!([1, "01", square()]));
        assert_eq!(again["polygonId"], polygon_id);

        let cell = host.invoke("cell:upsert", json!([polygon_id, 0, 1, "present", "ana"]));
        assert_eq!(cell["success"], true);
        let cells = host.invoke("cell:getForPolygon", json!([polygon_id]));
        assert_eq!(cells["cells"][0]["category"], "present");

        let listed = host.invoke("polygon:getForImage", json!([1]));
        assert_eq!(listed["polygons"][0]["leafId"], "01");
        assert_eq!(listed["polygons"][0]["imageId"], 1);

        host.invoke("polygon:delete", json!([polygon_id]));
        assert_eq!(host.invoke("polygon:getForImage", json!([1]))["polygons"], json!([]));
        assert_eq!(host.invoke("cell:getForPolygon", json!([polygon_id]))["cells"], json!([]));
    }

    #[test]
    fn image_flags_and_app_state() {
        let folder = folder_with_images(&["a.jpg"]);
        let mut host = open_host(&folder);

        host.invoke("image:setCompleted", json!([1, true]));
        host.invoke("image:setSheetId", json!([1, "S-12"]));
        host.invoke("appState:set", json!(["lastImage", "1"]));
        assert_eq!(host.invoke("appState:get", json!(["lastImage"]))["value"], "1");
        assert!(host.invoke("appState:get", json!(["missing"]))["value"].is_null());

        let reopened = host.invoke("folder:open", json!([folder.path()]));
        assert_eq!(reopened["images"][0]["completed"], true);
        assert_eq!(reopened["images"][0]["sheetId"], "S-12");
    }

    #[test]
    fn bad_requests_are_reported() {
        let folder = folder_with_images(&["a.jpg"]);
        let mut host = open_host(&folder);

        let unknown = host.invoke("image:rotate", json!([1]));
        assert_eq!(unknown["success"], false);
        assert_eq!(unknown["error"], "Unknown procedure: image:rotate");

        let malformed = host.invoke("polygon:upsert", json!([1, 2]));
        assert_eq!(malformed["success"], false);
        assert!(malformed["error"]
            .as_str()
            .is_some_and(|e| e.starts_with("Invalid arguments for polygon:upsert")));

        let bad_category = host.invoke("cell:upsert", json!([1, 0, 0, "eaten", "ana"]));
        assert_eq!(bad_category["success"], false);
    }
}
