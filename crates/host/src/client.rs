//! Persistence adapter that goes through the host procedures

use crate::commands::{PolygonUpsertResponse, PolygonsResponse, ScaleResponse};
use crate::{Host, NO_DATABASE};
use herbivory_core::{PersistenceAdapter, PersistenceError, PersistenceResult, Point};
use herbivory_core::{PolygonRecord, ScaleData};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

/// Editor-side handle on a shared [`Host`]
#[derive(Debug, Clone)]
pub struct HostClient {
    host: Arc<Mutex<Host>>,
}

impl HostClient {
    pub fn new(host: Arc<Mutex<Host>>) -> Self {
        Self { host }
    }

    pub fn host(&self) -> &Arc<Mutex<Host>> {
        &self.host
    }

    /// Invoke a procedure and decode its payload
    fn call<T: DeserializeOwned>(&self, procedure: &str, args: Value) -> PersistenceResult<T> {
        let answer = {
            let mut host = self
                .host
                .lock()
                .map_err(|_| PersistenceError::Transport("host lock poisoned".to_string()))?;
            host.invoke(procedure, args)
        };

        if answer.get("success").and_then(Value::as_bool) != Some(true) {
            let message = answer
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            return Err(if message == NO_DATABASE {
                PersistenceError::NotOpen
            } else {
                PersistenceError::Storage(message)
            });
        }

        serde_json::from_value(answer)
            .map_err(|e| PersistenceError::Transport(format!("{procedure}: {e}")))
    }
}

impl PersistenceAdapter for HostClient {
    fn get_scale(&mut self, image_id: i64) -> PersistenceResult<Option<ScaleData>> {
        let response: ScaleResponse = self.call("image:getScale", json!([image_id]))?;
        Ok(response.scale)
    }

    fn save_scale(&mut self, image_id: i64, scale: &ScaleData) -> PersistenceResult<()> {
        self.call::<IgnoredAny>("image:saveScale", json!([image_id, scale]))?;
        Ok(())
    }

    fn clear_scale(&mut self, image_id: i64) -> PersistenceResult<()> {
        self.call::<IgnoredAny>("image:clearScale", json!([image_id]))?;
        Ok(())
    }

    fn get_polygons(&mut self, image_id: i64) -> PersistenceResult<Vec<PolygonRecord>> {
        let response: PolygonsResponse = self.call("polygon:getForImage", json!([image_id]))?;
        Ok(response.polygons)
    }

    fn upsert_polygon(
        &mut self,
        image_id: i64,
        leaf_id: &str,
        vertices: &[Point],
    ) -> PersistenceResult<i64> {
        let response: PolygonUpsertResponse =
            self.call("polygon:upsert", json!([image_id, leaf_id, vertices]))?;
        Ok(response.polygon_id)
    }

    fn delete_polygon(&mut self, polygon_id: i64) -> PersistenceResult<()> {
        self.call::<IgnoredAny>("polygon:delete", json!([polygon_id]))?;
        Ok(())
    }
}
