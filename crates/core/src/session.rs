//! Editor session for one open image
//!
//! The session owns the scale tool, the polygon tool for the active leaf,
//! every other leaf outline drawn on the image and the grid overlay. Input
//! is routed to the tool of the current [`Mode`]. Committed changes are
//! relayed to the persistence adapter and reported as [`EditorEvent`]s.
//!
//! Writes never roll back the in-memory edit. A failed write is logged and
//! published as [`EditorEvent::PersistenceFailed`].

use crate::config::EditorConfig;
use crate::error::{ValidationError, ValidationResult};
use crate::geometry::{is_point_in_polygon, Point};
use crate::grid::{validate_grid_size, GridState};
use crate::persistence::{PersistenceAdapter, PersistenceError, PersistenceResult};
use crate::polygon_tool::{EditKey, PolygonEvent, PolygonSnapshot, PolygonTool};
use crate::scale_tool::{CursorHint, ScaleEvent, ScaleLine, ScaleTool, ScaleValue};
use serde::Serialize;

/// Which tool receives pointer input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Scale,
    Polygon,
}

/// Notifications for the UI, drained with [`EditorSession::take_events`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum EditorEvent {
    ScaleLineChanged(Option<ScaleLine>),
    /// A scale line was drawn or adjusted and awaits its real-world length
    ScaleLineCompleted(ScaleLine),
    ScaleConfirmed(ScaleValue),
    ScaleCleared,
    #[serde(rename_all = "camelCase")]
    PolygonChanged { leaf_id: String },
    #[serde(rename_all = "camelCase")]
    PolygonClosed { leaf_id: String },
    #[serde(rename_all = "camelCase")]
    PolygonReopened { leaf_id: String },
    #[serde(rename_all = "camelCase")]
    PolygonSaved { leaf_id: String, polygon_id: i64 },
    #[serde(rename_all = "camelCase")]
    DeleteRequested { leaf_id: String },
    #[serde(rename_all = "camelCase")]
    PolygonDeleted { leaf_id: String },
    #[serde(rename_all = "camelCase")]
    ActiveLeafChanged { leaf_id: String },
    #[serde(rename_all = "camelCase")]
    GridChanged { cell_count: usize, is_visible: bool },
    /// A write failed; the in-memory edit was kept
    PersistenceFailed { operation: String, message: String },
}

/// One leaf outline known to the session
#[derive(Debug, Clone)]
struct Leaf {
    label: String,
    polygon_id: Option<i64>,
    /// Record left in storage after an undo reopened the outline; only ever deleted
    stale_id: Option<i64>,
    /// Stale for the active leaf, whose live state is in the polygon tool
    stored: PolygonSnapshot,
}

impl Leaf {
    fn blank(label: String) -> Self {
        Self { label, polygon_id: None, stale_id: None, stored: PolygonSnapshot::default() }
    }

    /// Every stored record this leaf may still own
    fn stored_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.polygon_id.into_iter().chain(self.stale_id).collect();
        ids.dedup();
        ids
    }
}

/// Overview of a leaf for listing
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeafSummary {
    pub label: String,
    pub polygon_id: Option<i64>,
    pub vertex_count: usize,
    pub closed: bool,
    pub active: bool,
}

/// Editing context for one image
pub struct EditorSession<A: PersistenceAdapter> {
    image_id: i64,
    config: EditorConfig,
    mode: Mode,
    scale_tool: ScaleTool,
    scale: Option<ScaleValue>,
    polygon_tool: PolygonTool,
    leaves: Vec<Leaf>,
    active: usize,
    pending_delete: Option<String>,
    grid_size_mm: f64,
    grid: GridState,
    adapter: A,
    events: Vec<EditorEvent>,
}

impl<A: PersistenceAdapter> EditorSession<A> {
    /// Open an image, restoring its calibration and leaf outlines.
    ///
    /// # Errors
    /// Fails when the stored scale or polygons cannot be read.
    pub fn open(image_id: i64, mut adapter: A, config: EditorConfig) -> PersistenceResult<Self> {
        let saved_scale = adapter.get_scale(image_id)?;
        let mut records = adapter.get_polygons(image_id)?;
        records.sort_by(|a, b| a.leaf_id.cmp(&b.leaf_id));

        let mut scale_tool = ScaleTool::new(&config);
        let scale = saved_scale.map(|data| scale_tool.restore(&data));
        scale_tool.take_events();

        let mut leaves: Vec<Leaf> = records
            .into_iter()
            .map(|record| {
                let closed = record.vertices.len() >= crate::polygon_tool::MIN_VERTICES;
                Leaf {
                    label: record.leaf_id,
                    polygon_id: Some(record.id),
                    stale_id: None,
                    stored: PolygonSnapshot { vertices: record.vertices, closed },
                }
            })
            .collect();
        if leaves.is_empty() {
            leaves.push(Leaf::blank(format_label(1)));
        }

        let mut polygon_tool = PolygonTool::new(&config);
        polygon_tool.load(leaves[0].stored.vertices.clone(), leaves[0].stored.closed);
        polygon_tool.take_events();

        let grid_size_mm = validate_grid_size(config.grid_size_mm)
            .unwrap_or(crate::grid::DEFAULT_GRID_SIZE_MM);
        let mode = if scale.is_some() { Mode::Polygon } else { Mode::Scale };

        log::debug!(
            "image {} opened: {} leaves, scale {}",
            image_id,
            leaves.len(),
            scale.map_or("none".to_string(), |s| format!("{:.3} px/cm", s.px_per_cm))
        );

        let mut session = Self {
            image_id,
            config,
            mode,
            scale_tool,
            scale,
            polygon_tool,
            leaves,
            active: 0,
            pending_delete: None,
            grid_size_mm,
            grid: GridState::hidden(grid_size_mm),
            adapter,
            events: Vec::new(),
        };
        session.refresh_grid();
        session.events.clear();
        Ok(session)
    }

    pub fn image_id(&self) -> i64 {
        self.image_id
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Switch tools, abandoning whatever the previous tool was in the middle of
    pub fn set_mode(&mut self, mode: Mode) {
        if mode == self.mode {
            return;
        }
        match self.mode {
            Mode::Scale => self.scale_tool.cancel_interaction(),
            Mode::Polygon => self.polygon_tool.cancel_interaction(),
        }
        self.mode = mode;
        self.drain_tool_events();
    }

    pub fn scale(&self) -> Option<ScaleValue> {
        self.scale
    }

    pub fn scale_line(&self) -> Option<&ScaleLine> {
        self.scale_tool.line()
    }

    pub fn polygon(&self) -> &PolygonTool {
        &self.polygon_tool
    }

    pub fn active_leaf(&self) -> &str {
        &self.leaves[self.active].label
    }

    pub fn active_polygon_id(&self) -> Option<i64> {
        self.leaves[self.active].polygon_id
    }

    pub fn leaves(&self) -> Vec<LeafSummary> {
        self.leaves
            .iter()
            .enumerate()
            .map(|(index, leaf)| {
                let active = index == self.active;
                let (vertex_count, closed) = if active {
                    (self.polygon_tool.vertices().len(), self.polygon_tool.is_closed())
                } else {
                    (leaf.stored.vertices.len(), leaf.stored.closed)
                };
                LeafSummary {
                    label: leaf.label.clone(),
                    polygon_id: leaf.polygon_id,
                    vertex_count,
                    closed,
                    active,
                }
            })
            .collect()
    }

    pub fn grid(&self) -> &GridState {
        &self.grid
    }

    pub fn grid_size_mm(&self) -> f64 {
        self.grid_size_mm
    }

    /// Leaf awaiting deletion confirmation
    pub fn pending_delete(&self) -> Option<&str> {
        self.pending_delete.as_deref()
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn adapter_mut(&mut self) -> &mut A {
        &mut self.adapter
    }

    pub fn take_events(&mut self) -> Vec<EditorEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn cursor_at(&self, pos: Point) -> CursorHint {
        match self.mode {
            Mode::Scale => self.scale_tool.cursor_at(pos),
            Mode::Polygon => self.polygon_tool.cursor_at(pos),
        }
    }

    pub fn pointer_down(&mut self, pos: Point) {
        match self.mode {
            Mode::Scale => self.scale_tool.pointer_down(pos),
            Mode::Polygon => self.polygon_tool.pointer_down(pos),
        }
        self.drain_tool_events();
    }

    pub fn pointer_move(&mut self, pos: Point) {
        match self.mode {
            Mode::Scale => self.scale_tool.pointer_move(pos),
            Mode::Polygon => self.polygon_tool.pointer_move(pos),
        }
        self.drain_tool_events();
    }

    pub fn pointer_up(&mut self, pos: Point) {
        match self.mode {
            Mode::Scale => self.scale_tool.pointer_up(pos),
            Mode::Polygon => self.polygon_tool.pointer_up(pos),
        }
        self.drain_tool_events();
    }

    pub fn pointer_leave(&mut self) {
        match self.mode {
            Mode::Scale => self.scale_tool.pointer_leave(),
            Mode::Polygon => self.polygon_tool.pointer_leave(),
        }
        self.drain_tool_events();
    }

    /// Polygon-mode click: adds or closes, or activates another closed leaf under the pointer
    pub fn click(&mut self, pos: Point) {
        if self.mode != Mode::Polygon {
            return;
        }

        let can_switch = !self.polygon_tool.is_click_suppressed()
            && (self.polygon_tool.is_closed() || self.polygon_tool.is_empty());
        if can_switch {
            if let Some(index) = self.leaf_containing(pos) {
                self.activate(index);
                return;
            }
        }

        self.polygon_tool.click(pos);
        self.drain_tool_events();
    }

    pub fn key_down(&mut self, key: EditKey) -> bool {
        if self.mode != Mode::Polygon {
            return false;
        }
        let handled = self.polygon_tool.key_down(key);
        self.drain_tool_events();
        handled
    }

    pub fn context_menu(&mut self, pos: Point) -> bool {
        if self.mode != Mode::Polygon {
            return false;
        }
        let handled = self.polygon_tool.context_menu(pos);
        self.drain_tool_events();
        handled
    }

    pub fn undo(&mut self) -> bool {
        let undone = self.polygon_tool.undo();
        self.drain_tool_events();
        undone
    }

    /// Confirm the drawn scale line as `cm_value` centimetres and store the calibration
    pub fn confirm_scale(&mut self, cm_value: f64) -> ValidationResult<ScaleValue> {
        let (value, data) = self.scale_tool.confirm(cm_value)?;
        self.scale = Some(value);
        log::debug!(
            "scale confirmed: {:.1}px = {} cm ({:.3} px/cm)",
            value.line_length,
            cm_value,
            value.px_per_cm
        );

        if let Err(err) = self.adapter.save_scale(self.image_id, &data) {
            self.report_failure("image:saveScale", err);
        }
        self.events.push(EditorEvent::ScaleConfirmed(value));
        self.refresh_grid();
        Ok(value)
    }

    /// Remove the scale line and the stored calibration
    pub fn clear_scale(&mut self) {
        self.scale_tool.clear();
        self.scale = None;
        self.drain_tool_events();

        if let Err(err) = self.adapter.clear_scale(self.image_id) {
            self.report_failure("image:clearScale", err);
        }
        self.events.push(EditorEvent::ScaleCleared);
        self.refresh_grid();
    }

    pub fn set_grid_size_mm(&mut self, grid_size_mm: f64) -> ValidationResult<()> {
        self.grid_size_mm = validate_grid_size(grid_size_mm)?;
        self.refresh_grid();
        Ok(())
    }

    /// Start outlining another leaf. The active leaf must be closed first.
    pub fn new_leaf(&mut self) -> ValidationResult<String> {
        if !self.polygon_tool.is_closed() {
            return Err(ValidationError::ActiveLeafOpen);
        }
        let label = self.next_label();
        self.leaves.push(Leaf::blank(label.clone()));
        self.activate(self.leaves.len() - 1);
        Ok(label)
    }

    pub fn select_leaf(&mut self, label: &str) -> ValidationResult<()> {
        let index = self
            .leaves
            .iter()
            .position(|leaf| leaf.label == label)
            .ok_or_else(|| ValidationError::UnknownLeaf(label.to_string()))?;
        self.activate(index);
        Ok(())
    }

    /// Ask to delete the active polygon; it goes only after [`Self::confirm_delete_polygon`]
    pub fn request_delete_polygon(&mut self) -> bool {
        let requested = self.polygon_tool.request_delete();
        self.drain_tool_events();
        requested
    }

    pub fn cancel_delete_polygon(&mut self) -> bool {
        self.pending_delete.take().is_some()
    }

    /// Delete the polygon awaiting confirmation, along with its classified cells
    pub fn confirm_delete_polygon(&mut self) -> bool {
        let Some(label) = self.pending_delete.take() else {
            return false;
        };
        if label != self.leaves[self.active].label {
            return false;
        }

        let removed = self.leaves.remove(self.active);
        self.delete_stored(&removed);
        log::debug!("leaf {} deleted", label);
        self.events.push(EditorEvent::PolygonDeleted { leaf_id: label });

        let fresh = self.next_label();
        self.leaves.push(Leaf::blank(fresh.clone()));
        self.active = self.leaves.len() - 1;
        self.polygon_tool.clear();
        self.drain_tool_events();
        self.events.push(EditorEvent::ActiveLeafChanged { leaf_id: fresh });
        true
    }

    /// End the session. In-progress draws and drags are dropped, not saved.
    pub fn close(mut self) -> A {
        self.scale_tool.cancel_interaction();
        self.polygon_tool.cancel_interaction();
        log::debug!("image {} closed", self.image_id);
        self.adapter
    }

    fn activate(&mut self, index: usize) {
        if index == self.active || index >= self.leaves.len() {
            return;
        }

        self.polygon_tool.cancel_interaction();
        self.pending_delete = None;

        let current = &mut self.leaves[self.active];
        current.stored = self.polygon_tool.snapshot();
        let mut target = index;
        if current.polygon_id.is_none() && current.stored.vertices.is_empty() {
            // An outline undone back to nothing takes its leftover record with it
            let discarded = self.leaves.remove(self.active);
            self.delete_stored(&discarded);
            if target > self.active {
                target -= 1;
            }
        }

        self.active = target;
        let PolygonSnapshot { vertices, closed } = self.leaves[target].stored.clone();
        self.polygon_tool.load(vertices, closed);
        self.drain_tool_events();

        let leaf_id = self.leaves[target].label.clone();
        log::debug!("active leaf is now {}", leaf_id);
        self.events.push(EditorEvent::ActiveLeafChanged { leaf_id });
    }

    /// Closed leaf other than the active one whose outline contains `pos`
    fn leaf_containing(&self, pos: Point) -> Option<usize> {
        self.leaves
            .iter()
            .enumerate()
            .find(|(index, leaf)| {
                *index != self.active
                    && leaf.stored.closed
                    && is_point_in_polygon(pos, &leaf.stored.vertices)
            })
            .map(|(index, _)| index)
    }

    fn next_label(&self) -> String {
        let highest = self
            .leaves
            .iter()
            .filter_map(|leaf| leaf.label.parse::<u32>().ok())
            .max()
            .unwrap_or(0);
        format_label(highest + 1)
    }

    fn drain_tool_events(&mut self) {
        for event in self.scale_tool.take_events() {
            self.events.push(match event {
                ScaleEvent::LineChanged(line) => EditorEvent::ScaleLineChanged(line),
                ScaleEvent::LineCompleted(line) => EditorEvent::ScaleLineCompleted(line),
            });
        }

        let mut changed = false;
        for event in self.polygon_tool.take_events() {
            let leaf_id = self.leaves[self.active].label.clone();
            match event {
                PolygonEvent::Changed => {
                    changed = true;
                    self.events.push(EditorEvent::PolygonChanged { leaf_id });
                }
                PolygonEvent::Closed => {
                    self.events.push(EditorEvent::PolygonClosed { leaf_id });
                    self.save_active_polygon();
                }
                PolygonEvent::Edited => self.save_active_polygon(),
                PolygonEvent::Reopened => {
                    let leaf = &mut self.leaves[self.active];
                    if let Some(id) = leaf.polygon_id.take() {
                        leaf.stale_id = Some(id);
                    }
                    self.events.push(EditorEvent::PolygonReopened { leaf_id });
                }
                PolygonEvent::DeleteRequested => {
                    self.pending_delete = Some(leaf_id.clone());
                    self.events.push(EditorEvent::DeleteRequested { leaf_id });
                }
            }
        }

        if changed {
            self.refresh_grid();
        }
    }

    fn save_active_polygon(&mut self) {
        if !self.polygon_tool.is_closed() {
            return;
        }
        let leaf_id = self.leaves[self.active].label.clone();
        match self.adapter.upsert_polygon(self.image_id, &leaf_id, self.polygon_tool.vertices()) {
            Ok(polygon_id) => {
                let leaf = &mut self.leaves[self.active];
                leaf.polygon_id = Some(polygon_id);
                if leaf.stale_id == Some(polygon_id) {
                    leaf.stale_id = None;
                }
                log::debug!("leaf {} saved as polygon {}", leaf_id, polygon_id);
                self.events.push(EditorEvent::PolygonSaved { leaf_id, polygon_id });
            }
            Err(err) => self.report_failure("polygon:upsert", err),
        }
    }

    fn delete_stored(&mut self, leaf: &Leaf) {
        for polygon_id in leaf.stored_ids() {
            match self.adapter.delete_polygon(polygon_id) {
                Ok(()) => log::debug!("polygon {} of leaf {} deleted", polygon_id, leaf.label),
                Err(err) => self.report_failure("polygon:delete", err),
            }
        }
    }

    fn refresh_grid(&mut self) {
        let px_per_cm = self.scale.map_or(0.0, |s| s.px_per_cm);
        let grid = GridState::compute(
            self.polygon_tool.vertices(),
            self.polygon_tool.is_closed(),
            px_per_cm,
            self.grid_size_mm,
        );
        if grid != self.grid {
            self.events.push(EditorEvent::GridChanged {
                cell_count: grid.cells.len(),
                is_visible: grid.is_visible,
            });
            self.grid = grid;
        }
    }

    fn report_failure(&mut self, operation: &str, err: PersistenceError) {
        log::warn!("{} failed for image {}: {}", operation, self.image_id, err);
        self.events.push(EditorEvent::PersistenceFailed {
            operation: operation.to_string(),
            message: err.to_string(),
        });
    }
}

fn format_label(n: u32) -> String {
    format!("{:02}", n)
}
