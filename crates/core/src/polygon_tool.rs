//! Polygon editing for leaf outlines
//!
//! A polygon starts open, grows one vertex per click and closes when the
//! researcher clicks back on the first vertex. Vertices can be dragged or
//! deleted afterwards, and every committed edit can be undone.

use crate::config::EditorConfig;
use crate::geometry::{distance, is_near, Point};
use crate::scale_tool::CursorHint;
use serde::{Deserialize, Serialize};

/// Fewest vertices a closed polygon may have
pub const MIN_VERTICES: usize = 3;

/// Polygon state captured before an edit, restored wholesale on undo
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PolygonSnapshot {
    pub vertices: Vec<Point>,
    pub closed: bool,
}

/// Keys the polygon editor reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditKey {
    Delete,
    Backspace,
}

/// Notifications produced by the polygon tool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolygonEvent {
    /// Vertices or closedness changed in any way
    Changed,
    /// The polygon became closed
    Closed,
    /// A closed polygon went back to open (undo of the close)
    Reopened,
    /// A committed edit on a polygon that stayed closed
    Edited,
    /// The researcher asked to delete the whole polygon
    DeleteRequested,
}

#[derive(Debug, Clone, Default)]
enum DragState {
    #[default]
    Idle,
    /// Pressed on a vertex but not moved past the threshold yet
    Armed { index: usize, press: Point, before: PolygonSnapshot },
    Dragging { index: usize, before: PolygonSnapshot },
}

/// Vertex editor for one polygon
#[derive(Debug)]
pub struct PolygonTool {
    vertices: Vec<Point>,
    closed: bool,
    selected: Option<usize>,
    drag: DragState,
    suppress_next_click: bool,
    undo_stack: Vec<PolygonSnapshot>,
    events: Vec<PolygonEvent>,
    close_hit_radius: f64,
    vertex_hit_radius: f64,
    drag_threshold: f64,
}

impl Default for PolygonTool {
    fn default() -> Self {
        Self::new(&EditorConfig::default())
    }
}

impl PolygonTool {
    pub fn new(config: &EditorConfig) -> Self {
        Self {
            vertices: Vec::new(),
            closed: false,
            selected: None,
            drag: DragState::Idle,
            suppress_next_click: false,
            undo_stack: Vec::new(),
            events: Vec::new(),
            close_hit_radius: config.close_hit_radius,
            vertex_hit_radius: config.vertex_hit_radius,
            drag_threshold: config.drag_threshold,
        }
    }

    pub fn vertices(&self) -> &[Point] {
        &self.vertices
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn selected_vertex(&self) -> Option<usize> {
        self.selected
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.drag, DragState::Dragging { .. })
    }

    /// Whether the next click will be swallowed because it ends a drag
    pub fn is_click_suppressed(&self) -> bool {
        self.suppress_next_click
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn snapshot(&self) -> PolygonSnapshot {
        PolygonSnapshot { vertices: self.vertices.clone(), closed: self.closed }
    }

    /// Drain pending notifications
    pub fn take_events(&mut self) -> Vec<PolygonEvent> {
        std::mem::take(&mut self.events)
    }

    /// Index of the vertex under `pos`, nearest first
    pub fn vertex_at(&self, pos: Point) -> Option<usize> {
        self.vertices
            .iter()
            .enumerate()
            .filter(|(_, v)| is_near(pos, **v, self.vertex_hit_radius))
            .min_by(|(_, a), (_, b)| distance(pos, **a).total_cmp(&distance(pos, **b)))
            .map(|(index, _)| index)
    }

    /// Add a vertex, or close the polygon when clicking its first vertex.
    ///
    /// Returns whether the polygon changed.
    pub fn click(&mut self, pos: Point) -> bool {
        if self.suppress_next_click {
            self.suppress_next_click = false;
            return false;
        }
        if self.closed {
            return false;
        }

        if self.vertices.len() >= MIN_VERTICES
            && is_near(pos, self.vertices[0], self.close_hit_radius)
        {
            self.push_snapshot();
            self.closed = true;
            log::debug!("polygon closed with {} vertices", self.vertices.len());
            self.events.push(PolygonEvent::Changed);
            self.events.push(PolygonEvent::Closed);
            return true;
        }

        if self.vertex_at(pos).is_some() {
            return false;
        }

        self.push_snapshot();
        self.vertices.push(pos);
        log::debug!("vertex {} added at ({:.1}, {:.1})", self.vertices.len() - 1, pos.x, pos.y);
        self.events.push(PolygonEvent::Changed);
        true
    }

    pub fn pointer_down(&mut self, pos: Point) {
        match self.vertex_at(pos) {
            Some(index) => {
                self.selected = Some(index);
                self.drag = DragState::Armed { index, press: pos, before: self.snapshot() };
            }
            None => {
                self.selected = None;
                self.drag = DragState::Idle;
            }
        }
    }

    pub fn pointer_move(&mut self, pos: Point) {
        match std::mem::take(&mut self.drag) {
            DragState::Armed { index, press, before } => {
                if distance(press, pos) > self.drag_threshold {
                    self.vertices[index] = pos;
                    self.drag = DragState::Dragging { index, before };
                    self.events.push(PolygonEvent::Changed);
                } else {
                    self.drag = DragState::Armed { index, press, before };
                }
            }
            DragState::Dragging { index, before } => {
                self.vertices[index] = pos;
                self.drag = DragState::Dragging { index, before };
                self.events.push(PolygonEvent::Changed);
            }
            DragState::Idle => {}
        }
    }

    pub fn pointer_up(&mut self, _pos: Point) {
        if let DragState::Dragging { before, .. } = std::mem::take(&mut self.drag) {
            self.commit_drag(before);
            self.suppress_next_click = true;
        }
    }

    /// Pointer left the canvas: a drag in progress is committed where it is
    pub fn pointer_leave(&mut self) {
        if let DragState::Dragging { before, .. } = std::mem::take(&mut self.drag) {
            self.commit_drag(before);
        }
    }

    /// Abandon a drag in progress, putting the vertex back where it was
    pub fn cancel_interaction(&mut self) {
        if let DragState::Dragging { before, .. } = std::mem::take(&mut self.drag) {
            self.vertices = before.vertices;
            self.closed = before.closed;
            self.events.push(PolygonEvent::Changed);
        }
        self.selected = None;
        self.suppress_next_click = false;
    }

    fn commit_drag(&mut self, before: PolygonSnapshot) {
        if before.vertices == self.vertices {
            return;
        }
        self.undo_stack.push(before);
        log::debug!("vertex drag committed");
        if self.closed {
            self.events.push(PolygonEvent::Edited);
        }
    }

    /// Remove a vertex. Refused while the polygon has 3 vertices or fewer.
    pub fn delete_vertex(&mut self, index: usize) -> bool {
        if self.vertices.len() <= MIN_VERTICES || index >= self.vertices.len() {
            return false;
        }

        self.push_snapshot();
        self.vertices.remove(index);
        self.selected = None;
        self.drag = DragState::Idle;
        log::debug!("vertex {} deleted", index);
        self.events.push(PolygonEvent::Changed);
        if self.closed {
            self.events.push(PolygonEvent::Edited);
        }
        true
    }

    /// Delete the selected vertex, or ask to delete the polygon when nothing is selected
    pub fn key_down(&mut self, key: EditKey) -> bool {
        match key {
            EditKey::Delete | EditKey::Backspace => match self.selected {
                Some(index) => self.delete_vertex(index),
                None => self.request_delete(),
            },
        }
    }

    /// Secondary-button gesture: deletes the vertex under the pointer
    pub fn context_menu(&mut self, pos: Point) -> bool {
        match self.vertex_at(pos) {
            Some(index) => self.delete_vertex(index),
            None => false,
        }
    }

    /// Ask for the whole polygon to be deleted. Nothing happens here until the request is confirmed.
    pub fn request_delete(&mut self) -> bool {
        if self.vertices.is_empty() {
            return false;
        }
        self.events.push(PolygonEvent::DeleteRequested);
        true
    }

    pub fn clear(&mut self) {
        self.vertices.clear();
        self.closed = false;
        self.undo_stack.clear();
        self.reset_interaction();
        self.events.push(PolygonEvent::Changed);
    }

    /// Restore the most recent snapshot. Returns false when there is nothing to undo.
    pub fn undo(&mut self) -> bool {
        let Some(snapshot) = self.undo_stack.pop() else {
            return false;
        };

        let was_closed = self.closed;
        self.vertices = snapshot.vertices;
        self.closed = snapshot.closed;
        self.reset_interaction();

        self.events.push(PolygonEvent::Changed);
        match (was_closed, self.closed) {
            (true, false) => self.events.push(PolygonEvent::Reopened),
            (false, true) => self.events.push(PolygonEvent::Closed),
            (true, true) => self.events.push(PolygonEvent::Edited),
            (false, false) => {}
        }
        log::debug!("undo, {} snapshots left", self.undo_stack.len());
        true
    }

    /// Replace the polygon with stored vertices, discarding history
    pub fn load(&mut self, vertices: Vec<Point>, closed: bool) {
        self.vertices = vertices;
        self.closed = closed;
        self.undo_stack.clear();
        self.reset_interaction();
        self.events.push(PolygonEvent::Changed);
    }

    pub fn cursor_at(&self, pos: Point) -> CursorHint {
        if self.is_dragging() || self.vertex_at(pos).is_some() {
            CursorHint::Move
        } else {
            CursorHint::Crosshair
        }
    }

    fn push_snapshot(&mut self) {
        let snapshot = self.snapshot();
        self.undo_stack.push(snapshot);
    }

    fn reset_interaction(&mut self) {
        self.selected = None;
        self.drag = DragState::Idle;
        self.suppress_next_click = false;
    }
}
