//! Scale calibration line
//!
//! Turns pointer events into a single ruler line per image. The line is
//! drawn with a press-drag-release gesture, its endpoints can be dragged
//! afterwards, and confirming it with a real-world length yields the
//! pixel-per-centimetre scale for the image.

use crate::config::EditorConfig;
use crate::error::ValidationError;
use crate::geometry::{calculate_scale, distance, is_near, Point};
use crate::persistence::ScaleData;
use serde::{Deserialize, Serialize};

/// Which end of the scale line is being dragged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endpoint {
    Start,
    End,
}

/// Ruler line used for calibration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaleLine {
    pub start: Point,
    pub end: Point,
    /// Set once a release produced a line longer than the minimum length
    pub is_complete: bool,
    pub is_dragging: bool,
    pub drag_target: Option<Endpoint>,
}

impl ScaleLine {
    /// Create a completed line
    pub fn complete(start: Point, end: Point) -> Self {
        Self { start, end, is_complete: true, is_dragging: false, drag_target: None }
    }

    /// Create a provisional line shown while drawing
    fn provisional(start: Point, end: Point) -> Self {
        Self { start, end, is_complete: false, is_dragging: false, drag_target: None }
    }

    /// Length of the line in pixels
    pub fn length(&self) -> f64 {
        distance(self.start, self.end)
    }

    /// Where the length label is anchored
    pub fn label_position(&self) -> Point {
        self.start.midpoint(&self.end)
    }

    /// Copy of the line with one endpoint moved
    pub fn with_endpoint(&self, endpoint: Endpoint, position: Point) -> Self {
        let mut line = *self;
        match endpoint {
            Endpoint::Start => line.start = position,
            Endpoint::End => line.end = position,
        }
        line
    }

    fn endpoint(&self, endpoint: Endpoint) -> Point {
        match endpoint {
            Endpoint::Start => self.start,
            Endpoint::End => self.end,
        }
    }
}

/// Calibration derived from a confirmed line
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaleValue {
    pub px_per_cm: f64,
    pub cm_value: f64,
    pub line_length: f64,
}

impl ScaleValue {
    /// Build the scale for `line` measuring `cm_value` centimetres
    pub fn from_line(line: &ScaleLine, cm_value: f64) -> Self {
        let line_length = line.length();
        Self { px_per_cm: calculate_scale(line_length, cm_value), cm_value, line_length }
    }
}

/// Cursor to show over the scale canvas
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorHint {
    Crosshair,
    Grab,
    Grabbing,
    Move,
}

/// Notifications produced by the scale tool
#[derive(Debug, Clone, PartialEq)]
pub enum ScaleEvent {
    /// The rendered line changed (provisional, dragged, removed)
    LineChanged(Option<ScaleLine>),
    /// A draw or endpoint drag was committed
    LineCompleted(ScaleLine),
}

/// Pointer state machine for the calibration line
#[derive(Debug)]
pub struct ScaleTool {
    line: Option<ScaleLine>,
    /// Anchor of a line currently being drawn
    draw_start: Option<Point>,
    endpoint_hit_radius: f64,
    min_line_length: f64,
    events: Vec<ScaleEvent>,
}

impl Default for ScaleTool {
    fn default() -> Self {
        Self::new(&EditorConfig::default())
    }
}

impl ScaleTool {
    pub fn new(config: &EditorConfig) -> Self {
        Self {
            line: None,
            draw_start: None,
            endpoint_hit_radius: config.endpoint_hit_radius,
            min_line_length: config.min_line_length,
            events: Vec::new(),
        }
    }

    /// Current line, provisional or complete
    pub fn line(&self) -> Option<&ScaleLine> {
        self.line.as_ref()
    }

    /// Whether a line is being drawn right now
    pub fn is_drawing(&self) -> bool {
        self.draw_start.is_some()
    }

    /// Replace the line wholesale (used when restoring saved state)
    pub fn set_line(&mut self, line: Option<ScaleLine>) {
        self.line = line;
        self.draw_start = None;
        self.events.push(ScaleEvent::LineChanged(self.line));
    }

    /// Rebuild the completed line and its scale from a persisted calibration
    pub fn restore(&mut self, data: &ScaleData) -> ScaleValue {
        let line = ScaleLine::complete(data.line_start(), data.line_end());
        self.set_line(Some(line));
        ScaleValue { px_per_cm: data.px_per_cm, cm_value: data.cm_value, line_length: line.length() }
    }

    /// Remove the line and any in-progress draw
    pub fn clear(&mut self) {
        self.line = None;
        self.draw_start = None;
        self.events.push(ScaleEvent::LineChanged(None));
    }

    /// Drop an in-progress draw or endpoint drag without committing it
    pub fn cancel_interaction(&mut self) {
        self.draw_start = None;
        match self.line {
            Some(line) if !line.is_complete => self.line = None,
            Some(ref mut line) => {
                line.is_dragging = false;
                line.drag_target = None;
            }
            None => {}
        }
    }

    /// Drain pending notifications
    pub fn take_events(&mut self) -> Vec<ScaleEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn pointer_down(&mut self, pos: Point) {
        if let Some(line) = self.line.filter(|l| l.is_complete) {
            for endpoint in [Endpoint::Start, Endpoint::End] {
                if is_near(pos, line.endpoint(endpoint), self.endpoint_hit_radius) {
                    self.line = Some(ScaleLine {
                        is_dragging: true,
                        drag_target: Some(endpoint),
                        ..line
                    });
                    log::debug!("scale endpoint {:?} grabbed", endpoint);
                    return;
                }
            }
        }

        self.draw_start = Some(pos);
        if self.line.take().is_some() {
            self.events.push(ScaleEvent::LineChanged(None));
        }
    }

    pub fn pointer_move(&mut self, pos: Point) {
        if let Some(line) = self.line {
            if let (true, Some(target)) = (line.is_dragging, line.drag_target) {
                self.line = Some(line.with_endpoint(target, pos));
                self.events.push(ScaleEvent::LineChanged(self.line));
                return;
            }
        }

        if let Some(start) = self.draw_start {
            self.line = Some(ScaleLine::provisional(start, pos));
            self.events.push(ScaleEvent::LineChanged(self.line));
        }
    }

    pub fn pointer_up(&mut self, pos: Point) {
        if let Some(line) = self.line.filter(|l| l.is_dragging) {
            let committed = ScaleLine { is_dragging: false, drag_target: None, ..line };
            self.line = Some(committed);
            log::debug!("scale line adjusted to {:.1}px", committed.length());
            self.events.push(ScaleEvent::LineChanged(self.line));
            self.events.push(ScaleEvent::LineCompleted(committed));
            return;
        }

        if let Some(start) = self.draw_start.take() {
            if distance(start, pos) > self.min_line_length {
                let line = ScaleLine::complete(start, pos);
                self.line = Some(line);
                log::debug!("scale line drawn, {:.1}px", line.length());
                self.events.push(ScaleEvent::LineChanged(self.line));
                self.events.push(ScaleEvent::LineCompleted(line));
            } else {
                // Too short to be intentional
                self.line = None;
                self.events.push(ScaleEvent::LineChanged(None));
            }
        }
    }

    /// Pointer left the canvas: an unfinished draw is abandoned
    pub fn pointer_leave(&mut self) {
        // An endpoint drag is not a draw and keeps going
        if self.draw_start.take().is_some() && self.line.take().is_some() {
            self.events.push(ScaleEvent::LineChanged(None));
        }
    }

    pub fn cursor_at(&self, pos: Point) -> CursorHint {
        match self.line {
            Some(line) if line.is_dragging => CursorHint::Grabbing,
            Some(line)
                if is_near(pos, line.start, self.endpoint_hit_radius)
                    || is_near(pos, line.end, self.endpoint_hit_radius) =>
            {
                CursorHint::Grab
            }
            _ => CursorHint::Crosshair,
        }
    }

    /// Validate the real-world length of the committed line and derive the scale.
    ///
    /// Leaves the tool untouched on error.
    pub fn confirm(&self, cm_value: f64) -> Result<(ScaleValue, ScaleData), ValidationError> {
        let line = self
            .line
            .filter(|l| l.is_complete && !l.is_dragging)
            .ok_or(ValidationError::NoCompletedLine)?;

        if !cm_value.is_finite() || cm_value <= 0.0 {
            return Err(ValidationError::InvalidCmValue(cm_value));
        }

        let value = ScaleValue::from_line(&line, cm_value);
        let data = ScaleData::from_line(&line, value.px_per_cm, cm_value);
        Ok((value, data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drawn(from: Point, to: Point) -> ScaleTool {
        let mut tool = ScaleTool::default();
        tool.pointer_down(from);
        tool.pointer_move(to);
        tool.pointer_up(to);
        tool
    }

    #[test]
    fn test_draw_commits_long_line() {
        let tool = drawn(Point::new(100.0, 100.0), Point::new(300.0, 100.0));
        let line = tool.line().copied().unwrap();
        assert!(line.is_complete);
        assert_eq!(line.start, Point::new(100.0, 100.0));
        assert_eq!(line.end, Point::new(300.0, 100.0));
        assert_eq!(line.length(), 200.0);
    }

    #[test]
    fn test_short_release_discards_line() {
        let tool = drawn(Point::new(100.0, 100.0), Point::new(105.0, 103.0));
        assert!(tool.line().is_none());

        // Exactly the minimum is still too short
        let tool = drawn(Point::new(0.0, 0.0), Point::new(10.0, 0.0));
        assert!(tool.line().is_none());
    }

    #[test]
    fn test_provisional_line_while_drawing() {
        let mut tool = ScaleTool::default();
        tool.pointer_down(Point::new(10.0, 10.0));
        tool.pointer_move(Point::new(50.0, 10.0));
        let line = tool.line().copied().unwrap();
        assert!(!line.is_complete);
        assert!(tool.is_drawing());
    }

    #[test]
    fn test_completion_event_emitted() {
        let mut tool = drawn(Point::new(0.0, 0.0), Point::new(0.0, 150.0));
        let events = tool.take_events();
        assert!(matches!(events.last(), Some(ScaleEvent::LineCompleted(l)) if l.length() == 150.0));
        assert!(tool.take_events().is_empty());
    }

    #[test]
    fn test_drag_end_endpoint() {
        let mut tool = drawn(Point::new(100.0, 100.0), Point::new(200.0, 100.0));
        tool.take_events();

        tool.pointer_down(Point::new(205.0, 102.0));
        assert_eq!(tool.line().unwrap().drag_target, Some(Endpoint::End));
        assert_eq!(tool.cursor_at(Point::new(0.0, 0.0)), CursorHint::Grabbing);

        tool.pointer_move(Point::new(400.0, 100.0));
        tool.pointer_up(Point::new(400.0, 100.0));

        let line = tool.line().copied().unwrap();
        assert_eq!(line.start, Point::new(100.0, 100.0));
        assert_eq!(line.end, Point::new(400.0, 100.0));
        assert_eq!(line.length(), 300.0);
        assert!(!line.is_dragging);
        assert!(line.drag_target.is_none());
        assert!(tool
            .take_events()
            .iter()
            .any(|e| matches!(e, ScaleEvent::LineCompleted(l) if l.end.x == 400.0)));
    }

    #[test]
    fn test_drag_start_endpoint_only_moves_start() {
        let mut tool = drawn(Point::new(100.0, 100.0), Point::new(300.0, 100.0));
        tool.pointer_down(Point::new(110.0, 100.0));
        tool.pointer_move(Point::new(50.0, 75.0));
        tool.pointer_up(Point::new(50.0, 75.0));

        let line = tool.line().copied().unwrap();
        assert_eq!(line.start, Point::new(50.0, 75.0));
        assert_eq!(line.end, Point::new(300.0, 100.0));
    }

    #[test]
    fn test_press_away_from_endpoints_starts_new_line() {
        let mut tool = drawn(Point::new(100.0, 100.0), Point::new(300.0, 100.0));
        tool.pointer_down(Point::new(200.0, 300.0));
        assert!(tool.line().is_none());
        tool.pointer_move(Point::new(200.0, 400.0));
        tool.pointer_up(Point::new(200.0, 400.0));
        let line = tool.line().copied().unwrap();
        assert_eq!(line.start, Point::new(200.0, 300.0));
        assert!(line.is_complete);
    }

    #[test]
    fn test_leave_cancels_draw() {
        let mut tool = ScaleTool::default();
        tool.pointer_down(Point::new(0.0, 0.0));
        tool.pointer_move(Point::new(80.0, 0.0));
        tool.pointer_leave();
        assert!(tool.line().is_none());
        assert!(!tool.is_drawing());

        // Releasing afterwards does not resurrect the line
        tool.pointer_up(Point::new(80.0, 0.0));
        assert!(tool.line().is_none());
    }

    #[test]
    fn test_cursor_hints() {
        let tool = drawn(Point::new(100.0, 100.0), Point::new(300.0, 100.0));
        assert_eq!(tool.cursor_at(Point::new(112.0, 105.0)), CursorHint::Grab);
        assert_eq!(tool.cursor_at(Point::new(200.0, 200.0)), CursorHint::Crosshair);
    }

    #[test]
    fn test_confirm_computes_px_per_cm() {
        let tool = drawn(Point::new(100.0, 200.0), Point::new(400.0, 200.0));
        let (value, data) = tool.confirm(10.0).unwrap();
        assert_eq!(value.line_length, 300.0);
        assert_eq!(value.px_per_cm, 30.0);
        assert_eq!(data.px_per_cm, 30.0);
        assert_eq!(data.line_start_x, 100.0);
        assert_eq!(data.line_end_x, 400.0);
        assert_eq!(data.cm_value, 10.0);
    }

    #[test]
    fn test_confirm_rejects_bad_values() {
        let tool = drawn(Point::new(100.0, 200.0), Point::new(400.0, 200.0));
        for bad in [0.0, -3.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(tool.confirm(bad), Err(ValidationError::InvalidCmValue(_))));
        }
        assert!(tool.line().unwrap().is_complete);

        let empty = ScaleTool::default();
        assert_eq!(empty.confirm(10.0), Err(ValidationError::NoCompletedLine));
    }

    #[test]
    fn test_restore_from_saved_calibration() {
        let data = ScaleData {
            px_per_cm: 45.0,
            line_start_x: 100.0,
            line_start_y: 100.0,
            line_end_x: 550.0,
            line_end_y: 100.0,
            cm_value: 10.0,
        };
        let mut tool = ScaleTool::default();
        let value = tool.restore(&data);

        assert_eq!(value.px_per_cm, 45.0);
        assert_eq!(value.line_length, 450.0);
        let line = tool.line().copied().unwrap();
        assert!(line.is_complete);
        assert_eq!(line.start, Point::new(100.0, 100.0));
        assert_eq!(line.end, Point::new(550.0, 100.0));
    }

    #[test]
    fn test_clear_resets_to_empty() {
        let mut tool = drawn(Point::new(0.0, 0.0), Point::new(100.0, 0.0));
        tool.clear();
        assert!(tool.line().is_none());
        assert_eq!(tool.take_events().last(), Some(&ScaleEvent::LineChanged(None)));
    }

    #[test]
    fn test_label_position_is_midpoint() {
        let line = ScaleLine::complete(Point::new(0.0, 0.0), Point::new(100.0, 50.0));
        assert_eq!(line.label_position(), Point::new(50.0, 25.0));
    }
}
