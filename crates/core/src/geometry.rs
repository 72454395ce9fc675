//! Geometry kernel
//!
//! Pure functions over image-pixel coordinates: distances, hit tests,
//! bounding boxes, scale conversion and grid rasterization.
//! Origin (0, 0) is the top-left corner of the displayed image, X grows to
//! the right and Y grows downward.

use serde::{Deserialize, Serialize};

/// Millimetres per centimetre, used to turn px/cm into px/mm
const MM_PER_CM: f64 = 10.0;

/// Point in image-pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    /// Create a new point
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Calculate distance to another point
    pub fn distance_to(&self, other: &Point) -> f64 {
        distance(*self, *other)
    }

    /// Point halfway between `self` and `other`
    pub fn midpoint(&self, other: &Point) -> Point {
        Point::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }
}

/// One square sampling cell of the grid overlay
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridCell {
    /// 0-based row, counted from the top of the polygon's bounding box
    pub row: u32,
    /// 0-based column, counted from the left of the polygon's bounding box
    pub col: u32,
    /// Top-left x coordinate in pixels
    pub x: f64,
    /// Top-left y coordinate in pixels
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub center: Point,
}

/// Euclidean distance between two points
pub fn distance(a: Point, b: Point) -> f64 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    (dx * dx + dy * dy).sqrt()
}

/// Whether `point` lies within `threshold` pixels of `target` (boundary inclusive)
pub fn is_near(point: Point, target: Point, threshold: f64) -> bool {
    distance(point, target) <= threshold
}

/// Horizontal ray-casting parity test.
///
/// Points exactly on an edge may land on either side depending on the edge
/// orientation. Grid cell counts depend on this exact tie-break, so the
/// comparison below must stay as it is.
pub fn is_point_in_polygon(point: Point, vertices: &[Point]) -> bool {
    if vertices.len() < 3 {
        return false;
    }

    let Point { x, y } = point;
    let mut inside = false;
    let mut j = vertices.len() - 1;

    for i in 0..vertices.len() {
        let (xi, yi) = (vertices[i].x, vertices[i].y);
        let (xj, yj) = (vertices[j].x, vertices[j].y);

        if ((yi > y) != (yj > y)) && (x < (xj - xi) * (y - yi) / (yj - yi) + xi) {
            inside = !inside;
        }
        j = i;
    }

    inside
}

/// Bounding box of a vertex list.
///
/// Returns an all-zero box for empty input.
pub fn bounding_box(vertices: &[Point]) -> BoundingBox {
    let Some(first) = vertices.first() else {
        return BoundingBox::default();
    };

    vertices.iter().skip(1).fold(
        BoundingBox { min_x: first.x, min_y: first.y, max_x: first.x, max_y: first.y },
        |bbox, p| BoundingBox {
            min_x: bbox.min_x.min(p.x),
            min_y: bbox.min_y.min(p.y),
            max_x: bbox.max_x.max(p.x),
            max_y: bbox.max_y.max(p.y),
        },
    )
}

/// Pixels per centimetre for a calibration line of `line_length_px`
/// covering `cm_value` centimetres. Returns 0 when `cm_value <= 0`.
pub fn calculate_scale(line_length_px: f64, cm_value: f64) -> f64 {
    if cm_value <= 0.0 {
        return 0.0;
    }
    line_length_px / cm_value
}

/// Grid cell edge length in pixels: `(px_per_cm / 10) * grid_size_mm`.
/// Returns 0 if either input is `<= 0`.
pub fn calculate_cell_size(px_per_cm: f64, grid_size_mm: f64) -> f64 {
    if px_per_cm <= 0.0 || grid_size_mm <= 0.0 {
        return 0.0;
    }
    let px_per_mm = px_per_cm / MM_PER_CM;
    px_per_mm * grid_size_mm
}

/// Area enclosed by a polygon (shoelace formula), in square pixels
pub fn polygon_area(vertices: &[Point]) -> f64 {
    let n = vertices.len();
    if n < 3 {
        return 0.0;
    }
    let mut area = 0.0;
    for i in 0..n {
        let j = (i + 1) % n;
        area += vertices[i].x * vertices[j].y;
        area -= vertices[j].x * vertices[i].y;
    }
    (area / 2.0).abs()
}

/// Rasterize a square grid over the polygon's bounding box.
///
/// The grid origin is anchored at `(min_x, min_y)` and advances in
/// `cell_size_px` steps; a cell is kept iff its center is inside the polygon.
/// Cells are returned in row-major order.
pub fn generate_grid_cells(vertices: &[Point], cell_size_px: f64) -> Vec<GridCell> {
    if vertices.len() < 3 || !cell_size_px.is_finite() || cell_size_px <= 0.0 {
        return Vec::new();
    }

    let bbox = bounding_box(vertices);
    let cols = (bbox.width() / cell_size_px).ceil() as u32;
    let rows = (bbox.height() / cell_size_px).ceil() as u32;
    let half = cell_size_px / 2.0;

    let mut cells = Vec::new();
    for row in 0..rows {
        let y = bbox.min_y + f64::from(row) * cell_size_px;
        for col in 0..cols {
            let x = bbox.min_x + f64::from(col) * cell_size_px;
            let center = Point::new(x + half, y + half);
            if is_point_in_polygon(center, vertices) {
                cells.push(GridCell {
                    row,
                    col,
                    x,
                    y,
                    width: cell_size_px,
                    height: cell_size_px,
                    center,
                });
            }
        }
    }
    cells
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Vec<Point> {
        vec![
            Point::new(0.0, 0.0),
            Point::new(100.0, 0.0),
            Point::new(100.0, 100.0),
            Point::new(0.0, 100.0),
        ]
    }

    #[test]
    fn test_distance_is_symmetric_and_zero_on_self() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(300.0, 400.0);
        assert_eq!(distance(a, b), 500.0);
        assert_eq!(distance(a, b), distance(b, a));
        assert_eq!(distance(b, b), 0.0);
    }

    #[test]
    fn test_distance_negative_coordinates() {
        let a = Point::new(-100.0, -50.0);
        let b = Point::new(100.0, -50.0);
        assert_eq!(distance(a, b), 200.0);
    }

    #[test]
    fn test_is_near_inclusive_boundary() {
        let target = Point::new(100.0, 100.0);
        assert!(is_near(Point::new(105.0, 103.0), target, 10.0));
        assert!(is_near(Point::new(110.0, 100.0), target, 10.0));
        assert!(is_near(target, target, 10.0));
        assert!(!is_near(Point::new(120.0, 100.0), target, 10.0));
    }

    #[test]
    fn test_point_in_square() {
        let sq = square();
        assert!(is_point_in_polygon(Point::new(50.0, 50.0), &sq));
        assert!(!is_point_in_polygon(Point::new(150.0, 50.0), &sq));
        assert!(!is_point_in_polygon(Point::new(-10.0, 50.0), &sq));
    }

    #[test]
    fn test_point_in_polygon_needs_three_vertices() {
        let line = vec![Point::new(0.0, 0.0), Point::new(100.0, 100.0)];
        assert!(!is_point_in_polygon(Point::new(50.0, 50.0), &line));
        assert!(!is_point_in_polygon(Point::new(0.0, 0.0), &[]));
    }

    #[test]
    fn test_point_in_polygon_edge_tie_break() {
        // The top edge (y = 0) counts as inside, the bottom edge (y = 100) does not.
        let sq = square();
        assert!(is_point_in_polygon(Point::new(50.0, 0.0), &sq));
        assert!(!is_point_in_polygon(Point::new(50.0, 100.0), &sq));
        // Left edge is inside, right edge is outside.
        assert!(is_point_in_polygon(Point::new(0.0, 50.0), &sq));
        assert!(!is_point_in_polygon(Point::new(100.0, 50.0), &sq));
    }

    #[test]
    fn test_point_in_concave_polygon() {
        // U shape opening upward
        let u = vec![
            Point::new(0.0, 0.0),
            Point::new(30.0, 0.0),
            Point::new(30.0, 70.0),
            Point::new(70.0, 70.0),
            Point::new(70.0, 0.0),
            Point::new(100.0, 0.0),
            Point::new(100.0, 100.0),
            Point::new(0.0, 100.0),
        ];
        assert!(is_point_in_polygon(Point::new(15.0, 50.0), &u));
        assert!(!is_point_in_polygon(Point::new(50.0, 30.0), &u));
        assert!(is_point_in_polygon(Point::new(50.0, 85.0), &u));
    }

    #[test]
    fn test_bounding_box() {
        assert_eq!(bounding_box(&[]), BoundingBox::default());

        let single = bounding_box(&[Point::new(7.0, 9.0)]);
        assert_eq!(single, BoundingBox { min_x: 7.0, min_y: 9.0, max_x: 7.0, max_y: 9.0 });

        let tri = bounding_box(&[
            Point::new(100.0, 100.0),
            Point::new(200.0, 100.0),
            Point::new(150.0, 200.0),
        ]);
        assert_eq!(tri, BoundingBox { min_x: 100.0, min_y: 100.0, max_x: 200.0, max_y: 200.0 });
        assert_eq!(tri.width(), 100.0);
        assert_eq!(tri.height(), 100.0);
    }

    #[test]
    fn test_calculate_scale() {
        assert_eq!(calculate_scale(450.0, 10.0), 45.0);
        assert_eq!(calculate_scale(450.0, 0.0), 0.0);
        assert_eq!(calculate_scale(450.0, -5.0), 0.0);
    }

    #[test]
    fn test_calculate_cell_size() {
        assert_eq!(calculate_cell_size(45.0, 1.0), 4.5);
        assert_eq!(calculate_cell_size(45.0, 2.0), 9.0);
        assert_eq!(calculate_cell_size(100.0, 1.0), 10.0);
        assert_eq!(calculate_cell_size(50.0, 0.5), 2.5);
        assert_eq!(calculate_cell_size(0.0, 1.0), 0.0);
        assert_eq!(calculate_cell_size(-10.0, 1.0), 0.0);
        assert_eq!(calculate_cell_size(45.0, 0.0), 0.0);
        assert_eq!(calculate_cell_size(45.0, -1.0), 0.0);
    }

    #[test]
    fn test_polygon_area_shoelace() {
        let tri = vec![Point::new(0.0, 0.0), Point::new(10.0, 0.0), Point::new(5.0, 10.0)];
        assert!((polygon_area(&tri) - 50.0).abs() < 1e-9);
        assert_eq!(polygon_area(&square()), 10_000.0);
        assert_eq!(polygon_area(&tri[..2]), 0.0);
    }

    #[test]
    fn test_grid_cells_on_square() {
        let sq = square();
        let cells = generate_grid_cells(&sq, 10.0);
        assert_eq!(cells.len(), 100);

        let first = cells[0];
        assert_eq!((first.row, first.col), (0, 0));
        assert_eq!(first.center, Point::new(5.0, 5.0));

        let last = cells[cells.len() - 1];
        assert_eq!((last.row, last.col), (9, 9));
    }

    #[test]
    fn test_grid_cells_inside_polygon_and_sized() {
        let sq = square();
        for size in [3.0, 4.5, 10.0, 33.0] {
            for cell in generate_grid_cells(&sq, size) {
                assert!(is_point_in_polygon(cell.center, &sq));
                assert_eq!(cell.width, size);
                assert_eq!(cell.height, size);
            }
        }
    }

    #[test]
    fn test_grid_cell_count_decreases_with_size() {
        let sq = square();
        let counts: Vec<usize> =
            [2.0, 5.0, 10.0, 20.0, 50.0].iter().map(|s| generate_grid_cells(&sq, *s).len()).collect();
        for pair in counts.windows(2) {
            assert!(pair[0] > pair[1], "counts should strictly decrease: {:?}", counts);
        }
    }

    #[test]
    fn test_grid_cells_aligned_to_bounding_box() {
        let offset = vec![
            Point::new(200.0, 150.0),
            Point::new(400.0, 150.0),
            Point::new(400.0, 350.0),
            Point::new(200.0, 350.0),
        ];
        let cells = generate_grid_cells(&offset, 50.0);
        assert_eq!(cells.len(), 16);
        assert_eq!((cells[0].x, cells[0].y), (200.0, 150.0));
    }

    #[test]
    fn test_grid_cells_triangle_clips_corners() {
        let tri = vec![Point::new(0.0, 0.0), Point::new(100.0, 0.0), Point::new(0.0, 100.0)];
        let cells = generate_grid_cells(&tri, 10.0);
        // Cells whose center lies below the hypotenuse: row + col < 9.5
        assert_eq!(cells.len(), 45);
        assert!(cells.iter().all(|c| c.row + c.col <= 8));
    }

    #[test]
    fn test_grid_cells_degenerate_inputs() {
        let sq = square();
        assert!(generate_grid_cells(&sq, 0.0).is_empty());
        assert!(generate_grid_cells(&sq, -1.0).is_empty());
        assert!(generate_grid_cells(&sq, f64::NAN).is_empty());
        assert!(generate_grid_cells(&sq[..2], 10.0).is_empty());
    }
}
