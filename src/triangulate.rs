//! Polygon triangulation for mask meshes.
//!
//! Wrapper around earcutr. Ear clipping is deterministic, so the same point
//! sequence always yields the same vertex and index buffers.

use crate::error::PolygonIssue;
use crate::utils::Position;

/// Minimum enclosed area, in square pixels, for a polygon to be meshed.
pub const MIN_POLYGON_AREA: f32 = 100.0;

/// Consecutive points closer than this on both axes count as duplicates.
pub const DUPLICATE_EPSILON: f32 = 0.5;

/// Triangle mesh in the polygon's own coordinate space.
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh2D {
    /// Flat (x, y) pairs.
    pub vertices: Vec<f32>,
    /// Triangle index triples into `vertices`.
    pub indices: Vec<u32>,
}

impl Mesh2D {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / 2
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn positions(&self) -> impl Iterator<Item = Position> + '_ {
        self.vertices
            .chunks_exact(2)
            .map(|xy| Position::new(xy[0], xy[1]))
    }
}

/// Shoelace area; positive for counter-clockwise winding in a y-up frame.
pub fn signed_area(points: &[Position]) -> f32 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut twice = 0.0f64;
    for (i, p) in points.iter().enumerate() {
        let q = &points[(i + 1) % points.len()];
        twice += p.x as f64 * q.y as f64 - q.x as f64 * p.y as f64;
    }
    (twice * 0.5) as f32
}

/// Checks a polygon before triangulation so callers get a precise reason.
pub fn validate_polygon(points: &[Position]) -> Result<(), PolygonIssue> {
    let n = points.len();
    if n < 3 {
        return Err(PolygonIssue::TooFewPoints(n));
    }

    for index in 0..n {
        let next = (index + 1) % n;
        let (a, b) = (points[index], points[next]);
        if (a.x - b.x).abs() < DUPLICATE_EPSILON && (a.y - b.y).abs() < DUPLICATE_EPSILON {
            return Err(PolygonIssue::DuplicatePoint { index, next });
        }
    }

    // screen polygons arrive in either winding
    let area = signed_area(points).abs();
    if !(area >= MIN_POLYGON_AREA) {
        return Err(PolygonIssue::AreaTooSmall { area });
    }
    Ok(())
}

/// Triangulates a simple (possibly concave) polygon.
///
/// Returns `None` for fewer than 3 points or when no triangle comes out;
/// never panics on degenerate input.
pub fn triangulate(points: &[Position]) -> Option<Mesh2D> {
    let n = points.len();
    if n < 3 {
        return None;
    }
    if points.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
        return None;
    }

    // Flatten points for earcutr
    let mut coords = Vec::with_capacity(n * 2);
    for p in points {
        coords.push(p.x as f64);
        coords.push(p.y as f64);
    }

    let indices = earcutr::earcut(&coords, &[], 2).ok()?;
    if indices.len() < 3 {
        return None;
    }

    Some(Mesh2D {
        vertices: points.iter().flat_map(|p| [p.x, p.y]).collect(),
        indices: indices.into_iter().map(|i| i as u32).collect(),
    })
}

/// Validate, then triangulate.
pub fn mesh_polygon(points: &[Position]) -> Result<Mesh2D, PolygonIssue> {
    validate_polygon(points)?;
    triangulate(points).ok_or(PolygonIssue::NoTriangles)
}
