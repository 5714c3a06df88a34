//! Detection geometry.
//!
//! Detector output arrives either as an oriented quadrilateral or as an
//! axis-aligned box, in normalized `[0, 1]` or pixel coordinates. It is
//! resolved once at ingestion into a [`Geometry`] and converted to pixel
//! space by the metric calculator.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while resolving detector geometry.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GeometryError {
    #[error("detection has neither a polygon nor a box")]
    Missing,

    #[error("polygon must have exactly 4 points, got {0}")]
    WrongPointCount(usize),

    #[error("geometry contains a non-finite coordinate")]
    NonFinite,
}

/// A 2-D point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Shape of a detection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Shape {
    /// Oriented quadrilateral, vertices in drawing order
    Polygon { points: [Point; 4] },
    /// Axis-aligned box
    Box { x1: f64, y1: f64, x2: f64, y2: f64 },
}

/// A shape plus the coordinate space it is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Geometry {
    pub shape: Shape,
    /// `true` once coordinates are in pixels
    pub pixel_space: bool,
}

impl Geometry {
    /// Resolve a polygon given as `[x, y]` pairs.
    pub fn from_polygon(points: &[[f64; 2]]) -> Result<Self, GeometryError> {
        if points.len() != 4 {
            return Err(GeometryError::WrongPointCount(points.len()));
        }
        let mut vertices = [Point::new(0.0, 0.0); 4];
        for (slot, [x, y]) in vertices.iter_mut().zip(points.iter().copied()) {
            *slot = Point::new(x, y);
        }
        Self::resolve(Shape::Polygon { points: vertices })
    }

    /// Resolve a box given as `[x1, y1, x2, y2]`.
    pub fn from_box(coords: [f64; 4]) -> Result<Self, GeometryError> {
        let [x1, y1, x2, y2] = coords;
        Self::resolve(Shape::Box { x1, y1, x2, y2 })
    }

    /// Validate coordinates and detect whether they are normalized.
    ///
    /// Geometry whose coordinates are all `<= 1.0` is treated as normalized.
    fn resolve(shape: Shape) -> Result<Self, GeometryError> {
        let vertices = vertices_of(&shape);
        if vertices.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(GeometryError::NonFinite);
        }
        let normalized = vertices.iter().all(|p| p.x <= 1.0 && p.y <= 1.0);
        Ok(Self {
            shape,
            pixel_space: !normalized,
        })
    }

    /// Convert to pixel space for a `width` x `height` frame, clamping every
    /// coordinate to the frame bounds.
    pub fn to_pixels(&self, width: u32, height: u32) -> Self {
        let (w, h) = (width as f64, height as f64);
        let (sx, sy) = if self.pixel_space { (1.0, 1.0) } else { (w, h) };
        let map = |x: f64, y: f64| ((x * sx).clamp(0.0, w), (y * sy).clamp(0.0, h));

        let shape = match self.shape {
            Shape::Polygon { points } => {
                let mut out = points;
                for p in out.iter_mut() {
                    let (x, y) = map(p.x, p.y);
                    *p = Point::new(x, y);
                }
                Shape::Polygon { points: out }
            }
            Shape::Box { x1, y1, x2, y2 } => {
                let (x1, y1) = map(x1, y1);
                let (x2, y2) = map(x2, y2);
                Shape::Box { x1, y1, x2, y2 }
            }
        };
        Self {
            shape,
            pixel_space: true,
        }
    }

    /// The four corners of the shape.
    pub fn vertices(&self) -> [Point; 4] {
        vertices_of(&self.shape)
    }

    /// Enclosed area (shoelace formula), in the geometry's own units.
    pub fn area(&self) -> f64 {
        let v = self.vertices();
        let mut twice = 0.0;
        for i in 0..v.len() {
            let j = (i + 1) % v.len();
            twice += v[i].x * v[j].y - v[j].x * v[i].y;
        }
        twice.abs() / 2.0
    }

    /// Mean of the vertices.
    pub fn centroid(&self) -> Point {
        let v = self.vertices();
        let n = v.len() as f64;
        Point::new(
            v.iter().map(|p| p.x).sum::<f64>() / n,
            v.iter().map(|p| p.y).sum::<f64>() / n,
        )
    }

    /// Axis-aligned bounds as `[x_min, y_min, x_max, y_max]`.
    pub fn bbox(&self) -> [f64; 4] {
        let v = self.vertices();
        let mut out = [f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY];
        for p in v {
            out[0] = out[0].min(p.x);
            out[1] = out[1].min(p.y);
            out[2] = out[2].max(p.x);
            out[3] = out[3].max(p.y);
        }
        out
    }
}

fn vertices_of(shape: &Shape) -> [Point; 4] {
    match *shape {
        Shape::Polygon { points } => points,
        Shape::Box { x1, y1, x2, y2 } => [
            Point::new(x1, y1),
            Point::new(x2, y1),
            Point::new(x2, y2),
            Point::new(x1, y2),
        ],
    }
}
