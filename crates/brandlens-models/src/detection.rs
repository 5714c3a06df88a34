//! Detector output and per-frame detection records.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::geometry::{Geometry, GeometryError};

/// One detection exactly as the detector reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RawDetection {
    /// Raw class label
    pub class: String,

    /// Detector confidence in `[0, 1]`
    pub confidence: f32,

    /// Oriented box as four `[x, y]` points
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polygon: Option<Vec<[f64; 2]>>,

    /// Axis-aligned box as `[x1, y1, x2, y2]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<[f64; 4]>,
}

impl RawDetection {
    pub fn with_polygon(class: impl Into<String>, confidence: f32, polygon: Vec<[f64; 2]>) -> Self {
        Self {
            class: class.into(),
            confidence,
            polygon: Some(polygon),
            bbox: None,
        }
    }

    pub fn with_box(class: impl Into<String>, confidence: f32, bbox: [f64; 4]) -> Self {
        Self {
            class: class.into(),
            confidence,
            polygon: None,
            bbox: Some(bbox),
        }
    }

    /// Resolve the reported shape. A polygon wins over a box when both are present.
    pub fn geometry(&self) -> Result<Geometry, GeometryError> {
        match (&self.polygon, self.bbox) {
            (Some(points), _) => Geometry::from_polygon(points),
            (None, Some(coords)) => Geometry::from_box(coords),
            (None, None) => Err(GeometryError::Missing),
        }
    }
}

/// A detection after alias resolution and geometry validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Canonical brand name
    pub brand: String,
    pub confidence: f32,
    pub geometry: Geometry,
}

/// Persisted per-frame detection: pixel-space polygon plus derived bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DetectionRecord {
    pub brand: String,
    pub polygon: [[f64; 2]; 4],
    pub bbox: [f64; 4],
}

impl DetectionRecord {
    /// Build a record from pixel-space geometry.
    pub fn from_geometry(brand: impl Into<String>, geometry: &Geometry) -> Self {
        let v = geometry.vertices();
        Self {
            brand: brand.into(),
            polygon: [
                [v[0].x, v[0].y],
                [v[1].x, v[1].y],
                [v[2].x, v[2].y],
                [v[3].x, v[3].y],
            ],
            bbox: geometry.bbox(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_polygon_preferred_over_box() {
        let raw = RawDetection {
            class: "Nike logo".into(),
            confidence: 0.9,
            polygon: Some(vec![[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0]]),
            bbox: Some([0.0, 0.0, 0.5, 0.5]),
        };
        let g = raw.geometry().unwrap();
        assert!(g.pixel_space);
        assert!((g.area() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_geometry() {
        let raw = RawDetection {
            class: "Puma".into(),
            confidence: 0.5,
            polygon: None,
            bbox: None,
        };
        assert_eq!(raw.geometry().unwrap_err(), GeometryError::Missing);
    }

    #[test]
    fn test_raw_detection_wire_format() {
        let json = r#"{"class":"ICA City","confidence":0.8,"bbox":[1.0,2.0,3.0,4.0]}"#;
        let raw: RawDetection = serde_json::from_str(json).unwrap();
        assert_eq!(raw.class, "ICA City");
        assert_eq!(raw.bbox, Some([1.0, 2.0, 3.0, 4.0]));
        assert!(raw.polygon.is_none());
    }

    #[test]
    fn test_record_from_box() {
        let g = Geometry::from_box([10.0, 20.0, 30.0, 40.0]).unwrap();
        let record = DetectionRecord::from_geometry("Nike", &g);
        assert_eq!(record.polygon[2], [30.0, 40.0]);
        assert_eq!(record.bbox, [10.0, 20.0, 30.0, 40.0]);
    }
}
