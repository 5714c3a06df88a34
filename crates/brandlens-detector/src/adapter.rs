//! Ingestion of raw detector output.

use brandlens_models::{AliasMap, Detection, FrameIndex, RawDetection};
use tracing::debug;

/// Turns raw detections into canonical [`Detection`]s: alias resolution,
/// confidence floor and geometry validation. Malformed detections are
/// dropped individually.
#[derive(Debug, Clone)]
pub struct DetectionAdapter {
    aliases: AliasMap,
    min_confidence: f32,
}

impl DetectionAdapter {
    pub fn new(aliases: AliasMap, min_confidence: f32) -> Self {
        Self {
            aliases,
            min_confidence,
        }
    }

    pub fn ingest(&self, frame: FrameIndex, raw: Vec<RawDetection>) -> Vec<Detection> {
        raw.into_iter()
            .filter_map(|detection| {
                if detection.confidence < self.min_confidence {
                    return None;
                }
                match detection.geometry() {
                    Ok(geometry) => Some(Detection {
                        brand: self.aliases.canonical(&detection.class).to_string(),
                        confidence: detection.confidence,
                        geometry,
                    }),
                    Err(e) => {
                        debug!(frame, class = %detection.class, error = %e, "Skipping malformed detection");
                        None
                    }
                }
            })
            .collect()
    }
}

impl Default for DetectionAdapter {
    fn default() -> Self {
        Self::new(AliasMap::builtin(), 0.25)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ingest_resolves_aliases_and_filters() {
        let adapter = DetectionAdapter::default();
        let raw = vec![
            RawDetection::with_box("Adidas tekst", 0.8, [0.1, 0.1, 0.3, 0.3]),
            RawDetection::with_box("Nike logo", 0.1, [0.1, 0.1, 0.3, 0.3]),
            RawDetection::with_polygon("Puma", 0.9, vec![[0.0, 0.0], [1.0, 1.0]]),
            RawDetection::with_polygon(
                "ICA City",
                0.5,
                vec![[10.0, 10.0], [20.0, 10.0], [20.0, 20.0], [10.0, 20.0]],
            ),
        ];

        let detections = adapter.ingest(1, raw);
        let brands: Vec<&str> = detections.iter().map(|d| d.brand.as_str()).collect();
        assert_eq!(brands, vec!["Adidas", "ICA"]);
        assert!(!detections[0].geometry.pixel_space);
        assert!(detections[1].geometry.pixel_space);
    }
}
