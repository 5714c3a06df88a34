//! Streaming per-frame brand metrics.
//!
//! Coverage, prominence and share-of-voice come out of one pass over a
//! frame's detections. The calculator keeps only per-brand running totals;
//! the per-frame series are emitted as [`SeriesPoint`]s for the timeline store
//! and never buffered here.

use std::collections::BTreeMap;

use brandlens_models::{BrandStats, Detection, DetectionRecord, FrameIndex, SeriesPoint};
use tracing::trace;

use crate::prominence::prominence_score;
use crate::round_to;

/// Default minimum detections for a brand to appear in the summary.
pub const DEFAULT_MIN_DETECTIONS: u64 = 50;

/// Default prominence at or above which a frame counts as high-prominence.
pub const DEFAULT_HIGH_PROMINENCE: f64 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalculatorConfig {
    /// Frames per second, zero for stills
    pub fps: f64,
    pub min_detections: u64,
    pub high_prominence_threshold: f64,
}

impl Default for CalculatorConfig {
    fn default() -> Self {
        Self {
            fps: 30.0,
            min_detections: DEFAULT_MIN_DETECTIONS,
            high_prominence_threshold: DEFAULT_HIGH_PROMINENCE,
        }
    }
}

impl CalculatorConfig {
    fn frame_time(&self) -> f64 {
        if self.fps > 0.0 {
            1.0 / self.fps
        } else {
            0.0
        }
    }
}

/// Running totals for one brand.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BrandAccumulator {
    pub frames: u64,
    pub time: f64,
    pub detections: u64,
    pub sum_coverage: f64,
    pub max_coverage: f64,
    pub sum_area_px: f64,
    pub sum_prominence: f64,
    pub max_prominence: f64,
    pub high_prominence_time: f64,
    pub sum_share_of_voice: f64,
    pub solo_time: f64,
}

/// Everything a frame contributes downstream.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FrameOutput {
    pub index: FrameIndex,
    /// A point for every brand known so far, zero when absent this frame
    pub points: Vec<SeriesPoint>,
    pub records: Vec<DetectionRecord>,
}

#[derive(Default)]
struct FrameBrand {
    detections: u64,
    area_px: f64,
    prominence: Option<f64>,
}

pub struct MetricCalculator {
    config: CalculatorConfig,
    brands: BTreeMap<String, BrandAccumulator>,
    frames_processed: u64,
    last_frame: FrameIndex,
}

impl MetricCalculator {
    pub fn new(config: CalculatorConfig) -> Self {
        Self {
            config,
            brands: BTreeMap::new(),
            frames_processed: 0,
            last_frame: 0,
        }
    }

    pub fn config(&self) -> &CalculatorConfig {
        &self.config
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    /// Highest frame index seen.
    pub fn last_frame(&self) -> FrameIndex {
        self.last_frame
    }

    pub fn accumulator(&self, brand: &str) -> Option<&BrandAccumulator> {
        self.brands.get(brand)
    }

    /// Fold one frame's detections into the accumulators.
    ///
    /// Detections with degenerate (zero-area) pixel geometry still mark the
    /// brand present but add neither coverage nor prominence.
    pub fn process_frame(
        &mut self,
        index: FrameIndex,
        width: u32,
        height: u32,
        detections: &[Detection],
    ) -> FrameOutput {
        self.frames_processed += 1;
        self.last_frame = self.last_frame.max(index);

        let frame_area = width as f64 * height as f64;
        let mut present: BTreeMap<&str, FrameBrand> = BTreeMap::new();
        let mut records = Vec::with_capacity(detections.len());

        for detection in detections {
            let pixels = detection.geometry.to_pixels(width, height);
            let entry = present.entry(detection.brand.as_str()).or_default();
            entry.detections += 1;

            let area = pixels.area();
            if area > 0.0 {
                entry.area_px += area;
                let score = prominence_score(&pixels, width, height);
                entry.prominence = Some(entry.prominence.map_or(score, |best| best.max(score)));
            }
            records.push(DetectionRecord::from_geometry(&detection.brand, &pixels));
        }

        let frame_time = self.config.frame_time();
        let others_base = present.len().saturating_sub(1);
        let mut current = BTreeMap::new();

        for (brand, seen) in &present {
            let acc = self.brands.entry(brand.to_string()).or_default();
            acc.frames += 1;
            acc.time += frame_time;
            acc.detections += seen.detections;

            let coverage = if frame_area > 0.0 {
                (seen.area_px / frame_area).min(1.0)
            } else {
                0.0
            };
            acc.sum_coverage += coverage;
            acc.sum_area_px += seen.area_px;
            acc.max_coverage = acc.max_coverage.max(coverage);

            let prominence = seen.prominence.unwrap_or(0.0);
            if seen.prominence.is_some() {
                acc.sum_prominence += prominence;
                acc.max_prominence = acc.max_prominence.max(prominence);
                if prominence >= self.config.high_prominence_threshold {
                    acc.high_prominence_time += frame_time;
                }
            }

            acc.sum_share_of_voice += 1.0 / (1.0 + others_base as f64);
            if others_base == 0 {
                acc.solo_time += frame_time;
            }

            current.insert(
                *brand,
                (round_to(coverage * 100.0, 4), round_to(prominence * 100.0, 2)),
            );
        }

        let points = self
            .brands
            .keys()
            .map(|brand| {
                let (coverage, prominence) =
                    current.get(brand.as_str()).copied().unwrap_or((0.0, 0.0));
                SeriesPoint {
                    brand: brand.clone(),
                    coverage,
                    prominence,
                }
            })
            .collect();

        trace!(frame = index, brands = present.len(), "frame processed");

        FrameOutput {
            index,
            points,
            records,
        }
    }

    /// Whole-run summary over the frames processed so far.
    ///
    /// Brands under the minimum-detection threshold are left out.
    pub fn finalize(&self) -> BTreeMap<String, BrandStats> {
        let total_frames = self.frames_processed;
        let total_time = total_frames as f64 * self.config.frame_time();
        let pct_of_total = |t: f64| if total_time > 0.0 { t / total_time * 100.0 } else { 0.0 };

        self.brands
            .iter()
            .filter(|(_, acc)| acc.detections >= self.config.min_detections)
            .map(|(brand, acc)| {
                let per_present = |sum: f64| {
                    if acc.frames > 0 {
                        sum / acc.frames as f64 * 100.0
                    } else {
                        0.0
                    }
                };
                let time = round_to(acc.time, 2).min(total_time);
                let stats = BrandStats {
                    frames: acc.frames,
                    time,
                    detections: acc.detections,
                    percentage: round_to(pct_of_total(time), 2),
                    coverage_avg_present: round_to(per_present(acc.sum_coverage), 2),
                    coverage_avg_overall: if total_frames > 0 {
                        round_to(acc.sum_coverage / total_frames as f64 * 100.0, 2)
                    } else {
                        0.0
                    },
                    coverage_max: round_to(acc.max_coverage * 100.0, 2),
                    prominence_avg_present: round_to(per_present(acc.sum_prominence), 2),
                    prominence_max: round_to(acc.max_prominence * 100.0, 2),
                    prominence_high_time: round_to(acc.high_prominence_time, 2),
                    share_of_voice_avg_present: round_to(per_present(acc.sum_share_of_voice), 2),
                    share_of_voice_solo_time: round_to(acc.solo_time, 2),
                    share_of_voice_solo_percentage: round_to(pct_of_total(acc.solo_time), 2),
                };
                (brand.clone(), stats)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brandlens_models::Geometry;

    fn detection(brand: &str, bbox: [f64; 4]) -> Detection {
        Detection {
            brand: brand.to_string(),
            confidence: 0.9,
            geometry: Geometry::from_box(bbox).unwrap(),
        }
    }

    fn calculator(min_detections: u64) -> MetricCalculator {
        MetricCalculator::new(CalculatorConfig {
            fps: 10.0,
            min_detections,
            ..Default::default()
        })
    }

    fn point<'a>(output: &'a FrameOutput, brand: &str) -> &'a SeriesPoint {
        output.points.iter().find(|p| p.brand == brand).unwrap()
    }

    #[test]
    fn test_full_frame_detection() {
        let mut calc = calculator(1);
        let out = calc.process_frame(1, 100, 50, &[detection("Nike", [0.0, 0.0, 1.0, 1.0])]);

        let p = point(&out, "Nike");
        assert!((p.coverage - 100.0).abs() < 1e-9);
        assert!((p.prominence - 100.0).abs() < 1e-9);
        assert_eq!(out.records[0].bbox, [0.0, 0.0, 100.0, 50.0]);

        let stats = calc.finalize();
        assert!((stats["Nike"].coverage_max - 100.0).abs() < 1e-9);
        assert!((stats["Nike"].percentage - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_coverage_capped_at_one() {
        let mut calc = calculator(1);
        let out = calc.process_frame(
            1,
            100,
            100,
            &[
                detection("Nike", [0.0, 0.0, 1.0, 1.0]),
                detection("Nike", [0.0, 0.0, 0.5, 0.5]),
            ],
        );
        assert!((point(&out, "Nike").coverage - 100.0).abs() < 1e-9);
        assert_eq!(calc.accumulator("Nike").unwrap().detections, 2);
    }

    #[test]
    fn test_frame_prominence_is_max_over_brand_detections() {
        let centered = detection("Nike", [40.0, 40.0, 60.0, 60.0]);
        let corner = detection("Nike", [0.0, 0.0, 10.0, 10.0]);
        let score = |d: &Detection| prominence_score(&d.geometry.to_pixels(100, 100), 100, 100);
        let (best, low) = (score(&centered), score(&corner));
        assert!(best > low);

        let mut calc = calculator(1);
        let first = calc.process_frame(1, 100, 100, &[corner.clone(), centered.clone()]);
        let second = calc.process_frame(2, 100, 100, &[centered, corner]);

        for out in [&first, &second] {
            assert!((point(out, "Nike").prominence - round_to(best * 100.0, 2)).abs() < 1e-9);
        }
        let acc = calc.accumulator("Nike").unwrap();
        assert!((acc.sum_prominence - 2.0 * best).abs() < 1e-9);
        assert!((acc.max_prominence - best).abs() < 1e-9);
        assert_eq!(acc.detections, 4);
    }

    #[test]
    fn test_share_of_voice() {
        let mut calc = calculator(1);
        calc.process_frame(
            1,
            100,
            100,
            &[
                detection("A", [0.0, 0.0, 10.0, 10.0]),
                detection("B", [20.0, 20.0, 30.0, 30.0]),
                detection("C", [40.0, 40.0, 50.0, 50.0]),
            ],
        );
        calc.process_frame(2, 100, 100, &[detection("A", [0.0, 0.0, 10.0, 10.0])]);

        let a = calc.accumulator("A").unwrap();
        assert!((a.sum_share_of_voice - (1.0 / 3.0 + 1.0)).abs() < 1e-9);
        assert!((a.solo_time - 0.1).abs() < 1e-9);

        let b = calc.accumulator("B").unwrap();
        assert!((b.sum_share_of_voice - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(b.solo_time, 0.0);

        let stats = calc.finalize();
        // (1/3 + 1) / 2 frames
        assert!((stats["A"].share_of_voice_avg_present - 66.67).abs() < 1e-9);
        assert!((stats["A"].share_of_voice_solo_percentage - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_known_brands_get_zero_points() {
        let mut calc = calculator(1);
        calc.process_frame(1, 100, 100, &[detection("A", [0.0, 0.0, 50.0, 50.0])]);
        let out = calc.process_frame(2, 100, 100, &[detection("B", [0.0, 0.0, 50.0, 50.0])]);

        assert_eq!(out.points.len(), 2);
        assert_eq!(point(&out, "A").coverage, 0.0);
        assert_eq!(point(&out, "A").prominence, 0.0);
        assert!((point(&out, "B").coverage - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_frame_still_counts() {
        let mut calc = calculator(1);
        calc.process_frame(1, 100, 100, &[detection("A", [0.0, 0.0, 50.0, 50.0])]);
        let out = calc.process_frame(2, 100, 100, &[]);
        assert_eq!(calc.frames_processed(), 2);
        assert_eq!(out.points.len(), 1);
        assert!(out.records.is_empty());

        let stats = calc.finalize();
        assert!((stats["A"].percentage - 50.0).abs() < 1e-9);
        assert!((stats["A"].coverage_avg_present - 25.0).abs() < 1e-9);
        assert!((stats["A"].coverage_avg_overall - 12.5).abs() < 1e-9);
    }

    #[test]
    fn test_zero_area_marks_presence_only() {
        let mut calc = calculator(1);
        let out = calc.process_frame(1, 100, 100, &[detection("A", [10.0, 10.0, 10.0, 40.0])]);
        assert_eq!(point(&out, "A").coverage, 0.0);
        assert_eq!(point(&out, "A").prominence, 0.0);

        let acc = calc.accumulator("A").unwrap();
        assert_eq!(acc.frames, 1);
        assert_eq!(acc.sum_prominence, 0.0);
    }

    #[test]
    fn test_min_detection_filter() {
        let mut calc = calculator(2);
        calc.process_frame(1, 100, 100, &[detection("Rare", [0.0, 0.0, 5.0, 5.0])]);
        calc.process_frame(
            2,
            100,
            100,
            &[
                detection("Common", [0.0, 0.0, 5.0, 5.0]),
                detection("Common", [10.0, 10.0, 15.0, 15.0]),
            ],
        );

        let stats = calc.finalize();
        assert!(stats.contains_key("Common"));
        assert!(!stats.contains_key("Rare"));
        assert!(calc.accumulator("Rare").is_some());
    }

    #[test]
    fn test_high_prominence_time() {
        let mut calc = calculator(1);
        calc.process_frame(1, 100, 100, &[detection("A", [0.0, 0.0, 1.0, 1.0])]);
        calc.process_frame(2, 100, 100, &[detection("A", [0.0, 0.0, 5.0, 5.0])]);

        let stats = calc.finalize();
        assert!((stats["A"].prominence_high_time - 0.1).abs() < 1e-9);
        assert!((stats["A"].prominence_max - 100.0).abs() < 1e-9);
        assert!(stats["A"].prominence_avg_present < 100.0);
    }

    #[test]
    fn test_stills_have_no_time() {
        let mut calc = MetricCalculator::new(CalculatorConfig {
            fps: 0.0,
            min_detections: 1,
            ..Default::default()
        });
        calc.process_frame(1, 100, 100, &[detection("A", [0.0, 0.0, 0.5, 0.5])]);
        let stats = calc.finalize();
        assert_eq!(stats["A"].time, 0.0);
        assert_eq!(stats["A"].percentage, 0.0);
        assert_eq!(stats["A"].frames, 1);
    }
}
