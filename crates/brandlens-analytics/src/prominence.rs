//! Visual prominence of a detection.
//!
//! `prominence = 0.6 * centeredness + 0.4 * sqrt(area / frame_area)`, where
//! centeredness is a 2-D Gaussian falloff around the frame center with
//! `sigma_x = 0.3 * width` and `sigma_y = 0.3 * height`.

use brandlens_models::Geometry;

pub const CENTER_WEIGHT: f64 = 0.6;
pub const SIZE_WEIGHT: f64 = 0.4;
pub const SIGMA_FRACTION: f64 = 0.3;

/// Gaussian falloff in `(0, 1]`, 1.0 at the frame center.
pub fn centeredness(cx: f64, cy: f64, width: f64, height: f64) -> f64 {
    let sigma_x = SIGMA_FRACTION * width;
    let sigma_y = SIGMA_FRACTION * height;
    if sigma_x <= 0.0 || sigma_y <= 0.0 {
        return 0.0;
    }
    let dx = cx - width / 2.0;
    let dy = cy - height / 2.0;
    (-(dx * dx / (2.0 * sigma_x * sigma_x) + dy * dy / (2.0 * sigma_y * sigma_y))).exp()
}

/// `sqrt` of the area ratio, clamped to `[0, 1]`.
pub fn size_factor(area: f64, frame_area: f64) -> f64 {
    if frame_area <= 0.0 {
        return 0.0;
    }
    (area / frame_area).clamp(0.0, 1.0).sqrt()
}

/// Prominence in `[0, 1]` for pixel-space geometry inside a `width` x `height` frame.
pub fn prominence_score(geometry: &Geometry, width: u32, height: u32) -> f64 {
    let (w, h) = (width as f64, height as f64);
    let c = geometry.centroid();
    CENTER_WEIGHT * centeredness(c.x, c.y, w, h) + SIZE_WEIGHT * size_factor(geometry.area(), w * h)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_frame_is_maximal() {
        let g = Geometry::from_box([0.0, 0.0, 1.0, 1.0]).unwrap().to_pixels(640, 360);
        assert!((size_factor(g.area(), 640.0 * 360.0) - 1.0).abs() < 1e-9);
        assert!((prominence_score(&g, 640, 360) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_centeredness_falloff() {
        assert!((centeredness(50.0, 50.0, 100.0, 100.0) - 1.0).abs() < 1e-12);

        // One sigma off-center horizontally: exp(-0.5)
        let c = centeredness(80.0, 50.0, 100.0, 100.0);
        assert!((c - (-0.5f64).exp()).abs() < 1e-9);

        assert!(centeredness(0.0, 0.0, 100.0, 100.0) < centeredness(25.0, 25.0, 100.0, 100.0));
    }

    #[test]
    fn test_degenerate_frame() {
        assert_eq!(centeredness(0.0, 0.0, 0.0, 0.0), 0.0);
        assert_eq!(size_factor(10.0, 0.0), 0.0);
    }

    #[test]
    fn test_corner_detection_scores_low() {
        let g = Geometry::from_box([0.0, 0.0, 10.0, 10.0]).unwrap();
        let score = prominence_score(&g, 1000, 1000);
        assert!(score < 0.1, "score {score}");
    }
}
