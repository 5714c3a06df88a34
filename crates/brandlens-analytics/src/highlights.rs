//! Highlight window selection over a per-frame series.

use std::cmp::Ordering;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A selected window. Frame offsets are 0-based positions in the series,
/// `end_frame` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HighlightWindow {
    pub start_s: f64,
    pub end_s: f64,
    pub start_frame: usize,
    pub end_frame: usize,
    /// Mean series value over the window
    pub score: f64,
}

/// Best non-overlapping windows of `segment_s` seconds, enough of them to
/// cover `desired_total_s`, returned in chronological order.
///
/// Windows are ranked by mean value, ties going to the earliest start. A
/// series shorter than one window yields a single window over the whole
/// series.
pub fn best_windows(
    series: &[f64],
    fps: f64,
    desired_total_s: f64,
    segment_s: f64,
) -> Vec<HighlightWindow> {
    if series.is_empty() || !(fps > 0.0) || !(segment_s > 0.0) {
        return Vec::new();
    }

    let n = series.len();
    let window = ((segment_s * fps).round() as usize).clamp(1, n);

    let mut prefix = Vec::with_capacity(n + 1);
    prefix.push(0.0);
    for v in series {
        prefix.push(prefix[prefix.len() - 1] + v);
    }

    let mut scored: Vec<(f64, usize)> = (0..=n - window)
        .map(|start| ((prefix[start + window] - prefix[start]) / window as f64, start))
        .collect();
    scored.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(Ordering::Equal)
            .then(a.1.cmp(&b.1))
    });

    // No more than n / window disjoint windows fit in the series.
    let needed = ((desired_total_s / segment_s).ceil() as usize).clamp(1, n / window + 1);
    let mut taken = vec![false; n];
    let mut selected = Vec::with_capacity(needed);

    for (score, start) in scored {
        if selected.len() >= needed {
            break;
        }
        let end = start + window;
        if taken[start..end].iter().any(|t| *t) {
            continue;
        }
        taken[start..end].iter_mut().for_each(|t| *t = true);
        selected.push(HighlightWindow {
            start_s: start as f64 / fps,
            end_s: end as f64 / fps,
            start_frame: start,
            end_frame: end,
            score,
        });
    }

    selected.sort_by_key(|w| w.start_frame);
    selected
}

/// The single best window of `segment_s` seconds.
pub fn best_window(series: &[f64], fps: f64, segment_s: f64) -> Option<HighlightWindow> {
    best_windows(series, fps, segment_s, segment_s).into_iter().next()
}

/// Resolve a user-supplied brand name against known brands: case-insensitive
/// exact match first, then substring containment either way.
pub fn find_brand<'a, I>(query: &str, brands: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let wanted = query.trim().to_lowercase();
    if wanted.is_empty() {
        return None;
    }
    let brands: Vec<&str> = brands.into_iter().collect();

    brands
        .iter()
        .find(|b| b.to_lowercase() == wanted)
        .or_else(|| {
            brands.iter().find(|b| {
                let lower = b.to_lowercase();
                lower.contains(&wanted) || wanted.contains(&lower)
            })
        })
        .copied()
}
