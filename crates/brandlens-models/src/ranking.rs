//! Ranking brands of a finalized summary by one metric.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::summary::{BrandStats, VideoSummary};

pub const DEFAULT_TOP_N: usize = 3;
pub const MAX_TOP_N: usize = 50;

/// A rankable summary field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RankMetric {
    Percentage,
    Detections,
    Frames,
    Time,
    CoverageAvgPresent,
    CoverageAvgOverall,
    CoverageMax,
    ProminenceAvgPresent,
    ProminenceMax,
    ProminenceHighTime,
    ShareOfVoiceAvgPresent,
    ShareOfVoiceSoloTime,
    ShareOfVoiceSoloPercentage,
}

impl RankMetric {
    pub const ALL: [RankMetric; 13] = [
        RankMetric::Percentage,
        RankMetric::Detections,
        RankMetric::Frames,
        RankMetric::Time,
        RankMetric::CoverageAvgPresent,
        RankMetric::CoverageAvgOverall,
        RankMetric::CoverageMax,
        RankMetric::ProminenceAvgPresent,
        RankMetric::ProminenceMax,
        RankMetric::ProminenceHighTime,
        RankMetric::ShareOfVoiceAvgPresent,
        RankMetric::ShareOfVoiceSoloTime,
        RankMetric::ShareOfVoiceSoloPercentage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RankMetric::Percentage => "percentage",
            RankMetric::Detections => "detections",
            RankMetric::Frames => "frames",
            RankMetric::Time => "time",
            RankMetric::CoverageAvgPresent => "coverage_avg_present",
            RankMetric::CoverageAvgOverall => "coverage_avg_overall",
            RankMetric::CoverageMax => "coverage_max",
            RankMetric::ProminenceAvgPresent => "prominence_avg_present",
            RankMetric::ProminenceMax => "prominence_max",
            RankMetric::ProminenceHighTime => "prominence_high_time",
            RankMetric::ShareOfVoiceAvgPresent => "share_of_voice_avg_present",
            RankMetric::ShareOfVoiceSoloTime => "share_of_voice_solo_time",
            RankMetric::ShareOfVoiceSoloPercentage => "share_of_voice_solo_percentage",
        }
    }

    /// Resolve a metric name or one of its synonyms. Case, spaces and hyphens
    /// are ignored.
    pub fn parse(name: &str) -> Option<Self> {
        let normalized = name.trim().to_lowercase().replace([' ', '-'], "_");
        let canonical = match normalized.as_str() {
            "exposure" | "exposure_percentage" => "percentage",
            "coverage" | "present_coverage" => "coverage_avg_present",
            "overall_coverage" => "coverage_avg_overall",
            "max_coverage" => "coverage_max",
            "prominence" | "prominence_avg" => "prominence_avg_present",
            "max_prominence" => "prominence_max",
            "share_of_voice" | "sov" | "average_share_of_voice" | "avg_share_of_voice" => {
                "share_of_voice_avg_present"
            }
            "solo_time" => "share_of_voice_solo_time",
            "solo_percentage" => "share_of_voice_solo_percentage",
            other => other,
        };
        Self::ALL.into_iter().find(|m| m.as_str() == canonical)
    }

    pub fn value(&self, stats: &BrandStats) -> f64 {
        match self {
            RankMetric::Percentage => stats.percentage,
            RankMetric::Detections => stats.detections as f64,
            RankMetric::Frames => stats.frames as f64,
            RankMetric::Time => stats.time,
            RankMetric::CoverageAvgPresent => stats.coverage_avg_present,
            RankMetric::CoverageAvgOverall => stats.coverage_avg_overall,
            RankMetric::CoverageMax => stats.coverage_max,
            RankMetric::ProminenceAvgPresent => stats.prominence_avg_present,
            RankMetric::ProminenceMax => stats.prominence_max,
            RankMetric::ProminenceHighTime => stats.prominence_high_time,
            RankMetric::ShareOfVoiceAvgPresent => stats.share_of_voice_avg_present,
            RankMetric::ShareOfVoiceSoloTime => stats.share_of_voice_solo_time,
            RankMetric::ShareOfVoiceSoloPercentage => stats.share_of_voice_solo_percentage,
        }
    }

    /// Human-readable value with the metric's unit.
    pub fn format(&self, value: f64) -> String {
        match self {
            RankMetric::Percentage
            | RankMetric::CoverageAvgPresent
            | RankMetric::CoverageAvgOverall
            | RankMetric::CoverageMax
            | RankMetric::ShareOfVoiceAvgPresent
            | RankMetric::ShareOfVoiceSoloPercentage => format!("{value:.2}%"),
            RankMetric::ShareOfVoiceSoloTime => format!("{value:.2}s"),
            _ => format!("{value:.2}"),
        }
    }
}

impl fmt::Display for RankMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RankDirection {
    #[default]
    Desc,
    Asc,
}

impl FromStr for RankDirection {
    type Err = std::convert::Infallible;

    /// Anything other than `asc` ranks descending.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("asc") {
            Ok(RankDirection::Asc)
        } else {
            Ok(RankDirection::Desc)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RankedBrand {
    pub brand: String,
    pub value: f64,
    pub formatted_value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RankingResult {
    pub metric: String,
    pub direction: RankDirection,
    pub top_n: usize,
    pub total_brands_considered: usize,
    pub items: Vec<RankedBrand>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Rank the summary's brands by `metric`, ties broken by brand name ascending.
///
/// `top_n` is clamped to `1..=50`. Unknown metrics and empty summaries yield an
/// empty result carrying a message.
pub fn rank_brands(
    summary: &VideoSummary,
    metric: &str,
    top_n: Option<usize>,
    direction: RankDirection,
) -> RankingResult {
    let top_n = top_n.unwrap_or(DEFAULT_TOP_N).clamp(1, MAX_TOP_N);
    let empty = |metric: String, message: String| RankingResult {
        metric,
        direction,
        top_n,
        total_brands_considered: 0,
        items: Vec::new(),
        message: Some(message),
    };

    if summary.logo_stats.is_empty() {
        return empty(metric.to_string(), "No logo statistics available.".to_string());
    }

    let Some(rank_metric) = RankMetric::parse(metric) else {
        let allowed: Vec<&str> = RankMetric::ALL.iter().map(RankMetric::as_str).collect();
        return empty(
            metric.to_string(),
            format!("Unsupported metric. Use one of: {}.", allowed.join(", ")),
        );
    };

    let mut rows: Vec<(&str, f64)> = summary
        .logo_stats
        .iter()
        .map(|(brand, stats)| (brand.as_str(), rank_metric.value(stats)))
        .collect();

    rows.sort_by(|a, b| {
        let by_value = match direction {
            RankDirection::Desc => b.1.partial_cmp(&a.1),
            RankDirection::Asc => a.1.partial_cmp(&b.1),
        };
        by_value.unwrap_or(Ordering::Equal).then_with(|| a.0.cmp(b.0))
    });

    let total = rows.len();
    let items = rows
        .into_iter()
        .take(top_n)
        .map(|(brand, value)| RankedBrand {
            brand: brand.to_string(),
            value,
            formatted_value: rank_metric.format(value),
        })
        .collect();

    RankingResult {
        metric: rank_metric.as_str().to_string(),
        direction,
        top_n,
        total_brands_considered: total,
        items,
        message: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary_with(percentages: &[(&str, f64)]) -> VideoSummary {
        let mut summary = VideoSummary::default();
        for (brand, pct) in percentages {
            summary.logo_stats.insert(
                brand.to_string(),
                BrandStats {
                    percentage: *pct,
                    share_of_voice_solo_time: *pct / 10.0,
                    ..Default::default()
                },
            );
        }
        summary
    }

    #[test]
    fn test_ties_break_by_brand_ascending() {
        let summary = summary_with(&[("A", 50.0), ("C", 75.0), ("B", 75.0)]);
        let result = rank_brands(&summary, "percentage", Some(2), RankDirection::Desc);

        let brands: Vec<&str> = result.items.iter().map(|i| i.brand.as_str()).collect();
        assert_eq!(brands, vec!["B", "C"]);
        assert_eq!(result.total_brands_considered, 3);
        assert_eq!(result.items[0].formatted_value, "75.00%");
    }

    #[test]
    fn test_ascending() {
        let summary = summary_with(&[("A", 50.0), ("B", 75.0), ("C", 10.0)]);
        let result = rank_brands(&summary, "exposure", None, RankDirection::Asc);
        let brands: Vec<&str> = result.items.iter().map(|i| i.brand.as_str()).collect();
        assert_eq!(brands, vec!["C", "A", "B"]);
        assert_eq!(result.metric, "percentage");
    }

    #[test]
    fn test_synonyms() {
        assert_eq!(RankMetric::parse("SOV"), Some(RankMetric::ShareOfVoiceAvgPresent));
        assert_eq!(
            RankMetric::parse("Average share of voice"),
            Some(RankMetric::ShareOfVoiceAvgPresent)
        );
        assert_eq!(RankMetric::parse("share-of-voice"), Some(RankMetric::ShareOfVoiceAvgPresent));
        assert_eq!(RankMetric::parse("max coverage"), Some(RankMetric::CoverageMax));
        assert_eq!(RankMetric::parse("solo_time"), Some(RankMetric::ShareOfVoiceSoloTime));
        assert_eq!(RankMetric::parse("frames"), Some(RankMetric::Frames));
        assert_eq!(RankMetric::parse("loudness"), None);
    }

    #[test]
    fn test_unknown_metric_and_clamping() {
        let summary = summary_with(&[("A", 50.0)]);
        let result = rank_brands(&summary, "loudness", Some(500), RankDirection::Desc);
        assert!(result.items.is_empty());
        assert_eq!(result.top_n, MAX_TOP_N);
        assert!(result.message.unwrap().starts_with("Unsupported metric"));

        let result = rank_brands(&summary, "percentage", Some(0), RankDirection::Desc);
        assert_eq!(result.top_n, 1);
    }

    #[test]
    fn test_empty_summary() {
        let result = rank_brands(&VideoSummary::default(), "percentage", None, RankDirection::Desc);
        assert_eq!(result.total_brands_considered, 0);
        assert_eq!(result.message.as_deref(), Some("No logo statistics available."));
    }

    #[test]
    fn test_solo_time_formatting() {
        let summary = summary_with(&[("A", 50.0)]);
        let result = rank_brands(&summary, "solo_time", None, RankDirection::Desc);
        assert_eq!(result.items[0].formatted_value, "5.00s");
    }

    #[test]
    fn test_direction_parsing() {
        assert_eq!("ASC".parse::<RankDirection>().unwrap(), RankDirection::Asc);
        assert_eq!("whatever".parse::<RankDirection>().unwrap(), RankDirection::Desc);
    }
}
