//! Per-frame brand series.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One brand's values for one frame, in percent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SeriesPoint {
    pub brand: String,
    /// Coverage in percent, 4 decimals
    pub coverage: f64,
    /// Prominence in percent, 2 decimals
    pub prominence: f64,
}

impl SeriesPoint {
    /// Absent brands are recorded as zero points.
    pub fn is_zero(&self) -> bool {
        self.coverage == 0.0 && self.prominence == 0.0
    }
}

/// Which per-frame value to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SeriesMetric {
    #[default]
    Coverage,
    Prominence,
}

impl SeriesMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeriesMetric::Coverage => "coverage",
            SeriesMetric::Prominence => "prominence",
        }
    }
}

impl fmt::Display for SeriesMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SeriesMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "coverage" => Ok(SeriesMetric::Coverage),
            "prominence" => Ok(SeriesMetric::Prominence),
            other => Err(format!("unknown series metric '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_parsing() {
        assert_eq!("Coverage".parse::<SeriesMetric>().unwrap(), SeriesMetric::Coverage);
        assert_eq!("prominence".parse::<SeriesMetric>().unwrap(), SeriesMetric::Prominence);
        assert!("sov".parse::<SeriesMetric>().is_err());
    }
}
