//! Job identity and run states.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What kind of input a job analyses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobMode {
    #[default]
    Video,
    Image,
}

impl JobMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobMode::Video => "video",
            JobMode::Image => "image",
        }
    }
}

impl fmt::Display for JobMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a job. At most one job per key runs at a time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct JobKey {
    pub mode: JobMode,
    pub source: String,
    pub content_hash: String,
}

impl JobKey {
    pub fn new(mode: JobMode, source: impl Into<String>, content_hash: impl Into<String>) -> Self {
        Self {
            mode,
            source: source.into(),
            content_hash: content_hash.into(),
        }
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.mode, self.content_hash)
    }
}

/// Lifecycle of a run.
///
/// `Inferring` and `Aggregating` overlap in time, so moving between them in
/// either direction is allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    #[default]
    Idle,
    Extracting,
    Inferring,
    Aggregating,
    Assembling,
    Finalizing,
    Complete,
    Error,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Idle => "idle",
            RunState::Extracting => "extracting",
            RunState::Inferring => "inferring",
            RunState::Aggregating => "aggregating",
            RunState::Assembling => "assembling",
            RunState::Finalizing => "finalizing",
            RunState::Complete => "complete",
            RunState::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Complete | RunState::Error)
    }

    pub fn can_transition_to(&self, next: RunState) -> bool {
        use RunState::*;

        if self.is_terminal() {
            return false;
        }
        if next == Error || next == *self {
            return true;
        }
        matches!(
            (self, next),
            (Idle, Extracting)
                | (Extracting, Inferring)
                | (Extracting, Aggregating)
                | (Inferring, Aggregating)
                | (Aggregating, Inferring)
                | (Inferring, Assembling)
                | (Aggregating, Assembling)
                | (Assembling, Finalizing)
                | (Finalizing, Complete)
        )
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
