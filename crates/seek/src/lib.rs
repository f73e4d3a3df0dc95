//! Cursors over annotated telemetry, alone or synchronised across sources.

pub mod grouped;
pub mod seeker;
pub mod source;

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

pub use grouped::{Alignment, ElementSide, GroupedSeeker, RelativeFrameLimits, RelativeTimeLimits};
pub use seeker::{LapIndices, TelemetrySeeker};
pub use source::{DataSource, DataSourceManager};

pub type SeekerHandle = Arc<RwLock<TelemetrySeeker>>;

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub enum SeekDirection {
    Forward,
    Backward,
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct SeekConfig {
    /// Step that time offsets are rounded to before comparing them.
    pub time_quanta_s: f64,
}

impl Default for SeekConfig {
    fn default() -> Self {
        Self { time_quanta_s: DEFAULT_TIME_QUANTA_S }
    }
}

pub const DEFAULT_TIME_QUANTA_S: f64 = 0.0001;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SeekError {
    #[error("index {idx} is out of range for {size} samples")]
    OutOfRange { idx: usize, size: usize },
    #[error("lap {lap} was not found")]
    LapNotFound { lap: u32 },
    #[error("seeker {seeker} ({name}) has no lap {lap}")]
    MissingLap { seeker: usize, name: String, lap: u32 },
    #[error("no data source named '{name}'")]
    SourceNotFound { name: String },
    #[error("invalid seek limit {value}: {reason}")]
    InvalidLimit { value: f64, reason: &'static str },
    #[error(transparent)]
    Timing(#[from] analysis::TrackError),
}
