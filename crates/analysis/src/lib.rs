//! Track geometry and lap/sector timing over telemetry samples.

pub mod geometry;
pub mod timing;
pub mod track;

pub use geometry::{dd2m, do_intersect, m2dd, DetectionGate, DECDEG_PER_METER};
pub use timing::{compute_track_times, compute_track_times_with, TimingConfig};
pub use track::{GateKind, PathObject, Track, TrackGate, TrackSector, DEFAULT_GATE_WIDTH_M};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TrackError {
    #[error("path index {idx} is out of range for a path of {len} points")]
    OutOfRange { idx: usize, len: usize },
    #[error("track path is empty")]
    EmptyPath,
    #[error("sector entry and exit are the same path index")]
    SectorNoWidth,
    #[error("sector exit falls before its entry")]
    ExitBeforeEntry,
    #[error("sector {entry}..{exit} overlaps an existing sector")]
    Overlap { entry: usize, exit: usize },
    #[error("no sector at index {idx}")]
    SectorNotFound { idx: usize },
}
