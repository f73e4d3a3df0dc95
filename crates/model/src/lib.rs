use std::ops::{Add, Sub};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Latitude/longitude pair in decimal degrees.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct Coord {
    pub lat: f64,
    pub lon: f64,
}

impl Coord {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Squared euclidean distance in degree space.
    pub fn dist_sq(&self, other: &Coord) -> f64 {
        let dlat = other.lat - self.lat;
        let dlon = other.lon - self.lon;
        dlat * dlat + dlon * dlon
    }
}

impl Add for Coord {
    type Output = Coord;
    fn add(self, rhs: Coord) -> Coord {
        Coord { lat: self.lat + rhs.lat, lon: self.lon + rhs.lon }
    }
}

impl Sub for Coord {
    type Output = Coord;
    fn sub(self, rhs: Coord) -> Coord {
        Coord { lat: self.lat - rhs.lat, lon: self.lon - rhs.lon }
    }
}

impl From<(f64, f64)> for Coord {
    fn from((lat, lon): (f64, f64)) -> Self {
        Coord { lat, lon }
    }
}

// Engine control unit channels. Carried along, never interpreted here.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct EcuSample {
    pub engine_speed_rpm: f32,
    pub tps: f32, // 0..100
    pub boost_psi: f32,
}

/// Fields written by the track timing pass.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq)]
pub struct CalcSample {
    /// Position snapped onto the nearest point of the track path.
    pub on_track: Coord,
    /// -1 when outside of a lap, otherwise counts up from 1.
    pub lap: i32,
    /// Seconds since the start gate was crossed (0 when lap == -1).
    pub lap_time_offset: f64,
    /// -1 when outside of a sector, otherwise a sequence number starting at 1.
    pub sector: i32,
    /// Seconds since the sector entry gate was crossed (0 when sector == -1).
    pub sector_time_offset: f64,
}

impl Default for CalcSample {
    fn default() -> Self {
        Self {
            on_track: Coord::default(),
            lap: -1,
            lap_time_offset: 0.0,
            sector: -1,
            sector_time_offset: 0.0,
        }
    }
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct TelemetrySample {
    /// Seconds from the beginning of the recording.
    pub t_offset: f64,
    pub coord: Coord,
    pub speed_mps: f64,
    #[serde(default)]
    pub ecu: EcuSample,
    #[serde(default)]
    pub calc: CalcSample,
}

impl TelemetrySample {
    pub fn at(t_offset: f64, coord: Coord) -> Self {
        Self { t_offset, coord, ..Default::default() }
    }
}

pub type TelemetrySamples = Vec<TelemetrySample>;

/// Sample sequence shared between a source, its seeker and any viewers.
pub type SharedSamples = Arc<RwLock<TelemetrySamples>>;

pub fn shared(samples: TelemetrySamples) -> SharedSamples {
    Arc::new(RwLock::new(samples))
}

/// Clears every computed field back to "not in a lap / sector".
pub fn reset_calc(samples: &mut [TelemetrySample]) {
    for s in samples {
        s.calc = CalcSample::default();
    }
}

/// Average sample rate over the whole sequence.
pub fn avg_rate_hz(samples: &[TelemetrySample]) -> f64 {
    if samples.len() <= 1 {
        return 0.0;
    }
    let t_last = samples.last().map(|s| s.t_offset).unwrap_or(0.0);
    if t_last <= 0.0 {
        return 0.0;
    }
    (samples.len() - 1) as f64 / t_last
}
