use model::{Coord, TelemetrySample};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::geometry::DetectionGate;
use crate::track::{GateKind, PathObject, Track};
use crate::TrackError;

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct TimingConfig {
    /// Path points searched behind the previous on-track index.
    pub search_back: usize,
    /// Path points searched ahead of the previous on-track index.
    pub search_forward: usize,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self { search_back: 5, search_forward: 100 }
    }
}

/// Index of the object watched after `idx`; wraps back to the first object
/// after the last one so consecutive laps are handled in one pass.
pub fn next_object(idx: usize, count: usize) -> usize {
    (idx + 1) % count
}

// object index, and whether it is the object's entry gate
type GateKey = (usize, bool);

fn gate_of(gates: &[(DetectionGate, DetectionGate)], (idx, entry): GateKey) -> &DetectionGate {
    let (entry_gate, exit_gate) = &gates[idx];
    if entry {
        entry_gate
    } else {
        exit_gate
    }
}

#[derive(Debug)]
struct LapState {
    lap: i32,
    sector: i32,
    // bumped on every sector exit, never reset
    sector_seq: i32,
    lap_start: f64,
    sector_start: f64,
    obj_idx: usize,
    watching_entry: bool,
}

impl LapState {
    fn new() -> Self {
        Self {
            lap: -1,
            sector: -1,
            sector_seq: 1,
            lap_start: 0.0,
            sector_start: 0.0,
            obj_idx: 0,
            watching_entry: true,
        }
    }

    fn watched(&self) -> GateKey {
        (self.obj_idx, self.watching_entry)
    }

    fn crossed(&mut self, obj: &PathObject, t: f64, obj_count: usize) {
        match obj {
            PathObject::Gate(g) if g.kind == GateKind::Start => {
                self.lap_start = t;
                self.lap = if self.lap == -1 { 1 } else { self.lap + 1 };
                debug!(lap = self.lap, t, "crossed start gate");
            }
            PathObject::Gate(_) => {
                debug!(lap = self.lap, t, "crossed finish gate");
                self.lap = -1;
            }
            PathObject::Sector(s) if self.watching_entry => {
                self.sector = self.sector_seq;
                self.sector_start = t;
                self.watching_entry = false;
                debug!(sector = self.sector, name = %s.name, t, "entered sector");
                // the exit gate of the same sector is watched next
                return;
            }
            PathObject::Sector(s) => {
                debug!(sector = self.sector, name = %s.name, t, "exited sector");
                self.sector = -1;
                self.sector_seq += 1;
            }
        }
        self.obj_idx = next_object(self.obj_idx, obj_count);
        self.watching_entry = true;
        if self.obj_idx == 0 {
            trace!(t, "wrapped around to first track object");
        }
    }

    fn stamp(&self, samp: &mut TelemetrySample) {
        let t = samp.t_offset;
        samp.calc.lap = self.lap;
        samp.calc.lap_time_offset = if self.lap == -1 { 0.0 } else { t - self.lap_start };
        samp.calc.sector = self.sector;
        samp.calc.sector_time_offset = if self.sector == -1 { 0.0 } else { t - self.sector_start };
    }
}

pub fn compute_track_times(track: &Track, samples: &mut [TelemetrySample]) -> Result<(), TrackError> {
    compute_track_times_with(track, samples, &TimingConfig::default())
}

/// Walks the samples once, snapping each onto the track path and stamping
/// it with lap/sector numbers and the time spent in them so far.
///
/// Gates are resolved before any sample is touched, so on error the samples
/// are left as they were.
pub fn compute_track_times_with(
    track: &Track,
    samples: &mut [TelemetrySample],
    cfg: &TimingConfig,
) -> Result<(), TrackError> {
    let objs = track.sorted_path_objects()?;
    if objs.is_empty() {
        return Ok(());
    }
    let gates = objs
        .iter()
        .map(|o| Ok((o.entry_gate(track)?, o.exit_gate(track)?)))
        .collect::<Result<Vec<_>, TrackError>>()?;
    // every gate can be crossed at most once by a single step
    let max_crossings: usize = objs.iter().map(|o| if o.is_sector() { 2 } else { 1 }).sum();

    debug!(objects = objs.len(), samples = samples.len(), "computing track times");

    let mut state = LapState::new();
    let mut prev: Option<Coord> = None;
    // gate crossed last while the vehicle is still on it; a step starting on
    // that gate is not another crossing
    let mut last_crossed: Option<GateKey> = None;
    let mut seed = 0usize;
    let mut window = (0, track.path_count());
    for samp in samples.iter_mut() {
        let (on_track, idx) = track
            .find_closest_point_wrapping(samp.coord, seed, window)
            .unwrap_or((samp.coord, seed));
        samp.calc.on_track = on_track;
        seed = idx;
        window = (cfg.search_back, cfg.search_forward);

        if let Some(prev) = prev {
            let mut crossed = None;
            let mut crossings = 0;
            while crossings < max_crossings {
                let key = state.watched();
                let gate = gate_of(&gates, key);
                if (last_crossed == Some(key) && gate.touches(prev)) || !gate.detect(prev, on_track) {
                    break;
                }
                crossings += 1;
                crossed = Some(key);
                state.crossed(&objs[state.obj_idx], samp.t_offset, objs.len());
            }
            if crossed.is_some() {
                last_crossed = crossed;
            } else if last_crossed.is_some_and(|k| !gate_of(&gates, k).touches(on_track)) {
                last_crossed = None;
            }
        }

        state.stamp(samp);
        prev = Some(on_track);
    }
    Ok(())
}
