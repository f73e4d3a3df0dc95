use std::collections::BTreeMap;

use model::{Coord, TelemetrySample};
use serde::{Deserialize, Serialize};

use crate::geometry::DetectionGate;
use crate::TrackError;

pub const DEFAULT_GATE_WIDTH_M: f64 = 10.0;

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub enum GateKind {
    Start,
    Finish,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct TrackGate {
    pub name: String,
    pub path_idx: usize,
    pub kind: GateKind,
    #[serde(default = "default_gate_width")]
    pub gate_width_m: f64,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct TrackSector {
    pub name: String,
    pub entry_path_idx: usize,
    pub exit_path_idx: usize,
    #[serde(default = "default_gate_width")]
    pub gate_width_m: f64,
}

fn default_gate_width() -> f64 {
    DEFAULT_GATE_WIDTH_M
}

/// Anything placed along the track path that timing has to watch for.
#[derive(Clone, Debug, PartialEq)]
pub enum PathObject {
    Gate(TrackGate),
    Sector(TrackSector),
}

impl PathObject {
    pub fn name(&self) -> &str {
        match self {
            PathObject::Gate(g) => &g.name,
            PathObject::Sector(s) => &s.name,
        }
    }

    pub fn is_gate(&self) -> bool {
        matches!(self, PathObject::Gate(_))
    }

    pub fn is_sector(&self) -> bool {
        matches!(self, PathObject::Sector(_))
    }

    pub fn gate_kind(&self) -> Option<GateKind> {
        match self {
            PathObject::Gate(g) => Some(g.kind),
            PathObject::Sector(_) => None,
        }
    }

    pub fn entry_idx(&self) -> usize {
        match self {
            PathObject::Gate(g) => g.path_idx,
            PathObject::Sector(s) => s.entry_path_idx,
        }
    }

    pub fn exit_idx(&self) -> usize {
        match self {
            PathObject::Gate(g) => g.path_idx,
            PathObject::Sector(s) => s.exit_path_idx,
        }
    }

    pub fn gate_width_m(&self) -> f64 {
        match self {
            PathObject::Gate(g) => g.gate_width_m,
            PathObject::Sector(s) => s.gate_width_m,
        }
    }

    pub fn entry_gate(&self, track: &Track) -> Result<DetectionGate, TrackError> {
        track.detection_gate(self.entry_idx(), self.gate_width_m())
    }

    /// Same as the entry gate for start/finish gates.
    pub fn exit_gate(&self, track: &Track) -> Result<DetectionGate, TrackError> {
        track.detection_gate(self.exit_idx(), self.gate_width_m())
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Track {
    start: TrackGate,
    finish: TrackGate,
    #[serde(default)]
    sectors: Vec<TrackSector>,
    // lat/lon points in driving order
    path: Vec<Coord>,
}

impl Track {
    pub fn new(path: Vec<Coord>) -> Self {
        Self::with_gate_width(path, DEFAULT_GATE_WIDTH_M)
    }

    pub fn with_gate_width(path: Vec<Coord>, gate_width_m: f64) -> Self {
        let last = path.len().saturating_sub(1);
        Self {
            start: TrackGate {
                name: "startGate".into(),
                path_idx: 0,
                kind: GateKind::Start,
                gate_width_m,
            },
            finish: TrackGate {
                name: "finishGate".into(),
                path_idx: last,
                kind: GateKind::Finish,
                gate_width_m,
            },
            sectors: Vec::new(),
            path,
        }
    }

    /// One path point per sample, in recording order.
    pub fn from_samples(samples: &[TelemetrySample]) -> Self {
        Self::new(samples.iter().map(|s| s.coord).collect())
    }

    fn check_idx(&self, idx: usize) -> Result<(), TrackError> {
        if idx < self.path.len() {
            Ok(())
        } else {
            Err(TrackError::OutOfRange { idx, len: self.path.len() })
        }
    }

    pub fn set_start(&mut self, path_idx: usize) -> Result<(), TrackError> {
        self.check_idx(path_idx)?;
        self.start.path_idx = path_idx;
        Ok(())
    }

    pub fn start(&self) -> &TrackGate {
        &self.start
    }

    pub fn set_finish(&mut self, path_idx: usize) -> Result<(), TrackError> {
        self.check_idx(path_idx)?;
        self.finish.path_idx = path_idx;
        Ok(())
    }

    pub fn finish(&self) -> &TrackGate {
        &self.finish
    }

    /// Where a sector spanning entry..exit would go in the (entry-ordered)
    /// sector list. Also serves as the validity test for a new sector.
    pub fn find_sector_insertion_idx(&self, entry: usize, exit: usize) -> Result<usize, TrackError> {
        if entry == exit {
            return Err(TrackError::SectorNoWidth);
        } else if exit < entry {
            return Err(TrackError::ExitBeforeEntry);
        }
        self.check_idx(entry)?;
        self.check_idx(exit)?;

        for (i, s) in self.sectors.iter().enumerate() {
            let (s_entry, s_exit) = (s.entry_path_idx, s.exit_path_idx);
            if entry < s_entry && exit <= s_entry {
                return Ok(i);
            }
            let entry_inside = s_entry < entry && entry < s_exit;
            let exit_inside = s_entry < exit && exit < s_exit;
            let straddles = entry <= s_entry && s_exit <= exit;
            if entry_inside || exit_inside || straddles {
                return Err(TrackError::Overlap { entry, exit });
            }
        }
        Ok(self.sectors.len())
    }

    pub fn add_sector(&mut self, name: &str, entry: usize, exit: usize) -> Result<usize, TrackError> {
        self.add_sector_with_width(name, entry, exit, DEFAULT_GATE_WIDTH_M)
    }

    pub fn add_sector_with_width(
        &mut self,
        name: &str,
        entry: usize,
        exit: usize,
        gate_width_m: f64,
    ) -> Result<usize, TrackError> {
        let idx = self.find_sector_insertion_idx(entry, exit)?;
        self.sectors.insert(
            idx,
            TrackSector {
                name: name.to_string(),
                entry_path_idx: entry,
                exit_path_idx: exit,
                gate_width_m,
            },
        );
        Ok(idx)
    }

    pub fn remove_sector(&mut self, idx: usize) -> Result<TrackSector, TrackError> {
        if idx >= self.sectors.len() {
            return Err(TrackError::SectorNotFound { idx });
        }
        Ok(self.sectors.remove(idx))
    }

    pub fn set_sector_name(&mut self, idx: usize, name: &str) -> Result<(), TrackError> {
        let s = self.sectors.get_mut(idx).ok_or(TrackError::SectorNotFound { idx })?;
        s.name = name.to_string();
        Ok(())
    }

    pub fn sector(&self, idx: usize) -> Option<&TrackSector> {
        self.sectors.get(idx)
    }

    pub fn sectors(&self) -> &[TrackSector] {
        &self.sectors
    }

    pub fn sector_count(&self) -> usize {
        self.sectors.len()
    }

    pub fn path_count(&self) -> usize {
        self.path.len()
    }

    pub fn path_point(&self, idx: usize) -> Option<Coord> {
        self.path.get(idx).copied()
    }

    pub fn path(&self) -> &[Coord] {
        &self.path
    }

    /// Gate of the given width laid across the path's local direction at
    /// `path_idx`. Neighbouring points are clamped at the ends of the path.
    pub fn detection_gate(&self, path_idx: usize, width_m: f64) -> Result<DetectionGate, TrackError> {
        self.check_idx(path_idx)?;
        let center = self.path[path_idx];
        let pa = if path_idx > 0 { self.path[path_idx - 1] } else { center };
        let pb = self.path.get(path_idx + 1).copied().unwrap_or(center);
        Ok(DetectionGate::across(pa, pb, center, width_m))
    }

    pub fn nearest_detection_gate(&self, p: Coord, width_m: f64) -> Result<DetectionGate, TrackError> {
        let (_, idx) = self.find_closest_point_with_idx(p).ok_or(TrackError::EmptyPath)?;
        self.detection_gate(idx, width_m)
    }

    pub fn find_closest_point(&self, p: Coord) -> Option<Coord> {
        self.find_closest_point_with_idx(p).map(|(c, _)| c)
    }

    pub fn find_closest_point_with_idx(&self, p: Coord) -> Option<(Coord, usize)> {
        self.find_closest_point_in_window(p, 0, (0, self.path.len()))
    }

    /// Nearest path point among [seed - back, seed + forward). Ties go to the
    /// lowest index. None only when the window holds no points.
    pub fn find_closest_point_in_window(
        &self,
        p: Coord,
        seed: usize,
        (back, forward): (usize, usize),
    ) -> Option<(Coord, usize)> {
        let start = seed.saturating_sub(back);
        let end = seed.saturating_add(forward).min(self.path.len());
        let mut best: Option<(f64, usize)> = None;
        for i in start..end {
            let d = p.dist_sq(&self.path[i]);
            if best.map_or(true, |(bd, _)| d < bd) {
                best = Some((d, i));
            }
        }
        best.map(|(_, i)| (self.path[i], i))
    }

    /// Like `find_closest_point_in_window` but the window wraps around the
    /// ends of the path, so a vehicle finishing one lap of a circuit can be
    /// picked up again at the beginning of the path.
    pub fn find_closest_point_wrapping(
        &self,
        p: Coord,
        seed: usize,
        (back, forward): (usize, usize),
    ) -> Option<(Coord, usize)> {
        let len = self.path.len();
        if len == 0 {
            return None;
        } else if back.saturating_add(forward) >= len {
            return self.find_closest_point_with_idx(p);
        }
        let first = (seed % len) + len - back;
        let mut best: Option<(f64, usize)> = None;
        for k in 0..(back + forward) {
            let i = (first + k) % len;
            let d = p.dist_sq(&self.path[i]);
            if best.map_or(true, |(bd, _)| d < bd) {
                best = Some((d, i));
            }
        }
        best.map(|(_, i)| (self.path[i], i))
    }

    /// Start, finish and sectors ordered by entry path index. A later object
    /// sharing an entry index with an earlier one is dropped (start wins over
    /// finish, gates win over sectors).
    pub fn sorted_path_objects(&self) -> Result<Vec<PathObject>, TrackError> {
        self.validate()?;
        let mut by_entry: BTreeMap<usize, PathObject> = BTreeMap::new();
        by_entry.entry(self.start.path_idx).or_insert_with(|| PathObject::Gate(self.start.clone()));
        by_entry.entry(self.finish.path_idx).or_insert_with(|| PathObject::Gate(self.finish.clone()));
        for s in &self.sectors {
            by_entry.entry(s.entry_path_idx).or_insert_with(|| PathObject::Sector(s.clone()));
        }
        Ok(by_entry.into_values().collect())
    }

    /// Checks a track (typically freshly decoded) is usable for timing.
    pub fn validate(&self) -> Result<(), TrackError> {
        if self.path.is_empty() {
            return Err(TrackError::EmptyPath);
        }
        self.check_idx(self.start.path_idx)?;
        self.check_idx(self.finish.path_idx)?;
        let mut prev_exit: Option<usize> = None;
        for s in &self.sectors {
            self.check_idx(s.entry_path_idx)?;
            self.check_idx(s.exit_path_idx)?;
            if s.entry_path_idx == s.exit_path_idx {
                return Err(TrackError::SectorNoWidth);
            } else if s.exit_path_idx < s.entry_path_idx {
                return Err(TrackError::ExitBeforeEntry);
            }
            if prev_exit.map_or(false, |pe| s.entry_path_idx < pe) {
                return Err(TrackError::Overlap { entry: s.entry_path_idx, exit: s.exit_path_idx });
            }
            prev_exit = Some(s.exit_path_idx);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::m2dd;

    fn c(lat: f64, lon: f64) -> Coord {
        Coord::new(lat, lon)
    }

    fn create_test_track() -> Track {
        Track::new(vec![c(0.0, 0.0), c(2.0, 0.0), c(3.0, 1.0), c(2.0, 2.0), c(1.0, 3.0), c(0.0, 4.0)])
    }

    fn straight_track(n: usize) -> Track {
        Track::new((0..n).map(|i| c(i as f64, i as f64 * 2.0)).collect())
    }

    #[test]
    fn test_closest_point() {
        let track = create_test_track();
        assert_eq!(track.path_count(), 6);
        assert_eq!(track.find_closest_point_with_idx(c(0.0, 0.0)), Some((c(0.0, 0.0), 0)));
        assert_eq!(track.find_closest_point_with_idx(c(2.9, 1.0)), Some((c(3.0, 1.0), 2)));
        assert_eq!(track.find_closest_point_with_idx(c(50.0, 100.0)), Some((c(0.0, 4.0), 5)));
        assert_eq!(track.find_closest_point(c(2.9, 1.0)), Some(c(3.0, 1.0)));
    }

    #[test]
    fn test_closest_point_ties_go_first() {
        let track = Track::new(vec![c(1.0, 0.0), c(-1.0, 0.0)]);
        assert_eq!(track.find_closest_point_with_idx(c(0.0, 0.0)).map(|r| r.1), Some(0));
    }

    #[test]
    fn test_closest_point_empty_path() {
        let track = Track::new(Vec::new());
        assert_eq!(track.find_closest_point_with_idx(c(1.0, 1.0)), None);
        assert_eq!(track.nearest_detection_gate(c(1.0, 1.0), 1.0), Err(TrackError::EmptyPath));
    }

    #[test]
    fn test_closest_point_window() {
        let track = create_test_track();
        // (0,0) is the global answer but lies outside of the window
        let res = track.find_closest_point_in_window(c(0.0, 0.0), 4, (1, 10));
        assert_eq!(res, Some((c(2.0, 2.0), 3)));
        assert_eq!(track.find_closest_point_in_window(c(0.0, 0.0), 10, (1, 10)), None);
    }

    #[test]
    fn test_closest_point_wrapping() {
        let track = straight_track(20);
        // seed near the end, point near the beginning
        let res = track.find_closest_point_wrapping(c(1.0, 2.0), 18, (2, 5));
        assert_eq!(res.map(|r| r.1), Some(1));
        // same window without wrapping can only see the end of the path
        let res = track.find_closest_point_in_window(c(1.0, 2.0), 18, (2, 5));
        assert_eq!(res.map(|r| r.1), Some(16));
        // window covering everything degrades to a full scan
        let res = track.find_closest_point_wrapping(c(7.2, 14.0), 0, (10, 10));
        assert_eq!(res.map(|r| r.1), Some(7));
        assert_eq!(Track::new(Vec::new()).find_closest_point_wrapping(c(0.0, 0.0), 0, (1, 1)), None);
    }

    #[test]
    fn test_gate_horizontal_path() {
        let track = Track::new(vec![c(0.0, 0.0), c(2.0, 0.0), c(4.0, 0.0)]);
        let half = m2dd(1.0 / 2.0);
        for (idx, lat) in [(0, 0.0), (1, 2.0), (2, 4.0)] {
            let gate = track.detection_gate(idx, 1.0).unwrap();
            assert!((gate.a.lat - lat).abs() < 1e-9);
            assert!((gate.b.lat - lat).abs() < 1e-9);
            assert!((gate.a.lon - half).abs() < 1e-12);
            assert!((gate.b.lon + half).abs() < 1e-12);
        }
        let gate = track.detection_gate(1, 1.0).unwrap();
        assert!(((gate.a.lon - gate.b.lon) - m2dd(1.0)).abs() < 1e-12);
    }

    #[test]
    fn test_gate_vertical_path() {
        let track = Track::new(vec![c(0.0, 0.0), c(0.0, 2.0), c(0.0, 4.0)]);
        let half = m2dd(0.5);
        let gate = track.detection_gate(1, 1.0).unwrap();
        assert!((gate.a.lon - 2.0).abs() < 1e-9);
        assert!((gate.b.lon - 2.0).abs() < 1e-9);
        assert!((gate.a.lat - half).abs() < 1e-12);
        assert!((gate.b.lat + half).abs() < 1e-12);
    }

    #[test]
    fn test_gate_diagonal_is_normal() {
        let track = Track::new(vec![c(0.0, 0.0), c(3.0, 2.0), c(5.0, 4.0)]);
        let gate = track.detection_gate(1, 1.0).unwrap();
        let path_slope = (5.0 - 0.0) / (4.0 - 0.0);
        let gate_slope = (gate.a.lat - gate.b.lat) / (gate.a.lon - gate.b.lon);
        assert!((gate_slope - (-1.0 / path_slope)).abs() < 1e-6);
        let len = gate.a.dist_sq(&gate.b).sqrt();
        assert!((len - m2dd(1.0)).abs() < 1e-12);
        let mid = c((gate.a.lat + gate.b.lat) / 2.0, (gate.a.lon + gate.b.lon) / 2.0);
        assert!(mid.dist_sq(&c(3.0, 2.0)) < 1e-18);
    }

    #[test]
    fn test_gate_out_of_range() {
        let track = create_test_track();
        assert_eq!(track.detection_gate(6, 1.0), Err(TrackError::OutOfRange { idx: 6, len: 6 }));
    }

    #[test]
    fn test_start_finish_defaults_and_bounds() {
        let mut track = create_test_track();
        assert_eq!(track.start().path_idx, 0);
        assert_eq!(track.finish().path_idx, 5);
        assert!(track.set_start(6).is_err());
        assert!(track.set_finish(3).is_ok());
        assert_eq!(track.finish().path_idx, 3);
    }

    #[test]
    fn test_sector_insertion() {
        let mut track = straight_track(100);
        assert_eq!(track.add_sector("b", 30, 50), Ok(0));
        assert_eq!(track.add_sector("a", 10, 20), Ok(0));
        assert_eq!(track.add_sector("d", 60, 70), Ok(2));
        assert_eq!(track.add_sector("c", 50, 55), Ok(2));
        let names: Vec<_> = track.sectors().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["a", "b", "c", "d"]);
    }

    #[test]
    fn test_sector_insertion_rejects() {
        let mut track = straight_track(100);
        track.add_sector("s", 30, 50).unwrap();
        assert_eq!(track.find_sector_insertion_idx(10, 10), Err(TrackError::SectorNoWidth));
        assert_eq!(track.find_sector_insertion_idx(20, 10), Err(TrackError::ExitBeforeEntry));
        assert_eq!(track.find_sector_insertion_idx(40, 60), Err(TrackError::Overlap { entry: 40, exit: 60 }));
        assert_eq!(track.find_sector_insertion_idx(20, 40), Err(TrackError::Overlap { entry: 20, exit: 40 }));
        assert_eq!(track.find_sector_insertion_idx(20, 60), Err(TrackError::Overlap { entry: 20, exit: 60 }));
        assert_eq!(track.find_sector_insertion_idx(30, 50), Err(TrackError::Overlap { entry: 30, exit: 50 }));
        assert_eq!(track.find_sector_insertion_idx(90, 100), Err(TrackError::OutOfRange { idx: 100, len: 100 }));
        // touching at the boundaries is fine
        assert_eq!(track.find_sector_insertion_idx(20, 30), Ok(0));
        assert_eq!(track.find_sector_insertion_idx(50, 60), Ok(1));
        assert_eq!(track.sector_count(), 1);
    }

    #[test]
    fn test_sector_edit() {
        let mut track = straight_track(100);
        track.add_sector("s1", 10, 20).unwrap();
        track.set_sector_name(0, "renamed").unwrap();
        assert_eq!(track.sector(0).map(|s| s.name.as_str()), Some("renamed"));
        assert!(track.set_sector_name(3, "x").is_err());
        assert_eq!(track.remove_sector(0).map(|s| s.entry_path_idx), Ok(10));
        assert_eq!(track.remove_sector(0), Err(TrackError::SectorNotFound { idx: 0 }));
    }

    #[test]
    fn test_sorted_path_objects() {
        let mut track = straight_track(100);
        track.set_start(5).unwrap();
        track.set_finish(95).unwrap();
        track.add_sector("Sector1", 10, 20).unwrap();
        track.add_sector("Sector3", 60, 70).unwrap();
        track.add_sector("Sector2", 30, 50).unwrap();

        let objs = track.sorted_path_objects().unwrap();
        let names: Vec<_> = objs.iter().map(|o| o.name()).collect();
        assert_eq!(names, ["startGate", "Sector1", "Sector2", "Sector3", "finishGate"]);
        assert_eq!(objs[0].gate_kind(), Some(GateKind::Start));
        assert!(objs[0].is_gate() && !objs[0].is_sector());
        assert!(objs[2].is_sector() && objs[2].gate_kind().is_none());
        assert_eq!((objs[2].entry_idx(), objs[2].exit_idx()), (30, 50));
        assert_eq!(objs[4].gate_kind(), Some(GateKind::Finish));
        assert_ne!(objs[1].entry_gate(&track).unwrap(), objs[1].exit_gate(&track).unwrap());
        assert_eq!(objs[0].entry_gate(&track).unwrap(), objs[0].exit_gate(&track).unwrap());
    }

    #[test]
    fn test_sorted_path_objects_circuit() {
        let mut track = straight_track(10);
        track.set_finish(0).unwrap();
        let objs = track.sorted_path_objects().unwrap();
        assert_eq!(objs.len(), 1);
        assert_eq!(objs[0].gate_kind(), Some(GateKind::Start));
    }

    #[test]
    fn test_validate() {
        assert_eq!(Track::new(Vec::new()).validate(), Err(TrackError::EmptyPath));
        let mut track = straight_track(10);
        assert!(track.validate().is_ok());
        track.start.path_idx = 12;
        assert_eq!(track.validate(), Err(TrackError::OutOfRange { idx: 12, len: 10 }));
    }

    #[test]
    fn test_from_samples() {
        let samples: Vec<_> = (0..4)
            .map(|i| TelemetrySample::at(i as f64, c(i as f64, 1.0)))
            .collect();
        let track = Track::from_samples(&samples);
        assert_eq!(track.path_count(), 4);
        assert_eq!(track.path_point(3), Some(c(3.0, 1.0)));
        assert_eq!(track.finish().path_idx, 3);
    }

    #[test]
    fn test_json_shape() {
        let mut track = straight_track(3);
        track.add_sector("s", 0, 2).unwrap();
        let json = serde_json::to_value(&track).unwrap();
        assert_eq!(json["start"]["path_idx"], 0);
        assert_eq!(json["sectors"][0]["exit_path_idx"], 2);
        let back: Track = serde_json::from_value(json).unwrap();
        assert_eq!(back, track);
    }
}
