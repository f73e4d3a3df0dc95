use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{SeekDirection, SeekError, SeekerHandle, DEFAULT_TIME_QUANTA_S};

/// Sample counts a group can step from the current positions while keeping
/// every member in bounds.
#[derive(Clone, Copy, Serialize, Debug, PartialEq, Eq, Default)]
pub struct RelativeFrameLimits {
    pub backwards: usize,
    pub forwards: usize,
}

impl RelativeFrameLimits {
    pub fn total_range(&self) -> usize {
        self.backwards + self.forwards + 1
    }
}

/// Same as [`RelativeFrameLimits`] in seconds. Backwards is never positive,
/// forwards never negative.
#[derive(Clone, Copy, Serialize, Debug, PartialEq, Default)]
pub struct RelativeTimeLimits {
    backwards: f64,
    forwards: f64,
}

impl RelativeTimeLimits {
    pub fn new(backwards: f64, forwards: f64) -> Result<Self, SeekError> {
        let mut limits = Self::default();
        limits.set_backwards(backwards)?;
        limits.set_forwards(forwards)?;
        Ok(limits)
    }

    pub fn backwards(&self) -> f64 {
        self.backwards
    }

    pub fn forwards(&self) -> f64 {
        self.forwards
    }

    pub fn set_backwards(&mut self, limit: f64) -> Result<(), SeekError> {
        if limit > 0.0 {
            return Err(SeekError::InvalidLimit { value: limit, reason: "backwards limit can't be positive" });
        }
        self.backwards = limit;
        Ok(())
    }

    pub fn set_forwards(&mut self, limit: f64) -> Result<(), SeekError> {
        if limit < 0.0 {
            return Err(SeekError::InvalidLimit { value: limit, reason: "forwards limit can't be negative" });
        }
        self.forwards = limit;
        Ok(())
    }

    pub fn total_range(&self) -> f64 {
        self.forwards - self.backwards
    }
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub enum ElementSide {
    Entry,
    Exit,
}

/// How a group of recordings is lined up against each other.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Alignment {
    /// Every source at the entry/exit of the same lap.
    Lap { lap: u32, side: ElementSide },
    /// Hand-picked sample index per source name.
    Custom { idx_by_source: BTreeMap<String, usize> },
}

/// Synchronised stepping over several seekers. The seekers are shared; the
/// group never owns the samples behind them.
#[derive(Default)]
pub struct GroupedSeeker {
    seekers: Vec<SeekerHandle>,
}

impl GroupedSeeker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.seekers.clear();
    }

    pub fn add_seeker(&mut self, seeker: SeekerHandle) {
        self.seekers.push(seeker);
    }

    /// Adds the seeker unless this exact handle is already in the group.
    pub fn add_seeker_unique(&mut self, seeker: SeekerHandle) -> bool {
        if self.seekers.iter().any(|s| Arc::ptr_eq(s, &seeker)) {
            return false;
        }
        self.seekers.push(seeker);
        true
    }

    pub fn seeker_count(&self) -> usize {
        self.seekers.len()
    }

    pub fn seeker(&self, idx: usize) -> Option<SeekerHandle> {
        self.seekers.get(idx).cloned()
    }

    pub fn seeker_by_id(&self, id: Uuid) -> Option<SeekerHandle> {
        self.seekers.iter().find(|s| s.read().id() == id).cloned()
    }

    pub fn seekers(&self) -> &[SeekerHandle] {
        &self.seekers
    }

    pub fn remove_seeker(&mut self, idx: usize) -> Option<SeekerHandle> {
        (idx < self.seekers.len()).then(|| self.seekers.remove(idx))
    }

    /// Removes every occurrence of `seeker`. True if any was removed.
    pub fn remove_seeker_handle(&mut self, seeker: &SeekerHandle) -> bool {
        let before = self.seekers.len();
        self.seekers.retain(|s| !Arc::ptr_eq(s, seeker));
        self.seekers.len() != before
    }

    /// Steps every seeker back one sample. With `only_if_all` nobody moves
    /// unless everybody can.
    pub fn prev_all(&self, only_if_all: bool) {
        if only_if_all && !self.seekers.iter().all(|s| s.read().has_prev()) {
            return;
        }
        for s in &self.seekers {
            s.write().prev();
        }
    }

    pub fn next_all(&self, only_if_all: bool) {
        if only_if_all && !self.seekers.iter().all(|s| s.read().has_next()) {
            return;
        }
        for s in &self.seekers {
            s.write().next();
        }
    }

    pub fn seek_all_to_idx(&self, idx: usize) -> Result<(), SeekError> {
        for s in &self.seekers {
            let size = s.read().size();
            if idx >= size {
                warn!(idx, size, "group seek refused");
                return Err(SeekError::OutOfRange { idx, size });
            }
        }
        for s in &self.seekers {
            s.write().seek_to_idx(idx)?;
        }
        Ok(())
    }

    pub fn seek_all_relative(&self, amount: usize, dir: SeekDirection) {
        for s in &self.seekers {
            s.write().seek_relative(amount, dir);
        }
    }

    pub fn seek_all_relative_time(&self, offset_s: f64) {
        self.seek_all_relative_time_quantized(offset_s, DEFAULT_TIME_QUANTA_S);
    }

    /// Moves each seeker by time rather than index; sources recorded at
    /// different rates stay lined up.
    pub fn seek_all_relative_time_quantized(&self, offset_s: f64, quanta_s: f64) {
        for s in &self.seekers {
            s.write().seek_relative_time_quantized(offset_s, quanta_s);
        }
    }

    /// Makes every seeker's current position its alignment point.
    pub fn set_alignment_here(&self) -> Result<(), SeekError> {
        for s in &self.seekers {
            let mut s = s.write();
            let idx = s.seeked_idx();
            s.set_alignment_idx(idx)?;
        }
        Ok(())
    }

    pub fn seek_all_to_alignment(&self) -> Result<(), SeekError> {
        for s in &self.seekers {
            s.write().seek_to_alignment()?;
        }
        Ok(())
    }

    /// Resolves `alignment` to one index per seeker, then moves every seeker
    /// there and records it as the alignment point. Nothing moves if any
    /// seeker can't be resolved.
    pub fn seek_to_alignment(&self, alignment: &Alignment) -> Result<(), SeekError> {
        let mut targets = Vec::with_capacity(self.seekers.len());
        for (i, s) in self.seekers.iter().enumerate() {
            let s = s.read();
            let idx = match alignment {
                Alignment::Lap { lap, side } => {
                    let (entry, exit) = s.lap_entry_exit(*lap).map_err(|_| SeekError::MissingLap {
                        seeker: i,
                        name: s.source_name().to_string(),
                        lap: *lap,
                    })?;
                    match side {
                        ElementSide::Entry => entry,
                        ElementSide::Exit => exit,
                    }
                }
                Alignment::Custom { idx_by_source } => {
                    let idx = idx_by_source
                        .get(s.source_name())
                        .copied()
                        .ok_or_else(|| SeekError::SourceNotFound { name: s.source_name().to_string() })?;
                    let size = s.size();
                    if idx >= size {
                        return Err(SeekError::OutOfRange { idx, size });
                    }
                    idx
                }
            };
            targets.push(idx);
        }
        for (s, idx) in self.seekers.iter().zip(targets) {
            let mut s = s.write();
            s.set_alignment_idx(idx)?;
            s.seek_to_idx(idx)?;
        }
        debug!(?alignment, seekers = self.seekers.len(), "aligned group");
        Ok(())
    }

    /// Fewest laps any member has; 0 for an empty group.
    pub fn min_lap_count(&self) -> usize {
        self.seekers.iter().map(|s| s.read().lap_count()).min().unwrap_or(0)
    }

    pub fn max_lap_count(&self) -> usize {
        self.seekers.iter().map(|s| s.read().lap_count()).max().unwrap_or(0)
    }

    fn check_lap(&self, lap: u32) -> Result<(), SeekError> {
        for (i, s) in self.seekers.iter().enumerate() {
            let s = s.read();
            if !s.has_lap(lap) {
                warn!(seeker = i, id = %s.id(), source = %s.source_name(), lap, "lap missing from seeker");
                return Err(SeekError::MissingLap { seeker: i, name: s.source_name().to_string(), lap });
            }
        }
        Ok(())
    }

    pub fn seek_all_to_lap_entry(&self, lap: u32) -> Result<(), SeekError> {
        self.check_lap(lap)?;
        for s in &self.seekers {
            s.write().seek_to_lap_entry(lap)?;
        }
        Ok(())
    }

    pub fn seek_all_to_lap_exit(&self, lap: u32) -> Result<(), SeekError> {
        self.check_lap(lap)?;
        for s in &self.seekers {
            s.write().seek_to_lap_exit(lap)?;
        }
        Ok(())
    }

    /// Treating each seeker's current sample as time zero, the furthest the
    /// whole group can step back and forth. This is the intersection of the
    /// members' ranges; a member without samples pins both sides to 0.
    pub fn relative_seek_limits(&self) -> RelativeFrameLimits {
        let mut limits: Option<RelativeFrameLimits> = None;
        for s in &self.seekers {
            let s = s.read();
            let size = s.size();
            if size == 0 {
                return RelativeFrameLimits::default();
            }
            let idx = s.seeked_idx();
            let back = idx;
            let fwd = size - 1 - idx;
            limits = Some(match limits {
                None => RelativeFrameLimits { backwards: back, forwards: fwd },
                Some(l) => RelativeFrameLimits {
                    backwards: l.backwards.min(back),
                    forwards: l.forwards.min(fwd),
                },
            });
        }
        limits.unwrap_or_default()
    }

    /// [`relative_seek_limits`](Self::relative_seek_limits) in seconds, for
    /// use with [`seek_all_relative_time`](Self::seek_all_relative_time).
    pub fn relative_seek_limits_time(&self) -> RelativeTimeLimits {
        let mut limits: Option<(f64, f64)> = None;
        for s in &self.seekers {
            let s = s.read();
            let size = s.size();
            let times = (s.time_at(0), s.time_at(s.seeked_idx()), s.time_at(size.saturating_sub(1)));
            let (Some(first), Some(here), Some(last)) = times else {
                return RelativeTimeLimits::default();
            };
            let (back, fwd) = (first - here, last - here);
            limits = Some(match limits {
                None => (back, fwd),
                Some((b, f)) => (b.max(back), f.min(fwd)),
            });
        }
        let (backwards, forwards) = limits.unwrap_or((0.0, 0.0));
        RelativeTimeLimits { backwards: backwards.min(0.0), forwards: forwards.max(0.0) }
    }
}
