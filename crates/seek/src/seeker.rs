use std::collections::BTreeMap;
use std::sync::Weak;

use model::{avg_rate_hz, TelemetrySample, TelemetrySamples};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::{SeekDirection, SeekError, DEFAULT_TIME_QUANTA_S};

/// First and last sample index carrying a given lap number.
#[derive(Clone, Copy, Serialize, Debug, PartialEq, Eq)]
pub struct LapIndices {
    pub entry_idx: usize,
    pub exit_idx: usize,
}

/// Cursor over one source's samples.
///
/// The seeker never keeps the samples alive; once every strong handle is
/// dropped it behaves like an empty sequence.
#[derive(Debug)]
pub struct TelemetrySeeker {
    id: Uuid,
    source_name: String,
    samples: Weak<RwLock<TelemetrySamples>>,
    seeked_idx: usize,
    alignment_idx: usize,
    rate_hz: f64,
    laps: BTreeMap<u32, LapIndices>,
}

fn quantize(value: f64, quanta: f64) -> i64 {
    (value / quanta).round() as i64
}

impl TelemetrySeeker {
    pub fn new(source_name: &str, samples: Weak<RwLock<TelemetrySamples>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_name: source_name.to_string(),
            samples,
            seeked_idx: 0,
            alignment_idx: 0,
            rate_hz: 0.0,
            laps: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn set_source_name(&mut self, name: &str) {
        self.source_name = name.to_string();
    }

    fn with_samples<R>(&self, f: impl FnOnce(&[TelemetrySample]) -> R) -> Option<R> {
        let samples = self.samples.upgrade()?;
        let guard = samples.read();
        Some(f(&guard))
    }

    pub fn size(&self) -> usize {
        self.with_samples(|s| s.len()).unwrap_or(0)
    }

    pub fn time_at(&self, idx: usize) -> Option<f64> {
        self.with_samples(|s| s.get(idx).map(|s| s.t_offset)).flatten()
    }

    pub fn seeked_idx(&self) -> usize {
        self.seeked_idx
    }

    pub fn has_prev(&self) -> bool {
        self.seeked_idx != 0
    }

    pub fn has_next(&self) -> bool {
        self.seeked_idx + 1 < self.size()
    }

    pub fn prev(&mut self) {
        if self.has_prev() {
            self.seeked_idx -= 1;
        }
    }

    pub fn next(&mut self) {
        if self.has_next() {
            self.seeked_idx += 1;
        }
    }

    fn check_idx(&self, idx: usize) -> Result<(), SeekError> {
        let size = self.size();
        if idx < size {
            Ok(())
        } else {
            Err(SeekError::OutOfRange { idx, size })
        }
    }

    pub fn seek_to_idx(&mut self, idx: usize) -> Result<(), SeekError> {
        self.check_idx(idx)?;
        self.seeked_idx = idx;
        Ok(())
    }

    pub fn set_alignment_idx(&mut self, idx: usize) -> Result<(), SeekError> {
        self.check_idx(idx)?;
        self.alignment_idx = idx;
        Ok(())
    }

    pub fn alignment_idx(&self) -> usize {
        self.alignment_idx
    }

    pub fn seek_to_alignment(&mut self) -> Result<(), SeekError> {
        self.seek_to_idx(self.alignment_idx)
    }

    /// Moves `amount` samples, stopping at either end.
    pub fn seek_relative(&mut self, amount: usize, dir: SeekDirection) {
        let size = self.size();
        if size == 0 {
            return;
        }
        self.seeked_idx = match dir {
            SeekDirection::Forward => self.seeked_idx.saturating_add(amount).min(size - 1),
            SeekDirection::Backward => self.seeked_idx.saturating_sub(amount),
        };
    }

    pub fn seek_relative_time(&mut self, offset_s: f64) {
        self.seek_relative_time_quantized(offset_s, DEFAULT_TIME_QUANTA_S);
    }

    /// Moves by `offset_s` seconds (negative goes backwards). Time offsets are
    /// rounded to `quanta_s` so sample jitter doesn't cause off-by-one steps.
    /// Seeking past either end stops at that end.
    pub fn seek_relative_time_quantized(&mut self, offset_s: f64, quanta_s: f64) {
        let Some(samples) = self.samples.upgrade() else {
            return;
        };
        let samples = samples.read();
        let Some(last) = samples.last() else {
            return;
        };
        let q_at = |idx: usize| quantize(samples[idx].t_offset, quanta_s);

        let mut idx = self.seeked_idx.min(samples.len() - 1);
        let curr = q_at(idx);
        let target = quantize((curr as f64) * quanta_s + offset_s, quanta_s);
        if offset_s > 0.0 {
            if target >= quantize(last.t_offset, quanta_s) {
                idx = samples.len() - 1;
            } else {
                while idx + 1 < samples.len() && q_at(idx) < target {
                    idx += 1;
                }
            }
        } else if target <= 0 {
            idx = 0;
        } else {
            while idx > 0 && q_at(idx) > target {
                idx -= 1;
            }
        }
        self.seeked_idx = idx;
    }

    /// Seeks to the sample whose time offset is nearest to `t_offset`.
    /// Ties go to the earlier sample.
    pub fn seek_to_time(&mut self, t_offset: f64) -> Result<(), SeekError> {
        let idx = self
            .with_samples(|s| {
                if s.is_empty() {
                    return None;
                }
                let after = s.partition_point(|samp| samp.t_offset < t_offset);
                if after == 0 {
                    Some(0)
                } else if after == s.len() {
                    Some(s.len() - 1)
                } else if (s[after].t_offset - t_offset) < (t_offset - s[after - 1].t_offset) {
                    Some(after)
                } else {
                    Some(after - 1)
                }
            })
            .flatten()
            .ok_or(SeekError::OutOfRange { idx: 0, size: 0 })?;
        self.seeked_idx = idx;
        Ok(())
    }

    pub fn lap_entry_exit(&self, lap: u32) -> Result<(usize, usize), SeekError> {
        self.laps
            .get(&lap)
            .map(|li| (li.entry_idx, li.exit_idx))
            .ok_or(SeekError::LapNotFound { lap })
    }

    pub fn seek_to_lap_entry(&mut self, lap: u32) -> Result<(), SeekError> {
        let (entry, _) = self.lap_entry_exit(lap)?;
        self.seeked_idx = entry;
        Ok(())
    }

    pub fn seek_to_lap_exit(&mut self, lap: u32) -> Result<(), SeekError> {
        let (_, exit) = self.lap_entry_exit(lap)?;
        self.seeked_idx = exit;
        Ok(())
    }

    pub fn has_lap(&self, lap: u32) -> bool {
        self.laps.contains_key(&lap)
    }

    pub fn lap_count(&self) -> usize {
        self.laps.len()
    }

    pub fn laps(&self) -> impl Iterator<Item = (u32, LapIndices)> + '_ {
        self.laps.iter().map(|(lap, li)| (*lap, *li))
    }

    pub fn rate_hz(&self) -> f64 {
        self.rate_hz
    }

    /// Rebuilds the lap map and sample rate from the samples' current lap
    /// labels. Each lap keeps the first and last index it was seen at, even
    /// when those occurrences are not contiguous.
    pub fn analyze(&mut self) {
        self.laps.clear();
        let (rate_hz, laps) = self
            .with_samples(|samples| {
                let mut laps: BTreeMap<u32, LapIndices> = BTreeMap::new();
                for (i, s) in samples.iter().enumerate() {
                    if s.calc.lap <= 0 {
                        continue;
                    }
                    laps.entry(s.calc.lap as u32)
                        .and_modify(|li| li.exit_idx = i)
                        .or_insert(LapIndices { entry_idx: i, exit_idx: i });
                }
                (avg_rate_hz(samples), laps)
            })
            .unwrap_or_default();
        self.rate_hz = rate_hz;
        self.laps = laps;

        // samples may have shrunk since the cursor was placed
        let size = self.size();
        self.seeked_idx = self.seeked_idx.min(size.saturating_sub(1));
        self.alignment_idx = self.alignment_idx.min(size.saturating_sub(1));
        debug!(source = %self.source_name, laps = self.laps.len(), rate_hz, "analyzed samples");
    }
}
