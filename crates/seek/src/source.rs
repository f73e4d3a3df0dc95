use std::sync::Arc;

use analysis::{compute_track_times_with, TimingConfig, Track};
use model::{avg_rate_hz, shared, SharedSamples, TelemetrySamples};
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::{GroupedSeeker, SeekError, SeekerHandle, TelemetrySeeker};

/// One recording: its samples plus the seeker walking over them.
pub struct DataSource {
    name: String,
    /// Where the samples came from (file path, device, ...). Informational.
    pub origin: String,
    samples: SharedSamples,
    seeker: SeekerHandle,
    datum: Option<(Track, TimingConfig)>,
}

impl DataSource {
    pub fn from_samples(name: &str, samples: TelemetrySamples) -> Self {
        let samples = shared(samples);
        let mut seeker = TelemetrySeeker::new(name, Arc::downgrade(&samples));
        seeker.analyze();
        Self {
            name: name.to_string(),
            origin: String::new(),
            samples,
            seeker: Arc::new(RwLock::new(seeker)),
            datum: None,
        }
    }

    pub fn with_origin(mut self, origin: &str) -> Self {
        self.origin = origin.to_string();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
        self.seeker.write().set_source_name(name);
    }

    pub fn samples(&self) -> SharedSamples {
        self.samples.clone()
    }

    pub fn seeker(&self) -> SeekerHandle {
        self.seeker.clone()
    }

    pub fn datum_track(&self) -> Option<&Track> {
        self.datum.as_ref().map(|(t, _)| t)
    }

    /// Annotates the samples against `track` and re-indexes the seeker. The
    /// track is only kept as the datum once it has been applied.
    pub fn set_datum_track(&mut self, track: &Track, cfg: &TimingConfig) -> Result<(), SeekError> {
        self.apply_track(track, cfg)?;
        self.datum = Some((track.clone(), *cfg));
        Ok(())
    }

    pub fn reprocess_datum_track(&mut self) -> Result<(), SeekError> {
        match &self.datum {
            Some((track, cfg)) => self.apply_track(track, cfg),
            None => Ok(()),
        }
    }

    // the write lock is held for the whole timing pass, so nobody can seek
    // over half-annotated samples
    fn apply_track(&self, track: &Track, cfg: &TimingConfig) -> Result<(), SeekError> {
        {
            let mut samples = self.samples.write();
            compute_track_times_with(track, &mut samples, cfg)?;
        }
        self.seeker.write().analyze();
        info!(source = %self.name, laps = self.lap_count(), "applied datum track");
        Ok(())
    }

    /// Track whose path is this recording's own positions.
    pub fn make_track(&self) -> Track {
        Track::from_samples(&self.samples.read())
    }

    pub fn lap_count(&self) -> usize {
        self.seeker.read().lap_count()
    }

    pub fn rate_hz(&self) -> f64 {
        avg_rate_hz(&self.samples.read())
    }
}

#[derive(Default)]
pub struct DataSourceManager {
    sources: Vec<DataSource>,
}

impl DataSourceManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_source(&mut self, source: DataSource) -> usize {
        debug!(name = %source.name, samples = source.samples.read().len(), "added data source");
        self.sources.push(source);
        self.sources.len() - 1
    }

    pub fn remove_source(&mut self, idx: usize) -> Option<DataSource> {
        (idx < self.sources.len()).then(|| self.sources.remove(idx))
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub fn source(&self, idx: usize) -> Option<&DataSource> {
        self.sources.get(idx)
    }

    pub fn source_mut(&mut self, idx: usize) -> Option<&mut DataSource> {
        self.sources.get_mut(idx)
    }

    pub fn source_by_name(&self, name: &str) -> Result<&DataSource, SeekError> {
        self.sources
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| SeekError::SourceNotFound { name: name.to_string() })
    }

    pub fn set_source_name(&mut self, idx: usize, name: &str) -> Result<(), SeekError> {
        let count = self.sources.len();
        let source = self
            .sources
            .get_mut(idx)
            .ok_or(SeekError::OutOfRange { idx, size: count })?;
        source.set_name(name);
        Ok(())
    }

    pub fn sources(&self) -> impl Iterator<Item = &DataSource> {
        self.sources.iter()
    }

    /// Applies the same track to every source.
    pub fn set_datum_track(&mut self, track: &Track, cfg: &TimingConfig) -> Result<(), SeekError> {
        for s in &mut self.sources {
            s.set_datum_track(track, cfg)?;
        }
        Ok(())
    }

    /// A group holding every source's seeker, in source order.
    pub fn grouped_seeker(&self) -> GroupedSeeker {
        let mut group = GroupedSeeker::new();
        for s in &self.sources {
            group.add_seeker(s.seeker());
        }
        group
    }
}
