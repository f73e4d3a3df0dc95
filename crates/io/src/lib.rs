//! File formats: samples as CSV, tracks as JSON, configuration as TOML.

pub mod config;

use std::{fs::File, io::BufWriter, path::Path};

use analysis::Track;
use anyhow::{Context, Result};
use model::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub use config::{Config, TrackConfig};

pub fn import_samples_csv(path: &Path) -> Result<TelemetrySamples> {
    let mut rdr = csv::Reader::from_path(path)
        .with_context(|| format!("opening samples {}", path.display()))?;
    let mut samples = TelemetrySamples::new();
    for (i, rec) in rdr.deserialize().enumerate() {
        let r: CsvRow = rec.with_context(|| format!("{}: bad row {}", path.display(), i + 1))?;
        samples.push(r.into());
    }
    info!(path = %path.display(), samples = samples.len(), "imported samples");
    Ok(samples)
}

pub fn export_samples_csv(samples: &[TelemetrySample], path: &Path) -> Result<()> {
    let mut w = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    for s in samples {
        w.serialize(CsvRow::from(s))?;
    }
    w.flush()?;
    info!(path = %path.display(), samples = samples.len(), "exported samples");
    Ok(())
}

pub fn track_to_json(track: &Track) -> Result<String> {
    Ok(serde_json::to_string_pretty(track)?)
}

/// Decodes a track and checks it is usable for timing.
pub fn track_from_json(s: &str) -> Result<Track> {
    let track: Track = serde_json::from_str(s)?;
    track.validate().context("invalid track")?;
    Ok(track)
}

pub fn load_track(path: &Path) -> Result<Track> {
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("reading track {}", path.display()))?;
    let track = track_from_json(&s).with_context(|| format!("loading track {}", path.display()))?;
    debug!(path = %path.display(), points = track.path_count(), sectors = track.sector_count(), "loaded track");
    Ok(track)
}

pub fn save_track(track: &Track, path: &Path) -> Result<()> {
    let f = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut w = BufWriter::new(f);
    serde_json::to_writer_pretty(&mut w, track)?;
    use std::io::Write;
    w.flush()?;
    info!(path = %path.display(), "saved track");
    Ok(())
}

#[derive(Serialize, Deserialize)]
struct CsvRow {
    t_offset: f64,
    lat: f64,
    lon: f64,
    #[serde(default)]
    speed_mps: f64,
    #[serde(default)]
    engine_speed_rpm: f32,
    #[serde(default)]
    tps: f32,
    #[serde(default)]
    boost_psi: f32,
    // computed by track timing; absent in raw recordings
    #[serde(default)]
    on_track_lat: Option<f64>,
    #[serde(default)]
    on_track_lon: Option<f64>,
    #[serde(default)]
    lap: Option<i32>,
    #[serde(default)]
    lap_time_offset: Option<f64>,
    #[serde(default)]
    sector: Option<i32>,
    #[serde(default)]
    sector_time_offset: Option<f64>,
}

impl From<CsvRow> for TelemetrySample {
    fn from(r: CsvRow) -> Self {
        let coord = Coord::new(r.lat, r.lon);
        let defaults = CalcSample::default();
        TelemetrySample {
            t_offset: r.t_offset,
            coord,
            speed_mps: r.speed_mps,
            ecu: EcuSample {
                engine_speed_rpm: r.engine_speed_rpm,
                tps: r.tps,
                boost_psi: r.boost_psi,
            },
            calc: CalcSample {
                on_track: match (r.on_track_lat, r.on_track_lon) {
                    (Some(lat), Some(lon)) => Coord::new(lat, lon),
                    _ => defaults.on_track,
                },
                lap: r.lap.unwrap_or(defaults.lap),
                lap_time_offset: r.lap_time_offset.unwrap_or(defaults.lap_time_offset),
                sector: r.sector.unwrap_or(defaults.sector),
                sector_time_offset: r.sector_time_offset.unwrap_or(defaults.sector_time_offset),
            },
        }
    }
}

impl From<&TelemetrySample> for CsvRow {
    fn from(s: &TelemetrySample) -> Self {
        CsvRow {
            t_offset: s.t_offset,
            lat: s.coord.lat,
            lon: s.coord.lon,
            speed_mps: s.speed_mps,
            engine_speed_rpm: s.ecu.engine_speed_rpm,
            tps: s.ecu.tps,
            boost_psi: s.ecu.boost_psi,
            on_track_lat: Some(s.calc.on_track.lat),
            on_track_lon: Some(s.calc.on_track.lon),
            lap: Some(s.calc.lap),
            lap_time_offset: Some(s.calc.lap_time_offset),
            sector: Some(s.calc.sector),
            sector_time_offset: Some(s.calc.sector_time_offset),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn create_test_samples(n: usize) -> TelemetrySamples {
        (0..n)
            .map(|i| {
                let mut s = TelemetrySample::at(0.1 * i as f64, Coord::new(45.0 + i as f64 * 1e-4, -122.5));
                s.speed_mps = 12.5;
                s.ecu.engine_speed_rpm = 4000.0 + i as f32;
                s
            })
            .collect()
    }

    #[test]
    fn test_samples_csv_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.csv");
        let mut samples = create_test_samples(5);
        samples[2].calc.lap = 1;
        samples[2].calc.lap_time_offset = 0.1;
        samples[2].calc.sector = 3;
        samples[2].calc.on_track = Coord::new(45.0002, -122.5);
        export_samples_csv(&samples, &path).unwrap();
        let back = import_samples_csv(&path).unwrap();
        assert_eq!(back, samples);
    }

    #[test]
    fn test_import_raw_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.csv");
        let mut f = File::create(&path).unwrap();
        writeln!(f, "t_offset,lat,lon,speed_mps").unwrap();
        writeln!(f, "0.0,45.0,-122.0,3.5").unwrap();
        writeln!(f, "0.1,45.1,-122.0,4.0").unwrap();
        drop(f);

        let samples = import_samples_csv(&path).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1].coord, Coord::new(45.1, -122.0));
        assert_eq!(samples[1].speed_mps, 4.0);
        assert_eq!(samples[1].calc, CalcSample::default());
        assert_eq!(samples[1].ecu, EcuSample::default());
    }

    #[test]
    fn test_import_bad_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, "t_offset,lat,lon\n0.0,north,1.0\n").unwrap();
        let err = import_samples_csv(&path).unwrap_err();
        assert!(format!("{err:#}").contains("bad row 1"));
        assert!(import_samples_csv(&dir.path().join("missing.csv")).is_err());
    }

    #[test]
    fn test_track_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("track.json");
        let mut track = Track::from_samples(&create_test_samples(50));
        track.set_start(3).unwrap();
        track.set_finish(45).unwrap();
        track.add_sector_with_width("hairpin", 10, 20, 15.0).unwrap();
        save_track(&track, &path).unwrap();
        assert_eq!(load_track(&path).unwrap(), track);
    }

    #[test]
    fn test_track_from_json_validates() {
        let mut track = Track::from_samples(&create_test_samples(10));
        track.add_sector("s", 2, 4).unwrap();
        let json = track_to_json(&track).unwrap();
        assert_eq!(track_from_json(&json).unwrap(), track);

        // point the sector past the end of the path
        let mut value: serde_json::Value = serde_json::from_str(&json).unwrap();
        value["sectors"][0]["exit_path_idx"] = 40.into();
        assert!(track_from_json(&value.to_string()).is_err());

        // gate width falls back to the default when missing
        value["sectors"][0]["exit_path_idx"] = 4.into();
        value["sectors"][0].as_object_mut().unwrap().remove("gate_width_m");
        let track = track_from_json(&value.to_string()).unwrap();
        assert_eq!(track.sector(0).map(|s| s.gate_width_m), Some(analysis::DEFAULT_GATE_WIDTH_M));
    }
}
