use std::path::Path;

use analysis::{compute_track_times_with, Track};
use anyhow::{Context, Result};
use iox::Config;
use model::TelemetrySamples;
use seek::{Alignment, DataSource, DataSourceManager, ElementSide, RelativeFrameLimits};
use serde::Serialize;
use tracing::info;

use crate::cli::{AlignArgs, AnnotateArgs, LapsArgs, MakeTrackArgs, SectorArg};

#[derive(Serialize, Debug, PartialEq)]
pub struct LapRow {
    pub lap: u32,
    pub entry_idx: usize,
    pub exit_idx: usize,
    pub lap_time_s: f64,
}

#[derive(Serialize, Debug, PartialEq)]
pub struct AlignReport {
    pub sources: Vec<AlignedSource>,
    pub frames: RelativeFrameLimits,
    pub backwards_s: f64,
    pub forwards_s: f64,
}

#[derive(Serialize, Debug, PartialEq)]
pub struct AlignedSource {
    pub name: String,
    pub idx: usize,
    pub t_offset: f64,
}

fn source_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

pub fn build_track(
    samples: &TelemetrySamples,
    start: Option<usize>,
    finish: Option<usize>,
    sectors: &[SectorArg],
    cfg: &Config,
) -> Result<Track> {
    let width = cfg.track.gate_width_m;
    let mut track = Track::with_gate_width(samples.iter().map(|s| s.coord).collect(), width);
    if let Some(idx) = start {
        track.set_start(idx).context("start gate")?;
    }
    if let Some(idx) = finish {
        track.set_finish(idx).context("finish gate")?;
    }
    for s in sectors {
        track
            .add_sector_with_width(&s.name, s.entry, s.exit, width)
            .with_context(|| format!("sector '{}'", s.name))?;
    }
    Ok(track)
}

pub fn run_make_track(args: &MakeTrackArgs, cfg: &Config) -> Result<()> {
    let samples = iox::import_samples_csv(&args.samples)?;
    let track = build_track(&samples, args.start, args.finish, &args.sectors, cfg)?;
    iox::save_track(&track, &args.out)?;
    info!(points = track.path_count(), sectors = track.sector_count(), "track written");
    Ok(())
}

pub fn run_annotate(args: &AnnotateArgs, cfg: &Config) -> Result<()> {
    let track = iox::load_track(&args.track)?;
    let mut samples = iox::import_samples_csv(&args.samples)?;
    compute_track_times_with(&track, &mut samples, &cfg.timing).context("track timing failed")?;
    iox::export_samples_csv(&samples, &args.out)
}

fn load_source(path: &Path, track: &Track, cfg: &Config) -> Result<DataSource> {
    let samples = iox::import_samples_csv(path)?;
    let mut source = DataSource::from_samples(&source_name(path), samples)
        .with_origin(&path.display().to_string());
    source.set_datum_track(track, &cfg.timing)?;
    Ok(source)
}

pub fn lap_rows(source: &DataSource) -> Vec<LapRow> {
    let seeker = source.seeker();
    let seeker = seeker.read();
    seeker
        .laps()
        .map(|(lap, li)| {
            let t = |idx| seeker.time_at(idx).unwrap_or(0.0);
            LapRow {
                lap,
                entry_idx: li.entry_idx,
                exit_idx: li.exit_idx,
                lap_time_s: t(li.exit_idx) - t(li.entry_idx),
            }
        })
        .collect()
}

pub fn run_laps(args: &LapsArgs, cfg: &Config) -> Result<()> {
    let track = iox::load_track(&args.track)?;
    let source = load_source(&args.samples, &track, cfg)?;
    let rows = lap_rows(&source);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }
    println!("{} laps in {} ({:.1} Hz)", rows.len(), source.name(), source.rate_hz());
    for r in &rows {
        println!("  lap {:>3}  samples {:>6}..{:<6}  {:>9.3} s", r.lap, r.entry_idx, r.exit_idx, r.lap_time_s);
    }
    Ok(())
}

/// Aligns every source on a lap boundary, then shifts all of them by
/// `offset_s` seconds.
pub fn align_sources(
    dsm: &DataSourceManager,
    lap: u32,
    side: ElementSide,
    offset_s: f64,
    cfg: &Config,
) -> Result<AlignReport> {
    let group = dsm.grouped_seeker();
    group
        .seek_to_alignment(&Alignment::Lap { lap, side })
        .with_context(|| format!("aligning on lap {lap}"))?;
    if offset_s != 0.0 {
        group.seek_all_relative_time_quantized(offset_s, cfg.seek.time_quanta_s);
    }

    let sources = group
        .seekers()
        .iter()
        .map(|s| {
            let s = s.read();
            AlignedSource {
                name: s.source_name().to_string(),
                idx: s.seeked_idx(),
                t_offset: s.time_at(s.seeked_idx()).unwrap_or(0.0),
            }
        })
        .collect();
    let times = group.relative_seek_limits_time();
    Ok(AlignReport {
        sources,
        frames: group.relative_seek_limits(),
        backwards_s: times.backwards(),
        forwards_s: times.forwards(),
    })
}

pub fn run_align(args: &AlignArgs, cfg: &Config) -> Result<()> {
    let track = iox::load_track(&args.track)?;
    let mut dsm = DataSourceManager::new();
    for path in &args.samples {
        dsm.add_source(load_source(path, &track, cfg)?);
    }
    let side = if args.exit { ElementSide::Exit } else { ElementSide::Entry };
    let report = align_sources(&dsm, args.lap, side, args.offset, cfg)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    for s in &report.sources {
        println!("  {:<24} sample {:>6}  t = {:.3} s", s.name, s.idx, s.t_offset);
    }
    println!(
        "seekable range: -{} .. +{} samples ({:.3} s .. +{:.3} s)",
        report.frames.backwards, report.frames.forwards, report.backwards_s, report.forwards_s
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::{Coord, TelemetrySample};

    fn create_test_samples(lead_in: usize, n: usize) -> TelemetrySamples {
        std::iter::repeat(0)
            .take(lead_in)
            .chain(0..n)
            .enumerate()
            .map(|(i, p)| TelemetrySample::at(0.1 * i as f64, Coord::new(45.0 + p as f64 * 1e-4, 7.0)))
            .collect()
    }

    fn create_test_track(cfg: &Config) -> Track {
        let sectors = [SectorArg { name: "S1".into(), entry: 10, exit: 20 }];
        build_track(&create_test_samples(0, 40), Some(5), Some(35), &sectors, cfg).unwrap()
    }

    #[test]
    fn test_build_track() {
        let cfg = Config::default();
        let track = create_test_track(&cfg);
        assert_eq!(track.path_count(), 40);
        assert_eq!(track.start().path_idx, 5);
        assert_eq!(track.finish().path_idx, 35);
        assert_eq!(track.sector(0).map(|s| s.gate_width_m), Some(10.0));

        let bad = [SectorArg { name: "S1".into(), entry: 30, exit: 20 }];
        let err = build_track(&create_test_samples(0, 40), None, None, &bad, &cfg).unwrap_err();
        assert!(format!("{err:#}").contains("sector 'S1'"));
        assert!(build_track(&create_test_samples(0, 4), Some(9), None, &[], &cfg).is_err());
    }

    #[test]
    fn test_laps_and_align() {
        let cfg = Config::default();
        let track = create_test_track(&cfg);
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.csv");
        let b = dir.path().join("b.csv");
        iox::export_samples_csv(&create_test_samples(0, 40), &a).unwrap();
        iox::export_samples_csv(&create_test_samples(8, 40), &b).unwrap();

        let source = load_source(&a, &track, &cfg).unwrap();
        assert_eq!(source.name(), "a");
        let rows = lap_rows(&source);
        assert_eq!(rows.len(), 1);
        assert_eq!((rows[0].entry_idx, rows[0].exit_idx), (5, 34));
        assert!((rows[0].lap_time_s - 2.9).abs() < 1e-9);

        let mut dsm = DataSourceManager::new();
        dsm.add_source(source);
        dsm.add_source(load_source(&b, &track, &cfg).unwrap());
        let report = align_sources(&dsm, 1, ElementSide::Entry, 0.0, &cfg).unwrap();
        let idxs: Vec<_> = report.sources.iter().map(|s| (s.name.as_str(), s.idx)).collect();
        assert_eq!(idxs, [("a", 5), ("b", 13)]);
        assert_eq!(report.frames, RelativeFrameLimits { backwards: 5, forwards: 34 });
        assert!((report.backwards_s + 0.5).abs() < 1e-9);

        let report = align_sources(&dsm, 1, ElementSide::Entry, 1.0, &cfg).unwrap();
        let idxs: Vec<_> = report.sources.iter().map(|s| s.idx).collect();
        assert_eq!(idxs, [15, 23]);

        assert!(align_sources(&dsm, 2, ElementSide::Exit, 0.0, &cfg).is_err());
    }
}
