use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Lap and sector timing for recorded vehicle telemetry
#[derive(Parser, Debug)]
#[command(name = "trackside", version, about)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[arg(long, value_enum, default_value = "compact", global = true, env = "TRACKSIDE_LOG_FORMAT")]
    pub log_format: LogFormat,

    /// TOML configuration file; defaults are used when omitted
    #[arg(long, global = true, env = "TRACKSIDE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Compact,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build a track from a recording's positions
    MakeTrack(MakeTrackArgs),
    /// Stamp samples with lap/sector numbers and times
    Annotate(AnnotateArgs),
    /// List the laps found in a recording
    Laps(LapsArgs),
    /// Line several recordings up at a lap boundary
    Align(AlignArgs),
}

#[derive(Parser, Debug)]
pub struct MakeTrackArgs {
    /// Samples CSV whose positions become the track path
    #[arg(long)]
    pub samples: PathBuf,

    /// Where to write the track JSON
    #[arg(long)]
    pub out: PathBuf,

    /// Path index of the start gate
    #[arg(long)]
    pub start: Option<usize>,

    /// Path index of the finish gate
    #[arg(long)]
    pub finish: Option<usize>,

    /// Sector as name:entry:exit (repeatable)
    #[arg(long = "sector", value_parser = parse_sector)]
    pub sectors: Vec<SectorArg>,
}

#[derive(Parser, Debug)]
pub struct AnnotateArgs {
    #[arg(long)]
    pub samples: PathBuf,

    #[arg(long)]
    pub track: PathBuf,

    /// Where to write the annotated samples CSV
    #[arg(long)]
    pub out: PathBuf,
}

#[derive(Parser, Debug)]
pub struct LapsArgs {
    #[arg(long)]
    pub samples: PathBuf,

    #[arg(long)]
    pub track: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct AlignArgs {
    #[arg(long)]
    pub track: PathBuf,

    /// Samples CSV per recording (repeatable)
    #[arg(long, required = true, num_args = 1..)]
    pub samples: Vec<PathBuf>,

    /// Lap to align on
    #[arg(long)]
    pub lap: u32,

    /// Align on the lap's exit instead of its entry
    #[arg(long)]
    pub exit: bool,

    /// Seconds to move every recording after aligning (may be negative)
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub offset: f64,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SectorArg {
    pub name: String,
    pub entry: usize,
    pub exit: usize,
}

fn parse_sector(s: &str) -> Result<SectorArg, String> {
    let mut parts = s.rsplitn(3, ':');
    let (Some(exit), Some(entry), Some(name)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(format!("expected name:entry:exit, got '{s}'"));
    };
    let entry = entry.parse().map_err(|e| format!("bad entry index '{entry}': {e}"))?;
    let exit = exit.parse().map_err(|e| format!("bad exit index '{exit}': {e}"))?;
    Ok(SectorArg { name: name.to_string(), entry, exit })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sector() {
        let s = parse_sector("T1:10:30").unwrap();
        assert_eq!(s, SectorArg { name: "T1".into(), entry: 10, exit: 30 });
        // names may contain colons
        assert_eq!(parse_sector("a:b:1:2").unwrap().name, "a:b");
        assert!(parse_sector("T1:10").is_err());
        assert!(parse_sector("T1:x:30").is_err());
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from([
            "trackside", "-vv", "make-track", "--samples", "in.csv", "--out", "t.json",
            "--start", "3", "--sector", "s1:5:9", "--sector", "s2:9:12",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let Commands::MakeTrack(args) = cli.command else {
            panic!("wrong command");
        };
        assert_eq!(args.start, Some(3));
        assert_eq!(args.finish, None);
        assert_eq!(args.sectors.len(), 2);

        let cli = Cli::try_parse_from([
            "trackside", "align", "--track", "t.json", "--samples", "a.csv", "b.csv", "--lap", "2", "--exit",
        ])
        .unwrap();
        let Commands::Align(args) = cli.command else {
            panic!("wrong command");
        };
        assert_eq!(args.samples.len(), 2);
        assert!(args.exit);
        assert!(Cli::try_parse_from(["trackside", "-v", "-q", "laps"]).is_err());
    }
}
