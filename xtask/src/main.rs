mod check_gru;
mod translate;

use clap::Parser;
use dl4mt::Dl4mtMeta;
use std::{fs, num::ParseIntError, str::FromStr};

#[macro_use]
extern crate clap;

fn main() {
    use Commands::*;
    match Cli::parse().command {
        Translate(args) => args.run(),
        CheckGru(args) => args.run(),
    }
}

#[derive(Parser)]
#[clap(name = "dl4mt-utils")]
#[clap(version, about, long_about = None)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Translate lines from stdin with a randomly initialized model
    Translate(translate::TranslateArgs),
    /// Compare the reference and the fused GRU
    CheckGru(check_gru::CheckGruArgs),
}

#[derive(Args)]
struct ModelArgs {
    /// Model meta, a json file or inline json.
    #[clap(long)]
    meta: Option<String>,
    /// Seed of the random model weights.
    #[clap(long)]
    seed: Option<u64>,

    /// Log level, may be "off", "trace", "debug", "info" or "error".
    #[clap(long)]
    log: Option<String>,
}

impl ModelArgs {
    fn init_log(&self) {
        use simple_logger::SimpleLogger;

        let log = log_level(self.log.as_deref());
        SimpleLogger::new().with_level(log).init().unwrap();
    }

    /// Reads the meta from `--meta`, or makes a small one over `nvoc` words.
    fn meta(&self, nvoc: usize) -> Dl4mtMeta {
        match self.meta.as_deref() {
            Some(meta) => {
                let text = if meta.trim_start().starts_with('{') {
                    meta.to_string()
                } else {
                    fs::read_to_string(meta).unwrap()
                };
                Dl4mtMeta::from_json(&text).unwrap()
            }
            None => Dl4mtMeta {
                nvoc,
                demb: 32,
                dstate: 64,
                dctx: 128,
                datt: 128,
                dout: 32,
            },
        }
    }

    #[inline]
    fn seed(&self) -> u64 {
        self.seed.unwrap_or(0)
    }
}

fn log_level(level: Option<&str>) -> log::LevelFilter {
    use log::LevelFilter;
    match level.map(str::to_lowercase).as_deref() {
        Some("off") => LevelFilter::Off,
        Some("trace") => LevelFilter::Trace,
        Some("debug") => LevelFilter::Debug,
        Some("info") => LevelFilter::Info,
        Some("error") => LevelFilter::Error,
        _ => LevelFilter::Warn,
    }
}

enum VecOrRange {
    Vec(Vec<u32>),
    Range(u32, u32),
}

impl FromStr for VecOrRange {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            Ok(VecOrRange::Vec(Vec::new()))
        } else if let Some((start, end)) = s.split_once("..") {
            Ok(VecOrRange::Range(
                match start.trim_end() {
                    "" => 0,
                    num => num.parse::<u32>()?,
                },
                end.trim_start().parse::<u32>()?,
            ))
        } else {
            let mut list = Vec::new();
            for s in s.split(',') {
                let s = s.trim();
                if !s.is_empty() {
                    list.push(s.parse::<u32>()?);
                }
            }
            Ok(Self::Vec(list))
        }
    }
}

impl VecOrRange {
    fn into_vec(self) -> Vec<u32> {
        match self {
            Self::Vec(vec) => vec,
            Self::Range(start, end) => (start..end).collect(),
        }
    }
}

#[test]
fn test_vec_or_range() {
    let parse = |s: &str| s.parse::<VecOrRange>().unwrap().into_vec();
    assert!(parse("").is_empty());
    assert_eq!(parse("0, 1,3"), [0, 1, 3]);
    assert_eq!(parse("0..2"), [0, 1]);
    assert_eq!(parse("..3"), [0, 1, 2]);
    assert!("1..".parse::<VecOrRange>().is_err());
    assert!("a,b".parse::<VecOrRange>().is_err());
}

#[test]
fn test_log_level() {
    use log::LevelFilter;
    assert_eq!(log_level(None), LevelFilter::Warn);
    assert_eq!(log_level(Some("Trace")), LevelFilter::Trace);
    assert_eq!(log_level(Some("off")), LevelFilter::Off);
    assert_eq!(log_level(Some("none")), LevelFilter::Warn);
    assert_eq!(log_level(Some("all")), LevelFilter::Warn);
}
