use crate::error::ReduceError;
use crate::policy::Mode;
use clap::Parser;
use std::path::PathBuf;

/// Reduce redundant pairwise KS values to one value per duplication event
#[derive(Parser, Debug)]
#[command(name = "ksreduce")]
#[command(about = "Average-linkage correction for redundant KS values (Maere et al. 2005)", long_about = None)]
pub struct Args {
    /// Tab-separated input: family, sequence A, sequence B, KS
    pub input: PathBuf,

    /// Prefix of the two output files
    pub output_prefix: String,

    /// Averaging mode: M1 (cumulative) or M2 (stepwise)
    pub mode: String,

    /// Also write every merge event as JSON to this file
    #[arg(short = 'e', long = "events")]
    pub events: Option<PathBuf>,

    /// Worker threads for clustering families in parallel
    #[arg(short = 't', long = "threads")]
    pub threads: Option<usize>,
}

/// Validated run settings
#[derive(Debug, Clone)]
pub struct Config {
    pub input: PathBuf,
    pub output_prefix: String,
    pub mode: Mode,
    pub events: Option<PathBuf>,
    pub threads: Option<usize>,
}

impl Config {
    pub fn new(args: Args) -> Result<Config, ReduceError> {
        let mode: Mode = args.mode.parse()?;

        let threads = match args.threads {
            Some(0) => return Err(ReduceError::InvalidThreads { value: 0 }),
            threads => threads,
        };

        Ok(Config {
            input: args.input,
            output_prefix: args.output_prefix,
            mode,
            events: args.events,
            threads,
        })
    }

    /// `<prefix>_KS_by_cluster.txt`: one line per family
    pub fn by_family_path(&self) -> PathBuf {
        PathBuf::from(format!("{}_KS_by_cluster.txt", self.output_prefix))
    }

    /// `<prefix>_KS.txt`: one KS value per line
    pub fn flat_path(&self) -> PathBuf {
        PathBuf::from(format!("{}_KS.txt", self.output_prefix))
    }
}
