use crate::clustering::{cluster_family, Dendrogram};
use crate::config::Config;
use crate::error::ReduceError;
use crate::family::{read_families, Family};
use crate::policy::Mode;
use log::{info, warn};
use rayon::prelude::*;
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Merge events of one family as written to the JSON dump
#[derive(Debug, Serialize)]
struct FamilyEvents<'a> {
    family: &'a str,
    mode: String,
    ks: Vec<f64>,
    events: Vec<EventRecord>,
}

#[derive(Debug, Serialize)]
struct EventRecord {
    ks: f64,
    left: Vec<String>,
    right: Vec<String>,
    spanning_pairs: usize,
}

/// Run the complete correction: read, cluster every family, write outputs
pub fn run(config: &Config) -> Result<(), ReduceError> {
    if let Some(threads) = config.threads {
        if let Err(e) = rayon::ThreadPoolBuilder::new().num_threads(threads).build_global() {
            warn!("Could not set up {} worker threads: {}", threads, e);
        }
    }

    info!("Loading KS values from {}", config.input.display());
    let families = read_families(&config.input)?;
    let n_pairs: usize = families.iter().map(|f| f.pairs.len()).sum();
    info!("Loaded {} families with {} pairwise KS values", families.len(), n_pairs);

    info!("Clustering families (mode {})...", config.mode);
    let trees = reduce_families(&families, config.mode)?;
    let n_events: usize = trees.iter().map(|t| t.events.len()).sum();
    info!("Reduced {} pairwise values to {} duplication events", n_pairs, n_events);

    let by_family = config.by_family_path();
    write_to(&by_family, |out| write_by_family(out, &trees))?;
    info!("Per-family KS values written to {}", by_family.display());

    let flat = config.flat_path();
    write_to(&flat, |out| write_flat(out, &trees))?;
    info!("KS values written to {}", flat.display());

    if let Some(path) = &config.events {
        let mut out = BufWriter::new(create(path)?);
        write_events(&mut out, &trees, config.mode)?;
        out.flush().map_err(|source| ReduceError::Write {
            path: path.display().to_string(),
            source,
        })?;
        info!("Merge events written to {}", path.display());
    }

    Ok(())
}

/// Cluster a single family
pub fn reduce_family(family: &Family, mode: Mode) -> Result<Dendrogram, ReduceError> {
    cluster_family(family, mode.policy())
}

/// Cluster all families in parallel; results and the reported error follow
/// input order
///
/// # Arguments
///
/// * `families` - parsed families, in input order
/// * `mode` - averaging mode shared by every family
///
/// # Returns
///
/// One [`Dendrogram`] per family, or the error of the first failing family.
pub fn reduce_families(families: &[Family], mode: Mode) -> Result<Vec<Dendrogram>, ReduceError> {
    // finish every family before picking an error
    let results: Vec<Result<Dendrogram, ReduceError>> = families
        .par_iter()
        .map(|family| reduce_family(family, mode))
        .collect();

    results.into_iter().collect()
}

/// One line per family: the family id, then its KS values, tab-separated
pub fn write_by_family<W: Write>(mut out: W, trees: &[Dendrogram]) -> io::Result<()> {
    for tree in trees {
        write!(out, "{}", tree.context.family)?;
        for ks in tree.ks_values() {
            write!(out, "\t{}", ks)?;
        }
        writeln!(out)?;
    }
    out.flush()
}

/// Every KS value of every family, one per line
pub fn write_flat<W: Write>(mut out: W, trees: &[Dendrogram]) -> io::Result<()> {
    for ks in trees.iter().flat_map(|t| t.ks_values()) {
        writeln!(out, "{}", ks)?;
    }
    out.flush()
}

/// Pretty JSON array with every merge event and the leaves on either side
pub fn write_events<W: Write>(out: W, trees: &[Dendrogram], mode: Mode) -> Result<(), ReduceError> {
    let records: Vec<FamilyEvents> = trees
        .iter()
        .map(|tree| {
            let ctx = &tree.context;
            FamilyEvents {
                family: &ctx.family,
                mode: mode.to_string(),
                ks: tree.ks_values(),
                events: tree
                    .events
                    .iter()
                    .map(|e| EventRecord {
                        ks: e.ks,
                        left: ctx.member_names(e.left),
                        right: ctx.member_names(e.right),
                        spanning_pairs: e.spanning_pairs,
                    })
                    .collect(),
            }
        })
        .collect();

    serde_json::to_writer_pretty(out, &records)?;
    Ok(())
}

fn create(path: &Path) -> Result<File, ReduceError> {
    File::create(path).map_err(|source| ReduceError::Write {
        path: path.display().to_string(),
        source,
    })
}

fn write_to<F>(path: &Path, body: F) -> Result<(), ReduceError>
where
    F: FnOnce(&mut BufWriter<File>) -> io::Result<()>,
{
    let mut out = BufWriter::new(create(path)?);
    body(&mut out).map_err(|source| ReduceError::Write {
        path: path.display().to_string(),
        source,
    })
}
