use crate::error::ReduceError;
use fxhash::FxHashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// One input line: a KS value between two sequences of the same family
#[derive(Debug, Clone, PartialEq)]
pub struct KsPair {
    pub first: String,
    pub second: String,
    pub ks: f64,
    /// 1-based line number in the input
    pub line: usize,
}

/// All pairwise KS values of one gene family, in input order
#[derive(Debug, Clone, PartialEq)]
pub struct Family {
    pub id: String,
    pub pairs: Vec<KsPair>,
}

impl Family {
    pub fn new(id: impl Into<String>) -> Self {
        Family {
            id: id.into(),
            pairs: Vec::new(),
        }
    }

    /// Convenience for building families in code rather than from a file
    pub fn with_pairs<'a>(id: &str, pairs: impl IntoIterator<Item = (&'a str, &'a str, f64)>) -> Self {
        let mut family = Family::new(id);
        for (line, (first, second, ks)) in pairs.into_iter().enumerate() {
            family.pairs.push(KsPair {
                first: first.to_string(),
                second: second.to_string(),
                ks,
                line: line + 1,
            });
        }
        family
    }
}

/// Read the tab-separated input file and group its lines by family
pub fn read_families<P: AsRef<Path>>(path: P) -> Result<Vec<Family>, ReduceError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| ReduceError::Read {
        path: path.display().to_string(),
        source,
    })?;

    parse_families(BufReader::new(file)).map_err(|e| match e {
        ReduceError::Read { source, .. } => ReduceError::Read {
            path: path.display().to_string(),
            source,
        },
        other => other,
    })
}

/// Parse `<family>\t<seq_a>\t<seq_b>\t<ks>` lines
///
/// Families keep the order in which they are first seen, and so do the
/// lines within each family. Lines holding nothing but spaces are skipped;
/// anything else that does not parse aborts with the offending line number.
///
/// # Arguments
///
/// * `reader` - buffered source of the tab-separated KS table
///
/// # Returns
///
/// One [`Family`] per distinct family id, or the first parse error.
pub fn parse_families<R: BufRead>(reader: R) -> Result<Vec<Family>, ReduceError> {
    let mut families: Vec<Family> = Vec::new();
    let mut index: FxHashMap<String, usize> = FxHashMap::default();

    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| ReduceError::Read {
            path: "<input>".to_string(),
            source,
        })?;
        let line_no = idx + 1;
        let line = line.strip_suffix('\r').unwrap_or(line.as_str());
        // tabs are field separators, so a tabs-only line is malformed
        if line.trim_matches(' ').is_empty() {
            continue;
        }

        let (family_id, pair) = parse_line(line, line_no)?;

        let slot = *index.entry(family_id.to_string()).or_insert_with(|| {
            families.push(Family::new(family_id));
            families.len() - 1
        });
        families[slot].pairs.push(pair);
    }

    Ok(families)
}

fn parse_line(line: &str, line_no: usize) -> Result<(&str, KsPair), ReduceError> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() != 4 {
        return Err(ReduceError::malformed(
            line_no,
            format!("expected 4 tab-separated fields, found {}", fields.len()),
        ));
    }

    let family_id = fields[0].trim();
    let first = fields[1].trim();
    let second = fields[2].trim();
    let raw_ks = fields[3].trim();

    if family_id.is_empty() {
        return Err(ReduceError::malformed(line_no, "empty family identifier"));
    }
    if first.is_empty() || second.is_empty() {
        return Err(ReduceError::malformed(line_no, "empty sequence identifier"));
    }
    if first == second {
        return Err(ReduceError::malformed(
            line_no,
            format!("sequence {} paired with itself", first),
        ));
    }

    let ks: f64 = match raw_ks.parse() {
        Ok(ks) if f64::is_finite(ks) => ks,
        _ => {
            return Err(ReduceError::malformed(
                line_no,
                format!("KS value '{}' is not a finite number", raw_ks),
            ))
        }
    };

    Ok((
        family_id,
        KsPair {
            first: first.to_string(),
            second: second.to_string(),
            ks,
            line: line_no,
        },
    ))
}
