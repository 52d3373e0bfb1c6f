use crate::clustering::FamilyContext;
use crate::error::ReduceError;
use crate::registry::ClusterId;
use itertools::Itertools;
use std::fmt;
use std::str::FromStr;

/// How the distance between two clusters is averaged after a merge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// `M1`: always re-average over the original leaf-pair KS values
    Cumulative,
    /// `M2`: average over the distances of the two merged clusters,
    /// each treated as a terminal unit
    Stepwise,
}

impl Mode {
    /// The strategy implementing this mode
    pub fn policy(self) -> &'static dyn DistancePolicy {
        match self {
            Mode::Cumulative => &Cumulative,
            Mode::Stepwise => &Stepwise,
        }
    }
}

impl FromStr for Mode {
    type Err = ReduceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "M1" => Ok(Mode::Cumulative),
            "M2" => Ok(Mode::Stepwise),
            _ => Err(ReduceError::InvalidMode {
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Cumulative => write!(f, "M1"),
            Mode::Stepwise => write!(f, "M2"),
        }
    }
}

/// Distance between two current clusters of a family
pub trait DistancePolicy: Sync {
    fn distance(&self, ctx: &FamilyContext, a: ClusterId, b: ClusterId) -> Result<f64, ReduceError>;

    /// Called once after `merged` has replaced its two parts in the
    /// current cluster list
    fn after_merge(&self, _ctx: &mut FamilyContext, _merged: ClusterId) -> Result<(), ReduceError> {
        Ok(())
    }
}

/// Mean of the input KS values over every leaf pair spanning `a` and `b`
///
/// # Arguments
///
/// * `ctx` - the family whose leaf table is read
/// * `a`, `b` - two disjoint clusters of that family
///
/// # Returns
///
/// The unweighted mean over all `|a| * |b|` spanning pairs, or
/// [`ReduceError::MissingPair`] for the first pair without a value.
pub fn leaf_mean(ctx: &FamilyContext, a: ClusterId, b: ClusterId) -> Result<f64, ReduceError> {
    let left = ctx.clusters.members(a);
    let right = ctx.clusters.members(b);

    if let ([x], [y]) = (left, right) {
        return ctx.leaf_ks.get(*x, *y).ok_or_else(|| ctx.missing_pair(*x, *y));
    }

    let mut sum = 0.0;
    for (&x, &y) in left.iter().cartesian_product(right.iter()) {
        sum += ctx.leaf_ks.get(x, y).ok_or_else(|| ctx.missing_pair(x, y))?;
    }
    Ok(sum / (left.len() * right.len()) as f64)
}

/// Mode `M1`
#[derive(Debug, Clone, Copy, Default)]
pub struct Cumulative;

impl DistancePolicy for Cumulative {
    fn distance(&self, ctx: &FamilyContext, a: ClusterId, b: ClusterId) -> Result<f64, ReduceError> {
        leaf_mean(ctx, a, b)
    }
}

/// Mode `M2`
///
/// The table entries written by [`Stepwise::after_merge`] make every current
/// cluster an atomic unit for the next iteration, so a merged cluster's
/// distance to `x` is the plain mean of its two parts' distances to `x`,
/// regardless of how many leaves each part holds.
#[derive(Debug, Clone, Copy, Default)]
pub struct Stepwise;

impl DistancePolicy for Stepwise {
    fn distance(&self, ctx: &FamilyContext, a: ClusterId, b: ClusterId) -> Result<f64, ReduceError> {
        if let Some(ks) = ctx.cluster_ks.get(a, b) {
            return Ok(ks);
        }
        // only two singletons may fall back to the input table
        match (ctx.clusters.parts(a), ctx.clusters.parts(b)) {
            (None, None) => leaf_mean(ctx, a, b),
            _ => Err(ReduceError::MissingClusterDistance {
                family: ctx.family.clone(),
                first: ctx.member_names(a).join(","),
                second: ctx.member_names(b).join(","),
            }),
        }
    }

    fn after_merge(&self, ctx: &mut FamilyContext, merged: ClusterId) -> Result<(), ReduceError> {
        let Some((a, b)) = ctx.clusters.parts(merged) else {
            return Ok(());
        };

        let mut updates = Vec::with_capacity(ctx.current().len());
        for &other in ctx.current().iter().filter(|&&c| c != merged) {
            let ks = (self.distance(ctx, a, other)? + self.distance(ctx, b, other)?) / 2.0;
            updates.push((other, ks));
        }
        for (other, ks) in updates {
            ctx.cluster_ks.insert(merged, other, ks);
        }
        Ok(())
    }
}
