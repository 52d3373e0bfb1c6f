use crate::error::ReduceError;
use crate::family::{Family, KsPair};
use crate::policy::DistancePolicy;
use crate::registry::{ClusterId, ClusterRegistry, DistanceTable, LeafId, LeafRegistry};
use itertools::Itertools;
use log::{debug, trace};
use rayon::prelude::*;

/// Clustering state of one gene family
///
/// Everything the merge loop reads or writes lives here, so two families
/// never share anything and can be clustered on different threads.
#[derive(Debug, Clone)]
pub struct FamilyContext {
    pub family: String,
    pub leaves: LeafRegistry,
    /// KS values from the input, keyed by leaf pair
    pub leaf_ks: DistanceTable<LeafId>,
    pub clusters: ClusterRegistry,
    /// Cluster-level KS values written during the run (mode `M2`)
    pub cluster_ks: DistanceTable<ClusterId>,
    current: Vec<ClusterId>,
}

impl FamilyContext {
    pub fn new(family: &str) -> Self {
        FamilyContext {
            family: family.to_string(),
            leaves: LeafRegistry::new(),
            leaf_ks: DistanceTable::new(),
            clusters: ClusterRegistry::new(),
            cluster_ks: DistanceTable::new(),
            current: Vec::new(),
        }
    }

    /// Seed a context from a parsed family and check that every leaf pair
    /// has a KS value
    pub fn from_family(family: &Family) -> Result<Self, ReduceError> {
        let mut ctx = FamilyContext::new(&family.id);
        for pair in &family.pairs {
            ctx.add_pair(pair)?;
        }
        ctx.check_complete()?;
        Ok(ctx)
    }

    /// Register a sequence as its own singleton cluster
    pub fn add_leaf(&mut self, name: &str) -> LeafId {
        let known = self.leaves.len();
        let leaf = self.leaves.intern(name);
        if self.leaves.len() > known {
            let cluster = self.clusters.singleton(leaf);
            self.current.push(cluster);
        }
        leaf
    }

    /// Record one input KS value; repeating a pair with the same value is a no-op
    pub fn add_pair(&mut self, pair: &KsPair) -> Result<(), ReduceError> {
        let a = self.add_leaf(&pair.first);
        let b = self.add_leaf(&pair.second);
        match self.leaf_ks.get(a, b) {
            Some(kept) if kept != pair.ks => Err(ReduceError::ConflictingPair {
                family: self.family.clone(),
                first: pair.first.clone(),
                second: pair.second.clone(),
                kept,
                found: pair.ks,
            }),
            Some(_) => {
                debug!("{}: duplicate pair {}/{} at line {}", self.family, pair.first, pair.second, pair.line);
                Ok(())
            }
            None => {
                self.leaf_ks.insert(a, b, pair.ks);
                Ok(())
            }
        }
    }

    /// Fail on the first leaf pair (in leaf order) without a KS value
    pub fn check_complete(&self) -> Result<(), ReduceError> {
        match self
            .leaves
            .ids()
            .tuple_combinations()
            .find(|&(a, b)| !self.leaf_ks.contains(a, b))
        {
            Some((a, b)) => Err(self.missing_pair(a, b)),
            None => Ok(()),
        }
    }

    pub(crate) fn missing_pair(&self, a: LeafId, b: LeafId) -> ReduceError {
        let (a, b) = if a <= b { (a, b) } else { (b, a) };
        ReduceError::MissingPair {
            family: self.family.clone(),
            first: self.leaves.name(a).to_string(),
            second: self.leaves.name(b).to_string(),
        }
    }

    /// Clusters not yet absorbed by a merge; always a partition of the leaves
    pub fn current(&self) -> &[ClusterId] {
        &self.current
    }

    /// Replace `a` and `b` by their union, which takes `a`'s slot
    pub fn merge(&mut self, a: ClusterId, b: ClusterId) -> ClusterId {
        let merged = self.clusters.merge(a, b);
        self.current.retain(|&c| c != b);
        if let Some(slot) = self.current.iter_mut().find(|c| **c == a) {
            *slot = merged;
        }
        merged
    }

    pub fn member_names(&self, id: ClusterId) -> Vec<String> {
        self.clusters
            .members(id)
            .iter()
            .map(|&leaf| self.leaves.name(leaf).to_string())
            .collect()
    }
}

/// One inferred duplication event
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergeEvent {
    pub left: ClusterId,
    pub right: ClusterId,
    pub merged: ClusterId,
    pub ks: f64,
    /// Leaf pairs spanning the two sides; each contributes 1/m of the event
    pub spanning_pairs: usize,
}

/// A finished clustering run
#[derive(Debug, Clone)]
pub struct Dendrogram {
    pub context: FamilyContext,
    pub events: Vec<MergeEvent>,
}

impl Dendrogram {
    /// One KS value per duplication event, in merge order
    pub fn ks_values(&self) -> Vec<f64> {
        self.events.iter().map(|e| e.ks).collect()
    }

    /// The cluster holding every leaf, if the family has any
    pub fn root(&self) -> Option<ClusterId> {
        match self.context.current() {
            [root] => Some(*root),
            _ => None,
        }
    }
}

/// Average-linkage merge loop over one family
pub struct MergeEngine<'p> {
    ctx: FamilyContext,
    policy: &'p dyn DistancePolicy,
    events: Vec<MergeEvent>,
}

impl<'p> MergeEngine<'p> {
    pub fn new(ctx: FamilyContext, policy: &'p dyn DistancePolicy) -> Self {
        MergeEngine {
            ctx,
            policy,
            events: Vec::new(),
        }
    }

    pub fn context(&self) -> &FamilyContext {
        &self.ctx
    }

    /// Closest pair of current clusters
    ///
    /// Ties on the distance go to the pair whose (lower id, higher id) sorts
    /// first. All distances are computed before any is compared, so the
    /// result does not depend on how rayon schedules the work.
    fn closest_pair(&self) -> Result<Option<(ClusterId, ClusterId, f64)>, ReduceError> {
        // every unordered pair, lower id first
        let pairs: Vec<(ClusterId, ClusterId)> = self
            .ctx
            .current()
            .iter()
            .copied()
            .tuple_combinations()
            .map(|(a, b)| if a < b { (a, b) } else { (b, a) })
            .collect();

        let ctx = &self.ctx;
        let policy = self.policy;
        let distances: Vec<Result<f64, ReduceError>> = pairs
            .par_iter()
            .map(|&(a, b)| policy.distance(ctx, a, b))
            .collect();

        let mut best: Option<(ClusterId, ClusterId, f64)> = None;
        // pairs arrive in slot order, not id order
        for ((a, b), ks) in pairs.into_iter().zip(distances) {
            let ks = ks?;
            trace!("{}: d({}, {}) = {}", ctx.family, a.0, b.0, ks);
            best = match best {
                Some((ba, bb, bks)) if bks < ks || (bks == ks && (ba, bb) <= (a, b)) => {
                    Some((ba, bb, bks))
                }
                _ => Some((a, b, ks)),
            };
        }
        Ok(best)
    }

    /// Perform one merge; `None` once a single cluster is left
    pub fn step(&mut self) -> Result<Option<MergeEvent>, ReduceError> {
        let Some((left, right, ks)) = self.closest_pair()? else {
            return Ok(None);
        };

        // m for the 1/m weight; taken before the merge retires both sides
        let spanning_pairs = self.ctx.clusters.size(left) * self.ctx.clusters.size(right);
        let merged = self.ctx.merge(left, right);
        self.policy.after_merge(&mut self.ctx, merged)?;

        debug!(
            "{}: merge {} + {} -> {} at KS {} ({} pairs)",
            self.ctx.family, left.0, right.0, merged.0, ks, spanning_pairs
        );

        let event = MergeEvent {
            left,
            right,
            merged,
            ks,
            spanning_pairs,
        };
        self.events.push(event);
        Ok(Some(event))
    }

    /// Merge until one cluster remains
    pub fn run(mut self) -> Result<Dendrogram, ReduceError> {
        while self.step()?.is_some() {}

        debug_assert_eq!(self.events.len(), self.ctx.leaves.len().saturating_sub(1));
        Ok(Dendrogram {
            context: self.ctx,
            events: self.events,
        })
    }
}

/// Cluster one family with the given policy
///
/// # Arguments
///
/// * `family` - the KS pairs of one gene family
/// * `policy` - how cluster distances are averaged, see [`crate::policy::Mode::policy`]
///
/// # Returns
///
/// A [`Dendrogram`] holding `n - 1` merge events for `n` sequences, or the
/// first malformed, conflicting or missing pair found while building the
/// family context.
pub fn cluster_family(family: &Family, policy: &dyn DistancePolicy) -> Result<Dendrogram, ReduceError> {
    let ctx = FamilyContext::from_family(family)?;
    MergeEngine::new(ctx, policy).run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::Mode;

    fn diamond() -> Family {
        Family::with_pairs(
            "cluster1",
            [
                ("G1", "G2", 0.003),
                ("G1", "G3", 0.326),
                ("G1", "G4", 0.563),
                ("G2", "G3", 0.245),
                ("G2", "G4", 0.637),
                ("G3", "G4", 0.476),
            ],
        )
    }

    /// Six sequences with distinct pairwise values, listed row by row
    fn hexad() -> (Vec<&'static str>, Vec<f64>) {
        let names = vec!["a", "b", "c", "d", "e", "f"];
        let condensed = vec![
            0.49, 1.34, 1.33, 0.84, 1.48, //
            1.26, 1.13, 0.47, 0.07, //
            1.03, 1.12, 0.56, //
            0.74, 0.87, //
            0.41,
        ];
        (names, condensed)
    }

    fn hexad_family() -> Family {
        let (names, condensed) = hexad();
        let pairs = names
            .iter()
            .copied()
            .tuple_combinations()
            .zip(condensed)
            .map(|((a, b), ks)| (a, b, ks));
        Family::with_pairs("hexad", pairs)
    }

    fn assert_close(found: &[f64], expected: &[f64]) {
        assert_eq!(found.len(), expected.len(), "{:?} vs {:?}", found, expected);
        for (f, e) in found.iter().zip(expected) {
            assert!((f - e).abs() < 1e-9, "{:?} vs {:?}", found, expected);
        }
    }

    #[test]
    fn diamond_cumulative() {
        let tree = cluster_family(&diamond(), Mode::Cumulative.policy()).unwrap();
        assert_close(&tree.ks_values(), &[0.003, 0.2855, 1.676 / 3.0]);
    }

    #[test]
    fn diamond_stepwise() {
        let tree = cluster_family(&diamond(), Mode::Stepwise.policy()).unwrap();
        assert_close(&tree.ks_values(), &[0.003, 0.2855, 0.538]);
    }

    #[test]
    fn diamond_merge_order() {
        let tree = cluster_family(&diamond(), Mode::Cumulative.policy()).unwrap();
        let ctx = &tree.context;
        let sides: Vec<(Vec<String>, Vec<String>, usize)> = tree
            .events
            .iter()
            .map(|e| (ctx.member_names(e.left), ctx.member_names(e.right), e.spanning_pairs))
            .collect();
        insta::assert_snapshot!(format!("{:?}", sides), @r###"[(["G1"], ["G2"], 1), (["G3"], ["G1", "G2"], 2), (["G4"], ["G3", "G1", "G2"], 3)]"###);
    }

    #[test]
    fn two_leaves_return_the_input_value() {
        let family = Family::with_pairs("pair", [("x", "y", 0.731)]);
        for mode in [Mode::Cumulative, Mode::Stepwise] {
            let tree = cluster_family(&family, mode.policy()).unwrap();
            assert_eq!(tree.ks_values(), vec![0.731]);
        }
    }

    #[test]
    fn degenerate_families_have_no_events() {
        let empty = cluster_family(&Family::new("empty"), Mode::Cumulative.policy()).unwrap();
        assert!(empty.events.is_empty());
        assert_eq!(empty.root(), None);

        let mut ctx = FamilyContext::new("single");
        ctx.add_leaf("only");
        let single = MergeEngine::new(ctx, Mode::Stepwise.policy()).run().unwrap();
        assert!(single.events.is_empty());
        assert_eq!(single.root(), Some(ClusterId(0)));
    }

    #[test]
    fn final_cluster_holds_every_leaf_once() {
        for mode in [Mode::Cumulative, Mode::Stepwise] {
            let tree = cluster_family(&hexad_family(), mode.policy()).unwrap();
            assert_eq!(tree.events.len(), 5);
            let spanned: usize = tree.events.iter().map(|e| e.spanning_pairs).sum();
            assert_eq!(spanned, 15);

            let root = tree.root().unwrap();
            let mut names = tree.context.member_names(root);
            names.sort();
            assert_eq!(names, vec!["a", "b", "c", "d", "e", "f"]);
        }
    }

    #[test]
    fn each_step_shrinks_the_partition_by_one() {
        let ctx = FamilyContext::from_family(&hexad_family()).unwrap();
        let mut engine = MergeEngine::new(ctx, Mode::Stepwise.policy());
        for remaining in (1..6).rev() {
            assert!(engine.step().unwrap().is_some());
            assert_eq!(engine.context().current().len(), remaining);

            let mut covered: Vec<LeafId> = engine
                .context()
                .current()
                .iter()
                .flat_map(|&c| engine.context().clusters.members(c).to_vec())
                .collect();
            covered.sort();
            assert_eq!(covered, (0..6).map(LeafId).collect::<Vec<_>>());
        }
        assert!(engine.step().unwrap().is_none());
    }

    #[test]
    fn modes_agree_on_first_merge() {
        let cumulative = cluster_family(&hexad_family(), Mode::Cumulative.policy()).unwrap();
        let stepwise = cluster_family(&hexad_family(), Mode::Stepwise.policy()).unwrap();
        assert_eq!(cumulative.events[0], stepwise.events[0]);

        assert_close(&cumulative.ks_values()[..3], &[0.07, 0.44, 2.74 / 3.0]);
        assert_close(&stepwise.ks_values()[..3], &[0.07, 0.44, 0.87]);
    }

    #[test]
    fn ties_go_to_the_lowest_pair() {
        let family = Family::with_pairs(
            "tied",
            [
                ("p", "q", 0.5),
                ("p", "r", 0.2),
                ("p", "s", 0.5),
                ("q", "r", 0.5),
                ("q", "s", 0.2),
                ("r", "s", 0.5),
            ],
        );
        let tree = cluster_family(&family, Mode::Cumulative.policy()).unwrap();
        let first = tree.events[0];
        assert_eq!((first.left, first.right), (ClusterId(0), ClusterId(2)));
        let second = tree.events[1];
        assert_eq!((second.left, second.right), (ClusterId(1), ClusterId(3)));
    }

    #[test]
    fn ties_follow_id_order_not_slot_order() {
        // after p+r the merged cluster 4 sits in slot 0, ahead of q (1)
        let family = Family::with_pairs(
            "tied",
            [
                ("p", "q", 0.3),
                ("p", "r", 0.1),
                ("p", "s", 0.9),
                ("q", "r", 0.3),
                ("q", "s", 0.3),
                ("r", "s", 0.9),
            ],
        );
        for mode in [Mode::Cumulative, Mode::Stepwise] {
            let tree = cluster_family(&family, mode.policy()).unwrap();
            let pairs: Vec<(ClusterId, ClusterId)> = tree.events.iter().map(|e| (e.left, e.right)).collect();
            assert_eq!(
                pairs,
                vec![
                    (ClusterId(0), ClusterId(2)),
                    (ClusterId(1), ClusterId(3)),
                    (ClusterId(4), ClusterId(5)),
                ],
                "mode {}",
                mode
            );
            assert_close(&tree.ks_values(), &[0.1, 0.3, 0.6]);
        }
    }

    #[test]
    fn missing_pair_is_named() {
        let family = Family::with_pairs("gappy", [("G1", "G2", 0.1), ("G2", "G3", 0.2)]);
        let err = cluster_family(&family, Mode::Cumulative.policy()).unwrap_err();
        insta::assert_snapshot!(err.to_string(), @"family gappy: no KS value for pair G1/G3");
    }

    #[test]
    fn conflicting_duplicate_is_rejected() {
        let family = Family::with_pairs("dup", [("A", "B", 0.1), ("B", "A", 0.1)]);
        assert!(cluster_family(&family, Mode::Cumulative.policy()).is_ok());

        let family = Family::with_pairs("dup", [("A", "B", 0.1), ("B", "A", 0.3)]);
        match cluster_family(&family, Mode::Cumulative.policy()) {
            Err(ReduceError::ConflictingPair { kept, found, .. }) => {
                assert_eq!((kept, found), (0.1, 0.3));
            }
            other => panic!("expected a conflicting pair error, got {:?}", other),
        }
    }

    /// UPGMA and WPGMA from kodama give the same heights as the two modes
    #[test]
    fn heights_match_kodama_linkage() {
        let (names, condensed) = hexad();
        let cases = [
            (Mode::Cumulative, kodama::Method::Average),
            (Mode::Stepwise, kodama::Method::Weighted),
        ];

        for (mode, method) in cases {
            let dendrogram = kodama::linkage(&mut condensed.clone(), names.len(), method);
            let mut expected: Vec<f64> = dendrogram.steps().iter().map(|s| s.dissimilarity).collect();
            expected.sort_by(|a, b| a.partial_cmp(b).unwrap());

            let tree = cluster_family(&hexad_family(), mode.policy()).unwrap();
            let mut found = tree.ks_values();
            found.sort_by(|a, b| a.partial_cmp(b).unwrap());

            assert_close(&found, &expected);
        }
    }
}
