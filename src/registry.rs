use fxhash::FxHashMap;
use std::hash::Hash;

/// Index of a sequence in its family's [`LeafRegistry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LeafId(pub usize);

/// Index of a cluster in its family's [`ClusterRegistry`]
///
/// Singletons get the ids `0..n` in leaf order, merges follow in the order
/// they happen. The derived ordering is the tie-break order of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClusterId(pub usize);

/// Sequence identifiers of one family, in first-seen order
#[derive(Debug, Default, Clone)]
pub struct LeafRegistry {
    names: Vec<String>,
    index: FxHashMap<String, LeafId>,
}

impl LeafRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name` if unseen and return its id
    pub fn intern(&mut self, name: &str) -> LeafId {
        if let Some(&id) = self.index.get(name) {
            return id;
        }
        let id = LeafId(self.names.len());
        self.names.push(name.to_string());
        self.index.insert(name.to_string(), id);
        id
    }

    pub fn name(&self, id: LeafId) -> &str {
        &self.names[id.0]
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn ids(&self) -> impl Iterator<Item = LeafId> + Clone {
        (0..self.names.len()).map(LeafId)
    }
}

/// Symmetric KS lookup keyed by unordered pairs
#[derive(Debug, Clone)]
pub struct DistanceTable<K> {
    values: FxHashMap<(K, K), f64>,
}

impl<K: Copy + Ord + Hash> Default for DistanceTable<K> {
    fn default() -> Self {
        DistanceTable {
            values: FxHashMap::default(),
        }
    }
}

impl<K: Copy + Ord + Hash> DistanceTable<K> {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(a: K, b: K) -> (K, K) {
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }

    /// Store a value, returning whatever the pair held before
    pub fn insert(&mut self, a: K, b: K, value: f64) -> Option<f64> {
        self.values.insert(Self::key(a, b), value)
    }

    pub fn get(&self, a: K, b: K) -> Option<f64> {
        self.values.get(&Self::key(a, b)).copied()
    }

    pub fn contains(&self, a: K, b: K) -> bool {
        self.values.contains_key(&Self::key(a, b))
    }
}

/// A node of the clustering tree
#[derive(Debug, Clone)]
pub struct Cluster {
    /// Flattened leaf membership, fixed at creation
    pub members: Vec<LeafId>,
    /// The two clusters this one was formed from; `None` for singletons
    pub parts: Option<(ClusterId, ClusterId)>,
}

/// Arena of clusters; records are never mutated or removed once created
#[derive(Debug, Default, Clone)]
pub struct ClusterRegistry {
    clusters: Vec<Cluster>,
}

impl ClusterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn singleton(&mut self, leaf: LeafId) -> ClusterId {
        self.push(Cluster {
            members: vec![leaf],
            parts: None,
        })
    }

    /// New cluster holding the members of `a` followed by those of `b`
    pub fn merge(&mut self, a: ClusterId, b: ClusterId) -> ClusterId {
        let mut members = Vec::with_capacity(self.size(a) + self.size(b));
        members.extend_from_slice(self.members(a));
        members.extend_from_slice(self.members(b));
        self.push(Cluster {
            members,
            parts: Some((a, b)),
        })
    }

    fn push(&mut self, cluster: Cluster) -> ClusterId {
        let id = ClusterId(self.clusters.len());
        self.clusters.push(cluster);
        id
    }

    pub fn members(&self, id: ClusterId) -> &[LeafId] {
        &self.clusters[id.0].members
    }

    pub fn parts(&self, id: ClusterId) -> Option<(ClusterId, ClusterId)> {
        self.clusters[id.0].parts
    }

    pub fn size(&self, id: ClusterId) -> usize {
        self.clusters[id.0].members.len()
    }
}
