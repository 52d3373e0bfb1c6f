//! # ksreduce
//!
//! `ksreduce` removes the redundancy from pairwise KS values within gene
//! families. A family of n sequences yields n(n-1)/2 KS measurements but
//! only n-1 retained duplications; following Maere et al. (2005), each
//! family is clustered by average linkage on KS and one value is reported
//! per merge, i.e. per inferred duplication event.
//!
//! Two averaging modes are available, see [`policy::Mode`].
pub mod clustering;
pub mod config;
pub mod error;
pub mod family;
pub mod policy;
pub mod registry;
pub mod startup;

pub use clustering::{cluster_family, Dendrogram, FamilyContext, MergeEngine, MergeEvent};
pub use error::ReduceError;
pub use family::Family;
pub use policy::{DistancePolicy, Mode};
