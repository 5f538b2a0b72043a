use std::num::NonZeroUsize;

use crate::config::KMeansConfig;
use crate::record::{ClusterAssignment, EntityState};

pub mod features;
pub mod kmeans;

use features::feature_matrix;
use kmeans::KMeans;

/// Below this many entities every entity is put in group 0.
pub const MIN_CLUSTERING_POPULATION: usize = 3;

/// Output of one classification cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    /// One assignment per snapshot entry, in snapshot order.
    pub assignments: Vec<ClusterAssignment>,
    /// Number of distinct labels actually handed out.
    pub groups: usize,
    pub iterations: usize,
}

impl Classification {
    fn single_group(snapshot: &[EntityState]) -> Self {
        Self {
            assignments: snapshot
                .iter()
                .map(|state| ClusterAssignment::new(state, 0))
                .collect(),
            groups: usize::from(!snapshot.is_empty()),
            iterations: 0,
        }
    }
}

/// Places every entity of a snapshot into a group.
///
/// Implementations must cover every entity of the snapshot exactly once and must not
/// fail: degenerate input is answered with fewer groups.
pub trait Classifier {
    fn classify(&self, snapshot: &[EntityState]) -> Classification;
}

/// Refits k-means from scratch over the whole snapshot on every call.
#[derive(Debug, Clone)]
pub struct KMeansClassifier {
    kmeans: KMeans,
}

impl KMeansClassifier {
    pub fn new(n_clusters: NonZeroUsize, config: &KMeansConfig) -> Self {
        let kmeans = KMeans::new(n_clusters.get(), config.kmeans_seed)
            .with_max_iterations(config.kmeans_max_iterations)
            .with_tolerance(config.kmeans_tolerance);

        Self { kmeans }
    }

    pub fn n_clusters(&self) -> usize {
        self.kmeans.n_clusters
    }
}

impl Classifier for KMeansClassifier {
    fn classify(&self, snapshot: &[EntityState]) -> Classification {
        if snapshot.len() < MIN_CLUSTERING_POPULATION {
            return Classification::single_group(snapshot);
        }

        let fit = self.kmeans.fit_predict(&feature_matrix(snapshot));
        metrics::histogram!("user_classifier_clustering_iterations").record(fit.iterations as f64);

        Classification {
            assignments: snapshot
                .iter()
                .zip(&fit.labels)
                .map(|(state, &label)| ClusterAssignment::new(state, label))
                .collect(),
            groups: fit.realized_groups(),
            iterations: fit.iterations,
        }
    }
}
