use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use pulse_core::{member_ids, Category, ClusterAssignment, ComplaintItem, InputError, MemberId};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::encoder::{TfidfEncoder, DEFAULT_MAX_FEATURES};
use crate::error::ClusterError;
use crate::hybrid::HybridClassifier;

/// Largest batch that is clustered agglomeratively, and the cap on the
/// default cluster count.
pub const SMALL_BATCH_LIMIT: usize = 6;
pub const KMEANS_SEED: u64 = 42;
const KMEANS_MAX_ITER: usize = 300;
const KMEANS_TOLERANCE: f64 = 1e-8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterAlgorithm {
    Single,
    Agglomerative,
    KMeans,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterReport {
    pub clusters: Vec<ClusterAssignment>,
    /// Algorithm chosen for the batch size.
    pub algorithm: ClusterAlgorithm,
    pub requested_clusters: usize,
    /// Set when the chosen algorithm failed and items were grouped by
    /// predicted category instead.
    pub fallback_used: bool,
}

/// Groups complaint batches. Holds only shared read-only state; every call
/// builds its own feature matrix.
#[derive(Clone)]
pub struct ClusterEngine {
    encoder: Option<Arc<TfidfEncoder>>,
    classifier: Arc<HybridClassifier>,
}

impl ClusterEngine {
    pub fn new(encoder: Option<Arc<TfidfEncoder>>, classifier: Arc<HybridClassifier>) -> Self {
        Self {
            encoder,
            classifier,
        }
    }

    pub fn cluster(
        &self,
        items: &[ComplaintItem],
        n_clusters: Option<usize>,
    ) -> Result<ClusterReport, InputError> {
        if items.is_empty() {
            return Err(InputError::EmptyBatch);
        }

        let k = default_cluster_count(items.len(), n_clusters);
        let members = member_ids(items);

        if items.len() == 1 {
            return Ok(ClusterReport {
                clusters: vec![ClusterAssignment {
                    cluster_id: 0,
                    members,
                }],
                algorithm: ClusterAlgorithm::Single,
                requested_clusters: k,
                fallback_used: false,
            });
        }

        let algorithm = if items.len() <= SMALL_BATCH_LIMIT {
            ClusterAlgorithm::Agglomerative
        } else {
            ClusterAlgorithm::KMeans
        };
        let texts = items.iter().map(ComplaintItem::cluster_text).collect::<Vec<_>>();

        let (labels, fallback_used) = match self.statistical_labels(&texts, k, algorithm) {
            Ok(labels) => (labels, false),
            Err(error) => {
                warn!(
                    algorithm = ?algorithm,
                    k,
                    items = items.len(),
                    error = %error,
                    "clustering failed, grouping by predicted category"
                );
                (self.category_labels(&texts), true)
            }
        };

        debug!(algorithm = ?algorithm, k, fallback_used, "batch clustered");

        Ok(ClusterReport {
            clusters: group_members(members, &labels),
            algorithm,
            requested_clusters: k,
            fallback_used,
        })
    }

    fn statistical_labels(
        &self,
        texts: &[String],
        k: usize,
        algorithm: ClusterAlgorithm,
    ) -> Result<Vec<usize>, ClusterError> {
        // one encoder instance per batch so distances are comparable
        let rows = match &self.encoder {
            Some(encoder) => encoder.encode_batch(texts),
            None => TfidfEncoder::fit(texts, DEFAULT_MAX_FEATURES)
                .map_err(|error| ClusterError::Vectorize(error.to_string()))?
                .encode_batch(texts),
        };
        let points = rows.iter().map(|row| row.to_dense()).collect::<Vec<_>>();

        check_points(&points, k)?;

        match algorithm {
            ClusterAlgorithm::Single => Ok(vec![0; points.len()]),
            ClusterAlgorithm::Agglomerative => Ok(agglomerative(&points, k)),
            ClusterAlgorithm::KMeans => kmeans(&points, k, KMEANS_SEED),
        }
    }

    /// Items predicted into the same category share a cluster, numbered in
    /// first-seen order.
    fn category_labels(&self, texts: &[String]) -> Vec<usize> {
        let mut ids: HashMap<Category, usize> = HashMap::new();
        texts
            .iter()
            .map(|text| {
                let category = self.classifier.classify_text(text).category;
                let next = ids.len();
                *ids.entry(category).or_insert(next)
            })
            .collect()
    }
}

/// `n_clusters` when given and positive, else `min(6, max(1, n / 2))`.
pub fn default_cluster_count(items: usize, n_clusters: Option<usize>) -> usize {
    n_clusters
        .filter(|k| *k > 0)
        .unwrap_or_else(|| SMALL_BATCH_LIMIT.min((items / 2).max(1)))
}

fn check_points(points: &[Vec<f64>], k: usize) -> Result<(), ClusterError> {
    if k == 0 {
        return Err(ClusterError::ZeroClusters);
    }
    if k > points.len() {
        return Err(ClusterError::TooManyClusters {
            k,
            items: points.len(),
        });
    }
    if points.iter().flatten().any(|value| !value.is_finite()) {
        return Err(ClusterError::NonFinite);
    }

    let distinct = points
        .iter()
        .map(|point| point.iter().map(|value| value.to_bits()).collect::<Vec<_>>())
        .collect::<HashSet<_>>()
        .len();
    if distinct < k {
        return Err(ClusterError::TooFewDistinctPoints { k, distinct });
    }
    Ok(())
}

/// Relabels clusters in first-seen order and collects member identities.
fn group_members(members: Vec<MemberId>, labels: &[usize]) -> Vec<ClusterAssignment> {
    let mut order: HashMap<usize, usize> = HashMap::new();
    let mut clusters: Vec<Vec<MemberId>> = Vec::new();

    for (member, label) in members.into_iter().zip(labels) {
        let slot = *order.entry(*label).or_insert_with(|| {
            clusters.push(Vec::new());
            clusters.len() - 1
        });
        clusters[slot].push(member);
    }

    clusters
        .into_iter()
        .enumerate()
        .map(|(cluster_id, members)| ClusterAssignment {
            cluster_id,
            members,
        })
        .collect()
}

/// Ward-linkage agglomerative clustering. Merges the closest pair until
/// `k` clusters remain; equal distances merge the lowest index pair first.
fn agglomerative(points: &[Vec<f64>], k: usize) -> Vec<usize> {
    struct Group {
        members: Vec<usize>,
        centroid: Vec<f64>,
    }

    let mut groups = points
        .iter()
        .enumerate()
        .map(|(index, point)| Group {
            members: vec![index],
            centroid: point.clone(),
        })
        .collect::<Vec<_>>();

    while groups.len() > k {
        let mut best = (0, 1, f64::INFINITY);
        for i in 0..groups.len() {
            for j in (i + 1)..groups.len() {
                let (a, b) = (&groups[i], &groups[j]);
                let (na, nb) = (a.members.len() as f64, b.members.len() as f64);
                let cost = (na * nb / (na + nb)) * squared_distance(&a.centroid, &b.centroid);
                if cost < best.2 {
                    best = (i, j, cost);
                }
            }
        }

        let (i, j, _) = best;
        let absorbed = groups.remove(j);
        let target = &mut groups[i];
        let (na, nb) = (target.members.len() as f64, absorbed.members.len() as f64);
        for (value, other) in target.centroid.iter_mut().zip(&absorbed.centroid) {
            *value = (*value * na + other * nb) / (na + nb);
        }
        target.members.extend(absorbed.members);
    }

    let mut labels = vec![0; points.len()];
    for (label, group) in groups.iter().enumerate() {
        for member in &group.members {
            labels[*member] = label;
        }
    }
    labels
}

/// Lloyd's k-means with k-means++ seeding from a fixed seed.
fn kmeans(points: &[Vec<f64>], k: usize, seed: u64) -> Result<Vec<usize>, ClusterError> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut centroids = kmeans_plus_plus(points, k, &mut rng);
    let mut labels = vec![usize::MAX; points.len()];

    for _ in 0..KMEANS_MAX_ITER {
        let mut changed = false;
        for (index, point) in points.iter().enumerate() {
            let nearest = nearest_centroid(point, &centroids);
            if labels[index] != nearest {
                labels[index] = nearest;
                changed = true;
            }
        }

        let dims = points[0].len();
        let mut sums = vec![vec![0.0; dims]; k];
        let mut counts = vec![0usize; k];
        for (point, label) in points.iter().zip(&labels) {
            counts[*label] += 1;
            for (sum, value) in sums[*label].iter_mut().zip(point) {
                *sum += value;
            }
        }

        let mut shift = 0.0;
        for (cluster, (sum, count)) in sums.into_iter().zip(counts).enumerate() {
            // empty clusters keep their previous centroid
            if count == 0 {
                continue;
            }
            let updated = sum.into_iter().map(|v| v / count as f64).collect::<Vec<_>>();
            shift += squared_distance(&updated, &centroids[cluster]);
            centroids[cluster] = updated;
        }

        if !shift.is_finite() || centroids.iter().flatten().any(|v| !v.is_finite()) {
            return Err(ClusterError::NonFinite);
        }
        if !changed || shift <= KMEANS_TOLERANCE {
            break;
        }
    }

    Ok(labels)
}

fn kmeans_plus_plus(points: &[Vec<f64>], k: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
    let mut centroids = vec![points[rng.gen_range(0..points.len())].clone()];

    while centroids.len() < k {
        let weights = points
            .iter()
            .map(|point| {
                centroids
                    .iter()
                    .map(|c| squared_distance(point, c))
                    .fold(f64::INFINITY, f64::min)
            })
            .collect::<Vec<_>>();
        let total = weights.iter().sum::<f64>();

        let target = rng.gen::<f64>() * total;
        let mut cumulative = 0.0;
        let mut chosen = weights
            .iter()
            .rposition(|w| *w > 0.0)
            .unwrap_or(0);
        for (index, weight) in weights.iter().enumerate() {
            cumulative += weight;
            if *weight > 0.0 && cumulative >= target {
                chosen = index;
                break;
            }
        }
        centroids.push(points[chosen].clone());
    }

    centroids
}

fn nearest_centroid(point: &[f64], centroids: &[Vec<f64>]) -> usize {
    let mut best = 0;
    let mut best_distance = f64::INFINITY;
    for (index, centroid) in centroids.iter().enumerate() {
        let distance = squared_distance(point, centroid);
        if distance < best_distance {
            best = index;
            best_distance = distance;
        }
    }
    best
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}
