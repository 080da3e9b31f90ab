//! Nearest-neighbour index over job embeddings
//!
//! Small corpora get an exact flat scan. Corpora above the configured
//! threshold get an inverted-file index: k-means centroids partition the
//! vectors into lists and a query only scans the lists closest to it.
//! Distances are squared Euclidean, the value flat L2 indexes report, and
//! are mapped to `similarity = 1 / (1 + distance)`.

use crate::config::RankingConfig;
use crate::error::{KeenEyeError, Result};
use crate::processing::document::JobPosting;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

const KMEANS_ITERATIONS: usize = 10;

#[derive(Debug, Clone)]
pub struct IndexOptions {
    /// Corpora larger than this use the approximate index
    pub exact_threshold: usize,
    pub max_lists: usize,
    pub nprobe: usize,
}

impl IndexOptions {
    pub fn from_config(config: &RankingConfig) -> Self {
        Self {
            exact_threshold: config.exact_index_threshold,
            max_lists: config.ivf_max_lists.max(1),
            nprobe: config.ivf_nprobe.max(1),
        }
    }
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            exact_threshold: 1000,
            max_lists: 100,
            nprobe: 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum IndexMode {
    Exact,
    Approximate { lists: usize, nprobe: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Position of the job in the indexed corpus
    pub position: usize,
    pub distance: f32,
    pub similarity: f32,
}

#[derive(Debug)]
struct InvertedLists {
    centroids: Vec<Vec<f32>>,
    lists: Vec<Vec<usize>>,
    nprobe: usize,
}

#[derive(Debug)]
struct BuiltIndex {
    dimension: usize,
    vectors: Vec<Vec<f32>>,
    ivf: Option<InvertedLists>,
}

#[derive(Debug)]
pub struct VectorIndex {
    options: IndexOptions,
    built: Option<BuiltIndex>,
}

impl VectorIndex {
    pub fn new(options: IndexOptions) -> Self {
        Self { options, built: None }
    }

    /// Replace the index contents with `embeddings`, one per job, same order.
    /// On error the previous contents are kept.
    pub fn build(&mut self, jobs: &[JobPosting], embeddings: Vec<Vec<f32>>) -> Result<()> {
        if embeddings.is_empty() {
            return Err(KeenEyeError::Configuration(
                "cannot build an index from an empty embedding set".to_string(),
            ));
        }
        if jobs.len() != embeddings.len() {
            return Err(KeenEyeError::Configuration(format!(
                "{} jobs but {} embeddings",
                jobs.len(),
                embeddings.len()
            )));
        }

        let dimension = embeddings[0].len();
        if dimension == 0 {
            return Err(KeenEyeError::Configuration(
                "embeddings have zero dimension".to_string(),
            ));
        }
        if let Some((position, bad)) = embeddings.iter().enumerate().find(|(_, v)| v.len() != dimension) {
            return Err(KeenEyeError::Configuration(format!(
                "embedding {} has dimension {}, expected {}",
                position,
                bad.len(),
                dimension
            )));
        }

        let ivf = if embeddings.len() > self.options.exact_threshold {
            let lists = (embeddings.len() / 10).clamp(1, self.options.max_lists);
            Some(train_inverted_lists(&embeddings, lists, self.options.nprobe))
        } else {
            None
        };

        let built = BuiltIndex {
            dimension,
            vectors: embeddings,
            ivf,
        };
        info!(
            "Vector index built: {} vectors, dimension {}, {:?}",
            built.vectors.len(),
            dimension,
            built.mode()
        );
        self.built = Some(built);
        Ok(())
    }

    /// The `k` nearest vectors to `query`, nearest first; ties keep corpus order
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        let built = self.built.as_ref().ok_or(KeenEyeError::IndexNotBuilt)?;
        if query.len() != built.dimension {
            return Err(KeenEyeError::DimensionMismatch {
                expected: built.dimension,
                actual: query.len(),
            });
        }

        let k = k.min(built.vectors.len());
        if k == 0 {
            return Ok(Vec::new());
        }

        let candidates: Vec<usize> = match &built.ivf {
            Some(ivf) => ivf.candidates(query, k),
            None => (0..built.vectors.len()).collect(),
        };
        debug!("Scanning {} of {} vectors", candidates.len(), built.vectors.len());

        let mut scored: Vec<(usize, f32)> = candidates
            .into_iter()
            .map(|position| (position, squared_l2(query, &built.vectors[position])))
            .collect();
        scored.sort_by(|a, b| compare_distance(a.1, b.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(position, distance)| SearchHit {
                position,
                distance,
                similarity: distance_to_similarity(distance),
            })
            .collect())
    }

    pub fn is_built(&self) -> bool {
        self.built.is_some()
    }

    pub fn len(&self) -> usize {
        self.built.as_ref().map_or(0, |b| b.vectors.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dimension(&self) -> Option<usize> {
        self.built.as_ref().map(|b| b.dimension)
    }

    pub fn mode(&self) -> Option<IndexMode> {
        self.built.as_ref().map(BuiltIndex::mode)
    }
}

impl BuiltIndex {
    fn mode(&self) -> IndexMode {
        match &self.ivf {
            Some(ivf) => IndexMode::Approximate {
                lists: ivf.centroids.len(),
                nprobe: ivf.nprobe,
            },
            None => IndexMode::Exact,
        }
    }
}

impl InvertedLists {
    /// Positions from the nearest lists; keeps probing past `nprobe` until at
    /// least `k` candidates are collected or every list is used
    fn candidates(&self, query: &[f32], k: usize) -> Vec<usize> {
        let mut order: Vec<(usize, f32)> = self
            .centroids
            .iter()
            .enumerate()
            .map(|(i, c)| (i, squared_l2(query, c)))
            .collect();
        order.sort_by(|a, b| compare_distance(a.1, b.1).then(a.0.cmp(&b.0)));

        let mut candidates = Vec::new();
        for (probed, (list, _)) in order.into_iter().enumerate() {
            if probed >= self.nprobe && candidates.len() >= k {
                break;
            }
            candidates.extend_from_slice(&self.lists[list]);
        }
        candidates
    }
}

/// Lloyd's k-means with evenly spaced deterministic seeds
fn train_inverted_lists(vectors: &[Vec<f32>], lists: usize, nprobe: usize) -> InvertedLists {
    let n = vectors.len();
    let mut centroids: Vec<Vec<f32>> = (0..lists).map(|c| vectors[c * n / lists].clone()).collect();
    let mut assignment = vec![0usize; n];

    for iteration in 0..KMEANS_ITERATIONS {
        let mut changed = 0usize;
        for (position, vector) in vectors.iter().enumerate() {
            let nearest = nearest_centroid(vector, &centroids);
            if nearest != assignment[position] || iteration == 0 {
                changed += 1;
            }
            assignment[position] = nearest;
        }

        let dimension = vectors[0].len();
        let mut sums = vec![vec![0.0f32; dimension]; lists];
        let mut counts = vec![0usize; lists];
        for (vector, &cluster) in vectors.iter().zip(&assignment) {
            counts[cluster] += 1;
            for (sum, value) in sums[cluster].iter_mut().zip(vector) {
                *sum += value;
            }
        }
        for (cluster, sum) in sums.into_iter().enumerate() {
            // empty clusters keep their previous centroid
            if counts[cluster] > 0 {
                let count = counts[cluster] as f32;
                centroids[cluster] = sum.into_iter().map(|s| s / count).collect();
            }
        }

        if changed == 0 {
            break;
        }
    }

    let mut inverted = vec![Vec::new(); lists];
    for (position, vector) in vectors.iter().enumerate() {
        inverted[nearest_centroid(vector, &centroids)].push(position);
    }

    InvertedLists {
        centroids,
        lists: inverted,
        nprobe: nprobe.min(lists),
    }
}

fn nearest_centroid(vector: &[f32], centroids: &[Vec<f32>]) -> usize {
    let mut best = 0;
    let mut best_distance = f32::INFINITY;
    for (i, centroid) in centroids.iter().enumerate() {
        let distance = squared_l2(vector, centroid);
        if distance < best_distance {
            best = i;
            best_distance = distance;
        }
    }
    best
}

pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

pub fn distance_to_similarity(distance: f32) -> f32 {
    1.0 / (1.0 + distance.max(0.0))
}

fn compare_distance(a: f32, b: f32) -> Ordering {
    a.total_cmp(&b)
}
