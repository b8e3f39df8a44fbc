// 🔎 Cluster Discovery - groups inside the unclassified residue
//
// TF-IDF over the normalized "employer name" text, then seeded k-means.
// Summaries are exploratory output for a human reviewer; nothing here feeds
// back into classification.

use crate::config::ClusteringConfig;
use crate::ml::{feature_text, TfidfVectorizer, VectorizerParams};
use crate::normalize::normalize;
use crate::record::ContributionRecord;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

const MAX_ITERATIONS: usize = 300;
const N_INIT: usize = 10;

// ============================================================================
// K-MEANS
// ============================================================================

/// K-means with k-means++ seeding, best of `N_INIT` seeded restarts.
#[derive(Debug, Clone)]
pub struct KMeans {
    pub centroids: Vec<Vec<f64>>,
    pub assignments: Vec<usize>,
    pub inertia: f64,
}

fn distance_sq(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

fn nearest(point: &[f64], centroids: &[Vec<f64>]) -> (usize, f64) {
    let mut best = (0, f64::MAX);
    for (j, centroid) in centroids.iter().enumerate() {
        let d = distance_sq(point, centroid);
        if d < best.1 {
            best = (j, d);
        }
    }
    best
}

fn plus_plus_init(data: &[Vec<f64>], k: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
    let mut centroids = vec![data[rng.random_range(0..data.len())].clone()];

    while centroids.len() < k {
        let weights: Vec<f64> = data.iter().map(|p| nearest(p, &centroids).1).collect();
        let total: f64 = weights.iter().sum();

        let next = if total <= 0.0 {
            // every point already coincides with a centroid
            rng.random_range(0..data.len())
        } else {
            let mut target = rng.random::<f64>() * total;
            let mut chosen = data.len() - 1;
            for (i, w) in weights.iter().enumerate() {
                if target < *w {
                    chosen = i;
                    break;
                }
                target -= w;
            }
            chosen
        };
        centroids.push(data[next].clone());
    }

    centroids
}

fn lloyd(data: &[Vec<f64>], mut centroids: Vec<Vec<f64>>, rng: &mut StdRng) -> KMeans {
    let k = centroids.len();
    let dim = data[0].len();
    let mut assignments = vec![usize::MAX; data.len()];

    for _ in 0..MAX_ITERATIONS {
        let new_assignments: Vec<usize> = data.iter().map(|p| nearest(p, &centroids).0).collect();
        if new_assignments == assignments {
            break;
        }
        assignments = new_assignments;

        let mut sums = vec![vec![0.0; dim]; k];
        let mut counts = vec![0usize; k];
        for (i, &cluster) in assignments.iter().enumerate() {
            for (j, val) in data[i].iter().enumerate() {
                sums[cluster][j] += val;
            }
            counts[cluster] += 1;
        }

        for j in 0..k {
            if counts[j] > 0 {
                for l in 0..dim {
                    centroids[j][l] = sums[j][l] / counts[j] as f64;
                }
            } else {
                // re-seed an empty cluster from a random point
                centroids[j].clone_from(&data[rng.random_range(0..data.len())]);
            }
        }
    }

    let inertia = data
        .iter()
        .zip(&assignments)
        .map(|(p, &c)| distance_sq(p, &centroids[c]))
        .sum();

    KMeans {
        centroids,
        assignments,
        inertia,
    }
}

impl KMeans {
    pub fn fit(data: &[Vec<f64>], k: usize, seed: u64) -> Self {
        if data.is_empty() || k == 0 {
            return Self {
                centroids: vec![],
                assignments: vec![],
                inertia: 0.0,
            };
        }

        let k = k.min(data.len());
        let mut rng = StdRng::seed_from_u64(seed);
        let mut best: Option<KMeans> = None;

        for _ in 0..N_INIT {
            let centroids = plus_plus_init(data, k, &mut rng);
            let run = lloyd(data, centroids, &mut rng);
            if best.as_ref().map_or(true, |b| run.inertia < b.inertia) {
                best = Some(run);
            }
        }

        best.unwrap_or_else(|| lloyd(data, plus_plus_init(data, k, &mut rng), &mut rng))
    }
}

// ============================================================================
// CLUSTER SUMMARY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRecord {
    pub contributor_name: String,
    pub contributor_employer: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub size: usize,
    pub mean_amount: f64,
    /// (normalized employer, count), most frequent first.
    pub top_employers: Vec<(String, usize)>,
    pub top_names: Vec<(String, usize)>,
    pub sample_records: Vec<SampleRecord>,
}

fn top_values(values: impl Iterator<Item = String>, n: usize) -> Vec<(String, usize)> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for v in values {
        *counts.entry(v).or_insert(0) += 1;
    }
    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(n);
    ranked
}

/// Cluster the given records (normally the `Others` subset).
///
/// Returns an empty map below `config.min_records`. Keys are `cluster_<id>`,
/// one per non-empty cluster.
pub fn discover_clusters(
    records: &[&ContributionRecord],
    config: &ClusteringConfig,
    seed: u64,
) -> BTreeMap<String, ClusterSummary> {
    if records.len() < config.min_records.max(1) {
        tracing::info!(records = records.len(), "insufficient unclassified records for clustering");
        return BTreeMap::new();
    }

    let texts: Vec<String> = records
        .iter()
        .map(|r| feature_text(r.employer(), Some(r.name())))
        .collect();
    let vectorizer = TfidfVectorizer::fit(
        &texts,
        VectorizerParams {
            max_features: config.max_features,
            min_df: 1,
            ngram_range: (1, 2),
            stop_words: false,
        },
    );
    let data: Vec<Vec<f64>> = texts.iter().map(|t| vectorizer.transform(t)).collect();

    let k = config.n_clusters.min(records.len());
    let kmeans = KMeans::fit(&data, k, seed);

    let mut members: BTreeMap<usize, Vec<&ContributionRecord>> = BTreeMap::new();
    for (record, &cluster) in records.iter().zip(&kmeans.assignments) {
        members.entry(cluster).or_default().push(*record);
    }

    let summaries: BTreeMap<String, ClusterSummary> = members
        .into_iter()
        .map(|(cluster, group)| {
            let size = group.len();
            let mean_amount = group.iter().map(|r| r.contribution_amount).sum::<f64>() / size as f64;
            let summary = ClusterSummary {
                size,
                mean_amount,
                top_employers: top_values(group.iter().map(|r| normalize(r.employer())), config.top_n),
                top_names: top_values(group.iter().map(|r| normalize(Some(r.name()))), config.top_n),
                sample_records: group
                    .iter()
                    .take(config.sample_size)
                    .map(|r| SampleRecord {
                        contributor_name: r.contributor_name.clone(),
                        contributor_employer: r.contributor_employer.clone(),
                    })
                    .collect(),
            };
            (format!("cluster_{}", cluster), summary)
        })
        .collect();

    tracing::info!(clusters = summaries.len(), inertia = kmeans.inertia, "cluster discovery finished");
    summaries
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn records() -> Vec<ContributionRecord> {
        let mut out = Vec::new();
        for i in 0..8 {
            out.push(ContributionRecord::new(
                &format!("Diner Owner {}", i),
                Some("Blue Plate Diner"),
                100.0,
            ));
            out.push(ContributionRecord::new(
                &format!("Nurse {}", i),
                Some("Abbott Northwestern Hospital"),
                40.0,
            ));
        }
        out
    }

    #[test]
    fn test_kmeans_separates_obvious_groups() {
        let data = vec![
            vec![0.0, 0.0],
            vec![0.1, 0.0],
            vec![0.0, 0.1],
            vec![5.0, 5.0],
            vec![5.1, 5.0],
            vec![5.0, 5.1],
        ];
        let km = KMeans::fit(&data, 2, 42);
        assert_eq!(km.assignments[0], km.assignments[1]);
        assert_eq!(km.assignments[0], km.assignments[2]);
        assert_eq!(km.assignments[3], km.assignments[4]);
        assert_ne!(km.assignments[0], km.assignments[3]);
    }

    #[test]
    fn test_kmeans_k_capped_and_seeded() {
        let data = vec![vec![1.0], vec![2.0], vec![3.0]];
        let a = KMeans::fit(&data, 10, 7);
        let b = KMeans::fit(&data, 10, 7);
        assert_eq!(a.centroids.len(), 3);
        assert_eq!(a.assignments, b.assignments);
    }

    #[test]
    fn test_too_few_records_gives_empty() {
        let all = records();
        let few: Vec<&ContributionRecord> = all.iter().take(9).collect();
        assert!(discover_clusters(&few, &ClusteringConfig::default(), 42).is_empty());
    }

    #[test]
    fn test_discover_clusters_summaries() {
        let all = records();
        let refs: Vec<&ContributionRecord> = all.iter().collect();
        let config = ClusteringConfig {
            n_clusters: 2,
            ..ClusteringConfig::default()
        };

        let clusters = discover_clusters(&refs, &config, 42);
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters.values().map(|c| c.size).sum::<usize>(), 16);

        for summary in clusters.values() {
            assert_eq!(summary.size, 8);
            assert!(summary.sample_records.len() <= 3);
            assert!(summary.top_names.len() <= 5);
            assert_eq!(summary.top_employers.len(), 1);
        }
        assert!(clusters.contains_key("cluster_0"));
    }
}
