//! Invocation clustering.
//!
//! A tuned loop can be invoked millions of times per run; measuring every
//! invocation of every candidate would dwarf the search itself. Timings are
//! grouped by similarity with a density-based clustering pass and each
//! cluster is reduced to one representative invocation plus a weight, so
//! the representative's measured time scaled by its weight approximates the
//! cluster's total contribution.

mod dbscan;

pub use dbscan::Dbscan;

use anyhow::{Context, Result};
use rand::Rng;
use serde::Serialize;

/// Cap on how many samples the clustering pass will look at.
pub const MAX_SAMPLES: usize = 10_000;

/// Neighborhood radius over z-score-normalized timings.
const EPSILON: f64 = 0.3;

/// One invocation chosen to stand in for a cluster of similar timings.
#[derive(Debug, Clone, Serialize)]
pub struct Representative {
    /// Invocation number in the original sample sequence.
    pub invocation: usize,
    /// How many original invocations' worth of time this one stands for:
    /// sum of the cluster's timings divided by the representative's own.
    pub weight: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RepresentativeSet {
    pub members: Vec<Representative>,
}

impl RepresentativeSet {
    pub fn invocations(&self) -> Vec<u64> {
        self.members.iter().map(|r| r.invocation as u64).collect()
    }
}

/// Parse the instrumented run's timing dump: whitespace-separated elapsed
/// times, one per invocation, in invocation order.
pub fn parse_invocation_samples(text: &str) -> Result<Vec<f64>> {
    text.split_whitespace()
        .map(|cell| {
            cell.parse::<f64>()
                .with_context(|| format!("bad invocation sample {cell:?}"))
        })
        .collect()
}

/// Cluster per-invocation timings and pick weighted representatives.
///
/// Sample sets beyond [`MAX_SAMPLES`] are randomly subsampled first to
/// bound clustering cost. Samples that fall in no dense cluster are left
/// unrepresented.
pub fn cluster_invocations(samples: &[f64], rng: &mut impl Rng) -> RepresentativeSet {
    let (invocations, values): (Vec<usize>, Vec<f64>) = if samples.len() > MAX_SAMPLES {
        let chosen = rand::seq::index::sample(rng, samples.len(), MAX_SAMPLES);
        chosen.iter().map(|i| (i, samples[i])).unzip()
    } else {
        samples.iter().copied().enumerate().unzip()
    };

    if values.is_empty() {
        return RepresentativeSet::default();
    }

    let min_samples = (values.len() / 1000).max(1);
    let labels = Dbscan::new(EPSILON, min_samples).run(&zscore(&values));

    let cluster_count = labels.iter().flatten().max().map_or(0, |c| c + 1);
    let mut members = Vec::with_capacity(cluster_count);
    for cluster in 0..cluster_count {
        let cluster_values: Vec<f64> = labels
            .iter()
            .zip(&values)
            .filter(|(label, _)| **label == Some(cluster))
            .map(|(_, v)| *v)
            .collect();
        let total: f64 = cluster_values.iter().sum();
        let mean = total / cluster_values.len() as f64;

        // member closest to the cluster mean
        let (offset, rep_value) = cluster_values
            .iter()
            .copied()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                (a - mean).abs().partial_cmp(&(b - mean).abs()).unwrap()
            })
            .unwrap();
        let invocation = labels
            .iter()
            .enumerate()
            .filter(|(_, label)| **label == Some(cluster))
            .map(|(i, _)| invocations[i])
            .nth(offset)
            .unwrap();

        let weight = if rep_value > 0.0 {
            total / rep_value
        } else {
            // zero-cost representative makes the ratio meaningless
            cluster_values.len() as f64
        };
        members.push(Representative { invocation, weight });
    }

    tracing::debug!(
        samples = values.len(),
        clusters = members.len(),
        "clustered invocation timings"
    );
    RepresentativeSet { members }
}

/// Normalize to zero mean and unit variance; all-equal inputs map to zeros.
fn zscore(values: &[f64]) -> Vec<f64> {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std = variance.sqrt();
    if std == 0.0 {
        return vec![0.0; values.len()];
    }
    values.iter().map(|v| (v - mean) / std).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn test_uniform_samples_collapse_to_one_representative() {
        let samples = vec![4.2; 250];
        let set = cluster_invocations(&samples, &mut rng());
        assert_eq!(set.members.len(), 1);
        assert!((set.members[0].weight - 250.0).abs() < 1e-9);
    }

    #[test]
    fn test_singleton_cluster_has_weight_one() {
        // two tight groups, far apart; each collapses to one representative
        let mut samples = vec![1.0];
        samples.extend(vec![100.0; 50]);
        let set = cluster_invocations(&samples, &mut rng());
        for rep in &set.members {
            if rep.invocation == 0 {
                assert!((rep.weight - 1.0).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_two_distinct_groups_yield_two_clusters() {
        let mut samples = vec![1.0; 100];
        samples.extend(vec![50.0; 100]);
        let set = cluster_invocations(&samples, &mut rng());
        assert_eq!(set.members.len(), 2);
        let total_weight: f64 = set.members.iter().map(|r| r.weight).sum();
        assert!((total_weight - 200.0).abs() < 1e-6);
    }

    #[test]
    fn test_oversized_input_is_subsampled() {
        let samples = vec![2.0; MAX_SAMPLES * 3];
        let set = cluster_invocations(&samples, &mut rng());
        assert_eq!(set.members.len(), 1);
        assert!((set.members[0].weight - MAX_SAMPLES as f64).abs() < 1e-6);
    }

    #[test]
    fn test_empty_input() {
        let set = cluster_invocations(&[], &mut rng());
        assert!(set.members.is_empty());
    }

    #[test]
    fn test_parse_invocation_samples() {
        let parsed = parse_invocation_samples("0.5 1.25\n3.0\t4").unwrap();
        assert_eq!(parsed, vec![0.5, 1.25, 3.0, 4.0]);
        assert!(parse_invocation_samples("1.0 oops").is_err());
    }
}
