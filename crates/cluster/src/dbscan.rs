//! Density-based clustering over one-dimensional samples.
//!
//! Timings are scalar, so a point's epsilon-neighborhood is a contiguous
//! range once the samples are sorted; region queries are two binary
//! searches instead of a distance matrix.

use std::collections::VecDeque;

pub struct Dbscan {
    eps: f64,
    min_samples: usize,
}

impl Dbscan {
    pub fn new(eps: f64, min_samples: usize) -> Self {
        Self { eps, min_samples }
    }

    /// Label every sample with its cluster, or `None` for noise.
    ///
    /// A point is a core point when at least `min_samples` samples
    /// (itself included) lie within `eps`; clusters grow outward from core
    /// points, and border points join the first cluster that reaches them.
    pub fn run(&self, values: &[f64]) -> Vec<Option<usize>> {
        let mut order: Vec<usize> = (0..values.len()).collect();
        order.sort_by(|&a, &b| values[a].partial_cmp(&values[b]).unwrap());
        let sorted: Vec<f64> = order.iter().map(|&i| values[i]).collect();

        let neighbors = |k: usize| -> (usize, usize) {
            let v = sorted[k];
            let lo = sorted.partition_point(|x| *x < v - self.eps);
            let hi = sorted.partition_point(|x| *x <= v + self.eps);
            (lo, hi)
        };

        let mut labels: Vec<Option<usize>> = vec![None; values.len()];
        let mut visited = vec![false; values.len()];
        let mut next_cluster = 0;

        for k in 0..sorted.len() {
            if visited[k] {
                continue;
            }
            visited[k] = true;

            let (lo, hi) = neighbors(k);
            if hi - lo < self.min_samples {
                // noise for now; a later core point may still claim it
                continue;
            }

            let cluster = next_cluster;
            next_cluster += 1;
            labels[order[k]] = Some(cluster);

            let mut seeds: VecDeque<usize> = (lo..hi).collect();
            while let Some(q) = seeds.pop_front() {
                if labels[order[q]].is_none() {
                    labels[order[q]] = Some(cluster);
                }
                if visited[q] {
                    continue;
                }
                visited[q] = true;
                let (qlo, qhi) = neighbors(q);
                if qhi - qlo >= self.min_samples {
                    seeds.extend(qlo..qhi);
                }
            }
        }

        labels
    }
}
