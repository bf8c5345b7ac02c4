//! Density-based clustering over unit-length embedding vectors.
//!
//! Distance is cosine distance (`1 - a·b`). Points are visited in input order,
//! so identical input always yields identical labels. Noise points are not
//! discarded: each becomes its own singleton cluster.

use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DbscanParams {
    /// Neighbourhood radius in cosine distance.
    pub eps: f32,
    /// Neighbours (the point itself included) needed to seed a cluster.
    pub min_samples: usize,
}

impl Default for DbscanParams {
    fn default() -> Self {
        Self {
            eps: 0.15,
            min_samples: 2,
        }
    }
}

/// Returns a cluster id per point. Ids are dense and numbered in order of
/// first appearance.
pub fn dbscan(points: &[Vec<f32>], params: DbscanParams) -> Vec<usize> {
    let n = points.len();
    let neighbours: Vec<Vec<usize>> = (0..n)
        .map(|i| {
            (0..n)
                .filter(|&j| cosine_distance(&points[i], &points[j]) <= params.eps)
                .collect()
        })
        .collect();

    let mut labels: Vec<Option<usize>> = vec![None; n];
    let mut visited = vec![false; n];
    let mut next_cluster = 0;

    for i in 0..n {
        if visited[i] {
            continue;
        }
        visited[i] = true;
        if neighbours[i].len() < params.min_samples {
            continue;
        }

        let cluster = next_cluster;
        next_cluster += 1;
        labels[i] = Some(cluster);

        let mut queue: VecDeque<usize> = neighbours[i].iter().copied().collect();
        while let Some(j) = queue.pop_front() {
            if labels[j].is_none() {
                labels[j] = Some(cluster);
            }
            if visited[j] {
                continue;
            }
            visited[j] = true;
            if neighbours[j].len() >= params.min_samples {
                queue.extend(neighbours[j].iter().copied());
            }
        }
    }

    // Renumber so singleton noise ids interleave in input order.
    let mut remap: Vec<Option<usize>> = vec![None; next_cluster];
    let mut dense = 0;
    labels
        .into_iter()
        .map(|label| match label {
            Some(c) => *remap[c].get_or_insert_with(|| {
                dense += 1;
                dense - 1
            }),
            None => {
                dense += 1;
                dense - 1
            }
        })
        .collect()
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - crate::embedding::cosine_similarity(a, b)
}
