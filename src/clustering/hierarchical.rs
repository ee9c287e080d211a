//! Agglomerative hierarchical clustering
//!
//! Standard O(n³) agglomeration with Lance–Williams distance updates. Inputs
//! here are tiny (one row per position) so no effort goes into the faster
//! nearest-neighbour-chain variants.

use crate::error::{AnalysisError, Result};
use clap::ValueEnum;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Between-cluster distance rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
pub enum Linkage {
    /// Minimum pairwise distance
    Single,
    /// Maximum pairwise distance
    Complete,
    /// Size-weighted mean pairwise distance (UPGMA)
    Average,
    /// Ward's minimum-variance criterion on Euclidean distances
    Ward,
}

impl Default for Linkage {
    fn default() -> Self {
        Linkage::Complete
    }
}

/// One agglomeration step.
///
/// Leaves have ids `0..n`; the cluster created by merge `i` gets id `n + i`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Merge {
    pub left: usize,
    pub right: usize,
    pub height: f64,
    /// Leaves under the new cluster
    pub size: usize,
}

/// Full merge history over labelled leaves
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dendrogram {
    pub labels: Vec<String>,
    pub linkage: Linkage,
    pub merges: Vec<Merge>,
}

impl Dendrogram {
    pub fn n_leaves(&self) -> usize {
        self.labels.len()
    }

    /// Leaf order for drawing: depth-first from the root, left before right
    pub fn order(&self) -> Vec<usize> {
        let n = self.n_leaves();
        if n == 0 {
            return Vec::new();
        }
        if self.merges.is_empty() {
            return (0..n).collect();
        }
        let mut order = Vec::with_capacity(n);
        let mut stack = vec![n + self.merges.len() - 1];
        while let Some(id) = stack.pop() {
            if id < n {
                order.push(id);
            } else {
                let m = &self.merges[id - n];
                stack.push(m.right);
                stack.push(m.left);
            }
        }
        order
    }

    /// Assign every leaf to one of `k` clusters by undoing the last `k - 1`
    /// merges. Cluster ids follow first appearance in leaf index order.
    pub fn cut(&self, k: usize) -> Result<Vec<usize>> {
        let n = self.n_leaves();
        if k == 0 || k > n {
            return Err(AnalysisError::InvalidParameter {
                name: "k".to_string(),
                value: k.to_string(),
                reason: format!("must be between 1 and {}", n),
            });
        }

        // Union-find over leaves, replaying the first n - k merges
        let mut parent: Vec<usize> = (0..n).collect();
        fn find(parent: &mut [usize], mut x: usize) -> usize {
            while parent[x] != x {
                parent[x] = parent[parent[x]];
                x = parent[x];
            }
            x
        }

        let mut representative: Vec<usize> = Vec::with_capacity(n);
        for m in self.merges.iter().take(n - k) {
            let a = if m.left < n { m.left } else { representative[m.left - n] };
            let b = if m.right < n { m.right } else { representative[m.right - n] };
            let ra = find(&mut parent, a);
            let rb = find(&mut parent, b);
            parent[rb] = ra;
            representative.push(ra);
        }

        let mut ids: Vec<Option<usize>> = vec![None; n];
        let mut next = 0;
        let mut out = Vec::with_capacity(n);
        for leaf in 0..n {
            let root = find(&mut parent, leaf);
            let id = *ids[root].get_or_insert_with(|| {
                next += 1;
                next - 1
            });
            out.push(id);
        }
        Ok(out)
    }
}

/// Pairwise Euclidean distances between rows
pub fn euclidean_distances(x: &Array2<f64>) -> Array2<f64> {
    let n = x.nrows();
    let mut d = Array2::zeros((n, n));
    for i in 0..n {
        for j in (i + 1)..n {
            let dist = x
                .row(i)
                .iter()
                .zip(x.row(j).iter())
                .map(|(a, b)| (a - b).powi(2))
                .sum::<f64>()
                .sqrt();
            d[[i, j]] = dist;
            d[[j, i]] = dist;
        }
    }
    d
}

/// Agglomerative clustering over a precomputed distance matrix
#[derive(Debug, Clone, Default)]
pub struct AgglomerativeClustering {
    pub linkage: Linkage,
}

impl AgglomerativeClustering {
    pub fn new(linkage: Linkage) -> Self {
        Self { linkage }
    }

    /// Merge until one cluster remains. Among equal distances the pair with
    /// the lowest (i, j) in row-major scan order merges first.
    pub fn fit(&self, distances: &Array2<f64>, labels: Vec<String>) -> Result<Dendrogram> {
        let n = distances.nrows();
        if distances.ncols() != n {
            return Err(AnalysisError::ShapeError {
                expected: format!("square matrix {}x{}", n, n),
                actual: format!("{}x{}", n, distances.ncols()),
            });
        }
        if labels.len() != n {
            return Err(AnalysisError::ShapeError {
                expected: format!("{} labels", n),
                actual: format!("{} labels", labels.len()),
            });
        }
        if distances.iter().any(|v| !v.is_finite()) {
            return Err(AnalysisError::ComputationError("non-finite distance".to_string()));
        }

        // Ward works on squared distances internally
        let ward = self.linkage == Linkage::Ward;
        let mut d = if ward { distances.mapv(|v| v * v) } else { distances.clone() };

        let mut active: Vec<bool> = vec![true; n];
        let mut cluster_id: Vec<usize> = (0..n).collect();
        let mut size: Vec<usize> = vec![1; n];
        let mut merges = Vec::with_capacity(n.saturating_sub(1));

        for step in 0..n.saturating_sub(1) {
            let mut best: Option<(usize, usize, f64)> = None;
            for i in 0..n {
                if !active[i] {
                    continue;
                }
                for j in (i + 1)..n {
                    if !active[j] {
                        continue;
                    }
                    if best.map_or(true, |(_, _, b)| d[[i, j]] < b) {
                        best = Some((i, j, d[[i, j]]));
                    }
                }
            }
            let (i, j, dij) = best
                .ok_or_else(|| AnalysisError::ComputationError("no active cluster pair".to_string()))?;

            let (ni, nj) = (size[i] as f64, size[j] as f64);
            for k in 0..n {
                if !active[k] || k == i || k == j {
                    continue;
                }
                let (dik, djk) = (d[[i, k]], d[[j, k]]);
                let updated = match self.linkage {
                    Linkage::Single => dik.min(djk),
                    Linkage::Complete => dik.max(djk),
                    Linkage::Average => (ni * dik + nj * djk) / (ni + nj),
                    Linkage::Ward => {
                        let nk = size[k] as f64;
                        ((ni + nk) * dik + (nj + nk) * djk - nk * dij) / (ni + nj + nk)
                    }
                };
                d[[i, k]] = updated;
                d[[k, i]] = updated;
            }

            let (a, b) = (cluster_id[i].min(cluster_id[j]), cluster_id[i].max(cluster_id[j]));
            size[i] += size[j];
            merges.push(Merge {
                left: a,
                right: b,
                height: if ward { dij.max(0.0).sqrt() } else { dij },
                size: size[i],
            });
            cluster_id[i] = n + step;
            active[j] = false;
        }

        Ok(Dendrogram {
            labels,
            linkage: self.linkage,
            merges,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn labels(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("p{}", i)).collect()
    }

    fn line_points() -> Array2<f64> {
        // Leaves at 0, 1, 5, 6, 20 on a line
        array![[0.0], [1.0], [5.0], [6.0], [20.0]]
    }

    #[test]
    fn test_complete_linkage_heights() {
        let d = euclidean_distances(&line_points());
        let dendro = AgglomerativeClustering::new(Linkage::Complete).fit(&d, labels(5)).unwrap();
        assert_eq!(dendro.merges.len(), 4);
        assert_eq!((dendro.merges[0].left, dendro.merges[0].right), (0, 1));
        assert_eq!((dendro.merges[1].left, dendro.merges[1].right), (2, 3));
        assert!((dendro.merges[2].height - 6.0).abs() < 1e-12);
        assert!((dendro.merges[3].height - 20.0).abs() < 1e-12);
        assert_eq!(dendro.merges[3].size, 5);
    }

    #[test]
    fn test_single_and_average_differ() {
        let d = euclidean_distances(&line_points());
        let single = AgglomerativeClustering::new(Linkage::Single).fit(&d, labels(5)).unwrap();
        let average = AgglomerativeClustering::new(Linkage::Average).fit(&d, labels(5)).unwrap();
        assert!((single.merges[2].height - 4.0).abs() < 1e-12);
        assert!((average.merges[2].height - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_heights_monotone() {
        let x = array![[0.0, 1.0], [2.0, 3.5], [1.0, 0.2], [7.0, 7.0], [6.5, 8.0], [3.0, 3.0]];
        let d = euclidean_distances(&x);
        for linkage in [Linkage::Single, Linkage::Complete, Linkage::Average, Linkage::Ward] {
            let dendro = AgglomerativeClustering::new(linkage).fit(&d, labels(6)).unwrap();
            for w in dendro.merges.windows(2) {
                assert!(w[1].height >= w[0].height - 1e-12, "{:?}", linkage);
            }
        }
    }

    #[test]
    fn test_cut_and_order() {
        let d = euclidean_distances(&line_points());
        let dendro = AgglomerativeClustering::new(Linkage::Complete).fit(&d, labels(5)).unwrap();
        assert_eq!(dendro.cut(2).unwrap(), vec![0, 0, 0, 0, 1]);
        assert_eq!(dendro.cut(3).unwrap(), vec![0, 0, 1, 1, 2]);
        assert_eq!(dendro.cut(5).unwrap(), vec![0, 1, 2, 3, 4]);
        let mut order = dendro.order();
        assert_eq!(order.len(), 5);
        order.sort_unstable();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
    }
}
