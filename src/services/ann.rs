//! Approximate nearest-neighbor index over unit vectors
//!
//! A forest of random-projection trees with angular distance. Each tree splits
//! the item set by the hyperplane equidistant from two randomly chosen items
//! until leaves hold at most `leaf_size` items. A query walks every tree at
//! once through a priority queue ordered by the smallest margin seen on the
//! path, collects `search_k` candidates, then ranks them by exact distance.
//!
//! Construction is seeded, so the same items and parameters always produce the
//! same forest and the same answers.

use rand::{rngs::StdRng, Rng, SeedableRng};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::error::{AppError, AppResult};

/// Attempts at finding a hyperplane that separates a node's items
const SPLIT_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexParams {
    pub n_trees: usize,
    pub leaf_size: usize,
    pub seed: u64,
}

impl Default for IndexParams {
    fn default() -> Self {
        Self {
            n_trees: 10,
            leaf_size: 16,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf(Vec<usize>),
    Split {
        normal: Vec<f32>,
        offset: f32,
        left: usize,
        right: usize,
    },
}

/// One ranked hit
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub id: String,
    /// Cosine distance, `1 - cos(query, item)`
    pub distance: f32,
}

pub(crate) fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Scales to unit length in place; the zero vector is left untouched
pub(crate) fn normalize(v: &mut [f32]) {
    let norm = dot(v, v).sqrt();
    if norm > f32::EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

struct QueueEntry {
    margin: f32,
    node: usize,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.margin
            .total_cmp(&other.margin)
            .then_with(|| other.node.cmp(&self.node))
    }
}

pub struct AnnIndex {
    dimension: usize,
    n_trees: usize,
    ids: Vec<String>,
    vectors: Vec<Vec<f32>>,
    nodes: Vec<Node>,
    roots: Vec<usize>,
}

impl AnnIndex {
    /// Builds the forest. Every vector must have `dimension` components.
    pub fn build(
        dimension: usize,
        items: Vec<(String, Vec<f32>)>,
        params: IndexParams,
    ) -> AppResult<Self> {
        if dimension == 0 {
            return Err(AppError::ModelLoad("Index dimension must be positive".to_string()));
        }

        let mut ids = Vec::with_capacity(items.len());
        let mut vectors = Vec::with_capacity(items.len());
        for (id, mut vector) in items {
            if vector.len() != dimension {
                return Err(AppError::ModelLoad(format!(
                    "Item {} has dimension {}, expected {}",
                    id,
                    vector.len(),
                    dimension
                )));
            }
            normalize(&mut vector);
            ids.push(id);
            vectors.push(vector);
        }

        let mut index = Self {
            dimension,
            n_trees: params.n_trees.max(1),
            ids,
            vectors,
            nodes: Vec::new(),
            roots: Vec::new(),
        };

        if !index.vectors.is_empty() {
            let mut rng = StdRng::seed_from_u64(params.seed);
            for _ in 0..index.n_trees {
                let all: Vec<usize> = (0..index.vectors.len()).collect();
                let root = index.build_node(all, params.leaf_size.max(1), &mut rng);
                index.roots.push(root);
            }
        }

        Ok(index)
    }

    fn build_node(&mut self, items: Vec<usize>, leaf_size: usize, rng: &mut StdRng) -> usize {
        if items.len() <= leaf_size {
            return self.push(Node::Leaf(items));
        }

        for _ in 0..SPLIT_ATTEMPTS {
            let a = items[rng.gen_range(0..items.len())];
            let b = items[rng.gen_range(0..items.len())];
            if a == b {
                continue;
            }

            let mut normal: Vec<f32> = self.vectors[a]
                .iter()
                .zip(&self.vectors[b])
                .map(|(x, y)| x - y)
                .collect();
            if dot(&normal, &normal) <= f32::EPSILON {
                continue;
            }
            normalize(&mut normal);

            let midpoint: Vec<f32> = self.vectors[a]
                .iter()
                .zip(&self.vectors[b])
                .map(|(x, y)| (x + y) / 2.0)
                .collect();
            let offset = dot(&normal, &midpoint);

            let (right, left): (Vec<usize>, Vec<usize>) = items
                .iter()
                .partition(|&&i| dot(&normal, &self.vectors[i]) - offset > 0.0);
            if left.is_empty() || right.is_empty() {
                continue;
            }

            let left = self.build_node(left, leaf_size, rng);
            let right = self.build_node(right, leaf_size, rng);
            return self.push(Node::Split {
                normal,
                offset,
                left,
                right,
            });
        }

        // Items that no hyperplane separates (duplicates) share one oversized leaf
        self.push(Node::Leaf(items))
    }

    fn push(&mut self, node: Node) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Returns up to `k` items closest to `query`, nearest first
    ///
    /// `search_k` bounds how many candidates are scored exactly; it defaults to
    /// `k * n_trees`. Ties are broken by insertion order.
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        search_k: Option<usize>,
    ) -> AppResult<Vec<Neighbor>> {
        if query.len() != self.dimension {
            return Err(AppError::Internal(format!(
                "Query has dimension {}, index expects {}",
                query.len(),
                self.dimension
            )));
        }
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let mut q = query.to_vec();
        normalize(&mut q);

        let budget = search_k.unwrap_or(k * self.n_trees).max(k);
        let mut seen = vec![false; self.ids.len()];
        let mut candidates = Vec::with_capacity(budget);
        let mut queue: BinaryHeap<QueueEntry> = self
            .roots
            .iter()
            .map(|&node| QueueEntry {
                margin: f32::INFINITY,
                node,
            })
            .collect();

        while candidates.len() < budget {
            let Some(entry) = queue.pop() else { break };
            match &self.nodes[entry.node] {
                Node::Leaf(items) => {
                    for &i in items {
                        if !seen[i] {
                            seen[i] = true;
                            candidates.push(i);
                        }
                    }
                }
                Node::Split {
                    normal,
                    offset,
                    left,
                    right,
                } => {
                    let margin = dot(normal, &q) - offset;
                    queue.push(QueueEntry {
                        margin: entry.margin.min(margin),
                        node: *right,
                    });
                    queue.push(QueueEntry {
                        margin: entry.margin.min(-margin),
                        node: *left,
                    });
                }
            }
        }

        let mut scored: Vec<(f32, usize)> = candidates
            .into_iter()
            .map(|i| (1.0 - dot(&q, &self.vectors[i]), i))
            .collect();
        scored.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(distance, i)| Neighbor {
                id: self.ids[i].clone(),
                distance,
            })
            .collect())
    }
}
