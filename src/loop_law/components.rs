//! Connected components of the cycle-basis support.
//!
//! Reactions and cycles form a bipartite graph with an edge wherever the basis
//! entry is nonzero. Two reactions end up in the same component iff they are
//! connected through shared cycles, so no cycle ever spans two components.

use petgraph::prelude::*;
use petgraph::visit::Bfs;
use sprs::CsMat;

/// Component label per basis row.
///
/// Labels start at 1 and are handed out in order of the lowest reaction index of
/// each component. Reactions with an all-zero row get 0.
pub fn find_components(basis: &CsMat<f64>) -> Vec<usize> {
    let (n, k) = basis.shape();

    let mut graph: UnGraph<(), ()> = Graph::with_capacity(n + k, basis.nnz());
    let nodes: Vec<NodeIndex> = (0..n + k).map(|_| graph.add_node(())).collect();
    for (&v, (r, c)) in basis.iter() {
        if v != 0.0 {
            graph.add_edge(nodes[r], nodes[n + c], ());
        }
    }

    let mut labels = vec![0; n];
    let mut next = 0;
    for r in 0..n {
        if labels[r] != 0 || graph.neighbors(nodes[r]).next().is_none() {
            continue;
        }

        next += 1;
        let mut bfs = Bfs::new(&graph, nodes[r]);
        while let Some(node) = bfs.next(&graph) {
            // cycle nodes sit behind the reactions
            if node.index() < n {
                labels[node.index()] = next;
            }
        }
    }

    labels
}
