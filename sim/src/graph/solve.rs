//! Longest path over the finished graph.
//!
//! An edge `u -> v` with latency `l` constrains `start(v) >= start(u) +
//! occupancy(u) + l`. The block's execution time is the largest node finish
//! time. Nodes are relaxed in BFS topological order; the graph is built
//! append-only from forward passes, so a cycle means a broken rule set and
//! is reported as an error rather than looping.

use std::collections::VecDeque;

use anyhow::{ensure, Result};

use super::ExeGraph;

/// Result of timing one basic block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockTime {
    pub cycles: u64,
    pub nodes: usize,
    pub edges: usize,
}

impl ExeGraph<'_> {
    /// Compute the block's worst-case cycle count.
    pub fn solve(&self) -> Result<BlockTime> {
        let nodes = self.nodes();
        let edges = self.edges();
        let n = nodes.len();

        let mut adj: Vec<Vec<(usize, u64)>> = vec![Vec::new(); n];
        let mut indegree = vec![0usize; n];
        for e in edges {
            let weight = nodes[e.from].occupancy() as u64 + e.latency as u64;
            adj[e.from].push((e.to, weight));
            indegree[e.to] += 1;
        }

        let mut que: VecDeque<usize> = VecDeque::new();
        for (id, &d) in indegree.iter().enumerate() {
            if d == 0 {
                que.push_back(id);
            }
        }

        let mut start = vec![0u64; n];
        let mut seen = 0usize;
        while let Some(head) = que.pop_front() {
            seen += 1;
            for &(to, weight) in &adj[head] {
                start[to] = start[to].max(start[head] + weight);
                indegree[to] -= 1;
                if indegree[to] == 0 {
                    que.push_back(to);
                }
            }
        }
        ensure!(seen == n, "execution graph is not a DAG");

        let cycles = (0..n)
            .map(|id| start[id] + nodes[id].occupancy() as u64)
            .max()
            .unwrap_or(0);
        Ok(BlockTime {
            cycles,
            nodes: n,
            edges: edges.len(),
        })
    }
}
