// stratify.rs — Execution strata for the flow graph
//
// Partitions IR nodes into levels so that every edge runs from a lower
// level to a higher one. Nodes owned by a stage are stratified per stage,
// over that stage's internal edges; all other nodes form the global
// partition. Edges that cross partitions (a `next` jump, a stage entry
// activated from outside) impose no ordering here.
//
// Preconditions: `ir` comes from `graph::build_graph`.
// Postconditions: on success, `ir.strata` and every `Stage::strata` hold
//                 each node of their partition exactly once.
// Failure modes: a dependency cycle → `StratifyError::Cycle`; the IR is left
//                unstratified.
// Side effects: none.

use std::collections::{HashMap, HashSet, VecDeque};

use thiserror::Error;
use tracing::debug;

use crate::ir::{Edges, Nodes, Sequence, Strata, IR};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StratifyError {
    #[error("cycle detected involving nodes: {}", .nodes.join(", "))]
    Cycle { nodes: Vec<String> },
}

/// Strata for every partition of one IR.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Levels {
    pub global: Strata,
    /// Indexed like `IR::sequences`, then like `Sequence::stages`.
    pub stages: Vec<Vec<Strata>>,
}

pub trait Stratifier {
    fn stratify(
        &self,
        nodes: &Nodes,
        edges: &Edges,
        sequences: &[Sequence],
    ) -> Result<Levels, StratifyError>;
}

/// Levels by longest path from a source node.
#[derive(Debug, Clone, Copy, Default)]
pub struct LongestPath;

impl Stratifier for LongestPath {
    fn stratify(
        &self,
        nodes: &Nodes,
        edges: &Edges,
        sequences: &[Sequence],
    ) -> Result<Levels, StratifyError> {
        let owned: HashSet<&str> = sequences
            .iter()
            .flat_map(|seq| &seq.stages)
            .flat_map(|stage| stage.nodes.iter().map(String::as_str))
            .collect();
        let global: Vec<&str> = nodes.keys().filter(|k| !owned.contains(k)).collect();

        let mut levels = Levels {
            global: partition(&global, edges)?,
            stages: Vec::with_capacity(sequences.len()),
        };
        for seq in sequences {
            let mut stages = Vec::with_capacity(seq.stages.len());
            for stage in &seq.stages {
                let keys: Vec<&str> = stage.nodes.iter().map(String::as_str).collect();
                stages.push(partition(&keys, edges)?);
            }
            levels.stages.push(stages);
        }
        Ok(levels)
    }
}

/// Run `stratifier` over `ir` and store its levels verbatim.
pub fn stratify(ir: &mut IR, stratifier: &dyn Stratifier) -> Result<(), StratifyError> {
    let levels = stratifier.stratify(&ir.nodes, &ir.edges, &ir.sequences)?;
    debug!(global = levels.global.len(), "stratified");
    ir.strata = levels.global;
    for (seq, stages) in ir.sequences.iter_mut().zip(levels.stages) {
        for (stage, strata) in seq.stages.iter_mut().zip(stages) {
            stage.strata = strata;
        }
    }
    Ok(())
}

/// Longest-path levels of `keys` over the edges between them. Within a
/// level, nodes keep the order of `keys`.
fn partition(keys: &[&str], edges: &Edges) -> Result<Strata, StratifyError> {
    let index: HashMap<&str, usize> = keys.iter().enumerate().map(|(i, k)| (*k, i)).collect();
    let mut in_degree = vec![0usize; keys.len()];
    let mut adj: Vec<Vec<usize>> = vec![Vec::new(); keys.len()];
    for edge in edges {
        let (Some(&src), Some(&dst)) = (
            index.get(edge.source.node.as_str()),
            index.get(edge.target.node.as_str()),
        ) else {
            continue;
        };
        adj[src].push(dst);
        in_degree[dst] += 1;
    }

    // Kahn's algorithm, relaxing depths along the way.
    let mut depth = vec![0usize; keys.len()];
    let mut queue: VecDeque<usize> = (0..keys.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut visited = 0;
    while let Some(i) = queue.pop_front() {
        visited += 1;
        for &next in &adj[i] {
            depth[next] = depth[next].max(depth[i] + 1);
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                queue.push_back(next);
            }
        }
    }

    if visited < keys.len() {
        let nodes = (0..keys.len())
            .filter(|&i| in_degree[i] > 0)
            .map(|i| keys[i].to_string())
            .collect();
        return Err(StratifyError::Cycle { nodes });
    }

    let height = depth.iter().max().map_or(0, |d| d + 1);
    let mut strata = vec![Vec::new(); height];
    for (i, key) in keys.iter().enumerate() {
        strata[depth[i]].push(key.to_string());
    }
    Ok(Strata(strata))
}
