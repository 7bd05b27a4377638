//! Priority Analyzer (spec §4.6): builds the issue DAG, detects cycles,
//! computes topological order, critical path, and per-node priority
//! scores, then partitions the DAG into parallel-safe levels.
//!
//! The graph itself is a `petgraph::graph::DiGraph`, generalizing the
//! declared-but-unused `petgraph` dependency in `coordination/Cargo.toml`
//! into the semantic dependency graph this component actually needs.
//! Cycle detection and topological order use explicit algorithms
//! (iterative gray/black DFS, Kahn's algorithm) rather than
//! `petgraph::algo::toposort`, to get the specific cycle payload and
//! tie-breaking behavior below.

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::issue::{Effort, Priority};

#[derive(Debug, thiserror::Error)]
pub enum AnalyzerError {
    #[error("edge references unknown node: {0}")]
    UnknownNode(String),
    #[error("self-loop rejected for node {0}")]
    SelfLoop(String),
    #[error("circular dependency: {0:?}")]
    CircularDependency(Vec<String>),
    #[error("node not found: {0}")]
    NodeNotFound(String),
}

impl AnalyzerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AnalyzerError::UnknownNode(_) => ErrorKind::Validation,
            AnalyzerError::SelfLoop(_) => ErrorKind::Validation,
            AnalyzerError::CircularDependency(_) => ErrorKind::CircularDependency,
            AnalyzerError::NodeNotFound(_) => ErrorKind::NotFound,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueNode {
    pub id: String,
    pub priority: Priority,
    pub effort: Effort,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueEdge {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueGraphInput {
    pub nodes: Vec<IssueNode>,
    pub edges: Vec<IssueEdge>,
}

/// Configurable scoring weights (spec §4.6 step 4).
#[derive(Debug, Clone, Copy)]
pub struct ScoringWeights {
    pub p0: i64,
    pub p1: i64,
    pub p2: i64,
    pub p3: i64,
    pub critical_path_bonus: i64,
    pub quick_win_bonus: i64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            p0: 100,
            p1: 75,
            p2: 50,
            p3: 25,
            critical_path_bonus: 50,
            quick_win_bonus: 25,
        }
    }
}

impl ScoringWeights {
    fn priority_weight(&self, priority: Priority) -> i64 {
        match priority {
            Priority::P0 => self.p0,
            Priority::P1 => self.p1,
            Priority::P2 => self.p2,
            Priority::P3 => self.p3,
        }
    }
}

/// The Priority Analyzer's output for an issue graph (spec §4.6).
pub struct PriorityAnalyzer {
    graph: DiGraph<String, ()>,
    index_of: HashMap<String, NodeIndex>,
    nodes: HashMap<String, IssueNode>,
    weights: ScoringWeights,
    topo_order: Vec<String>,
    critical_path: Vec<String>,
    scores: HashMap<String, i64>,
    levels: Vec<Vec<String>>,
}

impl PriorityAnalyzer {
    /// Validate, build, and fully analyze an issue graph (spec §4.6 steps
    /// 1-6 run eagerly so every query below is O(1) lookup afterward).
    pub fn build(input: IssueGraphInput, weights: ScoringWeights) -> Result<Self, AnalyzerError> {
        let mut graph = DiGraph::new();
        let mut index_of = HashMap::new();
        let mut nodes = HashMap::new();

        for node in input.nodes {
            let idx = graph.add_node(node.id.clone());
            index_of.insert(node.id.clone(), idx);
            nodes.insert(node.id.clone(), node);
        }

        let mut seen_edges = HashSet::new();
        for edge in input.edges {
            if edge.from == edge.to {
                return Err(AnalyzerError::SelfLoop(edge.from));
            }
            let from = *index_of
                .get(&edge.from)
                .ok_or_else(|| AnalyzerError::UnknownNode(edge.from.clone()))?;
            let to = *index_of
                .get(&edge.to)
                .ok_or_else(|| AnalyzerError::UnknownNode(edge.to.clone()))?;
            if !seen_edges.insert((edge.from.clone(), edge.to.clone())) {
                continue; // duplicate edge, deduplicated per spec step 1
            }
            graph.add_edge(from, to, ());
        }

        detect_cycle(&graph, &index_of)?;

        let topo_order = kahn_topological_order(&graph, &index_of, &nodes, &weights);
        let scores_without_critical_path = compute_base_scores(&nodes, &weights);
        let critical_path = longest_path(&graph, &index_of, &nodes, &topo_order);
        let on_critical_path: HashSet<&str> = critical_path.iter().map(|s| s.as_str()).collect();

        let mut scores = scores_without_critical_path;
        for id in &on_critical_path {
            if let Some(score) = scores.get_mut(*id) {
                *score += weights.critical_path_bonus;
            }
        }

        let levels = partition_levels(&graph, &index_of, &topo_order);

        Ok(Self {
            graph,
            index_of,
            nodes,
            weights,
            topo_order,
            critical_path,
            scores,
            levels,
        })
    }

    pub fn topological_order(&self) -> &[String] {
        &self.topo_order
    }

    pub fn critical_path(&self) -> &[String] {
        &self.critical_path
    }

    pub fn score(&self, id: &str) -> Option<i64> {
        self.scores.get(id).copied()
    }

    pub fn levels(&self) -> &[Vec<String>] {
        &self.levels
    }

    pub fn has_cycles(&self) -> bool {
        false // build() would have failed already if there were any
    }

    pub fn get_dependencies(&self, id: &str) -> Result<Vec<String>, AnalyzerError> {
        let idx = self.index(id)?;
        Ok(self
            .graph
            .neighbors_directed(idx, Direction::Incoming)
            .map(|n| self.graph[n].clone())
            .collect())
    }

    pub fn get_dependents(&self, id: &str) -> Result<Vec<String>, AnalyzerError> {
        let idx = self.index(id)?;
        Ok(self
            .graph
            .neighbors_directed(idx, Direction::Outgoing)
            .map(|n| self.graph[n].clone())
            .collect())
    }

    pub fn get_transitive_dependencies(&self, id: &str) -> Result<Vec<String>, AnalyzerError> {
        self.index(id)?;
        let mut seen = HashSet::new();
        let mut stack = self.get_dependencies(id)?;
        let mut result = Vec::new();
        while let Some(dep) = stack.pop() {
            if seen.insert(dep.clone()) {
                result.push(dep.clone());
                stack.extend(self.get_dependencies(&dep)?);
            }
        }
        Ok(result)
    }

    /// Highest-scoring executable issue (all dependencies satisfied,
    /// `completed` passed in by the caller's issue-state tracking).
    pub fn get_next_executable_issue(&self, completed: &HashSet<String>) -> Option<String> {
        self.get_executable_issues(completed).into_iter().next()
    }

    /// Every node whose dependencies are all in `completed`, ordered by
    /// score descending then id ascending (spec §4.6 tie-breaking).
    pub fn get_executable_issues(&self, completed: &HashSet<String>) -> Vec<String> {
        let mut candidates: Vec<String> = self
            .nodes
            .keys()
            .filter(|id| !completed.contains(*id))
            .filter(|id| {
                self.get_dependencies(id)
                    .map(|deps| deps.iter().all(|d| completed.contains(d)))
                    .unwrap_or(false)
            })
            .cloned()
            .collect();
        candidates.sort_by(|a, b| {
            let score_a = self.scores.get(a).copied().unwrap_or(0);
            let score_b = self.scores.get(b).copied().unwrap_or(0);
            score_b.cmp(&score_a).then_with(|| a.cmp(b))
        });
        candidates
    }

    fn index(&self, id: &str) -> Result<NodeIndex, AnalyzerError> {
        self.index_of.get(id).copied().ok_or_else(|| AnalyzerError::NodeNotFound(id.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Gray,
    Black,
}

fn detect_cycle(
    graph: &DiGraph<String, ()>,
    index_of: &HashMap<String, NodeIndex>,
) -> Result<(), AnalyzerError> {
    let mut marks: HashMap<NodeIndex, Mark> = HashMap::new();

    for &start in index_of.values() {
        if marks.contains_key(&start) {
            continue;
        }
        // Iterative DFS with an explicit stack of (node, child-iterator
        // position) frames, per spec step 2 ("iterative DFS with
        // gray/black coloring").
        let mut stack: Vec<(NodeIndex, Vec<NodeIndex>, usize)> = vec![(
            start,
            graph.neighbors_directed(start, Direction::Outgoing).collect(),
            0,
        )];
        marks.insert(start, Mark::Gray);
        let mut path = vec![start];

        while let Some((node, children, pos)) = stack.last_mut() {
            if *pos < children.len() {
                let child = children[*pos];
                *pos += 1;
                match marks.get(&child) {
                    Some(Mark::Gray) => {
                        let cycle_start = path.iter().position(|n| *n == child).unwrap_or(0);
                        let cycle: Vec<String> =
                            path[cycle_start..].iter().map(|n| graph[*n].clone()).collect();
                        return Err(AnalyzerError::CircularDependency(cycle));
                    }
                    Some(Mark::Black) => continue,
                    None => {
                        marks.insert(child, Mark::Gray);
                        path.push(child);
                        stack.push((
                            child,
                            graph.neighbors_directed(child, Direction::Outgoing).collect(),
                            0,
                        ));
                    }
                }
            } else {
                marks.insert(*node, Mark::Black);
                path.pop();
                stack.pop();
            }
        }
    }
    Ok(())
}

fn kahn_topological_order(
    graph: &DiGraph<String, ()>,
    index_of: &HashMap<String, NodeIndex>,
    nodes: &HashMap<String, IssueNode>,
    weights: &ScoringWeights,
) -> Vec<String> {
    let mut in_degree: HashMap<NodeIndex, usize> = HashMap::new();
    for &idx in index_of.values() {
        in_degree.insert(idx, graph.neighbors_directed(idx, Direction::Incoming).count());
    }

    let base_scores = compute_base_scores(nodes, weights);
    let mut ready: VecDeque<NodeIndex> = in_degree
        .iter()
        .filter(|(_, &deg)| deg == 0)
        .map(|(&idx, _)| idx)
        .collect();
    // Deterministic starting order: highest base score first, then id.
    let mut ready_vec: Vec<NodeIndex> = ready.drain(..).collect();
    sort_by_score_then_id(graph, &mut ready_vec, &base_scores);
    let mut ready: VecDeque<NodeIndex> = ready_vec.into();

    let mut order = Vec::new();
    while let Some(idx) = ready.pop_front() {
        order.push(graph[idx].clone());
        let mut newly_ready = Vec::new();
        for succ in graph.neighbors_directed(idx, Direction::Outgoing) {
            let deg = in_degree.get_mut(&succ).unwrap();
            *deg -= 1;
            if *deg == 0 {
                newly_ready.push(succ);
            }
        }
        sort_by_score_then_id(graph, &mut newly_ready, &base_scores);
        for n in newly_ready {
            ready.push_back(n);
        }
    }
    order
}

fn sort_by_score_then_id(graph: &DiGraph<String, ()>, nodes: &mut [NodeIndex], scores: &HashMap<String, i64>) {
    nodes.sort_by(|a, b| {
        let id_a = &graph[*a];
        let id_b = &graph[*b];
        let score_a = scores.get(id_a).copied().unwrap_or(0);
        let score_b = scores.get(id_b).copied().unwrap_or(0);
        score_b.cmp(&score_a).then_with(|| id_a.cmp(id_b))
    });
}

fn compute_base_scores(nodes: &HashMap<String, IssueNode>, weights: &ScoringWeights) -> HashMap<String, i64> {
    nodes
        .values()
        .map(|node| {
            let mut score = weights.priority_weight(node.priority);
            if node.effort.is_quick_win() {
                score += weights.quick_win_bonus;
            }
            (node.id.clone(), score)
        })
        .collect()
}

/// Longest path by node effort weight, relaxing edges in topological
/// order (spec §4.6 step 5).
fn longest_path(
    graph: &DiGraph<String, ()>,
    index_of: &HashMap<String, NodeIndex>,
    nodes: &HashMap<String, IssueNode>,
    topo_order: &[String],
) -> Vec<String> {
    let mut dist: HashMap<NodeIndex, i64> = HashMap::new();
    let mut pred: HashMap<NodeIndex, Option<NodeIndex>> = HashMap::new();

    for id in topo_order {
        let idx = index_of[id];
        let self_weight = nodes.get(id).map(|n| n.effort.weight() as i64).unwrap_or(0);
        dist.entry(idx).or_insert(self_weight);
        pred.entry(idx).or_insert(None);
    }

    for id in topo_order {
        let idx = index_of[id];
        let base = *dist.get(&idx).unwrap_or(&0);
        for succ in graph.neighbors_directed(idx, Direction::Outgoing) {
            let succ_weight = nodes.get(&graph[succ]).map(|n| n.effort.weight() as i64).unwrap_or(0);
            let candidate = base + succ_weight;
            let current = *dist.get(&succ).unwrap_or(&0);
            if candidate > current {
                dist.insert(succ, candidate);
                pred.insert(succ, Some(idx));
            }
        }
    }

    let end = dist.iter().max_by_key(|(_, &d)| d).map(|(&idx, _)| idx);
    let Some(mut cur) = end else {
        return Vec::new();
    };
    let mut path = vec![graph[cur].clone()];
    while let Some(Some(prev)) = pred.get(&cur) {
        path.push(graph[*prev].clone());
        cur = *prev;
    }
    path.reverse();
    path
}

/// Level partition: `level(v) = 1 + max(level(u) for u -> v)`, sources at
/// level 1 (spec §4.6 step 6).
fn partition_levels(
    graph: &DiGraph<String, ()>,
    index_of: &HashMap<String, NodeIndex>,
    topo_order: &[String],
) -> Vec<Vec<String>> {
    let mut level_of: HashMap<NodeIndex, usize> = HashMap::new();
    for id in topo_order {
        let idx = index_of[id];
        let max_pred_level = graph
            .neighbors_directed(idx, Direction::Incoming)
            .map(|p| level_of.get(&p).copied().unwrap_or(0))
            .max();
        level_of.insert(idx, max_pred_level.map(|l| l + 1).unwrap_or(1));
    }

    let max_level = level_of.values().copied().max().unwrap_or(0);
    let mut levels: Vec<Vec<String>> = vec![Vec::new(); max_level];
    for id in topo_order {
        let idx = index_of[id];
        let level = level_of[&idx];
        levels[level - 1].push(id.clone());
    }
    levels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issue::{Effort, Priority};
    use serde_json::json;

    fn node(id: &str, priority: Priority, effort: Effort) -> IssueNode {
        IssueNode {
            id: id.to_string(),
            priority,
            effort,
            metadata: json!({}),
        }
    }

    fn edge(from: &str, to: &str) -> IssueEdge {
        IssueEdge {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    #[test]
    fn linear_chain_topo_order_matches_edges() {
        let input = IssueGraphInput {
            nodes: vec![
                node("a", Priority::P1, Effort::Xs),
                node("b", Priority::P1, Effort::Xs),
                node("c", Priority::P1, Effort::Xs),
            ],
            edges: vec![edge("a", "b"), edge("b", "c")],
        };
        let analyzer = PriorityAnalyzer::build(input, ScoringWeights::default()).unwrap();
        assert_eq!(analyzer.topological_order(), &["a".to_string(), "b".to_string(), "c".to_string()]);
    }

    #[test]
    fn diamond_first_dispatch_is_the_single_root() {
        let input = IssueGraphInput {
            nodes: vec![
                node("a", Priority::P0, Effort::Xs),
                node("b", Priority::P2, Effort::Xs),
                node("c", Priority::P2, Effort::Xs),
                node("d", Priority::P1, Effort::Xs),
            ],
            edges: vec![edge("a", "b"), edge("a", "c"), edge("b", "d"), edge("c", "d")],
        };
        let analyzer = PriorityAnalyzer::build(input, ScoringWeights::default()).unwrap();
        let completed = HashSet::new();
        assert_eq!(analyzer.get_next_executable_issue(&completed), Some("a".to_string()));
        assert_eq!(analyzer.topological_order().last(), Some(&"d".to_string()));
    }

    #[test]
    fn cycle_is_rejected() {
        let input = IssueGraphInput {
            nodes: vec![node("a", Priority::P1, Effort::Xs), node("b", Priority::P1, Effort::Xs)],
            edges: vec![edge("a", "b"), edge("b", "a")],
        };
        let err = PriorityAnalyzer::build(input, ScoringWeights::default()).unwrap_err();
        assert!(matches!(err, AnalyzerError::CircularDependency(_)));
    }

    #[test]
    fn self_loop_is_rejected() {
        let input = IssueGraphInput {
            nodes: vec![node("a", Priority::P1, Effort::Xs)],
            edges: vec![edge("a", "a")],
        };
        let err = PriorityAnalyzer::build(input, ScoringWeights::default()).unwrap_err();
        assert!(matches!(err, AnalyzerError::SelfLoop(_)));
    }

    #[test]
    fn unknown_edge_endpoint_is_rejected() {
        let input = IssueGraphInput {
            nodes: vec![node("a", Priority::P1, Effort::Xs)],
            edges: vec![edge("a", "ghost")],
        };
        let err = PriorityAnalyzer::build(input, ScoringWeights::default()).unwrap_err();
        assert!(matches!(err, AnalyzerError::UnknownNode(_)));
    }

    #[test]
    fn duplicate_edges_are_deduplicated_not_rejected() {
        let input = IssueGraphInput {
            nodes: vec![node("a", Priority::P1, Effort::Xs), node("b", Priority::P1, Effort::Xs)],
            edges: vec![edge("a", "b"), edge("a", "b")],
        };
        let analyzer = PriorityAnalyzer::build(input, ScoringWeights::default()).unwrap();
        assert_eq!(analyzer.get_dependents("a").unwrap(), vec!["b".to_string()]);
    }

    #[test]
    fn critical_path_bonus_lifts_score() {
        let input = IssueGraphInput {
            nodes: vec![
                node("a", Priority::P2, Effort::Xl),
                node("b", Priority::P2, Effort::Xl),
                node("isolated", Priority::P2, Effort::Xs),
            ],
            edges: vec![edge("a", "b")],
        };
        let analyzer = PriorityAnalyzer::build(input, ScoringWeights::default()).unwrap();
        assert!(analyzer.critical_path().contains(&"a".to_string()));
        assert!(analyzer.score("a").unwrap() > analyzer.score("isolated").unwrap());
    }

    #[test]
    fn levels_partition_diamond_into_three_tiers() {
        let input = IssueGraphInput {
            nodes: vec![
                node("a", Priority::P0, Effort::Xs),
                node("b", Priority::P2, Effort::Xs),
                node("c", Priority::P2, Effort::Xs),
                node("d", Priority::P1, Effort::Xs),
            ],
            edges: vec![edge("a", "b"), edge("a", "c"), edge("b", "d"), edge("c", "d")],
        };
        let analyzer = PriorityAnalyzer::build(input, ScoringWeights::default()).unwrap();
        let levels = analyzer.levels();
        assert_eq!(levels.len(), 3);
        assert_eq!(levels[0], vec!["a".to_string()]);
        assert_eq!(levels[2], vec!["d".to_string()]);
    }

    #[test]
    fn transitive_dependencies_follow_the_full_chain() {
        let input = IssueGraphInput {
            nodes: vec![
                node("a", Priority::P1, Effort::Xs),
                node("b", Priority::P1, Effort::Xs),
                node("c", Priority::P1, Effort::Xs),
            ],
            edges: vec![edge("a", "b"), edge("b", "c")],
        };
        let analyzer = PriorityAnalyzer::build(input, ScoringWeights::default()).unwrap();
        let mut deps = analyzer.get_transitive_dependencies("c").unwrap();
        deps.sort();
        assert_eq!(deps, vec!["a".to_string(), "b".to_string()]);
    }
}
