//! Graph algorithms over an immutable [`WorkflowGraph`] snapshot.
//!
//! [`GraphView`] indexes nodes in declaration order so every result is
//! deterministic: node sets come back as `Vec`s ordered the way the nodes
//! were declared. Edges whose endpoints are unknown are ignored here; the
//! validator reports them separately.

use std::collections::{HashMap, VecDeque};

use nodes::NodeType;

use crate::models::WorkflowGraph;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnStack,
    Done,
}

/// Index-based adjacency view of a graph.
#[derive(Debug)]
pub struct GraphView<'a> {
    ids: Vec<&'a str>,
    index: HashMap<&'a str, usize>,
    node_types: Vec<NodeType>,
    outgoing: Vec<Vec<usize>>,
    incoming: Vec<Vec<usize>>,
}

impl<'a> GraphView<'a> {
    pub fn new(graph: &'a WorkflowGraph) -> Self {
        Self::build(graph, true)
    }

    /// Same as [`GraphView::new`] but drops `a -> a` edges.
    pub fn without_self_loops(graph: &'a WorkflowGraph) -> Self {
        Self::build(graph, false)
    }

    fn build(graph: &'a WorkflowGraph, keep_self_loops: bool) -> Self {
        let mut ids = Vec::with_capacity(graph.nodes.len());
        let mut index = HashMap::with_capacity(graph.nodes.len());
        let mut node_types = Vec::with_capacity(graph.nodes.len());

        // Duplicate ids resolve to their first declaration.
        for node in &graph.nodes {
            if !index.contains_key(node.id.as_str()) {
                index.insert(node.id.as_str(), ids.len());
                ids.push(node.id.as_str());
                node_types.push(node.node_type);
            }
        }

        let mut outgoing = vec![Vec::new(); ids.len()];
        let mut incoming = vec![Vec::new(); ids.len()];
        for edge in &graph.edges {
            if !keep_self_loops && edge.is_self_loop() {
                continue;
            }
            if let (Some(&s), Some(&t)) = (index.get(edge.source.as_str()), index.get(edge.target.as_str())) {
                outgoing[s].push(t);
                incoming[t].push(s);
            }
        }

        Self {
            ids,
            index,
            node_types,
            outgoing,
            incoming,
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    fn names(&self, indices: impl IntoIterator<Item = usize>) -> Vec<String> {
        indices.into_iter().map(|i| self.ids[i].to_owned()).collect()
    }

    // -----------------------------------------------------------------------
    // Cycles
    // -----------------------------------------------------------------------

    /// Depth-first search over every component. Returns the first cycle
    /// found as `[n0, n1, ..., n0]`: first and last elements are equal.
    ///
    /// Iterative, so path depth is bounded by the heap rather than the stack.
    pub fn detect_cycle(&self) -> Option<Vec<String>> {
        let mut marks = vec![Mark::Unvisited; self.len()];
        // (node, index of the next outgoing edge to follow)
        let mut stack: Vec<(usize, usize)> = Vec::new();
        // Nodes currently being visited, root first.
        let mut path: Vec<usize> = Vec::new();

        for start in 0..self.len() {
            if marks[start] != Mark::Unvisited {
                continue;
            }
            marks[start] = Mark::OnStack;
            stack.push((start, 0));
            path.push(start);

            while let Some(frame) = stack.last_mut() {
                let (node, edge) = *frame;
                let Some(&next) = self.outgoing[node].get(edge) else {
                    marks[node] = Mark::Done;
                    stack.pop();
                    path.pop();
                    continue;
                };
                frame.1 += 1;

                match marks[next] {
                    Mark::OnStack => {
                        let pos = path.iter().position(|&n| n == next).unwrap_or(0);
                        let mut cycle = self.names(path[pos..].iter().copied());
                        cycle.push(self.ids[next].to_owned());
                        return Some(cycle);
                    }
                    Mark::Unvisited => {
                        marks[next] = Mark::OnStack;
                        stack.push((next, 0));
                        path.push(next);
                    }
                    Mark::Done => {}
                }
            }
        }
        None
    }

    /// Whether a path `from -> ... -> to` exists (a node always reaches itself).
    pub fn can_reach(&self, from: &str, to: &str) -> bool {
        let (Some(&from), Some(&to)) = (self.index.get(from), self.index.get(to)) else {
            return false;
        };
        self.reachable(std::iter::once(from))[to]
    }

    /// Whether adding `source -> target` would close a loop.
    pub fn would_create_cycle(&self, source: &str, target: &str) -> bool {
        source == target || self.can_reach(target, source)
    }

    // -----------------------------------------------------------------------
    // Ordering
    // -----------------------------------------------------------------------

    /// Kahn's algorithm, grouping every zero in-degree node into one level.
    ///
    /// Nodes on or behind a cycle are never placed, so on a cyclic graph
    /// the result does not cover every node.
    pub fn topological_levels(&self) -> Vec<Vec<String>> {
        self.level_indices()
            .into_iter()
            .map(|level| self.names(level))
            .collect()
    }

    fn level_indices(&self) -> Vec<Vec<usize>> {
        let mut in_degree: Vec<usize> = self.incoming.iter().map(Vec::len).collect();
        let mut current: Vec<usize> = (0..self.len()).filter(|&i| in_degree[i] == 0).collect();
        let mut levels = Vec::new();

        while !current.is_empty() {
            let mut next = Vec::new();
            for &node in &current {
                for &succ in &self.outgoing[node] {
                    in_degree[succ] -= 1;
                    if in_degree[succ] == 0 {
                        next.push(succ);
                    }
                }
            }
            next.sort_unstable();
            levels.push(std::mem::replace(&mut current, next));
        }
        levels
    }

    /// Longest path by edge count, via dynamic programming over the
    /// topological order. Ties go to the earliest-declared end node.
    pub fn critical_path(&self) -> (Vec<String>, usize) {
        let order: Vec<usize> = self.level_indices().into_iter().flatten().collect();
        let mut length = vec![0usize; self.len()];
        let mut previous: Vec<Option<usize>> = vec![None; self.len()];

        for &node in &order {
            for &succ in &self.outgoing[node] {
                if length[node] + 1 > length[succ] {
                    length[succ] = length[node] + 1;
                    previous[succ] = Some(node);
                }
            }
        }

        let Some(mut end) = order
            .iter()
            .copied()
            .min_by_key(|&n| (std::cmp::Reverse(length[n]), n))
        else {
            return (Vec::new(), 0);
        };

        let longest = length[end];
        let mut path = vec![end];
        while let Some(prev) = previous[end] {
            path.push(prev);
            end = prev;
        }
        path.reverse();
        (self.names(path), longest)
    }

    // -----------------------------------------------------------------------
    // Connectivity
    // -----------------------------------------------------------------------

    fn reachable(&self, starts: impl IntoIterator<Item = usize>) -> Vec<bool> {
        let mut seen = vec![false; self.len()];
        let mut queue: VecDeque<usize> = VecDeque::new();
        for start in starts {
            if !seen[start] {
                seen[start] = true;
                queue.push_back(start);
            }
        }
        while let Some(node) = queue.pop_front() {
            for &succ in &self.outgoing[node] {
                if !seen[succ] {
                    seen[succ] = true;
                    queue.push_back(succ);
                }
            }
        }
        seen
    }

    /// Breadth-first search from every start; returns the nodes never visited.
    pub fn unreachable_from<S: AsRef<str>>(&self, starts: &[S]) -> Vec<String> {
        let starts = starts.iter().filter_map(|s| self.index.get(s.as_ref()).copied());
        let seen = self.reachable(starts);
        self.names((0..self.len()).filter(|&i| !seen[i]))
    }

    /// Nodes with neither incoming nor outgoing edges.
    pub fn dangling_nodes(&self) -> Vec<String> {
        self.names((0..self.len()).filter(|&i| self.incoming[i].is_empty() && self.outgoing[i].is_empty()))
    }

    /// Nodes with no outgoing edge whose type is not an allowed terminal.
    pub fn dead_ends(&self, terminal_types: &[NodeType]) -> Vec<String> {
        self.names(
            (0..self.len())
                .filter(|&i| self.outgoing[i].is_empty() && !terminal_types.contains(&self.node_types[i])),
        )
    }

    /// Trigger nodes with zero incoming edges: the runnable entry points.
    pub fn entry_triggers(&self) -> Vec<String> {
        self.names(
            (0..self.len())
                .filter(|&i| self.node_types[i] == NodeType::Trigger && self.incoming[i].is_empty()),
        )
    }
}
