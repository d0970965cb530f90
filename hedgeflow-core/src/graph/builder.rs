use std::collections::{HashMap, VecDeque};

use super::error::GraphError;
use super::stage::Stage;

pub(crate) struct Node<V> {
    pub(crate) id: String,
    pub(crate) stage: Box<dyn Stage<V>>,
    pub(crate) predecessors: Vec<usize>,
}

/// Registers nodes and their predecessors, then validates the topology.
///
/// Registration order matters: it breaks ties when nodes that become ready
/// together are merged.
pub struct GraphBuilder<V> {
    nodes: Vec<(String, Box<dyn Stage<V>>, Vec<String>)>,
}

impl<V> Default for GraphBuilder<V> {
    fn default() -> Self {
        Self { nodes: Vec::new() }
    }
}

impl<V: 'static> GraphBuilder<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(
        mut self,
        id: impl Into<String>,
        stage: impl Stage<V> + 'static,
        predecessors: &[&str],
    ) -> Self {
        self.add_node(id, Box::new(stage), predecessors);
        self
    }

    pub fn add_node(&mut self, id: impl Into<String>, stage: Box<dyn Stage<V>>, predecessors: &[&str]) {
        self.nodes.push((
            id.into(),
            stage,
            predecessors.iter().map(|p| p.to_string()).collect(),
        ));
    }

    pub fn build(self) -> Result<TaskGraph<V>, GraphError> {
        if self.nodes.is_empty() {
            return Err(GraphError::Empty);
        }

        let mut index: HashMap<String, usize> = HashMap::new();
        for (i, (id, _, _)) in self.nodes.iter().enumerate() {
            if index.insert(id.clone(), i).is_some() {
                return Err(GraphError::DuplicateNode(id.clone()));
            }
        }

        let mut nodes = Vec::with_capacity(self.nodes.len());
        for (id, stage, preds) in self.nodes {
            let mut predecessors = Vec::with_capacity(preds.len());
            for p in preds {
                let Some(&pi) = index.get(&p) else {
                    return Err(GraphError::UnknownPredecessor {
                        node: id,
                        predecessor: p,
                    });
                };
                if !predecessors.contains(&pi) {
                    predecessors.push(pi);
                }
            }
            nodes.push(Node {
                id,
                stage,
                predecessors,
            });
        }

        let n = nodes.len();
        let mut successors = vec![Vec::new(); n];
        for (i, node) in nodes.iter().enumerate() {
            for &p in &node.predecessors {
                successors[p].push(i);
            }
        }

        // Kahn's algorithm: whatever never reaches in-degree 0 is on a cycle.
        let mut in_degree: Vec<usize> = nodes.iter().map(|n| n.predecessors.len()).collect();
        let mut queue: VecDeque<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut seen = 0;
        while let Some(i) = queue.pop_front() {
            seen += 1;
            for &s in &successors[i] {
                in_degree[s] -= 1;
                if in_degree[s] == 0 {
                    queue.push_back(s);
                }
            }
        }
        if seen < n {
            return Err(GraphError::Cycle {
                nodes: (0..n)
                    .filter(|&i| in_degree[i] > 0)
                    .map(|i| nodes[i].id.clone())
                    .collect(),
            });
        }

        let entries: Vec<usize> = (0..n).filter(|&i| nodes[i].predecessors.is_empty()).collect();
        if entries.len() != 1 {
            return Err(GraphError::EntryCount {
                nodes: entries.iter().map(|&i| nodes[i].id.clone()).collect(),
            });
        }
        let terminals: Vec<usize> = (0..n).filter(|&i| successors[i].is_empty()).collect();
        if terminals.len() != 1 {
            return Err(GraphError::TerminalCount {
                nodes: terminals.iter().map(|&i| nodes[i].id.clone()).collect(),
            });
        }

        Ok(TaskGraph {
            entry: entries[0],
            terminal: terminals[0],
            nodes,
            successors,
        })
    }
}

/// A validated, acyclic task graph with one entry and one terminal node.
///
/// Every node lies on a path from the entry to the terminal, so a run
/// executes each node exactly once.
pub struct TaskGraph<V> {
    pub(crate) nodes: Vec<Node<V>>,
    pub(crate) successors: Vec<Vec<usize>>,
    pub(crate) entry: usize,
    pub(crate) terminal: usize,
}

impl<V> TaskGraph<V> {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node ids in registration order.
    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|n| n.id.as_str())
    }

    pub fn entry(&self) -> &str {
        &self.nodes[self.entry].id
    }

    pub fn terminal(&self) -> &str {
        &self.nodes[self.terminal].id
    }

    pub fn predecessors(&self, id: &str) -> Option<Vec<&str>> {
        let node = self.nodes.iter().find(|n| n.id == id)?;
        Some(
            node.predecessors
                .iter()
                .map(|&p| self.nodes[p].id.as_str())
                .collect(),
        )
    }
}
