//! Readiness-driven execution of a [`TaskGraph`].
//!
//! Each node keeps a counter of unmerged predecessors. When a merge drops a
//! counter to zero the node is ready; all nodes made ready by the same merge
//! step form a cohort and are launched together on scoped threads, each with
//! the same frozen snapshot of the shared record.
//!
//! Completions arrive in any order, but merges follow a fixed sequence:
//! cohorts in the order they were launched, members of a cohort in
//! registration order. A finished node waits until everything ahead of it in
//! that sequence has merged, and a node made ready by a merge is launched
//! before the next merge. Both the final record and every snapshot handed to
//! a node are therefore independent of completion timing.
//!
//! A node that returns an error or panics contributes its fallback output
//! instead. Nothing aborts the run; the terminal node always executes.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info_span, warn, Span};

use super::builder::{Node, TaskGraph};
use super::error::StageError;
use super::record::Record;

/// How a node's contribution was produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NodeStatus {
    Completed,
    /// The stage failed; its fallback output was merged.
    Degraded { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeOutcome {
    pub node: String,
    pub status: NodeStatus,
    pub elapsed: Duration,
}

/// Final record plus per-node outcomes.
#[derive(Debug, Clone)]
pub struct ExecutionReport<V> {
    pub record: Record<V>,
    /// Outcomes in registration order.
    pub outcomes: Vec<NodeOutcome>,
    /// Node ids in the order their outputs were merged.
    pub merge_order: Vec<String>,
}

impl<V> ExecutionReport<V> {
    pub fn degraded(&self) -> impl Iterator<Item = &NodeOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, NodeStatus::Degraded { .. }))
    }
}

struct Completion<V> {
    node: usize,
    output: Record<V>,
    status: NodeStatus,
    elapsed: Duration,
}

impl<V> TaskGraph<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Run the graph from `input` and return the record after the terminal
    /// node has merged.
    pub fn execute(&self, input: Record<V>) -> Record<V> {
        self.execute_with_report(input).record
    }

    pub fn execute_with_report(&self, input: Record<V>) -> ExecutionReport<V> {
        let n = self.nodes.len();
        let mut shared = input;
        let mut unmerged: Vec<usize> = self.nodes.iter().map(|n| n.predecessors.len()).collect();
        // Launched nodes, cohort after cohort; merges follow this sequence.
        let mut queue: Vec<usize> = Vec::with_capacity(n);
        let mut cursor = 0usize;
        let mut finished: HashMap<usize, Completion<V>> = HashMap::new();
        let mut outcomes: Vec<Option<NodeOutcome>> = vec![None; n];
        let mut merge_order = Vec::with_capacity(n);
        let parent = Span::current();

        thread::scope(|scope| {
            let (tx, rx) = mpsc::channel::<Completion<V>>();
            let mut cohorts = 0usize;

            let mut launch = |members: Vec<usize>, shared: &Record<V>, queue: &mut Vec<usize>| {
                let snapshot = Arc::new(shared.clone());
                for &m in &members {
                    let node = &self.nodes[m];
                    let job_tx = tx.clone();
                    let job_input = Arc::clone(&snapshot);
                    let job_span = parent.clone();
                    let spawned = thread::Builder::new()
                        .name(format!("stage-{}", node.id))
                        .spawn_scoped(scope, move || {
                            let _span = info_span!(parent: &job_span, "stage", stage = %node.id).entered();
                            let _ = job_tx.send(run_node(m, node, &job_input));
                        });
                    if let Err(e) = spawned {
                        warn!(stage = %node.id, error = %e, "thread spawn failed, running inline");
                        let _ = tx.send(run_node(m, node, &snapshot));
                    }
                }
                debug!(cohort = cohorts, size = members.len(), "cohort launched");
                cohorts += 1;
                queue.extend(members);
            };

            launch(vec![self.entry], &shared, &mut queue);
            let mut in_flight = 1usize;

            while in_flight > 0 {
                let Ok(done) = rx.recv() else {
                    break;
                };
                in_flight -= 1;
                finished.insert(done.node, done);

                while let Some(&next) = queue.get(cursor) {
                    let Some(done) = finished.remove(&next) else {
                        break;
                    };
                    cursor += 1;

                    shared.merge(done.output);
                    merge_order.push(self.nodes[next].id.clone());
                    outcomes[next] = Some(NodeOutcome {
                        node: self.nodes[next].id.clone(),
                        status: done.status,
                        elapsed: done.elapsed,
                    });

                    let mut ready = Vec::new();
                    for &s in &self.successors[next] {
                        unmerged[s] -= 1;
                        if unmerged[s] == 0 {
                            ready.push(s);
                        }
                    }

                    // Snapshot before anything later in the queue merges.
                    if !ready.is_empty() {
                        ready.sort_unstable();
                        in_flight += ready.len();
                        launch(ready, &shared, &mut queue);
                    }
                }
            }
        });

        if outcomes[self.terminal].is_none() {
            warn!(terminal = %self.nodes[self.terminal].id, "terminal node never merged");
        }

        ExecutionReport {
            record: shared,
            outcomes: outcomes.into_iter().flatten().collect(),
            merge_order,
        }
    }
}

fn run_node<V>(index: usize, node: &Node<V>, input: &Record<V>) -> Completion<V> {
    let started = Instant::now();
    let result = panic::catch_unwind(AssertUnwindSafe(|| node.stage.run(input)))
        .unwrap_or_else(|payload| Err(StageError::Panicked(panic_message(payload.as_ref()))));

    let (output, status) = match result {
        Ok(output) => (output, NodeStatus::Completed),
        Err(error) => {
            warn!(stage = %node.id, %error, "stage failed, using fallback output");
            let output = panic::catch_unwind(AssertUnwindSafe(|| node.stage.fallback(input, &error)))
                .unwrap_or_else(|_| {
                    warn!(stage = %node.id, "fallback panicked, contributing nothing");
                    Record::new()
                });
            (
                output,
                NodeStatus::Degraded {
                    error: error.to_string(),
                },
            )
        }
    };

    Completion {
        node: index,
        output,
        status,
        elapsed: started.elapsed(),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
