//! The per-substep task graph and its deterministic ordering.

use std::collections::BTreeSet;

use crate::core::ModelHandle;
use crate::error::PbdError;
use crate::Result;

/// One stage of a substep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepNode {
    /// Copy the current pose into the previous-pose buffers
    SavePrevious(ModelHandle),
    /// Move kinematically driven particles to this substep's targets
    ApplyKinematics,
    /// Add gravity and external forces to velocities, then damp
    IntegrateVelocities(ModelHandle),
    /// Advance positions and orientations by the new velocities
    PredictPositions(ModelHandle),
    /// Turn collision records into contact constraints
    GenerateContacts,
    /// Project structural, grasp and contact constraints
    Solve,
    /// Derive velocities from the pose change
    UpdateVelocities(ModelHandle),
    /// Friction and restitution on contacts
    CorrectVelocities,
    /// Report changed geometry
    SyncGeometry(ModelHandle),
}

/// A directed acyclic graph of step nodes
#[derive(Debug, Clone, Default)]
pub struct StepGraph {
    nodes: Vec<StepNode>,
    edges: Vec<(usize, usize)>,
}

impl StepGraph {
    /// Creates an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the standard substep graph for the given models.
    ///
    /// Every model's `PredictPositions` precedes `GenerateContacts`, so all
    /// models are advanced by the same dt before any contact is generated.
    pub fn for_models(models: &[ModelHandle]) -> Self {
        let mut graph = Self::new();

        let save: Vec<_> = models.iter().map(|&m| graph.add_node(StepNode::SavePrevious(m))).collect();
        let kinematics = graph.add_node(StepNode::ApplyKinematics);
        let integrate: Vec<_> = models.iter().map(|&m| graph.add_node(StepNode::IntegrateVelocities(m))).collect();
        let predict: Vec<_> = models.iter().map(|&m| graph.add_node(StepNode::PredictPositions(m))).collect();
        let contacts = graph.add_node(StepNode::GenerateContacts);
        let solve = graph.add_node(StepNode::Solve);
        let update: Vec<_> = models.iter().map(|&m| graph.add_node(StepNode::UpdateVelocities(m))).collect();
        let correct = graph.add_node(StepNode::CorrectVelocities);
        let sync: Vec<_> = models.iter().map(|&m| graph.add_node(StepNode::SyncGeometry(m))).collect();

        for i in 0..models.len() {
            graph.add_edge(save[i], kinematics);
            graph.add_edge(kinematics, integrate[i]);
            graph.add_edge(integrate[i], predict[i]);
            graph.add_edge(predict[i], contacts);
            graph.add_edge(solve, update[i]);
            graph.add_edge(update[i], correct);
            graph.add_edge(correct, sync[i]);
        }
        graph.add_edge(kinematics, contacts);
        graph.add_edge(contacts, solve);
        graph.add_edge(solve, correct);

        graph
    }

    /// Adds a node and returns its index
    pub fn add_node(&mut self, node: StepNode) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// Adds an edge: `from` must run before `to`
    pub fn add_edge(&mut self, from: usize, to: usize) {
        self.edges.push((from, to));
    }

    pub fn nodes(&self) -> &[StepNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Orders the nodes with Kahn's algorithm, breaking ties by insertion order
    pub fn topological_order(&self) -> Result<Vec<StepNode>> {
        let n = self.nodes.len();
        let mut in_degree = vec![0usize; n];
        let mut successors = vec![Vec::new(); n];
        for &(from, to) in &self.edges {
            if from >= n || to >= n {
                return Err(PbdError::UnknownHandle(format!("step node {}", from.max(to))));
            }
            successors[from].push(to);
            in_degree[to] += 1;
        }

        let mut ready: BTreeSet<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(node) = ready.pop_first() {
            order.push(self.nodes[node]);
            for &next in &successors[node] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.insert(next);
                }
            }
        }

        if order.len() != n {
            return Err(PbdError::ScheduleCycle);
        }
        Ok(order)
    }
}
