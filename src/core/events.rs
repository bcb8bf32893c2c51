use crate::core::{GraspHandle, ModelHandle, ParticleId};
use std::collections::VecDeque;

/// Types of model events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelEventType {
    /// A model has been added to the world
    Added,

    /// A model's positions or orientations changed during the most recent step.
    /// Each step replaces the previous step's events of this type.
    GeometryChanged,
}

/// An event related to a single model
#[derive(Debug, Clone, PartialEq)]
pub struct ModelEvent {
    /// The type of model event
    pub event_type: ModelEventType,

    /// The model that the event refers to
    pub model: ModelHandle,
}

/// Types of grasp events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraspEventType {
    /// A tool started holding vertices or a body
    Began,

    /// A grasp was released
    Ended,
}

/// An event related to a grasp interaction
#[derive(Debug, Clone, PartialEq)]
pub struct GraspEvent {
    pub event_type: GraspEventType,
    pub grasp: GraspHandle,

    /// The grasping tool body
    pub tool: ParticleId,

    /// Number of constraints the grasp holds
    pub constraint_count: usize,
}

/// A queue of simulation events
#[derive(Debug, Default)]
pub struct EventQueue {
    model_events: VecDeque<ModelEvent>,
    grasp_events: VecDeque<GraspEvent>,
}

impl EventQueue {
    /// Creates a new empty event queue
    pub fn new() -> Self {
        Self {
            model_events: VecDeque::new(),
            grasp_events: VecDeque::new(),
        }
    }

    pub fn add_model_event(&mut self, event: ModelEvent) {
        self.model_events.push_back(event);
    }

    pub fn add_grasp_event(&mut self, event: GraspEvent) {
        self.grasp_events.push_back(event);
    }

    /// Gets the next model event from the queue
    pub fn next_model_event(&mut self) -> Option<ModelEvent> {
        self.model_events.pop_front()
    }

    /// Gets the next grasp event from the queue
    pub fn next_grasp_event(&mut self) -> Option<GraspEvent> {
        self.grasp_events.pop_front()
    }

    pub fn has_model_events(&self) -> bool {
        !self.model_events.is_empty()
    }

    pub fn has_grasp_events(&self) -> bool {
        !self.grasp_events.is_empty()
    }

    /// Returns whether the queue is empty
    pub fn is_empty(&self) -> bool {
        self.model_events.is_empty() && self.grasp_events.is_empty()
    }

    /// Clears all events from the queue
    pub fn clear(&mut self) {
        self.model_events.clear();
        self.grasp_events.clear();
    }

    /// Drops every queued model event of one type
    pub fn discard_model_events(&mut self, event_type: ModelEventType) {
        self.model_events.retain(|e| e.event_type != event_type);
    }

    /// Gets all model events of a specific type
    pub fn get_model_events_of_type(&self, event_type: ModelEventType) -> Vec<&ModelEvent> {
        self.model_events
            .iter()
            .filter(|e| e.event_type == event_type)
            .collect()
    }

    /// Gets all model events for a specific model
    pub fn get_model_events_for_model(&self, model: ModelHandle) -> Vec<&ModelEvent> {
        self.model_events
            .iter()
            .filter(|e| e.model == model)
            .collect()
    }

    /// Gets all events of one grasp
    pub fn get_grasp_events_for(&self, grasp: GraspHandle) -> Vec<&GraspEvent> {
        self.grasp_events
            .iter()
            .filter(|e| e.grasp == grasp)
            .collect()
    }
}
