//! Experience replay memory
//!
//! Bounded double-ended history of past transitions:
//! - Insertion at the head, FIFO eviction from the tail
//! - Uniform sampling without replacement for decorrelated learning batches

use crate::error::SchedulerError;
use crate::models::Transition;
use rand::Rng;
use std::collections::VecDeque;
use tracing::debug;

/// Default replay capacity (transitions)
pub const DEFAULT_CAPACITY: usize = 10_000;

/// Bounded replay memory for the DQN agent
#[derive(Debug, Clone)]
pub struct ReplayMemory {
    /// Newest transition at the front
    transitions: VecDeque<Transition>,
    capacity: usize,
}

impl ReplayMemory {
    /// Create an empty memory holding at most `capacity` transitions
    pub fn new(capacity: usize) -> Self {
        Self {
            transitions: VecDeque::with_capacity(capacity.min(10_000)),
            capacity,
        }
    }

    /// Insert a transition, evicting the oldest one when over capacity
    pub fn insert(&mut self, transition: Transition) {
        self.transitions.push_front(transition);
        while self.transitions.len() > self.capacity {
            self.transitions.pop_back();
        }
    }

    /// Draw `n` distinct transitions uniformly at random
    ///
    /// Fails with `InsufficientData` when fewer than `n` are stored; the
    /// memory is left untouched either way.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        n: usize,
        rng: &mut R,
    ) -> Result<Vec<&Transition>, SchedulerError> {
        if self.transitions.len() < n {
            return Err(SchedulerError::InsufficientData {
                available: self.transitions.len(),
                requested: n,
            });
        }

        let batch: Vec<&Transition> = rand::seq::index::sample(rng, self.transitions.len(), n)
            .into_iter()
            .map(|i| &self.transitions[i])
            .collect();

        debug!(batch_size = n, occupancy = self.transitions.len(), "Sampled replay batch");
        Ok(batch)
    }

    /// Remove the most recently inserted transition
    ///
    /// Used to roll back an insertion whose learning step failed.
    pub fn discard_newest(&mut self) -> Option<Transition> {
        self.transitions.pop_front()
    }

    pub fn newest(&self) -> Option<&Transition> {
        self.transitions.front()
    }

    pub fn oldest(&self) -> Option<&Transition> {
        self.transitions.back()
    }

    /// Iterate from newest to oldest
    pub fn iter(&self) -> impl Iterator<Item = &Transition> {
        self.transitions.iter()
    }

    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for ReplayMemory {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
