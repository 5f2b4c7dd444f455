//! Deep Q-learning core
//!
//! Replay memory, exploration schedule, the online/target value-function
//! pair and the agent that ties them together.

mod agent;
mod memory;
mod schedule;
mod value;

pub use agent::{
    seeded_rng, ActionChoice, Agent, AgentStats, Hyperparameters, LearnOutcome, LearningTarget,
};
pub use memory::{ReplayMemory, DEFAULT_CAPACITY};
pub use schedule::{
    ConstantSchedule, DecaySchedule, ExplorationSchedule, DEFAULT_EPSILON_DECAY,
    DEFAULT_EPSILON_FLOOR, DEFAULT_EPSILON_INITIAL,
};
pub use value::{LinearValueFunction, LinearWeights, ValueFunction, DEFAULT_LEARNING_RATE};
