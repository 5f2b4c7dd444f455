//! DQN agent: exploration, experience storage and the learning step

use super::memory::{ReplayMemory, DEFAULT_CAPACITY};
use super::schedule::ExplorationSchedule;
use super::value::ValueFunction;
use crate::error::{ModelError, SchedulerError};
use crate::models::{ClusterState, Transition};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// How learning targets are computed for a sampled transition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearningTarget {
    /// Target is the observed reward alone
    #[default]
    Immediate,
    /// Target is `reward + gamma * max(target_net(next_state))`
    Bootstrapped,
}

/// Hyperparameters, fixed once the agent is constructed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hyperparameters {
    /// Discount factor in [0, 1]; only read by bootstrapped targets
    pub gamma: f32,
    /// Learning steps between target-network syncs
    pub target_sync_interval: u64,
    /// Replay memory capacity
    pub capacity: usize,
    /// Transitions per learning step
    pub batch_size: usize,
    pub learning_target: LearningTarget,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self {
            gamma: 0.95,
            target_sync_interval: 100,
            capacity: DEFAULT_CAPACITY,
            batch_size: 20,
            learning_target: LearningTarget::Immediate,
        }
    }
}

impl Hyperparameters {
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(SchedulerError::InvalidConfig(format!(
                "gamma must be within [0, 1], got {}",
                self.gamma
            )));
        }
        if self.target_sync_interval == 0 {
            return Err(SchedulerError::InvalidConfig(
                "target_sync_interval must be at least 1".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(SchedulerError::InvalidConfig(
                "batch_size must be at least 1".to_string(),
            ));
        }
        if self.capacity < self.batch_size {
            return Err(SchedulerError::InvalidConfig(format!(
                "capacity {} is smaller than batch_size {}",
                self.capacity, self.batch_size
            )));
        }
        Ok(())
    }
}

/// Result of an epsilon draw
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionChoice {
    /// Use this uniformly drawn candidate index
    Explore(usize),
    /// Defer to the caller's ranking of predicted values
    Exploit,
}

/// Result of a learning step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LearnOutcome {
    /// Not enough experience yet; nothing changed
    Skipped { available: usize, required: usize },
    Trained { step: u64, target_synced: bool },
}

/// Read-only view of the agent's runtime state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStats {
    pub epsilon: f64,
    pub steps: u64,
    pub memory_len: usize,
    pub memory_capacity: usize,
    pub batch_size: usize,
    pub target_sync_interval: u64,
    pub online_version: u64,
    pub target_version: u64,
    pub learning_target: LearningTarget,
}

/// Build the agent's random source, seeded once for its whole lifetime
pub fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

/// DQN agent owning replay memory and the online/target value functions
///
/// Not internally synchronized: callers wrap it in a lock so that
/// remember, learn and target syncs never interleave.
pub struct Agent<V: ValueFunction> {
    hyperparameters: Hyperparameters,
    schedule: Box<dyn ExplorationSchedule>,
    epsilon: f64,
    steps: u64,
    memory: ReplayMemory,
    online: V,
    target: V,
    rng: StdRng,
}

impl<V: ValueFunction> Agent<V> {
    /// Create an agent; the target network starts as a copy of the online one
    pub fn new(
        hyperparameters: Hyperparameters,
        schedule: Box<dyn ExplorationSchedule>,
        online: V,
        mut target: V,
        rng: StdRng,
    ) -> Result<Self, SchedulerError> {
        hyperparameters.validate()?;
        target.copy_weights_from(&online);
        let epsilon = schedule.initial();

        Ok(Self {
            memory: ReplayMemory::new(hyperparameters.capacity),
            hyperparameters,
            schedule,
            epsilon,
            steps: 0,
            online,
            target,
            rng,
        })
    }

    /// Per-node value estimate from the online network
    pub fn predict(&self, state: &ClusterState) -> Result<Vec<f32>, SchedulerError> {
        self.online.predict(state).map_err(SchedulerError::Prediction)
    }

    /// Epsilon-greedy draw over `candidate_count` candidates
    ///
    /// The agent never argmaxes itself; on `Exploit` the caller ranks its own
    /// (possibly constrained) candidate list.
    pub fn choose_action(&mut self, candidate_count: usize) -> ActionChoice {
        if candidate_count == 0 {
            return ActionChoice::Exploit;
        }
        let roll: f64 = self.rng.random();
        if roll < self.epsilon {
            ActionChoice::Explore(self.rng.random_range(0..candidate_count))
        } else {
            ActionChoice::Exploit
        }
    }

    /// Store a completed transition
    pub fn remember(&mut self, transition: Transition) {
        self.memory.insert(transition);
    }

    /// Drop the most recently remembered transition
    pub fn forget_newest(&mut self) -> Option<Transition> {
        self.memory.discard_newest()
    }

    /// Run one learning step
    ///
    /// Skips (successfully) while memory holds fewer than `batch_size`
    /// transitions. On failure the online weights and step counter are
    /// unchanged.
    pub fn learn(&mut self) -> Result<LearnOutcome, SchedulerError> {
        let available = self.memory.len();
        let required = self.hyperparameters.batch_size;
        if available < required {
            debug!(available, required, "Skipping learning step, not enough experience");
            return Ok(LearnOutcome::Skipped {
                available,
                required,
            });
        }

        let batch = self.memory.sample(required, &mut self.rng)?;
        let gamma = self.hyperparameters.gamma;

        let mut states = Vec::with_capacity(batch.len());
        let mut targets = Vec::with_capacity(batch.len());
        for transition in batch {
            let q_update = match self.hyperparameters.learning_target {
                LearningTarget::Immediate => transition.reward as f32,
                LearningTarget::Bootstrapped => {
                    let next = self
                        .target
                        .predict(&transition.next_state)
                        .map_err(SchedulerError::Fit)?;
                    let next_max = next.iter().copied().fold(f32::NEG_INFINITY, f32::max);
                    transition.reward as f32 + gamma * next_max
                }
            };

            let mut q_values = self
                .online
                .predict(&transition.state)
                .map_err(SchedulerError::Fit)?;
            let width = q_values.len();
            let slot = q_values.get_mut(transition.action).ok_or(SchedulerError::Fit(
                ModelError::ActionOutOfRange {
                    action: transition.action,
                    width,
                },
            ))?;
            *slot = q_update;

            states.push(&transition.state);
            targets.push(q_values);
        }

        self.online
            .fit_batch(&states, &targets)
            .map_err(SchedulerError::Fit)?;

        self.steps += 1;
        self.epsilon = self.schedule.value();

        let target_synced = self.steps % self.hyperparameters.target_sync_interval == 0;
        if target_synced {
            debug!(
                steps = self.steps,
                interval = self.hyperparameters.target_sync_interval,
                "Syncing target network"
            );
            self.target.copy_weights_from(&self.online);
        }

        Ok(LearnOutcome::Trained {
            step: self.steps,
            target_synced,
        })
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn memory(&self) -> &ReplayMemory {
        &self.memory
    }

    pub fn online(&self) -> &V {
        &self.online
    }

    pub fn target(&self) -> &V {
        &self.target
    }

    pub fn hyperparameters(&self) -> &Hyperparameters {
        &self.hyperparameters
    }

    pub fn stats(&self) -> AgentStats {
        AgentStats {
            epsilon: self.epsilon,
            steps: self.steps,
            memory_len: self.memory.len(),
            memory_capacity: self.memory.capacity(),
            batch_size: self.hyperparameters.batch_size,
            target_sync_interval: self.hyperparameters.target_sync_interval,
            online_version: self.online.version(),
            target_version: self.target.version(),
            learning_target: self.hyperparameters.learning_target,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dqn::schedule::{ConstantSchedule, DecaySchedule};
    use crate::dqn::value::{LinearValueFunction, LinearWeights};
    use crate::models::NodeFeatures;

    fn state(seed: f64) -> ClusterState {
        ClusterState::new(
            (0..3)
                .map(|i| {
                    let used = seed + i as f64;
                    (
                        format!("node{}", i),
                        NodeFeatures {
                            cpu_used: used,
                            cpu_free: 10.0 - used,
                            memory_used: 2.0 * used,
                            memory_free: 20.0,
                            ..Default::default()
                        },
                    )
                })
                .collect(),
        )
    }

    fn transition(i: usize) -> Transition {
        Transition::new(
            state(i as f64 * 0.5),
            i % 3,
            if i % 2 == 0 { 1.0 } else { -0.5 },
            state(i as f64 * 0.5 + 0.25),
        )
    }

    fn agent(hyperparameters: Hyperparameters, epsilon: f64) -> Agent<LinearValueFunction> {
        Agent::new(
            hyperparameters,
            Box::new(ConstantSchedule(epsilon)),
            LinearValueFunction::new(0.05),
            LinearValueFunction::new(0.05),
            seeded_rng(Some(11)),
        )
        .unwrap()
    }

    fn small_batch(interval: u64) -> Hyperparameters {
        Hyperparameters {
            batch_size: 4,
            capacity: 50,
            target_sync_interval: interval,
            ..Default::default()
        }
    }

    #[test]
    fn test_hyperparameter_validation() {
        assert!(Hyperparameters::default().validate().is_ok());

        let bad_gamma = Hyperparameters {
            gamma: 1.5,
            ..Default::default()
        };
        assert!(matches!(
            bad_gamma.validate(),
            Err(SchedulerError::InvalidConfig(_))
        ));

        let bad_interval = Hyperparameters {
            target_sync_interval: 0,
            ..Default::default()
        };
        assert!(bad_interval.validate().is_err());

        let bad_capacity = Hyperparameters {
            capacity: 5,
            batch_size: 10,
            ..Default::default()
        };
        assert!(bad_capacity.validate().is_err());
    }

    #[test]
    fn test_learn_skips_below_batch_size() {
        let mut agent = agent(small_batch(2), 0.5);
        for i in 0..3 {
            agent.remember(transition(i));
        }

        let outcome = agent.learn().unwrap();
        assert_eq!(
            outcome,
            LearnOutcome::Skipped {
                available: 3,
                required: 4
            }
        );
        assert_eq!(agent.steps(), 0);
        assert_eq!(agent.online().version(), 0);
    }

    #[test]
    fn test_learn_updates_online_not_target() {
        let mut agent = agent(small_batch(5), 0.5);
        for i in 0..4 {
            agent.remember(transition(i));
        }

        let outcome = agent.learn().unwrap();
        assert_eq!(
            outcome,
            LearnOutcome::Trained {
                step: 1,
                target_synced: false
            }
        );
        assert_eq!(agent.online().version(), 1);
        assert_eq!(agent.target().version(), 0);
        assert_ne!(agent.online().weights(), agent.target().weights());
    }

    #[test]
    fn test_target_sync_every_interval() {
        let interval = 3;
        let mut agent = agent(small_batch(interval), 0.5);
        for i in 0..12 {
            agent.remember(transition(i));
        }

        let mut syncs = 0;
        for step in 1..=9u64 {
            let outcome = agent.learn().unwrap();
            let synced = matches!(
                outcome,
                LearnOutcome::Trained {
                    target_synced: true,
                    ..
                }
            );
            assert_eq!(synced, step % interval == 0, "step {}", step);
            if synced {
                syncs += 1;
                assert_eq!(agent.online().weights(), agent.target().weights());
                assert_eq!(agent.online().version(), agent.target().version());
            } else {
                assert_ne!(agent.online().weights(), agent.target().weights());
            }
        }
        assert_eq!(syncs, 3);
    }

    #[test]
    fn test_epsilon_refreshed_after_learning() {
        let mut agent = Agent::new(
            small_batch(10),
            Box::new(DecaySchedule::new(1.0, 0.1, 0.5)),
            LinearValueFunction::default(),
            LinearValueFunction::default(),
            seeded_rng(Some(1)),
        )
        .unwrap();
        assert_eq!(agent.epsilon(), 1.0);

        // Skipped steps do not advance the schedule
        agent.learn().unwrap();
        assert_eq!(agent.epsilon(), 1.0);

        for i in 0..4 {
            agent.remember(transition(i));
        }
        agent.learn().unwrap();
        assert_eq!(agent.epsilon(), 0.5);
        agent.learn().unwrap();
        assert_eq!(agent.epsilon(), 0.25);
    }

    #[test]
    fn test_choose_action_full_exploration() {
        let mut agent = agent(small_batch(2), 1.0);
        for _ in 0..100 {
            match agent.choose_action(3) {
                ActionChoice::Explore(i) => assert!(i < 3),
                ActionChoice::Exploit => panic!("epsilon 1.0 must always explore"),
            }
        }
    }

    #[test]
    fn test_choose_action_matches_seeded_draw() {
        let mut agent = agent(small_batch(2), 1.0);
        let mut rng = seeded_rng(Some(11));
        let _roll: f64 = rng.random();
        let expected = rng.random_range(0..3);

        assert_eq!(agent.choose_action(3), ActionChoice::Explore(expected));
    }

    #[test]
    fn test_choose_action_pure_exploitation() {
        let mut agent = agent(small_batch(2), 0.0);
        for _ in 0..100 {
            assert_eq!(agent.choose_action(3), ActionChoice::Exploit);
        }
        assert_eq!(agent.choose_action(0), ActionChoice::Exploit);
    }

    #[test]
    fn test_action_out_of_range_fails_fit() {
        let mut agent = agent(small_batch(2), 0.5);
        for _ in 0..4 {
            agent.remember(Transition::new(state(0.0), 7, 1.0, state(1.0)));
        }

        let err = agent.learn().unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::Fit(ModelError::ActionOutOfRange {
                action: 7,
                width: 3
            })
        ));
        assert_eq!(agent.steps(), 0);
        assert_eq!(agent.online().version(), 0);
    }

    #[test]
    fn test_bootstrapped_target_uses_target_network() {
        let biased = LinearWeights {
            bias: 1.0,
            ..Default::default()
        };
        let build = |learning_target| {
            Agent::new(
                Hyperparameters {
                    gamma: 0.9,
                    learning_target,
                    ..small_batch(100)
                },
                Box::new(ConstantSchedule(0.0)),
                LinearValueFunction::with_weights(biased, 0.05),
                LinearValueFunction::new(0.05),
                seeded_rng(Some(5)),
            )
            .unwrap()
        };

        let mut immediate = build(LearningTarget::Immediate);
        let mut bootstrapped = build(LearningTarget::Bootstrapped);
        for _ in 0..4 {
            let t = Transition::new(state(0.0), 1, 0.0, state(1.0));
            immediate.remember(t.clone());
            bootstrapped.remember(t);
        }

        immediate.learn().unwrap();
        bootstrapped.learn().unwrap();

        // Immediate pulls toward 0, bootstrapped toward 0.9
        assert!(bootstrapped.online().weights().bias > immediate.online().weights().bias);
    }

    #[test]
    fn test_forget_newest() {
        let mut agent = agent(small_batch(2), 0.5);
        agent.remember(transition(0));
        agent.remember(transition(1));

        let forgotten = agent.forget_newest().unwrap();
        assert_eq!(forgotten, transition(1));
        assert_eq!(agent.memory().len(), 1);
    }

    #[test]
    fn test_stats() {
        let agent = agent(small_batch(2), 0.25);
        let stats = agent.stats();
        assert_eq!(stats.epsilon, 0.25);
        assert_eq!(stats.steps, 0);
        assert_eq!(stats.memory_capacity, 50);
        assert_eq!(stats.batch_size, 4);
        assert_eq!(stats.learning_target, LearningTarget::Immediate);
    }
}
