//! Tick orchestration: owns the live population, obstacles, active strategy,
//! spatial index, and anomaly detector, and applies the external command
//! protocol between ticks.

use rand::{Rng, rngs::SmallRng};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use swarmsim_index::{NeighborhoodIndex, UniformGridIndex};

use crate::detector::AnomalyDetector;
use crate::strategy::{AgentDebug, Strategy, StrategyContext};
use crate::vec::Vec2;
use crate::{
    Agent, AgentState, ControlCommand, EngineEvent, Obstacle, Position, SimConfig, SimError, Tick,
    Velocity, random_heading,
};

/// Snapshot of one tick, emitted toward the boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TickSnapshot {
    pub agents: Vec<Agent>,
    pub tick: Tick,
    /// Present only while debug mode is enabled.
    pub debug: Option<Vec<AgentDebug>>,
}

/// Aggregate statistics for one completed tick, retained in a bounded
/// history ring.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TickSummary {
    pub tick: Tick,
    pub agent_count: usize,
    pub anomaly_count: usize,
    pub stuck_count: usize,
    pub average_speed: f32,
}

/// The simulation engine. All state is owned here and mutated only through
/// [`Simulation::apply_command`] and [`Simulation::step`]; the caller decides
/// lifetime and threading.
#[derive(Debug)]
pub struct Simulation {
    config: SimConfig,
    tick: Tick,
    running: bool,
    debug: bool,
    rng: SmallRng,
    agents: Vec<Agent>,
    obstacles: Vec<Obstacle>,
    strategy: Strategy,
    index: UniformGridIndex,
    detector: AnomalyDetector,
    history: VecDeque<TickSummary>,
}

impl Simulation {
    /// Build an engine from an init payload. An empty agent list spawns
    /// `config.agent_count` agents at random positions and velocities.
    pub fn new(
        config: SimConfig,
        agents: Vec<Agent>,
        obstacles: Vec<Obstacle>,
    ) -> Result<Self, SimError> {
        config.validate()?;
        let mut rng = config.seeded_rng();
        let strategy = Strategy::for_config(&config, &mut rng);
        let population = if agents.is_empty() {
            spawn_population(&config, &mut rng)
        } else {
            agents
        };
        let index = UniformGridIndex::new(config.neighbor_radius);
        let history_capacity = config.history_capacity;
        Ok(Self {
            config,
            tick: Tick::zero(),
            running: false,
            debug: false,
            rng,
            agents: population,
            obstacles,
            strategy,
            index,
            detector: AnomalyDetector::new(),
            history: VecDeque::with_capacity(history_capacity),
        })
    }

    /// Apply one boundary command, returning any events it produced.
    pub fn apply_command(&mut self, command: ControlCommand) -> Result<Vec<EngineEvent>, SimError> {
        match command {
            ControlCommand::Init {
                config,
                agents,
                obstacles,
            } => {
                *self = Self::new(config, agents, obstacles)?;
                Ok(vec![
                    EngineEvent::Ready,
                    EngineEvent::Tick(self.snapshot()),
                ])
            }
            ControlCommand::Reconfigure { patch } => {
                let next = self.config.merged(&patch);
                next.validate()?;
                // A different algorithm or neighbor radius invalidates the
                // strategy instance (and its per-agent memory) and the index
                // cell size.
                let rebuild = next.algorithm != self.config.algorithm
                    || next.neighbor_radius != self.config.neighbor_radius;
                self.config = next;
                if rebuild {
                    self.strategy = Strategy::for_config(&self.config, &mut self.rng);
                    self.index = UniformGridIndex::new(self.config.neighbor_radius);
                }
                Ok(Vec::new())
            }
            ControlCommand::SetObstacles { obstacles } => {
                self.obstacles = obstacles;
                Ok(Vec::new())
            }
            ControlCommand::SetDebug { enabled } => {
                self.debug = enabled;
                Ok(Vec::new())
            }
            ControlCommand::SetAgents { agents } => {
                // Rollback replaces the population only; detector histories
                // are intentionally left in place (see DESIGN.md).
                self.agents = agents;
                Ok(Vec::new())
            }
            ControlCommand::Play => {
                self.running = true;
                Ok(Vec::new())
            }
            ControlCommand::Pause => {
                self.running = false;
                Ok(Vec::new())
            }
            ControlCommand::Step => {
                let snapshot = self.step();
                Ok(vec![EngineEvent::Tick(snapshot)])
            }
            ControlCommand::Reset { config } => {
                config.validate()?;
                self.rng = config.seeded_rng();
                self.strategy = Strategy::for_config(&config, &mut self.rng);
                self.index = UniformGridIndex::new(config.neighbor_radius);
                self.agents = spawn_population(&config, &mut self.rng);
                self.config = config;
                self.detector.clear();
                self.history.clear();
                self.tick = Tick::zero();
                // obstacle list survives resets by policy
                Ok(Vec::new())
            }
        }
    }

    /// Execute one tick: reindex, strategize, detect anomalies, advance the
    /// counter, and return the snapshot.
    pub fn step(&mut self) -> TickSnapshot {
        let positions: Vec<(f32, f32)> = self
            .agents
            .iter()
            .map(|a| (a.position.x, a.position.y))
            .collect();
        // cell size was validated positive; rebuild cannot fail
        let _ = self.index.rebuild(&positions);

        let output = self.strategy.tick(StrategyContext {
            agents: &self.agents,
            config: &self.config,
            obstacles: &self.obstacles,
            index: &self.index,
            tick: self.tick,
            debug: self.debug,
            rng: &mut self.rng,
        });

        let mut next = output.agents;
        // anomaly flags override whatever state the strategy assigned
        self.detector.observe(&mut next);
        self.agents = next;
        self.tick = self.tick.next();
        self.record_summary();

        TickSnapshot {
            agents: self.agents.clone(),
            tick: self.tick,
            debug: output.debug,
        }
    }

    fn record_summary(&mut self) {
        if self.config.history_capacity == 0 {
            return;
        }
        let agent_count = self.agents.len();
        let mut anomaly_count = 0;
        let mut stuck_count = 0;
        let mut speed_sum = 0.0;
        for agent in &self.agents {
            match agent.state {
                AgentState::Anomaly => anomaly_count += 1,
                AgentState::Stuck => stuck_count += 1,
                AgentState::Active => {}
            }
            speed_sum += Vec2::from(agent.velocity).length();
        }
        let average_speed = if agent_count > 0 {
            speed_sum / agent_count as f32
        } else {
            0.0
        };
        if self.history.len() >= self.config.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(TickSummary {
            tick: self.tick,
            agent_count,
            anomaly_count,
            stuck_count,
            average_speed,
        });
    }

    /// Snapshot of the current population without stepping.
    #[must_use]
    pub fn snapshot(&self) -> TickSnapshot {
        TickSnapshot {
            agents: self.agents.clone(),
            tick: self.tick,
            debug: None,
        }
    }

    /// Returns an immutable reference to configuration.
    #[must_use]
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Current simulation tick.
    #[must_use]
    pub const fn tick(&self) -> Tick {
        self.tick
    }

    /// Whether the run loop should be stepping this engine.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.running
    }

    /// Whether debug breakdowns are being computed.
    #[must_use]
    pub const fn debug_enabled(&self) -> bool {
        self.debug
    }

    /// Read-only view of the live population.
    #[must_use]
    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    /// Read-only view of the obstacle list.
    #[must_use]
    pub fn obstacles(&self) -> &[Obstacle] {
        &self.obstacles
    }

    /// The active strategy instance.
    #[must_use]
    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    /// Iterate over retained tick summaries, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &TickSummary> {
        self.history.iter()
    }
}

fn spawn_population(config: &SimConfig, rng: &mut SmallRng) -> Vec<Agent> {
    (0..config.agent_count)
        .map(|id| {
            let heading = random_heading(rng);
            let speed = rng.random_range(0.0..config.max_speed * 0.5);
            let direction = Vec2::from_angle(heading) * speed;
            Agent {
                id,
                position: Position::new(
                    rng.random_range(0.0..config.world_width),
                    rng.random_range(0.0..config.world_height),
                ),
                velocity: Velocity::new(direction.x, direction.y),
                heading,
                state: AgentState::Active,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Algorithm, ConfigPatch};

    fn seeded_config(algorithm: Algorithm) -> SimConfig {
        SimConfig {
            algorithm,
            agent_count: 12,
            rng_seed: Some(5),
            ..SimConfig::default()
        }
    }

    fn engine(algorithm: Algorithm) -> Simulation {
        Simulation::new(seeded_config(algorithm), Vec::new(), Vec::new()).expect("engine")
    }

    #[test]
    fn spawns_dense_agent_ids_inside_the_world() {
        let sim = engine(Algorithm::Flocking);
        assert_eq!(sim.agents().len(), 12);
        for (expected, agent) in sim.agents().iter().enumerate() {
            assert_eq!(agent.id, expected as u32);
            assert!((0.0..sim.config().world_width).contains(&agent.position.x));
            assert!((0.0..sim.config().world_height).contains(&agent.position.y));
        }
    }

    #[test]
    fn step_advances_the_tick_and_replaces_the_population() {
        let mut sim = engine(Algorithm::Flocking);
        let before: Vec<Agent> = sim.agents().to_vec();
        let snapshot = sim.step();
        assert_eq!(snapshot.tick, Tick(1));
        assert_eq!(sim.tick(), Tick(1));
        assert_eq!(snapshot.agents.len(), before.len());
        assert_ne!(snapshot.agents, before, "population is replaced each tick");
    }

    #[test]
    fn init_command_emits_ready_then_snapshot() {
        let mut sim = engine(Algorithm::Flocking);
        sim.step();
        let events = sim
            .apply_command(ControlCommand::Init {
                config: seeded_config(Algorithm::Foraging),
                agents: Vec::new(),
                obstacles: Vec::new(),
            })
            .expect("init");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], EngineEvent::Ready);
        match &events[1] {
            EngineEvent::Tick(snapshot) => {
                assert_eq!(snapshot.tick, Tick::zero());
                assert_eq!(snapshot.agents.len(), 12);
            }
            other => panic!("expected tick snapshot, got {other:?}"),
        }
    }

    #[test]
    fn reset_respawns_and_preserves_obstacles() {
        let obstacles = vec![Obstacle::circle(0, 400.0, 300.0, 30.0)];
        let mut sim = Simulation::new(
            seeded_config(Algorithm::Flocking),
            Vec::new(),
            obstacles.clone(),
        )
        .expect("engine");
        for _ in 0..5 {
            sim.step();
        }
        let config = SimConfig {
            agent_count: 7,
            ..seeded_config(Algorithm::Flocking)
        };
        sim.apply_command(ControlCommand::Reset { config }).expect("reset");
        assert_eq!(sim.tick(), Tick::zero());
        assert_eq!(sim.agents().len(), 7);
        assert_eq!(sim.obstacles(), obstacles.as_slice());
        assert_eq!(sim.history().count(), 0);
    }

    #[test]
    fn reconfigure_merges_without_recreating_strategy() {
        let mut sim = engine(Algorithm::Foraging);
        sim.step();
        // populate foraging memory
        let populated = match sim.strategy() {
            Strategy::Foraging(strategy) => strategy.memory_len(),
            _ => unreachable!(),
        };
        assert!(populated > 0);

        let patch = ConfigPatch {
            max_speed: Some(4.5),
            ..ConfigPatch::default()
        };
        sim.apply_command(ControlCommand::Reconfigure { patch })
            .expect("reconfigure");
        assert_eq!(sim.config().max_speed, 4.5);
        match sim.strategy() {
            Strategy::Foraging(strategy) => {
                assert_eq!(strategy.memory_len(), populated, "memory survives");
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn algorithm_switch_discards_strategy_memory() {
        let mut sim = engine(Algorithm::Foraging);
        sim.step();
        let patch = ConfigPatch {
            algorithm: Some(Algorithm::Swarm),
            ..ConfigPatch::default()
        };
        sim.apply_command(ControlCommand::Reconfigure { patch })
            .expect("switch");
        match sim.strategy() {
            Strategy::Swarm(strategy) => assert_eq!(strategy.memory_len(), 0),
            other => panic!("expected swarm strategy, got {other:?}"),
        }
    }

    #[test]
    fn neighbor_radius_change_recreates_strategy() {
        let mut sim = engine(Algorithm::Foraging);
        sim.step();
        let patch = ConfigPatch {
            neighbor_radius: Some(90.0),
            ..ConfigPatch::default()
        };
        sim.apply_command(ControlCommand::Reconfigure { patch })
            .expect("reconfigure");
        match sim.strategy() {
            Strategy::Foraging(strategy) => assert_eq!(strategy.memory_len(), 0),
            _ => unreachable!(),
        }
    }

    #[test]
    fn play_pause_toggle_running_flag() {
        let mut sim = engine(Algorithm::Flocking);
        assert!(!sim.is_running());
        sim.apply_command(ControlCommand::Play).expect("play");
        assert!(sim.is_running());
        sim.apply_command(ControlCommand::Pause).expect("pause");
        assert!(!sim.is_running());
    }

    #[test]
    fn step_command_ticks_once_while_paused() {
        let mut sim = engine(Algorithm::Flocking);
        let events = sim.apply_command(ControlCommand::Step).expect("step");
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], EngineEvent::Tick(s) if s.tick == Tick(1)));
        assert!(!sim.is_running());
    }

    #[test]
    fn debug_flag_gates_breakdown_emission() {
        let mut sim = engine(Algorithm::Flocking);
        let snapshot = sim.step();
        assert!(snapshot.debug.is_none());
        sim.apply_command(ControlCommand::SetDebug { enabled: true })
            .expect("debug on");
        let snapshot = sim.step();
        let debug = snapshot.debug.expect("debug breakdown");
        assert_eq!(debug.len(), sim.agents().len());
    }

    #[test]
    fn set_agents_replaces_population_but_keeps_histories() {
        let mut sim = engine(Algorithm::Flocking);
        for _ in 0..10 {
            sim.step();
        }
        let rollback: Vec<Agent> = (0..12).map(|id| Agent::at(id, 50.0, 50.0)).collect();
        sim.apply_command(ControlCommand::SetAgents {
            agents: rollback.clone(),
        })
        .expect("rollback");
        assert_eq!(sim.agents(), rollback.as_slice());
        // tick counter is not rewound by a population replacement
        assert_eq!(sim.tick(), Tick(10));
    }

    #[test]
    fn history_ring_is_bounded() {
        let config = SimConfig {
            history_capacity: 4,
            ..seeded_config(Algorithm::Flocking)
        };
        let mut sim = Simulation::new(config, Vec::new(), Vec::new()).expect("engine");
        for _ in 0..10 {
            sim.step();
        }
        assert_eq!(sim.history().count(), 4);
        let first = sim.history().next().expect("summary");
        assert_eq!(first.tick, Tick(7));
    }

    #[test]
    fn invalid_reconfigure_is_rejected_and_leaves_config_intact() {
        let mut sim = engine(Algorithm::Flocking);
        let patch = ConfigPatch {
            max_speed: Some(-1.0),
            ..ConfigPatch::default()
        };
        let err = sim
            .apply_command(ControlCommand::Reconfigure { patch })
            .expect_err("negative max_speed");
        assert!(matches!(err, SimError::InvalidConfig(_)));
        assert_eq!(sim.config().max_speed, SimConfig::default().max_speed);
    }
}
