//! Core types and tick engine shared across the swarmsim workspace.
//!
//! A population of point agents is advanced one discrete tick at a time by a
//! pluggable movement strategy (flocking, pheromone foraging, or swarm
//! optimization) over a uniform-grid spatial index, with a sliding-window
//! detector flagging agents that have stopped making progress.

use rand::{Rng, SeedableRng, rngs::SmallRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod detector;
pub mod engine;
pub mod field;
pub mod flocking;
pub mod foraging;
pub mod strategy;
pub mod swarm;
pub mod vec;

pub use detector::AnomalyDetector;
pub use engine::{Simulation, TickSnapshot, TickSummary};
pub use field::PheromoneField;
pub use flocking::FlockingStrategy;
pub use foraging::{FoodSource, ForageMode, ForagerMemory, ForagingStrategy};
pub use strategy::{AgentDebug, DebugDetail, Strategy, StrategyContext, StrategyOutput};
pub use swarm::{ParticleMemory, SwarmStrategy, SwarmTarget};
pub use vec::Vec2;

/// Errors surfaced by the simulation engine.
#[derive(Debug, Error)]
pub enum SimError {
    /// Configuration values the engine cannot run with.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

/// Monotonic tick counter; counts completed simulation steps.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
pub struct Tick(pub u64);

impl Tick {
    /// Returns the next sequential tick.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Resets the tick counter back to zero.
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }
}

/// Axis-aligned 2D position.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    /// Construct a new position.
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

impl From<Position> for Vec2 {
    fn from(value: Position) -> Self {
        Self::new(value.x, value.y)
    }
}

/// World-space velocity.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Velocity {
    pub vx: f32,
    pub vy: f32,
}

impl Velocity {
    /// Construct a new velocity vector.
    #[must_use]
    pub const fn new(vx: f32, vy: f32) -> Self {
        Self { vx, vy }
    }
}

impl From<Velocity> for Vec2 {
    fn from(value: Velocity) -> Self {
        Self::new(value.vx, value.vy)
    }
}

/// Presentation state attached to each agent in a tick snapshot.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    #[default]
    Active,
    Stuck,
    Anomaly,
}

/// A point agent. Populations are replaced wholesale each tick; ids are dense
/// in `0..agent_count` and reassigned on every reset.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Agent {
    pub id: u32,
    pub position: Position,
    pub velocity: Velocity,
    pub heading: f32,
    pub state: AgentState,
}

impl Agent {
    /// Creates a stationary agent at the given position.
    #[must_use]
    pub const fn at(id: u32, x: f32, y: f32) -> Self {
        Self {
            id,
            position: Position::new(x, y),
            velocity: Velocity::new(0.0, 0.0),
            heading: 0.0,
            state: AgentState::Active,
        }
    }
}

/// Obstacle footprint used for avoidance steering.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ObstacleShape {
    Circle,
    Rect { width: f32, height: f32 },
}

/// A static obstacle. Owned by the boundary; the engine only reads it, and it
/// survives resets by policy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Obstacle {
    pub id: u32,
    pub x: f32,
    pub y: f32,
    pub radius: f32,
    pub shape: ObstacleShape,
}

impl Obstacle {
    /// Circular obstacle at the given center.
    #[must_use]
    pub const fn circle(id: u32, x: f32, y: f32, radius: f32) -> Self {
        Self {
            id,
            x,
            y,
            radius,
            shape: ObstacleShape::Circle,
        }
    }
}

/// Movement strategy selector.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    #[default]
    Flocking,
    Foraging,
    Swarm,
}

/// Engine configuration; immutable for the duration of one tick.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimConfig {
    /// Active movement strategy.
    pub algorithm: Algorithm,
    /// Number of agents spawned on init/reset.
    pub agent_count: u32,
    /// World width in world units.
    pub world_width: f32,
    /// World height in world units.
    pub world_height: f32,
    /// Upper bound on agent speed (strategies may cap below this).
    pub max_speed: f32,
    /// Upper bound on steering force magnitude.
    pub max_force: f32,
    /// Radius used for neighbor queries; also the spatial index cell size.
    pub neighbor_radius: f32,
    /// Radius inside which flocking separation applies.
    pub separation_radius: f32,
    /// Flocking separation weight.
    pub separation_weight: f32,
    /// Flocking alignment weight.
    pub alignment_weight: f32,
    /// Flocking cohesion weight.
    pub cohesion_weight: f32,
    /// Scale factor applied when integrating velocity into position.
    pub speed_multiplier: f32,
    /// Edge length of one pheromone cell, fixed at engine init.
    pub pheromone_cell_size: f32,
    /// Maximum number of recent tick summaries retained in-memory.
    pub history_capacity: usize,
    /// Optional RNG seed for deterministic test runs.
    pub rng_seed: Option<u64>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::Flocking,
            agent_count: 120,
            world_width: 1_200.0,
            world_height: 800.0,
            max_speed: 3.0,
            max_force: 0.18,
            neighbor_radius: 60.0,
            separation_radius: 28.0,
            separation_weight: 1.5,
            alignment_weight: 1.0,
            cohesion_weight: 1.0,
            speed_multiplier: 1.0,
            pheromone_cell_size: 16.0,
            history_capacity: 256,
            rng_seed: None,
        }
    }
}

impl SimConfig {
    /// Validates the configuration before the engine accepts it.
    pub fn validate(&self) -> Result<(), SimError> {
        if self.world_width <= 0.0 || self.world_height <= 0.0 {
            return Err(SimError::InvalidConfig("world dimensions must be positive"));
        }
        if self.agent_count == 0 {
            return Err(SimError::InvalidConfig("agent_count must be non-zero"));
        }
        if self.max_speed <= 0.0 {
            return Err(SimError::InvalidConfig("max_speed must be positive"));
        }
        if self.max_force <= 0.0 {
            return Err(SimError::InvalidConfig("max_force must be positive"));
        }
        if self.neighbor_radius <= 0.0 {
            return Err(SimError::InvalidConfig("neighbor_radius must be positive"));
        }
        if self.separation_radius <= 0.0 {
            return Err(SimError::InvalidConfig(
                "separation_radius must be positive",
            ));
        }
        if self.speed_multiplier <= 0.0 {
            return Err(SimError::InvalidConfig("speed_multiplier must be positive"));
        }
        if self.pheromone_cell_size <= 0.0 {
            return Err(SimError::InvalidConfig(
                "pheromone_cell_size must be positive",
            ));
        }
        Ok(())
    }

    /// Returns the configured RNG, seeding from entropy when no seed is set.
    #[must_use]
    pub fn seeded_rng(&self) -> SmallRng {
        match self.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => {
                let seed: u64 = rand::random();
                SmallRng::seed_from_u64(seed)
            }
        }
    }

    /// Merge a partial update; fields absent from the patch keep their value.
    #[must_use]
    pub fn merged(&self, patch: &ConfigPatch) -> Self {
        let mut next = self.clone();
        if let Some(algorithm) = patch.algorithm {
            next.algorithm = algorithm;
        }
        if let Some(agent_count) = patch.agent_count {
            next.agent_count = agent_count;
        }
        if let Some(world_width) = patch.world_width {
            next.world_width = world_width;
        }
        if let Some(world_height) = patch.world_height {
            next.world_height = world_height;
        }
        if let Some(max_speed) = patch.max_speed {
            next.max_speed = max_speed;
        }
        if let Some(max_force) = patch.max_force {
            next.max_force = max_force;
        }
        if let Some(neighbor_radius) = patch.neighbor_radius {
            next.neighbor_radius = neighbor_radius;
        }
        if let Some(separation_radius) = patch.separation_radius {
            next.separation_radius = separation_radius;
        }
        if let Some(separation_weight) = patch.separation_weight {
            next.separation_weight = separation_weight;
        }
        if let Some(alignment_weight) = patch.alignment_weight {
            next.alignment_weight = alignment_weight;
        }
        if let Some(cohesion_weight) = patch.cohesion_weight {
            next.cohesion_weight = cohesion_weight;
        }
        if let Some(speed_multiplier) = patch.speed_multiplier {
            next.speed_multiplier = speed_multiplier;
        }
        if let Some(history_capacity) = patch.history_capacity {
            next.history_capacity = history_capacity;
        }
        next
    }
}

/// Field-wise partial configuration update; `None` fields retain the prior
/// value. The pheromone cell size and RNG seed are fixed at engine init and
/// deliberately absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConfigPatch {
    pub algorithm: Option<Algorithm>,
    pub agent_count: Option<u32>,
    pub world_width: Option<f32>,
    pub world_height: Option<f32>,
    pub max_speed: Option<f32>,
    pub max_force: Option<f32>,
    pub neighbor_radius: Option<f32>,
    pub separation_radius: Option<f32>,
    pub separation_weight: Option<f32>,
    pub alignment_weight: Option<f32>,
    pub cohesion_weight: Option<f32>,
    pub speed_multiplier: Option<f32>,
    pub history_capacity: Option<usize>,
}

/// Commands accepted by the engine; applied between ticks, never mid-tick.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", tag = "command")]
pub enum ControlCommand {
    /// Start a fresh simulation. An empty agent list spawns
    /// `config.agent_count` agents at random positions.
    Init {
        config: SimConfig,
        agents: Vec<Agent>,
        obstacles: Vec<Obstacle>,
    },
    /// Merge a partial configuration update.
    Reconfigure { patch: ConfigPatch },
    /// Replace the obstacle list wholesale.
    SetObstacles { obstacles: Vec<Obstacle> },
    /// Toggle per-tick debug breakdown computation.
    SetDebug { enabled: bool },
    /// Replace the population wholesale (history rollback).
    SetAgents { agents: Vec<Agent> },
    Play,
    Pause,
    /// Execute exactly one tick, independent of the run loop.
    Step,
    /// Re-spawn a fresh population, clearing all per-agent state while
    /// preserving the obstacle list.
    Reset { config: SimConfig },
}

/// Events emitted by the engine toward the boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum EngineEvent {
    /// Emitted once after `Init` completes, before the first tick snapshot.
    Ready,
    /// Snapshot of the population after a tick (or immediately after init).
    Tick(TickSnapshot),
}

pub(crate) fn random_heading(rng: &mut SmallRng) -> f32 {
    rng.random_range(0.0..std::f32::consts::TAU)
}
