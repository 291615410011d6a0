//! Common contract shared by the three movement strategies.

use rand::rngs::SmallRng;
use serde::{Deserialize, Serialize};
use swarmsim_index::UniformGridIndex;

use crate::flocking::FlockingStrategy;
use crate::foraging::{ForageMode, ForagingStrategy};
use crate::swarm::SwarmStrategy;
use crate::vec::Vec2;
use crate::{Agent, Algorithm, Obstacle, SimConfig, Tick};

/// Everything a strategy may read (and the RNG it may draw from) during one
/// tick. The index has already been rebuilt from `agents`.
pub struct StrategyContext<'a> {
    pub agents: &'a [Agent],
    pub config: &'a SimConfig,
    pub obstacles: &'a [Obstacle],
    pub index: &'a UniformGridIndex,
    /// Completed ticks so far (pre-advance).
    pub tick: Tick,
    /// Whether per-agent debug breakdowns should be produced.
    pub debug: bool,
    pub rng: &'a mut SmallRng,
}

/// The next population plus the optional introspection breakdown.
#[derive(Debug, Clone)]
pub struct StrategyOutput {
    pub agents: Vec<Agent>,
    pub debug: Option<Vec<AgentDebug>>,
}

/// Per-agent debug breakdown emitted when debug mode is enabled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentDebug {
    pub id: u32,
    pub detail: DebugDetail,
}

/// Strategy-specific force/decision breakdown.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", tag = "strategy")]
pub enum DebugDetail {
    Flocking {
        separation: Vec2,
        alignment: Vec2,
        cohesion: Vec2,
        obstacle: Vec2,
        neighbors: u32,
        speed: f32,
    },
    Foraging {
        mode: ForageMode,
        steer: Vec2,
        avoidance: Vec2,
        speed: f32,
    },
    Swarm {
        inertia: Vec2,
        cognitive: Vec2,
        social: Vec2,
        noise: Vec2,
        fitness: f32,
        personal_best: f32,
        target_distance: f32,
    },
}

/// Closed set of movement strategies behind one tick contract. Switching
/// variants discards all per-agent memory by construction.
#[derive(Debug)]
pub enum Strategy {
    Flocking(FlockingStrategy),
    Foraging(ForagingStrategy),
    Swarm(SwarmStrategy),
}

impl Strategy {
    /// Build a fresh strategy instance (empty per-agent memory) for the
    /// configured algorithm.
    #[must_use]
    pub fn for_config(config: &SimConfig, rng: &mut SmallRng) -> Self {
        match config.algorithm {
            Algorithm::Flocking => Self::Flocking(FlockingStrategy::new()),
            Algorithm::Foraging => Self::Foraging(ForagingStrategy::new(config)),
            Algorithm::Swarm => Self::Swarm(SwarmStrategy::new(config, rng)),
        }
    }

    /// The algorithm this instance implements.
    #[must_use]
    pub fn algorithm(&self) -> Algorithm {
        match self {
            Self::Flocking(_) => Algorithm::Flocking,
            Self::Foraging(_) => Algorithm::Foraging,
            Self::Swarm(_) => Algorithm::Swarm,
        }
    }

    /// Advance the population by one tick.
    pub fn tick(&mut self, ctx: StrategyContext<'_>) -> StrategyOutput {
        match self {
            Self::Flocking(strategy) => strategy.tick(ctx),
            Self::Foraging(strategy) => strategy.tick(ctx),
            Self::Swarm(strategy) => strategy.tick(ctx),
        }
    }
}

/// Classic steer-toward-desired: scale `desired` to max speed, subtract the
/// current velocity, clamp to max force. A zero desired vector steers nowhere.
#[must_use]
pub(crate) fn steer_toward(desired: Vec2, velocity: Vec2, max_speed: f32, max_force: f32) -> Vec2 {
    if desired.length_sq() <= f32::EPSILON {
        return Vec2::ZERO;
    }
    (desired.with_length(max_speed) - velocity).clamp_length(max_force)
}

/// Summed away-vectors from every obstacle whose influence boundary
/// (`radius + margin`) contains `position`, each scaled by
/// `max_speed * (1 - d / boundary)` so closer obstacles push harder.
#[must_use]
pub(crate) fn obstacle_push(
    position: Vec2,
    obstacles: &[Obstacle],
    margin: f32,
    max_speed: f32,
) -> Vec2 {
    let mut push = Vec2::ZERO;
    for obstacle in obstacles {
        let center = Vec2::new(obstacle.x, obstacle.y);
        let boundary = obstacle.radius + margin;
        let away = position - center;
        let distance = away.length();
        if distance >= boundary {
            continue;
        }
        let strength = max_speed * (1.0 - distance / boundary);
        if distance > f32::EPSILON {
            push += away.with_length(strength);
        } else {
            // agent sitting exactly on the center: push along +x rather than
            // producing a zero vector
            push += Vec2::new(strength, 0.0);
        }
    }
    push
}
