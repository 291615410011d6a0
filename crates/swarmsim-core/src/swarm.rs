//! PSO-style swarm optimization over a set of moving targets.

use rand::{Rng, rngs::SmallRng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::strategy::{AgentDebug, DebugDetail, StrategyContext, StrategyOutput, obstacle_push};
use crate::vec::Vec2;
use crate::{Agent, AgentState, Position, SimConfig, Velocity, random_heading};

/// Number of moving targets.
const TARGET_COUNT: usize = 3;
/// Ticks between target teleports.
const TELEPORT_INTERVAL: u64 = 120;
/// Velocity retained from the previous tick.
const INERTIA: f32 = 0.75;
/// Pull toward the personal best, before the random factor.
const COGNITIVE_GAIN: f32 = 0.015;
/// Pull toward the nearest target, before the random factor.
const SOCIAL_GAIN: f32 = 0.02;
/// Per-axis uniform noise amplitude.
const NOISE_AMPLITUDE: f32 = 0.6;
/// Influence margin added to an obstacle's radius for avoidance.
const OBSTACLE_MARGIN: f32 = 40.0;
/// Distance to the nearest target below which a particle counts as converged.
const CONVERGED_RADIUS: f32 = 35.0;
/// Speed range assigned to fresh target velocities.
const TARGET_SPEED_MIN: f32 = 0.8;
const TARGET_SPEED_MAX: f32 = 2.2;

/// A moving point the swarm seeks; bounces elastically off world edges.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SwarmTarget {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
}

/// Private per-particle memory: best position seen and its fitness.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ParticleMemory {
    pub best_x: f32,
    pub best_y: f32,
    pub best_fitness: f32,
}

/// Swarm optimization strategy. Owns the targets, all particle memory, and
/// the process-wide best fitness (bookkeeping only).
#[derive(Debug)]
pub struct SwarmStrategy {
    targets: Vec<SwarmTarget>,
    memory: HashMap<u32, ParticleMemory>,
    global_best: f32,
}

impl SwarmStrategy {
    /// Spawn `TARGET_COUNT` targets at random interior positions with random
    /// velocities.
    #[must_use]
    pub fn new(config: &SimConfig, rng: &mut SmallRng) -> Self {
        let targets = (0..TARGET_COUNT)
            .map(|_| random_target(config, rng))
            .collect();
        Self {
            targets,
            memory: HashMap::new(),
            global_best: f32::INFINITY,
        }
    }

    /// Current target positions.
    #[must_use]
    pub fn targets(&self) -> &[SwarmTarget] {
        &self.targets
    }

    /// Best fitness seen since the last teleport ([`f32::INFINITY`] when
    /// none).
    #[must_use]
    pub fn global_best(&self) -> f32 {
        self.global_best
    }

    /// Memory for one particle, if it has been seen.
    #[must_use]
    pub fn memory(&self, id: u32) -> Option<&ParticleMemory> {
        self.memory.get(&id)
    }

    /// Number of particles with allocated memory.
    #[must_use]
    pub fn memory_len(&self) -> usize {
        self.memory.len()
    }

    pub fn tick(&mut self, ctx: StrategyContext<'_>) -> StrategyOutput {
        let StrategyContext {
            agents,
            config,
            obstacles,
            tick,
            debug,
            rng,
            ..
        } = ctx;

        for target in &mut self.targets {
            advance_target(target, config);
        }

        // Periodic shake-up: teleport one target and force the whole swarm
        // to re-explore from scratch.
        if tick.0 > 0 && tick.0.is_multiple_of(TELEPORT_INTERVAL) {
            let victim = ((tick.0 / TELEPORT_INTERVAL) % self.targets.len() as u64) as usize;
            self.targets[victim] = random_target(config, rng);
            self.memory.clear();
            self.global_best = f32::INFINITY;
        }

        let mut next = Vec::with_capacity(agents.len());
        let mut breakdowns = debug.then(|| Vec::with_capacity(agents.len()));

        for agent in agents {
            let position = Vec2::from(agent.position);
            let velocity = Vec2::from(agent.velocity);

            let (nearest, target_distance) = nearest_target(&self.targets, position);
            let fitness = target_distance;

            let memory = self
                .memory
                .entry(agent.id)
                .or_insert_with(|| ParticleMemory {
                    best_x: position.x,
                    best_y: position.y,
                    best_fitness: fitness,
                });
            if fitness < memory.best_fitness {
                memory.best_x = position.x;
                memory.best_y = position.y;
                memory.best_fitness = fitness;
            }
            if fitness < self.global_best {
                self.global_best = fitness;
            }

            let inertia = velocity * INERTIA;
            let r1: f32 = rng.random();
            let r2: f32 = rng.random();
            let cognitive =
                (Vec2::new(memory.best_x, memory.best_y) - position) * (COGNITIVE_GAIN * r1);
            let social = (nearest - position) * (SOCIAL_GAIN * r2);
            let noise = Vec2::new(
                rng.random_range(-NOISE_AMPLITUDE..NOISE_AMPLITUDE),
                rng.random_range(-NOISE_AMPLITUDE..NOISE_AMPLITUDE),
            );
            let avoidance = obstacle_push(position, obstacles, OBSTACLE_MARGIN, config.max_speed);

            let mut new_velocity =
                (inertia + cognitive + social + noise + avoidance).clamp_length(config.max_speed);
            let mut new_position = position + new_velocity * config.speed_multiplier;

            // Elastic bounce: flip the violated axis, hold the position at
            // the boundary.
            if new_position.x < 0.0 {
                new_position.x = 0.0;
                new_velocity.x = -new_velocity.x;
            } else if new_position.x > config.world_width {
                new_position.x = config.world_width;
                new_velocity.x = -new_velocity.x;
            }
            if new_position.y < 0.0 {
                new_position.y = 0.0;
                new_velocity.y = -new_velocity.y;
            } else if new_position.y > config.world_height {
                new_position.y = config.world_height;
                new_velocity.y = -new_velocity.y;
            }

            let heading = if new_velocity.length_sq() > f32::EPSILON {
                new_velocity.heading()
            } else {
                agent.heading
            };

            let state = if target_distance < CONVERGED_RADIUS {
                AgentState::Stuck
            } else {
                AgentState::Active
            };

            if let Some(out) = breakdowns.as_mut() {
                out.push(AgentDebug {
                    id: agent.id,
                    detail: DebugDetail::Swarm {
                        inertia,
                        cognitive,
                        social,
                        noise,
                        fitness,
                        personal_best: memory.best_fitness,
                        target_distance,
                    },
                });
            }

            next.push(Agent {
                id: agent.id,
                position: Position::new(new_position.x, new_position.y),
                velocity: Velocity::new(new_velocity.x, new_velocity.y),
                heading,
                state,
            });
        }

        StrategyOutput {
            agents: next,
            debug: breakdowns,
        }
    }
}

fn random_target(config: &SimConfig, rng: &mut SmallRng) -> SwarmTarget {
    let angle = random_heading(rng);
    let speed = rng.random_range(TARGET_SPEED_MIN..TARGET_SPEED_MAX);
    let direction = Vec2::from_angle(angle) * speed;
    SwarmTarget {
        x: rng.random_range(0.0..config.world_width),
        y: rng.random_range(0.0..config.world_height),
        vx: direction.x,
        vy: direction.y,
    }
}

fn advance_target(target: &mut SwarmTarget, config: &SimConfig) {
    target.x += target.vx;
    target.y += target.vy;
    if target.x < 0.0 {
        target.x = 0.0;
        target.vx = -target.vx;
    } else if target.x > config.world_width {
        target.x = config.world_width;
        target.vx = -target.vx;
    }
    if target.y < 0.0 {
        target.y = 0.0;
        target.vy = -target.vy;
    } else if target.y > config.world_height {
        target.y = config.world_height;
        target.vy = -target.vy;
    }
}

fn nearest_target(targets: &[SwarmTarget], position: Vec2) -> (Vec2, f32) {
    let mut best = Vec2::ZERO;
    let mut best_distance = f32::INFINITY;
    for target in targets {
        let center = Vec2::new(target.x, target.y);
        let distance = position.distance(center);
        if distance < best_distance {
            best = center;
            best_distance = distance;
        }
    }
    (best, best_distance)
}
