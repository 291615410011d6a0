//! Boids-style flocking: separation, alignment, cohesion, obstacle
//! avoidance, toroidal world.

use rayon::prelude::*;

use crate::strategy::{AgentDebug, DebugDetail, StrategyContext, StrategyOutput, obstacle_push,
    steer_toward};
use crate::vec::Vec2;
use crate::{Agent, AgentState, Position, SimConfig, Velocity};

/// Influence margin added to an obstacle's radius for avoidance.
const OBSTACLE_MARGIN: f32 = 50.0;
/// Fixed weight applied to the obstacle avoidance component.
const OBSTACLE_WEIGHT: f32 = 3.0;

/// Flocking keeps no per-agent memory; every tick is a pure function of the
/// population, configuration, obstacles, and index.
#[derive(Debug, Default)]
pub struct FlockingStrategy;

impl FlockingStrategy {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    pub fn tick(&mut self, ctx: StrategyContext<'_>) -> StrategyOutput {
        let StrategyContext {
            agents,
            config,
            obstacles,
            index,
            debug,
            ..
        } = ctx;

        let stepped: Vec<(Agent, Option<AgentDebug>)> = agents
            .par_iter()
            .enumerate()
            .map(|(idx, agent)| step_agent(idx, agent, agents, config, obstacles, index, debug))
            .collect();

        let mut next = Vec::with_capacity(stepped.len());
        let mut breakdowns = debug.then(|| Vec::with_capacity(stepped.len()));
        for (agent, breakdown) in stepped {
            next.push(agent);
            if let (Some(out), Some(entry)) = (breakdowns.as_mut(), breakdown) {
                out.push(entry);
            }
        }
        StrategyOutput {
            agents: next,
            debug: breakdowns,
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn step_agent(
    idx: usize,
    agent: &Agent,
    agents: &[Agent],
    config: &SimConfig,
    obstacles: &[crate::Obstacle],
    index: &swarmsim_index::UniformGridIndex,
    debug: bool,
) -> (Agent, Option<AgentDebug>) {
    use swarmsim_index::NeighborhoodIndex;

    let position = Vec2::from(agent.position);
    let velocity = Vec2::from(agent.velocity);

    let mut neighbor_count = 0u32;
    let mut separation_sum = Vec2::ZERO;
    let mut separation_count = 0u32;
    let mut velocity_sum = Vec2::ZERO;
    let mut centroid_sum = Vec2::ZERO;
    let separation_radius_sq = config.separation_radius * config.separation_radius;

    index.for_each_within(
        position.x,
        position.y,
        config.neighbor_radius,
        Some(idx),
        &mut |other_idx, dist_sq| {
            let other = &agents[other_idx];
            neighbor_count += 1;
            velocity_sum += Vec2::from(other.velocity);
            centroid_sum += Vec2::from(other.position);

            let dist_sq = dist_sq.into_inner();
            if dist_sq <= separation_radius_sq && dist_sq > f32::EPSILON {
                let distance = dist_sq.sqrt();
                let away = (position - Vec2::from(other.position)).normalized();
                separation_sum += away * (1.0 / distance);
                separation_count += 1;
            }
        },
    );

    let separation = if separation_count > 0 {
        let average = separation_sum * (1.0 / separation_count as f32);
        steer_toward(average, velocity, config.max_speed, config.max_force)
    } else {
        Vec2::ZERO
    };

    let (alignment, cohesion) = if neighbor_count > 0 {
        let inv = 1.0 / neighbor_count as f32;
        let alignment = steer_toward(
            velocity_sum * inv,
            velocity,
            config.max_speed,
            config.max_force,
        );
        let centroid = centroid_sum * inv;
        let cohesion = steer_toward(
            centroid - position,
            velocity,
            config.max_speed,
            config.max_force,
        );
        (alignment, cohesion)
    } else {
        (Vec2::ZERO, Vec2::ZERO)
    };

    let obstacle = obstacle_push(position, obstacles, OBSTACLE_MARGIN, config.max_speed)
        .clamp_length(config.max_force);

    let weighted_separation = separation * config.separation_weight;
    let weighted_alignment = alignment * config.alignment_weight;
    let weighted_cohesion = cohesion * config.cohesion_weight;
    let weighted_obstacle = obstacle * OBSTACLE_WEIGHT;

    let force = (weighted_separation + weighted_alignment + weighted_cohesion + weighted_obstacle)
        .clamp_length(config.max_force);

    let new_velocity = (velocity + force).clamp_length(config.max_speed);
    let mut new_position = position + new_velocity * config.speed_multiplier;
    new_position.x = new_position.x.rem_euclid(config.world_width);
    new_position.y = new_position.y.rem_euclid(config.world_height);

    let heading = if new_velocity.length_sq() > f32::EPSILON {
        new_velocity.heading()
    } else {
        agent.heading
    };

    let next = Agent {
        id: agent.id,
        position: Position::new(new_position.x, new_position.y),
        velocity: Velocity::new(new_velocity.x, new_velocity.y),
        heading,
        state: AgentState::Active,
    };

    let breakdown = debug.then(|| AgentDebug {
        id: agent.id,
        detail: DebugDetail::Flocking {
            separation: weighted_separation,
            alignment: weighted_alignment,
            cohesion: weighted_cohesion,
            obstacle: weighted_obstacle,
            neighbors: neighbor_count,
            speed: new_velocity.length(),
        },
    });

    (next, breakdown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::StrategyContext;
    use crate::{Obstacle, Tick};
    use rand::{SeedableRng, rngs::SmallRng};
    use swarmsim_index::{NeighborhoodIndex, UniformGridIndex};

    fn run_tick(
        agents: &[Agent],
        config: &SimConfig,
        obstacles: &[Obstacle],
        debug: bool,
    ) -> StrategyOutput {
        let mut index = UniformGridIndex::new(config.neighbor_radius);
        let positions: Vec<(f32, f32)> = agents
            .iter()
            .map(|a| (a.position.x, a.position.y))
            .collect();
        index.rebuild(&positions).expect("rebuild");
        let mut rng = SmallRng::seed_from_u64(1);
        let mut strategy = FlockingStrategy::new();
        strategy.tick(StrategyContext {
            agents,
            config,
            obstacles,
            index: &index,
            tick: Tick::zero(),
            debug,
            rng: &mut rng,
        })
    }

    #[test]
    fn close_pair_separates_along_x_with_opposite_signs() {
        let config = SimConfig {
            separation_radius: 30.0,
            ..SimConfig::default()
        };
        let agents = vec![Agent::at(0, 100.0, 100.0), Agent::at(1, 110.0, 100.0)];
        let output = run_tick(&agents, &config, &[], false);

        let vx0 = output.agents[0].velocity.vx;
        let vx1 = output.agents[1].velocity.vx;
        assert!(vx0 < 0.0, "left agent pushed further left, got {vx0}");
        assert!(vx1 > 0.0, "right agent pushed further right, got {vx1}");
        assert!((vx0 + vx1).abs() < 1e-5, "pushes must be equal and opposite");
        assert!(vx0.abs() <= config.max_force + 1e-6);
        assert!(output.agents[0].velocity.vy.abs() < 1e-5);
    }

    #[test]
    fn velocity_never_exceeds_max_speed() {
        let config = SimConfig::default();
        let mut agents: Vec<Agent> = (0..24)
            .map(|i| {
                let mut agent = Agent::at(i, 40.0 + (i % 6) as f32 * 12.0, 40.0 + (i / 6) as f32 * 12.0);
                agent.velocity = Velocity::new(2.9, -1.5);
                agent
            })
            .collect();
        for _ in 0..20 {
            let output = run_tick(&agents, &config, &[], false);
            for agent in &output.agents {
                let speed = Vec2::from(agent.velocity).length();
                assert!(speed <= config.max_speed + 1e-4, "speed {speed}");
            }
            agents = output.agents;
        }
    }

    #[test]
    fn positions_wrap_toroidally() {
        let config = SimConfig::default();
        let mut agent = Agent::at(0, config.world_width - 0.5, 100.0);
        agent.velocity = Velocity::new(config.max_speed, 0.0);
        let output = run_tick(&[agent], &config, &[], false);
        let x = output.agents[0].position.x;
        assert!(
            (0.0..config.world_width).contains(&x),
            "wrapped x out of range: {x}"
        );
        assert!(x < 10.0, "expected wrap to the left edge, got {x}");
    }

    #[test]
    fn isolated_agent_keeps_cruising() {
        let config = SimConfig::default();
        let mut agent = Agent::at(0, 600.0, 400.0);
        agent.velocity = Velocity::new(1.0, 0.5);
        let output = run_tick(&[agent], &config, &[], false);
        // no neighbors and no obstacles: velocity unchanged
        assert_eq!(output.agents[0].velocity, Velocity::new(1.0, 0.5));
        assert!((output.agents[0].position.x - 601.0).abs() < 1e-5);
    }

    #[test]
    fn debug_breakdown_reports_neighbors_and_components() {
        let config = SimConfig::default();
        let agents = vec![
            Agent::at(0, 100.0, 100.0),
            Agent::at(1, 120.0, 100.0),
            Agent::at(2, 100.0, 120.0),
        ];
        let output = run_tick(&agents, &config, &[], true);
        let debug = output.debug.expect("debug requested");
        assert_eq!(debug.len(), 3);
        match &debug[0].detail {
            DebugDetail::Flocking {
                neighbors, speed, ..
            } => {
                assert_eq!(*neighbors, 2);
                assert!(*speed >= 0.0);
            }
            other => panic!("expected flocking breakdown, got {other:?}"),
        }
    }

    #[test]
    fn obstacle_avoidance_pushes_away() {
        let config = SimConfig::default();
        let obstacles = vec![Obstacle::circle(0, 130.0, 100.0, 20.0)];
        let agent = Agent::at(0, 100.0, 100.0);
        let output = run_tick(&[agent], &config, &obstacles, false);
        assert!(
            output.agents[0].velocity.vx < 0.0,
            "agent should be pushed away from the obstacle"
        );
    }
}
