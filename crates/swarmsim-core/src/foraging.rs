//! Pheromone-based foraging: a search/return state machine per ant over a
//! shared evaporating, diffusing scalar field.

use rand::{Rng, rngs::SmallRng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::field::PheromoneField;
use crate::strategy::{AgentDebug, DebugDetail, StrategyContext, StrategyOutput, obstacle_push};
use crate::vec::Vec2;
use crate::{Agent, AgentState, Position, SimConfig, Velocity, random_heading};

/// Ticks between diffusion passes over the pheromone field.
const DIFFUSE_INTERVAL: u64 = 4;
/// Ants with `id % 10` below this are permanent explorers.
const EXPLORER_SLOTS: u32 = 3;
/// Steps of pure wandering at the start of every search episode.
const WANDER_LEAD_IN: u32 = 50;
/// Angular offsets of the two side feelers when sensing the field.
const SENSE_OFFSET: f32 = 0.6;
/// How far ahead (world units) field samples are taken.
const SENSE_DISTANCE: f32 = 30.0;
/// Below this summed sample strength the field is treated as empty.
const SENSE_FLOOR: f32 = 0.1;
/// Heading bias applied when committing to a side feeler.
const HEADING_BIAS: f32 = 0.25;
/// Search steps after which dead-end escapes begin.
const DEAD_END_STEPS: u32 = 300;
/// Escape heading rerolls happen every this many steps past the threshold.
const DEAD_END_INTERVAL: u32 = 50;
/// Per-tick bounded perturbation of the wander heading.
const WANDER_JITTER: f32 = 0.3;
/// Magnitude of the pure wander force.
const WANDER_FORCE: f32 = 0.8;
/// Deposit strength at distance zero from the remembered food.
const DEPOSIT_BASE: f32 = 3.0;
/// Deposit strength falloff per world unit from the remembered food.
const DEPOSIT_FALLOFF: f32 = 0.005;
/// Deposit strength never drops below this.
const DEPOSIT_MIN: f32 = 0.5;
/// Arrival radius around the nest.
const NEST_RADIUS: f32 = 15.0;
/// Perpendicular wobble amplitude while homing.
const RETURN_WOBBLE: f32 = 0.3;
/// Influence margin added to an obstacle's radius for avoidance.
const OBSTACLE_MARGIN: f32 = 30.0;
/// Distance from a world edge inside which wall avoidance engages.
const WALL_MARGIN: f32 = 25.0;
/// Peak wall push magnitude.
const WALL_PUSH: f32 = 1.5;
/// Ants may exert up to this multiple of the configured max force.
const FORCE_CAP_FACTOR: f32 = 3.0;
/// Fraction of the previous velocity retained each tick.
const VELOCITY_CARRY: f32 = 0.8;
/// Speed cap factor while searching.
const SEARCH_SPEED_FACTOR: f32 = 0.6;
/// Speed cap factor while returning.
const RETURN_SPEED_FACTOR: f32 = 0.8;

/// The two phases of an ant's life.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ForageMode {
    #[default]
    Search,
    Return,
}

/// Private per-ant memory, created lazily on first sight of an id and only
/// ever cleared in bulk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForagerMemory {
    pub mode: ForageMode,
    pub wander_angle: f32,
    /// Index into the food source list; `-1` when none is remembered.
    pub target_food: i32,
    pub steps_searching: u32,
}

/// A stationary food deposit ants search for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FoodSource {
    pub x: f32,
    pub y: f32,
    pub radius: f32,
}

/// Pheromone-based foraging strategy. Owns the scalar field, the nest and
/// food layout, and all per-ant memory.
#[derive(Debug)]
pub struct ForagingStrategy {
    field: PheromoneField,
    memory: HashMap<u32, ForagerMemory>,
    nest: Vec2,
    food: Vec<FoodSource>,
}

impl ForagingStrategy {
    /// Build a fresh strategy for the given world: nest on the left midline,
    /// food sources spread around the far half of the world.
    #[must_use]
    pub fn new(config: &SimConfig) -> Self {
        let w = config.world_width;
        let h = config.world_height;
        Self {
            field: PheromoneField::new(w, h, config.pheromone_cell_size),
            memory: HashMap::new(),
            nest: Vec2::new(0.12 * w, 0.5 * h),
            food: vec![
                FoodSource {
                    x: 0.85 * w,
                    y: 0.2 * h,
                    radius: 25.0,
                },
                FoodSource {
                    x: 0.78 * w,
                    y: 0.72 * h,
                    radius: 25.0,
                },
                FoodSource {
                    x: 0.3 * w,
                    y: 0.85 * h,
                    radius: 22.0,
                },
            ],
        }
    }

    /// Nest location.
    #[must_use]
    pub fn nest(&self) -> Vec2 {
        self.nest
    }

    /// Food source layout.
    #[must_use]
    pub fn food_sources(&self) -> &[FoodSource] {
        &self.food
    }

    /// The shared pheromone field.
    #[must_use]
    pub fn field(&self) -> &PheromoneField {
        &self.field
    }

    /// Memory for one ant, if it has been seen.
    #[must_use]
    pub fn memory(&self, id: u32) -> Option<&ForagerMemory> {
        self.memory.get(&id)
    }

    /// Number of ants with allocated memory.
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

        // Field maintenance is global and independent of the agent count.
        self.field.evaporate();
        if tick.0.is_multiple_of(DIFFUSE_INTERVAL) {
            self.field.diffuse();
        }

        let mut next = Vec::with_capacity(agents.len());
        let mut breakdowns = debug.then(|| Vec::with_capacity(agents.len()));

        for agent in agents {
            let memory = self
                .memory
                .entry(agent.id)
                .or_insert_with(|| ForagerMemory {
                    mode: ForageMode::Search,
                    wander_angle: random_heading(rng),
                    target_food: -1,
                    steps_searching: 0,
                });

            let position = Vec2::from(agent.position);
            let velocity = Vec2::from(agent.velocity);

            // Mode transitions happen before steering so the new mode's
            // behavior applies on the transition tick.
            match memory.mode {
                ForageMode::Search => {
                    memory.steps_searching += 1;
                    if let Some(found) = self
                        .food
                        .iter()
                        .position(|f| position.distance(Vec2::new(f.x, f.y)) < f.radius)
                    {
                        memory.mode = ForageMode::Return;
                        memory.target_food = found as i32;
                        memory.steps_searching = 0;
                    }
                }
                ForageMode::Return => {
                    if position.distance(self.nest) < NEST_RADIUS {
                        memory.mode = ForageMode::Search;
                        memory.target_food = -1;
                        memory.steps_searching = 0;
                        memory.wander_angle = random_heading(rng);
                    }
                }
            }

            let steer = match memory.mode {
                ForageMode::Search => {
                    search_steer(memory, agent.id, position, &self.field, rng)
                }
                ForageMode::Return => {
                    let food_pos = self
                        .food
                        .get(memory.target_food.max(0) as usize)
                        .map(|f| Vec2::new(f.x, f.y))
                        .unwrap_or(position);
                    let strength =
                        (DEPOSIT_BASE - position.distance(food_pos) * DEPOSIT_FALLOFF)
                            .max(DEPOSIT_MIN);
                    self.field.deposit(position.x, position.y, strength);

                    let home = (self.nest - position).normalized();
                    home + home.perp() * rng.random_range(-RETURN_WOBBLE..RETURN_WOBBLE)
                }
            };

            let avoidance = obstacle_push(position, obstacles, OBSTACLE_MARGIN, config.max_speed)
                + wall_push(position, config);
            let force = (steer + avoidance).clamp_length(config.max_force * FORCE_CAP_FACTOR);

            let cap = match memory.mode {
                ForageMode::Search => config.max_speed * SEARCH_SPEED_FACTOR,
                ForageMode::Return => config.max_speed * RETURN_SPEED_FACTOR,
            };
            let new_velocity = (velocity * VELOCITY_CARRY + force).clamp_length(cap);
            let moved = position + new_velocity * config.speed_multiplier;
            let new_position = Vec2::new(
                moved.x.clamp(0.0, config.world_width),
                moved.y.clamp(0.0, config.world_height),
            );

            let heading = if new_velocity.length_sq() > f32::EPSILON {
                new_velocity.heading()
            } else {
                memory.wander_angle
            };

            let state = match memory.mode {
                ForageMode::Search => AgentState::Active,
                ForageMode::Return => AgentState::Stuck,
            };

            if let Some(out) = breakdowns.as_mut() {
                out.push(AgentDebug {
                    id: agent.id,
                    detail: DebugDetail::Foraging {
                        mode: memory.mode,
                        steer,
                        avoidance,
                        speed: new_velocity.length(),
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

/// Steering while searching: explorers and fresh episodes wander; everyone
/// else follows the field when it is strong enough ahead.
fn search_steer(
    memory: &mut ForagerMemory,
    id: u32,
    position: Vec2,
    field: &PheromoneField,
    rng: &mut SmallRng,
) -> Vec2 {
    if memory.steps_searching > DEAD_END_STEPS
        && memory.steps_searching.is_multiple_of(DEAD_END_INTERVAL)
    {
        memory.wander_angle = random_heading(rng);
    }

    let explorer = id % 10 < EXPLORER_SLOTS;
    if explorer || memory.steps_searching < WANDER_LEAD_IN {
        return wander(memory, rng);
    }

    let offsets = [-SENSE_OFFSET, 0.0, SENSE_OFFSET];
    let samples: [f32; 3] = std::array::from_fn(|i| {
        let probe = position + Vec2::from_angle(memory.wander_angle + offsets[i]) * SENSE_DISTANCE;
        field.sample(probe.x, probe.y)
    });
    let total: f32 = samples.iter().sum();
    if total < SENSE_FLOOR {
        return wander(memory, rng);
    }

    // Choose one feeler with probability proportional to its strength.
    let draw = rng.random_range(0.0..total);
    let chosen = if draw < samples[0] {
        0
    } else if draw < samples[0] + samples[1] {
        1
    } else {
        2
    };
    memory.wander_angle += [-HEADING_BIAS, 0.0, HEADING_BIAS][chosen];

    let strongest = samples.iter().fold(0.0_f32, |acc, &s| acc.max(s));
    Vec2::from_angle(memory.wander_angle) * strongest.min(1.0)
}

/// Correlated random walk: bounded heading jitter, fixed-magnitude force.
fn wander(memory: &mut ForagerMemory, rng: &mut SmallRng) -> Vec2 {
    memory.wander_angle += rng.random_range(-WANDER_JITTER..WANDER_JITTER);
    Vec2::from_angle(memory.wander_angle) * WANDER_FORCE
}

/// Inward push near world edges, ramping linearly inside [`WALL_MARGIN`].
fn wall_push(position: Vec2, config: &SimConfig) -> Vec2 {
    let mut push = Vec2::ZERO;
    if position.x < WALL_MARGIN {
        push.x += WALL_PUSH * (1.0 - position.x / WALL_MARGIN);
    }
    if position.x > config.world_width - WALL_MARGIN {
        push.x -= WALL_PUSH * (1.0 - (config.world_width - position.x) / WALL_MARGIN);
    }
    if position.y < WALL_MARGIN {
        push.y += WALL_PUSH * (1.0 - position.y / WALL_MARGIN);
    }
    if position.y > config.world_height - WALL_MARGIN {
        push.y -= WALL_PUSH * (1.0 - (config.world_height - position.y) / WALL_MARGIN);
    }
    push
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::StrategyContext;
    use crate::{Tick, Velocity};
    use rand::{SeedableRng, rngs::SmallRng};
    use swarmsim_index::{NeighborhoodIndex, UniformGridIndex};

    fn config() -> SimConfig {
        SimConfig {
            algorithm: crate::Algorithm::Foraging,
            rng_seed: Some(11),
            ..SimConfig::default()
        }
    }

    fn run_tick(
        strategy: &mut ForagingStrategy,
        agents: &[Agent],
        config: &SimConfig,
        tick: u64,
        rng: &mut SmallRng,
    ) -> StrategyOutput {
        let mut index = UniformGridIndex::new(config.neighbor_radius);
        let positions: Vec<(f32, f32)> = agents
            .iter()
            .map(|a| (a.position.x, a.position.y))
            .collect();
        index.rebuild(&positions).expect("rebuild");
        strategy.tick(StrategyContext {
            agents,
            config,
            obstacles: &[],
            index: &index,
            tick: Tick(tick),
            debug: false,
            rng,
        })
    }

    #[test]
    fn ant_inside_food_switches_to_return() {
        let config = config();
        let mut strategy = ForagingStrategy::new(&config);
        let mut rng = config.seeded_rng();
        // food source 0 sits at (0.85*1200, 0.2*800) = (1020, 160), radius 25
        let agent = Agent::at(7, 1020.0, 160.0);
        run_tick(&mut strategy, &[agent], &config, 1, &mut rng);

        let memory = strategy.memory(7).expect("memory allocated");
        assert_eq!(memory.mode, ForageMode::Return);
        assert_eq!(memory.target_food, 0);
        assert_eq!(memory.steps_searching, 0);
    }

    #[test]
    fn searching_ant_outside_food_stays_searching() {
        let config = config();
        let mut strategy = ForagingStrategy::new(&config);
        let mut rng = config.seeded_rng();
        let agent = Agent::at(4, 400.0, 300.0);
        let output = run_tick(&mut strategy, &[agent], &config, 1, &mut rng);

        let memory = strategy.memory(4).expect("memory");
        assert_eq!(memory.mode, ForageMode::Search);
        assert_eq!(memory.target_food, -1);
        assert_eq!(memory.steps_searching, 1);
        assert_eq!(output.agents[0].state, AgentState::Active);
    }

    #[test]
    fn returning_ant_at_nest_switches_to_search() {
        let config = config();
        let mut strategy = ForagingStrategy::new(&config);
        let mut rng = config.seeded_rng();
        let nest = strategy.nest();

        // Seed memory by ticking once, then force return mode near the nest.
        let agent = Agent::at(2, nest.x + 5.0, nest.y);
        run_tick(&mut strategy, &[agent], &config, 1, &mut rng);
        {
            let memory = strategy.memory.get_mut(&2).expect("memory");
            memory.mode = ForageMode::Return;
            memory.target_food = 1;
        }
        let output = run_tick(&mut strategy, &[agent], &config, 2, &mut rng);

        let memory = strategy.memory(2).expect("memory");
        assert_eq!(memory.mode, ForageMode::Search);
        assert_eq!(memory.target_food, -1);
        assert_eq!(memory.steps_searching, 0);
        assert_eq!(output.agents[0].state, AgentState::Active);
    }

    #[test]
    fn returning_ant_deposits_pheromone_and_reads_stuck() {
        let config = config();
        let mut strategy = ForagingStrategy::new(&config);
        let mut rng = config.seeded_rng();
        let agent = Agent::at(3, 1020.0, 160.0);

        // First tick flips the ant to return mode (it stands in food);
        // second tick deposits on the way home.
        run_tick(&mut strategy, &[agent], &config, 1, &mut rng);
        let output = run_tick(&mut strategy, &[agent], &config, 2, &mut rng);

        assert_eq!(output.agents[0].state, AgentState::Stuck);
        // standing on the food source: deposit at full base strength
        assert!(strategy.field().sample(1020.0, 160.0) > DEPOSIT_BASE - 0.5);
    }

    #[test]
    fn searching_speed_cap_holds() {
        let config = config();
        let mut strategy = ForagingStrategy::new(&config);
        let mut rng = config.seeded_rng();
        let mut fast = Agent::at(5, 600.0, 400.0);
        fast.velocity = Velocity::new(config.max_speed, config.max_speed);

        let output = run_tick(&mut strategy, &[fast], &config, 1, &mut rng);
        let speed = Vec2::from(output.agents[0].velocity).length();
        assert!(
            speed <= config.max_speed * SEARCH_SPEED_FACTOR + 1e-4,
            "search speed {speed} above cap"
        );
    }

    #[test]
    fn positions_clamp_to_world_bounds() {
        let config = config();
        let mut strategy = ForagingStrategy::new(&config);
        let mut rng = config.seeded_rng();
        let mut agent = Agent::at(6, 2.0, 2.0);
        agent.velocity = Velocity::new(-3.0, -3.0);

        let output = run_tick(&mut strategy, &[agent], &config, 1, &mut rng);
        let p = output.agents[0].position;
        assert!(p.x >= 0.0 && p.y >= 0.0);
        assert!(p.x <= config.world_width && p.y <= config.world_height);
    }

    #[test]
    fn memory_is_lazily_allocated_per_ant() {
        let config = config();
        let mut strategy = ForagingStrategy::new(&config);
        let mut rng = config.seeded_rng();
        assert_eq!(strategy.memory_len(), 0);
        let agents = vec![Agent::at(0, 100.0, 100.0), Agent::at(1, 200.0, 200.0)];
        run_tick(&mut strategy, &agents, &config, 1, &mut rng);
        assert_eq!(strategy.memory_len(), 2);
        // ticking the same population does not grow the map
        run_tick(&mut strategy, &agents, &config, 2, &mut rng);
        assert_eq!(strategy.memory_len(), 2);
    }

    #[test]
    fn field_decays_between_ticks_without_returners() {
        let config = config();
        let mut strategy = ForagingStrategy::new(&config);
        let mut rng = config.seeded_rng();
        strategy.field.deposit(300.0, 300.0, 5.0);
        let before = strategy.field().total();
        // place the only ant far from food so nothing deposits
        let agent = Agent::at(9, 100.0, 700.0);
        run_tick(&mut strategy, &[agent], &config, 1, &mut rng);
        assert!(strategy.field().total() < before);
    }
}
