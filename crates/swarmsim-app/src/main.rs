use anyhow::Result;
use swarmsim_app::EngineRuntime;
use swarmsim_core::{Agent, AgentState, ControlCommand, EngineEvent, Obstacle, SimConfig};
use tracing::{info, warn};

/// How many ticks the demo shell runs before pausing and exiting.
const DEMO_TICKS: u64 = 600;

fn main() -> Result<()> {
    init_tracing();
    info!("Starting swarmsim simulation shell");

    let runtime = EngineRuntime::spawn(256)?;
    let config = SimConfig::default();
    let obstacles = vec![
        Obstacle::circle(0, config.world_width * 0.5, config.world_height * 0.5, 60.0),
        Obstacle::circle(1, config.world_width * 0.25, config.world_height * 0.7, 40.0),
    ];
    runtime.submit(ControlCommand::Init {
        config,
        agents: Vec::new(),
        obstacles,
    });
    runtime.submit(ControlCommand::Play);

    while let Some(event) = runtime.recv_event() {
        match event {
            EngineEvent::Ready => info!("engine ready"),
            EngineEvent::Tick(snapshot) => {
                if snapshot.tick.0.is_multiple_of(60) {
                    log_snapshot(&snapshot.agents, snapshot.tick.0);
                }
                if snapshot.tick.0 >= DEMO_TICKS {
                    runtime.submit(ControlCommand::Pause);
                    break;
                }
            }
        }
    }

    info!("simulation shell finished");
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn log_snapshot(agents: &[Agent], tick: u64) {
    let mut anomalies = 0usize;
    let mut stuck = 0usize;
    for agent in agents {
        match agent.state {
            AgentState::Anomaly => anomalies += 1,
            AgentState::Stuck => stuck += 1,
            AgentState::Active => {}
        }
    }
    if anomalies > 0 {
        warn!(tick, anomalies, "agents have stopped making progress");
    }
    info!(tick, agents = agents.len(), stuck, anomalies, "tick snapshot");
}
