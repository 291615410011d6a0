//! Engine run loop: a dedicated thread owns the simulation and advances it
//! on a fixed cadence, absorbing commands strictly between ticks.

use std::io;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossfire::TryRecvError;
use swarmsim_core::{ControlCommand, EngineEvent, Simulation};
use tracing::{debug, info, warn};

use crate::command::{
    CommandReceiver, CommandSender, EventReceiver, EventSender, create_command_bus,
    create_event_bus, emit_event,
};

/// Target tick cadence (~60 Hz).
pub const TICK_INTERVAL: Duration = Duration::from_millis(16);

/// Handle owning the engine thread and both bus endpoints. Dropping the
/// handle disconnects the command bus, which shuts the engine thread down.
pub struct EngineRuntime {
    commands: Option<CommandSender>,
    events: EventReceiver,
    thread: Option<JoinHandle<()>>,
}

impl EngineRuntime {
    /// Spawn the engine thread with bounded command and event buses.
    pub fn spawn(capacity: usize) -> io::Result<Self> {
        let (command_tx, command_rx) = create_command_bus(capacity);
        let (event_tx, event_rx) = create_event_bus(capacity);
        let thread = thread::Builder::new()
            .name("swarmsim-engine".into())
            .spawn(move || run_engine_loop(&command_rx, &event_tx))?;
        Ok(Self {
            commands: Some(command_tx),
            events: event_rx,
            thread: Some(thread),
        })
    }

    /// Enqueue a command; returns `false` if the queue is full or closed.
    pub fn submit(&self, command: ControlCommand) -> bool {
        let Some(sender) = self.commands.as_ref() else {
            return false;
        };
        match sender.try_send(command) {
            Ok(()) => true,
            Err(err) => {
                warn!(?err, "failed to enqueue control command");
                false
            }
        }
    }

    /// Block until the next engine event; `None` once the engine has shut
    /// down.
    pub fn recv_event(&self) -> Option<EngineEvent> {
        self.events.recv().ok()
    }
}

impl Drop for EngineRuntime {
    fn drop(&mut self) {
        // dropping the only sender disconnects the bus and ends the loop
        self.commands.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn run_engine_loop(commands: &CommandReceiver, events: &EventSender) {
    let mut engine: Option<Simulation> = None;
    let mut next_deadline = Instant::now();
    info!("engine loop started");

    loop {
        // Commands are absorbed atomically between ticks, never mid-tick.
        loop {
            match commands.try_recv() {
                Ok(command) => apply(&mut engine, command, events),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    info!("command bus closed; engine loop exiting");
                    return;
                }
            }
        }

        let now = Instant::now();
        if now >= next_deadline {
            if let Some(sim) = engine.as_mut()
                && sim.is_running()
            {
                let snapshot = sim.step();
                emit_event(events, EngineEvent::Tick(snapshot));
            }
            next_deadline = now + TICK_INTERVAL;
        }

        let remaining = next_deadline.saturating_duration_since(Instant::now());
        if !remaining.is_zero() {
            thread::sleep(remaining);
        }
    }
}

fn apply(engine: &mut Option<Simulation>, command: ControlCommand, events: &EventSender) {
    match engine.as_mut() {
        Some(sim) => match sim.apply_command(command) {
            Ok(produced) => {
                for event in produced {
                    emit_event(events, event);
                }
            }
            Err(err) => warn!(%err, "rejected control command"),
        },
        None => match command {
            ControlCommand::Init {
                config,
                agents,
                obstacles,
            } => match Simulation::new(config, agents, obstacles) {
                Ok(sim) => {
                    debug!(agents = sim.agents().len(), "engine initialized");
                    emit_event(events, EngineEvent::Ready);
                    emit_event(events, EngineEvent::Tick(sim.snapshot()));
                    *engine = Some(sim);
                }
                Err(err) => warn!(%err, "rejected init"),
            },
            other => warn!(?other, "command received before init; ignoring"),
        },
    }
}
