use crossfire::mpmc;
use crossfire::{MAsyncTx, MRx, TrySendError, detect_backoff_cfg};
use std::sync::Arc;
use swarmsim_core::{ControlCommand, EngineEvent};
use tracing::warn;

pub type CommandSender = MAsyncTx<ControlCommand>;
pub type CommandReceiver = MRx<ControlCommand>;
pub type EventSender = MAsyncTx<EngineEvent>;
pub type EventReceiver = MRx<EngineEvent>;
pub type CommandSubmit = Arc<dyn Fn(ControlCommand) -> bool + Send + Sync>;

pub fn create_command_bus(capacity: usize) -> (CommandSender, CommandReceiver) {
    detect_backoff_cfg();
    mpmc::bounded_tx_async_rx_blocking(capacity)
}

pub fn create_event_bus(capacity: usize) -> (EventSender, EventReceiver) {
    detect_backoff_cfg();
    mpmc::bounded_tx_async_rx_blocking(capacity)
}

pub fn make_command_submit(sender: CommandSender) -> CommandSubmit {
    let sender = Arc::new(sender);
    Arc::new(
        move |command: ControlCommand| match sender.try_send(command) {
            Ok(()) => true,
            Err(TrySendError::Full(cmd)) => {
                warn!(?cmd, "control command queue full; dropping command");
                false
            }
            Err(TrySendError::Disconnected(cmd)) => {
                warn!(?cmd, "control command queue disconnected");
                false
            }
        },
    )
}

/// Push an event toward the boundary, dropping it (with a warning) when the
/// consumer cannot keep up. Losing a snapshot is preferable to stalling the
/// tick loop.
pub fn emit_event(sender: &EventSender, event: EngineEvent) {
    match sender.try_send(event) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => {
            warn!("event queue full; dropping event");
        }
        Err(TrySendError::Disconnected(_)) => {}
    }
}
