//! Shared application plumbing for the swarmsim engine shell.

pub mod command;
pub mod runtime;

pub use command::{
    CommandReceiver, CommandSender, CommandSubmit, EventReceiver, EventSender, create_command_bus,
    create_event_bus, make_command_submit,
};
pub use runtime::{EngineRuntime, TICK_INTERVAL};
