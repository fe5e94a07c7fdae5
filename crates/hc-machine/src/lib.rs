//! Board assembly for the hyperC evaluation platform.
//!
//! [`Machine`] builds the timer devices described by a [`BoardConfig`], maps them on an
//! [`MmioBus`], wires their interrupt outputs to an [`InterruptController`] and drives their tick
//! sources from a shared virtual-time [`hc_time::TickScheduler`].
//!
//! All register accesses and tick deliveries go through `&mut Machine`, so each device sees
//! exactly one complete state transition at a time.

#![forbid(unsafe_code)]

pub mod bus;
pub mod config;
pub mod interrupts;
pub mod machine;
pub mod script;

pub use bus::{BusFault, DeviceId, MapError, MmioBus};
pub use config::{BoardConfig, ConfigError, DeviceSlot, MachineKind};
pub use interrupts::{ControllerLine, InterruptController, IrqEvent, SharedInterruptController};
pub use machine::{HaltReason, Machine, MachineError};
pub use script::{ReadRecord, Script, ScriptError, ScriptReport, Step};
