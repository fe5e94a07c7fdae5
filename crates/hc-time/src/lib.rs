//! Tick sources for the hyperC timer device models.
//!
//! Timer devices never look at a wall clock. They program a [`TickSource`] with a tick count,
//! a [`TickRate`] and a [`TickMode`], and the owner of that tick source invokes the device's tick
//! handler once per expiry.
//!
//! Two implementations are provided:
//! - [`TickScheduler`] keeps monotonic virtual time (nanoseconds since reset) and a queue of
//!   pending expiries for any number of channels. [`SchedulerTickSource`] binds one channel to
//!   one device. Expiries are **delivered as events** ([`TickScheduler::pop_due`]) rather than
//!   stored callbacks, so the caller decides when and in which order device handlers run.
//! - [`ManualTickSource`] is a deterministic fake that advances one tick per
//!   [`ManualTickSource::step`] call, intended for device unit tests.

#![forbid(unsafe_code)]

mod manual;
mod rate;
mod scheduler;
mod source;

pub use manual::ManualTickSource;
pub use rate::{TickRate, MAX_TICK_SHIFT};
pub use scheduler::{
    ChannelId, SchedulerTickSource, SharedTickScheduler, TickEvent, TickScheduler,
};
pub use source::{TickMode, TickSource};
