use crate::TickRate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickMode {
    /// Expire once, then disarm.
    OneShot,
    /// Reload the limit after every expiry and keep counting.
    Periodic,
}

/// A countdown a device arms to have its tick handler invoked.
///
/// Expiries are delivered out of band: whoever drives the tick source (a machine loop, or a
/// test) calls the device's tick handler once per expiry. Only the owning device calls
/// [`arm`](Self::arm) and [`stop`](Self::stop).
pub trait TickSource {
    /// Starts counting down `limit` ticks at `rate`, replacing any previous arming.
    ///
    /// A `limit` of zero expires once, immediately, regardless of `mode`.
    fn arm(&mut self, limit: u32, rate: TickRate, mode: TickMode);

    /// Cancels the current arming. Expiries that were due for it never fire.
    fn stop(&mut self);

    /// Ticks left until the next expiry, or 0 when not armed.
    fn remaining(&self) -> u32;

    /// Replaces the reload value of the current arming without moving its pending expiry.
    ///
    /// Periodic armings count the new limit from their next period on. Ignored when not armed.
    fn set_limit(&mut self, limit: u32);

    fn is_armed(&self) -> bool;
}
