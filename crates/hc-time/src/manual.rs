use std::cell::RefCell;
use std::rc::Rc;

use crate::{TickMode, TickRate, TickSource};

#[derive(Debug, Clone, Copy)]
struct ManualArming {
    limit: u32,
    rate: TickRate,
    mode: TickMode,
    remaining: u32,
}

#[derive(Debug, Default)]
struct ManualState {
    arming: Option<ManualArming>,
    arm_count: u32,
    stop_count: u32,
}

/// Deterministic [`TickSource`] that only moves when [`step`](Self::step) is called.
///
/// Clones share state, so a test can hand one clone to a device and keep another to drive time
/// and inspect how the device programmed it.
#[derive(Debug, Clone, Default)]
pub struct ManualTickSource {
    state: Rc<RefCell<ManualState>>,
}

impl ManualTickSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances by one tick. Returns `true` if the current arming expired on this tick.
    pub fn step(&self) -> bool {
        let mut state = self.state.borrow_mut();
        let Some(arming) = state.arming.as_mut() else {
            return false;
        };

        arming.remaining = arming.remaining.saturating_sub(1);
        if arming.remaining > 0 {
            return false;
        }

        if arming.mode == TickMode::Periodic && arming.limit != 0 {
            arming.remaining = arming.limit;
        } else {
            state.arming = None;
        }
        true
    }

    /// Overrides the live countdown of the current arming.
    pub fn set_remaining(&self, ticks: u32) {
        if let Some(arming) = self.state.borrow_mut().arming.as_mut() {
            arming.remaining = ticks;
        }
    }

    pub fn mode(&self) -> Option<TickMode> {
        self.state.borrow().arming.map(|a| a.mode)
    }

    pub fn rate(&self) -> Option<TickRate> {
        self.state.borrow().arming.map(|a| a.rate)
    }

    pub fn limit(&self) -> Option<u32> {
        self.state.borrow().arming.map(|a| a.limit)
    }

    /// Number of [`TickSource::arm`] calls so far.
    pub fn arm_count(&self) -> u32 {
        self.state.borrow().arm_count
    }

    /// Number of [`TickSource::stop`] calls so far.
    pub fn stop_count(&self) -> u32 {
        self.state.borrow().stop_count
    }
}

impl TickSource for ManualTickSource {
    fn arm(&mut self, limit: u32, rate: TickRate, mode: TickMode) {
        let mut state = self.state.borrow_mut();
        state.arm_count += 1;
        state.arming = Some(ManualArming {
            limit,
            rate,
            mode,
            remaining: limit,
        });
    }

    fn stop(&mut self) {
        let mut state = self.state.borrow_mut();
        state.stop_count += 1;
        state.arming = None;
    }

    fn remaining(&self) -> u32 {
        self.state.borrow().arming.map_or(0, |a| a.remaining)
    }

    fn set_limit(&mut self, limit: u32) {
        if let Some(arming) = self.state.borrow_mut().arming.as_mut() {
            arming.limit = limit;
        }
    }

    fn is_armed(&self) -> bool {
        self.state.borrow().arming.is_some()
    }
}
