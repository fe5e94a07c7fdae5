use std::cell::RefCell;
use std::rc::Rc;

/// Output interrupt signal of a device.
pub trait IrqLine {
    fn set_level(&self, level: bool);

    /// Emits a single edge: assert, then immediately deassert.
    fn pulse(&self) {
        self.set_level(true);
        self.set_level(false);
    }
}

/// An unconnected interrupt output.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoIrq;

impl IrqLine for NoIrq {
    fn set_level(&self, _level: bool) {}
}

/// Interrupt line that records every level change. Clones share the record.
#[derive(Debug, Clone, Default)]
pub struct IrqRecorder {
    levels: Rc<RefCell<Vec<bool>>>,
}

impl IrqRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn levels(&self) -> Vec<bool> {
        self.levels.borrow().clone()
    }

    /// Number of rising edges seen so far.
    pub fn pulses(&self) -> usize {
        self.levels.borrow().iter().filter(|&&level| level).count()
    }

    pub fn is_asserted(&self) -> bool {
        self.levels.borrow().last().copied().unwrap_or(false)
    }

    pub fn clear(&self) {
        self.levels.borrow_mut().clear();
    }
}

impl IrqLine for IrqRecorder {
    fn set_level(&self, level: bool) {
        self.levels.borrow_mut().push(level);
    }
}
