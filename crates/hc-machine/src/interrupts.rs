use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

use hc_devices::IrqLine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqEvent {
    Raise(u32),
    Lower(u32),
}

/// Edge-counting model of the board interrupt controller inputs.
///
/// Only the input side is modelled: which lines are asserted and how many rising edges each one
/// has seen. Delivery to CPUs is not.
#[derive(Debug)]
pub struct InterruptController {
    lines: u32,
    asserted: BTreeSet<u32>,
    pulses: Vec<u64>,
    events: Vec<IrqEvent>,
}

pub type SharedInterruptController = Rc<RefCell<InterruptController>>;

impl InterruptController {
    pub fn new(lines: u32) -> Self {
        Self {
            lines,
            asserted: BTreeSet::new(),
            pulses: vec![0; lines as usize],
            events: Vec::new(),
        }
    }

    pub fn new_shared(lines: u32) -> SharedInterruptController {
        Rc::new(RefCell::new(Self::new(lines)))
    }

    /// Device-side handle driving input `line` of `ctrl`.
    pub fn line(ctrl: &SharedInterruptController, line: u32) -> ControllerLine {
        ControllerLine {
            ctrl: Rc::clone(ctrl),
            line,
        }
    }

    pub fn num_lines(&self) -> u32 {
        self.lines
    }

    pub fn raise(&mut self, line: u32) {
        if line >= self.lines {
            tracing::warn!(line, "raise on nonexistent interrupt line ignored");
            return;
        }
        if self.asserted.insert(line) {
            self.pulses[line as usize] += 1;
        }
        tracing::trace!(line, "irq raised");
        self.events.push(IrqEvent::Raise(line));
    }

    pub fn lower(&mut self, line: u32) {
        if line >= self.lines {
            tracing::warn!(line, "lower on nonexistent interrupt line ignored");
            return;
        }
        self.asserted.remove(&line);
        self.events.push(IrqEvent::Lower(line));
    }

    pub fn is_asserted(&self, line: u32) -> bool {
        self.asserted.contains(&line)
    }

    /// Rising edges seen on `line` since reset.
    pub fn pulse_count(&self, line: u32) -> u64 {
        self.pulses.get(line as usize).copied().unwrap_or(0)
    }

    /// `(line, rising edges)` for every line that has fired at least once.
    pub fn active_lines(&self) -> Vec<(u32, u64)> {
        self.pulses
            .iter()
            .enumerate()
            .filter(|(_, &count)| count != 0)
            .map(|(line, &count)| (line as u32, count))
            .collect()
    }

    pub fn take_events(&mut self) -> Vec<IrqEvent> {
        std::mem::take(&mut self.events)
    }
}

/// One interrupt controller input, as seen by the device driving it.
#[derive(Debug, Clone)]
pub struct ControllerLine {
    ctrl: SharedInterruptController,
    line: u32,
}

impl ControllerLine {
    pub fn line(&self) -> u32 {
        self.line
    }
}

impl IrqLine for ControllerLine {
    fn set_level(&self, level: bool) {
        let mut ctrl = self.ctrl.borrow_mut();
        if level {
            ctrl.raise(self.line);
        } else {
            ctrl.lower(self.line);
        }
    }
}
