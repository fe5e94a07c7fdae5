//! Platform identification and shutdown registers.
//!
//! Reading offset `0x0` returns a fixed identifier; writing offset `0x4` asks the machine to
//! terminate with the written value as exit status. Nothing else is mapped.

use std::cell::Cell;
use std::rc::Rc;

use crate::mmio::{check_width, Access, BusError, MmioDevice};

pub const MISC_MMIO_SIZE: u64 = 0x100;

pub const REG_ID: u64 = 0x0;
pub const REG_EXIT: u64 = 0x4;

pub const PLATFORM_ID: u32 = 0x1234_5678;

/// Receives guest shutdown requests.
///
/// The device never tears the process down itself; the machine loop applies the request at a
/// safe boundary.
pub trait ExitSink {
    fn request_exit(&mut self, status: u32);
}

impl<F> ExitSink for F
where
    F: FnMut(u32),
{
    fn request_exit(&mut self, status: u32) {
        self(status);
    }
}

/// Cloneable latch holding the first pending exit request.
#[derive(Debug, Clone, Default)]
pub struct ExitLatch {
    pending: Rc<Cell<Option<u32>>>,
}

impl ExitLatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn peek(&self) -> Option<u32> {
        self.pending.get()
    }

    pub fn take(&self) -> Option<u32> {
        self.pending.take()
    }
}

impl ExitSink for ExitLatch {
    fn request_exit(&mut self, status: u32) {
        if self.pending.get().is_none() {
            self.pending.set(Some(status));
        }
    }
}

pub struct Misc {
    name: String,
    exit: Box<dyn ExitSink>,
}

impl Misc {
    pub fn new(name: impl Into<String>, exit: Box<dyn ExitSink>) -> Self {
        Self {
            name: name.into(),
            exit,
        }
    }
}

impl MmioDevice for Misc {
    fn name(&self) -> &str {
        &self.name
    }

    fn mmio_read(&mut self, offset: u64, size: usize) -> Result<u32, BusError> {
        check_width(&self.name, offset, size, Access::Read)?;
        match offset {
            REG_ID => Ok(PLATFORM_ID),
            _ => Err(BusError::bad_offset(&self.name, offset, Access::Read)),
        }
    }

    fn mmio_write(&mut self, offset: u64, size: usize, value: u32) -> Result<(), BusError> {
        check_width(&self.name, offset, size, Access::Write)?;
        match offset {
            REG_EXIT => {
                tracing::info!(device = %self.name, status = value, "guest requested exit");
                self.exit.request_exit(value);
                Ok(())
            }
            _ => Err(BusError::bad_offset(&self.name, offset, Access::Write)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_register_is_read_only() {
        let mut misc = Misc::new("hc_misc", Box::new(ExitLatch::new()));
        assert_eq!(misc.mmio_read(REG_ID, 4), Ok(PLATFORM_ID));
        assert_eq!(
            misc.mmio_write(REG_ID, 4, 1),
            Err(BusError::bad_offset("hc_misc", REG_ID, Access::Write))
        );
    }

    #[test]
    fn exit_register_is_write_only() {
        let latch = ExitLatch::new();
        let mut misc = Misc::new("hc_misc", Box::new(latch.clone()));
        assert_eq!(
            misc.mmio_read(REG_EXIT, 4),
            Err(BusError::bad_offset("hc_misc", REG_EXIT, Access::Read))
        );
        assert_eq!(latch.peek(), None);

        misc.mmio_write(REG_EXIT, 4, 3).unwrap();
        misc.mmio_write(REG_EXIT, 4, 7).unwrap();
        assert_eq!(latch.take(), Some(3));
        assert_eq!(latch.take(), None);
    }

    #[test]
    fn closures_are_exit_sinks() {
        let seen = Rc::new(Cell::new(0));
        let seen_clone = Rc::clone(&seen);
        let mut misc = Misc::new(
            "hc_misc",
            Box::new(move |status: u32| seen_clone.set(status)),
        );
        misc.mmio_write(REG_EXIT, 4, 42).unwrap();
        assert_eq!(seen.get(), 42);
    }
}
