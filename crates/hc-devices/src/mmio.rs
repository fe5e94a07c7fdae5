use std::fmt;

use thiserror::Error;

/// Width in bytes of every register on the platform.
pub const REG_WIDTH: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Access::Read => f.write_str("read"),
            Access::Write => f.write_str("write"),
        }
    }
}

/// A register access the addressed device does not define.
///
/// These mirror a hardware bus-error trap: the access is not retried, and the surrounding
/// machine is expected to halt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("{device}: bad offset {offset:#x} on {access}")]
    BadOffset {
        device: String,
        offset: u64,
        access: Access,
    },

    #[error("{device}: unsupported {size}-byte {access} at offset {offset:#x}")]
    BadWidth {
        device: String,
        offset: u64,
        size: usize,
        access: Access,
    },
}

impl BusError {
    pub fn bad_offset(device: &str, offset: u64, access: Access) -> Self {
        BusError::BadOffset {
            device: device.to_owned(),
            offset,
            access,
        }
    }

    /// Name of the device that rejected the access.
    pub fn device(&self) -> &str {
        match self {
            BusError::BadOffset { device, .. } | BusError::BadWidth { device, .. } => device,
        }
    }

    pub fn offset(&self) -> u64 {
        match self {
            BusError::BadOffset { offset, .. } | BusError::BadWidth { offset, .. } => *offset,
        }
    }
}

/// Rejects any access that is not a full 32-bit word.
pub fn check_width(device: &str, offset: u64, size: usize, access: Access) -> Result<(), BusError> {
    if size == REG_WIDTH {
        return Ok(());
    }
    Err(BusError::BadWidth {
        device: device.to_owned(),
        offset,
        size,
        access,
    })
}

/// A device reachable through a memory-mapped register window.
///
/// `offset` is relative to the start of the device's window.
pub trait MmioDevice {
    /// Diagnostic name, used in [`BusError`]s and logs.
    fn name(&self) -> &str;

    fn mmio_read(&mut self, offset: u64, size: usize) -> Result<u32, BusError>;

    fn mmio_write(&mut self, offset: u64, size: usize, value: u32) -> Result<(), BusError>;

    /// Tick handler, invoked once per expiry of the device's tick source.
    fn tick(&mut self) {}
}
