use hc_devices::{BusError, MmioDevice};
use thiserror::Error;

/// Handle to a device mapped on an [`MmioBus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceId(usize);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MapError {
    #[error("region at {base:#x} has zero size")]
    Empty { base: u64 },

    #[error("region at {base:#x} (size {size:#x}) wraps past the end of the address space")]
    Wraps { base: u64, size: u64 },

    #[error("region at {base:#x} (size {size:#x}) overlaps {existing} at {existing_base:#x}")]
    Overlap {
        base: u64,
        size: u64,
        existing: String,
        existing_base: u64,
    },
}

/// A failed bus access. Always fatal for the machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusFault {
    #[error("no device mapped at {addr:#x}")]
    Unmapped { addr: u64 },

    #[error(transparent)]
    Device(#[from] BusError),
}

#[derive(Debug, Clone, Copy)]
struct Region {
    base: u64,
    size: u64,
    device: DeviceId,
}

impl Region {
    fn end_exclusive(&self) -> u64 {
        self.base + self.size
    }

    fn contains(&self, addr: u64) -> bool {
        addr >= self.base && addr < self.end_exclusive()
    }
}

/// Physical address dispatcher for device register windows.
///
/// Regions are kept sorted by base address and may not overlap, so an address resolves to at
/// most one device.
#[derive(Default)]
pub struct MmioBus {
    devices: Vec<Box<dyn MmioDevice>>,
    regions: Vec<Region>,
}

impl MmioBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn map(
        &mut self,
        base: u64,
        size: u64,
        device: Box<dyn MmioDevice>,
    ) -> Result<DeviceId, MapError> {
        if size == 0 {
            return Err(MapError::Empty { base });
        }
        if base.checked_add(size).is_none() {
            return Err(MapError::Wraps { base, size });
        }

        let idx = self.regions.partition_point(|r| r.base < base);
        let end_exclusive = base + size;
        let neighbours = [idx.checked_sub(1), Some(idx)];
        for existing in neighbours.into_iter().flatten() {
            let Some(region) = self.regions.get(existing) else {
                continue;
            };
            if base < region.end_exclusive() && region.base < end_exclusive {
                return Err(MapError::Overlap {
                    base,
                    size,
                    existing: self.devices[region.device.0].name().to_owned(),
                    existing_base: region.base,
                });
            }
        }

        let id = DeviceId(self.devices.len());
        tracing::debug!(
            device = device.name(),
            base = format_args!("{base:#x}"),
            size,
            "mmio region mapped"
        );
        self.devices.push(device);
        self.regions.insert(
            idx,
            Region {
                base,
                size,
                device: id,
            },
        );
        Ok(id)
    }

    pub fn device_mut(&mut self, id: DeviceId) -> &mut dyn MmioDevice {
        self.devices[id.0].as_mut()
    }

    fn resolve(&self, addr: u64) -> Option<(DeviceId, u64)> {
        let idx = self.regions.partition_point(|r| r.base <= addr);
        let region = self.regions.get(idx.checked_sub(1)?)?;
        region
            .contains(addr)
            .then_some((region.device, addr - region.base))
    }

    pub fn read(&mut self, addr: u64, size: usize) -> Result<u32, BusFault> {
        let (id, offset) = self.resolve(addr).ok_or(BusFault::Unmapped { addr })?;
        Ok(self.devices[id.0].mmio_read(offset, size)?)
    }

    pub fn write(&mut self, addr: u64, size: usize, value: u32) -> Result<(), BusFault> {
        let (id, offset) = self.resolve(addr).ok_or(BusFault::Unmapped { addr })?;
        self.devices[id.0].mmio_write(offset, size, value)?;
        Ok(())
    }
}
