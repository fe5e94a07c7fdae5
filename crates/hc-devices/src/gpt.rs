//! General-purpose programmable interval timer ("GPT").
//!
//! | Offset | Register | Access | Notes |
//! |---|---|---|---|
//! | `0x0` | COUNT | R/W | reload value, 20 bits |
//! | `0x4` | PRESCALE | R/W | 4-bit divider; writing stops the timer |
//! | `0x8` | CONTROL | R/W | bit0 = periodic, bit1 = enable |
//! | `0xC` | DATA | R | elapsed-time capture; writes are ignored |
//!
//! The timer counts COUNT ticks of `base_clock_hz / 2^PRESCALE` and pulses its interrupt line
//! on expiry. In one-shot mode the enable bit clears itself when the timer fires.

use bitflags::bitflags;
use hc_time::{TickMode, TickRate, TickSource};

use crate::irq::IrqLine;
use crate::mmio::{check_width, Access, BusError, MmioDevice};

pub const GPT_MMIO_SIZE: u64 = 0x100;

/// Undivided input clock of the timer block.
pub const GPT_BASE_CLOCK_HZ: u32 = 320;

pub const REG_COUNT: u64 = 0x0;
pub const REG_PRESCALE: u64 = 0x4;
pub const REG_CONTROL: u64 = 0x8;
pub const REG_DATA: u64 = 0xC;

pub const COUNT_MASK: u32 = 0xF_FFFF;
pub const PRESCALE_MASK: u32 = 0xF;

const DEFAULT_COUNT: u32 = 0x1;
const DEFAULT_PRESCALE: u32 = 0x2;

bitflags! {
    /// CONTROL register bits. Undefined bits are stored and read back unchanged.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GptControl: u32 {
        /// 0 = one-shot, 1 = periodic.
        const PERIODIC = 1 << 0;
        const ENABLE = 1 << 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GptState {
    Stopped,
    ArmedOneShot,
    ArmedPeriodic,
}

#[derive(Debug, Clone)]
pub struct GptConfig {
    pub name: String,
    pub base_clock_hz: u32,
}

impl Default for GptConfig {
    fn default() -> Self {
        Self {
            name: "hc_timer".to_owned(),
            base_clock_hz: GPT_BASE_CLOCK_HZ,
        }
    }
}

pub struct Gpt {
    name: String,
    base: TickRate,
    count: u32,
    prescale: u32,
    control: GptControl,
    rate: TickRate,
    source: Box<dyn TickSource>,
    irq: Box<dyn IrqLine>,
}

impl Gpt {
    /// Creates a stopped timer with COUNT=1 and PRESCALE=2.
    pub fn new(config: GptConfig, source: Box<dyn TickSource>, irq: Box<dyn IrqLine>) -> Self {
        let base = TickRate::new(config.base_clock_hz);
        Self {
            name: config.name,
            base,
            count: DEFAULT_COUNT,
            prescale: DEFAULT_PRESCALE,
            control: GptControl::empty(),
            rate: base.prescaled(DEFAULT_PRESCALE as u8),
            source,
            irq,
        }
    }

    pub fn state(&self) -> GptState {
        if !self.source.is_armed() {
            return GptState::Stopped;
        }
        if self.control.contains(GptControl::PERIODIC) {
            GptState::ArmedPeriodic
        } else {
            GptState::ArmedOneShot
        }
    }

    /// Current tick rate, `base_clock_hz / 2^PRESCALE`.
    pub fn rate(&self) -> TickRate {
        self.rate
    }

    pub fn control(&self) -> GptControl {
        self.control
    }

    /// Elapsed-time capture exposed through DATA.
    ///
    /// The distance between the live countdown and COUNT, plus one, truncated to 20 bits.
    fn capture(&self) -> u32 {
        if !self.source.is_armed() {
            return 0;
        }
        (self.source.remaining().abs_diff(self.count) + 1) & COUNT_MASK
    }

    /// The running period is left alone; a periodic timer reloads the new value next time.
    fn write_count(&mut self, value: u32) {
        self.count = value & COUNT_MASK;
        self.source.set_limit(self.count);
        tracing::debug!(device = %self.name, count = self.count, "gpt count set");
    }

    fn write_prescale(&mut self, value: u32) {
        self.source.stop();
        self.prescale = value & PRESCALE_MASK;
        self.rate = self.base.prescaled(self.prescale as u8);
        tracing::debug!(
            device = %self.name,
            prescale = self.prescale,
            rate = ?self.rate.as_fraction(),
            "gpt prescaler set; timer stopped"
        );
    }

    fn write_control(&mut self, value: u32) {
        self.control = GptControl::from_bits_retain(value);
        self.source.stop();

        if !self.control.contains(GptControl::ENABLE) {
            tracing::debug!(device = %self.name, "gpt stopped");
            return;
        }

        let mode = if self.control.contains(GptControl::PERIODIC) {
            TickMode::Periodic
        } else {
            TickMode::OneShot
        };
        self.source.arm(self.count, self.rate, mode);
        tracing::debug!(
            device = %self.name,
            count = self.count,
            prescale = self.prescale,
            ?mode,
            "gpt armed"
        );
    }
}

impl MmioDevice for Gpt {
    fn name(&self) -> &str {
        &self.name
    }

    fn mmio_read(&mut self, offset: u64, size: usize) -> Result<u32, BusError> {
        check_width(&self.name, offset, size, Access::Read)?;
        match offset {
            REG_COUNT => Ok(self.count),
            REG_PRESCALE => Ok(self.prescale),
            REG_CONTROL => Ok(self.control.bits()),
            REG_DATA => Ok(self.capture()),
            _ => Err(BusError::bad_offset(&self.name, offset, Access::Read)),
        }
    }

    fn mmio_write(&mut self, offset: u64, size: usize, value: u32) -> Result<(), BusError> {
        check_width(&self.name, offset, size, Access::Write)?;
        match offset {
            REG_COUNT => self.write_count(value),
            REG_PRESCALE => self.write_prescale(value),
            REG_CONTROL => self.write_control(value),
            REG_DATA => {}
            _ => return Err(BusError::bad_offset(&self.name, offset, Access::Write)),
        }
        Ok(())
    }

    fn tick(&mut self) {
        if self.control.contains(GptControl::ENABLE) {
            tracing::trace!(device = %self.name, "gpt expired");
            self.irq.pulse();
        }
        if !self.control.contains(GptControl::PERIODIC) {
            self.control.remove(GptControl::ENABLE);
        }
    }
}
