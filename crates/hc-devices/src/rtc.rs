//! Real-time counter with a countdown alarm ("RTC").
//!
//! The counter advances once per tick for the lifetime of the device. COUNTDOWN is an
//! independent alarm: while nonzero it decrements on every tick, and the interrupt line pulses
//! when it reaches zero. It then stays at zero until software writes it again.

use hc_time::{TickMode, TickRate, TickSource};

use crate::irq::IrqLine;
use crate::mmio::{check_width, Access, BusError, MmioDevice};

pub const RTC_MMIO_SIZE: u64 = 0x100;

pub const REG_COUNTDOWN: u64 = 0x0;
pub const REG_SECONDS: u64 = 0x4;

const DEFAULT_COUNTDOWN: u32 = 1;
const DEFAULT_SECONDS: u32 = 10;

#[derive(Debug, Clone)]
pub struct RtcConfig {
    pub name: String,
    /// Rate of the seconds tick.
    pub tick_rate: TickRate,
}

impl Default for RtcConfig {
    fn default() -> Self {
        Self {
            name: "hc_rtc".to_owned(),
            tick_rate: TickRate::new(1),
        }
    }
}

pub struct Rtc {
    name: String,
    countdown: u32,
    seconds: u32,
    // Armed once in `new`; kept only so the arming lives as long as the device.
    _source: Box<dyn TickSource>,
    irq: Box<dyn IrqLine>,
}

impl Rtc {
    /// Creates a running RTC with SECONDS=10 and COUNTDOWN=1.
    pub fn new(config: RtcConfig, mut source: Box<dyn TickSource>, irq: Box<dyn IrqLine>) -> Self {
        source.arm(1, config.tick_rate, TickMode::Periodic);
        Self {
            name: config.name,
            countdown: DEFAULT_COUNTDOWN,
            seconds: DEFAULT_SECONDS,
            _source: source,
            irq,
        }
    }

    pub fn seconds(&self) -> u32 {
        self.seconds
    }

    pub fn countdown(&self) -> u32 {
        self.countdown
    }
}

impl MmioDevice for Rtc {
    fn name(&self) -> &str {
        &self.name
    }

    fn mmio_read(&mut self, offset: u64, size: usize) -> Result<u32, BusError> {
        check_width(&self.name, offset, size, Access::Read)?;
        match offset {
            REG_COUNTDOWN => Ok(self.countdown),
            REG_SECONDS => Ok(self.seconds),
            _ => Err(BusError::bad_offset(&self.name, offset, Access::Read)),
        }
    }

    fn mmio_write(&mut self, offset: u64, size: usize, value: u32) -> Result<(), BusError> {
        check_width(&self.name, offset, size, Access::Write)?;
        match offset {
            REG_COUNTDOWN => {
                self.countdown = value;
                tracing::debug!(device = %self.name, countdown = value, "rtc alarm set");
            }
            REG_SECONDS => {}
            _ => return Err(BusError::bad_offset(&self.name, offset, Access::Write)),
        }
        Ok(())
    }

    fn tick(&mut self) {
        self.seconds = self.seconds.wrapping_add(1);
        if self.countdown == 0 {
            return;
        }
        self.countdown -= 1;
        if self.countdown == 0 {
            tracing::trace!(device = %self.name, seconds = self.seconds, "rtc alarm expired");
            self.irq.pulse();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::irq::IrqRecorder;
    use hc_time::ManualTickSource;

    fn rtc() -> (Rtc, ManualTickSource, IrqRecorder) {
        let ticks = ManualTickSource::new();
        let irq = IrqRecorder::new();
        let rtc = Rtc::new(
            RtcConfig::default(),
            Box::new(ticks.clone()),
            Box::new(irq.clone()),
        );
        (rtc, ticks, irq)
    }

    fn run(rtc: &mut Rtc, ticks: &ManualTickSource, n: usize) {
        for _ in 0..n {
            if ticks.step() {
                rtc.tick();
            }
        }
    }

    #[test]
    fn arms_a_periodic_one_tick_source_at_construction() {
        let (_rtc, ticks, _irq) = rtc();
        assert_eq!(ticks.arm_count(), 1);
        assert_eq!(ticks.limit(), Some(1));
        assert_eq!(ticks.mode(), Some(TickMode::Periodic));
        assert_eq!(ticks.rate(), Some(TickRate::new(1)));
    }

    #[test]
    fn default_alarm_fires_on_first_tick_then_holds_at_zero() {
        let (mut rtc, ticks, irq) = rtc();
        assert_eq!(rtc.mmio_read(REG_COUNTDOWN, 4), Ok(1));
        assert_eq!(rtc.mmio_read(REG_SECONDS, 4), Ok(10));

        run(&mut rtc, &ticks, 1);
        assert_eq!(rtc.mmio_read(REG_SECONDS, 4), Ok(11));
        assert_eq!(rtc.mmio_read(REG_COUNTDOWN, 4), Ok(0));
        assert_eq!(irq.levels(), vec![true, false]);

        run(&mut rtc, &ticks, 5);
        assert_eq!(rtc.mmio_read(REG_SECONDS, 4), Ok(16));
        assert_eq!(rtc.mmio_read(REG_COUNTDOWN, 4), Ok(0));
        assert_eq!(irq.pulses(), 1);
    }

    #[test]
    fn rewritten_alarm_fires_on_the_last_tick_only() {
        let (mut rtc, ticks, irq) = rtc();
        run(&mut rtc, &ticks, 1);
        irq.clear();

        rtc.mmio_write(REG_COUNTDOWN, 4, 5).unwrap();
        for remaining in (1..5).rev() {
            run(&mut rtc, &ticks, 1);
            assert_eq!(rtc.mmio_read(REG_COUNTDOWN, 4), Ok(remaining));
            assert_eq!(irq.pulses(), 0);
        }
        run(&mut rtc, &ticks, 1);
        assert_eq!(irq.pulses(), 1);

        run(&mut rtc, &ticks, 10);
        assert_eq!(irq.pulses(), 1);
        assert_eq!(rtc.mmio_read(REG_COUNTDOWN, 4), Ok(0));
    }

    #[test]
    fn zero_countdown_disables_the_alarm() {
        let (mut rtc, ticks, irq) = rtc();
        rtc.mmio_write(REG_COUNTDOWN, 4, 0).unwrap();
        run(&mut rtc, &ticks, 3);
        assert_eq!(rtc.countdown(), 0);
        assert_eq!(irq.pulses(), 0);
        assert_eq!(rtc.seconds(), 13);
    }

    #[test]
    fn seconds_ignores_writes_and_wraps() {
        let (mut rtc, ticks, _irq) = rtc();
        rtc.mmio_write(REG_SECONDS, 4, 1234).unwrap();
        assert_eq!(rtc.mmio_read(REG_SECONDS, 4), Ok(10));

        rtc.seconds = u32::MAX;
        run(&mut rtc, &ticks, 1);
        assert_eq!(rtc.seconds(), 0);
    }

    #[test]
    fn unmapped_offsets_are_bus_errors() {
        let (mut rtc, _ticks, _irq) = rtc();
        assert_eq!(
            rtc.mmio_read(0x8, 4),
            Err(BusError::bad_offset("hc_rtc", 0x8, Access::Read))
        );
        assert_eq!(
            rtc.mmio_write(0xC, 4, 0),
            Err(BusError::bad_offset("hc_rtc", 0xC, Access::Write))
        );
    }
}
