use std::cell::Ref;
use std::collections::HashMap;
use std::fmt;

use hc_devices::gpt::GPT_MMIO_SIZE;
use hc_devices::misc::MISC_MMIO_SIZE;
use hc_devices::rtc::RTC_MMIO_SIZE;
use hc_devices::{ExitLatch, Gpt, GptConfig, Misc, Rtc, RtcConfig, REG_WIDTH};
use hc_time::{ChannelId, SchedulerTickSource, SharedTickScheduler, TickRate, TickScheduler};
use thiserror::Error;

use crate::bus::{BusFault, DeviceId, MapError, MmioBus};
use crate::config::{BoardConfig, ConfigError, BOARD_ID, NUM_IRQ_LINES};
use crate::interrupts::{InterruptController, IrqEvent, SharedInterruptController};

const NS_PER_MS: u64 = 1_000_000;

/// Why a [`Machine`] stopped accepting work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HaltReason {
    /// The guest wrote the misc EXIT register.
    Exit(u32),
    /// An access violated a device's register protocol or hit an unmapped address.
    BusFault(BusFault),
}

impl fmt::Display for HaltReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HaltReason::Exit(status) => write!(f, "guest exit with status {status}"),
            HaltReason::BusFault(fault) => write!(f, "bus fault: {fault}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum MachineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to map device: {0}")]
    Map(#[from] MapError),

    #[error("bus fault at {addr:#x}: {fault}")]
    Bus {
        addr: u64,
        #[source]
        fault: BusFault,
    },

    #[error("machine is halted ({0})")]
    Halted(HaltReason),
}

/// The assembled board: timer devices on an MMIO bus, an interrupt controller, and the
/// virtual clock that drives them.
pub struct Machine {
    config: BoardConfig,
    ticks: SharedTickScheduler,
    interrupts: SharedInterruptController,
    bus: MmioBus,
    tick_routes: HashMap<ChannelId, DeviceId>,
    exit: ExitLatch,
    halted: Option<HaltReason>,
}

impl Machine {
    pub fn new(config: BoardConfig) -> Result<Self, MachineError> {
        config.validate()?;

        let ticks = TickScheduler::new_shared();
        let interrupts = InterruptController::new_shared(NUM_IRQ_LINES);
        let mut bus = MmioBus::new();
        let mut tick_routes = HashMap::new();

        for (idx, slot) in config.timers.iter().enumerate() {
            let source = SchedulerTickSource::new(&ticks);
            let channel = source.channel();
            let gpt = Gpt::new(
                GptConfig {
                    name: BoardConfig::timer_name(idx),
                    base_clock_hz: config.base_clock_hz,
                },
                Box::new(source),
                Box::new(InterruptController::line(&interrupts, slot.irq)),
            );
            let id = bus.map(slot.base, GPT_MMIO_SIZE, Box::new(gpt))?;
            tick_routes.insert(channel, id);
        }

        let source = SchedulerTickSource::new(&ticks);
        let channel = source.channel();
        let rtc = Rtc::new(
            RtcConfig {
                name: "rtc".to_owned(),
                tick_rate: TickRate::new(config.rtc_tick_hz),
            },
            Box::new(source),
            Box::new(InterruptController::line(&interrupts, config.rtc.irq)),
        );
        let id = bus.map(config.rtc.base, RTC_MMIO_SIZE, Box::new(rtc))?;
        tick_routes.insert(channel, id);

        let exit = ExitLatch::new();
        let misc = Misc::new("misc", Box::new(exit.clone()));
        bus.map(config.misc_base, MISC_MMIO_SIZE, Box::new(misc))?;

        tracing::info!(
            machine = %config.machine,
            cpu = config.machine.cpu_model(),
            cpus = config.smp_cpus,
            ram_size = config.ram_size,
            board_id = format_args!("{BOARD_ID:#x}"),
            timers = config.timers.len(),
            "machine created: {}",
            config.machine.description()
        );

        Ok(Self {
            config,
            ticks,
            interrupts,
            bus,
            tick_routes,
            exit,
            halted: None,
        })
    }

    pub fn config(&self) -> &BoardConfig {
        &self.config
    }

    /// Virtual time since reset.
    pub fn now_ns(&self) -> u64 {
        self.ticks.borrow().now_ns()
    }

    pub fn interrupts(&self) -> Ref<'_, InterruptController> {
        self.interrupts.borrow()
    }

    /// Drains the interrupt controller's raise/lower log.
    pub fn take_irq_events(&self) -> Vec<IrqEvent> {
        self.interrupts.borrow_mut().take_events()
    }

    pub fn halt_reason(&self) -> Option<&HaltReason> {
        self.halted.as_ref()
    }

    pub fn exit_status(&self) -> Option<u32> {
        match self.halted {
            Some(HaltReason::Exit(status)) => Some(status),
            _ => None,
        }
    }

    pub fn read(&mut self, addr: u64, size: usize) -> Result<u32, MachineError> {
        self.ensure_running()?;
        match self.bus.read(addr, size) {
            Ok(value) => {
                tracing::trace!(addr = format_args!("{addr:#x}"), value, "mmio read");
                Ok(value)
            }
            Err(fault) => Err(self.fault(addr, fault)),
        }
    }

    pub fn write(&mut self, addr: u64, size: usize, value: u32) -> Result<(), MachineError> {
        self.ensure_running()?;
        if let Err(fault) = self.bus.write(addr, size, value) {
            return Err(self.fault(addr, fault));
        }
        if let Some(status) = self.exit.take() {
            tracing::info!(status, now_ns = self.now_ns(), "machine halted by guest");
            self.halted = Some(HaltReason::Exit(status));
        }
        Ok(())
    }

    pub fn read_u32(&mut self, addr: u64) -> Result<u32, MachineError> {
        self.read(addr, REG_WIDTH)
    }

    pub fn write_u32(&mut self, addr: u64, value: u32) -> Result<(), MachineError> {
        self.write(addr, REG_WIDTH, value)
    }

    /// Runs virtual time forward by `ns`, delivering every expiry on the way.
    pub fn advance_ns(&mut self, ns: u64) -> Result<(), MachineError> {
        let until_ns = self.now_ns().saturating_add(ns);
        self.run_until_ns(until_ns)
    }

    pub fn advance_ms(&mut self, ms: u64) -> Result<(), MachineError> {
        self.advance_ns(ms.saturating_mul(NS_PER_MS))
    }

    /// Delivers every expiry due at or before `until_ns`, in deadline order, then moves the
    /// clock to `until_ns`.
    pub fn run_until_ns(&mut self, until_ns: u64) -> Result<(), MachineError> {
        self.ensure_running()?;
        loop {
            // The borrow must end before the device runs: its tick may re-arm the scheduler.
            let event = self.ticks.borrow_mut().pop_due(until_ns);
            let Some(event) = event else {
                break;
            };
            let Some(&id) = self.tick_routes.get(&event.channel) else {
                continue;
            };
            let device = self.bus.device_mut(id);
            tracing::trace!(device = device.name(), at_ns = event.at_ns, "tick");
            device.tick();
        }
        self.ticks.borrow_mut().advance_to(until_ns);
        Ok(())
    }

    fn ensure_running(&self) -> Result<(), MachineError> {
        match &self.halted {
            Some(reason) => Err(MachineError::Halted(reason.clone())),
            None => Ok(()),
        }
    }

    fn fault(&mut self, addr: u64, fault: BusFault) -> MachineError {
        tracing::error!(addr = format_args!("{addr:#x}"), %fault, "bus protocol violation; halting");
        self.halted = Some(HaltReason::BusFault(fault.clone()));
        MachineError::Bus { addr, fault }
    }
}
