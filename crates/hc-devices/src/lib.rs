//! Register-level models of the hyperC evaluation platform peripherals.
//!
//! - [`gpt`]: general-purpose programmable interval timer.
//! - [`rtc`]: free-running seconds counter with a countdown alarm.
//! - [`misc`]: identifier register and guest-requested shutdown.
//!
//! Every device implements [`MmioDevice`]. Accesses to offsets a device does not define are
//! reported as a [`BusError`]; the board treats that as fatal.

#![forbid(unsafe_code)]

pub mod gpt;
pub mod irq;
pub mod misc;
pub mod mmio;
pub mod rtc;

pub use gpt::{Gpt, GptConfig, GptControl, GptState};
pub use irq::{IrqLine, IrqRecorder, NoIrq};
pub use misc::{ExitLatch, ExitSink, Misc};
pub use mmio::{Access, BusError, MmioDevice, REG_WIDTH};
pub use rtc::{Rtc, RtcConfig};
