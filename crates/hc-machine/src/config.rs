use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use hc_devices::gpt::{GPT_BASE_CLOCK_HZ, GPT_MMIO_SIZE};
use hc_devices::misc::MISC_MMIO_SIZE;
use hc_devices::rtc::RTC_MMIO_SIZE;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MAX_CPUS: u32 = 4;

/// Inputs of the board interrupt controller.
pub const NUM_IRQ_LINES: u32 = 64;

pub const DEFAULT_RAM_SIZE: u64 = 0x1000_0000;
pub const BOARD_ID: u32 = 0x3088;

pub const DEFAULT_MISC_BASE: u64 = 0xB010_0000;
pub const DEFAULT_GPT0: DeviceSlot = DeviceSlot {
    base: 0xB050_0000,
    irq: 0,
};
pub const DEFAULT_GPT1: DeviceSlot = DeviceSlot {
    base: 0xB060_0000,
    irq: 1,
};
pub const DEFAULT_RTC: DeviceSlot = DeviceSlot {
    base: 0xB080_0000,
    irq: 3,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MachineKind {
    #[default]
    HcA,
    HcR,
}

impl MachineKind {
    pub fn name(self) -> &'static str {
        match self {
            MachineKind::HcA => "hc-a",
            MachineKind::HcR => "hc-r",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            MachineKind::HcA => "socware.net cortex-A emulation",
            MachineKind::HcR => "socware.net cortex-R emulation",
        }
    }

    pub fn cpu_model(self) -> &'static str {
        match self {
            MachineKind::HcA => "cortex-a9",
            MachineKind::HcR => "cortex-r5",
        }
    }
}

impl fmt::Display for MachineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown machine {0:?} (expected hc-a or hc-r)")]
pub struct ParseMachineKindError(String);

impl FromStr for MachineKind {
    type Err = ParseMachineKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hc-a" => Ok(MachineKind::HcA),
            "hc-r" => Ok(MachineKind::HcR),
            other => Err(ParseMachineKindError(other.to_owned())),
        }
    }
}

/// Where a device sits: its register window base and interrupt controller input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceSlot {
    pub base: u64,
    pub irq: u32,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid board config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("smp_cpus must be between 1 and {max} (got {got})")]
    CpuCount { got: u32, max: u32 },

    #[error("{0} must be non-zero")]
    Zero(&'static str),

    #[error("{device} uses IRQ {irq}; the interrupt controller has {lines} inputs")]
    IrqOutOfRange {
        device: String,
        irq: u32,
        lines: u32,
    },

    #[error("{first} and {second} both use IRQ {irq}")]
    IrqShared {
        first: String,
        second: String,
        irq: u32,
    },

    #[error("{first} at {first_base:#x} overlaps {second} at {second_base:#x}")]
    Overlap {
        first: String,
        first_base: u64,
        second: String,
        second_base: u64,
    },
}

/// Process-wide board wiring, fixed at machine construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BoardConfig {
    pub machine: MachineKind,
    pub smp_cpus: u32,
    pub ram_size: u64,
    /// Undivided GPT input clock.
    pub base_clock_hz: u32,
    pub rtc_tick_hz: u32,
    pub timers: Vec<DeviceSlot>,
    pub rtc: DeviceSlot,
    pub misc_base: u64,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            machine: MachineKind::HcA,
            smp_cpus: 1,
            ram_size: DEFAULT_RAM_SIZE,
            base_clock_hz: GPT_BASE_CLOCK_HZ,
            rtc_tick_hz: 1,
            timers: vec![DEFAULT_GPT0, DEFAULT_GPT1],
            rtc: DEFAULT_RTC,
            misc_base: DEFAULT_MISC_BASE,
        }
    }
}

/// A named register window, used for validation and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window {
    pub name: String,
    pub base: u64,
    pub size: u64,
    pub irq: Option<u32>,
}

impl BoardConfig {
    /// Parses and validates a JSON board description.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Name given to the GPT in slot `index` of [`timers`](Self::timers).
    pub fn timer_name(index: usize) -> String {
        format!("gpt{index}")
    }

    /// Every device window on the board, in construction order.
    pub fn windows(&self) -> Vec<Window> {
        let mut windows: Vec<Window> = self
            .timers
            .iter()
            .enumerate()
            .map(|(idx, slot)| Window {
                name: Self::timer_name(idx),
                base: slot.base,
                size: GPT_MMIO_SIZE,
                irq: Some(slot.irq),
            })
            .collect();
        windows.push(Window {
            name: "rtc".to_owned(),
            base: self.rtc.base,
            size: RTC_MMIO_SIZE,
            irq: Some(self.rtc.irq),
        });
        windows.push(Window {
            name: "misc".to_owned(),
            base: self.misc_base,
            size: MISC_MMIO_SIZE,
            irq: None,
        });
        windows
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_CPUS).contains(&self.smp_cpus) {
            return Err(ConfigError::CpuCount {
                got: self.smp_cpus,
                max: MAX_CPUS,
            });
        }
        if self.ram_size == 0 {
            return Err(ConfigError::Zero("ram_size"));
        }
        if self.base_clock_hz == 0 {
            return Err(ConfigError::Zero("base_clock_hz"));
        }
        if self.rtc_tick_hz == 0 {
            return Err(ConfigError::Zero("rtc_tick_hz"));
        }

        let windows = self.windows();
        for (idx, window) in windows.iter().enumerate() {
            if let Some(irq) = window.irq {
                if irq >= NUM_IRQ_LINES {
                    return Err(ConfigError::IrqOutOfRange {
                        device: window.name.clone(),
                        irq,
                        lines: NUM_IRQ_LINES,
                    });
                }
            }

            for earlier in &windows[..idx] {
                if window.irq.is_some() && window.irq == earlier.irq {
                    return Err(ConfigError::IrqShared {
                        first: earlier.name.clone(),
                        second: window.name.clone(),
                        irq: window.irq.unwrap_or_default(),
                    });
                }
                if overlaps(earlier, window) {
                    return Err(ConfigError::Overlap {
                        first: earlier.name.clone(),
                        first_base: earlier.base,
                        second: window.name.clone(),
                        second_base: window.base,
                    });
                }
            }
        }
        Ok(())
    }
}

fn overlaps(a: &Window, b: &Window) -> bool {
    let a_end = u128::from(a.base) + u128::from(a.size);
    let b_end = u128::from(b.base) + u128::from(b.size);
    u128::from(a.base) < b_end && u128::from(b.base) < a_end
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_board_is_valid() {
        let config = BoardConfig::default();
        config.validate().unwrap();
        let names: Vec<String> = config.windows().into_iter().map(|w| w.name).collect();
        assert_eq!(names, ["gpt0", "gpt1", "rtc", "misc"]);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let config = BoardConfig::from_json_str(r#"{ "machine": "hc-r", "smp_cpus": 2 }"#)
            .unwrap();
        assert_eq!(config.machine, MachineKind::HcR);
        assert_eq!(config.smp_cpus, 2);
        assert_eq!(config.timers, vec![DEFAULT_GPT0, DEFAULT_GPT1]);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = BoardConfig::from_json_str(r#"{ "cpus": 2 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn cpu_count_is_bounded() {
        let config = BoardConfig {
            smp_cpus: 5,
            ..BoardConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::CpuCount { got: 5, max: 4 })
        ));
    }

    #[test]
    fn overlapping_windows_are_rejected() {
        let config = BoardConfig {
            timers: vec![DeviceSlot {
                base: DEFAULT_RTC.base + 0x80,
                irq: 9,
            }],
            ..BoardConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(
            matches!(err, ConfigError::Overlap { ref first, ref second, .. } if first == "gpt0" && second == "rtc"),
            "{err}"
        );
    }

    #[test]
    fn shared_irq_lines_are_rejected() {
        let config = BoardConfig {
            rtc: DeviceSlot {
                base: DEFAULT_RTC.base,
                irq: DEFAULT_GPT1.irq,
            },
            ..BoardConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::IrqShared { irq: 1, .. })
        ));
    }

    #[test]
    fn irq_must_exist_on_the_controller() {
        let config = BoardConfig {
            timers: vec![DeviceSlot {
                base: DEFAULT_GPT0.base,
                irq: 64,
            }],
            ..BoardConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::IrqOutOfRange { irq: 64, .. })
        ));
    }

    #[test]
    fn boards_without_timers_are_allowed() {
        let config = BoardConfig {
            timers: Vec::new(),
            ..BoardConfig::default()
        };
        config.validate().unwrap();
    }

    #[test]
    fn machine_kind_parses_cli_names() {
        assert_eq!("hc-a".parse::<MachineKind>(), Ok(MachineKind::HcA));
        assert_eq!("hc-r".parse::<MachineKind>(), Ok(MachineKind::HcR));
        assert!("hc-x".parse::<MachineKind>().is_err());
    }
}
