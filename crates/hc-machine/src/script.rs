//! Scripted register access traces.
//!
//! A script is a JSON array of steps run in order against a [`Machine`]:
//!
//! ```json
//! [
//!     { "write": { "addr": 2958032904, "value": 2 } },
//!     { "advance_ms": 100 },
//!     { "expect": { "addr": 2958032904, "value": 0 } },
//!     { "read": { "addr": 2958032908 } }
//! ]
//! ```
//!
//! Execution stops early, without error, once the guest writes the misc EXIT register.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::machine::{Machine, MachineError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum Step {
    Read { addr: u64 },
    Write { addr: u64, value: u32 },
    /// Read `addr` and fail the script unless it holds `value`.
    Expect { addr: u64, value: u32 },
    AdvanceNs(u64),
    AdvanceMs(u64),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Script {
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReadRecord {
    pub step: usize,
    pub at_ns: u64,
    pub addr: u64,
    pub value: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScriptReport {
    pub reads: Vec<ReadRecord>,
    /// Index of the step that made the guest exit.
    pub halted_at_step: Option<usize>,
    pub exit_status: Option<u32>,
    pub end_ns: u64,
    /// Rising edges per interrupt line, for lines that fired.
    pub irq_pulses: BTreeMap<u32, u64>,
}

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid script: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("step {step}: expected {expected:#x} at {addr:#x}, read {actual:#x}")]
    Mismatch {
        step: usize,
        addr: u64,
        expected: u32,
        actual: u32,
    },

    #[error("step {step}: {source}")]
    Machine {
        step: usize,
        #[source]
        source: MachineError,
    },
}

impl Script {
    pub fn from_json_str(json: &str) -> Result<Self, ScriptError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ScriptError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ScriptError::Io {
            path: path.to_owned(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn run(&self, machine: &mut Machine) -> Result<ScriptReport, ScriptError> {
        let mut report = ScriptReport::default();

        for (step, op) in self.steps.iter().enumerate() {
            let at = |source| ScriptError::Machine { step, source };
            match *op {
                Step::Read { addr } => {
                    let value = machine.read_u32(addr).map_err(at)?;
                    report.reads.push(ReadRecord {
                        step,
                        at_ns: machine.now_ns(),
                        addr,
                        value,
                    });
                }
                Step::Write { addr, value } => machine.write_u32(addr, value).map_err(at)?,
                Step::Expect { addr, value } => {
                    let actual = machine.read_u32(addr).map_err(at)?;
                    if actual != value {
                        return Err(ScriptError::Mismatch {
                            step,
                            addr,
                            expected: value,
                            actual,
                        });
                    }
                }
                Step::AdvanceNs(ns) => machine.advance_ns(ns).map_err(at)?,
                Step::AdvanceMs(ms) => machine.advance_ms(ms).map_err(at)?,
            }

            if let Some(status) = machine.exit_status() {
                tracing::debug!(step, status, "script stopped by guest exit");
                report.halted_at_step = Some(step);
                report.exit_status = Some(status);
                break;
            }
        }

        report.end_ns = machine.now_ns();
        report.irq_pulses = machine.interrupts().active_lines().into_iter().collect();
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BoardConfig, DEFAULT_GPT0, DEFAULT_MISC_BASE};
    use hc_devices::gpt::{REG_CONTROL, REG_COUNT};
    use hc_devices::misc::{PLATFORM_ID, REG_EXIT, REG_ID};

    fn machine() -> Machine {
        Machine::new(BoardConfig::default()).unwrap()
    }

    #[test]
    fn parses_every_step_kind() {
        let script = Script::from_json_str(
            r#"[
                { "read": { "addr": 16 } },
                { "write": { "addr": 16, "value": 1 } },
                { "expect": { "addr": 16, "value": 2 } },
                { "advance_ns": 5 },
                { "advance_ms": 3 }
            ]"#,
        )
        .unwrap();
        assert_eq!(
            script.steps,
            vec![
                Step::Read { addr: 16 },
                Step::Write { addr: 16, value: 1 },
                Step::Expect { addr: 16, value: 2 },
                Step::AdvanceNs(5),
                Step::AdvanceMs(3),
            ]
        );
    }

    #[test]
    fn unknown_steps_are_rejected() {
        assert!(matches!(
            Script::from_json_str(r#"[{ "poke": { "addr": 1 } }]"#),
            Err(ScriptError::Parse(_))
        ));
    }

    #[test]
    fn records_reads_and_interrupts() {
        let gpt = DEFAULT_GPT0.base;
        let script = Script {
            steps: vec![
                Step::Read {
                    addr: DEFAULT_MISC_BASE + REG_ID,
                },
                Step::Write {
                    addr: gpt + REG_COUNT,
                    value: 4,
                },
                Step::Write {
                    addr: gpt + REG_CONTROL,
                    value: 0b11,
                },
                // 80 Hz: 4 ticks every 50 ms.
                Step::AdvanceMs(200),
                Step::Expect {
                    addr: gpt + REG_CONTROL,
                    value: 0b11,
                },
            ],
        };

        let mut m = machine();
        let report = script.run(&mut m).unwrap();
        assert_eq!(
            report.reads,
            vec![ReadRecord {
                step: 0,
                at_ns: 0,
                addr: DEFAULT_MISC_BASE + REG_ID,
                value: PLATFORM_ID,
            }]
        );
        assert_eq!(report.end_ns, 200_000_000);
        assert_eq!(report.irq_pulses.get(&DEFAULT_GPT0.irq), Some(&4));
        assert_eq!(report.exit_status, None);
    }

    #[test]
    fn stops_at_guest_exit() {
        let script = Script {
            steps: vec![
                Step::Write {
                    addr: DEFAULT_MISC_BASE + REG_EXIT,
                    value: 3,
                },
                Step::Read { addr: 0 },
            ],
        };
        let report = script.run(&mut machine()).unwrap();
        assert_eq!(report.halted_at_step, Some(0));
        assert_eq!(report.exit_status, Some(3));
    }

    #[test]
    fn mismatch_names_the_step() {
        let script = Script {
            steps: vec![Step::Expect {
                addr: DEFAULT_MISC_BASE + REG_ID,
                value: 0,
            }],
        };
        let err = script.run(&mut machine()).unwrap_err();
        assert!(matches!(
            err,
            ScriptError::Mismatch {
                step: 0,
                actual: PLATFORM_ID,
                ..
            }
        ));
    }

    #[test]
    fn bus_faults_abort_the_script() {
        let script = Script {
            steps: vec![Step::Read { addr: 0x10 }, Step::AdvanceMs(1)],
        };
        let err = script.run(&mut machine()).unwrap_err();
        assert!(matches!(err, ScriptError::Machine { step: 0, .. }), "{err}");
    }
}
