#![forbid(unsafe_code)]

// Native-only runner. wasm32 builds of the workspace get an empty `main`.
#[cfg(target_arch = "wasm32")]
fn main() {}

#[cfg(not(target_arch = "wasm32"))]
mod native {
    use std::path::PathBuf;
    use std::process::ExitCode;

    use anyhow::{Context, Result};
    use clap::Parser;
    use hc_machine::{BoardConfig, Machine, MachineKind, Script, ScriptReport};
    use tracing_subscriber::EnvFilter;

    #[derive(Debug, Parser)]
    #[command(
        name = "hc-machine",
        about = "Runs register access scripts against the hyperC evaluation platform timers"
    )]
    struct Args {
        /// JSON board description. Fields left out take the default board's values.
        #[arg(long)]
        config: Option<PathBuf>,

        /// JSON list of read/write/advance/expect steps to run.
        #[arg(long)]
        script: Option<PathBuf>,

        /// Board variant (overrides the config file).
        #[arg(long)]
        machine: Option<MachineKind>,

        /// Number of CPUs, 1 to 4 (overrides the config file).
        #[arg(long)]
        cpus: Option<u32>,

        /// Virtual milliseconds to run after the script finishes.
        #[arg(long, default_value_t = 0)]
        run_ms: u64,

        /// Log filter, e.g. `debug` or `hc_devices=trace`. Defaults to `RUST_LOG`.
        #[arg(long)]
        log: Option<String>,

        /// Print the run report as JSON instead of text.
        #[arg(long)]
        json: bool,
    }

    fn init_tracing(filter: Option<&str>) -> Result<()> {
        let filter = match filter {
            Some(directives) => EnvFilter::try_new(directives)
                .with_context(|| format!("invalid --log filter: {directives}"))?,
            None => EnvFilter::from_default_env(),
        };
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
        Ok(())
    }

    fn board_config(args: &Args) -> Result<BoardConfig> {
        let mut config = match &args.config {
            Some(path) => BoardConfig::from_path(path)?,
            None => BoardConfig::default(),
        };
        if let Some(machine) = args.machine {
            config.machine = machine;
        }
        if let Some(cpus) = args.cpus {
            config.smp_cpus = cpus;
        }
        config.validate()?;
        Ok(config)
    }

    fn run(args: &Args) -> Result<ScriptReport> {
        let config = board_config(args)?;
        let mut machine = Machine::new(config).context("failed to build machine")?;

        let script = match &args.script {
            Some(path) => Script::from_path(path)?,
            None => Script::default(),
        };
        let mut report = script.run(&mut machine)?;

        if args.run_ms > 0 && machine.halt_reason().is_none() {
            machine
                .advance_ms(args.run_ms)
                .context("failed to run machine")?;
            report.end_ns = machine.now_ns();
            report.irq_pulses = machine.interrupts().active_lines().into_iter().collect();
        }
        Ok(report)
    }

    fn print_report(report: &ScriptReport, json: bool) -> Result<()> {
        if json {
            println!("{}", serde_json::to_string_pretty(report)?);
            return Ok(());
        }
        for read in &report.reads {
            println!(
                "read  step={} t={}ns addr={:#010x} value={:#010x}",
                read.step, read.at_ns, read.addr, read.value
            );
        }
        for (line, pulses) in &report.irq_pulses {
            println!("irq   line={line} pulses={pulses}");
        }
        match report.exit_status {
            Some(status) => println!("exit  status={status} t={}ns", report.end_ns),
            None => println!("done  t={}ns", report.end_ns),
        }
        Ok(())
    }

    pub fn main() -> ExitCode {
        let args = Args::parse();
        if let Err(err) = init_tracing(args.log.as_deref()) {
            eprintln!("error: {err:#}");
            return ExitCode::FAILURE;
        }

        let report = match run(&args) {
            Ok(report) => report,
            Err(err) => {
                eprintln!("error: {err:#}");
                return ExitCode::FAILURE;
            }
        };
        if let Err(err) = print_report(&report, args.json) {
            eprintln!("error: {err:#}");
            return ExitCode::FAILURE;
        }

        match report.exit_status {
            Some(status) => ExitCode::from((status & 0xFF) as u8),
            None => ExitCode::SUCCESS,
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn main() -> std::process::ExitCode {
    native::main()
}
