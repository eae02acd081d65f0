use std::error::Error;
use std::io;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use bjtcpu_runtime::config::config::{EmulatorArgs, EmulatorConfig};
use bjtcpu_runtime::display::display::DisplayWindow;
use bjtcpu_runtime::runner::runner::Runner;

fn main() -> ExitCode {
    let args = EmulatorArgs::parse();

    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .with_writer(io::stderr)
        .init();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &EmulatorArgs) -> Result<(), Box<dyn Error>> {
    let config = EmulatorConfig::try_from(args)?;

    let display = if config.headless {
        DisplayWindow::headless(config.scale)
    } else {
        DisplayWindow::new("bjtcpu", config.scale)?
    };

    let mut runner = Runner::new(config, display)?;
    runner.run()?;

    if !runner.cpu.is_halted() {
        info!("stopped before STOP executed");
    }
    print!("{}", runner.cpu.reg_state());
    Ok(())
}
