use std::error::Error;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use tracing::{Level, debug, info};

use bjtcpu_core::assembler::assembler::assemble_file;

#[derive(Parser, Debug)]
#[command(name = "bjtasm", version, about = "Assemble bjtcpu source into a ROM image")]
struct Args {
    /// Entry source file
    source: PathBuf,

    /// Output image (defaults to the source path with a .bin extension)
    #[arg(short, long)]
    out: Option<PathBuf>,

    #[arg(short, long, default_value_t = Level::INFO)]
    log_level: Level,
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            println!("{}", err.render());
            return if err.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .with_writer(io::stderr)
        .init();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            println!("bjtasm: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), Box<dyn Error>> {
    let assembly = assemble_file(&args.source)?;
    debug!(entry = assembly.entry_point(), labels = assembly.labels.len(), "assembled");

    let output = args
        .out
        .clone()
        .unwrap_or_else(|| default_output_path(&args.source));

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|err| format!("failed to create {}: {err}", parent.display()))?;
    }
    fs::write(&output, &assembly.image)
        .map_err(|err| format!("failed to write {}: {err}", output.display()))?;

    info!(bytes = assembly.image.len(), out = %output.display(), "wrote image");
    Ok(())
}

fn default_output_path(input: &Path) -> PathBuf {
    let mut out = input.to_path_buf();
    out.set_extension("bin");
    out
}
