pub mod config {
    use std::path::PathBuf;

    use clap::{ArgAction, Parser};
    use clap::builder::FalseyValueParser;
    use thiserror::Error;
    use tracing::Level;

    use crate::display::display::{SCALE, TARGET_FPS};

    pub const DEFAULT_HZ: u32 = 2000;
    pub const DEFAULT_MAX_STEPS: u64 = 1_000_000;
    pub const MAX_SCALE: usize = 32;

    #[derive(Parser, Debug)]
    #[command(name = "bjtcpu", version, about = "Run a bjtcpu ROM image")]
    pub struct EmulatorArgs {
        /// ROM image produced by bjtasm
        pub rom: PathBuf,

        /// Emulator steps per second
        #[arg(long, default_value_t = DEFAULT_HZ)]
        pub hz: u32,

        /// Window pixels per framebuffer pixel
        #[arg(long, default_value_t = SCALE)]
        pub scale: usize,

        /// Run without opening a window
        #[arg(
            long,
            env = "BJTCPU_HEADLESS",
            action = ArgAction::SetTrue,
            value_parser = FalseyValueParser::new()
        )]
        pub headless: bool,

        /// Step limit for headless runs
        #[arg(long, default_value_t = DEFAULT_MAX_STEPS)]
        pub max_steps: u64,

        #[arg(short, long, default_value_t = Level::INFO)]
        pub log_level: Level,
    }

    #[derive(Debug, Error, PartialEq, Eq)]
    pub enum ConfigError {
        #[error("clock rate must be at least 1 step per second")]
        ZeroClock,
        #[error("scale {0} is outside 1..={MAX_SCALE}")]
        Scale(usize),
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct EmulatorConfig {
        pub rom: PathBuf,
        pub hz: u32,
        pub scale: usize,
        pub headless: bool,
        pub max_steps: u64,
    }

    impl EmulatorConfig {
        pub fn new(rom: PathBuf) -> EmulatorConfig {
            EmulatorConfig {
                rom,
                hz: DEFAULT_HZ,
                scale: SCALE,
                headless: false,
                max_steps: DEFAULT_MAX_STEPS,
            }
        }

        /// `step` calls per presented frame, never less than one.
        pub fn steps_per_frame(&self) -> u32 {
            (self.hz / TARGET_FPS as u32).max(1)
        }
    }

    impl TryFrom<&EmulatorArgs> for EmulatorConfig {
        type Error = ConfigError;

        fn try_from(args: &EmulatorArgs) -> Result<EmulatorConfig, ConfigError> {
            if args.hz == 0 {
                return Err(ConfigError::ZeroClock);
            }
            if !(1..=MAX_SCALE).contains(&args.scale) {
                return Err(ConfigError::Scale(args.scale));
            }
            Ok(EmulatorConfig {
                rom: args.rom.clone(),
                hz: args.hz,
                scale: args.scale,
                headless: args.headless,
                max_steps: args.max_steps,
            })
        }
    }
}
