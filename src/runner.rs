pub mod runner {
    use thiserror::Error;
    use tracing::{Level, debug, info, trace};

    use bjtcpu_core::cpu::cpu::Cpu;
    use bjtcpu_core::disasm::disasm::{decode, render};
    use bjtcpu_core::error::error::LoadError;
    use bjtcpu_core::framebuffer::framebuffer::Framebuffer;
    use bjtcpu_core::isa::isa::Isa;
    use bjtcpu_core::outcome::outcome::StepOutcome;

    use crate::config::config::EmulatorConfig;
    use crate::display::display::DisplayWindow;

    #[derive(Debug, Error)]
    pub enum RunError {
        #[error(transparent)]
        Load(#[from] LoadError),
        #[error("display: {0}")]
        Display(#[from] minifb::Error),
    }

    /// Drives a CPU wired to a framebuffer and shows the framebuffer
    /// through a `DisplayWindow`.
    pub struct Runner {
        pub cpu: Cpu<Framebuffer>,
        pub display: DisplayWindow,
        config: EmulatorConfig,
        isa: Isa,
        steps: u64,
    }

    impl Runner {
        /// Build a runner and load `config.rom` into it.
        pub fn new(config: EmulatorConfig, display: DisplayWindow) -> Result<Runner, RunError> {
            let mut runner = Runner::with_display(config, display);
            runner.cpu.load_rom_file(&runner.config.rom)?;
            info!(rom = %runner.config.rom.display(), "loaded rom");
            Ok(runner)
        }

        /// Build a runner from an in-memory image, ignoring `config.rom`.
        pub fn from_image(
            config: EmulatorConfig,
            display: DisplayWindow,
            image: &[u8],
        ) -> Result<Runner, RunError> {
            let mut runner = Runner::with_display(config, display);
            runner.cpu.load_rom(image)?;
            Ok(runner)
        }

        fn with_display(config: EmulatorConfig, display: DisplayWindow) -> Runner {
            Runner {
                cpu: Cpu::new(Framebuffer::new()),
                display,
                config,
                isa: Isa::new(),
                steps: 0,
            }
        }

        pub fn config(&self) -> &EmulatorConfig {
            &self.config
        }

        pub fn steps(&self) -> u64 {
            self.steps
        }

        fn trace_instruction(&self) {
            let pc = self.cpu.pc();
            let bytes = [
                self.cpu.rom.read_linear(pc),
                self.cpu.rom.read_linear(pc.wrapping_add(1)),
                self.cpu.rom.read_linear(pc.wrapping_add(2)),
            ];
            match decode(&self.isa, &bytes) {
                Some(decoded) => trace!("{pc:04x}: {}", render(&self.isa, &decoded)),
                None => trace!("{pc:04x}: unknown opcode {:02x}", bytes[0]),
            }
        }

        fn step(&mut self) -> StepOutcome {
            if self.cpu.fetch_index() == 0 && tracing::enabled!(Level::TRACE) {
                self.trace_instruction();
            }
            self.steps += 1;
            self.cpu.step()
        }

        /// Run one frame's worth of steps and present the result. Returns
        /// false when the CPU halted during the frame.
        pub fn run_frame(&mut self) -> Result<bool, RunError> {
            for _ in 0..self.config.steps_per_frame() {
                if self.step() == StepOutcome::Halted {
                    break;
                }
            }
            self.display.present(&self.cpu.sink)?;
            Ok(!self.cpu.is_halted())
        }

        /// Headless: step until STOP or the step limit. Windowed: step at the
        /// configured rate until the window closes, keeping the last frame
        /// on screen after STOP. Returns the number of steps taken.
        pub fn run(&mut self) -> Result<u64, RunError> {
            if self.display.is_headless() {
                while self.steps < self.config.max_steps && !self.cpu.is_halted() {
                    self.step();
                }
                self.display.blit(&self.cpu.sink);
            } else {
                debug!(steps_per_frame = self.config.steps_per_frame(), "windowed run");
                while self.display.is_open() {
                    if self.cpu.is_halted() {
                        self.display.present(&self.cpu.sink)?;
                    } else {
                        self.run_frame()?;
                    }
                }
            }

            info!(steps = self.steps, halted = self.cpu.is_halted(), "run finished");
            debug!("final registers\n{}", self.cpu.reg_state());
            Ok(self.steps)
        }
    }
}
