pub mod cpu {
    use std::fmt;
    use std::fs;
    use std::path::Path;

    use tracing::trace;

    use crate::banked_memory::banked_memory::BankedMemory;
    use crate::bjt_engine::bjt_engine::*;
    use crate::device::device::SignalSink;
    use crate::error::error::LoadError;
    use crate::isa::isa::{
        REG_DISPLAY, REG_READABLE, REG_WRITABLE, REGISTERS, family, instruction_length,
    };
    use crate::outcome::outcome::StepOutcome;

    #[derive(Clone, Debug, Default, PartialEq, Eq)]
    pub struct Registers {
        pub file: [u8; 0x10],
        pub flags: u8,
        pub pc: u16,
    }

    impl fmt::Display for Registers {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            writeln!(f, "PC    - {:04x}", self.pc)?;
            writeln!(f, "FLAGS - {:04b} (NOCZ)", self.flags & 0xF)?;
            for (name, idx) in REGISTERS {
                writeln!(f, "{name:<5} - {:02x}", self.file[idx as usize])?;
            }
            Ok(())
        }
    }

    /// The whole machine: registers, staging state for the instruction in
    /// flight, both stores, and whatever sink the display register feeds.
    ///
    /// `step` is the only thing that advances it. Each call either stages
    /// one more instruction byte or runs one micro-step of the staged
    /// instruction.
    pub struct Cpu<S: SignalSink> {
        pub regs: Registers,
        pub instr: [u8; 3],
        pub fetch_idx: u8,
        pub stage_idx: u8,
        pub rom: BankedMemory,
        pub ram: BankedMemory,
        pub halted: bool,
        pub sink: S,
    }

    impl<S: SignalSink> Cpu<S> {
        pub fn new(sink: S) -> Cpu<S> {
            Cpu {
                regs: Registers::default(),
                instr: [0; 3],
                fetch_idx: 0,
                stage_idx: 0,
                rom: BankedMemory::new(),
                ram: BankedMemory::new(),
                halted: false,
                sink,
            }
        }

        /// Zero registers, flags, RAM and staging. ROM is left alone.
        pub fn reset(&mut self) {
            self.regs = Registers::default();
            self.end_cycle();
            self.ram.clear();
            self.halted = false;
        }

        pub fn load_rom(&mut self, program: &[u8]) -> Result<(), LoadError> {
            self.rom.load(program)
        }

        pub fn load_rom_file(&mut self, path: &Path) -> Result<(), LoadError> {
            let program = fs::read(path).map_err(|source| LoadError::Io {
                path: path.display().to_string(),
                source,
            })?;
            self.load_rom(&program)
        }

        /// Register read as the machine sees it: unreadable slots read 0.
        pub fn read_reg(&self, idx: u8) -> u8 {
            let idx = (idx & 0xF) as usize;
            if REG_READABLE[idx] { self.regs.file[idx] } else { 0 }
        }

        /// Register write as the machine sees it: the display register
        /// forwards to the sink, other write-protected slots drop it.
        pub fn write_reg(&mut self, idx: u8, value: u8) {
            let idx = idx & 0xF;
            if idx == REG_DISPLAY {
                trace!(value, "display signal");
                self.sink.receive(value);
                return;
            }
            if REG_WRITABLE[idx as usize] {
                self.regs.file[idx as usize] = value;
            }
        }

        /// Raw register file contents, bypassing the permission masks.
        pub fn register(&self, idx: u8) -> u8 {
            self.regs.file[(idx & 0xF) as usize]
        }

        pub fn flags(&self) -> u8 {
            self.regs.flags
        }

        pub fn flag(&self, bit: u8) -> bool {
            self.regs.flags & (1 << bit) != 0
        }

        pub fn pc(&self) -> u16 {
            self.regs.pc
        }

        pub fn staged(&self, idx: usize) -> Option<u8> {
            self.instr.get(idx).copied()
        }

        pub fn stage_index(&self) -> u8 {
            self.stage_idx
        }

        pub fn fetch_index(&self) -> u8 {
            self.fetch_idx
        }

        pub fn is_halted(&self) -> bool {
            self.halted
        }

        pub fn read_ram(&self, bank: u8, addr: u8) -> u8 {
            self.ram.read(bank, addr)
        }

        pub fn write_ram(&mut self, bank: u8, addr: u8, value: u8) {
            self.ram.write(bank, addr, value);
        }

        pub fn read_rom(&self, bank: u8, addr: u8) -> u8 {
            self.rom.read(bank, addr)
        }

        pub fn reg_state(&self) -> String {
            self.regs.to_string()
        }

        fn end_cycle(&mut self) {
            self.instr = [0; 3];
            self.fetch_idx = 0;
            self.stage_idx = 0;
        }

        /// Advance by exactly one unit of work. Once STOP has run this is a
        /// no-op that keeps returning `Halted`.
        pub fn step(&mut self) -> StepOutcome {
            if self.halted {
                return StepOutcome::Halted;
            }

            if self.fetch_idx == 0 || self.fetch_idx < instruction_length(self.instr[0]) {
                self.instr[self.fetch_idx as usize] = self.rom.read_linear(self.regs.pc);
                self.fetch_idx += 1;
                self.regs.pc = self.regs.pc.wrapping_add(1);
                return StepOutcome::Fetched;
            }

            let outcome = match family(self.instr[0]) {
                0x0 => opcode_0x0(self),
                0x1 => opcode_0x1(self),
                0x2 => opcode_0x2(self),
                0x3 => opcode_0x3(self),
                0x4 => opcode_0x4(self),
                0x5 => opcode_0x5(self),
                0x6 => opcode_0x6(self),
                0x7 => opcode_0x7(self),
                0x8 => opcode_0x8(self),
                0x9 => opcode_0x9(self),
                0xA => opcode_0xA(self),
                0xB => opcode_0xB(self),
                0xC => opcode_0xC(self),
                0xD => opcode_0xD(self),
                0xE => opcode_0xE(self),
                _ => opcode_0xF(self),
            };

            match outcome {
                StepOutcome::Pending => self.stage_idx = self.stage_idx.wrapping_add(1),
                StepOutcome::Completed => self.end_cycle(),
                StepOutcome::Halted => trace!(pc = self.regs.pc, "halted"),
                StepOutcome::Fetched => {}
            }

            outcome
        }

        /// Step until STOP or until `max_steps` calls have been made.
        /// Returns the number of calls made.
        pub fn run(&mut self, max_steps: u64) -> u64 {
            let mut steps = 0;
            while steps < max_steps && !self.halted {
                self.step();
                steps += 1;
            }
            steps
        }
    }
}
