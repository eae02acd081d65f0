pub mod bjt_engine {
    use crate::cpu::cpu::Cpu;
    use crate::device::device::SignalSink;
    use crate::isa::isa::*;
    use crate::outcome::outcome::StepOutcome;

    /// One handler per opcode family (top nibble). Handlers see the fully
    /// staged instruction in `cpu.instr` and the current micro-step in
    /// `cpu.stage_idx`; they return `Pending` while a multi-step sequence
    /// still has work left.
    ///
    /// Byte layout: the opcode's low nibble is the embedded destination
    /// register (or a sub-selector); the operand byte packs a first
    /// register in its high nibble and a second in its low nibble.

    macro_rules! extract_dest {
        ($opcode:expr) => {
            ($opcode & 0xF) as u8
        };
    }

    macro_rules! extract_x {
        ($operand:expr) => {
            (($operand >> 4) & 0xF) as u8
        };
    }

    macro_rules! extract_y {
        ($operand:expr) => {
            ($operand & 0xF) as u8
        };
    }

    /// Flags are rebuilt from scratch. Overflow only looks at a
    /// positive-to-negative move of the destination, and carry is the
    /// "result got smaller" test, so subtraction sets it too.
    pub fn update_flags(previous: u8, result: u8, additive: bool) -> u8 {
        let mut flags = 0;

        if result == 0 {
            flags |= 1 << FLAG_ZERO;
        }

        if result > 0x7F {
            flags |= 1 << FLAG_NEGATIVE;

            if previous <= 0x7F {
                flags |= 1 << FLAG_OVERFLOW;
            }
        }

        if additive && previous > result {
            flags |= 1 << FLAG_CARRY;
        }

        flags
    }

    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub enum CallStage {
        PushBase,
        BumpAfterBase,
        PushReturnLow,
        BumpAfterLow,
        PushReturnHigh,
        Enter,
        LinkBase,
    }

    impl CallStage {
        pub fn at(stage: u8) -> CallStage {
            match stage {
                0 => CallStage::PushBase,
                1 => CallStage::BumpAfterBase,
                2 => CallStage::PushReturnLow,
                3 => CallStage::BumpAfterLow,
                4 => CallStage::PushReturnHigh,
                5 => CallStage::Enter,
                _ => CallStage::LinkBase,
            }
        }
    }

    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub enum RetStage {
        UnwindFrame,
        LoadReturnHigh,
        DropHigh,
        LoadReturnLow,
        DropLow,
        RestoreBase,
    }

    impl RetStage {
        pub fn at(stage: u8) -> RetStage {
            match stage {
                0 => RetStage::UnwindFrame,
                1 => RetStage::LoadReturnHigh,
                2 => RetStage::DropHigh,
                3 => RetStage::LoadReturnLow,
                4 => RetStage::DropLow,
                _ => RetStage::RestoreBase,
            }
        }
    }

    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub enum PushStage {
        Write,
        Bump,
    }

    impl PushStage {
        pub fn at(stage: u8) -> PushStage {
            if stage == 0 { PushStage::Write } else { PushStage::Bump }
        }
    }

    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub enum PopStage {
        Drop,
        Read,
    }

    impl PopStage {
        pub fn at(stage: u8) -> PopStage {
            if stage == 0 { PopStage::Drop } else { PopStage::Read }
        }
    }

    // stack grows upward in the fixed stack bank; SP is the next free slot.
    pub fn call_step<S: SignalSink>(cpu: &mut Cpu<S>, target: u16) -> StepOutcome {
        let sp = cpu.read_reg(REG_SP);
        let [ret_high, ret_low] = cpu.regs.pc.to_be_bytes();

        match CallStage::at(cpu.stage_idx) {
            CallStage::PushBase => {
                let bp = cpu.read_reg(REG_BP);
                cpu.write_ram(STACK_BANK, sp, bp);
            }
            CallStage::BumpAfterBase | CallStage::BumpAfterLow => {
                cpu.write_reg(REG_SP, sp.wrapping_add(1));
            }
            CallStage::PushReturnLow => cpu.write_ram(STACK_BANK, sp, ret_low),
            CallStage::PushReturnHigh => cpu.write_ram(STACK_BANK, sp, ret_high),
            CallStage::Enter => {
                cpu.write_reg(REG_SP, sp.wrapping_add(1));
                cpu.regs.pc = target;
            }
            CallStage::LinkBase => {
                cpu.write_reg(REG_BP, sp);
                return StepOutcome::Completed;
            }
        }

        StepOutcome::Pending
    }

    pub fn ret_step<S: SignalSink>(cpu: &mut Cpu<S>) -> StepOutcome {
        let sp = cpu.read_reg(REG_SP);

        match RetStage::at(cpu.stage_idx) {
            RetStage::UnwindFrame => {
                let bp = cpu.read_reg(REG_BP);
                cpu.write_reg(REG_SP, bp.wrapping_sub(1));
            }
            RetStage::LoadReturnHigh => {
                let high = cpu.read_ram(STACK_BANK, sp);
                cpu.regs.pc = u16::from_be_bytes([high, cpu.regs.pc as u8]);
            }
            RetStage::LoadReturnLow => {
                let low = cpu.read_ram(STACK_BANK, sp);
                cpu.regs.pc = u16::from_be_bytes([(cpu.regs.pc >> 8) as u8, low]);
            }
            RetStage::DropHigh | RetStage::DropLow => {
                cpu.write_reg(REG_SP, sp.wrapping_sub(1));
            }
            RetStage::RestoreBase => {
                let bp = cpu.read_ram(STACK_BANK, sp);
                cpu.write_reg(REG_BP, bp);
                return StepOutcome::Completed;
            }
        }

        StepOutcome::Pending
    }

    pub fn push_step<S: SignalSink>(cpu: &mut Cpu<S>, value: u8) -> StepOutcome {
        let sp = cpu.read_reg(REG_SP);

        match PushStage::at(cpu.stage_idx) {
            PushStage::Write => {
                cpu.write_ram(STACK_BANK, sp, value);
                StepOutcome::Pending
            }
            PushStage::Bump => {
                cpu.write_reg(REG_SP, sp.wrapping_add(1));
                StepOutcome::Completed
            }
        }
    }

    pub fn pop_step<S: SignalSink>(cpu: &mut Cpu<S>, reg: u8) -> StepOutcome {
        let sp = cpu.read_reg(REG_SP);

        match PopStage::at(cpu.stage_idx) {
            PopStage::Drop => {
                cpu.write_reg(REG_SP, sp.wrapping_sub(1));
                StepOutcome::Pending
            }
            PopStage::Read => {
                let value = cpu.read_ram(STACK_BANK, sp);
                cpu.write_reg(reg, value);
                StepOutcome::Completed
            }
        }
    }

    // write an arithmetic result and rebuild flags from the old value.
    fn store_result<S: SignalSink>(cpu: &mut Cpu<S>, dest: u8, value: u8) -> StepOutcome {
        let previous = cpu.read_reg(dest);
        cpu.write_reg(dest, value);
        cpu.regs.flags = update_flags(previous, value, true);
        StepOutcome::Completed
    }

    fn carry_in<S: SignalSink>(cpu: &Cpu<S>, with_carry: bool) -> u8 {
        (with_carry && cpu.flag(FLAG_CARRY)) as u8
    }

    fn add_registers<S: SignalSink>(cpu: &mut Cpu<S>, with_carry: bool) -> StepOutcome {
        let dest = extract_dest!(cpu.instr[0]);
        let lhs = cpu.read_reg(extract_x!(cpu.instr[1]));
        let rhs = cpu.read_reg(extract_y!(cpu.instr[1]));
        let value = lhs.wrapping_add(rhs).wrapping_add(carry_in(cpu, with_carry));
        store_result(cpu, dest, value)
    }

    fn sub_registers<S: SignalSink>(cpu: &mut Cpu<S>, with_carry: bool) -> StepOutcome {
        let dest = extract_dest!(cpu.instr[0]);
        let lhs = cpu.read_reg(extract_x!(cpu.instr[1]));
        let rhs = cpu.read_reg(extract_y!(cpu.instr[1]));
        let value = lhs.wrapping_sub(rhs).wrapping_add(carry_in(cpu, with_carry));
        store_result(cpu, dest, value)
    }

    fn indexed_address<S: SignalSink>(cpu: &Cpu<S>) -> u8 {
        let base = cpu.read_reg(extract_x!(cpu.instr[1]));
        let index = cpu.read_reg(extract_y!(cpu.instr[1]));
        base.wrapping_add(index)
    }

    pub fn opcode_0x0<S: SignalSink>(cpu: &mut Cpu<S>) -> StepOutcome {
        match cpu.instr[0] {
            OP_STOP => {
                cpu.halted = true;
                StepOutcome::Halted
            }
            OP_RET => ret_step(cpu),
            OP_PCALL => {
                let target = u16::from_be_bytes([cpu.read_reg(REG_BANK), cpu.read_reg(REG_ADDR)]);
                call_step(cpu, target)
            }
            _ => StepOutcome::Completed,
        }
    }

    pub fn opcode_0x1<S: SignalSink>(cpu: &mut Cpu<S>) -> StepOutcome {
        let var_x = extract_x!(cpu.instr[1]);
        let var_y = extract_y!(cpu.instr[1]);

        match cpu.instr[0] {
            OP_PUSH => {
                let value = cpu.read_reg(var_x);
                push_step(cpu, value)
            }
            OP_STO => {
                let bank = cpu.read_reg(REG_BANK);
                let addr = cpu.read_reg(REG_ADDR);
                let value = cpu.read_reg(var_x);
                cpu.write_ram(bank, addr, value);
                StepOutcome::Completed
            }
            OP_CMP => {
                let first = cpu.read_reg(var_x);
                let second = cpu.read_reg(var_y);
                cpu.regs.flags = update_flags(first, first.wrapping_sub(second), false);
                StepOutcome::Completed
            }
            _ => StepOutcome::Completed,
        }
    }

    pub fn opcode_0x2<S: SignalSink>(cpu: &mut Cpu<S>) -> StepOutcome {
        let dest = extract_dest!(cpu.instr[0]);
        pop_step(cpu, dest)
    }

    pub fn opcode_0x3<S: SignalSink>(cpu: &mut Cpu<S>) -> StepOutcome {
        let value = cpu.read_rom(cpu.read_reg(REG_BANK), cpu.read_reg(REG_ADDR));
        let dest = extract_dest!(cpu.instr[0]);
        cpu.write_reg(dest, value);
        StepOutcome::Completed
    }

    pub fn opcode_0x4<S: SignalSink>(cpu: &mut Cpu<S>) -> StepOutcome {
        add_registers(cpu, false)
    }

    pub fn opcode_0x5<S: SignalSink>(cpu: &mut Cpu<S>) -> StepOutcome {
        add_registers(cpu, true)
    }

    pub fn opcode_0x6<S: SignalSink>(cpu: &mut Cpu<S>) -> StepOutcome {
        let addr = indexed_address(cpu);
        let bank = cpu.read_reg(REG_BANK);
        let value = cpu.read_reg(REG_A);
        cpu.write_ram(bank, addr, value);
        StepOutcome::Completed
    }

    pub fn opcode_0x7<S: SignalSink>(cpu: &mut Cpu<S>) -> StepOutcome {
        sub_registers(cpu, false)
    }

    pub fn opcode_0x8<S: SignalSink>(cpu: &mut Cpu<S>) -> StepOutcome {
        sub_registers(cpu, true)
    }

    pub fn opcode_0x9<S: SignalSink>(cpu: &mut Cpu<S>) -> StepOutcome {
        let addr = indexed_address(cpu);
        let value = cpu.read_ram(cpu.read_reg(REG_BANK), addr);
        let dest = extract_dest!(cpu.instr[0]);
        cpu.write_reg(dest, value);
        StepOutcome::Completed
    }

    #[allow(non_snake_case)]
    pub fn opcode_0xA<S: SignalSink>(cpu: &mut Cpu<S>) -> StepOutcome {
        let (dest, value) = (extract_dest!(cpu.instr[0]), cpu.instr[1]);
        cpu.write_reg(dest, value);
        StepOutcome::Completed
    }

    #[allow(non_snake_case)]
    pub fn opcode_0xB<S: SignalSink>(cpu: &mut Cpu<S>) -> StepOutcome {
        let lhs = cpu.read_reg(extract_x!(cpu.instr[1]));
        let rhs = cpu.read_reg(extract_y!(cpu.instr[1]));
        let dest = extract_dest!(cpu.instr[0]);
        cpu.write_reg(dest, !(lhs & rhs));
        StepOutcome::Completed
    }

    #[allow(non_snake_case)]
    pub fn opcode_0xC<S: SignalSink>(cpu: &mut Cpu<S>) -> StepOutcome {
        let dest = extract_dest!(cpu.instr[0]);
        let lhs = cpu.read_reg(extract_x!(cpu.instr[1]));
        let value = lhs.wrapping_add(cpu.instr[2]);
        store_result(cpu, dest, value)
    }

    #[allow(non_snake_case)]
    pub fn opcode_0xD<S: SignalSink>(cpu: &mut Cpu<S>) -> StepOutcome {
        let dest = extract_dest!(cpu.instr[0]);
        let lhs = cpu.read_reg(extract_x!(cpu.instr[1]));
        let value = lhs.wrapping_sub(cpu.instr[2]);
        store_result(cpu, dest, value)
    }

    #[allow(non_snake_case)]
    pub fn opcode_0xE<S: SignalSink>(cpu: &mut Cpu<S>) -> StepOutcome {
        let target = u16::from_be_bytes([cpu.instr[1], cpu.instr[2]]);

        let taken = match cpu.instr[0] {
            OP_CALL => return call_step(cpu, target),
            OP_JMP => true,
            OP_JMPZ => cpu.flag(FLAG_ZERO),
            OP_JMPN => cpu.flag(FLAG_NEGATIVE),
            OP_JMPC => cpu.flag(FLAG_CARRY),
            OP_JMPO => cpu.flag(FLAG_OVERFLOW),
            _ => false,
        };

        if taken {
            cpu.regs.pc = target;
        }
        StepOutcome::Completed
    }

    #[allow(non_snake_case)]
    pub fn opcode_0xF<S: SignalSink>(cpu: &mut Cpu<S>) -> StepOutcome {
        let value = cpu.read_ram(cpu.read_reg(REG_BANK), cpu.read_reg(REG_ADDR));
        let dest = extract_dest!(cpu.instr[0]);
        cpu.write_reg(dest, value);
        StepOutcome::Completed
    }
}
