use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use bjtcpu_core::cpu::cpu::Cpu;
use bjtcpu_core::device::device::{CaptureSink, NullSink, SignalSink};
use bjtcpu_core::isa::isa::*;
use bjtcpu_core::outcome::outcome::StepOutcome;

fn new_cpu() -> Cpu<CaptureSink> {
    Cpu::new(CaptureSink::default())
}

fn write_rom<S: SignalSink>(cpu: &mut Cpu<S>, addr: u16, bytes: &[u8]) {
    for (i, byte) in bytes.iter().enumerate() {
        let [bank, offset] = addr.wrapping_add(i as u16).to_be_bytes();
        cpu.rom.write(bank, offset, *byte);
    }
}

// places the instruction at PC and steps until it retires; returns the
// number of step() calls it took.
fn exec<S: SignalSink>(cpu: &mut Cpu<S>, bytes: &[u8]) -> usize {
    let pc = cpu.pc();
    write_rom(cpu, pc, bytes);
    let mut steps = 0;
    loop {
        steps += 1;
        match cpu.step() {
            StepOutcome::Completed | StepOutcome::Halted => return steps,
            StepOutcome::Fetched | StepOutcome::Pending => {}
        }
        assert!(steps < 32, "instruction never retired");
    }
}

#[test]
fn fetch_stages_one_byte_per_step() {
    let mut cpu = new_cpu();
    write_rom(&mut cpu, 0, &[OP_IADD | REG_B, 0x00, 0x05]);

    assert_eq!(cpu.step(), StepOutcome::Fetched);
    assert_eq!(cpu.fetch_index(), 1);
    assert_eq!(cpu.staged(0), Some(0xC1));
    assert_eq!(cpu.pc(), 1);

    assert_eq!(cpu.step(), StepOutcome::Fetched);
    assert_eq!(cpu.step(), StepOutcome::Fetched);
    assert_eq!(cpu.staged(2), Some(0x05));
    assert_eq!(cpu.staged(3), None);

    assert_eq!(cpu.step(), StepOutcome::Completed);
    assert_eq!(cpu.fetch_index(), 0);
    assert_eq!(cpu.stage_index(), 0);
    assert_eq!(cpu.instr, [0; 3]);
    assert_eq!(cpu.register(REG_B), 5);
}

#[test]
fn imm_loads_register() {
    let mut cpu = new_cpu();
    assert_eq!(exec(&mut cpu, &[OP_IMM | REG_C, 0x42]), 3);
    assert_eq!(cpu.read_reg(REG_C), 0x42);
    assert_eq!(cpu.pc(), 2);
}

#[test]
fn add_sets_negative_and_overflow() {
    let mut cpu = new_cpu();
    cpu.write_reg(REG_A, 0x7F);
    cpu.write_reg(REG_B, 0x01);
    exec(&mut cpu, &[OP_ADD | REG_A, 0x01]);

    assert_eq!(cpu.read_reg(REG_A), 0x80);
    assert!(cpu.flag(FLAG_NEGATIVE));
    assert!(cpu.flag(FLAG_OVERFLOW));
    assert!(!cpu.flag(FLAG_CARRY));
    assert!(!cpu.flag(FLAG_ZERO));
}

#[test]
fn add_wraps_with_carry_and_zero() {
    let mut cpu = new_cpu();
    cpu.write_reg(REG_A, 0xFF);
    cpu.write_reg(REG_B, 0x01);
    exec(&mut cpu, &[OP_ADD | REG_A, 0x01]);

    assert_eq!(cpu.read_reg(REG_A), 0x00);
    assert!(cpu.flag(FLAG_ZERO));
    assert!(cpu.flag(FLAG_CARRY));
    assert!(!cpu.flag(FLAG_NEGATIVE));
}

#[test]
fn addc_adds_incoming_carry() {
    let mut cpu = new_cpu();
    cpu.write_reg(REG_A, 1);
    cpu.write_reg(REG_B, 1);
    cpu.regs.flags = 1 << FLAG_CARRY;
    exec(&mut cpu, &[OP_ADDC | REG_C, 0x01]);
    assert_eq!(cpu.read_reg(REG_C), 3);

    cpu.regs.flags = 0;
    exec(&mut cpu, &[OP_ADDC | REG_C, 0x01]);
    assert_eq!(cpu.read_reg(REG_C), 2);
}

#[test]
fn sub_subtracts_second_from_first() {
    let mut cpu = new_cpu();
    cpu.write_reg(REG_A, 5);
    cpu.write_reg(REG_B, 3);
    exec(&mut cpu, &[OP_SUB | REG_C, 0x01]);
    assert_eq!(cpu.read_reg(REG_C), 2);
    assert!(!cpu.flag(FLAG_ZERO));

    exec(&mut cpu, &[OP_SUB | REG_C, 0x10]);
    assert_eq!(cpu.read_reg(REG_C), 0xFE);
    assert!(cpu.flag(FLAG_NEGATIVE));
}

#[test]
fn subc_adds_one_when_carry_set() {
    let mut cpu = new_cpu();
    cpu.write_reg(REG_A, 5);
    cpu.write_reg(REG_B, 3);
    cpu.regs.flags = 1 << FLAG_CARRY;
    exec(&mut cpu, &[OP_SUBC | REG_C, 0x01]);
    assert_eq!(cpu.read_reg(REG_C), 3);
}

#[test]
fn nand_leaves_flags_alone() {
    let mut cpu = new_cpu();
    cpu.write_reg(REG_A, 0xF0);
    cpu.write_reg(REG_B, 0xFF);
    cpu.regs.flags = 1 << FLAG_ZERO;
    exec(&mut cpu, &[OP_NAND | REG_C, 0x01]);
    assert_eq!(cpu.read_reg(REG_C), 0x0F);
    assert_eq!(cpu.flags(), 1 << FLAG_ZERO);
}

#[test]
fn iadd_and_isub_use_the_immediate_byte() {
    let mut cpu = new_cpu();
    cpu.write_reg(REG_A, 10);
    assert_eq!(exec(&mut cpu, &[OP_IADD | REG_B, 0x00, 5]), 4);
    assert_eq!(cpu.read_reg(REG_B), 15);

    exec(&mut cpu, &[OP_ISUB | REG_C, 0x00, 10]);
    assert_eq!(cpu.read_reg(REG_C), 0);
    assert!(cpu.flag(FLAG_ZERO));
}

#[test]
fn cmp_only_touches_flags() {
    let mut cpu = new_cpu();
    cpu.write_reg(REG_A, 3);
    cpu.write_reg(REG_B, 3);
    exec(&mut cpu, &[OP_CMP, 0x01]);
    assert!(cpu.flag(FLAG_ZERO));
    assert_eq!(cpu.read_reg(REG_A), 3);

    cpu.write_reg(REG_A, 1);
    cpu.write_reg(REG_B, 2);
    exec(&mut cpu, &[OP_CMP, 0x01]);
    assert!(cpu.flag(FLAG_NEGATIVE));
    assert!(!cpu.flag(FLAG_ZERO));
    assert!(!cpu.flag(FLAG_CARRY));
}

#[test]
fn jmp_is_unconditional() {
    let mut cpu = new_cpu();
    exec(&mut cpu, &[OP_JMP, 0x12, 0x34]);
    assert_eq!(cpu.pc(), 0x1234);
}

#[test]
fn conditional_jumps_follow_their_flag() {
    let cases = [
        (OP_JMPZ, FLAG_ZERO),
        (OP_JMPN, FLAG_NEGATIVE),
        (OP_JMPC, FLAG_CARRY),
        (OP_JMPO, FLAG_OVERFLOW),
    ];

    for (opcode, flag) in cases {
        let mut cpu = new_cpu();
        exec(&mut cpu, &[opcode, 0x02, 0x00]);
        assert_eq!(cpu.pc(), 3, "{opcode:#04x} taken with flags clear");

        let mut cpu = new_cpu();
        cpu.regs.flags = 1 << flag;
        exec(&mut cpu, &[opcode, 0x02, 0x00]);
        assert_eq!(cpu.pc(), 0x0200, "{opcode:#04x} not taken");
    }
}

#[test]
fn sto_and_lda_use_bank_and_address_registers() {
    let mut cpu = new_cpu();
    cpu.write_reg(REG_BANK, 0x02);
    cpu.write_reg(REG_ADDR, 0x10);
    cpu.write_reg(REG_A, 0x99);
    exec(&mut cpu, &[OP_STO, 0x00]);
    assert_eq!(cpu.read_ram(0x02, 0x10), 0x99);

    exec(&mut cpu, &[OP_LDA | REG_C]);
    assert_eq!(cpu.read_reg(REG_C), 0x99);
}

#[test]
fn plda_reads_program_store() {
    let mut cpu = new_cpu();
    cpu.rom.write(0x03, 0x04, 0x66);
    cpu.write_reg(REG_BANK, 0x03);
    cpu.write_reg(REG_ADDR, 0x04);
    exec(&mut cpu, &[OP_PLDA | REG_B]);
    assert_eq!(cpu.read_reg(REG_B), 0x66);
}

#[test]
fn strla_and_ldrl_index_within_bank() {
    let mut cpu = new_cpu();
    cpu.write_reg(REG_BANK, 0x01);
    cpu.write_reg(REG_A, 0xAB);
    cpu.write_reg(REG_B, 0x10);
    cpu.write_reg(REG_C, 0x05);
    exec(&mut cpu, &[OP_STRLA, 0x12]);
    assert_eq!(cpu.read_ram(0x01, 0x15), 0xAB);

    cpu.write_reg(REG_A, 0);
    exec(&mut cpu, &[OP_LDRL | REG_A, 0x12]);
    assert_eq!(cpu.read_reg(REG_A), 0xAB);
}

#[test]
fn push_then_pop_round_trips_through_stack_bank() {
    let mut cpu = new_cpu();
    cpu.write_reg(REG_SP, 0x10);
    cpu.write_reg(REG_A, 0x77);

    assert_eq!(exec(&mut cpu, &[OP_PUSH, 0x00]), 4);
    assert_eq!(cpu.read_ram(STACK_BANK, 0x10), 0x77);
    assert_eq!(cpu.read_reg(REG_SP), 0x11);

    assert_eq!(exec(&mut cpu, &[OP_POP | REG_B]), 3);
    assert_eq!(cpu.read_reg(REG_B), 0x77);
    assert_eq!(cpu.read_reg(REG_SP), 0x10);
}

#[test]
fn call_builds_frame_and_ret_unwinds_it() {
    let mut cpu = new_cpu();
    cpu.write_reg(REG_SP, 0x20);
    cpu.write_reg(REG_BP, 0x05);

    assert_eq!(exec(&mut cpu, &[OP_CALL, 0x01, 0x00]), 10);
    assert_eq!(cpu.pc(), 0x0100);
    assert_eq!(cpu.read_ram(STACK_BANK, 0x20), 0x05);
    assert_eq!(cpu.read_ram(STACK_BANK, 0x21), 0x03);
    assert_eq!(cpu.read_ram(STACK_BANK, 0x22), 0x00);
    assert_eq!(cpu.read_reg(REG_SP), 0x23);
    assert_eq!(cpu.read_reg(REG_BP), 0x23);

    assert_eq!(exec(&mut cpu, &[OP_RET]), 7);
    assert_eq!(cpu.pc(), 3);
    assert_eq!(cpu.read_reg(REG_SP), 0x20);
    assert_eq!(cpu.read_reg(REG_BP), 0x05);
}

#[test]
fn ret_discards_values_left_on_the_frame() {
    let mut cpu = new_cpu();
    exec(&mut cpu, &[OP_CALL, 0x00, 0x40]);
    cpu.write_reg(REG_A, 0x11);
    exec(&mut cpu, &[OP_PUSH, 0x00]);
    exec(&mut cpu, &[OP_PUSH, 0x00]);
    exec(&mut cpu, &[OP_RET]);

    assert_eq!(cpu.pc(), 3);
    assert_eq!(cpu.read_reg(REG_SP), 0);
    assert_eq!(cpu.read_reg(REG_BP), 0);
}

#[test]
fn pcall_targets_bank_and_address_registers() {
    let mut cpu = new_cpu();
    cpu.write_reg(REG_BANK, 0x02);
    cpu.write_reg(REG_ADDR, 0x40);
    exec(&mut cpu, &[OP_PCALL]);
    assert_eq!(cpu.pc(), 0x0240);
    assert_eq!(cpu.read_ram(STACK_BANK, 1), 0x01);

    exec(&mut cpu, &[OP_RET]);
    assert_eq!(cpu.pc(), 1);
}

#[test]
fn stop_halts_for_good() {
    let mut cpu = new_cpu();
    exec(&mut cpu, &[OP_STOP]);
    assert!(cpu.is_halted());
    let pc = cpu.pc();

    for _ in 0..5 {
        assert_eq!(cpu.step(), StepOutcome::Halted);
    }
    assert_eq!(cpu.pc(), pc);
    assert_eq!(cpu.run(100), 0);
}

#[test]
fn unassigned_opcode_is_a_no_op() {
    let mut cpu = new_cpu();
    let before = cpu.regs.clone();
    exec(&mut cpu, &[0x05]);
    assert_eq!(cpu.pc(), 1);
    assert_eq!(cpu.regs.file, before.file);
    assert!(!cpu.is_halted());
}

#[test]
fn display_register_forwards_to_sink() {
    let mut cpu = new_cpu();
    exec(&mut cpu, &[OP_IMM | REG_DISPLAY, 0x2A]);
    exec(&mut cpu, &[OP_IMM | REG_DISPLAY, 0x15]);
    assert_eq!(cpu.sink.signals, vec![0x2A, 0x15]);
    assert_eq!(cpu.register(REG_DISPLAY), 0);
    assert_eq!(cpu.read_reg(REG_DISPLAY), 0);
}

#[test]
fn reserved_registers_ignore_writes_and_read_zero() {
    let mut cpu = new_cpu();
    cpu.regs.file[0x3] = 0x55;
    assert_eq!(cpu.read_reg(0x3), 0);

    exec(&mut cpu, &[OP_IMM | 0x3, 0x01]);
    assert_eq!(cpu.register(0x3), 0x55);
}

#[test]
fn reset_keeps_program_store() {
    let mut cpu = new_cpu();
    cpu.load_rom(&[OP_JMP, 0x00, 0x03, OP_IMM | REG_A, 0x09, OP_STOP]).unwrap();
    cpu.run(100);
    assert!(cpu.is_halted());
    assert_eq!(cpu.read_reg(REG_A), 9);

    cpu.write_ram(0, 0, 0xEE);
    cpu.reset();
    assert!(!cpu.is_halted());
    assert_eq!(cpu.pc(), 0);
    assert_eq!(cpu.read_reg(REG_A), 0);
    assert_eq!(cpu.read_ram(0, 0), 0);

    cpu.run(100);
    assert_eq!(cpu.read_reg(REG_A), 9);
}

#[test]
fn register_dump_lists_named_registers() {
    let mut cpu = new_cpu();
    cpu.write_reg(REG_A, 0xAB);
    let dump = cpu.regs.to_string();
    assert!(dump.contains("PC    - 0000"));
    assert!(dump.contains("ra    - ab"));
    assert!(dump.contains("radr  - 00"));
}

#[test]
fn random_register_pairs_match_wrapping_arithmetic() {
    let mut rng = StdRng::seed_from_u64(0x5EED);
    let general = [REG_A, REG_B, REG_C];

    for _ in 0..256 {
        let (lhs, rhs): (u8, u8) = (rng.random(), rng.random());
        let x = general[rng.random_range(0..3)];
        let y = general[rng.random_range(0..3)];
        let dest = general[rng.random_range(0..3)];

        let mut cpu = new_cpu();
        cpu.write_reg(x, lhs);
        cpu.write_reg(y, rhs);
        let (a, b) = (cpu.read_reg(x), cpu.read_reg(y));

        exec(&mut cpu, &[OP_ADD | dest, (x << 4) | y]);
        assert_eq!(cpu.read_reg(dest), a.wrapping_add(b));
        assert_eq!(cpu.flag(FLAG_ZERO), a.wrapping_add(b) == 0);

        cpu.write_reg(x, lhs);
        cpu.write_reg(y, rhs);
        let (a, b) = (cpu.read_reg(x), cpu.read_reg(y));
        exec(&mut cpu, &[OP_SUB | dest, (x << 4) | y]);
        assert_eq!(cpu.read_reg(dest), a.wrapping_sub(b));
        assert_eq!(cpu.flag(FLAG_NEGATIVE), a.wrapping_sub(b) > 0x7F);
    }
}

#[test]
fn random_programs_never_panic() {
    let mut rng = StdRng::seed_from_u64(0xB17C);

    for _ in 0..64 {
        let mut image = vec![0u8; 512];
        rng.fill(&mut image[..]);

        let mut cpu = Cpu::new(NullSink);
        cpu.load_rom(&image).unwrap();
        for _ in 0..4096 {
            cpu.step();
            assert!(cpu.fetch_index() <= 3);
            assert!(cpu.stage_index() < 7);
        }
    }
}
