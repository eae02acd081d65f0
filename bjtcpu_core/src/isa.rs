pub mod isa {
    use std::collections::HashMap;

    // Registers

    pub const REG_A: u8 = 0x0;
    pub const REG_B: u8 = 0x1;
    pub const REG_C: u8 = 0x2;
    pub const REG_DISPLAY: u8 = 0x9;
    pub const REG_SP: u8 = 0xA;
    pub const REG_BP: u8 = 0xB;
    pub const REG_BANK: u8 = 0xE;
    pub const REG_ADDR: u8 = 0xF;

    /// Which register indices accept writes. The display register is
    /// write-only: writes are forwarded to the attached signal sink.
    pub const REG_WRITABLE: [bool; 0x10] = [
        true, true, true,   // ra, rb, rc
        false, false, false, false, false, false,
        true, true, true,   // rdis, rsp, rbp
        false, false,
        true, true,         // rbnk, radr
    ];

    pub const REG_READABLE: [bool; 0x10] = [
        true, true, true,   // ra, rb, rc
        false, false, false, false, false, false,
        false, true, true,  // rsp, rbp
        false, false,
        true, true,         // rbnk, radr
    ];

    // Opcodes

    pub const OP_STOP: u8 = 0x00;
    pub const OP_RET: u8 = 0x01;
    pub const OP_PCALL: u8 = 0x02;
    pub const OP_PUSH: u8 = 0x10;
    pub const OP_STO: u8 = 0x11;
    pub const OP_CMP: u8 = 0x12;
    pub const OP_POP: u8 = 0x20;
    pub const OP_PLDA: u8 = 0x30;
    pub const OP_ADD: u8 = 0x40;
    pub const OP_ADDC: u8 = 0x50;
    pub const OP_STRLA: u8 = 0x60;
    pub const OP_SUB: u8 = 0x70;
    pub const OP_SUBC: u8 = 0x80;
    pub const OP_LDRL: u8 = 0x90;
    pub const OP_IMM: u8 = 0xA0;
    pub const OP_NAND: u8 = 0xB0;
    pub const OP_IADD: u8 = 0xC0;
    pub const OP_ISUB: u8 = 0xD0;
    pub const OP_JMP: u8 = 0xE0;
    pub const OP_JMPZ: u8 = 0xE1;
    pub const OP_JMPN: u8 = 0xE2;
    pub const OP_JMPC: u8 = 0xE4;
    pub const OP_JMPO: u8 = 0xE8;
    pub const OP_CALL: u8 = 0xEA;
    pub const OP_LDA: u8 = 0xF0;

    // Flag bits

    pub const FLAG_ZERO: u8 = 0;
    pub const FLAG_CARRY: u8 = 1;
    pub const FLAG_OVERFLOW: u8 = 2;
    pub const FLAG_NEGATIVE: u8 = 3;

    /// Stack operations always address this RAM bank.
    pub const STACK_BANK: u8 = 0xFF;

    /// jump opcode + big-endian entry point
    pub const HEADER_SIZE: usize = 3;

    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub enum OperandKind {
        Register,
        Immediate,
        Label,
    }

    /// Static description of one mnemonic. `operands` lists what follows
    /// the embedded destination register, if there is one.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct InstructionDescriptor {
        pub mnemonic: &'static str,
        pub opcode: u8,
        pub operands: &'static [OperandKind],
        pub embeds_dest: bool,
    }

    impl InstructionDescriptor {
        pub fn family(&self) -> u8 {
            family(self.opcode)
        }

        /// Encoded size in bytes, opcode included.
        pub fn encoded_len(&self) -> u8 {
            instruction_length(self.opcode)
        }
    }

    use OperandKind::{Immediate as I, Label as L, Register as R};

    const fn desc(
        mnemonic: &'static str,
        opcode: u8,
        operands: &'static [OperandKind],
        embeds_dest: bool,
    ) -> InstructionDescriptor {
        InstructionDescriptor { mnemonic, opcode, operands, embeds_dest }
    }

    pub const INSTRUCTIONS: [InstructionDescriptor; 25] = [
        desc("stop",  OP_STOP,  &[],        false),
        desc("ret",   OP_RET,   &[],        false),
        desc("pcall", OP_PCALL, &[],        false),
        desc("pop",   OP_POP,   &[],        true),
        desc("lda",   OP_LDA,   &[],        true),
        desc("plda",  OP_PLDA,  &[],        true),
        desc("add",   OP_ADD,   &[R, R],    true),
        desc("addc",  OP_ADDC,  &[R, R],    true),
        desc("sub",   OP_SUB,   &[R, R],    true),
        desc("subc",  OP_SUBC,  &[R, R],    true),
        desc("imm",   OP_IMM,   &[I],       true),
        desc("nand",  OP_NAND,  &[R, R],    true),
        desc("push",  OP_PUSH,  &[R],       false),
        desc("sto",   OP_STO,   &[R],       false),
        desc("cmp",   OP_CMP,   &[R, R],    false),
        desc("strla", OP_STRLA, &[R, R],    false),
        desc("ldrl",  OP_LDRL,  &[R, R],    true),
        desc("iadd",  OP_IADD,  &[R, I],    true),
        desc("isub",  OP_ISUB,  &[R, I],    true),
        desc("jmp",   OP_JMP,   &[L],       false),
        desc("jmpz",  OP_JMPZ,  &[L],       false),
        desc("jmpn",  OP_JMPN,  &[L],       false),
        desc("jmpc",  OP_JMPC,  &[L],       false),
        desc("jmpo",  OP_JMPO,  &[L],       false),
        desc("call",  OP_CALL,  &[L],       false),
    ];

    pub const REGISTERS: [(&str, u8); 7] = [
        ("ra", REG_A),
        ("rb", REG_B),
        ("rc", REG_C),
        ("rsp", REG_SP),
        ("rbp", REG_BP),
        ("rbnk", REG_BANK),
        ("radr", REG_ADDR),
    ];

    /// Lookup tables shared by the assembler and the disassembler.
    /// Built once and only ever borrowed.
    #[derive(Debug, Clone)]
    pub struct Isa {
        instructions: HashMap<&'static str, InstructionDescriptor>,
        registers: HashMap<&'static str, u8>,
    }

    impl Default for Isa {
        fn default() -> Isa {
            Isa::new()
        }
    }

    impl Isa {
        pub fn new() -> Isa {
            Isa {
                instructions: INSTRUCTIONS.iter().map(|d| (d.mnemonic, *d)).collect(),
                registers: REGISTERS.iter().copied().collect(),
            }
        }

        pub fn instruction(&self, mnemonic: &str) -> Option<&InstructionDescriptor> {
            self.instructions.get(mnemonic)
        }

        pub fn register(&self, name: &str) -> Option<u8> {
            self.registers.get(name).copied()
        }

        pub fn register_name(&self, index: u8) -> Option<&'static str> {
            REGISTERS
                .iter()
                .find(|(_, idx)| *idx == index)
                .map(|(name, _)| *name)
        }

        /// Find the descriptor an opcode byte was encoded from. Families
        /// holding a single mnemonic match on the top nibble alone.
        pub fn descriptor_for(&self, opcode: u8) -> Option<&'static InstructionDescriptor> {
            let mut in_family = INSTRUCTIONS
                .iter()
                .filter(|d| d.family() == family(opcode))
                .peekable();
            let first = in_family.next()?;
            if in_family.peek().is_none() {
                return Some(first);
            }
            INSTRUCTIONS.iter().find(|d| d.opcode == opcode)
        }
    }

    pub fn family(opcode: u8) -> u8 {
        (opcode >> 4) & 0xF
    }

    /// Instruction length in bytes, keyed by the opcode family.
    pub fn instruction_length(opcode: u8) -> u8 {
        match family(opcode) {
            0x0 | 0x2 | 0x3 | 0xF => 1,
            0x1 | 0x4 | 0x5 | 0x6 | 0x7 | 0x8 | 0x9 | 0xA | 0xB => 2,
            _ => 3,
        }
    }
}
