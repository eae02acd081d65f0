pub mod disasm {
    use std::fmt;

    use crate::isa::isa::{InstructionDescriptor, Isa, OperandKind, instruction_length};

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Operand {
        Register(u8),
        Immediate(u8),
        Address(u16),
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Decoded {
        pub mnemonic: &'static str,
        pub operands: Vec<Operand>,
        pub len: usize,
    }

    impl Decoded {
        /// The jump/call target, if this instruction carries one.
        pub fn address(&self) -> Option<u16> {
            self.operands.iter().find_map(|op| match op {
                Operand::Address(addr) => Some(*addr),
                _ => None,
            })
        }
    }

    struct RegName<'a>(&'a Isa, u8);

    impl fmt::Display for RegName<'_> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self.0.register_name(self.1) {
                Some(name) => f.write_str(name),
                None => write!(f, "r{:x}", self.1),
            }
        }
    }

    /// Decode the instruction at the start of `bytes`. Returns `None` when
    /// the slice is shorter than the opcode's family length.
    pub fn decode(isa: &Isa, bytes: &[u8]) -> Option<Decoded> {
        let opcode = *bytes.first()?;
        let len = instruction_length(opcode) as usize;
        if bytes.len() < len {
            return None;
        }
        let desc: &InstructionDescriptor = isa.descriptor_for(opcode)?;

        let mut operands = Vec::new();
        if desc.embeds_dest {
            operands.push(Operand::Register(opcode & 0xF));
        }

        // operand bytes after the opcode, consumed in order
        let mut cursor = 1;
        let mut low_nibble_pending = false;
        for kind in desc.operands {
            match kind {
                OperandKind::Register if low_nibble_pending => {
                    operands.push(Operand::Register(bytes[cursor] & 0xF));
                    low_nibble_pending = false;
                    cursor += 1;
                }
                OperandKind::Register => {
                    operands.push(Operand::Register(bytes[cursor] >> 4));
                    low_nibble_pending = true;
                }
                OperandKind::Immediate => {
                    if low_nibble_pending {
                        cursor += 1;
                        low_nibble_pending = false;
                    }
                    operands.push(Operand::Immediate(bytes[cursor]));
                    cursor += 1;
                }
                OperandKind::Label => {
                    operands.push(Operand::Address(u16::from_be_bytes([bytes[cursor], bytes[cursor + 1]])));
                    cursor += 2;
                }
            }
        }

        Some(Decoded { mnemonic: desc.mnemonic, operands, len })
    }

    /// Render one instruction as assembly text, e.g. `iadd ra rb 5`.
    pub fn render(isa: &Isa, decoded: &Decoded) -> String {
        let mut text = decoded.mnemonic.to_string();
        for op in &decoded.operands {
            let part = match op {
                Operand::Register(reg) => RegName(isa, *reg).to_string(),
                Operand::Immediate(value) => format!("{value:#04x}"),
                Operand::Address(addr) => format!("{addr:#06x}"),
            };
            text.push(' ');
            text.push_str(&part);
        }
        text
    }
}
