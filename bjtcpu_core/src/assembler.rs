pub mod assembler {
    use std::collections::HashMap;
    use std::path::Path;

    use tracing::{debug, trace};

    use crate::error::error::{AsmError, Result, SourcePos};
    use crate::isa::isa::{
        HEADER_SIZE, InstructionDescriptor, Isa, OP_IADD, OP_IMM, OP_JMP, OperandKind, REG_ADDR,
        REG_BANK,
    };
    use crate::source::source::{FileSources, SourceProvider};
    use crate::tokenizer::tokenizer::{Token, TokenKind, parse_value, tokenize};

    pub const DATA_DIRECTIVE: &str = "[data]";
    pub const PROGRAM_DIRECTIVE: &str = "[program]";
    pub const ENTRY_LABEL: &str = "main";
    const LOCAL_PREFIX: char = '.';

    /// A two-byte address slot waiting for its label. `high`/`low` pick
    /// which half of the big-endian address lands at `offset`.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct LabelReference {
        pub label: String,
        pub scope: String,
        pub pos: SourcePos,
        pub offset: usize,
        pub high: bool,
        pub low: bool,
    }

    /// A finished image plus the global label table it was built from.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Assembly {
        pub image: Vec<u8>,
        pub labels: HashMap<String, u16>,
    }

    impl Assembly {
        pub fn entry_point(&self) -> u16 {
            u16::from_be_bytes([self.image[1], self.image[2]])
        }

        pub fn label(&self, name: &str) -> Option<u16> {
            self.labels.get(name).copied()
        }
    }

    /// Single streaming pass over the token list followed by label
    /// patching. The image is only handed out once every reference
    /// resolved.
    pub struct Assembler {
        image: Vec<u8>,
        globals: HashMap<String, u16>,
        locals: HashMap<String, HashMap<String, u16>>,
        references: Vec<LabelReference>,
        scope: String,
        program_mode: bool,
    }

    impl Default for Assembler {
        fn default() -> Assembler {
            Assembler::new()
        }
    }

    impl Assembler {
        pub fn new() -> Assembler {
            let mut image = vec![0u8; HEADER_SIZE];
            image[0] = OP_JMP;

            Assembler {
                image,
                globals: HashMap::new(),
                locals: HashMap::new(),
                references: Vec::new(),
                scope: String::new(),
                program_mode: true,
            }
        }

        pub fn assemble(mut self, tokens: &[Token]) -> Result<Assembly> {
            let mut idx = 0;
            while idx < tokens.len() {
                idx = self.assemble_item(tokens, idx)?;
                // `idx` is the last token the item consumed; a label
                // definition keeps its scope open across a file boundary
                let last = &tokens[idx];
                if last.last_in_file && last.kind != TokenKind::LabelDefinition {
                    self.program_mode = true;
                    self.scope.clear();
                }
                idx += 1;
            }

            self.finish()
        }

        fn here(&self, token: &Token) -> Result<u16> {
            u16::try_from(self.image.len()).map_err(|_| AsmError::ImageTooLarge { pos: token.pos() })
        }

        fn assemble_item(&mut self, tokens: &[Token], idx: usize) -> Result<usize> {
            let token = &tokens[idx];

            if token.kind == TokenKind::LabelDefinition {
                self.define_label(token)?;
                return Ok(idx);
            }

            if token.text == DATA_DIRECTIVE {
                self.program_mode = false;
                self.scope.clear();
                return Ok(idx);
            }
            if token.text == PROGRAM_DIRECTIVE {
                self.program_mode = true;
                self.scope.clear();
                return Ok(idx);
            }

            if !self.program_mode {
                return self.emit_data(token).map(|_| idx);
            }

            match token.kind {
                TokenKind::Instruction(desc) => self.emit_instruction(tokens, idx, &desc),
                TokenKind::LabelReference if token.text == "cpy" => self.emit_cpy(tokens, idx),
                TokenKind::LabelReference if token.text == "setadr" => self.emit_setadr(tokens, idx),
                _ => Err(AsmError::StrayToken { text: token.text.clone(), pos: token.pos() }),
            }
        }

        fn define_label(&mut self, token: &Token) -> Result<()> {
            let offset = self.here(token)?;
            let name = token.text.trim_end_matches(':');

            if let Some(local) = name.strip_prefix(LOCAL_PREFIX) {
                if self.scope.is_empty() {
                    return Err(AsmError::LocalOutsideScope { name: name.to_string(), pos: token.pos() });
                }
                let table = self.locals.entry(self.scope.clone()).or_default();
                if table.contains_key(local) {
                    return Err(AsmError::DuplicateLabel { name: name.to_string(), pos: token.pos() });
                }
                table.insert(local.to_string(), offset);
                return Ok(());
            }

            if self.globals.contains_key(name) {
                return Err(AsmError::DuplicateLabel { name: name.to_string(), pos: token.pos() });
            }
            if self.program_mode {
                self.scope = name.to_string();
            }
            self.globals.insert(name.to_string(), offset);
            Ok(())
        }

        fn emit_data(&mut self, token: &Token) -> Result<()> {
            if token.kind != TokenKind::Immediate {
                return Err(AsmError::LabelInData { text: token.text.clone(), pos: token.pos() });
            }
            let value = parse_value(&token.text)
                .ok_or_else(|| AsmError::InvalidValue { text: token.text.clone(), pos: token.pos() })?;
            self.image.push(value);
            Ok(())
        }

        fn operand<'t>(&self, tokens: &'t [Token], idx: usize, instr: &Token) -> Result<&'t Token> {
            tokens.get(idx).ok_or_else(|| AsmError::MissingOperand {
                mnemonic: instr.text.clone(),
                pos: instr.pos(),
            })
        }

        fn reference(&mut self, label: &Token, offset: usize, high: bool, low: bool) {
            self.references.push(LabelReference {
                label: label.text.clone(),
                scope: self.scope.clone(),
                pos: label.pos(),
                offset,
                high,
                low,
            });
        }

        fn emit_instruction(&mut self, tokens: &[Token], start: usize, desc: &InstructionDescriptor) -> Result<usize> {
            let instr = &tokens[start];
            let mut idx = start;
            let mut opcode = desc.opcode;

            if desc.embeds_dest {
                idx += 1;
                match tokens.get(idx).map(|t| t.kind) {
                    Some(TokenKind::Register(reg)) => opcode |= reg,
                    _ => {
                        return Err(AsmError::ExpectedRegister {
                            mnemonic: instr.text.clone(),
                            pos: instr.pos(),
                        });
                    }
                }
            }
            self.image.push(opcode);

            // two register operands share a byte, first one in the high nibble
            let mut pending: Option<u8> = None;

            for expected in desc.operands {
                idx += 1;
                let token = self.operand(tokens, idx, instr)?;

                match (expected, token.kind) {
                    (OperandKind::Register, TokenKind::Register(reg)) => match pending.take() {
                        Some(high) => self.image.push((high << 4) | reg),
                        None => pending = Some(reg),
                    },
                    (OperandKind::Immediate, TokenKind::Immediate) => {
                        if let Some(high) = pending.take() {
                            self.image.push(high << 4);
                        }
                        let value = parse_value(&token.text).ok_or_else(|| AsmError::InvalidValue {
                            text: token.text.clone(),
                            pos: token.pos(),
                        })?;
                        self.image.push(value);
                    }
                    (OperandKind::Label, TokenKind::LabelReference) => {
                        if let Some(high) = pending.take() {
                            self.image.push(high << 4);
                        }
                        self.reference(token, self.image.len(), true, true);
                        self.image.extend_from_slice(&[0x00, 0x00]);
                    }
                    _ => {
                        return Err(AsmError::UnexpectedToken {
                            text: token.text.clone(),
                            pos: token.pos(),
                        });
                    }
                }
            }

            if let Some(high) = pending {
                self.image.push(high << 4);
            }

            Ok(idx)
        }

        // cpy dst src => iadd dst src 0
        fn emit_cpy(&mut self, tokens: &[Token], start: usize) -> Result<usize> {
            let instr = &tokens[start];
            let mut regs = [0u8; 2];

            for (n, slot) in regs.iter_mut().enumerate() {
                let token = self.operand(tokens, start + 1 + n, instr)?;
                match token.kind {
                    TokenKind::Register(reg) => *slot = reg,
                    _ => {
                        return Err(AsmError::ExpectedRegister {
                            mnemonic: instr.text.clone(),
                            pos: instr.pos(),
                        });
                    }
                }
            }

            let [dst, src] = regs;
            self.image.extend_from_slice(&[OP_IADD | dst, src << 4, 0x00]);
            Ok(start + 2)
        }

        // setadr label => imm rbnk <high byte>; imm radr <low byte>
        fn emit_setadr(&mut self, tokens: &[Token], start: usize) -> Result<usize> {
            let instr = &tokens[start];
            let label = self.operand(tokens, start + 1, instr)?;
            if label.kind != TokenKind::LabelReference {
                return Err(AsmError::UnexpectedToken { text: label.text.clone(), pos: label.pos() });
            }

            self.image.extend_from_slice(&[OP_IMM | REG_BANK, 0x00]);
            self.reference(label, self.image.len() - 1, true, false);
            self.image.extend_from_slice(&[OP_IMM | REG_ADDR, 0x00]);
            self.reference(label, self.image.len() - 1, false, true);

            Ok(start + 1)
        }

        fn lookup(&self, reference: &LabelReference) -> Option<u16> {
            match reference.label.strip_prefix(LOCAL_PREFIX) {
                Some(local) => self.locals.get(&reference.scope)?.get(local).copied(),
                None => self.globals.get(&reference.label).copied(),
            }
        }

        fn finish(mut self) -> Result<Assembly> {
            let entry = self.globals.get(ENTRY_LABEL).copied().ok_or(AsmError::MissingMain)?;
            self.image[1..HEADER_SIZE].copy_from_slice(&entry.to_be_bytes());

            for reference in &self.references {
                let target = self.lookup(reference).ok_or_else(|| AsmError::UndefinedLabel {
                    name: reference.label.clone(),
                    pos: reference.pos.clone(),
                })?;
                let [high, low] = target.to_be_bytes();
                let mut at = reference.offset;

                if reference.high {
                    self.image[at] = high;
                    at += 1;
                }
                if reference.low {
                    self.image[at] = low;
                }
                trace!(label = %reference.label, offset = reference.offset, target, "patched label");
            }

            debug!(
                bytes = self.image.len(),
                labels = self.globals.len(),
                references = self.references.len(),
                entry,
                "assembled image"
            );
            Ok(Assembly { image: self.image, labels: self.globals })
        }
    }

    pub fn assemble_tokens(tokens: &[Token]) -> Result<Assembly> {
        Assembler::new().assemble(tokens)
    }

    pub fn assemble_source(isa: &Isa, sources: &mut dyn SourceProvider, entry: &str) -> Result<Assembly> {
        let tokens = tokenize(isa, sources, entry)?;
        assemble_tokens(&tokens)
    }

    pub fn assemble_file(path: &Path) -> Result<Assembly> {
        let isa = Isa::new();
        let mut sources = FileSources;
        assemble_source(&isa, &mut sources, &path.to_string_lossy())
    }
}
