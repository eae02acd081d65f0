pub mod tokenizer {
    use std::collections::{HashMap, HashSet};
    use std::mem;

    use tracing::{debug, trace};

    use crate::error::error::{AsmError, Result, SourcePos};
    use crate::isa::isa::{InstructionDescriptor, Isa};
    use crate::source::source::{SourceProvider, resolve_include};

    pub const INCLUDE_DIRECTIVE: &str = "#include";
    pub const DEFINE_DIRECTIVE: &str = "#define";

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum TokenKind {
        Instruction(InstructionDescriptor),
        Register(u8),
        Immediate,
        StringLiteral,
        LabelReference,
        LabelDefinition,
    }

    /// One lexeme of the flattened token stream. `text` holds the raw
    /// lexeme, minus the quotes for string literals.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Token {
        pub kind: TokenKind,
        pub text: String,
        pub file: String,
        pub line: usize,
        /// last token of a contiguous run from one file
        pub last_in_file: bool,
    }

    impl Token {
        pub fn pos(&self) -> SourcePos {
            SourcePos::new(self.file.clone(), self.line)
        }
    }

    enum Directive {
        None,
        Include(SourcePos),
        DefineName(SourcePos),
        DefineValue(String, SourcePos),
    }

    fn is_token_char(c: char) -> bool {
        c.is_ascii_alphanumeric() || matches!(c, '.' | ':' | '[' | ']' | '#' | '"' | '_')
    }

    fn starts_numeric(text: &str) -> bool {
        let mut chars = text.chars();
        match chars.next() {
            Some(c) if c.is_ascii_digit() => true,
            Some('-') => chars.next().is_some_and(|c| c.is_ascii_digit()),
            _ => false,
        }
    }

    /// Signed decimal in -128..=255, stored as its 8-bit two's complement.
    pub fn parse_int(text: &str) -> Option<u8> {
        let (negative, digits) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text),
        };
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }

        let mut value: i32 = 0;
        for c in digits.chars() {
            value = value.checked_mul(10)?.checked_add(c as i32 - '0' as i32)?;
        }

        if negative {
            if value > 128 {
                return None;
            }
            Some((-value) as i8 as u8)
        } else if value > 0xFF {
            None
        } else {
            Some(value as u8)
        }
    }

    /// `0x` followed by one or two hex digits, any case.
    pub fn parse_hex(text: &str) -> Option<u8> {
        let digits = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X"))?;
        if digits.is_empty() || digits.len() > 2 {
            return None;
        }
        u8::from_str_radix(digits, 16).ok()
    }

    pub fn parse_value(text: &str) -> Option<u8> {
        parse_int(text).or_else(|| parse_hex(text))
    }

    /// Turns a root source file and everything it includes into one flat
    /// token stream, applying `#define` substitutions along the way.
    pub struct Tokenizer<'a> {
        isa: &'a Isa,
        sources: &'a mut dyn SourceProvider,
        included: HashSet<String>,
        defines: HashMap<String, Token>,
        tokens: Vec<Token>,
    }

    impl<'a> Tokenizer<'a> {
        pub fn new(isa: &'a Isa, sources: &'a mut dyn SourceProvider) -> Tokenizer<'a> {
            Tokenizer {
                isa,
                sources,
                included: HashSet::new(),
                defines: HashMap::new(),
                tokens: Vec::new(),
            }
        }

        pub fn tokenize(mut self, entry: &str) -> Result<Vec<Token>> {
            self.tokenize_file(entry, None)?;
            debug!(
                tokens = self.tokens.len(),
                files = self.included.len(),
                defines = self.defines.len(),
                "tokenized sources"
            );
            Ok(self.tokens)
        }

        fn classify(&self, text: &str, file: &str, line: usize) -> Token {
            let mut text = text.to_string();
            let kind = if let Some(desc) = self.isa.instruction(&text) {
                TokenKind::Instruction(*desc)
            } else if let Some(reg) = self.isa.register(&text) {
                TokenKind::Register(reg)
            } else if starts_numeric(&text) {
                TokenKind::Immediate
            } else if text.len() >= 2 && text.starts_with('"') && text.ends_with('"') {
                text = text[1..text.len() - 1].to_string();
                TokenKind::StringLiteral
            } else if text.ends_with(':') {
                TokenKind::LabelDefinition
            } else {
                TokenKind::LabelReference
            };

            Token {
                kind,
                text,
                file: file.to_string(),
                line,
                last_in_file: false,
            }
        }

        // include guard: a path is skipped once it has been opened.
        fn tokenize_file(&mut self, path: &str, site: Option<SourcePos>) -> Result<()> {
            if self.included.contains(path) {
                trace!(file = path, "skipping repeated include");
                return Ok(());
            }

            let text = self.sources.read_source(path).map_err(|source| match site {
                Some(pos) => AsmError::UnreadableInclude { path: path.to_string(), pos, source },
                None => AsmError::Unreadable { path: path.to_string(), source },
            })?;
            self.included.insert(path.to_string());
            trace!(file = path, bytes = text.len(), "tokenizing");

            let mut line = 1usize;
            let mut word = String::new();
            let mut directive = Directive::None;
            let mut chars = text.chars().peekable();

            while let Some(c) = chars.next() {
                if c == '"' && word.is_empty() {
                    word.push(c);
                    loop {
                        match chars.peek() {
                            None | Some('\n') => {
                                return Err(AsmError::UnterminatedString {
                                    pos: SourcePos::new(path, line),
                                });
                            }
                            Some(&'"') => {
                                word.push('"');
                                chars.next();
                                break;
                            }
                            Some(&other) => {
                                word.push(other);
                                chars.next();
                            }
                        }
                    }
                    continue;
                }

                let signed = c == '-'
                    && word.is_empty()
                    && chars.peek().is_some_and(|n| n.is_ascii_digit());
                if is_token_char(c) || signed {
                    word.push(c);
                    continue;
                }

                if !word.is_empty() {
                    self.flush(&mem::take(&mut word), path, line, &mut directive)?;
                }

                if c == ';' {
                    while chars.peek().is_some_and(|&n| n != '\n') {
                        chars.next();
                    }
                }

                if c == '\n' {
                    line += 1;
                }
            }

            if !word.is_empty() {
                self.flush(&word, path, line, &mut directive)?;
            }

            match directive {
                Directive::None => {}
                Directive::Include(pos) => return Err(AsmError::ExpectedIncludePath { pos }),
                Directive::DefineName(pos) => return Err(AsmError::ExpectedDefineName { pos }),
                Directive::DefineValue(name, pos) => {
                    return Err(AsmError::ExpectedDefineValue { name, pos });
                }
            }

            self.mark_run_end();
            Ok(())
        }

        fn mark_run_end(&mut self) {
            if let Some(last) = self.tokens.last_mut() {
                last.last_in_file = true;
            }
        }

        fn flush(&mut self, word: &str, path: &str, line: usize, directive: &mut Directive) -> Result<()> {
            let pos = SourcePos::new(path, line);

            match mem::replace(directive, Directive::None) {
                Directive::None => {}
                Directive::Include(_) => {
                    let token = self.classify(word, path, line);
                    if token.kind != TokenKind::StringLiteral {
                        return Err(AsmError::ExpectedIncludePath { pos });
                    }
                    let target = resolve_include(path, &token.text);
                    if self.included.contains(&target) {
                        trace!(file = %target, "skipping repeated include");
                        return Ok(());
                    }
                    // the included span starts with fresh encoder state
                    self.mark_run_end();
                    return self.tokenize_file(&target, Some(pos));
                }
                Directive::DefineName(_) => {
                    let token = self.classify(word, path, line);
                    if token.kind != TokenKind::LabelReference {
                        return Err(AsmError::ExpectedDefineName { pos });
                    }
                    if self.defines.contains_key(&token.text) {
                        return Err(AsmError::DuplicateDefine { name: token.text, pos });
                    }
                    *directive = Directive::DefineValue(token.text, pos);
                    return Ok(());
                }
                Directive::DefineValue(name, _) => {
                    let token = self.classify(word, path, line);
                    if token.kind != TokenKind::Immediate || parse_value(&token.text).is_none() {
                        return Err(AsmError::ExpectedDefineValue { name, pos });
                    }
                    self.defines.insert(name, token);
                    return Ok(());
                }
            }

            if word == INCLUDE_DIRECTIVE {
                *directive = Directive::Include(pos);
                return Ok(());
            }
            if word == DEFINE_DIRECTIVE {
                *directive = Directive::DefineName(pos);
                return Ok(());
            }

            let mut token = self.classify(word, path, line);
            if token.kind == TokenKind::LabelReference {
                if let Some(value) = self.defines.get(&token.text) {
                    token = Token {
                        file: path.to_string(),
                        line,
                        last_in_file: false,
                        ..value.clone()
                    };
                }
            }

            self.tokens.push(token);
            Ok(())
        }
    }

    pub fn tokenize(isa: &Isa, sources: &mut dyn SourceProvider, entry: &str) -> Result<Vec<Token>> {
        Tokenizer::new(isa, sources).tokenize(entry)
    }
}
