pub mod error {
    use std::fmt;
    use std::io;

    use thiserror::Error;

    /// Where a token came from. Line numbers are 1-based.
    #[derive(Debug, Clone, PartialEq, Eq, Hash)]
    pub struct SourcePos {
        pub file: String,
        pub line: usize,
    }

    impl SourcePos {
        pub fn new(file: impl Into<String>, line: usize) -> SourcePos {
            SourcePos { file: file.into(), line }
        }
    }

    impl fmt::Display for SourcePos {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "file \"{}\", line {}", self.file, self.line)
        }
    }

    pub type Result<T> = std::result::Result<T, AsmError>;

    /// Every way an assembly run can fail. Any of these discards the
    /// whole image.
    #[derive(Debug, Error)]
    pub enum AsmError {
        #[error("could not open file \"{path}\": {source}")]
        Unreadable {
            path: String,
            #[source]
            source: io::Error,
        },
        #[error("could not open included file \"{path}\" in {pos}: {source}")]
        UnreadableInclude {
            path: String,
            pos: SourcePos,
            #[source]
            source: io::Error,
        },
        #[error("expected file name after #include in {pos}")]
        ExpectedIncludePath { pos: SourcePos },
        #[error("unterminated string literal in {pos}")]
        UnterminatedString { pos: SourcePos },
        #[error("expected name after #define in {pos}")]
        ExpectedDefineName { pos: SourcePos },
        #[error("found repeated define \"{name}\" in {pos}")]
        DuplicateDefine { name: String, pos: SourcePos },
        #[error("expected value for define \"{name}\" in {pos}")]
        ExpectedDefineValue { name: String, pos: SourcePos },
        #[error("redefinition of label \"{name}\" in {pos}")]
        DuplicateLabel { name: String, pos: SourcePos },
        #[error("cannot define local label \"{name}\" outside a global label scope in {pos}")]
        LocalOutsideScope { name: String, pos: SourcePos },
        #[error("expected register operand for instruction \"{mnemonic}\" in {pos}")]
        ExpectedRegister { mnemonic: String, pos: SourcePos },
        #[error("expected operand for instruction \"{mnemonic}\" in {pos}")]
        MissingOperand { mnemonic: String, pos: SourcePos },
        #[error("unexpected token \"{text}\" in {pos}")]
        UnexpectedToken { text: String, pos: SourcePos },
        #[error("failed to parse value \"{text}\" in {pos}")]
        InvalidValue { text: String, pos: SourcePos },
        #[error("unexpected label in data section \"{text}\" in {pos}")]
        LabelInData { text: String, pos: SourcePos },
        #[error("unexpected stray token \"{text}\" in {pos}")]
        StrayToken { text: String, pos: SourcePos },
        #[error("undefined label \"{name}\" referenced in {pos}")]
        UndefinedLabel { name: String, pos: SourcePos },
        #[error("program image grows past the 64KB address space in {pos}")]
        ImageTooLarge { pos: SourcePos },
        #[error("must define program entry point (\"main\" label)")]
        MissingMain,
    }

    impl AsmError {
        pub fn pos(&self) -> Option<&SourcePos> {
            match self {
                AsmError::Unreadable { .. } | AsmError::MissingMain => None,
                AsmError::UnreadableInclude { pos, .. }
                | AsmError::ExpectedIncludePath { pos }
                | AsmError::UnterminatedString { pos }
                | AsmError::ExpectedDefineName { pos }
                | AsmError::DuplicateDefine { pos, .. }
                | AsmError::ExpectedDefineValue { pos, .. }
                | AsmError::DuplicateLabel { pos, .. }
                | AsmError::LocalOutsideScope { pos, .. }
                | AsmError::ExpectedRegister { pos, .. }
                | AsmError::MissingOperand { pos, .. }
                | AsmError::UnexpectedToken { pos, .. }
                | AsmError::InvalidValue { pos, .. }
                | AsmError::LabelInData { pos, .. }
                | AsmError::StrayToken { pos, .. }
                | AsmError::UndefinedLabel { pos, .. }
                | AsmError::ImageTooLarge { pos } => Some(pos),
            }
        }
    }

    #[derive(Debug, Error)]
    pub enum LoadError {
        #[error("could not read rom \"{path}\": {source}")]
        Io {
            path: String,
            #[source]
            source: io::Error,
        },
        #[error("rom image of {len} bytes exceeds the {capacity} byte program store")]
        TooLarge { len: usize, capacity: usize },
    }
}
